//! buildconf core
//!
//! CI configuration as typed values:
//! - descriptors for VCS roots, build types and projects
//! - branch and artifact rule grammars
//! - an explicit validating loader with parent-chain reference resolution
//! - canonical digests for idempotent reloads
//! - the commit trigger and queue policy model

pub mod descriptor;
pub mod digest;
pub mod error;
pub mod loader;
pub mod queue;
pub mod rules;
pub mod telemetry;

pub use descriptor::{
    AuthMethod, BuildFeature, BuildStep, BuildType, CheckoutMode, ParentRef, Project, ReportType,
    VcsRoot, VcsSettings, VcsTrigger, XmlReportFeature, ROOT_PROJECT_ID,
};
pub use error::{
    ConfigError, EntityKind, FeatureError, ReferenceError, Result, RuleParseError, ValidationError,
};
pub use loader::{BuildEntryPoint, ConfigBundle, LoadWarning, LoadedConfig, Loader};
pub use queue::{BuildQueue, CommitEvent, IgnoreReason, QueueState, QueuedBuild, TriggerDecision};
pub use rules::{ArtifactRule, ArtifactRules, BranchRule, BranchSpec, RuleKind};
pub use telemetry::init_tracing;
