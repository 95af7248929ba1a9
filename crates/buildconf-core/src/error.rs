//! Error taxonomy for configuration loading.
//!
//! Two families surface at load time and block registration:
//! - [`ValidationError`]: a descriptor is malformed on its own.
//! - [`ReferenceError`]: a descriptor names something that cannot be resolved
//!   in its scope.

use std::fmt;

/// The three descriptor kinds, used to label errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntityKind {
    Project,
    BuildType,
    VcsRoot,
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EntityKind::Project => f.write_str("project"),
            EntityKind::BuildType => f.write_str("build type"),
            EntityKind::VcsRoot => f.write_str("VCS root"),
        }
    }
}

/// Errors produced while parsing a single branch or artifact rule.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RuleParseError {
    #[error("rule must not be empty")]
    Empty,

    #[error("rule {rule:?} has an empty pattern")]
    EmptyPattern { rule: String },

    #[error("rule {rule:?} has an unknown prefix (expected '+:' or '-:')")]
    UnknownPrefix { rule: String },

    #[error("rule {rule:?} has unbalanced parentheses")]
    UnbalancedGroup { rule: String },

    #[error("rule {rule:?} has more than one group")]
    MultipleGroups { rule: String },

    #[error("rule {rule:?} has an empty target after '=>'")]
    EmptyTarget { rule: String },

    #[error("rule {rule:?} cannot be compiled: {reason}")]
    InvalidPattern { rule: String, reason: String },

    #[error("rule {rule:?} does not read back as the same rule")]
    NotCanonical { rule: String },
}

/// Errors produced while converting a raw feature into its typed form.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FeatureError {
    #[error("feature kind must not be empty")]
    EmptyKind,

    #[error("feature {kind:?} is missing required parameter {param:?}")]
    MissingParam { kind: String, param: String },

    #[error("unknown report type {value:?}")]
    UnknownReportType { value: String },

    #[error("feature {kind:?} has an invalid rule in {param:?}: {source}")]
    InvalidRule {
        kind: String,
        param: String,
        #[source]
        source: RuleParseError,
    },

    #[error("report directory rule {rule:?} must not declare a target")]
    UnexpectedTarget { rule: String },

    #[error("feature {kind:?} does not read back as the same feature")]
    NotCanonical { kind: String },
}

/// A descriptor is malformed.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("{entity} {id:?}: field `{field}` must not be empty")]
    EmptyField {
        entity: EntityKind,
        id: String,
        field: &'static str,
    },

    #[error("{entity} id {id:?} is invalid: must start with a letter and contain only letters, digits and '_'")]
    InvalidId { entity: EntityKind, id: String },

    #[error("{entity} id {id:?} is reserved")]
    ReservedId { entity: EntityKind, id: String },

    #[error("VCS root {vcs_root:?}: url {url:?} is not a recognised repository location")]
    InvalidUrl { vcs_root: String, url: String },

    #[error("VCS root {vcs_root:?}: auth field `{field}` must not be empty")]
    InvalidAuth {
        vcs_root: String,
        field: &'static str,
    },

    #[error("build type {build_type:?}: step #{index} has an empty script")]
    EmptyScript { build_type: String, index: usize },

    #[error("duplicate {entity} id {id:?}")]
    DuplicateId { entity: EntityKind, id: String },
}

/// A reference cannot be resolved in the current or an ancestor scope.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ReferenceError {
    #[error("build type {build_type:?} references unknown VCS root {vcs_root:?}")]
    UnknownVcsRoot {
        build_type: String,
        vcs_root: String,
    },

    #[error("build type {build_type:?} references VCS root {vcs_root:?} owned by project {owner:?}, which is not {project:?} or one of its ancestors")]
    VcsRootOutOfScope {
        build_type: String,
        vcs_root: String,
        project: String,
        owner: String,
    },

    #[error("project {project:?} references unknown parent {parent:?}")]
    UnknownParent { project: String, parent: String },

    #[error("project {project:?} is part of a parent cycle")]
    ParentCycle { project: String },

    #[error("unknown {entity} {id:?}")]
    NotFound { entity: EntityKind, id: String },
}

/// Top-level error for loading and querying configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("reference error: {0}")]
    Reference(#[from] ReferenceError),

    #[error("rule error: {0}")]
    Rule(#[from] RuleParseError),

    #[error("feature error: {0}")]
    Feature(#[from] FeatureError),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl ConfigError {
    /// Whether this error is a reference resolution failure.
    pub fn is_reference(&self) -> bool {
        matches!(self, ConfigError::Reference(_))
    }
}

/// Result type for configuration operations.
pub type Result<T> = std::result::Result<T, ConfigError>;
