//! Build type descriptor.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::feature::BuildFeature;
use super::{require_non_empty, validate_id};
use crate::error::{EntityKind, ValidationError};
use crate::rules::{ArtifactRules, BranchSpec};

/// Where the server checks sources out.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum CheckoutMode {
    /// Checked out centrally and shipped to the agent.
    OnServer,
    /// Checked out on the executing agent.
    #[default]
    OnAgent,
}

/// VCS attachment of a build type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VcsSettings {
    /// Id of the VCS root, resolved in the owning project or an ancestor.
    pub root: String,
    pub checkout_mode: CheckoutMode,
    pub clean_checkout: bool,
}

impl VcsSettings {
    pub fn new(root: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            checkout_mode: CheckoutMode::default(),
            clean_checkout: false,
        }
    }

    pub fn checkout_mode(mut self, mode: CheckoutMode) -> Self {
        self.checkout_mode = mode;
        self
    }

    pub fn clean_checkout(mut self, clean: bool) -> Self {
        self.clean_checkout = clean;
        self
    }
}

/// One script step. Steps run strictly in declared order and the first
/// failure skips the rest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildStep {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// Script path or inline script content; zero exit means success.
    pub script: String,

    /// Working directory relative to the checkout directory.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub working_dir: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_secs: Option<u64>,
}

impl BuildStep {
    pub fn script(script: impl Into<String>) -> Self {
        Self {
            name: None,
            script: script.into(),
            working_dir: None,
            timeout_secs: None,
        }
    }

    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn in_dir(mut self, dir: impl Into<String>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    pub fn timeout_secs(mut self, secs: u64) -> Self {
        self.timeout_secs = Some(secs);
        self
    }

    /// Display label: the name, or the script itself.
    pub fn label(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.script)
    }
}

/// Commit trigger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VcsTrigger {
    /// One build per commit rather than one build per batch of commits.
    pub per_checkin_triggering: bool,

    /// Let a newer queued build replace an older pending one.
    pub enable_queue_optimization: bool,

    /// Logical branches allowed to trigger; all monitored branches when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub branch_filter: Option<BranchSpec>,
}

impl Default for VcsTrigger {
    fn default() -> Self {
        Self {
            per_checkin_triggering: false,
            enable_queue_optimization: true,
            branch_filter: None,
        }
    }
}

impl VcsTrigger {
    /// One build for every commit, never coalesced.
    pub fn every_commit() -> Self {
        Self {
            per_checkin_triggering: true,
            enable_queue_optimization: false,
            branch_filter: None,
        }
    }

    /// Whether a logical branch passes the filter.
    pub fn accepts_branch(&self, branch: &str) -> bool {
        self.branch_filter
            .as_ref()
            .map_or(true, |filter| filter.matches(branch))
    }
}

/// A triggerable unit of work bound to one VCS root.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildType {
    pub id: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uuid: Option<Uuid>,

    pub name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    #[serde(default = "default_personal_builds")]
    pub enable_personal_builds: bool,

    pub vcs: VcsSettings,

    pub artifact_rules: ArtifactRules,

    pub steps: Vec<BuildStep>,

    /// Commit trigger; a build type without one only runs on demand.
    #[serde(default)]
    pub trigger: Option<VcsTrigger>,

    pub features: Vec<BuildFeature>,
}

fn default_personal_builds() -> bool {
    true
}

impl BuildType {
    pub fn new(id: impl Into<String>, name: impl Into<String>, vcs: VcsSettings) -> Self {
        Self {
            id: id.into(),
            uuid: None,
            name: name.into(),
            description: None,
            enable_personal_builds: true,
            vcs,
            artifact_rules: ArtifactRules::default(),
            steps: Vec::new(),
            trigger: None,
            features: Vec::new(),
        }
    }

    pub fn with_uuid(mut self, uuid: Uuid) -> Self {
        self.uuid = Some(uuid);
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn personal_builds(mut self, enabled: bool) -> Self {
        self.enable_personal_builds = enabled;
        self
    }

    pub fn with_artifact_rules(mut self, rules: ArtifactRules) -> Self {
        self.artifact_rules = rules;
        self
    }

    pub fn step(mut self, step: BuildStep) -> Self {
        self.steps.push(step);
        self
    }

    pub fn with_trigger(mut self, trigger: VcsTrigger) -> Self {
        self.trigger = Some(trigger);
        self
    }

    pub fn feature(mut self, feature: BuildFeature) -> Self {
        self.features.push(feature);
        self
    }

    /// A build type can run only with at least one step.
    pub fn is_runnable(&self) -> bool {
        !self.steps.is_empty()
    }

    /// Check the descriptor on its own. The VCS root reference is resolved by
    /// the loader.
    pub fn validate(&self) -> Result<(), ValidationError> {
        validate_id(EntityKind::BuildType, &self.id)?;
        require_non_empty(EntityKind::BuildType, &self.id, "name", &self.name)?;
        require_non_empty(EntityKind::BuildType, &self.id, "vcs.root", &self.vcs.root)?;
        for (index, step) in self.steps.iter().enumerate() {
            if step.script.trim().is_empty() {
                return Err(ValidationError::EmptyScript {
                    build_type: self.id.clone(),
                    index,
                });
            }
        }
        Ok(())
    }

    /// Check that artifact rules and features read back as built.
    pub fn validate_rules(&self) -> crate::error::Result<()> {
        self.artifact_rules.validate()?;
        for feature in &self.features {
            feature.validate()?;
        }
        Ok(())
    }
}
