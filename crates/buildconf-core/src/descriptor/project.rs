//! Project descriptor.

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::build_type::BuildType;
use super::vcs_root::VcsRoot;
use super::{require_non_empty, validate_id};
use crate::error::{EntityKind, ValidationError};

/// Id of the server's root project.
pub const ROOT_PROJECT_ID: &str = "_Root";

/// Parent of a project: the root sentinel or another project.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ParentRef {
    Root,
    Project(String),
}

impl ParentRef {
    pub fn as_str(&self) -> &str {
        match self {
            ParentRef::Root => ROOT_PROJECT_ID,
            ParentRef::Project(id) => id,
        }
    }
}

impl From<String> for ParentRef {
    fn from(value: String) -> Self {
        if value == ROOT_PROJECT_ID {
            ParentRef::Root
        } else {
            ParentRef::Project(value)
        }
    }
}

impl From<&str> for ParentRef {
    fn from(value: &str) -> Self {
        ParentRef::from(value.to_string())
    }
}

impl From<ParentRef> for String {
    fn from(parent: ParentRef) -> Self {
        parent.as_str().to_string()
    }
}

impl fmt::Display for ParentRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A named group of VCS roots and build types under a parent project.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Project {
    pub id: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uuid: Option<Uuid>,

    pub name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    pub parent: ParentRef,

    pub vcs_roots: Vec<VcsRoot>,

    pub build_types: Vec<BuildType>,
}

impl Project {
    pub fn new(id: impl Into<String>, name: impl Into<String>, parent: ParentRef) -> Self {
        Self {
            id: id.into(),
            uuid: None,
            name: name.into(),
            description: None,
            parent,
            vcs_roots: Vec::new(),
            build_types: Vec::new(),
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

    pub fn vcs_root(mut self, root: VcsRoot) -> Self {
        self.vcs_roots.push(root);
        self
    }

    pub fn build_type(mut self, build_type: BuildType) -> Self {
        self.build_types.push(build_type);
        self
    }

    /// Check the project and everything it owns. Cross references are left
    /// to the loader.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.id == ROOT_PROJECT_ID {
            return Err(ValidationError::ReservedId {
                entity: EntityKind::Project,
                id: self.id.clone(),
            });
        }
        validate_id(EntityKind::Project, &self.id)?;
        require_non_empty(EntityKind::Project, &self.id, "name", &self.name)?;
        if let ParentRef::Project(parent) = &self.parent {
            require_non_empty(EntityKind::Project, &self.id, "parent", parent)?;
        }
        for root in &self.vcs_roots {
            root.validate()?;
        }
        for build_type in &self.build_types {
            build_type.validate()?;
        }
        Ok(())
    }
}
