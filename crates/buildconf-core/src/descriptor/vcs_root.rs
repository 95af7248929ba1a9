//! VCS root descriptor.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{require_non_empty, validate_id};
use crate::error::{EntityKind, ValidationError};
use crate::rules::BranchSpec;

/// How the server authenticates against the remote.
///
/// Only references are carried; credentials stay on the server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "method", rename_all = "snake_case")]
pub enum AuthMethod {
    Anonymous,
    /// The agent's default private key.
    DefaultPrivateKey,
    /// A key uploaded to the server, referenced by name.
    UploadedKey { key: String },
    /// Username plus a reference to a server-side secret.
    Password { username: String, secret_ref: String },
}

/// A remote source repository.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VcsRoot {
    pub id: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uuid: Option<Uuid>,

    pub name: String,

    pub url: String,

    /// Ref the server treats as the default branch, always monitored.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_branch: Option<String>,

    pub branch_spec: BranchSpec,

    pub auth: AuthMethod,
}

impl VcsRoot {
    /// Build a validated VCS root.
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        url: impl Into<String>,
        branch_spec: BranchSpec,
        auth: AuthMethod,
    ) -> Result<Self, ValidationError> {
        let root = Self {
            id: id.into(),
            uuid: None,
            name: name.into(),
            url: url.into(),
            default_branch: None,
            branch_spec,
            auth,
        };
        root.validate()?;
        Ok(root)
    }

    pub fn with_uuid(mut self, uuid: Uuid) -> Self {
        self.uuid = Some(uuid);
        self
    }

    pub fn with_default_branch(mut self, branch: impl Into<String>) -> Self {
        self.default_branch = Some(branch.into());
        self
    }

    /// Check the descriptor on its own.
    pub fn validate(&self) -> Result<(), ValidationError> {
        validate_id(EntityKind::VcsRoot, &self.id)?;
        require_non_empty(EntityKind::VcsRoot, &self.id, "name", &self.name)?;
        require_non_empty(EntityKind::VcsRoot, &self.id, "url", &self.url)?;
        if !is_repository_url(&self.url) {
            return Err(ValidationError::InvalidUrl {
                vcs_root: self.id.clone(),
                url: self.url.clone(),
            });
        }
        if let Some(branch) = &self.default_branch {
            require_non_empty(EntityKind::VcsRoot, &self.id, "default_branch", branch)?;
        }
        match &self.auth {
            AuthMethod::UploadedKey { key } if key.trim().is_empty() => {
                Err(ValidationError::InvalidAuth {
                    vcs_root: self.id.clone(),
                    field: "key",
                })
            }
            AuthMethod::Password { username, .. } if username.trim().is_empty() => {
                Err(ValidationError::InvalidAuth {
                    vcs_root: self.id.clone(),
                    field: "username",
                })
            }
            AuthMethod::Password { secret_ref, .. } if secret_ref.trim().is_empty() => {
                Err(ValidationError::InvalidAuth {
                    vcs_root: self.id.clone(),
                    field: "secret_ref",
                })
            }
            _ => Ok(()),
        }
    }

    /// Logical branch name for a monitored ref.
    pub fn logical_branch(&self, ref_name: &str) -> Option<String> {
        if let Some(name) = self.branch_spec.logical_branch(ref_name) {
            return Some(name);
        }
        match &self.default_branch {
            Some(default) if default == ref_name => Some(
                ref_name
                    .strip_prefix("refs/heads/")
                    .unwrap_or(ref_name)
                    .to_string(),
            ),
            _ => None,
        }
    }

    /// Whether a ref is monitored by this root.
    pub fn matches_ref(&self, ref_name: &str) -> bool {
        self.logical_branch(ref_name).is_some()
    }
}

const URL_SCHEMES: &[&str] = &["ssh://", "https://", "http://", "git://", "file://"];

/// A scheme-qualified url or an scp-like `user@host:path`.
fn is_repository_url(url: &str) -> bool {
    if url.chars().any(char::is_whitespace) {
        return false;
    }
    if let Some(rest) = URL_SCHEMES.iter().find_map(|s| url.strip_prefix(s)) {
        return !rest.is_empty();
    }
    match url.split_once('@') {
        Some((user, rest)) if !user.is_empty() && !user.contains('/') => rest
            .split_once(':')
            .is_some_and(|(host, path)| !host.is_empty() && !host.contains('/') && !path.is_empty()),
        _ => false,
    }
}
