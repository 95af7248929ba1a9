//! Descriptor records: VCS roots, build types and projects.
//!
//! Descriptors are plain immutable values. They register with nothing on
//! construction; a complete set is handed to [`crate::loader::Loader`].

pub mod build_type;
pub mod feature;
pub mod project;
pub mod vcs_root;

pub use build_type::{BuildStep, BuildType, CheckoutMode, VcsSettings, VcsTrigger};
pub use feature::{BuildFeature, ReportType, XmlReportFeature};
pub use project::{ParentRef, Project, ROOT_PROJECT_ID};
pub use vcs_root::{AuthMethod, VcsRoot};

use crate::error::{EntityKind, ValidationError};

/// Check an id against the server id grammar: a leading ASCII letter followed
/// by ASCII letters, digits or `_`.
pub fn validate_id(entity: EntityKind, id: &str) -> Result<(), ValidationError> {
    if id.is_empty() {
        return Err(ValidationError::EmptyField {
            entity,
            id: id.to_string(),
            field: "id",
        });
    }
    let mut chars = id.chars();
    let leading_letter = chars.next().is_some_and(|c| c.is_ascii_alphabetic());
    if !leading_letter || !chars.all(|c| c.is_ascii_alphanumeric() || c == '_') {
        return Err(ValidationError::InvalidId {
            entity,
            id: id.to_string(),
        });
    }
    Ok(())
}

pub(crate) fn require_non_empty(
    entity: EntityKind,
    id: &str,
    field: &'static str,
    value: &str,
) -> Result<(), ValidationError> {
    if value.trim().is_empty() {
        return Err(ValidationError::EmptyField {
            entity,
            id: id.to_string(),
            field,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_id_accepts_server_ids() {
        assert!(validate_id(EntityKind::Project, "LyokocoinABC").is_ok());
        assert!(validate_id(EntityKind::BuildType, "Master_Linux2").is_ok());
    }

    #[test]
    fn test_validate_id_rejects_bad_ids() {
        assert!(matches!(
            validate_id(EntityKind::VcsRoot, ""),
            Err(ValidationError::EmptyField { field: "id", .. })
        ));
        assert!(matches!(
            validate_id(EntityKind::VcsRoot, "1Repo"),
            Err(ValidationError::InvalidId { .. })
        ));
        assert!(matches!(
            validate_id(EntityKind::VcsRoot, "my-repo"),
            Err(ValidationError::InvalidId { .. })
        ));
        assert!(matches!(
            validate_id(EntityKind::Project, "_Root"),
            Err(ValidationError::InvalidId { .. })
        ));
    }
}
