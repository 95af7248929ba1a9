//! Rule grammars shared by VCS roots, artifact retention and report features.
//!
//! A rule is written `+:<pattern>` (include), `-:<pattern>` (exclude) or bare
//! `<pattern>` (include). Multi-line blocks carry one rule per non-blank line.

pub mod artifact;
pub mod branch_spec;

pub use artifact::{ArtifactRule, ArtifactRules};
pub use branch_spec::{BranchRule, BranchSpec};

use serde::{Deserialize, Serialize};

use crate::error::RuleParseError;

/// Whether a rule adds or removes matches.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum RuleKind {
    Include,
    Exclude,
}

impl RuleKind {
    /// Rule prefix in the textual form.
    pub fn prefix(&self) -> &'static str {
        match self {
            RuleKind::Include => "+:",
            RuleKind::Exclude => "-:",
        }
    }
}

/// Split a rule into its kind and the remaining body.
///
/// A leading `X:` where `X` is neither `+` nor `-` is rejected; a bare
/// pattern is an include.
pub(crate) fn split_prefix(rule: &str) -> Result<(RuleKind, &str), RuleParseError> {
    let trimmed = rule.trim();
    if trimmed.is_empty() {
        return Err(RuleParseError::Empty);
    }

    let (kind, body) = if let Some(rest) = trimmed.strip_prefix("+:") {
        (RuleKind::Include, rest)
    } else if let Some(rest) = trimmed.strip_prefix("-:") {
        (RuleKind::Exclude, rest)
    } else if has_foreign_prefix(trimmed) {
        return Err(RuleParseError::UnknownPrefix {
            rule: trimmed.to_string(),
        });
    } else {
        (RuleKind::Include, trimmed)
    };

    let body = body.trim();
    if body.is_empty() {
        return Err(RuleParseError::EmptyPattern {
            rule: trimmed.to_string(),
        });
    }
    Ok((kind, body))
}

/// `?:` style prefixes with a single punctuation character.
fn has_foreign_prefix(rule: &str) -> bool {
    let mut chars = rule.chars();
    match (chars.next(), chars.next()) {
        (Some(c), Some(':')) => c.is_ascii_punctuation(),
        _ => false,
    }
}

/// Accepted wire forms for a rule list: a JSON array or one multi-line block.
///
/// Rules are parsed after the shape is known so that a bad rule reports its
/// own error instead of a generic shape mismatch.
#[derive(Deserialize)]
#[serde(untagged)]
pub(crate) enum RulesRepr {
    Block(String),
    List(Vec<String>),
}

impl RulesRepr {
    pub(crate) fn into_lines(self) -> Vec<String> {
        match self {
            RulesRepr::Block(block) => block_lines(&block).map(str::to_string).collect(),
            RulesRepr::List(list) => list,
        }
    }
}

/// Non-blank, trimmed lines of a multi-line rule block.
pub(crate) fn block_lines(block: &str) -> impl Iterator<Item = &str> {
    block.lines().map(str::trim).filter(|line| !line.is_empty())
}
