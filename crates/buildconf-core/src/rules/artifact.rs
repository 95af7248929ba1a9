//! Artifact retention rules.
//!
//! Rules are carried verbatim for the server, which unions all includes and
//! subtracts all excludes. Globs are never evaluated here.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::{block_lines, split_prefix, RuleKind, RulesRepr};
use crate::error::RuleParseError;

/// `+:<glob>[ => <target>]` or `-:<glob>`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ArtifactRule {
    pub kind: RuleKind,
    pub pattern: String,
    /// Destination directory or archive inside the published artifacts.
    pub target: Option<String>,
}

impl ArtifactRule {
    pub fn include(pattern: impl Into<String>) -> Self {
        Self {
            kind: RuleKind::Include,
            pattern: pattern.into(),
            target: None,
        }
    }

    pub fn exclude(pattern: impl Into<String>) -> Self {
        Self {
            kind: RuleKind::Exclude,
            pattern: pattern.into(),
            target: None,
        }
    }

    pub fn with_target(mut self, target: impl Into<String>) -> Self {
        self.target = Some(target.into());
        self
    }

    /// Parse a rule from its textual form.
    pub fn parse(rule: &str) -> Result<Self, RuleParseError> {
        let (kind, body) = split_prefix(rule)?;
        let (pattern, target) = match body.split_once("=>") {
            Some((pattern, target)) => {
                let target = target.trim();
                if target.is_empty() {
                    return Err(RuleParseError::EmptyTarget {
                        rule: rule.trim().to_string(),
                    });
                }
                (pattern.trim(), Some(target.to_string()))
            }
            None => (body, None),
        };
        if pattern.is_empty() {
            return Err(RuleParseError::EmptyPattern {
                rule: rule.trim().to_string(),
            });
        }
        Ok(Self {
            kind,
            pattern: pattern.to_string(),
            target,
        })
    }

    /// Check that the rule's text form parses back to this exact rule.
    ///
    /// Rules decoded from text always pass; rules assembled field by field
    /// can carry an empty pattern, a stray `=>` or a line break.
    pub fn validate(&self) -> Result<(), RuleParseError> {
        let text = self.to_string();
        if text.contains(['\n', '\r']) {
            return Err(RuleParseError::NotCanonical { rule: text });
        }
        if Self::parse(&text)? != *self {
            return Err(RuleParseError::NotCanonical { rule: text });
        }
        Ok(())
    }

    /// Whether the pattern names a single path rather than a glob.
    pub fn is_literal(&self) -> bool {
        !self.pattern.contains(['*', '?', '['])
    }
}

impl fmt::Display for ArtifactRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.kind.prefix(), self.pattern)?;
        if let Some(target) = &self.target {
            write!(f, " => {}", target)?;
        }
        Ok(())
    }
}

impl FromStr for ArtifactRule {
    type Err = RuleParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for ArtifactRule {
    type Error = RuleParseError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<ArtifactRule> for String {
    fn from(rule: ArtifactRule) -> Self {
        rule.to_string()
    }
}

/// Ordered artifact rules, preserved exactly as declared.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RulesRepr", into = "Vec<ArtifactRule>")]
pub struct ArtifactRules {
    rules: Vec<ArtifactRule>,
}

impl TryFrom<RulesRepr> for ArtifactRules {
    type Error = RuleParseError;

    fn try_from(repr: RulesRepr) -> Result<Self, Self::Error> {
        let rules = repr
            .into_lines()
            .iter()
            .map(|line| ArtifactRule::parse(line))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { rules })
    }
}

impl From<ArtifactRules> for Vec<ArtifactRule> {
    fn from(rules: ArtifactRules) -> Self {
        rules.rules
    }
}

impl ArtifactRules {
    pub fn new(rules: Vec<ArtifactRule>) -> Self {
        Self { rules }
    }

    /// Parse a block with one rule per non-blank line.
    pub fn parse_block(block: &str) -> Result<Self, RuleParseError> {
        let rules = block_lines(block)
            .map(ArtifactRule::parse)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { rules })
    }

    pub fn rules(&self) -> &[ArtifactRule] {
        &self.rules
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    /// Check every rule, stopping at the first bad one.
    pub fn validate(&self) -> Result<(), RuleParseError> {
        self.rules.iter().try_for_each(ArtifactRule::validate)
    }

    pub fn includes(&self) -> impl Iterator<Item = &ArtifactRule> {
        self.rules.iter().filter(|r| r.kind == RuleKind::Include)
    }

    pub fn excludes(&self) -> impl Iterator<Item = &ArtifactRule> {
        self.rules.iter().filter(|r| r.kind == RuleKind::Exclude)
    }
}

impl fmt::Display for ArtifactRules {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, rule) in self.rules.iter().enumerate() {
            if i > 0 {
                f.write_str("\n")?;
            }
            write!(f, "{}", rule)?;
        }
        Ok(())
    }
}
