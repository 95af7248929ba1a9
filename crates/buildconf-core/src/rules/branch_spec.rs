//! Branch specification: which refs of a VCS root are monitored.
//!
//! Each rule is `+:<pattern>` or `-:<pattern>`. `*` matches any run of
//! characters (including `/`), and a single parenthesised group marks the
//! logical branch name, e.g. `+:refs/heads/(*)` maps `refs/heads/main` to
//! `main`.
//!
//! A ref is accepted when at least one include rule matches and no exclude
//! rule does.

use std::fmt;
use std::str::FromStr;

use regex::Regex;
use serde::{Deserialize, Serialize};

use super::{block_lines, split_prefix, RuleKind, RulesRepr};
use crate::error::RuleParseError;

/// One compiled branch rule.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct BranchRule {
    kind: RuleKind,
    pattern: String,
    has_group: bool,
    matcher: Regex,
}

impl BranchRule {
    /// Parse a rule from its textual form.
    pub fn parse(rule: &str) -> Result<Self, RuleParseError> {
        let (kind, pattern) = split_prefix(rule)?;
        let (matcher, has_group) = compile(rule.trim(), pattern)?;
        Ok(Self {
            kind,
            pattern: pattern.to_string(),
            has_group,
            matcher,
        })
    }

    pub fn kind(&self) -> RuleKind {
        self.kind
    }

    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    /// Whether the rule matches the ref.
    pub fn is_match(&self, ref_name: &str) -> bool {
        self.matcher.is_match(ref_name)
    }

    /// Logical branch name for a matching ref.
    ///
    /// The group capture when the pattern has one, the whole ref otherwise.
    pub fn logical_name(&self, ref_name: &str) -> Option<String> {
        let caps = self.matcher.captures(ref_name)?;
        if self.has_group {
            caps.get(1).map(|m| m.as_str().to_string())
        } else {
            Some(ref_name.to_string())
        }
    }
}

impl PartialEq for BranchRule {
    fn eq(&self, other: &Self) -> bool {
        self.kind == other.kind && self.pattern == other.pattern
    }
}

impl Eq for BranchRule {}

impl fmt::Display for BranchRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.kind.prefix(), self.pattern)
    }
}

impl FromStr for BranchRule {
    type Err = RuleParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for BranchRule {
    type Error = RuleParseError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<BranchRule> for String {
    fn from(rule: BranchRule) -> Self {
        rule.to_string()
    }
}

/// Translate a wildcard pattern into an anchored regex.
fn compile(rule: &str, pattern: &str) -> Result<(Regex, bool), RuleParseError> {
    let mut source = String::with_capacity(pattern.len() + 8);
    source.push('^');

    let mut open = false;
    let mut groups = 0usize;
    for c in pattern.chars() {
        match c {
            '(' => {
                if open {
                    return Err(RuleParseError::UnbalancedGroup {
                        rule: rule.to_string(),
                    });
                }
                if groups == 1 {
                    return Err(RuleParseError::MultipleGroups {
                        rule: rule.to_string(),
                    });
                }
                open = true;
                groups += 1;
                source.push('(');
            }
            ')' => {
                if !open {
                    return Err(RuleParseError::UnbalancedGroup {
                        rule: rule.to_string(),
                    });
                }
                open = false;
                source.push(')');
            }
            '*' => source.push_str(".*"),
            other => source.push_str(&regex::escape(other.encode_utf8(&mut [0u8; 4]))),
        }
    }
    if open {
        return Err(RuleParseError::UnbalancedGroup {
            rule: rule.to_string(),
        });
    }
    source.push('$');

    let matcher = Regex::new(&source).map_err(|e| RuleParseError::InvalidPattern {
        rule: rule.to_string(),
        reason: e.to_string(),
    })?;
    Ok((matcher, groups == 1))
}

/// Ordered list of branch rules.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RulesRepr", into = "Vec<BranchRule>")]
pub struct BranchSpec {
    rules: Vec<BranchRule>,
}

impl TryFrom<RulesRepr> for BranchSpec {
    type Error = RuleParseError;

    fn try_from(repr: RulesRepr) -> Result<Self, Self::Error> {
        let rules = repr
            .into_lines()
            .iter()
            .map(|line| BranchRule::parse(line))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { rules })
    }
}

impl From<BranchSpec> for Vec<BranchRule> {
    fn from(spec: BranchSpec) -> Self {
        spec.rules
    }
}

impl BranchSpec {
    pub fn new(rules: Vec<BranchRule>) -> Self {
        Self { rules }
    }

    /// Parse a block with one rule per non-blank line.
    pub fn parse_block(block: &str) -> Result<Self, RuleParseError> {
        let rules = block_lines(block)
            .map(BranchRule::parse)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { rules })
    }

    pub fn rules(&self) -> &[BranchRule] {
        &self.rules
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Whether the ref is monitored.
    pub fn matches(&self, ref_name: &str) -> bool {
        self.logical_branch(ref_name).is_some()
    }

    /// Logical branch name of a monitored ref, `None` when not monitored.
    pub fn logical_branch(&self, ref_name: &str) -> Option<String> {
        let excluded = self
            .rules
            .iter()
            .any(|r| r.kind == RuleKind::Exclude && r.is_match(ref_name));
        if excluded {
            return None;
        }
        self.rules
            .iter()
            .filter(|r| r.kind == RuleKind::Include)
            .find_map(|r| r.logical_name(ref_name))
    }
}

impl fmt::Display for BranchSpec {
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

impl FromStr for BranchSpec {
    type Err = RuleParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse_block(s)
    }
}
