//! Build features.
//!
//! Known kinds get a typed variant; anything else is carried as an opaque
//! `kind + params` mapping. The wire form is always
//! `{ "type": <kind>, "params": { ... } }`.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::FeatureError;
use crate::rules::ArtifactRules;

/// Kind string of the test report ingestion feature.
pub const XML_REPORT_KIND: &str = "xml-report-plugin";
/// Report format parameter.
pub const REPORT_TYPE_PARAM: &str = "xmlReportParsing.reportType";
/// Report location parameter, a rule block.
pub const REPORT_DIRS_PARAM: &str = "xmlReportParsing.reportDirs";

/// Supported test report formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReportType {
    Junit,
    Surefire,
    Testng,
    Nunit,
    Mstest,
    Vstest,
    Ctest,
    Gtest,
    Checkstyle,
    Pmd,
}

impl ReportType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReportType::Junit => "junit",
            ReportType::Surefire => "surefire",
            ReportType::Testng => "testng",
            ReportType::Nunit => "nunit",
            ReportType::Mstest => "mstest",
            ReportType::Vstest => "vstest",
            ReportType::Ctest => "ctest",
            ReportType::Gtest => "gtest",
            ReportType::Checkstyle => "checkstyle",
            ReportType::Pmd => "pmd",
        }
    }
}

impl fmt::Display for ReportType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ReportType {
    type Err = FeatureError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "junit" => Ok(ReportType::Junit),
            "surefire" => Ok(ReportType::Surefire),
            "testng" => Ok(ReportType::Testng),
            "nunit" => Ok(ReportType::Nunit),
            "mstest" => Ok(ReportType::Mstest),
            "vstest" => Ok(ReportType::Vstest),
            "ctest" => Ok(ReportType::Ctest),
            "gtest" => Ok(ReportType::Gtest),
            "checkstyle" => Ok(ReportType::Checkstyle),
            "pmd" => Ok(ReportType::Pmd),
            other => Err(FeatureError::UnknownReportType {
                value: other.to_string(),
            }),
        }
    }
}

/// Parse test reports found at `report_dirs` after the build steps run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct XmlReportFeature {
    pub report_type: ReportType,
    pub report_dirs: ArtifactRules,
    /// Additional `xmlReportParsing.*` parameters, passed through untouched.
    pub extra: BTreeMap<String, String>,
}

/// A build feature.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawFeature", into = "RawFeature")]
pub enum BuildFeature {
    XmlReport(XmlReportFeature),
    Opaque {
        kind: String,
        params: BTreeMap<String, String>,
    },
}

impl BuildFeature {
    /// Report ingestion with no extra parameters.
    pub fn xml_report(report_type: ReportType, report_dirs: ArtifactRules) -> Self {
        BuildFeature::XmlReport(XmlReportFeature {
            report_type,
            report_dirs,
            extra: BTreeMap::new(),
        })
    }

    pub fn kind(&self) -> &str {
        match self {
            BuildFeature::XmlReport(_) => XML_REPORT_KIND,
            BuildFeature::Opaque { kind, .. } => kind,
        }
    }

    /// Flat parameter map as the server sees it.
    pub fn params(&self) -> BTreeMap<String, String> {
        RawFeature::from(self.clone()).params
    }

    /// Check that the feature survives a trip through its wire form.
    ///
    /// Features decoded from a file always pass. Hand-built ones can carry
    /// empty report dirs, targets, blank kinds or extras that shadow a
    /// reserved parameter.
    pub fn validate(&self) -> Result<(), FeatureError> {
        let reparsed = BuildFeature::try_from(RawFeature::from(self.clone()))?;
        if reparsed != *self {
            return Err(FeatureError::NotCanonical {
                kind: self.kind().to_string(),
            });
        }
        Ok(())
    }
}

/// Wire form of a feature.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawFeature {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub params: BTreeMap<String, String>,
}

impl TryFrom<RawFeature> for BuildFeature {
    type Error = FeatureError;

    fn try_from(raw: RawFeature) -> Result<Self, Self::Error> {
        let kind = raw.kind.trim();
        if kind.is_empty() {
            return Err(FeatureError::EmptyKind);
        }
        if kind != XML_REPORT_KIND {
            return Ok(BuildFeature::Opaque {
                kind: kind.to_string(),
                params: raw.params,
            });
        }

        let mut params = raw.params;
        let report_type = params
            .remove(REPORT_TYPE_PARAM)
            .ok_or_else(|| missing(REPORT_TYPE_PARAM))?
            .parse::<ReportType>()?;
        let dirs = params
            .remove(REPORT_DIRS_PARAM)
            .ok_or_else(|| missing(REPORT_DIRS_PARAM))?;
        let report_dirs =
            ArtifactRules::parse_block(&dirs).map_err(|source| FeatureError::InvalidRule {
                kind: XML_REPORT_KIND.to_string(),
                param: REPORT_DIRS_PARAM.to_string(),
                source,
            })?;
        if report_dirs.is_empty() {
            return Err(missing(REPORT_DIRS_PARAM));
        }
        if let Some(rule) = report_dirs.rules().iter().find(|r| r.target.is_some()) {
            return Err(FeatureError::UnexpectedTarget {
                rule: rule.to_string(),
            });
        }

        Ok(BuildFeature::XmlReport(XmlReportFeature {
            report_type,
            report_dirs,
            extra: params,
        }))
    }
}

impl From<BuildFeature> for RawFeature {
    fn from(feature: BuildFeature) -> Self {
        match feature {
            BuildFeature::XmlReport(report) => {
                let mut params = report.extra;
                params.insert(
                    REPORT_TYPE_PARAM.to_string(),
                    report.report_type.as_str().to_string(),
                );
                params.insert(REPORT_DIRS_PARAM.to_string(), report.report_dirs.to_string());
                RawFeature {
                    kind: XML_REPORT_KIND.to_string(),
                    params,
                }
            }
            BuildFeature::Opaque { kind, params } => RawFeature { kind, params },
        }
    }
}

fn missing(param: &str) -> FeatureError {
    FeatureError::MissingParam {
        kind: XML_REPORT_KIND.to_string(),
        param: param.to_string(),
    }
}
