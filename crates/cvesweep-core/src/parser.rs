//! Vulnerability report parsing.

use crate::error::UnitError;
use crate::model::{Severity, VulnerabilityFinding};
use serde::Deserialize;

pub trait ReportParser: Send + Sync {
    /// Findings in the order the scanner reported them.
    fn parse(&self, raw: &[u8]) -> Result<Vec<VulnerabilityFinding>, UnitError>;
}

/// Parser for `grype -o json` output.
#[derive(Debug, Default, Clone)]
pub struct GrypeReportParser;

#[derive(Debug, Deserialize)]
struct GrypeReport {
    #[serde(default)]
    matches: Vec<GrypeMatch>,
}

#[derive(Debug, Deserialize)]
struct GrypeMatch {
    vulnerability: GrypeVulnerability,
    artifact: GrypeArtifact,
    #[serde(default)]
    fix: GrypeFix,
}

#[derive(Debug, Deserialize)]
struct GrypeVulnerability {
    id: String,
    #[serde(default)]
    severity: String,
}

#[derive(Debug, Deserialize)]
struct GrypeArtifact {
    #[serde(default)]
    name: String,
    #[serde(default)]
    version: String,
    #[serde(default)]
    locations: Vec<GrypeLocation>,
}

#[derive(Debug, Deserialize)]
struct GrypeLocation {
    path: String,
}

#[derive(Debug, Default, Deserialize)]
struct GrypeFix {
    #[serde(default)]
    versions: Vec<String>,
}

impl ReportParser for GrypeReportParser {
    fn parse(&self, raw: &[u8]) -> Result<Vec<VulnerabilityFinding>, UnitError> {
        let report: GrypeReport = serde_json::from_slice(raw)?;

        report
            .matches
            .into_iter()
            .enumerate()
            .map(|(idx, m)| -> Result<VulnerabilityFinding, UnitError> {
                let path = m
                    .artifact
                    .locations
                    .into_iter()
                    .next()
                    .map(|loc| loc.path)
                    .ok_or_else(|| {
                        UnitError::Parse(format!(
                            "match {} ({}) has no artifact locations",
                            idx, m.vulnerability.id
                        ))
                    })?;

                Ok(VulnerabilityFinding {
                    cve_id: m.vulnerability.id,
                    severity: Severity::parse(&m.vulnerability.severity),
                    package: m.artifact.name,
                    current_version: m.artifact.version,
                    fixed_version: m.fix.versions.into_iter().next(),
                    path,
                })
            })
            .collect()
    }
}
