use serde::{Deserialize, Serialize};
use std::fmt;

/// One running container to scan. Identity is `id`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct WorkloadUnit {
    pub id: String,
    pub image_ref: String,
}

impl WorkloadUnit {
    pub fn new(id: impl Into<String>, image_ref: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            image_ref: image_ref.into(),
        }
    }
}

impl fmt::Display for WorkloadUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.id, self.image_ref)
    }
}

/// Opaque SBOM document produced by the artifact generator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SbomArtifact(Vec<u8>);

impl SbomArtifact {
    pub fn new(bytes: impl Into<Vec<u8>>) -> Self {
        Self(bytes.into())
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Lossy UTF-8 view for printing.
    pub fn to_text(&self) -> String {
        String::from_utf8_lossy(&self.0).into_owned()
    }
}

/// Severity as reported by the vulnerability scanner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Severity {
    Unknown,
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    /// Case-insensitive parse. Anything unrecognised (grype's "Negligible"
    /// included) is `Unknown`.
    pub fn parse(value: &str) -> Self {
        match value.trim().to_lowercase().as_str() {
            "critical" => Severity::Critical,
            "high" => Severity::High,
            "medium" => Severity::Medium,
            "low" => Severity::Low,
            _ => Severity::Unknown,
        }
    }

    pub fn priority(&self) -> u8 {
        match self {
            Severity::Critical => 5,
            Severity::High => 4,
            Severity::Medium => 3,
            Severity::Low => 2,
            Severity::Unknown => 1,
        }
    }

    pub fn symbol(&self) -> &str {
        match self {
            Severity::Critical => "CRITICAL",
            Severity::High => "HIGH",
            Severity::Medium => "MEDIUM",
            Severity::Low => "LOW",
            Severity::Unknown => "UNKNOWN",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}

/// A single vulnerability match for one unit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VulnerabilityFinding {
    pub cve_id: String,
    pub severity: Severity,
    pub package: String,
    pub current_version: String,
    pub fixed_version: Option<String>,
    pub path: String,
}

impl VulnerabilityFinding {
    pub fn fixed_display(&self) -> &str {
        self.fixed_version.as_deref().unwrap_or("-")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_severity_parse_is_case_insensitive() {
        assert_eq!(Severity::parse("Critical"), Severity::Critical);
        assert_eq!(Severity::parse("HIGH"), Severity::High);
        assert_eq!(Severity::parse(" medium "), Severity::Medium);
        assert_eq!(Severity::parse("low"), Severity::Low);
    }

    #[test]
    fn test_severity_parse_unrecognised_is_unknown() {
        assert_eq!(Severity::parse("Negligible"), Severity::Unknown);
        assert_eq!(Severity::parse(""), Severity::Unknown);
        assert!(Severity::Critical.priority() > Severity::Unknown.priority());
    }

    #[test]
    fn test_artifact_text_view() {
        let artifact = SbomArtifact::new(b"{\"sbom\": \"nginx-sbom\"}".to_vec());
        assert_eq!(artifact.len(), 22);
        assert!(artifact.to_text().contains("nginx-sbom"));
    }

    #[test]
    fn test_unit_display() {
        let unit = WorkloadUnit::new("12345", "nginx");
        assert_eq!(unit.to_string(), "12345 (nginx)");
    }
}
