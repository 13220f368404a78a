use crate::model::{SbomArtifact, Severity, VulnerabilityFinding};
use crate::pipeline::UnitOutcome;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;

pub const COMPLETION_TITLE: &str = "Scan Complete";
pub const COMPLETION_MESSAGE: &str = "SBOM and CVE scanning completed for all running containers";

/// Counters for one orchestration run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RunStats {
    pub total: usize,
    pub dispatched: usize,
    pub succeeded: usize,
    pub failed: usize,
    /// Units never dispatched because the run was cancelled first.
    pub not_started: usize,
    /// Highest number of pipelines observed executing at once.
    pub peak_in_flight: usize,
    pub cancelled: bool,
}

/// Aggregated output of a completed run.
#[derive(Debug, Clone, Serialize)]
pub struct ScanResults {
    #[serde(skip)]
    pub sboms: BTreeMap<String, SbomArtifact>,
    pub findings: BTreeMap<String, Vec<VulnerabilityFinding>>,
    pub outcomes: Vec<UnitOutcome>,
    pub stats: RunStats,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl ScanResults {
    pub fn failed_outcomes(&self) -> impl Iterator<Item = &UnitOutcome> {
        self.outcomes.iter().filter(|o| !o.succeeded())
    }

    pub fn total_findings(&self) -> usize {
        self.findings.values().map(Vec::len).sum()
    }

    pub fn count_by_severity(&self, severity: Severity) -> usize {
        self.findings
            .values()
            .flatten()
            .filter(|f| f.severity == severity)
            .count()
    }

    pub fn duration_secs(&self) -> f64 {
        (self.finished_at - self.started_at).num_milliseconds() as f64 / 1000.0
    }
}

pub fn unit_notification_title(unit_id: &str) -> String {
    format!("CVE Scan Results for Container {}", unit_id)
}

/// Plain-text notification body listing a unit's findings in scanner order.
pub fn unit_notification_message(unit_id: &str, findings: &[VulnerabilityFinding]) -> String {
    let mut message = format!("CVE Report for container {}:", unit_id);
    if findings.is_empty() {
        message.push_str("\nNo vulnerabilities found.");
        return message;
    }
    for f in findings {
        message.push_str(&format!(
            "\n{} [{}] {} {} -> {} ({})",
            f.cve_id,
            f.severity.symbol(),
            if f.package.is_empty() { "-" } else { f.package.as_str() },
            f.current_version,
            f.fixed_display(),
            f.path
        ));
    }
    message
}

#[cfg(test)]
mod tests {
    use super::*;

    fn finding(cve: &str, severity: Severity, fixed: Option<&str>) -> VulnerabilityFinding {
        VulnerabilityFinding {
            cve_id: cve.to_string(),
            severity,
            package: "libxyz".to_string(),
            current_version: "1.0.0".to_string(),
            fixed_version: fixed.map(str::to_string),
            path: "/usr/lib/libxyz.so".to_string(),
        }
    }

    #[test]
    fn test_unit_message_lists_findings_in_order() {
        let findings = vec![
            finding("CVE-2021-12345", Severity::Critical, Some("1.0.1")),
            finding("CVE-2020-00001", Severity::Low, None),
        ];
        let message = unit_notification_message("12345", &findings);
        let lines: Vec<_> = message.lines().collect();

        assert_eq!(lines[0], "CVE Report for container 12345:");
        assert_eq!(
            lines[1],
            "CVE-2021-12345 [CRITICAL] libxyz 1.0.0 -> 1.0.1 (/usr/lib/libxyz.so)"
        );
        assert!(lines[2].starts_with("CVE-2020-00001 [LOW]"));
        assert!(lines[2].contains("-> -"));
    }

    #[test]
    fn test_unit_message_without_findings() {
        let message = unit_notification_message("67890", &[]);
        assert!(message.contains("No vulnerabilities found."));
        assert_eq!(
            unit_notification_title("67890"),
            "CVE Scan Results for Container 67890"
        );
    }

    #[test]
    fn test_severity_counts() {
        let mut findings = BTreeMap::new();
        findings.insert(
            "a".to_string(),
            vec![
                finding("CVE-1", Severity::Critical, None),
                finding("CVE-2", Severity::High, None),
            ],
        );
        findings.insert("b".to_string(), vec![finding("CVE-3", Severity::Critical, None)]);
        let now = Utc::now();
        let results = ScanResults {
            sboms: BTreeMap::new(),
            findings,
            outcomes: Vec::new(),
            stats: RunStats::default(),
            started_at: now,
            finished_at: now,
        };

        assert_eq!(results.total_findings(), 3);
        assert_eq!(results.count_by_severity(Severity::Critical), 2);
        assert_eq!(results.count_by_severity(Severity::Medium), 0);
    }
}
