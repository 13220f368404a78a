//! Synchronized aggregation of per-unit results.

use crate::error::StoreError;
use crate::model::{SbomArtifact, VulnerabilityFinding};
use crate::pipeline::UnitOutcome;
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashSet};

#[derive(Debug, Default)]
struct StoreInner {
    sboms: BTreeMap<String, SbomArtifact>,
    findings: BTreeMap<String, Vec<VulnerabilityFinding>>,
    outcomes: Vec<UnitOutcome>,
    /// Units written through `commit`; their entries are final.
    committed: HashSet<String>,
}

/// Point-in-time copy of the store contents.
#[derive(Debug, Clone, Default)]
pub struct StoreSnapshot {
    pub sboms: BTreeMap<String, SbomArtifact>,
    pub findings: BTreeMap<String, Vec<VulnerabilityFinding>>,
    pub outcomes: Vec<UnitOutcome>,
}

/// Shared result maps for one orchestration run.
///
/// The maps are only reachable through the mutex. Each key is written once;
/// a later write for the same unit is rejected.
#[derive(Debug, Default)]
pub struct ResultStore {
    inner: Mutex<StoreInner>,
}

impl ResultStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put(&self, unit_id: &str, artifact: SbomArtifact) -> Result<(), StoreError> {
        let mut inner = self.inner.lock();
        if inner.sboms.contains_key(unit_id) {
            return Err(StoreError::DuplicateUnit(unit_id.to_string()));
        }
        inner.sboms.insert(unit_id.to_string(), artifact);
        Ok(())
    }

    /// Append to the unit's findings, creating the entry if needed. Order is kept.
    /// A unit that was already committed is rejected.
    pub fn append_findings(
        &self,
        unit_id: &str,
        findings: Vec<VulnerabilityFinding>,
    ) -> Result<(), StoreError> {
        let mut inner = self.inner.lock();
        if inner.committed.contains(unit_id) {
            return Err(StoreError::DuplicateUnit(unit_id.to_string()));
        }
        inner
            .findings
            .entry(unit_id.to_string())
            .or_default()
            .extend(findings);
        Ok(())
    }

    /// Write a unit's artifact and findings under a single lock acquisition,
    /// so readers never see one without the other.
    pub fn commit(
        &self,
        unit_id: &str,
        artifact: SbomArtifact,
        findings: Vec<VulnerabilityFinding>,
    ) -> Result<(), StoreError> {
        let mut inner = self.inner.lock();
        if inner.sboms.contains_key(unit_id) || inner.findings.contains_key(unit_id) {
            return Err(StoreError::DuplicateUnit(unit_id.to_string()));
        }
        inner.sboms.insert(unit_id.to_string(), artifact);
        inner.findings.insert(unit_id.to_string(), findings);
        inner.committed.insert(unit_id.to_string());
        Ok(())
    }

    pub fn record_outcome(&self, outcome: UnitOutcome) {
        self.inner.lock().outcomes.push(outcome);
    }

    pub fn len(&self) -> usize {
        self.inner.lock().sboms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn snapshot(&self) -> StoreSnapshot {
        let inner = self.inner.lock();
        StoreSnapshot {
            sboms: inner.sboms.clone(),
            findings: inner.findings.clone(),
            outcomes: inner.outcomes.clone(),
        }
    }

    /// Consume the store once every writer is done.
    pub fn into_results(self) -> StoreSnapshot {
        let inner = self.inner.into_inner();
        StoreSnapshot {
            sboms: inner.sboms,
            findings: inner.findings,
            outcomes: inner.outcomes,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Severity;
    use std::sync::Arc;

    fn finding(cve: &str) -> VulnerabilityFinding {
        VulnerabilityFinding {
            cve_id: cve.to_string(),
            severity: Severity::High,
            package: "libxyz".to_string(),
            current_version: "1.0".to_string(),
            fixed_version: None,
            path: "/usr/lib/libxyz.so".to_string(),
        }
    }

    #[test]
    fn test_put_rejects_second_write() {
        let store = ResultStore::new();
        store.put("12345", SbomArtifact::new("a")).unwrap();
        let err = store.put("12345", SbomArtifact::new("b")).unwrap_err();
        assert_eq!(err, StoreError::DuplicateUnit("12345".to_string()));
        assert_eq!(store.snapshot().sboms["12345"].as_bytes(), b"a");
    }

    #[test]
    fn test_append_findings_preserves_order() {
        let store = ResultStore::new();
        store
            .append_findings("12345", vec![finding("CVE-1"), finding("CVE-2")])
            .unwrap();
        store.append_findings("12345", vec![finding("CVE-3")]).unwrap();
        let ids: Vec<_> = store.snapshot().findings["12345"]
            .iter()
            .map(|f| f.cve_id.clone())
            .collect();
        assert_eq!(ids, vec!["CVE-1", "CVE-2", "CVE-3"]);
    }

    #[test]
    fn test_commit_writes_both_maps() {
        let store = ResultStore::new();
        store
            .commit("12345", SbomArtifact::new("sbom"), vec![finding("CVE-1")])
            .unwrap();
        let snapshot = store.into_results();
        assert_eq!(snapshot.sboms.len(), 1);
        assert_eq!(snapshot.findings["12345"].len(), 1);
    }

    #[test]
    fn test_commit_rejects_existing_key_in_either_map() {
        let store = ResultStore::new();
        store.append_findings("12345", vec![]).unwrap();
        let err = store
            .commit("12345", SbomArtifact::new("sbom"), vec![])
            .unwrap_err();
        assert!(matches!(err, StoreError::DuplicateUnit(_)));
        assert!(store.is_empty());
    }

    #[test]
    fn test_committed_findings_cannot_be_extended() {
        let store = ResultStore::new();
        store
            .commit("12345", SbomArtifact::new("sbom"), vec![finding("CVE-1")])
            .unwrap();

        let err = store
            .append_findings("12345", vec![finding("CVE-2")])
            .unwrap_err();
        assert_eq!(err, StoreError::DuplicateUnit("12345".to_string()));
        assert_eq!(store.snapshot().findings["12345"].len(), 1);
    }

    #[test]
    fn test_concurrent_commits_are_not_lost() {
        let store = Arc::new(ResultStore::new());
        let handles: Vec<_> = (0..16)
            .map(|t| {
                let store = Arc::clone(&store);
                std::thread::spawn(move || {
                    for i in 0..50 {
                        let id = format!("unit-{t}-{i}");
                        store
                            .commit(&id, SbomArtifact::new(id.clone()), vec![finding("CVE-1")])
                            .unwrap();
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let snapshot = store.snapshot();
        assert_eq!(snapshot.sboms.len(), 800);
        assert_eq!(snapshot.findings.len(), 800);
    }
}
