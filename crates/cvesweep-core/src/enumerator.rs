//! Listing of running workload units.

use crate::error::EnumerationError;
use crate::exec::CommandExecutor;
use crate::model::WorkloadUnit;
use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Produces raw `"<id> <image>"` records, one per running unit, in order.
#[async_trait]
pub trait ContainerLister: Send + Sync {
    async fn list(&self, cancel: &CancellationToken) -> Result<Vec<String>, EnumerationError>;
}

/// Lists running containers through `docker ps`.
pub struct DockerLister {
    executor: Arc<dyn CommandExecutor>,
    docker_bin: String,
}

impl DockerLister {
    pub fn new(executor: Arc<dyn CommandExecutor>, docker_bin: impl Into<String>) -> Self {
        Self {
            executor,
            docker_bin: docker_bin.into(),
        }
    }

    fn args() -> Vec<String> {
        vec![
            "ps".to_string(),
            "--format".to_string(),
            "{{.ID}} {{.Image}}".to_string(),
        ]
    }
}

#[async_trait]
impl ContainerLister for DockerLister {
    async fn list(&self, cancel: &CancellationToken) -> Result<Vec<String>, EnumerationError> {
        let output = self
            .executor
            .exec(&self.docker_bin, &Self::args(), cancel)
            .await?;
        Ok(String::from_utf8_lossy(&output)
            .lines()
            .map(str::to_string)
            .collect())
    }
}

/// Turns lister records into validated [`WorkloadUnit`]s.
pub struct Enumerator {
    lister: Arc<dyn ContainerLister>,
}

impl Enumerator {
    pub fn new(lister: Arc<dyn ContainerLister>) -> Self {
        Self { lister }
    }

    /// List units to scan. An empty listing is an error, not an empty run.
    pub async fn list(
        &self,
        cancel: &CancellationToken,
    ) -> Result<Vec<WorkloadUnit>, EnumerationError> {
        let records = self.lister.list(cancel).await?;
        let units = parse_records(&records)?;
        if units.is_empty() {
            return Err(EnumerationError::Empty);
        }
        info!("Found {} running containers", units.len());
        Ok(units)
    }
}

/// Parse `"<id> <image>"` records. Blank records are skipped; anything that is
/// not exactly two tokens is rejected.
pub fn parse_records<I, S>(records: I) -> Result<Vec<WorkloadUnit>, EnumerationError>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut units = Vec::new();
    let mut seen = HashSet::new();

    for (idx, record) in records.into_iter().enumerate() {
        let record = record.as_ref().trim();
        if record.is_empty() {
            continue;
        }

        let mut tokens = record.split_whitespace();
        let unit = match (tokens.next(), tokens.next(), tokens.next()) {
            (Some(id), Some(image), None) => WorkloadUnit::new(id, image),
            _ => {
                return Err(EnumerationError::MalformedRecord {
                    line: idx + 1,
                    record: record.to_string(),
                })
            }
        };

        if !seen.insert(unit.id.clone()) {
            return Err(EnumerationError::DuplicateUnit(unit.id));
        }
        debug!("Enumerated container {}", unit);
        units.push(unit);
    }

    Ok(units)
}
