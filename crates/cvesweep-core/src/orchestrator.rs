//! Bounded fan-out of unit pipelines.

use crate::error::ConfigError;
use crate::model::WorkloadUnit;
use crate::pipeline::{PipelineState, Toolchain, UnitOutcome, UnitPipeline};
use crate::report::{RunStats, ScanResults};
use crate::store::ResultStore;
use chrono::Utc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::task::{JoinHandle, JoinSet};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

pub const DEFAULT_CONCURRENCY: usize = 5;
pub const DEFAULT_DEADLINE: Duration = Duration::from_secs(600);

#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    /// Maximum number of pipelines executing at once.
    pub concurrency: usize,
    /// Wall-clock budget for the whole run.
    pub deadline: Duration,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            concurrency: DEFAULT_CONCURRENCY,
            deadline: DEFAULT_DEADLINE,
        }
    }
}

/// Tracks pipelines currently executing and the highest count seen.
#[derive(Debug, Default)]
struct AdmissionCounter {
    current: AtomicUsize,
    peak: AtomicUsize,
}

impl AdmissionCounter {
    fn enter(self: &Arc<Self>) -> AdmissionGuard {
        let now = self.current.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        AdmissionGuard(Arc::clone(self))
    }

    fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }
}

struct AdmissionGuard(Arc<AdmissionCounter>);

impl Drop for AdmissionGuard {
    fn drop(&mut self) {
        self.0.current.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Aborts the wrapped task when dropped, so no work outlives its owner.
struct AbortOnDrop<T>(JoinHandle<T>);

impl<T> Drop for AbortOnDrop<T> {
    fn drop(&mut self) {
        self.0.abort();
    }
}

/// Cancel `token` once `deadline` has elapsed.
///
/// Callers that also need the deadline to cover work before a run (such as
/// listing containers) start this on the parent token.
pub fn cancel_after(token: CancellationToken, deadline: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        tokio::select! {
            _ = token.cancelled() => {}
            _ = tokio::time::sleep(deadline) => {
                warn!("Deadline of {:?} reached, cancelling", deadline);
                token.cancel();
            }
        }
    })
}

pub struct Orchestrator {
    tools: Toolchain,
    config: OrchestratorConfig,
}

impl Orchestrator {
    pub fn new(tools: Toolchain, config: OrchestratorConfig) -> Result<Self, ConfigError> {
        if config.concurrency == 0 {
            return Err(ConfigError::Invalid(
                "scan concurrency must be at least 1".to_string(),
            ));
        }
        if config.deadline.is_zero() {
            return Err(ConfigError::Invalid(
                "scan deadline must be greater than zero".to_string(),
            ));
        }
        Ok(Self { tools, config })
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    pub async fn run(&self, units: Vec<WorkloadUnit>) -> ScanResults {
        self.run_with_cancel(units, CancellationToken::new()).await
    }

    /// Scan every unit with at most `concurrency` pipelines in flight.
    ///
    /// Returns once every dispatched pipeline has reached a terminal state.
    /// Cancelling `cancel` (or hitting the deadline) stops dispatch, asks
    /// in-flight tool invocations to terminate and keeps results that were
    /// already committed.
    pub async fn run_with_cancel(
        &self,
        units: Vec<WorkloadUnit>,
        cancel: CancellationToken,
    ) -> ScanResults {
        let started_at = Utc::now();
        let total = units.len();
        let run_token = cancel.child_token();
        // Dropping this future mid-run cancels everything it started.
        let _cancel_on_drop = run_token.clone().drop_guard();
        let _watchdog = AbortOnDrop(cancel_after(run_token.clone(), self.config.deadline));

        info!(
            "Scanning {} containers with concurrency {}",
            total, self.config.concurrency
        );

        let store = Arc::new(ResultStore::new());
        let permits = Arc::new(Semaphore::new(self.config.concurrency));
        let admission = Arc::new(AdmissionCounter::default());
        let mut tasks = JoinSet::new();
        let mut dispatched = 0;

        for unit in units {
            let permit = tokio::select! {
                biased;
                _ = run_token.cancelled() => break,
                permit = Arc::clone(&permits).acquire_owned() => match permit {
                    Ok(permit) => permit,
                    Err(_) => break,
                },
            };
            if run_token.is_cancelled() {
                break;
            }

            dispatched += 1;
            debug!("Dispatching container {}", unit);

            let pipeline = UnitPipeline::new(unit.clone(), self.tools.clone());
            let store = Arc::clone(&store);
            let token = run_token.clone();
            let admission = Arc::clone(&admission);

            tasks.spawn(async move {
                let _permit = permit;
                let _admitted = admission.enter();

                // Inner task so a panicking pipeline is reported as this unit's failure.
                let inner_store = Arc::clone(&store);
                let mut inner = AbortOnDrop(tokio::spawn(async move {
                    pipeline.run(&inner_store, &token).await
                }));
                let joined = (&mut inner.0).await;

                match joined {
                    Ok(outcome) => outcome,
                    Err(e) => {
                        error!("Pipeline for container {} aborted: {}", unit, e);
                        let outcome = UnitOutcome {
                            unit,
                            state: PipelineState::Aborted,
                            error: Some(e.to_string()),
                            finding_count: 0,
                            finished_at: Utc::now(),
                        };
                        store.record_outcome(outcome.clone());
                        outcome
                    }
                }
            });
        }

        let mut stats = RunStats {
            total,
            dispatched,
            not_started: total - dispatched,
            ..RunStats::default()
        };

        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(outcome) if outcome.succeeded() => stats.succeeded += 1,
                Ok(_) => stats.failed += 1,
                Err(e) => {
                    error!("Scan task failed to complete: {}", e);
                    stats.failed += 1;
                }
            }
        }

        stats.peak_in_flight = admission.peak();
        stats.cancelled = run_token.is_cancelled();
        if stats.not_started > 0 {
            warn!(
                "Run cancelled: {} containers were never scanned",
                stats.not_started
            );
        }

        // Every task has been joined, so this is the last reference.
        let snapshot = match Arc::try_unwrap(store) {
            Ok(store) => store.into_results(),
            Err(shared) => shared.snapshot(),
        };

        info!(
            "Scan finished: {} succeeded, {} failed, {} not started",
            stats.succeeded, stats.failed, stats.not_started
        );

        ScanResults {
            sboms: snapshot.sboms,
            findings: snapshot.findings,
            outcomes: snapshot.outcomes,
            stats,
            started_at,
            finished_at: Utc::now(),
        }
    }
}
