//! Per-unit scan pipeline.
//!
//! A unit moves through a fixed sequence of states:
//!
//! ```text
//! Pending -> ArtifactGenerated -> ScanCompleted -> Parsed
//!        \-> ArtifactFailed   \-> ScanFailed   \-> ParseFailed
//! ```
//!
//! Any step may also end in `Cancelled` when the run is cancelled while the
//! unit is in flight, or in `Aborted` when the task running it dies. A failed
//! step skips every step that depends on it, and only a unit that reaches
//! `Parsed` is written to the [`ResultStore`]. If the store refuses the write
//! the unit ends in `StoreRejected`.

use crate::error::UnitError;
use crate::model::{SbomArtifact, VulnerabilityFinding, WorkloadUnit};
use crate::parser::ReportParser;
use crate::store::ResultStore;
use crate::tools::{ArtifactGenerator, VulnerabilityScanner};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PipelineState {
    Pending,
    ArtifactGenerated,
    ArtifactFailed,
    ScanCompleted,
    ScanFailed,
    Parsed,
    ParseFailed,
    /// Parsed, but the store refused the results.
    StoreRejected,
    Cancelled,
    /// The pipeline task itself died (panic or abort).
    Aborted,
}

impl PipelineState {
    pub fn is_terminal(&self) -> bool {
        !matches!(
            self,
            PipelineState::Pending | PipelineState::ArtifactGenerated | PipelineState::ScanCompleted
        )
    }

    pub fn is_success(&self) -> bool {
        *self == PipelineState::Parsed
    }

    pub fn label(&self) -> &str {
        match self {
            PipelineState::Pending => "pending",
            PipelineState::ArtifactGenerated => "artifact generated",
            PipelineState::ArtifactFailed => "SBOM generation failed",
            PipelineState::ScanCompleted => "scan completed",
            PipelineState::ScanFailed => "vulnerability scan failed",
            PipelineState::Parsed => "ok",
            PipelineState::ParseFailed => "report parse failed",
            PipelineState::StoreRejected => "results rejected by store",
            PipelineState::Cancelled => "cancelled",
            PipelineState::Aborted => "aborted",
        }
    }
}

/// A pipeline state together with the data produced so far.
#[derive(Debug)]
pub enum Step {
    Pending,
    ArtifactGenerated {
        artifact: SbomArtifact,
    },
    ScanCompleted {
        artifact: SbomArtifact,
        raw_report: Vec<u8>,
    },
    Parsed {
        artifact: SbomArtifact,
        findings: Vec<VulnerabilityFinding>,
    },
    Failed {
        state: PipelineState,
        error: UnitError,
    },
}

impl Step {
    pub fn state(&self) -> PipelineState {
        match self {
            Step::Pending => PipelineState::Pending,
            Step::ArtifactGenerated { .. } => PipelineState::ArtifactGenerated,
            Step::ScanCompleted { .. } => PipelineState::ScanCompleted,
            Step::Parsed { .. } => PipelineState::Parsed,
            Step::Failed { state, .. } => *state,
        }
    }

    fn failed(state: PipelineState, error: UnitError) -> Self {
        let state = if matches!(error, UnitError::Cancelled) {
            PipelineState::Cancelled
        } else {
            state
        };
        Step::Failed { state, error }
    }
}

/// Terminal record of one unit's pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UnitOutcome {
    pub unit: WorkloadUnit,
    pub state: PipelineState,
    pub error: Option<String>,
    pub finding_count: usize,
    pub finished_at: DateTime<Utc>,
}

impl UnitOutcome {
    pub fn succeeded(&self) -> bool {
        self.state.is_success() && self.error.is_none()
    }
}

/// The external collaborators a pipeline drives.
#[derive(Clone)]
pub struct Toolchain {
    pub generator: Arc<dyn ArtifactGenerator>,
    pub scanner: Arc<dyn VulnerabilityScanner>,
    pub parser: Arc<dyn ReportParser>,
}

impl Toolchain {
    pub fn new(
        generator: Arc<dyn ArtifactGenerator>,
        scanner: Arc<dyn VulnerabilityScanner>,
        parser: Arc<dyn ReportParser>,
    ) -> Self {
        Self {
            generator,
            scanner,
            parser,
        }
    }
}

pub struct UnitPipeline {
    unit: WorkloadUnit,
    tools: Toolchain,
}

impl UnitPipeline {
    pub fn new(unit: WorkloadUnit, tools: Toolchain) -> Self {
        Self { unit, tools }
    }

    pub fn unit(&self) -> &WorkloadUnit {
        &self.unit
    }

    /// Perform the single transition out of `step`. Terminal steps are
    /// returned unchanged.
    pub async fn advance(&self, step: Step, cancel: &CancellationToken) -> Step {
        if !step.state().is_terminal() && cancel.is_cancelled() {
            return Step::failed(PipelineState::Cancelled, UnitError::Cancelled);
        }

        let image = self.unit.image_ref.as_str();
        match step {
            Step::Pending => {
                info!("Generating SBOM for container {}", self.unit);
                match self.tools.generator.generate(image, cancel).await {
                    Ok(artifact) => Step::ArtifactGenerated { artifact },
                    Err(error) => Step::failed(PipelineState::ArtifactFailed, error),
                }
            }
            Step::ArtifactGenerated { artifact } => {
                info!("Scanning for CVEs in container {}", self.unit);
                match self.tools.scanner.scan(image, cancel).await {
                    Ok(raw_report) => Step::ScanCompleted {
                        artifact,
                        raw_report,
                    },
                    Err(error) => Step::failed(PipelineState::ScanFailed, error),
                }
            }
            Step::ScanCompleted {
                artifact,
                raw_report,
            } => match self.tools.parser.parse(&raw_report) {
                Ok(findings) => Step::Parsed { artifact, findings },
                Err(error) => Step::failed(PipelineState::ParseFailed, error),
            },
            terminal => terminal,
        }
    }

    /// Drive the unit to a terminal state, commit on success and record the
    /// outcome. Never returns an error: failures end up in the outcome.
    pub async fn run(self, store: &ResultStore, cancel: &CancellationToken) -> UnitOutcome {
        let mut step = Step::Pending;
        while !step.state().is_terminal() {
            step = self.advance(step, cancel).await;
        }

        let mut state = step.state();
        let (finding_count, error) = match step {
            Step::Parsed { artifact, findings } => {
                let count = findings.len();
                match store.commit(&self.unit.id, artifact, findings) {
                    Ok(()) => {
                        info!(
                            "Container {} scanned: {} vulnerabilities",
                            self.unit, count
                        );
                        (count, None)
                    }
                    Err(e) => {
                        warn!("Discarding results for container {}: {}", self.unit, e);
                        state = PipelineState::StoreRejected;
                        (0, Some(e.to_string()))
                    }
                }
            }
            Step::Failed { error, .. } => {
                warn!(
                    "Container {} stopped at '{}': {}",
                    self.unit,
                    state.label(),
                    error
                );
                (0, Some(error.to_string()))
            }
            _ => (0, None),
        };

        let outcome = UnitOutcome {
            unit: self.unit,
            state,
            error,
            finding_count,
            finished_at: Utc::now(),
        };
        store.record_outcome(outcome.clone());
        outcome
    }
}
