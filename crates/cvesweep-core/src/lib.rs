pub mod config;
pub mod enumerator;
pub mod error;
pub mod exec;
pub mod model;
pub mod notify;
pub mod orchestrator;
pub mod parser;
pub mod pipeline;
pub mod report;
pub mod store;
pub mod tools;

pub use config::Config;
pub use enumerator::{ContainerLister, DockerLister, Enumerator};
pub use error::{ConfigError, EnumerationError, NotificationError, UnitError};
pub use exec::{CommandExecutor, ProcessExecutor};
pub use model::{SbomArtifact, Severity, VulnerabilityFinding, WorkloadUnit};
pub use notify::{NotificationService, NotificationSink, NtfyClient};
pub use orchestrator::{cancel_after, Orchestrator, OrchestratorConfig};
pub use parser::{GrypeReportParser, ReportParser};
pub use pipeline::{PipelineState, Toolchain, UnitOutcome, UnitPipeline};
pub use report::{RunStats, ScanResults};
pub use store::ResultStore;
pub use tools::{ArtifactGenerator, GrypeScanner, SyftGenerator, VulnerabilityScanner};

use std::sync::Arc;

/// Wire the real process-backed adapters from configuration.
pub fn docker_toolchain(
    executor: Arc<dyn CommandExecutor>,
    scan: &config::ScanConfig,
) -> (Enumerator, Toolchain) {
    let enumerator = Enumerator::new(Arc::new(DockerLister::new(
        Arc::clone(&executor),
        scan.docker_bin.clone(),
    )));
    let tools = Toolchain::new(
        Arc::new(SyftGenerator::new(Arc::clone(&executor), scan.syft_bin.clone())),
        Arc::new(GrypeScanner::new(executor, scan.grype_bin.clone())),
        Arc::new(GrypeReportParser),
    );
    (enumerator, tools)
}
