//! SBOM generation and vulnerability scanning adapters.

use crate::error::UnitError;
use crate::exec::CommandExecutor;
use crate::model::SbomArtifact;
use async_trait::async_trait;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

#[async_trait]
pub trait ArtifactGenerator: Send + Sync {
    async fn generate(
        &self,
        image_ref: &str,
        cancel: &CancellationToken,
    ) -> Result<SbomArtifact, UnitError>;
}

/// Returns the scanner's raw report; parsing is a separate step.
#[async_trait]
pub trait VulnerabilityScanner: Send + Sync {
    async fn scan(&self, image_ref: &str, cancel: &CancellationToken)
        -> Result<Vec<u8>, UnitError>;
}

/// `syft <image> -o json`
pub struct SyftGenerator {
    executor: Arc<dyn CommandExecutor>,
    syft_bin: String,
}

impl SyftGenerator {
    pub fn new(executor: Arc<dyn CommandExecutor>, syft_bin: impl Into<String>) -> Self {
        Self {
            executor,
            syft_bin: syft_bin.into(),
        }
    }
}

#[async_trait]
impl ArtifactGenerator for SyftGenerator {
    async fn generate(
        &self,
        image_ref: &str,
        cancel: &CancellationToken,
    ) -> Result<SbomArtifact, UnitError> {
        let output = self
            .executor
            .exec(&self.syft_bin, &json_args(image_ref), cancel)
            .await
            .map_err(UnitError::artifact)?;
        Ok(SbomArtifact::new(output))
    }
}

/// `grype <image> -o json`
pub struct GrypeScanner {
    executor: Arc<dyn CommandExecutor>,
    grype_bin: String,
}

impl GrypeScanner {
    pub fn new(executor: Arc<dyn CommandExecutor>, grype_bin: impl Into<String>) -> Self {
        Self {
            executor,
            grype_bin: grype_bin.into(),
        }
    }
}

#[async_trait]
impl VulnerabilityScanner for GrypeScanner {
    async fn scan(
        &self,
        image_ref: &str,
        cancel: &CancellationToken,
    ) -> Result<Vec<u8>, UnitError> {
        self.executor
            .exec(&self.grype_bin, &json_args(image_ref), cancel)
            .await
            .map_err(UnitError::scan)
    }
}

fn json_args(image_ref: &str) -> Vec<String> {
    vec![image_ref.to_string(), "-o".to_string(), "json".to_string()]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exec::scripted::ScriptedExecutor;

    fn executor() -> Arc<ScriptedExecutor> {
        Arc::new(
            ScriptedExecutor::default()
                .output("syft nginx -o json", r#"{"sbom": "nginx-sbom"}"#)
                .output("syft redis -o json", r#"{"sbom": "redis-sbom"}"#)
                .output("grype nginx -o json", r#"{"matches": []}"#)
                .fail("grype redis -o json"),
        )
    }

    #[tokio::test]
    async fn test_generate_sbom() {
        let generator = SyftGenerator::new(executor(), "syft");
        let cancel = CancellationToken::new();

        let sbom = generator.generate("nginx", &cancel).await.unwrap();
        assert!(sbom.to_text().contains("nginx-sbom"));

        let sbom = generator.generate("redis", &cancel).await.unwrap();
        assert!(sbom.to_text().contains("redis-sbom"));
    }

    #[tokio::test]
    async fn test_generate_failure_is_artifact_error() {
        let generator = SyftGenerator::new(executor(), "syft");
        let err = generator
            .generate("postgres", &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, UnitError::Artifact(_)));
    }

    #[tokio::test]
    async fn test_scan_failure_is_scan_error() {
        let scanner = GrypeScanner::new(executor(), "grype");
        let cancel = CancellationToken::new();

        assert!(scanner.scan("nginx", &cancel).await.is_ok());
        let err = scanner.scan("redis", &cancel).await.unwrap_err();
        assert!(matches!(err, UnitError::Scan(_)));
    }

    #[tokio::test]
    async fn test_cancelled_scan_maps_to_cancelled() {
        let scanner = GrypeScanner::new(executor(), "grype");
        let cancel = CancellationToken::new();
        cancel.cancel();
        let err = scanner.scan("nginx", &cancel).await.unwrap_err();
        assert!(matches!(err, UnitError::Cancelled));
    }

    #[tokio::test]
    async fn test_custom_binary_name() {
        let executor = Arc::new(
            ScriptedExecutor::default().output("/opt/bin/syft alpine -o json", "{}"),
        );
        let generator = SyftGenerator::new(executor, "/opt/bin/syft");
        let sbom = generator
            .generate("alpine", &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(sbom.as_bytes(), b"{}");
    }
}
