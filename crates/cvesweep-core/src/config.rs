use crate::error::ConfigError;
use crate::orchestrator::{OrchestratorConfig, DEFAULT_CONCURRENCY};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Configuration loaded from `config.yaml`.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// Notifications are skipped entirely when this section is absent.
    #[serde(default)]
    pub ntfy: Option<NtfyConfig>,

    #[serde(default)]
    pub scan: ScanConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NtfyConfig {
    pub server_url: String,
    pub topic: String,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
    #[serde(default = "default_ntfy_timeout")]
    pub timeout_seconds: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanConfig {
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
    #[serde(default = "default_deadline")]
    pub deadline_seconds: u64,
    #[serde(default = "default_docker_bin")]
    pub docker_bin: String,
    #[serde(default = "default_syft_bin")]
    pub syft_bin: String,
    #[serde(default = "default_grype_bin")]
    pub grype_bin: String,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            concurrency: default_concurrency(),
            deadline_seconds: default_deadline(),
            docker_bin: default_docker_bin(),
            syft_bin: default_syft_bin(),
            grype_bin: default_grype_bin(),
        }
    }
}

impl ScanConfig {
    pub fn orchestrator(&self) -> OrchestratorConfig {
        OrchestratorConfig {
            concurrency: self.concurrency,
            deadline: Duration::from_secs(self.deadline_seconds),
        }
    }
}

fn default_ntfy_timeout() -> u64 {
    10
}

fn default_concurrency() -> usize {
    DEFAULT_CONCURRENCY
}

fn default_deadline() -> u64 {
    600
}

fn default_docker_bin() -> String {
    "docker".to_string()
}

fn default_syft_bin() -> String {
    "syft".to_string()
}

fn default_grype_bin() -> String {
    "grype".to_string()
}

impl Config {
    /// Load and validate configuration from a YAML file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config: Config =
            serde_yaml::from_str(&content).map_err(|source| ConfigError::Parse {
                path: path.to_path_buf(),
                source,
            })?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.scan.concurrency == 0 {
            return Err(ConfigError::Invalid(
                "scan.concurrency must be at least 1".to_string(),
            ));
        }
        if self.scan.deadline_seconds == 0 {
            return Err(ConfigError::Invalid(
                "scan.deadline_seconds must be at least 1".to_string(),
            ));
        }
        if let Some(ntfy) = &self.ntfy {
            if ntfy.timeout_seconds == 0 {
                return Err(ConfigError::Invalid(
                    "ntfy.timeout_seconds must be at least 1".to_string(),
                ));
            }
            if ntfy.server_url.trim().is_empty() {
                return Err(ConfigError::Invalid("ntfy.server_url is empty".to_string()));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_config(content: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_load_full_config() {
        let file = write_config(
            r#"
ntfy:
  server_url: https://ntfy.example.com
  topic: cve-alerts
  username: scanner
  password: hunter2
  timeout_seconds: 30
scan:
  concurrency: 8
  deadline_seconds: 120
  grype_bin: /usr/local/bin/grype
"#,
        );
        let config = Config::load(file.path()).unwrap();

        let ntfy = config.ntfy.unwrap();
        assert_eq!(ntfy.topic, "cve-alerts");
        assert_eq!(ntfy.timeout_seconds, 30);
        assert_eq!(config.scan.concurrency, 8);
        assert_eq!(config.scan.grype_bin, "/usr/local/bin/grype");
        assert_eq!(config.scan.syft_bin, "syft");
        assert_eq!(
            config.scan.orchestrator().deadline,
            Duration::from_secs(120)
        );
    }

    #[test]
    fn test_defaults_when_sections_missing() {
        let file = write_config("{}\n");
        let config = Config::load(file.path()).unwrap();
        assert!(config.ntfy.is_none());
        assert_eq!(config.scan.concurrency, 5);
        assert_eq!(config.scan.deadline_seconds, 600);
        assert_eq!(config.scan.docker_bin, "docker");
    }

    #[test]
    fn test_ntfy_timeout_default() {
        let file = write_config("ntfy:\n  server_url: https://ntfy.sh\n  topic: t\n");
        let config = Config::load(file.path()).unwrap();
        assert_eq!(config.ntfy.unwrap().timeout_seconds, 10);
    }

    #[test]
    fn test_zero_concurrency_rejected() {
        let file = write_config("scan:\n  concurrency: 0\n");
        let err = Config::load(file.path()).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn test_missing_file() {
        let err = Config::load(Path::new("/this/does/not/exist.yaml")).unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
    }

    #[test]
    fn test_malformed_yaml() {
        let file = write_config("scan: [unterminated\n");
        let err = Config::load(file.path()).unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
    }
}
