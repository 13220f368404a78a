mod display;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use cvesweep_core::notify::NotificationService;
use cvesweep_core::{
    cancel_after, docker_toolchain, Config, NtfyClient, Orchestrator, ProcessExecutor,
};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

const DEFAULT_CONFIG: &str = "config.yaml";

#[derive(Parser)]
#[command(
    name = "cvesweep",
    version,
    about = "cvesweep — SBOM generation and CVE scanning for running containers",
    long_about = "Enumerate running containers, generate an SBOM for each image with syft, scan it with grype, and publish the results to ntfy."
)]
struct Cli {
    /// Enable debug logging (RUST_LOG takes precedence when set)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Scan every running container and report its vulnerabilities
    Scan {
        /// Path to the YAML configuration file
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Maximum number of containers scanned at once (overrides the config file)
        #[arg(long)]
        concurrency: Option<usize>,

        /// Overall deadline for the run in seconds (overrides the config file)
        #[arg(long)]
        deadline_secs: Option<u64>,

        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,

        /// Also print the generated SBOM documents
        #[arg(long)]
        print_sbom: bool,

        /// Skip ntfy notifications even when configured
        #[arg(long)]
        no_notify: bool,
    },

    /// List the running containers that would be scanned
    List {
        /// Path to the YAML configuration file
        #[arg(short, long)]
        config: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match cli.command {
        Commands::Scan {
            config,
            concurrency,
            deadline_secs,
            format,
            print_sbom,
            no_notify,
        } => {
            let mut config = load_config(config.as_deref())?;
            if let Some(k) = concurrency {
                config.scan.concurrency = k;
            }
            if let Some(secs) = deadline_secs {
                config.scan.deadline_seconds = secs;
            }
            config.validate()?;
            cmd_scan(&config, &format, print_sbom, no_notify).await
        }
        Commands::List { config } => {
            let config = load_config(config.as_deref())?;
            cmd_list(&config).await
        }
    }
}

fn init_logging(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
        .with(filter)
        .init();
}

/// An explicit path must exist; the default `config.yaml` is optional.
fn load_config(path: Option<&Path>) -> Result<Config> {
    match path {
        Some(path) => Config::load(path)
            .with_context(|| format!("Failed to load config {}", path.display())),
        None => {
            let default = Path::new(DEFAULT_CONFIG);
            if default.exists() {
                Config::load(default)
                    .with_context(|| format!("Failed to load config {}", default.display()))
            } else {
                info!("No {} found, using defaults", DEFAULT_CONFIG);
                Ok(Config::default())
            }
        }
    }
}

/// Cancel `token` on Ctrl-C.
fn cancel_on_ctrl_c(token: CancellationToken) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received, cancelling scan");
            token.cancel();
        }
    });
}

async fn cmd_list(config: &Config) -> Result<()> {
    let (enumerator, _) = docker_toolchain(Arc::new(ProcessExecutor), &config.scan);
    let cancel = CancellationToken::new();
    cancel_on_ctrl_c(cancel.clone());
    cancel_after(cancel.clone(), config.scan.orchestrator().deadline);

    let units = enumerator
        .list(&cancel)
        .await
        .context("Failed to enumerate running containers")?;
    display::print_unit_list(&units);
    Ok(())
}

async fn cmd_scan(config: &Config, format: &str, print_sbom: bool, no_notify: bool) -> Result<()> {
    let (enumerator, tools) = docker_toolchain(Arc::new(ProcessExecutor), &config.scan);
    let orchestrator = Orchestrator::new(tools, config.scan.orchestrator())?;

    // The deadline covers listing as well as the scan itself.
    let cancel = CancellationToken::new();
    cancel_on_ctrl_c(cancel.clone());
    cancel_after(cancel.clone(), orchestrator.config().deadline);

    let units = enumerator
        .list(&cancel)
        .await
        .context("Failed to enumerate running containers")?;

    let results = orchestrator.run_with_cancel(units, cancel).await;

    match format {
        "json" => {
            let json = serde_json::to_string_pretty(&results)?;
            println!("{}", json);
        }
        _ => {
            if print_sbom {
                for (unit_id, artifact) in &results.sboms {
                    display::print_sbom(unit_id, artifact);
                }
            }
            display::print_scan_report(&results);
        }
    }

    if no_notify {
        return Ok(());
    }
    let Some(ntfy) = &config.ntfy else {
        info!("ntfy is not configured, skipping notifications");
        return Ok(());
    };

    match NtfyClient::new(ntfy) {
        Ok(client) => {
            let service = NotificationService::new(Arc::new(client));
            let summary = service.notify_results(&results).await;
            if format != "json" {
                display::print_notification_summary(&summary);
            }
        }
        Err(e) => warn!("Notifications disabled, could not create ntfy client: {}", e),
    }

    Ok(())
}
