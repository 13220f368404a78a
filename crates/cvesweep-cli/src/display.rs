use colored::*;
use cvesweep_core::notify::NotificationSummary;
use cvesweep_core::{SbomArtifact, ScanResults, Severity, VulnerabilityFinding, WorkloadUnit};

const TABLE_HEADERS: [&str; 6] = [
    "CVE Name",
    "Severity",
    "Package",
    "Current Version",
    "Resolved Version",
    "Path",
];

/// Print the enumerated containers.
pub fn print_unit_list(units: &[WorkloadUnit]) {
    println!();
    println!("{}", format!(" cvesweep — {} running containers", units.len()).bold());
    println!();
    let id_width = units.iter().map(|u| u.id.len()).max().unwrap_or(2).max(2);
    println!(" {:<width$}  {}", "ID".bold(), "Image".bold(), width = id_width);
    for unit in units {
        println!(" {:<width$}  {}", unit.id, unit.image_ref.cyan(), width = id_width);
    }
    println!();
}

/// Print the raw SBOM document for one container.
pub fn print_sbom(unit_id: &str, artifact: &SbomArtifact) {
    println!();
    println!("{}", format!(" SBOM for container {}", unit_id).bold());
    println!("{}", artifact.to_text());
}

/// Print the full scan report: one CVE table per container, failures, summary.
pub fn print_scan_report(results: &ScanResults) {
    println!();
    println!(
        "{}",
        format!(
            " cvesweep v{} — {} containers scanned",
            env!("CARGO_PKG_VERSION"),
            results.stats.dispatched
        )
        .bold()
    );
    println!();

    for (unit_id, findings) in &results.findings {
        print_cve_table(unit_id, findings);
    }

    let failed: Vec<_> = results.failed_outcomes().collect();
    if !failed.is_empty() {
        println!(" {}", "Failed Containers".bold().underline());
        for outcome in failed {
            println!(
                " {} {} {}",
                " FAIL ".on_red().white().bold(),
                outcome.unit.to_string().bold(),
                outcome.state.label().dimmed()
            );
            if let Some(error) = &outcome.error {
                println!("   {} {}", "|".dimmed(), error);
            }
        }
        println!();
    }

    println!(" {}", "=".repeat(60).dimmed());
    println!();
    print_summary(results);
}

/// Print a table of CVE information for one container.
pub fn print_cve_table(unit_id: &str, findings: &[VulnerabilityFinding]) {
    println!(" {}", format!("CVE Report for container {}", unit_id).bold().underline());

    if findings.is_empty() {
        println!(" {} No vulnerabilities found", "OK".green().bold());
        println!();
        return;
    }

    let rows: Vec<[String; 6]> = findings
        .iter()
        .map(|f| {
            [
                f.cve_id.clone(),
                f.severity.symbol().to_string(),
                f.package.clone(),
                f.current_version.clone(),
                f.fixed_display().to_string(),
                f.path.clone(),
            ]
        })
        .collect();

    let mut widths = TABLE_HEADERS.map(str::len);
    for row in &rows {
        for (width, cell) in widths.iter_mut().zip(row.iter()) {
            *width = (*width).max(cell.len());
        }
    }

    let header: Vec<String> = TABLE_HEADERS
        .iter()
        .zip(widths.iter())
        .map(|(h, w)| format!("{:<w$}", h, w = *w))
        .collect();
    println!(" {}", header.join(" | ").bold());
    println!(
        " {}",
        widths
            .iter()
            .map(|w| "-".repeat(*w))
            .collect::<Vec<_>>()
            .join("-+-")
            .dimmed()
    );

    for (row, finding) in rows.iter().zip(findings) {
        let cells: Vec<String> = row
            .iter()
            .zip(widths.iter())
            .enumerate()
            .map(|(col, (cell, w))| {
                let padded = format!("{:<w$}", cell, w = *w);
                if col == 1 {
                    colorize_severity(&padded, finding.severity)
                } else {
                    padded
                }
            })
            .collect();
        println!(" {}", cells.join(" | "));
    }
    println!();
}

fn colorize_severity(text: &str, severity: Severity) -> String {
    match severity {
        Severity::Critical => text.red().bold().to_string(),
        Severity::High => text.yellow().bold().to_string(),
        Severity::Medium => text.blue().to_string(),
        Severity::Low => text.dimmed().to_string(),
        Severity::Unknown => text.dimmed().to_string(),
    }
}

fn print_summary(results: &ScanResults) {
    let stats = &results.stats;
    println!(" {}", "Summary".bold().underline());
    println!(
        " {} Containers:       {} scanned, {} failed, {} not started",
        "|-".dimmed(),
        stats.succeeded.to_string().green(),
        if stats.failed > 0 {
            stats.failed.to_string().red().bold().to_string()
        } else {
            "0".to_string()
        },
        stats.not_started
    );

    let critical = results.count_by_severity(Severity::Critical);
    let high = results.count_by_severity(Severity::High);
    println!(
        " {} Vulnerabilities:  {} total, {} critical, {} high, {} medium",
        "|-".dimmed(),
        results.total_findings(),
        if critical > 0 {
            critical.to_string().red().bold().to_string()
        } else {
            "0".to_string()
        },
        if high > 0 {
            high.to_string().yellow().bold().to_string()
        } else {
            "0".to_string()
        },
        results.count_by_severity(Severity::Medium),
    );
    println!(
        " {} Peak concurrency: {}",
        "|-".dimmed(),
        stats.peak_in_flight
    );
    println!(
        " {} Duration:         {:.1}s{}",
        "|-".dimmed(),
        results.duration_secs(),
        if stats.cancelled {
            " (cancelled)".yellow().to_string()
        } else {
            String::new()
        }
    );
    println!();
}

pub fn print_notification_summary(summary: &NotificationSummary) {
    if summary.failed == 0 {
        println!(
            " {} {} notifications sent",
            "OK".green().bold(),
            summary.sent
        );
    } else {
        println!(
            " {} {} notifications sent, {} failed",
            "WARN".yellow().bold(),
            summary.sent,
            summary.failed
        );
    }
    println!();
}
