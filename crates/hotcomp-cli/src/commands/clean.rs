//! `hotcomp clean` command implementation

use std::path::Path;

use colored::Colorize;
use hotcomp_loader::remove_stale_binaries;

use crate::error::CliError;
use crate::output::{CleanReport, OutputFormat, print_json};

/// Execute the `hotcomp clean` command
pub fn run(
    dir: &Path,
    extension: &str,
    keep: Option<&Path>,
    format: OutputFormat,
) -> Result<(), CliError> {
    let summary = remove_stale_binaries(dir, extension, keep);

    let report = CleanReport {
        removed: summary
            .removed
            .iter()
            .map(|p| p.display().to_string())
            .collect(),
        failed: summary
            .failed
            .iter()
            .map(|e| e.to_string())
            .collect(),
    };

    match format {
        OutputFormat::Json => print_json(&report)?,
        OutputFormat::Text => {
            for path in &report.removed {
                println!("  {} {}", "-".red(), path);
            }
            for failure in &report.failed {
                println!("  {} {}", "!".yellow(), failure);
            }
            println!(
                "{} Removed {} stale binaries from {}",
                "✓".green(),
                report.removed.len(),
                dir.display().to_string().cyan()
            );
        }
    }

    Ok(())
}
