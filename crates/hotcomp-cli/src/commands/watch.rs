//! `hotcomp watch` command implementation

use std::path::{Path, PathBuf};
use std::time::Duration;

use colored::Colorize;
use hotcomp_loader::{ComponentType, ReloadConfig, ReloadEvent, ReloadService};
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, warn};

use crate::error::CliError;
use crate::output::{OutputFormat, RenderReport, print_json};

/// Command-line values layered over the configuration file
#[derive(Debug, Default, Clone)]
pub struct WatchOverrides {
    pub binary: Option<PathBuf>,
    pub type_name: Option<String>,
    pub working_dir: Option<PathBuf>,
    pub debounce_ms: Option<u64>,
    pub clean: bool,
}

/// Build the reload configuration from an optional file and the overrides
pub fn resolve_config(
    config_path: Option<&Path>,
    overrides: WatchOverrides,
) -> Result<ReloadConfig, CliError> {
    let mut config = match config_path {
        Some(path) => ReloadConfig::load(path)?,
        None => {
            let binary = overrides
                .binary
                .clone()
                .ok_or(CliError::MissingArgument("--binary"))?;
            let type_name = overrides
                .type_name
                .as_deref()
                .ok_or(CliError::MissingArgument("--type"))?;
            ReloadConfig::new(binary, type_name)
        }
    };

    if let Some(binary) = overrides.binary {
        config.watch_path = binary;
    }
    if let Some(type_name) = overrides.type_name {
        config.type_name = type_name;
    }
    if let Some(dir) = overrides.working_dir {
        config = config.with_working_dir(dir);
    }
    if let Some(ms) = overrides.debounce_ms {
        config = config.with_debounce(Duration::from_millis(ms));
    }
    if overrides.clean {
        config = config.with_clean_on_start(true);
    }

    config.validate()?;
    Ok(config)
}

/// Host-side view: the last successfully rendered version
struct Host {
    format: OutputFormat,
    last: Option<RenderReport>,
}

impl Host {
    fn show(&mut self, component: &ComponentType) -> Result<(), CliError> {
        match component.render() {
            Ok(markup) => {
                let report = RenderReport::from_component(component, markup);
                match self.format {
                    OutputFormat::Json => print_json(&report)?,
                    OutputFormat::Text => {
                        let digest = report.digest.as_deref().unwrap_or("-");
                        println!(
                            "{} {} {}",
                            "↻".green(),
                            report.type_name.cyan(),
                            digest.get(..12).unwrap_or(digest).dimmed()
                        );
                        println!("{}", report.markup);
                    }
                }
                self.last = Some(report);
            }
            Err(e) => self.retain(&e.to_string()),
        }
        Ok(())
    }

    fn retain(&self, reason: &str) {
        match &self.last {
            Some(last) => println!(
                "{} {} ({}); keeping previous render of {}",
                "!".yellow(),
                "Component unavailable".yellow(),
                reason,
                last.type_name.cyan()
            ),
            None => println!("{} {} ({})", "!".yellow(), "Component unavailable".yellow(), reason),
        }
    }
}

/// Execute the `hotcomp watch` command
pub async fn run(config: ReloadConfig, format: OutputFormat) -> Result<(), CliError> {
    if format == OutputFormat::Text {
        println!(
            "{} Watching {} for {}",
            "→".green(),
            config.watch_path.display().to_string().cyan(),
            config.type_name.cyan()
        );
    }

    let mut service = ReloadService::start(config)?;
    let mut events = service.subscribe();
    let mut host = Host {
        format,
        last: None,
    };

    if let Some(component) = service.current() {
        host.show(&component)?;
    }

    loop {
        tokio::select! {
            event = events.recv() => match event {
                Ok(ReloadEvent::Loaded(component)) => host.show(&component)?,
                Ok(ReloadEvent::Unavailable { reason }) => host.retain(&reason),
                Err(RecvError::Lagged(skipped)) => warn!("Skipped {} reload events", skipped),
                Err(RecvError::Closed) => break,
            },
            _ = tokio::signal::ctrl_c() => {
                debug!("Interrupted");
                break;
            }
        }
    }

    service.shutdown();
    Ok(())
}
