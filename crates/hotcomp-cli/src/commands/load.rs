//! `hotcomp load` command implementation

use std::path::Path;

use colored::Colorize;
use hotcomp_loader::{ComponentLoader, RuntimeConfig};

use crate::error::CliError;
use crate::output::{OutputFormat, RenderReport, print_json};

/// Execute the `hotcomp load` command
pub fn run(
    binary: &Path,
    type_name: &str,
    working_dir: &Path,
    runtime: &RuntimeConfig,
    format: OutputFormat,
) -> Result<(), CliError> {
    let loader = ComponentLoader::new(runtime)?;

    let component = loader
        .load_component_type(working_dir, binary, type_name)?
        .ok_or_else(|| CliError::Unavailable {
            type_name: type_name.to_string(),
            path: binary.to_path_buf(),
        })?;

    let markup = component.render()?;
    let report = RenderReport::from_component(&component, markup);

    match format {
        OutputFormat::Json => print_json(&report)?,
        OutputFormat::Text => {
            println!("{} Loaded {}", "✓".green(), report.type_name.cyan());
            if let Some(digest) = &report.digest {
                println!("  Digest:   {}", digest.white());
            }
            println!("  Members:  {}", report.members.join(", ").white());
            println!();
            println!("{}", report.markup);
        }
    }

    loader.unload_previous();
    Ok(())
}
