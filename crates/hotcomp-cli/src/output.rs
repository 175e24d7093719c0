//! Output formatting

use serde::Serialize;

use crate::error::CliError;

/// Output format for CLI commands
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum OutputFormat {
    /// Human-readable text output
    #[default]
    Text,
    /// JSON output for automation
    Json,
}

impl std::fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Text => write!(f, "text"),
            Self::Json => write!(f, "json"),
        }
    }
}

/// One rendered component version
#[derive(Debug, Clone, Serialize)]
pub struct RenderReport {
    pub type_name: String,
    pub digest: Option<String>,
    pub members: Vec<String>,
    pub markup: String,
}

impl RenderReport {
    pub fn from_component(
        component: &hotcomp_loader::ComponentType,
        markup: String,
    ) -> Self {
        Self {
            type_name: component.qualified_name().to_string(),
            digest: component.image_digest().map(str::to_string),
            members: component
                .descriptor()
                .members()
                .iter()
                .map(|(name, signature)| format!("{}{}", name, signature))
                .collect(),
            markup,
        }
    }
}

/// Outcome of a cleanup run
#[derive(Debug, Clone, Serialize)]
pub struct CleanReport {
    pub removed: Vec<String>,
    pub failed: Vec<String>,
}

/// Print a serializable value as one JSON line
pub fn print_json<T: Serialize>(value: &T) -> Result<(), CliError> {
    println!("{}", serde_json::to_string(value)?);
    Ok(())
}
