//! CLI command definitions using clap

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::output::OutputFormat;

/// hotcomp - watch, reload and render a compiled UI component
#[derive(Parser)]
#[command(name = "hotcomp")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Output format (text, json)
    #[arg(short = 'o', long, global = true, default_value_t = OutputFormat::Text)]
    pub output: OutputFormat,

    /// Configuration file path
    #[arg(short = 'c', long, global = true, env = "HOTCOMP_CONFIG")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

/// Available CLI commands
#[derive(Subcommand)]
pub enum Commands {
    /// Watch a component binary and re-render on every rebuild
    Watch {
        /// Component binary rewritten by the build
        #[arg(short, long)]
        binary: Option<PathBuf>,

        /// Qualified name of the component type
        #[arg(short = 't', long = "type")]
        type_name: Option<String>,

        /// Directory for transient binaries
        #[arg(short, long)]
        working_dir: Option<PathBuf>,

        /// Minimum interval between reloads in milliseconds
        #[arg(long)]
        debounce_ms: Option<u64>,

        /// Remove stale binaries before the first load
        #[arg(long)]
        clean: bool,
    },

    /// Load a component once and print its rendered output
    Load {
        /// Component binary
        binary: PathBuf,

        /// Qualified name of the component type
        #[arg(short = 't', long = "type")]
        type_name: String,

        /// Directory for transient binaries
        #[arg(short, long, default_value = ".")]
        working_dir: PathBuf,
    },

    /// Remove stale component binaries from a working directory
    Clean {
        /// Working directory
        #[arg(default_value = ".")]
        dir: PathBuf,

        /// Extension of binaries to remove
        #[arg(short, long, default_value = hotcomp_loader::DEFAULT_BINARY_EXTENSION)]
        extension: String,

        /// Binary to keep
        #[arg(short, long)]
        keep: Option<PathBuf>,
    },
}
