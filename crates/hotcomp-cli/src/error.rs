use std::path::PathBuf;

use hotcomp_loader::{ConfigError, LoadError, LoaderError, RenderError, ServiceError};

#[derive(thiserror::Error, Debug)]
pub enum CliError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Missing argument: {0} (pass it or set it in --config)")]
    MissingArgument(&'static str),

    #[error("Service error: {0}")]
    Service(#[from] ServiceError),

    #[error("Engine error: {0}")]
    Engine(#[from] LoadError),

    #[error("Loader error: {0}")]
    Loader(#[from] LoaderError),

    #[error("Component {type_name} is not available in {path:?}")]
    Unavailable { type_name: String, path: PathBuf },

    #[error("Render error: {0}")]
    Render(#[from] RenderError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
