//! Error types for component loading, rendering and watching

use std::path::PathBuf;

use crate::registry::Capability;

/// Failure to load a binary image into a load context
#[derive(Debug, thiserror::Error)]
pub enum LoadError {
    #[error("Failed to create engine: {0}")]
    Engine(String),

    #[error("Invalid binary image: {0}")]
    InvalidImage(String),

    #[error("Load context already holds a module")]
    AlreadyLoaded,

    #[error("Load context has been unloaded")]
    Unloaded,
}

/// Failure to resolve a component type inside a loaded module
#[derive(Debug, thiserror::Error)]
pub enum ResolveError {
    #[error("No module loaded in this context")]
    NotLoaded,

    #[error("Load context has been unloaded")]
    Unloaded,

    #[error("Type not found: {0}")]
    TypeNotFound(String),

    #[error("Type {name} does not satisfy capability {missing}")]
    CapabilityMismatch { name: String, missing: Capability },
}

/// Filesystem failures the loader propagates to its caller
#[derive(Debug, thiserror::Error)]
pub enum LoaderError {
    #[error("Failed to create working directory {path:?}: {source}")]
    WorkingDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to read binary {path:?}: {source}")]
    ReadBinary {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Detailed outcome of a failed load cycle
#[derive(Debug, thiserror::Error)]
pub enum ComponentError {
    #[error(transparent)]
    Loader(#[from] LoaderError),

    #[error("Load error: {0}")]
    Load(#[from] LoadError),

    #[error("Resolve error: {0}")]
    Resolve(#[from] ResolveError),
}

impl ComponentError {
    /// Whether this failure must reach the caller instead of becoming "no component"
    pub fn is_fatal(&self) -> bool {
        matches!(self, ComponentError::Loader(_))
    }
}

/// Failure to delete a single stale binary
#[derive(Debug, thiserror::Error)]
#[error("Failed to delete {path:?}: {source}")]
pub struct CleanupError {
    pub path: PathBuf,
    #[source]
    pub source: std::io::Error,
}

/// Failure while rendering a resolved component
#[derive(Debug, thiserror::Error)]
pub enum RenderError {
    #[error("Component module has been unloaded")]
    Unloaded,

    #[error("Type {0} is not renderable")]
    NotRenderable(String),

    #[error("Failed to instantiate component module: {0}")]
    Instantiation(String),

    #[error("Render trapped: {0}")]
    Trap(String),

    #[error("Render output out of bounds: offset={offset}, len={len}")]
    OutOfBounds { offset: u32, len: u32 },

    #[error("Render output is not valid UTF-8: {0}")]
    InvalidUtf8(#[from] std::string::FromUtf8Error),
}

/// File watcher errors
#[derive(Debug, thiserror::Error)]
pub enum WatchError {
    #[error("Watch path has no file name: {0:?}")]
    InvalidPath(PathBuf),

    #[error("Watch error: {0}")]
    Notify(#[from] notify::Error),
}

/// Configuration loading errors
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Config parsing error: {0}")]
    Parse(String),

    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Reload service errors
#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error(transparent)]
    Watch(#[from] WatchError),

    #[error(transparent)]
    Loader(#[from] LoaderError),

    #[error(transparent)]
    Engine(#[from] LoadError),
}

/// Result type for config operations
pub type ConfigResult<T> = Result<T, ConfigError>;
