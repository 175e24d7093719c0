//! Hot reload of compiled UI components
//!
//! Provides:
//! - Isolated, unloadable load contexts filled from in-memory binary images
//! - A component loader that unloads the previous version before loading the next
//! - Exact-name type resolution with a renderable capability gate
//! - A file watcher for the component binary
//! - A reload service wiring the watcher to the loader
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────┐  write   ┌───────────────┐  reload  ┌──────────────────┐
//! │ ChangeWatcher│ ───────► │ ReloadService │ ───────► │ ComponentLoader  │
//! └──────────────┘          └───────────────┘          │  unload previous │
//!                                  │                   │  read bytes      │
//!                                  │ ReloadEvent       │  load context    │
//!                                  ▼                   │  resolve + gate  │
//!                               host UI                └──────────────────┘
//! ```

pub mod component;
pub mod config;
pub mod context;
pub mod error;
pub mod image;
pub mod loader;
pub mod registry;
pub mod runtime;
pub mod service;
pub mod watcher;

pub use component::ComponentType;
pub use crate::config::ReloadConfig;
pub use context::{ContextFactory, ContextState, LoadContext, WasmContextFactory, WasmLoadContext};
pub use error::{
    CleanupError, ComponentError, ConfigError, LoadError, LoaderError, RenderError, ResolveError,
    ServiceError, WatchError,
};
pub use image::BinaryImage;
pub use loader::{CleanupSummary, ComponentLoader, DEFAULT_BINARY_EXTENSION, remove_stale_binaries};
pub use registry::{Capability, TypeDescriptor, TypeRegistry};
pub use runtime::{OptimizationLevel, RuntimeConfig};
pub use service::{Admission, Debouncer, ReloadEvent, ReloadService, TriggerOutcome};
pub use watcher::{ChangeWatcher, WatcherOptions, WatcherState};
