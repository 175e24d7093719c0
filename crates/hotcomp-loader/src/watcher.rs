//! File system watcher for component binary changes
//!
//! Watches the parent directory of one binary and invokes a callback for each
//! last-write notification on that file. Events are neither debounced nor
//! deduplicated here: a single logical write the OS reports as several
//! modifications fires the callback several times.

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use notify::{
    Config, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher,
    event::{MetadataKind, ModifyKind},
};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info};

use crate::error::WatchError;

/// Callback invoked on every qualifying change
pub type ChangeCallback = Arc<dyn Fn() + Send + Sync>;

/// Watcher options
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WatcherOptions {
    /// Path of the binary to watch
    pub watch_path: PathBuf,
}

impl WatcherOptions {
    pub fn new(watch_path: impl Into<PathBuf>) -> Self {
        Self {
            watch_path: watch_path.into(),
        }
    }
}

/// Watcher state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatcherState {
    Watching,
    Disposed,
}

/// Whether a notification counts as a last-write change
pub fn is_last_write(kind: &EventKind) -> bool {
    matches!(
        kind,
        EventKind::Modify(ModifyKind::Data(_))
            | EventKind::Modify(ModifyKind::Any)
            | EventKind::Modify(ModifyKind::Metadata(MetadataKind::WriteTime))
    )
}

/// Watches one file for last-write changes
pub struct ChangeWatcher {
    /// Directory registered with the OS
    directory: PathBuf,
    /// File name filter
    file_name: OsString,
    /// Registered callback
    callback: Arc<RwLock<Option<ChangeCallback>>>,
    /// Internal watcher handle, `None` once disposed
    watcher: Option<RecommendedWatcher>,
}

impl ChangeWatcher {
    /// Start watching `path`
    pub fn new(path: impl AsRef<Path>) -> Result<Self, WatchError> {
        let path = path.as_ref();
        let file_name = path
            .file_name()
            .ok_or_else(|| WatchError::InvalidPath(path.to_path_buf()))?
            .to_os_string();
        let directory = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };

        let callback: Arc<RwLock<Option<ChangeCallback>>> = Arc::new(RwLock::new(None));

        let handler_callback = callback.clone();
        let filter = file_name.clone();
        let mut watcher = RecommendedWatcher::new(
            move |result: Result<Event, notify::Error>| match result {
                Ok(event) => {
                    if !is_last_write(&event.kind) {
                        return;
                    }
                    let matches = event
                        .paths
                        .iter()
                        .any(|p| p.file_name() == Some(filter.as_os_str()));
                    if !matches {
                        return;
                    }
                    debug!("Change detected: {:?}", event);
                    // Clone out so the callback may replace itself
                    let callback = handler_callback.read().clone();
                    if let Some(callback) = callback {
                        callback();
                    }
                }
                Err(e) => error!("Watch error: {}", e),
            },
            Config::default(),
        )?;

        watcher.watch(&directory, RecursiveMode::NonRecursive)?;

        info!("Watching {:?} in {:?}", file_name, directory);

        Ok(Self {
            directory,
            file_name,
            callback,
            watcher: Some(watcher),
        })
    }

    /// Start watching the path in `options`
    pub fn from_options(options: &WatcherOptions) -> Result<Self, WatchError> {
        Self::new(&options.watch_path)
    }

    /// Register the change callback, replacing any previous one
    pub fn set_on_change<C>(&self, callback: C)
    where
        C: Fn() + Send + Sync + 'static,
    {
        *self.callback.write() = Some(Arc::new(callback));
    }

    pub fn clear_on_change(&self) {
        *self.callback.write() = None;
    }

    pub fn state(&self) -> WatcherState {
        if self.watcher.is_some() {
            WatcherState::Watching
        } else {
            WatcherState::Disposed
        }
    }

    /// Watched directory
    pub fn directory(&self) -> &Path {
        &self.directory
    }

    /// File name filter
    pub fn file_name(&self) -> &std::ffi::OsStr {
        &self.file_name
    }

    /// Stop notifications and release the OS watch; safe to call repeatedly
    pub fn dispose(&mut self) {
        if let Some(mut watcher) = self.watcher.take() {
            if let Err(e) = watcher.unwatch(&self.directory) {
                debug!("Unwatch of {:?} failed: {}", self.directory, e);
            }
            drop(watcher);
            info!("Stopped watching {:?}", self.directory.join(&self.file_name));
        }
        self.clear_on_change();
    }
}

impl Drop for ChangeWatcher {
    fn drop(&mut self) {
        self.dispose();
    }
}
