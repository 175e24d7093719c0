//! Reload service
//!
//! Wires a [`ChangeWatcher`] to a [`ComponentLoader`]: each accepted change
//! notification runs one reload cycle on the notification thread and the
//! outcome is broadcast to subscribers. Notifications inside the debounce
//! window are coalesced into one follow-up cycle when the window closes, so
//! the last write of a burst is always loaded. Rebuilds that leave the
//! binary byte-identical are skipped by comparing image digests.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};

use parking_lot::{Mutex, RwLock};
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use crate::component::ComponentType;
use crate::config::ReloadConfig;
use crate::error::ServiceError;
use crate::image::BinaryImage;
use crate::loader::ComponentLoader;
use crate::watcher::ChangeWatcher;

/// Outcome of a reload cycle
#[derive(Debug, Clone)]
pub enum ReloadEvent {
    /// A new component version is available
    Loaded(ComponentType),
    /// No component this cycle; hosts keep what they rendered before
    Unavailable { reason: String },
}

/// Result of a single trigger
#[derive(Debug, Clone)]
pub enum TriggerOutcome {
    /// Inside the debounce window; a follow-up cycle runs when it closes
    Debounced,
    /// Binary digest matches the loaded image
    Unchanged,
    /// A reload cycle ran
    Reloaded(ReloadEvent),
}

/// Decision of the debouncer for one trigger
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    /// Run a cycle now
    Now,
    /// Schedule the follow-up cycle after this delay
    Deferred(Duration),
    /// A follow-up cycle is already scheduled
    Coalesced,
}

#[derive(Debug, Default)]
struct DebounceState {
    last: Option<Instant>,
    pending: bool,
}

/// Minimum-interval debounce with one trailing follow-up per window
#[derive(Debug)]
pub struct Debouncer {
    interval: Duration,
    state: Mutex<DebounceState>,
}

impl Debouncer {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            state: Mutex::new(DebounceState::default()),
        }
    }

    /// Admit a trigger arriving at `now`
    pub fn admit_at(&self, now: Instant) -> Admission {
        let mut state = self.state.lock();
        match state.last {
            Some(previous) if now.saturating_duration_since(previous) < self.interval => {
                if state.pending {
                    Admission::Coalesced
                } else {
                    state.pending = true;
                    let elapsed = now.saturating_duration_since(previous);
                    Admission::Deferred(self.interval - elapsed)
                }
            }
            _ => {
                state.last = Some(now);
                Admission::Now
            }
        }
    }

    pub fn admit(&self) -> Admission {
        self.admit_at(Instant::now())
    }

    /// Claim the scheduled follow-up; returns false if none is pending
    pub fn take_pending_at(&self, now: Instant) -> bool {
        let mut state = self.state.lock();
        if !state.pending {
            return false;
        }
        state.pending = false;
        state.last = Some(now);
        true
    }

    pub fn is_pending(&self) -> bool {
        self.state.lock().pending
    }
}

/// State shared between the service, the watcher callback and follow-up timers
struct Reloader {
    config: ReloadConfig,
    loader: ComponentLoader,
    debouncer: Debouncer,
    /// Held for a whole load, store and broadcast cycle
    cycle: Mutex<()>,
    current: RwLock<Option<ComponentType>>,
    event_tx: broadcast::Sender<ReloadEvent>,
    stopped: AtomicBool,
}

impl Reloader {
    fn new(config: ReloadConfig) -> Result<Arc<Self>, ServiceError> {
        let loader = ComponentLoader::new(&config.runtime)?
            .with_binary_extension(&config.binary_extension);
        let (event_tx, _) = broadcast::channel(ReloadService::EVENT_CAPACITY);

        Ok(Arc::new(Self {
            debouncer: Debouncer::new(config.debounce()),
            loader,
            cycle: Mutex::new(()),
            current: RwLock::new(None),
            event_tx,
            stopped: AtomicBool::new(false),
            config,
        }))
    }

    fn on_change(self: &Arc<Self>) -> TriggerOutcome {
        match self.debouncer.admit() {
            Admission::Now => self.run_cycle(),
            Admission::Deferred(delay) => {
                debug!(
                    "Deferring reload of {:?} by {:?}",
                    self.config.watch_path, delay
                );
                self.schedule_follow_up(delay);
                TriggerOutcome::Debounced
            }
            Admission::Coalesced => {
                debug!("Debounced change of {:?}", self.config.watch_path);
                TriggerOutcome::Debounced
            }
        }
    }

    fn schedule_follow_up(self: &Arc<Self>, delay: Duration) {
        let reloader: Weak<Self> = Arc::downgrade(self);
        let spawned = std::thread::Builder::new()
            .name("hotcomp-debounce".to_string())
            .spawn(move || {
                std::thread::sleep(delay);
                if let Some(reloader) = reloader.upgrade() {
                    reloader.run_pending();
                }
            });
        if let Err(e) = spawned {
            warn!("Failed to schedule follow-up reload, reloading now: {}", e);
            self.run_pending();
        }
    }

    fn run_pending(&self) -> Option<TriggerOutcome> {
        if self.stopped.load(Ordering::Acquire) {
            return None;
        }
        if !self.debouncer.take_pending_at(Instant::now()) {
            return None;
        }
        Some(self.run_cycle())
    }

    fn run_cycle(&self) -> TriggerOutcome {
        if self.config.skip_unchanged && self.is_unchanged() {
            debug!("Binary {:?} unchanged, skipping reload", self.config.watch_path);
            return TriggerOutcome::Unchanged;
        }
        TriggerOutcome::Reloaded(self.reload())
    }

    fn is_unchanged(&self) -> bool {
        let Some(loaded) = self.loader.current_digest() else {
            return false;
        };
        match BinaryImage::read(&self.config.watch_path) {
            Ok(image) => image.digest() == loaded,
            Err(_) => false,
        }
    }

    fn reload(&self) -> ReloadEvent {
        // Overlapping cycles must not interleave their store and broadcast
        let _cycle = self.cycle.lock();

        // Drop our own handle first so nothing outlives the unload
        *self.current.write() = None;

        let event = match self.loader.try_load_component_type(
            self.config.working_dir(),
            &self.config.watch_path,
            &self.config.type_name,
        ) {
            Ok(component) => {
                info!(
                    "Reloaded {} from {:?}",
                    component.qualified_name(),
                    self.config.watch_path
                );
                *self.current.write() = Some(component.clone());
                ReloadEvent::Loaded(component)
            }
            Err(e) => {
                warn!("Component {} unavailable: {}", self.config.type_name, e);
                ReloadEvent::Unavailable {
                    reason: e.to_string(),
                }
            }
        };

        // No subscribers is not an error
        let _ = self.event_tx.send(event.clone());
        event
    }

    fn stop(&self) {
        self.stopped.store(true, Ordering::Release);
        let _cycle = self.cycle.lock();
        *self.current.write() = None;
        self.loader.unload_previous();
    }
}

/// Watches a component binary and reloads it on every change
pub struct ReloadService {
    reloader: Arc<Reloader>,
    watcher: Option<ChangeWatcher>,
}

impl ReloadService {
    /// Event channel capacity
    pub const EVENT_CAPACITY: usize = 64;

    /// Start the service: optional cleanup, initial load, then watch
    pub fn start(config: ReloadConfig) -> Result<Self, ServiceError> {
        let reloader = Reloader::new(config)?;

        let config = &reloader.config;
        let working_dir = config.working_dir();
        if config.clean_on_start {
            reloader
                .loader
                .clean_up_old_binaries_except(&working_dir, Some(config.watch_path.as_path()));
        }

        if config.watch_path.exists() {
            reloader.reload();
        } else {
            info!("Waiting for {:?} to be built", config.watch_path);
        }

        let watcher = ChangeWatcher::from_options(&config.watcher_options())?;
        let callback_reloader = Arc::downgrade(&reloader);
        watcher.set_on_change(move || {
            if let Some(reloader) = callback_reloader.upgrade() {
                reloader.on_change();
            }
        });

        Ok(Self {
            reloader,
            watcher: Some(watcher),
        })
    }

    /// Subscribe to reload outcomes
    pub fn subscribe(&self) -> broadcast::Receiver<ReloadEvent> {
        self.reloader.event_tx.subscribe()
    }

    /// Handle a change notification as the watcher does
    pub fn trigger(&self) -> TriggerOutcome {
        self.reloader.on_change()
    }

    /// Reload immediately, bypassing debounce and digest checks
    pub fn reload_now(&self) -> ReloadEvent {
        self.reloader.reload()
    }

    /// Component loaded by the last successful cycle, if still current
    pub fn current(&self) -> Option<ComponentType> {
        self.reloader.current.read().clone()
    }

    pub fn config(&self) -> &ReloadConfig {
        &self.reloader.config
    }

    pub fn loader(&self) -> &ComponentLoader {
        &self.reloader.loader
    }

    pub fn is_running(&self) -> bool {
        self.watcher.is_some()
    }

    /// Stop watching and unload the component; idempotent
    pub fn shutdown(&mut self) {
        if let Some(mut watcher) = self.watcher.take() {
            watcher.dispose();
            self.reloader.stop();
            info!("Reload service for {:?} stopped", self.reloader.config.watch_path);
        }
    }

    /// Delete stale binaries from the working directory, keeping the watched one
    pub fn clean_up(&self) -> usize {
        let config = &self.reloader.config;
        self.reloader
            .loader
            .clean_up_old_binaries_except(config.working_dir(), Some(config.watch_path.as_path()))
            .removed
            .len()
    }
}

impl Drop for ReloadService {
    fn drop(&mut self) {
        self.shutdown();
    }
}
