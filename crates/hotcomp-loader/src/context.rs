//! Isolated load contexts
//!
//! A load context is an independently unloadable unit of loaded code. It is
//! filled from an in-memory [`BinaryImage`], never from a file, and holds the
//! only strong reference to its compiled module. Unloading drops that
//! reference, which frees the compiled code synchronously; component handles
//! keep weak references and stop working at that point.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, info, warn};
use wasmtime::{Engine, Linker, Module, Store};

use crate::component::ComponentType;
use crate::error::{LoadError, RenderError, ResolveError};
use crate::image::BinaryImage;
use crate::registry::{MEMORY_EXPORT, RENDER_MEMBER, TypeDescriptor, TypeRegistry};
use crate::runtime::RuntimeConfig;

static NEXT_CONTEXT_ID: AtomicU64 = AtomicU64::new(1);

/// Lifecycle state of a load context
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContextState {
    /// Created, nothing loaded yet
    Empty,
    /// Holds exactly one module
    Loaded,
    /// Unloaded, permanently unusable
    Unloaded,
}

/// An unloadable execution boundary
pub trait LoadContext: Send {
    /// Compile `image` into this context
    fn load_from_bytes(&mut self, image: BinaryImage) -> Result<(), LoadError>;

    /// Exact-match lookup of an exported type
    fn get_type(&self, qualified_name: &str) -> Result<ComponentType, ResolveError>;

    /// Release the loaded module; idempotent
    fn unload(&mut self);

    fn state(&self) -> ContextState;

    /// Digest of the loaded image, if any
    fn image_digest(&self) -> Option<&str>;
}

/// Creates fresh load contexts for a loader
pub trait ContextFactory: Send + Sync {
    type Context: LoadContext;

    fn create_context(&self) -> Self::Context;
}

/// A compiled module and the type registry built from its exports
pub(crate) struct LoadedModule {
    context_id: u64,
    engine: Engine,
    module: Module,
    registry: TypeRegistry,
    digest: Arc<str>,
    fuel_per_render: Option<u64>,
    loaded_at: Instant,
}

impl LoadedModule {
    /// Instantiate in a fresh store and call the type's render member
    ///
    /// No imports are provided: a module that depends on anything outside
    /// itself fails here, on first use, not at load.
    pub(crate) fn render(&self, descriptor: &TypeDescriptor) -> Result<String, RenderError> {
        let mut store = Store::new(&self.engine, ());
        if let Some(fuel) = self.fuel_per_render {
            store
                .set_fuel(fuel)
                .map_err(|e| RenderError::Instantiation(e.to_string()))?;
        }

        let linker: Linker<()> = Linker::new(&self.engine);
        let instance = linker
            .instantiate(&mut store, &self.module)
            .map_err(|e| RenderError::Instantiation(e.to_string()))?;

        let not_renderable = || RenderError::NotRenderable(descriptor.qualified_name().to_string());
        let render = instance
            .get_typed_func::<(), (i32, i32)>(&mut store, &descriptor.export_name(RENDER_MEMBER))
            .map_err(|_| not_renderable())?;
        let memory = instance
            .get_memory(&mut store, MEMORY_EXPORT)
            .ok_or_else(not_renderable)?;

        let (ptr, len) = render
            .call(&mut store, ())
            .map_err(|e| RenderError::Trap(e.to_string()))?;

        let (offset, len) = (ptr as u32, len as u32);
        let start = offset as usize;
        let bytes = start
            .checked_add(len as usize)
            .and_then(|end| memory.data(&store).get(start..end))
            .ok_or(RenderError::OutOfBounds { offset, len })?;

        debug!(
            "Rendered {} from context {} ({} bytes)",
            descriptor.qualified_name(),
            self.context_id,
            bytes.len()
        );
        Ok(String::from_utf8(bytes.to_vec())?)
    }

    pub(crate) fn digest(&self) -> &str {
        &self.digest
    }

    pub(crate) fn shared_digest(&self) -> Arc<str> {
        Arc::clone(&self.digest)
    }
}

impl Drop for LoadedModule {
    fn drop(&mut self) {
        debug!(
            "Released module of context {} after {:?}",
            self.context_id,
            self.loaded_at.elapsed()
        );
    }
}

enum Slot {
    Empty,
    Loaded(Arc<LoadedModule>),
    Unloaded,
}

/// Load context backed by a wasmtime module
pub struct WasmLoadContext {
    id: u64,
    engine: Engine,
    fuel_per_render: Option<u64>,
    slot: Slot,
}

impl WasmLoadContext {
    pub fn new(engine: Engine, fuel_per_render: Option<u64>) -> Self {
        Self {
            id: NEXT_CONTEXT_ID.fetch_add(1, Ordering::Relaxed),
            engine,
            fuel_per_render,
            slot: Slot::Empty,
        }
    }

    /// Process-unique context id, used in logs
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Qualified names of all types the loaded module exports
    pub fn type_names(&self) -> Vec<String> {
        match &self.slot {
            Slot::Loaded(module) => module.registry.type_names().map(str::to_string).collect(),
            _ => Vec::new(),
        }
    }
}

impl LoadContext for WasmLoadContext {
    fn load_from_bytes(&mut self, image: BinaryImage) -> Result<(), LoadError> {
        match self.slot {
            Slot::Empty => {}
            Slot::Loaded(_) => return Err(LoadError::AlreadyLoaded),
            Slot::Unloaded => return Err(LoadError::Unloaded),
        }

        let start = Instant::now();
        let digest: Arc<str> = image.digest().into();
        let module = Module::new(&self.engine, image.as_bytes())
            .map_err(|e| LoadError::InvalidImage(e.to_string()))?;
        let registry = TypeRegistry::from_module(&module);

        info!(
            "Loaded {} bytes into context {} in {:?} ({} types)",
            image.len(),
            self.id,
            start.elapsed(),
            registry.len()
        );

        self.slot = Slot::Loaded(Arc::new(LoadedModule {
            context_id: self.id,
            engine: self.engine.clone(),
            module,
            registry,
            digest,
            fuel_per_render: self.fuel_per_render,
            loaded_at: Instant::now(),
        }));
        Ok(())
    }

    fn get_type(&self, qualified_name: &str) -> Result<ComponentType, ResolveError> {
        let module = match &self.slot {
            Slot::Loaded(module) => module,
            Slot::Empty => return Err(ResolveError::NotLoaded),
            Slot::Unloaded => return Err(ResolveError::Unloaded),
        };

        let descriptor = module
            .registry
            .get(qualified_name)
            .ok_or_else(|| ResolveError::TypeNotFound(qualified_name.to_string()))?;

        Ok(ComponentType::new(descriptor.clone(), module))
    }

    fn unload(&mut self) {
        match std::mem::replace(&mut self.slot, Slot::Unloaded) {
            Slot::Loaded(module) => match Arc::try_unwrap(module) {
                Ok(module) => {
                    drop(module);
                    info!("Unloaded context {}", self.id);
                }
                Err(shared) => {
                    // Only an in-flight render can hold a strong reference
                    warn!(
                        "Unloaded context {} while {} render(s) in flight; module is released when they return",
                        self.id,
                        Arc::strong_count(&shared) - 1
                    );
                }
            },
            Slot::Empty => debug!("Unloaded empty context {}", self.id),
            Slot::Unloaded => {}
        }
    }

    fn state(&self) -> ContextState {
        match self.slot {
            Slot::Empty => ContextState::Empty,
            Slot::Loaded(_) => ContextState::Loaded,
            Slot::Unloaded => ContextState::Unloaded,
        }
    }

    fn image_digest(&self) -> Option<&str> {
        match &self.slot {
            Slot::Loaded(module) => Some(module.digest()),
            _ => None,
        }
    }
}

impl Drop for WasmLoadContext {
    fn drop(&mut self) {
        self.unload();
    }
}

/// Creates [`WasmLoadContext`]s sharing one engine
#[derive(Clone)]
pub struct WasmContextFactory {
    engine: Engine,
    fuel_per_render: Option<u64>,
}

impl WasmContextFactory {
    pub fn new(config: &RuntimeConfig) -> Result<Self, LoadError> {
        Ok(Self {
            engine: config.build_engine()?,
            fuel_per_render: config.fuel_per_render,
        })
    }

    pub fn engine(&self) -> &Engine {
        &self.engine
    }
}

impl ContextFactory for WasmContextFactory {
    type Context = WasmLoadContext;

    fn create_context(&self) -> WasmLoadContext {
        WasmLoadContext::new(self.engine.clone(), self.fuel_per_render)
    }
}
