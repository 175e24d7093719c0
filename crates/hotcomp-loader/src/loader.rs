//! Component loader
//!
//! Sequences unload → load → resolve → validate for one component binary and
//! maintains the working directory that holds transient binaries.

use std::path::{Path, PathBuf};

use parking_lot::Mutex;
use tracing::{debug, info, warn};

use crate::component::ComponentType;
use crate::context::{ContextFactory, LoadContext, WasmContextFactory};
use crate::error::{CleanupError, ComponentError, LoadError, LoaderError, ResolveError};
use crate::image::BinaryImage;
use crate::registry::Capability;
use crate::runtime::RuntimeConfig;

/// Default extension of component binaries
pub const DEFAULT_BINARY_EXTENSION: &str = "wasm";

/// Outcome of a working directory cleanup
#[derive(Debug, Default)]
pub struct CleanupSummary {
    /// Files deleted
    pub removed: Vec<PathBuf>,
    /// Files that could not be deleted
    pub failed: Vec<CleanupError>,
}

/// Loads one component type at a time from a rewritable binary
///
/// The loader owns the current load context. Every load first unloads the
/// previous context, so at most one context is alive per loader. The whole
/// unload → load → resolve sequence runs under one lock: overlapping reload
/// requests are serialized and the last one to acquire the lock wins.
pub struct ComponentLoader<F: ContextFactory = WasmContextFactory> {
    /// Context factory
    factory: F,
    /// Current load context
    current: Mutex<Option<F::Context>>,
    /// Extension of binaries removed by cleanup
    binary_extension: String,
}

impl ComponentLoader<WasmContextFactory> {
    /// Create a loader backed by a wasmtime engine
    pub fn new(config: &RuntimeConfig) -> Result<Self, LoadError> {
        Ok(Self::with_factory(WasmContextFactory::new(config)?))
    }
}

impl<F: ContextFactory> ComponentLoader<F> {
    pub fn with_factory(factory: F) -> Self {
        Self {
            factory,
            current: Mutex::new(None),
            binary_extension: DEFAULT_BINARY_EXTENSION.to_string(),
        }
    }

    /// Set the extension of binaries removed by cleanup
    pub fn with_binary_extension(mut self, ext: &str) -> Self {
        self.binary_extension = ext.trim_start_matches('.').to_string();
        self
    }

    pub fn binary_extension(&self) -> &str {
        &self.binary_extension
    }

    pub fn factory(&self) -> &F {
        &self.factory
    }

    /// Load `binary_path` and return the renderable type `qualified_type_name`
    ///
    /// Returns `Ok(None)` when the image cannot be loaded, the type does not
    /// exist or is not renderable; the caller should keep what it rendered
    /// before. Failing to create `working_dir` or to read the binary is an
    /// error.
    pub fn load_component_type(
        &self,
        working_dir: impl AsRef<Path>,
        binary_path: impl AsRef<Path>,
        qualified_type_name: &str,
    ) -> Result<Option<ComponentType>, LoaderError> {
        match self.try_load_component_type(working_dir, binary_path, qualified_type_name) {
            Ok(component) => Ok(Some(component)),
            Err(ComponentError::Loader(e)) => Err(e),
            Err(e) => {
                debug!("No component available: {}", e);
                Ok(None)
            }
        }
    }

    /// Same sequence as [`Self::load_component_type`], reporting why no
    /// component is available
    pub fn try_load_component_type(
        &self,
        working_dir: impl AsRef<Path>,
        binary_path: impl AsRef<Path>,
        qualified_type_name: &str,
    ) -> Result<ComponentType, ComponentError> {
        let working_dir = working_dir.as_ref();
        let binary_path = binary_path.as_ref();

        std::fs::create_dir_all(working_dir).map_err(|source| LoaderError::WorkingDir {
            path: working_dir.to_path_buf(),
            source,
        })?;

        let mut current = self.current.lock();

        // The previous module must be gone before the file is read again
        Self::unload_locked(&mut current);

        let context = current.insert(self.factory.create_context());

        let image = BinaryImage::read(binary_path).map_err(|source| LoaderError::ReadBinary {
            path: binary_path.to_path_buf(),
            source,
        })?;

        info!(
            "Loading component {} from {:?} ({} bytes)",
            qualified_type_name,
            binary_path,
            image.len()
        );

        context.load_from_bytes(image)?;

        let component = context.get_type(qualified_type_name)?;
        if !component.has_capability(Capability::Renderable) {
            return Err(ResolveError::CapabilityMismatch {
                name: qualified_type_name.to_string(),
                missing: Capability::Renderable,
            }
            .into());
        }

        info!("Resolved component {}", component.qualified_name());
        Ok(component)
    }

    /// Unload the current context, if any
    ///
    /// Returns whether a context was unloaded. The module is released before
    /// this returns.
    pub fn unload_previous(&self) -> bool {
        let mut current = self.current.lock();
        Self::unload_locked(&mut current)
    }

    fn unload_locked(current: &mut Option<F::Context>) -> bool {
        match current.take() {
            Some(mut context) => {
                context.unload();
                true
            }
            None => false,
        }
    }

    /// Whether a load context is current (possibly empty)
    pub fn has_current(&self) -> bool {
        self.current.lock().is_some()
    }

    /// Digest of the image loaded in the current context
    pub fn current_digest(&self) -> Option<String> {
        self.current
            .lock()
            .as_ref()
            .and_then(|context| context.image_digest().map(str::to_string))
    }

    /// Delete every binary in `working_dir`
    ///
    /// Best effort: a file that cannot be deleted is logged and skipped.
    pub fn clean_up_old_binaries(&self, working_dir: impl AsRef<Path>) -> CleanupSummary {
        remove_stale_binaries(working_dir.as_ref(), &self.binary_extension, None)
    }

    /// Delete every binary in `working_dir` other than `keep`
    pub fn clean_up_old_binaries_except(
        &self,
        working_dir: impl AsRef<Path>,
        keep: Option<&Path>,
    ) -> CleanupSummary {
        remove_stale_binaries(working_dir.as_ref(), &self.binary_extension, keep)
    }
}

/// Delete every `*.<extension>` file in `working_dir` other than `keep`
///
/// Needs no loader or engine. Best effort: a file that cannot be deleted is
/// logged, recorded in [`CleanupSummary::failed`] and skipped.
pub fn remove_stale_binaries(
    working_dir: &Path,
    extension: &str,
    keep: Option<&Path>,
) -> CleanupSummary {
    let extension = extension.trim_start_matches('.');
    let mut summary = CleanupSummary::default();

    let entries = match std::fs::read_dir(working_dir) {
        Ok(entries) => entries,
        Err(e) => {
            debug!("Skipping cleanup of {:?}: {}", working_dir, e);
            return summary;
        }
    };

    let keep = keep.and_then(|p| p.file_name());
    let mut candidates: Vec<PathBuf> = entries
        .flatten()
        .map(|entry| entry.path())
        .filter(|path| path.extension().and_then(|e| e.to_str()) == Some(extension))
        .filter(|path| keep.is_none() || path.file_name() != keep)
        .collect();
    candidates.sort();

    for path in candidates {
        match std::fs::remove_file(&path) {
            Ok(()) => {
                debug!("Deleted stale binary {:?}", path);
                summary.removed.push(path);
            }
            Err(source) => {
                let err = CleanupError { path, source };
                warn!("{}", err);
                summary.failed.push(err);
            }
        }
    }

    info!(
        "Cleaned {:?}: {} removed, {} failed",
        working_dir,
        summary.removed.len(),
        summary.failed.len()
    );
    summary
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::ContextState;
    use crate::registry::{ExportShape, MemberSignature, TypeRegistry, WasmType};
    use std::sync::Arc;

    #[derive(Debug, Clone, PartialEq, Eq)]
    enum Call {
        Create(usize),
        Load(usize, Vec<u8>),
        Unload(usize),
    }

    /// Records every context operation; images are `;`-separated
    /// `name=render|plain` entries
    #[derive(Clone, Default)]
    struct RecordingFactory {
        calls: Arc<Mutex<Vec<Call>>>,
        on_unload: Arc<Mutex<Option<Box<dyn FnMut() + Send>>>>,
    }

    impl RecordingFactory {
        fn calls(&self) -> Vec<Call> {
            self.calls.lock().clone()
        }

        fn live_contexts(&self) -> usize {
            let calls = self.calls();
            let created = calls.iter().filter(|c| matches!(c, Call::Create(_))).count();
            let unloaded = calls.iter().filter(|c| matches!(c, Call::Unload(_))).count();
            created - unloaded
        }
    }

    struct RecordingContext {
        id: usize,
        factory: RecordingFactory,
        registry: Option<TypeRegistry>,
        digest: Option<String>,
        state: ContextState,
    }

    impl LoadContext for RecordingContext {
        fn load_from_bytes(&mut self, image: BinaryImage) -> Result<(), LoadError> {
            self.factory
                .calls
                .lock()
                .push(Call::Load(self.id, image.as_bytes().to_vec()));
            let text = String::from_utf8(image.as_bytes().to_vec())
                .map_err(|e| LoadError::InvalidImage(e.to_string()))?;
            if text == "corrupt" {
                return Err(LoadError::InvalidImage("corrupt".to_string()));
            }

            let mut exports = vec![("memory".to_string(), ExportShape::Memory)];
            for entry in text.split(';').filter(|e| !e.is_empty()) {
                let (name, kind) = entry.split_once('=').unwrap_or((entry, "plain"));
                let results = match kind {
                    "render" => vec![WasmType::I32, WasmType::I32],
                    _ => vec![],
                };
                exports.push((
                    format!("{}#render", name),
                    ExportShape::Function(MemberSignature::new(vec![], results)),
                ));
            }
            self.registry = Some(TypeRegistry::from_exports(
                exports.iter().map(|(n, s)| (n.as_str(), s.clone())),
            ));
            self.digest = Some(image.digest());
            self.state = ContextState::Loaded;
            Ok(())
        }

        fn get_type(&self, qualified_name: &str) -> Result<ComponentType, ResolveError> {
            let registry = self.registry.as_ref().ok_or(ResolveError::NotLoaded)?;
            registry
                .get(qualified_name)
                .map(|d| ComponentType::detached(d.clone()))
                .ok_or_else(|| ResolveError::TypeNotFound(qualified_name.to_string()))
        }

        fn unload(&mut self) {
            if self.state == ContextState::Unloaded {
                return;
            }
            self.state = ContextState::Unloaded;
            self.registry = None;
            self.digest = None;
            self.factory.calls.lock().push(Call::Unload(self.id));
            if let Some(hook) = self.factory.on_unload.lock().as_mut() {
                hook();
            }
        }

        fn state(&self) -> ContextState {
            self.state
        }

        fn image_digest(&self) -> Option<&str> {
            self.digest.as_deref()
        }
    }

    impl ContextFactory for RecordingFactory {
        type Context = RecordingContext;

        fn create_context(&self) -> RecordingContext {
            let mut calls = self.calls.lock();
            let id = calls.iter().filter(|c| matches!(c, Call::Create(_))).count();
            calls.push(Call::Create(id));
            RecordingContext {
                id,
                factory: self.clone(),
                registry: None,
                digest: None,
                state: ContextState::Empty,
            }
        }
    }

    fn setup(contents: &str) -> (tempfile::TempDir, PathBuf, PathBuf) {
        let temp_dir = tempfile::tempdir().unwrap();
        let working_dir = temp_dir.path().join("work");
        let binary = temp_dir.path().join("component.wasm");
        std::fs::write(&binary, contents).unwrap();
        (temp_dir, working_dir, binary)
    }

    #[test]
    fn test_load_creates_working_dir() {
        let (_temp, working_dir, binary) = setup("Demo.Widget=render");
        let loader = ComponentLoader::with_factory(RecordingFactory::default());

        let component = loader
            .load_component_type(&working_dir, &binary, "Demo.Widget")
            .unwrap()
            .unwrap();
        assert_eq!(component.qualified_name(), "Demo.Widget");
        assert!(working_dir.is_dir());

        // already present is fine
        assert!(
            loader
                .load_component_type(&working_dir, &binary, "Demo.Widget")
                .unwrap()
                .is_some()
        );
    }

    #[test]
    fn test_at_most_one_live_context() {
        let (_temp, working_dir, binary) = setup("Demo.Widget=render");
        let factory = RecordingFactory::default();
        let loader = ComponentLoader::with_factory(factory.clone());

        for _ in 0..5 {
            loader
                .load_component_type(&working_dir, &binary, "Demo.Widget")
                .unwrap();
            assert_eq!(factory.live_contexts(), 1);
        }
        assert!(loader.has_current());

        assert!(loader.unload_previous());
        assert_eq!(factory.live_contexts(), 0);
        assert!(!loader.has_current());
        assert!(!loader.unload_previous());
    }

    #[test]
    fn test_unload_happens_before_read() {
        let (_temp, working_dir, binary) = setup("Demo.Widget=render");
        let factory = RecordingFactory::default();
        let loader = ComponentLoader::with_factory(factory.clone());

        loader
            .load_component_type(&working_dir, &binary, "Demo.Widget")
            .unwrap()
            .unwrap();

        // The build rewrites the file only once the old module is released
        let rewrite_target = binary.clone();
        *factory.on_unload.lock() = Some(Box::new(move || {
            std::fs::write(&rewrite_target, "Demo.Gadget=render").unwrap();
        }));

        let gadget = loader
            .load_component_type(&working_dir, &binary, "Demo.Gadget")
            .unwrap();
        assert!(gadget.is_some());

        assert_eq!(
            factory.calls(),
            vec![
                Call::Create(0),
                Call::Load(0, b"Demo.Widget=render".to_vec()),
                Call::Unload(0),
                Call::Create(1),
                Call::Load(1, b"Demo.Gadget=render".to_vec()),
            ]
        );
    }

    #[test]
    fn test_capability_gate() {
        let (_temp, working_dir, binary) = setup("Demo.Foo=plain;Demo.Bar=render");
        let loader = ComponentLoader::with_factory(RecordingFactory::default());

        assert!(
            loader
                .load_component_type(&working_dir, &binary, "Demo.Foo")
                .unwrap()
                .is_none()
        );
        let err = loader
            .try_load_component_type(&working_dir, &binary, "Demo.Foo")
            .unwrap_err();
        assert!(matches!(
            err,
            ComponentError::Resolve(ResolveError::CapabilityMismatch { ref name, missing: Capability::Renderable }) if name == "Demo.Foo"
        ));

        let bar = loader
            .load_component_type(&working_dir, &binary, "Demo.Bar")
            .unwrap()
            .unwrap();
        assert_eq!(bar.qualified_name(), "Demo.Bar");
    }

    #[test]
    fn test_missing_type_is_none() {
        let (_temp, working_dir, binary) = setup("Demo.Widget=render");
        let loader = ComponentLoader::with_factory(RecordingFactory::default());

        assert!(
            loader
                .load_component_type(&working_dir, &binary, "Demo.Gadget")
                .unwrap()
                .is_none()
        );
        assert!(matches!(
            loader.try_load_component_type(&working_dir, &binary, "Demo.Gadget"),
            Err(ComponentError::Resolve(ResolveError::TypeNotFound(_)))
        ));
    }

    #[test]
    fn test_invalid_image_is_none_and_context_stays_current() {
        let (_temp, working_dir, binary) = setup("corrupt");
        let factory = RecordingFactory::default();
        let loader = ComponentLoader::with_factory(factory.clone());

        assert!(
            loader
                .load_component_type(&working_dir, &binary, "Demo.Widget")
                .unwrap()
                .is_none()
        );
        assert!(loader.has_current());
        assert!(loader.current_digest().is_none());
        assert_eq!(factory.live_contexts(), 1);
    }

    #[test]
    fn test_read_failure_propagates() {
        let (temp, working_dir, _binary) = setup("Demo.Widget=render");
        let factory = RecordingFactory::default();
        let loader = ComponentLoader::with_factory(factory.clone());
        let missing = temp.path().join("missing.wasm");

        let err = loader
            .load_component_type(&working_dir, &missing, "Demo.Widget")
            .unwrap_err();
        assert!(matches!(err, LoaderError::ReadBinary { ref path, .. } if path == &missing));

        // The fresh context exists but never received an image
        assert_eq!(factory.calls(), vec![Call::Create(0)]);
    }

    #[test]
    fn test_current_digest_follows_image() {
        let (_temp, working_dir, binary) = setup("Demo.Widget=render");
        let loader = ComponentLoader::with_factory(RecordingFactory::default());
        assert!(loader.current_digest().is_none());

        loader
            .load_component_type(&working_dir, &binary, "Demo.Widget")
            .unwrap();
        let expected = BinaryImage::read(&binary).unwrap().digest();
        assert_eq!(loader.current_digest(), Some(expected));
    }

    #[test]
    fn test_cleanup_is_best_effort() {
        let temp_dir = tempfile::tempdir().unwrap();
        let dir = temp_dir.path();
        std::fs::write(dir.join("a.wasm"), b"a").unwrap();
        // Deleting a directory with remove_file fails
        std::fs::create_dir(dir.join("b.wasm")).unwrap();
        std::fs::write(dir.join("c.wasm"), b"c").unwrap();
        std::fs::write(dir.join("notes.txt"), b"keep").unwrap();

        let loader = ComponentLoader::with_factory(RecordingFactory::default());
        let summary = loader.clean_up_old_binaries(dir);

        assert_eq!(summary.removed, vec![dir.join("a.wasm"), dir.join("c.wasm")]);
        assert_eq!(summary.failed.len(), 1);
        assert_eq!(summary.failed[0].path, dir.join("b.wasm"));
        assert!(!dir.join("a.wasm").exists());
        assert!(!dir.join("c.wasm").exists());
        assert!(dir.join("notes.txt").exists());
    }

    #[test]
    fn test_cleanup_missing_dir() {
        let temp_dir = tempfile::tempdir().unwrap();
        let loader = ComponentLoader::with_factory(RecordingFactory::default());
        let summary = loader.clean_up_old_binaries(temp_dir.path().join("absent"));
        assert!(summary.removed.is_empty());
        assert!(summary.failed.is_empty());
    }

    #[test]
    fn test_cleanup_keeps_watched_binary_and_custom_extension() {
        let temp_dir = tempfile::tempdir().unwrap();
        let dir = temp_dir.path();
        std::fs::write(dir.join("live.dll"), b"live").unwrap();
        std::fs::write(dir.join("old.dll"), b"old").unwrap();
        std::fs::write(dir.join("old.wasm"), b"old").unwrap();

        let loader = ComponentLoader::with_factory(RecordingFactory::default())
            .with_binary_extension(".dll");
        assert_eq!(loader.binary_extension(), "dll");

        let summary = loader.clean_up_old_binaries_except(dir, Some(&dir.join("live.dll")));
        assert_eq!(summary.removed, vec![dir.join("old.dll")]);
        assert!(dir.join("live.dll").exists());
        assert!(dir.join("old.wasm").exists());
    }

    #[test]
    fn test_remove_stale_binaries_without_loader() {
        let temp_dir = tempfile::tempdir().unwrap();
        let dir = temp_dir.path();
        std::fs::write(dir.join("a.wasm"), b"old").unwrap();
        std::fs::write(dir.join("b.wasm"), b"old").unwrap();
        std::fs::write(dir.join("ui.wasm"), b"live").unwrap();
        std::fs::write(dir.join("notes.txt"), b"keep").unwrap();

        let summary = remove_stale_binaries(dir, ".wasm", Some(&dir.join("ui.wasm")));
        assert_eq!(summary.removed, vec![dir.join("a.wasm"), dir.join("b.wasm")]);
        assert!(summary.failed.is_empty());
        assert!(dir.join("ui.wasm").exists());
        assert!(dir.join("notes.txt").exists());
    }
}
