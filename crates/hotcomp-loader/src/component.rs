//! Resolved component type handles

use std::collections::BTreeSet;
use std::fmt;
use std::sync::{Arc, Weak};

use crate::context::LoadedModule;
use crate::error::RenderError;
use crate::registry::{Capability, TypeDescriptor};

/// Handle to an exported type inside a loaded module
///
/// The handle holds only a weak reference to its module. Once the owning
/// load context is unloaded the handle is dead: [`ComponentType::render`]
/// returns [`RenderError::Unloaded`] and retaining the handle does not keep
/// the module in memory.
#[derive(Clone)]
pub struct ComponentType {
    descriptor: Arc<TypeDescriptor>,
    digest: Option<Arc<str>>,
    module: Weak<LoadedModule>,
}

impl ComponentType {
    pub(crate) fn new(descriptor: TypeDescriptor, module: &Arc<LoadedModule>) -> Self {
        Self {
            descriptor: Arc::new(descriptor),
            digest: Some(module.shared_digest()),
            module: Arc::downgrade(module),
        }
    }

    /// A handle not backed by any module
    ///
    /// Entry point for [`LoadContext`](crate::context::LoadContext)
    /// implementations outside this crate that resolve types without
    /// executing code, such as test doubles. The handle reports
    /// `is_alive() == false` and `render()` fails with
    /// [`RenderError::Unloaded`].
    pub fn detached(descriptor: TypeDescriptor) -> Self {
        Self {
            descriptor: Arc::new(descriptor),
            digest: None,
            module: Weak::new(),
        }
    }

    pub fn qualified_name(&self) -> &str {
        self.descriptor.qualified_name()
    }

    pub fn descriptor(&self) -> &TypeDescriptor {
        &self.descriptor
    }

    pub fn capabilities(&self) -> &BTreeSet<Capability> {
        self.descriptor.capabilities()
    }

    pub fn has_capability(&self, capability: Capability) -> bool {
        self.descriptor.has_capability(capability)
    }

    pub fn is_renderable(&self) -> bool {
        self.has_capability(Capability::Renderable)
    }

    /// Digest of the binary image this type was loaded from
    pub fn image_digest(&self) -> Option<&str> {
        self.digest.as_deref()
    }

    /// Whether the owning module is still loaded
    pub fn is_alive(&self) -> bool {
        self.module.strong_count() > 0
    }

    /// Render the component to its markup
    pub fn render(&self) -> Result<String, RenderError> {
        if !self.is_renderable() {
            return Err(RenderError::NotRenderable(self.qualified_name().to_string()));
        }
        let module = self.module.upgrade().ok_or(RenderError::Unloaded)?;
        module.render(&self.descriptor)
    }
}

impl fmt::Debug for ComponentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ComponentType")
            .field("qualified_name", &self.qualified_name())
            .field("capabilities", self.capabilities())
            .field("alive", &self.is_alive())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::{ExportShape, MemberSignature, TypeRegistry, WasmType};

    fn descriptor(name: &str, renderable: bool) -> TypeDescriptor {
        let results = if renderable {
            vec![WasmType::I32, WasmType::I32]
        } else {
            vec![]
        };
        let export = format!("{}#render", name);
        let registry = TypeRegistry::from_exports([
            ("memory", ExportShape::Memory),
            (
                export.as_str(),
                ExportShape::Function(MemberSignature::new(vec![], results)),
            ),
        ]);
        registry.get(name).unwrap().clone()
    }

    #[test]
    fn test_detached_handle() {
        let component = ComponentType::detached(descriptor("Demo.Widget", true));
        assert_eq!(component.qualified_name(), "Demo.Widget");
        assert!(component.is_renderable());
        assert!(!component.is_alive());
        assert!(component.image_digest().is_none());
        assert!(matches!(component.render(), Err(RenderError::Unloaded)));
    }

    #[test]
    fn test_render_requires_capability() {
        let component = ComponentType::detached(descriptor("Demo.Foo", false));
        assert!(matches!(
            component.render(),
            Err(RenderError::NotRenderable(name)) if name == "Demo.Foo"
        ));
    }

    #[test]
    fn test_debug_output() {
        let component = ComponentType::detached(descriptor("Demo.Widget", true));
        let debug = format!("{:?}", component);
        assert!(debug.contains("Demo.Widget"));
        assert!(debug.contains("Renderable"));
    }
}
