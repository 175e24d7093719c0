//! Exported type registry
//!
//! A component module declares its exported types through export names:
//! a function exported as `Demo.Ui.Widget#render` is member `render` of
//! type `Demo.Ui.Widget`. Exports without a `#` belong to the module itself.
//! Capabilities are derived from member signatures once, at load time, so
//! resolution is a map lookup and validation a set membership test.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use serde::{Deserialize, Serialize};
use wasmtime::{ExternType, Module, ValType};

/// Separator between qualified type name and member name in an export
pub const MEMBER_SEPARATOR: char = '#';

/// Name of the linear memory a renderable component writes its output to
pub const MEMORY_EXPORT: &str = "memory";

/// Member every renderable component exposes
pub const RENDER_MEMBER: &str = "render";

/// WASM value types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum WasmType {
    I32,
    I64,
    F32,
    F64,
    V128,
    Ref,
}

impl From<&ValType> for WasmType {
    fn from(ty: &ValType) -> Self {
        match ty {
            ValType::I32 => WasmType::I32,
            ValType::I64 => WasmType::I64,
            ValType::F32 => WasmType::F32,
            ValType::F64 => WasmType::F64,
            ValType::V128 => WasmType::V128,
            ValType::Ref(_) => WasmType::Ref,
        }
    }
}

impl fmt::Display for WasmType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WasmType::I32 => write!(f, "i32"),
            WasmType::I64 => write!(f, "i64"),
            WasmType::F32 => write!(f, "f32"),
            WasmType::F64 => write!(f, "f64"),
            WasmType::V128 => write!(f, "v128"),
            WasmType::Ref => write!(f, "ref"),
        }
    }
}

/// Function signature of a type member
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemberSignature {
    pub params: Vec<WasmType>,
    pub results: Vec<WasmType>,
}

impl MemberSignature {
    pub fn new(params: Vec<WasmType>, results: Vec<WasmType>) -> Self {
        Self { params, results }
    }
}

impl fmt::Display for MemberSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let join = |types: &[WasmType]| {
            types
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join(", ")
        };
        write!(f, "({}) -> ({})", join(&self.params), join(&self.results))
    }
}

/// Shape of a single module export, independent of the runtime
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExportShape {
    Function(MemberSignature),
    Memory,
    Other,
}

/// Capabilities a component type may satisfy
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Capability {
    /// Can be handed to the host and rendered
    Renderable,
}

impl Capability {
    /// All known capabilities
    pub const ALL: [Capability; 1] = [Capability::Renderable];

    /// Whether a type with these members, in a module with these exports, satisfies this capability
    fn is_satisfied_by(
        &self,
        members: &BTreeMap<String, MemberSignature>,
        exports_memory: bool,
    ) -> bool {
        match self {
            Capability::Renderable => {
                exports_memory
                    && members.get(RENDER_MEMBER).is_some_and(|sig| {
                        sig.params.is_empty() && sig.results == [WasmType::I32, WasmType::I32]
                    })
            }
        }
    }
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Capability::Renderable => write!(f, "renderable"),
        }
    }
}

/// Descriptor of an exported type
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypeDescriptor {
    qualified_name: String,
    members: BTreeMap<String, MemberSignature>,
    capabilities: BTreeSet<Capability>,
}

impl TypeDescriptor {
    /// Fully qualified type name
    pub fn qualified_name(&self) -> &str {
        &self.qualified_name
    }

    /// Members by name
    pub fn members(&self) -> &BTreeMap<String, MemberSignature> {
        &self.members
    }

    /// Export name of a member of this type
    pub fn export_name(&self, member: &str) -> String {
        format!("{}{}{}", self.qualified_name, MEMBER_SEPARATOR, member)
    }

    /// Capability set derived at load time
    pub fn capabilities(&self) -> &BTreeSet<Capability> {
        &self.capabilities
    }

    pub fn has_capability(&self, capability: Capability) -> bool {
        self.capabilities.contains(&capability)
    }
}

/// Mapping from qualified name to type descriptor for one loaded module
#[derive(Debug, Clone, Default)]
pub struct TypeRegistry {
    types: BTreeMap<String, TypeDescriptor>,
}

impl TypeRegistry {
    /// Build a registry from export names and shapes
    pub fn from_exports<'a, I>(exports: I) -> Self
    where
        I: IntoIterator<Item = (&'a str, ExportShape)>,
    {
        let mut members: BTreeMap<String, BTreeMap<String, MemberSignature>> = BTreeMap::new();
        let mut exports_memory = false;

        for (name, shape) in exports {
            match shape {
                ExportShape::Memory if name == MEMORY_EXPORT => exports_memory = true,
                ExportShape::Function(signature) => {
                    // Member names never contain the separator; type names may
                    let Some((type_name, member)) = name.rsplit_once(MEMBER_SEPARATOR) else {
                        continue;
                    };
                    if type_name.is_empty() || member.is_empty() {
                        continue;
                    }
                    members
                        .entry(type_name.to_string())
                        .or_default()
                        .insert(member.to_string(), signature);
                }
                _ => {}
            }
        }

        let types = members
            .into_iter()
            .map(|(qualified_name, members)| {
                let capabilities = Capability::ALL
                    .into_iter()
                    .filter(|c| c.is_satisfied_by(&members, exports_memory))
                    .collect();
                let descriptor = TypeDescriptor {
                    qualified_name: qualified_name.clone(),
                    members,
                    capabilities,
                };
                (qualified_name, descriptor)
            })
            .collect();

        Self { types }
    }

    /// Build a registry from a compiled module's export section
    pub fn from_module(module: &Module) -> Self {
        let shapes: Vec<(String, ExportShape)> = module
            .exports()
            .map(|export| {
                let shape = match export.ty() {
                    ExternType::Func(func) => ExportShape::Function(MemberSignature::new(
                        func.params().map(|t| WasmType::from(&t)).collect(),
                        func.results().map(|t| WasmType::from(&t)).collect(),
                    )),
                    ExternType::Memory(_) => ExportShape::Memory,
                    _ => ExportShape::Other,
                };
                (export.name().to_string(), shape)
            })
            .collect();

        Self::from_exports(shapes.iter().map(|(name, shape)| (name.as_str(), shape.clone())))
    }

    /// Exact-match lookup by qualified name
    pub fn get(&self, qualified_name: &str) -> Option<&TypeDescriptor> {
        self.types.get(qualified_name)
    }

    /// Qualified names of all exported types
    pub fn type_names(&self) -> impl Iterator<Item = &str> {
        self.types.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.types.len()
    }

    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }
}
