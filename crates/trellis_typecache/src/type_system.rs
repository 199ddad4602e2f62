//! The reflection capability the type cache depends on.
//!
//! The cache never inspects loaded code directly. It asks a [`TypeSystem`] to
//! enumerate types, to resolve a type by name within an assembly, and to
//! report the build identifier of a module. [`InventoryTypeSystem`] is an
//! in-memory implementation backed by an explicit list of assemblies.

use std::collections::HashMap;

use trellis_common::BuildId;

use crate::types::{ModuleRef, TypeEntry};

/// Read-only view of the types loaded in the current process.
pub trait TypeSystem {
    /// Enumerates every loaded type. This is the expensive operation the
    /// cache exists to avoid.
    fn enumerate_types(&self) -> Vec<TypeEntry>;

    /// Returns the build identifiers of all modules of the named assembly,
    /// or `None` if no assembly with that name is loaded.
    fn module_build_ids(&self, assembly: &str) -> Option<Vec<BuildId>>;

    /// Resolves a fully-qualified type name within the named assembly.
    fn resolve_type(&self, assembly: &str, full_name: &str) -> Option<TypeEntry>;

    /// Returns the build identifier of a loaded module.
    fn build_id_of(&self, module: &ModuleRef) -> Option<BuildId>;
}

impl<T: TypeSystem + ?Sized> TypeSystem for &T {
    fn enumerate_types(&self) -> Vec<TypeEntry> {
        (**self).enumerate_types()
    }

    fn module_build_ids(&self, assembly: &str) -> Option<Vec<BuildId>> {
        (**self).module_build_ids(assembly)
    }

    fn resolve_type(&self, assembly: &str, full_name: &str) -> Option<TypeEntry> {
        (**self).resolve_type(assembly, full_name)
    }

    fn build_id_of(&self, module: &ModuleRef) -> Option<BuildId> {
        (**self).build_id_of(module)
    }
}

#[derive(Debug, Clone)]
struct ModuleInventory {
    name: String,
    build_id: BuildId,
    types: Vec<String>,
}

#[derive(Debug, Clone)]
struct AssemblyInventory {
    name: String,
    modules: Vec<ModuleInventory>,
    /// Type name to index into `modules`; first declaration wins.
    type_index: HashMap<String, usize>,
}

/// A [`TypeSystem`] over an explicit inventory of assemblies, modules and types.
///
/// Enumeration order is insertion order: assemblies, then modules within an
/// assembly, then types within a module. A type name declared by several
/// modules of one assembly is enumerated once, from the module it resolves to.
#[derive(Debug, Clone, Default)]
pub struct InventoryTypeSystem {
    assemblies: Vec<AssemblyInventory>,
    assembly_index: HashMap<String, usize>,
}

impl InventoryTypeSystem {
    /// Creates an empty inventory.
    pub fn new() -> Self {
        Self::default()
    }

    /// Derives a module build identifier from the module's content: its
    /// assembly, its name and its sorted type names.
    pub fn content_build_id<S: AsRef<str>>(assembly: &str, module: &str, types: &[S]) -> BuildId {
        let mut names: Vec<&str> = types.iter().map(AsRef::as_ref).collect();
        names.sort_unstable();
        let mut content = Vec::new();
        for part in [assembly, module].into_iter().chain(names) {
            content.extend_from_slice(part.as_bytes());
            content.push(0);
        }
        BuildId::from_bytes(&content)
    }

    /// Adds a module and its types, creating the assembly on first use.
    ///
    /// When `build_id` is `None` the identifier is derived from the content
    /// with [`InventoryTypeSystem::content_build_id`]. A type name already
    /// declared by an earlier module of the same assembly keeps resolving to
    /// that earlier module.
    pub fn add_module<I, S>(
        &mut self,
        assembly: &str,
        module: &str,
        build_id: Option<BuildId>,
        types: I,
    ) -> &mut Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let types: Vec<String> = types.into_iter().map(Into::into).collect();
        let build_id =
            build_id.unwrap_or_else(|| Self::content_build_id(assembly, module, &types));

        let asm_idx = match self.assembly_index.get(assembly) {
            Some(&idx) => idx,
            None => {
                self.assemblies.push(AssemblyInventory {
                    name: assembly.to_string(),
                    modules: Vec::new(),
                    type_index: HashMap::new(),
                });
                let idx = self.assemblies.len() - 1;
                self.assembly_index.insert(assembly.to_string(), idx);
                idx
            }
        };

        let asm = &mut self.assemblies[asm_idx];
        let module_idx = asm.modules.len();
        for ty in &types {
            asm.type_index.entry(ty.clone()).or_insert(module_idx);
        }
        asm.modules.push(ModuleInventory {
            name: module.to_string(),
            build_id,
            types,
        });
        self
    }

    /// Builder-style variant of [`InventoryTypeSystem::add_module`].
    pub fn with_module<I, S>(
        mut self,
        assembly: &str,
        module: &str,
        build_id: Option<BuildId>,
        types: I,
    ) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.add_module(assembly, module, build_id, types);
        self
    }

    /// Number of assemblies in the inventory.
    pub fn assembly_count(&self) -> usize {
        self.assemblies.len()
    }

    fn assembly(&self, name: &str) -> Option<&AssemblyInventory> {
        self.assembly_index.get(name).map(|&idx| &self.assemblies[idx])
    }
}

impl TypeSystem for InventoryTypeSystem {
    fn enumerate_types(&self) -> Vec<TypeEntry> {
        self.assemblies
            .iter()
            .flat_map(|asm| {
                asm.modules.iter().enumerate().flat_map(move |(idx, m)| {
                    m.types
                        .iter()
                        .filter(move |ty| asm.type_index.get(ty.as_str()) == Some(&idx))
                        .map(move |ty| TypeEntry::new(ty.clone(), ModuleRef::new(&asm.name, &m.name)))
                })
            })
            .collect()
    }

    fn module_build_ids(&self, assembly: &str) -> Option<Vec<BuildId>> {
        self.assembly(assembly)
            .map(|asm| asm.modules.iter().map(|m| m.build_id).collect())
    }

    fn resolve_type(&self, assembly: &str, full_name: &str) -> Option<TypeEntry> {
        let asm = self.assembly(assembly)?;
        let module = &asm.modules[*asm.type_index.get(full_name)?];
        Some(TypeEntry::new(full_name, ModuleRef::new(&asm.name, &module.name)))
    }

    fn build_id_of(&self, module: &ModuleRef) -> Option<BuildId> {
        self.assembly(&module.assembly)?
            .modules
            .iter()
            .find(|m| m.name == module.name)
            .map(|m| m.build_id)
    }
}
