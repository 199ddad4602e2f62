//! Configuration types deserialized from `trellis.toml`.

use std::path::{Path, PathBuf};

use serde::Deserialize;
use trellis_common::BuildId;
use trellis_typecache::{InventoryTypeSystem, TypeEntry, DEFAULT_CACHE_NAME};

/// The top-level configuration parsed from `trellis.toml`.
#[derive(Debug, Deserialize)]
pub struct ProjectConfig {
    /// Type cache location and filtering.
    #[serde(default)]
    pub cache: CacheConfig,
    /// The assemblies whose types the cache covers, in enumeration order.
    #[serde(default)]
    pub assemblies: Vec<AssemblyConfig>,
}

/// The `[cache]` section.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Directory holding cache documents, relative to the project directory
    /// unless absolute.
    pub dir: PathBuf,
    /// Cache name; the document is `<dir>/<name>.xml`.
    pub name: String,
    /// Keep only types whose simple name ends with this suffix.
    pub type_suffix: Option<String>,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from(".trellis-cache"),
            name: DEFAULT_CACHE_NAME.to_string(),
            type_suffix: None,
        }
    }
}

impl CacheConfig {
    /// Resolves the cache directory against the project directory.
    pub fn resolve_dir(&self, project_dir: &Path) -> PathBuf {
        if self.dir.is_absolute() {
            self.dir.clone()
        } else {
            project_dir.join(&self.dir)
        }
    }

    /// Builds the type filter described by this section, if any, together
    /// with the key that identifies it in cache documents.
    pub fn type_filter(
        &self,
    ) -> Option<(String, impl Fn(&TypeEntry) -> bool + Send + Sync + 'static)> {
        let suffix = self.type_suffix.clone()?;
        let key = format!("type_suffix={suffix}");
        Some((key, move |ty: &TypeEntry| ty.simple_name().ends_with(suffix.as_str())))
    }
}

/// One `[[assemblies]]` entry.
#[derive(Debug, Deserialize)]
pub struct AssemblyConfig {
    /// Assembly full name.
    pub name: String,
    /// Modules of the assembly.
    #[serde(default)]
    pub modules: Vec<ModuleConfig>,
}

/// One `[[assemblies.modules]]` entry.
#[derive(Debug, Deserialize)]
pub struct ModuleConfig {
    /// Module name, unique within its assembly.
    pub name: String,
    /// Explicit build identifier; derived from the module content when absent.
    #[serde(default)]
    pub build_id: Option<BuildId>,
    /// Fully-qualified names of the types the module declares.
    #[serde(default)]
    pub types: Vec<String>,
}

impl ProjectConfig {
    /// Builds the type system described by the `[[assemblies]]` inventory.
    pub fn type_system(&self) -> InventoryTypeSystem {
        let mut ts = InventoryTypeSystem::new();
        for asm in &self.assemblies {
            for module in &asm.modules {
                ts.add_module(&asm.name, &module.name, module.build_id, module.types.iter().cloned());
            }
        }
        ts
    }
}
