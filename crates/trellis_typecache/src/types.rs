//! Identities of discovered types and their declaring modules.

use std::fmt;

/// Identity of a module: its declaring assembly plus the module name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ModuleRef {
    /// Full name of the declaring assembly.
    pub assembly: String,
    /// Module name within the assembly.
    pub name: String,
}

impl ModuleRef {
    /// Creates a module reference.
    pub fn new(assembly: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            assembly: assembly.into(),
            name: name.into(),
        }
    }
}

impl fmt::Display for ModuleRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.name, self.assembly)
    }
}

/// A discovered type: its fully-qualified name and declaring module.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TypeEntry {
    /// Fully-qualified type name, e.g. `Shop.Web.Controllers.HomeController`.
    pub full_name: String,
    /// The module that declares the type.
    pub module: ModuleRef,
}

impl TypeEntry {
    /// Creates a type entry.
    pub fn new(full_name: impl Into<String>, module: ModuleRef) -> Self {
        Self {
            full_name: full_name.into(),
            module,
        }
    }

    /// Name of the declaring assembly.
    pub fn assembly(&self) -> &str {
        &self.module.assembly
    }

    /// The type name without its namespace or enclosing type.
    pub fn simple_name(&self) -> &str {
        self.full_name
            .rsplit(&['.', '+'][..])
            .next()
            .unwrap_or(&self.full_name)
    }
}

impl fmt::Display for TypeEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}, {}", self.full_name, self.module.assembly)
    }
}
