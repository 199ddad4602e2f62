//! Configuration file loading and validation.

use std::collections::{HashMap, HashSet};
use std::path::Path;

use crate::error::ConfigError;
use crate::types::ProjectConfig;

/// Name of the configuration file within a project directory.
pub const CONFIG_FILE: &str = "trellis.toml";

/// Loads and validates `trellis.toml` from a project directory.
pub fn load_config(project_dir: &Path) -> Result<ProjectConfig, ConfigError> {
    load_config_file(&project_dir.join(CONFIG_FILE))
}

/// Loads and validates a configuration file at an explicit path.
pub fn load_config_file(path: &Path) -> Result<ProjectConfig, ConfigError> {
    let content = std::fs::read_to_string(path)?;
    load_config_from_str(&content)
}

/// Parses and validates a configuration from a string.
///
/// Useful for testing without filesystem dependencies.
pub fn load_config_from_str(content: &str) -> Result<ProjectConfig, ConfigError> {
    let config: ProjectConfig =
        toml::from_str(content).map_err(|e| ConfigError::ParseError(e.to_string()))?;
    validate_config(&config)?;
    Ok(config)
}

/// Checks names are present and unique at every level of the inventory.
///
/// Type names must be unique across all modules of an assembly, since a type
/// resolves by name within its assembly.
fn validate_config(config: &ProjectConfig) -> Result<(), ConfigError> {
    let name = config.cache.name.trim();
    if name.is_empty() {
        return Err(ConfigError::MissingField("cache.name".to_string()));
    }
    if name.contains(&['/', '\\'][..]) || name == "." || name == ".." {
        return Err(ConfigError::ValidationError(format!(
            "cache name '{name}' must not be a path"
        )));
    }

    let mut assemblies = HashSet::new();
    for (i, asm) in config.assemblies.iter().enumerate() {
        if asm.name.trim().is_empty() {
            return Err(ConfigError::MissingField(format!("assemblies[{i}].name")));
        }
        if !assemblies.insert(asm.name.as_str()) {
            return Err(ConfigError::ValidationError(format!(
                "duplicate assembly '{}'",
                asm.name
            )));
        }

        let mut modules = HashSet::new();
        let mut declared_by: HashMap<&str, &str> = HashMap::new();
        for (j, module) in asm.modules.iter().enumerate() {
            if module.name.trim().is_empty() {
                return Err(ConfigError::MissingField(format!(
                    "assemblies[{i}].modules[{j}].name"
                )));
            }
            if !modules.insert(module.name.as_str()) {
                return Err(ConfigError::ValidationError(format!(
                    "duplicate module '{}' in assembly '{}'",
                    module.name, asm.name
                )));
            }

            for ty in &module.types {
                if ty.trim().is_empty() {
                    return Err(ConfigError::ValidationError(format!(
                        "empty type name in module '{}'",
                        module.name
                    )));
                }
                if let Some(first) = declared_by.insert(ty.as_str(), module.name.as_str()) {
                    return Err(ConfigError::ValidationError(if first == module.name {
                        format!("duplicate type '{ty}' in module '{first}'")
                    } else {
                        format!(
                            "type '{ty}' declared by modules '{first}' and '{}' of assembly '{}'",
                            module.name, asm.name
                        )
                    }));
                }
            }
        }
    }
    Ok(())
}
