//! Shared helpers for CLI commands.
//!
//! Resolves the project directory and configuration file, and opens the
//! type cache described by the configuration.

use std::path::{Path, PathBuf};

use trellis_config::{ProjectConfig, CONFIG_FILE};
use trellis_typecache::{InventoryTypeSystem, TypeCache};

use crate::GlobalArgs;

/// A loaded project: its directory and parsed configuration.
pub struct Project {
    /// Directory that relative cache paths are resolved against.
    pub root: PathBuf,
    /// The parsed `trellis.toml`.
    pub config: ProjectConfig,
}

impl Project {
    /// Opens the configured type cache over the configured inventory.
    pub fn open_cache(&self) -> TypeCache<InventoryTypeSystem> {
        let cache = TypeCache::new(
            &self.config.cache.resolve_dir(&self.root),
            &self.config.cache.name,
            self.config.type_system(),
        );
        match self.config.cache.type_filter() {
            Some((key, filter)) => cache.with_filter(&key, filter),
            None => cache,
        }
    }
}

/// Walks up from `start` looking for the nearest directory containing `trellis.toml`.
pub fn find_project_root(start: &Path) -> Result<PathBuf, Box<dyn std::error::Error>> {
    let mut current = start.to_path_buf();
    loop {
        if current.join(CONFIG_FILE).exists() {
            return Ok(current);
        }
        if !current.pop() {
            return Err(format!(
                "could not find {CONFIG_FILE} in {} or any parent directory",
                start.display()
            )
            .into());
        }
    }
}

/// Resolves the configuration file path from global CLI args.
///
/// If `--config` names a file it is used as is; a directory is searched for
/// `trellis.toml`. Otherwise walks up from the current directory.
pub fn resolve_config_file(global: &GlobalArgs) -> Result<PathBuf, Box<dyn std::error::Error>> {
    match global.config {
        Some(ref config_path) => {
            let p = PathBuf::from(config_path);
            if p.is_dir() {
                Ok(p.join(CONFIG_FILE))
            } else {
                Ok(p)
            }
        }
        None => Ok(find_project_root(&std::env::current_dir()?)?.join(CONFIG_FILE)),
    }
}

/// Loads the project selected by the global CLI args.
pub fn load_project(global: &GlobalArgs) -> Result<Project, Box<dyn std::error::Error>> {
    let config_file = resolve_config_file(global)?;
    let config = trellis_config::load_config_file(&config_file)?;
    let root = config_file
        .parent()
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from("."));
    tracing::debug!(config = %config_file.display(), "loaded project configuration");
    Ok(Project { root, config })
}
