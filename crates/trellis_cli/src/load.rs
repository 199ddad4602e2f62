//! `trellis load`: run the startup load-or-populate sequence.

use trellis_typecache::CacheSource;

use crate::pipeline::load_project;
use crate::GlobalArgs;

/// Runs the `trellis load` command.
///
/// Trusts the cache document when it is valid; otherwise enumerates the
/// inventory and saves a fresh document, exactly as the framework does on
/// first use of the type cache.
pub fn run(global: &GlobalArgs) -> Result<i32, Box<dyn std::error::Error>> {
    let project = load_project(global)?;
    let cache = project.open_cache();
    let count = cache.types()?.len();

    if !global.quiet {
        let verb = match cache.source() {
            Some(CacheSource::Document) => "Loaded",
            _ => "Populated",
        };
        eprintln!("{verb:>10} {count} types from {}", cache.path().display());
    }
    Ok(0)
}
