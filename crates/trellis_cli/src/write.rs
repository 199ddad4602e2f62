//! `trellis write`: regenerate the persisted type cache.

use crate::pipeline::load_project;
use crate::GlobalArgs;

/// Runs the `trellis write` command.
///
/// Enumerates the configured inventory and replaces the cache document,
/// whatever state it was in.
pub fn run(global: &GlobalArgs) -> Result<i32, Box<dyn std::error::Error>> {
    let project = load_project(global)?;
    let cache = project.open_cache();
    let types = cache.regenerate()?;

    if !global.quiet {
        eprintln!(
            "     Wrote {} ({} types)",
            cache.path().display(),
            types.len()
        );
    }
    Ok(0)
}
