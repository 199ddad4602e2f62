//! `trellis show`: print the persisted type cache as recorded.

use trellis_typecache::TypeCacheDocument;

use crate::pipeline::load_project;
use crate::GlobalArgs;

/// Runs the `trellis show` command.
///
/// Parses the document without validating identifiers, so stale caches can
/// be inspected too. A malformed document is an error.
pub fn run(global: &GlobalArgs) -> Result<i32, Box<dyn std::error::Error>> {
    let project = load_project(global)?;
    let cache = project.open_cache();
    let path = cache.path();

    let xml = std::fs::read_to_string(path)
        .map_err(|e| format!("failed to read {}: {e}", path.display()))?;
    let document = TypeCacheDocument::parse(&xml)?;
    print!("{}", render(&document));
    Ok(0)
}

/// Renders a document as an indented outline.
fn render(document: &TypeCacheDocument) -> String {
    let mut out = format!(
        "owner {} (written {})\n",
        document.owner_id,
        document.last_modified.as_deref().unwrap_or("unknown")
    );
    if let Some(filter_id) = document.filter_id {
        out.push_str(&format!("filter {filter_id}\n"));
    }
    for asm in &document.assemblies {
        out.push_str(&format!("{}\n", asm.name));
        for module in &asm.modules {
            out.push_str(&format!("  module {}\n", module.version_id));
            for ty in &module.types {
                out.push_str(&format!("    {ty}\n"));
            }
        }
    }
    out
}
