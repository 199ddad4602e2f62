//! `trellis check`: validate the persisted type cache.
//!
//! Reads the cache document and checks it against the configured inventory
//! without touching it. Exit code 0 means the document would be trusted at
//! startup, 1 means it would be regenerated.

use std::path::Path;

use serde_json::{json, Value};
use trellis_typecache::{Invalidation, TypeEntry};

use crate::pipeline::load_project;
use crate::{CheckArgs, GlobalArgs, ReportFormat};

/// Runs the `trellis check` command.
pub fn run(args: &CheckArgs, global: &GlobalArgs) -> Result<i32, Box<dyn std::error::Error>> {
    let project = load_project(global)?;
    let cache = project.open_cache();
    let outcome = cache.read_document();

    match args.format {
        ReportFormat::Text => {
            if !global.quiet {
                match &outcome {
                    Ok(types) => println!(
                        "     Valid {} ({} types)",
                        cache.path().display(),
                        types.len()
                    ),
                    Err(reason) => println!("     Stale {}: {reason}", cache.path().display()),
                }
            }
        }
        ReportFormat::Json => {
            println!("{}", serde_json::to_string_pretty(&report(cache.path(), &outcome))?);
        }
    }

    Ok(if outcome.is_ok() { 0 } else { 1 })
}

/// Builds the machine-readable check report.
fn report(path: &Path, outcome: &Result<Vec<TypeEntry>, Invalidation>) -> Value {
    match outcome {
        Ok(types) => json!({
            "path": path.display().to_string(),
            "valid": true,
            "types": types.len(),
            "reason": null,
        }),
        Err(reason) => json!({
            "path": path.display().to_string(),
            "valid": false,
            "types": null,
            "reason": {
                "kind": reason.kind().as_str(),
                "message": reason.to_string(),
            },
        }),
    }
}
