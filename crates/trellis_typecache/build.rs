use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use xxhash_rust::xxh3::Xxh3;

fn main() {
    let manifest_dir = env::var("CARGO_MANIFEST_DIR").expect("CARGO_MANIFEST_DIR not set");
    let src_dir = Path::new(&manifest_dir).join("src");

    let mut files = Vec::new();
    collect_sources(&src_dir, &mut files);
    files.sort();

    // Relative path and contents of every source file, so any code change
    // yields a different cache owner identifier.
    let mut hasher = Xxh3::new();
    for file in &files {
        let relative = file.strip_prefix(&src_dir).unwrap_or(file);
        hasher.update(relative.to_string_lossy().as_bytes());
        hasher.update(&[0]);
        hasher.update(&fs::read(file).expect("failed to read source file"));
        hasher.update(&[0]);
    }

    println!(
        "cargo:rustc-env=TRELLIS_TYPECACHE_SOURCE_HASH={:032x}",
        hasher.digest128()
    );
    println!("cargo:rerun-if-changed={}", src_dir.display());
}

fn collect_sources(dir: &Path, files: &mut Vec<PathBuf>) {
    let entries = fs::read_dir(dir).expect("failed to read source directory");
    for entry in entries {
        let path = entry.expect("failed to read directory entry").path();
        if path.is_dir() {
            collect_sources(&path, files);
        } else if path.extension().is_some_and(|ext| ext == "rs") {
            files.push(path);
        }
    }
}
