//! Fingerprints `static/` so templates can bust browser caches with
//! `?v={{ static_hash }}`.

use std::collections::hash_map::DefaultHasher;
use std::fs;
use std::hash::{Hash, Hasher};
use std::path::Path;

const STATIC_DIR: &str = "static";

fn main() {
    println!("cargo:rerun-if-changed={STATIC_DIR}/");

    let mut files: Vec<_> = fs::read_dir(Path::new(STATIC_DIR))
        .map(|dir| dir.filter_map(Result::ok).map(|e| e.path()).filter(|p| p.is_file()).collect())
        .unwrap_or_default();
    files.sort();

    let mut hasher = DefaultHasher::new();
    for path in &files {
        path.file_name().hash(&mut hasher);
        if let Ok(contents) = fs::read(path) {
            contents.hash(&mut hasher);
        }
    }

    let hash = format!("{:016x}", hasher.finish());
    println!("cargo:rustc-env=STATIC_HASH={}", &hash[..8]);
}
