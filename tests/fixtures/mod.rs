//! Shared fixtures for integration tests
//!
//! `app/` is a minimal app root: a shared base fragment under `lib/`, a
//! project fragment under `433_generator/` and one Dutch locale file.

#![allow(dead_code)]

use rfgen::{ConfigReader, FileReader, Fragment};
use std::fs;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// Path to the fixture app root
pub fn app_root() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures/app")
}

/// Copy the fixture app into `dest` so a test can write outputs
pub fn stage_app(dest: &Path) {
    let root = app_root();
    for entry in WalkDir::new(&root).min_depth(1) {
        let entry = entry.expect("walk fixture app");
        let target = dest.join(entry.path().strip_prefix(&root).expect("fixture path"));
        if entry.file_type().is_dir() {
            fs::create_dir_all(&target).expect("create fixture dir");
        } else {
            fs::copy(entry.path(), &target).expect("copy fixture file");
        }
    }
}

/// Read one fragment of the fixture app by directory name
pub fn fragment(dir: &str) -> Fragment {
    let value = FileReader
        .read(&app_root().join(dir))
        .expect("read fixture fragment");
    Fragment::from_value(value).expect("fixture fragment shape")
}
