//! Locale files on disk
//!
//! `<dir>/<lang>.json` per language, tab-indented. Under the `strip`
//! policy a `<lang>.autofill.json` side file lists the fallback paths.
//! Writes go through [`StagedWrites`] so a run replaces every file or
//! none of them.

use std::fs;
use std::path::{Path, PathBuf};

use serde::Serialize;
use serde_json::Value;
use tracing::{debug, info};
use walkdir::WalkDir;

use super::{LocaleError, LocaleSet, LocaleTable, SentinelPolicy};
use crate::output::{OutputError, StagedWrites};

/// Extension stem of the fallback side file
pub const AUTOFILL_SUFFIX: &str = "autofill";

/// Reads and writes the locale files of a project
#[derive(Debug, Clone)]
pub struct LocaleStore {
    dir: PathBuf,
}

impl LocaleStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn locale_path(&self, language: &str) -> PathBuf {
        self.dir.join(format!("{}.json", language))
    }

    fn autofill_path(&self, language: &str) -> PathBuf {
        self.dir.join(format!("{}.{}.json", language, AUTOFILL_SUFFIX))
    }

    /// Load every `<lang>.json` in the directory. A missing directory
    /// yields a set holding only an empty default-language table.
    pub fn load(&self) -> Result<LocaleSet, LocaleError> {
        let mut set = LocaleSet::new();
        if !self.dir.is_dir() {
            debug!(dir = %self.dir.display(), "no locale directory");
            return Ok(set);
        }

        let mut files: Vec<(String, PathBuf)> = WalkDir::new(&self.dir)
            .min_depth(1)
            .max_depth(1)
            .into_iter()
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.file_type().is_file())
            .filter_map(|entry| {
                let path = entry.into_path();
                if path.extension().and_then(|e| e.to_str()) != Some("json") {
                    return None;
                }
                let stem = path.file_stem()?.to_str()?.to_string();
                if stem.contains('.') {
                    return None;
                }
                Some((stem, path))
            })
            .collect();
        files.sort();

        for (language, path) in files {
            let mut table = LocaleTable::from_tree(&language, read_json(&path)?)?;

            let side = self.autofill_path(&language);
            if side.is_file() {
                let paths: Vec<String> =
                    serde_json::from_value(read_json(&side)?).map_err(|e| LocaleError::Parse {
                        path: side.clone(),
                        message: e.to_string(),
                    })?;
                table.mark_fallback(paths);
            }

            debug!(language = %language, "loaded locale");
            set.insert(language, table);
        }

        Ok(set)
    }

    /// Stage every table of the set into `writes`. Returns the target
    /// paths; nothing on disk changes until the writes are committed.
    pub fn stage(
        &self,
        set: &LocaleSet,
        policy: SentinelPolicy,
        writes: &mut StagedWrites,
    ) -> Result<Vec<PathBuf>, LocaleError> {
        fs::create_dir_all(&self.dir).map_err(|e| io_error(&self.dir, e))?;

        let mut targets = Vec::new();
        for (language, table) in set.iter() {
            let target = self.locale_path(language);
            writes
                .stage(&target, &encode(&table.render(policy))?)
                .map_err(output_error)?;
            targets.push(target);

            let fallback: Vec<&String> = table.fallback_paths().collect();
            let side = self.autofill_path(language);
            if policy == SentinelPolicy::Strip && !fallback.is_empty() {
                writes.stage(&side, &encode(&fallback)?).map_err(output_error)?;
                targets.push(side);
            } else if side.exists() {
                writes.remove(side);
            }
        }

        debug!(files = targets.len(), dir = %self.dir.display(), "staged locales");
        Ok(targets)
    }

    /// Write every table of the set. Either every file is replaced or
    /// none is.
    pub fn persist(&self, set: &LocaleSet, policy: SentinelPolicy) -> Result<Vec<PathBuf>, LocaleError> {
        let mut writes = StagedWrites::new();
        self.stage(set, policy, &mut writes)?;
        let written = writes.commit().map_err(output_error)?;

        info!(files = written.len(), dir = %self.dir.display(), "persisted locales");
        Ok(written)
    }
}

fn read_json(path: &Path) -> Result<Value, LocaleError> {
    let contents = fs::read_to_string(path).map_err(|e| io_error(path, e))?;
    serde_json::from_str(&contents).map_err(|e| LocaleError::Parse {
        path: path.to_path_buf(),
        message: e.to_string(),
    })
}

/// Tab-indented JSON with a trailing newline
fn encode<T: Serialize>(value: &T) -> Result<Vec<u8>, LocaleError> {
    let mut out = Vec::new();
    let formatter = serde_json::ser::PrettyFormatter::with_indent(b"\t");
    let mut serializer = serde_json::Serializer::with_formatter(&mut out, formatter);
    value.serialize(&mut serializer).map_err(|e| LocaleError::Io {
        path: PathBuf::new(),
        message: e.to_string(),
    })?;
    out.push(b'\n');
    Ok(out)
}

fn io_error(path: &Path, e: std::io::Error) -> LocaleError {
    LocaleError::Io {
        path: path.to_path_buf(),
        message: e.to_string(),
    }
}

fn output_error(e: OutputError) -> LocaleError {
    io_error(&e.path, e.source)
}
