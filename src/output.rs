//! Staged multi-file output
//!
//! Every file of a run is first written next to its target as
//! `<name>.tmp`. [`StagedWrites::commit`] moves existing targets aside,
//! renames the staged files into place and restores the previous files if
//! any step fails. Uncommitted temporary files are removed on drop.

use std::ffi::OsString;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::{debug, warn};

/// A failed output write
#[derive(Debug, Error)]
#[error("Failed to write {}: {source}", .path.display())]
pub struct OutputError {
    pub path: PathBuf,
    #[source]
    pub source: io::Error,
}

impl OutputError {
    fn new(path: &Path, source: io::Error) -> Self {
        Self {
            path: path.to_path_buf(),
            source,
        }
    }
}

fn sibling(target: &Path, suffix: &str) -> PathBuf {
    let mut name: OsString = target.file_name().map(OsString::from).unwrap_or_default();
    name.push(suffix);
    target.with_file_name(name)
}

/// Files staged for one all-or-nothing commit
#[derive(Debug, Default)]
pub struct StagedWrites {
    staged: Vec<(PathBuf, PathBuf)>,
    removals: Vec<PathBuf>,
    committed: bool,
}

impl StagedWrites {
    pub fn new() -> Self {
        Self::default()
    }

    /// Write `bytes` to the temporary sibling of `target`
    pub fn stage(&mut self, target: impl Into<PathBuf>, bytes: &[u8]) -> Result<(), OutputError> {
        let target = target.into();
        let temp = sibling(&target, ".tmp");
        if let Err(e) = fs::write(&temp, bytes) {
            let _ = fs::remove_file(&temp);
            return Err(OutputError::new(&temp, e));
        }
        self.staged.push((temp, target));
        Ok(())
    }

    /// Delete `target` as part of the commit, if it exists then
    pub fn remove(&mut self, target: impl Into<PathBuf>) {
        self.removals.push(target.into());
    }

    pub fn len(&self) -> usize {
        self.staged.len()
    }

    pub fn is_empty(&self) -> bool {
        self.staged.is_empty() && self.removals.is_empty()
    }

    /// Move every staged file into place. On failure every target holds
    /// its previous content again.
    pub fn commit(mut self) -> Result<Vec<PathBuf>, OutputError> {
        let mut backups: Vec<(PathBuf, PathBuf)> = Vec::new();
        let mut placed: Vec<PathBuf> = Vec::new();

        let result = self.swap(&mut backups, &mut placed);
        if let Err(e) = result {
            for target in &placed {
                let _ = fs::remove_file(target);
            }
            for (backup, original) in backups.iter().rev() {
                if let Err(restore) = fs::rename(backup, original) {
                    warn!(path = %original.display(), error = %restore, "could not restore previous file");
                }
            }
            return Err(e);
        }

        for (backup, _) in &backups {
            let _ = fs::remove_file(backup);
        }
        self.committed = true;
        debug!(files = placed.len(), "committed staged output");
        Ok(placed)
    }

    fn swap(
        &self,
        backups: &mut Vec<(PathBuf, PathBuf)>,
        placed: &mut Vec<PathBuf>,
    ) -> Result<(), OutputError> {
        let displaced = self
            .staged
            .iter()
            .map(|(_, target)| target)
            .chain(self.removals.iter());
        for original in displaced {
            if original.exists() {
                let backup = sibling(original, ".bak");
                fs::rename(original, &backup).map_err(|e| OutputError::new(original, e))?;
                backups.push((backup, original.clone()));
            }
        }

        for (temp, target) in &self.staged {
            fs::rename(temp, target).map_err(|e| OutputError::new(target, e))?;
            placed.push(target.clone());
        }
        Ok(())
    }
}

impl Drop for StagedWrites {
    fn drop(&mut self) {
        if self.committed {
            return;
        }
        for (temp, _) in &self.staged {
            let _ = fs::remove_file(temp);
        }
    }
}
