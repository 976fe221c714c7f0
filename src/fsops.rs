//! Filesystem access with a per-pass listing cache.
//!
//! Directory listings are read once per path and reused for the rest of a
//! run-folder pass. Every mutating operation goes through [`FsOps`], which drops
//! the cached listings of the directories it touched so later decisions never
//! act on a stale view. Folder creation is idempotent.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::error::{IntakeError, Result};

/// One directory entry as seen at listing time.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Entry {
    pub name: String,
    pub is_dir: bool,
}

/// Filesystem facade owning the listing cache.
#[derive(Debug, Default)]
pub struct FsOps {
    cache: HashMap<PathBuf, Vec<Entry>>,
}

impl FsOps {
    pub fn new() -> Self {
        Self::default()
    }

    /// Entries of `dir`, sorted by name. Cached until invalidated.
    pub fn list(&mut self, dir: &Path) -> Result<&[Entry]> {
        if !self.cache.contains_key(dir) {
            let mut entries = Vec::new();
            let rd = std::fs::read_dir(dir).map_err(|e| IntakeError::io(dir, e))?;
            for item in rd {
                let item = item.map_err(|e| IntakeError::io(dir, e))?;
                let name = match item.file_name().into_string() {
                    Ok(n) => n,
                    Err(raw) => {
                        warn!("Skipping non-UTF-8 entry {:?} in {}", raw, dir.display());
                        continue;
                    }
                };
                let is_dir = item.file_type().map(|t| t.is_dir()).unwrap_or(false);
                entries.push(Entry { name, is_dir });
            }
            entries.sort_by(|a, b| a.name.cmp(&b.name));
            self.cache.insert(dir.to_path_buf(), entries);
        }
        Ok(self.cache.get(dir).map(Vec::as_slice).unwrap_or(&[]))
    }

    /// Names of plain files in `dir`.
    pub fn files(&mut self, dir: &Path) -> Result<Vec<String>> {
        Ok(self.list(dir)?.iter().filter(|e| !e.is_dir).map(|e| e.name.clone()).collect())
    }

    /// Names of subdirectories of `dir`.
    pub fn subdirs(&mut self, dir: &Path) -> Result<Vec<String>> {
        Ok(self.list(dir)?.iter().filter(|e| e.is_dir).map(|e| e.name.clone()).collect())
    }

    /// Whether `path` exists, answered from its parent's cached listing.
    pub fn exists(&mut self, path: &Path) -> bool {
        let (Some(parent), Some(name)) = (path.parent(), path.file_name().and_then(|n| n.to_str())) else {
            return path.exists();
        };
        if !parent.is_dir() {
            return false;
        }
        match self.list(parent) {
            Ok(entries) => entries.iter().any(|e| e.name == name),
            Err(_) => path.exists(),
        }
    }

    /// Drop the cached listing of `dir`.
    pub fn invalidate(&mut self, dir: &Path) {
        self.cache.remove(dir);
    }

    /// Drop every cached listing.
    pub fn clear(&mut self) {
        self.cache.clear();
    }

    /// Create `dir` (and parents) if absent. Existing folders are not an error.
    pub fn ensure_dir(&mut self, dir: &Path) -> Result<()> {
        if dir.is_dir() {
            return Ok(());
        }
        std::fs::create_dir_all(dir).map_err(|e| IntakeError::io(dir, e))?;
        debug!("Created folder {}", dir.display());
        self.invalidate_lineage(dir);
        Ok(())
    }

    /// Move a file or folder. Refuses to overwrite an existing target.
    pub fn rename(&mut self, from: &Path, to: &Path) -> Result<()> {
        if to.exists() {
            return Err(IntakeError::io(
                to,
                std::io::Error::new(std::io::ErrorKind::AlreadyExists, "target already exists"),
            ));
        }
        if let Err(e) = std::fs::rename(from, to) {
            if !copy_fallback_applies(&e) || !from.is_file() {
                return Err(IntakeError::io(from, e));
            }
            copy_then_remove(from, to)?;
        }
        self.invalidate_parent(from);
        self.invalidate_parent(to);
        self.invalidate(from);
        Ok(())
    }

    /// Remove an empty folder.
    pub fn remove_empty_dir(&mut self, dir: &Path) -> Result<()> {
        std::fs::remove_dir(dir).map_err(|e| IntakeError::io(dir, e))?;
        self.invalidate(dir);
        self.invalidate_parent(dir);
        Ok(())
    }

    fn invalidate_parent(&mut self, path: &Path) {
        if let Some(p) = path.parent() {
            self.cache.remove(p);
        }
    }

    fn invalidate_lineage(&mut self, dir: &Path) {
        for a in dir.ancestors() {
            self.cache.remove(a);
        }
    }
}

/// Only a move across filesystems is retried as copy + delete.
fn copy_fallback_applies(e: &std::io::Error) -> bool {
    e.kind() == std::io::ErrorKind::CrossesDevices
}

/// Copy `from` to `to`, then delete `from`. If the source cannot be deleted the
/// copy is removed again, so the file exists in exactly one place.
fn copy_then_remove(from: &Path, to: &Path) -> Result<()> {
    std::fs::copy(from, to).map_err(|e| IntakeError::io(to, e))?;
    if let Err(e) = std::fs::remove_file(from) {
        if let Err(undo) = std::fs::remove_file(to) {
            warn!("Could not remove partial copy {}: {}", to.display(), undo);
        }
        return Err(IntakeError::io(from, e));
    }
    Ok(())
}
