use anyhow::{Context, Result};
use glob::Pattern;
use std::collections::BTreeSet;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

pub type Snapshot = BTreeSet<PathBuf>;

/// Every regular file under `root`, relative to `root`.
pub fn snapshot(root: &Path) -> Result<Snapshot> {
    let mut files = Snapshot::new();
    for entry in WalkDir::new(root).min_depth(1) {
        let entry = match entry {
            Ok(entry) => entry,
            // Something vanished mid-walk; it is not part of either snapshot.
            Err(err) if err.io_error().map(|e| e.kind()) == Some(ErrorKind::NotFound) => continue,
            Err(err) => return Err(err).with_context(|| format!("scanning {root:?}")),
        };
        if !entry.file_type().is_file() {
            continue;
        }
        if let Ok(rel) = entry.path().strip_prefix(root) {
            files.insert(rel.to_path_buf());
        }
    }
    Ok(files)
}

/// Deletes files a run left behind.
#[derive(Clone, Debug, Default)]
pub struct Cleanup {
    preserve: Vec<Pattern>,
    extra_delete: Vec<Pattern>,
}

impl Cleanup {
    pub fn new<S: AsRef<str>>(preserve: &[S], extra_delete: &[S]) -> Result<Self> {
        Ok(Self {
            preserve: compile(preserve)?,
            extra_delete: compile(extra_delete)?,
        })
    }

    pub fn is_preserved(&self, rel: &Path) -> bool {
        matches_any(&self.preserve, rel)
    }

    /// Removes files present in `after` but not `before`, unless preserved, and
    /// any file in `after` matching an extra-delete pattern. Returns what was
    /// actually removed.
    pub fn sweep(&self, root: &Path, before: &Snapshot, after: &Snapshot) -> Vec<PathBuf> {
        let mut deleted = Vec::new();
        for rel in after.difference(before) {
            if !self.is_preserved(rel) && remove(root, rel) {
                deleted.push(rel.clone());
            }
        }
        for rel in after {
            if matches_any(&self.extra_delete, rel) && !deleted.contains(rel) && remove(root, rel) {
                deleted.push(rel.clone());
            }
        }
        deleted
    }
}

fn compile<S: AsRef<str>>(patterns: &[S]) -> Result<Vec<Pattern>> {
    patterns
        .iter()
        .map(|p| {
            let p = p.as_ref();
            Pattern::new(p).with_context(|| format!("invalid glob pattern {p:?}"))
        })
        .collect()
}

fn matches_any(patterns: &[Pattern], rel: &Path) -> bool {
    patterns.iter().any(|p| {
        p.matches_path(rel)
            || rel
                .file_name()
                .is_some_and(|name| p.matches(&name.to_string_lossy()))
    })
}

fn remove(root: &Path, rel: &Path) -> bool {
    let target = root.join(rel);
    match fs::remove_file(&target) {
        Ok(()) => {
            log::debug!("removed {}", rel.display());
            true
        }
        Err(err) if err.kind() == ErrorKind::NotFound => false,
        Err(_) if target.is_dir() => false,
        Err(err) => {
            log::warn!("could not remove {}: {err}", target.display());
            false
        }
    }
}
