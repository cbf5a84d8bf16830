//! Atomic, diff-aware file writes shared by every generator.
//!
//! A payload is written to `<target>.tmp` and renamed over the target. On any
//! failure the temp file is removed, so the target keeps its prior content.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use tracing::{debug, error, info};

#[derive(Debug, thiserror::Error)]
pub enum WriteError {
    #[error("failed to create directory {path}: {source}")]
    CreateDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to write {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to replace {path}: {source}")]
    Rename {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// What a diff-aware write did (or would do, in dry-run).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOutcome {
    Unchanged,
    WouldCreate,
    WouldUpdate,
    Created,
    Updated,
}

impl WriteOutcome {
    /// True when the target differs (or would differ) from the payload.
    pub fn is_change(&self) -> bool {
        !matches!(self, WriteOutcome::Unchanged)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            WriteOutcome::Unchanged => "unchanged",
            WriteOutcome::WouldCreate => "would create",
            WriteOutcome::WouldUpdate => "would update",
            WriteOutcome::Created => "created",
            WriteOutcome::Updated => "updated",
        }
    }
}

pub fn temp_path(target: &Path) -> PathBuf {
    let mut name = target
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".tmp");
    target.with_file_name(name)
}

/// Writes `content` to `target` through a sibling temp file.
pub fn atomic_write(target: &Path, content: &str) -> Result<(), WriteError> {
    if let Some(parent) = target.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|source| WriteError::CreateDir {
            path: parent.to_path_buf(),
            source,
        })?;
    }

    let tmp = temp_path(target);
    if tmp.exists() {
        debug!(path = %tmp.display(), "Removing stale temp file");
        let _ = fs::remove_file(&tmp);
    }

    let result = write_then_rename(&tmp, target, content);
    if let Err(e) = &result {
        error!(path = %target.display(), error = %e, "Atomic write failed");
        let _ = fs::remove_file(&tmp);
    }
    result
}

fn write_then_rename(tmp: &Path, target: &Path, content: &str) -> Result<(), WriteError> {
    let write_err = |source| WriteError::Write {
        path: tmp.to_path_buf(),
        source,
    };
    let mut file = fs::File::create(tmp).map_err(write_err)?;
    file.write_all(content.as_bytes()).map_err(write_err)?;
    file.sync_all().map_err(write_err)?;
    drop(file);

    match fs::rename(tmp, target) {
        Ok(()) => Ok(()),
        // Some platforms refuse to rename over an existing file.
        Err(first) if target.is_file() => {
            debug!(path = %target.display(), error = %first, "Rename refused, replacing target");
            fs::remove_file(target)
                .and_then(|_| fs::rename(tmp, target))
                .map_err(|source| WriteError::Rename {
                    path: target.to_path_buf(),
                    source,
                })
        }
        Err(source) => Err(WriteError::Rename {
            path: target.to_path_buf(),
            source,
        }),
    }
}

/// Compares `content` with what is on disk and writes only on change.
/// With `apply == false` nothing is written and the would-be outcome is returned.
pub fn write_if_changed(
    target: &Path,
    content: &str,
    apply: bool,
) -> Result<WriteOutcome, WriteError> {
    let existing = fs::read_to_string(target).ok();
    let outcome = match (&existing, apply) {
        (Some(old), _) if old == content => return Ok(WriteOutcome::Unchanged),
        (Some(_), false) => WriteOutcome::WouldUpdate,
        (None, false) => WriteOutcome::WouldCreate,
        (Some(_), true) => WriteOutcome::Updated,
        (None, true) => WriteOutcome::Created,
    };
    if apply {
        atomic_write(target, content)?;
        info!(path = %target.display(), outcome = outcome.as_str(), "Wrote file");
    } else {
        debug!(path = %target.display(), outcome = outcome.as_str(), "Dry-run, not writing");
    }
    Ok(outcome)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn creates_parent_directories_and_leaves_no_temp_file() {
        let tmp = tempdir().unwrap();
        let target = tmp.path().join("a/b/c/doc.md");
        atomic_write(&target, "hello").unwrap();
        assert_eq!(fs::read_to_string(&target).unwrap(), "hello");
        assert!(!temp_path(&target).exists());
    }

    #[test]
    fn failed_write_cleans_up_temp_and_keeps_target() {
        let tmp = tempdir().unwrap();
        // A directory cannot be replaced by a file.
        let target = tmp.path().join("occupied");
        fs::create_dir(&target).unwrap();
        fs::write(target.join("keep.txt"), "prior").unwrap();

        let res = atomic_write(&target, "new content");
        assert!(res.is_err());
        assert!(!temp_path(&target).exists());
        assert!(target.is_dir());
        assert_eq!(fs::read_to_string(target.join("keep.txt")).unwrap(), "prior");
    }

    #[test]
    fn stale_temp_file_is_cleared() {
        let tmp = tempdir().unwrap();
        let target = tmp.path().join("doc.md");
        fs::write(temp_path(&target), "leftover from an interrupted run").unwrap();
        atomic_write(&target, "fresh").unwrap();
        assert!(!temp_path(&target).exists());
        assert_eq!(fs::read_to_string(&target).unwrap(), "fresh");
    }

    #[test]
    fn dry_run_never_touches_disk() {
        let tmp = tempdir().unwrap();
        let target = tmp.path().join("doc.md");
        assert_eq!(write_if_changed(&target, "x", false).unwrap(), WriteOutcome::WouldCreate);
        assert!(!target.exists());

        fs::write(&target, "x").unwrap();
        assert_eq!(write_if_changed(&target, "x", true).unwrap(), WriteOutcome::Unchanged);
        assert_eq!(write_if_changed(&target, "y", false).unwrap(), WriteOutcome::WouldUpdate);
        assert_eq!(fs::read_to_string(&target).unwrap(), "x");
        assert_eq!(write_if_changed(&target, "y", true).unwrap(), WriteOutcome::Updated);
        assert_eq!(fs::read_to_string(&target).unwrap(), "y");
    }
}
