//! Optimistic write guard.
//!
//! Structural mutations are composed as snapshot read, in-memory rewrite,
//! conditional write. The conditional write re-stats the file immediately
//! before writing and rejects on modification-time drift, preventing lost
//! updates from concurrent external edits without taking file locks.

use std::fs;
use std::io::{ErrorKind, Write};
use std::path::Path;
use std::time::SystemTime;

use crate::error::{DocStoreError, Result};

/// A consistent view of a file: its content and the mtime it was read at.
#[derive(Debug, Clone)]
pub struct Snapshot {
    pub content: String,
    pub mtime: SystemTime,
}

/// Reads a file's content together with its modification time.
///
/// Returns `Ok(None)` when the file does not exist; any other I/O failure
/// propagates.
pub fn read_snapshot(path: &Path) -> Result<Option<Snapshot>> {
    let content = match fs::read_to_string(path) {
        Ok(content) => content,
        Err(error) if error.kind() == ErrorKind::NotFound => return Ok(None),
        Err(error) => return Err(error.into()),
    };
    let mtime = fs::metadata(path)?.modified()?;
    Ok(Some(Snapshot { content, mtime }))
}

/// Returns a file's modification time, or `None` if it does not exist.
pub fn file_mtime(path: &Path) -> Result<Option<SystemTime>> {
    match fs::metadata(path) {
        Ok(metadata) => Ok(Some(metadata.modified()?)),
        Err(error) if error.kind() == ErrorKind::NotFound => Ok(None),
        Err(error) => Err(error.into()),
    }
}

/// Writes `content` to `path` only if the file's mtime still equals
/// `expected_mtime`.
///
/// A file that changed or vanished since the snapshot fails with
/// [`DocStoreError::StaleWrite`]; nothing is written in that case. The
/// write itself goes through a temp file in the same directory followed by
/// a rename.
pub fn write_if_unchanged(path: &Path, expected_mtime: SystemTime, content: &str) -> Result<()> {
    let current = file_mtime(path)?;
    if current != Some(expected_mtime) {
        return Err(DocStoreError::StaleWrite(path.to_path_buf()));
    }

    let dir = path.parent().ok_or_else(|| {
        DocStoreError::InvalidPath(format!("{} has no parent directory", path.display()))
    })?;
    let mut temp = tempfile::NamedTempFile::new_in(dir)?;
    temp.write_all(content.as_bytes())?;
    temp.persist(path)
        .map_err(|error| DocStoreError::Io(error.error))?;
    Ok(())
}

/// Creates a new file, failing if it already exists. Parent directories
/// are created as needed.
pub fn write_new(path: &Path, content: &str) -> Result<()> {
    if let Some(dir) = path.parent() {
        fs::create_dir_all(dir)?;
    }
    let mut file = match fs::OpenOptions::new().write(true).create_new(true).open(path) {
        Ok(file) => file,
        Err(error) if error.kind() == ErrorKind::AlreadyExists => {
            return Err(DocStoreError::DocumentExists(path.display().to_string()));
        }
        Err(error) => return Err(error.into()),
    };
    file.write_all(content.as_bytes())?;
    Ok(())
}
