//! Virtual document paths and physical root resolution.
//!
//! Every document is addressed by a virtual path: it always begins with `/`,
//! always ends with `.md`, and its directory segments form the namespace.
//! A `coordinator/` first segment routes to a separate physical root from
//! all other namespaces.

use std::fmt;
use std::path::{Path, PathBuf};

use crate::error::{DocStoreError, Result};

/// Virtual-path prefix routed to the coordinator root.
pub const COORDINATOR_PREFIX: &str = "coordinator/";

/// Namespace prefix under which archived documents live.
pub const ARCHIVE_PREFIX: &str = "/archived";

/// A validated virtual document path.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct VirtualPath(String);

impl VirtualPath {
    /// Parses and validates a raw virtual path.
    ///
    /// The path must start with `/`, end with `.md`, and contain no empty,
    /// `.` or `..` segments.
    pub fn parse(raw: &str) -> Result<Self> {
        let Some(rest) = raw.strip_prefix('/') else {
            return Err(DocStoreError::InvalidPath(format!(
                "{raw:?} must start with '/'"
            )));
        };
        if !raw.ends_with(".md") {
            return Err(DocStoreError::InvalidPath(format!(
                "{raw:?} must end with '.md'"
            )));
        }
        for segment in rest.split('/') {
            match segment {
                "" | "." | ".." => {
                    return Err(DocStoreError::InvalidPath(format!(
                        "{raw:?} contains an invalid segment {segment:?}"
                    )));
                }
                _ => {}
            }
        }
        if rest.rsplit('/').next() == Some(".md") {
            return Err(DocStoreError::InvalidPath(format!(
                "{raw:?} has an empty file name"
            )));
        }
        Ok(Self(raw.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The path without its leading slash.
    pub fn relative(&self) -> &str {
        &self.0[1..]
    }

    /// Directory segments joined with `/`, empty for root-level documents.
    pub fn namespace(&self) -> &str {
        match self.relative().rfind('/') {
            Some(pos) => &self.relative()[..pos],
            None => "",
        }
    }

    /// The final path segment, including the `.md` extension.
    pub fn file_name(&self) -> &str {
        self.relative().rsplit('/').next().unwrap_or(self.relative())
    }

    /// The file name without its `.md` extension.
    pub fn file_stem(&self) -> &str {
        self.file_name().trim_end_matches(".md")
    }

    /// Whether this path routes to the coordinator root.
    pub fn is_coordinator(&self) -> bool {
        self.relative().starts_with(COORDINATOR_PREFIX)
    }

    /// The virtual path a delete-with-archive operation moves this document to,
    /// before collision disambiguation.
    pub fn archive_target(&self) -> String {
        if let Some(rest) = self.relative().strip_prefix(COORDINATOR_PREFIX) {
            format!("{ARCHIVE_PREFIX}/coordinator/{rest}")
        } else {
            format!("{ARCHIVE_PREFIX}/docs/{}", self.relative())
        }
    }
}

impl fmt::Display for VirtualPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// The physical roots a store serves.
///
/// Documents under the `coordinator/` namespace live in a separate directory
/// tree from everything else; this is the single place that knows about the
/// split.
#[derive(Debug, Clone)]
pub struct RootLayout {
    pub docs_root: PathBuf,
    pub coordinator_root: PathBuf,
}

impl RootLayout {
    pub fn new(docs_root: impl Into<PathBuf>, coordinator_root: impl Into<PathBuf>) -> Self {
        Self {
            docs_root: docs_root.into(),
            coordinator_root: coordinator_root.into(),
        }
    }

    /// Resolves a virtual path to its on-disk location.
    pub fn resolve(&self, path: &VirtualPath) -> PathBuf {
        match path.relative().strip_prefix(COORDINATOR_PREFIX) {
            Some(rest) => self.coordinator_root.join(rest),
            None => self.docs_root.join(path.relative()),
        }
    }

    /// Maps an on-disk path back to its virtual path, if it lies under one
    /// of the roots and names a markdown file.
    pub fn virtual_path_for(&self, fs_path: &Path) -> Option<VirtualPath> {
        if fs_path.extension().and_then(|e| e.to_str()) != Some("md") {
            return None;
        }
        let raw = if let Ok(rest) = fs_path.strip_prefix(&self.coordinator_root) {
            format!("/coordinator/{}", rest.to_string_lossy().replace('\\', "/"))
        } else if let Ok(rest) = fs_path.strip_prefix(&self.docs_root) {
            format!("/{}", rest.to_string_lossy().replace('\\', "/"))
        } else {
            return None;
        };
        VirtualPath::parse(&raw).ok()
    }
}
