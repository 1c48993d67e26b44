//! Configuration surface for the document store.
//!
//! The store does not load configuration files itself; callers deserialize
//! a [`StoreConfig`] from whatever source they own and pass it in.

use globset::{Glob, GlobSet, GlobSetBuilder};
use serde::Deserialize;

use crate::cache::AccessContext;
use crate::error::{DocStoreError, Result};

/// Default maximum number of cached documents.
pub const DEFAULT_MAX_CACHE_SIZE: usize = 100;

/// Default process-wide cap on cached headings across all documents.
pub const DEFAULT_MAX_TOTAL_HEADINGS: usize = 10_000;

/// Default number of bytes read when fingerprinting a document.
pub const DEFAULT_FINGERPRINT_PREVIEW_BYTES: usize = 1500;

/// Default per-document keyword cap.
pub const DEFAULT_MAX_KEYWORDS: usize = 20;

/// Cache eviction policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EvictionPolicy {
    /// Evict the lowest-scoring (least recently used, boost-adjusted) entries.
    #[default]
    Lru,
    /// Evict the highest-scoring (most recently used, boost-adjusted) entries.
    Mru,
}

/// Per-context eviction boost factors.
///
/// Search-surfaced and reference-chased documents are disproportionately
/// likely to be re-accessed soon, so they resist eviction more than plain
/// direct reads.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BoostFactors {
    pub direct: f64,
    pub reference: f64,
    pub search: f64,
}

impl Default for BoostFactors {
    fn default() -> Self {
        Self {
            direct: 1.0,
            reference: 2.0,
            search: 3.0,
        }
    }
}

impl BoostFactors {
    /// Returns the boost factor for an access context.
    pub fn for_context(&self, context: AccessContext) -> f64 {
        match context {
            AccessContext::Direct => self.direct,
            AccessContext::Reference => self.reference,
            AccessContext::Search => self.search,
        }
    }
}

/// Configuration for a document store instance.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Maximum number of cached documents before eviction kicks in.
    pub max_cache_size: usize,
    /// Eviction policy (`lru` or `mru`).
    pub eviction_policy: EvictionPolicy,
    /// Per-context eviction boost factors.
    pub boost_factors: BoostFactors,
    /// Glob patterns for paths the watch subsystem should ignore.
    pub watch_ignore: Vec<String>,
    /// Process-wide cap on cached headings across all documents.
    pub max_total_headings: usize,
    /// Number of bytes read when fingerprinting a document.
    pub fingerprint_preview_bytes: usize,
    /// Maximum keywords extracted per document.
    pub max_keywords: usize,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            max_cache_size: DEFAULT_MAX_CACHE_SIZE,
            eviction_policy: EvictionPolicy::default(),
            boost_factors: BoostFactors::default(),
            watch_ignore: Vec::new(),
            max_total_headings: DEFAULT_MAX_TOTAL_HEADINGS,
            fingerprint_preview_bytes: DEFAULT_FINGERPRINT_PREVIEW_BYTES,
            max_keywords: DEFAULT_MAX_KEYWORDS,
        }
    }
}

impl StoreConfig {
    /// Compiles the watch-ignore patterns into a matcher.
    pub fn build_ignore_set(&self) -> Result<GlobSet> {
        let mut builder = GlobSetBuilder::new();
        for pattern in &self.watch_ignore {
            let glob = Glob::new(pattern).map_err(|error| {
                DocStoreError::Config(format!("invalid ignore pattern {pattern:?}: {error}"))
            })?;
            builder.add(glob);
        }
        builder
            .build()
            .map_err(|error| DocStoreError::Config(format!("ignore patterns: {error}")))
    }
}
