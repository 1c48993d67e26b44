//! Cached document entries and eviction bookkeeping.

use std::time::SystemTime;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::config::EvictionPolicy;
use crate::section::{DocumentStats, Heading, ParsedDocument, TocNode};

/// Why a document was accessed. Determines its eviction boost.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AccessContext {
    /// Plain lookup by path.
    Direct,
    /// Reached by chasing a reference from another document.
    Reference,
    /// Surfaced by a search.
    Search,
}

impl AccessContext {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Direct => "direct",
            Self::Reference => "reference",
            Self::Search => "search",
        }
    }
}

/// Per-path access bookkeeping, used only for eviction scoring.
#[derive(Debug, Clone, Copy)]
pub struct AccessRecord {
    /// Value of the global access counter when the path was last touched.
    pub counter: u64,
    /// Context of the last access.
    pub context: AccessContext,
    /// Boost factor of that context.
    pub boost: f64,
}

impl AccessRecord {
    /// Eviction score. The raw counter is normalized by the current global
    /// counter so the score stays in `[0, boost]` regardless of process
    /// uptime; under LRU lower scores are evicted first, under MRU the
    /// ordering is negated.
    pub fn eviction_score(&self, global_counter: u64, policy: EvictionPolicy) -> f64 {
        let normalized = self.counter as f64 / global_counter.max(1) as f64;
        let score = normalized * self.boost;
        match policy {
            EvictionPolicy::Lru => score,
            EvictionPolicy::Mru => -score,
        }
    }
}

/// Metadata describing a cached document.
#[derive(Debug, Clone)]
pub struct DocumentMeta {
    pub path: String,
    pub title: String,
    pub content_hash: String,
    pub stats: DocumentStats,
    pub modified_at: SystemTime,
    pub namespace: String,
    pub keywords: Vec<String>,
    pub fingerprinted_at: DateTime<Utc>,
}

/// A cached parsed document. Owned exclusively by the cache; callers get
/// [`Document`] snapshots.
#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub meta: DocumentMeta,
    pub parsed: ParsedDocument,
}

impl CacheEntry {
    pub fn heading_count(&self) -> usize {
        self.parsed.headings.len()
    }
}

/// A caller-facing snapshot of a cached document.
#[derive(Debug, Clone)]
pub struct Document {
    pub meta: DocumentMeta,
    pub headings: Vec<Heading>,
    pub toc: Vec<TocNode>,
}

impl From<&CacheEntry> for Document {
    fn from(entry: &CacheEntry) -> Self {
        Self {
            meta: entry.meta.clone(),
            headings: entry.parsed.headings.clone(),
            toc: entry.parsed.toc.clone(),
        }
    }
}
