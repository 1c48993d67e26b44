//! Boost-aware LRU document cache with file-watch invalidation.
//!
//! The cache owns parsed documents, their access/eviction bookkeeping, and
//! the watch subsystem that keeps the in-memory view consistent with an
//! externally-mutable file system. Every invalidation also notifies a
//! dependent external addressing cache; a failure there is logged critical
//! and re-emitted as an inconsistency event rather than propagated, since
//! the local entry was already removed correctly.

pub mod entry;
pub mod watch;

use std::sync::Arc;

use fnv::FnvHashMap;
use globset::GlobSet;
use parking_lot::{Mutex, RwLock};

use crate::config::StoreConfig;
use crate::error::{DocStoreError, Result};
use crate::events::{AddressingInvalidator, CacheEvent, EventObserver};
use crate::fingerprint::{self, FingerprintIndex};
use crate::guard::{self, Snapshot};
use crate::path::{RootLayout, VirtualPath};
use crate::section::{self, read_section};

pub use entry::{AccessContext, AccessRecord, CacheEntry, Document, DocumentMeta};
pub use watch::{WatchMode, MAX_WATCHER_ERRORS, POLL_INTERVAL, WATCH_RETRY_BASE_MS};

/// Collaborators wired into a cache at construction time.
///
/// Observer and invalidator registration happens here, not through a
/// global event bus, so every dependency is visible where the cache is
/// built.
#[derive(Default)]
pub struct CacheHooks {
    observers: Vec<EventObserver>,
    addressing_invalidator: Option<AddressingInvalidator>,
    fingerprint: Option<Arc<Mutex<FingerprintIndex>>>,
}

impl CacheHooks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers an observer for every emitted [`CacheEvent`].
    pub fn on_event(mut self, observer: impl Fn(&CacheEvent) + Send + Sync + 'static) -> Self {
        self.observers.push(Box::new(observer));
        self
    }

    /// Registers the dependent addressing-cache invalidator.
    pub fn with_addressing_invalidator(
        mut self,
        invalidator: impl Fn(&str) -> Result<()> + Send + Sync + 'static,
    ) -> Self {
        self.addressing_invalidator = Some(Box::new(invalidator));
        self
    }

    /// Pairs the cache with a fingerprint index so invalidations remove
    /// the path from every keyword bucket.
    pub fn with_fingerprint_index(mut self, index: Arc<Mutex<FingerprintIndex>>) -> Self {
        self.fingerprint = Some(index);
        self
    }
}

/// Mutable cache state behind one lock.
pub(crate) struct CacheState {
    pub(crate) entries: FnvHashMap<String, CacheEntry>,
    access: FnvHashMap<String, AccessRecord>,
    access_counter: u64,
    total_headings: usize,
}

/// State shared with the watch subsystem's callbacks and workers.
pub(crate) struct CacheShared {
    pub(crate) layout: RootLayout,
    pub(crate) config: StoreConfig,
    pub(crate) ignore: GlobSet,
    pub(crate) state: RwLock<CacheState>,
    observers: Vec<EventObserver>,
    addressing_invalidator: Option<AddressingInvalidator>,
    fingerprint: Option<Arc<Mutex<FingerprintIndex>>>,
    pub(crate) watch: watch::WatchState,
}

impl CacheShared {
    pub(crate) fn emit(&self, event: &CacheEvent) {
        for observer in &self.observers {
            observer(event);
        }
    }

    /// Removes an entry and its bookkeeping, removes the path from the
    /// paired fingerprint index, then notifies the dependent addressing
    /// cache. Runs the secondary invalidation even for uncached paths so
    /// external addressing state can never outlive a document change.
    pub(crate) fn invalidate(&self, path: &str, event: Option<CacheEvent>) {
        {
            let mut state = self.state.write();
            if let Some(removed) = state.entries.remove(path) {
                state.total_headings -= removed.heading_count();
            }
            state.access.remove(path);
        }
        if let Some(index) = &self.fingerprint {
            index.lock().invalidate_document(path);
        }
        self.invalidate_addressing(path);
        if let Some(event) = event {
            self.emit(&event);
        }
    }

    /// Re-fingerprints a document from disk after a change notification,
    /// so the search index tracks external edits without waiting for the
    /// next cache load.
    pub(crate) fn refresh_fingerprint(&self, path: &VirtualPath, fs_path: &std::path::Path) {
        let Some(index) = &self.fingerprint else {
            return;
        };
        match fingerprint::read_preview(fs_path, self.config.fingerprint_preview_bytes) {
            Ok(Some((preview, mtime))) => index.lock().insert_document(path, &preview, mtime),
            Ok(None) => {}
            Err(error) => log::warn!("fingerprint refresh failed for {path}: {error}"),
        }
    }

    /// The local invalidation already succeeded when this runs, so a
    /// failing secondary invalidation is logged critical and re-emitted
    /// as an inconsistency event instead of crashing the caller.
    fn invalidate_addressing(&self, path: &str) {
        let Some(invalidator) = &self.addressing_invalidator else {
            return;
        };
        if let Err(error) = invalidator(path) {
            log::error!("addressing cache invalidation failed for {path}: {error}");
            self.emit(&CacheEvent::Inconsistency {
                path: path.to_string(),
                error: error.to_string(),
            });
        }
    }
}

/// The document cache.
///
/// Construct one per server instance and pass references; there is no
/// process-wide default.
pub struct DocumentCache {
    shared: Arc<CacheShared>,
    _watch: watch::WatchSubsystem,
}

impl DocumentCache {
    pub fn new(layout: RootLayout, config: StoreConfig, hooks: CacheHooks) -> Result<Self> {
        let ignore = config.build_ignore_set()?;
        let shared = Arc::new(CacheShared {
            layout,
            config,
            ignore,
            state: RwLock::new(CacheState {
                entries: FnvHashMap::default(),
                access: FnvHashMap::default(),
                access_counter: 0,
                total_headings: 0,
            }),
            observers: hooks.observers,
            addressing_invalidator: hooks.addressing_invalidator,
            fingerprint: hooks.fingerprint,
            watch: watch::WatchState::new(),
        });
        let watch = watch::WatchSubsystem::start(shared.clone());
        Ok(Self {
            shared,
            _watch: watch,
        })
    }

    /// Returns a cached or freshly-loaded document, or `None` if the
    /// underlying file does not exist. Any other I/O failure propagates.
    pub fn get_document(
        &self,
        path: &VirtualPath,
        context: AccessContext,
    ) -> Result<Option<Document>> {
        let boost = self.shared.config.boost_factors.for_context(context);

        {
            let mut state = self.shared.state.write();
            if state.entries.contains_key(path.as_str()) {
                state.access_counter += 1;
                let record = AccessRecord {
                    counter: state.access_counter,
                    context,
                    boost,
                };
                state.access.insert(path.as_str().to_string(), record);
                let document = Document::from(&state.entries[path.as_str()]);
                return Ok(Some(document));
            }
        }

        // Miss: load and parse outside the lock.
        let fs_path = self.shared.layout.resolve(path);
        let Some(snapshot) = guard::read_snapshot(&fs_path)? else {
            return Ok(None);
        };
        let entry = build_entry(path, &snapshot, &self.shared.config);

        if let Some(index) = &self.shared.fingerprint {
            let preview = preview_of(&snapshot.content, self.shared.config.fingerprint_preview_bytes);
            index.lock().insert_document(path, preview, snapshot.mtime);
        }

        let document = {
            let mut state = self.shared.state.write();
            let existing = state
                .entries
                .get(path.as_str())
                .map(CacheEntry::heading_count)
                .unwrap_or(0);
            let projected = state.total_headings - existing + entry.heading_count();
            if projected > self.shared.config.max_total_headings {
                return Err(DocStoreError::HeadingCapExceeded {
                    path: path.as_str().to_string(),
                    requested: entry.heading_count(),
                    cap: self.shared.config.max_total_headings,
                });
            }

            state.access_counter += 1;
            let record = AccessRecord {
                counter: state.access_counter,
                context,
                boost,
            };
            let added = entry.heading_count();
            let document = Document::from(&entry);
            if let Some(old) = state.entries.insert(path.as_str().to_string(), entry) {
                state.total_headings -= old.heading_count();
            }
            state.total_headings += added;
            state.access.insert(path.as_str().to_string(), record);
            self.evict_overflow(&mut state);
            document
        };
        Ok(Some(document))
    }

    /// Returns one section's body without caching it. Sections are
    /// typically read once; caching them would duplicate memory without a
    /// hit-rate benefit.
    pub fn get_section_content(&self, path: &VirtualPath, slug: &str) -> Result<Option<String>> {
        let fs_path = self.shared.layout.resolve(path);
        let Some(snapshot) = guard::read_snapshot(&fs_path)? else {
            return Ok(None);
        };
        Ok(read_section(&snapshot.content, slug).map(|section| section.content))
    }

    /// Evicts a single entry.
    pub fn invalidate_document(&self, path: &str) {
        self.shared.invalidate(path, None);
    }

    /// Evicts every entry whose path starts with the namespace prefix.
    /// Used when archiving or moving a subtree.
    pub fn invalidate_namespace(&self, prefix: &str) {
        let matching: Vec<String> = {
            let state = self.shared.state.read();
            state
                .entries
                .keys()
                .filter(|path| path.starts_with(prefix))
                .cloned()
                .collect()
        };
        for path in matching {
            self.shared.invalidate(&path, None);
        }
    }

    /// Currently cached virtual paths, sorted.
    pub fn cached_paths(&self) -> Vec<String> {
        let state = self.shared.state.read();
        let mut paths: Vec<String> = state.entries.keys().cloned().collect();
        paths.sort();
        paths
    }

    pub fn len(&self) -> usize {
        self.shared.state.read().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Total headings across all cached documents.
    pub fn total_headings(&self) -> usize {
        self.shared.state.read().total_headings
    }

    /// Current mode of the watch subsystem.
    pub fn watch_mode(&self) -> WatchMode {
        self.shared.watch.mode()
    }

    /// Drops the lowest-scoring entries once the cache exceeds its size
    /// cap. Eviction is not invalidation: the documents are unchanged on
    /// disk, so fingerprints and external addressing state stay valid.
    fn evict_overflow(&self, state: &mut CacheState) {
        let max = self.shared.config.max_cache_size.max(1);
        if state.entries.len() <= max {
            return;
        }
        let policy = self.shared.config.eviction_policy;
        let global = state.access_counter;

        let mut scored: Vec<(f64, u64, String)> = state
            .entries
            .keys()
            .map(|path| {
                let record = state.access.get(path).copied().unwrap_or(AccessRecord {
                    counter: 0,
                    context: AccessContext::Direct,
                    boost: 1.0,
                });
                (
                    record.eviction_score(global, policy),
                    record.counter,
                    path.clone(),
                )
            })
            .collect();
        scored.sort_by(|a, b| a.0.total_cmp(&b.0).then(a.1.cmp(&b.1)));

        let excess = state.entries.len() - max;
        for (_, _, path) in scored.into_iter().take(excess) {
            if let Some(removed) = state.entries.remove(&path) {
                state.total_headings -= removed.heading_count();
            }
            state.access.remove(&path);
            log::debug!("evicted {path} from document cache");
        }
    }

    #[cfg(test)]
    pub(crate) fn shared_for_tests(&self) -> Arc<CacheShared> {
        self.shared.clone()
    }
}

impl Drop for DocumentCache {
    fn drop(&mut self) {
        self.shared.watch.request_shutdown();
    }
}

/// Parses a snapshot into a cache entry with derived metadata.
fn build_entry(path: &VirtualPath, snapshot: &Snapshot, config: &StoreConfig) -> CacheEntry {
    let parsed = section::parse_document(&snapshot.content);
    let title = section::document_title(&parsed)
        .unwrap_or_else(|| path.file_stem())
        .to_string();
    let preview = preview_of(&snapshot.content, config.fingerprint_preview_bytes);
    CacheEntry {
        meta: DocumentMeta {
            path: path.as_str().to_string(),
            title,
            content_hash: fingerprint::content_hash(&snapshot.content),
            stats: section::document_stats(&snapshot.content),
            modified_at: snapshot.mtime,
            namespace: path.namespace().to_string(),
            keywords: fingerprint::extract_keywords(preview, config.max_keywords),
            fingerprinted_at: chrono::Utc::now(),
        },
        parsed,
    }
}

/// First `limit` bytes of a document, cut back to a char boundary.
fn preview_of(content: &str, limit: usize) -> &str {
    if content.len() <= limit {
        return content;
    }
    let mut cut = limit;
    while !content.is_char_boundary(cut) {
        cut -= 1;
    }
    &content[..cut]
}
