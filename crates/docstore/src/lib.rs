//! Markdown document store: caching, invalidation, and section addressing.
//!
//! This crate provides the document engine behind a markdown knowledge base:
//! - Heading/section parsing with slug-path addressing and structural edits
//! - Optimistic concurrency for document writes (mtime-guarded)
//! - Inverted keyword fingerprint index as a search pre-filter
//! - Boost-aware LRU document cache with file-watch invalidation
//! - A document manager composing the above into CRUD, search, and archive

pub mod cache;
pub mod config;
pub mod error;
pub mod events;
pub mod fingerprint;
pub mod guard;
pub mod path;
pub mod section;
pub mod store;

// Re-export main types
pub use cache::{AccessContext, CacheHooks, Document, DocumentCache, DocumentMeta, WatchMode};
pub use config::{BoostFactors, EvictionPolicy, StoreConfig};
pub use error::{DocStoreError, Result};
pub use events::CacheEvent;
pub use fingerprint::FingerprintIndex;
pub use path::{RootLayout, VirtualPath};
pub use section::{DocumentStats, Heading, InsertMode, SectionContent, TocNode};
pub use store::{DocumentStore, SearchResult};
