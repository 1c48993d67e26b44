//! Events emitted by the document cache.
//!
//! Observers are registered at cache construction time so the dependency is
//! visible where the cache is wired up, rather than through a global event
//! bus.

use crate::error::Result;

/// A notification emitted by the document cache.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CacheEvent {
    /// A document changed on disk and was invalidated.
    Changed(String),
    /// A document was deleted on disk and was invalidated.
    Deleted(String),
    /// The watch subsystem reported an error.
    WatcherError(String),
    /// The watch subsystem permanently downgraded to polling.
    PollingMode,
    /// A secondary (addressing cache) invalidation failed after the local
    /// entry was already removed. The cache stays correct; external state
    /// may be stale until the next invalidation.
    Inconsistency { path: String, error: String },
}

/// Callback invoked for every emitted [`CacheEvent`].
pub type EventObserver = Box<dyn Fn(&CacheEvent) + Send + Sync>;

/// Invalidator for the dependent external addressing cache.
///
/// Called with the virtual path of every successfully invalidated document.
/// A returned error is logged and re-emitted as
/// [`CacheEvent::Inconsistency`], never propagated to the caller.
pub type AddressingInvalidator = Box<dyn Fn(&str) -> Result<()> + Send + Sync>;
