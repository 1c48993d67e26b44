//! File-system watch subsystem.
//!
//! A one-way state machine: Watching (native events) degrades on watch
//! errors with backoff reinitialization, and after `MAX_WATCHER_ERRORS`
//! consecutive errors permanently downgrades to fixed-interval polling.
//! Polling trades freshness latency for robustness where native watch
//! events are unreliable (network file systems, exhausted inotify limits).
//! There is no transition back from polling.

use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU8, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use notify::{recommended_watcher, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use parking_lot::Mutex;

use super::CacheShared;
use crate::error::{DocStoreError, Result};
use crate::events::CacheEvent;
use crate::guard;
use crate::path::VirtualPath;

/// Consecutive watch errors tolerated before the permanent downgrade.
pub const MAX_WATCHER_ERRORS: u32 = 3;

/// Base backoff before a degraded watcher is re-created; multiplied by the
/// running error count.
pub const WATCH_RETRY_BASE_MS: u64 = 5000;

/// Fixed polling interval once the subsystem has downgraded.
pub const POLL_INTERVAL: Duration = Duration::from_secs(30);

/// Granularity of shutdown checks while worker threads sleep.
const SHUTDOWN_CHECK_MS: u64 = 250;

/// Current mode of the watch subsystem.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum WatchMode {
    Watching = 0,
    Degraded = 1,
    Polling = 2,
}

impl WatchMode {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => Self::Watching,
            1 => Self::Degraded,
            _ => Self::Polling,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Watching => "watching",
            Self::Degraded => "degraded",
            Self::Polling => "polling",
        }
    }
}

/// Shared watch state, lock-free for readers.
#[derive(Debug)]
pub(crate) struct WatchState {
    mode: AtomicU8,
    error_count: AtomicU32,
    shutdown: AtomicBool,
}

impl WatchState {
    pub(crate) fn new() -> Self {
        Self {
            mode: AtomicU8::new(WatchMode::Watching as u8),
            error_count: AtomicU32::new(0),
            shutdown: AtomicBool::new(false),
        }
    }

    pub(crate) fn mode(&self) -> WatchMode {
        WatchMode::from_u8(self.mode.load(Ordering::SeqCst))
    }

    fn set_mode(&self, mode: WatchMode) {
        self.mode.store(mode as u8, Ordering::SeqCst);
    }

    /// The watcher is healthy again: back to watching with a clean error
    /// count, so only consecutive failures can reach the polling downgrade.
    pub(crate) fn note_recovered(&self) {
        self.error_count.store(0, Ordering::SeqCst);
        self.set_mode(WatchMode::Watching);
    }

    pub(crate) fn request_shutdown(&self) {
        self.shutdown.store(true, Ordering::SeqCst);
    }

    fn is_shutdown(&self) -> bool {
        self.shutdown.load(Ordering::SeqCst)
    }
}

type WatcherSlot = Arc<Mutex<Option<RecommendedWatcher>>>;

/// Owns the native watcher instance for a cache.
pub(crate) struct WatchSubsystem {
    slot: WatcherSlot,
}

impl WatchSubsystem {
    /// Starts watching both physical roots. A failure to establish the
    /// initial watcher is treated like any other watch error.
    pub(crate) fn start(shared: Arc<CacheShared>) -> Self {
        let slot: WatcherSlot = Arc::new(Mutex::new(None));
        if let Err(error) = create_watcher(&shared, &slot) {
            note_watch_failure(&shared, &slot, &error.to_string());
        }
        Self { slot }
    }
}

impl Drop for WatchSubsystem {
    fn drop(&mut self) {
        // Breaks the watcher -> callback -> slot cycle.
        let _ = self.slot.lock().take();
    }
}

fn create_watcher(shared: &Arc<CacheShared>, slot: &WatcherSlot) -> Result<()> {
    let callback_shared = shared.clone();
    let callback_slot = slot.clone();
    let mut watcher = recommended_watcher(move |result: notify::Result<Event>| match result {
        Ok(event) => handle_event(&callback_shared, event),
        Err(error) => note_watch_failure(&callback_shared, &callback_slot, &error.to_string()),
    })
    .map_err(|error| DocStoreError::Watch(format!("failed to create watcher: {error}")))?;

    for root in [&shared.layout.docs_root, &shared.layout.coordinator_root] {
        if root.is_dir() {
            watcher.watch(root, RecursiveMode::Recursive).map_err(|error| {
                DocStoreError::Watch(format!("failed to watch {}: {error}", root.display()))
            })?;
        }
    }

    *slot.lock() = Some(watcher);
    Ok(())
}

/// Applies a native change/delete event to the cache.
fn handle_event(shared: &CacheShared, event: Event) {
    if matches!(event.kind, EventKind::Access(_)) {
        return;
    }
    if shared.watch.mode() == WatchMode::Watching {
        // A delivered event means the watcher is healthy again.
        shared.watch.error_count.store(0, Ordering::SeqCst);
    }

    let removed = matches!(event.kind, EventKind::Remove(_));
    for fs_path in &event.paths {
        let Some(vpath) = shared.layout.virtual_path_for(fs_path) else {
            continue;
        };
        if shared.ignore.is_match(vpath.relative()) {
            continue;
        }
        let deleted = removed || !fs_path.exists();
        let path = vpath.as_str().to_string();
        let event = if deleted {
            CacheEvent::Deleted(path.clone())
        } else {
            CacheEvent::Changed(path.clone())
        };
        shared.invalidate(&path, Some(event));
        if !deleted {
            shared.refresh_fingerprint(&vpath, fs_path);
        }
    }
}

/// Records a watch error and advances the state machine.
///
/// Below the error threshold the watcher is torn down and re-created after
/// `WATCH_RETRY_BASE_MS x error count`. At the threshold the subsystem
/// enters polling mode for the remainder of the process lifetime.
pub(crate) fn note_watch_failure(shared: &Arc<CacheShared>, slot: &WatcherSlot, error: &str) {
    shared.emit(&CacheEvent::WatcherError(error.to_string()));
    if shared.watch.mode() == WatchMode::Polling {
        return;
    }

    let errors = shared.watch.error_count.fetch_add(1, Ordering::SeqCst) + 1;
    log::warn!("watch error ({errors}/{MAX_WATCHER_ERRORS}): {error}");

    if errors >= MAX_WATCHER_ERRORS {
        shared.watch.set_mode(WatchMode::Polling);
        log::warn!(
            "watch subsystem downgraded to polling every {}s after {errors} consecutive errors",
            POLL_INTERVAL.as_secs()
        );
        shared.emit(&CacheEvent::PollingMode);
        drop_watcher_detached(slot.clone());
        spawn_polling_worker(shared.clone());
    } else {
        shared.watch.set_mode(WatchMode::Degraded);
        schedule_reinit(shared.clone(), slot.clone(), errors);
    }
}

/// Drops the watcher off the notify callback thread.
fn drop_watcher_detached(slot: WatcherSlot) {
    thread::spawn(move || {
        let _ = slot.lock().take();
    });
}

fn schedule_reinit(shared: Arc<CacheShared>, slot: WatcherSlot, errors: u32) {
    thread::spawn(move || {
        let _ = slot.lock().take();
        if !sleep_unless_shutdown(&shared, WATCH_RETRY_BASE_MS * errors as u64) {
            return;
        }
        if shared.watch.mode() == WatchMode::Polling {
            return;
        }
        match create_watcher(&shared, &slot) {
            Ok(()) => {
                shared.watch.note_recovered();
                log::info!("watcher re-established after {errors} error(s)");
            }
            Err(error) => note_watch_failure(&shared, &slot, &error.to_string()),
        }
    });
}

fn spawn_polling_worker(shared: Arc<CacheShared>) {
    thread::spawn(move || loop {
        if !sleep_unless_shutdown(&shared, POLL_INTERVAL.as_millis() as u64) {
            return;
        }
        poll_cached_paths(&shared);
    });
}

/// Stats every cached path once; modification-time drift invalidates with
/// a change notification, a vanished file with a delete notification.
pub(crate) fn poll_cached_paths(shared: &CacheShared) {
    let cached: Vec<(String, std::time::SystemTime)> = {
        let state = shared.state.read();
        state
            .entries
            .iter()
            .map(|(path, entry)| (path.clone(), entry.meta.modified_at))
            .collect()
    };

    for (path, cached_mtime) in cached {
        let Ok(vpath) = VirtualPath::parse(&path) else {
            continue;
        };
        let fs_path = shared.layout.resolve(&vpath);
        match guard::file_mtime(&fs_path) {
            Ok(None) => shared.invalidate(&path, Some(CacheEvent::Deleted(path.clone()))),
            Ok(Some(mtime)) if mtime != cached_mtime => {
                shared.invalidate(&path, Some(CacheEvent::Changed(path.clone())));
                shared.refresh_fingerprint(&vpath, &fs_path);
            }
            Ok(Some(_)) => {}
            Err(error) => log::warn!("polling stat failed for {path}: {error}"),
        }
    }
}

/// Sleeps in small increments, returning `false` if shutdown was requested.
fn sleep_unless_shutdown(shared: &CacheShared, total_ms: u64) -> bool {
    let mut remaining = total_ms;
    while remaining > 0 {
        if shared.watch.is_shutdown() {
            return false;
        }
        let step = remaining.min(SHUTDOWN_CHECK_MS);
        thread::sleep(Duration::from_millis(step));
        remaining -= step;
    }
    !shared.watch.is_shutdown()
}
