//! Auto-reloading index wrapper (native platforms only)
//!
//! Provides [`WatchingIndex`], a wrapper around [`CouponIndex`] that picks up
//! a rebuilt index file while the process keeps serving queries.
//!
//! A reload opens the new file first and swaps it in only once the open has
//! succeeded. Queries in flight hold an `Arc` to the index they started on,
//! so they finish against one consistent mapping; the old mapping is
//! released when the last of them drops it. A failed reload keeps the
//! current index.
//!
//! # Example
//!
//! ```no_run
//! use couponidx::WatchingIndex;
//!
//! let index = WatchingIndex::from("valid_codes.txt")
//!     .on_reload(|event| {
//!         if event.success {
//!             eprintln!("Reloaded: generation {}", event.generation);
//!         }
//!     })
//!     .open()?;
//!
//! // Queries automatically use the latest index version
//! let ok = index.is_valid("OVER9000");
//! # Ok::<(), couponidx::IndexError>(())
//! ```

use crate::index::{CouponIndex, IndexError};
use crate::validator::CouponValidator;
use arc_swap::ArcSwap;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{mpsc, Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};
use tracing::{info, warn};

/// Quiet period after the last file event before reloading
const DEBOUNCE: Duration = Duration::from_millis(200);

/// How often the watcher thread checks for shutdown
const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Event fired when the index is reloaded
#[derive(Debug, Clone)]
pub struct ReloadEvent {
    /// Path to the index file
    pub path: PathBuf,
    /// Whether reload succeeded
    pub success: bool,
    /// Error message if reload failed (None on success)
    pub error: Option<String>,
    /// Generation counter after reload
    pub generation: u64,
}

/// Callback type for reload notifications
pub type ReloadCallback = Arc<dyn Fn(ReloadEvent) + Send + Sync>;

/// State shared between query threads and the watcher thread
struct Shared {
    current: ArcSwap<CouponIndex>,
    /// Starts at 1, incremented on each successful swap
    generation: AtomicU64,
    path: PathBuf,
    strict: bool,
    reload_callback: Option<ReloadCallback>,
    /// Serializes open + swap so an older file never replaces a newer one
    reload_lock: Mutex<()>,
}

impl Shared {
    /// Open the file again and swap it in on success
    fn reload(&self) -> Result<u64, IndexError> {
        let swapped = {
            // The guarded data is (), so a poisoned lock is still usable
            let _guard = self
                .reload_lock
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner());

            CouponIndex::from(self.path.clone())
                .with_strict(self.strict)
                .open()
                .map(|index| {
                    let lines = index.len();
                    self.current.store(Arc::new(index));
                    let generation = self.generation.fetch_add(1, Ordering::AcqRel) + 1;
                    (generation, lines)
                })
        };

        // Callbacks run unlocked so they may call reload() themselves
        match swapped {
            Ok((generation, lines)) => {
                info!(path = %self.path.display(), generation, lines, "coupon index reloaded");
                self.notify(ReloadEvent {
                    path: self.path.clone(),
                    success: true,
                    error: None,
                    generation,
                });
                Ok(generation)
            }
            Err(err) => {
                let generation = self.generation.load(Ordering::Acquire);
                warn!(
                    path = %self.path.display(),
                    error = %err,
                    "coupon index reload failed, keeping current index"
                );
                self.notify(ReloadEvent {
                    path: self.path.clone(),
                    success: false,
                    error: Some(err.to_string()),
                    generation,
                });
                Err(err)
            }
        }
    }

    fn notify(&self, event: ReloadEvent) {
        if let Some(ref callback) = self.reload_callback {
            callback(event);
        }
    }
}

/// Watcher thread handle and shutdown channel
struct WatcherThread {
    shutdown_tx: mpsc::Sender<()>,
    handle: Option<thread::JoinHandle<()>>,
}

impl Drop for WatcherThread {
    fn drop(&mut self) {
        let _ = self.shutdown_tx.send(());
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

/// File watcher plus the thread draining its events
///
/// Field order matters: the watcher is dropped first, which closes the
/// event channel the thread is blocked on.
struct WatcherState {
    _watcher: notify::RecommendedWatcher,
    _thread: WatcherThread,
}

/// Auto-reloading coupon index
///
/// # Thread Safety
///
/// `WatchingIndex` is `Send + Sync`. Each query loads the current index
/// through [`ArcSwap`], which takes no locks.
pub struct WatchingIndex {
    shared: Arc<Shared>,
    _watcher: WatcherState,
}

impl WatchingIndex {
    /// Create a new builder for opening a watching index
    pub fn from(path: impl Into<PathBuf>) -> WatchingIndexOpener {
        WatchingIndexOpener::new(path)
    }

    /// Whether `code` is in the current index
    pub fn is_valid(&self, code: impl AsRef<[u8]>) -> bool {
        CouponIndex::is_valid(&self.shared.current.load(), code)
    }

    /// Reload now instead of waiting for a file event
    ///
    /// Returns the new generation. On error the current index stays active.
    pub fn reload(&self) -> Result<u64, IndexError> {
        self.shared.reload()
    }

    /// Get the current generation counter
    ///
    /// This increments each time the index is reloaded.
    pub fn generation(&self) -> u64 {
        self.shared.generation.load(Ordering::Acquire)
    }

    /// Get a snapshot of the current index
    ///
    /// Useful when several queries must see the same index version.
    pub fn snapshot(&self) -> Arc<CouponIndex> {
        self.shared.current.load_full()
    }

    /// Canonical path of the watched file
    pub fn path(&self) -> &Path {
        &self.shared.path
    }
}

impl CouponValidator for WatchingIndex {
    fn is_valid(&self, code: &str) -> bool {
        WatchingIndex::is_valid(self, code)
    }
}

/// Builder for opening a [`WatchingIndex`]
pub struct WatchingIndexOpener {
    path: PathBuf,
    strict: bool,
    reload_callback: Option<ReloadCallback>,
}

impl WatchingIndexOpener {
    fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            strict: false,
            reload_callback: None,
        }
    }

    /// Validate every version of the file before accepting it
    pub fn strict(mut self) -> Self {
        self.strict = true;
        self
    }

    /// Set callback for reload notifications
    ///
    /// The callback is invoked whenever the index is reloaded (or reload fails).
    pub fn on_reload<F>(mut self, callback: F) -> Self
    where
        F: Fn(ReloadEvent) + Send + Sync + 'static,
    {
        self.reload_callback = Some(Arc::new(callback));
        self
    }

    /// Open the watching index
    pub fn open(self) -> Result<WatchingIndex, IndexError> {
        use notify::{Config, RecommendedWatcher, RecursiveMode, Watcher};
        use std::sync::mpsc::RecvTimeoutError;

        // Canonicalize path to resolve symlinks (important on macOS)
        let canonical_path = self.path.canonicalize().map_err(|source| IndexError::Io {
            op: "resolve",
            path: self.path.clone(),
            source,
        })?;

        // Builders replace the file by rename, which retires the watched
        // inode. Watch the directory and filter on the file name instead.
        let dir = canonical_path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));
        let file_name: OsString = canonical_path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_default();

        let initial = CouponIndex::from(canonical_path.clone())
            .with_strict(self.strict)
            .open()?;

        let shared = Arc::new(Shared {
            current: ArcSwap::from_pointee(initial),
            generation: AtomicU64::new(1),
            path: canonical_path,
            strict: self.strict,
            reload_callback: self.reload_callback,
            reload_lock: Mutex::new(()),
        });

        let (shutdown_tx, shutdown_rx) = mpsc::channel();
        let (event_tx, event_rx) = mpsc::channel::<notify::Result<notify::Event>>();

        let mut watcher = RecommendedWatcher::new(event_tx, Config::default())?;
        watcher.watch(&dir, RecursiveMode::NonRecursive)?;

        let thread_shared = Arc::clone(&shared);
        let handle = thread::Builder::new()
            .name("couponidx-watch".to_string())
            .spawn(move || {
                let mut last_event_time: Option<Instant> = None;

                loop {
                    if shutdown_rx.try_recv().is_ok() {
                        break;
                    }

                    match event_rx.recv_timeout(POLL_INTERVAL) {
                        Ok(Ok(event)) => {
                            let ours = event
                                .paths
                                .iter()
                                .any(|p| p.file_name() == Some(file_name.as_os_str()));
                            if ours && !event.kind.is_access() {
                                last_event_time = Some(Instant::now());
                            }
                        }
                        Ok(Err(err)) => {
                            warn!(error = %err, "file watcher error");
                        }
                        Err(RecvTimeoutError::Timeout) => {
                            if let Some(last_time) = last_event_time {
                                if last_time.elapsed() >= DEBOUNCE {
                                    // Failures are reported through the callback
                                    let _ = thread_shared.reload();
                                    last_event_time = None;
                                }
                            }
                        }
                        Err(RecvTimeoutError::Disconnected) => break,
                    }
                }
            })
            .map_err(|source| IndexError::Io {
                op: "watch",
                path: shared.path.clone(),
                source,
            })?;

        info!(path = %shared.path.display(), "watching coupon index for changes");

        Ok(WatchingIndex {
            shared,
            _watcher: WatcherState {
                _watcher: watcher,
                _thread: WatcherThread {
                    shutdown_tx,
                    handle: Some(handle),
                },
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::sync::Mutex;
    use tempfile::tempdir;

    /// Replace `path` the way the builder does
    fn replace_atomically(path: &Path, contents: &str) {
        let tmp = path.with_extension("tmp");
        fs::write(&tmp, contents).unwrap();
        fs::rename(&tmp, path).unwrap();
    }

    #[test]
    fn test_watching_index_basic() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("valid_codes.txt");
        fs::write(&path, "GNULINUX\nOVER9000\n").unwrap();

        let index = WatchingIndex::from(&path).open().unwrap();
        assert!(index.is_valid("OVER9000"));
        assert!(!index.is_valid("SIXTYOFF"));
        // Byte and owned-string queries go through the same lookup
        assert!(index.is_valid(b"GNULINUX"));
        assert!(index.is_valid(String::from("GNULINUX")));
        assert_eq!(index.generation(), 1);
        assert_eq!(index.path(), path.canonicalize().unwrap());
    }

    #[test]
    fn test_manual_reload() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("valid_codes.txt");
        fs::write(&path, "OVER9000\n").unwrap();

        let index = WatchingIndex::from(&path).open().unwrap();
        let before = index.snapshot();

        replace_atomically(&path, "SIXTYOFF\n");
        let generation = index.reload().unwrap();
        assert!(generation >= 2);

        assert!(index.is_valid("SIXTYOFF"));
        assert!(!index.is_valid("OVER9000"));
        // The old snapshot keeps answering from the old mapping
        assert!(before.is_valid("OVER9000"));
        assert!(!before.is_valid("SIXTYOFF"));
    }

    #[test]
    fn test_failed_reload_keeps_current_index() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("valid_codes.txt");
        fs::write(&path, "GNULINUX\nOVER9000\n").unwrap();

        let events = Arc::new(Mutex::new(Vec::new()));
        let events_clone = Arc::clone(&events);

        let index = WatchingIndex::from(&path)
            .strict()
            .on_reload(move |event| events_clone.lock().unwrap().push(event))
            .open()
            .unwrap();

        // Unsorted: strict reload must refuse it
        replace_atomically(&path, "OVER9000\nGNULINUX\n");
        assert!(index.reload().is_err());

        assert!(index.is_valid("GNULINUX"));
        assert!(index.is_valid("OVER9000"));

        let events = events.lock().unwrap();
        let failed = events.iter().find(|e| !e.success).expect("failure event");
        assert!(failed.error.as_deref().unwrap_or("").contains("validation"));
    }

    #[test]
    fn test_watching_index_reload_callback() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("valid_codes.txt");
        fs::write(&path, "OVER9000\n").unwrap();

        let events = Arc::new(Mutex::new(Vec::new()));
        let events_clone = Arc::clone(&events);

        let index = WatchingIndex::from(&path)
            .on_reload(move |event| {
                events_clone.lock().unwrap().push(event);
            })
            .open()
            .unwrap();
        assert_eq!(index.generation(), 1);

        thread::sleep(Duration::from_millis(100));
        replace_atomically(&path, "GNULINUX\n");

        // Wait for reload with retry (file watching can be timing-sensitive)
        let mut reloaded = false;
        for _ in 0..30 {
            thread::sleep(Duration::from_millis(100));
            if index.generation() > 1 {
                reloaded = true;
                break;
            }
        }
        assert!(reloaded, "index should have reloaded");
        assert!(index.is_valid("GNULINUX"));

        let events_list = events.lock().unwrap();
        assert!(!events_list.is_empty(), "Callback should have been invoked");
        assert!(events_list.iter().any(|e| e.success && e.generation > 1));
    }
}
