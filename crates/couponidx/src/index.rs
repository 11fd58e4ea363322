//! Memory-mapped Lookup Index
//!
//! [`CouponIndex`] maps an index file read-only and answers membership
//! queries by binary search directly over the mapped bytes. The only
//! per-open work is one pass recording where each line starts; queries
//! borrow line slices from the mapping and never allocate.
//!
//! ```text
//! mapped bytes:  G B R 9 2 9 7 T \n G N U L I N U X \n O V E R 9 0 0 0 \n
//! line starts:   0                  9                  18
//! ```
//!
//! # Lifetime
//!
//! The mapping is owned by the index. Line offsets are plain indices into
//! it, so nothing derived from the mapping can outlive the index. After
//! [`CouponIndex::close`] every query reports a miss (or
//! [`IndexError::Closed`] from [`CouponIndex::try_is_valid`]) instead of
//! touching released memory.

use couponidx_format::{is_code_len, line_at, line_starts, validate_index};
use memmap2::Mmap;
use std::cmp::Ordering as CmpOrdering;
use std::fs::File;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use thiserror::Error;
use tracing::{debug, info, warn};

/// Lookup error type
#[derive(Error, Debug)]
pub enum IndexError {
    /// Opening, inspecting or mapping the file failed
    #[error("failed to {op} index {}: {source}", path.display())]
    Io {
        /// Step that failed ("open", "stat", "map")
        op: &'static str,
        /// Index path
        path: PathBuf,
        /// Underlying error
        #[source]
        source: io::Error,
    },

    /// Strict open found a file binary search cannot trust
    #[error("index {} failed validation: {summary}", path.display())]
    Invalid {
        /// Index path
        path: PathBuf,
        /// First problem found and error count
        summary: String,
    },

    /// Query issued after [`CouponIndex::close`]
    #[error("index is closed")]
    Closed,

    /// File watcher setup failed
    #[cfg(not(target_family = "wasm"))]
    #[error("file watcher error: {0}")]
    Watch(#[from] notify::Error),
}

/// Query statistics
///
/// Atomic counters so concurrent readers can update them through `&self`.
#[derive(Debug, Default)]
pub struct IndexStats {
    /// Total number of queries
    pub total_queries: AtomicU64,
    /// Queries that found the code
    pub hits: AtomicU64,
    /// Queries that searched and missed
    pub misses: AtomicU64,
    /// Queries rejected by the length check without searching
    pub rejected_length: AtomicU64,
    /// Queries issued after close
    pub rejected_closed: AtomicU64,
}

/// Snapshot of index statistics at a point in time
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize)]
pub struct IndexStatsSnapshot {
    /// Total number of queries
    pub total_queries: u64,
    /// Queries that found the code
    pub hits: u64,
    /// Queries that searched and missed
    pub misses: u64,
    /// Queries rejected by the length check without searching
    pub rejected_length: u64,
    /// Queries issued after close
    pub rejected_closed: u64,
}

impl IndexStats {
    /// Take a snapshot of current statistics
    pub fn snapshot(&self) -> IndexStatsSnapshot {
        IndexStatsSnapshot {
            total_queries: self.total_queries.load(Ordering::Relaxed),
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            rejected_length: self.rejected_length.load(Ordering::Relaxed),
            rejected_closed: self.rejected_closed.load(Ordering::Relaxed),
        }
    }
}

impl IndexStatsSnapshot {
    /// Fraction of queries that found their code (0.0 to 1.0)
    pub fn hit_rate(&self) -> f64 {
        if self.total_queries == 0 {
            0.0
        } else {
            self.hits as f64 / self.total_queries as f64
        }
    }
}

/// Storage for index bytes - memory-mapped, owned, or nothing at all
enum IndexStorage {
    /// Zero-length file; mapping zero bytes is an error on most platforms
    Empty,
    Owned(Vec<u8>),
    Mmap(Mmap),
}

impl IndexStorage {
    fn as_slice(&self) -> &[u8] {
        match self {
            IndexStorage::Empty => &[],
            IndexStorage::Owned(v) => v.as_slice(),
            IndexStorage::Mmap(m) => &m[..],
        }
    }
}

/// Where an opener reads from
#[derive(Clone)]
enum IndexSource {
    Path(PathBuf),
    Bytes(Vec<u8>),
}

/// Builder for opening indexes with custom configuration
///
/// Created via [`CouponIndex::from`] or [`CouponIndex::from_bytes_builder`].
///
/// # Examples
///
/// ```no_run
/// use couponidx::CouponIndex;
///
/// // Trust the file (default)
/// let index = CouponIndex::from("valid_codes.txt").open()?;
///
/// // Refuse files that are unsorted or contain duplicates
/// let index = CouponIndex::from("valid_codes.txt").strict().open()?;
/// # Ok::<(), couponidx::IndexError>(())
/// ```
#[derive(Clone)]
pub struct IndexOpener {
    source: IndexSource,
    strict: bool,
}

impl IndexOpener {
    fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            source: IndexSource::Path(path.into()),
            strict: false,
        }
    }

    /// Validate the file before accepting it
    ///
    /// Costs one extra pass over the file at open time.
    pub fn strict(mut self) -> Self {
        self.strict = true;
        self
    }

    /// Set strict mode explicitly
    pub fn with_strict(mut self, strict: bool) -> Self {
        self.strict = strict;
        self
    }

    /// Open the index with configured options
    pub fn open(self) -> Result<CouponIndex, IndexError> {
        let (storage, path) = match self.source {
            IndexSource::Path(path) => (map_file(&path)?, Some(path)),
            IndexSource::Bytes(bytes) if bytes.is_empty() => (IndexStorage::Empty, None),
            IndexSource::Bytes(bytes) => (IndexStorage::Owned(bytes), None),
        };

        let data = storage.as_slice();
        if self.strict {
            let report = validate_index(data);
            if !report.is_valid() {
                let first = report.errors.first().cloned().unwrap_or_default();
                return Err(IndexError::Invalid {
                    path: path.clone().unwrap_or_else(|| PathBuf::from("<memory>")),
                    summary: format!("{} ({} error(s))", first, report.stats.error_count),
                });
            }
            for warning in &report.warnings {
                warn!(warning = %warning, "index validation warning");
            }
        }

        let offsets = line_starts(data);

        match &path {
            Some(p) => info!(
                path = %p.display(),
                lines = offsets.len(),
                bytes = data.len(),
                "coupon index opened"
            ),
            None => debug!(lines = offsets.len(), bytes = data.len(), "coupon index loaded"),
        }

        Ok(CouponIndex {
            storage: Some(storage),
            offsets,
            path,
            stats: IndexStats::default(),
        })
    }
}

/// Open, stat and map `path`
fn map_file(path: &Path) -> Result<IndexStorage, IndexError> {
    let io_err = |op: &'static str| {
        move |source: io::Error| IndexError::Io {
            op,
            path: path.to_path_buf(),
            source,
        }
    };

    let file = File::open(path).map_err(io_err("open"))?;
    let len = file.metadata().map_err(io_err("stat"))?.len();
    if len == 0 {
        return Ok(IndexStorage::Empty);
    }

    // SAFETY: the mapping is read-only and owned by the index. Index files
    // are replaced by rename, never rewritten in place, so the mapped inode
    // does not change underneath us.
    let mmap = unsafe { Mmap::map(&file) }.map_err(io_err("map"))?;

    // Binary search touches scattered pages; readahead only wastes I/O
    #[cfg(unix)]
    {
        let _ = mmap.advise(memmap2::Advice::Random);
    }

    Ok(IndexStorage::Mmap(mmap))
}

/// Read-only coupon membership index
///
/// `CouponIndex` is `Send + Sync`: queries take `&self` and need no locking,
/// so one instance can be shared across threads behind an `Arc`.
///
/// # Examples
///
/// ```no_run
/// use couponidx::CouponIndex;
///
/// let index = CouponIndex::open("valid_codes.txt")?;
/// if index.is_valid("OVER9000") {
///     println!("discount applies");
/// }
/// # Ok::<(), couponidx::IndexError>(())
/// ```
pub struct CouponIndex {
    /// `None` once closed
    storage: Option<IndexStorage>,
    /// Byte offset of the first byte of every line
    offsets: Vec<usize>,
    /// Source file path (None for from_bytes)
    path: Option<PathBuf>,
    stats: IndexStats,
}

impl CouponIndex {
    /// Open the index at `path` with default options
    pub fn open(path: impl AsRef<Path>) -> Result<Self, IndexError> {
        IndexOpener::new(path.as_ref()).open()
    }

    /// Create an index opener with fluent builder API
    pub fn from(path: impl Into<PathBuf>) -> IndexOpener {
        IndexOpener::new(path)
    }

    /// Create an index opener over owned bytes
    pub fn from_bytes_builder(bytes: Vec<u8>) -> IndexOpener {
        IndexOpener {
            source: IndexSource::Bytes(bytes),
            strict: false,
        }
    }

    /// Create an index over owned bytes (trusting mode)
    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        let offsets = line_starts(&bytes);
        let storage = if bytes.is_empty() {
            IndexStorage::Empty
        } else {
            IndexStorage::Owned(bytes)
        };
        Self {
            storage: Some(storage),
            offsets,
            path: None,
            stats: IndexStats::default(),
        }
    }

    /// Whether `code` is in the index
    ///
    /// Total over all inputs: wrong lengths, empty strings and queries after
    /// [`close`](Self::close) all return `false`.
    pub fn is_valid(&self, code: impl AsRef<[u8]>) -> bool {
        self.try_is_valid(code).unwrap_or(false)
    }

    /// Like [`is_valid`](Self::is_valid), but reports a closed index as an error
    pub fn try_is_valid(&self, code: impl AsRef<[u8]>) -> Result<bool, IndexError> {
        let code = code.as_ref();
        self.stats.total_queries.fetch_add(1, Ordering::Relaxed);

        let Some(storage) = &self.storage else {
            self.stats.rejected_closed.fetch_add(1, Ordering::Relaxed);
            return Err(IndexError::Closed);
        };

        if !is_code_len(code.len()) {
            self.stats.rejected_length.fetch_add(1, Ordering::Relaxed);
            return Ok(false);
        }

        let found = search(storage.as_slice(), &self.offsets, code);
        if found {
            self.stats.hits.fetch_add(1, Ordering::Relaxed);
        } else {
            self.stats.misses.fetch_add(1, Ordering::Relaxed);
        }
        Ok(found)
    }

    /// Release the mapping
    ///
    /// Later queries miss without reading memory. Closing twice is a no-op.
    pub fn close(&mut self) {
        if self.storage.take().is_some() {
            self.offsets = Vec::new();
            debug!(path = ?self.path, "coupon index closed");
        }
    }

    /// Whether [`close`](Self::close) has been called
    pub fn is_closed(&self) -> bool {
        self.storage.is_none()
    }

    /// Number of stored lines (0 when closed)
    pub fn len(&self) -> usize {
        self.offsets.len()
    }

    /// Whether the index holds no lines
    pub fn is_empty(&self) -> bool {
        self.offsets.is_empty()
    }

    /// Size of the mapped file in bytes (0 when closed)
    pub fn size_bytes(&self) -> usize {
        self.data().len()
    }

    /// Source file path (None for from_bytes)
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Get query statistics snapshot
    pub fn stats(&self) -> IndexStatsSnapshot {
        self.stats.snapshot()
    }

    /// Stored codes in file order, borrowed from the mapping
    pub fn iter(&self) -> impl Iterator<Item = &[u8]> + '_ {
        let data = self.data();
        (0..self.offsets.len()).map(move |idx| line_at(data, &self.offsets, idx))
    }

    fn data(&self) -> &[u8] {
        match &self.storage {
            Some(storage) => storage.as_slice(),
            None => &[],
        }
    }
}

impl std::fmt::Debug for CouponIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CouponIndex")
            .field("path", &self.path)
            .field("lines", &self.offsets.len())
            .field("bytes", &self.size_bytes())
            .field("closed", &self.is_closed())
            .finish()
    }
}

/// Binary search the line starting at each offset for an exact match
#[inline]
fn search(data: &[u8], offsets: &[usize], code: &[u8]) -> bool {
    if offsets.is_empty() {
        return false;
    }
    offsets
        .binary_search_by(|&start| compare_line(data, start, code))
        .is_ok()
}

/// Compare the line beginning at `start` with `code`, byte-wise
#[inline]
fn compare_line(data: &[u8], start: usize, code: &[u8]) -> CmpOrdering {
    let rest = &data[start..];
    let line = match memchr::memchr(b'\n', rest) {
        Some(end) => &rest[..end],
        None => rest,
    };
    line.cmp(code)
}
