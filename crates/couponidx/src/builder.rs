//! Index Builder
//!
//! Merges N unsorted source lists into one sorted index file, keeping only
//! codes that at least `min_sources` distinct lists agree on.
//!
//! # Pipeline
//!
//! 1. Stream every source line by line. Lines whose byte length is in
//!    `MIN_CODE_LEN..=MAX_CODE_LEN` set bit *i* of the code's [`SourceMask`],
//!    where *i* is the source position. Everything else is dropped.
//! 2. Keep codes whose mask has at least `min_sources` bits set.
//! 3. Sort byte-wise, the order [`CouponIndex`](crate::CouponIndex) searches in.
//! 4. Write to a temporary file next to the destination, fsync, rename over
//!    the destination.
//!
//! Any source or output failure aborts the whole build and leaves the
//! destination untouched.
//!
//! Sources can be scanned on several threads ([`IndexBuilder::threads`]).
//! Masks are merged with OR, so the result does not depend on scan order.

use couponidx_format::{is_code_len, strip_line_ending, write_index, FormatError};
use crossbeam_channel::unbounded;
use rustc_hash::{FxHashMap, FxHashSet};
use std::fs::File;
use std::io::{self, BufRead, BufReader, BufWriter};
use std::ops::{BitOr, BitOrAssign};
use std::path::{Path, PathBuf};
use std::thread;
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{debug, info};

/// Default corroboration threshold: a code must appear in two sources
pub const DEFAULT_MIN_SOURCES: u32 = 2;

/// Largest number of sources one build accepts (width of [`SourceMask`])
pub const MAX_SOURCES: usize = SourceMask::BITS as usize;

/// Read buffer per source
const READ_BUFFER_SIZE: usize = 1024 * 1024;

/// Set of source positions a code was seen in
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct SourceMask(u64);

impl SourceMask {
    /// Number of sources a mask can track
    pub const BITS: u32 = u64::BITS;

    /// Mask with no sources
    pub const fn empty() -> Self {
        Self(0)
    }

    /// Mask holding only source `idx`
    ///
    /// # Panics
    ///
    /// Panics if `idx >= MAX_SOURCES`.
    pub fn single(idx: usize) -> Self {
        assert!(idx < MAX_SOURCES, "source index {} out of range", idx);
        Self(1 << idx)
    }

    /// Add source `idx`
    pub fn insert(&mut self, idx: usize) {
        *self |= Self::single(idx);
    }

    /// Whether source `idx` is present
    pub fn contains(self, idx: usize) -> bool {
        idx < MAX_SOURCES && self.0 & (1 << idx) != 0
    }

    /// Number of distinct sources
    pub fn count(self) -> u32 {
        self.0.count_ones()
    }

    /// Raw bit pattern
    pub fn bits(self) -> u64 {
        self.0
    }
}

impl BitOr for SourceMask {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl BitOrAssign for SourceMask {
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}

/// Build error type
#[derive(Error, Debug)]
pub enum BuildError {
    /// Builder was given no sources
    #[error("no source lists given")]
    NoSources,

    /// More sources than a [`SourceMask`] can track
    #[error("{count} source lists given, at most {max} are supported")]
    TooManySources {
        /// Sources given
        count: usize,
        /// Supported maximum
        max: usize,
    },

    /// Corroboration threshold of zero
    #[error("minimum source count must be at least 1")]
    InvalidThreshold,

    /// A source could not be opened or read
    #[error("failed to read source {}: {source}", path.display())]
    Source {
        /// Source path
        path: PathBuf,
        /// Underlying error
        #[source]
        source: io::Error,
    },

    /// The index file could not be written
    #[error("failed to write index {}: {source}", path.display())]
    Output {
        /// Destination path
        path: PathBuf,
        /// Underlying error
        #[source]
        source: io::Error,
    },

    /// Codes violated the file format
    #[error(transparent)]
    Format(FormatError),

    /// A scan worker panicked
    #[error("source scan worker panicked")]
    WorkerPanicked,
}

/// Per-source scan figures
#[derive(Debug, Clone)]
pub struct SourceSummary {
    /// Source path
    pub path: PathBuf,
    /// Lines read
    pub lines: u64,
    /// Lines with an accepted code length
    pub candidates: u64,
    /// Distinct accepted codes
    pub distinct: usize,
}

/// Result of a completed build
#[derive(Debug, Clone)]
pub struct BuildSummary {
    /// Destination path
    pub path: PathBuf,
    /// Per-source figures, in source order
    pub sources: Vec<SourceSummary>,
    /// Distinct codes across all sources, before corroboration
    pub distinct_codes: usize,
    /// Codes written to the index
    pub written: usize,
    /// Corroboration threshold used
    pub min_sources: u32,
    /// Wall time of the build
    pub elapsed: Duration,
}

/// Corroborated, sorted codes produced by [`IndexBuilder::collect`]
#[derive(Debug, Clone)]
pub struct CorroboratedCodes {
    codes: Vec<Vec<u8>>,
    sources: Vec<SourceSummary>,
    distinct_codes: usize,
}

impl CorroboratedCodes {
    /// Surviving codes in byte-wise ascending order
    pub fn codes(&self) -> &[Vec<u8>] {
        &self.codes
    }

    /// Number of surviving codes
    pub fn len(&self) -> usize {
        self.codes.len()
    }

    /// Whether nothing survived
    pub fn is_empty(&self) -> bool {
        self.codes.is_empty()
    }

    /// Per-source figures, in source order
    pub fn sources(&self) -> &[SourceSummary] {
        &self.sources
    }

    /// Distinct codes across all sources, before corroboration
    pub fn distinct_codes(&self) -> usize {
        self.distinct_codes
    }

    /// Surviving codes, consuming self
    pub fn into_codes(self) -> Vec<Vec<u8>> {
        self.codes
    }
}

/// Line counters from scanning one source
#[derive(Debug, Default, Clone, Copy)]
struct ScanCounts {
    lines: u64,
    candidates: u64,
}

/// Builder for corroborated index files
///
/// # Examples
///
/// ```no_run
/// use couponidx::IndexBuilder;
///
/// let summary = IndexBuilder::new(["coupon1.txt", "coupon2.txt", "coupon3.txt"])
///     .threads(3)
///     .build("valid_codes.txt")?;
/// println!("{} codes written", summary.written);
/// # Ok::<(), couponidx::BuildError>(())
/// ```
#[derive(Debug, Clone)]
pub struct IndexBuilder {
    sources: Vec<PathBuf>,
    min_sources: u32,
    threads: usize,
}

impl IndexBuilder {
    /// Create a builder over ordered source paths
    ///
    /// Source order decides which mask bit each source occupies; it does not
    /// affect the output.
    pub fn new<I, P>(sources: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: AsRef<Path>,
    {
        Self {
            sources: sources
                .into_iter()
                .map(|p| p.as_ref().to_path_buf())
                .collect(),
            min_sources: DEFAULT_MIN_SOURCES,
            threads: 1,
        }
    }

    /// Set the corroboration threshold
    ///
    /// Default: [`DEFAULT_MIN_SOURCES`]. A threshold above the number of
    /// sources is accepted and yields an empty index.
    pub fn min_sources(mut self, min_sources: u32) -> Self {
        self.min_sources = min_sources;
        self
    }

    /// Scan sources on up to `threads` worker threads
    ///
    /// `0` uses the available parallelism. Default: 1 (sequential).
    pub fn threads(mut self, threads: usize) -> Self {
        self.threads = threads;
        self
    }

    /// Configured sources
    pub fn sources(&self) -> &[PathBuf] {
        &self.sources
    }

    /// Scan, corroborate and sort without writing anything
    pub fn collect(&self) -> Result<CorroboratedCodes, BuildError> {
        self.check_config()?;

        let workers = self.worker_count();
        let (masks, sources) = if workers <= 1 {
            self.scan_sequential()?
        } else {
            self.scan_parallel(workers)?
        };

        let distinct_codes = masks.len();
        let mut codes: Vec<Vec<u8>> = masks
            .into_iter()
            .filter(|(_, mask)| mask.count() >= self.min_sources)
            .map(|(code, _)| code)
            .collect();
        codes.sort_unstable();

        Ok(CorroboratedCodes {
            codes,
            sources,
            distinct_codes,
        })
    }

    /// Build the index file at `dest`
    ///
    /// The destination is replaced atomically; on error it is left as it was.
    pub fn build(&self, dest: impl AsRef<Path>) -> Result<BuildSummary, BuildError> {
        let dest = dest.as_ref();
        let start = Instant::now();

        info!(
            sources = self.sources.len(),
            min_sources = self.min_sources,
            dest = %dest.display(),
            "building coupon index"
        );

        let collected = self.collect()?;
        let written = write_atomically(dest, collected.codes())?;
        let elapsed = start.elapsed();

        info!(
            written,
            distinct = collected.distinct_codes,
            elapsed_ms = elapsed.as_millis() as u64,
            dest = %dest.display(),
            "coupon index written"
        );

        Ok(BuildSummary {
            path: dest.to_path_buf(),
            sources: collected.sources,
            distinct_codes: collected.distinct_codes,
            written,
            min_sources: self.min_sources,
            elapsed,
        })
    }

    fn check_config(&self) -> Result<(), BuildError> {
        if self.sources.is_empty() {
            return Err(BuildError::NoSources);
        }
        if self.sources.len() > MAX_SOURCES {
            return Err(BuildError::TooManySources {
                count: self.sources.len(),
                max: MAX_SOURCES,
            });
        }
        if self.min_sources == 0 {
            return Err(BuildError::InvalidThreshold);
        }
        Ok(())
    }

    fn worker_count(&self) -> usize {
        let wanted = if self.threads == 0 {
            thread::available_parallelism().map_or(1, |n| n.get())
        } else {
            self.threads
        };
        wanted.min(self.sources.len())
    }

    /// OR each code straight into the shared map, one source at a time
    #[allow(clippy::type_complexity)]
    fn scan_sequential(
        &self,
    ) -> Result<(FxHashMap<Vec<u8>, SourceMask>, Vec<SourceSummary>), BuildError> {
        let mut masks: FxHashMap<Vec<u8>, SourceMask> = FxHashMap::default();
        let mut summaries = Vec::with_capacity(self.sources.len());

        for (idx, path) in self.sources.iter().enumerate() {
            let mut distinct = 0usize;
            let counts = scan_source(path, |code| {
                if let Some(mask) = masks.get_mut(code) {
                    if !mask.contains(idx) {
                        mask.insert(idx);
                        distinct += 1;
                    }
                } else {
                    masks.insert(code.to_vec(), SourceMask::single(idx));
                    distinct += 1;
                }
            })?;
            summaries.push(summarize(path, counts, distinct));
        }

        Ok((masks, summaries))
    }

    /// Workers collect each source's distinct codes; this thread merges them
    #[allow(clippy::type_complexity)]
    fn scan_parallel(
        &self,
        workers: usize,
    ) -> Result<(FxHashMap<Vec<u8>, SourceMask>, Vec<SourceSummary>), BuildError> {
        thread::scope(|scope| {
            let (job_tx, job_rx) = unbounded::<(usize, &Path)>();
            let (result_tx, result_rx) = unbounded();

            let handles: Vec<_> = (0..workers)
                .map(|_| {
                    let job_rx = job_rx.clone();
                    let result_tx = result_tx.clone();
                    scope.spawn(move || {
                        for (idx, path) in job_rx.iter() {
                            let mut codes: FxHashSet<Vec<u8>> = FxHashSet::default();
                            let scanned = scan_source(path, |code| {
                                if !codes.contains(code) {
                                    codes.insert(code.to_vec());
                                }
                            })
                            .map(|counts| (codes, counts));
                            if result_tx.send((idx, scanned)).is_err() {
                                break;
                            }
                        }
                    })
                })
                .collect();
            drop(job_rx);
            drop(result_tx);

            for (idx, path) in self.sources.iter().enumerate() {
                // Workers hold the receiver until the queue drains
                let _ = job_tx.send((idx, path.as_path()));
            }
            drop(job_tx);

            let mut masks: FxHashMap<Vec<u8>, SourceMask> = FxHashMap::default();
            let mut summaries: Vec<Option<SourceSummary>> = vec![None; self.sources.len()];

            for (idx, scanned) in result_rx.iter() {
                let (codes, counts) = scanned?;
                let path = &self.sources[idx];
                debug!(source = idx, path = %path.display(), "merging source");
                summaries[idx] = Some(summarize(path, counts, codes.len()));
                for code in codes {
                    *masks.entry(code).or_default() |= SourceMask::single(idx);
                }
            }

            for handle in handles {
                handle.join().map_err(|_| BuildError::WorkerPanicked)?;
            }

            let summaries = summaries
                .into_iter()
                .collect::<Option<Vec<_>>>()
                .ok_or(BuildError::WorkerPanicked)?;
            Ok((masks, summaries))
        })
    }
}

/// Build an index with the default threshold, sequentially
///
/// Returns the number of codes written.
pub fn build_index<I, P>(sources: I, dest: impl AsRef<Path>) -> Result<usize, BuildError>
where
    I: IntoIterator<Item = P>,
    P: AsRef<Path>,
{
    IndexBuilder::new(sources)
        .build(dest)
        .map(|summary| summary.written)
}

fn summarize(path: &Path, counts: ScanCounts, distinct: usize) -> SourceSummary {
    debug!(
        path = %path.display(),
        lines = counts.lines,
        candidates = counts.candidates,
        distinct,
        "scanned source"
    );
    SourceSummary {
        path: path.to_path_buf(),
        lines: counts.lines,
        candidates: counts.candidates,
        distinct,
    }
}

/// Stream `path` and hand every in-bounds code to `on_code`
fn scan_source<F>(path: &Path, mut on_code: F) -> Result<ScanCounts, BuildError>
where
    F: FnMut(&[u8]),
{
    let source_err = |source: io::Error| BuildError::Source {
        path: path.to_path_buf(),
        source,
    };

    let file = File::open(path).map_err(source_err)?;
    let mut reader = BufReader::with_capacity(READ_BUFFER_SIZE, file);
    let mut line = Vec::with_capacity(64);
    let mut counts = ScanCounts::default();

    loop {
        line.clear();
        let n = reader.read_until(b'\n', &mut line).map_err(source_err)?;
        if n == 0 {
            break;
        }
        counts.lines += 1;

        let code = strip_line_ending(&line);
        if is_code_len(code.len()) {
            counts.candidates += 1;
            on_code(code);
        }
    }

    Ok(counts)
}

/// Write `codes` beside `dest` and rename into place
fn write_atomically(dest: &Path, codes: &[Vec<u8>]) -> Result<usize, BuildError> {
    let output_err = |source: io::Error| BuildError::Output {
        path: dest.to_path_buf(),
        source,
    };

    let dir = match dest.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };

    let mut tmp = tempfile::Builder::new()
        .prefix(".couponidx-")
        .suffix(".tmp")
        .tempfile_in(dir)
        .map_err(output_err)?;

    // Temp files are created owner-only; readers may run as another user
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        tmp.as_file()
            .set_permissions(std::fs::Permissions::from_mode(0o644))
            .map_err(output_err)?;
    }

    let written = {
        let mut out = BufWriter::new(tmp.as_file_mut());
        write_index(&mut out, codes).map_err(|err| match err {
            FormatError::Io(source) => output_err(source),
            other => BuildError::Format(other),
        })?
    };

    tmp.as_file().sync_all().map_err(output_err)?;
    tmp.persist(dest).map_err(|err| output_err(err.error))?;

    Ok(written)
}
