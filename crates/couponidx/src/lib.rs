//! couponidx - Corroborated Coupon Membership Index
//!
//! couponidx answers one question fast: *is this coupon code in the trusted
//! set?* The trusted set is produced offline from several independent source
//! lists and queried online straight from a memory-mapped file.
//!
//! # Quick Start
//!
//! ```rust
//! use couponidx::{CouponIndex, IndexBuilder};
//! # let dir = tempfile::tempdir()?;
//! # let a = dir.path().join("a.txt");
//! # let b = dir.path().join("b.txt");
//! # std::fs::write(&a, "OVER9000\nJTK0BIW9\n")?;
//! # std::fs::write(&b, "OVER9000\nSIXTYOFF\n")?;
//! # let out = dir.path().join("valid_codes.txt");
//!
//! // Keep codes listed by at least two sources
//! let summary = IndexBuilder::new([&a, &b]).build(&out)?;
//! assert_eq!(summary.written, 1);
//!
//! // Query the memory-mapped result
//! let index = CouponIndex::open(&out)?;
//! assert!(index.is_valid("OVER9000"));
//! assert!(!index.is_valid("JTK0BIW9"));
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! # Architecture
//!
//! ```text
//! source 0 ─┐
//! source 1 ─┼─► IndexBuilder ──► valid_codes.txt ──mmap──► CouponIndex ──► is_valid()
//! source N ─┘   (mask, ≥2, sort)  (sorted, one per line)     (binary search)
//! ```
//!
//! The builder and the reader never talk to each other; they agree only on
//! the file format defined in [`couponidx_format`].

#![warn(missing_docs)]
#![warn(clippy::all)]

/// Offline index construction
pub mod builder;
/// Error types for couponidx operations
pub mod error;
/// Memory-mapped membership index
pub mod index;
/// The membership seam consumed by pricing code
pub mod validator;

/// Auto-reloading index wrapper (native platforms only)
///
/// Picks up rebuilt index files without restarting the process.
#[cfg(not(target_family = "wasm"))]
pub mod watching_index;

pub use crate::builder::{
    build_index, BuildError, BuildSummary, CorroboratedCodes, IndexBuilder, SourceMask,
    SourceSummary, DEFAULT_MIN_SOURCES, MAX_SOURCES,
};
pub use crate::error::{CouponIdxError, Result};
pub use crate::index::{CouponIndex, IndexError, IndexOpener, IndexStats, IndexStatsSnapshot};
pub use crate::validator::{AlwaysInvalid, CouponValidator};

#[cfg(not(target_family = "wasm"))]
pub use crate::watching_index::{ReloadCallback, ReloadEvent, WatchingIndex, WatchingIndexOpener};

/// File format re-exports
pub use couponidx_format::{validate_index, IndexValidationResult, MAX_CODE_LEN, MIN_CODE_LEN};

/// Library version string
pub const COUPONIDX_VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        let parts: Vec<_> = COUPONIDX_VERSION.split('.').collect();
        assert_eq!(parts.len(), 3);
        for part in parts {
            assert!(part.parse::<u32>().is_ok());
        }
    }
}
