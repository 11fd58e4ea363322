//! couponidx File Format
//!
//! The contract shared by the offline builder and the online reader:
//!
//! ```text
//! ┌──────────────────────────────┐
//! │ GBR9297T\n                   │  one code per line
//! │ GNULINUX\n                   │  byte-wise ascending
//! │ OVER9000\n                   │  no duplicates, no blank lines
//! └──────────────────────────────┘  final line newline-terminated
//! ```
//!
//! An index holding zero codes is a zero-length file.
//!
//! - [`code`]: candidate code bounds and line helpers
//! - [`writer`]: streaming writer that enforces the ordering contract
//! - [`validation`]: structural checks for files of unknown provenance

#![warn(missing_docs)]

pub mod code;
pub mod error;
pub mod validation;
pub mod writer;

pub use code::{
    is_code_len, line_at, line_starts, strip_line_ending, MAX_CODE_LEN, MIN_CODE_LEN,
};
pub use error::FormatError;
pub use validation::{validate_index, IndexFileStats, IndexValidationResult};
pub use writer::{write_index, IndexWriter};
