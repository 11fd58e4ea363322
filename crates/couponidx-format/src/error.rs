//! Error types for couponidx format operations

use thiserror::Error;

/// Errors raised while producing an index file
#[derive(Error, Debug)]
pub enum FormatError {
    /// Code length outside the accepted bounds
    #[error("code {code:?} has length {len}, expected {min}..={max}")]
    InvalidLength {
        /// Offending code, lossily decoded
        code: String,
        /// Its byte length
        len: usize,
        /// Lower bound
        min: usize,
        /// Upper bound
        max: usize,
    },

    /// Codes were not handed over in strictly ascending order
    #[error("codes out of order: {previous:?} followed by {current:?}")]
    Unsorted {
        /// Last code written
        previous: String,
        /// Code that broke the ordering
        current: String,
    },

    /// Code contains a line terminator and would split into two lines
    #[error("code {0:?} contains a line terminator")]
    EmbeddedNewline(String),

    /// I/O error from the underlying sink
    #[error(transparent)]
    Io(#[from] std::io::Error),
}
