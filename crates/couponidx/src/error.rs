//! Error types for the couponidx library
//!
//! Each component has its own error enum; [`CouponIdxError`] wraps them for
//! callers that drive both halves of the pipeline.

use thiserror::Error;

/// Main error type for couponidx operations
#[derive(Error, Debug)]
pub enum CouponIdxError {
    /// Error while building an index file
    #[error(transparent)]
    Build(#[from] crate::builder::BuildError),

    /// Error while opening or querying an index
    #[error(transparent)]
    Index(#[from] crate::index::IndexError),

    /// Error from the file format layer
    #[error(transparent)]
    Format(#[from] couponidx_format::FormatError),

    /// I/O error
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Result type alias for couponidx operations
pub type Result<T> = std::result::Result<T, CouponIdxError>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::IndexError;

    #[test]
    fn test_wraps_component_errors() {
        let err: CouponIdxError = IndexError::Closed.into();
        assert_eq!(err.to_string(), "index is closed");

        let err: CouponIdxError = crate::builder::BuildError::NoSources.into();
        assert!(matches!(err, CouponIdxError::Build(_)));
    }
}
