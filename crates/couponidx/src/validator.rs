//! The membership seam
//!
//! Pricing code depends on [`CouponValidator`] rather than on a concrete
//! index, so a deployment can pick its policy for a missing index file:
//! refuse to start, or run with [`AlwaysInvalid`].

use crate::index::CouponIndex;
use std::sync::Arc;

/// Answers whether a coupon code is in the trusted set
///
/// `false` means "apply no discount". It is never an error.
pub trait CouponValidator: Send + Sync {
    /// Whether `code` is a valid coupon
    fn is_valid(&self, code: &str) -> bool;
}

impl CouponValidator for CouponIndex {
    fn is_valid(&self, code: &str) -> bool {
        CouponIndex::is_valid(self, code)
    }
}

impl<T: CouponValidator + ?Sized> CouponValidator for Arc<T> {
    fn is_valid(&self, code: &str) -> bool {
        (**self).is_valid(code)
    }
}

impl<T: CouponValidator + ?Sized> CouponValidator for &T {
    fn is_valid(&self, code: &str) -> bool {
        (**self).is_valid(code)
    }
}

/// Validator that rejects every code
///
/// Stand-in for an index that could not be opened.
#[derive(Debug, Clone, Copy, Default)]
pub struct AlwaysInvalid;

impl CouponValidator for AlwaysInvalid {
    fn is_valid(&self, _code: &str) -> bool {
        false
    }
}
