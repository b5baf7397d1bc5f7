//! Modulo-8 frame numbers.
//!
//! `frmNum` and `ackNum` are 3-bit counters that wrap, so ordering between
//! two of them is circular. Distances 1..=3 are "ahead"; distance 4 is
//! neither ahead nor behind, which keeps [`is_before`] antisymmetric.

/// Number of distinct frame numbers (and send window slots).
pub const MODULUS: u8 = 8;

const MASK: u8 = MODULUS - 1;

/// The frame number following `num`.
pub fn next(num: u8) -> u8 {
    num.wrapping_add(1) & MASK
}

/// Circular "less than": true when `a` precedes `b` by 1..=3 steps.
pub fn is_before(a: u8, b: u8) -> bool {
    matches!(b.wrapping_sub(a) & MASK, 1..=3)
}

/// Circular "less than or equal".
pub fn is_before_or_eq(a: u8, b: u8) -> bool {
    a & MASK == b & MASK || is_before(a, b)
}

/// Number of steps from `from` forward to `to`.
pub fn distance(from: u8, to: u8) -> u8 {
    to.wrapping_sub(from) & MASK
}
