//! Series identity and the logistic recurrence
//!
//! A *series* is the sequence `x(0) = 0.5, x(n+1) = r * x(n) * (1 - x(n))`
//! for one parameter `r`. Its identity is the exact IEEE-754 bit pattern of
//! `r`: no tolerance or rounding is applied, so `+0.0` and `-0.0` name two
//! different series and every NaN payload is its own series.

use std::fmt;

/// Value of every series at step 0.
pub const INITIAL_VALUE: f64 = 0.5;

/// Identity of a series: the bit pattern of its parameter `r`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SeriesKey(u64);

impl SeriesKey {
    /// Key for parameter `r`.
    pub fn from_param(r: f64) -> Self {
        Self(r.to_bits())
    }

    /// Rebuild a key from its raw integer form (as stored in collection names).
    pub const fn from_raw(bits: u64) -> Self {
        Self(bits)
    }

    pub const fn as_u64(self) -> u64 {
        self.0
    }

    /// The parameter this key was derived from.
    pub fn param(self) -> f64 {
        f64::from_bits(self.0)
    }

    pub fn to_le_bytes(self) -> [u8; 8] {
        self.0.to_le_bytes()
    }
}

impl From<f64> for SeriesKey {
    fn from(r: f64) -> Self {
        Self::from_param(r)
    }
}

impl fmt::Display for SeriesKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One application of the recurrence.
///
/// Evaluated strictly as `(r * x) * (1 - x)`; the compute engine and every
/// stored checkpoint depend on this exact rounding sequence.
#[inline]
pub fn step(r: f64, x: f64) -> f64 {
    r * x * (1.0 - x)
}

/// Reference evaluation: advance from `(from_step, from_value)` to `to_step`.
///
/// Returns `from_value` unchanged when `to_step <= from_step`.
pub fn iterate(r: f64, from_step: u64, from_value: f64, to_step: u64) -> f64 {
    let mut x = from_value;
    for _ in from_step..to_step {
        x = step(r, x);
    }
    x
}

/// Reference evaluation of `x(n)` starting from the initial condition.
pub fn value_at(r: f64, n: u64) -> f64 {
    iterate(r, 0, INITIAL_VALUE, n)
}
