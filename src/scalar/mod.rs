//! Canonical complex edge weights.
//!
//! Every edge weight in a QMDD is a [`Scalar`]: a 64-bit key into a table of
//! non-negative reals, with the signs of the two components folded into spare bits.
//!
//! ```text
//!  63  62 ............ 32  31  30 ............ 0
//! ┌───┬──────────────────┬───┬─────────────────┐
//! │ s │ real index       │ s │ imag index      │
//! └───┴──────────────────┴───┴─────────────────┘
//! ```
//!
//! Component index 0 always holds exact `0.0` and index 1 exact `1.0`, so
//! [`Scalar::ZERO`], [`Scalar::ONE`] and [`Scalar::MINUS_ONE`] are fixed bit patterns
//! and the most common weights are recognized without any table access.
//! A sign bit is only ever set next to a nonzero index: there is no negative zero.
//!
//! Since values are interned with a tolerance (see [`ScalarTable`]), two weights
//! compare equal as keys iff they are equal up to that tolerance. This is what lets
//! the unique table compare edges bitwise.
//!
//! The [`Scalars`] facade bundles the table with the memoized arithmetic of
//! [`ScalarArithmeticCache`].

use std::fmt;

use num_complex::Complex64;

use crate::cache::CacheStats;
use crate::error::Result;
use crate::utils::{mix64, pairing2, MyHash};

pub mod arith;
pub mod table;

pub use arith::ScalarArithmeticCache;
pub use table::ScalarTable;

/// Default tolerance below which two real components are considered equal.
pub const DEFAULT_TOLERANCE: f64 = 1e-10;

const REAL_SIGN: u64 = 1 << 63;
const IMAG_SIGN: u64 = 1 << 31;
const INDEX_MASK: u64 = 0x7FFF_FFFF;
const MAGNITUDE_MASK: u64 = 0x7FFF_FFFF_7FFF_FFFF;

/// Largest representable component index.
pub const MAX_INDEX: u32 = INDEX_MASK as u32;

/// Interned complex number.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct Scalar(u64);

impl Scalar {
    pub const ZERO: Scalar = Scalar(0);
    pub const ONE: Scalar = Scalar(1 << 32);
    pub const MINUS_ONE: Scalar = Scalar(REAL_SIGN | (1 << 32));
    pub const I: Scalar = Scalar(1);
    pub const MINUS_I: Scalar = Scalar(IMAG_SIGN | 1);

    /// Packs two component indices and their signs.
    ///
    /// Signs attached to a zero index are dropped.
    pub fn from_parts(real: u32, real_negative: bool, imag: u32, imag_negative: bool) -> Self {
        debug_assert!(real <= MAX_INDEX && imag <= MAX_INDEX);
        let mut raw = ((real as u64) << 32) | imag as u64;
        if real != 0 && real_negative {
            raw |= REAL_SIGN;
        }
        if imag != 0 && imag_negative {
            raw |= IMAG_SIGN;
        }
        Scalar(raw)
    }

    /// Returns the raw 64-bit key.
    pub const fn raw(self) -> u64 {
        self.0
    }

    pub const fn real_index(self) -> u32 {
        ((self.0 >> 32) & INDEX_MASK) as u32
    }

    pub const fn imag_index(self) -> u32 {
        (self.0 & INDEX_MASK) as u32
    }

    pub const fn is_real_negative(self) -> bool {
        self.0 & REAL_SIGN != 0
    }

    pub const fn is_imag_negative(self) -> bool {
        self.0 & IMAG_SIGN != 0
    }

    pub const fn is_zero(self) -> bool {
        self.0 == Self::ZERO.0
    }

    pub const fn is_one(self) -> bool {
        self.0 == Self::ONE.0
    }

    /// Whether the imaginary component is zero.
    pub const fn is_real(self) -> bool {
        self.imag_index() == 0
    }

    /// Additive inverse. Flips the sign of every nonzero component.
    pub const fn negate(self) -> Self {
        let mut raw = self.0;
        if self.real_index() != 0 {
            raw ^= REAL_SIGN;
        }
        if self.imag_index() != 0 {
            raw ^= IMAG_SIGN;
        }
        Scalar(raw)
    }

    /// Complex conjugate.
    pub const fn conj(self) -> Self {
        if self.imag_index() != 0 {
            Scalar(self.0 ^ IMAG_SIGN)
        } else {
            self
        }
    }

    /// Key shared by all sign variants of this value (same magnitude).
    pub(crate) const fn magnitude_key(self) -> u64 {
        self.0 & MAGNITUDE_MASK
    }
}

impl fmt::Display for Scalar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}r{}{}i{}",
            if self.is_real_negative() { "-" } else { "" },
            self.real_index(),
            if self.is_imag_negative() { "-" } else { "+" },
            self.imag_index()
        )
    }
}

impl MyHash for (Scalar, Scalar) {
    fn hash(&self) -> u64 {
        mix64(pairing2(self.0.raw(), self.1.raw()))
    }
}

/// Scalar table plus memoized arithmetic.
pub struct Scalars {
    table: ScalarTable,
    arith: ScalarArithmeticCache,
}

impl Scalars {
    pub fn new(tolerance: f64, capacity: usize, cache_bits: usize) -> Self {
        Self {
            table: ScalarTable::new(tolerance, capacity),
            arith: ScalarArithmeticCache::new(cache_bits),
        }
    }

    pub fn table(&self) -> &ScalarTable {
        &self.table
    }

    pub fn tolerance(&self) -> f64 {
        self.table.tolerance()
    }

    pub fn len(&self) -> usize {
        self.table.len()
    }

    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }

    pub fn intern(&mut self, real: f64, imag: f64) -> Result<Scalar> {
        self.table.intern(real, imag)
    }

    pub fn intern_complex(&mut self, value: Complex64) -> Result<Scalar> {
        self.table.intern(value.re, value.im)
    }

    pub fn value(&self, s: Scalar) -> Complex64 {
        self.table.value(s)
    }

    pub fn magnitude(&mut self, s: Scalar) -> f64 {
        self.table.magnitude(s)
    }

    pub fn compare(&mut self, a: Scalar, b: Scalar) -> std::cmp::Ordering {
        self.table.compare(a, b)
    }

    /// `|a| > |b|` beyond tolerance.
    pub fn magnitude_gt(&mut self, a: Scalar, b: Scalar) -> bool {
        let tol = self.table.tolerance();
        self.table.magnitude(a) > self.table.magnitude(b) + tol
    }

    pub fn add(&mut self, a: Scalar, b: Scalar) -> Result<Scalar> {
        self.arith.add(&mut self.table, a, b)
    }

    pub fn sub(&mut self, a: Scalar, b: Scalar) -> Result<Scalar> {
        self.arith.sub(&mut self.table, a, b)
    }

    pub fn mul(&mut self, a: Scalar, b: Scalar) -> Result<Scalar> {
        self.arith.mul(&mut self.table, a, b)
    }

    pub fn div(&mut self, a: Scalar, b: Scalar) -> Result<Scalar> {
        self.arith.div(&mut self.table, a, b)
    }

    pub fn int_mul(&mut self, n: u32, a: Scalar) -> Result<Scalar> {
        self.arith.int_mul(&mut self.table, n, a)
    }

    pub fn abs(&mut self, a: Scalar) -> Result<Scalar> {
        self.arith.abs(&mut self.table, a)
    }

    pub fn unit_root(&mut self, n: u32) -> Result<Scalar> {
        self.arith.unit_root(&mut self.table, n)
    }

    pub fn negate(&self, a: Scalar) -> Scalar {
        a.negate()
    }

    pub fn conj(&self, a: Scalar) -> Scalar {
        a.conj()
    }

    pub fn cache_stats(&self) -> [(&'static str, CacheStats); 4] {
        self.arith.stats()
    }

    /// Empties the arithmetic and magnitude memos. Interned scalars stay.
    pub fn clear_caches(&mut self) {
        self.arith.clear();
        self.table.clear_magnitudes();
    }
}
