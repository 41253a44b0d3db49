//! Tolerant interning of real components.
//!
//! The table stores non-negative reals only. Lookup goes through an ordered map
//! and accepts any stored value within `tolerance` of the query, so values that
//! differ only by rounding noise share one index. Among several candidates in the
//! window the closest one wins.
//!
//! Magnitudes of complex scalars are needed by the normalizer for every node it
//! builds, so they are cached per sign-free key.

use std::cmp::Ordering;
use std::collections::BTreeMap;

use log::debug;
use num_complex::Complex64;

use super::{Scalar, MAX_INDEX};
use crate::cache::Cache;
use crate::error::{EngineError, Result};

/// Totally ordered `f64` key.
#[derive(Debug, Copy, Clone)]
struct Key(f64);

impl PartialEq for Key {
    fn eq(&self, other: &Self) -> bool {
        self.0.total_cmp(&other.0) == Ordering::Equal
    }
}

impl Eq for Key {}

impl PartialOrd for Key {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Key {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.total_cmp(&other.0)
    }
}

pub struct ScalarTable {
    values: Vec<f64>,
    lookup: BTreeMap<Key, u32>,
    magnitudes: Cache<u64, f64>,
    tolerance: f64,
    capacity: usize,
}

impl ScalarTable {
    /// Create a table holding at most `capacity` distinct components.
    ///
    /// The capacity is clamped to the 31-bit index space.
    pub fn new(tolerance: f64, capacity: usize) -> Self {
        assert!(tolerance >= 0.0, "Tolerance must be non-negative");
        let capacity = capacity.clamp(2, MAX_INDEX as usize + 1);

        let mut lookup = BTreeMap::new();
        lookup.insert(Key(0.0), 0);
        lookup.insert(Key(1.0), 1);

        Self {
            values: vec![0.0, 1.0],
            lookup,
            magnitudes: Cache::new(10),
            tolerance,
            capacity,
        }
    }

    pub fn tolerance(&self) -> f64 {
        self.tolerance
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of distinct components stored.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        // Zero and one are always present.
        false
    }

    /// Stored value of a component index.
    pub fn component(&self, index: u32) -> f64 {
        self.values[index as usize]
    }

    /// Find (or insert) the index of `|x|`.
    fn component_index(&mut self, x: f64) -> Result<u32> {
        let x = x.abs();
        if x <= self.tolerance {
            return Ok(0);
        }

        let lo = Key(x - self.tolerance);
        let hi = Key(x + self.tolerance);
        let closest = self
            .lookup
            .range(lo..=hi)
            .min_by(|a, b| (a.0 .0 - x).abs().total_cmp(&(b.0 .0 - x).abs()))
            .map(|(_, &i)| i);
        if let Some(i) = closest {
            return Ok(i);
        }

        if self.values.len() >= self.capacity {
            return Err(EngineError::TableOverflow {
                table: "scalar",
                capacity: self.capacity,
            });
        }
        let i = self.values.len() as u32;
        self.values.push(x);
        self.lookup.insert(Key(x), i);
        if self.values.len() % 100_000 == 0 {
            debug!("scalar table grew to {} entries", self.values.len());
        }
        Ok(i)
    }

    /// Intern a complex number.
    pub fn intern(&mut self, real: f64, imag: f64) -> Result<Scalar> {
        if !real.is_finite() || !imag.is_finite() {
            return Err(EngineError::DegenerateNormalization {
                numerator: format!("{}{:+}i", real, imag),
            });
        }
        let r = self.component_index(real)?;
        let i = self.component_index(imag)?;
        Ok(Scalar::from_parts(r, real < 0.0, i, imag < 0.0))
    }

    /// Decode a scalar.
    pub fn value(&self, s: Scalar) -> Complex64 {
        let mut re = self.component(s.real_index());
        let mut im = self.component(s.imag_index());
        if s.is_real_negative() {
            re = -re;
        }
        if s.is_imag_negative() {
            im = -im;
        }
        Complex64::new(re, im)
    }

    /// Absolute value, cached per sign-free key.
    pub fn magnitude(&mut self, s: Scalar) -> f64 {
        if s.is_zero() {
            return 0.0;
        }
        if s.is_one() || s == Scalar::MINUS_ONE {
            return 1.0;
        }
        let key = s.magnitude_key();
        if let Some(m) = self.magnitudes.get(&key) {
            return m;
        }
        let m = self.component(s.real_index()).hypot(self.component(s.imag_index()));
        self.magnitudes.insert(key, m);
        m
    }

    pub(crate) fn clear_magnitudes(&mut self) {
        self.magnitudes.clear();
    }

    /// Compare by magnitude, then by angle, both up to tolerance.
    pub fn compare(&mut self, a: Scalar, b: Scalar) -> Ordering {
        if a == b {
            return Ordering::Equal;
        }
        let ma = self.magnitude(a);
        let mb = self.magnitude(b);
        if (ma - mb).abs() > self.tolerance {
            return ma.total_cmp(&mb);
        }
        let pa = self.value(a).arg();
        let pb = self.value(b).arg();
        if (pa - pb).abs() > self.tolerance {
            return pa.total_cmp(&pb);
        }
        Ordering::Equal
    }
}

#[cfg(test)]
mod tests {
    use std::f64::consts::FRAC_1_SQRT_2;

    use test_log::test;

    use super::*;

    #[test]
    fn test_fixed_entries() {
        let mut t = ScalarTable::new(1e-10, 1 << 20);
        assert_eq!(t.intern(0.0, 0.0).unwrap(), Scalar::ZERO);
        assert_eq!(t.intern(1.0, 0.0).unwrap(), Scalar::ONE);
        assert_eq!(t.intern(-1.0, 0.0).unwrap(), Scalar::MINUS_ONE);
        assert_eq!(t.intern(0.0, 1.0).unwrap(), Scalar::I);
        assert_eq!(t.intern(-0.0, -0.0).unwrap(), Scalar::ZERO);
        assert_eq!(t.len(), 2);
    }

    #[test]
    fn test_intern_is_tolerant() {
        let mut t = ScalarTable::new(1e-10, 1 << 20);
        let a = t.intern(FRAC_1_SQRT_2, 0.0).unwrap();
        let b = t.intern(FRAC_1_SQRT_2 + 1e-12, 0.0).unwrap();
        let c = t.intern(1.0 / 2f64.sqrt(), -1e-13).unwrap();
        assert_eq!(a, b);
        assert_eq!(a, c);
        assert_eq!(t.len(), 3);

        let d = t.intern(FRAC_1_SQRT_2 + 1e-6, 0.0).unwrap();
        assert_ne!(a, d);
    }

    #[test]
    fn test_sign_sharing() {
        let mut t = ScalarTable::new(1e-10, 1 << 20);
        let a = t.intern(0.5, -0.25).unwrap();
        let b = t.intern(-0.5, 0.25).unwrap();
        assert_eq!(a.real_index(), b.real_index());
        assert_eq!(a.imag_index(), b.imag_index());
        assert_eq!(a.negate(), b);
        assert_eq!(t.value(a), Complex64::new(0.5, -0.25));
    }

    #[test]
    fn test_magnitude_and_compare() {
        let mut t = ScalarTable::new(1e-10, 1 << 20);
        let a = t.intern(0.6, 0.8).unwrap();
        let b = t.intern(-0.6, 0.8).unwrap();
        let h = t.intern(FRAC_1_SQRT_2, 0.0).unwrap();
        assert!((t.magnitude(a) - 1.0).abs() < 1e-12);
        assert!((t.magnitude(b) - 1.0).abs() < 1e-12);
        assert_eq!(t.compare(h, a), Ordering::Less);
        assert_eq!(t.compare(Scalar::ONE, h), Ordering::Greater);
        // Same magnitude, angle decides.
        assert_eq!(t.compare(a, b), Ordering::Less);
        assert_eq!(t.compare(a, a), Ordering::Equal);
    }

    #[test]
    fn test_overflow() {
        let mut t = ScalarTable::new(1e-10, 4);
        t.intern(0.25, 0.0).unwrap();
        t.intern(0.5, 0.0).unwrap();
        let err = t.intern(0.75, 0.0).unwrap_err();
        assert_eq!(
            err,
            EngineError::TableOverflow {
                table: "scalar",
                capacity: 4
            }
        );
        // Existing values still resolve.
        assert!(t.intern(-0.5, 0.25).is_ok());
    }

    #[test]
    fn test_non_finite_rejected() {
        let mut t = ScalarTable::new(1e-10, 16);
        assert!(matches!(
            t.intern(f64::NAN, 0.0),
            Err(EngineError::DegenerateNormalization { .. })
        ));
    }
}
