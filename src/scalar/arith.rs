//! Memoized scalar arithmetic.
//!
//! Every operation first short-circuits the algebraic identities that can be
//! decided from the keys alone (zero, one, minus one, equal or opposite operands).
//! Only then is the memo consulted; a miss decodes both operands, computes in
//! `f64` and re-interns the result.

use num_complex::Complex64;

use super::{Scalar, ScalarTable};
use crate::cache::{Cache, CacheStats};
use crate::error::{EngineError, Result};

pub struct ScalarArithmeticCache {
    add: Cache<(Scalar, Scalar), Scalar>,
    sub: Cache<(Scalar, Scalar), Scalar>,
    mul: Cache<(Scalar, Scalar), Scalar>,
    div: Cache<(Scalar, Scalar), Scalar>,
}

impl Default for ScalarArithmeticCache {
    fn default() -> Self {
        Self::new(14)
    }
}

impl ScalarArithmeticCache {
    pub fn new(bits: usize) -> Self {
        Self {
            add: Cache::new(bits),
            sub: Cache::new(bits),
            mul: Cache::new(bits),
            div: Cache::new(bits),
        }
    }

    pub fn clear(&mut self) {
        self.add.clear();
        self.sub.clear();
        self.mul.clear();
        self.div.clear();
    }

    pub fn stats(&self) -> [(&'static str, CacheStats); 4] {
        [
            ("add", self.add.stats()),
            ("sub", self.sub.stats()),
            ("mul", self.mul.stats()),
            ("div", self.div.stats()),
        ]
    }

    pub fn add(&mut self, table: &mut ScalarTable, a: Scalar, b: Scalar) -> Result<Scalar> {
        if a.is_zero() {
            return Ok(b);
        }
        if b.is_zero() {
            return Ok(a);
        }
        if a == b.negate() {
            return Ok(Scalar::ZERO);
        }
        if let Some(r) = self.add.get(&(a, b)) {
            return Ok(r);
        }
        let v = table.value(a) + table.value(b);
        let r = table.intern(v.re, v.im)?;
        self.add.insert((a, b), r);
        self.add.insert((b, a), r);
        Ok(r)
    }

    pub fn sub(&mut self, table: &mut ScalarTable, a: Scalar, b: Scalar) -> Result<Scalar> {
        if b.is_zero() {
            return Ok(a);
        }
        if a.is_zero() {
            return Ok(b.negate());
        }
        if a == b {
            return Ok(Scalar::ZERO);
        }
        if let Some(r) = self.sub.get(&(a, b)) {
            return Ok(r);
        }
        let v = table.value(a) - table.value(b);
        let r = table.intern(v.re, v.im)?;
        self.sub.insert((a, b), r);
        Ok(r)
    }

    pub fn mul(&mut self, table: &mut ScalarTable, a: Scalar, b: Scalar) -> Result<Scalar> {
        if a.is_zero() || b.is_zero() {
            return Ok(Scalar::ZERO);
        }
        if a.is_one() {
            return Ok(b);
        }
        if b.is_one() {
            return Ok(a);
        }
        if a == Scalar::MINUS_ONE {
            return Ok(b.negate());
        }
        if b == Scalar::MINUS_ONE {
            return Ok(a.negate());
        }
        if let Some(r) = self.mul.get(&(a, b)) {
            return Ok(r);
        }
        let v = table.value(a) * table.value(b);
        let r = table.intern(v.re, v.im)?;
        self.mul.insert((a, b), r);
        self.mul.insert((b, a), r);
        Ok(r)
    }

    /// Divide `a` by `b`.
    ///
    /// # Errors
    ///
    /// [`EngineError::DegenerateNormalization`] if `b` is zero.
    pub fn div(&mut self, table: &mut ScalarTable, a: Scalar, b: Scalar) -> Result<Scalar> {
        if b.is_zero() {
            return Err(EngineError::DegenerateNormalization {
                numerator: table.value(a).to_string(),
            });
        }
        if a == b {
            return Ok(Scalar::ONE);
        }
        if a.is_zero() {
            return Ok(Scalar::ZERO);
        }
        if b.is_one() {
            return Ok(a);
        }
        if b == Scalar::MINUS_ONE {
            return Ok(a.negate());
        }
        if a == b.negate() {
            return Ok(Scalar::MINUS_ONE);
        }
        if let Some(r) = self.div.get(&(a, b)) {
            return Ok(r);
        }
        let x = table.value(a);
        let y = table.value(b);
        let v = if b.is_real() {
            Complex64::new(x.re / y.re, x.im / y.re)
        } else {
            x / y
        };
        let r = table.intern(v.re, v.im)?;
        self.div.insert((a, b), r);
        Ok(r)
    }

    /// Multiply by a small integer.
    pub fn int_mul(&mut self, table: &mut ScalarTable, n: u32, a: Scalar) -> Result<Scalar> {
        match n {
            0 => Ok(Scalar::ZERO),
            1 => Ok(a),
            _ => {
                let v = table.value(a) * n as f64;
                table.intern(v.re, v.im)
            }
        }
    }

    /// Absolute value as a real scalar.
    pub fn abs(&mut self, table: &mut ScalarTable, a: Scalar) -> Result<Scalar> {
        if a.is_zero() || a.is_one() {
            return Ok(a);
        }
        if a == Scalar::MINUS_ONE {
            return Ok(Scalar::ONE);
        }
        let m = table.magnitude(a);
        table.intern(m, 0.0)
    }

    /// Principal `n`-th root of unity, `e^(2πi/n)`.
    pub fn unit_root(&mut self, table: &mut ScalarTable, n: u32) -> Result<Scalar> {
        assert_ne!(n, 0, "Root of unity of order zero");
        let (sin, cos) = (2.0 * std::f64::consts::PI / n as f64).sin_cos();
        table.intern(cos, sin)
    }
}
