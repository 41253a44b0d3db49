//! Elementary quantum gates.
//!
//! A gate is a 2×2 unitary applied to one *target* line, optionally
//! controlled by other lines. [`Engine::make_gate`] builds its QMDD over the
//! bottom `lines.len()` levels:
//!
//! ```text
//!   x2 ──●──     Line::Control(1)
//!   x1 ──┼──     Line::Idle
//!   x0 ──X──     Line::Target
//! ```
//!
//! Below the target, each block of the gate matrix is built separately, with
//! controls routing to it or to the identity; above the target, controls pick
//! between the gate and the identity.

use std::f64::consts::FRAC_1_SQRT_2;
use std::fmt;

use log::debug;
use num_complex::Complex64;

use crate::engine::Engine;
use crate::error::{EngineError, Result};
use crate::node::{diagonal, Edge, Edges};
use crate::scalar::Scalar;
use crate::types::{Level, Var, NEDGE, RADIX};

/// Role of one line (variable) in a gate.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum Line {
    /// Not involved; the gate acts as identity here.
    Idle,
    /// Gate applies only when this line has the given value.
    Control(u8),
    /// The line the matrix acts on.
    Target,
}

/// A 2×2 gate matrix, row-major.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct GateMatrix(pub [Complex64; NEDGE]);

// Constructors
impl GateMatrix {
    pub fn new(rows: [[Complex64; RADIX]; RADIX]) -> Self {
        GateMatrix([rows[0][0], rows[0][1], rows[1][0], rows[1][1]])
    }

    pub fn from_real(rows: [[f64; RADIX]; RADIX]) -> Self {
        let c = |x: f64| Complex64::new(x, 0.0);
        GateMatrix::new([[c(rows[0][0]), c(rows[0][1])], [c(rows[1][0]), c(rows[1][1])]])
    }

    pub fn identity() -> Self {
        GateMatrix::from_real([[1.0, 0.0], [0.0, 1.0]])
    }

    /// Pauli-X (NOT).
    pub fn not() -> Self {
        GateMatrix::from_real([[0.0, 1.0], [1.0, 0.0]])
    }

    pub fn pauli_y() -> Self {
        let i = Complex64::i();
        let z = Complex64::new(0.0, 0.0);
        GateMatrix::new([[z, -i], [i, z]])
    }

    pub fn pauli_z() -> Self {
        GateMatrix::from_real([[1.0, 0.0], [0.0, -1.0]])
    }

    pub fn hadamard() -> Self {
        let h = FRAC_1_SQRT_2;
        GateMatrix::from_real([[h, h], [h, -h]])
    }

    /// Phase gate `diag(1, i)`.
    pub fn s() -> Self {
        let one = Complex64::new(1.0, 0.0);
        let z = Complex64::new(0.0, 0.0);
        GateMatrix::new([[one, z], [z, Complex64::i()]])
    }

    /// Square root of NOT.
    pub fn v() -> Self {
        let p = Complex64::new(0.5, 0.5);
        let m = Complex64::new(0.5, -0.5);
        GateMatrix::new([[p, m], [m, p]])
    }

    /// Inverse square root of NOT.
    pub fn v_dagger() -> Self {
        let p = Complex64::new(0.5, 0.5);
        let m = Complex64::new(0.5, -0.5);
        GateMatrix::new([[m, p], [p, m]])
    }
}

// Getters
impl GateMatrix {
    pub fn entry(&self, row: usize, col: usize) -> Complex64 {
        self.0[row * RADIX + col]
    }
}

impl fmt::Display for GateMatrix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[[{}, {}], [{}, {}]]",
            self.0[0], self.0[1], self.0[2], self.0[3]
        )
    }
}

impl Engine {
    /// Builds the node deciding `var` whose four blocks are the given scalars.
    pub fn make_matrix_node(&mut self, var: Var, m: [[Scalar; RADIX]; RADIX]) -> Result<Edge> {
        let t = Edge::terminal;
        self.make_nonterminal(var, [t(m[0][0]), t(m[0][1]), t(m[1][0]), t(m[1][1])])
    }

    /// Column vector `|bits⟩` over the bottom `bits.len()` levels (`bits` indexed by variable).
    pub fn basis_state(&mut self, bits: &[bool]) -> Result<Edge> {
        let n = bits.len();
        let mut e = Edge::ONE;
        for l in 0..n {
            let var = self.span_var(l, n)?;
            let mut edges = [Edge::ZERO; NEDGE];
            let row = usize::from(bits[var.index()]);
            edges[row * RADIX] = e;
            e = self.make_nonterminal(var, edges)?;
        }
        Ok(e)
    }

    /// Variable at level `l`, checked to be one of the first `n` variables.
    fn span_var(&self, l: usize, n: usize) -> Result<Var> {
        if n > self.num_vars() {
            return Err(EngineError::UnknownVariable {
                var: Var::from(n - 1),
                num_vars: self.num_vars(),
            });
        }
        let var = self.var_at(Level::new(l));
        if var.index() >= n {
            return Err(EngineError::InvalidGate(format!(
                "variable {} at level {} lies outside the {} lines of the gate",
                var, l, n
            )));
        }
        Ok(var)
    }

    /// QMDD of `matrix` applied to the lines described by `lines` (indexed by variable).
    ///
    /// # Errors
    ///
    /// [`EngineError::InvalidGate`] unless exactly one line is the target and
    /// every control value is `0` or `1`.
    pub fn make_gate(&mut self, matrix: &GateMatrix, lines: &[Line]) -> Result<Edge> {
        debug!("make_gate(matrix = {}, lines = {:?})", matrix, lines);
        let n = lines.len();
        let targets = lines.iter().filter(|&&l| l == Line::Target).count();
        if targets != 1 {
            return Err(EngineError::InvalidGate(format!("expected exactly one target, got {}", targets)));
        }
        if let Some(c) = lines.iter().find_map(|l| match l {
            Line::Control(c) if *c as usize >= RADIX => Some(*c),
            _ => None,
        }) {
            return Err(EngineError::InvalidGate(format!("control value {} out of range", c)));
        }

        let mut em: Edges = [Edge::ZERO; NEDGE];
        for (i, e) in em.iter_mut().enumerate() {
            *e = Edge::terminal(self.scalars.intern_complex(matrix.0[i])?);
        }

        // Below the target: one diagram per block.
        let mut level = 0;
        loop {
            let var = self.span_var(level, n)?;
            if lines[var.index()] == Line::Target {
                break;
            }
            let below = self.identity(level)?;
            for i in 0..NEDGE {
                let (i1, i2) = (i / RADIX, i % RADIX);
                em[i] = match lines[var.index()] {
                    Line::Control(c) => {
                        let mut fm = [Edge::ZERO; NEDGE];
                        for k in 0..RADIX {
                            fm[k * RADIX + k] = if k == c as usize {
                                em[i]
                            } else if i1 == i2 {
                                below
                            } else {
                                Edge::ZERO
                            };
                        }
                        self.make_nonterminal(var, fm)?
                    }
                    _ => self.make_nonterminal(var, diagonal([em[i]; RADIX]))?,
                };
            }
            level += 1;
        }

        let target = self.var_at(Level::new(level));
        let mut e = self.make_nonterminal(target, em)?;

        // Above the target: controls select between the gate and the identity.
        for l in (level + 1)..n {
            let var = self.span_var(l, n)?;
            let edges = match lines[var.index()] {
                Line::Control(c) => {
                    let below = self.identity(l)?;
                    let mut d = [below; RADIX];
                    d[c as usize] = e;
                    diagonal(d)
                }
                _ => diagonal([e; RADIX]),
            };
            e = self.make_nonterminal(var, edges)?;
        }
        debug!("computed: make_gate -> {}", e);
        Ok(e)
    }

    /// Gate on `n` lines with `controls` (control value 1) and `target`.
    pub fn gate(&mut self, matrix: &GateMatrix, n: usize, controls: &[Var], target: Var) -> Result<Edge> {
        let mut lines = vec![Line::Idle; n];
        for &v in controls.iter().chain(std::iter::once(&target)) {
            if v.index() >= n {
                return Err(EngineError::UnknownVariable { var: v, num_vars: n });
            }
        }
        for &c in controls {
            lines[c.index()] = Line::Control(1);
        }
        if lines[target.index()] != Line::Idle {
            return Err(EngineError::InvalidGate(format!("{} is both control and target", target)));
        }
        lines[target.index()] = Line::Target;
        self.make_gate(matrix, &lines)
    }
}

#[cfg(test)]
mod tests {
    use test_log::test;

    use super::*;

    #[test]
    fn test_identity_gate_is_identity() {
        let mut engine = Engine::new(3);
        let g = engine.gate(&GateMatrix::identity(), 3, &[], Var::new(1)).unwrap();
        let i = engine.identity(3).unwrap();
        assert_eq!(g, i);
        let g2 = engine.make_gate(&GateMatrix::identity(), &[Line::Idle, Line::Target, Line::Idle]).unwrap();
        assert_eq!(g2, i);
    }

    #[test]
    fn test_invalid_lines() {
        let mut engine = Engine::new(3);
        let x = GateMatrix::not();
        assert!(matches!(
            engine.make_gate(&x, &[Line::Idle, Line::Idle]),
            Err(EngineError::InvalidGate(_))
        ));
        assert!(matches!(
            engine.make_gate(&x, &[Line::Target, Line::Target]),
            Err(EngineError::InvalidGate(_))
        ));
        assert!(matches!(
            engine.make_gate(&x, &[Line::Target, Line::Control(2)]),
            Err(EngineError::InvalidGate(_))
        ));
        assert!(matches!(
            engine.gate(&x, 2, &[Var::new(0)], Var::new(0)),
            Err(EngineError::InvalidGate(_))
        ));
        assert!(matches!(
            engine.gate(&x, 4, &[], Var::new(0)),
            Err(EngineError::UnknownVariable { .. })
        ));
    }

    #[test]
    fn test_cnot_both_directions_agree() {
        let mut engine = Engine::new(2);
        let x = GateMatrix::not();
        // Control above target.
        let a = engine.gate(&x, 2, &[Var::new(1)], Var::new(0)).unwrap();
        let b = engine
            .make_gate(&x, &[Line::Target, Line::Control(1)])
            .unwrap();
        assert_eq!(a, b);
        assert_eq!(engine.multiply(a, a).unwrap(), engine.identity(2).unwrap());

        // Control below target.
        let c = engine.gate(&x, 2, &[Var::new(0)], Var::new(1)).unwrap();
        assert_ne!(a, c);
        assert_eq!(engine.multiply(c, c).unwrap(), engine.identity(2).unwrap());
    }

    #[test]
    fn test_zero_control() {
        let mut engine = Engine::new(2);
        let x = GateMatrix::not();
        // X on x0 controlled by x1 == 0, equals (X⊗I on x1) CNOT (X⊗I on x1).
        let neg = engine.make_gate(&x, &[Line::Target, Line::Control(0)]).unwrap();
        let cx = engine.gate(&x, 2, &[Var::new(1)], Var::new(0)).unwrap();
        let x1 = engine.gate(&x, 2, &[], Var::new(1)).unwrap();
        let t = engine.multiply(x1, cx).unwrap();
        let t = engine.multiply(t, x1).unwrap();
        assert_eq!(neg, t);
    }

    #[test]
    fn test_v_squared_is_not() {
        let mut engine = Engine::new(1);
        let v = engine.gate(&GateMatrix::v(), 1, &[], Var::new(0)).unwrap();
        let vd = engine.gate(&GateMatrix::v_dagger(), 1, &[], Var::new(0)).unwrap();
        let x = engine.gate(&GateMatrix::not(), 1, &[], Var::new(0)).unwrap();
        assert_eq!(engine.multiply(v, v).unwrap(), x);
        assert_eq!(engine.multiply(v, vd).unwrap(), engine.identity(1).unwrap());
        assert_eq!(engine.conjugate_transpose(v).unwrap(), vd);
    }

    #[test]
    fn test_basis_state() {
        let mut engine = Engine::new(2);
        let ket01 = engine.basis_state(&[true, false]).unwrap();
        let ket00 = engine.basis_state(&[false, false]).unwrap();
        let x0 = engine.gate(&GateMatrix::not(), 2, &[], Var::new(0)).unwrap();
        assert_eq!(engine.multiply(x0, ket00).unwrap(), ket01);
    }
}
