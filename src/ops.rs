//! Matrix algebra on QMDDs.
//!
//! All operations recurse over levels from the top down and rebuild their result
//! through [`Engine::make_nonterminal`], memoizing intermediate results in the
//! [`ComputeTable`][crate::compute::ComputeTable]. Incoming weights are stripped
//! before the memo lookup and multiplied back into the result afterwards:
//!
//! ```text
//! w₁·A + w₂·B  =  w₁ · (A + (w₂/w₁)·B)
//! w₁·A × w₂·B  =  (w₁·w₂) · (A × B)
//! ```
//!
//! When one operand skips the variable currently being split, its whole edge
//! stands in for each of the four blocks (the don't-care block `[[x, x], [x, x]]`).

use std::collections::HashMap;

use log::debug;

use crate::compute::{ComputeKey, OpKind};
use crate::engine::Engine;
use crate::error::{EngineError, Result};
use crate::node::{diagonal, Edge, Edges, NodeId};
use crate::scalar::Scalar;
use crate::types::{Level, Var, NEDGE, RADIX};

impl Engine {
    /// Edges of `e` split at `var`: the node's own (weighted) edges if `e` decides
    /// `var`, otherwise `e` itself in every position.
    fn split(&mut self, e: Edge, var: Var) -> Result<Edges> {
        if self.top_var(e) == Some(var) {
            let edges = self.storage[e.node].edges;
            let mut out = edges;
            for (o, c) in out.iter_mut().zip(edges) {
                *o = self.scale(c, e.weight)?;
            }
            Ok(out)
        } else {
            Ok([e; NEDGE])
        }
    }

    /// Raw (unweighted) edges of `e` split at `var`.
    fn split_raw(&self, e: Edge, var: Var) -> Edges {
        if self.top_var(e) == Some(var) {
            self.storage[e.node].edges
        } else {
            [e; NEDGE]
        }
    }

    /// The variable of whichever of `x` and `y` sits higher.
    fn top_of(&self, x: Edge, y: Edge) -> Option<Var> {
        match (self.top_level(x), self.top_level(y)) {
            (None, None) => None,
            (Some(a), None) => Some(self.var_at(a)),
            (None, Some(b)) => Some(self.var_at(b)),
            (Some(a), Some(b)) => Some(self.var_at(a.max(b))),
        }
    }

    /// Matrix sum `x + y`.
    pub fn add(&mut self, x: Edge, y: Edge) -> Result<Edge> {
        debug!("add(x = {}, y = {})", x, y);
        if x.is_zero() {
            return Ok(y);
        }
        if y.is_zero() {
            return Ok(x);
        }
        if x.node == y.node {
            let w = self.scalars.add(x.weight, y.weight)?;
            return Ok(x.with_weight(w));
        }

        // Terminal or lower node index first.
        let (x, y) = if !y.is_terminal() && (x.is_terminal() || x.node <= y.node) {
            (x, y)
        } else {
            (y, x)
        };

        let xw = x.weight;
        let x1 = Edge::new(x.node, Scalar::ONE);
        let yw = self.scalars.div(y.weight, xw)?;
        let y1 = y.with_weight(yw);
        let key = ComputeKey::new(x1, y1);
        if let Some(r) = self.compute.lookup(OpKind::Add, key) {
            return self.scale(r, xw);
        }

        let Some(var) = self.top_of(x1, y1) else {
            unreachable!("add of two distinct terminal nodes");
        };
        let xs = self.split_raw(x1, var);
        let ys = self.split(y1, var)?;
        let mut edges = [Edge::ZERO; NEDGE];
        for i in 0..NEDGE {
            edges[i] = self.add(xs[i], ys[i])?;
        }
        let r = self.make_nonterminal(var, edges)?;
        self.compute.insert_symmetric(OpKind::Add, key, r);
        debug!("computed: add(x = {}, y = {}) -> {}", x1, y1, r);
        self.scale(r, xw)
    }

    /// Matrix product `x × y`.
    pub fn multiply(&mut self, x: Edge, y: Edge) -> Result<Edge> {
        debug!("multiply(x = {}, y = {})", x, y);
        let depth = self.depth(x).max(self.depth(y));
        self.multiply_rec(x, y, depth)
    }

    /// Product of `x` and `y` as matrices over the bottom `depth` levels.
    fn multiply_rec(&mut self, x: Edge, y: Edge, depth: usize) -> Result<Edge> {
        if x.is_zero() || y.is_zero() {
            return Ok(Edge::ZERO);
        }
        let w = self.scalars.mul(x.weight, y.weight)?;
        if depth == 0 {
            return Ok(Edge::terminal(w));
        }

        let x1 = Edge::new(x.node, Scalar::ONE);
        let y1 = Edge::new(y.node, Scalar::ONE);
        let key = ComputeKey::with_depth(x1, y1, depth as u32);
        if let Some(r) = self.compute.lookup(OpKind::Multiply, key) {
            return self.scale(r, w);
        }

        let var = self.var_at(Level::new(depth - 1));
        let x_at = self.top_var(x1) == Some(var);
        let y_at = self.top_var(y1) == Some(var);
        if x_at && self.is_identity(x1) {
            debug!("multiply: I × y => y");
            return self.scale(y1, w);
        }
        if y_at && self.is_identity(y1) {
            debug!("multiply: x × I => x");
            return self.scale(x1, w);
        }

        let xs = self.split_raw(x1, var);
        let ys = self.split_raw(y1, var);
        let mut edges = [Edge::ZERO; NEDGE];
        for i in 0..RADIX {
            for j in 0..RADIX {
                let mut acc = Edge::ZERO;
                for k in 0..RADIX {
                    let p = self.multiply_rec(xs[i * RADIX + k], ys[k * RADIX + j], depth - 1)?;
                    acc = self.add(acc, p)?;
                }
                edges[i * RADIX + j] = acc;
            }
        }
        let r = self.make_nonterminal(var, edges)?;

        // Diagonal matrices commute.
        if x_at && y_at && self.special_flags(x1).diag && self.special_flags(y1).diag {
            self.compute.insert_symmetric(OpKind::Multiply, key, r);
        } else {
            self.compute.insert(OpKind::Multiply, key, r);
        }
        debug!("computed: multiply(x = {}, y = {}, depth = {}) -> {}", x1, y1, depth, r);
        self.scale(r, w)
    }

    /// Kronecker product `a ⊗ b`. The variables of `a` must all lie above those of `b`.
    pub fn kronecker(&mut self, a: Edge, b: Edge) -> Result<Edge> {
        debug!("kronecker(a = {}, b = {})", a, b);
        if a.is_zero() || b.is_zero() {
            return Ok(Edge::ZERO);
        }
        if a.is_terminal() {
            return self.scale(b, a.weight);
        }

        let a1 = Edge::new(a.node, Scalar::ONE);
        let key = ComputeKey::new(a1, b);
        if let Some(r) = self.compute.lookup(OpKind::Kronecker, key) {
            return self.scale(r, a.weight);
        }

        let node = self.storage[a.node];
        let Some(var) = node.var else {
            return self.scale(b, a.weight);
        };
        if let Some(lb) = self.top_level(b) {
            if self.level_of(var) <= lb {
                return Err(EngineError::InvalidGate(format!(
                    "kronecker: left operand at {} does not lie above right operand at {}",
                    self.level_of(var),
                    lb
                )));
            }
        }
        let mut edges = [Edge::ZERO; NEDGE];
        for i in 0..NEDGE {
            edges[i] = self.kronecker(node.edges[i], b)?;
        }
        let r = self.make_nonterminal(var, edges)?;
        self.compute.insert(OpKind::Kronecker, key, r);
        self.scale(r, a.weight)
    }

    /// Transpose `aᵀ`.
    pub fn transpose(&mut self, a: Edge) -> Result<Edge> {
        if a.is_terminal() || self.is_symmetric(a) {
            return Ok(a);
        }
        let a1 = Edge::new(a.node, Scalar::ONE);
        let key = ComputeKey::unary(a1);
        if let Some(r) = self.compute.lookup(OpKind::Transpose, key) {
            return self.scale(r, a.weight);
        }

        let node = self.storage[a.node];
        let Some(var) = node.var else {
            return Ok(a);
        };
        let mut edges = [Edge::ZERO; NEDGE];
        for i in 0..RADIX {
            for j in 0..RADIX {
                edges[i * RADIX + j] = self.transpose(node.edges[j * RADIX + i])?;
            }
        }
        let r = self.make_nonterminal(var, edges)?;
        self.compute.insert(OpKind::Transpose, key, r);
        self.scale(r, a.weight)
    }

    /// Conjugate transpose `a†`.
    pub fn conjugate_transpose(&mut self, a: Edge) -> Result<Edge> {
        if a.is_terminal() {
            return Ok(Edge::terminal(a.weight.conj()));
        }
        let a1 = Edge::new(a.node, Scalar::ONE);
        let key = ComputeKey::unary(a1);
        if let Some(r) = self.compute.lookup(OpKind::ConjugateTranspose, key) {
            return self.scale(r, a.weight.conj());
        }

        let node = self.storage[a.node];
        let Some(var) = node.var else {
            return Ok(Edge::terminal(a.weight.conj()));
        };
        let mut edges = [Edge::ZERO; NEDGE];
        for i in 0..RADIX {
            for j in 0..RADIX {
                edges[i * RADIX + j] = self.conjugate_transpose(node.edges[j * RADIX + i])?;
            }
        }
        let r = self.make_nonterminal(var, edges)?;
        self.compute.insert(OpKind::ConjugateTranspose, key, r);
        self.scale(r, a.weight.conj())
    }

    /// Partial trace over the variables flagged in `remove` (indexed by variable).
    ///
    /// Traced-out variables disappear from the result; a traced variable that
    /// `a` does not depend on contributes a factor of two.
    pub fn trace(&mut self, a: Edge, remove: &[bool]) -> Result<Edge> {
        debug!("trace(a = {}, remove = {:?})", a, remove);
        if remove.len() > self.num_vars() {
            return Err(EngineError::UnknownVariable {
                var: Var::from(remove.len() - 1),
                num_vars: self.num_vars(),
            });
        }
        let mut memo = HashMap::new();
        self.trace_rec(a, self.num_vars(), remove, &mut memo)
    }

    /// Full trace; the result is a terminal edge.
    pub fn trace_all(&mut self, a: Edge) -> Result<Edge> {
        let remove = vec![true; self.num_vars()];
        self.trace(a, &remove)
    }

    /// `depth` is the number of levels still to process.
    fn trace_rec(
        &mut self,
        e: Edge,
        depth: usize,
        remove: &[bool],
        memo: &mut HashMap<(NodeId, usize), Edge>,
    ) -> Result<Edge> {
        if e.is_zero() || depth == 0 {
            return Ok(e);
        }
        if let Some(&r) = memo.get(&(e.node, depth)) {
            return self.scale(r, e.weight);
        }

        let var = self.var_at(Level::new(depth - 1));
        let removed = remove.get(var.index()).copied().unwrap_or(false);
        let e1 = Edge::new(e.node, Scalar::ONE);
        let r = if self.top_var(e1) == Some(var) {
            let edges = self.storage[e.node].edges;
            if removed {
                let mut acc = Edge::ZERO;
                for i in 0..RADIX {
                    let t = self.trace_rec(edges[i * RADIX + i], depth - 1, remove, memo)?;
                    acc = self.add(acc, t)?;
                }
                acc
            } else {
                let mut out = [Edge::ZERO; NEDGE];
                for i in 0..NEDGE {
                    out[i] = self.trace_rec(edges[i], depth - 1, remove, memo)?;
                }
                self.make_nonterminal(var, out)?
            }
        } else {
            let t = self.trace_rec(e1, depth - 1, remove, memo)?;
            if removed {
                let two = self.scalars.int_mul(RADIX as u32, Scalar::ONE)?;
                self.scale(t, two)?
            } else {
                t
            }
        };
        memo.insert((e.node, depth), r);
        self.scale(r, e.weight)
    }

    /// Identity over the bottom `n` levels.
    ///
    /// Identities are cached per level count and pinned, so they survive
    /// garbage collection.
    pub fn identity(&mut self, n: usize) -> Result<Edge> {
        if n > self.num_vars() {
            return Err(EngineError::UnknownVariable {
                var: Var::from(n - 1),
                num_vars: self.num_vars(),
            });
        }
        if let Some(e) = self.identities[n] {
            return Ok(e);
        }
        let e = if n == 0 {
            Edge::ONE
        } else {
            let below = self.identity(n - 1)?;
            let var = self.var_at(Level::new(n - 1));
            self.make_nonterminal(var, diagonal([below; RADIX]))?
        };
        self.incref(e);
        self.identities[n] = Some(e);
        Ok(e)
    }

    /// Releases the pinned identities.
    pub(crate) fn clear_identities(&mut self) {
        for i in 0..self.identities.len() {
            if let Some(e) = self.identities[i].take() {
                self.decref(e);
            }
        }
    }
}
