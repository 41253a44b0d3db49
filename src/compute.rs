//! Operation memo tables.
//!
//! One [`Cache`] per [`OpKind`], keyed by the operand handles. Unary operations
//! use the operand twice. The multiply key additionally carries the number of
//! levels the recursion still spans: levels skipped by both operands contribute
//! factors of two to the product, so the same operand pair means different
//! results at different depths.

use std::fmt;

use log::debug;

use crate::cache::{Cache, CacheStats};
use crate::node::Edge;
use crate::utils::{mix64, pairing2, MyHash};

#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum OpKind {
    Add,
    Multiply,
    Kronecker,
    Transpose,
    ConjugateTranspose,
    Renormalize,
}

impl OpKind {
    pub const ALL: [OpKind; 6] = [
        OpKind::Add,
        OpKind::Multiply,
        OpKind::Kronecker,
        OpKind::Transpose,
        OpKind::ConjugateTranspose,
        OpKind::Renormalize,
    ];

    const fn slot(self) -> usize {
        self as usize
    }
}

impl fmt::Display for OpKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            OpKind::Add => "add",
            OpKind::Multiply => "multiply",
            OpKind::Kronecker => "kronecker",
            OpKind::Transpose => "transpose",
            OpKind::ConjugateTranspose => "conjugate_transpose",
            OpKind::Renormalize => "renormalize",
        };
        write!(f, "{}", s)
    }
}

#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub struct ComputeKey {
    pub a: Edge,
    pub b: Edge,
    pub depth: u32,
}

impl ComputeKey {
    pub const fn new(a: Edge, b: Edge) -> Self {
        Self { a, b, depth: 0 }
    }

    pub const fn unary(a: Edge) -> Self {
        Self::new(a, a)
    }

    pub const fn with_depth(a: Edge, b: Edge, depth: u32) -> Self {
        Self { a, b, depth }
    }

    pub const fn mirrored(self) -> Self {
        Self {
            a: self.b,
            b: self.a,
            depth: self.depth,
        }
    }
}

impl MyHash for ComputeKey {
    fn hash(&self) -> u64 {
        let h = pairing2(MyHash::hash(&self.a), MyHash::hash(&self.b));
        mix64(pairing2(h, self.depth as u64))
    }
}

pub struct ComputeTable {
    tables: [Cache<ComputeKey, Edge>; OpKind::ALL.len()],
}

impl Default for ComputeTable {
    fn default() -> Self {
        Self::new(14)
    }
}

impl ComputeTable {
    pub fn new(bits: usize) -> Self {
        Self {
            tables: std::array::from_fn(|_| Cache::new(bits)),
        }
    }

    pub fn lookup(&mut self, kind: OpKind, key: ComputeKey) -> Option<Edge> {
        let res = self.tables[kind.slot()].get(&key);
        if let Some(res) = res {
            debug!("cache: {}({}, {}, depth = {}) -> {}", kind, key.a, key.b, key.depth, res);
        }
        res
    }

    pub fn insert(&mut self, kind: OpKind, key: ComputeKey, result: Edge) {
        self.tables[kind.slot()].insert(key, result);
    }

    /// Records the result under both operand orders.
    pub fn insert_symmetric(&mut self, kind: OpKind, key: ComputeKey, result: Edge) {
        let table = &mut self.tables[kind.slot()];
        table.insert(key, result);
        table.insert(key.mirrored(), result);
    }

    pub fn clear(&mut self) {
        for table in self.tables.iter_mut() {
            table.clear();
        }
    }

    /// Total number of entries over all operation kinds.
    pub fn len(&self) -> usize {
        self.tables.iter().map(|t| t.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.tables.iter().all(|t| t.is_empty())
    }

    pub fn stats(&self) -> Vec<(OpKind, CacheStats)> {
        OpKind::ALL
            .iter()
            .map(|&kind| (kind, self.tables[kind.slot()].stats()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use test_log::test;

    use super::*;
    use crate::scalar::Scalar;

    #[test]
    fn test_kinds_are_separate() {
        let mut ct = ComputeTable::new(4);
        let a = Edge::ONE;
        let b = Edge::terminal(Scalar::I);
        ct.insert(OpKind::Add, ComputeKey::new(a, b), b);

        assert_eq!(ct.lookup(OpKind::Add, ComputeKey::new(a, b)), Some(b));
        assert_eq!(ct.lookup(OpKind::Multiply, ComputeKey::new(a, b)), None);
        assert_eq!(ct.lookup(OpKind::Add, ComputeKey::new(b, a)), None);
    }

    #[test]
    fn test_symmetric_insert() {
        let mut ct = ComputeTable::new(4);
        let a = Edge::ONE;
        let b = Edge::terminal(Scalar::MINUS_ONE);
        ct.insert_symmetric(OpKind::Add, ComputeKey::new(a, b), Edge::ZERO);
        assert_eq!(ct.lookup(OpKind::Add, ComputeKey::new(b, a)), Some(Edge::ZERO));
        assert!(ct.len() >= 1);
    }

    #[test]
    fn test_depth_is_part_of_key() {
        let mut ct = ComputeTable::new(4);
        let a = Edge::ONE;
        ct.insert(OpKind::Multiply, ComputeKey::with_depth(a, a, 2), a);
        assert_eq!(ct.lookup(OpKind::Multiply, ComputeKey::with_depth(a, a, 1)), None);
        assert_eq!(ct.lookup(OpKind::Multiply, ComputeKey::with_depth(a, a, 2)), Some(a));
    }

    #[test]
    fn test_clear() {
        let mut ct = ComputeTable::new(4);
        ct.insert(OpKind::Transpose, ComputeKey::unary(Edge::ONE), Edge::ONE);
        assert!(!ct.is_empty());
        ct.clear();
        assert!(ct.is_empty());
        let stats = ct.stats();
        assert_eq!(stats.len(), 6);
        assert_eq!(stats[0].0, OpKind::Add);
    }

    #[test]
    fn test_table_stays_bounded() {
        let mut ct = ComputeTable::new(4);
        for i in 0..1000u32 {
            let a = Edge::terminal(Scalar::from_parts(i + 2, false, 0, false));
            ct.insert(OpKind::Multiply, ComputeKey::with_depth(a, a, i), a);
        }
        assert!(ct.len() <= 16);
    }
}
