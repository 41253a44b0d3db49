//! The QMDD engine: node construction, reference counting and garbage collection.
//!
//! # Representation
//!
//! A QMDD represents a `2ⁿ × 2ⁿ` complex matrix over `n` variables (qubits).
//! Variables are arranged in levels; level 0 is adjacent to the terminal and
//! `order[level] = var` maps levels to variables. A node at variable `v` splits
//! its matrix into four blocks with respect to `v` (see [`node`][crate::node]).
//! A variable skipped between a node and its child contributes the block
//! `[[x, x], [x, x]]`; identities are always explicit diagonal nodes.
//!
//! # Canonicity
//!
//! Every node goes through [`Engine::make_nonterminal`], which
//!
//! 1. drops *redundant* nodes (all four edges equal),
//! 2. *normalizes* the edge weights: the entry of largest magnitude (leftmost
//!    on ties) becomes one and its weight moves to the incoming edge,
//! 3. *hash-conses* the normalized edges in the per-variable [`Subtable`].
//!
//! Together with tolerant scalar interning this makes handle equality
//! coincide with matrix equality.
//!
//! # Memory
//!
//! Nodes are reclaimed only by an explicit [`Engine::collect`] (or inside
//! sifting). A handle that should survive a collection must be pinned with
//! [`Engine::incref`]; everything else may be reclaimed.

use std::collections::HashSet;
use std::fmt;

use log::{debug, info};

use crate::cache::CacheStats;
use crate::compute::{ComputeTable, OpKind};
use crate::error::{EngineError, Result};
use crate::node::{Edge, Edges, FlagState, Node, NodeId};
use crate::scalar::{Scalar, Scalars, DEFAULT_TOLERANCE};
use crate::storage::Storage;
use crate::subtable::{Subtable, DEFAULT_BUCKET_BITS};
use crate::types::{Level, Var, NEDGE};

/// Reference counts saturate here; a saturated node is never reclaimed.
pub const MAX_REF_COUNT: u32 = 4_000_000;

/// Engine configuration.
///
/// # Examples
///
/// ```
/// use qmdd_rs::engine::{Engine, EngineConfig};
///
/// let config = EngineConfig {
///     num_vars: 4,
///     gc_limit: 1000,
///     ..Default::default()
/// };
/// let engine = Engine::with_config(config);
/// assert_eq!(engine.num_vars(), 4);
/// ```
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Number of variables (qubits) (default: 8)
    pub num_vars: usize,
    /// Scalar interning tolerance (default: 1e-10)
    pub tolerance: f64,
    /// Initial bucket bits of each per-variable unique table (default: 14)
    pub bucket_bits: usize,
    /// Maximum number of stored nodes, terminal included (default: 2^31 - 1)
    pub storage_capacity: usize,
    /// Maximum number of distinct scalar components (default: 2^31)
    pub scalar_capacity: usize,
    /// Stored-node count that arms [`Engine::collect`] (default: 25000)
    pub gc_limit: usize,
    /// Growth of the GC limit after each collection (default: 10000)
    pub gc_limit_increment: usize,
    /// Slot bits of each direct-mapped memo table (default: 14)
    pub cache_bits: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            num_vars: 8,
            tolerance: DEFAULT_TOLERANCE,
            bucket_bits: DEFAULT_BUCKET_BITS,
            storage_capacity: Node::NO_NEXT as usize,
            scalar_capacity: 1 << 31,
            gc_limit: 25_000,
            gc_limit_increment: 10_000,
            cache_bits: 14,
        }
    }
}

/// Whether special-matrix flags are computed for new nodes.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum FlagMode {
    Compute,
    Suspend,
}

/// Snapshot of engine counters, see [`Engine::stats`].
#[derive(Debug, Clone)]
pub struct EngineStats {
    pub num_vars: usize,
    /// Nodes currently stored, terminal and dead nodes included.
    pub stored_nodes: usize,
    /// Nodes with a nonzero reference count.
    pub active_nodes: usize,
    /// Active nodes per variable, indexed by variable.
    pub active_per_var: Vec<usize>,
    /// Active nodes whose off-diagonal blocks are all zero.
    pub block_nodes: usize,
    /// Distinct real components in the scalar table.
    pub scalars: usize,
    pub gc_runs: usize,
    pub gc_limit: usize,
    pub compute: Vec<(OpKind, CacheStats)>,
    pub arithmetic: [(&'static str, CacheStats); 4],
}

impl fmt::Display for EngineStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "nodes: {} stored, {} active ({} block), {} scalars, {} GC runs (limit {})",
            self.stored_nodes, self.active_nodes, self.block_nodes, self.scalars, self.gc_runs, self.gc_limit
        )?;
        writeln!(f, "active per variable: {:?}", self.active_per_var)?;
        for (kind, s) in &self.compute {
            writeln!(
                f,
                "  {:<20} hits={:<8} misses={:<8} faults={:<8} entries={:<8} ratio={:.3}",
                kind.to_string(),
                s.hits,
                s.misses,
                s.faults,
                s.entries,
                s.hit_ratio()
            )?;
        }
        for (name, s) in &self.arithmetic {
            writeln!(
                f,
                "  scalar {:<13} hits={:<8} misses={:<8} faults={:<8} entries={:<8} ratio={:.3}",
                name,
                s.hits,
                s.misses,
                s.faults,
                s.entries,
                s.hit_ratio()
            )?;
        }
        Ok(())
    }
}

pub struct Engine {
    pub(crate) config: EngineConfig,
    pub(crate) scalars: Scalars,
    pub(crate) storage: Storage,
    /// Unique tables, indexed by variable.
    pub(crate) subtables: Vec<Subtable>,
    /// `order[level] = var`
    pub(crate) order: Vec<Var>,
    /// `inv_order[var] = level`
    pub(crate) inv_order: Vec<Level>,
    pub(crate) compute: ComputeTable,
    /// Pinned identities; entry `k` spans levels `0..k`.
    pub(crate) identities: Vec<Option<Edge>>,
    pub(crate) active: Vec<usize>,
    pub(crate) active_count: usize,
    pub(crate) block_count: usize,
    pub(crate) flag_mode: FlagMode,
    pub(crate) gc_limit: usize,
    pub(crate) gc_runs: usize,
}

impl Engine {
    pub fn new(num_vars: usize) -> Self {
        Self::with_config(EngineConfig {
            num_vars,
            ..Default::default()
        })
    }

    pub fn with_config(config: EngineConfig) -> Self {
        assert!(config.num_vars > 0, "Engine needs at least one variable");
        assert!(config.bucket_bits <= 30, "Bucket bits should be in the range 0..=30");

        let n = config.num_vars;
        let subtables = (0..n)
            .map(|v| Subtable::with_bucket_bits(Var::from(v), config.bucket_bits))
            .collect();

        Self {
            scalars: Scalars::new(config.tolerance, config.scalar_capacity, config.cache_bits),
            storage: Storage::new(config.storage_capacity),
            subtables,
            order: (0..n).map(Var::from).collect(),
            inv_order: (0..n).map(Level::from).collect(),
            compute: ComputeTable::new(config.cache_bits),
            identities: vec![None; n + 1],
            active: vec![0; n],
            active_count: 0,
            block_count: 0,
            flag_mode: FlagMode::Compute,
            gc_limit: config.gc_limit,
            gc_runs: 0,
            config,
        }
    }
}

impl Default for Engine {
    fn default() -> Self {
        Engine::with_config(EngineConfig::default())
    }
}

impl fmt::Debug for Engine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Engine")
            .field("num_vars", &self.num_vars())
            .field("capacity", &self.storage.capacity())
            .field("size", &self.storage.size())
            .field("real_size", &self.storage.real_size())
            .field("active", &self.active_count)
            .finish()
    }
}

impl Engine {
    pub fn num_vars(&self) -> usize {
        self.config.num_vars
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn scalars(&self) -> &Scalars {
        &self.scalars
    }

    pub fn scalars_mut(&mut self) -> &mut Scalars {
        &mut self.scalars
    }

    /// Current variable order, bottom level first.
    pub fn order(&self) -> &[Var] {
        &self.order
    }

    /// Level of each variable, indexed by variable.
    pub fn inv_order(&self) -> &[Level] {
        &self.inv_order
    }

    pub fn var_at(&self, level: Level) -> Var {
        self.order[level.index()]
    }

    pub fn level_of(&self, var: Var) -> Level {
        self.inv_order[var.index()]
    }

    pub(crate) fn check_var(&self, var: Var) -> Result<()> {
        if var.index() < self.num_vars() {
            Ok(())
        } else {
            Err(EngineError::UnknownVariable {
                var,
                num_vars: self.num_vars(),
            })
        }
    }

    pub fn node(&self, id: NodeId) -> &Node {
        &self.storage[id]
    }

    /// Variable decided at the top of `e`, `None` for terminal edges.
    pub fn top_var(&self, e: Edge) -> Option<Var> {
        if e.is_terminal() {
            None
        } else {
            self.storage[e.node].var
        }
    }

    /// Level of the top node of `e`, `None` for terminal edges.
    pub fn top_level(&self, e: Edge) -> Option<Level> {
        self.top_var(e).map(|v| self.level_of(v))
    }

    /// Number of levels `e` spans: its top level plus one, zero for terminals.
    pub(crate) fn depth(&self, e: Edge) -> usize {
        self.top_level(e).map_or(0, |l| l.index() + 1)
    }

    /// Number of nodes currently held in storage, terminal included.
    pub fn num_nodes(&self) -> usize {
        self.storage.real_size()
    }

    /// Number of nodes with a nonzero reference count.
    pub fn active_count(&self) -> usize {
        self.active_count
    }

    pub fn active_per_var(&self) -> &[usize] {
        &self.active
    }

    pub fn gc_limit(&self) -> usize {
        self.gc_limit
    }

    pub fn stats(&self) -> EngineStats {
        EngineStats {
            num_vars: self.num_vars(),
            stored_nodes: self.storage.real_size(),
            active_nodes: self.active_count,
            active_per_var: self.active.clone(),
            block_nodes: self.block_count,
            scalars: self.scalars.len(),
            gc_runs: self.gc_runs,
            gc_limit: self.gc_limit,
            compute: self.compute.stats(),
            arithmetic: self.scalars.cache_stats(),
        }
    }
}

// Construction
impl Engine {
    /// The terminal with weight one (the 1×1 matrix `[1]`).
    pub fn terminal(&self) -> Edge {
        Edge::ONE
    }

    /// The zero matrix.
    pub fn zero(&self) -> Edge {
        Edge::ZERO
    }

    pub fn make_terminal(&self, weight: Scalar) -> Edge {
        Edge::terminal(weight)
    }

    /// Returns `e` scaled by `w`.
    pub fn scale(&mut self, e: Edge, w: Scalar) -> Result<Edge> {
        if w.is_one() {
            return Ok(e);
        }
        let w = self.scalars.mul(e.weight, w)?;
        Ok(e.with_weight(w))
    }

    /// NormC: divides all weights by the one of largest magnitude.
    ///
    /// Returns the extracted weight and the normalized edges; an all-zero
    /// input gives a zero weight.
    pub(crate) fn normalize(&mut self, mut edges: Edges) -> Result<(Scalar, Edges)> {
        let mut best: Option<usize> = None;
        for i in 0..NEDGE {
            if edges[i].weight.is_zero() {
                edges[i] = Edge::ZERO;
                continue;
            }
            best = match best {
                Some(b) if !self.scalars.magnitude_gt(edges[i].weight, edges[b].weight) => Some(b),
                _ => Some(i),
            };
        }
        let Some(b) = best else {
            return Ok((Scalar::ZERO, edges));
        };
        let w = edges[b].weight;
        if !w.is_one() {
            for (i, e) in edges.iter_mut().enumerate() {
                if i == b {
                    e.weight = Scalar::ONE;
                } else if !e.is_zero() {
                    let q = self.scalars.div(e.weight, w)?;
                    *e = e.with_weight(q);
                }
            }
        }
        Ok((w, edges))
    }

    /// Creates (or finds) the node deciding `var` with the given edges.
    ///
    /// # Errors
    ///
    /// [`EngineError::TableOverflow`] when node storage or the scalar table is exhausted.
    pub fn make_nonterminal(&mut self, var: Var, edges: Edges) -> Result<Edge> {
        debug!(
            "make_nonterminal(var = {}, edges = [{}, {}, {}, {}])",
            var, edges[0], edges[1], edges[2], edges[3]
        );
        self.check_var(var)?;

        if edges.iter().all(|e| *e == edges[0]) {
            debug!("make_nonterminal: redundant");
            return Ok(edges[0]);
        }

        let (w, edges) = self.normalize(edges)?;
        if w.is_zero() {
            return Ok(Edge::ZERO);
        }
        if edges.iter().all(|e| *e == edges[0]) {
            debug!("make_nonterminal: redundant after normalization");
            return self.scale(edges[0], w);
        }

        let id = match self.subtables[var.index()].find(&edges, &self.storage) {
            Some(id) => {
                debug!("make_nonterminal: found {}", id);
                if self.flag_mode == FlagMode::Compute {
                    self.ensure_flags(id)?;
                    debug_assert!(
                        !self.storage[id].flags.ident || self.check_ident(id),
                        "Node {} is flagged identity but is not",
                        id
                    );
                }
                id
            }
            None => {
                let state = match self.flag_mode {
                    FlagMode::Compute => FlagState::NeedsRecompute,
                    FlagMode::Suspend => FlagState::Suspended,
                };
                let id = self.storage.alloc(Node::new(var, edges, state))?;
                self.subtables[var.index()].insert(id, &mut self.storage);
                debug!("make_nonterminal: created {}", id);
                if self.flag_mode == FlagMode::Compute {
                    self.ensure_flags(id)?;
                }
                id
            }
        };

        Ok(Edge::new(id, w))
    }
}

// Reference counting and garbage collection
impl Engine {
    /// Pins `e` (and, on the first reference, everything below it).
    pub fn incref(&mut self, e: Edge) {
        if e.is_terminal() {
            return;
        }
        let node = &mut self.storage[e.node];
        if node.ref_count >= MAX_REF_COUNT {
            return;
        }
        node.ref_count += 1;
        if node.ref_count == 1 {
            let edges = node.edges;
            let block = node.flags.block;
            let var = node.var;
            for child in edges {
                self.incref(child);
            }
            if let Some(v) = var {
                self.active[v.index()] += 1;
            }
            self.active_count += 1;
            if block {
                self.block_count += 1;
            }
        }
    }

    /// Releases a reference taken by [`Engine::incref`].
    ///
    /// # Panics
    ///
    /// If the node is not referenced.
    pub fn decref(&mut self, e: Edge) {
        if e.is_terminal() {
            return;
        }
        let node = &mut self.storage[e.node];
        if node.ref_count >= MAX_REF_COUNT {
            return;
        }
        assert!(node.ref_count > 0, "Reference count of {} would drop below zero", e.node);
        node.ref_count -= 1;
        if node.ref_count == 0 {
            let edges = node.edges;
            let block = node.flags.block;
            let var = node.var;
            for child in edges {
                self.decref(child);
            }
            if let Some(v) = var {
                self.active[v.index()] -= 1;
            }
            self.active_count -= 1;
            if block {
                self.block_count -= 1;
            }
        }
    }

    pub fn ref_count(&self, e: Edge) -> u32 {
        if e.is_terminal() {
            MAX_REF_COUNT
        } else {
            self.storage[e.node].ref_count
        }
    }

    /// Collects garbage if the number of stored nodes reached the GC limit.
    ///
    /// Returns the number of reclaimed nodes.
    pub fn collect(&mut self) -> usize {
        if self.storage.real_size() < self.gc_limit {
            return 0;
        }
        let freed = self.collect_now();
        self.gc_limit += self.config.gc_limit_increment;
        debug!("collect: GC limit raised to {}", self.gc_limit);
        freed
    }

    /// Reclaims every unreferenced node, regardless of the GC limit.
    pub fn collect_now(&mut self) -> usize {
        let before = self.storage.real_size();
        let (freed, _) = self.reclaim_dead();
        self.compute.clear();
        self.scalars.clear_caches();
        self.gc_runs += 1;
        info!(
            "Garbage collection #{}: reclaimed {} of {} nodes",
            self.gc_runs, freed, before
        );
        freed
    }

    /// Unlinks and frees all dead nodes.
    ///
    /// Returns the number of freed nodes and how many of them carried a
    /// pending renormalization factor.
    pub(crate) fn reclaim_dead(&mut self) -> (usize, usize) {
        let mut freed = 0;
        let mut factored = 0;
        for v in 0..self.num_vars() {
            for id in self.subtables[v].remove_dead(&mut self.storage) {
                if !self.storage[id].renorm_factor.is_one() {
                    factored += 1;
                }
                self.storage.free(id);
                freed += 1;
            }
        }
        (freed, factored)
    }

    /// Number of distinct nodes reachable from `e`, terminal included.
    pub fn node_count(&self, e: Edge) -> usize {
        let mut visited = HashSet::new();
        let mut stack = vec![e.node];
        while let Some(id) = stack.pop() {
            if !visited.insert(id) {
                continue;
            }
            if !id.is_terminal() {
                stack.extend(self.storage[id].edges.iter().map(|c| c.node));
            }
        }
        visited.len()
    }
}

#[cfg(test)]
mod tests {
    use std::f64::consts::FRAC_1_SQRT_2;

    use test_log::test;

    use super::*;
    use crate::node::diagonal;

    #[test]
    fn test_redundant_node_collapses() {
        let mut engine = Engine::new(2);
        let e = Edge::terminal(Scalar::I);
        let r = engine.make_nonterminal(Var::new(0), [e; 4]).unwrap();
        assert_eq!(r, e);
        assert_eq!(engine.num_nodes(), 1);
    }

    #[test]
    fn test_all_zero_gives_zero() {
        let mut engine = Engine::new(1);
        let r = engine.make_nonterminal(Var::new(0), [Edge::ZERO; 4]).unwrap();
        assert_eq!(r, Edge::ZERO);
    }

    #[test]
    fn test_normalization_extracts_largest() {
        let mut engine = Engine::new(1);
        let h = engine.scalars.intern(FRAC_1_SQRT_2, 0.0).unwrap();
        let mh = h.negate();
        let t = |w| Edge::terminal(w);

        // Hadamard: leftmost of equal magnitudes wins.
        let r = engine.make_nonterminal(Var::new(0), [t(h), t(h), t(h), t(mh)]).unwrap();
        assert_eq!(r.weight, h);
        let node = engine.node(r.node);
        assert_eq!(node.edges[0], Edge::ONE);
        assert_eq!(node.edges[3], Edge::terminal(Scalar::MINUS_ONE));

        // Larger magnitude in a later position wins.
        let two = engine.scalars.intern(2.0, 0.0).unwrap();
        let r = engine
            .make_nonterminal(Var::new(0), [t(Scalar::ONE), Edge::ZERO, Edge::ZERO, t(two)])
            .unwrap();
        assert_eq!(r.weight, two);
        let half = engine.scalars.intern(0.5, 0.0).unwrap();
        assert_eq!(engine.node(r.node).edges, [t(half), Edge::ZERO, Edge::ZERO, Edge::ONE]);
    }

    #[test]
    fn test_hash_consing() {
        let mut engine = Engine::new(2);
        let a = engine.make_nonterminal(Var::new(0), diagonal([Edge::ONE, Edge::ONE])).unwrap();
        let b = engine
            .make_nonterminal(Var::new(0), diagonal([Edge::terminal(Scalar::I), Edge::terminal(Scalar::I)]))
            .unwrap();
        assert_eq!(a.node, b.node);
        assert_eq!(b.weight, Scalar::I);
        assert_eq!(engine.num_nodes(), 2);
    }

    #[test]
    fn test_unknown_variable() {
        let mut engine = Engine::new(2);
        let err = engine.make_nonterminal(Var::new(5), diagonal([Edge::ONE, Edge::ONE])).unwrap_err();
        assert_eq!(err, EngineError::UnknownVariable { var: Var::new(5), num_vars: 2 });
    }

    #[test]
    fn test_refcount_and_collect() {
        let mut engine = Engine::new(2);
        let low = engine.make_nonterminal(Var::new(0), diagonal([Edge::ONE, Edge::ZERO])).unwrap();
        let top = engine.make_nonterminal(Var::new(1), diagonal([low, low.with_weight(Scalar::MINUS_ONE)])).unwrap();
        // Unreferenced node for the collector.
        engine.make_nonterminal(Var::new(0), diagonal([Edge::ZERO, Edge::ONE])).unwrap();
        assert_eq!(engine.num_nodes(), 4);

        engine.incref(top);
        assert_eq!(engine.ref_count(top), 1);
        // Both diagonal edges of `top` point to `low`.
        assert_eq!(engine.ref_count(low), 2);
        assert_eq!(engine.active_count(), 2);
        assert_eq!(engine.active_per_var(), &[1, 1]);

        assert_eq!(engine.collect_now(), 1);
        assert_eq!(engine.num_nodes(), 3);

        engine.decref(top);
        assert_eq!(engine.active_count(), 0);
        assert_eq!(engine.collect_now(), 2);
        assert_eq!(engine.num_nodes(), 1);
    }

    #[test]
    fn test_collect_clears_memos() {
        let mut engine = Engine::new(1);
        let h = engine.scalars.intern(FRAC_1_SQRT_2, 0.0).unwrap();
        let t = |w| Edge::terminal(w);
        let e = engine.make_nonterminal(Var::new(0), [t(h), t(h), t(h), t(h.negate())]).unwrap();
        engine.scale(e, h).unwrap();
        assert!(engine.stats().arithmetic.iter().any(|(_, s)| s.entries > 0));

        engine.collect_now();
        let stats = engine.stats();
        assert!(stats.arithmetic.iter().all(|(_, s)| s.entries == 0));
        assert!(stats.compute.iter().all(|(_, s)| s.entries == 0));
    }

    #[test]
    fn test_collect_respects_limit() {
        let mut engine = Engine::with_config(EngineConfig {
            num_vars: 1,
            gc_limit: 3,
            gc_limit_increment: 5,
            ..Default::default()
        });
        engine.make_nonterminal(Var::new(0), diagonal([Edge::ONE, Edge::ZERO])).unwrap();
        assert_eq!(engine.collect(), 0);
        assert_eq!(engine.gc_limit(), 3);

        engine.make_nonterminal(Var::new(0), diagonal([Edge::ZERO, Edge::ONE])).unwrap();
        assert_eq!(engine.collect(), 2);
        assert_eq!(engine.gc_limit(), 8);
    }

    #[test]
    #[should_panic(expected = "below zero")]
    fn test_decref_unreferenced_panics() {
        let mut engine = Engine::new(1);
        let e = engine.make_nonterminal(Var::new(0), diagonal([Edge::ONE, Edge::ZERO])).unwrap();
        engine.decref(e);
    }

    #[test]
    fn test_node_count() {
        let mut engine = Engine::new(2);
        let low = engine.make_nonterminal(Var::new(0), diagonal([Edge::ONE, Edge::ZERO])).unwrap();
        let top = engine.make_nonterminal(Var::new(1), [low, Edge::ZERO, Edge::ZERO, Edge::ONE]).unwrap();
        assert_eq!(engine.node_count(Edge::ONE), 1);
        assert_eq!(engine.node_count(low), 2);
        assert_eq!(engine.node_count(top), 3);
    }
}
