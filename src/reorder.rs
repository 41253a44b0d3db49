//! Variable reordering for QMDDs.
//!
//! # Why Ordering Matters
//!
//! As for any decision diagram, the size of a QMDD depends heavily on the order
//! of its variables. Circuits whose gates couple distant qubits (long-range
//! controls) typically produce much larger diagrams than the same circuit with
//! the coupled qubits placed next to each other.
//!
//! # Adjacent Swap
//!
//! Every reordering is a sequence of swaps of two adjacent levels. Swapping
//! the upper variable `v₁` with the lower `v₂` rewrites each node at `v₁` that
//! depends on `v₂` *in place*, so its parents never notice:
//!
//! ```text
//!        v₁                        v₂
//!     ┌──┼──┬──┐               ┌──┼──┬──┐
//!     v₂ v₂ v₂ v₂     ==>      v₁ v₁ v₁ v₁
//!    (4×4 grandchildren)      (transposed 4×4 table)
//! ```
//!
//! The rewritten node has to be normalized again, which may pull a weight out
//! of it. Since parent edges cannot be updated in place, that weight is parked
//! in the node's *renormalization factor*, and such nodes are invisible to
//! unique-table lookups. After all swaps the **flush** rebuilds every root
//! bottom-up, multiplying each factor into the incoming edge exactly once.
//!
//! Special-matrix flags are suspended for the whole pass and recomputed for
//! everything reachable from the roots at the end.
//!
//! # Sifting
//!
//! Rudell's sifting moves each variable (most populated first) to the bottom,
//! then to the top, and finally back to the position with the fewest live
//! nodes. The cost function is the number of active nodes.
//! [`Engine::sift_range`] restricts this to a window of levels.
//!
//! [`Engine::reorder_to`] moves to a given order instead, and
//! [`Engine::reorder_exhaustive`] walks through every order of the bottom
//! levels and keeps the smallest.
//!
//! All entry points require the roots to cover every referenced node.
//!
//! # References
//!
//! - R. Rudell. "Dynamic variable ordering for ordered binary decision diagrams."
//!   ICCAD 1993.
//! - D. M. Miller, M. A. Thornton. "QMDD: A Decision Diagram Structure for
//!   Reversible and Quantum Circuits." ISMVL 2006.

use std::collections::HashSet;

use log::{debug, info, trace, warn};

use crate::compute::{ComputeKey, OpKind};
use crate::engine::{Engine, FlagMode};
use crate::error::{EngineError, Result};
use crate::node::{is_block, Edge, Edges, FlagState, NodeId, SpecialFlags};
use crate::scalar::Scalar;
use crate::types::{Level, Var, NEDGE};

/// Mutable state of one reordering pass.
#[derive(Debug, Clone, Default)]
pub struct ReorderContext {
    /// Whether special-matrix flags are suspended.
    pub flags_suspended: bool,
    /// Number of times a node's renormalization factor changed.
    pub factor_changes: usize,
    /// Number of nodes currently carrying a factor other than one.
    pub pending_factors: usize,
    /// Log every sifted variable at `info` level.
    pub verbose: bool,
    pub swaps: usize,
}

impl ReorderContext {
    pub fn new(verbose: bool) -> Self {
        Self {
            verbose,
            ..Default::default()
        }
    }
}

/// Statistics collected during reordering.
#[derive(Debug, Clone, Default)]
pub struct ReorderStats {
    /// Number of adjacent swaps performed
    pub swaps: usize,
    /// Active nodes before reordering
    pub initial_size: usize,
    /// Active nodes after reordering
    pub final_size: usize,
    /// Smallest size seen during reordering
    pub best_size: usize,
    /// Largest size seen during reordering
    pub largest_size: usize,
    /// Number of variables sifted
    pub variables_processed: usize,
    /// Number of renormalization factor changes
    pub factor_changes: usize,
}

impl ReorderStats {
    /// Calculate the size reduction ratio.
    pub fn reduction_ratio(&self) -> f64 {
        if self.initial_size == 0 {
            return 0.0;
        }
        1.0 - (self.final_size as f64 / self.initial_size as f64)
    }

    /// Calculate the percentage reduction.
    pub fn reduction_percent(&self) -> f64 {
        self.reduction_ratio() * 100.0
    }
}

impl Engine {
    /// Sifts the bottom `num_variables` levels to shrink the diagrams in `roots`.
    ///
    /// The handles are replaced in place, and all unreferenced nodes are
    /// reclaimed.
    ///
    /// # Errors
    ///
    /// [`EngineError::UnrootedReferences`] if some referenced node is not
    /// reachable from `roots` (or a root is not referenced). Nothing is
    /// reordered in that case.
    pub fn sift(&mut self, roots: &mut [Edge], num_variables: usize) -> Result<ReorderStats> {
        let mut ctx = ReorderContext::default();
        self.sift_with(&mut ctx, roots, num_variables)
    }

    pub fn sift_with(
        &mut self,
        ctx: &mut ReorderContext,
        roots: &mut [Edge],
        num_variables: usize,
    ) -> Result<ReorderStats> {
        let n = num_variables.min(self.num_vars());
        self.sift_levels(ctx, roots, 0, n)
    }

    /// Sifts only the variables at levels `lower..upper`, keeping each of them
    /// inside that window. Variables outside the window do not move.
    pub fn sift_range(&mut self, roots: &mut [Edge], lower: Level, upper: Level) -> Result<ReorderStats> {
        assert!(
            lower <= upper && upper.index() <= self.num_vars(),
            "Invalid sifting window {}..{}",
            lower,
            upper
        );
        let mut ctx = ReorderContext::default();
        self.sift_levels(&mut ctx, roots, lower.index(), upper.index())
    }

    fn sift_levels(
        &mut self,
        ctx: &mut ReorderContext,
        roots: &mut [Edge],
        lo: usize,
        hi: usize,
    ) -> Result<ReorderStats> {
        self.begin_reorder(ctx, roots)?;

        let initial_size = self.active_count;
        info!("Starting sifting of levels {}..{} with initial size {}", lo, hi, initial_size);
        let swaps_before = ctx.swaps;
        let factors_before = ctx.factor_changes;
        let mut stats = ReorderStats {
            initial_size,
            best_size: initial_size,
            largest_size: initial_size,
            ..Default::default()
        };

        let mut tried = vec![false; self.num_vars()];
        for _ in lo..hi {
            // Most populated untried variable; ties go to the lowest level.
            let mut pick: Option<(Var, usize)> = None;
            for l in lo..hi {
                let v = self.order[l];
                if tried[v.index()] {
                    continue;
                }
                let a = self.active[v.index()];
                if pick.map_or(true, |(_, best)| a > best) {
                    pick = Some((v, a));
                }
            }
            let Some((var, _)) = pick else {
                break;
            };
            tried[var.index()] = true;
            stats.variables_processed += 1;

            let start = self.level_of(var).index();
            let mut min = self.active_count;
            let mut best = start;

            for j in (lo + 1..=start).rev() {
                self.swap(ctx, j)?;
                stats.largest_size = stats.largest_size.max(self.active_count);
                if self.active_count < min {
                    min = self.active_count;
                    best = j - 1;
                }
            }
            for j in lo + 1..hi {
                self.swap(ctx, j)?;
                stats.largest_size = stats.largest_size.max(self.active_count);
                if self.active_count <= min {
                    min = self.active_count;
                    best = j;
                }
            }
            for j in (best + 1..hi).rev() {
                self.swap(ctx, j)?;
            }
            stats.best_size = stats.best_size.min(min);

            if ctx.verbose {
                info!("Sifted {} from level {} to level {} (size {})", var, start, best, self.active_count);
            } else {
                debug!("Sifted {} from level {} to level {} (size {})", var, start, best, self.active_count);
            }
        }

        self.end_reorder(ctx, roots)?;

        stats.final_size = self.active_count;
        stats.swaps = ctx.swaps - swaps_before;
        stats.factor_changes = ctx.factor_changes - factors_before;
        info!(
            "Sifting complete: size {} -> {} ({:.1}% reduction), {} swaps, {} variables",
            stats.initial_size,
            stats.final_size,
            stats.reduction_percent(),
            stats.swaps,
            stats.variables_processed
        );
        Ok(stats)
    }

    /// Tries every order of the bottom `num_variables` levels and settles on
    /// the one with the fewest active nodes.
    ///
    /// Orders are visited by the Steinhaus-Johnson-Trotter sequence, so each
    /// step is a single adjacent swap; still, `n!` of them.
    pub fn reorder_exhaustive(&mut self, roots: &mut [Edge], num_variables: usize) -> Result<ReorderStats> {
        let n = num_variables.min(self.num_vars());
        let mut ctx = ReorderContext::default();
        self.begin_reorder(&mut ctx, roots)?;

        let initial_size = self.active_count;
        info!("Starting exhaustive reordering of {} variables with initial size {}", n, initial_size);
        let mut stats = ReorderStats {
            initial_size,
            best_size: initial_size,
            largest_size: initial_size,
            variables_processed: n,
            ..Default::default()
        };

        let mut best_order = self.order.clone();
        for i in adjacent_transpositions(n) {
            self.swap(&mut ctx, i + 1)?;
            stats.largest_size = stats.largest_size.max(self.active_count);
            if self.active_count < stats.best_size {
                stats.best_size = self.active_count;
                best_order.copy_from_slice(&self.order);
                debug!("reorder_exhaustive: new best size {} at {:?}", stats.best_size, best_order);
            }
        }
        self.apply_order(&mut ctx, &best_order)?;
        self.end_reorder(&mut ctx, roots)?;

        stats.final_size = self.active_count;
        stats.swaps = ctx.swaps;
        stats.factor_changes = ctx.factor_changes;
        info!(
            "Exhaustive reordering complete: size {} -> {}, {} swaps",
            stats.initial_size, stats.final_size, stats.swaps
        );
        Ok(stats)
    }

    /// Reorders the variables to `order` (bottom level first, `order[level] = var`).
    ///
    /// Returns the number of adjacent swaps performed.
    ///
    /// # Errors
    ///
    /// [`EngineError::InvalidOrder`] unless `order` is a permutation of all
    /// variables, and [`EngineError::UnrootedReferences`] as for [`Engine::sift`].
    pub fn reorder_to(&mut self, roots: &mut [Edge], order: &[Var]) -> Result<usize> {
        if order.len() != self.num_vars() {
            return Err(EngineError::InvalidOrder(format!(
                "expected {} variables, got {}",
                self.num_vars(),
                order.len()
            )));
        }
        let mut seen = vec![false; self.num_vars()];
        for &v in order {
            self.check_var(v)?;
            if std::mem::replace(&mut seen[v.index()], true) {
                return Err(EngineError::InvalidOrder(format!("{} appears twice", v)));
            }
        }

        let mut ctx = ReorderContext::default();
        self.begin_reorder(&mut ctx, roots)?;
        self.apply_order(&mut ctx, order)?;
        self.end_reorder(&mut ctx, roots)?;
        debug!("reorder_to: {} swaps", ctx.swaps);
        Ok(ctx.swaps)
    }

    /// Swaps the variables at `level` and `level - 1`, then flushes `roots`.
    pub fn swap_adjacent(&mut self, roots: &mut [Edge], level: Level) -> Result<()> {
        assert!(
            level.index() >= 1 && level.index() < self.num_vars(),
            "Cannot swap level {} with the level below",
            level
        );
        let mut ctx = ReorderContext::default();
        self.begin_reorder(&mut ctx, roots)?;
        self.swap(&mut ctx, level.index())?;
        self.end_reorder(&mut ctx, roots)
    }

    /// Moves `var` to `level` by adjacent swaps. Returns the number of swaps.
    pub fn move_variable_to_level(&mut self, roots: &mut [Edge], var: Var, level: Level) -> Result<usize> {
        self.check_var(var)?;
        assert!(level.index() < self.num_vars(), "Level {} out of range", level);

        let mut ctx = ReorderContext::default();
        self.begin_reorder(&mut ctx, roots)?;
        let mut current = self.level_of(var).index();
        while current > level.index() {
            self.swap(&mut ctx, current)?;
            current -= 1;
        }
        while current < level.index() {
            self.swap(&mut ctx, current + 1)?;
            current += 1;
        }
        self.end_reorder(&mut ctx, roots)?;
        Ok(ctx.swaps)
    }

    /// Brings the bottom `target.len()` levels into `target` order by pulling
    /// each variable down to its level.
    fn apply_order(&mut self, ctx: &mut ReorderContext, target: &[Var]) -> Result<()> {
        for (i, &v) in target.iter().enumerate() {
            let mut j = self.level_of(v).index();
            debug_assert!(j >= i, "{} already placed below level {}", v, i);
            while j > i {
                self.swap(ctx, j)?;
                j -= 1;
            }
        }
        Ok(())
    }

    /// Checks that the roots account for every referenced node.
    fn check_roots(&self, roots: &[Edge]) -> Result<()> {
        let mut visited = HashSet::new();
        let mut stack: Vec<NodeId> = roots.iter().map(|e| e.node).collect();
        let mut unreferenced = false;
        while let Some(id) = stack.pop() {
            if id.is_terminal() || !visited.insert(id) {
                continue;
            }
            let node = &self.storage[id];
            unreferenced |= node.ref_count == 0;
            stack.extend(node.edges.iter().map(|e| e.node));
        }
        if unreferenced || visited.len() != self.active_count {
            return Err(EngineError::UnrootedReferences {
                reachable: visited.iter().filter(|&&id| self.storage[id].ref_count > 0).count(),
                active: self.active_count,
            });
        }
        Ok(())
    }

    fn begin_reorder(&mut self, ctx: &mut ReorderContext, roots: &[Edge]) -> Result<()> {
        // Identities are rebuilt on demand.
        self.clear_identities();
        self.check_roots(roots)?;
        self.compute.clear();
        self.flag_mode = FlagMode::Suspend;
        ctx.flags_suspended = true;
        Ok(())
    }

    fn end_reorder(&mut self, ctx: &mut ReorderContext, roots: &mut [Edge]) -> Result<()> {
        self.flush(ctx, roots)?;

        let (freed, factored) = self.reclaim_dead();
        ctx.pending_factors -= factored;
        debug!("end_reorder: reclaimed {} dead nodes", freed);
        assert_eq!(
            ctx.pending_factors, 0,
            "Renormalization factors left on referenced nodes that are not roots"
        );

        self.flag_mode = FlagMode::Compute;
        ctx.flags_suspended = false;
        for &root in roots.iter() {
            self.markup_special_flags(root);
        }
        for &root in roots.iter() {
            self.restore_special_flags(root)?;
        }
        self.compute.clear();
        Ok(())
    }

    /// Swaps the variables at levels `i` and `i - 1`.
    fn swap(&mut self, ctx: &mut ReorderContext, i: usize) -> Result<()> {
        let v1 = self.order[i];
        let v2 = self.order[i - 1];
        self.order.swap(i, i - 1);
        self.inv_order[v1.index()] = Level::new(i - 1);
        self.inv_order[v2.index()] = Level::new(i);

        let ids = self.subtables[v1.index()].drain(&mut self.storage);
        let mut dependent = Vec::new();
        for id in ids {
            let node = self.storage[id];
            if node.ref_count == 0 {
                if !node.renorm_factor.is_one() {
                    ctx.pending_factors -= 1;
                }
                self.storage.free(id);
            } else if node.edges.iter().any(|&e| self.top_var(e) == Some(v2)) {
                dependent.push(id);
            } else {
                self.subtables[v1.index()].insert(id, &mut self.storage);
            }
        }

        for &id in &dependent {
            self.swap_node(ctx, id, v1, v2)?;
        }

        ctx.swaps += 1;
        trace!(
            "swap(level = {}): {} <-> {}, {} nodes rewritten, {} active",
            i,
            v1,
            v2,
            dependent.len(),
            self.active_count
        );
        Ok(())
    }

    /// Rewrites node `p` at `v1` (which depends on `v2`) into a node at `v2`.
    fn swap_node(&mut self, ctx: &mut ReorderContext, p: NodeId, v1: Var, v2: Var) -> Result<()> {
        let node = self.storage[p];

        // table[i][j]: block i of `p`, then block j of the child.
        let mut table = [[Edge::ZERO; NEDGE]; NEDGE];
        for (i, &child) in node.edges.iter().enumerate() {
            if self.top_var(child) == Some(v2) {
                let c = self.storage[child.node];
                let f = self.scalars.mul(child.weight, c.renorm_factor)?;
                for j in 0..NEDGE {
                    table[i][j] = self.scale(c.edges[j], f)?;
                }
            } else {
                table[i] = [child; NEDGE];
            }
        }

        let mut edges = [Edge::ZERO; NEDGE];
        for j in 0..NEDGE {
            let column = [table[0][j], table[1][j], table[2][j], table[3][j]];
            edges[j] = self.make_nonterminal(v1, column)?;
            self.incref(edges[j]);
        }
        for child in node.edges {
            self.decref(child);
        }

        self.change_nonterminal(ctx, p, v2, edges)
    }

    /// Replaces the edges of a published node, keeping its identity.
    ///
    /// Any weight normalization pulls out is multiplied into the node's
    /// renormalization factor.
    fn change_nonterminal(&mut self, ctx: &mut ReorderContext, p: NodeId, var: Var, edges: Edges) -> Result<()> {
        assert!(
            !edges.iter().all(|e| *e == edges[0]),
            "Swap produced a redundant node at {}",
            p
        );
        let (w, normalized) = self.normalize(edges)?;
        assert!(!w.is_zero(), "Swap produced a zero node at {}", p);
        for j in 0..NEDGE {
            if normalized[j].node != edges[j].node {
                self.incref(normalized[j]);
                self.decref(edges[j]);
            }
        }

        let old = self.storage[p];
        let block = is_block(&normalized);
        {
            let node = &mut self.storage[p];
            node.var = Some(var);
            node.edges = normalized;
            node.flags = SpecialFlags::local(&normalized);
            node.flag_state = FlagState::Suspended;
        }

        if !w.is_one() {
            ctx.factor_changes += 1;
            let factor = self.scalars.mul(old.renorm_factor, w)?;
            if old.renorm_factor.is_one() {
                ctx.pending_factors += 1;
            }
            if factor.is_one() {
                ctx.pending_factors -= 1;
            }
            self.storage[p].renorm_factor = factor;
        }

        if old.ref_count > 0 {
            if let Some(v) = old.var {
                self.active[v.index()] -= 1;
            }
            self.active[var.index()] += 1;
            match (old.flags.block, block) {
                (true, false) => self.block_count -= 1,
                (false, true) => self.block_count += 1,
                _ => {}
            }
        }

        if self.storage[p].renorm_factor.is_one() {
            if let Some(dup) = self.subtables[var.index()].find(&normalized, &self.storage) {
                warn!("change_nonterminal: {} duplicates {} at {}", p, dup, var);
            }
        }
        self.subtables[var.index()].insert(p, &mut self.storage);
        Ok(())
    }

    /// Rebuilds every root canonically, folding renormalization factors into edges.
    fn flush(&mut self, ctx: &mut ReorderContext, roots: &mut [Edge]) -> Result<()> {
        self.compute.clear();
        let mut new_roots = Vec::with_capacity(roots.len());
        for &root in roots.iter() {
            new_roots.push(self.build_intermediate(ctx, root)?);
        }
        for &root in &new_roots {
            self.incref(root);
        }
        for &root in roots.iter() {
            self.decref(root);
        }
        for &root in &new_roots {
            self.reset_vertex_weights(ctx, root);
        }
        roots.copy_from_slice(&new_roots);
        self.compute.clear();
        debug!("flush: {} roots rebuilt, {} factors pending", roots.len(), ctx.pending_factors);
        Ok(())
    }

    fn build_intermediate(&mut self, ctx: &mut ReorderContext, e: Edge) -> Result<Edge> {
        if e.is_terminal() {
            return Ok(e);
        }
        let key = ComputeKey::unary(Edge::new(e.node, Scalar::ONE));
        if let Some(r) = self.compute.lookup(OpKind::Renormalize, key) {
            return self.scale(r, e.weight);
        }

        let node = self.storage[e.node];
        let Some(var) = node.var else {
            return Ok(e);
        };
        let mut edges = [Edge::ZERO; NEDGE];
        for i in 0..NEDGE {
            edges[i] = self.build_intermediate(ctx, node.edges[i])?;
        }

        let factor = node.renorm_factor;
        self.storage[e.node].renorm_factor = Scalar::ONE;
        let r = self.make_nonterminal(var, edges)?;
        if r.node == e.node {
            if !factor.is_one() {
                ctx.pending_factors -= 1;
            }
        } else {
            self.storage[e.node].renorm_factor = factor;
        }

        let r = self.scale(r, factor)?;
        self.compute.insert(OpKind::Renormalize, key, r);
        self.scale(r, e.weight)
    }

    /// Clears any factor left on nodes reachable from `root`.
    fn reset_vertex_weights(&mut self, ctx: &mut ReorderContext, root: Edge) {
        let mut visited = HashSet::new();
        let mut stack = vec![root.node];
        while let Some(id) = stack.pop() {
            if id.is_terminal() || !visited.insert(id) {
                continue;
            }
            let node = &mut self.storage[id];
            if !node.renorm_factor.is_one() {
                node.renorm_factor = Scalar::ONE;
                ctx.pending_factors -= 1;
            }
            stack.extend(node.edges.iter().map(|e| e.node));
        }
    }
}

/// Steinhaus-Johnson-Trotter: positions `i` such that swapping elements `i`
/// and `i + 1` in turn walks through all `n!` permutations of `n` elements.
fn adjacent_transpositions(n: usize) -> Vec<usize> {
    let mut perm: Vec<usize> = (0..n).collect();
    // true: moving towards higher positions.
    let mut right = vec![false; n];
    let mut steps = Vec::new();
    loop {
        let mut mobile: Option<usize> = None;
        for p in 0..n {
            let k = perm[p];
            let q = if right[k] { p + 1 } else { p.wrapping_sub(1) };
            if q < n && perm[q] < k && mobile.map_or(true, |m| k > perm[m]) {
                mobile = Some(p);
            }
        }
        let Some(p) = mobile else {
            break;
        };
        let k = perm[p];
        let q = if right[k] { p + 1 } else { p - 1 };
        perm.swap(p, q);
        steps.push(p.min(q));
        for r in right.iter_mut().skip(k + 1) {
            *r = !*r;
        }
    }
    steps
}
