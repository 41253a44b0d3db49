//! Special-matrix flags.
//!
//! Every node caches whether the matrix it represents (ignoring the incoming
//! weight) is an identity, diagonal, block-diagonal, symmetric, or has only
//! `0`/`1` entries. The multiplier uses these to shortcut identities and to
//! decide whether a product commutes.
//!
//! While variables are being reordered the flags would go stale after every
//! swap, so they are suspended: nodes built then only carry the local `block`
//! flag. Afterwards [`Engine::markup_special_flags`] and
//! [`Engine::restore_special_flags`] bring everything reachable back up to date.

use crate::engine::Engine;
use crate::error::Result;
use crate::node::{is_block, Edge, FlagState, NodeId, SpecialFlags};
use crate::scalar::Scalar;
use crate::types::RADIX;

impl Engine {
    /// Flags of a node as currently known.
    ///
    /// Nodes whose flags are not valid answer `false` to everything except `block`.
    pub(crate) fn flags(&self, id: NodeId) -> SpecialFlags {
        let node = &self.storage[id];
        match node.flag_state {
            FlagState::Valid => node.flags,
            _ => SpecialFlags {
                block: node.flags.block,
                ..SpecialFlags::NONE
            },
        }
    }

    /// Flags of the matrix below `e`.
    pub fn special_flags(&self, e: Edge) -> SpecialFlags {
        if e.is_terminal() {
            SpecialFlags::TERMINAL
        } else {
            self.flags(e.node)
        }
    }

    pub fn is_identity(&self, e: Edge) -> bool {
        e.weight.is_one() && self.special_flags(e).ident
    }

    pub fn is_diagonal(&self, e: Edge) -> bool {
        e.is_zero() || self.special_flags(e).diag
    }

    pub fn is_symmetric(&self, e: Edge) -> bool {
        e.is_zero() || self.special_flags(e).symm
    }

    /// Recomputes the flags of `id` (and of descendants that need it).
    pub(crate) fn ensure_flags(&mut self, id: NodeId) -> Result<()> {
        if id.is_terminal() || self.storage[id].flag_state == FlagState::Valid {
            return Ok(());
        }
        let edges = self.storage[id].edges;
        for child in edges {
            self.ensure_flags(child.node)?;
        }
        let flags = self.compute_flags(id)?;
        let node = &mut self.storage[id];
        node.flags = flags;
        node.flag_state = FlagState::Valid;
        Ok(())
    }

    /// Children's flags must be valid.
    fn compute_flags(&mut self, id: NodeId) -> Result<SpecialFlags> {
        let node = self.storage[id];
        let edges = node.edges;
        let level = node.var.map(|v| self.level_of(v));
        let below = level.and_then(|l| l.down()).map(|l| self.var_at(l));

        let block = is_block(&edges);

        let c01 = edges
            .iter()
            .all(|e| e.is_zero() || (e.weight.is_one() && self.special_flags(*e).c01));

        // Diagonal blocks must continue exactly one level down.
        let diag = block
            && (0..RADIX).all(|i| {
                let e = edges[i * RADIX + i];
                if e.is_zero() {
                    true
                } else if e.is_terminal() {
                    below.is_none()
                } else {
                    self.storage[e.node].var == below && self.flags(e.node).diag
                }
            });

        let ident = diag
            && (0..RADIX).all(|i| {
                let e = edges[i * RADIX + i];
                e.weight.is_one() && self.special_flags(e).ident
            });

        let mut symm = (0..RADIX).all(|i| self.is_symmetric(edges[i * RADIX + i]));
        if symm {
            'outer: for i in 0..RADIX {
                for j in (i + 1)..RADIX {
                    let t = self.transpose(edges[i * RADIX + j])?;
                    if t != edges[j * RADIX + i] {
                        symm = false;
                        break 'outer;
                    }
                }
            }
        }

        Ok(SpecialFlags {
            ident,
            diag,
            block,
            symm,
            c01,
        })
    }

    /// Side-effect free structural check of an identity node, one level deep.
    pub(crate) fn check_ident(&self, id: NodeId) -> bool {
        let node = &self.storage[id];
        let Some(var) = node.var else {
            return true;
        };
        let below = self.level_of(var).down().map(|l| self.var_at(l));
        (0..RADIX).all(|i| {
            (0..RADIX).all(|j| {
                let e = node.edges[i * RADIX + j];
                if i != j {
                    return e.is_zero();
                }
                if e.weight != Scalar::ONE {
                    return false;
                }
                if e.is_terminal() {
                    below.is_none()
                } else {
                    let child = &self.storage[e.node];
                    child.var == below && child.flag_state == FlagState::Valid && child.flags.ident
                }
            })
        })
    }

    /// Marks every node reachable from `root` for flag recomputation.
    pub fn markup_special_flags(&mut self, root: Edge) {
        let mut stack = vec![root.node];
        while let Some(id) = stack.pop() {
            if id.is_terminal() {
                continue;
            }
            let node = &mut self.storage[id];
            if node.flag_state == FlagState::NeedsRecompute {
                continue;
            }
            node.flag_state = FlagState::NeedsRecompute;
            stack.extend(node.edges.iter().map(|e| e.node));
        }
    }

    /// Recomputes the flags of every node reachable from `root`, bottom-up.
    pub fn restore_special_flags(&mut self, root: Edge) -> Result<()> {
        self.ensure_flags(root.node)
    }
}
