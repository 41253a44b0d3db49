//! Debug utilities for inspecting QMDD structure.
//!
//! Dense matrix extraction, tree dumps and per-level statistics. These are
//! exponential in the number of variables and meant for tests and small
//! circuits only.

use std::collections::HashSet;
use std::fmt::{self, Write};

use num_complex::Complex64;

use crate::engine::Engine;
use crate::node::{Edge, NodeId, SpecialFlags};
use crate::scalar::Scalar;
use crate::types::{Level, Var, RADIX};

/// Compact rendering of a complex number: `1`, `-0.7071`, `0.5+0.5i`, `-i`.
fn fmt_complex(z: Complex64) -> String {
    let re = if z.re.abs() < 1e-12 { 0.0 } else { z.re };
    let im = if z.im.abs() < 1e-12 { 0.0 } else { z.im };
    match (re == 0.0, im == 0.0) {
        (true, true) => "0".to_string(),
        (false, true) => format!("{}", trim(re)),
        (true, false) => match im {
            x if x == 1.0 => "i".to_string(),
            x if x == -1.0 => "-i".to_string(),
            x => format!("{}i", trim(x)),
        },
        (false, false) => format!("{}{}{}i", trim(re), if im < 0.0 { "-" } else { "+" }, trim(im.abs())),
    }
}

fn trim(x: f64) -> String {
    let s = format!("{:.4}", x);
    let s = s.trim_end_matches('0').trim_end_matches('.');
    s.to_string()
}

/// Detailed information about a single QMDD node.
#[derive(Debug, Clone)]
pub struct NodeInfo {
    pub id: NodeId,
    /// Variable at this node (None for the terminal)
    pub variable: Option<Var>,
    /// Level of the variable in the current ordering (None for the terminal)
    pub level: Option<usize>,
    /// Outgoing edges as (decoded weight, target) in row-major block order
    pub edges: Vec<(Complex64, NodeId)>,
    pub ref_count: u32,
    /// Pending renormalization factor (one outside of reordering)
    pub renorm_factor: Complex64,
    pub flags: SpecialFlags,
}

impl fmt::Display for NodeInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let Some(var) = self.variable else {
            return write!(f, "{} TERMINAL", self.id);
        };
        write!(
            f,
            "{}(var={}, level={}, ref={}, edges=[",
            self.id,
            var,
            self.level.map_or("?".to_string(), |l| l.to_string()),
            self.ref_count,
        )?;
        for (i, (w, target)) in self.edges.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            if *w == Complex64::new(0.0, 0.0) {
                write!(f, "0")?;
            } else {
                write!(f, "{}·{}", fmt_complex(*w), target)?;
            }
        }
        write!(f, "]")?;
        if self.renorm_factor != Complex64::new(1.0, 0.0) {
            write!(f, " factor={}", fmt_complex(self.renorm_factor))?;
        }
        let flags: Vec<&str> = [
            (self.flags.ident, "ident"),
            (self.flags.diag, "diag"),
            (self.flags.block, "block"),
            (self.flags.symm, "symm"),
            (self.flags.c01, "c01"),
        ]
        .into_iter()
        .filter_map(|(on, name)| on.then_some(name))
        .collect();
        if !flags.is_empty() {
            write!(f, " {{{}}}", flags.join(","))?;
        }
        Ok(())
    }
}

/// A tree representation of a QMDD for debugging.
#[derive(Debug, Clone)]
pub struct QmddTree {
    pub root: Edge,
    /// Decoded weight of the root edge
    pub root_weight: Complex64,
    pub nodes: Vec<NodeInfo>,
}

impl fmt::Display for QmddTree {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "QMDD (root = {}·{}, size = {}):",
            fmt_complex(self.root_weight),
            self.root.node,
            self.nodes.len()
        )?;
        for node in &self.nodes {
            writeln!(f, "  {}", node)?;
        }
        Ok(())
    }
}

impl Engine {
    /// Dense matrix of `e` over the bottom `num_variables` levels.
    ///
    /// Row and column indices are built from variable bits: bit `v` of the
    /// index is the value of `x{v}`, independently of the current order.
    ///
    /// # Panics
    ///
    /// If `e` reaches above level `num_variables`, or a variable at one of
    /// those levels is not below `num_variables`.
    pub fn to_matrix(&self, e: Edge, num_variables: usize) -> Vec<Vec<Complex64>> {
        assert!(
            self.depth(e) <= num_variables,
            "Diagram spans {} levels, more than {}",
            self.depth(e),
            num_variables
        );
        for l in 0..num_variables {
            let v = self.var_at(Level::new(l));
            assert!(
                v.index() < num_variables,
                "Variable {} at level {} does not fit a {}-variable matrix",
                v,
                l,
                num_variables
            );
        }

        let dim = 1usize << num_variables;
        let mut out = vec![vec![Complex64::new(0.0, 0.0); dim]; dim];
        self.fill_matrix(e, num_variables, 0, 0, Complex64::new(1.0, 0.0), &mut out);
        out
    }

    fn fill_matrix(&self, e: Edge, levels: usize, row: usize, col: usize, w: Complex64, out: &mut [Vec<Complex64>]) {
        if e.is_zero() {
            return;
        }
        let w = w * self.scalars.value(e.weight);
        if levels == 0 {
            out[row][col] += w;
            return;
        }

        let level = Level::new(levels - 1);
        let bit = 1usize << self.var_at(level).index();
        if self.top_level(e) == Some(level) {
            let node = &self.storage[e.node];
            let w = w * self.scalars.value(node.renorm_factor);
            for i in 0..RADIX {
                for j in 0..RADIX {
                    self.fill_matrix(node.edges[i * RADIX + j], levels - 1, row | (i * bit), col | (j * bit), w, out);
                }
            }
        } else {
            // Skipped level: every block is the same submatrix.
            let below = Edge::new(e.node, Scalar::ONE);
            for i in 0..RADIX {
                for j in 0..RADIX {
                    self.fill_matrix(below, levels - 1, row | (i * bit), col | (j * bit), w, out);
                }
            }
        }
    }

    /// Get detailed information about a single node.
    pub fn node_info(&self, id: NodeId) -> NodeInfo {
        let node = &self.storage[id];
        NodeInfo {
            id,
            variable: node.var,
            level: node.var.map(|v| self.level_of(v).index()),
            edges: if node.is_terminal() {
                Vec::new()
            } else {
                node.edges
                    .iter()
                    .map(|e| (self.scalars.value(e.weight), e.node))
                    .collect()
            },
            ref_count: node.ref_count,
            renorm_factor: self.scalars.value(node.renorm_factor),
            flags: node.flags,
        }
    }

    /// Tree dump of every node reachable from `e`, top level first.
    pub fn print(&self, e: Edge) -> QmddTree {
        let mut nodes = Vec::new();
        let mut visited = HashSet::new();
        let mut stack = vec![e.node];
        while let Some(id) = stack.pop() {
            if !visited.insert(id) {
                continue;
            }
            let node = &self.storage[id];
            if !node.is_terminal() {
                stack.extend(node.edges.iter().filter(|c| !c.is_zero()).map(|c| c.node));
            }
            nodes.push(self.node_info(id));
        }

        // Sort by level, top first, terminal last
        nodes.sort_by_key(|n| (std::cmp::Reverse(n.level.map_or(0, |l| l + 1)), n.id));

        QmddTree {
            root: e,
            root_weight: self.scalars.value(e.weight),
            nodes,
        }
    }

    /// Print the current variable ordering, bottom level first.
    pub fn debug_ordering(&self) -> String {
        let mut result = String::from("Ordering: [");
        for (level, var) in self.order().iter().enumerate() {
            if level > 0 {
                result.push_str(", ");
            }
            let _ = write!(&mut result, "{}@L{}", var, level);
        }
        result.push(']');
        result
    }

    /// Dump the ordering and per-level node counts.
    pub fn dump_state(&self) -> String {
        let mut result = String::new();
        let _ = writeln!(&mut result, "=== QMDD State ===");
        let _ = writeln!(&mut result, "{}", self.debug_ordering());
        let _ = writeln!(
            &mut result,
            "Nodes: stored={}, active={}, blocks={}",
            self.num_nodes(),
            self.active_count,
            self.block_count
        );
        let _ = writeln!(&mut result, "Nodes by level:");
        for level in (0..self.num_vars()).rev() {
            let var = self.var_at(Level::new(level));
            let table = &self.subtables[var.index()];
            if !table.is_empty() {
                let _ = writeln!(
                    &mut result,
                    "  Level {} ({}): stored={}, active={}, buckets={}",
                    level,
                    var,
                    table.len(),
                    self.active[var.index()],
                    table.num_buckets()
                );
            }
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use test_log::test;

    use super::*;
    use crate::gate::GateMatrix;

    fn c(re: f64) -> Complex64 {
        Complex64::new(re, 0.0)
    }

    #[test]
    fn test_to_matrix_terminal() {
        let engine = Engine::new(2);
        let m = engine.to_matrix(Edge::ONE, 0);
        assert_eq!(m, vec![vec![c(1.0)]]);

        // All-ones matrix: every level is a don't-care.
        let m = engine.to_matrix(Edge::ONE, 2);
        assert!(m.iter().flatten().all(|z| *z == c(1.0)));
    }

    #[test]
    fn test_to_matrix_cnot() {
        let mut engine = Engine::new(2);
        let cnot = engine.gate(&GateMatrix::not(), 2, &[Var::new(1)], Var::new(0)).unwrap();
        let m = engine.to_matrix(cnot, 2);
        let expected = [
            [1.0, 0.0, 0.0, 0.0],
            [0.0, 1.0, 0.0, 0.0],
            [0.0, 0.0, 0.0, 1.0],
            [0.0, 0.0, 1.0, 0.0],
        ];
        for (r, row) in expected.iter().enumerate() {
            for (col, &x) in row.iter().enumerate() {
                assert_eq!(m[r][col], c(x), "entry ({}, {})", r, col);
            }
        }
    }

    #[test]
    #[should_panic(expected = "more than")]
    fn test_to_matrix_too_few_variables() {
        let mut engine = Engine::new(2);
        let x = engine.gate(&GateMatrix::not(), 2, &[], Var::new(1)).unwrap();
        let _ = engine.to_matrix(x, 1);
    }

    #[test]
    fn test_print() {
        let mut engine = Engine::new(2);
        let id = engine.identity(2).unwrap();
        let tree = engine.print(id);
        // Two identity nodes and the terminal.
        assert_eq!(tree.nodes.len(), 3);
        assert_eq!(tree.nodes[0].variable, Some(Var::new(1)));
        assert!(tree.nodes[2].variable.is_none());

        let s = tree.to_string();
        assert!(s.contains("var=x1"), "Expected var=x1 in: {}", s);
        assert!(s.contains("ident"), "Expected ident flag in: {}", s);
        assert!(s.contains("TERMINAL"), "Expected terminal in: {}", s);
    }

    #[test]
    fn test_fmt_complex() {
        assert_eq!(fmt_complex(c(1.0)), "1");
        assert_eq!(fmt_complex(c(-0.5)), "-0.5");
        assert_eq!(fmt_complex(Complex64::new(0.0, -1.0)), "-i");
        assert_eq!(fmt_complex(Complex64::new(0.5, 0.5)), "0.5+0.5i");
    }

    #[test]
    fn test_debug_ordering_and_state() {
        let mut engine = Engine::new(3);
        assert_eq!(engine.debug_ordering(), "Ordering: [x0@L0, x1@L1, x2@L2]");
        let id = engine.identity(3).unwrap();
        let s = engine.dump_state();
        assert!(s.contains("Level 2 (x2)"), "{}", s);
        assert!(engine.node_count(id) == 4);
    }
}
