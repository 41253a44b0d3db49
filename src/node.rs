//! Nodes, edges and node handles.
//!
//! A nonterminal node decides one variable and owns `RADIX² = 4` edges, one per
//! submatrix block, in row-major order:
//!
//! ```text
//!        ┌──────┬──────┐
//!        │ e[0] │ e[1] │   e[i * RADIX + j] is the block (row i, column j)
//!   M =  ├──────┼──────┤   of the matrix with respect to the node's variable.
//!        │ e[2] │ e[3] │
//!        └──────┴──────┘
//! ```
//!
//! There is exactly one terminal node, representing the value 1. An [`Edge`]
//! scales the matrix of its target node by its weight; the zero matrix is the
//! terminal reached with weight zero.

use std::fmt;

use crate::scalar::Scalar;
use crate::types::{Var, NEDGE, RADIX};
use crate::utils::{mix64, pairing2, MyHash};

/// Generation-checked index of a node in the [`Storage`][crate::storage::Storage].
#[derive(Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct NodeId {
    index: u32,
    generation: u32,
}

impl NodeId {
    /// The unique terminal node.
    pub const TERMINAL: NodeId = NodeId {
        index: 0,
        generation: 0,
    };

    pub(crate) const fn new(index: u32, generation: u32) -> Self {
        Self { index, generation }
    }

    pub const fn index(self) -> usize {
        self.index as usize
    }

    pub const fn generation(self) -> u32 {
        self.generation
    }

    pub const fn is_terminal(self) -> bool {
        self.index == 0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_terminal() {
            write!(f, "@T")
        } else {
            write!(f, "@{}", self.index)
        }
    }
}

/// Weighted pointer to a node. Also the handle type of the public API.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub struct Edge {
    pub node: NodeId,
    pub weight: Scalar,
}

impl Edge {
    /// The zero matrix.
    pub const ZERO: Edge = Edge::terminal(Scalar::ZERO);
    /// The terminal with weight one.
    pub const ONE: Edge = Edge::terminal(Scalar::ONE);

    pub const fn new(node: NodeId, weight: Scalar) -> Self {
        Self { node, weight }
    }

    pub const fn terminal(weight: Scalar) -> Self {
        Self::new(NodeId::TERMINAL, weight)
    }

    pub const fn is_terminal(&self) -> bool {
        self.node.is_terminal()
    }

    pub const fn is_zero(&self) -> bool {
        self.weight.is_zero()
    }

    /// Same target, different weight. A zero weight yields [`Edge::ZERO`].
    pub const fn with_weight(self, weight: Scalar) -> Self {
        if weight.is_zero() {
            Edge::ZERO
        } else {
            Edge::new(self.node, weight)
        }
    }
}

impl fmt::Display for Edge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}·{}", self.weight, self.node)
    }
}

pub type Edges = [Edge; NEDGE];

impl MyHash for Edge {
    fn hash(&self) -> u64 {
        pairing2(self.node.index as u64, self.weight.raw())
    }
}

impl MyHash for Edges {
    fn hash(&self) -> u64 {
        let h = self.iter().fold(0, |acc, e| pairing2(acc, MyHash::hash(e)));
        mix64(h)
    }
}

/// Builds the block-diagonal edge array `diag(d[0], ..., d[RADIX-1])`.
pub fn diagonal(d: [Edge; RADIX]) -> Edges {
    let mut edges = [Edge::ZERO; NEDGE];
    for (i, e) in d.into_iter().enumerate() {
        edges[i * RADIX + i] = e;
    }
    edges
}

/// Cached structural properties of the matrix rooted at a node.
#[derive(Debug, Copy, Clone, Default, Eq, PartialEq)]
pub struct SpecialFlags {
    pub ident: bool,
    pub diag: bool,
    pub block: bool,
    pub symm: bool,
    pub c01: bool,
}

impl SpecialFlags {
    /// No property known.
    pub const NONE: SpecialFlags = SpecialFlags {
        ident: false,
        diag: false,
        block: false,
        symm: false,
        c01: false,
    };

    /// Properties of the terminal.
    pub const TERMINAL: SpecialFlags = SpecialFlags {
        ident: true,
        diag: true,
        block: false,
        symm: true,
        c01: true,
    };

    /// Only the block property, which depends on the node's own edges alone.
    pub fn local(edges: &Edges) -> Self {
        SpecialFlags {
            block: is_block(edges),
            ..SpecialFlags::NONE
        }
    }
}

/// Whether every off-diagonal block is zero.
pub fn is_block(edges: &Edges) -> bool {
    (0..RADIX).all(|i| (0..RADIX).all(|j| i == j || edges[i * RADIX + j].is_zero()))
}

/// Validity of a node's [`SpecialFlags`].
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum FlagState {
    /// Flags are up to date.
    Valid,
    /// Created while flags were suspended (during reordering); only `block` is meaningful.
    Suspended,
    /// Marked for recomputation after reordering.
    NeedsRecompute,
}

#[derive(Debug, Copy, Clone)]
pub struct Node {
    /// Decision variable, `None` for the terminal.
    pub var: Option<Var>,
    pub edges: Edges,
    pub ref_count: u32,
    /// Deferred scale factor left behind by variable swaps (one outside of reordering).
    pub renorm_factor: Scalar,
    pub flags: SpecialFlags,
    pub flag_state: FlagState,
    /// Next node in the unique-table collision chain (storage index).
    pub(crate) next: u32,
}

impl Node {
    /// End-of-chain marker.
    pub const NO_NEXT: u32 = u32::MAX;

    pub fn terminal() -> Self {
        Self {
            var: None,
            edges: [Edge::ZERO; NEDGE],
            ref_count: 0,
            renorm_factor: Scalar::ONE,
            flags: SpecialFlags::TERMINAL,
            flag_state: FlagState::Valid,
            next: Self::NO_NEXT,
        }
    }

    pub fn new(var: Var, edges: Edges, flag_state: FlagState) -> Self {
        Self {
            var: Some(var),
            edges,
            ref_count: 0,
            renorm_factor: Scalar::ONE,
            flags: SpecialFlags::local(&edges),
            flag_state,
            next: Self::NO_NEXT,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.var.is_none()
    }
}
