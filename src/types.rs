//! Type-safe wrappers for QMDD variables and levels.
//!
//! A variable identifies a qubit (circuit line) and is stable across reordering.
//! A level is a position in the current variable order and changes whenever
//! two adjacent variables are swapped.
//!
//! ```text
//! level n-1   ── top of every diagram (closest to the root)
//!   ...
//! level 1
//! level 0     ── bottom, directly above the terminal
//! ```
//!
//! The engine keeps the two mappings `order[level] = var` and
//! `inv_order[var] = level`; initially both are the identity permutation.

use std::fmt;

/// Number of values a single variable can take.
pub const RADIX: usize = 2;

/// Number of outgoing edges of a nonterminal node (`RADIX²`).
pub const NEDGE: usize = RADIX * RADIX;

/// A variable identifier (0-indexed).
///
/// Variables correspond to circuit lines. Row and column bit `v` of a matrix
/// is decided by variable `x{v}`, regardless of where it sits in the order.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct Var(u32);

impl Var {
    /// Creates a new variable with the given ID.
    pub const fn new(id: u32) -> Self {
        Var(id)
    }

    /// Returns the raw variable ID as a `u32`.
    pub const fn id(self) -> u32 {
        self.0
    }

    /// Returns the variable ID as an index into per-variable tables.
    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for Var {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "x{}", self.0)
    }
}

impl From<usize> for Var {
    fn from(index: usize) -> Self {
        Var(index as u32)
    }
}

/// A level in the variable ordering (0-indexed, counted from the bottom).
///
/// # Invariants
///
/// - Level 0 is the bottommost level (closest to the terminal)
/// - Levels increase upward toward the root
/// - After reordering, the same variable may be at a different level
#[derive(Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct Level(usize);

impl Level {
    /// Creates a new level with the given index.
    pub const fn new(index: usize) -> Self {
        Level(index)
    }

    /// Returns the raw level index as a `usize`.
    pub const fn index(self) -> usize {
        self.0
    }

    /// Returns the level below (index - 1), or None if at level 0.
    pub fn down(self) -> Option<Self> {
        if self.0 > 0 {
            Some(Level(self.0 - 1))
        } else {
            None
        }
    }
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "L{}", self.0)
    }
}

impl From<usize> for Level {
    fn from(index: usize) -> Self {
        Level(index)
    }
}

#[cfg(test)]
mod tests {
    use test_log::test;

    use super::*;

    #[test]
    fn test_var_creation() {
        let v0 = Var::new(0);
        let v1 = Var::new(1);
        assert_eq!(v0.id(), 0);
        assert_eq!(v1.index(), 1);
        assert!(v0 < v1);
        assert_eq!(v1.to_string(), "x1");
    }

    #[test]
    fn test_level_down() {
        let l0 = Level::new(0);
        let l1 = Level::from(1);

        assert_eq!(l1.down(), Some(l0));
        assert_eq!(l0.down(), None);
        assert_eq!(l1.index(), 1);
        assert_eq!(l1.to_string(), "L1");
    }
}
