//! Engine errors.
//!
//! Every fallible engine operation returns [`Result`]. An error invalidates the
//! diagram under construction: there is no partial-failure or retry semantics,
//! callers are expected to abort the current high-level operation.
//!
//! Programming errors (decrementing a dead node, using a stale [`NodeId`][crate::node::NodeId],
//! a renormalization pass that does not drain) are not represented here: they panic.

use thiserror::Error;

use crate::types::Var;

/// Errors surfaced by the decision-diagram engine.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum EngineError {
    /// An index space is exhausted.
    ///
    /// Raised by the scalar table (31-bit component indices) and by the node storage.
    #[error("{table} table overflow: capacity of {capacity} entries exhausted")]
    TableOverflow {
        /// Which table overflowed (`"scalar"` or `"node"`).
        table: &'static str,
        /// Configured capacity of that table.
        capacity: usize,
    },

    /// Division by a scalar indistinguishable from zero.
    #[error("degenerate normalization: division of {numerator} by a zero weight")]
    DegenerateNormalization {
        /// Rendered numerator, for diagnostics.
        numerator: String,
    },

    /// Malformed gate description.
    #[error("invalid gate: {0}")]
    InvalidGate(String),

    /// A variable outside of the engine's configured range.
    #[error("unknown variable {var} (engine has {num_vars} variables)")]
    UnknownVariable {
        /// The offending variable.
        var: Var,
        /// Number of variables known to the engine.
        num_vars: usize,
    },

    /// A variable order that is not a permutation of the engine's variables.
    #[error("invalid variable order: {0}")]
    InvalidOrder(String),

    /// Reordering was asked to rebuild only part of the referenced nodes.
    ///
    /// Every referenced diagram must be passed as a root, otherwise its nodes
    /// would be rewritten without a root to flush them through.
    #[error("{active} nodes are referenced but only {reachable} are reachable from the reordering roots")]
    UnrootedReferences {
        /// Referenced nodes reachable from the roots.
        reachable: usize,
        /// All referenced nodes.
        active: usize,
    },
}

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, EngineError>;

#[cfg(test)]
mod tests {
    use test_log::test;

    use super::*;

    #[test]
    fn test_error_messages() {
        let e = EngineError::TableOverflow {
            table: "scalar",
            capacity: 16,
        };
        assert_eq!(e.to_string(), "scalar table overflow: capacity of 16 entries exhausted");

        let e = EngineError::UnknownVariable {
            var: Var::new(7),
            num_vars: 3,
        };
        assert_eq!(e.to_string(), "unknown variable x7 (engine has 3 variables)");

        let e = EngineError::UnrootedReferences { reachable: 3, active: 5 };
        assert_eq!(
            e.to_string(),
            "5 nodes are referenced but only 3 are reachable from the reordering roots"
        );
    }
}
