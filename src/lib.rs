//! # qmdd-rs: Quantum Multiple-valued Decision Diagrams in Rust
//!
//! **`qmdd-rs`** is a manager-centric library for building and manipulating
//! **QMDDs**, the decision diagrams used to represent the unitary matrices of
//! reversible and quantum circuits.
//!
//! ## What is a QMDD?
//!
//! A `2ⁿ × 2ⁿ` matrix is split into four `2ⁿ⁻¹ × 2ⁿ⁻¹` blocks by its top
//! variable, each block recursively by the next variable, and so on. A QMDD
//! node has one edge per block; every edge carries a complex **weight**, and
//! identical sub-blocks are shared. With normalized weights the diagram is
//! **canonical**: for a fixed variable order, every matrix has exactly one
//! representation, so equality of matrices is equality of handles.
//!
//! ## Key Features
//!
//! - **Manager-Centric Architecture**: all state lives in one [`Engine`][crate::engine::Engine]:
//!   the scalar table, node storage, unique tables and compute tables.
//! - **Canonical Scalars**: complex weights are interned up to a tolerance, so
//!   numerically equal weights are the same [`Scalar`][crate::scalar::Scalar].
//! - **Generation-Checked Handles**: [`Edge`][crate::node::Edge] handles are
//!   small `Copy` values; using a reclaimed node panics instead of aliasing.
//! - **Algebra**: add, multiply, Kronecker product, (conjugate) transpose and
//!   partial trace, all memoized.
//! - **Sifting**: dynamic variable reordering that keeps results numerically exact.
//!
//! ## Basic Usage
//!
//! ```rust
//! use qmdd_rs::engine::Engine;
//! use qmdd_rs::gate::GateMatrix;
//! use qmdd_rs::types::Var;
//!
//! let mut engine = Engine::new(2);
//!
//! // CNOT with control x1 and target x0
//! let cnot = engine.gate(&GateMatrix::not(), 2, &[Var::new(1)], Var::new(0)).unwrap();
//!
//! // CNOT is its own inverse
//! let square = engine.multiply(cnot, cnot).unwrap();
//! assert_eq!(square, engine.identity(2).unwrap());
//!
//! // Keep the handle alive across garbage collection
//! engine.incref(cnot);
//! engine.collect_now();
//! assert_eq!(engine.node_count(cnot), 4);
//! ```
//!
//! ## Core Components
//!
//! - **[`engine`]**: the [`Engine`][crate::engine::Engine] manager, node construction and garbage collection.
//! - **[`ops`]**: the matrix algebra.
//! - **[`gate`]**: gate matrices and controlled-gate construction.
//! - **[`reorder`]**: adjacent swaps and sifting.
//! - **[`debug`]**: dense matrix extraction and tree dumps.

pub mod cache;
pub mod compute;
pub mod debug;
pub mod engine;
pub mod error;
pub mod gate;
pub mod node;
pub mod ops;
pub mod reorder;
pub mod scalar;
pub mod special;
pub mod storage;
pub mod subtable;
pub mod types;
pub mod utils;

pub use crate::engine::{Engine, EngineConfig};
pub use crate::error::{EngineError, Result};
pub use crate::node::Edge;
