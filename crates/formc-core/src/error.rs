//! Core error types for formc-core.
//!
//! Uses `thiserror` for structured, matchable error variants covering
//! expression construction failures and graph contract violations.

use crate::id::VertexId;
use thiserror::Error;

/// Core errors produced by the formc-core crate.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Operand shapes violate the operator's algebra.
    #[error("shape mismatch in {op}: {reason}")]
    ShapeMismatch { op: &'static str, reason: String },

    /// Operand free-index lists violate the operator's algebra.
    #[error("index mismatch in {op}: {reason}")]
    IndexMismatch { op: &'static str, reason: String },

    /// An operator was rebuilt with the wrong number of operands.
    #[error("arity mismatch in {op}: expected {expected} operands, got {actual}")]
    ArityMismatch {
        op: &'static str,
        expected: usize,
        actual: usize,
    },

    /// An edge or query references a vertex id that is not registered in the
    /// graph.
    #[error("unknown vertex: VertexId({id})", id = vertex.0)]
    UnknownVertex { vertex: VertexId },

    /// A structurally identical expression was registered twice; the unique
    /// indexer must collapse duplicates before vertices are added.
    #[error("duplicate vertex for expression '{expression}'")]
    DuplicateVertex { expression: String },
}
