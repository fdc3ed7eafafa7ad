//! Error types for scalar lowering.

use formc_core::{CoreError, Symbol, VertexId};
use thiserror::Error;

/// Errors produced while value-numbering and scalar-decomposing an
/// expression graph.
#[derive(Debug, Error)]
pub enum LowerError {
    /// An operator's operand symbol counts do not fit its reconstruction
    /// rule (e.g. a divisor that decomposes to more than one scalar).
    #[error("structural mismatch at vertex {vertex} ({op}): {reason}")]
    StructuralMismatch {
        vertex: VertexId,
        op: &'static str,
        reason: String,
    },

    /// A vertex kind reached a stage that has no rule for it.
    #[error("unsupported operator '{op}' at vertex {vertex}")]
    UnsupportedOperator { vertex: VertexId, op: String },

    /// A second, different definition was written to a write-once symbol
    /// slot. Identical rewrites (symmetry aliases) are permitted.
    #[error("conflicting definitions for symbol {symbol}: '{existing}' vs '{incoming}'")]
    SymbolConflict {
        symbol: Symbol,
        existing: String,
        incoming: String,
    },

    /// A requested output expression has no vertex in the graph built for
    /// it.
    #[error("missing root vertex for expression '{expression}'")]
    MissingRoot { expression: String },

    /// A symbol outside the numbered range was referenced.
    #[error("unknown symbol: {symbol}")]
    UnknownSymbol { symbol: Symbol },

    #[error(transparent)]
    Core(#[from] CoreError),
}
