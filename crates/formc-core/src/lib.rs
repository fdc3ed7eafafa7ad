pub mod error;
pub mod expr;
pub mod graph;
pub mod id;
pub mod index;
pub mod ops;
pub mod shape;
pub mod traverse;

// Re-export commonly used types
pub use error::CoreError;
pub use expr::Expr;
pub use graph::{ExprGraph, NodeRecord, OperandEdge};
pub use id::{IndexId, Symbol, VertexId};
pub use index::{FreeIndex, FreeIndices};
pub use ops::{
    BesselKind, ComponentSel, ConditionKind, MathFunc, ModTerminal, Operator, Restriction,
    Terminal,
};
pub use shape::Shape;
pub use traverse::{build_graph_vertices, index_expressions};
