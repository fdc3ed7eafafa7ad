//! Stable ID newtypes for graph entities.
//!
//! All IDs are distinct newtype wrappers over `u32`, providing type safety
//! so that a `VertexId` cannot be accidentally used where a `Symbol` is
//! expected.

use std::fmt;

use petgraph::graph::NodeIndex;
use serde::{Deserialize, Serialize};

/// Dense vertex identifier in an expression graph. Vertices are numbered in
/// insertion order, which is also dependency (topological) order: a vertex's
/// operands always carry smaller or equal ids. Maps to a petgraph
/// `NodeIndex<u32>`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct VertexId(pub u32);

/// Canonical identifier for one scalar evaluation slot. Two (vertex,
/// component) pairs share a symbol only when the value numberer has proven
/// them numerically identical.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Symbol(pub u32);

/// Identity of a free (unsummed) tensor index label.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct IndexId(pub u32);

impl Symbol {
    /// Slot position in a symbol table sized to the total symbol count.
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl VertexId {
    /// Position in id-ordered vertex sequences.
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

// Display implementations -- just print the inner value (indices get the
// conventional `i` prefix).

impl fmt::Display for VertexId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for IndexId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "i{}", self.0)
    }
}

// Bridge between VertexId and petgraph's NodeIndex<u32>.

impl From<NodeIndex<u32>> for VertexId {
    fn from(idx: NodeIndex<u32>) -> Self {
        VertexId(idx.index() as u32)
    }
}

impl From<VertexId> for NodeIndex<u32> {
    fn from(id: VertexId) -> Self {
        NodeIndex::new(id.0 as usize)
    }
}
