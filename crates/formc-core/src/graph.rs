//! Expression graph container.
//!
//! [`ExprGraph`] stores one vertex per unique subexpression over a petgraph
//! `DiGraph`, with edges from consumer to operand. Edge weights carry the
//! operand position so that non-commutative operators keep their operand
//! order; petgraph's adjacency iteration alone does not preserve it.
//!
//! Vertices are never removed, so `NodeIndex` values are dense and stable
//! and map one-to-one onto [`VertexId`]s in insertion order. Insertion order
//! is dependency order: operands are added before their consumers, so every
//! edge points from a larger id to a smaller-or-equal one.

use indexmap::IndexMap;
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::EdgeRef;
use petgraph::Direction;
use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::expr::Expr;
use crate::id::VertexId;

/// Weight of a vertex: the expression it denotes and whether it is an output
/// the caller asked for.
#[derive(Debug, Clone)]
struct GraphNode {
    expression: Expr,
    target: bool,
}

/// Weight of a consumer-to-operand edge: the operand's position in the
/// consumer's operand list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperandEdge {
    pub position: u16,
}

/// Serializable snapshot of one vertex, for export and inspection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeRecord {
    pub id: u32,
    pub expression: String,
    pub op: String,
    pub target: bool,
    pub operands: Vec<u32>,
}

/// Deduplicated expression graph with ordered operand edges.
#[derive(Debug, Default)]
pub struct ExprGraph {
    graph: DiGraph<GraphNode, OperandEdge, u32>,
    index: IndexMap<Expr, VertexId>,
}

impl ExprGraph {
    pub fn new() -> Self {
        ExprGraph {
            graph: DiGraph::default(),
            index: IndexMap::new(),
        }
    }

    // -----------------------------------------------------------------------
    // Mutation
    // -----------------------------------------------------------------------

    /// Adds a vertex for `expression`. Ids are assigned densely in call
    /// order. A structurally identical expression may only be added once.
    pub fn add_node(&mut self, expression: Expr) -> Result<VertexId, CoreError> {
        if self.index.contains_key(&expression) {
            return Err(CoreError::DuplicateVertex {
                expression: expression.to_string(),
            });
        }
        let idx = self.graph.add_node(GraphNode {
            expression: expression.clone(),
            target: false,
        });
        let id = VertexId::from(idx);
        self.index.insert(expression, id);
        Ok(id)
    }

    /// Adds a consumer-to-operand edge at the given operand position.
    pub fn add_edge(
        &mut self,
        consumer: VertexId,
        operand: VertexId,
        position: u16,
    ) -> Result<(), CoreError> {
        self.check_vertex(consumer)?;
        self.check_vertex(operand)?;
        self.graph
            .add_edge(consumer.into(), operand.into(), OperandEdge { position });
        Ok(())
    }

    /// Marks a vertex as a requested output.
    pub fn mark_target(&mut self, vertex: VertexId) -> Result<(), CoreError> {
        self.check_vertex(vertex)?;
        self.graph[NodeIndex::from(vertex)].target = true;
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Read-only accessors
    // -----------------------------------------------------------------------

    pub fn number_of_nodes(&self) -> usize {
        self.graph.node_count()
    }

    pub fn number_of_edges(&self) -> usize {
        self.graph.edge_count()
    }

    /// The expression a vertex denotes.
    pub fn expression(&self, vertex: VertexId) -> Result<&Expr, CoreError> {
        self.check_vertex(vertex)?;
        Ok(&self.graph[NodeIndex::from(vertex)].expression)
    }

    pub fn is_target(&self, vertex: VertexId) -> Result<bool, CoreError> {
        self.check_vertex(vertex)?;
        Ok(self.graph[NodeIndex::from(vertex)].target)
    }

    /// The vertex registered for a structurally identical expression.
    pub fn lookup(&self, expression: &Expr) -> Option<VertexId> {
        self.index.get(expression).copied()
    }

    /// All vertex ids in insertion (dependency) order.
    pub fn vertices(&self) -> impl Iterator<Item = VertexId> + '_ {
        self.graph.node_indices().map(VertexId::from)
    }

    /// Operand vertices of `vertex` in operand-position order.
    pub fn operands(&self, vertex: VertexId) -> Result<Vec<VertexId>, CoreError> {
        self.check_vertex(vertex)?;
        let mut edges: Vec<(u16, VertexId)> = self
            .graph
            .edges(NodeIndex::from(vertex))
            .map(|e| {
                let weight: &OperandEdge = e.weight();
                (weight.position, VertexId::from(e.target()))
            })
            .collect();
        edges.sort_by_key(|(position, _)| *position);
        Ok(edges.into_iter().map(|(_, v)| v).collect())
    }

    /// Consumers of `vertex`, in the order their edges were added.
    pub fn dependents(&self, vertex: VertexId) -> Result<Vec<VertexId>, CoreError> {
        self.check_vertex(vertex)?;
        let mut consumers: Vec<VertexId> = self
            .graph
            .edges_directed(NodeIndex::from(vertex), Direction::Incoming)
            .map(|e| VertexId::from(e.source()))
            .collect();
        // petgraph iterates incoming edges newest first.
        consumers.reverse();
        Ok(consumers)
    }

    /// Target vertices in id order.
    pub fn targets(&self) -> Vec<VertexId> {
        self.graph
            .node_indices()
            .filter(|idx| self.graph[*idx].target)
            .map(VertexId::from)
            .collect()
    }

    /// Serializable per-vertex records in id order.
    pub fn export(&self) -> Vec<NodeRecord> {
        self.graph
            .node_indices()
            .map(|idx| {
                let node = &self.graph[idx];
                let id = VertexId::from(idx);
                let operands = self
                    .operands(id)
                    .map(|ops| ops.into_iter().map(|v| v.0).collect())
                    .unwrap_or_default();
                NodeRecord {
                    id: id.0,
                    expression: node.expression.to_string(),
                    op: node.expression.op().kind_name().to_string(),
                    target: node.target,
                    operands,
                }
            })
            .collect()
    }

    fn check_vertex(&self, vertex: VertexId) -> Result<(), CoreError> {
        if vertex.index() >= self.graph.node_count() {
            return Err(CoreError::UnknownVertex { vertex });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ops::Terminal;

    fn scalar(name: &str) -> Expr {
        Expr::terminal(Terminal::scalar(name))
    }

    fn small_graph() -> (ExprGraph, VertexId, VertexId, VertexId) {
        // a, b, a + b
        let a = scalar("a");
        let b = scalar("b");
        let s = Expr::sum(a.clone(), b.clone()).unwrap();

        let mut g = ExprGraph::new();
        let va = g.add_node(a).unwrap();
        let vb = g.add_node(b).unwrap();
        let vs = g.add_node(s).unwrap();
        g.add_edge(vs, va, 0).unwrap();
        g.add_edge(vs, vb, 1).unwrap();
        (g, va, vb, vs)
    }

    #[test]
    fn ids_are_dense_in_insertion_order() {
        let (g, va, vb, vs) = small_graph();
        assert_eq!((va.0, vb.0, vs.0), (0, 1, 2));
        assert_eq!(g.number_of_nodes(), 3);
        assert_eq!(g.number_of_edges(), 2);
    }

    #[test]
    fn duplicate_expression_is_rejected() {
        let mut g = ExprGraph::new();
        g.add_node(scalar("a")).unwrap();
        let err = g.add_node(scalar("a")).unwrap_err();
        assert!(matches!(err, CoreError::DuplicateVertex { .. }));
    }

    #[test]
    fn lookup_finds_structural_duplicates() {
        let (g, va, _, vs) = small_graph();
        assert_eq!(g.lookup(&scalar("a")), Some(va));
        let rebuilt = Expr::sum(scalar("a"), scalar("b")).unwrap();
        assert_eq!(g.lookup(&rebuilt), Some(vs));
        assert_eq!(g.lookup(&scalar("zzz")), None);
    }

    #[test]
    fn operands_come_back_in_position_order() {
        let (g, va, vb, vs) = small_graph();
        assert_eq!(g.operands(vs).unwrap(), vec![va, vb]);
        assert!(g.operands(va).unwrap().is_empty());
    }

    #[test]
    fn repeated_operand_keeps_both_positions() {
        // a + a: two edges to the same operand vertex.
        let a = scalar("a");
        let s = Expr::sum(a.clone(), a.clone()).unwrap();
        let mut g = ExprGraph::new();
        let va = g.add_node(a).unwrap();
        let vs = g.add_node(s).unwrap();
        g.add_edge(vs, va, 0).unwrap();
        g.add_edge(vs, va, 1).unwrap();
        assert_eq!(g.operands(vs).unwrap(), vec![va, va]);
    }

    #[test]
    fn dependents_in_edge_insertion_order() {
        let a = scalar("a");
        let s = Expr::sum(a.clone(), scalar("b")).unwrap();
        let p = Expr::product(a.clone(), scalar("c")).unwrap();

        let mut g = ExprGraph::new();
        let va = g.add_node(a).unwrap();
        let vb = g.add_node(scalar("b")).unwrap();
        let vc = g.add_node(scalar("c")).unwrap();
        let vs = g.add_node(s).unwrap();
        let vp = g.add_node(p).unwrap();
        g.add_edge(vs, va, 0).unwrap();
        g.add_edge(vs, vb, 1).unwrap();
        g.add_edge(vp, va, 0).unwrap();
        g.add_edge(vp, vc, 1).unwrap();

        assert_eq!(g.dependents(va).unwrap(), vec![vs, vp]);
        assert!(g.dependents(vp).unwrap().is_empty());
    }

    #[test]
    fn unknown_vertex_is_reported() {
        let (mut g, va, _, _) = small_graph();
        let ghost = VertexId(99);
        assert!(matches!(
            g.add_edge(va, ghost, 0),
            Err(CoreError::UnknownVertex { vertex }) if vertex == ghost
        ));
        assert!(matches!(
            g.expression(ghost),
            Err(CoreError::UnknownVertex { .. })
        ));
    }

    #[test]
    fn targets_are_marked_and_listed() {
        let (mut g, _, vb, vs) = small_graph();
        assert!(g.targets().is_empty());
        g.mark_target(vs).unwrap();
        g.mark_target(vb).unwrap();
        assert_eq!(g.targets(), vec![vb, vs]);
        assert!(g.is_target(vs).unwrap());
        assert!(!g.is_target(VertexId(0)).unwrap());
    }

    #[test]
    fn export_records_roundtrip_as_json() {
        let (mut g, _, _, vs) = small_graph();
        g.mark_target(vs).unwrap();

        let records = g.export();
        assert_eq!(records.len(), 3);
        assert_eq!(records[2].expression, "a + b");
        assert_eq!(records[2].op, "sum");
        assert_eq!(records[2].operands, vec![0, 1]);
        assert!(records[2].target);
        assert!(records[0].operands.is_empty());

        let json = serde_json::to_string(&records).unwrap();
        let back: Vec<NodeRecord> = serde_json::from_str(&json).unwrap();
        assert_eq!(records, back);
    }
}
