//! Unique post-order indexing and graph construction.
//!
//! [`index_expressions`] walks one or more expression roots depth-first with
//! an explicit stack (recursion depth is attacker-sized: integrands nest
//! thousands deep) and assigns each structurally distinct subexpression one
//! dense id in post order. Post order makes ids dependency-ordered: every
//! operand's id is smaller than its consumer's.
//!
//! [`build_graph_vertices`] materializes that numbering as an [`ExprGraph`]
//! with position-labelled operand edges and the roots marked as targets.

use indexmap::IndexMap;

use crate::error::CoreError;
use crate::expr::Expr;
use crate::graph::ExprGraph;
use crate::id::VertexId;

struct Frame {
    expr: Expr,
    next: usize,
}

/// Assigns dense post-order ids to every distinct subexpression reachable
/// from `roots`. Shared subtrees are indexed once; terminals are atomic
/// leaves. Roots are indexed in slice order, so later roots reuse ids
/// already assigned under earlier ones.
pub fn index_expressions(roots: &[Expr]) -> IndexMap<Expr, VertexId> {
    let mut order: IndexMap<Expr, VertexId> = IndexMap::new();
    for root in roots {
        if order.contains_key(root) {
            continue;
        }
        let mut stack = vec![Frame {
            expr: root.clone(),
            next: 0,
        }];
        loop {
            // Find the next unvisited operand of the top frame, if any.
            let descend = match stack.last_mut() {
                None => break,
                Some(frame) => {
                    let expr = frame.expr.clone();
                    let operands = expr.operands();
                    let mut child = None;
                    while frame.next < operands.len() {
                        let candidate = &operands[frame.next];
                        frame.next += 1;
                        if !order.contains_key(candidate) {
                            child = Some(candidate.clone());
                            break;
                        }
                    }
                    child
                }
            };
            match descend {
                Some(child) => stack.push(Frame {
                    expr: child,
                    next: 0,
                }),
                None => {
                    if let Some(frame) = stack.pop() {
                        let id = VertexId(order.len() as u32);
                        order.entry(frame.expr).or_insert(id);
                    }
                }
            }
        }
    }
    order
}

/// Builds the deduplicated expression graph for `roots`: one vertex per
/// distinct subexpression in post order, consumer-to-operand edges labelled
/// with operand positions, and each root marked as a target.
pub fn build_graph_vertices(roots: &[Expr]) -> Result<ExprGraph, CoreError> {
    let order = index_expressions(roots);
    let mut graph = ExprGraph::new();
    for expr in order.keys() {
        graph.add_node(expr.clone())?;
    }
    for (expr, id) in &order {
        for (position, operand) in expr.operands().iter().enumerate() {
            let operand_id = order
                .get(operand)
                .copied()
                .ok_or(CoreError::UnknownVertex { vertex: *id })?;
            graph.add_edge(*id, operand_id, position as u16)?;
        }
    }
    for root in roots {
        if let Some(id) = graph.lookup(root) {
            graph.mark_target(id)?;
        }
    }
    Ok(graph)
}
