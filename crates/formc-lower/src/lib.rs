//! Scalar lowering of weak-form expression graphs.
//!
//! [`build_scalar_graph`] is the pipeline entry point: it deduplicates the
//! input roots into an expression graph, value-numbers every flattened
//! component, rewrites each vertex into scalar expressions over its
//! operands' symbol definitions, and rebuilds the result as a new graph
//! whose vertices are all scalar-valued. Tensor structure survives only as
//! the list of per-component target vertices.

pub mod error;
pub mod reconstruct;
pub mod table;
pub mod valuenumber;

pub use error::LowerError;
pub use reconstruct::reconstruct;
pub use table::SymbolTable;
pub use valuenumber::{number_values, terminal_components, Numbering, TerminalComponent};

use formc_core::{build_graph_vertices, Expr, ExprGraph, VertexId};

/// Result of scalar lowering.
#[derive(Debug)]
pub struct ScalarGraph {
    /// Deduplicated graph over scalar-valued vertices only.
    pub graph: ExprGraph,
    /// Target vertices, one per flattened component of each input root, in
    /// root order with components row-major.
    pub targets: Vec<VertexId>,
    /// Value numbering of the pre-lowering graph, for inspection.
    pub numbering: Numbering,
}

/// Lowers `roots` to a deduplicated graph of scalar expressions.
///
/// Fails when an operand's symbol counts do not fit its operator's
/// reconstruction rule (see [`reconstruct`]) or when value numbering routes
/// two different definitions to one symbol.
pub fn build_scalar_graph(roots: &[Expr]) -> Result<ScalarGraph, LowerError> {
    let graph = build_graph_vertices(roots)?;
    let numbering = number_values(&graph)?;
    let table = define_symbols(&graph, &numbering)?;

    // One scalar root per flattened component of each input root.
    let mut scalar_roots = Vec::new();
    for root in roots {
        let vertex = graph
            .lookup(root)
            .ok_or_else(|| LowerError::MissingRoot {
                expression: root.to_string(),
            })?;
        scalar_roots.extend(table.get_all(numbering.symbols(vertex))?);
    }

    let scalar_graph = build_graph_vertices(&scalar_roots)?;
    let mut targets = Vec::with_capacity(scalar_roots.len());
    for root in &scalar_roots {
        let vertex = scalar_graph
            .lookup(root)
            .ok_or_else(|| LowerError::MissingRoot {
                expression: root.to_string(),
            })?;
        targets.push(vertex);
    }

    Ok(ScalarGraph {
        graph: scalar_graph,
        targets,
        numbering,
    })
}

/// Walks vertices in dependency order and writes every symbol's scalar
/// definition. Terminal vertices expand to canonical component selections;
/// compound vertices are rebuilt over their operands' definitions. A vertex
/// whose symbols are all already defined is skipped (shared terminal
/// components reached via a different selection).
fn define_symbols(
    graph: &ExprGraph,
    numbering: &Numbering,
) -> Result<SymbolTable, LowerError> {
    let mut table = SymbolTable::new(numbering.symbol_count());
    for vertex in graph.vertices() {
        let expr = graph.expression(vertex)?;
        let symbols = numbering.symbols(vertex);

        if expr.is_terminal() {
            for (symbol, component) in symbols
                .iter()
                .zip(terminal_components(expr, vertex)?)
            {
                table.define(*symbol, component.selected)?;
            }
            continue;
        }

        if symbols.iter().all(|s| table.is_defined(*s)) {
            continue;
        }

        let mut wops = Vec::new();
        for operand in graph.operands(vertex)? {
            wops.push(table.get_all(numbering.symbols(operand))?);
        }
        let ws = reconstruct(vertex, expr, &wops)?;
        if ws.len() != symbols.len() {
            return Err(LowerError::StructuralMismatch {
                vertex,
                op: expr.op().kind_name(),
                reason: format!(
                    "reconstruction produced {} components for {} symbols",
                    ws.len(),
                    symbols.len()
                ),
            });
        }
        for (symbol, w) in symbols.iter().zip(ws) {
            table.define(*symbol, w)?;
        }
    }
    Ok(table)
}
