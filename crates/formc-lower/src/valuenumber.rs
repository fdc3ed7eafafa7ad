//! Value numbering: flattened scalar components to canonical symbols.
//!
//! Every vertex of a deduplicated expression graph owns one symbol per
//! flattened scalar component. Compound vertices always get fresh symbols
//! (graph deduplication has already collapsed structural equality). Terminal
//! components are the one place extra aliasing happens: all selections of
//! one underlying terminal value draw their symbols from a shared per-value
//! cache, so `u[0]` inside a larger vertex and a standalone `u[0]` vertex
//! agree, and symmetric rank-2 mirrors (`T[1,0]`, `T[0,1]`) collapse to one
//! symbol via coordinate canonicalization.

use std::collections::HashMap;

use smallvec::SmallVec;

use formc_core::shape::{flatten_coords, unflatten_coords};
use formc_core::{index, ComponentSel, Expr, ExprGraph, ModTerminal, Symbol, VertexId};

use crate::error::LowerError;

/// One flattened scalar component of a terminal vertex.
#[derive(Debug, Clone)]
pub struct TerminalComponent {
    /// The underlying terminal value with the component selection stripped;
    /// the cache identity shared by all selections of that value.
    pub base: ModTerminal,
    /// Canonical row-major offset over the value's effective axes, after
    /// symmetry canonicalization.
    pub flat: usize,
    /// The canonical fixed-component scalar expression for this slot.
    pub selected: Expr,
}

/// Expands a terminal vertex into its flattened scalar components in
/// component order. Free-index slots range over their axes (row-major, free
/// indices in label order after the shape axes); fixed slots stay put;
/// symmetric mirrors canonicalize to the upper-triangle coordinate.
pub fn terminal_components(
    expr: &Expr,
    vertex: VertexId,
) -> Result<Vec<TerminalComponent>, LowerError> {
    let mt = expr
        .as_mod_terminal()
        .ok_or_else(|| LowerError::UnsupportedOperator {
            vertex,
            op: expr.op().kind_name().to_string(),
        })?;
    let base = mt.base();
    let effective = mt.effective_dims();
    let count = expr.component_count();

    let mut out = Vec::with_capacity(count);
    for c in 0..count {
        let mut coords: SmallVec<[usize; 4]> = match &mt.component {
            // Unselected terminal: components enumerate the effective axes.
            None => unflatten_coords(c, &effective),
            // Selected terminal: components enumerate the free-index axes;
            // expand each slot to its full coordinate.
            Some(selection) => {
                let fi = expr.free_indices();
                let fi_dims = index::dims(fi);
                let values = unflatten_coords(c, &fi_dims);
                let mut coords = SmallVec::new();
                for slot in selection.iter() {
                    coords.push(match slot {
                        ComponentSel::Fixed(k) => *k,
                        ComponentSel::Free(id) => {
                            // Every Free slot is in the node's free-index
                            // list by construction; a miss is a numbering
                            // bug, never a component to guess at.
                            let p = index::position(fi, *id).ok_or_else(|| {
                                LowerError::StructuralMismatch {
                                    vertex,
                                    op: expr.op().kind_name(),
                                    reason: format!(
                                        "selection index {} is missing from the node's free-index list",
                                        id
                                    ),
                                }
                            })?;
                            values[p]
                        }
                    });
                }
                coords
            }
        };
        mt.canonicalize_coords(&mut coords);
        let flat = flatten_coords(&coords, &effective);

        let selected = if coords.is_empty() && mt.component.is_none() {
            expr.clone()
        } else {
            let mut full = base.clone();
            full.component = Some(coords.iter().map(|&k| ComponentSel::Fixed(k)).collect());
            Expr::modified(full)?
        };
        out.push(TerminalComponent {
            base: base.clone(),
            flat,
            selected,
        });
    }
    Ok(out)
}

/// Result of value numbering: per-vertex symbol lists plus the total count.
#[derive(Debug)]
pub struct Numbering {
    node_symbols: Vec<SmallVec<[Symbol; 4]>>,
    symbol_count: usize,
}

impl Numbering {
    /// The symbols of a vertex, one per flattened component. Unknown
    /// vertices map to the empty slice.
    pub fn symbols(&self, vertex: VertexId) -> &[Symbol] {
        self.node_symbols
            .get(vertex.index())
            .map(|s| s.as_slice())
            .unwrap_or(&[])
    }

    pub fn symbol_count(&self) -> usize {
        self.symbol_count
    }
}

/// Numbers every flattened scalar component of every vertex, in vertex id
/// order. Symbols are dense starting from zero.
pub fn number_values(graph: &ExprGraph) -> Result<Numbering, LowerError> {
    let mut node_symbols = Vec::with_capacity(graph.number_of_nodes());
    let mut terminal_cache: HashMap<(ModTerminal, usize), Symbol> = HashMap::new();
    let mut next = 0u32;

    for vertex in graph.vertices() {
        let expr = graph.expression(vertex)?;
        let mut symbols: SmallVec<[Symbol; 4]> = SmallVec::new();
        if expr.is_terminal() {
            for component in terminal_components(expr, vertex)? {
                let symbol = *terminal_cache
                    .entry((component.base, component.flat))
                    .or_insert_with(|| {
                        let s = Symbol(next);
                        next += 1;
                        s
                    });
                symbols.push(symbol);
            }
        } else {
            for _ in 0..expr.component_count() {
                symbols.push(Symbol(next));
                next += 1;
            }
        }
        node_symbols.push(symbols);
    }

    Ok(Numbering {
        node_symbols,
        symbol_count: next as usize,
    })
}
