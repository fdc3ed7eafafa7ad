//! Scalar reconstruction rules.
//!
//! Given a compound vertex and the scalar definitions of its operands' symbols,
//! [`reconstruct`] re-expresses each flattened component of the vertex as a
//! scalar expression over those definitions. Dispatch is an exhaustive match
//! on [`Operator`], so every operator kind has exactly one rule:
//!
//! - scalar kinds (math, comparisons, `abs`, `min`/`max`, `pow`, `atan2`,
//!   bessel, `real`/`imag`) require single-symbol operands,
//! - `sum`, `conj` and `conditional` map elementwise,
//! - `division` maps the numerator over a single divisor symbol,
//! - `product` broadcasts a single-symbol factor or maps the merged
//!   free-index space onto each factor's own component space,
//! - an index sum folds its operand's summed axis left-to-right into nested
//!   binary sums.
//!
//! Terminal vertices never come here; their components are expanded by
//! [`crate::valuenumber::terminal_components`].

use smallvec::SmallVec;

use formc_core::shape::{flatten_coords, unflatten_coords};
use formc_core::{index, Expr, FreeIndex, Operator, VertexId};

use crate::error::LowerError;

fn mismatch(vertex: VertexId, expr: &Expr, reason: String) -> LowerError {
    LowerError::StructuralMismatch {
        vertex,
        op: expr.op().kind_name(),
        reason,
    }
}

fn operand<'a>(
    vertex: VertexId,
    expr: &Expr,
    wops: &'a [Vec<Expr>],
    k: usize,
) -> Result<&'a [Expr], LowerError> {
    wops.get(k)
        .map(|w| w.as_slice())
        .ok_or_else(|| mismatch(vertex, expr, format!("missing operand {}", k)))
}

/// The single scalar form of operand `k`; errors if it decomposed to more
/// than one symbol.
fn sole<'a>(
    vertex: VertexId,
    expr: &Expr,
    wops: &'a [Vec<Expr>],
    k: usize,
) -> Result<&'a Expr, LowerError> {
    let w = operand(vertex, expr, wops, k)?;
    if w.len() != 1 {
        return Err(mismatch(
            vertex,
            expr,
            format!("operand {} decomposes to {} symbols, expected 1", k, w.len()),
        ));
    }
    Ok(&w[0])
}

/// Flat offset of one operand's component for a given assignment of the
/// consumer's free-index values. `None` if a factor index is missing from
/// the merged index space; constructors keep the merged space a superset of
/// each factor's, so callers treat that as a structural defect.
fn factor_offset(
    out_fi: &[FreeIndex],
    values: &[usize],
    factor_fi: &[FreeIndex],
    factor_dims: &[usize],
) -> Option<usize> {
    let mut coords: SmallVec<[usize; 4]> = SmallVec::new();
    for f in factor_fi {
        let p = index::position(out_fi, f.id)?;
        coords.push(values[p]);
    }
    Some(flatten_coords(&coords, factor_dims))
}

/// Re-expresses each flattened component of `expr` over the scalar operand
/// forms `wops` (one list per operand, in operand order).
pub fn reconstruct(
    vertex: VertexId,
    expr: &Expr,
    wops: &[Vec<Expr>],
) -> Result<Vec<Expr>, LowerError> {
    match expr.op() {
        Operator::Terminal(_) | Operator::ModTerminal(_) => {
            Err(LowerError::UnsupportedOperator {
                vertex,
                op: expr.op().kind_name().to_string(),
            })
        }

        Operator::Sum => {
            let a = operand(vertex, expr, wops, 0)?;
            let b = operand(vertex, expr, wops, 1)?;
            if a.len() != b.len() {
                return Err(mismatch(
                    vertex,
                    expr,
                    format!("summands decompose to {} and {} symbols", a.len(), b.len()),
                ));
            }
            a.iter()
                .zip(b.iter())
                .map(|(x, y)| Ok(Expr::sum(x.clone(), y.clone())?))
                .collect()
        }

        Operator::Product => {
            let a = operand(vertex, expr, wops, 0)?;
            let b = operand(vertex, expr, wops, 1)?;
            if a.len() == 1 {
                b.iter()
                    .map(|y| Ok(Expr::product(a[0].clone(), y.clone())?))
                    .collect()
            } else if b.len() == 1 {
                a.iter()
                    .map(|x| Ok(Expr::product(x.clone(), b[0].clone())?))
                    .collect()
            } else {
                // Index-space product: map the merged free-index space onto
                // each factor's own component space.
                let operands = expr.operands();
                let (ea, eb) = (&operands[0], &operands[1]);
                let out_fi = expr.free_indices();
                let out_dims = index::dims(out_fi);
                let a_fi = ea.free_indices();
                let b_fi = eb.free_indices();
                let a_dims = index::dims(a_fi);
                let b_dims = index::dims(b_fi);
                if a.len() != index::dims_product(a_fi) || b.len() != index::dims_product(b_fi) {
                    return Err(mismatch(
                        vertex,
                        expr,
                        "factor symbol counts do not match their index spaces".into(),
                    ));
                }
                let mut out = Vec::with_capacity(expr.component_count());
                for c in 0..expr.component_count() {
                    let values = unflatten_coords(c, &out_dims);
                    let fa = factor_offset(out_fi, &values, a_fi, &a_dims).ok_or_else(|| {
                        mismatch(
                            vertex,
                            expr,
                            "factor free index missing from the merged index space".into(),
                        )
                    })?;
                    let fb = factor_offset(out_fi, &values, b_fi, &b_dims).ok_or_else(|| {
                        mismatch(
                            vertex,
                            expr,
                            "factor free index missing from the merged index space".into(),
                        )
                    })?;
                    out.push(Expr::product(a[fa].clone(), b[fb].clone())?);
                }
                Ok(out)
            }
        }

        Operator::Division => {
            let a = operand(vertex, expr, wops, 0)?;
            let b = operand(vertex, expr, wops, 1)?;
            if b.len() != 1 {
                return Err(mismatch(
                    vertex,
                    expr,
                    format!("divisor decomposes to {} symbols, expected 1", b.len()),
                ));
            }
            a.iter()
                .map(|x| Ok(Expr::division(x.clone(), b[0].clone())?))
                .collect()
        }

        Operator::IndexSum { index: summed } => {
            let w = operand(vertex, expr, wops, 0)?;
            let operands = expr.operands();
            let inner = &operands[0];
            let fi = inner.free_indices();
            let ipos = index::position(fi, *summed).ok_or_else(|| {
                mismatch(
                    vertex,
                    expr,
                    format!("summed index {} is not free in the operand", summed),
                )
            })?;
            let d = fi[ipos].dim;
            let predim = inner.shape().component_count() * index::dims_product(&fi[..ipos]);
            let postdim = index::dims_product(&fi[ipos + 1..]);
            if w.len() != predim * d * postdim || d == 0 {
                return Err(mismatch(
                    vertex,
                    expr,
                    format!(
                        "operand decomposes to {} symbols, expected {}",
                        w.len(),
                        predim * d * postdim
                    ),
                ));
            }
            let mut out = Vec::with_capacity(predim * postdim);
            for p in 0..predim {
                for q in 0..postdim {
                    // Left-to-right fold over the summed axis.
                    let mut acc = w[p * d * postdim + q].clone();
                    for k in 1..d {
                        acc = Expr::sum(acc, w[(p * d + k) * postdim + q].clone())?;
                    }
                    out.push(acc);
                }
            }
            Ok(out)
        }

        Operator::Conditional => {
            let c = sole(vertex, expr, wops, 0)?;
            let t = operand(vertex, expr, wops, 1)?;
            let f = operand(vertex, expr, wops, 2)?;
            if t.len() != f.len() {
                return Err(mismatch(
                    vertex,
                    expr,
                    format!("branches decompose to {} and {} symbols", t.len(), f.len()),
                ));
            }
            t.iter()
                .zip(f.iter())
                .map(|(x, y)| Ok(Expr::conditional(c.clone(), x.clone(), y.clone())?))
                .collect()
        }

        Operator::Condition(kind) => {
            let a = sole(vertex, expr, wops, 0)?;
            let b = sole(vertex, expr, wops, 1)?;
            Ok(vec![Expr::condition(*kind, a.clone(), b.clone())?])
        }

        Operator::Conj => {
            let w = operand(vertex, expr, wops, 0)?;
            Ok(w.iter().map(|x| Expr::conj(x.clone())).collect())
        }

        Operator::Math(func) => {
            let x = sole(vertex, expr, wops, 0)?;
            Ok(vec![Expr::math(*func, x.clone())?])
        }
        Operator::Abs => {
            let x = sole(vertex, expr, wops, 0)?;
            Ok(vec![Expr::abs(x.clone())?])
        }
        Operator::Real => {
            let x = sole(vertex, expr, wops, 0)?;
            Ok(vec![Expr::real(x.clone())?])
        }
        Operator::Imag => {
            let x = sole(vertex, expr, wops, 0)?;
            Ok(vec![Expr::imag(x.clone())?])
        }
        Operator::Min => {
            let a = sole(vertex, expr, wops, 0)?;
            let b = sole(vertex, expr, wops, 1)?;
            Ok(vec![Expr::min(a.clone(), b.clone())?])
        }
        Operator::Max => {
            let a = sole(vertex, expr, wops, 0)?;
            let b = sole(vertex, expr, wops, 1)?;
            Ok(vec![Expr::max(a.clone(), b.clone())?])
        }
        Operator::Power => {
            let a = sole(vertex, expr, wops, 0)?;
            let b = sole(vertex, expr, wops, 1)?;
            Ok(vec![Expr::power(a.clone(), b.clone())?])
        }
        Operator::Atan2 => {
            let a = sole(vertex, expr, wops, 0)?;
            let b = sole(vertex, expr, wops, 1)?;
            Ok(vec![Expr::atan2(a.clone(), b.clone())?])
        }
        Operator::Bessel(kind) => {
            let a = sole(vertex, expr, wops, 0)?;
            let b = sole(vertex, expr, wops, 1)?;
            Ok(vec![Expr::bessel(*kind, a.clone(), b.clone())?])
        }
    }
}
