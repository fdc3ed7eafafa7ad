//! Immutable expression handles with structural identity.
//!
//! [`Expr`] is a cheap-to-clone handle (`Rc`) to one node of a symbolic
//! weak-form integrand. Nodes are immutable once built; checked constructors
//! infer the result shape and free-index list from the operands, so an
//! `Expr` that exists is algebraically well-formed apart from the
//! reconstruction-time preconditions (scalar divisor, matching branch
//! arities) that are only checkable against symbol counts.
//!
//! Structural equality and hashing drive subexpression deduplication: each
//! node carries a precomputed content hash folded over its operands' hashes,
//! so hash lookups are O(1) and equality short-circuits on pointer identity
//! for shared subtrees.

use std::collections::hash_map::DefaultHasher;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::rc::Rc;

use smallvec::{smallvec, SmallVec};

use crate::error::CoreError;
use crate::id::IndexId;
use crate::index::{self, FreeIndex, FreeIndices};
use crate::ops::{
    BesselKind, ComponentSel, ConditionKind, MathFunc, ModTerminal, Operator, Restriction,
    Terminal,
};
use crate::shape::Shape;

/// Handle to an immutable expression node.
#[derive(Debug, Clone)]
pub struct Expr(Rc<ExprData>);

#[derive(Debug)]
struct ExprData {
    op: Operator,
    operands: SmallVec<[Expr; 2]>,
    shape: Shape,
    free_indices: FreeIndices,
    hash: u64,
}

impl Drop for ExprData {
    fn drop(&mut self) {
        // Unwind sole-owner chains iteratively so deep expression trees
        // cannot overflow the stack on drop.
        let mut stack: Vec<Expr> = self.operands.drain(..).collect();
        while let Some(expr) = stack.pop() {
            if let Ok(mut data) = Rc::try_unwrap(expr.0) {
                stack.extend(data.operands.drain(..));
            }
        }
    }
}

fn content_hash(op: &Operator, operands: &[Expr], shape: &Shape, fi: &[FreeIndex]) -> u64 {
    let mut h = DefaultHasher::new();
    op.hash(&mut h);
    shape.hash(&mut h);
    fi.hash(&mut h);
    for operand in operands {
        h.write_u64(operand.0.hash);
    }
    h.finish()
}

impl PartialEq for Expr {
    fn eq(&self, other: &Self) -> bool {
        // Iterative comparison with an explicit pair stack: two deep twins
        // built without sharing must not exhaust the call stack, same as
        // traversal and drop.
        let mut stack: Vec<(&Expr, &Expr)> = vec![(self, other)];
        while let Some((a, b)) = stack.pop() {
            if Rc::ptr_eq(&a.0, &b.0) {
                continue;
            }
            if a.0.hash != b.0.hash
                || a.0.shape != b.0.shape
                || a.0.free_indices != b.0.free_indices
                || a.0.op != b.0.op
                || a.0.operands.len() != b.0.operands.len()
            {
                return false;
            }
            stack.extend(a.0.operands.iter().zip(b.0.operands.iter()));
        }
        true
    }
}

impl Eq for Expr {}

impl Hash for Expr {
    fn hash<H: Hasher>(&self, state: &mut H) {
        state.write_u64(self.0.hash);
    }
}

impl Expr {
    fn new(op: Operator, operands: SmallVec<[Expr; 2]>, shape: Shape, fi: FreeIndices) -> Expr {
        let hash = content_hash(&op, &operands, &shape, &fi);
        Expr(Rc::new(ExprData {
            op,
            operands,
            shape,
            free_indices: fi,
            hash,
        }))
    }

    // -----------------------------------------------------------------------
    // Accessors
    // -----------------------------------------------------------------------

    pub fn op(&self) -> &Operator {
        &self.0.op
    }

    pub fn operands(&self) -> &[Expr] {
        &self.0.operands
    }

    pub fn shape(&self) -> &Shape {
        &self.0.shape
    }

    pub fn free_indices(&self) -> &[FreeIndex] {
        &self.0.free_indices
    }

    /// Terminals and modified terminals are traversal-atomic leaves.
    pub fn is_terminal(&self) -> bool {
        self.0.op.is_terminal()
    }

    /// True scalars own exactly one component: empty shape, no free indices.
    pub fn is_true_scalar(&self) -> bool {
        self.0.shape.is_scalar() && self.0.free_indices.is_empty()
    }

    /// Number of flattened scalar components: product of shape dimensions
    /// times product of free-index dimensions.
    pub fn component_count(&self) -> usize {
        self.0.shape.component_count() * index::dims_product(&self.0.free_indices)
    }

    /// The terminal view of this node, if it is a (modified) terminal.
    pub fn as_mod_terminal(&self) -> Option<ModTerminal> {
        match &self.0.op {
            Operator::Terminal(t) => Some(ModTerminal::bare(t.clone())),
            Operator::ModTerminal(mt) => Some(mt.clone()),
            _ => None,
        }
    }

    // -----------------------------------------------------------------------
    // Terminal constructors
    // -----------------------------------------------------------------------

    /// A bare terminal node.
    pub fn terminal(terminal: Terminal) -> Expr {
        let shape = terminal.shape.clone();
        Expr::new(
            Operator::Terminal(terminal),
            SmallVec::new(),
            shape,
            FreeIndices::new(),
        )
    }

    /// A modified terminal node; infers shape and free indices from the
    /// qualifiers.
    pub fn modified(mt: ModTerminal) -> Result<Expr, CoreError> {
        let (shape, fi) = match &mt.component {
            Some(selection) => {
                mt.check_selection(selection)?;
                let dims = mt.effective_dims();
                let mut fi = FreeIndices::new();
                for (slot, dim) in selection.iter().zip(dims.iter()) {
                    if let ComponentSel::Free(id) = slot {
                        fi.push(FreeIndex {
                            id: *id,
                            dim: *dim,
                        });
                    }
                }
                (Shape::scalar(), index::canonicalize(fi, "modified terminal")?)
            }
            None => (Shape::tensor(&mt.effective_dims()), FreeIndices::new()),
        };
        Ok(Expr::new(
            Operator::ModTerminal(mt),
            SmallVec::new(),
            shape,
            fi,
        ))
    }

    /// Applies a component selection to a terminal-kind expression.
    pub fn select(&self, selection: &[ComponentSel]) -> Result<Expr, CoreError> {
        let mut mt = self.as_mod_terminal().ok_or(CoreError::ShapeMismatch {
            op: "modified terminal",
            reason: "component selection applies only to terminals".into(),
        })?;
        if mt.component.is_some() {
            return Err(CoreError::ShapeMismatch {
                op: "modified terminal",
                reason: format!("'{}' already carries a component selection", mt.terminal.name),
            });
        }
        mt.component = Some(SmallVec::from_slice(selection));
        Expr::modified(mt)
    }

    /// Selects one fixed component.
    pub fn component(&self, coords: &[usize]) -> Result<Expr, CoreError> {
        let selection: SmallVec<[ComponentSel; 2]> =
            coords.iter().map(|&c| ComponentSel::Fixed(c)).collect();
        self.select(&selection)
    }

    /// Appends a differentiation axis of dimension `dim` (spatial gradient).
    pub fn grad(&self, dim: usize) -> Result<Expr, CoreError> {
        let mut mt = self.as_mod_terminal().ok_or(CoreError::ShapeMismatch {
            op: "modified terminal",
            reason: "differentiation applies only to terminals here".into(),
        })?;
        if mt.component.is_some() {
            return Err(CoreError::ShapeMismatch {
                op: "modified terminal",
                reason: "cannot differentiate a component-selected terminal".into(),
            });
        }
        mt.gradient.push(dim);
        Expr::modified(mt)
    }

    /// Applies a facet restriction.
    pub fn restrict(&self, restriction: Restriction) -> Result<Expr, CoreError> {
        let mut mt = self.as_mod_terminal().ok_or(CoreError::ShapeMismatch {
            op: "modified terminal",
            reason: "restriction applies only to terminals".into(),
        })?;
        mt.restriction = Some(restriction);
        Expr::modified(mt)
    }

    // -----------------------------------------------------------------------
    // Compound constructors
    // -----------------------------------------------------------------------

    /// Elementwise addition; operands agree on shape and free indices.
    pub fn sum(a: Expr, b: Expr) -> Result<Expr, CoreError> {
        if a.shape() != b.shape() {
            return Err(CoreError::ShapeMismatch {
                op: "sum",
                reason: format!("operand shapes {} and {} differ", a.shape(), b.shape()),
            });
        }
        if a.free_indices() != b.free_indices() {
            return Err(CoreError::IndexMismatch {
                op: "sum",
                reason: "operands carry different free indices".into(),
            });
        }
        let shape = a.shape().clone();
        let fi = a.0.free_indices.clone();
        Ok(Expr::new(
            Operator::Sum,
            SmallVec::from_buf([a, b]),
            shape,
            fi,
        ))
    }

    /// Multiplication. A true-scalar operand broadcasts over the other;
    /// otherwise both operands must be shapeless (index-carrying) and the
    /// result spans the union of their free indices. Never contracts.
    pub fn product(a: Expr, b: Expr) -> Result<Expr, CoreError> {
        let (shape, fi) = if a.is_true_scalar() {
            (b.shape().clone(), b.0.free_indices.clone())
        } else if b.is_true_scalar() {
            (a.shape().clone(), a.0.free_indices.clone())
        } else if a.shape().is_scalar() && b.shape().is_scalar() {
            (
                Shape::scalar(),
                index::merge(a.free_indices(), b.free_indices(), "product")?,
            )
        } else {
            return Err(CoreError::ShapeMismatch {
                op: "product",
                reason: format!(
                    "operands of shapes {} and {} cannot be multiplied without an explicit index sum",
                    a.shape(),
                    b.shape()
                ),
            });
        };
        Ok(Expr::new(
            Operator::Product,
            SmallVec::from_buf([a, b]),
            shape,
            fi,
        ))
    }

    /// Division; the divisor must be shapeless. (A free-index-carrying
    /// divisor still fails at scalar reconstruction, which requires exactly
    /// one divisor symbol.)
    pub fn division(a: Expr, b: Expr) -> Result<Expr, CoreError> {
        if !b.shape().is_scalar() {
            return Err(CoreError::ShapeMismatch {
                op: "division",
                reason: format!("divisor has shape {}", b.shape()),
            });
        }
        let shape = a.shape().clone();
        let fi = index::merge(a.free_indices(), b.free_indices(), "division")?;
        Ok(Expr::new(
            Operator::Division,
            SmallVec::from_buf([a, b]),
            shape,
            fi,
        ))
    }

    /// Explicit summation over one repeated index of the operand.
    pub fn index_sum(a: Expr, idx: IndexId) -> Result<Expr, CoreError> {
        let fi = index::remove(a.free_indices(), idx, "index sum")?;
        let shape = a.shape().clone();
        Ok(Expr::new(
            Operator::IndexSum { index: idx },
            smallvec![a],
            shape,
            fi,
        ))
    }

    /// `condition ? t : f`; the condition is a true scalar, branches agree
    /// on shape and free indices.
    pub fn conditional(cond: Expr, t: Expr, f: Expr) -> Result<Expr, CoreError> {
        if !cond.is_true_scalar() {
            return Err(CoreError::ShapeMismatch {
                op: "conditional",
                reason: "condition must be a true scalar".into(),
            });
        }
        if t.shape() != f.shape() {
            return Err(CoreError::ShapeMismatch {
                op: "conditional",
                reason: format!("branch shapes {} and {} differ", t.shape(), f.shape()),
            });
        }
        if t.free_indices() != f.free_indices() {
            return Err(CoreError::IndexMismatch {
                op: "conditional",
                reason: "branches carry different free indices".into(),
            });
        }
        let shape = t.shape().clone();
        let fi = t.0.free_indices.clone();
        let mut operands = SmallVec::new();
        operands.push(cond);
        operands.push(t);
        operands.push(f);
        Ok(Expr::new(Operator::Conditional, operands, shape, fi))
    }

    /// Scalar comparison / logical combination.
    pub fn condition(kind: ConditionKind, a: Expr, b: Expr) -> Result<Expr, CoreError> {
        require_true_scalar(&a, "condition")?;
        require_true_scalar(&b, "condition")?;
        Ok(Expr::new(
            Operator::Condition(kind),
            SmallVec::from_buf([a, b]),
            Shape::scalar(),
            FreeIndices::new(),
        ))
    }

    /// Elementwise complex conjugate.
    pub fn conj(a: Expr) -> Expr {
        let shape = a.shape().clone();
        let fi = a.0.free_indices.clone();
        let mut operands = SmallVec::new();
        operands.push(a);
        Expr::new(Operator::Conj, operands, shape, fi)
    }

    /// Unary scalar math function.
    pub fn math(func: MathFunc, x: Expr) -> Result<Expr, CoreError> {
        Expr::scalar_op(Operator::Math(func), smallvec![x])
    }

    pub fn abs(x: Expr) -> Result<Expr, CoreError> {
        Expr::scalar_op(Operator::Abs, smallvec![x])
    }

    pub fn real(x: Expr) -> Result<Expr, CoreError> {
        Expr::scalar_op(Operator::Real, smallvec![x])
    }

    pub fn imag(x: Expr) -> Result<Expr, CoreError> {
        Expr::scalar_op(Operator::Imag, smallvec![x])
    }

    pub fn min(a: Expr, b: Expr) -> Result<Expr, CoreError> {
        Expr::scalar_op(Operator::Min, SmallVec::from_buf([a, b]))
    }

    pub fn max(a: Expr, b: Expr) -> Result<Expr, CoreError> {
        Expr::scalar_op(Operator::Max, SmallVec::from_buf([a, b]))
    }

    pub fn power(base: Expr, exponent: Expr) -> Result<Expr, CoreError> {
        Expr::scalar_op(Operator::Power, SmallVec::from_buf([base, exponent]))
    }

    pub fn atan2(y: Expr, x: Expr) -> Result<Expr, CoreError> {
        Expr::scalar_op(Operator::Atan2, SmallVec::from_buf([y, x]))
    }

    pub fn bessel(kind: BesselKind, nu: Expr, x: Expr) -> Result<Expr, CoreError> {
        Expr::scalar_op(Operator::Bessel(kind), SmallVec::from_buf([nu, x]))
    }

    fn scalar_op(op: Operator, operands: SmallVec<[Expr; 2]>) -> Result<Expr, CoreError> {
        for operand in &operands {
            require_true_scalar(operand, op.kind_name())?;
        }
        Ok(Expr::new(op, operands, Shape::scalar(), FreeIndices::new()))
    }

    // -----------------------------------------------------------------------
    // Rebuild (the "same operator, new operands" contract)
    // -----------------------------------------------------------------------

    /// Rebuilds this node's operator over new operands, re-running shape and
    /// index inference. Scalar reconstruction uses this to re-express each
    /// operator over scalar operand forms. Rebuilding a terminal with no
    /// operands returns the terminal itself.
    pub fn rebuild_with_operands(&self, ops: Vec<Expr>) -> Result<Expr, CoreError> {
        let arity_err = |expected: usize| CoreError::ArityMismatch {
            op: self.0.op.kind_name(),
            expected,
            actual: ops.len(),
        };
        match (&self.0.op, ops.as_slice()) {
            (Operator::Terminal(_) | Operator::ModTerminal(_), []) => Ok(self.clone()),
            (Operator::Sum, [a, b]) => Expr::sum(a.clone(), b.clone()),
            (Operator::Product, [a, b]) => Expr::product(a.clone(), b.clone()),
            (Operator::Division, [a, b]) => Expr::division(a.clone(), b.clone()),
            (Operator::IndexSum { index }, [a]) => Expr::index_sum(a.clone(), *index),
            (Operator::Conditional, [c, t, f]) => {
                Expr::conditional(c.clone(), t.clone(), f.clone())
            }
            (Operator::Condition(kind), [a, b]) => Expr::condition(*kind, a.clone(), b.clone()),
            (Operator::Conj, [a]) => Ok(Expr::conj(a.clone())),
            (Operator::Math(func), [a]) => Expr::math(*func, a.clone()),
            (Operator::Abs, [a]) => Expr::abs(a.clone()),
            (Operator::Real, [a]) => Expr::real(a.clone()),
            (Operator::Imag, [a]) => Expr::imag(a.clone()),
            (Operator::Min, [a, b]) => Expr::min(a.clone(), b.clone()),
            (Operator::Max, [a, b]) => Expr::max(a.clone(), b.clone()),
            (Operator::Power, [a, b]) => Expr::power(a.clone(), b.clone()),
            (Operator::Atan2, [a, b]) => Expr::atan2(a.clone(), b.clone()),
            (Operator::Bessel(kind), [a, b]) => Expr::bessel(*kind, a.clone(), b.clone()),
            (op, _) => {
                let expected = match op {
                    Operator::Terminal(_) | Operator::ModTerminal(_) => 0,
                    Operator::IndexSum { .. }
                    | Operator::Conj
                    | Operator::Math(_)
                    | Operator::Abs
                    | Operator::Real
                    | Operator::Imag => 1,
                    Operator::Conditional => 3,
                    _ => 2,
                };
                Err(arity_err(expected))
            }
        }
    }
}

fn require_true_scalar(e: &Expr, op: &'static str) -> Result<(), CoreError> {
    if !e.is_true_scalar() {
        return Err(CoreError::ShapeMismatch {
            op,
            reason: format!(
                "operand has shape {} and {} free indices, expected a true scalar",
                e.shape(),
                e.free_indices().len()
            ),
        });
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Display
// ---------------------------------------------------------------------------

fn is_infix(e: &Expr) -> bool {
    matches!(
        e.op(),
        Operator::Sum | Operator::Product | Operator::Division | Operator::Condition(_)
    )
}

fn fmt_operand(e: &Expr, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    if is_infix(e) {
        write!(f, "({})", e)
    } else {
        write!(f, "{}", e)
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let ops = self.operands();
        match self.op() {
            Operator::Terminal(t) => write!(f, "{}", t.name),
            Operator::ModTerminal(mt) => {
                let mut rendered = mt.terminal.name.clone();
                if let Some(r) = mt.restriction {
                    rendered = format!("{}('{}')", rendered, r.symbol());
                }
                for _ in &mt.gradient {
                    rendered = format!("grad({})", rendered);
                }
                write!(f, "{}", rendered)?;
                if let Some(selection) = &mt.component {
                    write!(f, "[")?;
                    for (n, slot) in selection.iter().enumerate() {
                        if n > 0 {
                            write!(f, ", ")?;
                        }
                        match slot {
                            ComponentSel::Fixed(c) => write!(f, "{}", c)?,
                            ComponentSel::Free(id) => write!(f, "{}", id)?,
                        }
                    }
                    write!(f, "]")?;
                }
                Ok(())
            }
            Operator::Sum => {
                fmt_operand(&ops[0], f)?;
                write!(f, " + ")?;
                fmt_operand(&ops[1], f)
            }
            Operator::Product => {
                fmt_operand(&ops[0], f)?;
                write!(f, " * ")?;
                fmt_operand(&ops[1], f)
            }
            Operator::Division => {
                fmt_operand(&ops[0], f)?;
                write!(f, " / ")?;
                fmt_operand(&ops[1], f)
            }
            Operator::IndexSum { index } => write!(f, "sum_{}({})", index, ops[0]),
            Operator::Conditional => {
                write!(f, "({} ? {} : {})", ops[0], ops[1], ops[2])
            }
            Operator::Condition(kind) => {
                fmt_operand(&ops[0], f)?;
                write!(f, " {} ", kind.symbol())?;
                fmt_operand(&ops[1], f)
            }
            op => {
                // Function-call rendering for conj and the scalar n-ary kinds.
                write!(f, "{}(", op.kind_name())?;
                for (n, operand) in ops.iter().enumerate() {
                    if n > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", operand)?;
                }
                write!(f, ")")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ops::ComponentSel::{Fixed, Free};

    fn scalar(name: &str) -> Expr {
        Expr::terminal(Terminal::scalar(name))
    }

    #[test]
    fn structural_equality_collapses_duplicates() {
        let a1 = Expr::sum(scalar("a"), scalar("b")).unwrap();
        let a2 = Expr::sum(scalar("a"), scalar("b")).unwrap();
        assert_eq!(a1, a2);

        use std::collections::HashSet;
        let mut set = HashSet::new();
        set.insert(a1);
        assert!(set.contains(&a2));
    }

    #[test]
    fn different_structure_differs() {
        let ab = Expr::sum(scalar("a"), scalar("b")).unwrap();
        let ba = Expr::sum(scalar("b"), scalar("a")).unwrap();
        assert_ne!(ab, ba);
    }

    #[test]
    fn sum_requires_matching_shapes() {
        let u = Expr::terminal(Terminal::vector("u", 3));
        let c = scalar("c");
        assert!(matches!(
            Expr::sum(u, c),
            Err(CoreError::ShapeMismatch { op: "sum", .. })
        ));
    }

    #[test]
    fn product_broadcasts_scalar() {
        let c = scalar("c");
        let w = Expr::terminal(Terminal::vector("w", 3));
        let p = Expr::product(c, w).unwrap();
        assert_eq!(p.shape().dims(), &[3]);
        assert_eq!(p.component_count(), 3);
    }

    #[test]
    fn product_of_shaped_operands_is_rejected() {
        let u = Expr::terminal(Terminal::vector("u", 3));
        let v = Expr::terminal(Terminal::vector("v", 3));
        assert!(matches!(
            Expr::product(u, v),
            Err(CoreError::ShapeMismatch { op: "product", .. })
        ));
    }

    #[test]
    fn product_merges_free_indices() {
        let i = IndexId(0);
        let j = IndexId(1);
        let u = Expr::terminal(Terminal::vector("u", 3))
            .select(&[Free(i)])
            .unwrap();
        let v = Expr::terminal(Terminal::vector("v", 2))
            .select(&[Free(j)])
            .unwrap();
        let p = Expr::product(u, v).unwrap();
        assert_eq!(p.free_indices().len(), 2);
        assert_eq!(p.component_count(), 6);
    }

    #[test]
    fn index_sum_removes_the_summed_index() {
        let i = IndexId(0);
        let s = Expr::terminal(Terminal::vector("s", 3))
            .select(&[Free(i)])
            .unwrap();
        assert_eq!(s.component_count(), 3);
        let total = Expr::index_sum(s, i).unwrap();
        assert!(total.is_true_scalar());
        assert_eq!(total.component_count(), 1);
    }

    #[test]
    fn index_sum_over_missing_index_errors() {
        let s = scalar("s");
        assert!(matches!(
            Expr::index_sum(s, IndexId(7)),
            Err(CoreError::IndexMismatch { .. })
        ));
    }

    #[test]
    fn component_selection_shapes() {
        let t = Expr::terminal(Terminal::matrix("T", 2, 3));
        let t01 = t.component(&[0, 1]).unwrap();
        assert!(t01.is_true_scalar());

        let i = IndexId(4);
        let row = t.select(&[Fixed(0), Free(i)]).unwrap();
        assert!(row.shape().is_scalar());
        assert_eq!(row.free_indices(), &[FreeIndex { id: i, dim: 3 }]);
    }

    #[test]
    fn gradient_appends_axis() {
        let u = Expr::terminal(Terminal::scalar("u"));
        let g = u.grad(3).unwrap();
        assert_eq!(g.shape().dims(), &[3]);
        let g0 = g.component(&[0]).unwrap();
        assert!(g0.is_true_scalar());
    }

    #[test]
    fn division_requires_shapeless_divisor() {
        let u = scalar("u");
        let w = Expr::terminal(Terminal::vector("w", 2));
        assert!(matches!(
            Expr::division(u, w),
            Err(CoreError::ShapeMismatch { op: "division", .. })
        ));
    }

    #[test]
    fn division_permits_indexed_divisor() {
        // Shape-legal but rejected later by scalar reconstruction, which
        // requires a single divisor symbol.
        let i = IndexId(0);
        let v = Expr::terminal(Terminal::vector("v", 2))
            .select(&[Free(i)])
            .unwrap();
        let d = Expr::division(scalar("u"), v).unwrap();
        assert_eq!(d.component_count(), 2);
    }

    #[test]
    fn conditional_checks_branches() {
        let c = Expr::condition(ConditionKind::Lt, scalar("a"), scalar("b")).unwrap();
        let t = Expr::terminal(Terminal::vector("t", 2));
        let f = Expr::terminal(Terminal::vector("f", 3));
        assert!(matches!(
            Expr::conditional(c, t, f),
            Err(CoreError::ShapeMismatch { .. })
        ));
    }

    #[test]
    fn rebuild_with_operands_reuses_the_operator() {
        let s = Expr::sum(scalar("a"), scalar("b")).unwrap();
        let rebuilt = s
            .rebuild_with_operands(vec![scalar("x"), scalar("y")])
            .unwrap();
        assert_eq!(rebuilt.op(), &Operator::Sum);
        assert_eq!(rebuilt.to_string(), "x + y");
    }

    #[test]
    fn rebuild_checks_arity() {
        let s = Expr::sum(scalar("a"), scalar("b")).unwrap();
        assert!(matches!(
            s.rebuild_with_operands(vec![scalar("x")]),
            Err(CoreError::ArityMismatch {
                expected: 2,
                actual: 1,
                ..
            })
        ));
    }

    #[test]
    fn rebuild_terminal_returns_itself() {
        let a = scalar("a");
        let rebuilt = a.rebuild_with_operands(vec![]).unwrap();
        assert_eq!(a, rebuilt);
    }

    #[test]
    fn display_forms() {
        let u = Expr::terminal(Terminal::vector("u", 3));
        let u0 = u.component(&[0]).unwrap();
        let v0 = Expr::terminal(Terminal::vector("v", 3)).component(&[0]).unwrap();
        let s = Expr::sum(u0.clone(), v0).unwrap();
        assert_eq!(s.to_string(), "u[0] + v[0]");

        let p = Expr::product(scalar("c"), u0).unwrap();
        assert_eq!(p.to_string(), "c * u[0]");

        let sin = Expr::math(MathFunc::Sin, scalar("x")).unwrap();
        assert_eq!(sin.to_string(), "sin(x)");

        let cond = Expr::condition(ConditionKind::Lt, scalar("a"), scalar("b")).unwrap();
        let pick = Expr::conditional(cond, scalar("t"), scalar("f")).unwrap();
        assert_eq!(pick.to_string(), "(a < b ? t : f)");
    }

    #[test]
    fn display_parenthesizes_infix_operands() {
        let s = Expr::sum(scalar("a"), scalar("b")).unwrap();
        let p = Expr::product(s, scalar("c")).unwrap();
        assert_eq!(p.to_string(), "(a + b) * c");
    }

    #[test]
    fn deep_chain_builds_and_drops_without_overflow() {
        let mut e = scalar("x");
        for _ in 0..100_000 {
            e = Expr::conj(e);
        }
        assert_eq!(e.component_count(), 1);
        drop(e);
    }

    #[test]
    fn deep_unshared_twins_compare_without_overflow() {
        // Two structurally identical chains built independently share no Rc
        // nodes, so equality has to walk the full depth.
        let build = |leaf: &str| {
            let mut e = scalar(leaf);
            for _ in 0..100_000 {
                e = Expr::conj(e);
            }
            e
        };
        let a = build("x");
        let b = build("x");
        assert_eq!(a, b);

        let c = build("y");
        assert_ne!(a, c);
    }
}
