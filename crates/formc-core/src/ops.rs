//! Operator vocabulary for weak-form integrand expressions.
//!
//! Defines the closed [`Operator`] enum plus its grouped sub-enums. The set
//! is fixed: terminals, modified terminals (terminals wrapped in atomic leaf
//! qualifiers), the n-ary/binary compound operators, and the scalar
//! elementwise functions. Scalar decomposition dispatches on this enum with
//! exhaustive matching, so adding a variant is a compile-visible change.
//!
//! # Design: qualifiers as fields, not operands
//!
//! Modified terminals are traversal-atomic: restriction, differentiation,
//! and component selection live inside [`ModTerminal`] rather than as child
//! nodes. Likewise the summed label of an index-sum is a field of
//! [`Operator::IndexSum`]. The expression tree therefore contains only
//! value-carrying nodes and the unique indexer never has to skip
//! placeholders.

use std::fmt;

use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

use crate::error::CoreError;
use crate::id::IndexId;
use crate::shape::Shape;

// ---------------------------------------------------------------------------
// Sub-enums for grouped operations
// ---------------------------------------------------------------------------

/// Elementwise scalar math functions (unary).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MathFunc {
    Sin,
    Cos,
    Tan,
    Asin,
    Acos,
    Atan,
    Sinh,
    Cosh,
    Tanh,
    Exp,
    Ln,
    Sqrt,
    Erf,
}

impl MathFunc {
    pub fn name(self) -> &'static str {
        match self {
            MathFunc::Sin => "sin",
            MathFunc::Cos => "cos",
            MathFunc::Tan => "tan",
            MathFunc::Asin => "asin",
            MathFunc::Acos => "acos",
            MathFunc::Atan => "atan",
            MathFunc::Sinh => "sinh",
            MathFunc::Cosh => "cosh",
            MathFunc::Tanh => "tanh",
            MathFunc::Exp => "exp",
            MathFunc::Ln => "ln",
            MathFunc::Sqrt => "sqrt",
            MathFunc::Erf => "erf",
        }
    }
}

/// Bessel function families (first and second kind).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BesselKind {
    J,
    Y,
}

/// Condition operators. Relational kinds compare two scalar values; `And`
/// and `Or` combine two conditions. All are scalar-valued.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ConditionKind {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    And,
    Or,
}

impl ConditionKind {
    pub fn symbol(self) -> &'static str {
        match self {
            ConditionKind::Eq => "==",
            ConditionKind::Ne => "!=",
            ConditionKind::Lt => "<",
            ConditionKind::Le => "<=",
            ConditionKind::Gt => ">",
            ConditionKind::Ge => ">=",
            ConditionKind::And => "&&",
            ConditionKind::Or => "||",
        }
    }
}

/// Facet restriction qualifier for terminals evaluated on interior facets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Restriction {
    Positive,
    Negative,
}

impl Restriction {
    pub fn symbol(self) -> &'static str {
        match self {
            Restriction::Positive => "+",
            Restriction::Negative => "-",
        }
    }
}

// ---------------------------------------------------------------------------
// Terminals and modified terminals
// ---------------------------------------------------------------------------

/// A terminal value: a named coefficient/argument with a declared shape.
///
/// `symmetric` declares rank-2 symmetry (`t[i,j] == t[j,i]`); the value
/// numberer uses it to alias mirrored components. It is only meaningful for
/// rank-2 terminals.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Terminal {
    pub name: String,
    pub shape: Shape,
    pub symmetric: bool,
}

impl Terminal {
    pub fn new(name: impl Into<String>, shape: Shape) -> Self {
        Terminal {
            name: name.into(),
            shape,
            symmetric: false,
        }
    }

    pub fn scalar(name: impl Into<String>) -> Self {
        Terminal::new(name, Shape::scalar())
    }

    pub fn vector(name: impl Into<String>, dim: usize) -> Self {
        Terminal::new(name, Shape::vector(dim))
    }

    pub fn matrix(name: impl Into<String>, rows: usize, cols: usize) -> Self {
        Terminal::new(name, Shape::matrix(rows, cols))
    }

    /// A symmetric rank-2 terminal.
    pub fn symmetric_matrix(name: impl Into<String>, dim: usize) -> Self {
        Terminal {
            name: name.into(),
            shape: Shape::matrix(dim, dim),
            symmetric: true,
        }
    }
}

/// One slot of a component selection: a fixed coordinate or a free index
/// label ranging over the axis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ComponentSel {
    Fixed(usize),
    Free(IndexId),
}

/// A terminal combined with atomic leaf qualifiers: facet restriction,
/// spatial differentiation (each application appends one axis), and
/// component selection. Treated as one traversal-atomic node.
///
/// A selection, when present, covers every effective axis (base shape plus
/// gradient axes); the node's own shape is then empty and its free indices
/// are the `Free` slots.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ModTerminal {
    pub terminal: Terminal,
    pub restriction: Option<Restriction>,
    /// Dimensions of axes appended by differentiation, outermost application
    /// last (`grad(grad(u))` pushes twice).
    pub gradient: SmallVec<[usize; 1]>,
    pub component: Option<SmallVec<[ComponentSel; 2]>>,
}

impl ModTerminal {
    /// Wraps a bare terminal with no qualifiers.
    pub fn bare(terminal: Terminal) -> Self {
        ModTerminal {
            terminal,
            restriction: None,
            gradient: SmallVec::new(),
            component: None,
        }
    }

    /// Effective axis dimensions: base shape axes followed by gradient axes.
    pub fn effective_dims(&self) -> SmallVec<[usize; 4]> {
        let mut dims: SmallVec<[usize; 4]> = SmallVec::from_slice(self.terminal.shape.dims());
        dims.extend(self.gradient.iter().copied());
        dims
    }

    /// The same terminal with the component selection stripped. This is the
    /// cache identity used by value numbering: two selections of the same
    /// restricted/differentiated terminal denote components of one value.
    pub fn base(&self) -> ModTerminal {
        ModTerminal {
            terminal: self.terminal.clone(),
            restriction: self.restriction,
            gradient: self.gradient.clone(),
            component: None,
        }
    }

    /// Canonicalizes a full coordinate under the terminal's declared
    /// symmetry: for symmetric rank-2 terminals the two base-axis
    /// coordinates are sorted ascending. Gradient axes are untouched.
    pub fn canonicalize_coords(&self, coords: &mut [usize]) {
        if self.terminal.symmetric && self.terminal.shape.rank() == 2 && coords.len() >= 2 {
            if coords[0] > coords[1] {
                coords.swap(0, 1);
            }
        }
    }

    /// Validates a component selection against the effective axes.
    pub fn check_selection(&self, selection: &[ComponentSel]) -> Result<(), CoreError> {
        let dims = self.effective_dims();
        if selection.len() != dims.len() {
            return Err(CoreError::IndexMismatch {
                op: "modified terminal",
                reason: format!(
                    "selection has {} slots but '{}' has {} axes",
                    selection.len(),
                    self.terminal.name,
                    dims.len()
                ),
            });
        }
        for (slot, dim) in selection.iter().zip(dims.iter()) {
            if let ComponentSel::Fixed(c) = slot {
                if c >= dim {
                    return Err(CoreError::ShapeMismatch {
                        op: "modified terminal",
                        reason: format!(
                            "component {} out of range for axis of dimension {} of '{}'",
                            c, dim, self.terminal.name
                        ),
                    });
                }
            }
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// The closed operator enum
// ---------------------------------------------------------------------------

/// Operator kind of an expression node.
///
/// Scalar decomposition dispatches on this enum; the scalar n-ary kinds
/// (`Math`, `Abs`, `Min`, `Max`, `Real`, `Imag`, `Power`, `Atan2`, `Bessel`)
/// all share one reconstruction rule.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Operator {
    /// A bare terminal value.
    Terminal(Terminal),
    /// A terminal with leaf qualifiers (restriction, differentiation,
    /// component selection).
    ModTerminal(ModTerminal),
    /// Elementwise binary addition; operands agree on shape and indices.
    Sum,
    /// Binary multiplication; scalar broadcast or index-space product.
    /// Never sums: contraction is an explicit [`Operator::IndexSum`] above.
    Product,
    /// Division by a true scalar.
    Division,
    /// Explicit summation over one repeated index of the operand.
    IndexSum { index: IndexId },
    /// `condition ? true_value : false_value`.
    Conditional,
    /// Scalar comparison or logical combination.
    Condition(ConditionKind),
    /// Complex conjugate, elementwise.
    Conj,
    /// Elementwise unary math function.
    Math(MathFunc),
    Abs,
    Min,
    Max,
    Real,
    Imag,
    /// `pow(base, exponent)`, both scalar.
    Power,
    /// `atan2(y, x)`, both scalar.
    Atan2,
    /// `bessel(nu, x)`, both scalar.
    Bessel(BesselKind),
}

impl Operator {
    /// Short name of the operator kind, used in diagnostics and exports.
    pub fn kind_name(&self) -> &'static str {
        match self {
            Operator::Terminal(_) => "terminal",
            Operator::ModTerminal(_) => "modified terminal",
            Operator::Sum => "sum",
            Operator::Product => "product",
            Operator::Division => "division",
            Operator::IndexSum { .. } => "index sum",
            Operator::Conditional => "conditional",
            Operator::Condition(_) => "condition",
            Operator::Conj => "conj",
            Operator::Math(f) => f.name(),
            Operator::Abs => "abs",
            Operator::Min => "min",
            Operator::Max => "max",
            Operator::Real => "real",
            Operator::Imag => "imag",
            Operator::Power => "pow",
            Operator::Atan2 => "atan2",
            Operator::Bessel(BesselKind::J) => "bessel_j",
            Operator::Bessel(BesselKind::Y) => "bessel_y",
        }
    }

    /// Terminals and modified terminals are traversal-atomic leaves.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Operator::Terminal(_) | Operator::ModTerminal(_))
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.kind_name())
    }
}
