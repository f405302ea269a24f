//! AST node definitions.

use std::fmt;
use std::rc::Rc;

use calc4_util::Number;

use crate::context::OperatorDefinition;

/// Kind of a binary operator.
///
/// Comparisons evaluate to 0 or 1. `LogicalAnd` and `LogicalOr`
/// short-circuit: the right operand is not evaluated when the left one
/// decides the result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BinaryOp {
    Add,
    Sub,
    Mult,
    Div,
    Mod,
    Equal,
    NotEqual,
    LessThan,
    LessThanOrEqual,
    GreaterThanOrEqual,
    GreaterThan,
    LogicalAnd,
    LogicalOr,
}

/// A node of the Calc4 expression tree.
///
/// The tree is immutable; passes that transform it build a new tree,
/// reusing unchanged subtrees through the shared `Rc` handles.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Expr<N: Number> {
    /// The constant 0.
    Zero,

    /// A literal value of the program's number type, produced by the
    /// constant-folding pass.
    Precomputed { value: N },

    /// The i-th argument of the enclosing user-defined operator.
    Operand { index: usize },

    /// The value of a definition expression (always 0).
    Define,

    /// Read of a named variable.
    LoadVariable { name: String },

    /// Write of a named variable; the expression's value is the stored
    /// value.
    StoreVariable { operand: Rc<Expr<N>>, name: String },

    /// Read of a global-array cell.
    LoadArray { index: Rc<Expr<N>> },

    /// Write of a global-array cell; the expression's value is the
    /// stored value.
    StoreArray {
        value: Rc<Expr<N>>,
        index: Rc<Expr<N>>,
    },

    /// Prints the operand's low byte; evaluates to 0.
    PrintChar { character: Rc<Expr<N>> },

    /// Reads one byte of input (-1 at end of input).
    Input,

    /// `operand * 10 + digit`; fuses a digit sequence into a literal.
    Decimal { operand: Rc<Expr<N>>, digit: i32 },

    /// Sequences expressions; the value is the last child's value, or 0
    /// when empty.
    Parenthesis { exprs: Vec<Rc<Expr<N>>> },

    /// Binary operation, left operand evaluated first.
    Binary {
        left: Rc<Expr<N>>,
        right: Rc<Expr<N>>,
        op: BinaryOp,
    },

    /// Ternary conditional: a non-zero condition selects `if_true`.
    Conditional {
        condition: Rc<Expr<N>>,
        if_true: Rc<Expr<N>>,
        if_false: Rc<Expr<N>>,
    },

    /// Call of a user-defined operator. `is_tail_call` is metadata added
    /// by the optimizer; `None` means the marking pass has not run.
    UserDefined {
        definition: OperatorDefinition,
        operands: Vec<Rc<Expr<N>>>,
        is_tail_call: Option<bool>,
    },
}

impl<N: Number> Expr<N> {
    /// Direct child subtrees, in evaluation order.
    pub fn children(&self) -> Vec<Rc<Expr<N>>> {
        match self {
            Expr::Zero
            | Expr::Precomputed { .. }
            | Expr::Operand { .. }
            | Expr::Define
            | Expr::LoadVariable { .. }
            | Expr::Input => Vec::new(),
            Expr::StoreVariable { operand, .. } => vec![operand.clone()],
            Expr::LoadArray { index } => vec![index.clone()],
            Expr::StoreArray { value, index } => vec![value.clone(), index.clone()],
            Expr::PrintChar { character } => vec![character.clone()],
            Expr::Decimal { operand, .. } => vec![operand.clone()],
            Expr::Parenthesis { exprs } => exprs.clone(),
            Expr::Binary { left, right, .. } => vec![left.clone(), right.clone()],
            Expr::Conditional {
                condition,
                if_true,
                if_false,
            } => vec![condition.clone(), if_true.clone(), if_false.clone()],
            Expr::UserDefined { operands, .. } => operands.clone(),
        }
    }
}

impl<N: Number> fmt::Display for Expr<N> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expr::Zero => write!(f, "Zero []"),
            Expr::Precomputed { value } => write!(f, "Precomputed [value = {}]", value),
            Expr::Operand { index } => write!(f, "Operand [index = {}]", index),
            Expr::Define => write!(f, "Define []"),
            Expr::LoadVariable { name } => write!(f, "LoadVariable [name = \"{}\"]", name),
            Expr::StoreVariable { name, .. } => {
                write!(f, "StoreVariable [name = \"{}\"]", name)
            }
            Expr::LoadArray { .. } => write!(f, "LoadArray []"),
            Expr::StoreArray { .. } => write!(f, "StoreArray []"),
            Expr::PrintChar { .. } => write!(f, "PrintChar []"),
            Expr::Input => write!(f, "Input []"),
            Expr::Decimal { digit, .. } => write!(f, "Decimal [digit = {}]", digit),
            Expr::Parenthesis { exprs } => {
                write!(f, "Parenthesis [{} operators]", exprs.len())
            }
            Expr::Binary { op, .. } => write!(f, "Binary [type = {:?}]", op),
            Expr::Conditional { .. } => write!(f, "Conditional []"),
            Expr::UserDefined {
                definition,
                is_tail_call,
                ..
            } => {
                let tail = match is_tail_call {
                    Some(true) => "True",
                    Some(false) => "False",
                    None => "Unknown",
                };
                write!(
                    f,
                    "UserDefined [name = {}, numOperands = {}, isTailCall = {}]",
                    definition.name(),
                    definition.num_operands(),
                    tail
                )
            }
        }
    }
}
