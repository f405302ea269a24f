//! Constant-folding pass.

use std::rc::Rc;

use calc4_ast::{BinaryOp, Expr};
use calc4_util::Number;

/// Replaces subtrees that evaluate to a known literal with
/// `Precomputed` nodes.
///
/// Folding rules:
///
/// - `Zero` and `Define` collapse to `Precomputed(0)`;
/// - `Decimal(Precomputed(v), d)` folds to `Precomputed(v*10 + d)`;
/// - a binary with two precomputed operands folds, except `Div`/`Mod`
///   with a zero divisor, which must keep raising at runtime;
/// - a parenthesis whose children all fold keeps only the last child's
///   value (the dropped children are side-effect free by construction);
/// - a conditional with a precomputed condition collapses to the chosen
///   branch;
/// - user-defined calls never fold, but their operands are optimized.
///
/// All arithmetic wraps in the target number type.
pub fn precompute<N: Number>(expr: &Rc<Expr<N>>) -> Rc<Expr<N>> {
    match &**expr {
        Expr::Zero | Expr::Define => Rc::new(Expr::Precomputed { value: N::ZERO }),

        Expr::Precomputed { .. }
        | Expr::Operand { .. }
        | Expr::LoadVariable { .. }
        | Expr::Input => expr.clone(),

        Expr::LoadArray { index } => Rc::new(Expr::LoadArray {
            index: precompute(index),
        }),

        Expr::PrintChar { character } => Rc::new(Expr::PrintChar {
            character: precompute(character),
        }),

        Expr::StoreVariable { operand, name } => Rc::new(Expr::StoreVariable {
            operand: precompute(operand),
            name: name.clone(),
        }),

        Expr::StoreArray { value, index } => Rc::new(Expr::StoreArray {
            value: precompute(value),
            index: precompute(index),
        }),

        Expr::Parenthesis { exprs } => {
            let optimized: Vec<Rc<Expr<N>>> = exprs.iter().map(precompute).collect();
            let all_precomputed = optimized
                .iter()
                .all(|e| matches!(&**e, Expr::Precomputed { .. }));

            if all_precomputed {
                match optimized.last() {
                    Some(last) => last.clone(),
                    // The parser never emits an empty parenthesis, but
                    // its value is defined as 0.
                    None => Rc::new(Expr::Precomputed { value: N::ZERO }),
                }
            } else {
                Rc::new(Expr::Parenthesis { exprs: optimized })
            }
        }

        Expr::Decimal { operand, digit } => {
            let operand = precompute(operand);
            if let Expr::Precomputed { value } = &*operand {
                let folded = value
                    .wrapping_mul(N::from_i32(10))
                    .wrapping_add(N::from_i32(*digit));
                Rc::new(Expr::Precomputed { value: folded })
            } else {
                Rc::new(Expr::Decimal {
                    operand,
                    digit: *digit,
                })
            }
        }

        Expr::Binary { left, right, op } => {
            let left = precompute(left);
            let right = precompute(right);

            if let (Expr::Precomputed { value: l }, Expr::Precomputed { value: r }) =
                (&*left, &*right)
            {
                if let Some(folded) = fold_binary(*l, *r, *op) {
                    return Rc::new(Expr::Precomputed { value: folded });
                }
            }

            Rc::new(Expr::Binary {
                left,
                right,
                op: *op,
            })
        }

        Expr::Conditional {
            condition,
            if_true,
            if_false,
        } => {
            let condition = precompute(condition);
            let if_true = precompute(if_true);
            let if_false = precompute(if_false);

            if let Expr::Precomputed { value } = &*condition {
                if value.is_zero() {
                    if_false
                } else {
                    if_true
                }
            } else {
                Rc::new(Expr::Conditional {
                    condition,
                    if_true,
                    if_false,
                })
            }
        }

        Expr::UserDefined {
            definition,
            operands,
            ..
        } => Rc::new(Expr::UserDefined {
            definition: definition.clone(),
            operands: operands.iter().map(precompute).collect(),
            is_tail_call: None,
        }),
    }
}

/// Folds a binary over two known values; `None` preserves the node
/// (division by a zero constant must stay and raise at runtime).
fn fold_binary<N: Number>(l: N, r: N, op: BinaryOp) -> Option<N> {
    let folded = match op {
        BinaryOp::Add => l.wrapping_add(r),
        BinaryOp::Sub => l.wrapping_sub(r),
        BinaryOp::Mult => l.wrapping_mul(r),
        BinaryOp::Div => {
            if r.is_zero() {
                return None;
            }
            l.wrapping_div(r)
        }
        BinaryOp::Mod => {
            if r.is_zero() {
                return None;
            }
            l.wrapping_rem(r)
        }
        BinaryOp::Equal => N::from_bool(l == r),
        BinaryOp::NotEqual => N::from_bool(l != r),
        BinaryOp::LessThan => N::from_bool(l < r),
        BinaryOp::LessThanOrEqual => N::from_bool(l <= r),
        BinaryOp::GreaterThanOrEqual => N::from_bool(l >= r),
        BinaryOp::GreaterThan => N::from_bool(l > r),
        BinaryOp::LogicalAnd => N::from_bool(!l.is_zero() && !r.is_zero()),
        BinaryOp::LogicalOr => N::from_bool(!l.is_zero() || !r.is_zero()),
    };
    Some(folded)
}
