//! Tail-call marking pass.

use std::rc::Rc;

use calc4_ast::Expr;
use calc4_util::Number;

/// Marks every user-defined call with whether it sits in tail position.
///
/// The root of the processed expression is in tail position. Tail
/// position propagates to:
///
/// - the last child of a parenthesis;
/// - both branches of a conditional (never its condition);
/// - a user-defined call itself, which records the flag; its operand
///   subtrees are not in tail position.
///
/// Every other node cuts tail position off from its children.
pub fn mark_tail_calls<N: Number>(expr: &Rc<Expr<N>>) -> Rc<Expr<N>> {
    process(expr, true)
}

fn process<N: Number>(expr: &Rc<Expr<N>>, is_tail_call: bool) -> Rc<Expr<N>> {
    match &**expr {
        Expr::Zero
        | Expr::Precomputed { .. }
        | Expr::Operand { .. }
        | Expr::Define
        | Expr::LoadVariable { .. }
        | Expr::Input => expr.clone(),

        Expr::LoadArray { index } => Rc::new(Expr::LoadArray {
            index: process(index, false),
        }),

        Expr::PrintChar { character } => Rc::new(Expr::PrintChar {
            character: process(character, false),
        }),

        Expr::StoreVariable { operand, name } => Rc::new(Expr::StoreVariable {
            operand: process(operand, false),
            name: name.clone(),
        }),

        Expr::StoreArray { value, index } => Rc::new(Expr::StoreArray {
            value: process(value, false),
            index: process(index, false),
        }),

        Expr::Decimal { operand, digit } => Rc::new(Expr::Decimal {
            operand: process(operand, false),
            digit: *digit,
        }),

        Expr::Parenthesis { exprs } => {
            let last = exprs.len().saturating_sub(1);
            let processed = exprs
                .iter()
                .enumerate()
                .map(|(i, e)| process(e, if i == last { is_tail_call } else { false }))
                .collect();
            Rc::new(Expr::Parenthesis { exprs: processed })
        }

        Expr::Binary { left, right, op } => Rc::new(Expr::Binary {
            left: process(left, false),
            right: process(right, false),
            op: *op,
        }),

        Expr::Conditional {
            condition,
            if_true,
            if_false,
        } => Rc::new(Expr::Conditional {
            condition: process(condition, false),
            if_true: process(if_true, is_tail_call),
            if_false: process(if_false, is_tail_call),
        }),

        Expr::UserDefined {
            definition,
            operands,
            ..
        } => Rc::new(Expr::UserDefined {
            definition: definition.clone(),
            operands: operands.iter().map(|o| process(o, false)).collect(),
            is_tail_call: Some(is_tail_call),
        }),
    }
}
