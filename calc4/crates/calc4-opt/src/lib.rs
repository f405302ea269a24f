//! calc4-opt - AST Optimizer
//!
//! Two passes over the immutable tree, applied first to every
//! user-defined operator body and then to the root expression:
//!
//! 1. **Precompute** ([`precompute`]) - bottom-up constant folding into
//!    `Precomputed` nodes, in the target number type with its wrapping
//!    overflow semantics.
//! 2. **Tail-call marking** ([`mark_tail_calls`]) - top-down marking of
//!    user-defined calls in tail position, which lets the code generator
//!    turn a recursive self-call into a parameter update and a branch.
//!
//! Both passes rebuild only the spine they change and share every
//! untouched subtree.

mod precompute;
mod tail_call;

use std::rc::Rc;

use calc4_ast::{CompilationContext, Expr, OperatorImplement};
use calc4_util::Number;

pub use precompute::precompute;
pub use tail_call::mark_tail_calls;

/// Optimizes every user-defined operator body in `context`, then the
/// root expression, returning the optimized root.
pub fn optimize<N: Number>(context: &mut CompilationContext<N>, expr: &Rc<Expr<N>>) -> Rc<Expr<N>> {
    let names: Vec<String> = context.names().map(str::to_string).collect();
    for name in names {
        let (definition, body) = match context.implement(&name) {
            Some(implement) => (
                implement.definition().clone(),
                implement.operator().cloned(),
            ),
            None => continue,
        };
        if let Some(body) = body {
            let optimized = optimize_core(&body);
            context.add_implement(OperatorImplement::new(definition, Some(optimized)));
        }
    }

    optimize_core(expr)
}

fn optimize_core<N: Number>(expr: &Rc<Expr<N>>) -> Rc<Expr<N>> {
    mark_tail_calls(&precompute(expr))
}
