//! calc4-eval - Tree-Walking Evaluator
//!
//! A recursive evaluator with the same observable semantics as the
//! stack-machine interpreter. It shares the execution-state abstraction
//! and uses the native call stack for recursion, so it exists for
//! cross-validation of the optimizer and code generator and for
//! programs without recursive user-defined calls (where unbounded
//! native-stack growth cannot occur). [`has_recursive_call`] is the
//! analysis the driver uses to decide that.

use std::rc::Rc;

use rustc_hash::FxHashMap;

use calc4_ast::{BinaryOp, CompilationContext, Expr, OperatorDefinition};
use calc4_rt::{ArraySource, ExecutionState, InputSource, Printer, VariableSource};
use calc4_util::{Number, RuntimeError, RuntimeResult};

/// Evaluates an expression tree against an execution state.
pub fn evaluate<N, V, A, I, P>(
    context: &CompilationContext<N>,
    state: &mut ExecutionState<N, V, A, I, P>,
    expr: &Rc<Expr<N>>,
) -> RuntimeResult<N>
where
    N: Number,
    V: VariableSource<N>,
    A: ArraySource<N>,
    I: InputSource,
    P: Printer,
{
    let mut evaluator = Evaluator {
        context,
        state,
        frames: Vec::new(),
    };
    evaluator.eval(expr)
}

struct Evaluator<'a, N, V, A, I, P>
where
    N: Number,
    V: VariableSource<N>,
    A: ArraySource<N>,
    I: InputSource,
    P: Printer,
{
    context: &'a CompilationContext<N>,
    state: &'a mut ExecutionState<N, V, A, I, P>,
    /// Argument frames of active user-defined calls, innermost last.
    frames: Vec<Vec<N>>,
}

impl<'a, N, V, A, I, P> Evaluator<'a, N, V, A, I, P>
where
    N: Number,
    V: VariableSource<N>,
    A: ArraySource<N>,
    I: InputSource,
    P: Printer,
{
    fn eval(&mut self, expr: &Rc<Expr<N>>) -> RuntimeResult<N> {
        match &**expr {
            Expr::Zero | Expr::Define => Ok(N::ZERO),

            Expr::Precomputed { value } => Ok(*value),

            Expr::Operand { index } => {
                let frame = self
                    .frames
                    .last()
                    .expect("operand reference outside a user-defined operator");
                Ok(frame[*index])
            }

            Expr::LoadVariable { name } => Ok(self.state.variables().get(name)),

            Expr::StoreVariable { operand, name } => {
                let value = self.eval(operand)?;
                self.state.variables_mut().set(name, value);
                Ok(value)
            }

            Expr::LoadArray { index } => {
                let index = self.eval(index)?;
                Ok(self.state.array().get(index))
            }

            Expr::StoreArray { value, index } => {
                let value = self.eval(value)?;
                let index = self.eval(index)?;
                self.state.array_mut().set(index, value);
                Ok(value)
            }

            Expr::PrintChar { character } => {
                let value = self.eval(character)?;
                self.state.print_char(value.to_byte());
                Ok(N::ZERO)
            }

            Expr::Input => Ok(N::from_i32(self.state.get_char())),

            Expr::Decimal { operand, digit } => {
                let value = self.eval(operand)?;
                Ok(value
                    .wrapping_mul(N::from_i32(10))
                    .wrapping_add(N::from_i32(*digit)))
            }

            Expr::Parenthesis { exprs } => {
                let mut value = N::ZERO;
                for child in exprs {
                    value = self.eval(child)?;
                }
                Ok(value)
            }

            Expr::Binary { left, right, op } => self.eval_binary(left, right, *op),

            Expr::Conditional {
                condition,
                if_true,
                if_false,
            } => {
                if self.eval(condition)?.is_zero() {
                    self.eval(if_false)
                } else {
                    self.eval(if_true)
                }
            }

            Expr::UserDefined {
                definition,
                operands,
                ..
            } => {
                let mut arguments = Vec::with_capacity(operands.len());
                for operand in operands {
                    arguments.push(self.eval(operand)?);
                }

                let body = self
                    .context
                    .implement(definition.name())
                    .and_then(|implement| implement.operator())
                    .expect("called operator has a parsed body")
                    .clone();

                self.frames.push(arguments);
                let result = self.eval(&body)?;
                self.frames.pop();
                Ok(result)
            }
        }
    }

    fn eval_binary(
        &mut self,
        left: &Rc<Expr<N>>,
        right: &Rc<Expr<N>>,
        op: BinaryOp,
    ) -> RuntimeResult<N> {
        // Short-circuit operators decide on the left value alone.
        match op {
            BinaryOp::LogicalAnd => {
                if self.eval(left)?.is_zero() {
                    return Ok(N::ZERO);
                }
                let right = self.eval(right)?;
                return Ok(N::from_bool(!right.is_zero()));
            }
            BinaryOp::LogicalOr => {
                if !self.eval(left)?.is_zero() {
                    return Ok(N::ONE);
                }
                let right = self.eval(right)?;
                return Ok(N::from_bool(!right.is_zero()));
            }
            _ => {}
        }

        let l = self.eval(left)?;
        let r = self.eval(right)?;
        let value = match op {
            BinaryOp::Add => l.wrapping_add(r),
            BinaryOp::Sub => l.wrapping_sub(r),
            BinaryOp::Mult => l.wrapping_mul(r),
            BinaryOp::Div => {
                if r.is_zero() {
                    return Err(RuntimeError::ZeroDivision);
                }
                l.wrapping_div(r)
            }
            BinaryOp::Mod => {
                if r.is_zero() {
                    return Err(RuntimeError::ZeroDivision);
                }
                l.wrapping_rem(r)
            }
            BinaryOp::Equal => N::from_bool(l == r),
            BinaryOp::NotEqual => N::from_bool(l != r),
            BinaryOp::LessThan => N::from_bool(l < r),
            BinaryOp::LessThanOrEqual => N::from_bool(l <= r),
            BinaryOp::GreaterThanOrEqual => N::from_bool(l >= r),
            BinaryOp::GreaterThan => N::from_bool(l > r),
            BinaryOp::LogicalAnd | BinaryOp::LogicalOr => unreachable!("handled above"),
        };
        Ok(value)
    }
}

/// Reports whether the program can reach a recursive user-defined call.
///
/// Walks the expression and, for every call, the callee's body; a
/// definition found already on the active path is a recursion. The
/// call-count map guards against diamonds (two calls of the same
/// operator on different paths are not a recursion).
pub fn has_recursive_call<N: Number>(
    expr: &Rc<Expr<N>>,
    context: &CompilationContext<N>,
) -> bool {
    let mut called: FxHashMap<OperatorDefinition, usize> = FxHashMap::default();
    has_recursive_call_internal(expr, context, &mut called)
}

fn has_recursive_call_internal<N: Number>(
    expr: &Rc<Expr<N>>,
    context: &CompilationContext<N>,
    called: &mut FxHashMap<OperatorDefinition, usize>,
) -> bool {
    if let Expr::UserDefined { definition, .. } = &**expr {
        let count = called.entry(definition.clone()).or_insert(0);
        *count += 1;
        if *count > 1 {
            return true;
        }

        let body = context
            .implement(definition.name())
            .and_then(|implement| implement.operator())
            .cloned();
        let recursive = match body {
            Some(body) => has_recursive_call_internal(&body, context, called),
            None => false,
        };

        if let Some(count) = called.get_mut(definition) {
            *count -= 1;
        }
        if recursive {
            return true;
        }
    }

    for child in expr.children() {
        if has_recursive_call_internal(&child, context, called) {
            return true;
        }
    }

    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use calc4_lex::lex;
    use calc4_opt::optimize;
    use calc4_par::parse;
    use calc4_rt::{BufferedInputSource, BufferedPrinter};

    fn compile(source: &str) -> (Rc<Expr<i64>>, CompilationContext<i64>) {
        let mut context: CompilationContext<i64> = CompilationContext::new();
        let tokens = lex(source, &mut context).expect("lex");
        let expr = parse(&tokens, &mut context).expect("parse");
        (expr, context)
    }

    fn eval_source(source: &str, input: &str) -> (RuntimeResult<i64>, String) {
        let (expr, context) = compile(source);
        let mut state = ExecutionState::with_io(
            BufferedInputSource::new(input.as_bytes().to_vec()),
            BufferedPrinter::new(),
        );
        let result = evaluate(&context, &mut state, &expr);
        let output = state.printer().to_string_lossy();
        (result, output)
    }

    #[test]
    fn evaluates_arithmetic() {
        assert_eq!(eval_source("1+2*3-10", "").0.unwrap(), -1);
        assert_eq!(eval_source("12345678", "").0.unwrap(), 12345678);
    }

    #[test]
    fn evaluates_conditionals_and_calls() {
        assert_eq!(eval_source("0?1?2?3?4", "").0.unwrap(), 3);
        assert_eq!(
            eval_source("D[fact|x,y|x==0?y?(x-1){fact}(x*y)] 10{fact}1", "")
                .0
                .unwrap(),
            3628800
        );
    }

    #[test]
    fn evaluates_io_variables_and_array() {
        let (result, output) = eval_source("72P101P108P108P111P10P", "");
        assert_eq!(result.unwrap(), 0);
        assert_eq!(output, "Hello\n");

        assert_eq!(eval_source("I", "A").0.unwrap(), 65);
        assert_eq!(eval_source("I", "").0.unwrap(), -1);
        assert_eq!(eval_source("(123S)L*L", "").0.unwrap(), 15129);
        assert_eq!(eval_source("(5->(0-1))((0-1)@)", "").0.unwrap(), 5);
    }

    #[test]
    fn short_circuit_skips_side_effects() {
        let (result, output) = eval_source("0&&(65P)", "");
        assert_eq!(result.unwrap(), 0);
        assert_eq!(output, "");

        assert_eq!(eval_source("0&&(1/0)?1?2", "").0.unwrap(), 2);
    }

    #[test]
    fn zero_division_is_an_error() {
        assert_eq!(
            eval_source("1/0", "").0.unwrap_err(),
            RuntimeError::ZeroDivision
        );
    }

    #[test]
    fn evaluates_optimized_trees_identically() {
        let (expr, mut context) = compile("D[fib|n|n<=1?n?(n-1){fib}+(n-2){fib}] 10{fib}");
        let optimized = optimize(&mut context, &expr);

        let mut state: ExecutionState<i64, _, _, _, _> = ExecutionState::with_io(
            BufferedInputSource::new(Vec::new()),
            BufferedPrinter::new(),
        );
        assert_eq!(evaluate(&context, &mut state, &optimized).unwrap(), 55);
    }

    #[test]
    fn detects_direct_recursion() {
        let (expr, context) = compile("D[fib|n|n<=1?n?(n-1){fib}+(n-2){fib}] 10{fib}");
        assert!(has_recursive_call(&expr, &context));
    }

    #[test]
    fn detects_mutual_recursion() {
        // g is forward-declared with a dummy body, then redefined in
        // terms of f.
        let (expr, context) = compile("D[g|x|x] D[f|x|x{g}] D[g|x|x{f}] 1{f}");
        assert!(has_recursive_call(&expr, &context));
    }

    #[test]
    fn diamond_calls_are_not_recursion() {
        let (expr, context) = compile("D[one||1] D[two||{one}+{one}] {two}+{one}");
        assert!(!has_recursive_call(&expr, &context));
    }

    #[test]
    fn straight_line_code_has_no_recursion() {
        let (expr, context) = compile("1+2*3");
        assert!(!has_recursive_call(&expr, &context));
    }
}
