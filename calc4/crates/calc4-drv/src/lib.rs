//! calc4-drv - Pipeline Driver
//!
//! Orchestrates the phases of the language core: lex, parse, optional
//! optimization, executor selection, and execution. The `calc4` binary
//! in this crate is a thin shell over these functions.
//!
//! Compilation is transactional with respect to the compilation
//! context: lexing and parsing run against a clone, and the caller's
//! context is replaced only when the whole compile succeeds, so a
//! failed compile leaves previously registered operators untouched.

use std::fmt::Write as _;
use std::rc::Rc;

use thiserror::Error;
use tracing::debug;

use calc4_ast::{CompilationContext, Expr};
use calc4_eval::{evaluate, has_recursive_call};
use calc4_lex::lex;
use calc4_opt::optimize;
use calc4_par::parse;
use calc4_rt::{ArraySource, ExecutionState, InputSource, Printer, VariableSource};
use calc4_util::{CharPosition, CodegenError, Number, RuntimeError, SyntaxError};
use calc4_vm::{execute_module, generate_module, CodegenOptions};

/// Which executor runs the compiled program.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExecutorMode {
    /// Stack machine, except for programs without recursive calls,
    /// which the tree evaluator handles directly.
    #[default]
    Auto,
    /// Always the stack-machine interpreter.
    StackMachine,
    /// Always the tree evaluator. Unsuitable for deep recursion; meant
    /// for cross-validation.
    Tree,
}

/// Driver options. Defaults mirror the interactive defaults of the
/// language: optimizer on, zero-division checking on, automatic
/// executor selection.
#[derive(Debug, Clone)]
pub struct Options {
    pub optimize: bool,
    pub check_zero_division: bool,
    pub executor: ExecutorMode,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            optimize: true,
            check_zero_division: true,
            executor: ExecutorMode::Auto,
        }
    }
}

/// Any failure of compiling or running a program.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DriverError {
    #[error("{0}")]
    Syntax(#[from] SyntaxError),

    #[error("{0}")]
    Codegen(#[from] CodegenError),

    #[error("{0}")]
    Runtime(#[from] RuntimeError),
}

impl DriverError {
    /// Position of the offending character, for syntax errors that
    /// carry one.
    pub fn position(&self) -> Option<CharPosition> {
        match self {
            DriverError::Syntax(err) => err.position(),
            _ => None,
        }
    }
}

/// Lexes, parses and (optionally) optimizes a source text.
///
/// On success the definitions of the program are committed into
/// `context`; on failure `context` is left unchanged.
pub fn compile_source<N: Number>(
    source: &str,
    context: &mut CompilationContext<N>,
    optimize_flag: bool,
) -> Result<Rc<Expr<N>>, SyntaxError> {
    let mut staged = context.clone();

    let tokens = lex(source, &mut staged)?;
    debug!(tokens = tokens.len(), "lexed");

    let mut expr = parse(&tokens, &mut staged)?;
    debug!("parsed");

    if optimize_flag {
        expr = optimize(&mut staged, &expr);
        debug!("optimized");
    }

    *context = staged;
    Ok(expr)
}

/// Runs a compiled program on the selected executor.
pub fn execute_program<N, V, A, I, P>(
    expr: &Rc<Expr<N>>,
    context: &CompilationContext<N>,
    options: &Options,
    state: &mut ExecutionState<N, V, A, I, P>,
) -> Result<N, DriverError>
where
    N: Number,
    V: VariableSource<N>,
    A: ArraySource<N>,
    I: InputSource,
    P: Printer,
{
    let use_tree = match options.executor {
        ExecutorMode::Tree => true,
        ExecutorMode::StackMachine => false,
        ExecutorMode::Auto => !has_recursive_call(expr, context),
    };

    if use_tree {
        debug!("executing with the tree evaluator");
        Ok(evaluate(context, state, expr)?)
    } else {
        let module = generate_module(
            expr,
            context,
            CodegenOptions {
                check_zero_division: options.check_zero_division,
            },
        )?;
        debug!(
            operators = module.user_defined_operators().len(),
            variables = module.variables().len(),
            "executing with the stack machine"
        );
        Ok(execute_module(&module, state)?)
    }
}

/// Compiles and runs a source text in one step, against a fresh
/// compilation context.
pub fn run_source<N, V, A, I, P>(
    source: &str,
    options: &Options,
    state: &mut ExecutionState<N, V, A, I, P>,
) -> Result<N, DriverError>
where
    N: Number,
    V: VariableSource<N>,
    A: ArraySource<N>,
    I: InputSource,
    P: Printer,
{
    let mut context = CompilationContext::new();
    let expr = compile_source(source, &mut context, options.optimize)?;
    execute_program(&expr, &context, options, state)
}

/// Renders the program structure: recursion flag, the expression trees
/// of the entry point and every operator, and the bytecode listing.
pub fn dump_program<N: Number>(
    expr: &Rc<Expr<N>>,
    context: &CompilationContext<N>,
    options: &Options,
) -> Result<String, DriverError> {
    let mut out = String::new();

    let _ = writeln!(
        out,
        "Has recursive call: {}",
        if has_recursive_call(expr, context) {
            "True"
        } else {
            "False"
        }
    );

    for implement in context.implements() {
        let _ = writeln!(
            out,
            "Operator \"{}\" (numOperands = {}):",
            implement.definition().name(),
            implement.definition().num_operands()
        );
        if let Some(body) = implement.operator() {
            print_tree(body, 1, &mut out);
        }
    }

    let _ = writeln!(out, "Main:");
    print_tree(expr, 1, &mut out);

    let module = generate_module(
        expr,
        context,
        CodegenOptions {
            check_zero_division: options.check_zero_division,
        },
    )?;
    let _ = writeln!(out, "{}", module);

    Ok(out)
}

fn print_tree<N: Number>(expr: &Rc<Expr<N>>, depth: usize, out: &mut String) {
    let _ = writeln!(out, "{}{}", "  ".repeat(depth), expr);
    for child in expr.children() {
        print_tree(&child, depth + 1, out);
    }
}
