//! The `calc4` binary: compiles and runs a Calc4 program from a file or
//! from the command line.

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{bail, Context};
use clap::{Parser, ValueEnum};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use calc4_drv::{compile_source, dump_program, execute_program, DriverError, ExecutorMode, Options};
use calc4_rt::{BufferedInputSource, ExecutionState, StdInputSource, StdPrinter};
use calc4_util::Number;

/// The Calc4 programming language
#[derive(Parser, Debug)]
#[command(name = "calc4")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Executes programs written in the Calc4 language", long_about = None)]
struct Cli {
    /// Source file to execute
    file: Option<PathBuf>,

    /// Execute the given expression instead of a file
    #[arg(short = 'e', long = "expression", conflicts_with = "file")]
    expression: Option<String>,

    /// Integer size in bits (32 or 64)
    #[arg(long = "int-size", default_value_t = 64)]
    int_size: u32,

    /// Disable the optimizer
    #[arg(long = "no-optimize")]
    no_optimize: bool,

    /// Do not check division by zero
    #[arg(long = "unchecked-zero-division")]
    unchecked_zero_division: bool,

    /// Executor running the program
    #[arg(long, value_enum, default_value = "auto")]
    executor: ExecutorArg,

    /// Feed the given text as the program's input instead of stdin
    #[arg(long)]
    input: Option<String>,

    /// Print the program structure and bytecode before executing
    #[arg(long)]
    dump: bool,
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum ExecutorArg {
    /// Stack machine, tree evaluator for non-recursive programs
    Auto,
    /// Stack-machine interpreter
    Vm,
    /// Tree evaluator
    Tree,
}

impl From<ExecutorArg> for ExecutorMode {
    fn from(arg: ExecutorArg) -> Self {
        match arg {
            ExecutorArg::Auto => ExecutorMode::Auto,
            ExecutorArg::Vm => ExecutorMode::StackMachine,
            ExecutorArg::Tree => ExecutorMode::Tree,
        }
    }
}

fn main() -> ExitCode {
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(EnvFilter::from_env("CALC4_LOG"))
        .init();

    let cli = Cli::parse();
    match run(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(error) => {
            eprintln!("error: {:#}", error);
            ExitCode::FAILURE
        }
    }
}

fn run(cli: &Cli) -> anyhow::Result<()> {
    let source = match (&cli.file, &cli.expression) {
        (Some(path), None) => std::fs::read_to_string(path)
            .with_context(|| format!("cannot read {}", path.display()))?,
        (None, Some(expression)) => expression.clone(),
        (None, None) => bail!("no program: pass a source file or use -e <expression>"),
        (Some(_), Some(_)) => unreachable!("clap rejects file together with -e"),
    };

    let options = Options {
        optimize: !cli.no_optimize,
        check_zero_division: !cli.unchecked_zero_division,
        executor: cli.executor.into(),
    };

    match cli.int_size {
        32 => run_program::<i32>(&source, &options, cli),
        64 => run_program::<i64>(&source, &options, cli),
        other => bail!("unsupported integer size: {} (expected 32 or 64)", other),
    }
}

fn run_program<N: Number>(source: &str, options: &Options, cli: &Cli) -> anyhow::Result<()> {
    let mut context = calc4_ast::CompilationContext::<N>::new();
    let expr = match compile_source(source, &mut context, options.optimize) {
        Ok(expr) => expr,
        Err(err) => bail!("{}", render_error(&DriverError::Syntax(err))),
    };

    if cli.dump {
        match dump_program(&expr, &context, options) {
            Ok(dump) => print!("{}", dump),
            Err(err) => bail!("{}", render_error(&err)),
        }
    }

    let result = match &cli.input {
        Some(input) => {
            let mut state = ExecutionState::<N, _, _, _, _>::with_io(
                BufferedInputSource::new(input.as_bytes().to_vec()),
                StdPrinter,
            );
            execute_program(&expr, &context, options, &mut state)
        }
        None => {
            let mut state =
                ExecutionState::<N, _, _, _, _>::with_io(StdInputSource, StdPrinter);
            execute_program(&expr, &context, options, &mut state)
        }
    };

    match result {
        Ok(value) => {
            println!("{}", value);
            Ok(())
        }
        Err(err) => bail!("{}", render_error(&err)),
    }
}

/// Formats an error with its source position when one is known.
fn render_error(error: &DriverError) -> String {
    match error.position() {
        Some(position) => format!("{}: {}", position, error),
        None => error.to_string(),
    }
}
