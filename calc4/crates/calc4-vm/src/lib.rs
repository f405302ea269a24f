//! calc4-vm - Stack Machine
//!
//! Lowers the expression tree to a flat bytecode module and executes it.
//!
//! The code generator ([`generate_module`]) emits each user-defined
//! operator and the entry expression as an independent function,
//! resolves labels to addresses, and records per-function maximum stack
//! growth; [`Module::flatten`] links everything into one contiguous
//! operation array with absolute branch and call targets.
//!
//! The interpreter ([`execute_module`]) runs the flattened module
//! against an execution state with fixed-capacity value and pointer
//! stacks, raising `StackOverflow` at call time rather than mid-body.
//!
//! # Example
//!
//! ```
//! use calc4_ast::CompilationContext;
//! use calc4_rt::{BufferedInputSource, BufferedPrinter, ExecutionState};
//! use calc4_vm::{execute_module, generate_module, CodegenOptions};
//!
//! let mut context: CompilationContext<i64> = CompilationContext::new();
//! let tokens = calc4_lex::lex("1+2*3", &mut context).unwrap();
//! let expr = calc4_par::parse(&tokens, &mut context).unwrap();
//! let module = generate_module(&expr, &context, CodegenOptions::default()).unwrap();
//!
//! let mut state = ExecutionState::with_io(
//!     BufferedInputSource::new(Vec::new()),
//!     BufferedPrinter::new(),
//! );
//! assert_eq!(execute_module(&module, &mut state).unwrap(), 9);
//! ```

mod codegen;
mod interp;
mod module;
#[cfg(test)]
mod tests;

pub use codegen::{generate_module, CodegenOptions};
pub use interp::{execute_module, PTR_STACK_SIZE, STACK_SIZE};
pub use module::{Module, Op, Opcode, UserDefinedFunction};
