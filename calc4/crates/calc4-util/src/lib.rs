//! calc4-util - Foundation Types for the Calc4 Language Core
//!
//! This crate provides the types shared by every phase of the Calc4
//! pipeline:
//!
//! - [`CharPosition`] - source locations attached to tokens and errors
//! - [`SyntaxError`], [`CodegenError`], [`RuntimeError`] - the error
//!   taxonomy of the language core
//! - [`Number`] - the numeric-type abstraction the optimizer, code
//!   generator and interpreter are parameterized over
//!
//! The crate sits at the bottom of the dependency graph and must not
//! depend on any other `calc4-*` crate.

mod error;
mod number;
mod position;

pub use error::{
    CodegenError, CodegenResult, RuntimeError, RuntimeResult, SyntaxError, SyntaxResult,
};
pub use number::Number;
pub use position::CharPosition;

// Re-export commonly used hash containers
pub use rustc_hash::FxHashMap;
pub use rustc_hash::FxHashSet;

/// Removes leading and trailing spaces from a string slice.
///
/// Only the space character is stripped. Operator and argument names may
/// contain any other printable byte, so the trim must not touch tabs or
/// other whitespace that could be part of a name.
pub fn trim_spaces(s: &str) -> &str {
    s.trim_matches(' ')
}
