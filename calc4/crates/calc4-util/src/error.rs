//! Error types of the Calc4 language core.
//!
//! Errors are raised synchronously at the innermost site that detects
//! them and carry a [`CharPosition`] when one is available. Three
//! categories exist: syntax errors from the lexer/parser, internal
//! code-generation assertions, and runtime failures of an execution.

use thiserror::Error;

use crate::position::CharPosition;

/// Error raised while lexing or parsing a source text.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SyntaxError {
    /// A `{name}` reference or a bare byte resolved to neither a
    /// user-defined operator nor an argument of the enclosing definition.
    #[error("operator or operand \"{name}\" is not defined")]
    OperatorOrOperandNotDefined {
        name: String,
        position: Option<CharPosition>,
    },

    /// The supplementary text of a `D` token was not split into exactly
    /// three parts by `|`.
    #[error("the following definition text is not splitted by two '|'s: \"{text}\"")]
    DefinitionTextNotSplittedProperly {
        text: String,
        position: Option<CharPosition>,
    },

    /// An operator was applied to fewer operands than its arity requires.
    #[error("some operand(s) is missing")]
    SomeOperandsMissing { position: Option<CharPosition> },

    /// A required closing token (`)`, `]`, `}`, `*/`) was not found.
    #[error("\"{name}\" is expected")]
    TokenExpected {
        name: String,
        position: Option<CharPosition>,
    },

    /// A character remained after the outermost expression ended.
    #[error("unexpected token \"{token}\"")]
    UnexpectedToken {
        token: char,
        position: Option<CharPosition>,
    },

    /// The source lexed to zero tokens.
    #[error("code is empty")]
    CodeIsEmpty,
}

impl SyntaxError {
    /// Position of the offending character, when known.
    pub fn position(&self) -> Option<CharPosition> {
        match self {
            SyntaxError::OperatorOrOperandNotDefined { position, .. }
            | SyntaxError::DefinitionTextNotSplittedProperly { position, .. }
            | SyntaxError::SomeOperandsMissing { position }
            | SyntaxError::TokenExpected { position, .. }
            | SyntaxError::UnexpectedToken { position, .. } => *position,
            SyntaxError::CodeIsEmpty => None,
        }
    }
}

/// Internal error of the stack-machine code generator.
///
/// These indicate a compiler bug (a broken stack-size invariant), never
/// a mistake in the user's program.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CodegenError {
    #[error("assertion error (this is a bug of compiler): {message}")]
    AssertionError { message: String },
}

impl CodegenError {
    pub fn assertion(message: impl Into<String>) -> Self {
        CodegenError::AssertionError {
            message: message.into(),
        }
    }
}

/// Error raised while a program is executing.
///
/// Runtime errors abort the current execution but leave the compiled
/// module intact; a later execution on a fresh state must succeed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum RuntimeError {
    #[error("zero division")]
    ZeroDivision,

    #[error("stack overflow")]
    StackOverflow,
}

/// Result type alias for lexing and parsing.
pub type SyntaxResult<T> = std::result::Result<T, SyntaxError>;

/// Result type alias for code generation.
pub type CodegenResult<T> = std::result::Result<T, CodegenError>;

/// Result type alias for program execution.
pub type RuntimeResult<T> = std::result::Result<T, RuntimeError>;
