//! calc4-lex - Lexical Analyzer
//!
//! Transforms Calc4 source text into a sequence of typed tokens, each
//! carrying the character position where it starts and its optional
//! supplementary text.
//!
//! Unlike a conventional lexer this one is threaded through the
//! compilation context: `D[...]` definitions register their operator
//! (with an absent body) before their inner text is lexed, so the inner
//! text and all later tokens can resolve the operator by name.
//!
//! # Example
//!
//! ```
//! use calc4_ast::CompilationContext;
//! use calc4_lex::lex;
//!
//! let mut context: CompilationContext<i64> = CompilationContext::new();
//! let tokens = lex("1+2*3", &mut context).unwrap();
//! assert_eq!(tokens.len(), 5);
//! ```

pub mod cursor;
mod edge_cases;
mod lexer;
mod token;

pub use cursor::Cursor;
pub use lexer::lex;
pub use token::{Token, TokenKind};
