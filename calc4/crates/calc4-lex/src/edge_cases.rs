//! Edge case tests for calc4-lex
