//! Edge case tests for calc4-par
