//! Operator definitions and the compilation context.

use std::rc::Rc;

use indexmap::IndexMap;

use calc4_util::Number;

use crate::ast::Expr;

/// Name and arity of a user-defined operator.
///
/// Two definitions are equal when both the name and the arity match.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct OperatorDefinition {
    name: String,
    num_operands: usize,
}

impl OperatorDefinition {
    pub fn new(name: impl Into<String>, num_operands: usize) -> Self {
        Self {
            name: name.into(),
            num_operands,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn num_operands(&self) -> usize {
        self.num_operands
    }
}

/// A definition paired with the tree that realizes it.
///
/// The body is `None` between the lexer's placeholder registration and
/// the parser's replacement with the finished tree.
#[derive(Debug, Clone)]
pub struct OperatorImplement<N: Number> {
    definition: OperatorDefinition,
    operator: Option<Rc<Expr<N>>>,
}

impl<N: Number> OperatorImplement<N> {
    pub fn new(definition: OperatorDefinition, operator: Option<Rc<Expr<N>>>) -> Self {
        Self {
            definition,
            operator,
        }
    }

    pub fn definition(&self) -> &OperatorDefinition {
        &self.definition
    }

    /// The finished body, or `None` for a placeholder.
    pub fn operator(&self) -> Option<&Rc<Expr<N>>> {
        self.operator.as_ref()
    }
}

/// Registry of user-defined operators, keyed by name.
///
/// Iteration order is insertion order, which keeps operator numbering
/// deterministic across the optimizer and the code generator. Adding an
/// implement for an existing name replaces the entry in place.
#[derive(Debug, Clone)]
pub struct CompilationContext<N: Number> {
    operators: IndexMap<String, OperatorImplement<N>>,
}

impl<N: Number> CompilationContext<N> {
    pub fn new() -> Self {
        Self {
            operators: IndexMap::new(),
        }
    }

    /// Registers or replaces the implement for its definition's name.
    pub fn add_implement(&mut self, implement: OperatorImplement<N>) {
        let name = implement.definition().name().to_string();
        self.operators.insert(name, implement);
    }

    /// Looks up an implement by operator name.
    pub fn implement(&self, name: &str) -> Option<&OperatorImplement<N>> {
        self.operators.get(name)
    }

    /// All registered implements, in insertion order.
    pub fn implements(&self) -> impl Iterator<Item = &OperatorImplement<N>> {
        self.operators.values()
    }

    /// Names of all registered operators, in insertion order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.operators.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.operators.len()
    }

    pub fn is_empty(&self) -> bool {
        self.operators.is_empty()
    }
}

impl<N: Number> Default for CompilationContext<N> {
    fn default() -> Self {
        Self::new()
    }
}
