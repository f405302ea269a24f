//! Bytecode module definitions.
//!
//! A module is the unit the code generator produces and the interpreter
//! executes: the entry point's operation sequence, one operation
//! sequence per user-defined operator (with its computed maximum stack
//! growth), a table of constants too large for a 16-bit immediate, and
//! the index-to-name table of variables.

use std::fmt;

use static_assertions::assert_eq_size;

use calc4_ast::OperatorDefinition;
use calc4_util::Number;

/// Operation codes of the stack machine.
///
/// `Label` is a pseudo-operation that only exists while a function is
/// being generated; label resolution strips it before the module is
/// frozen.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i8)]
pub enum Opcode {
    Push,
    Pop,
    LoadConst,
    LoadConstTable,
    LoadArg,
    StoreArg,
    LoadVariable,
    StoreVariable,
    LoadArrayElement,
    StoreArrayElement,
    Input,
    PrintChar,
    Add,
    Sub,
    Mult,
    Div,
    DivChecked,
    Mod,
    ModChecked,
    Goto,
    GotoIfTrue,
    GotoIfFalse,
    GotoIfEqual,
    GotoIfLessThan,
    GotoIfLessThanOrEqual,
    Call,
    Return,
    Halt,
    Label,
}

impl Opcode {
    /// True for operations whose immediate is a branch target.
    pub fn is_branch(self) -> bool {
        matches!(
            self,
            Opcode::Goto
                | Opcode::GotoIfTrue
                | Opcode::GotoIfFalse
                | Opcode::GotoIfEqual
                | Opcode::GotoIfLessThan
                | Opcode::GotoIfLessThanOrEqual
        )
    }
}

/// One stack-machine operation: an opcode and a signed 16-bit immediate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Op {
    pub opcode: Opcode,
    pub value: i16,
}

// The interpreter's fetch loop copies operations by value; keep them a
// single word of 4 bytes.
assert_eq_size!(Op, u32);

impl Op {
    pub fn new(opcode: Opcode, value: i16) -> Self {
        Self { opcode, value }
    }
}

impl fmt::Display for Op {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?} [value = {}]", self.opcode, self.value)
    }
}

/// Compiled body of one user-defined operator.
#[derive(Debug, Clone)]
pub struct UserDefinedFunction {
    definition: OperatorDefinition,
    operations: Vec<Op>,
    max_stack_size: usize,
}

impl UserDefinedFunction {
    pub fn new(definition: OperatorDefinition, operations: Vec<Op>, max_stack_size: usize) -> Self {
        Self {
            definition,
            operations,
            max_stack_size,
        }
    }

    pub fn definition(&self) -> &OperatorDefinition {
        &self.definition
    }

    pub fn operations(&self) -> &[Op] {
        &self.operations
    }

    /// Largest number of value-stack slots the body grows beyond its
    /// frame bottom; used by the interpreter's overflow check at call
    /// time.
    pub fn max_stack_size(&self) -> usize {
        self.max_stack_size
    }
}

/// A frozen bytecode module.
#[derive(Debug, Clone)]
pub struct Module<N: Number> {
    entry_point: Vec<Op>,
    const_table: Vec<N>,
    user_defined_operators: Vec<UserDefinedFunction>,
    variables: Vec<String>,
}

impl<N: Number> Module<N> {
    pub fn new(
        entry_point: Vec<Op>,
        const_table: Vec<N>,
        user_defined_operators: Vec<UserDefinedFunction>,
        variables: Vec<String>,
    ) -> Self {
        Self {
            entry_point,
            const_table,
            user_defined_operators,
            variables,
        }
    }

    pub fn entry_point(&self) -> &[Op] {
        &self.entry_point
    }

    pub fn const_table(&self) -> &[N] {
        &self.const_table
    }

    pub fn user_defined_operators(&self) -> &[UserDefinedFunction] {
        &self.user_defined_operators
    }

    /// Variable names in index order; the interpreter hydrates its
    /// variable array from these names and writes the values back at
    /// halt.
    pub fn variables(&self) -> &[String] {
        &self.variables
    }

    /// Flattens the entry point and every operator body into one
    /// contiguous operation array.
    ///
    /// Branch targets inside an operator body are rewritten from
    /// function-relative to absolute addresses, `Call` immediates are
    /// rewritten from operator numbers to entry addresses, and the
    /// returned side table carries each callee's maximum stack size at
    /// its entry address.
    pub fn flatten(&self) -> (Vec<Op>, Vec<usize>) {
        let total: usize = self.entry_point.len()
            + self
                .user_defined_operators
                .iter()
                .map(|op| op.operations().len())
                .sum::<usize>();

        let mut result: Vec<Op> = Vec::with_capacity(total);
        result.extend_from_slice(&self.entry_point);

        let mut start_addresses: Vec<usize> = Vec::with_capacity(self.user_defined_operators.len());
        for function in &self.user_defined_operators {
            let start_address = result.len();
            start_addresses.push(start_address);

            for &operation in function.operations() {
                let mut relocated = operation;
                if relocated.opcode.is_branch() {
                    relocated.value += start_address as i16;
                }
                result.push(relocated);
            }
        }

        let mut max_stack_sizes = vec![0usize; result.len()];
        for i in 0..result.len() {
            if result[i].opcode == Opcode::Call {
                let operator_no = result[i].value as usize;
                let start_address = start_addresses[operator_no];
                result[i].value = start_address as i16;
                max_stack_sizes[start_address] =
                    self.user_defined_operators[operator_no].max_stack_size();
            }
        }

        (result, max_stack_sizes)
    }
}

impl<N: Number> fmt::Display for Module<N> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Module [")?;

        writeln!(f, "    EntryPoint:")?;
        for (address, op) in self.entry_point.iter().enumerate() {
            writeln!(f, "        {:4}: {}", address, op)?;
        }

        for function in &self.user_defined_operators {
            writeln!(
                f,
                "    Operator \"{}\" (numOperands = {}, maxStackSize = {}):",
                function.definition().name(),
                function.definition().num_operands(),
                function.max_stack_size()
            )?;
            for (address, op) in function.operations().iter().enumerate() {
                writeln!(f, "        {:4}: {}", address, op)?;
            }
        }

        if !self.const_table.is_empty() {
            writeln!(f, "    ConstTable:")?;
            for (index, value) in self.const_table.iter().enumerate() {
                writeln!(f, "        {:4}: {}", index, value)?;
            }
        }

        if !self.variables.is_empty() {
            writeln!(f, "    Variables:")?;
            for (index, name) in self.variables.iter().enumerate() {
                writeln!(f, "        {:4}: \"{}\"", index, name)?;
            }
        }

        write!(f, "]")
    }
}
