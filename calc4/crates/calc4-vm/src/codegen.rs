//! Stack-machine code generator.
//!
//! Every user-defined operator and the entry expression is emitted as an
//! independent function: a linear operation sequence that starts with
//! label 0 (the function's begin label, the branch target of tail-call
//! rewrites) and ends in `Return` (operators) or `Halt` (entry). After
//! emission, label operations are stripped and branch immediates are
//! rewritten to function-relative addresses; [`Module::flatten`] later
//! links all functions into one contiguous array.
//!
//! A running stack-size counter tracks each operation's effect. Going
//! negative, or ending a function with anything but exactly one value,
//! is a compiler bug and reported as an assertion error.

use std::rc::Rc;

use rustc_hash::FxHashMap;

use calc4_ast::{BinaryOp, CompilationContext, Expr, OperatorDefinition};
use calc4_util::{CodegenError, CodegenResult, Number};

use crate::module::{Module, Op, Opcode, UserDefinedFunction};

/// Options of the code generator.
#[derive(Debug, Clone, Copy, Default)]
pub struct CodegenOptions {
    /// Emit `DivChecked`/`ModChecked` so a zero divisor raises instead
    /// of going through the unchecked operation.
    pub check_zero_division: bool,
}

/// Label 0 is the function entry; self tail calls branch to it.
const OPERATOR_BEGIN_LABEL: i16 = 0;

/// Lowers an expression tree plus its compilation context to a bytecode
/// module.
pub fn generate_module<N: Number>(
    expr: &Rc<Expr<N>>,
    context: &CompilationContext<N>,
    options: CodegenOptions,
) -> CodegenResult<Module<N>> {
    let definitions: Vec<OperatorDefinition> = context
        .implements()
        .map(|implement| implement.definition().clone())
        .collect();
    let operator_numbers: FxHashMap<OperatorDefinition, usize> = definitions
        .iter()
        .enumerate()
        .map(|(number, definition)| (definition.clone(), number))
        .collect();

    let mut const_table: Vec<N> = Vec::new();
    let mut variable_indices: FxHashMap<String, usize> = FxHashMap::default();
    let mut variable_names: Vec<String> = Vec::new();

    // Generate user-defined operators' code.
    let mut user_defined_operators: Vec<UserDefinedFunction> = Vec::new();
    for implement in context.implements() {
        let definition = implement.definition().clone();
        let body = implement.operator().ok_or_else(|| {
            CodegenError::assertion(format!(
                "operator \"{}\" has no body",
                definition.name()
            ))
        })?;

        let mut generator = Generator {
            options,
            const_table: &mut const_table,
            operator_numbers: &operator_numbers,
            definitions: &definitions,
            definition: Some(definition.clone()),
            variable_indices: &mut variable_indices,
            variable_names: &mut variable_names,
            operations: Vec::new(),
            next_label: 0,
            stack_size: 0,
            max_stack_size: 0,
        };
        generator.generate(body)?;

        if generator.stack_size != 0 {
            return Err(CodegenError::assertion(format!(
                "stack size is not zero: {}",
                generator.stack_size
            )));
        }

        let max_stack_size = generator.max_stack_size as usize;
        let operations = generator.operations;
        user_defined_operators.push(UserDefinedFunction::new(
            definition,
            operations,
            max_stack_size,
        ));
    }

    // Generate the entry point.
    let entry_point = {
        let mut generator = Generator {
            options,
            const_table: &mut const_table,
            operator_numbers: &operator_numbers,
            definitions: &definitions,
            definition: None,
            variable_indices: &mut variable_indices,
            variable_names: &mut variable_names,
            operations: Vec::new(),
            next_label: 0,
            stack_size: 0,
            max_stack_size: 0,
        };
        generator.generate(expr)?;

        if generator.stack_size != 0 {
            return Err(CodegenError::assertion(format!(
                "stack size is not zero: {}",
                generator.stack_size
            )));
        }

        generator.operations
    };

    Ok(Module::new(
        entry_point,
        const_table,
        user_defined_operators,
        variable_names,
    ))
}

struct Generator<'a, N: Number> {
    options: CodegenOptions,
    const_table: &'a mut Vec<N>,
    operator_numbers: &'a FxHashMap<OperatorDefinition, usize>,
    definitions: &'a [OperatorDefinition],
    /// The operator being compiled, `None` for the entry expression.
    definition: Option<OperatorDefinition>,
    variable_indices: &'a mut FxHashMap<String, usize>,
    variable_names: &'a mut Vec<String>,
    operations: Vec<Op>,
    next_label: i16,
    stack_size: i32,
    max_stack_size: i32,
}

impl<'a, N: Number> Generator<'a, N> {
    fn generate(&mut self, expr: &Rc<Expr<N>>) -> CodegenResult<()> {
        let begin = self.new_label();
        debug_assert_eq!(begin, OPERATOR_BEGIN_LABEL);
        self.add_operation(Opcode::Label, begin)?;

        self.emit(expr)?;

        // Exactly the function's result value must remain.
        if self.stack_size != 1 {
            return Err(CodegenError::assertion(format!(
                "stack size is {} at function end",
                self.stack_size
            )));
        }

        match &self.definition {
            Some(definition) => {
                let arity = definition.num_operands() as i16;
                self.add_operation(Opcode::Return, arity)?;
            }
            None => self.add_operation(Opcode::Halt, 0)?,
        }

        self.resolve_labels();
        Ok(())
    }

    /// Strips label operations and rewrites branch targets to
    /// function-relative addresses.
    fn resolve_labels(&mut self) {
        let mut label_addresses: FxHashMap<i16, i16> = FxHashMap::default();
        let mut resolved: Vec<Op> = Vec::with_capacity(self.operations.len());

        for &operation in &self.operations {
            if operation.opcode == Opcode::Label {
                label_addresses.insert(operation.value, resolved.len() as i16);
            } else {
                resolved.push(operation);
            }
        }

        for operation in &mut resolved {
            if operation.opcode.is_branch() {
                operation.value = label_addresses[&operation.value];
            }
        }

        self.operations = resolved;
    }

    fn emit(&mut self, expr: &Rc<Expr<N>>) -> CodegenResult<()> {
        match &**expr {
            Expr::Zero | Expr::Define => self.add_operation(Opcode::LoadConst, 0),

            Expr::Precomputed { value } => match value.to_i16_exact() {
                Some(immediate) => self.add_operation(Opcode::LoadConst, immediate),
                None => {
                    // The constant exceeds the 16-bit immediate; spill it
                    // to the constant table.
                    let number = self.const_table.len();
                    self.const_table.push(*value);
                    self.add_operation(Opcode::LoadConstTable, number as i16)
                }
            },

            Expr::Operand { index } => {
                let arity = match &self.definition {
                    Some(definition) => definition.num_operands(),
                    None => {
                        return Err(CodegenError::assertion(
                            "operand reference outside a user-defined operator",
                        ))
                    }
                };
                self.add_operation(Opcode::LoadArg, argument_address(arity, *index))
            }

            Expr::LoadVariable { name } => {
                let index = self.variable_index(name);
                self.add_operation(Opcode::LoadVariable, index)
            }

            Expr::StoreVariable { operand, name } => {
                self.emit(operand)?;
                let index = self.variable_index(name);
                self.add_operation(Opcode::StoreVariable, index)
            }

            Expr::LoadArray { index } => {
                self.emit(index)?;
                self.add_operation(Opcode::LoadArrayElement, 0)
            }

            Expr::StoreArray { value, index } => {
                self.emit(value)?;
                self.emit(index)?;
                self.add_operation(Opcode::StoreArrayElement, 0)
            }

            Expr::Input => self.add_operation(Opcode::Input, 0),

            Expr::PrintChar { character } => {
                self.emit(character)?;
                self.add_operation(Opcode::PrintChar, 0)
            }

            Expr::Parenthesis { exprs } => {
                for (i, child) in exprs.iter().enumerate() {
                    self.emit(child)?;
                    if i < exprs.len() - 1 {
                        self.add_operation(Opcode::Pop, 0)?;
                    }
                }
                Ok(())
            }

            Expr::Decimal { operand, digit } => {
                self.emit(operand)?;
                self.add_operation(Opcode::LoadConst, 10)?;
                self.add_operation(Opcode::Mult, 0)?;
                self.add_operation(Opcode::LoadConst, *digit as i16)?;
                self.add_operation(Opcode::Add, 0)
            }

            Expr::Binary { left, right, op } => match op {
                BinaryOp::Add => {
                    self.emit(left)?;
                    self.emit(right)?;
                    self.add_operation(Opcode::Add, 0)
                }
                BinaryOp::Sub => {
                    self.emit(left)?;
                    self.emit(right)?;
                    self.add_operation(Opcode::Sub, 0)
                }
                BinaryOp::Mult => {
                    self.emit(left)?;
                    self.emit(right)?;
                    self.add_operation(Opcode::Mult, 0)
                }
                BinaryOp::Div => {
                    self.emit(left)?;
                    self.emit(right)?;
                    let opcode = if self.options.check_zero_division {
                        Opcode::DivChecked
                    } else {
                        Opcode::Div
                    };
                    self.add_operation(opcode, 0)
                }
                BinaryOp::Mod => {
                    self.emit(left)?;
                    self.emit(right)?;
                    let opcode = if self.options.check_zero_division {
                        Opcode::ModChecked
                    } else {
                        Opcode::Mod
                    };
                    self.add_operation(opcode, 0)
                }

                // Comparisons and short-circuit logicals lower through
                // the condition emitter so the result is materialized as
                // 0/1 by two converging branches.
                BinaryOp::Equal
                | BinaryOp::NotEqual
                | BinaryOp::LessThan
                | BinaryOp::LessThanOrEqual
                | BinaryOp::GreaterThanOrEqual
                | BinaryOp::GreaterThan
                | BinaryOp::LogicalAnd
                | BinaryOp::LogicalOr => {
                    let if_true_label = self.new_label();
                    let end_label = self.new_label();

                    self.emit_condition_goto(expr, if_true_label, true)?;
                    self.add_operation(Opcode::LoadConst, 0)?;
                    self.add_operation(Opcode::Goto, end_label)?;
                    self.add_operation(Opcode::Label, if_true_label)?;
                    self.add_operation(Opcode::LoadConst, 1)?;
                    self.add_operation(Opcode::Label, end_label)?;

                    // Both LoadConst operations were counted, but only
                    // one path executes; correct for the merge.
                    self.add_stack_size(-1)
                }
            },

            Expr::Conditional {
                condition,
                if_true,
                if_false,
            } => {
                let if_true_label = self.new_label();
                let end_label = self.new_label();

                self.emit_condition_goto(condition, if_true_label, true)?;

                let saved_stack_size = self.stack_size;
                self.emit(if_false)?;

                // A false branch that already ends in an unconditional
                // Goto was finished by a tail-call rewrite; adding the
                // jump to the merge point would be dead code.
                let last = self
                    .operations
                    .iter()
                    .rev()
                    .find(|operation| operation.opcode != Opcode::Label);
                if matches!(last, Some(operation) if operation.opcode != Opcode::Goto) {
                    self.add_operation(Opcode::Goto, end_label)?;
                }

                self.add_operation(Opcode::Label, if_true_label)?;
                self.stack_size = saved_stack_size;
                self.emit(if_true)?;
                self.add_operation(Opcode::Label, end_label)?;
                Ok(())
            }

            Expr::UserDefined {
                definition,
                operands,
                is_tail_call,
            } => {
                for operand in operands {
                    self.emit(operand)?;
                }

                if self.is_replaceable_with_jump(definition, *is_tail_call) {
                    // Overwrite the current frame's arguments in reverse
                    // order, then restart the function: the recursion
                    // becomes a loop.
                    let arity = definition.num_operands();
                    for i in (0..operands.len()).rev() {
                        self.add_operation(Opcode::StoreArg, argument_address(arity, i))?;
                    }
                    self.add_operation(Opcode::Goto, OPERATOR_BEGIN_LABEL)?;

                    // No call happens, but the branch target will leave
                    // one return value; account for it.
                    self.add_stack_size(1)
                } else {
                    let number = self.operator_numbers.get(definition).copied().ok_or_else(
                        || {
                            CodegenError::assertion(format!(
                                "call of unregistered operator \"{}\"",
                                definition.name()
                            ))
                        },
                    )?;
                    self.add_operation(Opcode::Call, number as i16)
                }
            }
        }
    }

    /// Emits `condition` as control flow: a jump to `label` when the
    /// condition is true (or false, when `goto_if_true` is false),
    /// falling through otherwise.
    ///
    /// Comparisons map onto the dedicated compare-and-branch opcodes,
    /// negating by branching around an unconditional jump where the
    /// opcode set has no direct form. Logicals become short-circuit
    /// branch chains. Any other expression is evaluated as a value and
    /// tested with `GotoIfTrue`/`GotoIfFalse`.
    fn emit_condition_goto(
        &mut self,
        condition: &Rc<Expr<N>>,
        label: i16,
        goto_if_true: bool,
    ) -> CodegenResult<()> {
        if let Expr::Parenthesis { exprs } = &**condition {
            // Leading children run for their effects; the last child is
            // the condition.
            for (i, child) in exprs.iter().enumerate() {
                if i < exprs.len() - 1 {
                    self.emit(child)?;
                    self.add_operation(Opcode::Pop, 0)?;
                } else {
                    self.emit_condition_goto(child, label, goto_if_true)?;
                }
            }
            return Ok(());
        }

        if let Expr::Binary { left, right, op } = &**condition {
            match op {
                BinaryOp::Equal => {
                    self.emit(left)?;
                    self.emit(right)?;
                    return self.branch_on_compare(Opcode::GotoIfEqual, label, goto_if_true);
                }
                BinaryOp::NotEqual => {
                    self.emit(left)?;
                    self.emit(right)?;
                    return self.branch_on_compare(Opcode::GotoIfEqual, label, !goto_if_true);
                }
                BinaryOp::LessThan => {
                    self.emit(left)?;
                    self.emit(right)?;
                    return self.branch_on_compare(Opcode::GotoIfLessThan, label, goto_if_true);
                }
                BinaryOp::LessThanOrEqual => {
                    self.emit(left)?;
                    self.emit(right)?;
                    return self.branch_on_compare(
                        Opcode::GotoIfLessThanOrEqual,
                        label,
                        goto_if_true,
                    );
                }
                BinaryOp::GreaterThanOrEqual => {
                    self.emit(left)?;
                    self.emit(right)?;
                    return self.branch_on_compare(Opcode::GotoIfLessThan, label, !goto_if_true);
                }
                BinaryOp::GreaterThan => {
                    self.emit(left)?;
                    self.emit(right)?;
                    return self.branch_on_compare(
                        Opcode::GotoIfLessThanOrEqual,
                        label,
                        !goto_if_true,
                    );
                }
                BinaryOp::LogicalAnd => {
                    if goto_if_true {
                        let if_false_label = self.new_label();
                        self.emit_condition_goto(left, if_false_label, false)?;
                        self.emit_condition_goto(right, label, true)?;
                        self.add_operation(Opcode::Label, if_false_label)?;
                    } else {
                        self.emit_condition_goto(left, label, false)?;
                        self.emit_condition_goto(right, label, false)?;
                    }
                    return Ok(());
                }
                BinaryOp::LogicalOr => {
                    if goto_if_true {
                        self.emit_condition_goto(left, label, true)?;
                        self.emit_condition_goto(right, label, true)?;
                    } else {
                        let end_label = self.new_label();
                        self.emit_condition_goto(left, end_label, true)?;
                        self.emit_condition_goto(right, label, false)?;
                        self.add_operation(Opcode::Label, end_label)?;
                    }
                    return Ok(());
                }
                _ => {}
            }
        }

        self.emit(condition)?;
        let opcode = if goto_if_true {
            Opcode::GotoIfTrue
        } else {
            Opcode::GotoIfFalse
        };
        self.add_operation(opcode, label)
    }

    /// Emits a compare-and-branch. When `jump_on_match` is false the
    /// comparison is negated by jumping over an unconditional `Goto`.
    fn branch_on_compare(
        &mut self,
        opcode: Opcode,
        label: i16,
        jump_on_match: bool,
    ) -> CodegenResult<()> {
        if jump_on_match {
            self.add_operation(opcode, label)
        } else {
            let end_label = self.new_label();
            self.add_operation(opcode, end_label)?;
            self.add_operation(Opcode::Goto, label)?;
            self.add_operation(Opcode::Label, end_label)
        }
    }

    fn is_replaceable_with_jump(
        &self,
        callee: &OperatorDefinition,
        is_tail_call: Option<bool>,
    ) -> bool {
        self.definition.as_ref() == Some(callee) && is_tail_call.unwrap_or(false)
    }

    fn add_operation(&mut self, opcode: Opcode, value: i16) -> CodegenResult<()> {
        self.operations.push(Op::new(opcode, value));

        match opcode {
            Opcode::Push
            | Opcode::LoadConst
            | Opcode::LoadConstTable
            | Opcode::LoadArg
            | Opcode::LoadVariable
            | Opcode::Input => self.add_stack_size(1),

            Opcode::Pop
            | Opcode::StoreArg
            | Opcode::StoreArrayElement
            | Opcode::Add
            | Opcode::Sub
            | Opcode::Mult
            | Opcode::Div
            | Opcode::DivChecked
            | Opcode::Mod
            | Opcode::ModChecked
            | Opcode::GotoIfTrue
            | Opcode::GotoIfFalse
            | Opcode::Return
            | Opcode::Halt => self.add_stack_size(-1),

            Opcode::StoreVariable
            | Opcode::LoadArrayElement
            | Opcode::PrintChar
            | Opcode::Goto
            | Opcode::Label => Ok(()),

            Opcode::GotoIfEqual | Opcode::GotoIfLessThan | Opcode::GotoIfLessThanOrEqual => {
                self.add_stack_size(-2)
            }

            Opcode::Call => {
                let arity = self.definitions[value as usize].num_operands() as i32;
                self.add_stack_size(-(arity - 1))
            }
        }
    }

    fn add_stack_size(&mut self, delta: i32) -> CodegenResult<()> {
        let new_stack_size = self.stack_size + delta;
        if new_stack_size < 0 {
            return Err(CodegenError::assertion(format!(
                "stack size is negative: {}",
                new_stack_size
            )));
        }

        self.max_stack_size = self.max_stack_size.max(new_stack_size);
        self.stack_size = new_stack_size;
        Ok(())
    }

    fn variable_index(&mut self, name: &str) -> i16 {
        if let Some(&index) = self.variable_indices.get(name) {
            return index as i16;
        }

        let index = self.variable_names.len();
        self.variable_indices.insert(name.to_string(), index);
        self.variable_names.push(name.to_string());
        index as i16
    }

    fn new_label(&mut self) -> i16 {
        let label = self.next_label;
        self.next_label += 1;
        label
    }
}

/// Arguments sit below the frame bottom: argument `index` of an
/// `arity`-ary operator lives at `bottom[-(arity - index)]`.
fn argument_address(arity: usize, index: usize) -> i16 {
    (arity - index) as i16
}
