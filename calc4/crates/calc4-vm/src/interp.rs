//! Stack-machine interpreter.
//!
//! Two fixed-capacity stacks drive execution: a value stack of number
//! cells and a pointer stack holding, per active frame, the caller's
//! program counter and frame-bottom offset. `bottom` marks where the
//! current callee's first slot lives; arguments sit at
//! `bottom[-arity..bottom]`.
//!
//! Dispatch is one `match` per fetched operation, one state transition
//! per dispatch. Execution is strictly single-threaded and never
//! suspends; the only external wait is the `Input` operation blocking on
//! the input source.
//!
//! At entry the variable array is hydrated from the execution state by
//! name; `Halt` writes the values back and returns the result left on
//! the stack.

use calc4_rt::{ArraySource, ExecutionState, InputSource, Printer, VariableSource};
use calc4_util::{Number, RuntimeError, RuntimeResult};

use crate::module::{Module, Opcode};

/// Capacity of the value stack, in number cells.
pub const STACK_SIZE: usize = 1 << 20;

/// Capacity of the pointer stack, in entries.
pub const PTR_STACK_SIZE: usize = 1 << 20;

/// Executes a module against an execution state.
///
/// A runtime error aborts the execution but leaves the module intact;
/// running it again on a fresh state starts from scratch.
pub fn execute_module<N, V, A, I, P>(
    module: &Module<N>,
    state: &mut ExecutionState<N, V, A, I, P>,
) -> RuntimeResult<N>
where
    N: Number,
    V: VariableSource<N>,
    A: ArraySource<N>,
    I: InputSource,
    P: Printer,
{
    // Hydrate variables from the execution state.
    let mut variables: Vec<N> = module
        .variables()
        .iter()
        .map(|name| state.variables().get(name))
        .collect();

    let (operations, max_stack_sizes) = module.flatten();

    let mut stack = vec![N::ZERO; STACK_SIZE];
    let mut ptr_stack = vec![0usize; PTR_STACK_SIZE];

    // `top` is the next free slot; `bottom` is the current frame's base.
    let mut top: usize = 0;
    let mut bottom: usize = 0;
    let mut ptr_top: usize = 0;
    let mut pc: usize = 0;

    loop {
        let op = operations[pc];
        match op.opcode {
            Opcode::Push => {
                stack[top] = N::ZERO;
                top += 1;
                pc += 1;
            }

            Opcode::Pop => {
                top -= 1;
                pc += 1;
            }

            Opcode::LoadConst => {
                stack[top] = N::from_i32(op.value as i32);
                top += 1;
                pc += 1;
            }

            Opcode::LoadConstTable => {
                stack[top] = module.const_table()[op.value as usize];
                top += 1;
                pc += 1;
            }

            Opcode::LoadArg => {
                stack[top] = stack[bottom - op.value as usize];
                top += 1;
                pc += 1;
            }

            Opcode::StoreArg => {
                top -= 1;
                stack[bottom - op.value as usize] = stack[top];
                pc += 1;
            }

            Opcode::LoadVariable => {
                stack[top] = variables[op.value as usize];
                top += 1;
                pc += 1;
            }

            Opcode::StoreVariable => {
                // Non-destructive: the stored value stays as the result.
                variables[op.value as usize] = stack[top - 1];
                pc += 1;
            }

            Opcode::LoadArrayElement => {
                stack[top - 1] = state.array().get(stack[top - 1]);
                pc += 1;
            }

            Opcode::StoreArrayElement => {
                // Pops the index; the stored value stays as the result.
                top -= 1;
                let index = stack[top];
                let value = stack[top - 1];
                state.array_mut().set(index, value);
                pc += 1;
            }

            Opcode::Input => {
                stack[top] = N::from_i32(state.get_char());
                top += 1;
                pc += 1;
            }

            Opcode::PrintChar => {
                let byte = stack[top - 1].to_byte();
                state.print_char(byte);
                stack[top - 1] = N::ZERO;
                pc += 1;
            }

            Opcode::Add => {
                top -= 1;
                stack[top - 1] = stack[top - 1].wrapping_add(stack[top]);
                pc += 1;
            }

            Opcode::Sub => {
                top -= 1;
                stack[top - 1] = stack[top - 1].wrapping_sub(stack[top]);
                pc += 1;
            }

            Opcode::Mult => {
                top -= 1;
                stack[top - 1] = stack[top - 1].wrapping_mul(stack[top]);
                pc += 1;
            }

            Opcode::Div | Opcode::DivChecked => {
                top -= 1;
                let divisor = stack[top];
                if divisor.is_zero() {
                    return Err(RuntimeError::ZeroDivision);
                }
                stack[top - 1] = stack[top - 1].wrapping_div(divisor);
                pc += 1;
            }

            Opcode::Mod | Opcode::ModChecked => {
                top -= 1;
                let divisor = stack[top];
                if divisor.is_zero() {
                    return Err(RuntimeError::ZeroDivision);
                }
                stack[top - 1] = stack[top - 1].wrapping_rem(divisor);
                pc += 1;
            }

            Opcode::Goto => {
                pc = op.value as usize;
            }

            Opcode::GotoIfTrue => {
                top -= 1;
                if !stack[top].is_zero() {
                    pc = op.value as usize;
                } else {
                    pc += 1;
                }
            }

            Opcode::GotoIfFalse => {
                top -= 1;
                if stack[top].is_zero() {
                    pc = op.value as usize;
                } else {
                    pc += 1;
                }
            }

            Opcode::GotoIfEqual => {
                top -= 2;
                if stack[top] == stack[top + 1] {
                    pc = op.value as usize;
                } else {
                    pc += 1;
                }
            }

            Opcode::GotoIfLessThan => {
                top -= 2;
                if stack[top] < stack[top + 1] {
                    pc = op.value as usize;
                } else {
                    pc += 1;
                }
            }

            Opcode::GotoIfLessThanOrEqual => {
                top -= 2;
                if stack[top] <= stack[top + 1] {
                    pc = op.value as usize;
                } else {
                    pc += 1;
                }
            }

            Opcode::Call => {
                let target = op.value as usize;

                // The callee's peak stack use is known; fail fast
                // instead of running into the capacity mid-body.
                if top + max_stack_sizes[target] >= STACK_SIZE {
                    return Err(RuntimeError::StackOverflow);
                }
                if ptr_top + 2 >= PTR_STACK_SIZE {
                    return Err(RuntimeError::StackOverflow);
                }

                ptr_stack[ptr_top] = pc;
                ptr_top += 1;
                ptr_stack[ptr_top] = bottom;
                ptr_top += 1;

                bottom = top;
                pc = target;
            }

            Opcode::Return => {
                let result = stack[top - 1];

                // Reclaim the arguments, leaving one slot for the result.
                top = bottom - op.value as usize + 1;
                stack[top - 1] = result;

                ptr_top -= 1;
                bottom = ptr_stack[ptr_top];
                ptr_top -= 1;
                pc = ptr_stack[ptr_top] + 1;
            }

            Opcode::Halt => {
                for (index, name) in module.variables().iter().enumerate() {
                    state.variables_mut().set(name, variables[index]);
                }
                return Ok(stack[top - 1]);
            }

            Opcode::Label => {
                unreachable!("label operations are stripped before execution")
            }
        }
    }
}
