//! Full-pipeline tests of the code generator and interpreter.

use calc4_ast::CompilationContext;
use calc4_lex::lex;
use calc4_opt::optimize;
use calc4_par::parse;
use calc4_rt::{
    ArraySource, BufferedInputSource, BufferedPrinter, DefaultArraySource, DefaultVariableSource,
    ExecutionState, VariableSource,
};
use calc4_util::{RuntimeError, RuntimeResult};

use crate::{execute_module, generate_module, CodegenOptions, Module, Opcode};

type TestState = ExecutionState<
    i64,
    DefaultVariableSource<i64>,
    DefaultArraySource<i64>,
    BufferedInputSource,
    BufferedPrinter,
>;

fn compile(source: &str, optimized: bool) -> (Module<i64>, CompilationContext<i64>) {
    let mut context: CompilationContext<i64> = CompilationContext::new();
    let tokens = lex(source, &mut context).expect("lex");
    let mut expr = parse(&tokens, &mut context).expect("parse");
    if optimized {
        expr = optimize(&mut context, &expr);
    }
    let module = generate_module(
        &expr,
        &context,
        CodegenOptions {
            check_zero_division: true,
        },
    )
    .expect("codegen");
    (module, context)
}

fn run_with(source: &str, input: &str, optimized: bool) -> (RuntimeResult<i64>, String, TestState) {
    let (module, _) = compile(source, optimized);
    let mut state = ExecutionState::with_io(
        BufferedInputSource::new(input.as_bytes().to_vec()),
        BufferedPrinter::new(),
    );
    let result = execute_module(&module, &mut state);
    let output = state.printer().to_string_lossy();
    (result, output, state)
}

fn run(source: &str, optimized: bool) -> i64 {
    let (result, _, _) = run_with(source, "", optimized);
    result.expect("execution")
}

#[test]
fn arithmetic_chains_left_to_right() {
    for optimized in [false, true] {
        assert_eq!(run("1+2*3-10", optimized), -1);
        assert_eq!(run("7/2", optimized), 3);
        assert_eq!(run("7%2", optimized), 1);
    }
}

#[test]
fn digit_chains_build_literals() {
    for optimized in [false, true] {
        assert_eq!(run("12345678", optimized), 12345678);
        assert_eq!(run("0", optimized), 0);
    }
}

#[test]
fn large_constants_spill_to_the_const_table() {
    // 12345678 does not fit the 16-bit immediate; the optimized build
    // must route it through the constant table.
    let (module, _) = compile("12345678", true);
    assert_eq!(module.const_table(), &[12345678]);
    assert!(module
        .entry_point()
        .iter()
        .any(|op| op.opcode == Opcode::LoadConstTable));

    let (module, _) = compile("123", true);
    assert!(module.const_table().is_empty());
}

#[test]
fn comparisons_yield_exactly_zero_or_one() {
    for optimized in [false, true] {
        assert_eq!(run("1<2", optimized), 1);
        assert_eq!(run("2<1", optimized), 0);
        assert_eq!(run("1<=1", optimized), 1);
        assert_eq!(run("1>=2", optimized), 0);
        assert_eq!(run("2>1", optimized), 1);
        assert_eq!(run("1==1", optimized), 1);
        assert_eq!(run("1!=1", optimized), 0);
        // The comparison result participates in arithmetic as 0/1.
        assert_eq!(run("(2>1)+(1>2)+5", optimized), 6);
    }
}

#[test]
fn conditionals_chain() {
    for optimized in [false, true] {
        assert_eq!(run("0?1?2", optimized), 2);
        assert_eq!(run("7?1?2", optimized), 1);
        assert_eq!(run("0?1?2?3?4", optimized), 3);
    }
}

#[test]
fn logicals_short_circuit() {
    for optimized in [false, true] {
        assert_eq!(run("1&&2?3?4", optimized), 3);
        assert_eq!(run("0&&2?3?4", optimized), 4);
        assert_eq!(run("1||0?3?4", optimized), 3);
        assert_eq!(run("0||0?3?4", optimized), 4);

        // The right side must not run when the left decides.
        let (result, output, _) = run_with("0&&(65P)", "", optimized);
        assert_eq!(result.unwrap(), 0);
        assert_eq!(output, "");

        let (result, output, _) = run_with("1||(65P)", "", optimized);
        assert_eq!(result.unwrap(), 1);
        assert_eq!(output, "");

        let (result, output, _) = run_with("1&&(65P)", "", optimized);
        assert_eq!(result.unwrap(), 0);
        assert_eq!(output, "A");

        // Even a division by zero is skipped.
        assert_eq!(run("0&&(1/0)?1?2", optimized), 2);
        assert_eq!(run("1||(1/0)?1?2", optimized), 1);
    }
}

#[test]
fn user_defined_operators_evaluate() {
    for optimized in [false, true] {
        assert_eq!(run("D[add|x,y|x+y] 12{add}23", optimized), 35);
        assert_eq!(run("D[get12345||12345] {get12345}+{get12345}", optimized), 24690);
        assert_eq!(
            run("D[fact|x,y|x==0?y?(x-1){fact}(x*y)] 10{fact}1", optimized),
            3628800
        );
        assert_eq!(
            run("D[fib|n|n<=1?n?(n-1){fib}+(n-2){fib}] 10{fib}", optimized),
            55
        );
        assert_eq!(
            run(
                "D[tarai|x,y,z|x <= y ? y ? (((x - 1){tarai}y{tarai}z){tarai}((y - 1){tarai}z{tarai}x){tarai}((z - 1){tarai}x{tarai}y))] 10{tarai}5{tarai}5",
                optimized
            ),
            5
        );
    }
}

#[test]
fn print_char_outputs_bytes_and_returns_zero() {
    for optimized in [false, true] {
        let (result, output, _) = run_with("72P101P108P108P111P10P", "", optimized);
        assert_eq!(result.unwrap(), 0);
        assert_eq!(output, "Hello\n");
    }
}

#[test]
fn input_returns_bytes_then_minus_one() {
    for optimized in [false, true] {
        let (result, _, _) = run_with("I", "A", optimized);
        assert_eq!(result.unwrap(), 65);

        let (result, _, _) = run_with("I", "", optimized);
        assert_eq!(result.unwrap(), -1);

        let (result, _, _) = run_with("I+I", "AB", optimized);
        assert_eq!(result.unwrap(), 131);
    }
}

#[test]
fn variables_persist_to_the_execution_state() {
    for optimized in [false, true] {
        let (result, _, state) = run_with("(123S)L*L", "", optimized);
        assert_eq!(result.unwrap(), 15129);
        assert_eq!(state.variables().get(""), 123);

        let (result, _, state) = run_with("((100+20+3)S[var])L[var]*L[var]", "", optimized);
        assert_eq!(result.unwrap(), 15129);
        assert_eq!(state.variables().get("var"), 123);
        assert_eq!(state.variables().get(""), 0);
    }
}

#[test]
fn empty_and_named_variables_are_distinct() {
    for optimized in [false, true] {
        let (result, _, state) =
            run_with("D[set|x|xS] 7{set}LS[var1] L[zero]3{set}LS[var2] L[var1]*L[var2]", "", optimized);
        assert_eq!(result.unwrap(), 21);
        assert_eq!(state.variables().get("var1"), 7);
        assert_eq!(state.variables().get("var2"), 3);
    }
}

#[test]
fn array_store_leaves_value_and_writes_cell() {
    for optimized in [false, true] {
        let (result, _, state) = run_with("(5->0)", "", optimized);
        assert_eq!(result.unwrap(), 5);
        assert_eq!(state.array().get(0), 5);

        let (result, _, state) = run_with("(5->(0-1))((0-1)@)", "", optimized);
        assert_eq!(result.unwrap(), 5);
        assert_eq!(state.array().get(-1), 5);

        let (result, _, state) = run_with("(7->131072)((131072)@)", "", optimized);
        assert_eq!(result.unwrap(), 7);
        assert_eq!(state.array().get(131072), 7);

        assert_eq!(run("0@", optimized), 0);
    }
}

#[test]
fn zero_division_raises_when_checked() {
    for optimized in [false, true] {
        let (result, _, _) = run_with("1/0", "", optimized);
        assert_eq!(result.unwrap_err(), RuntimeError::ZeroDivision);

        let (result, _, _) = run_with("1%0", "", optimized);
        assert_eq!(result.unwrap_err(), RuntimeError::ZeroDivision);
    }
}

#[test]
fn runtime_error_leaves_module_reusable() {
    let (module, _) = compile("I/I", true);

    let mut state = ExecutionState::with_io(
        BufferedInputSource::new(b"\x04\x00".to_vec()),
        BufferedPrinter::new(),
    );
    assert_eq!(
        execute_module(&module, &mut state).unwrap_err(),
        RuntimeError::ZeroDivision
    );

    let mut state = ExecutionState::with_io(
        BufferedInputSource::new(b"\x04\x02".to_vec()),
        BufferedPrinter::new(),
    );
    assert_eq!(execute_module(&module, &mut state).unwrap(), 2);
}

#[test]
fn deep_self_tail_calls_run_in_constant_stack() {
    // The accumulator loop recurses a million deep; only the tail-call
    // rewrite keeps it within the fixed stacks.
    let source = "D[sum|n,acc|n==0?{acc}?(n-1){sum}({acc}+1)] 1000000{sum}0";
    assert_eq!(run(source, true), 1000000);

    let (result, _, _) = run_with(source, "", false);
    assert_eq!(result.unwrap_err(), RuntimeError::StackOverflow);
}

#[test]
fn tail_call_factorial_matches_naive_depth_behavior() {
    let source = "D[fact|x,y|x==0?y?(x-1){fact}(x*y)] 1000000{fact}1";
    // Wrapping multiplication; the value itself is unimportant, the
    // point is that the optimized build completes.
    let (result, _, _) = run_with(source, "", true);
    assert!(result.is_ok());

    let (result, _, _) = run_with(source, "", false);
    assert_eq!(result.unwrap_err(), RuntimeError::StackOverflow);
}

#[test]
fn non_tail_recursion_overflows_even_optimized() {
    let (result, _, _) = run_with("D[f|x|(x{f})+1] 1{f}", "", true);
    assert_eq!(result.unwrap_err(), RuntimeError::StackOverflow);
}

#[test]
fn tail_call_rewrite_replaces_call_with_branch() {
    let (module, _) = compile("D[sum|n,acc|n==0?{acc}?(n-1){sum}({acc}+1)] 10{sum}0", true);

    let function = &module.user_defined_operators()[0];
    let opcodes: Vec<Opcode> = function.operations().iter().map(|op| op.opcode).collect();
    assert!(opcodes.contains(&Opcode::StoreArg));
    assert!(!opcodes.contains(&Opcode::Call));
    // The rewritten call branches back to the function entry.
    assert!(function
        .operations()
        .iter()
        .any(|op| op.opcode == Opcode::Goto && op.value == 0));
}

#[test]
fn variables_table_orders_by_first_use() {
    let (module, _) = compile("1S[b] 2S[a] 3S[b]", true);
    assert_eq!(module.variables(), ["b", "a"]);
}

#[test]
fn wrapping_arithmetic_in_i32() {
    let mut context: CompilationContext<i32> = CompilationContext::new();
    let tokens = lex("2147483647+1", &mut context).expect("lex");
    let expr = parse(&tokens, &mut context).expect("parse");
    let module = generate_module(&expr, &context, CodegenOptions::default()).expect("codegen");

    let mut state: ExecutionState<i32, _, _, _, _> = ExecutionState::with_io(
        BufferedInputSource::new(Vec::new()),
        BufferedPrinter::new(),
    );
    assert_eq!(execute_module(&module, &mut state).unwrap(), i32::MIN);
}

#[test]
fn definitions_inside_operands_work() {
    for optimized in [false, true] {
        assert_eq!(
            run("D[select|a,b|a?a?b] (0{select}5) + (3{select}4)", optimized),
            8
        );
        assert_eq!(
            run(
                "D[pick|a,b,c|a?b?c] (0{pick}5{pick}9) + (1{pick}2{pick}3)",
                optimized
            ),
            11
        );
    }
}

#[test]
fn comment_styles_are_ignored() {
    for optimized in [false, true] {
        assert_eq!(run("1+// C++ style comment\n2", optimized), 3);
        assert_eq!(run("1+/* C style comment*/2", optimized), 3);
    }
}
