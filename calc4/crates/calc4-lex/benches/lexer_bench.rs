use calc4_ast::CompilationContext;
use calc4_lex::lex;
use criterion::{black_box, criterion_group, criterion_main, Criterion};

const FIB: &str = "D[fib|n|n<=1?n?(n-1){fib}+(n-2){fib}] 10{fib}";
const HELLO: &str = "72P101P108P108P111P10P";

fn bench_lexer(c: &mut Criterion) {
    c.bench_function("lex_fib", |b| {
        b.iter(|| {
            let mut context: CompilationContext<i64> = CompilationContext::new();
            lex(black_box(FIB), &mut context).unwrap()
        })
    });

    c.bench_function("lex_hello", |b| {
        b.iter(|| {
            let mut context: CompilationContext<i64> = CompilationContext::new();
            lex(black_box(HELLO), &mut context).unwrap()
        })
    });
}

criterion_group!(benches, bench_lexer);
criterion_main!(benches);
