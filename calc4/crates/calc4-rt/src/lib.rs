//! calc4-rt - Execution State
//!
//! The mutable world a Calc4 program runs against: named variables, the
//! global array, an input source and a character printer. Executors
//! (the stack machine and the tree evaluator) borrow an
//! [`ExecutionState`] for the duration of one program execution; the
//! collaborators are not safe for concurrent use and are not shared.
//!
//! Reads of unwritten variables and array cells yield 0. Input returns
//! one byte as a non-negative integer, or -1 at end of input.

use rustc_hash::FxHashMap;

use calc4_util::Number;

/// Named mutable cells, default 0.
pub trait VariableSource<N: Number> {
    fn get(&self, name: &str) -> N;
    fn set(&mut self, name: &str, value: N);
}

/// The global array, keyed by the program's number type, default 0.
///
/// `get(i)` must equal the most recent `set(i, v)`, or 0 if none; the
/// dense/sparse split below is invisible to programs.
pub trait ArraySource<N: Number> {
    fn get(&self, index: N) -> N;
    fn set(&mut self, index: N, value: N);
}

/// Byte-oriented input; returns -1 at end of input, never an error.
pub trait InputSource {
    fn next_char(&mut self) -> i32;
}

/// Byte-oriented output sink.
pub trait Printer {
    fn print_char(&mut self, c: u8);
}

/// Default variable storage backed by a hash map.
#[derive(Debug, Default)]
pub struct DefaultVariableSource<N: Number> {
    variables: FxHashMap<String, N>,
}

impl<N: Number> DefaultVariableSource<N> {
    pub fn new() -> Self {
        Self {
            variables: FxHashMap::default(),
        }
    }

    /// All written variables, for inspection in tests and dumps.
    pub fn entries(&self) -> impl Iterator<Item = (&str, N)> {
        self.variables.iter().map(|(name, v)| (name.as_str(), *v))
    }
}

impl<N: Number> VariableSource<N> for DefaultVariableSource<N> {
    fn get(&self, name: &str) -> N {
        self.variables.get(name).copied().unwrap_or(N::ZERO)
    }

    fn set(&mut self, name: &str, value: N) {
        self.variables.insert(name.to_string(), value);
    }
}

/// Default global array: a dense vector for small non-negative indices
/// and a hash map for everything else (including negative indices).
#[derive(Debug)]
pub struct DefaultArraySource<N: Number> {
    dense: Vec<N>,
    sparse: FxHashMap<i64, N>,
}

/// Size of the dense fast path.
const DEFAULT_ARRAY_SIZE: usize = 1024;

impl<N: Number> DefaultArraySource<N> {
    pub fn new() -> Self {
        Self::with_dense_size(DEFAULT_ARRAY_SIZE)
    }

    pub fn with_dense_size(size: usize) -> Self {
        Self {
            dense: vec![N::ZERO; size],
            sparse: FxHashMap::default(),
        }
    }

    fn dense_index(&self, index: N) -> Option<usize> {
        let casted = index.to_i64();
        if (0..self.dense.len() as i64).contains(&casted) {
            Some(casted as usize)
        } else {
            None
        }
    }

    /// Written cells outside the dense range.
    pub fn sparse_entries(&self) -> impl Iterator<Item = (i64, N)> + '_ {
        self.sparse.iter().map(|(i, v)| (*i, *v))
    }
}

impl<N: Number> Default for DefaultArraySource<N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<N: Number> ArraySource<N> for DefaultArraySource<N> {
    fn get(&self, index: N) -> N {
        match self.dense_index(index) {
            Some(i) => self.dense[i],
            None => self
                .sparse
                .get(&index.to_i64())
                .copied()
                .unwrap_or(N::ZERO),
        }
    }

    fn set(&mut self, index: N, value: N) {
        match self.dense_index(index) {
            Some(i) => self.dense[i] = value,
            None => {
                if value.is_zero() {
                    // A zero store restores the default, so the entry
                    // can be dropped instead of kept.
                    self.sparse.remove(&index.to_i64());
                } else {
                    self.sparse.insert(index.to_i64(), value);
                }
            }
        }
    }
}

/// Input source reading from standard input one byte at a time.
#[derive(Debug, Default)]
pub struct StdInputSource;

impl InputSource for StdInputSource {
    fn next_char(&mut self) -> i32 {
        use std::io::Read;

        let mut buf = [0u8; 1];
        match std::io::stdin().read(&mut buf) {
            Ok(1) => i32::from(buf[0]),
            _ => -1,
        }
    }
}

/// Input source over an in-memory buffer.
#[derive(Debug)]
pub struct BufferedInputSource {
    buffer: Vec<u8>,
    next_index: usize,
}

impl BufferedInputSource {
    pub fn new(buffer: impl Into<Vec<u8>>) -> Self {
        Self {
            buffer: buffer.into(),
            next_index: 0,
        }
    }
}

impl InputSource for BufferedInputSource {
    fn next_char(&mut self) -> i32 {
        match self.buffer.get(self.next_index) {
            Some(&b) => {
                self.next_index += 1;
                i32::from(b)
            }
            None => -1,
        }
    }
}

/// Printer writing to standard output.
#[derive(Debug, Default)]
pub struct StdPrinter;

impl Printer for StdPrinter {
    fn print_char(&mut self, c: u8) {
        use std::io::Write;

        let mut stdout = std::io::stdout();
        let _ = stdout.write_all(&[c]);
        let _ = stdout.flush();
    }
}

/// Printer collecting output into an owned buffer.
#[derive(Debug, Default)]
pub struct BufferedPrinter {
    buffer: Vec<u8>,
}

impl BufferedPrinter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.buffer
    }

    /// The collected output, lossily decoded for assertions.
    pub fn to_string_lossy(&self) -> String {
        String::from_utf8_lossy(&self.buffer).into_owned()
    }
}

impl Printer for BufferedPrinter {
    fn print_char(&mut self, c: u8) {
        self.buffer.push(c);
    }
}

/// The execution state of one program run.
///
/// Created per execution and passed by reference to the executor; a
/// fresh state starts with all variables and array cells at 0.
pub struct ExecutionState<
    N: Number,
    V = DefaultVariableSource<N>,
    A = DefaultArraySource<N>,
    I = StdInputSource,
    P = StdPrinter,
> where
    V: VariableSource<N>,
    A: ArraySource<N>,
    I: InputSource,
    P: Printer,
{
    variable_source: V,
    array_source: A,
    input_source: I,
    printer: P,
    _number: std::marker::PhantomData<N>,
}

impl<N: Number> ExecutionState<N> {
    /// State with the default collaborators (stdin/stdout).
    pub fn new() -> Self {
        Self::with_io(StdInputSource, StdPrinter)
    }
}

impl<N: Number> Default for ExecutionState<N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<N, V, A, I, P> ExecutionState<N, V, A, I, P>
where
    N: Number,
    V: VariableSource<N>,
    A: ArraySource<N>,
    I: InputSource,
    P: Printer,
{
    pub fn with_sources(variable_source: V, array_source: A, input_source: I, printer: P) -> Self {
        Self {
            variable_source,
            array_source,
            input_source,
            printer,
            _number: std::marker::PhantomData,
        }
    }

    pub fn variables(&self) -> &V {
        &self.variable_source
    }

    pub fn variables_mut(&mut self) -> &mut V {
        &mut self.variable_source
    }

    pub fn array(&self) -> &A {
        &self.array_source
    }

    pub fn array_mut(&mut self) -> &mut A {
        &mut self.array_source
    }

    /// Reads one input byte, -1 at end of input.
    pub fn get_char(&mut self) -> i32 {
        self.input_source.next_char()
    }

    pub fn print_char(&mut self, c: u8) {
        self.printer.print_char(c);
    }

    pub fn printer(&self) -> &P {
        &self.printer
    }
}

impl<N, I, P> ExecutionState<N, DefaultVariableSource<N>, DefaultArraySource<N>, I, P>
where
    N: Number,
    I: InputSource,
    P: Printer,
{
    /// State with default storage and the given I/O collaborators.
    pub fn with_io(input_source: I, printer: P) -> Self {
        Self::with_sources(
            DefaultVariableSource::new(),
            DefaultArraySource::new(),
            input_source,
            printer,
        )
    }
}
