//! Compile-time and runtime errors. Both are fatal: the first one stops
//! compilation or execution.

use crate::value::ValueKind;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("line {line}: {kind}")]
pub struct CompileError {
    pub line: u32,
    pub kind: CompileErrorKind,
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum CompileErrorKind {
    #[error("expected {expected}, got '{found}'")]
    UnexpectedToken {
        expected: &'static str,
        found: String,
    },
    #[error("missing closing {0}")]
    MissingDelimiter(&'static str),
    #[error("undeclared identifier '{0}'")]
    Undeclared(String),
    #[error("global '{0}' is not visible inside functions")]
    GlobalInFunction(String),
    #[error("'{0}' is already declared")]
    DuplicateDeclaration(String),
    #[error("function '{0}' is already defined")]
    DuplicateFunction(String),
    #[error("parameter '{0}' is declared twice")]
    DuplicateParameter(String),
    #[error("malformed literal '{0}'")]
    MalformedLiteral(String),
    #[error("'{name}' takes {expected} argument(s) but {found} were given")]
    ArityMismatch {
        name: String,
        expected: usize,
        found: usize,
    },
    #[error("cannot assign to immutable '{0}'")]
    ImmutableAssignment(String),
    #[error("functions can only be declared at global scope")]
    NestedFunction,
    #[error("function '{0}' can only be called")]
    FunctionAsValue(String),
    #[error("nesting is deeper than {0} levels")]
    TooDeeplyNested(usize),
}

impl CompileError {
    pub fn new(line: u32, kind: CompileErrorKind) -> Self {
        CompileError { line, kind }
    }
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("runtime error at line {line}: {kind}")]
pub struct RuntimeError {
    pub line: u32,
    pub kind: RuntimeErrorKind,
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum RuntimeErrorKind {
    #[error("operand stack overflow")]
    StackOverflow,
    #[error("operand stack underflow")]
    StackUnderflow,
    #[error("maximum call stack size exceeded")]
    CallStackOverflow,
    #[error("call stack underflow")]
    CallStackUnderflow,
    #[error("stack slot {0} is out of range")]
    InvalidSlot(usize),
    #[error("argument {0} is out of range")]
    InvalidArgument(usize),
    #[error("integer division by zero")]
    DivisionByZero,
    #[error("unsupported operand types: {0} and {1}")]
    TypeMismatch(ValueKind, ValueKind),
    #[error("cannot negate a {0}")]
    InvalidNegation(ValueKind),
    #[error("jump to {0} is outside of the program")]
    InvalidJump(i64),
    #[error("corrupt call frame")]
    CorruptFrame,
    #[error("program has already halted")]
    Halted,
    #[error("failed to write output: {0}")]
    Output(String),
}

pub type CompileResult<T> = Result<T, CompileError>;
