//! NGS is a small imperative scripting language, compiled in a single pass to
//! bytecode and run on a stack-based virtual machine.
//!
//! # Example
//!
//! ```text
//! fun fib(n) {
//!     let mut a = 0;
//!     let mut b = 1;
//!     let mut i = 0;
//!     loop i < n {
//!         let next = a + b;
//!         a = b;
//!         b = next;
//!         i = i + 1;
//!     }
//!     return a;
//! }
//!
//! if fib(10) == 55 {
//!     print("ok");
//! } else {
//!     print("broken");
//! }
//!
//! return fib(20);
//! ```
//!
//! # Instructions
//!
//! | Instruction  | Usage               | Brief   |
//! |--------------|---------------------|---------|
//! | Push         | PUSH _value_        | Push an int, float or string constant. |
//! | Add          | ADD                 | Pop two values and push their sum. Ints overflowing 32 bits produce a float. Two strings are concatenated. |
//! | Sub          | SUB                 | `lhs - rhs` where `lhs` is the first value that is pushed on stack. |
//! | Mul          | MUL                 | Pop two values and multiply them. |
//! | Div          | DIV                 | Truncating division for two ints (fails on zero), float division otherwise. |
//! | Negate       | NEGATE              | Negate the number on top of stack. |
//! | LogicalNot   | LOGICAL_NOT         | Push `1` if the popped value is falsy, `0` otherwise. |
//! | Cmp          | CMP _kind_          | Compare two values (`EQ`, `NE`, `GT`, `GE`, `LT`, `LE`) and push `1` or `0`. |
//! | Jmp          | JMP _offset_        | Jump to `current instruction + offset`. |
//! | JmpIfFalsy   | JMP_IF_FALSY _offset_ | Pop a value. Jump if it is falsy or an arm of the current if/else chain already ran. |
//! | BeginChain   | BEGIN_CHAIN         | Start an if/else chain. |
//! | SetBranch    | SET_BRANCH          | Mark that an arm of the current chain ran. |
//! | EndChain     | END_CHAIN           | Finish the current chain. |
//! | PushArg      | PUSH_ARG            | Move a value from the operand stack to the call stack. |
//! | FetchArg     | FETCH_ARG _index_   | Push the argument `index` of the running function. |
//! | Call         | CALL _address_      | Push the return address and the operand stack height, then jump to `address`. |
//! | Ret          | RET                 | Pop the return value, restore the caller and drop the arguments. |
//! | FetchVar     | FETCH_VAR _slot_    | Push a copy of a local variable. |
//! | AssignVar    | ASSIGN_VAR _slot_   | Pop a value into a local variable. |
//! | StackSweep   | STACK_SWEEP _count_ | Drop `count` values, used to free the locals of a block. |
//! | Print        | PRINT               | Pop and print a value, push `0`. |
//! | Halt         | HALT                | Pop the result of the program and stop. |
//!
//! # Important notes
//!
//! - Functions can only be declared at global scope, and may be called before
//!   their declaration.
//! - Function bodies only see their parameters and their own locals. Naming a
//!   global from inside a function is a compile error.
//! - Function names (and `print`) cannot be reused for variables or
//!   parameters.
//! - A `-` written directly before an integer literal is part of the literal,
//!   so `-2147483648` is an int.
//! - Blocks, parentheses, prefix operators and call arguments may nest at most
//!   [`compiler::MAX_NESTING`] levels deep.
//! - Parameters and variables declared without `mut` cannot be assigned.
//! - Calls must pass exactly as many arguments as the function declares.
//! - A function without a `return` gives back `0`.

pub mod bytecode;
pub mod compiler;
mod cursor;
pub mod error;
pub mod lexer;
pub mod scope;
pub mod token;
pub mod value;
pub mod vm;

pub use compiler::compile;
pub use error::{CompileError, CompileErrorKind, RuntimeError, RuntimeErrorKind};
pub use value::{Value, ValueKind};
pub use vm::{Vm, VmConfig};

/// Compile and run `program`, printing to stdout. Returns the value given to
/// a global `return`, if any.
pub fn run(program: &str) -> anyhow::Result<Option<Value>> {
    let mut vm = Vm::load(program)?;
    Ok(vm.run()?)
}
