//! Virtual machine that runs the bytecode
//!
//! The machine owns two stacks of [`Value`]s. The operand stack holds
//! temporaries and `let` locals. The call stack holds, for every active call,
//! its arguments followed by a frame marker:
//!
//! ```text
//! | arg 0 | ... | arg n-1 | n | return address | saved operand stack height |
//! ```
//!
//! Locals are addressed relative to the saved operand stack height of the
//! active frame, arguments relative to its marker. Each frame also has its own
//! run of if/else branch flags, so a chain never observes the flag of a chain
//! in its caller.

use std::io::{self, Stdout, Write};

use crate::{
    bytecode::{Bytecode, Comparison, Instruction},
    error::{RuntimeError, RuntimeErrorKind},
    value::{Promoted, Value, ValueKind},
};

type ExecResult<T> = Result<T, RuntimeErrorKind>;

/// Limits and switches of the machine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VmConfig {
    pub operand_stack_capacity: usize,
    pub call_stack_capacity: usize,
    /// Print every executed instruction to stderr
    pub trace: bool,
}

impl Default for VmConfig {
    fn default() -> Self {
        VmConfig {
            operand_stack_capacity: 4096,
            call_stack_capacity: 1024,
            trace: false,
        }
    }
}

/// Bookkeeping for an active call
#[derive(Debug, Clone, Copy)]
struct Frame {
    /// Call stack index of the saved operand stack height
    marker: usize,
    operand_base: usize,
    branch_base: usize,
}

/// Virtual machine representation
pub struct Vm<W = Stdout> {
    bytecode: Bytecode,
    config: VmConfig,
    pc: usize,
    halted: bool,
    result: Option<Value>,

    operand_stack: Vec<Value>,
    call_stack: Vec<Value>,
    frames: Vec<Frame>,
    branch_flags: Vec<bool>,
    out: W,
    /// Where `trace` lines go, stderr unless replaced
    trace_out: Box<dyn Write>,
}

impl Vm<Stdout> {
    /// Compile `program` and prepare a machine with the default limits
    pub fn load(program: &str) -> anyhow::Result<Self> {
        let bytecode = crate::compiler::compile(program)?;
        Ok(Vm::new(bytecode, VmConfig::default()))
    }

    pub fn new(bytecode: Bytecode, config: VmConfig) -> Self {
        Vm::with_output(bytecode, config, io::stdout())
    }
}

impl<W: Write> Vm<W> {
    /// Like `new`, with `print` writing to `out`
    pub fn with_output(bytecode: Bytecode, config: VmConfig, out: W) -> Self {
        Vm {
            bytecode,
            config,
            pc: 0,
            halted: false,
            result: None,
            operand_stack: Vec::new(),
            call_stack: Vec::new(),
            frames: Vec::new(),
            branch_flags: Vec::new(),
            out,
            trace_out: Box::new(io::stderr()),
        }
    }

    /// Send trace lines to `out` instead of stderr
    pub fn with_trace_output(mut self, out: impl Write + 'static) -> Self {
        self.trace_out = Box::new(out);
        self
    }

    /// Run until the program halts or runs off its end. Returns the value
    /// given to a global `return`, if any.
    pub fn run(&mut self) -> Result<Option<Value>, RuntimeError> {
        if self.halted {
            return Err(self.error(RuntimeErrorKind::Halted));
        }

        while !self.halted {
            self.next_instruction()?;
        }
        Ok(self.result.clone())
    }

    /// Execute a single instruction
    pub fn next_instruction(&mut self) -> Result<(), RuntimeError> {
        self.step().map_err(|kind| self.error(kind))
    }

    fn error(&self, kind: RuntimeErrorKind) -> RuntimeError {
        RuntimeError {
            line: self.bytecode.line(self.pc),
            kind,
        }
    }

    fn step(&mut self) -> ExecResult<()> {
        let instruction = match self.bytecode.instructions.get(self.pc) {
            Some(instruction) => instruction.clone(),
            None => {
                self.halted = true;
                return Ok(());
            }
        };

        if self.config.trace {
            writeln!(self.trace_out, "PC: (0x{:04X}) {}", self.pc, instruction)
                .map_err(|err| RuntimeErrorKind::Output(err.to_string()))?;
        }

        match instruction {
            Instruction::Push(value) => self.push_stack(value)?,
            Instruction::Add => self.ins_add()?,
            Instruction::Sub => self.ins_arithmetic(i32::checked_sub, |l, r| l - r)?,
            Instruction::Mul => self.ins_arithmetic(i32::checked_mul, |l, r| l * r)?,
            Instruction::Div => self.ins_div()?,
            Instruction::Negate => self.ins_negate()?,
            Instruction::Not => {
                let value = self.pop_stack()?;
                self.push_stack(Value::from_bool(!value.is_truthy()))?;
            }
            Instruction::Cmp(comparison) => self.ins_cmp(comparison)?,
            Instruction::Jmp(offset) => return self.ins_jmp(offset),
            Instruction::JmpIfFalsy(offset) => {
                let value = self.pop_stack()?;
                if !value.is_truthy() || self.branch_taken() {
                    return self.ins_jmp(offset);
                }
            }
            Instruction::BeginChain => self.branch_flags.push(false),
            Instruction::SetBranch => {
                if let Some(flag) = self.branch_flags.last_mut() {
                    *flag = true;
                }
            }
            Instruction::EndChain => {
                self.branch_flags.pop();
            }
            Instruction::PushArg => {
                let value = self.pop_stack()?;
                self.push_call_stack(value)?;
            }
            Instruction::FetchArg(index) => self.ins_fetch_arg(index)?,
            Instruction::Call(target) => return self.ins_call(target),
            Instruction::Ret => return self.ins_ret(),
            Instruction::FetchVar(slot) => {
                let addr = self.slot_addr(slot)?;
                self.push_stack(self.operand_stack[addr].clone())?;
            }
            Instruction::AssignVar(slot) => {
                let value = self.pop_stack()?;
                let addr = self.slot_addr(slot)?;
                self.operand_stack[addr] = value;
            }
            Instruction::StackSweep(count) => {
                let len = self.operand_stack.len();
                if count > len {
                    return Err(RuntimeErrorKind::StackUnderflow);
                }
                // Dropping the cells releases any strings among them
                self.operand_stack.truncate(len - count);
            }
            Instruction::Print => {
                let value = self.pop_stack()?;
                writeln!(self.out, "{}", value)
                    .map_err(|err| RuntimeErrorKind::Output(err.to_string()))?;
                self.push_stack(Value::Int(0))?;
            }
            Instruction::Halt => {
                self.result = Some(self.pop_stack()?);
                self.halted = true;
                return Ok(());
            }
        }

        self.pc += 1;
        Ok(())
    }

    /// Whether the innermost if/else chain of the active frame took an arm
    fn branch_taken(&self) -> bool {
        let base = self.frames.last().map_or(0, |frame| frame.branch_base);
        self.branch_flags.len() > base && self.branch_flags.last() == Some(&true)
    }

    /// Add two numbers, or concatenate two strings
    fn ins_add(&mut self) -> ExecResult<()> {
        let rhs = self.pop_stack()?;
        let lhs = self.pop_stack()?;

        match (lhs, rhs) {
            (Value::Str(mut lhs), Value::Str(rhs)) => {
                lhs.push_str(&rhs);
                self.push_stack(Value::Str(lhs))
            }
            (lhs, rhs) => self.numeric(lhs, rhs, i32::checked_add, |l, r| l + r),
        }
    }

    fn ins_arithmetic(
        &mut self,
        int_op: fn(i32, i32) -> Option<i32>,
        float_op: fn(f64, f64) -> f64,
    ) -> ExecResult<()> {
        let rhs = self.pop_stack()?;
        let lhs = self.pop_stack()?;
        self.numeric(lhs, rhs, int_op, float_op)
    }

    /// Integer division truncates and fails on zero, anything else is float
    /// division.
    fn ins_div(&mut self) -> ExecResult<()> {
        let rhs = self.pop_stack()?;
        let lhs = self.pop_stack()?;

        if rhs == Value::Int(0) && lhs.kind() == ValueKind::Int {
            return Err(RuntimeErrorKind::DivisionByZero);
        }
        self.numeric(lhs, rhs, i32::checked_div, |l, r| l / r)
    }

    /// Int/int uses `int_op`, falling back to `float_op` when it overflows.
    /// A float on either side promotes the other one.
    fn numeric(
        &mut self,
        lhs: Value,
        rhs: Value,
        int_op: fn(i32, i32) -> Option<i32>,
        float_op: fn(f64, f64) -> f64,
    ) -> ExecResult<()> {
        let result = match Value::promote(&lhs, &rhs) {
            Some(Promoted::Ints(l, r)) => match int_op(l, r) {
                Some(number) => Value::Int(number),
                None => Value::Float(float_op(l as f64, r as f64)),
            },
            Some(Promoted::Floats(l, r)) => Value::Float(float_op(l, r)),
            None => return Err(RuntimeErrorKind::TypeMismatch(lhs.kind(), rhs.kind())),
        };
        self.push_stack(result)
    }

    fn ins_negate(&mut self) -> ExecResult<()> {
        let result = match self.pop_stack()? {
            Value::Int(number) => number
                .checked_neg()
                .map_or(Value::Float(-(number as f64)), Value::Int),
            Value::Float(number) => Value::Float(-number),
            value => return Err(RuntimeErrorKind::InvalidNegation(value.kind())),
        };
        self.push_stack(result)
    }

    /// Compare two values and push 1 if `comparison` holds, 0 otherwise
    fn ins_cmp(&mut self, comparison: Comparison) -> ExecResult<()> {
        let rhs = self.pop_stack()?;
        let lhs = self.pop_stack()?;

        let holds = match (&lhs, &rhs) {
            (Value::Str(l), Value::Str(r)) => comparison.holds(l, r),
            _ => match Value::promote(&lhs, &rhs) {
                Some(Promoted::Ints(l, r)) => comparison.holds(l, r),
                Some(Promoted::Floats(l, r)) => comparison.holds(l, r),
                None => return Err(RuntimeErrorKind::TypeMismatch(lhs.kind(), rhs.kind())),
            },
        };
        self.push_stack(Value::from_bool(holds))
    }

    /// Jump relative to the current instruction
    fn ins_jmp(&mut self, offset: i32) -> ExecResult<()> {
        let target = self.pc as i64 + offset as i64;
        if target < 0 || target > self.bytecode.len() as i64 {
            return Err(RuntimeErrorKind::InvalidJump(target));
        }
        self.pc = target as usize;
        Ok(())
    }

    /// Push the frame marker and enter the function at `target`. The
    /// arguments and their count are already on the call stack.
    fn ins_call(&mut self, target: usize) -> ExecResult<()> {
        if target >= self.bytecode.len() {
            return Err(RuntimeErrorKind::InvalidJump(target as i64));
        }

        let operand_base = self.operand_stack.len();
        self.push_call_stack(to_cell(self.pc + 1)?)?;
        self.push_call_stack(to_cell(operand_base)?)?;
        self.frames.push(Frame {
            marker: self.call_stack.len() - 1,
            operand_base,
            branch_base: self.branch_flags.len(),
        });

        self.pc = target;
        Ok(())
    }

    /// Tear down the active frame and hand the top value back to the caller
    fn ins_ret(&mut self) -> ExecResult<()> {
        let value = self.pop_stack()?;
        let frame = self
            .frames
            .pop()
            .ok_or(RuntimeErrorKind::CallStackUnderflow)?;

        let saved_height = self.frame_cell(frame.marker)?;
        let return_addr = self.frame_cell(frame.marker - 1)?;
        let (_, base) = self.frame_args(frame)?;

        self.call_stack.truncate(base);
        self.operand_stack.truncate(saved_height);
        self.branch_flags.truncate(frame.branch_base);
        self.push_stack(value)?;

        self.pc = return_addr;
        Ok(())
    }

    /// Push a copy of the active frame's argument at `index`
    fn ins_fetch_arg(&mut self, index: usize) -> ExecResult<()> {
        let frame = *self
            .frames
            .last()
            .ok_or(RuntimeErrorKind::InvalidArgument(index))?;
        let (argc, base) = self.frame_args(frame)?;
        if index >= argc {
            return Err(RuntimeErrorKind::InvalidArgument(index));
        }
        self.push_stack(self.call_stack[base + index].clone())
    }

    /// Argument count of `frame` and call stack index of its first argument
    fn frame_args(&self, frame: Frame) -> ExecResult<(usize, usize)> {
        let count_index = frame
            .marker
            .checked_sub(2)
            .ok_or(RuntimeErrorKind::CorruptFrame)?;
        let argc = self.frame_cell(count_index)?;
        let base = count_index
            .checked_sub(argc)
            .ok_or(RuntimeErrorKind::CorruptFrame)?;
        Ok((argc, base))
    }

    /// Read a frame marker cell as an unsigned integer
    fn frame_cell(&self, index: usize) -> ExecResult<usize> {
        match self.call_stack.get(index) {
            Some(&Value::Int(number)) => {
                usize::try_from(number).map_err(|_| RuntimeErrorKind::CorruptFrame)
            }
            _ => Err(RuntimeErrorKind::CorruptFrame),
        }
    }

    /// Absolute operand stack index of a local slot of the active frame
    fn slot_addr(&self, slot: usize) -> ExecResult<usize> {
        let base = self.frames.last().map_or(0, |frame| frame.operand_base);
        let addr = base + slot;
        if addr < self.operand_stack.len() {
            Ok(addr)
        } else {
            Err(RuntimeErrorKind::InvalidSlot(slot))
        }
    }

    fn pop_stack(&mut self) -> ExecResult<Value> {
        self.operand_stack
            .pop()
            .ok_or(RuntimeErrorKind::StackUnderflow)
    }

    fn push_stack(&mut self, value: Value) -> ExecResult<()> {
        if self.operand_stack.len() >= self.config.operand_stack_capacity {
            return Err(RuntimeErrorKind::StackOverflow);
        }
        self.operand_stack.push(value);
        Ok(())
    }

    fn push_call_stack(&mut self, value: Value) -> ExecResult<()> {
        if self.call_stack.len() >= self.config.call_stack_capacity {
            return Err(RuntimeErrorKind::CallStackOverflow);
        }
        self.call_stack.push(value);
        Ok(())
    }

    pub fn operand_stack(&self) -> &[Value] {
        &self.operand_stack
    }

    pub fn call_stack(&self) -> &[Value] {
        &self.call_stack
    }

    pub fn output(&self) -> &W {
        &self.out
    }

    /// Both stacks, top first
    pub fn stack_dump(&self) -> String {
        let mut dump = String::new();
        for (title, stack) in [
            ("OPERAND STACK", &self.operand_stack),
            ("CALL STACK", &self.call_stack),
        ] {
            dump.push_str(&format!("===== {} =====\n\n", title));
            if stack.is_empty() {
                dump.push_str("[EMPTY]\n");
            } else {
                dump.push('>');
                for value in stack.iter().rev() {
                    match value {
                        Value::Str(s) => dump.push_str(&format!(" {:?}", s)),
                        value => dump.push_str(&format!(" {}", value)),
                    }
                }
                dump.push('\n');
            }
            dump.push('\n');
        }
        dump
    }
}

fn to_cell(number: usize) -> ExecResult<Value> {
    i32::try_from(number)
        .map(Value::Int)
        .map_err(|_| RuntimeErrorKind::CallStackOverflow)
}
