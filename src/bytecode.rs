//! Bytecode representation

use std::fmt;

use crate::value::Value;

/// Opcodes of the bytecode, without their operands
#[derive(Debug, Clone, Copy, Hash, Eq, PartialEq)]
pub enum Opcode {
    Push,
    Add,
    Sub,
    Mul,
    Div,
    Negate,
    Not,
    Cmp,
    Jmp,
    JmpIfFalsy,
    BeginChain,
    SetBranch,
    EndChain,
    PushArg,
    FetchArg,
    Call,
    Ret,
    FetchVar,
    AssignVar,
    StackSweep,
    Print,
    Halt,
}

impl Opcode {
    pub const ALL: [Opcode; 22] = [
        Opcode::Push,
        Opcode::Add,
        Opcode::Sub,
        Opcode::Mul,
        Opcode::Div,
        Opcode::Negate,
        Opcode::Not,
        Opcode::Cmp,
        Opcode::Jmp,
        Opcode::JmpIfFalsy,
        Opcode::BeginChain,
        Opcode::SetBranch,
        Opcode::EndChain,
        Opcode::PushArg,
        Opcode::FetchArg,
        Opcode::Call,
        Opcode::Ret,
        Opcode::FetchVar,
        Opcode::AssignVar,
        Opcode::StackSweep,
        Opcode::Print,
        Opcode::Halt,
    ];

    pub fn mnemonic(self) -> &'static str {
        match self {
            Opcode::Push => "PUSH",
            Opcode::Add => "ADD",
            Opcode::Sub => "SUB",
            Opcode::Mul => "MUL",
            Opcode::Div => "DIV",
            Opcode::Negate => "NEGATE",
            Opcode::Not => "LOGICAL_NOT",
            Opcode::Cmp => "CMP",
            Opcode::Jmp => "JMP",
            Opcode::JmpIfFalsy => "JMP_IF_FALSY",
            Opcode::BeginChain => "BEGIN_CHAIN",
            Opcode::SetBranch => "SET_BRANCH",
            Opcode::EndChain => "END_CHAIN",
            Opcode::PushArg => "PUSH_ARG",
            Opcode::FetchArg => "FETCH_ARG",
            Opcode::Call => "CALL",
            Opcode::Ret => "RET",
            Opcode::FetchVar => "FETCH_VAR",
            Opcode::AssignVar => "ASSIGN_VAR",
            Opcode::StackSweep => "STACK_SWEEP",
            Opcode::Print => "PRINT",
            Opcode::Halt => "HALT",
        }
    }

    pub fn from_mnemonic(mnemonic: &str) -> Option<Self> {
        Opcode::ALL
            .into_iter()
            .find(|opcode| opcode.mnemonic() == mnemonic)
    }
}

/// Comparison kind carried by `Cmp`
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum Comparison {
    Equal,
    NotEqual,
    Greater,
    GreaterEqual,
    Less,
    LessEqual,
}

impl Comparison {
    pub fn holds<T: PartialOrd>(self, lhs: T, rhs: T) -> bool {
        match self {
            Comparison::Equal => lhs == rhs,
            Comparison::NotEqual => lhs != rhs,
            Comparison::Greater => lhs > rhs,
            Comparison::GreaterEqual => lhs >= rhs,
            Comparison::Less => lhs < rhs,
            Comparison::LessEqual => lhs <= rhs,
        }
    }

    fn name(self) -> &'static str {
        match self {
            Comparison::Equal => "EQ",
            Comparison::NotEqual => "NE",
            Comparison::Greater => "GT",
            Comparison::GreaterEqual => "GE",
            Comparison::Less => "LT",
            Comparison::LessEqual => "LE",
        }
    }
}

/// Supported instructions of the bytecode
#[derive(Debug, Clone, PartialEq)]
pub enum Instruction {
    /// Push a constant on the operand stack
    Push(Value),
    /// Add two values
    Add,
    /// Subtract the top value from the one below it
    Sub,
    /// Multiply two values
    Mul,
    /// Divide the value below the top by the top value
    Div,
    /// Negate a number
    Negate,
    /// Replace a value with 1 if it is falsy, 0 otherwise
    Not,
    /// Compare two values and push 0 or 1
    Cmp(Comparison),
    /// Unconditionally jump by a signed displacement
    Jmp(i32),
    /// Pop a value, jump if it is falsy or the current chain already ran an arm
    JmpIfFalsy(i32),
    /// Open a new if/else chain with a cleared branch flag
    BeginChain,
    /// Record that an arm of the current chain was taken
    SetBranch,
    /// Close the current if/else chain
    EndChain,
    /// Move the top of the operand stack onto the call stack
    PushArg,
    /// Push a copy of the active frame's n-th argument
    FetchArg(usize),
    /// Call the function starting at the given address
    Call(usize),
    /// Return the top value to the caller
    Ret,
    /// Push a copy of a local variable
    FetchVar(usize),
    /// Pop a value into a local variable
    AssignVar(usize),
    /// Drop n cells from the top of the operand stack
    StackSweep(usize),
    /// Pop and print a value, push 0
    Print,
    /// Pop the program result and stop
    Halt,
}

impl Instruction {
    pub fn opcode(&self) -> Opcode {
        match self {
            Instruction::Push(_) => Opcode::Push,
            Instruction::Add => Opcode::Add,
            Instruction::Sub => Opcode::Sub,
            Instruction::Mul => Opcode::Mul,
            Instruction::Div => Opcode::Div,
            Instruction::Negate => Opcode::Negate,
            Instruction::Not => Opcode::Not,
            Instruction::Cmp(_) => Opcode::Cmp,
            Instruction::Jmp(_) => Opcode::Jmp,
            Instruction::JmpIfFalsy(_) => Opcode::JmpIfFalsy,
            Instruction::BeginChain => Opcode::BeginChain,
            Instruction::SetBranch => Opcode::SetBranch,
            Instruction::EndChain => Opcode::EndChain,
            Instruction::PushArg => Opcode::PushArg,
            Instruction::FetchArg(_) => Opcode::FetchArg,
            Instruction::Call(_) => Opcode::Call,
            Instruction::Ret => Opcode::Ret,
            Instruction::FetchVar(_) => Opcode::FetchVar,
            Instruction::AssignVar(_) => Opcode::AssignVar,
            Instruction::StackSweep(_) => Opcode::StackSweep,
            Instruction::Print => Opcode::Print,
            Instruction::Halt => Opcode::Halt,
        }
    }
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.opcode().mnemonic())?;
        match self {
            Instruction::Push(Value::Str(s)) => write!(f, " {:?}", s),
            Instruction::Push(value) => write!(f, " {}", value),
            Instruction::Cmp(comparison) => write!(f, " {}", comparison.name()),
            Instruction::Jmp(offset) | Instruction::JmpIfFalsy(offset) => {
                write!(f, " {:+}", offset)
            }
            Instruction::FetchArg(index)
            | Instruction::Call(index)
            | Instruction::FetchVar(index)
            | Instruction::AssignVar(index)
            | Instruction::StackSweep(index) => write!(f, " {}", index),
            _ => Ok(()),
        }
    }
}

/// Function attributes
#[derive(Debug, Clone, PartialEq)]
pub struct Function {
    /// Name of the function
    pub name: String,
    /// Address of the first instruction of the body
    pub ptr: usize,
    pub arity: usize,
}

/// Representation of bytecode
#[derive(Debug, Default, Clone)]
pub struct Bytecode {
    /// Array of instructions from top to bottom. Indices are addresses.
    pub instructions: Vec<Instruction>,
    /// Source line of each instruction
    pub lines: Vec<u32>,
    /// Compiled functions in declaration order
    pub functions: Vec<Function>,
}

impl Bytecode {
    pub fn new() -> Self {
        Bytecode::default()
    }

    pub fn len(&self) -> usize {
        self.instructions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instructions.is_empty()
    }

    /// Append an instruction and return its address
    pub fn emit(&mut self, instruction: Instruction, line: u32) -> usize {
        self.instructions.push(instruction);
        self.lines.push(line);
        self.instructions.len() - 1
    }

    /// Point the jump at `addr` to the next instruction to be emitted
    pub fn patch_jump(&mut self, addr: usize) {
        let displacement = (self.len() - addr) as i32;
        match &mut self.instructions[addr] {
            Instruction::Jmp(offset) | Instruction::JmpIfFalsy(offset) => *offset = displacement,
            other => unreachable!("patching a non-jump instruction {}", other),
        }
    }

    /// Point the call at `addr` to `entry`
    pub fn patch_call(&mut self, addr: usize, entry: usize) {
        if let Instruction::Call(target) = &mut self.instructions[addr] {
            *target = entry;
        }
    }

    pub fn line(&self, addr: usize) -> u32 {
        self.lines.get(addr).copied().unwrap_or_default()
    }

    pub fn function(&self, name: &str) -> Option<&Function> {
        self.functions.iter().find(|function| function.name == name)
    }
}

impl fmt::Display for Bytecode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "===== DISASSEMBLY =====\n")?;
        for function in &self.functions {
            writeln!(
                f,
                "fun {}/{} @ 0x{:04X}",
                function.name, function.arity, function.ptr
            )?;
        }
        if !self.functions.is_empty() {
            writeln!(f)?;
        }
        for (addr, instruction) in self.instructions.iter().enumerate() {
            writeln!(f, "PC: (0x{:04X}) {}", addr, instruction)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mnemonics_are_unique() {
        for opcode in Opcode::ALL {
            assert_eq!(Opcode::from_mnemonic(opcode.mnemonic()), Some(opcode));
        }
        assert_eq!(Opcode::from_mnemonic("LOAD_VAL"), None);
    }

    #[test]
    fn patch_jump() {
        let mut bytecode = Bytecode::new();
        let jump = bytecode.emit(Instruction::JmpIfFalsy(0), 1);
        bytecode.emit(Instruction::Push(Value::Int(1)), 1);
        bytecode.emit(Instruction::SetBranch, 1);
        bytecode.patch_jump(jump);
        assert_eq!(bytecode.instructions[jump], Instruction::JmpIfFalsy(3));
    }

    #[test]
    fn display() {
        assert_eq!(Instruction::Push(Value::Int(3)).to_string(), "PUSH 3");
        assert_eq!(Instruction::Push("a b".into()).to_string(), "PUSH \"a b\"");
        assert_eq!(Instruction::Jmp(-4).to_string(), "JMP -4");
        assert_eq!(
            Instruction::Cmp(Comparison::GreaterEqual).to_string(),
            "CMP GE"
        );
        assert_eq!(Instruction::Ret.to_string(), "RET");
    }

    #[test]
    fn disassembly() {
        let mut bytecode = Bytecode::new();
        bytecode.emit(Instruction::Push(Value::Float(1.5)), 1);
        bytecode.emit(Instruction::StackSweep(1), 2);
        assert_eq!(
            bytecode.to_string(),
            "===== DISASSEMBLY =====\n\nPC: (0x0000) PUSH 1.5\nPC: (0x0001) STACK_SWEEP 1\n"
        );
        assert_eq!(bytecode.line(1), 2);
    }
}
