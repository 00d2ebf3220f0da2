use std::fmt::Write;

use crate::value::Value;

#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpCode {
    Constant,
    Nil,
    GetVariable,
    SetVariable,
    Add,
    Subtract,
    Multiply,
    Divide,
    Equal,
    NotEqual,
    Less,
    Greater,
    LessEqual,
    GreaterEqual,
    Print,
    Pop,
    Jump,
    JumpIfFalse,
    DefineFunction,
    Call,
    Return,
    Sentinel,
}

impl From<OpCode> for u8 {
    fn from(value: OpCode) -> u8 {
        value as u8
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error(
    "Invalid byte {0} found when expecting OpCode value between 0 and {}",
    OpCode::Sentinel as u8
)]
pub struct OpCodeFromU8Error(pub u8);

impl TryFrom<u8> for OpCode {
    type Error = OpCodeFromU8Error;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        if value < OpCode::Sentinel as u8 {
            Ok(unsafe { std::mem::transmute::<u8, OpCode>(value) })
        } else {
            Err(OpCodeFromU8Error(value))
        }
    }
}

/// A function compiled inline into the chunk. `entry` is the offset of the
/// first byte of its body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FunctionEntry {
    pub name: String,
    pub params: Vec<String>,
    pub entry: usize,
}

/// A compiled program: opcodes interleaved with their operands. Multi-byte
/// operands are big-endian `u16`s.
#[derive(Debug, Default)]
pub struct Chunk {
    code: Vec<u8>,
    constants: Vec<Value>,
    functions: Vec<FunctionEntry>,
}

impl Chunk {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.code.len()
    }

    pub fn is_empty(&self) -> bool {
        self.code.is_empty()
    }

    pub fn get_bytecode(&self, offset: usize) -> Option<u8> {
        self.code.get(offset).copied()
    }

    pub fn get_u16(&self, offset: usize) -> Option<u16> {
        let high = self.get_bytecode(offset)?;
        let low = self.get_bytecode(offset + 1)?;
        Some(u16::from_be_bytes([high, low]))
    }

    pub fn add_bytecode(&mut self, byte: impl Into<u8>) {
        self.code.push(byte.into());
    }

    pub fn add_u16(&mut self, value: u16) {
        self.code.extend_from_slice(&value.to_be_bytes());
    }

    /// Overwrites the two operand bytes at `offset`. Only used to backpatch
    /// jump placeholders.
    pub fn patch_u16(&mut self, offset: usize, value: u16) {
        self.code[offset..offset + 2].copy_from_slice(&value.to_be_bytes());
    }

    pub fn get_constant(&self, index: u16) -> Option<&Value> {
        self.constants.get(index as usize)
    }

    /// Returns `None` once the constant pool is full.
    pub fn add_constant(&mut self, value: Value) -> Option<u16> {
        let index = u16::try_from(self.constants.len()).ok()?;
        self.constants.push(value);
        Some(index)
    }

    /// Variable and function names share one pool entry per distinct name.
    pub fn add_name(&mut self, name: &str) -> Option<u16> {
        let existing = self
            .constants
            .iter()
            .position(|c| matches!(c, Value::String(s) if &**s == name));
        match existing {
            Some(index) => u16::try_from(index).ok(),
            None => self.add_constant(name.into()),
        }
    }

    pub fn get_function(&self, index: u16) -> Option<&FunctionEntry> {
        self.functions.get(index as usize)
    }

    pub fn add_function(&mut self, function: FunctionEntry) -> Option<u16> {
        let index = u16::try_from(self.functions.len()).ok()?;
        self.functions.push(function);
        Some(index)
    }

    pub fn set_function_entry(&mut self, index: u16, entry: usize) {
        self.functions[index as usize].entry = entry;
    }

    pub fn disassemble(&self, name: &str) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "== {} ==", name);

        let mut offset = 0;
        while offset < self.code.len() {
            offset = self.disassemble_instruction(offset, &mut out);
        }

        for function in &self.functions {
            let _ = writeln!(
                out,
                "func {}({}) @ {:04}",
                function.name,
                function.params.join(", "),
                function.entry
            );
        }
        out
    }

    /// Appends one line describing the instruction at `offset` and returns the
    /// offset of the next instruction.
    pub fn disassemble_instruction(&self, offset: usize, out: &mut String) -> usize {
        let _ = write!(out, "{:04} ", offset);

        let instruction = self.code[offset];
        let Ok(op) = OpCode::try_from(instruction) else {
            let _ = writeln!(out, "Unknown opcode {}", instruction);
            return offset + 1;
        };

        match op {
            OpCode::Constant => self.constant_instruction("OP_CONSTANT", offset, out),
            OpCode::GetVariable => self.constant_instruction("OP_GET_VARIABLE", offset, out),
            OpCode::SetVariable => self.constant_instruction("OP_SET_VARIABLE", offset, out),
            OpCode::Jump => self.jump_instruction("OP_JUMP", offset, out),
            OpCode::JumpIfFalse => self.jump_instruction("OP_JUMP_IF_FALSE", offset, out),
            OpCode::DefineFunction => {
                let Some(index) = self.get_u16(offset + 1) else {
                    return truncated("OP_DEFINE_FUNCTION", offset, out);
                };
                let name = self
                    .get_function(index)
                    .map_or("?", |function| function.name.as_str());
                let _ = writeln!(out, "{:<18} {:4} '{}'", "OP_DEFINE_FUNCTION", index, name);
                offset + 3
            }
            OpCode::Call => {
                let (Some(index), Some(argc)) =
                    (self.get_u16(offset + 1), self.get_bytecode(offset + 3))
                else {
                    return truncated("OP_CALL", offset, out);
                };
                let name = self
                    .get_constant(index)
                    .map_or("?".to_string(), Value::to_string);
                let _ = writeln!(out, "{:<18} {:4} '{}' ({} args)", "OP_CALL", index, name, argc);
                offset + 4
            }
            OpCode::Nil => simple_instruction("OP_NIL", offset, out),
            OpCode::Add => simple_instruction("OP_ADD", offset, out),
            OpCode::Subtract => simple_instruction("OP_SUBTRACT", offset, out),
            OpCode::Multiply => simple_instruction("OP_MULTIPLY", offset, out),
            OpCode::Divide => simple_instruction("OP_DIVIDE", offset, out),
            OpCode::Equal => simple_instruction("OP_EQUAL", offset, out),
            OpCode::NotEqual => simple_instruction("OP_NOT_EQUAL", offset, out),
            OpCode::Less => simple_instruction("OP_LESS", offset, out),
            OpCode::Greater => simple_instruction("OP_GREATER", offset, out),
            OpCode::LessEqual => simple_instruction("OP_LESS_EQUAL", offset, out),
            OpCode::GreaterEqual => simple_instruction("OP_GREATER_EQUAL", offset, out),
            OpCode::Print => simple_instruction("OP_PRINT", offset, out),
            OpCode::Pop => simple_instruction("OP_POP", offset, out),
            OpCode::Return => simple_instruction("OP_RETURN", offset, out),
            OpCode::Sentinel => unreachable!("Sentinel opcode should not be decoded"),
        }
    }

    fn constant_instruction(&self, name: &str, offset: usize, out: &mut String) -> usize {
        let Some(index) = self.get_u16(offset + 1) else {
            return truncated(name, offset, out);
        };
        let constant = self
            .get_constant(index)
            .map_or("?".to_string(), Value::to_string);
        let _ = writeln!(out, "{:<18} {:4} '{}'", name, index, constant);
        offset + 3
    }

    fn jump_instruction(&self, name: &str, offset: usize, out: &mut String) -> usize {
        let Some(target) = self.get_u16(offset + 1) else {
            return truncated(name, offset, out);
        };
        let _ = writeln!(out, "{:<18} {:04}", name, target);
        offset + 3
    }
}

fn simple_instruction(name: &str, offset: usize, out: &mut String) -> usize {
    let _ = writeln!(out, "{}", name);
    offset + 1
}

fn truncated(name: &str, offset: usize, out: &mut String) -> usize {
    let _ = writeln!(out, "{} <truncated>", name);
    offset + 1
}
