use std::fmt::Display;

use crate::value::Value;

use super::{RuntimeError, VmFault};

pub const MAX_STACK_SIZE: usize = 1024;

#[derive(Debug)]
pub struct Stack {
    storage: Vec<Value>,
}

impl Stack {
    pub fn new() -> Self {
        Stack {
            storage: Vec::with_capacity(MAX_STACK_SIZE),
        }
    }

    pub fn push(&mut self, value: Value) -> Result<(), RuntimeError> {
        if self.storage.len() >= MAX_STACK_SIZE {
            return Err(RuntimeError::OperandStackOverflow(MAX_STACK_SIZE));
        }
        self.storage.push(value);
        Ok(())
    }

    /// Popping an empty stack means the chunk is malformed, not that the
    /// program is wrong.
    pub fn pop(&mut self) -> Result<Value, RuntimeError> {
        self.storage
            .pop()
            .ok_or(RuntimeError::Fault(VmFault::StackUnderflow))
    }

    pub fn len(&self) -> usize {
        self.storage.len()
    }

    pub fn is_empty(&self) -> bool {
        self.storage.is_empty()
    }

    pub fn truncate(&mut self, len: usize) {
        self.storage.truncate(len);
    }

    pub fn clear(&mut self) {
        self.storage.clear();
    }
}

impl Display for Stack {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "          ")?;
        for value in self.storage.iter() {
            write!(f, "[ {} ]", value)?;
        }
        Ok(())
    }
}
