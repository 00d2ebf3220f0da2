mod stack;

use std::{cell::RefCell, io::Write, rc::Rc};

use rustc_hash::FxHashMap;

use crate::{
    ast::InfixOperator,
    bytecode::{Chunk, OpCode, OpCodeFromU8Error},
    value::{OperationError, Value},
    MAX_CALL_DEPTH,
};

use self::stack::Stack;

pub use self::stack::MAX_STACK_SIZE;

#[derive(Debug, thiserror::Error)]
pub enum RuntimeError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Name error: '{0}' is not defined")]
    NameError(String),
    #[error("Type error: '{0}' is not callable")]
    NotCallable(String),
    #[error("Argument count error: {name} expects {expected} arguments, got {found}")]
    ArgumentCount {
        name: String,
        expected: usize,
        found: usize,
    },
    #[error("Return outside function")]
    ReturnOutsideFunction,
    #[error("Stack overflow: more than {0} nested calls")]
    StackOverflow(usize),
    #[error("Stack overflow: more than {0} values on the operand stack")]
    OperandStackOverflow(usize),
    #[error(transparent)]
    Operation(#[from] OperationError),
    #[error("Internal VM error: {0}")]
    Fault(#[from] VmFault),
}

impl RuntimeError {
    /// True when the chunk itself is malformed rather than the program
    /// misbehaving.
    pub fn is_internal(&self) -> bool {
        matches!(self, RuntimeError::Fault(_))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum VmFault {
    #[error("Stack underflow")]
    StackUnderflow,
    #[error(transparent)]
    UnknownOpcode(#[from] OpCodeFromU8Error),
    #[error("Jump to {0} is outside the chunk")]
    InvalidJumpTarget(usize),
    #[error("No constant at index {0}")]
    InvalidConstant(u16),
    #[error("No function at index {0}")]
    InvalidFunction(u16),
    #[error("Instruction at {0} is missing operand bytes")]
    TruncatedInstruction(usize),
    #[error("Constant {0} is not a name")]
    ExpectedName(u16),
}

struct Execution<'a> {
    chunk: &'a Chunk,
    ip: usize,
}

impl<'a> Execution<'a> {
    fn is_at_end(&self) -> bool {
        self.ip >= self.chunk.len()
    }

    fn read_byte(&mut self) -> Result<u8, VmFault> {
        let ret = self
            .chunk
            .get_bytecode(self.ip)
            .ok_or(VmFault::TruncatedInstruction(self.ip))?;
        self.ip += 1;
        Ok(ret)
    }

    fn read_u16(&mut self) -> Result<u16, VmFault> {
        let ret = self
            .chunk
            .get_u16(self.ip)
            .ok_or(VmFault::TruncatedInstruction(self.ip))?;
        self.ip += 2;
        Ok(ret)
    }

    fn read_constant(&mut self) -> Result<&'a Value, VmFault> {
        let chunk = self.chunk;
        let index = self.read_u16()?;
        chunk
            .get_constant(index)
            .ok_or(VmFault::InvalidConstant(index))
    }

    fn read_name(&mut self) -> Result<Rc<str>, VmFault> {
        let chunk = self.chunk;
        let index = self.read_u16()?;
        match chunk.get_constant(index) {
            Some(Value::String(name)) => Ok(name.clone()),
            Some(_) => Err(VmFault::ExpectedName(index)),
            None => Err(VmFault::InvalidConstant(index)),
        }
    }

    /// A target equal to the chunk length is valid and halts execution.
    fn jump(&mut self, target: usize) -> Result<(), VmFault> {
        if target > self.chunk.len() {
            return Err(VmFault::InvalidJumpTarget(target));
        }
        self.ip = target;
        Ok(())
    }
}

#[derive(Debug)]
struct Frame {
    locals: FxHashMap<Rc<str>, Value>,
    return_ip: usize,
    stack_base: usize,
}

pub struct Vm {
    stack: Stack,
    globals: FxHashMap<Rc<str>, Value>,
    frames: Vec<Frame>,
    stdout: Rc<RefCell<dyn Write>>,
}

impl std::fmt::Debug for Vm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Vm")
            .field("stack", &self.stack)
            .field("globals", &self.globals)
            .field("frames", &self.frames)
            .finish()
    }
}

impl Default for Vm {
    fn default() -> Self {
        Self::new(Rc::new(RefCell::new(std::io::stdout())))
    }
}

impl Vm {
    pub fn new(stdout: Rc<RefCell<dyn Write>>) -> Self {
        Self {
            stack: Stack::new(),
            globals: FxHashMap::default(),
            frames: Vec::new(),
            stdout,
        }
    }

    pub fn global(&self, name: &str) -> Option<&Value> {
        self.globals.get(name)
    }

    /// Runs `chunk` from its first byte. Globals survive between calls except
    /// for functions, whose entry points only make sense in their own chunk.
    pub fn interpret(&mut self, chunk: &Chunk) -> Result<(), RuntimeError> {
        self.stack.clear();
        self.frames.clear();
        self.globals
            .retain(|_, value| !matches!(value, Value::CompiledFunction(_)));

        let mut execution = Execution { chunk, ip: 0 };
        let result = self.run(&mut execution);
        if let Err(e) = &result {
            tracing::debug!(ip = execution.ip, error = %e, "vm stopped");
        }
        result
    }

    fn run(&mut self, execution: &mut Execution) -> Result<(), RuntimeError> {
        while !execution.is_at_end() {
            #[cfg(feature = "trace")]
            {
                let mut instruction = String::new();
                execution
                    .chunk
                    .disassemble_instruction(execution.ip, &mut instruction);
                tracing::trace!("{}\n{}", self.stack, instruction.trim_end());
            }

            let opcode = OpCode::try_from(execution.read_byte()?).map_err(VmFault::from)?;
            match opcode {
                OpCode::Constant => {
                    let constant = execution.read_constant()?;
                    self.stack.push(constant.clone())?;
                }
                OpCode::Nil => self.stack.push(Value::None)?,
                OpCode::GetVariable => {
                    let name = execution.read_name()?;
                    let value = self
                        .lookup(&name)
                        .cloned()
                        .ok_or_else(|| RuntimeError::NameError(name.to_string()))?;
                    self.stack.push(value)?;
                }
                OpCode::SetVariable => {
                    let name = execution.read_name()?;
                    let value = self.stack.pop()?;
                    self.define(name, value);
                }
                OpCode::Add => self.binary_op(InfixOperator::Add)?,
                OpCode::Subtract => self.binary_op(InfixOperator::Sub)?,
                OpCode::Multiply => self.binary_op(InfixOperator::Mult)?,
                OpCode::Divide => self.binary_op(InfixOperator::Div)?,
                OpCode::Equal => self.binary_op(InfixOperator::Eq)?,
                OpCode::NotEqual => self.binary_op(InfixOperator::Ne)?,
                OpCode::Less => self.binary_op(InfixOperator::Lt)?,
                OpCode::Greater => self.binary_op(InfixOperator::Gt)?,
                OpCode::LessEqual => self.binary_op(InfixOperator::Le)?,
                OpCode::GreaterEqual => self.binary_op(InfixOperator::Ge)?,
                OpCode::Print => {
                    let value = self.stack.pop()?;
                    writeln!(self.stdout.borrow_mut(), "{}", value)?;
                }
                OpCode::Pop => {
                    self.stack.pop()?;
                }
                OpCode::Jump => {
                    let target = execution.read_u16()?;
                    execution.jump(target as usize)?;
                }
                OpCode::JumpIfFalse => {
                    let target = execution.read_u16()?;
                    if !self.stack.pop()?.is_truthy() {
                        execution.jump(target as usize)?;
                    }
                }
                OpCode::DefineFunction => {
                    let chunk = execution.chunk;
                    let index = execution.read_u16()?;
                    let function = chunk
                        .get_function(index)
                        .ok_or(VmFault::InvalidFunction(index))?;
                    let value = Value::CompiledFunction(Rc::new(function.clone()));
                    self.define(function.name.as_str().into(), value);
                }
                OpCode::Call => {
                    let name = execution.read_name()?;
                    let argc = execution.read_byte()? as usize;
                    self.call(execution, name, argc)?;
                }
                OpCode::Return => {
                    let Some(frame) = self.frames.pop() else {
                        return Err(RuntimeError::ReturnOutsideFunction);
                    };
                    let value = self.stack.pop()?;
                    self.stack.truncate(frame.stack_base);
                    self.stack.push(value)?;
                    execution.jump(frame.return_ip)?;
                    tracing::debug!(depth = self.frames.len(), "returned from function");
                }
                OpCode::Sentinel => unreachable!("Sentinel should not be decoded from bytecode"),
            }
        }

        Ok(())
    }

    /// Binds in the current frame, or globally at top level. Outer bindings
    /// are never touched.
    fn define(&mut self, name: Rc<str>, value: Value) {
        match self.frames.last_mut() {
            Some(frame) => frame.locals.insert(name, value),
            None => self.globals.insert(name, value),
        };
    }

    fn lookup(&self, name: &str) -> Option<&Value> {
        self.frames
            .last()
            .and_then(|frame| frame.locals.get(name))
            .or_else(|| self.globals.get(name))
    }

    fn binary_op(&mut self, op: InfixOperator) -> Result<(), RuntimeError> {
        let right = self.stack.pop()?;
        let left = self.stack.pop()?;
        self.stack.push(Value::binary(op, left, right)?)
    }

    fn call(
        &mut self,
        execution: &mut Execution,
        name: Rc<str>,
        argc: usize,
    ) -> Result<(), RuntimeError> {
        let function = match self.lookup(&name) {
            Some(Value::CompiledFunction(function)) => function.clone(),
            Some(_) => return Err(RuntimeError::NotCallable(name.to_string())),
            None => return Err(RuntimeError::NameError(name.to_string())),
        };

        if function.params.len() != argc {
            return Err(RuntimeError::ArgumentCount {
                name: name.to_string(),
                expected: function.params.len(),
                found: argc,
            });
        }
        if self.frames.len() >= MAX_CALL_DEPTH {
            return Err(RuntimeError::StackOverflow(MAX_CALL_DEPTH));
        }

        let mut args = Vec::with_capacity(argc);
        for _ in 0..argc {
            args.push(self.stack.pop()?);
        }
        let locals = function
            .params
            .iter()
            .map(|param| Rc::<str>::from(param.as_str()))
            .zip(args.into_iter().rev())
            .collect();

        tracing::debug!(function = %name, depth = self.frames.len(), "calling function");

        self.frames.push(Frame {
            locals,
            return_ip: execution.ip,
            stack_base: self.stack.len(),
        });
        execution.jump(function.entry)?;
        Ok(())
    }
}
