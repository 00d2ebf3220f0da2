use crate::{
    ast::{Block, Expression, InfixOperator, Program, Statement},
    bytecode::{Chunk, FunctionEntry, OpCode},
    value::Value,
};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CompileError {
    #[error("Too many constants in one chunk")]
    TooManyConstants,
    #[error("Too many functions in one chunk")]
    TooManyFunctions,
    #[error("Too many arguments in call to {0}")]
    TooManyArguments(String),
    #[error("Jump target {0} is beyond the addressable code size")]
    JumpTooFar(usize),
}

/// Placeholder operand written for forward jumps until they are patched.
const UNPATCHED: u16 = u16::MAX;

pub fn compile(program: &Program) -> Result<Chunk, CompileError> {
    let mut compiler = Compiler::new();
    for stmt in program.0.iter() {
        compiler.statement(stmt)?;
    }

    let chunk = compiler.chunk;
    tracing::debug!(bytes = chunk.len(), "compiled program");
    #[cfg(feature = "disassemble")]
    tracing::debug!("\n{}", chunk.disassemble("program"));
    Ok(chunk)
}

struct Compiler {
    chunk: Chunk,
    function_depth: usize,
}

impl Compiler {
    fn new() -> Self {
        Self {
            chunk: Chunk::new(),
            function_depth: 0,
        }
    }

    fn statement(&mut self, stmt: &Statement) -> Result<(), CompileError> {
        match stmt {
            Statement::Expression(expr) => {
                self.expression(expr)?;
                self.emit(OpCode::Pop);
            }
            Statement::Print(expr) => {
                self.expression(expr)?;
                self.emit(OpCode::Print);
            }
            Statement::Assign(name, expr) => {
                self.expression(expr)?;
                let name = self.name(name)?;
                self.emit_with_operand(OpCode::SetVariable, name);
            }
            Statement::If(condition, then_branch, else_branch) => {
                self.expression(condition)?;
                let then_jump = self.emit_jump(OpCode::JumpIfFalse);
                self.block(then_branch)?;
                match else_branch {
                    Some(else_branch) => {
                        let else_jump = self.emit_jump(OpCode::Jump);
                        self.patch_jump(then_jump)?;
                        self.block(else_branch)?;
                        self.patch_jump(else_jump)?;
                    }
                    None => self.patch_jump(then_jump)?,
                }
            }
            Statement::While(condition, body) => {
                let loop_start = self.chunk.len();
                self.expression(condition)?;
                let exit_jump = self.emit_jump(OpCode::JumpIfFalse);
                self.block(body)?;
                self.emit_loop(loop_start)?;
                self.patch_jump(exit_jump)?;
            }
            Statement::Function(decl) => {
                let index = self
                    .chunk
                    .add_function(FunctionEntry {
                        name: decl.name.clone(),
                        params: decl.params.clone(),
                        entry: 0,
                    })
                    .ok_or(CompileError::TooManyFunctions)?;
                self.emit_with_operand(OpCode::DefineFunction, index);

                let skip = self.emit_jump(OpCode::Jump);
                self.chunk.set_function_entry(index, self.chunk.len());
                self.function_depth += 1;
                self.block(&decl.body)?;
                self.function_depth -= 1;
                self.emit(OpCode::Nil);
                self.emit(OpCode::Return);
                self.patch_jump(skip)?;
            }
            Statement::Return(expr) => {
                // Top-level code never runs inside a frame, so the VM rejects
                // this return before anything in `expr` could execute.
                if self.function_depth > 0 {
                    self.expression(expr)?;
                }
                self.emit(OpCode::Return);
            }
        }
        Ok(())
    }

    fn block(&mut self, block: &Block) -> Result<(), CompileError> {
        for stmt in block.0.iter() {
            self.statement(stmt)?;
        }
        Ok(())
    }

    fn expression(&mut self, expr: &Expression) -> Result<(), CompileError> {
        match expr {
            Expression::Number(n) => self.emit_constant(Value::Number(*n))?,
            Expression::String(s) => self.emit_constant(s.as_str().into())?,
            Expression::Variable(name) => {
                let name = self.name(name)?;
                self.emit_with_operand(OpCode::GetVariable, name);
            }
            Expression::Binary(left, op, right) => {
                self.expression(left)?;
                self.expression(right)?;
                self.emit(binary_opcode(*op));
            }
            Expression::Call(name, args) => {
                for arg in args {
                    self.expression(arg)?;
                }
                let argc = u8::try_from(args.len())
                    .map_err(|_| CompileError::TooManyArguments(name.clone()))?;
                let name = self.name(name)?;
                self.emit_with_operand(OpCode::Call, name);
                self.chunk.add_bytecode(argc);
            }
        }
        Ok(())
    }

    fn emit(&mut self, op: OpCode) {
        self.chunk.add_bytecode(op);
    }

    fn emit_with_operand(&mut self, op: OpCode, operand: u16) {
        self.chunk.add_bytecode(op);
        self.chunk.add_u16(operand);
    }

    fn emit_constant(&mut self, value: Value) -> Result<(), CompileError> {
        let index = self
            .chunk
            .add_constant(value)
            .ok_or(CompileError::TooManyConstants)?;
        self.emit_with_operand(OpCode::Constant, index);
        Ok(())
    }

    fn name(&mut self, name: &str) -> Result<u16, CompileError> {
        self.chunk
            .add_name(name)
            .ok_or(CompileError::TooManyConstants)
    }

    /// Emits a jump with a placeholder target and returns the offset of its
    /// operand for `patch_jump`.
    fn emit_jump(&mut self, op: OpCode) -> usize {
        self.emit_with_operand(op, UNPATCHED);
        self.chunk.len() - 2
    }

    /// Points the jump whose operand is at `operand` to the next byte to be
    /// emitted.
    fn patch_jump(&mut self, operand: usize) -> Result<(), CompileError> {
        let target = self.chunk.len();
        let encoded = u16::try_from(target).map_err(|_| CompileError::JumpTooFar(target))?;
        tracing::trace!(operand, target, "patching jump");
        self.chunk.patch_u16(operand, encoded);
        Ok(())
    }

    fn emit_loop(&mut self, loop_start: usize) -> Result<(), CompileError> {
        let encoded =
            u16::try_from(loop_start).map_err(|_| CompileError::JumpTooFar(loop_start))?;
        self.emit_with_operand(OpCode::Jump, encoded);
        Ok(())
    }
}

fn binary_opcode(op: InfixOperator) -> OpCode {
    match op {
        InfixOperator::Add => OpCode::Add,
        InfixOperator::Sub => OpCode::Subtract,
        InfixOperator::Mult => OpCode::Multiply,
        InfixOperator::Div => OpCode::Divide,
        InfixOperator::Eq => OpCode::Equal,
        InfixOperator::Ne => OpCode::NotEqual,
        InfixOperator::Lt => OpCode::Less,
        InfixOperator::Gt => OpCode::Greater,
        InfixOperator::Le => OpCode::LessEqual,
        InfixOperator::Ge => OpCode::GreaterEqual,
    }
}
