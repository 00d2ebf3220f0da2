mod callable;
mod environment;

use std::{cell::RefCell, fmt::Debug, rc::Rc};

use crate::{
    ast::{Block, Expression, Program, Statement},
    value::{OperationError, Value},
};

pub use self::{
    callable::Closure,
    environment::Environment,
};

/// How a statement finished. `Return` unwinds through blocks and loops until
/// the enclosing call turns it into the call's value.
#[derive(Debug, Clone, PartialEq)]
pub enum Completion {
    Normal,
    Return(Value),
}

#[derive(Clone)]
pub struct Interpreter {
    environment: Rc<RefCell<Environment>>,
    stdout: Rc<RefCell<dyn std::io::Write>>,
    call_depth: usize,
}

impl Debug for Interpreter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Interpreter")
            .field("environment", &self.environment)
            .field("call_depth", &self.call_depth)
            .finish()
    }
}

impl Default for Interpreter {
    fn default() -> Self {
        Self::new(Rc::new(RefCell::new(std::io::stdout())))
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ExecutionError {
    #[error("Error executing statement: {current_statement} - {kind}")]
    Execution {
        kind: ExecutionErrorKind,
        current_statement: Statement,
    },
}

impl ExecutionError {
    pub fn kind(&self) -> &ExecutionErrorKind {
        match self {
            ExecutionError::Execution { kind, .. } => kind,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ExecutionErrorKind {
    #[error("IO error: {0}")]
    IO(#[from] std::io::Error),
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
    #[error(transparent)]
    Operation(#[from] OperationError),
}

impl Interpreter {
    pub fn new(stdout: Rc<RefCell<dyn std::io::Write>>) -> Self {
        Self::with_environment(Environment::boxed(None, false), stdout)
    }

    /// Runs against an existing root environment, e.g. one kept alive across
    /// REPL lines.
    pub fn with_environment(
        environment: Rc<RefCell<Environment>>,
        stdout: Rc<RefCell<dyn std::io::Write>>,
    ) -> Self {
        Self {
            environment,
            stdout,
            call_depth: 0,
        }
    }

    pub fn environment(&self) -> Rc<RefCell<Environment>> {
        self.environment.clone()
    }

    /// Executes every statement in order. Returns the value of the last
    /// statement when it is an expression statement.
    pub fn interpret(&mut self, program: &Program) -> Result<Option<Value>, ExecutionError> {
        let mut last = None;

        for stmt in program.0.iter() {
            let result = match stmt {
                Statement::Expression(expression) => self.evaluate(expression).map(Some),
                _ => self.execute(stmt).map(|_| None),
            };

            match result {
                Ok(value) => last = value,
                Err(e) => {
                    return Err(ExecutionError::Execution {
                        kind: e,
                        current_statement: stmt.clone(),
                    })
                }
            }
        }

        Ok(last)
    }

    fn execute(&mut self, stmt: &Statement) -> Result<Completion, ExecutionErrorKind> {
        let completion = match stmt {
            Statement::Expression(expression) => {
                self.evaluate(expression)?;
                Completion::Normal
            }
            Statement::Print(expression) => {
                let value = self.evaluate(expression)?;
                writeln!(self.stdout.borrow_mut(), "{}", value)?;
                Completion::Normal
            }
            Statement::Assign(name, expression) => {
                let value = self.evaluate(expression)?;
                self.environment.borrow_mut().define(name.clone(), value);
                Completion::Normal
            }
            Statement::If(condition, then_branch, else_branch) => {
                if self.evaluate(condition)?.is_truthy() {
                    self.execute_block(then_branch)?
                } else if let Some(else_branch) = else_branch {
                    self.execute_block(else_branch)?
                } else {
                    Completion::Normal
                }
            }
            Statement::While(condition, body) => {
                let mut completion = Completion::Normal;
                while self.evaluate(condition)?.is_truthy() {
                    completion = self.execute_block(body)?;
                    if completion != Completion::Normal {
                        break;
                    }
                }
                completion
            }
            Statement::Function(decl) => {
                let closure = Closure::new(decl.clone(), self.environment.clone());
                self.environment
                    .borrow_mut()
                    .define(decl.name.clone(), Value::Function(Rc::new(closure)));
                Completion::Normal
            }
            Statement::Return(expression) => {
                if !self.environment.borrow().is_in_function() {
                    return Err(ExecutionErrorKind::ReturnOutsideFunction);
                }
                Completion::Return(self.evaluate(expression)?)
            }
        };

        Ok(completion)
    }

    /// Blocks run in the current environment; only calls open a new one.
    fn execute_block(&mut self, block: &Block) -> Result<Completion, ExecutionErrorKind> {
        for stmt in block.0.iter() {
            let completion = self.execute(stmt)?;
            if completion != Completion::Normal {
                return Ok(completion);
            }
        }
        Ok(Completion::Normal)
    }

    fn execute_in_environment<T>(
        &mut self,
        environment: Rc<RefCell<Environment>>,
        f: impl FnOnce(&mut Self) -> Result<T, ExecutionErrorKind>,
    ) -> Result<T, ExecutionErrorKind> {
        let prev = std::mem::replace(&mut self.environment, environment);
        let result = f(self);
        self.environment = prev;
        result
    }

    fn evaluate(&mut self, expression: &Expression) -> Result<Value, ExecutionErrorKind> {
        match expression {
            Expression::Number(n) => Ok(Value::Number(*n)),
            Expression::String(s) => Ok(Value::String(s.as_str().into())),
            Expression::Variable(name) => self
                .environment
                .borrow()
                .get(name)
                .ok_or_else(|| ExecutionErrorKind::NameError(name.clone())),
            Expression::Binary(left, op, right) => {
                let left = self.evaluate(left)?;
                let right = self.evaluate(right)?;
                Ok(Value::binary(*op, left, right)?)
            }
            Expression::Call(name, args) => {
                let callee = self
                    .environment
                    .borrow()
                    .get(name)
                    .ok_or_else(|| ExecutionErrorKind::NameError(name.clone()))?;

                let Value::Function(closure) = callee else {
                    return Err(ExecutionErrorKind::NotCallable(name.clone()));
                };

                if args.len() != closure.arity() {
                    return Err(ExecutionErrorKind::ArgumentCount {
                        name: name.clone(),
                        expected: closure.arity(),
                        found: args.len(),
                    });
                }

                let args = args
                    .iter()
                    .map(|arg| self.evaluate(arg))
                    .collect::<Result<Vec<_>, _>>()?;

                closure.call(self, args)
            }
        }
    }
}
