use std::{cell::RefCell, rc::Rc};

use crate::{ast::FunctionDecl, value::Value, MAX_CALL_DEPTH};

use super::{environment::Environment, Completion, ExecutionErrorKind, Interpreter};

/// A function value: its declaration plus the environment it was declared in.
pub struct Closure {
    decl: FunctionDecl,
    environment: Rc<RefCell<Environment>>,
}

impl std::fmt::Debug for Closure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Closure")
            .field("name", &self.decl.name)
            .field("params", &self.decl.params)
            .field("environment", &self.environment.as_ptr())
            .finish()
    }
}

impl Closure {
    pub fn new(decl: FunctionDecl, environment: Rc<RefCell<Environment>>) -> Self {
        Self { decl, environment }
    }

    pub fn name(&self) -> &str {
        &self.decl.name
    }

    pub fn arity(&self) -> usize {
        self.decl.params.len()
    }

    /// Runs the body in a fresh environment parented at the closure's
    /// environment. `args` are already evaluated in the caller.
    pub(super) fn call(
        &self,
        interpreter: &mut Interpreter,
        args: Vec<Value>,
    ) -> Result<Value, ExecutionErrorKind> {
        if interpreter.call_depth >= MAX_CALL_DEPTH {
            return Err(ExecutionErrorKind::StackOverflow(MAX_CALL_DEPTH));
        }

        let environment = Environment::boxed(Some(self.environment.clone()), true);
        for (param, value) in self.decl.params.iter().zip(args) {
            environment.borrow_mut().define(param.clone(), value);
        }

        tracing::debug!(
            function = %self.decl.name,
            depth = interpreter.call_depth,
            "calling function"
        );

        interpreter.call_depth += 1;
        let completion = interpreter.execute_in_environment(environment, |interpreter| {
            interpreter.execute_block(&self.decl.body)
        });
        interpreter.call_depth -= 1;

        match completion? {
            Completion::Return(value) => Ok(value),
            Completion::Normal => Ok(Value::None),
        }
    }
}
