pub mod ast;
pub mod bytecode;
pub mod compiler;
pub mod parser;
pub mod span;
pub mod tokenizer;
pub mod tree_walk_interpreter;
pub mod value;
pub mod vm;

use std::{cell::RefCell, io::Write, rc::Rc};

/// Deepest call nesting either engine allows before reporting a stack
/// overflow.
pub const MAX_CALL_DEPTH: usize = 256;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Engine {
    #[default]
    TreeWalk,
    Vm,
}

#[derive(Debug, thiserror::Error)]
pub enum InterpretError {
    #[error(transparent)]
    Tokenize(#[from] tokenizer::TokenizeError),
    #[error(transparent)]
    Parse(#[from] parser::ParseError),
    #[error(transparent)]
    Execution(#[from] tree_walk_interpreter::ExecutionError),
    #[error(transparent)]
    Compile(#[from] compiler::CompileError),
    #[error(transparent)]
    Runtime(#[from] vm::RuntimeError),
}

/// Tokenizes, parses and runs `source` on `engine`, writing `print` output to
/// `stdout`.
pub fn run(
    source: &str,
    engine: Engine,
    stdout: Rc<RefCell<dyn Write>>,
) -> Result<(), InterpretError> {
    let tokens = tokenizer::tokens(source)?;
    let program = parser::program(&tokens)?;
    tracing::debug!(statements = program.0.len(), ?engine, "parsed program");

    match engine {
        Engine::TreeWalk => {
            tree_walk_interpreter::Interpreter::new(stdout).interpret(&program)?;
        }
        Engine::Vm => {
            let chunk = compiler::compile(&program)?;
            vm::Vm::new(stdout).interpret(&chunk)?;
        }
    }
    Ok(())
}
