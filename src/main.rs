use std::{cell::RefCell, io::Write, process::ExitCode, rc::Rc};

use clap::{Args, CommandFactory, Parser, Subcommand};
use notp::{
    tree_walk_interpreter::{Environment, Interpreter},
    Engine, InterpretError,
};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "notp", about = "Run notp programs with the tree-walking interpreter or the bytecode VM")]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run a source file.
    Run(RunArgs),
    /// Start an interactive session on the tree-walking interpreter.
    Repl,
    /// Time recursive fib on both engines.
    Benchmark(BenchmarkArgs),
}

#[derive(Debug, Args)]
struct RunArgs {
    file: Option<String>,
    /// Compile to bytecode and run on the VM.
    #[arg(long)]
    vm: bool,
    /// Print the compiled chunk instead of running it.
    #[arg(long)]
    disassemble: bool,
}

#[derive(Debug, Args)]
struct BenchmarkArgs {
    #[arg(long, default_value_t = 25)]
    n: i64,
}

fn main() -> ExitCode {
    install_tracing();

    let args = Cli::parse();

    match &args.command {
        None => {
            print_usage();
            ExitCode::SUCCESS
        }
        Some(Command::Repl) => {
            repl_command();
            ExitCode::SUCCESS
        }
        Some(Command::Run(args)) => run_command(args),
        Some(Command::Benchmark(args)) => benchmark_command(args.n),
    }
}

/// Diagnostics go to stderr so they never interleave with program output.
fn install_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

fn print_usage() {
    if let Err(e) = Cli::command().print_help() {
        eprintln!("{e}");
    }
}

fn repl_command() {
    println!("Welcome to the notp REPL!");
    println!("EOF to exit. (Ctrl+D on *nix, Ctrl+Z on Windows)");

    let stdout: Rc<RefCell<dyn Write>> = Rc::new(RefCell::new(std::io::stdout()));
    let environment = Environment::boxed(None, false);

    loop {
        let mut input = String::new();

        print!("> ");
        if std::io::stdout().flush().is_err() {
            break;
        }

        match std::io::stdin().read_line(&mut input) {
            Ok(0) => break,
            Ok(_) => {}
            Err(e) => {
                eprintln!("Failed to read input: {e}");
                break;
            }
        }

        let source = input.trim();
        if source.is_empty() {
            continue;
        }

        let result = repl_line(source, environment.clone(), stdout.clone());
        match result {
            Ok(Some(value)) => println!("{}", value),
            Ok(None) => {}
            Err(e) => println!("Error: {}", e),
        }
    }
}

fn repl_line(
    source: &str,
    environment: Rc<RefCell<Environment>>,
    stdout: Rc<RefCell<dyn Write>>,
) -> Result<Option<notp::value::Value>, InterpretError> {
    let tokens = notp::tokenizer::tokens(source)?;
    let program = notp::parser::program(&tokens)?;
    let value = Interpreter::with_environment(environment, stdout).interpret(&program)?;
    Ok(value)
}

fn run_command(args: &RunArgs) -> ExitCode {
    let Some(file) = &args.file else {
        print_usage();
        return ExitCode::SUCCESS;
    };

    let source = match read_source(file) {
        Ok(source) => source,
        Err(message) => {
            eprintln!("{message}");
            return ExitCode::FAILURE;
        }
    };

    if args.disassemble {
        return match disassemble(&source) {
            Ok(listing) => {
                print!("{listing}");
                ExitCode::SUCCESS
            }
            Err(e) => {
                eprintln!("{e}");
                ExitCode::FAILURE
            }
        };
    }

    let engine = if args.vm { Engine::Vm } else { Engine::TreeWalk };
    let stdout: Rc<RefCell<dyn Write>> = Rc::new(RefCell::new(std::io::stdout()));
    match notp::run(&source, engine, stdout) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{e}");
            ExitCode::FAILURE
        }
    }
}

fn read_source(file: &str) -> Result<String, String> {
    std::fs::read_to_string(file).map_err(|e| match e.kind() {
        std::io::ErrorKind::NotFound => format!("file not found: {file}"),
        _ => format!("failed to read {file}: {e}"),
    })
}

fn disassemble(source: &str) -> Result<String, InterpretError> {
    let tokens = notp::tokenizer::tokens(source)?;
    let program = notp::parser::program(&tokens)?;
    let chunk = notp::compiler::compile(&program)?;
    Ok(chunk.disassemble("program"))
}

fn benchmark_command(n: i64) -> ExitCode {
    let source = fib_source(n);
    let stdout: Rc<RefCell<dyn Write>> = Rc::new(RefCell::new(std::io::stdout()));

    let mut timings = Vec::new();
    for (label, engine) in [("Tree walk", Engine::TreeWalk), ("VM", Engine::Vm)] {
        let start = std::time::Instant::now();
        if let Err(e) = notp::run(&source, engine, stdout.clone()) {
            eprintln!("Failed to run fib on {label}: {e}");
            return ExitCode::FAILURE;
        }
        let elapsed = start.elapsed();
        println!("{label} took: {:?}", elapsed);
        timings.push(elapsed);
    }

    let start = std::time::Instant::now();
    println!("{}", fib(n));
    let native = start.elapsed();
    println!("Rust took: {:?}", native);

    if let [tree_walk, vm] = timings[..] {
        println!(
            "VM is {:.2}x faster than the tree walker",
            tree_walk.as_secs_f64() / vm.as_secs_f64()
        );
    }
    ExitCode::SUCCESS
}

fn fib_source(n: i64) -> String {
    format!(
        r#"
    func fib(n) {{
        if (n <= 1) {{
            return n
        }}
        return fib(n - 1) + fib(n - 2)
    }}

    print(fib({n}))
    "#
    )
}

fn fib(n: i64) -> i64 {
    if n <= 1 {
        return n;
    }
    fib(n - 1) + fib(n - 2)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_read_source_reports_missing_file() {
        let path = std::env::temp_dir().join("notp-no-such-file.notp");
        let path = path.to_string_lossy();
        assert_eq!(
            read_source(&path).unwrap_err(),
            format!("file not found: {path}")
        );
    }

    #[test]
    fn test_read_source_reports_other_failures() {
        let path = std::env::temp_dir().join(format!("notp-invalid-{}.notp", std::process::id()));
        std::fs::write(&path, [0xff, 0xfe, 0x00]).unwrap();
        let path_str = path.to_string_lossy().to_string();
        let message = read_source(&path_str).unwrap_err();
        std::fs::remove_file(&path).unwrap();

        assert!(message.starts_with(&format!("failed to read {path_str}: ")));

        let dir = std::env::temp_dir();
        let message = read_source(&dir.to_string_lossy()).unwrap_err();
        assert!(message.starts_with("failed to read "));
    }
}
