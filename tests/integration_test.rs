use std::{cell::RefCell, rc::Rc};

use notp::{
    tree_walk_interpreter::ExecutionErrorKind, value::OperationError, vm::RuntimeError, Engine,
    InterpretError,
};

fn run(source: &str, engine: Engine) -> (Result<(), InterpretError>, String) {
    let output = Rc::new(RefCell::new(Vec::new()));
    let result = notp::run(source, engine, output.clone());
    let output = String::from_utf8(output.take()).expect("Output should be valid UTF-8");
    (result, output)
}

fn test_valid_program(source: &str, expected_output: &str) {
    for engine in [Engine::TreeWalk, Engine::Vm] {
        let (result, output) = run(source, engine);
        if let Err(e) = result {
            panic!("{engine:?} should run valid program: {e}");
        }
        assert_eq!(output, expected_output, "output from {engine:?}");
    }
}

#[test]
fn test_loop() {
    let source = r#"
    x = 0
    while (x < 3) {
        print(x)
        x = x + 1
    }
    "#;
    test_valid_program(source, "0\n1\n2\n");
}

#[test]
fn test_fact() {
    let source = r#"
    func fact(n) {
        if (n < 2) { return 1 }
        return n * fact(n - 1)
    }
    print(fact(5))
    "#;
    test_valid_program(source, "120\n");
}

#[test]
fn test_fib() {
    let source = r#"
    func fib(n) {
        if (n <= 1) { return n }
        return fib(n - 1) + fib(n - 2)
    }

    i = 0
    while (i < 10) {
        print(fib(i))
        i = i + 1
    }
    "#;
    test_valid_program(source, "0\n1\n1\n2\n3\n5\n8\n13\n21\n34\n");
}

#[test]
fn test_undefined_function() {
    let (result, _) = run("print(missing(1))", Engine::TreeWalk);
    match result {
        Err(InterpretError::Execution(e)) => {
            assert!(matches!(e.kind(), ExecutionErrorKind::NameError(name) if name == "missing"))
        }
        other => panic!("expected name error, got {other:?}"),
    }

    let (result, _) = run("print(missing(1))", Engine::Vm);
    assert!(matches!(
        result,
        Err(InterpretError::Runtime(RuntimeError::NameError(name))) if name == "missing"
    ));
}

#[test]
fn test_wrong_argument_count() {
    let source = r#"
    func fact(n) {
        if (n < 2) { return 1 }
        return n * fact(n - 1)
    }
    fact(1, 2)
    "#;
    let (result, _) = run(source, Engine::TreeWalk);
    match result {
        Err(InterpretError::Execution(e)) => assert!(matches!(
            e.kind(),
            ExecutionErrorKind::ArgumentCount {
                expected: 1,
                found: 2,
                ..
            }
        )),
        other => panic!("expected argument count error, got {other:?}"),
    }

    let (result, _) = run(source, Engine::Vm);
    assert!(matches!(
        result,
        Err(InterpretError::Runtime(RuntimeError::ArgumentCount {
            expected: 1,
            found: 2,
            ..
        }))
    ));
}

#[test]
fn test_floor_division() {
    test_valid_program("print((-7) / 2) print(7 / 2) print(-7 / -2)", "-4\n3\n3\n");
}

#[test]
fn test_precedence_and_associativity() {
    test_valid_program("x = 1 + 2 * 3 print(x) print(10 - 2 - 3)", "7\n5\n");
}

#[test]
fn test_call_assignment_stays_local() {
    let source = r#"
    x = 1
    func f() {
        x = 2
        print(x)
    }
    f()
    print(x)
    "#;
    test_valid_program(source, "2\n1\n");
}

#[test]
fn test_if_else_runs_one_branch() {
    test_valid_program("if (0) { print(1) } else { print(2) }", "2\n");
    test_valid_program("if (1) { print(1) } else { print(2) }", "1\n");
    test_valid_program(r#"if ("") { print(1) } print(3)"#, "3\n");
}

#[test]
fn test_print_formats() {
    test_valid_program(
        r#"print("hi") print(1 < 2) print(2 <= 1) print("a" == "a") print(1 != "1")"#,
        "hi\ntrue\nfalse\ntrue\ntrue\n",
    );
}

#[test]
fn test_closure_reads_defining_scope() {
    let source = r#"
    greeting = "hello"
    func outer(name) {
        func inner() {
            return greeting + " " + name
        }
        return inner()
    }
    print(outer("world"))
    "#;
    let (result, output) = run(source, Engine::TreeWalk);
    result.expect("closure program should run");
    assert_eq!(output, "hello world\n");
}

#[test]
fn test_closure_outlives_its_defining_call() {
    let source = r#"
    func mk(x) {
        func get() { return x }
        return get
    }
    g = mk(4)
    h = mk(5)
    print(g())
    print(h())
    print(g)
    "#;
    let (result, output) = run(source, Engine::TreeWalk);
    result.expect("returned closure should run");
    assert_eq!(output, "4\n5\n<function get>\n");
}

#[test]
fn test_functions_are_ordinary_bindings() {
    test_valid_program(
        r#"
        func mk() { func c() { return 3 } return c }
        k = mk()
        print(k())
        func twice(f, x) { return f(f(x)) }
        func inc(n) { return n + 1 }
        print(twice(inc, 1))
        "#,
        "3\n3\n",
    );

    let failing = [
        ("func f() { return 1 } f = 5 print(f())", "f"),
        ("func g() { return 1 } func h(g) { return g() } print(h(5))", "g"),
    ];
    for (source, callee) in failing {
        let (result, _) = run(source, Engine::TreeWalk);
        match result {
            Err(InterpretError::Execution(e)) => assert!(matches!(
                e.kind(),
                ExecutionErrorKind::NotCallable(name) if name == callee
            )),
            other => panic!("expected not callable, got {other:?}"),
        }
        let (result, _) = run(source, Engine::Vm);
        assert!(matches!(
            result,
            Err(InterpretError::Runtime(RuntimeError::NotCallable(name))) if name == callee
        ));
    }

    let source = "func outer() { func inner() { return 7 } return 0 } outer() print(inner())";
    for engine in [Engine::TreeWalk, Engine::Vm] {
        let (result, _) = run(source, engine);
        let message = result.expect_err("inner should not escape its call").to_string();
        assert!(message.contains("'inner' is not defined"), "{engine:?}: {message}");
    }
}

#[test]
fn test_long_expression_is_a_parse_error() {
    let source = format!("print({})", vec!["1"; 200_000].join(" + "));
    for engine in [Engine::TreeWalk, Engine::Vm] {
        let (result, output) = run(&source, engine);
        assert!(matches!(result, Err(InterpretError::Parse(_))));
        assert_eq!(output, "");
    }
}

#[test]
fn test_return_outside_function() {
    let source = "print(1) return 2 print(3)";

    let (result, output) = run(source, Engine::TreeWalk);
    match result {
        Err(InterpretError::Execution(e)) => {
            assert!(matches!(e.kind(), ExecutionErrorKind::ReturnOutsideFunction))
        }
        other => panic!("expected return error, got {other:?}"),
    }
    assert_eq!(output, "1\n");

    let (result, output) = run(source, Engine::Vm);
    assert!(matches!(
        result,
        Err(InterpretError::Runtime(RuntimeError::ReturnOutsideFunction))
    ));
    assert_eq!(output, "1\n");
}

#[test]
fn test_division_by_zero() {
    let source = "print(1) print(1 / 0)";

    let (result, output) = run(source, Engine::TreeWalk);
    match result {
        Err(InterpretError::Execution(e)) => assert!(matches!(
            e.kind(),
            ExecutionErrorKind::Operation(OperationError::DivisionByZero)
        )),
        other => panic!("expected division by zero, got {other:?}"),
    }
    assert_eq!(output, "1\n");

    let (result, output) = run(source, Engine::Vm);
    assert!(matches!(
        result,
        Err(InterpretError::Runtime(RuntimeError::Operation(
            OperationError::DivisionByZero
        )))
    ));
    assert_eq!(output, "1\n");
}

#[test]
fn test_front_end_errors() {
    for engine in [Engine::TreeWalk, Engine::Vm] {
        let (result, _) = run("x = 1 $", engine);
        assert!(matches!(result, Err(InterpretError::Tokenize(_))));

        let (result, _) = run("print(1", engine);
        assert!(matches!(result, Err(InterpretError::Parse(_))));

        let (result, _) = run("1 < 2 < 3", engine);
        assert!(matches!(result, Err(InterpretError::Parse(_))));
    }
}
