mod common;

use common::*;
use vm::{BinaryOp, Expr, LoadedUnit, OpCode, Stmt, Vm, VmError, compile, run_program};

fn let_(name: &str, value: Expr) -> Stmt {
    Stmt::Let(name.to_string(), value)
}

fn run(runtime: &std::sync::Arc<Runtime>, stmts: &[Stmt]) -> Result<Value, VmError> {
    let program = compile("Script", stmts).expect("compile should succeed");
    run_program(runtime.clone(), program)
}

#[test]
fn arithmetic_desugars_to_operator_methods() {
    let runtime = Runtime::isolated();
    let result = run(
        &runtime,
        &[
            let_("x", Expr::Int(1)),
            Stmt::Assign(
                "x".to_string(),
                Expr::binary(BinaryOp::Add, Expr::var("x"), Expr::Int(2)),
            ),
            Stmt::Return(Expr::binary(BinaryOp::Mul, Expr::var("x"), Expr::Int(10))),
        ],
    )
    .expect("vm should run");
    assert_eq!(result, Value::Int(30));
}

#[test]
fn mixed_arithmetic_promotes_to_float() {
    let runtime = Runtime::isolated();
    let result = run(
        &runtime,
        &[Stmt::Return(Expr::binary(
            BinaryOp::Div,
            Expr::Int(7),
            Expr::Int(2),
        ))],
    )
    .expect("vm should run");
    assert_eq!(result, Value::Float(3.5));
}

#[test]
fn explicit_cast_reaches_the_wrapped_overload() {
    let runtime = Runtime::isolated();
    let result = run(
        &runtime,
        &[Stmt::Return(Expr::binary(
            BinaryOp::Add,
            Expr::Float(1.5),
            Expr::Cast(Box::new(Expr::Int(2)), "Double".to_string()),
        ))],
    )
    .expect("vm should run");
    assert_eq!(result, Value::Float(3.5));
}

#[test]
fn if_else_takes_the_matching_branch() {
    let runtime = Runtime::isolated();
    let program = |flag: bool| {
        vec![
            let_("out", Expr::Null),
            Stmt::If {
                condition: Expr::Bool(flag),
                then_branch: vec![Stmt::Assign("out".to_string(), Expr::String("yes".to_string()))],
                else_branch: vec![Stmt::Assign("out".to_string(), Expr::String("no".to_string()))],
            },
            Stmt::Return(Expr::var("out")),
        ]
    };

    assert_eq!(run(&runtime, &program(true)).expect("run"), Value::string("yes"));
    assert_eq!(run(&runtime, &program(false)).expect("run"), Value::string("no"));
}

#[test]
fn ranges_and_collection_literals_build_values() {
    let runtime = Runtime::isolated();
    let ascending = run(
        &runtime,
        &[Stmt::Return(Expr::call(
            Expr::Range(Box::new(Expr::Int(1)), Box::new(Expr::Int(4))),
            "size",
            vec![],
        ))],
    )
    .expect("run");
    assert_eq!(ascending, Value::Int(4));

    let descending = run(
        &runtime,
        &[Stmt::Return(Expr::Range(
            Box::new(Expr::Int(3)),
            Box::new(Expr::Int(1)),
        ))],
    )
    .expect("run");
    assert_eq!(
        descending,
        Value::list(vec![Value::Int(3), Value::Int(2), Value::Int(1)])
    );

    let map = run(
        &runtime,
        &[Stmt::Return(Expr::property(
            Expr::Map(vec![("answer".to_string(), Expr::Int(42))]),
            "answer",
        ))],
    )
    .expect("run");
    assert_eq!(map, Value::Int(42));

    let list = run(
        &runtime,
        &[Stmt::Return(Expr::call(
            Expr::List(vec![Expr::Int(1), Expr::Int(2)]),
            "plus",
            vec![Expr::List(vec![Expr::Int(3)])],
        ))],
    )
    .expect("run");
    assert_eq!(
        list,
        Value::list(vec![Value::Int(1), Value::Int(2), Value::Int(3)])
    );
}

#[test]
fn constructors_statics_and_properties_resolve_class_names() {
    let runtime = Runtime::isolated();
    define_point(&runtime);
    runtime
        .registry()
        .define_class("Origin")
        .static_method("offset", &[], |_, _| Ok(Value::Int(100)))
        .build();

    let result = run(
        &runtime,
        &[
            let_(
                "p",
                Expr::New {
                    class: "Point".to_string(),
                    args: vec![Expr::Int(3), Expr::Int(4)],
                },
            ),
            Stmt::Return(Expr::binary(
                BinaryOp::Add,
                Expr::binary(
                    BinaryOp::Add,
                    Expr::property(Expr::var("p"), "x"),
                    Expr::call(Expr::var("p"), "sum", vec![]),
                ),
                Expr::CallStatic {
                    class: "Origin".to_string(),
                    name: "offset".to_string(),
                    args: vec![],
                },
            )),
        ],
    )
    .expect("vm should run");
    assert_eq!(result, Value::Int(3 + 7 + 100));
}

#[test]
fn safe_navigation_on_null_yields_null() {
    let runtime = Runtime::isolated();
    let result = run(
        &runtime,
        &[
            let_("x", Expr::Null),
            Stmt::Return(Expr::List(vec![
                Expr::safe_call(Expr::var("x"), "size", vec![]),
                Expr::Property {
                    receiver: Box::new(Expr::var("x")),
                    name: "length".to_string(),
                    safe: true,
                },
                Expr::call(Expr::var("x"), "toString", vec![]),
            ])),
        ],
    )
    .expect("vm should run");
    assert_eq!(
        result,
        Value::list(vec![Value::Null, Value::Null, Value::string("null")])
    );
}

#[test]
fn current_object_calls_dispatch_on_this() {
    let runtime = Runtime::isolated();
    let counter = Counter::default();
    let greeter = define_greeter(&runtime, "hello", &counter);
    let program = compile(
        "Greeter",
        &[Stmt::Return(Expr::CallCurrent {
            name: "greet".to_string(),
            args: vec![],
        })],
    )
    .expect("compile should succeed");
    let unit = LoadedUnit::load(runtime.clone(), program).expect("load should succeed");
    assert_eq!(unit.owner(), greeter.type_id());

    let result = Vm::new(unit)
        .with_this(new_object(&greeter))
        .run()
        .expect("vm should run");
    assert_eq!(result, Value::string("hello"));
}

#[test]
fn rerunning_a_unit_reuses_its_sites() {
    let runtime = Runtime::isolated();
    let program = compile(
        "Script",
        &[Stmt::Return(Expr::call(Expr::String("abc".to_string()), "size", vec![]))],
    )
    .expect("compile should succeed");
    let unit = LoadedUnit::load(runtime.clone(), program).expect("load should succeed");

    for _ in 0..3 {
        assert_eq!(Vm::new(unit.clone()).run().expect("run"), Value::Int(3));
    }
    assert_eq!(unit.call_sites().install_count(0), 1);
    assert_eq!(runtime.stats().resolutions(), 1);
}

#[test]
fn target_exception_surfaces_as_vm_runtime_error() {
    let runtime = Runtime::isolated();
    let err = run(
        &runtime,
        &[Stmt::Return(Expr::binary(
            BinaryOp::IntDiv,
            Expr::Int(1),
            Expr::Int(0),
        ))],
    )
    .expect_err("division by zero should fail");
    assert!(matches!(
        err,
        VmError::Runtime(RuntimeError::Thrown { ref kind, .. }) if kind == "ArithmeticException"
    ));
}

#[test]
fn unknown_class_fails_at_load() {
    let runtime = Runtime::isolated();
    let err = run(
        &runtime,
        &[Stmt::Return(Expr::New {
            class: "Nowhere".to_string(),
            args: vec![],
        })],
    )
    .expect_err("Nowhere is not registered");
    assert_eq!(err, VmError::UnknownClass("Nowhere".to_string()));
}

#[test]
fn compiled_manifest_names_every_invocation() {
    let program = compile(
        "Script",
        &[
            let_("s", Expr::String("x".to_string())),
            Stmt::Expr(Expr::safe_call(Expr::var("s"), "size", vec![])),
            Stmt::Expr(Expr::Neg(Box::new(Expr::Int(1)))),
            Stmt::Expr(Expr::New {
                class: "Object".to_string(),
                args: vec![],
            }),
        ],
    )
    .expect("compile should succeed");

    let names = program.call_sites.names().collect::<Vec<_>>();
    assert_eq!(names, vec!["size", "negative", "<init>"]);
    assert!(program.code.contains(&(OpCode::CallSafe as u8)));
    assert!(program.code.contains(&(OpCode::CallNew as u8)));
    assert_eq!(program.classes, vec!["Object".to_string()]);
}
