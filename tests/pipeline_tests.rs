//! End-to-end tests driving the full pipeline: lex -> parse -> analyze ->
//! emit -> execute. Each program ends in a top-level `return`, which halts
//! the VM directly with that value (see `Vm`'s `Ret` handling) so the
//! result can be asserted without capturing stdout.

use linh::{lex, parse, Emitter, NullPackageHost, SemanticAnalyzer, Value, Vm};

fn run(src: &str) -> Value {
    let (mut program, parse_errors) = parse(lex(src));
    assert!(parse_errors.is_empty(), "parse errors: {parse_errors:?}");

    let host = NullPackageHost;
    let sem_errors = SemanticAnalyzer::new(&host).analyze(&mut program, true);
    assert!(sem_errors.is_empty(), "semantic errors: {sem_errors:?}");

    let emitted = Emitter::new().emit(&program).expect("emission should succeed");

    let mut host = NullPackageHost;
    Vm::new().execute(&emitted, &mut host).expect("execution should succeed")
}

#[test]
fn sums_one_through_ten() {
    let result = run("var s = 0; for (var i = 1; i <= 10; i = i + 1) { s = s + i; } return s;");
    assert_eq!(result, Value::Int(55));
}

#[test]
fn floor_division_rounds_toward_negative_infinity() {
    assert_eq!(run("return -7 # 2;"), Value::Int(-4));
    assert_eq!(run("return -7 / 2;"), Value::Int(-3));
    assert_eq!(run("return -7 % 2;"), Value::Int(-1));
}

#[test]
fn string_interpolation_substitutes_variables() {
    let result = run(r#"var name = "World"; return "Hi, &{name}!";"#);
    assert_eq!(result, Value::text("Hi, World!"));
}

#[test]
fn map_keys_preserve_insertion_order() {
    let result = run(r#"var m = {"a": 1, "b": 2}; return m.keys();"#);
    assert_eq!(result, Value::new_array(vec![Value::text("a"), Value::text("b")]));
}

#[test]
fn array_indexing_reads_back_literal_elements() {
    let result = run("var a = [10, 20, 30]; return a[1];");
    assert_eq!(result, Value::Int(20));
}

#[test]
fn try_catch_binds_division_by_zero_message() {
    let result = run("var msg = \"\"; try { var x = 1 / 0; } catch (e) { msg = e; } return msg;");
    assert_eq!(result, Value::text("Division by zero"));
}

#[test]
fn finally_runs_on_both_the_success_and_error_path() {
    let result = run(
        "var log = \"\";
         try { log = log + \"a\"; } finally { log = log + \"f\"; }
         try { var x = 1 / 0; } catch (e) { log = log + \"c\"; } finally { log = log + \"g\"; }
         return log;",
    );
    assert_eq!(result, Value::text("afcg"));
}

#[test]
fn recursive_factorial() {
    let result = run("func fact(n) { if (n <= 1) { return 1; } return n * fact(n - 1); } return fact(5);");
    assert_eq!(result, Value::Int(120));
}

#[test]
fn container_aliasing_is_observable_through_append() {
    let result = run("let a = [1, 2, 3]; let b = a; b.append(4); return len(a);");
    assert_eq!(result, Value::UInt(4));
}

#[test]
fn switch_does_not_fall_through_between_cases() {
    let result = run(
        "var out = 0;
         switch (2) {
             case 1: out = 1; break;
             case 2: out = 2; break;
             default: out = -1;
         }
         return out;",
    );
    assert_eq!(result, Value::Int(2));
}

#[test]
fn package_function_calls_route_through_the_host() {
    let (mut program, parse_errors) = parse(lex("return math.sqrt(9.0);"));
    assert!(parse_errors.is_empty(), "parse errors: {parse_errors:?}");

    struct SqrtHost;
    impl linh::PackageHost for SqrtHost {
        fn get_constant(&self, _package: &str, _name: &str) -> Option<Value> {
            None
        }
        fn call_math_function(&self, name: &str, arg: Value) -> Option<Value> {
            assert_eq!(name, "sqrt");
            Some(Value::Float(arg.as_f64().unwrap().sqrt()))
        }
    }

    let host = SqrtHost;
    let sem_errors = SemanticAnalyzer::new(&host).analyze(&mut program, true);
    assert!(sem_errors.is_empty(), "semantic errors: {sem_errors:?}");

    let emitted = Emitter::new().emit(&program).expect("emission should succeed");
    let mut host = SqrtHost;
    let result = Vm::new().execute(&emitted, &mut host).expect("execution should succeed");
    assert_eq!(result, Value::Float(3.0));
}
