extern crate jsengine;

use jsengine::runner::ds::error::{EngineError, ErrorKind};
use jsengine::runner::ds::source::{CompatibilityMode, CompilerOptions, ScriptSource};
use jsengine::runner::ds::value::{JsNumberType, JsValue};
use jsengine::runner::engine::{HostValue, ScriptEngine};

fn eval_value(code: &str) -> JsValue {
    let mut engine = ScriptEngine::new();
    engine.evaluate_str(code).unwrap()
}

fn run_get_var(code: &str, name: &str) -> JsValue {
    let mut engine = ScriptEngine::new();
    engine.evaluate_str(code).unwrap();
    engine.get_global_value(name).unwrap()
}

fn run_get_int(code: &str, name: &str) -> i64 {
    match run_get_var(code, name) {
        JsValue::Number(JsNumberType::Integer(n)) => n,
        other => panic!("{} was {:?}, expected integer", name, other),
    }
}

fn run_get_str(code: &str, name: &str) -> String {
    match run_get_var(code, name) {
        JsValue::String(s) => s,
        other => panic!("{} was {:?}, expected string", name, other),
    }
}

fn run_get_bool(code: &str, name: &str) -> bool {
    match run_get_var(code, name) {
        JsValue::Boolean(b) => b,
        other => panic!("{} was {:?}, expected boolean", name, other),
    }
}

#[test]
fn test_simple_var() {
    assert_eq!(run_get_int("var x = 42;", "x"), 42);
}

#[test]
fn test_arithmetic_precedence() {
    assert_eq!(run_get_int("var x = 3 + 4 * 2;", "x"), 11);
}

#[test]
fn test_hex_literal() {
    assert_eq!(run_get_int("var x = 0x10;", "x"), 16);
}

#[test]
fn test_string_concat_coerces_numbers() {
    assert_eq!(run_get_str("var s = 'n=' + 3;", "s"), "n=3");
}

#[test]
fn test_last_expression_is_the_result() {
    match eval_value("var x = 5 + 3; x") {
        JsValue::Number(JsNumberType::Integer(8)) => {}
        other => panic!("unexpected result {:?}", other),
    }
}

#[test]
fn test_integral_float_results_normalize_to_integers() {
    match eval_value("10 / 5") {
        JsValue::Number(JsNumberType::Integer(2)) => {}
        other => panic!("unexpected result {:?}", other),
    }
    match eval_value("10 / 4") {
        JsValue::Number(JsNumberType::Float(f)) => assert_eq!(f, 2.5),
        other => panic!("unexpected result {:?}", other),
    }
}

#[test]
fn test_void_yields_undefined() {
    assert!(matches!(eval_value("void 0"), JsValue::Undefined));
}

#[test]
fn test_while_loop() {
    assert_eq!(
        run_get_int("var sum = 0; var i = 0; while (i < 5) { sum = sum + i; i++; }", "sum"),
        10
    );
}

#[test]
fn test_do_while_runs_at_least_once() {
    assert_eq!(run_get_int("var n = 10; do { n++; } while (false);", "n"), 11);
}

#[test]
fn test_for_loop_with_update() {
    let code = "var count = 0; for (var i = 0; i < 3; i++) { for (var j = 0; j < 4; j++) { count++; } }";
    assert_eq!(run_get_int(code, "count"), 12);
}

#[test]
fn test_conditional_expression() {
    assert_eq!(run_get_str("var x = 1 < 2 ? 'a' : 'b';", "x"), "a");
}

#[test]
fn test_logical_and_short_circuits() {
    let code = "var n = 0; function inc() { n = n + 1; return true; } var r = false && inc();";
    assert_eq!(run_get_int(code, "n"), 0);
}

#[test]
fn test_string_relational_compare() {
    assert!(run_get_bool("var t = 'b' > 'a';", "t"));
}

#[test]
fn test_function_call_and_recursion() {
    let code = "function fact(n) { return n <= 1 ? 1 : n * fact(n - 1); } var f = fact(5);";
    assert_eq!(run_get_int(code, "f"), 120);
}

#[test]
fn test_closure_captures_environment() {
    let code = r#"
function counter() {
    var n = 0;
    return function () { n = n + 1; return n; };
}
var c = counter();
c();
var second = c();
"#;
    assert_eq!(run_get_int(code, "second"), 2);
}

#[test]
fn test_typeof_undeclared_name() {
    assert_eq!(run_get_str("var t = typeof notDeclaredAnywhere;", "t"), "undefined");
}

#[test]
fn test_let_is_block_scoped() {
    let code = "var r = ''; let x = 1; { let x = 2; r = r + x; } r = r + x;";
    assert_eq!(run_get_str(code, "r"), "21");
}

#[test]
fn test_const_reassignment_is_a_type_error() {
    let mut engine = ScriptEngine::new();
    match engine.evaluate_str("const c = 1; c = 2;") {
        Err(EngineError::Script { error, .. }) => assert_eq!(error.kind, ErrorKind::TypeError),
        other => panic!("expected TypeError, got {:?}", other.map(|_| ())),
    }
}

#[test]
fn test_const_initialized_to_undefined_is_still_constant() {
    let mut engine = ScriptEngine::new();
    match engine.evaluate_str("const c = undefined; c = 2;") {
        Err(EngineError::Script { error, .. }) => assert_eq!(error.kind, ErrorKind::TypeError),
        other => panic!("expected TypeError, got {:?}", other.map(|_| ())),
    }
}

#[test]
fn test_reference_error_on_unknown_name() {
    let mut engine = ScriptEngine::new();
    match engine.evaluate_str("missingThing + 1") {
        Err(EngineError::Script { error, .. }) => {
            assert_eq!(error.kind, ErrorKind::ReferenceError);
        }
        other => panic!("expected ReferenceError, got {:?}", other.map(|_| ())),
    }
}

#[test]
fn test_member_access_on_null_is_a_type_error() {
    let mut engine = ScriptEngine::new();
    match engine.evaluate_str("null.x") {
        Err(EngineError::Script { error, .. }) => assert_eq!(error.kind, ErrorKind::TypeError),
        other => panic!("expected TypeError, got {:?}", other.map(|_| ())),
    }
}

#[test]
fn test_strict_assignment_to_undeclared_name() {
    let mut engine = ScriptEngine::new();
    let code = "function s() { 'use strict'; totallyUndeclared = 1; } s();";
    match engine.evaluate_str(code) {
        Err(EngineError::Script { error, .. }) => {
            assert_eq!(error.kind, ErrorKind::ReferenceError);
        }
        other => panic!("expected ReferenceError, got {:?}", other.map(|_| ())),
    }
}

#[test]
fn test_strict_mode_is_inherited_by_nested_functions() {
    let mut engine = ScriptEngine::new();
    let code = "function outer() { 'use strict'; function inner() { qq = 1; } inner(); } outer();";
    match engine.evaluate_str(code) {
        Err(EngineError::Script { error, .. }) => {
            assert_eq!(error.kind, ErrorKind::ReferenceError);
        }
        other => panic!("expected ReferenceError, got {:?}", other.map(|_| ())),
    }
}

#[test]
fn test_strict_duplicate_parameters_rejected_at_compile_time() {
    let mut engine = ScriptEngine::new();
    match engine.evaluate_str("function s(a, a) { 'use strict'; }") {
        Err(EngineError::Syntax(_)) => {}
        other => panic!("expected syntax error, got {:?}", other.map(|_| ())),
    }
}

#[test]
fn test_strict_unqualified_delete_rejected_at_compile_time() {
    let mut engine = ScriptEngine::new();
    match engine.evaluate_str("'use strict'; var x = 1; delete x;") {
        Err(EngineError::Syntax(_)) => {}
        other => panic!("expected syntax error, got {:?}", other.map(|_| ())),
    }
}

#[test]
fn test_sloppy_this_defaults_to_global_object() {
    let code = "function t() { this.marker = 5; } t();";
    assert_eq!(run_get_int(code, "marker"), 5);
}

#[test]
fn test_compiled_script_reruns_with_fresh_results() {
    let mut engine = ScriptEngine::new();
    engine.set_global_value("count", HostValue::I32(0));
    let script = engine
        .compile(&ScriptSource::new("count = count + 1; count"))
        .unwrap();
    match script.execute(&mut engine).unwrap() {
        JsValue::Number(JsNumberType::Integer(1)) => {}
        other => panic!("first run gave {:?}", other),
    }
    match script.execute(&mut engine).unwrap() {
        JsValue::Number(JsNumberType::Integer(2)) => {}
        other => panic!("second run gave {:?}", other),
    }
}

#[test]
fn test_diagnostics_listing_when_requested() {
    let mut options = CompilerOptions::default();
    options.emit_diagnostics = true;
    let mut engine = ScriptEngine::with_options(options);
    let script = engine.compile(&ScriptSource::new("var x = 1;")).unwrap();
    let listing = script.diagnostics.expect("diagnostics requested");
    assert!(listing.contains("Halt"));
}

#[test]
fn test_recursion_limit_allows_depth_below_it() {
    let mut engine = ScriptEngine::new();
    engine.set_recursion_depth_limit(10);
    let code = "function f(n) { if (n == 0) return 0; return f(n - 1); } var ok = f(9);";
    engine.evaluate_str(code).unwrap();
    assert!(matches!(
        engine.get_global_value("ok").unwrap(),
        JsValue::Number(JsNumberType::Integer(0))
    ));
}

#[test]
fn test_recursion_limit_overflow() {
    let mut engine = ScriptEngine::new();
    engine.set_recursion_depth_limit(10);
    let code = "function f(n) { if (n == 0) return 0; return f(n - 1); } f(10);";
    match engine.evaluate_str(code) {
        Err(EngineError::StackOverflow) => {}
        other => panic!("expected stack overflow, got {:?}", other.map(|_| ())),
    }
}

#[test]
fn test_stack_trace_names_frames_innermost_first() {
    let mut engine = ScriptEngine::new();
    let source = ScriptSource::with_path("function boom() { throw 'x'; }\nboom();", "script.js");
    match engine.evaluate(&source) {
        Err(EngineError::Script { stack_trace, .. }) => {
            assert!(stack_trace.starts_with("Error: x"), "trace: {}", stack_trace);
            let boom_at = stack_trace.find("at boom (script.js:1)").unwrap();
            let global_at = stack_trace.find("at script.js:2").unwrap();
            assert!(boom_at < global_at, "trace: {}", stack_trace);
        }
        other => panic!("expected script error, got {:?}", other.map(|_| ())),
    }
}

#[test]
fn test_stack_frame_transform_can_suppress_frames() {
    let mut engine = ScriptEngine::new();
    engine.set_stack_frame_transform(|frame| {
        if frame.function_name.as_deref() == Some("hidden") {
            None
        } else {
            Some(frame.clone())
        }
    });
    let source = ScriptSource::with_path(
        "function hidden() { throw 'x'; }\nfunction outer() { hidden(); }\nouter();",
        "t.js",
    );
    match engine.evaluate(&source) {
        Err(EngineError::Script { stack_trace, .. }) => {
            assert!(!stack_trace.contains("hidden"), "trace: {}", stack_trace);
            assert!(stack_trace.contains("outer"), "trace: {}", stack_trace);
        }
        other => panic!("expected script error, got {:?}", other.map(|_| ())),
    }
}

#[test]
fn test_latest_mode_globals_are_sealed() {
    let mut engine = ScriptEngine::new();
    let v = engine.evaluate_str("NaN = 5; NaN").unwrap();
    assert!(matches!(v, JsValue::Number(JsNumberType::NaN)));
    let v = engine.evaluate_str("undefined = 3; undefined").unwrap();
    assert!(matches!(v, JsValue::Undefined));
}

#[test]
fn test_legacy_mode_globals_stay_writable() {
    let mut options = CompilerOptions::default();
    options.compatibility_mode = CompatibilityMode::Legacy;
    let mut engine = ScriptEngine::with_options(options);
    let v = engine.evaluate_str("NaN = 5; NaN").unwrap();
    assert!(matches!(v, JsValue::Number(JsNumberType::Integer(5))));
}

#[test]
fn test_force_strict_mode_option() {
    let mut options = CompilerOptions::default();
    options.force_strict_mode = true;
    let mut engine = ScriptEngine::with_options(options);
    match engine.evaluate_str("undeclaredInForced = 1;") {
        Err(EngineError::Script { error, .. }) => {
            assert_eq!(error.kind, ErrorKind::ReferenceError);
        }
        other => panic!("expected ReferenceError, got {:?}", other.map(|_| ())),
    }
}
