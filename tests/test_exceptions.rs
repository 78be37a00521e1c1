extern crate jsengine;

use jsengine::runner::ds::error::{EngineError, Signal};
use jsengine::runner::ds::value::{JsNumberType, JsValue};
use jsengine::runner::engine::ScriptEngine;

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

#[test]
fn test_catch_binds_the_thrown_value() {
    assert_eq!(
        run_get_str("var r = ''; try { throw 'boom'; } catch (e) { r = e; }", "r"),
        "boom"
    );
}

#[test]
fn test_catch_binds_thrown_objects_verbatim() {
    let code = "var c = 0; try { throw {code: 7}; } catch (e) { c = e.code; }";
    assert_eq!(run_get_int(code, "c"), 7);
}

#[test]
fn test_engine_errors_surface_as_error_objects() {
    let code = r#"
var name = '';
var msg = '';
try { undefinedFn(); } catch (e) { name = e.name; msg = e.message; }
"#;
    assert_eq!(run_get_str(code, "name"), "ReferenceError");
    assert_eq!(run_get_str(code, "msg"), "'undefinedFn' is not defined");
}

#[test]
fn test_catch_without_binding() {
    assert_eq!(
        run_get_int("var hit = 0; try { throw 1; } catch { hit = 2; }", "hit"),
        2
    );
}

#[test]
fn test_finally_runs_once_on_normal_completion() {
    assert_eq!(
        run_get_int("var n = 0; try { n = n + 10; } finally { n = n + 1; }", "n"),
        11
    );
}

#[test]
fn test_finally_runs_once_when_catch_handles() {
    let code = "var log = ''; try { throw 'x'; } catch (e) { log = log + 'c'; } finally { log = log + 'f'; }";
    assert_eq!(run_get_str(code, "log"), "cf");
}

#[test]
fn test_finally_runs_while_exception_propagates() {
    let mut engine = ScriptEngine::new();
    let code = "var log = ''; function f() { try { throw 'x'; } finally { log = log + 'f'; } } try { f(); } catch (e) { log = log + 'c'; }";
    engine.evaluate_str(code).unwrap();
    match engine.get_global_value("log").unwrap() {
        JsValue::String(s) => assert_eq!(s, "fc"),
        other => panic!("log was {:?}", other),
    }
}

#[test]
fn test_break_crosses_finally_exactly_once() {
    let code = r#"
var log = '';
for (var i = 0; i < 3; i++) {
    try {
        if (i == 1) break;
        log = log + 'b' + i;
    } finally {
        log = log + 'f' + i;
    }
}
"#;
    assert_eq!(run_get_str(code, "log"), "b0f0f1");
}

#[test]
fn test_continue_crosses_finally() {
    let code = r#"
var log = '';
for (var i = 0; i < 3; i++) {
    try {
        if (i == 1) continue;
        log = log + 'b' + i;
    } finally {
        log = log + 'f' + i;
    }
}
"#;
    assert_eq!(run_get_str(code, "log"), "b0f0f1b2f2");
}

#[test]
fn test_break_runs_nested_finally_handlers_in_order() {
    let code = r#"
var log = '';
while (true) {
    try {
        try { break; } finally { log = log + '1'; }
    } finally {
        log = log + '2';
    }
}
"#;
    assert_eq!(run_get_str(code, "log"), "12");
}

#[test]
fn test_return_crosses_finally() {
    let code = r#"
var order = '';
function f() {
    try { return 1; } finally { order = order + 'f'; }
}
var v = f();
"#;
    assert_eq!(run_get_int(code, "v"), 1);
    assert_eq!(run_get_str(code, "order"), "f");
}

#[test]
fn test_return_inside_finally_wins() {
    let code = "function g() { try { return 1; } finally { return 2; } } var v = g();";
    assert_eq!(run_get_int(code, "v"), 2);
}

#[test]
fn test_break_inside_finally_discards_the_exception() {
    let code = r#"
var r = 'none';
while (true) {
    try { throw 'x'; } finally { break; }
}
r = 'after';
"#;
    assert_eq!(run_get_str(code, "r"), "after");
}

#[test]
fn test_break_inside_a_loop_opened_in_the_finally_stays_local() {
    let code = r#"
var n = 0;
try {
    n = n + 1;
} finally {
    while (true) { break; }
    n = n + 10;
}
"#;
    assert_eq!(run_get_int(code, "n"), 11);
}

#[test]
fn test_exception_caught_inside_finally_keeps_the_pending_transfer() {
    let code = r#"
var log = '';
function f() {
    try {
        return 'r';
    } finally {
        try { throw 'x'; } catch (e) { log = log + 'c'; }
        log = log + 'f';
    }
}
var v = f();
"#;
    assert_eq!(run_get_str(code, "v"), "r");
    assert_eq!(run_get_str(code, "log"), "cf");
}

#[test]
fn test_exception_in_finally_replaces_the_original() {
    let code = r#"
var r = '';
try {
    try { throw 'old'; } finally { throw 'new'; }
} catch (e) {
    r = e;
}
"#;
    assert_eq!(run_get_str(code, "r"), "new");
}

#[test]
fn test_rethrow_when_no_catch_clause() {
    let code = r#"
var r = '';
try {
    try { throw 'deep'; } finally { r = r + 'f'; }
} catch (e) {
    r = r + e;
}
"#;
    assert_eq!(run_get_str(code, "r"), "fdeep");
}

#[test]
fn test_cancellation_bypasses_catch_and_finally() {
    let mut engine = ScriptEngine::new();
    engine.register_function("cancel", 0, |_, _, _| {
        Err(Signal::Cancellation("stop".to_string()))
    });
    let code = r#"
var caught = false;
var fin = false;
try { cancel(); } catch (e) { caught = true; } finally { fin = true; }
"#;
    match engine.evaluate_str(code) {
        Err(EngineError::Cancelled(m)) => assert_eq!(m, "stop"),
        other => panic!("expected cancellation, got {:?}", other.map(|_| ())),
    }
    assert!(matches!(
        engine.get_global_value("caught").unwrap(),
        JsValue::Boolean(false)
    ));
    assert!(matches!(
        engine.get_global_value("fin").unwrap(),
        JsValue::Boolean(false)
    ));
}

#[test]
fn test_catchability_predicate_can_admit_cancellation() {
    let mut engine = ScriptEngine::new();
    engine.register_function("cancel", 0, |_, _, _| {
        Err(Signal::Cancellation("stop".to_string()))
    });
    engine.set_catchability_predicate(|signal| {
        matches!(signal, Signal::Script(_) | Signal::Cancellation(_))
    });
    let code = "var msg = ''; try { cancel(); } catch (e) { msg = e; }";
    engine.evaluate_str(code).unwrap();
    match engine.get_global_value("msg").unwrap() {
        JsValue::String(s) => assert_eq!(s, "stop"),
        other => panic!("msg was {:?}", other),
    }
}

#[test]
fn test_uncaught_throw_reaches_the_host() {
    let mut engine = ScriptEngine::new();
    match engine.evaluate_str("throw 'loose';") {
        Err(EngineError::Script { error, .. }) => assert_eq!(error.message, "loose"),
        other => panic!("expected script error, got {:?}", other.map(|_| ())),
    }
}

#[test]
fn test_catch_scope_does_not_leak() {
    let code = "var t = ''; try { throw 'v'; } catch (e) { } t = typeof e;";
    assert_eq!(run_get_str(code, "t"), "undefined");
}
