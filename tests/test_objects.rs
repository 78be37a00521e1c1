extern crate jsengine;

use jsengine::runner::ds::object::ObjectKind;
use jsengine::runner::ds::value::{JsNumberType, JsValue};
use jsengine::runner::engine::{HostValue, ScriptEngine};
use std::any::Any;
use std::rc::Rc;

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

fn run_get_bool(code: &str, name: &str) -> bool {
    match run_get_var(code, name) {
        JsValue::Boolean(b) => b,
        other => panic!("{} was {:?}, expected boolean", name, other),
    }
}

fn object_of(value: JsValue) -> jsengine::runner::ds::object::JsObjectRef {
    match value {
        JsValue::Object(o) => o,
        other => panic!("expected object, got {:?}", other),
    }
}

#[test]
fn test_object_literal_and_member_access() {
    assert_eq!(run_get_int("var o = {x: 1, y: 2}; var s = o.x + o.y;", "s"), 3);
}

#[test]
fn test_computed_member_access() {
    assert_eq!(run_get_int("var o = {a: 5}; var k = 'a'; var v = o[k];", "v"), 5);
}

#[test]
fn test_array_literal_indexing_and_length() {
    let code = "var a = [10, 20, 30]; var v = a[1]; var n = a.length;";
    assert_eq!(run_get_int(code, "v"), 20);
    assert_eq!(run_get_int(code, "n"), 3);
}

#[test]
fn test_objects_built_in_the_same_order_share_a_shape() {
    let mut engine = ScriptEngine::new();
    engine
        .evaluate_str("var a = {x: 1, y: 2}; var b = {x: 3, y: 4}; var c = {y: 5, x: 6};")
        .unwrap();
    let a = object_of(engine.get_global_value("a").unwrap());
    let b = object_of(engine.get_global_value("b").unwrap());
    let c = object_of(engine.get_global_value("c").unwrap());
    assert_eq!(a.borrow().shape, b.borrow().shape);
    assert_ne!(a.borrow().shape, c.borrow().shape);
}

#[test]
fn test_delete_removes_the_property() {
    let code = "var o = {a: 1}; var d = delete o.a; var has = 'a' in o;";
    assert!(run_get_bool(code, "d"));
    assert!(!run_get_bool(code, "has"));
}

#[test]
fn test_in_walks_the_prototype_chain() {
    let code = r#"
function A() {}
A.prototype.shared = 1;
var a = new A();
var own = 'shared' in a;
"#;
    assert!(run_get_bool(code, "own"));
}

#[test]
fn test_new_wires_the_prototype() {
    let code = r#"
function Point(x, y) { this.x = x; this.y = y; }
var p = new Point(1, 2);
var sum = p.x + p.y;
var isInst = p instanceof Point;
"#;
    assert_eq!(run_get_int(code, "sum"), 3);
    assert!(run_get_bool(code, "isInst"));
}

#[test]
fn test_prototype_methods_bind_this() {
    let code = r#"
function Counter() { this.n = 0; }
Counter.prototype.bump = function () { this.n = this.n + 1; return this.n; };
var c = new Counter();
c.bump();
var v = c.bump();
"#;
    assert_eq!(run_get_int(code, "v"), 2);
}

#[test]
fn test_constructor_returning_an_object_overrides_this() {
    let code = "function C() { return {v: 9}; } var o = new C(); var v = o.v;";
    assert_eq!(run_get_int(code, "v"), 9);
}

#[test]
fn test_constructor_returning_a_primitive_keeps_this() {
    let code = "function D() { this.v = 3; return 5; } var o = new D(); var v = o.v;";
    assert_eq!(run_get_int(code, "v"), 3);
}

#[test]
fn test_string_length_and_indexing() {
    let code = "var s = 'abc'; var n = s.length; var c = s[1];";
    assert_eq!(run_get_int(code, "n"), 3);
    match run_get_var(code, "c") {
        JsValue::String(s) => assert_eq!(s, "b"),
        other => panic!("c was {:?}", other),
    }
}

#[test]
fn test_arguments_aliases_named_parameters() {
    let code = "function f(a) { arguments[0] = 42; return a; } var v = f(1);";
    assert_eq!(run_get_int(code, "v"), 42);
}

#[test]
fn test_parameter_writes_show_through_arguments() {
    let code = "function f(a) { a = 7; return arguments[0]; } var v = f(1);";
    assert_eq!(run_get_int(code, "v"), 7);
}

#[test]
fn test_duplicate_parameters_resolve_to_the_last() {
    assert_eq!(
        run_get_int("function g(a, a) { return a; } var v = g(1, 2);", "v"),
        2
    );
}

#[test]
fn test_duplicate_parameters_freeze_earlier_argument_slots() {
    let code = "function h(a, a) { a = 99; return arguments[0]; } var v = h(1, 2);";
    assert_eq!(run_get_int(code, "v"), 1);
}

#[test]
fn test_delete_breaks_argument_aliasing() {
    let code = "function f(a) { delete arguments[0]; arguments[0] = 99; return a; } var v = f(1);";
    assert_eq!(run_get_int(code, "v"), 1);
}

#[test]
fn test_strict_arguments_are_snapshots() {
    let code = "function s(a) { 'use strict'; arguments[0] = 42; return a; } var v = s(1);";
    assert_eq!(run_get_int(code, "v"), 1);
}

#[test]
fn test_arguments_length_counts_actual_arguments() {
    let code = "function f(a, b) { return arguments.length; } var v = f(1, 2, 3);";
    assert_eq!(run_get_int(code, "v"), 3);
}

#[test]
fn test_extra_arguments_are_reachable() {
    let code = "function f(a) { return arguments[2]; } var v = f(1, 2, 3);";
    assert_eq!(run_get_int(code, "v"), 3);
}

#[test]
fn test_function_objects_expose_name_and_length() {
    let code = "function two(a, b) {} var n = two.name; var l = two.length;";
    match run_get_var(code, "n") {
        JsValue::String(s) => assert_eq!(s, "two"),
        other => panic!("name was {:?}", other),
    }
    assert_eq!(run_get_int(code, "l"), 2);
}

#[test]
fn test_named_function_expression_sees_itself() {
    let code = "var f = function inner(n) { return n == 0 ? 0 : inner(n - 1); }; var v = f(3);";
    assert_eq!(run_get_int(code, "v"), 0);
}

#[test]
fn test_opaque_host_values_round_trip_by_identity() {
    let mut engine = ScriptEngine::new();
    let payload: Rc<dyn Any> = Rc::new(42u32);
    engine.set_global_value("h", HostValue::Opaque(payload.clone()));
    engine.set_global_value("h2", HostValue::Opaque(payload.clone()));
    let a = object_of(engine.get_global_value("h").unwrap());
    let b = object_of(engine.get_global_value("h2").unwrap());
    // Same host pointer, same cached wrapper.
    assert!(Rc::ptr_eq(&a, &b));
    let inner = a.borrow();
    match &inner.kind {
        ObjectKind::Opaque(any) => assert_eq!(any.downcast_ref::<u32>(), Some(&42)),
        _ => panic!("expected opaque wrapper"),
    }
}

#[test]
fn test_host_value_coercions() {
    let mut engine = ScriptEngine::new();
    engine.set_global_value("b", HostValue::Bool(true));
    engine.set_global_value("i", HostValue::U16(9));
    engine.set_global_value("f", HostValue::F64(1.5));
    engine.set_global_value("c", HostValue::Char('x'));
    engine.set_global_value("big", HostValue::U64(u64::MAX));
    assert!(matches!(
        engine.get_global_value("b").unwrap(),
        JsValue::Boolean(true)
    ));
    assert!(matches!(
        engine.get_global_value("i").unwrap(),
        JsValue::Number(JsNumberType::Integer(9))
    ));
    assert!(matches!(
        engine.get_global_value("f").unwrap(),
        JsValue::Number(JsNumberType::Float(_))
    ));
    match engine.get_global_value("c").unwrap() {
        JsValue::String(s) => assert_eq!(s, "x"),
        other => panic!("c was {:?}", other),
    }
    assert!(matches!(
        engine.get_global_value("big").unwrap(),
        JsValue::Number(JsNumberType::Float(_))
    ));
}

#[test]
fn test_register_function_pads_arguments_to_arity() {
    let mut engine = ScriptEngine::new();
    engine.register_function("pair", 2, |_, _, args| {
        assert_eq!(args.len(), 2);
        let filled = match args[1] {
            JsValue::Undefined => 0,
            _ => 1,
        };
        Ok(JsValue::from_i64(filled))
    });
    let v = engine.evaluate_str("pair(1)").unwrap();
    assert!(matches!(v, JsValue::Number(JsNumberType::Integer(0))));
    let v = engine.evaluate_str("pair(1, 2)").unwrap();
    assert!(matches!(v, JsValue::Number(JsNumberType::Integer(1))));
}

#[test]
fn test_call_global_function_from_the_host() {
    let mut engine = ScriptEngine::new();
    engine
        .evaluate_str("function add(a, b) { return a + b; }")
        .unwrap();
    let v = engine
        .call_global_function("add", vec![JsValue::from_i64(2), JsValue::from_i64(40)])
        .unwrap();
    assert!(matches!(v, JsValue::Number(JsNumberType::Integer(42))));
}

#[test]
fn test_eval_runs_against_the_global_scope() {
    let mut engine = ScriptEngine::new();
    engine.register_function("run", 1, |engine, _this, args| {
        let code = args[0].to_display_string();
        let scope = engine.global_scope();
        let this = JsValue::Object(engine.global_object());
        engine.eval(&code, scope, this, false)
    });
    let v = engine.evaluate_str("run('var z = 40; z + 2')").unwrap();
    assert!(matches!(v, JsValue::Number(JsNumberType::Integer(42))));
    assert!(engine.has_global_value("z"));
}
