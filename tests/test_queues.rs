extern crate jsengine;

use jsengine::runner::ds::error::{EngineError, ErrorKind, ScriptError};
use jsengine::runner::ds::value::{JsNumberType, JsValue};
use jsengine::runner::engine::{EnginePhase, HostValue, ScriptEngine};
use std::cell::RefCell;
use std::rc::Rc;
use std::sync::mpsc;
use std::thread;

#[test]
fn test_phase_notifications_fire_in_pipeline_order() {
    let mut engine = ScriptEngine::new();
    let phases: Rc<RefCell<Vec<EnginePhase>>> = Rc::new(RefCell::new(Vec::new()));
    let sink = phases.clone();
    engine.add_phase_listener(move |phase| sink.borrow_mut().push(phase));
    engine.evaluate_str("1 + 1").unwrap();
    assert_eq!(
        *phases.borrow(),
        vec![
            EnginePhase::ParseStarted,
            EnginePhase::OptimizeStarted,
            EnginePhase::CodeGenerationStarted,
            EnginePhase::ExecutionStarted,
        ]
    );
}

#[test]
fn test_post_execute_steps_drain_fifo_after_execution() {
    let mut engine = ScriptEngine::new();
    engine.set_global_value("log", HostValue::Str(String::new()));
    engine.queue_post_execute(|engine| {
        engine.set_global_value("log", HostValue::Str("a".to_string()));
        Ok(())
    });
    engine.queue_post_execute(|engine| {
        let so_far = engine.get_global_value("log")?.to_display_string();
        engine.set_global_value("log", HostValue::Str(so_far + "b"));
        Ok(())
    });
    engine.evaluate_str("0").unwrap();
    match engine.get_global_value("log").unwrap() {
        JsValue::String(s) => assert_eq!(s, "ab"),
        other => panic!("log was {:?}", other),
    }
}

#[test]
fn test_steps_queued_while_draining_run_in_the_same_drain() {
    let mut engine = ScriptEngine::new();
    engine.set_global_value("log", HostValue::Str(String::new()));
    engine.queue_post_execute(|engine| {
        engine.set_global_value("log", HostValue::Str("1".to_string()));
        engine.queue_post_execute(|engine| {
            let so_far = engine.get_global_value("log")?.to_display_string();
            engine.set_global_value("log", HostValue::Str(so_far + "2"));
            Ok(())
        });
        Ok(())
    });
    engine.evaluate_str("0").unwrap();
    match engine.get_global_value("log").unwrap() {
        JsValue::String(s) => assert_eq!(s, "12"),
        other => panic!("log was {:?}", other),
    }
}

#[test]
fn test_nested_execution_inside_a_step_does_not_recurse_into_draining() {
    let mut engine = ScriptEngine::new();
    engine.set_global_value("order", HostValue::Str(String::new()));
    engine.queue_post_execute(|engine| {
        // The nested run must not drain the rest of the queue.
        engine.evaluate_str("order = order + 'n';").unwrap();
        Ok(())
    });
    engine.queue_post_execute(|engine| {
        engine.evaluate_str("order = order + 't';").unwrap();
        Ok(())
    });
    engine.evaluate_str("0").unwrap();
    match engine.get_global_value("order").unwrap() {
        JsValue::String(s) => assert_eq!(s, "nt"),
        other => panic!("order was {:?}", other),
    }
}

#[test]
fn test_post_execute_queue_clears_on_step_failure() {
    let mut engine = ScriptEngine::new();
    engine.set_global_value("ran", HostValue::Bool(false));
    engine.queue_post_execute(|_| {
        Err(EngineError::Script {
            error: ScriptError::new(ErrorKind::Error, "step failed"),
            stack_trace: String::new(),
        })
    });
    engine.queue_post_execute(|engine| {
        engine.set_global_value("ran", HostValue::Bool(true));
        Ok(())
    });
    assert!(engine.evaluate_str("0").is_err());
    assert!(matches!(
        engine.get_global_value("ran").unwrap(),
        JsValue::Boolean(false)
    ));
    // The failed drain cleared the queue; the next run owes nothing.
    engine.evaluate_str("0").unwrap();
    assert!(matches!(
        engine.get_global_value("ran").unwrap(),
        JsValue::Boolean(false)
    ));
}

#[test]
fn test_event_queue_runs_one_action_per_pump_in_fifo_order() {
    let mut engine = ScriptEngine::new();
    engine.set_global_value("n", HostValue::I32(0));
    let handle = engine.event_queue_handle();
    handle.enqueue_event(Box::new(|engine: &mut ScriptEngine| {
        engine.set_global_value("n", HostValue::I32(1));
    }));
    handle.enqueue_event(Box::new(|engine: &mut ScriptEngine| {
        engine.set_global_value("n", HostValue::I32(2));
    }));

    assert!(engine.pump_event_queue());
    assert!(matches!(
        engine.get_global_value("n").unwrap(),
        JsValue::Number(JsNumberType::Integer(1))
    ));
    assert!(engine.pump_event_queue());
    assert!(matches!(
        engine.get_global_value("n").unwrap(),
        JsValue::Number(JsNumberType::Integer(2))
    ));
    assert!(!engine.pump_event_queue());
}

#[test]
fn test_event_queue_accepts_actions_from_other_threads() {
    let mut engine = ScriptEngine::new();
    engine.set_global_value("sum", HostValue::I32(0));
    let handle = engine.event_queue_handle();
    let (tx, rx) = mpsc::channel();
    let worker = thread::spawn(move || {
        for i in 1..=3i64 {
            handle.enqueue_event(Box::new(move |engine: &mut ScriptEngine| {
                let sum = match engine.get_global_value("sum").unwrap() {
                    JsValue::Number(JsNumberType::Integer(n)) => n,
                    _ => 0,
                };
                engine.set_global_value("sum", HostValue::I64(sum + i));
            }));
        }
        tx.send(()).unwrap();
    });
    rx.recv().unwrap();
    worker.join().unwrap();

    let mut pumped = 0;
    while engine.pump_event_queue() {
        pumped += 1;
    }
    assert_eq!(pumped, 3);
    assert!(matches!(
        engine.get_global_value("sum").unwrap(),
        JsValue::Number(JsNumberType::Integer(6))
    ));
}

#[test]
fn test_pump_drains_post_execute_after_the_action() {
    let mut engine = ScriptEngine::new();
    engine.set_global_value("log", HostValue::Str(String::new()));
    let handle = engine.event_queue_handle();
    handle.enqueue_event(Box::new(|engine: &mut ScriptEngine| {
        engine.evaluate_str("log = log + 'e';").unwrap();
        engine.queue_post_execute(|engine| {
            engine.evaluate_str("log = log + 'p';").unwrap();
            Ok(())
        });
    }));
    assert!(engine.pump_event_queue());
    match engine.get_global_value("log").unwrap() {
        JsValue::String(s) => assert_eq!(s, "ep"),
        other => panic!("log was {:?}", other),
    }
}
