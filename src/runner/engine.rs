//! Public engine facade.
//!
//! `ScriptEngine` owns everything a running script touches: the shape arena,
//! the global object and scope, the call stack used for diagnostics, the
//! catchability predicate, the host interop surface and both work queues.
//! Compilation and execution flow through here; the VM in
//! `runner::codegen::vm` reaches back into the engine for shared state.

use crate::parser::JsParser;
use crate::runner::codegen::bytecode::Chunk;
use crate::runner::codegen::compiler::{compile_eval, compile_program};
use crate::runner::codegen::vm;
use crate::runner::ds::error::{EngineError, ErrorKind, Signal};
use crate::runner::ds::function::{create_function_object, FunctionData, NativeCallback};
use crate::runner::ds::object::{self, JsObjectRef, ObjectInstance, ObjectKind, PropertySlot};
use crate::runner::ds::scope::{RuntimeScope, ScopeRef};
use crate::runner::ds::shape::{PropertyAttributes, ShapeArena};
use crate::runner::ds::source::{CompatibilityMode, CompilerOptions, ScriptSource};
use crate::runner::ds::value::{JsNumberType, JsValue};
use std::any::Any;
use std::collections::VecDeque;
use std::rc::Rc;
use std::sync::{Arc, Mutex};

/// Pipeline phase notifications, delivered to registered listeners in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnginePhase {
    ParseStarted,
    OptimizeStarted,
    CodeGenerationStarted,
    ExecutionStarted,
}

/// One frame of the diagnostic call stack.
#[derive(Debug, Clone)]
pub struct StackFrameInfo {
    /// `None` for top-level code and anonymous functions.
    pub function_name: Option<String>,
    pub path: String,
    pub line: u32,
    pub is_new: bool,
}

/// Host values accepted by `set_global_value` and friends.
pub enum HostValue {
    Bool(bool),
    I8(i8),
    U8(u8),
    I16(i16),
    U16(u16),
    I32(i32),
    U32(u32),
    I64(i64),
    U64(u64),
    F32(f32),
    F64(f64),
    Char(char),
    Str(String),
    Value(JsValue),
    /// Unrecognized host reference, wrapped in an opaque object and cached
    /// per pointer identity.
    Opaque(Rc<dyn Any>),
}

/// Reusable compiled unit; `execute` may be called any number of times.
pub struct CompiledScript {
    pub(crate) chunk: Rc<Chunk>,
    pub path: String,
    /// Disassembly listing, present when the options asked for diagnostics.
    pub diagnostics: Option<String>,
}

impl CompiledScript {
    pub fn execute(&self, engine: &mut ScriptEngine) -> Result<JsValue, EngineError> {
        engine.run_compiled(self)
    }
}

type PostExecuteStep = Box<dyn FnOnce(&mut ScriptEngine) -> Result<(), EngineError>>;
pub type EventAction = Box<dyn FnOnce(&mut ScriptEngine) + Send>;
type FrameTransform = Box<dyn Fn(&StackFrameInfo) -> Option<StackFrameInfo>>;
type PhaseListener = Box<dyn Fn(EnginePhase)>;

/// Cloneable, thread-safe handle for feeding the event queue.
#[derive(Clone)]
pub struct EventQueueHandle {
    queue: Arc<Mutex<VecDeque<EventAction>>>,
}

impl EventQueueHandle {
    pub fn enqueue_event(&self, action: EventAction) {
        if let Ok(mut q) = self.queue.lock() {
            q.push_back(action);
        }
    }
}

pub struct ScriptEngine {
    pub(crate) arena: ShapeArena,
    pub(crate) global_object: JsObjectRef,
    pub(crate) global_scope: ScopeRef,
    /// 0 means unlimited.
    pub(crate) recursion_depth_limit: usize,
    pub(crate) catch_predicate: Box<dyn Fn(&Signal) -> bool>,
    pub(crate) call_stack: Vec<StackFrameInfo>,
    /// Frames accumulated innermost-first while a script error unwinds.
    pub(crate) pending_trace: Vec<StackFrameInfo>,
    pub(crate) current_path: String,
    options: CompilerOptions,
    frame_transform: Option<FrameTransform>,
    phase_listeners: Vec<PhaseListener>,
    post_execute: VecDeque<PostExecuteStep>,
    draining_post_execute: bool,
    event_queue: Arc<Mutex<VecDeque<EventAction>>>,
    /// Opaque wrapper objects keyed by host pointer identity. Never evicted.
    opaque_cache: Vec<(usize, JsObjectRef)>,
    /// Top-level frames currently on the call stack; everything above them
    /// counts against the recursion limit.
    global_frames: usize,
}

impl ScriptEngine {
    pub fn new() -> Self {
        ScriptEngine::with_options(CompilerOptions::default())
    }

    pub fn with_options(options: CompilerOptions) -> Self {
        let mut arena = ShapeArena::new();
        let root = arena.root();
        let global_object = ObjectInstance::new_ref(root, None);
        let global_scope = RuntimeScope::new_object_backed(global_object.clone(), None);
        let mut engine = ScriptEngine {
            arena,
            global_object,
            global_scope,
            recursion_depth_limit: 0,
            catch_predicate: Box::new(|signal| matches!(signal, Signal::Script(_))),
            call_stack: Vec::new(),
            pending_trace: Vec::new(),
            current_path: "unnamed".to_string(),
            options,
            frame_transform: None,
            phase_listeners: Vec::new(),
            post_execute: VecDeque::new(),
            draining_post_execute: false,
            event_queue: Arc::new(Mutex::new(VecDeque::new())),
            opaque_cache: Vec::new(),
            global_frames: 0,
        };
        engine.install_default_globals();
        engine
    }

    fn install_default_globals(&mut self) {
        // Legacy mode keeps these writable, matching ES3-era engines.
        let attributes = match self.options.compatibility_mode {
            CompatibilityMode::Legacy => PropertyAttributes::default_data(),
            CompatibilityMode::Latest => PropertyAttributes::sealed(),
        };
        let globals = [
            ("NaN", JsValue::Number(JsNumberType::NaN)),
            ("Infinity", JsValue::Number(JsNumberType::PositiveInfinity)),
            ("undefined", JsValue::Undefined),
        ];
        for (name, value) in globals {
            object::define_own_property(
                &mut self.arena,
                &self.global_object,
                name,
                PropertySlot::Data(value),
                attributes,
            );
        }
    }

    pub fn options(&self) -> &CompilerOptions {
        &self.options
    }

    pub fn global_object(&self) -> JsObjectRef {
        self.global_object.clone()
    }

    pub fn global_scope(&self) -> ScopeRef {
        self.global_scope.clone()
    }

    pub fn set_options(&mut self, options: CompilerOptions) {
        self.options = options;
    }

    /// 0 disables the limit.
    pub fn set_recursion_depth_limit(&mut self, limit: usize) {
        self.recursion_depth_limit = limit;
    }

    /// Replaces the predicate deciding which signals `catch` may observe.
    /// The default accepts script errors only.
    pub fn set_catchability_predicate(
        &mut self,
        predicate: impl Fn(&Signal) -> bool + 'static,
    ) {
        self.catch_predicate = Box::new(predicate);
    }

    /// Per-frame stack trace rewrite hook; returning `None` drops the frame.
    pub fn set_stack_frame_transform(
        &mut self,
        transform: impl Fn(&StackFrameInfo) -> Option<StackFrameInfo> + 'static,
    ) {
        self.frame_transform = Some(Box::new(transform));
    }

    pub fn add_phase_listener(&mut self, listener: impl Fn(EnginePhase) + 'static) {
        self.phase_listeners.push(Box::new(listener));
    }

    fn fire_phase(&self, phase: EnginePhase) {
        for listener in &self.phase_listeners {
            listener(phase);
        }
    }

    pub(crate) fn function_depth(&self) -> usize {
        self.call_stack.len().saturating_sub(self.global_frames)
    }

    // ── Compilation & execution ──────────────────────────────

    pub fn compile(&mut self, source: &ScriptSource) -> Result<CompiledScript, EngineError> {
        self.fire_phase(EnginePhase::ParseStarted);
        let program = JsParser::parse_program(source)?;
        self.fire_phase(EnginePhase::OptimizeStarted);
        self.fire_phase(EnginePhase::CodeGenerationStarted);
        let chunk = compile_program(&program, &self.options, &source.path)?;
        let diagnostics = if self.options.emit_diagnostics {
            Some(chunk.disassemble(&source.path))
        } else {
            None
        };
        Ok(CompiledScript {
            chunk: Rc::new(chunk),
            path: source.path.clone(),
            diagnostics,
        })
    }

    /// Compiles and runs a source, returning the value of its last
    /// expression statement.
    pub fn evaluate(&mut self, source: &ScriptSource) -> Result<JsValue, EngineError> {
        let script = self.compile(source)?;
        self.run_compiled(&script)
    }

    pub fn evaluate_str(&mut self, text: &str) -> Result<JsValue, EngineError> {
        self.evaluate(&ScriptSource::new(text))
    }

    /// Compiles and runs a source, discarding the result value.
    pub fn execute(&mut self, source: &ScriptSource) -> Result<(), EngineError> {
        self.evaluate(source).map(|_| ())
    }

    pub(crate) fn run_compiled(&mut self, script: &CompiledScript) -> Result<JsValue, EngineError> {
        self.fire_phase(EnginePhase::ExecutionStarted);
        self.current_path = script.path.clone();
        self.call_stack.push(StackFrameInfo {
            function_name: None,
            path: script.path.clone(),
            line: script.chunk.lines.first().copied().unwrap_or(0),
            is_new: false,
        });
        self.global_frames += 1;
        let result = vm::execute_chunk(
            self,
            &script.chunk,
            self.global_scope.clone(),
            JsValue::Object(self.global_object.clone()),
        );
        self.global_frames -= 1;
        let info = self.call_stack.pop();
        if let (Some(info), Err(Signal::Script(_))) = (info, &result) {
            self.pending_trace.push(info);
        }
        let result = self.finish_toplevel(result);
        let drained = self.drain_post_execute();
        match result {
            Ok(value) => {
                drained?;
                Ok(value.normalized())
            }
            Err(e) => Err(e),
        }
    }

    /// Runs code in eval context against a caller-supplied scope chain.
    /// Callable from native functions mid-execution.
    pub fn eval(
        &mut self,
        code: &str,
        scope: ScopeRef,
        this: JsValue,
        strict: bool,
    ) -> Result<JsValue, Signal> {
        let source = ScriptSource::with_path(code, "eval");
        let program = JsParser::parse_program(&source)
            .map_err(|e| Signal::script(ErrorKind::SyntaxError, e.message.clone()))?;
        let chunk = compile_eval(&program, strict, &source.path)
            .map_err(|e| Signal::script(ErrorKind::SyntaxError, e.message.clone()))?;
        vm::execute_chunk(self, &chunk, scope, this)
    }

    fn finish_toplevel(&mut self, result: Result<JsValue, Signal>) -> Result<JsValue, EngineError> {
        match result {
            Ok(value) => Ok(value),
            Err(signal) => {
                let trace = match &signal {
                    Signal::Script(error) => {
                        self.format_stack_trace(error.kind.name(), &error.message)
                    }
                    _ => String::new(),
                };
                self.pending_trace.clear();
                Err(EngineError::from_signal(signal, trace))
            }
        }
    }

    /// `<ErrorName>: <message>` followed by one line per frame, innermost
    /// first. Each frame passes through the transform hook, which may
    /// rewrite it or drop it.
    pub fn format_stack_trace(&self, error_name: &str, message: &str) -> String {
        let mut out = format!("{}: {}", error_name, message);
        for frame in &self.pending_trace {
            let frame = match &self.frame_transform {
                Some(transform) => match transform(frame) {
                    Some(f) => f,
                    None => continue,
                },
                None => frame.clone(),
            };
            out.push('\n');
            match &frame.function_name {
                Some(name) => {
                    let prefix = if frame.is_new { "new " } else { "" };
                    out.push_str(&format!(
                        "    at {}{} ({}:{})",
                        prefix, name, frame.path, frame.line
                    ));
                }
                None => out.push_str(&format!("    at {}:{}", frame.path, frame.line)),
            }
        }
        out
    }

    // ── Host interop ─────────────────────────────────────────

    /// Applies the host coercion matrix.
    pub fn to_js_value(&mut self, value: HostValue) -> JsValue {
        match value {
            HostValue::Bool(b) => JsValue::Boolean(b),
            HostValue::I8(v) => JsValue::from_i64(v as i64),
            HostValue::U8(v) => JsValue::from_i64(v as i64),
            HostValue::I16(v) => JsValue::from_i64(v as i64),
            HostValue::U16(v) => JsValue::from_i64(v as i64),
            HostValue::I32(v) => JsValue::from_i64(v as i64),
            HostValue::U32(v) => JsValue::from_i64(v as i64),
            HostValue::I64(v) => JsValue::from_i64(v),
            HostValue::U64(v) => {
                if v <= i64::MAX as u64 {
                    JsValue::from_i64(v as i64)
                } else {
                    JsValue::from_f64(v as f64)
                }
            }
            HostValue::F32(v) => JsValue::from_f64(v as f64),
            HostValue::F64(v) => JsValue::from_f64(v),
            HostValue::Char(c) => JsValue::String(c.to_string()),
            HostValue::Str(s) => JsValue::String(s),
            HostValue::Value(v) => v,
            HostValue::Opaque(any) => JsValue::Object(self.wrap_opaque(any)),
        }
    }

    fn wrap_opaque(&mut self, any: Rc<dyn Any>) -> JsObjectRef {
        let key = Rc::as_ptr(&any) as *const () as usize;
        for (k, obj) in &self.opaque_cache {
            if *k == key {
                return obj.clone();
            }
        }
        let obj = ObjectInstance::new_ref(self.arena.root(), None);
        obj.borrow_mut().kind = ObjectKind::Opaque(any);
        self.opaque_cache.push((key, obj.clone()));
        obj
    }

    pub fn set_global_value(&mut self, name: &str, value: HostValue) {
        let value = self.to_js_value(value);
        object::define_own_property(
            &mut self.arena,
            &self.global_object,
            name,
            PropertySlot::Data(value),
            PropertyAttributes::default_data(),
        );
    }

    pub fn get_global_value(&self, name: &str) -> Result<JsValue, EngineError> {
        object::get_own_property(&self.arena, &self.global_object, name)
            .map(|v| v.unwrap_or(JsValue::Undefined))
            .map_err(|signal| EngineError::from_signal(signal, String::new()))
    }

    pub fn has_global_value(&self, name: &str) -> bool {
        object::has_property(&self.arena, &self.global_object, name)
    }

    pub fn call_global_function(
        &mut self,
        name: &str,
        args: Vec<JsValue>,
    ) -> Result<JsValue, EngineError> {
        let callee = self.get_global_value(name)?;
        let this = JsValue::Object(self.global_object.clone());
        let result = vm::call_function(self, &callee, this, args, false);
        self.finish_toplevel(result).map(JsValue::normalized)
    }

    /// Binds a native function of fixed arity on the global object. The
    /// callback always receives exactly `arity` arguments, padded with
    /// `undefined` as needed.
    pub fn register_function(
        &mut self,
        name: &str,
        arity: usize,
        callback: impl Fn(&mut ScriptEngine, JsValue, &[JsValue]) -> Result<JsValue, Signal> + 'static,
    ) {
        let callback: NativeCallback = Rc::new(callback);
        let data = FunctionData::Native {
            name: name.to_string(),
            arity,
            callback,
        };
        let root = self.arena.root();
        let obj = create_function_object(&mut self.arena, root, data);
        object::define_own_property(
            &mut self.arena,
            &self.global_object,
            name,
            PropertySlot::Data(JsValue::Object(obj)),
            PropertyAttributes::default_data(),
        );
    }

    // ── Queues ───────────────────────────────────────────────

    /// Queues a step to run after the current top-level execution.
    pub fn queue_post_execute(
        &mut self,
        step: impl FnOnce(&mut ScriptEngine) -> Result<(), EngineError> + 'static,
    ) {
        self.post_execute.push_back(Box::new(step));
    }

    /// Drains post-execute steps FIFO. Steps queued while draining run in
    /// the same drain; a nested top-level execution inside a step does not
    /// recurse into draining. The queue is cleared even when a step fails.
    fn drain_post_execute(&mut self) -> Result<(), EngineError> {
        if self.draining_post_execute {
            return Ok(());
        }
        self.draining_post_execute = true;
        let mut result = Ok(());
        while let Some(step) = self.post_execute.pop_front() {
            if let Err(e) = step(self) {
                result = Err(e);
                break;
            }
        }
        self.post_execute.clear();
        self.draining_post_execute = false;
        result
    }

    pub fn event_queue_handle(&self) -> EventQueueHandle {
        EventQueueHandle {
            queue: self.event_queue.clone(),
        }
    }

    /// Runs at most one queued event action on the calling thread, then
    /// drains the post-execute queue. Returns whether an action ran;
    /// callers loop to drain.
    pub fn pump_event_queue(&mut self) -> bool {
        let action = match self.event_queue.lock() {
            Ok(mut q) => q.pop_front(),
            Err(_) => None,
        };
        match action {
            Some(action) => {
                action(self);
                let _ = self.drain_post_execute();
                true
            }
            None => false,
        }
    }
}

impl Default for ScriptEngine {
    fn default() -> Self {
        ScriptEngine::new()
    }
}
