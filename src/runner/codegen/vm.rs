//! Bytecode interpreter.
//!
//! One `Frame` per compiled chunk activation; user-function calls recurse
//! through `call_function`, so the host stack carries the script stack.
//!
//! Exception handling mirrors the region table the compiler builds. An
//! unwind scans the regions containing the faulting instruction from the
//! inside out: a matching catch region receives the signal, while a finally
//! region suspends the transfer, runs its handler and resumes scanning on
//! `EndFinally`. `Leave` and `Return` travel through the same machinery so
//! finally handlers run exactly once on every exit path. A transfer that
//! escapes the handler of a suspended finally cancels the suspended
//! transfer; the newest control flow wins.

use crate::runner::codegen::bytecode::{CatchFilter, Chunk, OpCode, RegionKind};
use crate::runner::ds::error::{ErrorKind, ScriptError, Signal};
use crate::runner::ds::function::{create_arguments_object, FunctionData};
use crate::runner::ds::object::{
    self, JsObjectRef, ObjectInstance, PropertySlot,
};
use crate::runner::ds::scope::{self, RuntimeScope, ScopeKind, ScopeRef};
use crate::runner::ds::shape::PropertyAttributes;
use crate::runner::ds::value::{arith, JsNumberType, JsValue};
use crate::runner::engine::{ScriptEngine, StackFrameInfo};
use std::rc::Rc;

enum Flow {
    Next,
    Jump(usize),
    Finish(JsValue),
    /// Signal leaving this frame after the region scan found no handler.
    Escape(Signal),
}

enum Transfer {
    Unwind(Signal),
    Leave { target: usize, depth: usize },
    Return(JsValue),
}

struct PendingTransfer {
    /// Finally region whose handler is currently running for this transfer.
    region: usize,
    transfer: Transfer,
    from: usize,
}

struct Frame {
    pc: usize,
    stack: Vec<JsValue>,
    temps: Vec<JsValue>,
    scope: ScopeRef,
    scope_depth: usize,
    this: JsValue,
    caught: Vec<Signal>,
    continuations: Vec<PendingTransfer>,
}

impl Frame {
    fn push(&mut self, value: JsValue) {
        self.stack.push(value);
    }

    fn pop(&mut self) -> Result<JsValue, Signal> {
        self.stack
            .pop()
            .ok_or_else(|| Signal::script(ErrorKind::Error, "operand stack underflow"))
    }

    fn peek(&self) -> Result<&JsValue, Signal> {
        self.stack
            .last()
            .ok_or_else(|| Signal::script(ErrorKind::Error, "operand stack underflow"))
    }

    fn pop_many(&mut self, count: usize) -> Result<Vec<JsValue>, Signal> {
        if self.stack.len() < count {
            return Err(Signal::script(ErrorKind::Error, "operand stack underflow"));
        }
        Ok(self.stack.split_off(self.stack.len() - count))
    }
}

/// Runs a compiled chunk against a scope and `this`. Returns the chunk
/// result (last expression value for program chunks, the returned value for
/// function bodies) or the signal that escaped it.
pub fn execute_chunk(
    engine: &mut ScriptEngine,
    chunk: &Chunk,
    scope: ScopeRef,
    this: JsValue,
) -> Result<JsValue, Signal> {
    let mut frame = Frame {
        pc: 0,
        stack: Vec::new(),
        temps: vec![JsValue::Undefined; chunk.temp_count],
        scope,
        scope_depth: 0,
        this,
        caught: Vec::new(),
        continuations: Vec::new(),
    };
    loop {
        if frame.pc >= chunk.code.len() {
            return Ok(result_value(chunk, &frame));
        }
        let pc = frame.pc;
        match step(engine, &mut frame, chunk, pc) {
            Ok(Flow::Next) => frame.pc = pc + 1,
            Ok(Flow::Jump(target)) => frame.pc = target,
            Ok(Flow::Finish(value)) => return Ok(value),
            Ok(Flow::Escape(signal)) => return Err(signal),
            Err(signal) => {
                sync_line(engine, chunk, pc);
                // A freshly raised script error starts a new stack trace.
                if matches!(signal, Signal::Script(_)) {
                    engine.pending_trace.clear();
                }
                match initiate(&mut frame, chunk, Transfer::Unwind(signal), pc) {
                    Flow::Jump(target) => frame.pc = target,
                    Flow::Escape(signal) => return Err(signal),
                    _ => {
                        return Err(Signal::script(
                            ErrorKind::Error,
                            "unwind produced an invalid transfer",
                        ))
                    }
                }
            }
        }
    }
}

fn result_value(chunk: &Chunk, frame: &Frame) -> JsValue {
    match chunk.result_temp {
        Some(t) => frame.temps[t as usize].clone(),
        None => JsValue::Undefined,
    }
}

fn sync_line(engine: &mut ScriptEngine, chunk: &Chunk, pc: usize) {
    if let Some(top) = engine.call_stack.last_mut() {
        if let Some(line) = chunk.lines.get(pc) {
            top.line = *line;
        }
    }
}

fn script_err(kind: ErrorKind, message: String, line: u32) -> Signal {
    let mut error = ScriptError::new(kind, message);
    error.line = line;
    Signal::Script(error)
}

// ── Control transfer machinery ───────────────────────────────

fn unwind_scopes(frame: &mut Frame, to_depth: usize) {
    while frame.scope_depth > to_depth {
        let parent = frame.scope.borrow().parent.clone();
        match parent {
            Some(p) => frame.scope = p,
            None => break,
        }
        frame.scope_depth -= 1;
    }
}

/// Starts a transfer at `from` and converts an escaping signal into
/// `Flow::Escape`.
fn initiate(frame: &mut Frame, chunk: &Chunk, transfer: Transfer, from: usize) -> Flow {
    match advance_transfer(frame, chunk, transfer, from, None, true) {
        Ok(flow) => flow,
        Err(signal) => Flow::Escape(signal),
    }
}

/// Moves a transfer to the next region it must visit, or completes it.
/// `min_span` skips regions already visited when resuming after a finally.
fn advance_transfer(
    frame: &mut Frame,
    chunk: &Chunk,
    transfer: Transfer,
    from: usize,
    min_span: Option<usize>,
    check_stale: bool,
) -> Result<Flow, Signal> {
    let mut best: Option<usize> = None;
    for (i, region) in chunk.regions.iter().enumerate() {
        if !region.contains(from) {
            continue;
        }
        if let Some(span) = min_span {
            if region.span() <= span {
                continue;
            }
        }
        let eligible = match (&transfer, &region.kind) {
            (Transfer::Unwind(signal), RegionKind::Catch(CatchFilter::Any)) => {
                !matches!(signal, Signal::Route(_))
            }
            (Transfer::Unwind(signal), RegionKind::Catch(CatchFilter::RouteOnly)) => {
                matches!(signal, Signal::Route(_))
            }
            (Transfer::Unwind(_), RegionKind::Finally) => true,
            (Transfer::Leave { target, .. }, RegionKind::Finally) => !region.contains(*target),
            (Transfer::Return(_), RegionKind::Finally) => true,
            (_, RegionKind::Catch(_)) => false,
        };
        if !eligible {
            continue;
        }
        best = match best {
            Some(b) if chunk.regions[b].span() <= region.span() => Some(b),
            _ => Some(i),
        };
    }

    if check_stale {
        // A transfer escaping the handler of a suspended finally cancels
        // the suspended transfer.
        while let Some(pending) = frame.continuations.last() {
            let handler = &chunk.regions[pending.region];
            if !handler.handler_contains(from) {
                break;
            }
            let stays_inside = match best {
                Some(i) => {
                    let r = &chunk.regions[i];
                    r.handler_start >= handler.handler_start
                        && r.handler_end <= handler.handler_end
                }
                // A completed branch whose target is still inside the
                // handler never leaves it.
                None => matches!(
                    &transfer,
                    Transfer::Leave { target, .. } if handler.handler_contains(*target)
                ),
            };
            if stays_inside {
                break;
            }
            frame.continuations.pop();
        }
    }

    match best {
        None => match transfer {
            Transfer::Unwind(signal) => Err(signal),
            Transfer::Leave { target, depth } => {
                unwind_scopes(frame, depth);
                Ok(Flow::Jump(target))
            }
            Transfer::Return(value) => Ok(Flow::Finish(value)),
        },
        Some(i) => {
            let region = &chunk.regions[i];
            unwind_scopes(frame, region.scope_depth);
            // Handlers sit at statement boundaries; nothing on the operand
            // stack survives into them.
            frame.stack.clear();
            match region.kind {
                RegionKind::Catch(_) => match transfer {
                    Transfer::Unwind(signal) => {
                        frame.caught.push(signal);
                        Ok(Flow::Jump(region.handler_start))
                    }
                    _ => Err(Signal::script(
                        ErrorKind::Error,
                        "branch transfer delivered to a catch region",
                    )),
                },
                RegionKind::Finally => {
                    frame.continuations.push(PendingTransfer {
                        region: i,
                        transfer,
                        from,
                    });
                    Ok(Flow::Jump(region.handler_start))
                }
            }
        }
    }
}

// ── Instruction dispatch ─────────────────────────────────────

fn step(
    engine: &mut ScriptEngine,
    frame: &mut Frame,
    chunk: &Chunk,
    pc: usize,
) -> Result<Flow, Signal> {
    let instr = &chunk.code[pc];
    let line = chunk.lines[pc];
    let operand = instr.operand;
    let operand2 = instr.operand2;
    match instr.op {
        // ── Constants & literals ─────────────────────────────
        OpCode::Constant => frame.push(chunk.constants[operand as usize].clone()),
        OpCode::Undefined => frame.push(JsValue::Undefined),
        OpCode::Null => frame.push(JsValue::Null),
        OpCode::True => frame.push(JsValue::Boolean(true)),
        OpCode::False => frame.push(JsValue::Boolean(false)),
        OpCode::This => frame.push(frame.this.clone()),

        // ── Arithmetic ───────────────────────────────────────
        OpCode::Add => {
            let b = frame.pop()?;
            let a = frame.pop()?;
            let result = match (&a, &b) {
                (JsValue::String(_), _) | (_, JsValue::String(_)) => JsValue::String(format!(
                    "{}{}",
                    a.to_display_string(),
                    b.to_display_string()
                )),
                _ => JsValue::Number(arith::add(a.to_number(), b.to_number())),
            };
            frame.push(result);
        }
        OpCode::Sub => binary_numeric(frame, arith::sub)?,
        OpCode::Mul => binary_numeric(frame, arith::mul)?,
        OpCode::Div => binary_numeric(frame, arith::div)?,
        OpCode::Mod => binary_numeric(frame, arith::rem)?,
        OpCode::Negate => {
            let a = frame.pop()?;
            frame.push(JsValue::Number(arith::neg(a.to_number())));
        }
        OpCode::ToNumber => {
            let a = frame.pop()?;
            frame.push(JsValue::Number(a.to_number()));
        }

        // ── Bitwise ──────────────────────────────────────────
        OpCode::BitAnd => binary_i32(frame, |a, b| (a & b) as i64)?,
        OpCode::BitOr => binary_i32(frame, |a, b| (a | b) as i64)?,
        OpCode::BitXor => binary_i32(frame, |a, b| (a ^ b) as i64)?,
        OpCode::BitNot => {
            let a = frame.pop()?;
            frame.push(JsValue::from_i64(!a.to_number().to_i32() as i64));
        }
        OpCode::ShiftLeft => binary_i32(frame, |a, b| (a << (b & 31)) as i64)?,
        OpCode::ShiftRight => binary_i32(frame, |a, b| (a >> (b & 31)) as i64)?,
        OpCode::UShiftRight => binary_i32(frame, |a, b| ((a as u32) >> (b & 31)) as i64)?,

        // ── Comparison ───────────────────────────────────────
        OpCode::StrictEqual => {
            let b = frame.pop()?;
            let a = frame.pop()?;
            frame.push(JsValue::Boolean(a.strict_equals(&b)));
        }
        OpCode::StrictNotEqual => {
            let b = frame.pop()?;
            let a = frame.pop()?;
            frame.push(JsValue::Boolean(!a.strict_equals(&b)));
        }
        OpCode::Equal => {
            let b = frame.pop()?;
            let a = frame.pop()?;
            frame.push(JsValue::Boolean(a.loose_equals(&b)));
        }
        OpCode::NotEqual => {
            let b = frame.pop()?;
            let a = frame.pop()?;
            frame.push(JsValue::Boolean(!a.loose_equals(&b)));
        }
        OpCode::LessThan => {
            let b = frame.pop()?;
            let a = frame.pop()?;
            frame.push(JsValue::Boolean(less_than(&a, &b) == Some(true)));
        }
        OpCode::LessEqual => {
            let b = frame.pop()?;
            let a = frame.pop()?;
            frame.push(JsValue::Boolean(less_than(&b, &a) == Some(false)));
        }
        OpCode::GreaterThan => {
            let b = frame.pop()?;
            let a = frame.pop()?;
            frame.push(JsValue::Boolean(less_than(&b, &a) == Some(true)));
        }
        OpCode::GreaterEqual => {
            let b = frame.pop()?;
            let a = frame.pop()?;
            frame.push(JsValue::Boolean(less_than(&a, &b) == Some(false)));
        }
        OpCode::InstanceOf => {
            let b = frame.pop()?;
            let a = frame.pop()?;
            frame.push(JsValue::Boolean(instance_of(engine, &a, &b, line)?));
        }
        OpCode::In => {
            let b = frame.pop()?;
            let a = frame.pop()?;
            let obj = match &b {
                JsValue::Object(o) => o.clone(),
                _ => {
                    return Err(script_err(
                        ErrorKind::TypeError,
                        "right-hand side of 'in' is not an object".to_string(),
                        line,
                    ))
                }
            };
            let key = property_key(&a);
            frame.push(JsValue::Boolean(object::has_property(
                &engine.arena,
                &obj,
                &key,
            )));
        }

        // ── Logical / unary ──────────────────────────────────
        OpCode::Not => {
            let a = frame.pop()?;
            frame.push(JsValue::Boolean(!a.is_truthy()));
        }
        OpCode::TypeOf => {
            let a = frame.pop()?;
            frame.push(JsValue::String(a.type_of().to_string()));
        }
        OpCode::TypeOfName => {
            let name = chunk.get_name(operand);
            let value = scope::lookup_name(&engine.arena, &frame.scope, name)?;
            let type_name = match value {
                Some(v) => v.type_of(),
                None => "undefined",
            };
            frame.push(JsValue::String(type_name.to_string()));
        }

        // ── Variables ────────────────────────────────────────
        OpCode::GetSlot => {
            let target = scope::scope_at_depth(&frame.scope, operand as usize);
            let value = target.borrow().get_slot(operand2 as usize);
            frame.push(value);
        }
        OpCode::SetSlot => {
            let value = frame.peek()?.clone();
            let target = scope::scope_at_depth(&frame.scope, operand as usize);
            let result = target.borrow_mut().set_slot(operand2 as usize, value);
            result?;
        }
        OpCode::GetName => {
            let name = chunk.get_name(operand);
            match scope::lookup_name(&engine.arena, &frame.scope, name)? {
                Some(v) => frame.push(v),
                None => {
                    return Err(script_err(
                        ErrorKind::ReferenceError,
                        format!("'{}' is not defined", name),
                        line,
                    ))
                }
            }
        }
        OpCode::SetName => {
            let name = chunk.get_name(operand);
            let value = frame.peek()?.clone();
            scope::assign_name(&mut engine.arena, &frame.scope, name, value, chunk.strict)?;
        }
        OpCode::DeleteName => {
            let name = chunk.get_name(operand);
            let deleted = scope::delete_name(&mut engine.arena, &frame.scope, name)?;
            frame.push(JsValue::Boolean(deleted));
        }
        OpCode::DeclareVar => {
            let name = chunk.get_name(operand);
            declare_var(engine, frame, name);
        }

        // ── Control flow ─────────────────────────────────────
        OpCode::Jump => return Ok(Flow::Jump(operand as usize)),
        OpCode::JumpIfFalse => {
            let cond = frame.pop()?;
            if !cond.is_truthy() {
                return Ok(Flow::Jump(operand as usize));
            }
        }
        OpCode::JumpIfTrue => {
            let cond = frame.pop()?;
            if cond.is_truthy() {
                return Ok(Flow::Jump(operand as usize));
            }
        }
        OpCode::Leave => {
            return Ok(initiate(
                frame,
                chunk,
                Transfer::Leave {
                    target: operand as usize,
                    depth: operand2 as usize,
                },
                pc,
            ));
        }

        // ── Stack / temps ────────────────────────────────────
        OpCode::Pop => {
            frame.pop()?;
        }
        OpCode::Dup => {
            let top = frame.peek()?.clone();
            frame.push(top);
        }
        OpCode::Dup2 => {
            let len = frame.stack.len();
            if len < 2 {
                return Err(Signal::script(ErrorKind::Error, "operand stack underflow"));
            }
            let a = frame.stack[len - 2].clone();
            let b = frame.stack[len - 1].clone();
            frame.push(a);
            frame.push(b);
        }
        OpCode::StoreTemp => {
            let value = frame.pop()?;
            frame.temps[operand as usize] = value;
        }
        OpCode::LoadTemp => {
            let value = frame.temps[operand as usize].clone();
            frame.push(value);
        }

        // ── Scopes ───────────────────────────────────────────
        OpCode::PushScope => {
            let template = chunk.scope_templates[operand as usize].clone();
            frame.scope = RuntimeScope::new_declarative(template, Some(frame.scope.clone()));
            frame.scope_depth += 1;
        }
        OpCode::PopScope => {
            unwind_scopes(frame, frame.scope_depth.saturating_sub(1));
        }

        // ── Objects ──────────────────────────────────────────
        OpCode::NewObject => {
            let obj = ObjectInstance::new_ref(engine.arena.root(), None);
            frame.push(JsValue::Object(obj));
        }
        OpCode::NewArray => {
            let values = frame.pop_many(operand as usize)?;
            let obj = ObjectInstance::new_ref(engine.arena.root(), None);
            for (i, v) in values.into_iter().enumerate() {
                object::define_own_property(
                    &mut engine.arena,
                    &obj,
                    &i.to_string(),
                    PropertySlot::Data(v),
                    PropertyAttributes::default_data(),
                );
            }
            object::define_own_property(
                &mut engine.arena,
                &obj,
                "length",
                PropertySlot::Data(JsValue::from_i64(operand as i64)),
                PropertyAttributes::hidden(),
            );
            frame.push(JsValue::Object(obj));
        }
        OpCode::InitProp => {
            let value = frame.pop()?;
            let obj = match frame.peek()? {
                JsValue::Object(o) => o.clone(),
                _ => {
                    return Err(Signal::script(
                        ErrorKind::Error,
                        "object literal initializer without an object",
                    ))
                }
            };
            object::define_own_property(
                &mut engine.arena,
                &obj,
                chunk.get_name(operand),
                PropertySlot::Data(value),
                PropertyAttributes::default_data(),
            );
        }
        OpCode::GetProp => {
            let base = frame.pop()?;
            let value = get_member(engine, &base, chunk.get_name(operand), line)?;
            frame.push(value);
        }
        OpCode::SetProp => {
            let value = frame.pop()?;
            let base = frame.pop()?;
            set_member(
                engine,
                &base,
                chunk.get_name(operand),
                value.clone(),
                chunk.strict,
                line,
            )?;
            frame.push(value);
        }
        OpCode::GetElem => {
            let key = frame.pop()?;
            let base = frame.pop()?;
            let value = get_member(engine, &base, &property_key(&key), line)?;
            frame.push(value);
        }
        OpCode::SetElem => {
            let value = frame.pop()?;
            let key = frame.pop()?;
            let base = frame.pop()?;
            set_member(
                engine,
                &base,
                &property_key(&key),
                value.clone(),
                chunk.strict,
                line,
            )?;
            frame.push(value);
        }
        OpCode::DeleteProp => {
            let base = frame.pop()?;
            let deleted = delete_member(engine, &base, chunk.get_name(operand), chunk.strict, line)?;
            frame.push(JsValue::Boolean(deleted));
        }
        OpCode::DeleteElem => {
            let key = frame.pop()?;
            let base = frame.pop()?;
            let deleted = delete_member(engine, &base, &property_key(&key), chunk.strict, line)?;
            frame.push(JsValue::Boolean(deleted));
        }

        // ── Functions ────────────────────────────────────────
        OpCode::Closure => {
            let proto = chunk.protos[operand as usize].clone();
            let data = FunctionData::User {
                proto,
                scope: frame.scope.clone(),
            };
            let root = engine.arena.root();
            let obj = crate::runner::ds::function::create_function_object(
                &mut engine.arena,
                root,
                data,
            );
            frame.push(JsValue::Object(obj));
        }
        OpCode::Call => {
            let args = frame.pop_many(operand as usize)?;
            let callee = frame.pop()?;
            let this = frame.pop()?;
            sync_line(engine, chunk, pc);
            match call_function(engine, &callee, this, args, false) {
                Ok(value) => frame.push(value),
                Err(signal) => {
                    return Ok(initiate(frame, chunk, Transfer::Unwind(signal), pc))
                }
            }
        }
        OpCode::New => {
            let args = frame.pop_many(operand as usize)?;
            let callee = frame.pop()?;
            sync_line(engine, chunk, pc);
            match construct(engine, &callee, args, line) {
                Ok(value) => frame.push(value),
                Err(signal) => {
                    return Ok(initiate(frame, chunk, Transfer::Unwind(signal), pc))
                }
            }
        }
        OpCode::Return => {
            let value = frame.pop()?;
            return Ok(initiate(frame, chunk, Transfer::Return(value), pc));
        }

        // ── Exceptions ───────────────────────────────────────
        OpCode::Throw => {
            let value = frame.pop()?;
            return Err(Signal::Script(ScriptError::thrown(value, line)));
        }
        OpCode::IsCatchable => {
            let catchable = match frame.caught.last() {
                Some(signal) => (engine.catch_predicate)(signal),
                None => {
                    return Err(Signal::script(
                        ErrorKind::Error,
                        "catch filter outside a handler",
                    ))
                }
            };
            frame.push(JsValue::Boolean(catchable));
        }
        OpCode::BindCaught => {
            let signal = frame.caught.pop().ok_or_else(|| {
                Signal::script(ErrorKind::Error, "catch binding outside a handler")
            })?;
            frame.push(caught_value(engine, signal));
        }
        OpCode::DiscardCaught => {
            frame.caught.pop().ok_or_else(|| {
                Signal::script(ErrorKind::Error, "catch discard outside a handler")
            })?;
        }
        OpCode::Rethrow => {
            let signal = frame.caught.pop().ok_or_else(|| {
                Signal::script(ErrorKind::Error, "rethrow outside a handler")
            })?;
            return Ok(initiate(frame, chunk, Transfer::Unwind(signal), pc));
        }
        OpCode::RaiseRoute => {
            return Ok(initiate(
                frame,
                chunk,
                Transfer::Unwind(Signal::Route(operand)),
                pc,
            ));
        }
        OpCode::DispatchRoute => {
            let signal = frame.caught.pop().ok_or_else(|| {
                Signal::script(ErrorKind::Error, "route dispatch outside a handler")
            })?;
            let id = match signal {
                Signal::Route(id) => id as usize,
                other => return Err(other),
            };
            let target = chunk
                .route_tables
                .get(operand as usize)
                .and_then(|t| t.get(id))
                .copied();
            match target {
                Some(t) => return Ok(Flow::Jump(t)),
                None => {
                    return Err(Signal::script(
                        ErrorKind::Error,
                        "route id outside the dispatch table",
                    ))
                }
            }
        }
        OpCode::EndFinally => {
            let pending = frame.continuations.pop().ok_or_else(|| {
                Signal::script(ErrorKind::Error, "finally completed with no pending transfer")
            })?;
            let span = chunk.regions[pending.region].span();
            return Ok(
                match advance_transfer(frame, chunk, pending.transfer, pending.from, Some(span), false)
                {
                    Ok(flow) => flow,
                    Err(signal) => Flow::Escape(signal),
                },
            );
        }

        OpCode::Halt => return Ok(Flow::Finish(result_value(chunk, frame))),
    }
    Ok(Flow::Next)
}

// ── Operator helpers ─────────────────────────────────────────

fn binary_numeric(
    frame: &mut Frame,
    op: fn(JsNumberType, JsNumberType) -> JsNumberType,
) -> Result<(), Signal> {
    let b = frame.pop()?;
    let a = frame.pop()?;
    frame.push(JsValue::Number(op(a.to_number(), b.to_number())));
    Ok(())
}

fn binary_i32(frame: &mut Frame, op: fn(i32, i32) -> i64) -> Result<(), Signal> {
    let b = frame.pop()?;
    let a = frame.pop()?;
    frame.push(JsValue::from_i64(op(
        a.to_number().to_i32(),
        b.to_number().to_i32(),
    )));
    Ok(())
}

/// Relational comparison; strings compare lexicographically, everything
/// else numerically. `None` when NaN poisons the comparison.
fn less_than(a: &JsValue, b: &JsValue) -> Option<bool> {
    match (a, b) {
        (JsValue::String(x), JsValue::String(y)) => Some(x < y),
        _ => arith::lt(a.to_number(), b.to_number()),
    }
}

fn property_key(value: &JsValue) -> String {
    value.to_display_string()
}

fn instance_of(
    engine: &ScriptEngine,
    value: &JsValue,
    callee: &JsValue,
    line: u32,
) -> Result<bool, Signal> {
    let fobj = match callee {
        JsValue::Object(o) if o.borrow().is_callable() => o.clone(),
        _ => {
            return Err(script_err(
                ErrorKind::TypeError,
                "right-hand side of 'instanceof' is not callable".to_string(),
                line,
            ))
        }
    };
    let proto = match object::get_own_property(&engine.arena, &fobj, "prototype")? {
        Some(JsValue::Object(p)) => p,
        _ => return Ok(false),
    };
    let mut current = match value {
        JsValue::Object(o) => o.borrow().prototype.clone(),
        _ => return Ok(false),
    };
    while let Some(p) = current {
        if Rc::ptr_eq(&p, &proto) {
            return Ok(true);
        }
        current = p.borrow().prototype.clone();
    }
    Ok(false)
}

fn get_member(
    engine: &ScriptEngine,
    base: &JsValue,
    key: &str,
    line: u32,
) -> Result<JsValue, Signal> {
    match base {
        JsValue::Object(o) => object::get_property(&engine.arena, o, key),
        JsValue::String(s) => {
            if key == "length" {
                return Ok(JsValue::from_i64(s.chars().count() as i64));
            }
            if let Ok(index) = key.parse::<usize>() {
                if let Some(c) = s.chars().nth(index) {
                    return Ok(JsValue::String(c.to_string()));
                }
            }
            Ok(JsValue::Undefined)
        }
        JsValue::Undefined | JsValue::Null => Err(script_err(
            ErrorKind::TypeError,
            format!(
                "cannot read property '{}' of {}",
                key,
                base.to_display_string()
            ),
            line,
        )),
        _ => Ok(JsValue::Undefined),
    }
}

fn set_member(
    engine: &mut ScriptEngine,
    base: &JsValue,
    key: &str,
    value: JsValue,
    strict: bool,
    line: u32,
) -> Result<(), Signal> {
    match base {
        JsValue::Object(o) => object::set_property(&mut engine.arena, o, key, value, strict),
        JsValue::Undefined | JsValue::Null => Err(script_err(
            ErrorKind::TypeError,
            format!(
                "cannot set property '{}' of {}",
                key,
                base.to_display_string()
            ),
            line,
        )),
        _ => {
            if strict {
                return Err(script_err(
                    ErrorKind::TypeError,
                    format!("cannot create property '{}' on a primitive", key),
                    line,
                ));
            }
            Ok(())
        }
    }
}

fn delete_member(
    engine: &mut ScriptEngine,
    base: &JsValue,
    key: &str,
    strict: bool,
    line: u32,
) -> Result<bool, Signal> {
    match base {
        JsValue::Object(o) => object::delete_property(&mut engine.arena, o, key, strict),
        JsValue::Undefined | JsValue::Null => Err(script_err(
            ErrorKind::TypeError,
            format!(
                "cannot delete property '{}' of {}",
                key,
                base.to_display_string()
            ),
            line,
        )),
        _ => Ok(true),
    }
}

fn declare_var(engine: &mut ScriptEngine, frame: &Frame, name: &str) {
    let mut current = frame.scope.clone();
    loop {
        let backing = match &current.borrow().kind {
            ScopeKind::ObjectBacked { object } => Some(object.clone()),
            ScopeKind::Declarative { .. } => None,
        };
        if let Some(obj) = backing {
            let exists = {
                let inner = obj.borrow();
                engine.arena.lookup(inner.shape, name).is_some()
                    || inner.overflow.contains_key(name)
            };
            if !exists {
                object::define_own_property(
                    &mut engine.arena,
                    &obj,
                    name,
                    PropertySlot::Data(JsValue::Undefined),
                    PropertyAttributes::default_data(),
                );
            }
            return;
        }
        let parent = current.borrow().parent.clone();
        match parent {
            Some(p) => current = p,
            None => return,
        }
    }
}

fn caught_value(engine: &mut ScriptEngine, signal: Signal) -> JsValue {
    match signal {
        Signal::Script(error) => match error.value {
            Some(v) => v,
            None => {
                let root = engine.arena.root();
                let obj = object::create_error_object(
                    &mut engine.arena,
                    root,
                    error.kind,
                    &error.message,
                );
                JsValue::Object(obj)
            }
        },
        Signal::Cancellation(message) => JsValue::String(message),
        Signal::StackOverflow => {
            JsValue::String("RangeError: maximum call depth exceeded".to_string())
        }
        Signal::Route(_) => JsValue::Undefined,
    }
}

// ── Calls ────────────────────────────────────────────────────

enum CallTarget {
    User(Rc<crate::runner::ds::function::FunctionProto>, ScopeRef),
    Native(crate::runner::ds::function::NativeCallback, usize),
}

/// Invokes a callable value. The engine call stack gains a frame for the
/// duration; escaping script errors append it to the pending stack trace.
pub fn call_function(
    engine: &mut ScriptEngine,
    callee: &JsValue,
    this: JsValue,
    args: Vec<JsValue>,
    is_new: bool,
) -> Result<JsValue, Signal> {
    let target = match callee {
        JsValue::Object(o) => {
            let inner = o.borrow();
            match inner.function_data() {
                Some(FunctionData::User { proto, scope }) => {
                    CallTarget::User(proto.clone(), scope.clone())
                }
                Some(FunctionData::Native { callback, arity, .. }) => {
                    CallTarget::Native(callback.clone(), *arity)
                }
                None => {
                    engine.pending_trace.clear();
                    return Err(Signal::script(
                        ErrorKind::TypeError,
                        "value is not a function",
                    ));
                }
            }
        }
        other => {
            engine.pending_trace.clear();
            return Err(Signal::script(
                ErrorKind::TypeError,
                format!("'{}' is not a function", other.to_display_string()),
            ));
        }
    };
    if engine.recursion_depth_limit > 0 && engine.function_depth() >= engine.recursion_depth_limit
    {
        return Err(Signal::StackOverflow);
    }

    match target {
        CallTarget::User(proto, captured) => {
            let scope = RuntimeScope::new_declarative(proto.scope_template.clone(), Some(captured));
            {
                let mut inner = scope.borrow_mut();
                if let ScopeKind::Declarative { values, .. } = &mut inner.kind {
                    for i in 0..proto.params.len() {
                        values[i] = args.get(i).cloned().unwrap_or(JsValue::Undefined);
                    }
                    if let Some(slot) = proto.self_slot {
                        values[slot] = callee.clone();
                    }
                }
            }
            let this = if proto.strict {
                this
            } else {
                match this {
                    JsValue::Undefined | JsValue::Null => {
                        JsValue::Object(engine.global_object.clone())
                    }
                    t => t,
                }
            };
            if proto.uses_arguments {
                let root = engine.arena.root();
                let args_obj = create_arguments_object(
                    &mut engine.arena,
                    root,
                    &proto.params,
                    &scope,
                    &args,
                    callee.clone(),
                    proto.strict,
                );
                scope
                    .borrow_mut()
                    .set_by_name("arguments", JsValue::Object(args_obj));
            }
            engine.call_stack.push(StackFrameInfo {
                function_name: if proto.name.is_empty() {
                    None
                } else {
                    Some(proto.name.clone())
                },
                path: engine.current_path.clone(),
                line: proto.chunk.lines.first().copied().unwrap_or(0),
                is_new,
            });
            let result = execute_chunk(engine, &proto.chunk, scope, this);
            let info = engine.call_stack.pop();
            if let (Some(info), Err(Signal::Script(_))) = (info, &result) {
                engine.pending_trace.push(info);
            }
            result
        }
        CallTarget::Native(callback, arity) => {
            let name = match callee {
                JsValue::Object(o) => o
                    .borrow()
                    .function_data()
                    .map(|d| d.name().to_string())
                    .unwrap_or_default(),
                _ => String::new(),
            };
            let mut padded = args;
            while padded.len() < arity {
                padded.push(JsValue::Undefined);
            }
            engine.call_stack.push(StackFrameInfo {
                function_name: if name.is_empty() { None } else { Some(name) },
                path: "native".to_string(),
                line: 0,
                is_new,
            });
            let result = callback(engine, this, &padded);
            let info = engine.call_stack.pop();
            if let (Some(info), Err(Signal::Script(_))) = (info, &result) {
                engine.pending_trace.push(info);
            }
            result
        }
    }
}

/// `new` expression: a fresh object wired to the callee's `prototype`
/// becomes `this`; the construction result is the returned object, or that
/// fresh object when the body returns a primitive.
fn construct(
    engine: &mut ScriptEngine,
    callee: &JsValue,
    args: Vec<JsValue>,
    line: u32,
) -> Result<JsValue, Signal> {
    let fobj = match callee {
        JsValue::Object(o) if o.borrow().is_callable() => o.clone(),
        other => {
            engine.pending_trace.clear();
            return Err(script_err(
                ErrorKind::TypeError,
                format!("'{}' is not a constructor", other.to_display_string()),
                line,
            ))
        }
    };
    let prototype = match object::get_own_property(&engine.arena, &fobj, "prototype")? {
        Some(JsValue::Object(p)) => Some(p),
        _ => None,
    };
    let new_obj: JsObjectRef = ObjectInstance::new_ref(engine.arena.root(), prototype);
    let result = call_function(
        engine,
        callee,
        JsValue::Object(new_obj.clone()),
        args,
        true,
    )?;
    Ok(match result {
        JsValue::Object(_) => result,
        _ => JsValue::Object(new_obj),
    })
}
