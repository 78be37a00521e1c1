//! Bytecode instruction set and chunk structure.
//!
//! A flat, stack-based IR the compiler emits and the VM executes. On top of
//! the usual constant pool and jump patching, chunks carry a protected
//! region table implementing structured exception handling: catch regions
//! filter the signals they intercept, finally regions run on every exit of
//! their range, and `Leave` is the only legal branch out of a protected
//! range.

use crate::runner::ds::scope::ScopeTemplate;
use crate::runner::ds::value::JsValue;
use std::rc::Rc;

/// Bytecode opcodes for the stack VM.
#[derive(Debug, Clone, Copy, PartialEq)]
#[repr(u8)]
pub enum OpCode {
    // ── Constants & literals ─────────────────────────────────
    /// Push a constant from the constant pool.
    Constant,
    /// Push `undefined`.
    Undefined,
    /// Push `null`.
    Null,
    /// Push `true`.
    True,
    /// Push `false`.
    False,
    /// Push the current `this` value.
    This,

    // ── Arithmetic ───────────────────────────────────────────
    /// Pop two values, push their sum (numeric or string concatenation).
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    /// Pop one value, push its numeric negation.
    Negate,
    /// Pop one value, push ToNumber of it.
    ToNumber,

    // ── Bitwise ──────────────────────────────────────────────
    BitAnd,
    BitOr,
    BitXor,
    BitNot,
    ShiftLeft,
    ShiftRight,
    UShiftRight,

    // ── Comparison ───────────────────────────────────────────
    StrictEqual,
    StrictNotEqual,
    Equal,
    NotEqual,
    LessThan,
    LessEqual,
    GreaterThan,
    GreaterEqual,
    InstanceOf,
    In,

    // ── Logical / unary ──────────────────────────────────────
    Not,
    /// `typeof` of a value on the stack.
    TypeOf,
    /// `typeof identifier` — resolves the name without throwing when it is
    /// undeclared (operand: name index).
    TypeOfName,

    // ── Variables ────────────────────────────────────────────
    /// Read a declarative slot (operand: scope depth, operand2: slot).
    GetSlot,
    /// Write a declarative slot; the value stays on the stack.
    SetSlot,
    /// Dynamic name lookup along the scope chain (operand: name index).
    GetName,
    /// Dynamic name assignment; the value stays on the stack.
    SetName,
    /// `delete identifier` (operand: name index). Pushes a boolean.
    DeleteName,
    /// Ensure a hoisted var binding exists on the nearest object-backed
    /// scope (operand: name index).
    DeclareVar,

    // ── Control flow ─────────────────────────────────────────
    /// Unconditional jump within the current protection level.
    Jump,
    /// Jump if top of stack is falsy. Pops the value.
    JumpIfFalse,
    /// Jump if top of stack is truthy. Pops the value.
    JumpIfTrue,
    /// Branch that may cross out of protected ranges; pending finally
    /// handlers run before control reaches the target (operand: target,
    /// operand2: scope depth at the target).
    Leave,

    // ── Stack / temps ────────────────────────────────────────
    Pop,
    Dup,
    /// Duplicate the top two values (a b -> a b a b).
    Dup2,
    /// Pop into a frame temp (operand: temp index).
    StoreTemp,
    /// Push a frame temp (operand: temp index).
    LoadTemp,

    // ── Scopes ───────────────────────────────────────────────
    /// Enter a declarative scope (operand: scope template index).
    PushScope,
    PopScope,

    // ── Objects ──────────────────────────────────────────────
    /// Push a fresh empty object.
    NewObject,
    /// Pop `operand` values, push an array-like object holding them.
    NewArray,
    /// Object literal helper: pop value, set own property on the object
    /// below it, keep the object (operand: name index).
    InitProp,
    /// Pop object, push its property (operand: name index).
    GetProp,
    /// Pop value then object, set the property, push the value back
    /// (operand: name index).
    SetProp,
    /// Pop key then object, push the property.
    GetElem,
    /// Pop value, key, object; set; push the value back.
    SetElem,
    /// Pop object, delete property, push a boolean (operand: name index).
    DeleteProp,
    /// Pop key then object, delete, push a boolean.
    DeleteElem,

    // ── Functions ────────────────────────────────────────────
    /// Instantiate a closure over the current scope
    /// (operand: function proto index).
    Closure,
    /// Call: stack is [this, callee, arg1..argN] (operand: argc).
    Call,
    /// Construct: stack is [callee, arg1..argN] (operand: argc).
    New,
    /// Return the popped value, running pending finally handlers.
    Return,

    // ── Exceptions ───────────────────────────────────────────
    /// Pop a value and raise it as a script error.
    Throw,
    /// Push whether the engine's predicate accepts the intercepted signal
    /// (does not consume it).
    IsCatchable,
    /// Consume the intercepted signal and push the value a catch clause
    /// binds.
    BindCaught,
    /// Consume the intercepted signal and drop it.
    DiscardCaught,
    /// Re-raise the intercepted signal.
    Rethrow,
    /// Raise an internal route signal (operand: route id).
    RaiseRoute,
    /// Consume an intercepted route signal and jump through a route table
    /// (operand: route table index).
    DispatchRoute,
    /// End of a finally handler body; resumes the suspended control
    /// transfer.
    EndFinally,

    /// End of chunk; the VM returns the result temp.
    Halt,
}

/// A single instruction with up to two operands.
#[derive(Debug, Clone)]
pub struct Instruction {
    pub op: OpCode,
    pub operand: u32,
    pub operand2: u32,
}

impl Instruction {
    pub fn simple(op: OpCode) -> Self {
        Instruction {
            op,
            operand: 0,
            operand2: 0,
        }
    }

    pub fn with_operand(op: OpCode, operand: u32) -> Self {
        Instruction {
            op,
            operand,
            operand2: 0,
        }
    }

    pub fn with_two_operands(op: OpCode, operand: u32, operand2: u32) -> Self {
        Instruction {
            op,
            operand,
            operand2,
        }
    }
}

/// Which signals a catch region intercepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CatchFilter {
    /// Every signal; generated handlers consult the catchability predicate
    /// themselves.
    Any,
    /// Internal route signals only (finally dispatch).
    RouteOnly,
}

#[derive(Debug, Clone, Copy)]
pub enum RegionKind {
    Catch(CatchFilter),
    Finally,
}

/// One protected range of instructions with its handler.
#[derive(Debug, Clone)]
pub struct Region {
    pub start: usize,
    pub end: usize,
    pub handler_start: usize,
    pub handler_end: usize,
    /// Scope chain length (relative to frame entry) at region entry; the VM
    /// unwinds scopes to this depth before running the handler.
    pub scope_depth: usize,
    pub kind: RegionKind,
}

impl Region {
    pub fn contains(&self, pc: usize) -> bool {
        pc >= self.start && pc < self.end
    }

    pub fn handler_contains(&self, pc: usize) -> bool {
        pc >= self.handler_start && pc < self.handler_end
    }

    pub fn span(&self) -> usize {
        self.end - self.start
    }
}

/// Compiled body of one program, function or eval unit.
pub struct Chunk {
    pub code: Vec<Instruction>,
    /// Source line per instruction, for stack traces.
    pub lines: Vec<u32>,
    pub constants: Vec<JsValue>,
    /// Deduplicated name table for variable and property names.
    pub names: Vec<String>,
    /// Declarative scope layouts entered by PushScope.
    pub scope_templates: Vec<Rc<ScopeTemplate>>,
    /// Nested function bodies.
    pub protos: Vec<Rc<crate::runner::ds::function::FunctionProto>>,
    pub regions: Vec<Region>,
    /// Jump tables for DispatchRoute, indexed by route id.
    pub route_tables: Vec<Vec<usize>>,
    /// Frame temp slots (skip-finally flags, return values, the result).
    pub temp_count: usize,
    /// Temp receiving the value of the last expression statement; set for
    /// program and eval chunks, absent for function bodies.
    pub result_temp: Option<u32>,
    pub strict: bool,
}

impl Chunk {
    pub fn new(strict: bool) -> Self {
        Chunk {
            code: Vec::new(),
            lines: Vec::new(),
            constants: Vec::new(),
            names: Vec::new(),
            scope_templates: Vec::new(),
            protos: Vec::new(),
            regions: Vec::new(),
            route_tables: Vec::new(),
            temp_count: 0,
            result_temp: None,
            strict,
        }
    }

    /// Emit an instruction and return its index.
    pub fn emit(&mut self, instr: Instruction, line: u32) -> usize {
        let idx = self.code.len();
        self.code.push(instr);
        self.lines.push(line);
        idx
    }

    pub fn emit_op(&mut self, op: OpCode, line: u32) -> usize {
        self.emit(Instruction::simple(op), line)
    }

    pub fn emit_with(&mut self, op: OpCode, operand: u32, line: u32) -> usize {
        self.emit(Instruction::with_operand(op, operand), line)
    }

    pub fn add_constant(&mut self, value: JsValue) -> u32 {
        let idx = self.constants.len();
        self.constants.push(value);
        idx as u32
    }

    /// Add a name to the deduplicated name table and return its index.
    pub fn add_name(&mut self, s: &str) -> u32 {
        for (i, existing) in self.names.iter().enumerate() {
            if existing == s {
                return i as u32;
            }
        }
        let idx = self.names.len();
        self.names.push(s.to_string());
        idx as u32
    }

    #[inline]
    pub fn get_name(&self, idx: u32) -> &str {
        &self.names[idx as usize]
    }

    pub fn add_scope_template(&mut self, template: Rc<ScopeTemplate>) -> u32 {
        let idx = self.scope_templates.len();
        self.scope_templates.push(template);
        idx as u32
    }

    pub fn add_proto(&mut self, proto: Rc<crate::runner::ds::function::FunctionProto>) -> u32 {
        let idx = self.protos.len();
        self.protos.push(proto);
        idx as u32
    }

    pub fn add_route_table(&mut self, table: Vec<usize>) -> u32 {
        let idx = self.route_tables.len();
        self.route_tables.push(table);
        idx as u32
    }

    pub fn alloc_temp(&mut self) -> u32 {
        let idx = self.temp_count;
        self.temp_count += 1;
        idx as u32
    }

    /// Patch a jump/leave instruction's operand to the current position.
    pub fn patch_jump(&mut self, jump_idx: usize) {
        self.code[jump_idx].operand = self.code.len() as u32;
    }

    pub fn current_pos(&self) -> usize {
        self.code.len()
    }

    /// Innermost region containing `pc` that satisfies `accept`, by
    /// narrowest span.
    pub fn innermost_region(
        &self,
        pc: usize,
        accept: impl Fn(&Region) -> bool,
    ) -> Option<usize> {
        let mut best: Option<usize> = None;
        for (i, region) in self.regions.iter().enumerate() {
            if region.contains(pc) && accept(region) {
                match best {
                    Some(b) if self.regions[b].span() <= region.span() => {}
                    _ => best = Some(i),
                }
            }
        }
        best
    }

    /// Disassemble the chunk for diagnostics.
    pub fn disassemble(&self, name: &str) -> String {
        let mut out = format!("== {} ==\n", name);
        for (i, instr) in self.code.iter().enumerate() {
            out.push_str(&format!("{:04}  {:?}", i, instr.op));
            match instr.op {
                OpCode::Constant => {
                    let val = &self.constants[instr.operand as usize];
                    out.push_str(&format!("  {} ({})", instr.operand, val));
                }
                OpCode::GetName
                | OpCode::SetName
                | OpCode::DeleteName
                | OpCode::DeclareVar
                | OpCode::TypeOfName
                | OpCode::GetProp
                | OpCode::SetProp
                | OpCode::InitProp
                | OpCode::DeleteProp => {
                    out.push_str(&format!("  \"{}\"", self.get_name(instr.operand)));
                }
                OpCode::GetSlot | OpCode::SetSlot => {
                    out.push_str(&format!(
                        "  depth={} slot={}",
                        instr.operand, instr.operand2
                    ));
                }
                OpCode::Jump | OpCode::JumpIfFalse | OpCode::JumpIfTrue | OpCode::Leave => {
                    out.push_str(&format!("  -> {:04}", instr.operand));
                }
                OpCode::Call | OpCode::New | OpCode::NewArray => {
                    out.push_str(&format!("  argc={}", instr.operand));
                }
                OpCode::StoreTemp | OpCode::LoadTemp => {
                    out.push_str(&format!("  temp={}", instr.operand));
                }
                OpCode::PushScope | OpCode::Closure => {
                    out.push_str(&format!("  #{}", instr.operand));
                }
                OpCode::RaiseRoute | OpCode::DispatchRoute => {
                    out.push_str(&format!("  route={}", instr.operand));
                }
                _ => {}
            }
            out.push('\n');
        }
        for (i, region) in self.regions.iter().enumerate() {
            out.push_str(&format!(
                "region {}: [{:04},{:04}) handler [{:04},{:04}) {:?}\n",
                i, region.start, region.end, region.handler_start, region.handler_end, region.kind
            ));
        }
        out
    }
}
