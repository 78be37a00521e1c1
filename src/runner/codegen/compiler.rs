//! AST to bytecode compiler.
//!
//! One pass over the resolved AST per compilation unit. Function bodies
//! compile into their own chunks; the compiler swaps its per-chunk state out
//! and back while descending into them so the compile-time scope chain stays
//! shared.
//!
//! Control transfers that may cross `finally` blocks never compile to plain
//! jumps. `break`, `continue` and the fall-through out of a protected block
//! become `Leave`, `return` becomes `Return`, and the VM consults the region
//! table to run intervening finally handlers. Transfers written inside a
//! finally body itself compile to `RaiseRoute` with a per-finally route id;
//! a route-filtered region around the handler dispatches them to stub code
//! after the handler completes.

use crate::parser::ast::{
    AssignmentOperator, BinaryOperator, Expression, ForInit, FunctionDef, Literal,
    LogicalOperator, MemberKey, ProgramData, Statement, UnaryOperator, UpdateOperator,
    VariableKind,
};
use crate::runner::codegen::bytecode::{
    CatchFilter, Chunk, Instruction, OpCode, Region, RegionKind,
};
use crate::runner::ds::error::SyntaxError;
use crate::runner::ds::function::FunctionProto;
use crate::runner::ds::scope::ScopeTemplate;
use crate::runner::ds::source::CompilerOptions;
use crate::runner::ds::value::JsValue;
use crate::runner::resolver::{self, Binding, CompileScope, CompileScopeKind, ScopeChain};
use std::mem;
use std::rc::Rc;

/// Compile a whole program into its top-level chunk.
pub fn compile_program(
    program: &ProgramData,
    options: &CompilerOptions,
    path: &str,
) -> Result<Chunk, SyntaxError> {
    let analysis = resolver::analyze(program, options);
    let mut chain = ScopeChain::new();
    chain.push(CompileScope::new(
        CompileScopeKind::Global,
        Vec::new(),
        Vec::new(),
    ));
    let mut compiler = Compiler::new(chain, analysis.strict, path, false);
    let result = compiler.chunk.alloc_temp();
    compiler.chunk.result_temp = Some(result);
    for name in &analysis.global_bindings {
        let idx = compiler.chunk.add_name(name);
        compiler.op1(OpCode::DeclareVar, idx);
    }
    compiler.compile_unit_body(&program.body)?;
    compiler.op(OpCode::Halt);
    Ok(compiler.chunk)
}

/// Compile code handed to `eval`. The runtime scope it will run against is
/// unknown, so every free name resolves dynamically.
pub fn compile_eval(
    program: &ProgramData,
    force_strict: bool,
    path: &str,
) -> Result<Chunk, SyntaxError> {
    let mut chain = ScopeChain::new();
    chain.push(CompileScope::new(
        CompileScopeKind::Dynamic,
        Vec::new(),
        Vec::new(),
    ));
    let strict = program.strict || force_strict;
    let mut compiler = Compiler::new(chain, strict, path, false);
    let result = compiler.chunk.alloc_temp();
    compiler.chunk.result_temp = Some(result);
    for name in resolver::hoisted_var_names(&program.body) {
        let idx = compiler.chunk.add_name(&name);
        compiler.op1(OpCode::DeclareVar, idx);
    }
    compiler.compile_unit_body(&program.body)?;
    compiler.op(OpCode::Halt);
    Ok(compiler.chunk)
}

struct LoopContext {
    break_leaves: Vec<usize>,
    continue_leaves: Vec<usize>,
    /// Scope depth control returns to when leaving or re-entering the loop.
    depth: usize,
}

enum RouteTarget {
    Break { loop_index: usize },
    Continue { loop_index: usize },
    Return { temp: u32 },
}

struct FinallyContext {
    routes: Vec<RouteTarget>,
    /// Loops opened before the finally body; branches to them must route.
    loop_base: usize,
}

/// Per-chunk compiler state saved while descending into a nested function.
struct FrameState {
    chunk: Chunk,
    loop_stack: Vec<LoopContext>,
    finally_stack: Vec<FinallyContext>,
    scope_depth: usize,
    scratch_temp: Option<u32>,
    return_temp: Option<u32>,
    in_function: bool,
    line: u32,
}

struct Compiler {
    chain: ScopeChain,
    chunk: Chunk,
    loop_stack: Vec<LoopContext>,
    finally_stack: Vec<FinallyContext>,
    scope_depth: usize,
    scratch_temp: Option<u32>,
    return_temp: Option<u32>,
    in_function: bool,
    line: u32,
    path: String,
}

impl Compiler {
    fn new(chain: ScopeChain, strict: bool, path: &str, in_function: bool) -> Self {
        Compiler {
            chain,
            chunk: Chunk::new(strict),
            loop_stack: Vec::new(),
            finally_stack: Vec::new(),
            scope_depth: 0,
            scratch_temp: None,
            return_temp: None,
            in_function,
            line: 1,
            path: path.to_string(),
        }
    }

    // ── Emit helpers ─────────────────────────────────────────

    fn op(&mut self, op: OpCode) -> usize {
        self.chunk.emit_op(op, self.line)
    }

    fn op1(&mut self, op: OpCode, operand: u32) -> usize {
        self.chunk.emit_with(op, operand, self.line)
    }

    fn op2(&mut self, op: OpCode, operand: u32, operand2: u32) -> usize {
        self.chunk
            .emit(Instruction::with_two_operands(op, operand, operand2), self.line)
    }

    fn emit_constant(&mut self, value: JsValue) {
        let idx = self.chunk.add_constant(value);
        self.op1(OpCode::Constant, idx);
    }

    fn scratch(&mut self) -> u32 {
        match self.scratch_temp {
            Some(t) => t,
            None => {
                let t = self.chunk.alloc_temp();
                self.scratch_temp = Some(t);
                t
            }
        }
    }

    fn error(&self, message: impl Into<String>) -> SyntaxError {
        SyntaxError {
            message: message.into(),
            line: self.line,
            path: self.path.clone(),
        }
    }

    // ── Unit bodies ──────────────────────────────────────────

    /// Top-level `let`/`const` scope, hoisted function closures, then the
    /// statements themselves.
    fn compile_unit_body(&mut self, body: &[Statement]) -> Result<(), SyntaxError> {
        let (names, immutables) = resolver::block_scoped_names(body);
        let pushed = if names.is_empty() {
            false
        } else {
            self.push_block_scope(names, immutables);
            true
        };
        self.define_hoisted_functions(body)?;
        let result = self.compile_statements(body);
        if pushed {
            // Left in place until the frame ends; top-level bindings stay
            // visible to the whole unit.
            self.chain.pop();
        }
        result
    }

    fn push_block_scope(&mut self, names: Vec<String>, immutables: Vec<bool>) {
        let template = Rc::new(ScopeTemplate::new(names.clone(), immutables.clone()));
        let tidx = self.chunk.add_scope_template(template);
        self.op1(OpCode::PushScope, tidx);
        self.scope_depth += 1;
        self.chain
            .push(CompileScope::new(CompileScopeKind::Block, names, immutables));
    }

    fn pop_block_scope(&mut self) {
        self.chain.pop();
        self.op(OpCode::PopScope);
        self.scope_depth -= 1;
    }

    /// Function declarations initialize at unit entry, against the entry
    /// scope, regardless of where the statement sits.
    fn define_hoisted_functions(&mut self, body: &[Statement]) -> Result<(), SyntaxError> {
        let mut defs = Vec::new();
        collect_function_decls(body, &mut defs);
        for def in defs {
            self.line = def.meta.line;
            let proto_idx = self.compile_function(def)?;
            self.op1(OpCode::Closure, proto_idx);
            if let Some(name) = &def.name {
                let binding = self.chain.resolve(name);
                self.store_binding(name, binding);
            }
            self.op(OpCode::Pop);
        }
        Ok(())
    }

    // ── Functions ────────────────────────────────────────────

    fn compile_function(&mut self, def: &FunctionDef) -> Result<u32, SyntaxError> {
        let strict = self.chunk.strict || def.strict;
        if strict {
            for (i, p) in def.params.iter().enumerate() {
                if p == "eval" || p == "arguments" {
                    return Err(self.error(format!(
                        "'{}' may not be a parameter name in strict mode",
                        p
                    )));
                }
                if def.params[i + 1..].iter().any(|q| q == p) {
                    return Err(self.error(format!("duplicate parameter name '{}'", p)));
                }
            }
        }
        let uses_arguments = resolver::function_uses_arguments(def)
            && !def.params.iter().any(|p| p == "arguments");

        let mut names = def.params.clone();
        let mut immutables = vec![false; names.len()];
        let hoisted = resolver::hoisted_var_names(&def.body);
        let (lets, lets_immutable) = resolver::block_scoped_names(&def.body);
        if uses_arguments
            && !names.iter().any(|n| n == "arguments")
            && !hoisted.iter().any(|n| n == "arguments")
            && !lets.iter().any(|n| n == "arguments")
        {
            names.push("arguments".to_string());
            immutables.push(false);
        }
        for name in &hoisted {
            if !names.iter().any(|n| n == name) {
                names.push(name.clone());
                immutables.push(false);
            }
        }
        for (name, immutable) in lets.iter().zip(lets_immutable.iter()) {
            if !names.iter().any(|n| n == name) {
                names.push(name.clone());
                immutables.push(*immutable);
            }
        }
        let mut self_slot = None;
        if let Some(fn_name) = &def.name {
            if !names.iter().any(|n| n == fn_name) {
                self_slot = Some(names.len());
                names.push(fn_name.clone());
                immutables.push(false);
            }
        }

        let template = Rc::new(ScopeTemplate::new(names.clone(), immutables.clone()));
        self.chain.push(CompileScope::new(
            CompileScopeKind::Function,
            names,
            immutables,
        ));
        let saved = FrameState {
            chunk: mem::replace(&mut self.chunk, Chunk::new(strict)),
            loop_stack: mem::take(&mut self.loop_stack),
            finally_stack: mem::take(&mut self.finally_stack),
            scope_depth: mem::replace(&mut self.scope_depth, 0),
            scratch_temp: self.scratch_temp.take(),
            return_temp: self.return_temp.take(),
            in_function: mem::replace(&mut self.in_function, true),
            line: self.line,
        };
        let body_result = self.compile_function_body(def);
        let chunk = mem::replace(&mut self.chunk, saved.chunk);
        self.loop_stack = saved.loop_stack;
        self.finally_stack = saved.finally_stack;
        self.scope_depth = saved.scope_depth;
        self.scratch_temp = saved.scratch_temp;
        self.return_temp = saved.return_temp;
        self.in_function = saved.in_function;
        self.line = saved.line;
        self.chain.pop();
        body_result?;

        let proto = Rc::new(FunctionProto {
            name: def.name.clone().unwrap_or_default(),
            params: def.params.clone(),
            strict,
            uses_arguments,
            chunk,
            scope_template: template,
            self_slot,
        });
        Ok(self.chunk.add_proto(proto))
    }

    fn compile_function_body(&mut self, def: &FunctionDef) -> Result<(), SyntaxError> {
        self.define_hoisted_functions(&def.body)?;
        self.compile_statements(&def.body)?;
        self.op(OpCode::Undefined);
        self.op(OpCode::Return);
        Ok(())
    }

    // ── Statements ───────────────────────────────────────────

    fn compile_statements(&mut self, body: &[Statement]) -> Result<(), SyntaxError> {
        for statement in body {
            self.compile_statement(statement)?;
        }
        Ok(())
    }

    fn compile_statement(&mut self, statement: &Statement) -> Result<(), SyntaxError> {
        self.line = statement.meta().line;
        match statement {
            Statement::Expression { expression, .. } => {
                self.compile_expression(expression)?;
                match self.chunk.result_temp {
                    Some(t) => self.op1(OpCode::StoreTemp, t),
                    None => self.op(OpCode::Pop),
                };
                Ok(())
            }
            Statement::VariableDeclaration {
                kind, declarations, ..
            } => {
                for d in declarations {
                    if *kind == VariableKind::Const && d.init.is_none() {
                        return Err(
                            self.error(format!("missing initializer for const '{}'", d.name))
                        );
                    }
                    if let Some(init) = &d.init {
                        self.compile_expression(init)?;
                        let binding = self.chain.resolve(&d.name);
                        self.store_binding(&d.name, binding);
                        self.op(OpCode::Pop);
                    }
                }
                Ok(())
            }
            // Initialized at unit entry.
            Statement::FunctionDeclaration(_) => Ok(()),
            Statement::Block { body, .. } => self.compile_block(body),
            Statement::If {
                test,
                consequent,
                alternate,
                ..
            } => {
                self.compile_expression(test)?;
                let else_jump = self.op1(OpCode::JumpIfFalse, 0);
                self.compile_statement(consequent)?;
                match alternate {
                    Some(alt) => {
                        let end_jump = self.op1(OpCode::Jump, 0);
                        self.chunk.patch_jump(else_jump);
                        self.compile_statement(alt)?;
                        self.chunk.patch_jump(end_jump);
                    }
                    None => self.chunk.patch_jump(else_jump),
                }
                Ok(())
            }
            Statement::While { test, body, .. } => {
                let start = self.chunk.current_pos();
                self.compile_expression(test)?;
                let exit = self.op1(OpCode::JumpIfFalse, 0);
                self.loop_stack.push(LoopContext {
                    break_leaves: Vec::new(),
                    continue_leaves: Vec::new(),
                    depth: self.scope_depth,
                });
                self.compile_statement(body)?;
                self.op1(OpCode::Jump, start as u32);
                self.chunk.patch_jump(exit);
                self.finish_loop(start, self.chunk.current_pos());
                Ok(())
            }
            Statement::DoWhile { body, test, .. } => {
                let start = self.chunk.current_pos();
                self.loop_stack.push(LoopContext {
                    break_leaves: Vec::new(),
                    continue_leaves: Vec::new(),
                    depth: self.scope_depth,
                });
                self.compile_statement(body)?;
                let test_pos = self.chunk.current_pos();
                self.compile_expression(test)?;
                self.op1(OpCode::JumpIfTrue, start as u32);
                self.finish_loop(test_pos, self.chunk.current_pos());
                Ok(())
            }
            Statement::For {
                init,
                test,
                update,
                body,
                ..
            } => self.compile_for(init, test, update, body),
            Statement::Break { .. } => self.compile_break(),
            Statement::Continue { .. } => self.compile_continue(),
            Statement::Return { argument, .. } => self.compile_return(argument),
            Statement::Throw { argument, .. } => {
                self.compile_expression(argument)?;
                self.op(OpCode::Throw);
                Ok(())
            }
            Statement::Try {
                block,
                handler,
                finalizer,
                ..
            } => self.compile_try(block, handler, finalizer),
            Statement::Empty { .. } => Ok(()),
        }
    }

    fn compile_block(&mut self, body: &[Statement]) -> Result<(), SyntaxError> {
        let (names, immutables) = resolver::block_scoped_names(body);
        if names.is_empty() {
            return self.compile_statements(body);
        }
        self.push_block_scope(names, immutables);
        let result = self.compile_statements(body);
        self.pop_block_scope();
        result
    }

    fn compile_for(
        &mut self,
        init: &Option<ForInit>,
        test: &Option<Expression>,
        update: &Option<Expression>,
        body: &Statement,
    ) -> Result<(), SyntaxError> {
        let mut pushed_scope = false;
        match init {
            Some(ForInit::Declaration(kind, declarations)) => {
                if *kind != VariableKind::Var {
                    let names: Vec<String> = declarations.iter().map(|d| d.name.clone()).collect();
                    let immutables = vec![*kind == VariableKind::Const; names.len()];
                    self.push_block_scope(names, immutables);
                    pushed_scope = true;
                }
                for d in declarations {
                    if *kind == VariableKind::Const && d.init.is_none() {
                        return Err(
                            self.error(format!("missing initializer for const '{}'", d.name))
                        );
                    }
                    if let Some(e) = &d.init {
                        self.compile_expression(e)?;
                        let binding = self.chain.resolve(&d.name);
                        self.store_binding(&d.name, binding);
                        self.op(OpCode::Pop);
                    }
                }
            }
            Some(ForInit::Expression(e)) => {
                self.compile_expression(e)?;
                self.op(OpCode::Pop);
            }
            None => {}
        }
        let start = self.chunk.current_pos();
        let exit = match test {
            Some(t) => {
                self.compile_expression(t)?;
                Some(self.op1(OpCode::JumpIfFalse, 0))
            }
            None => None,
        };
        self.loop_stack.push(LoopContext {
            break_leaves: Vec::new(),
            continue_leaves: Vec::new(),
            depth: self.scope_depth,
        });
        self.compile_statement(body)?;
        let continue_target = self.chunk.current_pos();
        if let Some(u) = update {
            self.compile_expression(u)?;
            self.op(OpCode::Pop);
        }
        self.op1(OpCode::Jump, start as u32);
        if let Some(exit) = exit {
            self.chunk.patch_jump(exit);
        }
        self.finish_loop(continue_target, self.chunk.current_pos());
        if pushed_scope {
            self.pop_block_scope();
        }
        Ok(())
    }

    fn finish_loop(&mut self, continue_target: usize, break_target: usize) {
        if let Some(ctx) = self.loop_stack.pop() {
            for leave in ctx.continue_leaves {
                self.chunk.code[leave].operand = continue_target as u32;
            }
            for leave in ctx.break_leaves {
                self.chunk.code[leave].operand = break_target as u32;
            }
        }
    }

    fn compile_break(&mut self) -> Result<(), SyntaxError> {
        if self.loop_stack.is_empty() {
            return Err(self.error("'break' outside of a loop"));
        }
        let loop_index = self.loop_stack.len() - 1;
        if let Some(ctx) = self.finally_stack.last_mut() {
            if self.loop_stack.len() <= ctx.loop_base {
                let id = ctx.routes.len() as u32;
                ctx.routes.push(RouteTarget::Break { loop_index });
                self.op1(OpCode::RaiseRoute, id);
                return Ok(());
            }
        }
        let depth = self.loop_stack[loop_index].depth as u32;
        let leave = self.op2(OpCode::Leave, 0, depth);
        self.loop_stack[loop_index].break_leaves.push(leave);
        Ok(())
    }

    fn compile_continue(&mut self) -> Result<(), SyntaxError> {
        if self.loop_stack.is_empty() {
            return Err(self.error("'continue' outside of a loop"));
        }
        let loop_index = self.loop_stack.len() - 1;
        if let Some(ctx) = self.finally_stack.last_mut() {
            if self.loop_stack.len() <= ctx.loop_base {
                let id = ctx.routes.len() as u32;
                ctx.routes.push(RouteTarget::Continue { loop_index });
                self.op1(OpCode::RaiseRoute, id);
                return Ok(());
            }
        }
        let depth = self.loop_stack[loop_index].depth as u32;
        let leave = self.op2(OpCode::Leave, 0, depth);
        self.loop_stack[loop_index].continue_leaves.push(leave);
        Ok(())
    }

    fn compile_return(&mut self, argument: &Option<Expression>) -> Result<(), SyntaxError> {
        if !self.in_function {
            return Err(self.error("'return' outside of a function"));
        }
        match argument {
            Some(e) => self.compile_expression(e)?,
            None => {
                self.op(OpCode::Undefined);
            }
        }
        if !self.finally_stack.is_empty() {
            // The value must survive until the route stub re-issues the
            // return after the handler completes.
            let temp = match self.return_temp {
                Some(t) => t,
                None => {
                    let t = self.chunk.alloc_temp();
                    self.return_temp = Some(t);
                    t
                }
            };
            self.op1(OpCode::StoreTemp, temp);
            if let Some(ctx) = self.finally_stack.last_mut() {
                let id = ctx.routes.len() as u32;
                ctx.routes.push(RouteTarget::Return { temp });
                self.op1(OpCode::RaiseRoute, id);
            }
            return Ok(());
        }
        self.op(OpCode::Return);
        Ok(())
    }

    // ── try / catch / finally ────────────────────────────────
    //
    // Layout, innermost regions first:
    //
    //   [reset skip flag]
    //   try body                  <- catch-any region, finally region
    //   Leave end
    //   catch handler:            <- finally region
    //     IsCatchable? no -> set skip flag, Rethrow
    //     bind & run catch clause (or Rethrow when absent)
    //     Leave end
    //   finally handler:          <- route-only region
    //     skip flag set -> EndFinally
    //     finally body
    //     EndFinally
    //   route dispatch + stubs
    //   end:
    //
    // Uncatchable signals (per the engine predicate) set the skip flag on
    // their way through, so the finally body does not run for them.
    fn compile_try(
        &mut self,
        block: &[Statement],
        handler: &Option<crate::parser::ast::CatchClause>,
        finalizer: &Option<Vec<Statement>>,
    ) -> Result<(), SyntaxError> {
        let stmt_depth = self.scope_depth;
        let skip_temp = match finalizer {
            Some(_) => {
                let t = self.chunk.alloc_temp();
                // Reset on entry; the statement may re-run inside a loop.
                self.op(OpCode::False);
                self.op1(OpCode::StoreTemp, t);
                Some(t)
            }
            None => None,
        };
        let mut end_leaves = Vec::new();

        let try_start = self.chunk.current_pos();
        self.compile_statements(block)?;
        end_leaves.push(self.op2(OpCode::Leave, 0, stmt_depth as u32));
        let try_end = self.chunk.current_pos();

        let catch_handler_start = self.chunk.current_pos();
        self.op(OpCode::IsCatchable);
        let catchable_jump = self.op1(OpCode::JumpIfTrue, 0);
        if let Some(t) = skip_temp {
            self.op(OpCode::True);
            self.op1(OpCode::StoreTemp, t);
        }
        self.op(OpCode::Rethrow);
        self.chunk.patch_jump(catchable_jump);
        match handler {
            Some(clause) => {
                match &clause.param {
                    Some(param) => {
                        let template =
                            Rc::new(ScopeTemplate::new(vec![param.clone()], vec![false]));
                        let tidx = self.chunk.add_scope_template(template);
                        self.op1(OpCode::PushScope, tidx);
                        self.scope_depth += 1;
                        self.chain.push(CompileScope::new(
                            CompileScopeKind::Catch,
                            vec![param.clone()],
                            vec![false],
                        ));
                        self.op(OpCode::BindCaught);
                        self.op2(OpCode::SetSlot, 0, 0);
                        self.op(OpCode::Pop);
                        let body_result = self.compile_statements(&clause.body);
                        self.chain.pop();
                        self.op(OpCode::PopScope);
                        self.scope_depth -= 1;
                        body_result?;
                    }
                    None => {
                        self.op(OpCode::DiscardCaught);
                        self.compile_statements(&clause.body)?;
                    }
                }
                end_leaves.push(self.op2(OpCode::Leave, 0, stmt_depth as u32));
            }
            None => {
                self.op(OpCode::Rethrow);
            }
        }
        let catch_handler_end = self.chunk.current_pos();
        self.chunk.regions.push(Region {
            start: try_start,
            end: try_end,
            handler_start: catch_handler_start,
            handler_end: catch_handler_end,
            scope_depth: stmt_depth,
            kind: RegionKind::Catch(CatchFilter::Any),
        });

        if let Some(fin) = finalizer {
            let skip = match skip_temp {
                Some(t) => t,
                None => 0,
            };
            let fin_start = self.chunk.current_pos();
            self.op1(OpCode::LoadTemp, skip);
            let skip_jump = self.op1(OpCode::JumpIfTrue, 0);
            self.finally_stack.push(FinallyContext {
                routes: Vec::new(),
                loop_base: self.loop_stack.len(),
            });
            let fin_result = self.compile_statements(fin);
            let ctx = match self.finally_stack.pop() {
                Some(c) => c,
                None => FinallyContext {
                    routes: Vec::new(),
                    loop_base: 0,
                },
            };
            fin_result?;
            self.chunk.patch_jump(skip_jump);
            self.op(OpCode::EndFinally);
            let fin_end = self.chunk.current_pos();
            self.chunk.regions.push(Region {
                start: try_start,
                end: catch_handler_end,
                handler_start: fin_start,
                handler_end: fin_end,
                scope_depth: stmt_depth,
                kind: RegionKind::Finally,
            });

            if !ctx.routes.is_empty() {
                let dispatch_start = self.chunk.current_pos();
                let table_idx = self.chunk.add_route_table(Vec::new());
                self.op1(OpCode::DispatchRoute, table_idx);
                let mut table = Vec::new();
                for route in &ctx.routes {
                    table.push(self.chunk.current_pos());
                    match route {
                        RouteTarget::Break { loop_index } => {
                            let depth = self.loop_stack[*loop_index].depth as u32;
                            let leave = self.op2(OpCode::Leave, 0, depth);
                            self.loop_stack[*loop_index].break_leaves.push(leave);
                        }
                        RouteTarget::Continue { loop_index } => {
                            let depth = self.loop_stack[*loop_index].depth as u32;
                            let leave = self.op2(OpCode::Leave, 0, depth);
                            self.loop_stack[*loop_index].continue_leaves.push(leave);
                        }
                        RouteTarget::Return { temp } => {
                            self.op1(OpCode::LoadTemp, *temp);
                            self.op(OpCode::Return);
                        }
                    }
                }
                let dispatch_end = self.chunk.current_pos();
                self.chunk.route_tables[table_idx as usize] = table;
                self.chunk.regions.push(Region {
                    start: fin_start,
                    end: fin_end,
                    handler_start: dispatch_start,
                    handler_end: dispatch_end,
                    scope_depth: stmt_depth,
                    kind: RegionKind::Catch(CatchFilter::RouteOnly),
                });
            }
        }

        for leave in end_leaves {
            self.chunk.patch_jump(leave);
        }
        Ok(())
    }

    // ── Expressions ──────────────────────────────────────────

    fn compile_expression(&mut self, expression: &Expression) -> Result<(), SyntaxError> {
        self.line = expression.meta().line;
        match expression {
            Expression::Literal { value, .. } => {
                match value {
                    Literal::Null => {
                        self.op(OpCode::Null);
                    }
                    Literal::Boolean(true) => {
                        self.op(OpCode::True);
                    }
                    Literal::Boolean(false) => {
                        self.op(OpCode::False);
                    }
                    Literal::Integer(i) => self.emit_constant(JsValue::from_i64(*i)),
                    Literal::Float(f) => self.emit_constant(JsValue::from_f64(*f)),
                    Literal::String(s) => self.emit_constant(JsValue::String(s.clone())),
                }
                Ok(())
            }
            Expression::Identifier { name, .. } => {
                let binding = self.chain.resolve(name);
                self.load_binding(name, binding);
                Ok(())
            }
            Expression::This { .. } => {
                self.op(OpCode::This);
                Ok(())
            }
            Expression::Array { elements, .. } => {
                for e in elements {
                    self.compile_expression(e)?;
                }
                self.op1(OpCode::NewArray, elements.len() as u32);
                Ok(())
            }
            Expression::Object { properties, .. } => {
                self.op(OpCode::NewObject);
                for (key, value) in properties {
                    self.compile_expression(value)?;
                    let idx = self.chunk.add_name(key);
                    self.op1(OpCode::InitProp, idx);
                }
                Ok(())
            }
            Expression::Function(def) => {
                let proto_idx = self.compile_function(def)?;
                self.op1(OpCode::Closure, proto_idx);
                Ok(())
            }
            Expression::Unary {
                operator, argument, ..
            } => self.compile_unary(*operator, argument),
            Expression::Update {
                operator,
                prefix,
                target,
                ..
            } => self.compile_update(*operator, *prefix, target),
            Expression::Binary {
                operator,
                left,
                right,
                ..
            } => {
                self.compile_expression(left)?;
                self.compile_expression(right)?;
                self.op(binary_opcode(*operator));
                Ok(())
            }
            Expression::Logical {
                operator,
                left,
                right,
                ..
            } => {
                self.compile_expression(left)?;
                self.op(OpCode::Dup);
                let short = match operator {
                    LogicalOperator::And => self.op1(OpCode::JumpIfFalse, 0),
                    LogicalOperator::Or => self.op1(OpCode::JumpIfTrue, 0),
                };
                self.op(OpCode::Pop);
                self.compile_expression(right)?;
                self.chunk.patch_jump(short);
                Ok(())
            }
            Expression::Assignment {
                operator,
                target,
                value,
                ..
            } => self.compile_assignment(*operator, target, value),
            Expression::Conditional {
                test,
                consequent,
                alternate,
                ..
            } => {
                self.compile_expression(test)?;
                let else_jump = self.op1(OpCode::JumpIfFalse, 0);
                self.compile_expression(consequent)?;
                let end_jump = self.op1(OpCode::Jump, 0);
                self.chunk.patch_jump(else_jump);
                self.compile_expression(alternate)?;
                self.chunk.patch_jump(end_jump);
                Ok(())
            }
            Expression::Call {
                callee, arguments, ..
            } => self.compile_call(callee, arguments),
            Expression::New {
                callee, arguments, ..
            } => {
                self.compile_expression(callee)?;
                for a in arguments {
                    self.compile_expression(a)?;
                }
                self.op1(OpCode::New, arguments.len() as u32);
                Ok(())
            }
            Expression::Member {
                object, property, ..
            } => {
                self.compile_expression(object)?;
                match property {
                    MemberKey::Name(name) => {
                        let idx = self.chunk.add_name(name);
                        self.op1(OpCode::GetProp, idx);
                    }
                    MemberKey::Computed(key) => {
                        self.compile_expression(key)?;
                        self.op(OpCode::GetElem);
                    }
                }
                Ok(())
            }
        }
    }

    fn compile_unary(
        &mut self,
        operator: UnaryOperator,
        argument: &Expression,
    ) -> Result<(), SyntaxError> {
        match operator {
            UnaryOperator::Minus => {
                self.compile_expression(argument)?;
                self.op(OpCode::Negate);
            }
            UnaryOperator::Plus => {
                self.compile_expression(argument)?;
                self.op(OpCode::ToNumber);
            }
            UnaryOperator::Not => {
                self.compile_expression(argument)?;
                self.op(OpCode::Not);
            }
            UnaryOperator::BitNot => {
                self.compile_expression(argument)?;
                self.op(OpCode::BitNot);
            }
            UnaryOperator::TypeOf => match argument {
                // typeof of an undeclared name must not throw.
                Expression::Identifier { name, .. }
                    if self.chain.resolve(name) == Binding::Dynamic =>
                {
                    let idx = self.chunk.add_name(name);
                    self.op1(OpCode::TypeOfName, idx);
                }
                _ => {
                    self.compile_expression(argument)?;
                    self.op(OpCode::TypeOf);
                }
            },
            UnaryOperator::Void => {
                self.compile_expression(argument)?;
                self.op(OpCode::Pop);
                self.op(OpCode::Undefined);
            }
            UnaryOperator::Delete => match argument {
                Expression::Member {
                    object, property, ..
                } => {
                    self.compile_expression(object)?;
                    match property {
                        MemberKey::Name(name) => {
                            let idx = self.chunk.add_name(name);
                            self.op1(OpCode::DeleteProp, idx);
                        }
                        MemberKey::Computed(key) => {
                            self.compile_expression(key)?;
                            self.op(OpCode::DeleteElem);
                        }
                    }
                }
                Expression::Identifier { name, .. } => {
                    if self.chunk.strict {
                        return Err(self.error(
                            "delete of an unqualified identifier in strict mode",
                        ));
                    }
                    match self.chain.resolve(name) {
                        Binding::Slot { .. } => {
                            self.op(OpCode::False);
                        }
                        Binding::Dynamic => {
                            let idx = self.chunk.add_name(name);
                            self.op1(OpCode::DeleteName, idx);
                        }
                    }
                }
                other => {
                    self.compile_expression(other)?;
                    self.op(OpCode::Pop);
                    self.op(OpCode::True);
                }
            },
        }
        Ok(())
    }

    fn compile_update(
        &mut self,
        operator: UpdateOperator,
        prefix: bool,
        target: &Expression,
    ) -> Result<(), SyntaxError> {
        let delta = match operator {
            UpdateOperator::Increment => OpCode::Add,
            UpdateOperator::Decrement => OpCode::Sub,
        };
        match target {
            Expression::Identifier { name, .. } => {
                let binding = self.chain.resolve(name);
                self.load_binding(name, binding);
                self.op(OpCode::ToNumber);
                if prefix {
                    self.emit_constant(JsValue::from_i64(1));
                    self.op(delta);
                    self.store_binding(name, binding);
                } else {
                    let t = self.scratch();
                    self.op1(OpCode::StoreTemp, t);
                    self.op1(OpCode::LoadTemp, t);
                    self.emit_constant(JsValue::from_i64(1));
                    self.op(delta);
                    self.store_binding(name, binding);
                    self.op(OpCode::Pop);
                    self.op1(OpCode::LoadTemp, t);
                }
            }
            Expression::Member {
                object, property, ..
            } => {
                self.compile_expression(object)?;
                let name_idx = match property {
                    MemberKey::Name(name) => {
                        let idx = self.chunk.add_name(name);
                        self.op(OpCode::Dup);
                        self.op1(OpCode::GetProp, idx);
                        Some(idx)
                    }
                    MemberKey::Computed(key) => {
                        self.compile_expression(key)?;
                        self.op(OpCode::Dup2);
                        self.op(OpCode::GetElem);
                        None
                    }
                };
                self.op(OpCode::ToNumber);
                let set = |c: &mut Self| match name_idx {
                    Some(idx) => {
                        c.op1(OpCode::SetProp, idx);
                    }
                    None => {
                        c.op(OpCode::SetElem);
                    }
                };
                if prefix {
                    self.emit_constant(JsValue::from_i64(1));
                    self.op(delta);
                    set(self);
                } else {
                    let t = self.scratch();
                    self.op1(OpCode::StoreTemp, t);
                    self.op1(OpCode::LoadTemp, t);
                    self.emit_constant(JsValue::from_i64(1));
                    self.op(delta);
                    set(self);
                    self.op(OpCode::Pop);
                    self.op1(OpCode::LoadTemp, t);
                }
            }
            _ => return Err(self.error("invalid target for an update expression")),
        }
        Ok(())
    }

    fn compile_assignment(
        &mut self,
        operator: AssignmentOperator,
        target: &Expression,
        value: &Expression,
    ) -> Result<(), SyntaxError> {
        match target {
            Expression::Identifier { name, .. } => {
                let binding = self.chain.resolve(name);
                if let Some(binop) = operator.binary() {
                    self.load_binding(name, binding);
                    self.compile_expression(value)?;
                    self.op(binary_opcode(binop));
                } else {
                    self.compile_expression(value)?;
                }
                self.store_binding(name, binding);
            }
            Expression::Member {
                object, property, ..
            } => {
                self.compile_expression(object)?;
                match property {
                    MemberKey::Name(name) => {
                        let idx = self.chunk.add_name(name);
                        if let Some(binop) = operator.binary() {
                            self.op(OpCode::Dup);
                            self.op1(OpCode::GetProp, idx);
                            self.compile_expression(value)?;
                            self.op(binary_opcode(binop));
                        } else {
                            self.compile_expression(value)?;
                        }
                        self.op1(OpCode::SetProp, idx);
                    }
                    MemberKey::Computed(key) => {
                        self.compile_expression(key)?;
                        if let Some(binop) = operator.binary() {
                            self.op(OpCode::Dup2);
                            self.op(OpCode::GetElem);
                            self.compile_expression(value)?;
                            self.op(binary_opcode(binop));
                        } else {
                            self.compile_expression(value)?;
                        }
                        self.op(OpCode::SetElem);
                    }
                }
            }
            _ => return Err(self.error("invalid assignment target")),
        }
        Ok(())
    }

    fn compile_call(
        &mut self,
        callee: &Expression,
        arguments: &[Expression],
    ) -> Result<(), SyntaxError> {
        match callee {
            // Method call: the receiver becomes `this`.
            Expression::Member {
                object, property, ..
            } => {
                self.compile_expression(object)?;
                self.op(OpCode::Dup);
                match property {
                    MemberKey::Name(name) => {
                        let idx = self.chunk.add_name(name);
                        self.op1(OpCode::GetProp, idx);
                    }
                    MemberKey::Computed(key) => {
                        self.compile_expression(key)?;
                        self.op(OpCode::GetElem);
                    }
                }
            }
            _ => {
                self.op(OpCode::Undefined);
                self.compile_expression(callee)?;
            }
        }
        for a in arguments {
            self.compile_expression(a)?;
        }
        self.op1(OpCode::Call, arguments.len() as u32);
        Ok(())
    }

    // ── Bindings ─────────────────────────────────────────────

    fn load_binding(&mut self, name: &str, binding: Binding) {
        match binding {
            Binding::Slot { depth, slot, .. } => {
                self.op2(OpCode::GetSlot, depth as u32, slot as u32);
            }
            Binding::Dynamic => {
                let idx = self.chunk.add_name(name);
                self.op1(OpCode::GetName, idx);
            }
        }
    }

    fn store_binding(&mut self, name: &str, binding: Binding) {
        match binding {
            Binding::Slot { depth, slot, .. } => {
                self.op2(OpCode::SetSlot, depth as u32, slot as u32);
            }
            Binding::Dynamic => {
                let idx = self.chunk.add_name(name);
                self.op1(OpCode::SetName, idx);
            }
        }
    }
}

fn binary_opcode(operator: BinaryOperator) -> OpCode {
    match operator {
        BinaryOperator::Add => OpCode::Add,
        BinaryOperator::Sub => OpCode::Sub,
        BinaryOperator::Mul => OpCode::Mul,
        BinaryOperator::Div => OpCode::Div,
        BinaryOperator::Mod => OpCode::Mod,
        BinaryOperator::Equal => OpCode::Equal,
        BinaryOperator::NotEqual => OpCode::NotEqual,
        BinaryOperator::StrictEqual => OpCode::StrictEqual,
        BinaryOperator::StrictNotEqual => OpCode::StrictNotEqual,
        BinaryOperator::LessThan => OpCode::LessThan,
        BinaryOperator::LessEqual => OpCode::LessEqual,
        BinaryOperator::GreaterThan => OpCode::GreaterThan,
        BinaryOperator::GreaterEqual => OpCode::GreaterEqual,
        BinaryOperator::BitAnd => OpCode::BitAnd,
        BinaryOperator::BitOr => OpCode::BitOr,
        BinaryOperator::BitXor => OpCode::BitXor,
        BinaryOperator::ShiftLeft => OpCode::ShiftLeft,
        BinaryOperator::ShiftRight => OpCode::ShiftRight,
        BinaryOperator::UShiftRight => OpCode::UShiftRight,
        BinaryOperator::InstanceOf => OpCode::InstanceOf,
        BinaryOperator::In => OpCode::In,
    }
}

/// Same traversal as var hoisting: function declarations anywhere in the
/// unit, excluding nested function bodies.
fn collect_function_decls<'a>(body: &'a [Statement], out: &mut Vec<&'a FunctionDef>) {
    for statement in body {
        match statement {
            Statement::FunctionDeclaration(def) => out.push(def),
            Statement::Block { body, .. } => collect_function_decls(body, out),
            Statement::If {
                consequent,
                alternate,
                ..
            } => {
                collect_function_decls(std::slice::from_ref(consequent), out);
                if let Some(a) = alternate {
                    collect_function_decls(std::slice::from_ref(a), out);
                }
            }
            Statement::While { body, .. } | Statement::DoWhile { body, .. } => {
                collect_function_decls(std::slice::from_ref(body), out)
            }
            Statement::For { body, .. } => {
                collect_function_decls(std::slice::from_ref(body), out)
            }
            Statement::Try {
                block,
                handler,
                finalizer,
                ..
            } => {
                collect_function_decls(block, out);
                if let Some(h) = handler {
                    collect_function_decls(&h.body, out);
                }
                if let Some(f) = finalizer {
                    collect_function_decls(f, out);
                }
            }
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::JsParser;
    use crate::runner::ds::source::ScriptSource;

    fn compile(code: &str) -> Chunk {
        let source = ScriptSource::new(code);
        let program = JsParser::parse_program(&source).expect("parse failed");
        compile_program(&program, &CompilerOptions::default(), "test").expect("compile failed")
    }

    fn compile_err(code: &str) -> String {
        let source = ScriptSource::new(code);
        let program = JsParser::parse_program(&source).expect("parse failed");
        match compile_program(&program, &CompilerOptions::default(), "test") {
            Ok(_) => panic!("expected a compile error for: {}", code),
            Err(e) => e.message,
        }
    }

    fn has_op(chunk: &Chunk, op: OpCode) -> bool {
        chunk.code.iter().any(|i| i.op == op)
    }

    #[test]
    fn arithmetic_program_stores_a_result() {
        let chunk = compile("1 + 2 * 3;");
        assert!(chunk.result_temp.is_some());
        assert!(has_op(&chunk, OpCode::Add));
        assert!(has_op(&chunk, OpCode::Mul));
        assert!(has_op(&chunk, OpCode::StoreTemp));
        assert_eq!(chunk.code.last().map(|i| i.op), Some(OpCode::Halt));
    }

    #[test]
    fn try_catch_finally_emits_catch_and_finally_regions() {
        let chunk = compile("try { a(); } catch (e) { b(); } finally { c(); }");
        let kinds: Vec<_> = chunk.regions.iter().map(|r| r.kind).collect();
        assert_eq!(kinds.len(), 2);
        assert!(matches!(kinds[0], RegionKind::Catch(CatchFilter::Any)));
        assert!(matches!(kinds[1], RegionKind::Finally));
        assert!(chunk.route_tables.is_empty());
        // The finally region must also cover the catch handler.
        let catch = &chunk.regions[0];
        let finally = &chunk.regions[1];
        assert_eq!(finally.start, catch.start);
        assert_eq!(finally.end, catch.handler_end);
    }

    #[test]
    fn break_inside_finally_builds_a_route_table() {
        let chunk = compile("while (x) { try { a(); } finally { break; } }");
        assert!(has_op(&chunk, OpCode::RaiseRoute));
        assert!(has_op(&chunk, OpCode::DispatchRoute));
        assert_eq!(chunk.route_tables.len(), 1);
        assert_eq!(chunk.route_tables[0].len(), 1);
        assert!(chunk
            .regions
            .iter()
            .any(|r| matches!(r.kind, RegionKind::Catch(CatchFilter::RouteOnly))));
    }

    #[test]
    fn break_inside_a_loop_opened_in_the_finally_stays_local() {
        let chunk = compile("try { a(); } finally { while (x) { break; } }");
        assert!(!has_op(&chunk, OpCode::RaiseRoute));
        assert!(chunk.route_tables.is_empty());
    }

    #[test]
    fn break_in_try_body_compiles_to_leave() {
        let chunk = compile("while (x) { try { break; } finally { a(); } }");
        assert!(has_op(&chunk, OpCode::Leave));
        assert!(!has_op(&chunk, OpCode::RaiseRoute));
    }

    #[test]
    fn return_outside_function_is_rejected() {
        let message = compile_err("return 1;");
        assert!(message.contains("return"), "got: {}", message);
    }

    #[test]
    fn break_outside_loop_is_rejected() {
        compile_err("break;");
    }

    #[test]
    fn const_requires_an_initializer() {
        compile_err("const a;");
    }

    #[test]
    fn strict_duplicate_parameters_are_rejected() {
        compile_err("'use strict'; function f(a, a) { }");
    }

    #[test]
    fn function_scope_lays_out_params_then_vars() {
        let chunk = compile("function f(a) { var b; return a; }");
        assert_eq!(chunk.protos.len(), 1);
        let proto = &chunk.protos[0];
        assert_eq!(proto.scope_template.names, vec!["a", "b"]);
        assert!(!proto.uses_arguments);
        assert!(has_op(&proto.chunk, OpCode::GetSlot));
    }

    #[test]
    fn arguments_slot_reserved_when_used() {
        let chunk = compile("function f(a) { return arguments; }");
        let proto = &chunk.protos[0];
        assert!(proto.uses_arguments);
        assert_eq!(proto.scope_template.slot_of("arguments"), Some(1));
    }

    #[test]
    fn global_vars_declare_on_the_global_object() {
        let chunk = compile("var x = 1; x;");
        assert!(has_op(&chunk, OpCode::DeclareVar));
        assert!(has_op(&chunk, OpCode::SetName));
        assert!(has_op(&chunk, OpCode::GetName));
    }

    #[test]
    fn global_lets_live_in_a_declarative_scope() {
        let chunk = compile("let x = 1; x;");
        assert!(has_op(&chunk, OpCode::PushScope));
        assert!(has_op(&chunk, OpCode::SetSlot));
        assert!(has_op(&chunk, OpCode::GetSlot));
    }

    #[test]
    fn typeof_undeclared_uses_name_variant() {
        let chunk = compile("typeof missing;");
        assert!(has_op(&chunk, OpCode::TypeOfName));
    }

    #[test]
    fn method_calls_keep_the_receiver() {
        let chunk = compile("o.m(1);");
        assert!(has_op(&chunk, OpCode::Dup));
        assert!(has_op(&chunk, OpCode::GetProp));
        assert!(has_op(&chunk, OpCode::Call));
    }
}
