//! Scope and binding resolution.
//!
//! Runs between parsing and code generation. Hoists `var` and function
//! declarations to their function (or global) scope, collects block-level
//! `let`/`const` bindings, and resolves identifier references either to a
//! `(depth, slot)` pair against declarative scopes or to dynamic name
//! lookup when an object-backed scope (the global scope, or a scope handed
//! to `eval`) sits between the use and any possible declaration.

use crate::parser::ast::{
    CatchClause, Expression, ForInit, FunctionDef, MemberKey, ProgramData, Statement, VariableKind,
};
use crate::runner::ds::source::CompilerOptions;

/// Program-level facts the engine needs before generating code.
pub struct Analysis {
    pub strict: bool,
    /// `var` and function names hoisted onto the global object.
    pub global_bindings: Vec<String>,
}

pub fn analyze(program: &ProgramData, options: &CompilerOptions) -> Analysis {
    Analysis {
        strict: program.strict || options.force_strict_mode,
        global_bindings: hoisted_var_names(&program.body),
    }
}

/// `var` and function-declaration names in a function or program body,
/// without descending into nested functions.
pub fn hoisted_var_names(body: &[Statement]) -> Vec<String> {
    let mut names = Vec::new();
    collect_hoisted(body, &mut names);
    names
}

fn push_unique(names: &mut Vec<String>, name: &str) {
    if !names.iter().any(|n| n == name) {
        names.push(name.to_string());
    }
}

fn collect_hoisted(body: &[Statement], names: &mut Vec<String>) {
    for statement in body {
        collect_hoisted_statement(statement, names);
    }
}

fn collect_hoisted_statement(statement: &Statement, names: &mut Vec<String>) {
    match statement {
        Statement::VariableDeclaration {
            kind: VariableKind::Var,
            declarations,
            ..
        } => {
            for d in declarations {
                push_unique(names, &d.name);
            }
        }
        Statement::FunctionDeclaration(def) => {
            if let Some(name) = &def.name {
                push_unique(names, name);
            }
        }
        Statement::Block { body, .. } => collect_hoisted(body, names),
        Statement::If {
            consequent,
            alternate,
            ..
        } => {
            collect_hoisted_statement(consequent, names);
            if let Some(a) = alternate {
                collect_hoisted_statement(a, names);
            }
        }
        Statement::While { body, .. }
        | Statement::DoWhile { body, .. } => collect_hoisted_statement(body, names),
        Statement::For { init, body, .. } => {
            if let Some(ForInit::Declaration(VariableKind::Var, declarations)) = init {
                for d in declarations {
                    push_unique(names, &d.name);
                }
            }
            collect_hoisted_statement(body, names);
        }
        Statement::Try {
            block,
            handler,
            finalizer,
            ..
        } => {
            collect_hoisted(block, names);
            if let Some(h) = handler {
                collect_hoisted(&h.body, names);
            }
            if let Some(f) = finalizer {
                collect_hoisted(f, names);
            }
        }
        _ => {}
    }
}

/// Block-scoped (`let`/`const`) names declared directly in a statement
/// list, paired with their immutability.
pub fn block_scoped_names(body: &[Statement]) -> (Vec<String>, Vec<bool>) {
    let mut names = Vec::new();
    let mut immutables = Vec::new();
    for statement in body {
        if let Statement::VariableDeclaration {
            kind,
            declarations,
            ..
        } = statement
        {
            let immutable = match kind {
                VariableKind::Let => false,
                VariableKind::Const => true,
                VariableKind::Var => continue,
            };
            for d in declarations {
                if !names.iter().any(|n| n == &d.name) {
                    names.push(d.name.clone());
                    immutables.push(immutable);
                }
            }
        }
    }
    (names, immutables)
}

/// Whether a function body mentions `arguments` outside nested functions.
/// Used to skip materializing the arguments object.
pub fn function_uses_arguments(def: &FunctionDef) -> bool {
    def.body.iter().any(statement_mentions_arguments)
}

fn statement_mentions_arguments(statement: &Statement) -> bool {
    match statement {
        Statement::Expression { expression, .. } => expr_mentions_arguments(expression),
        Statement::VariableDeclaration { declarations, .. } => declarations
            .iter()
            .any(|d| d.init.as_ref().map_or(false, expr_mentions_arguments)),
        Statement::FunctionDeclaration(_) => false,
        Statement::Block { body, .. } => body.iter().any(statement_mentions_arguments),
        Statement::If {
            test,
            consequent,
            alternate,
            ..
        } => {
            expr_mentions_arguments(test)
                || statement_mentions_arguments(consequent)
                || alternate
                    .as_ref()
                    .map_or(false, |a| statement_mentions_arguments(a))
        }
        Statement::While { test, body, .. } | Statement::DoWhile { test, body, .. } => {
            expr_mentions_arguments(test) || statement_mentions_arguments(body)
        }
        Statement::For {
            init,
            test,
            update,
            body,
            ..
        } => {
            let init_mentions = match init {
                Some(ForInit::Expression(e)) => expr_mentions_arguments(e),
                Some(ForInit::Declaration(_, declarations)) => declarations
                    .iter()
                    .any(|d| d.init.as_ref().map_or(false, expr_mentions_arguments)),
                None => false,
            };
            init_mentions
                || test.as_ref().map_or(false, expr_mentions_arguments)
                || update.as_ref().map_or(false, expr_mentions_arguments)
                || statement_mentions_arguments(body)
        }
        Statement::Return { argument, .. } => {
            argument.as_ref().map_or(false, expr_mentions_arguments)
        }
        Statement::Throw { argument, .. } => expr_mentions_arguments(argument),
        Statement::Try {
            block,
            handler,
            finalizer,
            ..
        } => {
            block.iter().any(statement_mentions_arguments)
                || handler.as_ref().map_or(false, |CatchClause { body, .. }| {
                    body.iter().any(statement_mentions_arguments)
                })
                || finalizer
                    .as_ref()
                    .map_or(false, |f| f.iter().any(statement_mentions_arguments))
        }
        _ => false,
    }
}

fn expr_mentions_arguments(expression: &Expression) -> bool {
    match expression {
        Expression::Identifier { name, .. } => name == "arguments",
        Expression::Literal { .. } | Expression::This { .. } => false,
        Expression::Function(_) => false,
        Expression::Array { elements, .. } => elements.iter().any(expr_mentions_arguments),
        Expression::Object { properties, .. } => {
            properties.iter().any(|(_, v)| expr_mentions_arguments(v))
        }
        Expression::Unary { argument, .. } => expr_mentions_arguments(argument),
        Expression::Update { target, .. } => expr_mentions_arguments(target),
        Expression::Binary { left, right, .. } | Expression::Logical { left, right, .. } => {
            expr_mentions_arguments(left) || expr_mentions_arguments(right)
        }
        Expression::Assignment { target, value, .. } => {
            expr_mentions_arguments(target) || expr_mentions_arguments(value)
        }
        Expression::Conditional {
            test,
            consequent,
            alternate,
            ..
        } => {
            expr_mentions_arguments(test)
                || expr_mentions_arguments(consequent)
                || expr_mentions_arguments(alternate)
        }
        Expression::Call {
            callee, arguments, ..
        }
        | Expression::New {
            callee, arguments, ..
        } => {
            expr_mentions_arguments(callee) || arguments.iter().any(expr_mentions_arguments)
        }
        Expression::Member {
            object, property, ..
        } => {
            expr_mentions_arguments(object)
                || match property {
                    MemberKey::Computed(e) => expr_mentions_arguments(e),
                    MemberKey::Name(_) => false,
                }
        }
    }
}

// ── Compile-time scope chain ─────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompileScopeKind {
    /// Backed by the global object; everything under it that misses
    /// declarative scopes resolves dynamically.
    Global,
    Function,
    Block,
    Catch,
    /// Placeholder for a runtime scope of unknown layout (eval).
    Dynamic,
}

impl CompileScopeKind {
    pub fn is_object_backed(self) -> bool {
        matches!(self, CompileScopeKind::Global | CompileScopeKind::Dynamic)
    }
}

pub struct CompileScope {
    pub kind: CompileScopeKind,
    pub names: Vec<String>,
    pub immutables: Vec<bool>,
}

impl CompileScope {
    pub fn new(kind: CompileScopeKind, names: Vec<String>, immutables: Vec<bool>) -> Self {
        CompileScope {
            kind,
            names,
            immutables,
        }
    }

    fn slot_of(&self, name: &str) -> Option<usize> {
        // Last occurrence wins so that duplicated parameter names resolve
        // to the slot the final duplicate owns.
        self.names.iter().rposition(|n| n == name)
    }
}

/// How one identifier reference is accessed at runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Binding {
    /// `depth` runtime scopes up, at `slot`.
    Slot {
        depth: usize,
        slot: usize,
        immutable: bool,
    },
    /// Name lookup along the runtime chain.
    Dynamic,
}

/// Innermost-last stack of compile-time scopes. Each entry corresponds to
/// exactly one runtime scope.
pub struct ScopeChain {
    scopes: Vec<CompileScope>,
}

impl ScopeChain {
    pub fn new() -> Self {
        ScopeChain { scopes: Vec::new() }
    }

    pub fn push(&mut self, scope: CompileScope) {
        self.scopes.push(scope);
    }

    pub fn pop(&mut self) -> Option<CompileScope> {
        self.scopes.pop()
    }

    pub fn depth(&self) -> usize {
        self.scopes.len()
    }

    /// Resolves a name from the innermost scope outward. Stops at the first
    /// object-backed scope: past it nothing can be proven at compile time.
    pub fn resolve(&self, name: &str) -> Binding {
        for (depth, scope) in self.scopes.iter().rev().enumerate() {
            if scope.kind.is_object_backed() {
                return Binding::Dynamic;
            }
            if let Some(slot) = scope.slot_of(name) {
                return Binding::Slot {
                    depth,
                    slot,
                    immutable: scope.immutables.get(slot).copied().unwrap_or(false),
                };
            }
        }
        Binding::Dynamic
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::JsParser;
    use crate::runner::ds::source::ScriptSource;

    fn parse(code: &str) -> ProgramData {
        JsParser::parse_program(&ScriptSource::new(code)).expect("parse failed")
    }

    #[test]
    fn hoists_vars_and_functions_but_not_lets() {
        let program = parse("var a; let b; if (a) { var c; } function d() { var inner; }");
        let names = hoisted_var_names(&program.body);
        assert_eq!(names, vec!["a", "c", "d"]);
    }

    #[test]
    fn block_scoped_names_track_immutability() {
        let program = parse("let a; const b = 1; var c;");
        let (names, immutables) = block_scoped_names(&program.body);
        assert_eq!(names, vec!["a", "b"]);
        assert_eq!(immutables, vec![false, true]);
    }

    #[test]
    fn detects_arguments_usage() {
        let program = parse("function f() { return arguments[0]; } function g() { return 1; }");
        let f = match &program.body[0] {
            Statement::FunctionDeclaration(def) => def,
            _ => panic!("expected function"),
        };
        let g = match &program.body[1] {
            Statement::FunctionDeclaration(def) => def,
            _ => panic!("expected function"),
        };
        assert!(function_uses_arguments(f));
        assert!(!function_uses_arguments(g));
    }

    #[test]
    fn nested_function_arguments_do_not_leak() {
        let program = parse("function f() { function g() { return arguments; } return 1; }");
        let f = match &program.body[0] {
            Statement::FunctionDeclaration(def) => def,
            _ => panic!("expected function"),
        };
        assert!(!function_uses_arguments(f));
    }

    #[test]
    fn resolution_stops_at_object_backed_scopes() {
        let mut chain = ScopeChain::new();
        chain.push(CompileScope::new(
            CompileScopeKind::Global,
            Vec::new(),
            Vec::new(),
        ));
        chain.push(CompileScope::new(
            CompileScopeKind::Function,
            vec!["x".to_string()],
            vec![false],
        ));
        chain.push(CompileScope::new(
            CompileScopeKind::Block,
            vec!["y".to_string()],
            vec![true],
        ));

        assert_eq!(
            chain.resolve("y"),
            Binding::Slot {
                depth: 0,
                slot: 0,
                immutable: true
            }
        );
        assert_eq!(
            chain.resolve("x"),
            Binding::Slot {
                depth: 1,
                slot: 0,
                immutable: false
            }
        );
        assert_eq!(chain.resolve("g"), Binding::Dynamic);

        // A dynamic scope in between hides outer slots.
        chain.push(CompileScope::new(
            CompileScopeKind::Dynamic,
            Vec::new(),
            Vec::new(),
        ));
        chain.push(CompileScope::new(
            CompileScopeKind::Block,
            Vec::new(),
            Vec::new(),
        ));
        assert_eq!(chain.resolve("x"), Binding::Dynamic);
    }
}
