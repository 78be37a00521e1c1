use crate::parser::ast::*;
use crate::parser::JsParser;
use crate::runner::ds::source::ScriptSource;

fn parse(code: &str) -> ProgramData {
    JsParser::parse_program(&ScriptSource::new(code)).expect("parse failed")
}

fn parse_err(code: &str) -> String {
    JsParser::parse_program(&ScriptSource::new(code))
        .expect_err("expected a syntax error")
        .message
}

#[test]
fn test_var_declaration() {
    let program = parse("var x = 5, y;");
    assert_eq!(program.body.len(), 1);
    match &program.body[0] {
        Statement::VariableDeclaration {
            kind, declarations, ..
        } => {
            assert_eq!(*kind, VariableKind::Var);
            assert_eq!(declarations.len(), 2);
            assert_eq!(declarations[0].name, "x");
            assert!(declarations[0].init.is_some());
            assert_eq!(declarations[1].name, "y");
            assert!(declarations[1].init.is_none());
        }
        other => panic!("expected a var declaration, got {:?}", other),
    }
}

#[test]
fn test_multiplication_binds_tighter_than_addition() {
    let program = parse("1 + 2 * 3");
    match &program.body[0] {
        Statement::Expression {
            expression:
                Expression::Binary {
                    operator, right, ..
                },
            ..
        } => {
            assert_eq!(*operator, BinaryOperator::Add);
            match right.as_ref() {
                Expression::Binary { operator, .. } => {
                    assert_eq!(*operator, BinaryOperator::Mul)
                }
                other => panic!("expected nested multiplication, got {:?}", other),
            }
        }
        other => panic!("expected a binary expression, got {:?}", other),
    }
}

#[test]
fn test_strict_directive_detected() {
    assert!(parse("\"use strict\"; var x = 1;").strict);
    assert!(!parse("var x = 1;").strict);
}

#[test]
fn test_function_strict_directive() {
    let program = parse("function f() { 'use strict'; return 1; }");
    match &program.body[0] {
        Statement::FunctionDeclaration(def) => {
            assert!(def.strict);
            assert_eq!(def.name.as_deref(), Some("f"));
        }
        other => panic!("expected a function declaration, got {:?}", other),
    }
    assert!(!program.strict);
}

#[test]
fn test_try_catch_finally_shapes() {
    let program = parse("try { a(); } catch (e) { b(); } finally { c(); }");
    match &program.body[0] {
        Statement::Try {
            block,
            handler,
            finalizer,
            ..
        } => {
            assert_eq!(block.len(), 1);
            let handler = handler.as_ref().expect("catch clause");
            assert_eq!(handler.param.as_deref(), Some("e"));
            assert!(finalizer.is_some());
        }
        other => panic!("expected a try statement, got {:?}", other),
    }
    // Parameterless catch is allowed.
    parse("try { a(); } catch { b(); }");
    // try alone is not.
    parse_err("try { a(); }");
}

#[test]
fn test_member_and_call_chain() {
    let program = parse("a.b(1)[2]");
    match &program.body[0] {
        Statement::Expression { expression, .. } => match expression {
            Expression::Member {
                object, property, ..
            } => {
                assert!(matches!(property, MemberKey::Computed(_)));
                assert!(matches!(object.as_ref(), Expression::Call { .. }));
            }
            other => panic!("expected a member expression, got {:?}", other),
        },
        _ => panic!("expected an expression statement"),
    }
}

#[test]
fn test_new_binds_member_chain_before_call() {
    let program = parse("new a.B(1)");
    match &program.body[0] {
        Statement::Expression {
            expression: Expression::New { callee, arguments, .. },
            ..
        } => {
            assert!(matches!(callee.as_ref(), Expression::Member { .. }));
            assert_eq!(arguments.len(), 1);
        }
        other => panic!("expected a new expression, got {:?}", other),
    }
}

#[test]
fn test_string_escapes() {
    let program = parse("var s = 'a\\nb\\t\\u0041';");
    match &program.body[0] {
        Statement::VariableDeclaration { declarations, .. } => {
            match &declarations[0].init {
                Some(Expression::Literal {
                    value: Literal::String(s),
                    ..
                }) => assert_eq!(s, "a\nb\tA"),
                other => panic!("expected a string literal, got {:?}", other),
            }
        }
        _ => panic!("expected a var declaration"),
    }
}

#[test]
fn test_number_literals() {
    let program = parse("var a = 10, b = 1.5, c = 0xff, d = 2e3;");
    let inits: Vec<&Literal> = match &program.body[0] {
        Statement::VariableDeclaration { declarations, .. } => declarations
            .iter()
            .map(|d| match d.init.as_ref().expect("initializer") {
                Expression::Literal { value, .. } => value,
                other => panic!("expected a literal, got {:?}", other),
            })
            .collect(),
        _ => panic!("expected a var declaration"),
    };
    assert_eq!(*inits[0], Literal::Integer(10));
    assert_eq!(*inits[1], Literal::Float(1.5));
    assert_eq!(*inits[2], Literal::Integer(255));
    assert_eq!(*inits[3], Literal::Float(2000.0));
}

#[test]
fn test_statement_termination_before_brace() {
    let program = parse("function f() { return 1 }");
    match &program.body[0] {
        Statement::FunctionDeclaration(def) => assert_eq!(def.body.len(), 1),
        other => panic!("expected a function declaration, got {:?}", other),
    }
}

#[test]
fn test_line_numbers() {
    let program = parse("var a = 1;\nvar b = 2;\n\nvar c = 3;");
    assert_eq!(program.body[0].meta().line, 1);
    assert_eq!(program.body[1].meta().line, 2);
    assert_eq!(program.body[2].meta().line, 4);
}

#[test]
fn test_base_line_offsets_diagnostics() {
    let mut source = ScriptSource::new("var a = 1;\nvar b = 2;");
    source.base_line = 10;
    let program = JsParser::parse_program(&source).expect("parse failed");
    assert_eq!(program.body[1].meta().line, 11);
}

#[test]
fn test_reserved_binding_names_rejected() {
    let message = parse_err("var class = 1;");
    assert!(message.contains("reserved"), "got: {}", message);
}

#[test]
fn test_invalid_assignment_target() {
    parse_err("1 = 2;");
}

#[test]
fn test_for_section_attribution() {
    let program = parse("for (;; i = i + 1) { }");
    match &program.body[0] {
        Statement::For {
            init,
            test,
            update,
            ..
        } => {
            assert!(init.is_none());
            assert!(test.is_none());
            assert!(update.is_some());
        }
        other => panic!("expected a for statement, got {:?}", other),
    }
}

#[test]
fn test_keywords_followed_by_identifiers() {
    // The boundary check after a keyword must not look past whitespace.
    let program = parse("function f() { return n; } f();");
    assert_eq!(program.body.len(), 2);
    parse("var p = new Point(1, 2);");
    parse("throw reason;");
    // Keyword prefixes are still ordinary identifiers.
    match &parse("var iffy = newish;").body[0] {
        Statement::VariableDeclaration { declarations, .. } => {
            assert_eq!(declarations[0].name, "iffy");
        }
        other => panic!("expected a var declaration, got {:?}", other),
    }
}

#[test]
fn test_comments_are_skipped() {
    let program = parse("// leading\nvar x = /* inline */ 1;");
    assert_eq!(program.body.len(), 1);
}
