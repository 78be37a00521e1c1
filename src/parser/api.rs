//! pest-to-AST builder.
//!
//! The grammar produces a pair tree mirroring the precedence layers; this
//! module folds it into the flat AST of [`crate::parser::ast`], decoding
//! string escapes and numeric literals on the way, and rewrites pest errors
//! into [`SyntaxError`] values carrying source coordinates.

use std::collections::HashSet;

use pest::iterators::Pair;
use pest::Parser;
use pest_derive::Parser;

use crate::parser::ast::*;
use crate::runner::ds::error::SyntaxError;
use crate::runner::ds::source::ScriptSource;

#[derive(Parser)]
#[grammar = "parser/js_grammar.pest"] // relative to src
pub struct JsParser;

lazy_static! {
    /// Future reserved words rejected in binding positions even though the
    /// grammar's keyword rule does not know them.
    static ref RESERVED_BINDING_NAMES: HashSet<&'static str> = {
        let mut s = HashSet::new();
        for w in &[
            "class", "enum", "export", "extends", "import", "super",
            "implements", "interface", "package", "private", "protected",
            "public", "static", "yield",
        ] {
            s.insert(*w);
        }
        s
    };
}

impl JsParser {
    /// Parses a full program. The only public entry point.
    pub fn parse_program(source: &ScriptSource) -> Result<ProgramData, SyntaxError> {
        let mut pairs = JsParser::parse(Rule::program, &source.text)
            .map_err(|e| pest_error_to_syntax(e, source))?;
        let program = pairs.next().ok_or_else(|| SyntaxError {
            message: "empty parse result".to_string(),
            line: source.base_line,
            path: source.path.clone(),
        })?;
        let mut body = Vec::new();
        for pair in program.into_inner() {
            match pair.as_rule() {
                Rule::statement => body.push(build_statement(pair, source)?),
                Rule::EOI => {}
                r => return Err(unexpected(r, &pair, source)),
            }
        }
        let strict = leading_strict_directive(&body);
        Ok(ProgramData { body, strict })
    }
}

fn pest_error_to_syntax(e: pest::error::Error<Rule>, source: &ScriptSource) -> SyntaxError {
    let line = match e.line_col {
        pest::error::LineColLocation::Pos((l, _)) => l,
        pest::error::LineColLocation::Span((l, _), _) => l,
    };
    SyntaxError {
        message: e.variant.message().to_string(),
        line: source.base_line + line.saturating_sub(1) as u32,
        path: source.path.clone(),
    }
}

fn meta_of(pair: &Pair<Rule>, source: &ScriptSource) -> Meta {
    Meta {
        line: source.line_of_offset(pair.as_span().start()),
    }
}

fn syntax_error(message: impl Into<String>, pair: &Pair<Rule>, source: &ScriptSource) -> SyntaxError {
    SyntaxError {
        message: message.into(),
        line: source.line_of_offset(pair.as_span().start()),
        path: source.path.clone(),
    }
}

fn unexpected(rule: Rule, pair: &Pair<Rule>, source: &ScriptSource) -> SyntaxError {
    syntax_error(format!("unexpected {:?}", rule), pair, source)
}

/// Positional keyword rules are atomic (for the identifier-boundary check)
/// and therefore emit pairs; they carry no information beyond their position.
fn is_keyword_marker(rule: Rule) -> bool {
    matches!(
        rule,
        Rule::if_kw
            | Rule::else_kw
            | Rule::while_kw
            | Rule::do_kw
            | Rule::for_kw
            | Rule::break_kw
            | Rule::continue_kw
            | Rule::return_kw
            | Rule::throw_kw
            | Rule::try_kw
            | Rule::catch_kw
            | Rule::finally_kw
            | Rule::function_kw
            | Rule::new_kw
    )
}

/// Child pairs with the keyword markers filtered out.
fn children<'a>(pair: Pair<'a, Rule>) -> impl Iterator<Item = Pair<'a, Rule>> {
    pair.into_inner().filter(|p| !is_keyword_marker(p.as_rule()))
}

/// "use strict" as the first statement of a program or function body.
fn leading_strict_directive(body: &[Statement]) -> bool {
    match body.first() {
        Some(Statement::Expression {
            expression: Expression::Literal {
                value: Literal::String(s),
                ..
            },
            ..
        }) => s == "use strict",
        _ => false,
    }
}

fn check_binding_name(
    name: &str,
    pair: &Pair<Rule>,
    source: &ScriptSource,
) -> Result<(), SyntaxError> {
    if RESERVED_BINDING_NAMES.contains(name) {
        return Err(syntax_error(
            format!("'{}' is a reserved word", name),
            pair,
            source,
        ));
    }
    Ok(())
}

// ── Statements ───────────────────────────────────────────────

fn build_statement(pair: Pair<Rule>, source: &ScriptSource) -> Result<Statement, SyntaxError> {
    let meta = meta_of(&pair, source);
    let inner = pair
        .into_inner()
        .next()
        .expect("statement rule always wraps one alternative");
    match inner.as_rule() {
        Rule::block_stmt => Ok(Statement::Block {
            body: build_statement_list(inner, source)?,
            meta,
        }),
        Rule::var_stmt | Rule::var_stmt_no_semi => build_var_statement(inner, meta, source),
        Rule::if_stmt => {
            let mut parts = children(inner);
            let test = build_expression(next_pair(&mut parts)?, source)?;
            let consequent = Box::new(build_statement(next_pair(&mut parts)?, source)?);
            let alternate = match parts.next() {
                Some(p) => Some(Box::new(build_statement(p, source)?)),
                None => None,
            };
            Ok(Statement::If {
                test,
                consequent,
                alternate,
                meta,
            })
        }
        Rule::while_stmt => {
            let mut parts = children(inner);
            let test = build_expression(next_pair(&mut parts)?, source)?;
            let body = Box::new(build_statement(next_pair(&mut parts)?, source)?);
            Ok(Statement::While { test, body, meta })
        }
        Rule::do_while_stmt => {
            let mut parts = children(inner);
            let body = Box::new(build_statement(next_pair(&mut parts)?, source)?);
            let test = build_expression(next_pair(&mut parts)?, source)?;
            Ok(Statement::DoWhile { body, test, meta })
        }
        Rule::for_stmt => build_for_statement(inner, meta, source),
        Rule::break_stmt => Ok(Statement::Break { meta }),
        Rule::continue_stmt => Ok(Statement::Continue { meta }),
        Rule::return_stmt => {
            let argument = match children(inner).next() {
                Some(p) => Some(build_expression(p, source)?),
                None => None,
            };
            Ok(Statement::Return { argument, meta })
        }
        Rule::throw_stmt => {
            let mut parts = children(inner);
            let argument = build_expression(next_pair(&mut parts)?, source)?;
            Ok(Statement::Throw { argument, meta })
        }
        Rule::try_stmt => build_try_statement(inner, meta, source),
        Rule::function_decl => {
            let def = build_function(inner, source)?;
            Ok(Statement::FunctionDeclaration(Box::new(def)))
        }
        Rule::empty_stmt => Ok(Statement::Empty { meta }),
        Rule::expr_stmt => {
            let mut parts = inner.into_inner();
            let expression = build_expression(next_pair(&mut parts)?, source)?;
            Ok(Statement::Expression { expression, meta })
        }
        r => Err(unexpected(r, &inner, source)),
    }
}

fn build_statement_list(
    pair: Pair<Rule>,
    source: &ScriptSource,
) -> Result<Vec<Statement>, SyntaxError> {
    let mut body = Vec::new();
    for p in pair.into_inner() {
        body.push(build_statement(p, source)?);
    }
    Ok(body)
}

fn build_var_statement(
    pair: Pair<Rule>,
    meta: Meta,
    source: &ScriptSource,
) -> Result<Statement, SyntaxError> {
    let mut parts = pair.into_inner();
    let kind_pair = next_pair(&mut parts)?;
    let kind = match kind_pair.as_str() {
        "var" => VariableKind::Var,
        "let" => VariableKind::Let,
        _ => VariableKind::Const,
    };
    let mut declarations = Vec::new();
    for decl in parts {
        let mut decl_parts = decl.into_inner();
        let name_pair = next_pair(&mut decl_parts)?;
        let name = name_pair.as_str().to_string();
        check_binding_name(&name, &name_pair, source)?;
        let init = match decl_parts.next() {
            Some(p) => Some(build_expression(p, source)?),
            None => None,
        };
        declarations.push(VariableDeclarator { name, init });
    }
    Ok(Statement::VariableDeclaration {
        kind,
        declarations,
        meta,
    })
}

fn build_for_statement(
    pair: Pair<Rule>,
    meta: Meta,
    source: &ScriptSource,
) -> Result<Statement, SyntaxError> {
    // Children arrive in source order; the grammar keeps the two `;`
    // separators silent, so optional sections are told apart by rule.
    let mut init = None;
    let mut test = None;
    let mut update = None;
    let mut body = None;

    let span = pair.as_span();
    for p in pair.into_inner() {
        match p.as_rule() {
            Rule::for_init => {
                let inner = p
                    .into_inner()
                    .next()
                    .expect("for_init wraps one alternative");
                init = Some(match inner.as_rule() {
                    Rule::var_stmt_no_semi => {
                        match build_var_statement(inner, meta, source)? {
                            Statement::VariableDeclaration {
                                kind, declarations, ..
                            } => ForInit::Declaration(kind, declarations),
                            _ => unreachable!("var statement builder output"),
                        }
                    }
                    _ => ForInit::Expression(build_expression(inner, source)?),
                });
            }
            Rule::for_test => {
                let mut inner = p.into_inner();
                test = Some(build_expression(next_pair(&mut inner)?, source)?);
            }
            Rule::for_update => {
                let mut inner = p.into_inner();
                update = Some(build_expression(next_pair(&mut inner)?, source)?);
            }
            Rule::statement => body = Some(Box::new(build_statement(p, source)?)),
            _ => {}
        }
    }
    let body = body.ok_or_else(|| SyntaxError {
        message: "for statement missing body".to_string(),
        line: source.line_of_offset(span.start()),
        path: source.path.clone(),
    })?;
    Ok(Statement::For {
        init,
        test,
        update,
        body,
        meta,
    })
}

fn build_try_statement(
    pair: Pair<Rule>,
    meta: Meta,
    source: &ScriptSource,
) -> Result<Statement, SyntaxError> {
    let span = pair.as_span();
    let mut parts = children(pair);
    let block = build_statement_list(next_pair(&mut parts)?, source)?;
    let mut handler = None;
    let mut finalizer = None;
    for p in parts {
        match p.as_rule() {
            Rule::catch_clause => {
                let mut c = children(p);
                let first = next_pair(&mut c)?;
                let (param, body_pair) = if first.as_rule() == Rule::identifier {
                    let name = first.as_str().to_string();
                    check_binding_name(&name, &first, source)?;
                    (Some(name), next_pair(&mut c)?)
                } else {
                    (None, first)
                };
                handler = Some(CatchClause {
                    param,
                    body: build_statement_list(body_pair, source)?,
                });
            }
            Rule::finally_clause => {
                let mut f = children(p);
                finalizer = Some(build_statement_list(next_pair(&mut f)?, source)?);
            }
            r => {
                return Err(SyntaxError {
                    message: format!("unexpected {:?} in try statement", r),
                    line: source.line_of_offset(span.start()),
                    path: source.path.clone(),
                })
            }
        }
    }
    if handler.is_none() && finalizer.is_none() {
        return Err(SyntaxError {
            message: "try statement requires a catch or finally clause".to_string(),
            line: source.line_of_offset(span.start()),
            path: source.path.clone(),
        });
    }
    Ok(Statement::Try {
        block,
        handler,
        finalizer,
        meta,
    })
}

fn build_function(pair: Pair<Rule>, source: &ScriptSource) -> Result<FunctionDef, SyntaxError> {
    let meta = meta_of(&pair, source);
    let mut name = None;
    let mut params = Vec::new();
    let mut body = Vec::new();
    for p in children(pair) {
        match p.as_rule() {
            Rule::identifier => {
                let n = p.as_str().to_string();
                check_binding_name(&n, &p, source)?;
                name = Some(n);
            }
            Rule::param_list => {
                for id in p.into_inner() {
                    let n = id.as_str().to_string();
                    check_binding_name(&n, &id, source)?;
                    params.push(n);
                }
            }
            Rule::function_body => {
                for s in p.into_inner() {
                    body.push(build_statement(s, source)?);
                }
            }
            r => return Err(unexpected(r, &p, source)),
        }
    }
    let strict = leading_strict_directive(&body);
    Ok(FunctionDef {
        name,
        params,
        body,
        strict,
        meta,
    })
}

// ── Expressions ──────────────────────────────────────────────

fn next_pair<'a>(
    parts: &mut impl Iterator<Item = Pair<'a, Rule>>,
) -> Result<Pair<'a, Rule>, SyntaxError> {
    parts.next().ok_or_else(|| SyntaxError {
        message: "malformed parse tree".to_string(),
        line: 0,
        path: String::new(),
    })
}

fn build_expression(pair: Pair<Rule>, source: &ScriptSource) -> Result<Expression, SyntaxError> {
    match pair.as_rule() {
        Rule::expression => {
            let mut parts = pair.into_inner();
            build_expression(next_pair(&mut parts)?, source)
        }
        Rule::assignment_expr => build_assignment(pair, source),
        Rule::conditional_expr => build_conditional(pair, source),
        Rule::logical_or_expr
        | Rule::logical_and_expr
        | Rule::bit_or_expr
        | Rule::bit_xor_expr
        | Rule::bit_and_expr
        | Rule::equality_expr
        | Rule::relational_expr
        | Rule::shift_expr
        | Rule::additive_expr
        | Rule::multiplicative_expr => build_binary_layer(pair, source),
        Rule::unary_expr => build_unary(pair, source),
        Rule::prefix_update => {
            let meta = meta_of(&pair, source);
            let mut parts = pair.into_inner();
            let op_pair = next_pair(&mut parts)?;
            let operator = if op_pair.as_str() == "++" {
                UpdateOperator::Increment
            } else {
                UpdateOperator::Decrement
            };
            let target_pair = next_pair(&mut parts)?;
            let target = build_expression(target_pair, source)?;
            require_assignable(&target, meta, source)?;
            Ok(Expression::Update {
                operator,
                prefix: true,
                target: Box::new(target),
                meta,
            })
        }
        Rule::postfix_expr => build_postfix(pair, source),
        Rule::call_expr => build_call_chain(pair, source),
        Rule::new_expr => build_new(pair, source),
        Rule::member_chain => build_member_chain(pair, source),
        Rule::primary_expr => {
            let mut parts = pair.into_inner();
            build_expression(next_pair(&mut parts)?, source)
        }
        Rule::paren_expr => {
            let mut parts = pair.into_inner();
            build_expression(next_pair(&mut parts)?, source)
        }
        Rule::literal => build_literal(pair, source),
        Rule::this_kw => Ok(Expression::This {
            meta: meta_of(&pair, source),
        }),
        Rule::identifier => Ok(Expression::Identifier {
            name: pair.as_str().to_string(),
            meta: meta_of(&pair, source),
        }),
        Rule::array_literal => {
            let meta = meta_of(&pair, source);
            let mut elements = Vec::new();
            for p in pair.into_inner() {
                elements.push(build_expression(p, source)?);
            }
            Ok(Expression::Array { elements, meta })
        }
        Rule::object_literal => build_object_literal(pair, source),
        Rule::function_expr => {
            let def = build_function(pair, source)?;
            Ok(Expression::Function(Box::new(def)))
        }
        r => Err(unexpected(r, &pair, source)),
    }
}

fn require_assignable(
    target: &Expression,
    meta: Meta,
    source: &ScriptSource,
) -> Result<(), SyntaxError> {
    match target {
        Expression::Identifier { .. } | Expression::Member { .. } => Ok(()),
        _ => Err(SyntaxError {
            message: "invalid assignment target".to_string(),
            line: meta.line,
            path: source.path.clone(),
        }),
    }
}

fn build_assignment(pair: Pair<Rule>, source: &ScriptSource) -> Result<Expression, SyntaxError> {
    let meta = meta_of(&pair, source);
    let mut parts = pair.into_inner();
    let left = build_expression(next_pair(&mut parts)?, source)?;
    match parts.next() {
        None => Ok(left),
        Some(op_pair) => {
            let operator = match op_pair.as_str() {
                "=" => AssignmentOperator::Assign,
                "+=" => AssignmentOperator::AddAssign,
                "-=" => AssignmentOperator::SubAssign,
                "*=" => AssignmentOperator::MulAssign,
                "/=" => AssignmentOperator::DivAssign,
                _ => AssignmentOperator::ModAssign,
            };
            require_assignable(&left, meta, source)?;
            let value = build_expression(next_pair(&mut parts)?, source)?;
            Ok(Expression::Assignment {
                operator,
                target: Box::new(left),
                value: Box::new(value),
                meta,
            })
        }
    }
}

fn build_conditional(pair: Pair<Rule>, source: &ScriptSource) -> Result<Expression, SyntaxError> {
    let meta = meta_of(&pair, source);
    let mut parts = pair.into_inner();
    let test = build_expression(next_pair(&mut parts)?, source)?;
    match parts.next() {
        None => Ok(test),
        Some(consequent_pair) => {
            let consequent = build_expression(consequent_pair, source)?;
            let alternate = build_expression(next_pair(&mut parts)?, source)?;
            Ok(Expression::Conditional {
                test: Box::new(test),
                consequent: Box::new(consequent),
                alternate: Box::new(alternate),
                meta,
            })
        }
    }
}

fn build_binary_layer(pair: Pair<Rule>, source: &ScriptSource) -> Result<Expression, SyntaxError> {
    let meta = meta_of(&pair, source);
    let mut parts = pair.into_inner();
    let mut left = build_expression(next_pair(&mut parts)?, source)?;
    while let Some(op_pair) = parts.next() {
        let right = build_expression(next_pair(&mut parts)?, source)?;
        left = match op_pair.as_rule() {
            Rule::or_op => Expression::Logical {
                operator: LogicalOperator::Or,
                left: Box::new(left),
                right: Box::new(right),
                meta,
            },
            Rule::and_op => Expression::Logical {
                operator: LogicalOperator::And,
                left: Box::new(left),
                right: Box::new(right),
                meta,
            },
            _ => Expression::Binary {
                operator: binary_operator(op_pair.as_str()),
                left: Box::new(left),
                right: Box::new(right),
                meta,
            },
        };
    }
    Ok(left)
}

fn binary_operator(text: &str) -> BinaryOperator {
    match text {
        "+" => BinaryOperator::Add,
        "-" => BinaryOperator::Sub,
        "*" => BinaryOperator::Mul,
        "/" => BinaryOperator::Div,
        "%" => BinaryOperator::Mod,
        "==" => BinaryOperator::Equal,
        "!=" => BinaryOperator::NotEqual,
        "===" => BinaryOperator::StrictEqual,
        "!==" => BinaryOperator::StrictNotEqual,
        "<" => BinaryOperator::LessThan,
        "<=" => BinaryOperator::LessEqual,
        ">" => BinaryOperator::GreaterThan,
        ">=" => BinaryOperator::GreaterEqual,
        "&" => BinaryOperator::BitAnd,
        "|" => BinaryOperator::BitOr,
        "^" => BinaryOperator::BitXor,
        "<<" => BinaryOperator::ShiftLeft,
        ">>" => BinaryOperator::ShiftRight,
        ">>>" => BinaryOperator::UShiftRight,
        "instanceof" => BinaryOperator::InstanceOf,
        _ => BinaryOperator::In,
    }
}

fn build_unary(pair: Pair<Rule>, source: &ScriptSource) -> Result<Expression, SyntaxError> {
    let meta = meta_of(&pair, source);
    let mut parts = pair.into_inner();
    let first = next_pair(&mut parts)?;
    match first.as_rule() {
        Rule::unary_op => {
            let operator = match first.as_str() {
                "-" => UnaryOperator::Minus,
                "+" => UnaryOperator::Plus,
                "!" => UnaryOperator::Not,
                "~" => UnaryOperator::BitNot,
                "typeof" => UnaryOperator::TypeOf,
                "void" => UnaryOperator::Void,
                _ => UnaryOperator::Delete,
            };
            let argument = build_expression(next_pair(&mut parts)?, source)?;
            Ok(Expression::Unary {
                operator,
                argument: Box::new(argument),
                meta,
            })
        }
        _ => build_expression(first, source),
    }
}

fn build_postfix(pair: Pair<Rule>, source: &ScriptSource) -> Result<Expression, SyntaxError> {
    let meta = meta_of(&pair, source);
    let mut parts = pair.into_inner();
    let target = build_expression(next_pair(&mut parts)?, source)?;
    match parts.next() {
        None => Ok(target),
        Some(op_pair) => {
            let operator = if op_pair.as_str() == "++" {
                UpdateOperator::Increment
            } else {
                UpdateOperator::Decrement
            };
            require_assignable(&target, meta, source)?;
            Ok(Expression::Update {
                operator,
                prefix: false,
                target: Box::new(target),
                meta,
            })
        }
    }
}

fn build_call_chain(pair: Pair<Rule>, source: &ScriptSource) -> Result<Expression, SyntaxError> {
    let mut parts = pair.into_inner();
    let mut expr = build_expression(next_pair(&mut parts)?, source)?;
    for tail in parts {
        expr = apply_call_tail(expr, tail, source)?;
    }
    Ok(expr)
}

fn apply_call_tail(
    base: Expression,
    tail: Pair<Rule>,
    source: &ScriptSource,
) -> Result<Expression, SyntaxError> {
    let meta = meta_of(&tail, source);
    let inner = tail
        .into_inner()
        .next()
        .expect("call_tail wraps one alternative");
    match inner.as_rule() {
        Rule::arguments => {
            let mut arguments = Vec::new();
            for a in inner.into_inner() {
                arguments.push(build_expression(a, source)?);
            }
            Ok(Expression::Call {
                callee: Box::new(base),
                arguments,
                meta,
            })
        }
        Rule::dot_member => {
            let mut p = inner.into_inner();
            let name = next_pair(&mut p)?.as_str().to_string();
            Ok(Expression::Member {
                object: Box::new(base),
                property: MemberKey::Name(name),
                meta,
            })
        }
        Rule::index_member => {
            let mut p = inner.into_inner();
            let key = build_expression(next_pair(&mut p)?, source)?;
            Ok(Expression::Member {
                object: Box::new(base),
                property: MemberKey::Computed(Box::new(key)),
                meta,
            })
        }
        r => Err(unexpected(r, &inner, source)),
    }
}

fn build_new(pair: Pair<Rule>, source: &ScriptSource) -> Result<Expression, SyntaxError> {
    let meta = meta_of(&pair, source);
    let mut parts = children(pair);
    let callee = build_member_chain(next_pair(&mut parts)?, source)?;
    let mut arguments = Vec::new();
    if let Some(args) = parts.next() {
        for a in args.into_inner() {
            arguments.push(build_expression(a, source)?);
        }
    }
    Ok(Expression::New {
        callee: Box::new(callee),
        arguments,
        meta,
    })
}

fn build_member_chain(pair: Pair<Rule>, source: &ScriptSource) -> Result<Expression, SyntaxError> {
    let mut parts = pair.into_inner();
    let mut expr = build_expression(next_pair(&mut parts)?, source)?;
    for tail in parts {
        let meta = meta_of(&tail, source);
        match tail.as_rule() {
            Rule::dot_member => {
                let mut p = tail.into_inner();
                let name = next_pair(&mut p)?.as_str().to_string();
                expr = Expression::Member {
                    object: Box::new(expr),
                    property: MemberKey::Name(name),
                    meta,
                };
            }
            Rule::index_member => {
                let mut p = tail.into_inner();
                let key = build_expression(next_pair(&mut p)?, source)?;
                expr = Expression::Member {
                    object: Box::new(expr),
                    property: MemberKey::Computed(Box::new(key)),
                    meta,
                };
            }
            r => return Err(unexpected(r, &tail, source)),
        }
    }
    Ok(expr)
}

fn build_object_literal(
    pair: Pair<Rule>,
    source: &ScriptSource,
) -> Result<Expression, SyntaxError> {
    let meta = meta_of(&pair, source);
    let mut properties = Vec::new();
    for prop in pair.into_inner() {
        let mut parts = prop.into_inner();
        let key_pair = next_pair(&mut parts)?;
        let key_inner = key_pair
            .into_inner()
            .next()
            .expect("property_key wraps one alternative");
        let key = match key_inner.as_rule() {
            Rule::identifier => key_inner.as_str().to_string(),
            Rule::string_literal => decode_string_literal(&key_inner),
            Rule::number_literal => match parse_number_literal(key_inner.as_str()) {
                Literal::Integer(i) => i.to_string(),
                Literal::Float(f) => f.to_string(),
                _ => key_inner.as_str().to_string(),
            },
            r => return Err(unexpected(r, &key_inner, source)),
        };
        let value = build_expression(next_pair(&mut parts)?, source)?;
        properties.push((key, value));
    }
    Ok(Expression::Object { properties, meta })
}

fn build_literal(pair: Pair<Rule>, source: &ScriptSource) -> Result<Expression, SyntaxError> {
    let meta = meta_of(&pair, source);
    let inner = pair
        .into_inner()
        .next()
        .expect("literal rule always wraps one alternative");
    let value = match inner.as_rule() {
        Rule::null_literal => Literal::Null,
        Rule::boolean_literal => Literal::Boolean(inner.as_str() == "true"),
        Rule::number_literal => parse_number_literal(inner.as_str()),
        Rule::string_literal => Literal::String(decode_string_literal(&inner)),
        r => return Err(unexpected(r, &inner, source)),
    };
    Ok(Expression::Literal { value, meta })
}

fn parse_number_literal(text: &str) -> Literal {
    if text.len() > 2 && (text.starts_with("0x") || text.starts_with("0X")) {
        match i64::from_str_radix(&text[2..], 16) {
            Ok(i) => Literal::Integer(i),
            Err(_) => Literal::Float(f64::INFINITY),
        }
    } else if !text.contains('.') && !text.contains('e') && !text.contains('E') {
        match text.parse::<i64>() {
            Ok(i) => Literal::Integer(i),
            Err(_) => Literal::Float(text.parse::<f64>().unwrap_or(f64::NAN)),
        }
    } else {
        Literal::Float(text.parse::<f64>().unwrap_or(f64::NAN))
    }
}

fn decode_string_literal(pair: &Pair<Rule>) -> String {
    // The pair wraps the inner (unquoted) rule; fall back to trimming the
    // quote characters when the tree shape is unexpected.
    let raw = match pair.clone().into_inner().next() {
        Some(inner) => inner.as_str().to_string(),
        None => {
            let s = pair.as_str();
            s[1..s.len().saturating_sub(1)].to_string()
        }
    };
    decode_escapes(&raw)
}

fn decode_escapes(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut chars = raw.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('t') => out.push('\t'),
            Some('r') => out.push('\r'),
            Some('b') => out.push('\u{0008}'),
            Some('f') => out.push('\u{000C}'),
            Some('v') => out.push('\u{000B}'),
            Some('0') => out.push('\0'),
            Some('u') => {
                let hex: String = chars.by_ref().take(4).collect();
                match u32::from_str_radix(&hex, 16).ok().and_then(char::from_u32) {
                    Some(u) => out.push(u),
                    None => {
                        out.push('u');
                        out.push_str(&hex);
                    }
                }
            }
            Some('x') => {
                let hex: String = chars.by_ref().take(2).collect();
                match u32::from_str_radix(&hex, 16).ok().and_then(char::from_u32) {
                    Some(u) => out.push(u),
                    None => {
                        out.push('x');
                        out.push_str(&hex);
                    }
                }
            }
            Some(other) => out.push(other),
            None => {}
        }
    }
    out
}
