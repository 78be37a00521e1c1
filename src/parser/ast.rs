//! AST types produced by the parser.
//!
//! Nodes carry a `Meta` with the source line so later stages can stamp
//! diagnostics and stack frames without keeping the source around.

#[derive(Debug, Clone, Copy)]
pub struct Meta {
    pub line: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VariableKind {
    Var,
    Let,
    Const,
}

#[derive(Debug)]
pub struct ProgramData {
    pub body: Vec<Statement>,
    pub strict: bool,
}

#[derive(Debug)]
pub struct FunctionDef {
    pub name: Option<String>,
    pub params: Vec<String>,
    pub body: Vec<Statement>,
    /// Set by a "use strict" directive in this body; nesting inherits
    /// strictness during resolution.
    pub strict: bool,
    pub meta: Meta,
}

#[derive(Debug)]
pub struct VariableDeclarator {
    pub name: String,
    pub init: Option<Expression>,
}

#[derive(Debug)]
pub struct CatchClause {
    pub param: Option<String>,
    pub body: Vec<Statement>,
}

#[derive(Debug)]
pub enum ForInit {
    Declaration(VariableKind, Vec<VariableDeclarator>),
    Expression(Expression),
}

#[derive(Debug)]
pub enum Statement {
    Expression {
        expression: Expression,
        meta: Meta,
    },
    VariableDeclaration {
        kind: VariableKind,
        declarations: Vec<VariableDeclarator>,
        meta: Meta,
    },
    FunctionDeclaration(Box<FunctionDef>),
    Block {
        body: Vec<Statement>,
        meta: Meta,
    },
    If {
        test: Expression,
        consequent: Box<Statement>,
        alternate: Option<Box<Statement>>,
        meta: Meta,
    },
    While {
        test: Expression,
        body: Box<Statement>,
        meta: Meta,
    },
    DoWhile {
        body: Box<Statement>,
        test: Expression,
        meta: Meta,
    },
    For {
        init: Option<ForInit>,
        test: Option<Expression>,
        update: Option<Expression>,
        body: Box<Statement>,
        meta: Meta,
    },
    Break {
        meta: Meta,
    },
    Continue {
        meta: Meta,
    },
    Return {
        argument: Option<Expression>,
        meta: Meta,
    },
    Throw {
        argument: Expression,
        meta: Meta,
    },
    Try {
        block: Vec<Statement>,
        handler: Option<CatchClause>,
        finalizer: Option<Vec<Statement>>,
        meta: Meta,
    },
    Empty {
        meta: Meta,
    },
}

impl Statement {
    pub fn meta(&self) -> Meta {
        match self {
            Statement::Expression { meta, .. }
            | Statement::VariableDeclaration { meta, .. }
            | Statement::Block { meta, .. }
            | Statement::If { meta, .. }
            | Statement::While { meta, .. }
            | Statement::DoWhile { meta, .. }
            | Statement::For { meta, .. }
            | Statement::Break { meta }
            | Statement::Continue { meta }
            | Statement::Return { meta, .. }
            | Statement::Throw { meta, .. }
            | Statement::Try { meta, .. }
            | Statement::Empty { meta } => *meta,
            Statement::FunctionDeclaration(f) => f.meta,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    Null,
    Boolean(bool),
    Integer(i64),
    Float(f64),
    String(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOperator {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Equal,
    NotEqual,
    StrictEqual,
    StrictNotEqual,
    LessThan,
    LessEqual,
    GreaterThan,
    GreaterEqual,
    BitAnd,
    BitOr,
    BitXor,
    ShiftLeft,
    ShiftRight,
    UShiftRight,
    InstanceOf,
    In,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogicalOperator {
    And,
    Or,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOperator {
    Minus,
    Plus,
    Not,
    BitNot,
    TypeOf,
    Void,
    Delete,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateOperator {
    Increment,
    Decrement,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssignmentOperator {
    Assign,
    AddAssign,
    SubAssign,
    MulAssign,
    DivAssign,
    ModAssign,
}

impl AssignmentOperator {
    /// The binary operator a compound assignment expands to.
    pub fn binary(self) -> Option<BinaryOperator> {
        match self {
            AssignmentOperator::Assign => None,
            AssignmentOperator::AddAssign => Some(BinaryOperator::Add),
            AssignmentOperator::SubAssign => Some(BinaryOperator::Sub),
            AssignmentOperator::MulAssign => Some(BinaryOperator::Mul),
            AssignmentOperator::DivAssign => Some(BinaryOperator::Div),
            AssignmentOperator::ModAssign => Some(BinaryOperator::Mod),
        }
    }
}

#[derive(Debug)]
pub enum MemberKey {
    Name(String),
    Computed(Box<Expression>),
}

#[derive(Debug)]
pub enum Expression {
    Literal {
        value: Literal,
        meta: Meta,
    },
    Identifier {
        name: String,
        meta: Meta,
    },
    This {
        meta: Meta,
    },
    Array {
        elements: Vec<Expression>,
        meta: Meta,
    },
    Object {
        properties: Vec<(String, Expression)>,
        meta: Meta,
    },
    Function(Box<FunctionDef>),
    Unary {
        operator: UnaryOperator,
        argument: Box<Expression>,
        meta: Meta,
    },
    Update {
        operator: UpdateOperator,
        prefix: bool,
        target: Box<Expression>,
        meta: Meta,
    },
    Binary {
        operator: BinaryOperator,
        left: Box<Expression>,
        right: Box<Expression>,
        meta: Meta,
    },
    Logical {
        operator: LogicalOperator,
        left: Box<Expression>,
        right: Box<Expression>,
        meta: Meta,
    },
    Assignment {
        operator: AssignmentOperator,
        target: Box<Expression>,
        value: Box<Expression>,
        meta: Meta,
    },
    Conditional {
        test: Box<Expression>,
        consequent: Box<Expression>,
        alternate: Box<Expression>,
        meta: Meta,
    },
    Call {
        callee: Box<Expression>,
        arguments: Vec<Expression>,
        meta: Meta,
    },
    New {
        callee: Box<Expression>,
        arguments: Vec<Expression>,
        meta: Meta,
    },
    Member {
        object: Box<Expression>,
        property: MemberKey,
        meta: Meta,
    },
}

impl Expression {
    pub fn meta(&self) -> Meta {
        match self {
            Expression::Literal { meta, .. }
            | Expression::Identifier { meta, .. }
            | Expression::This { meta }
            | Expression::Array { meta, .. }
            | Expression::Object { meta, .. }
            | Expression::Unary { meta, .. }
            | Expression::Update { meta, .. }
            | Expression::Binary { meta, .. }
            | Expression::Logical { meta, .. }
            | Expression::Assignment { meta, .. }
            | Expression::Conditional { meta, .. }
            | Expression::Call { meta, .. }
            | Expression::New { meta, .. }
            | Expression::Member { meta, .. } => *meta,
            Expression::Function(f) => f.meta,
        }
    }
}
