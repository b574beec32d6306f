//! Expression AST nodes

use super::{Identifier, Parameter, Pattern, TypeNode};
use crate::{Span, Symbol};

/// Any expression.
#[derive(Debug, Clone, PartialEq)]
pub enum Expression {
    /// Numeric literal: 42, 3.14, 0xFF
    NumberLiteral(NumberLiteral),

    /// Bigint literal: 42n
    BigIntLiteral(BigIntLiteral),

    /// String literal: "hello"
    StringLiteral(StringLiteral),

    /// Boolean literal: true, false
    BooleanLiteral(BooleanLiteral),

    /// Null literal
    NullLiteral(Span),

    /// Identifier reference
    Identifier(Identifier),

    /// `this`
    This(Span),

    /// `super`
    Super(Span),

    /// Template literal: `a${b}c`
    Template(TemplateLiteral),

    /// Tagged template: tag`a${b}`
    TaggedTemplate(TaggedTemplate),

    /// Array literal: [1, 2, ...rest]
    ArrayLiteral(ArrayLiteral),

    /// Object literal: { a: 1, b() {} }
    ObjectLiteral(ObjectLiteral),

    /// Property access: a.b
    Member(MemberExpression),

    /// Element access: a[i]
    Index(IndexExpression),

    /// Function or method call
    Call(CallExpression),

    /// Constructor call: new C(...)
    New(NewExpression),

    /// Binary operator (includes logical and relational operators)
    Binary(BinaryExpression),

    /// Assignment (simple or compound)
    Assignment(AssignmentExpression),

    /// Ternary conditional: c ? t : e
    Conditional(ConditionalExpression),

    /// Prefix unary operator: -x, !x, ~x, typeof x, void x, delete x
    Unary(UnaryExpression),

    /// Prefix/postfix increment or decrement
    Update(UpdateExpression),

    /// Arrow function
    Arrow(ArrowFunction),

    /// Function expression
    FunctionExpr(FunctionExpression),

    /// Parenthesized expression
    Paren(ParenExpression),

    /// Type assertion: x as T
    AsCast(AsCastExpression),

    /// yield / yield*
    Yield(YieldExpression),

    /// await
    Await(AwaitExpression),

    /// Spread element: ...xs (only valid inside array literals and calls)
    Spread(SpreadElement),
}

impl Expression {
    pub fn span(&self) -> Span {
        match self {
            Expression::NumberLiteral(e) => e.span,
            Expression::BigIntLiteral(e) => e.span,
            Expression::StringLiteral(e) => e.span,
            Expression::BooleanLiteral(e) => e.span,
            Expression::NullLiteral(span) => *span,
            Expression::Identifier(e) => e.span,
            Expression::This(span) => *span,
            Expression::Super(span) => *span,
            Expression::Template(e) => e.span,
            Expression::TaggedTemplate(e) => e.span,
            Expression::ArrayLiteral(e) => e.span,
            Expression::ObjectLiteral(e) => e.span,
            Expression::Member(e) => e.span,
            Expression::Index(e) => e.span,
            Expression::Call(e) => e.span,
            Expression::New(e) => e.span,
            Expression::Binary(e) => e.span,
            Expression::Assignment(e) => e.span,
            Expression::Conditional(e) => e.span,
            Expression::Unary(e) => e.span,
            Expression::Update(e) => e.span,
            Expression::Arrow(e) => e.span,
            Expression::FunctionExpr(e) => e.span,
            Expression::Paren(e) => e.span,
            Expression::AsCast(e) => e.span,
            Expression::Yield(e) => e.span,
            Expression::Await(e) => e.span,
            Expression::Spread(e) => e.span,
        }
    }

    /// Check if this expression is a literal.
    pub fn is_literal(&self) -> bool {
        matches!(
            self,
            Expression::NumberLiteral(_)
                | Expression::BigIntLiteral(_)
                | Expression::StringLiteral(_)
                | Expression::BooleanLiteral(_)
                | Expression::NullLiteral(_)
        )
    }
}

/// Numeric literal. `raw` preserves the textual form: the lowering core
/// picks an integer or floating type from it.
#[derive(Debug, Clone, PartialEq)]
pub struct NumberLiteral {
    pub raw: String,
    pub value: f64,
    pub span: Span,
}

impl NumberLiteral {
    /// True when the textual form has no fractional point or exponent.
    pub fn is_integral(&self) -> bool {
        !self.raw.contains(['.', 'e', 'E']) || self.raw.starts_with("0x") || self.raw.starts_with("0b")
    }
}

/// Bigint literal: 42n
#[derive(Debug, Clone, PartialEq)]
pub struct BigIntLiteral {
    pub raw: String,
    pub span: Span,
}

/// String literal
#[derive(Debug, Clone, PartialEq)]
pub struct StringLiteral {
    pub value: Symbol,
    pub span: Span,
}

/// Boolean literal
#[derive(Debug, Clone, PartialEq)]
pub struct BooleanLiteral {
    pub value: bool,
    pub span: Span,
}

/// Template literal: a sequence of text chunks interleaved with expressions.
/// `quasis.len() == expressions.len() + 1`.
#[derive(Debug, Clone, PartialEq)]
pub struct TemplateLiteral {
    pub quasis: Vec<Symbol>,
    pub expressions: Vec<Expression>,
    pub span: Span,
}

/// Tagged template: tag`...`
#[derive(Debug, Clone, PartialEq)]
pub struct TaggedTemplate {
    pub tag: Box<Expression>,
    pub quasi: TemplateLiteral,
    pub span: Span,
}

/// Array literal
#[derive(Debug, Clone, PartialEq)]
pub struct ArrayLiteral {
    pub elements: Vec<Expression>,
    pub span: Span,
}

/// Object literal
#[derive(Debug, Clone, PartialEq)]
pub struct ObjectLiteral {
    pub properties: Vec<ObjectProperty>,
    pub span: Span,
}

/// One property of an object literal.
#[derive(Debug, Clone, PartialEq)]
pub enum ObjectProperty {
    /// key: value
    KeyValue {
        key: PropertyName,
        value: Expression,
    },
    /// Shorthand { x }
    Shorthand(Identifier),
    /// Method { m() { ... } }
    Method {
        name: PropertyName,
        function: FunctionExpression,
    },
}

/// A property key: identifier, string, or numeric ordinal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PropertyName {
    Ident(Identifier),
    String(Symbol, Span),
    Number(i64, Span),
}

impl PropertyName {
    pub fn span(&self) -> Span {
        match self {
            PropertyName::Ident(id) => id.span,
            PropertyName::String(_, span) => *span,
            PropertyName::Number(_, span) => *span,
        }
    }
}

/// Property access: object.property
#[derive(Debug, Clone, PartialEq)]
pub struct MemberExpression {
    pub object: Box<Expression>,
    pub property: Identifier,
    pub span: Span,
}

/// Element access: object[index]
#[derive(Debug, Clone, PartialEq)]
pub struct IndexExpression {
    pub object: Box<Expression>,
    pub index: Box<Expression>,
    pub span: Span,
}

/// Call: callee(args)
#[derive(Debug, Clone, PartialEq)]
pub struct CallExpression {
    pub callee: Box<Expression>,
    pub arguments: Vec<Expression>,
    pub type_arguments: Vec<TypeNode>,
    pub span: Span,
}

/// Constructor call: new callee(args)
#[derive(Debug, Clone, PartialEq)]
pub struct NewExpression {
    pub callee: Box<Expression>,
    pub arguments: Vec<Expression>,
    pub span: Span,
}

/// Binary operators, including logical and relational forms.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOperator {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    Exp,
    ShiftLeft,
    ShiftRight,
    ShiftRightUnsigned,
    BitAnd,
    BitOr,
    BitXor,
    Eq,
    StrictEq,
    NotEq,
    StrictNotEq,
    Less,
    LessEq,
    Greater,
    GreaterEq,
    LogicalAnd,
    LogicalOr,
    NullishCoalesce,
    In,
    Instanceof,
}

impl BinaryOperator {
    /// Short-circuit operators lower to branches, not a single op.
    pub fn is_short_circuit(self) -> bool {
        matches!(
            self,
            BinaryOperator::LogicalAnd
                | BinaryOperator::LogicalOr
                | BinaryOperator::NullishCoalesce
        )
    }

    pub fn is_relational(self) -> bool {
        matches!(
            self,
            BinaryOperator::Eq
                | BinaryOperator::StrictEq
                | BinaryOperator::NotEq
                | BinaryOperator::StrictNotEq
                | BinaryOperator::Less
                | BinaryOperator::LessEq
                | BinaryOperator::Greater
                | BinaryOperator::GreaterEq
        )
    }

    pub fn is_shift(self) -> bool {
        matches!(
            self,
            BinaryOperator::ShiftLeft
                | BinaryOperator::ShiftRight
                | BinaryOperator::ShiftRightUnsigned
        )
    }
}

/// Binary expression
#[derive(Debug, Clone, PartialEq)]
pub struct BinaryExpression {
    pub operator: BinaryOperator,
    pub left: Box<Expression>,
    pub right: Box<Expression>,
    pub span: Span,
}

/// Assignment operators
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssignmentOperator {
    Assign,
    AddAssign,
    SubAssign,
    MulAssign,
    DivAssign,
    RemAssign,
    ShiftLeftAssign,
    ShiftRightAssign,
    BitAndAssign,
    BitOrAssign,
    BitXorAssign,
}

impl AssignmentOperator {
    /// The underlying binary operator of a compound assignment.
    pub fn binary_operator(self) -> Option<BinaryOperator> {
        match self {
            AssignmentOperator::Assign => None,
            AssignmentOperator::AddAssign => Some(BinaryOperator::Add),
            AssignmentOperator::SubAssign => Some(BinaryOperator::Sub),
            AssignmentOperator::MulAssign => Some(BinaryOperator::Mul),
            AssignmentOperator::DivAssign => Some(BinaryOperator::Div),
            AssignmentOperator::RemAssign => Some(BinaryOperator::Rem),
            AssignmentOperator::ShiftLeftAssign => Some(BinaryOperator::ShiftLeft),
            AssignmentOperator::ShiftRightAssign => Some(BinaryOperator::ShiftRight),
            AssignmentOperator::BitAndAssign => Some(BinaryOperator::BitAnd),
            AssignmentOperator::BitOrAssign => Some(BinaryOperator::BitOr),
            AssignmentOperator::BitXorAssign => Some(BinaryOperator::BitXor),
        }
    }
}

/// Assignment expression
#[derive(Debug, Clone, PartialEq)]
pub struct AssignmentExpression {
    pub operator: AssignmentOperator,
    pub left: Box<Expression>,
    pub right: Box<Expression>,
    pub span: Span,
}

/// Ternary conditional
#[derive(Debug, Clone, PartialEq)]
pub struct ConditionalExpression {
    pub condition: Box<Expression>,
    pub then_expr: Box<Expression>,
    pub else_expr: Box<Expression>,
    pub span: Span,
}

/// Prefix unary operators
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

/// Unary expression
#[derive(Debug, Clone, PartialEq)]
pub struct UnaryExpression {
    pub operator: UnaryOperator,
    pub operand: Box<Expression>,
    pub span: Span,
}

/// ++ / --
#[derive(Debug, Clone, PartialEq)]
pub struct UpdateExpression {
    pub increment: bool,
    pub prefix: bool,
    pub operand: Box<Expression>,
    pub span: Span,
}

/// Arrow function body: expression or block.
#[derive(Debug, Clone, PartialEq)]
pub enum ArrowBody {
    Expression(Box<Expression>),
    Block(super::BlockStatement),
}

/// Arrow function
#[derive(Debug, Clone, PartialEq)]
pub struct ArrowFunction {
    pub params: Vec<Parameter>,
    pub return_type: Option<TypeNode>,
    pub body: ArrowBody,
    pub is_async: bool,
    pub span: Span,
}

/// Function expression (named or anonymous)
#[derive(Debug, Clone, PartialEq)]
pub struct FunctionExpression {
    pub name: Option<Identifier>,
    pub params: Vec<Parameter>,
    pub return_type: Option<TypeNode>,
    pub body: super::BlockStatement,
    pub is_async: bool,
    pub is_generator: bool,
    pub span: Span,
}

/// Parenthesized expression
#[derive(Debug, Clone, PartialEq)]
pub struct ParenExpression {
    pub expression: Box<Expression>,
    pub span: Span,
}

/// Type assertion: expr as T (or <T>expr)
#[derive(Debug, Clone, PartialEq)]
pub struct AsCastExpression {
    pub expression: Box<Expression>,
    pub target: TypeNode,
    pub span: Span,
}

/// yield / yield* expression
#[derive(Debug, Clone, PartialEq)]
pub struct YieldExpression {
    pub value: Option<Box<Expression>>,
    pub delegate: bool,
    pub span: Span,
}

/// await expression
#[derive(Debug, Clone, PartialEq)]
pub struct AwaitExpression {
    pub value: Box<Expression>,
    pub span: Span,
}

/// Spread element
#[derive(Debug, Clone, PartialEq)]
pub struct SpreadElement {
    pub expression: Box<Expression>,
    pub span: Span,
}

/// Destructuring or identifier binding used by declarations and patterns.
#[derive(Debug, Clone, PartialEq)]
pub struct Declarator {
    pub pattern: Pattern,
    pub type_annotation: Option<TypeNode>,
    pub initializer: Option<Expression>,
    pub span: Span,
}
