//! Programmatic AST construction
//!
//! Free functions build synthesized nodes (spans are synthetic); the
//! lowering core uses them to inject rewritten statements (generator
//! bodies, narrowed redeclarations). [`AstBuilder`] owns an [`Interner`]
//! on top of the free functions and is what embedders and the test
//! harness use to assemble whole source files.

use crate::ast::*;
use crate::{Interner, Span, Symbol};

// ============================================================================
// Free constructors (symbol-based, synthetic spans)
// ============================================================================

pub fn ident(name: Symbol) -> Identifier {
    Identifier {
        name,
        span: Span::synthetic(),
    }
}

pub fn ident_expr(name: Symbol) -> Expression {
    Expression::Identifier(ident(name))
}

pub fn number(value: f64) -> Expression {
    Expression::NumberLiteral(NumberLiteral {
        raw: format!("{}", value),
        value,
        span: Span::synthetic(),
    })
}

/// Integer literal: the raw form carries no fractional point, so the
/// lowering core gives it an integer type.
pub fn int(value: i64) -> Expression {
    Expression::NumberLiteral(NumberLiteral {
        raw: format!("{}", value),
        value: value as f64,
        span: Span::synthetic(),
    })
}

pub fn string(value: Symbol) -> Expression {
    Expression::StringLiteral(StringLiteral {
        value,
        span: Span::synthetic(),
    })
}

pub fn bool_lit(value: bool) -> Expression {
    Expression::BooleanLiteral(BooleanLiteral {
        value,
        span: Span::synthetic(),
    })
}

pub fn null() -> Expression {
    Expression::NullLiteral(Span::synthetic())
}

pub fn this() -> Expression {
    Expression::This(Span::synthetic())
}

pub fn member(object: Expression, property: Symbol) -> Expression {
    Expression::Member(MemberExpression {
        object: Box::new(object),
        property: ident(property),
        span: Span::synthetic(),
    })
}

pub fn index(object: Expression, idx: Expression) -> Expression {
    Expression::Index(IndexExpression {
        object: Box::new(object),
        index: Box::new(idx),
        span: Span::synthetic(),
    })
}

pub fn call(callee: Expression, arguments: Vec<Expression>) -> Expression {
    Expression::Call(CallExpression {
        callee: Box::new(callee),
        arguments,
        type_arguments: Vec::new(),
        span: Span::synthetic(),
    })
}

pub fn new_expr(callee: Expression, arguments: Vec<Expression>) -> Expression {
    Expression::New(NewExpression {
        callee: Box::new(callee),
        arguments,
        span: Span::synthetic(),
    })
}

pub fn binary(operator: BinaryOperator, left: Expression, right: Expression) -> Expression {
    Expression::Binary(BinaryExpression {
        operator,
        left: Box::new(left),
        right: Box::new(right),
        span: Span::synthetic(),
    })
}

pub fn unary(operator: UnaryOperator, operand: Expression) -> Expression {
    Expression::Unary(UnaryExpression {
        operator,
        operand: Box::new(operand),
        span: Span::synthetic(),
    })
}

pub fn assign(left: Expression, right: Expression) -> Expression {
    Expression::Assignment(AssignmentExpression {
        operator: AssignmentOperator::Assign,
        left: Box::new(left),
        right: Box::new(right),
        span: Span::synthetic(),
    })
}

pub fn conditional(condition: Expression, then_expr: Expression, else_expr: Expression) -> Expression {
    Expression::Conditional(ConditionalExpression {
        condition: Box::new(condition),
        then_expr: Box::new(then_expr),
        else_expr: Box::new(else_expr),
        span: Span::synthetic(),
    })
}

pub fn paren(expression: Expression) -> Expression {
    Expression::Paren(ParenExpression {
        expression: Box::new(expression),
        span: Span::synthetic(),
    })
}

pub fn array(elements: Vec<Expression>) -> Expression {
    Expression::ArrayLiteral(ArrayLiteral {
        elements,
        span: Span::synthetic(),
    })
}

pub fn object(properties: Vec<ObjectProperty>) -> Expression {
    Expression::ObjectLiteral(ObjectLiteral {
        properties,
        span: Span::synthetic(),
    })
}

pub fn key_value(key: Symbol, value: Expression) -> ObjectProperty {
    ObjectProperty::KeyValue {
        key: PropertyName::Ident(ident(key)),
        value,
    }
}

pub fn method_prop(name: Symbol, function: FunctionExpression) -> ObjectProperty {
    ObjectProperty::Method {
        name: PropertyName::Ident(ident(name)),
        function,
    }
}

pub fn function_expr(
    params: Vec<Parameter>,
    return_type: Option<TypeNode>,
    body: BlockStatement,
) -> FunctionExpression {
    FunctionExpression {
        name: None,
        params,
        return_type,
        body,
        is_async: false,
        is_generator: false,
        span: Span::synthetic(),
    }
}

pub fn param(name: Symbol, type_annotation: Option<TypeNode>) -> Parameter {
    Parameter {
        pattern: Pattern::Identifier(ident(name)),
        type_annotation,
        default_value: None,
        is_optional: false,
        is_rest: false,
        visibility: None,
        span: Span::synthetic(),
    }
}

pub fn block(statements: Vec<Statement>) -> BlockStatement {
    BlockStatement {
        statements,
        span: Span::synthetic(),
    }
}

pub fn expr_stmt(expression: Expression) -> Statement {
    Statement::Expression(ExpressionStatement {
        expression,
        span: Span::synthetic(),
    })
}

pub fn var_decl(
    kind: VariableKind,
    name: Symbol,
    type_annotation: Option<TypeNode>,
    initializer: Option<Expression>,
) -> Statement {
    Statement::VariableDecl(VariableDecl {
        kind,
        declarations: vec![Declarator {
            pattern: Pattern::Identifier(ident(name)),
            type_annotation,
            initializer,
            span: Span::synthetic(),
        }],
        span: Span::synthetic(),
    })
}

pub fn const_decl(name: Symbol, type_annotation: Option<TypeNode>, initializer: Expression) -> Statement {
    var_decl(VariableKind::Const, name, type_annotation, Some(initializer))
}

pub fn let_decl(name: Symbol, type_annotation: Option<TypeNode>, initializer: Option<Expression>) -> Statement {
    var_decl(VariableKind::Let, name, type_annotation, initializer)
}

pub fn return_stmt(value: Option<Expression>) -> Statement {
    Statement::Return(ReturnStatement {
        value,
        span: Span::synthetic(),
    })
}

pub fn if_stmt(condition: Expression, then_branch: Statement, else_branch: Option<Statement>) -> Statement {
    Statement::If(IfStatement {
        condition,
        then_branch: Box::new(then_branch),
        else_branch: else_branch.map(Box::new),
        span: Span::synthetic(),
    })
}

pub fn while_stmt(condition: Expression, body: Statement) -> Statement {
    Statement::While(WhileStatement {
        condition,
        body: Box::new(body),
        span: Span::synthetic(),
    })
}

pub fn labeled(label: Symbol, body: Statement) -> Statement {
    Statement::Labeled(LabeledStatement {
        label: ident(label),
        body: Box::new(body),
        span: Span::synthetic(),
    })
}

pub fn type_ref(segments: Vec<Symbol>) -> TypeNode {
    TypeNode::Reference(TypeReferenceNode {
        segments,
        type_args: Vec::new(),
        span: Span::synthetic(),
    })
}

// ============================================================================
// AstBuilder: name-based construction over an owned interner
// ============================================================================

/// Builds AST nodes from string names; owns the interner the resulting
/// tree is resolved against.
#[derive(Default)]
pub struct AstBuilder {
    interner: Interner,
}

impl AstBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn interner(&self) -> &Interner {
        &self.interner
    }

    pub fn interner_mut(&mut self) -> &mut Interner {
        &mut self.interner
    }

    /// Consume the builder, yielding the interner for the lowering core.
    pub fn into_interner(self) -> Interner {
        self.interner
    }

    pub fn sym(&mut self, name: &str) -> Symbol {
        self.interner.intern(name)
    }

    pub fn ident(&mut self, name: &str) -> Identifier {
        let sym = self.sym(name);
        ident(sym)
    }

    pub fn ident_expr(&mut self, name: &str) -> Expression {
        let sym = self.sym(name);
        ident_expr(sym)
    }

    pub fn number(&self, value: f64) -> Expression {
        number(value)
    }

    pub fn int(&self, value: i64) -> Expression {
        int(value)
    }

    pub fn string(&mut self, value: &str) -> Expression {
        let sym = self.sym(value);
        string(sym)
    }

    pub fn bool_lit(&self, value: bool) -> Expression {
        bool_lit(value)
    }

    pub fn member(&mut self, object: Expression, property: &str) -> Expression {
        let sym = self.sym(property);
        member(object, sym)
    }

    pub fn call(&self, callee: Expression, arguments: Vec<Expression>) -> Expression {
        call(callee, arguments)
    }

    pub fn call_named(&mut self, callee: &str, arguments: Vec<Expression>) -> Expression {
        let callee = self.ident_expr(callee);
        call(callee, arguments)
    }

    pub fn new_expr(&mut self, class: &str, arguments: Vec<Expression>) -> Expression {
        let callee = self.ident_expr(class);
        new_expr(callee, arguments)
    }

    pub fn binary(&self, op: BinaryOperator, left: Expression, right: Expression) -> Expression {
        binary(op, left, right)
    }

    pub fn assign(&self, left: Expression, right: Expression) -> Expression {
        assign(left, right)
    }

    pub fn param(&mut self, name: &str, ty: Option<TypeNode>) -> Parameter {
        let sym = self.sym(name);
        param(sym, ty)
    }

    pub fn ty(&mut self, name: &str) -> TypeNode {
        let sym = self.sym(name);
        type_ref(vec![sym])
    }

    /// `number` type annotation.
    pub fn number_ty(&mut self) -> TypeNode {
        self.ty("number")
    }

    pub fn string_ty(&mut self) -> TypeNode {
        self.ty("string")
    }

    pub fn boolean_ty(&mut self) -> TypeNode {
        self.ty("boolean")
    }

    pub fn union_ty(&self, members: Vec<TypeNode>) -> TypeNode {
        TypeNode::Union(members, Span::synthetic())
    }

    pub fn object_ty(&mut self, members: Vec<(&str, TypeNode)>) -> TypeNode {
        let members = members
            .into_iter()
            .map(|(name, ty)| ObjectTypeMember {
                name: self.interner.intern(name),
                ty,
                optional: false,
                span: Span::synthetic(),
            })
            .collect();
        TypeNode::Object(members, Span::synthetic())
    }

    pub fn string_literal_ty(&mut self, value: &str) -> TypeNode {
        TypeNode::Literal(LiteralTypeNode {
            value: LiteralTypeValue::String(self.sym(value)),
            span: Span::synthetic(),
        })
    }

    pub fn let_decl(&mut self, name: &str, ty: Option<TypeNode>, init: Option<Expression>) -> Statement {
        let sym = self.sym(name);
        let_decl(sym, ty, init)
    }

    pub fn const_decl(&mut self, name: &str, ty: Option<TypeNode>, init: Expression) -> Statement {
        let sym = self.sym(name);
        const_decl(sym, ty, init)
    }

    pub fn func(
        &mut self,
        name: &str,
        params: Vec<Parameter>,
        return_type: Option<TypeNode>,
        body: Vec<Statement>,
    ) -> Statement {
        Statement::FunctionDecl(FunctionDecl {
            name: self.ident(name),
            params,
            return_type,
            body: block(body),
            is_async: false,
            is_generator: false,
            span: Span::synthetic(),
        })
    }

    pub fn generator(
        &mut self,
        name: &str,
        params: Vec<Parameter>,
        return_type: Option<TypeNode>,
        body: Vec<Statement>,
    ) -> Statement {
        match self.func(name, params, return_type, body) {
            Statement::FunctionDecl(mut decl) => {
                decl.is_generator = true;
                Statement::FunctionDecl(decl)
            }
            _ => unreachable!(),
        }
    }

    pub fn arrow(&self, params: Vec<Parameter>, body: Expression) -> Expression {
        Expression::Arrow(ArrowFunction {
            params,
            return_type: None,
            body: ArrowBody::Expression(Box::new(body)),
            is_async: false,
            span: Span::synthetic(),
        })
    }

    pub fn arrow_block(&self, params: Vec<Parameter>, body: Vec<Statement>) -> Expression {
        Expression::Arrow(ArrowFunction {
            params,
            return_type: None,
            body: ArrowBody::Block(block(body)),
            is_async: false,
            span: Span::synthetic(),
        })
    }

    pub fn field(&mut self, name: &str, ty: Option<TypeNode>, init: Option<Expression>) -> ClassMember {
        ClassMember::Field(FieldDecl {
            name: PropertyName::Ident(self.ident(name)),
            type_annotation: ty,
            initializer: init,
            is_static: false,
            is_readonly: false,
            visibility: Visibility::Public,
            span: Span::synthetic(),
        })
    }

    pub fn method(
        &mut self,
        name: &str,
        params: Vec<Parameter>,
        return_type: Option<TypeNode>,
        body: Vec<Statement>,
    ) -> ClassMember {
        ClassMember::Method(MethodDecl {
            name: PropertyName::Ident(self.ident(name)),
            kind: MethodKind::Method,
            params,
            return_type,
            body: Some(block(body)),
            is_static: false,
            is_abstract: false,
            is_async: false,
            is_generator: false,
            span: Span::synthetic(),
        })
    }

    pub fn abstract_method(
        &mut self,
        name: &str,
        params: Vec<Parameter>,
        return_type: Option<TypeNode>,
    ) -> ClassMember {
        ClassMember::Method(MethodDecl {
            name: PropertyName::Ident(self.ident(name)),
            kind: MethodKind::Method,
            params,
            return_type,
            body: None,
            is_static: false,
            is_abstract: true,
            is_async: false,
            is_generator: false,
            span: Span::synthetic(),
        })
    }

    pub fn ctor(&mut self, params: Vec<Parameter>, body: Vec<Statement>) -> ClassMember {
        ClassMember::Method(MethodDecl {
            name: PropertyName::Ident(self.ident("constructor")),
            kind: MethodKind::Constructor,
            params,
            return_type: None,
            body: Some(block(body)),
            is_static: false,
            is_abstract: false,
            is_async: false,
            is_generator: false,
            span: Span::synthetic(),
        })
    }

    pub fn class(&mut self, name: &str, members: Vec<ClassMember>) -> Statement {
        Statement::ClassDecl(ClassDecl {
            name: self.ident(name),
            is_abstract: false,
            extends: Vec::new(),
            implements: Vec::new(),
            members,
            span: Span::synthetic(),
        })
    }

    pub fn class_full(
        &mut self,
        name: &str,
        is_abstract: bool,
        extends: Vec<TypeNode>,
        implements: Vec<TypeNode>,
        members: Vec<ClassMember>,
    ) -> Statement {
        Statement::ClassDecl(ClassDecl {
            name: self.ident(name),
            is_abstract,
            extends,
            implements,
            members,
            span: Span::synthetic(),
        })
    }

    pub fn interface(&mut self, name: &str, members: Vec<InterfaceMember>) -> Statement {
        Statement::InterfaceDecl(InterfaceDecl {
            name: self.ident(name),
            extends: Vec::new(),
            members,
            span: Span::synthetic(),
        })
    }

    pub fn iface_field(&mut self, name: &str, ty: TypeNode) -> InterfaceMember {
        InterfaceMember {
            name: self.sym(name),
            ty,
            is_method: false,
            optional: false,
            span: Span::synthetic(),
        }
    }

    pub fn iface_method(
        &mut self,
        name: &str,
        params: Vec<Parameter>,
        return_type: TypeNode,
        optional: bool,
    ) -> InterfaceMember {
        InterfaceMember {
            name: self.sym(name),
            ty: TypeNode::Function(FunctionTypeNode {
                params,
                return_type: Box::new(return_type),
                span: Span::synthetic(),
            }),
            is_method: true,
            optional,
            span: Span::synthetic(),
        }
    }

    pub fn enum_decl(&mut self, name: &str, members: Vec<(&str, Option<Expression>)>) -> Statement {
        let members = members
            .into_iter()
            .map(|(n, init)| EnumMemberDecl {
                name: ident(self.interner.intern(n)),
                initializer: init,
                span: Span::synthetic(),
            })
            .collect();
        Statement::EnumDecl(EnumDecl {
            name: self.ident(name),
            members,
            span: Span::synthetic(),
        })
    }

    pub fn type_alias(&mut self, name: &str, ty: TypeNode) -> Statement {
        Statement::TypeAliasDecl(TypeAliasDecl {
            name: self.ident(name),
            type_params: Vec::new(),
            ty,
            span: Span::synthetic(),
        })
    }

    pub fn ret(&self, value: Option<Expression>) -> Statement {
        return_stmt(value)
    }

    pub fn expr_stmt(&self, expression: Expression) -> Statement {
        expr_stmt(expression)
    }

    pub fn if_stmt(
        &self,
        condition: Expression,
        then_branch: Vec<Statement>,
        else_branch: Option<Vec<Statement>>,
    ) -> Statement {
        if_stmt(
            condition,
            Statement::Block(block(then_branch)),
            else_branch.map(|stmts| Statement::Block(block(stmts))),
        )
    }

    pub fn for_stmt(
        &self,
        init: Option<ForInit>,
        test: Option<Expression>,
        update: Option<Expression>,
        body: Vec<Statement>,
    ) -> Statement {
        Statement::For(ForStatement {
            init,
            test,
            update,
            body: Box::new(Statement::Block(block(body))),
            span: Span::synthetic(),
        })
    }

    pub fn source_file(&self, statements: Vec<Statement>) -> SourceFile {
        SourceFile {
            statements,
            span: Span::synthetic(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_function_with_body() {
        let mut b = AstBuilder::new();
        let n = b.number_ty();
        let p = b.param("x", Some(n));
        let x = b.ident_expr("x");
        let body = vec![b.ret(Some(binary(BinaryOperator::Mul, x.clone(), x)))];
        let stmt = b.func("sq", vec![p], None, body);
        match stmt {
            Statement::FunctionDecl(decl) => {
                assert_eq!(b.interner().resolve(decl.name.name), "sq");
                assert_eq!(decl.params.len(), 1);
                assert_eq!(decl.body.statements.len(), 1);
            }
            _ => panic!("expected function declaration"),
        }
    }

    #[test]
    fn int_literal_is_integral() {
        match int(5) {
            Expression::NumberLiteral(lit) => assert!(lit.is_integral()),
            _ => unreachable!(),
        }
        match number(1.5) {
            Expression::NumberLiteral(lit) => assert!(!lit.is_integral()),
            _ => unreachable!(),
        }
    }
}
