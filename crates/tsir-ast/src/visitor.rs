//! Read-only AST visitor
//!
//! `Visitor` methods default to recursing via the matching `walk_*`
//! function; override the node kinds you care about. Function and arrow
//! bodies ARE descended into — override `visit_arrow_function` /
//! `visit_function_expr` with a no-op when a walk must stop at closure
//! boundaries.

use crate::ast::*;

pub trait Visitor: Sized {
    fn visit_statement(&mut self, stmt: &Statement) {
        walk_statement(self, stmt);
    }

    fn visit_expression(&mut self, expr: &Expression) {
        walk_expression(self, expr);
    }

    fn visit_identifier(&mut self, _id: &Identifier) {}

    fn visit_block_statement(&mut self, block: &BlockStatement) {
        walk_block_statement(self, block);
    }

    fn visit_arrow_function(&mut self, func: &ArrowFunction) {
        walk_arrow_function(self, func);
    }

    fn visit_function_expr(&mut self, func: &FunctionExpression) {
        walk_block_statement(self, &func.body);
    }

    fn visit_yield(&mut self, expr: &YieldExpression) {
        if let Some(value) = &expr.value {
            self.visit_expression(value);
        }
    }
}

pub fn walk_block_statement<V: Visitor>(v: &mut V, block: &BlockStatement) {
    for stmt in &block.statements {
        v.visit_statement(stmt);
    }
}

pub fn walk_arrow_function<V: Visitor>(v: &mut V, func: &ArrowFunction) {
    match &func.body {
        ArrowBody::Expression(expr) => v.visit_expression(expr),
        ArrowBody::Block(block) => v.visit_block_statement(block),
    }
}

pub fn walk_statement<V: Visitor>(v: &mut V, stmt: &Statement) {
    match stmt {
        Statement::VariableDecl(decl) => {
            for d in &decl.declarations {
                if let Some(init) = &d.initializer {
                    v.visit_expression(init);
                }
            }
        }
        Statement::FunctionDecl(func) => v.visit_block_statement(&func.body),
        Statement::ClassDecl(class) => {
            for member in &class.members {
                match member {
                    ClassMember::Field(field) => {
                        if let Some(init) = &field.initializer {
                            v.visit_expression(init);
                        }
                    }
                    ClassMember::Method(method) => {
                        if let Some(body) = &method.body {
                            v.visit_block_statement(body);
                        }
                    }
                }
            }
        }
        Statement::EnumDecl(decl) => {
            for member in &decl.members {
                if let Some(init) = &member.initializer {
                    v.visit_expression(init);
                }
            }
        }
        Statement::ModuleDecl(decl) => {
            for s in &decl.body {
                v.visit_statement(s);
            }
        }
        Statement::InterfaceDecl(_)
        | Statement::TypeAliasDecl(_)
        | Statement::ImportEquals(_)
        | Statement::Empty(_) => {}
        Statement::Expression(stmt) => v.visit_expression(&stmt.expression),
        Statement::If(stmt) => {
            v.visit_expression(&stmt.condition);
            v.visit_statement(&stmt.then_branch);
            if let Some(else_branch) = &stmt.else_branch {
                v.visit_statement(else_branch);
            }
        }
        Statement::Switch(stmt) => {
            v.visit_expression(&stmt.discriminant);
            for case in &stmt.cases {
                if let Some(test) = &case.test {
                    v.visit_expression(test);
                }
                for s in &case.consequent {
                    v.visit_statement(s);
                }
            }
        }
        Statement::While(stmt) => {
            v.visit_expression(&stmt.condition);
            v.visit_statement(&stmt.body);
        }
        Statement::DoWhile(stmt) => {
            v.visit_statement(&stmt.body);
            v.visit_expression(&stmt.condition);
        }
        Statement::For(stmt) => {
            match &stmt.init {
                Some(ForInit::VariableDecl(decl)) => {
                    for d in &decl.declarations {
                        if let Some(init) = &d.initializer {
                            v.visit_expression(init);
                        }
                    }
                }
                Some(ForInit::Expression(expr)) => v.visit_expression(expr),
                None => {}
            }
            if let Some(test) = &stmt.test {
                v.visit_expression(test);
            }
            if let Some(update) = &stmt.update {
                v.visit_expression(update);
            }
            v.visit_statement(&stmt.body);
        }
        Statement::ForIn(stmt) => {
            v.visit_expression(&stmt.object);
            v.visit_statement(&stmt.body);
        }
        Statement::ForOf(stmt) => {
            v.visit_expression(&stmt.iterable);
            v.visit_statement(&stmt.body);
        }
        Statement::Break(_) | Statement::Continue(_) => {}
        Statement::Return(stmt) => {
            if let Some(value) = &stmt.value {
                v.visit_expression(value);
            }
        }
        Statement::Throw(stmt) => v.visit_expression(&stmt.value),
        Statement::Try(stmt) => {
            v.visit_block_statement(&stmt.body);
            if let Some(catch) = &stmt.catch_clause {
                v.visit_block_statement(&catch.body);
            }
            if let Some(finally) = &stmt.finally_clause {
                v.visit_block_statement(finally);
            }
        }
        Statement::Labeled(stmt) => v.visit_statement(&stmt.body),
        Statement::Block(block) => v.visit_block_statement(block),
    }
}

pub fn walk_expression<V: Visitor>(v: &mut V, expr: &Expression) {
    match expr {
        Expression::NumberLiteral(_)
        | Expression::BigIntLiteral(_)
        | Expression::StringLiteral(_)
        | Expression::BooleanLiteral(_)
        | Expression::NullLiteral(_)
        | Expression::This(_)
        | Expression::Super(_) => {}
        Expression::Identifier(id) => v.visit_identifier(id),
        Expression::Template(t) => {
            for e in &t.expressions {
                v.visit_expression(e);
            }
        }
        Expression::TaggedTemplate(t) => {
            v.visit_expression(&t.tag);
            for e in &t.quasi.expressions {
                v.visit_expression(e);
            }
        }
        Expression::ArrayLiteral(a) => {
            for e in &a.elements {
                v.visit_expression(e);
            }
        }
        Expression::ObjectLiteral(o) => {
            for prop in &o.properties {
                match prop {
                    ObjectProperty::KeyValue { value, .. } => v.visit_expression(value),
                    ObjectProperty::Shorthand(id) => v.visit_identifier(id),
                    ObjectProperty::Method { function, .. } => v.visit_function_expr(function),
                }
            }
        }
        Expression::Member(m) => v.visit_expression(&m.object),
        Expression::Index(i) => {
            v.visit_expression(&i.object);
            v.visit_expression(&i.index);
        }
        Expression::Call(c) => {
            v.visit_expression(&c.callee);
            for arg in &c.arguments {
                v.visit_expression(arg);
            }
        }
        Expression::New(n) => {
            v.visit_expression(&n.callee);
            for arg in &n.arguments {
                v.visit_expression(arg);
            }
        }
        Expression::Binary(b) => {
            v.visit_expression(&b.left);
            v.visit_expression(&b.right);
        }
        Expression::Assignment(a) => {
            v.visit_expression(&a.left);
            v.visit_expression(&a.right);
        }
        Expression::Conditional(c) => {
            v.visit_expression(&c.condition);
            v.visit_expression(&c.then_expr);
            v.visit_expression(&c.else_expr);
        }
        Expression::Unary(u) => v.visit_expression(&u.operand),
        Expression::Update(u) => v.visit_expression(&u.operand),
        Expression::Arrow(func) => v.visit_arrow_function(func),
        Expression::FunctionExpr(func) => v.visit_function_expr(func),
        Expression::Paren(p) => v.visit_expression(&p.expression),
        Expression::AsCast(c) => v.visit_expression(&c.expression),
        Expression::Yield(y) => v.visit_yield(y),
        Expression::Await(a) => v.visit_expression(&a.value),
        Expression::Spread(s) => v.visit_expression(&s.expression),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::build::AstBuilder;

    struct Collector(Vec<crate::Symbol>);

    impl Visitor for Collector {
        fn visit_identifier(&mut self, id: &Identifier) {
            self.0.push(id.name);
        }
    }

    #[test]
    fn walk_collects_identifiers() {
        let mut b = AstBuilder::new();
        let x = b.ident_expr("x");
        let f = b.ident_expr("f");
        let y = b.ident_expr("y");
        let call = b.call(f, vec![y]);
        let expr = b.binary(BinaryOperator::Add, x, call);

        let mut collector = Collector(Vec::new());
        collector.visit_expression(&expr);
        let names: Vec<&str> = collector
            .0
            .iter()
            .map(|s| b.interner().resolve(*s))
            .collect();
        assert_eq!(names, vec!["x", "f", "y"]);
    }
}
