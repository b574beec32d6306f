//! Generator rewrite tests

use crate::harness::*;
use tsir_ast::ast::{BinaryOperator, Expression, Statement, YieldExpression};
use tsir_ast::{build, Span};
use tsir_ir::{Attribute, OpKind};
use tsir_types::Type;

fn yield_of(value: Expression) -> Statement {
    build::expr_stmt(Expression::Yield(YieldExpression {
        value: Some(Box::new(value)),
        delegate: false,
        span: Span::synthetic(),
    }))
}

/// `function* g(n) { let a=0; let b=1; for (let i=0; i<n; i=i+1) {
/// yield a; const t=a; a=b; b=t+b; } }`
fn fibonacci(b: &mut tsir_ast::build::AstBuilder) -> Vec<Statement> {
    let number = b.number_ty();
    let n = b.sym("n");
    let a = b.sym("a");
    let bb = b.sym("b");
    let t = b.sym("t");
    let i = b.sym("i");

    let body = vec![
        build::let_decl(a, None, Some(build::int(0))),
        build::let_decl(bb, None, Some(build::int(1))),
        Statement::For(tsir_ast::ast::ForStatement {
            init: Some(tsir_ast::ast::ForInit::VariableDecl(tsir_ast::ast::VariableDecl {
                kind: tsir_ast::ast::VariableKind::Let,
                declarations: vec![tsir_ast::ast::Declarator {
                    pattern: tsir_ast::ast::Pattern::Identifier(build::ident(i)),
                    type_annotation: None,
                    initializer: Some(build::int(0)),
                    span: Span::synthetic(),
                }],
                span: Span::synthetic(),
            })),
            test: Some(build::binary(
                BinaryOperator::Less,
                build::ident_expr(i),
                build::ident_expr(n),
            )),
            update: Some(build::assign(
                build::ident_expr(i),
                build::binary(BinaryOperator::Add, build::ident_expr(i), build::int(1)),
            )),
            body: Box::new(Statement::Block(build::block(vec![
                yield_of(build::ident_expr(a)),
                build::const_decl(t, None, build::ident_expr(a)),
                build::expr_stmt(build::assign(build::ident_expr(a), build::ident_expr(bb))),
                build::expr_stmt(build::assign(
                    build::ident_expr(bb),
                    build::binary(BinaryOperator::Add, build::ident_expr(t), build::ident_expr(bb)),
                )),
            ]))),
            span: Span::synthetic(),
        }),
    ];

    vec![b.generator("g", vec![build::param(n, Some(number))], None, body)]
}

#[test]
fn fibonacci_generator_produces_state_machine() {
    let out = compile_ok(fibonacci);
    let module = &out.module;

    let g = symbol_op(module, "g");
    let next = symbol_op(module, "g.next");

    // The outer function builds the state object and returns it.
    let g_kinds = kinds_under(module, g);
    assert!(g_kinds.contains(&OpKind::CreateTuple));
    assert!(g_kinds.contains(&OpKind::ReturnVal));

    // next() dispatches on the stored step and re-enters at the label.
    let next_kinds = kinds_under(module, next);
    assert!(next_kinds.contains(&OpKind::SwitchState));
    assert!(next_kinds.contains(&OpKind::StateLabel));
    assert!(next_kinds.contains(&OpKind::YieldReturnVal));
}

#[test]
fn generator_object_carries_step_and_next_fields() {
    let out = compile_ok(fibonacci);
    let module = &out.module;

    let g = symbol_op(module, "g");
    let fn_ty = module.op(g).attr("type").and_then(|a| a.as_type()).unwrap();
    let Type::Function { results, .. } = out.types.get(fn_ty) else {
        panic!("generator symbol is not a function");
    };
    let object_ty = results[0];
    let Type::Object(storage) = out.types.get(object_ty) else {
        panic!("generator does not return an object");
    };
    let fields = out.types.get(*storage).as_tuple_fields().unwrap();
    let names: Vec<&str> = fields.iter().filter_map(|f| f.id.as_name()).collect();
    assert!(names.contains(&"step"));
    assert!(names.contains(&"next"));
    // Parameters and loop locals are relocated into `this`.
    assert!(names.contains(&"n"));
    assert!(names.contains(&"a"));
    assert!(names.contains(&"b"));
}

#[test]
fn yield_states_are_monotonic() {
    let out = compile_ok(|b| {
        let body = vec![
            yield_of(build::int(1)),
            yield_of(build::int(2)),
            yield_of(build::int(3)),
        ];
        vec![b.generator("seq", vec![], None, body)]
    });
    let module = &out.module;
    let next = symbol_op(module, "seq.next");

    let mut states = Vec::new();
    for &region in &module.op(next).regions {
        for &block in &module.region(region).blocks {
            for op in module.block_ops(block) {
                if module.op(op).kind == OpKind::StateLabel {
                    if let Some(Attribute::Int(state)) = module.op(op).attr("state") {
                        states.push(*state);
                    }
                }
            }
        }
    }
    assert_eq!(states, vec![1, 2, 3]);
}

#[test]
fn yield_outside_generator_is_an_error() {
    let diags = compile_err(|b| {
        let body = vec![build::expr_stmt(Expression::Yield(YieldExpression {
            value: Some(Box::new(build::int(1))),
            delegate: false,
            span: Span::synthetic(),
        }))];
        vec![b.func("plain", vec![], None, body)]
    });
    assert!(diags.iter().any(|d| d.message.contains("yield")));
}
