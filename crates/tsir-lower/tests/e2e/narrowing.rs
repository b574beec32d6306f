//! Safe-cast narrowing tests

use crate::harness::*;
use tsir_ast::ast::{BinaryOperator, Expression, Statement, UnaryExpression, UnaryOperator};
use tsir_ast::{build, Span};
use tsir_types::Type;

fn typeof_of(expr: Expression) -> Expression {
    Expression::Unary(UnaryExpression {
        operator: UnaryOperator::TypeOf,
        operand: Box::new(expr),
        span: Span::synthetic(),
    })
}

/// `type S = {k:"a"; va:number} | {k:"b"; vb:string};`
fn discriminated_alias(b: &mut tsir_ast::build::AstBuilder) -> Statement {
    let ka = b.string_literal_ty("a");
    let number = b.number_ty();
    let arm_a = b.object_ty(vec![("k", ka), ("va", number)]);
    let kb = b.string_literal_ty("b");
    let string = b.string_ty();
    let arm_b = b.object_ty(vec![("k", kb), ("vb", string)]);
    let union = b.union_ty(vec![arm_a, arm_b]);
    b.type_alias("S", union)
}

#[test]
fn discriminated_union_narrows_both_paths() {
    // function f(s: S) { if (s.k === "a") { return s.va; } return s.vb; }
    let out = compile_ok(|b| {
        let alias = discriminated_alias(b);
        let s = b.sym("s");
        let k = b.sym("k");
        let va = b.sym("va");
        let vb = b.sym("vb");
        let a_lit = b.string("a");
        let s_ty = b.ty("S");

        let guard = build::binary(
            BinaryOperator::StrictEq,
            build::member(build::ident_expr(s), k),
            a_lit,
        );
        let then_branch = Statement::Block(build::block(vec![build::return_stmt(Some(
            build::member(build::ident_expr(s), va),
        ))]));
        let body = vec![
            build::if_stmt(guard, then_branch, None),
            build::return_stmt(Some(build::member(build::ident_expr(s), vb))),
        ];
        let func = b.func("f", vec![build::param(s, Some(s_ty))], None, body);
        vec![alias, func]
    });

    // Both member accesses type-check; the discovered return type is the
    // union of the arm field types.
    let module = &out.module;
    let f = symbol_op(module, "f");
    let fn_ty = module.op(f).attr("type").and_then(|a| a.as_type()).unwrap();
    let Type::Function { results, .. } = out.types.get(fn_ty) else {
        panic!("f is not a function");
    };
    match out.types.get(results[0]) {
        Type::Union(members) => assert_eq!(members.len(), 2),
        other => panic!("expected number|string return, got {:?}", other),
    }
}

#[test]
fn typeof_guard_narrows_then_branch() {
    // function f(x: number | string) { if (typeof x === "string") {
    //   return x.length; } return x; }
    let out = compile_ok(|b| {
        let number = b.number_ty();
        let string = b.string_ty();
        let union = b.union_ty(vec![number, string]);
        let x = b.sym("x");
        let length = b.sym("length");
        let tag = b.string("string");

        let guard = build::binary(BinaryOperator::StrictEq, typeof_of(build::ident_expr(x)), tag);
        let then_branch = Statement::Block(build::block(vec![build::return_stmt(Some(
            build::member(build::ident_expr(x), length),
        ))]));
        let body = vec![
            build::if_stmt(guard, then_branch, None),
            build::return_stmt(Some(build::ident_expr(x))),
        ];
        let func = b.func("f", vec![build::param(x, Some(union))], None, body);
        vec![func]
    });
    assert!(out.module.lookup_symbol("f").is_some());
}

#[test]
fn union_member_access_outside_guard_is_an_error() {
    // Without the guard, `.length` is missing in the number arm.
    let diags = compile_err(|b| {
        let number = b.number_ty();
        let string = b.string_ty();
        let union = b.union_ty(vec![number, string]);
        let x = b.sym("x");
        let length = b.sym("length");
        let body = vec![build::return_stmt(Some(build::member(
            build::ident_expr(x),
            length,
        )))];
        vec![b.func("f", vec![build::param(x, Some(union))], None, body)]
    });
    assert!(diags
        .iter()
        .any(|d| d.message.contains("length") || d.message.contains("missing")));
}

#[test]
fn instanceof_guard_narrows_to_class() {
    let out = compile_ok(|b| {
        let number = b.number_ty();
        let n_init = build::int(1);
        let field = b.field("n", Some(number), Some(n_init));
        let class_c = b.class("C", vec![field]);

        // function f(x: any) { if (x instanceof C) { return x.n; } return 0; }
        let any = b.ty("any");
        let x = b.sym("x");
        let c = b.sym("C");
        let n = b.sym("n");
        let guard = build::binary(
            BinaryOperator::Instanceof,
            build::ident_expr(x),
            build::ident_expr(c),
        );
        let then_branch = Statement::Block(build::block(vec![build::return_stmt(Some(
            build::member(build::ident_expr(x), n),
        ))]));
        let body = vec![
            build::if_stmt(guard, then_branch, None),
            build::return_stmt(Some(build::int(0))),
        ];
        let func = b.func("f", vec![build::param(x, Some(any))], None, body);
        vec![class_c, func]
    });
    assert!(out.module.lookup_symbol("f").is_some());
}

#[test]
fn switch_case_literal_narrows_discriminant() {
    let out = compile_ok(|b| {
        let alias = discriminated_alias(b);
        let s = b.sym("s");
        let k = b.sym("k");
        let va = b.sym("va");
        let a_lit = b.string("a");
        let s_ty = b.ty("S");

        // switch (s.k) { case "a": return s.va; default: return 0; }
        let switch = Statement::Switch(tsir_ast::ast::SwitchStatement {
            discriminant: build::member(build::ident_expr(s), k),
            cases: vec![
                tsir_ast::ast::SwitchCase {
                    test: Some(a_lit),
                    consequent: vec![build::return_stmt(Some(build::member(
                        build::ident_expr(s),
                        va,
                    )))],
                    span: Span::synthetic(),
                },
                tsir_ast::ast::SwitchCase {
                    test: None,
                    consequent: vec![build::return_stmt(Some(build::int(0)))],
                    span: Span::synthetic(),
                },
            ],
            span: Span::synthetic(),
        });
        let func = b.func("f", vec![build::param(s, Some(s_ty))], None, vec![switch]);
        vec![alias, func]
    });
    assert!(out.module.lookup_symbol("f").is_some());
}
