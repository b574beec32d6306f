//! Control-flow lowering tests

use crate::harness::*;
use tsir_ast::ast::{
    BinaryOperator, CatchClause, Statement, SwitchCase, SwitchStatement, TryStatement,
};
use tsir_ast::{build, Span};
use tsir_ir::{Attribute, OpKind};

#[test]
fn while_loop_with_break_and_continue() {
    let out = compile_ok(|b| {
        let x = b.sym("x");
        let body = vec![
            build::let_decl(x, None, Some(build::int(0))),
            build::while_stmt(
                build::bool_lit(true),
                Statement::Block(build::block(vec![
                    build::if_stmt(
                        build::binary(
                            BinaryOperator::Greater,
                            build::ident_expr(x),
                            build::int(3),
                        ),
                        Statement::Break(tsir_ast::ast::BreakStatement {
                            label: None,
                            span: Span::synthetic(),
                        }),
                        None,
                    ),
                    build::expr_stmt(build::assign(
                        build::ident_expr(x),
                        build::binary(BinaryOperator::Add, build::ident_expr(x), build::int(1)),
                    )),
                ])),
            ),
        ];
        vec![b.func("spin", vec![], None, body)]
    });
    let module = &out.module;
    let spin = symbol_op(module, "spin");
    let kinds = kinds_under(module, spin);
    assert!(kinds.contains(&OpKind::While));
    assert!(kinds.contains(&OpKind::Break));
}

#[test]
fn break_outside_loop_is_an_error() {
    let diags = compile_err(|b| {
        let body = vec![Statement::Break(tsir_ast::ast::BreakStatement {
            label: None,
            span: Span::synthetic(),
        })];
        vec![b.func("bad", vec![], None, body)]
    });
    assert!(diags.iter().any(|d| d.message.contains("break")));
}

#[test]
fn labeled_loop_carries_its_label() {
    let out = compile_ok(|b| {
        let outer = b.sym("outer");
        let body = vec![build::labeled(
            outer,
            build::while_stmt(
                build::bool_lit(true),
                Statement::Break(tsir_ast::ast::BreakStatement {
                    label: Some(build::ident(outer)),
                    span: Span::synthetic(),
                }),
            ),
        )];
        vec![b.func("f", vec![], None, body)]
    });
    let module = &out.module;
    let loops = ops_of_kind(module, OpKind::While);
    assert_eq!(loops.len(), 1);
    assert_eq!(
        module.op(loops[0]).attr("label"),
        Some(&Attribute::Str("outer".to_string()))
    );
}

#[test]
fn try_catch_marks_the_function_personality() {
    let out = compile_ok(|b| {
        let e = b.ident("e");
        let oops = b.string("oops");
        let body = vec![Statement::Try(TryStatement {
            body: build::block(vec![build::expr_stmt(build::assign(
                build::ident_expr(e.name),
                oops.clone(),
            ))]),
            catch_clause: Some(CatchClause {
                param: Some(e),
                type_annotation: None,
                body: build::block(vec![]),
                span: Span::synthetic(),
            }),
            finally_clause: Some(build::block(vec![])),
            span: Span::synthetic(),
        })];
        // The try body writes a variable declared outside it.
        let decl = build::let_decl(e.name, None, Some(b.string("start")));
        vec![b.func("guarded", vec![], None, vec![decl, body.into_iter().next().unwrap()])]
    });

    let module = &out.module;
    let guarded = symbol_op(module, "guarded");
    assert_eq!(
        module.op(guarded).attr("personality"),
        Some(&Attribute::Bool(true))
    );
    let kinds = kinds_under(module, guarded);
    assert!(kinds.contains(&OpKind::Try));
    assert!(kinds.contains(&OpKind::Catch));
}

#[test]
fn throw_registers_rtti_in_strict_mode() {
    let out = compile_ok(|b| {
        let message = b.string("boom");
        let body = vec![Statement::Throw(tsir_ast::ast::ThrowStatement {
            value: message,
            span: Span::synthetic(),
        })];
        vec![b.func("f", vec![], None, body)]
    });
    let module = &out.module;
    let throws = ops_of_kind(module, OpKind::Throw);
    assert_eq!(throws.len(), 1);
    assert!(module.op(throws[0]).attr("rtti").is_some());
}

#[test]
fn switch_links_default_last_and_narrows_nothing_by_default() {
    let out = compile_ok(|b| {
        let x = b.sym("x");
        let switch = Statement::Switch(SwitchStatement {
            discriminant: build::ident_expr(x),
            cases: vec![
                SwitchCase {
                    test: None,
                    consequent: vec![build::return_stmt(Some(build::int(0)))],
                    span: Span::synthetic(),
                },
                SwitchCase {
                    test: Some(build::int(1)),
                    consequent: vec![build::return_stmt(Some(build::int(10)))],
                    span: Span::synthetic(),
                },
            ],
            span: Span::synthetic(),
        });
        let number = b.number_ty();
        vec![b.func("f", vec![build::param(x, Some(number))], None, vec![switch])]
    });

    let module = &out.module;
    let switches = ops_of_kind(module, OpKind::Switch);
    assert_eq!(switches.len(), 1);
    // One region per case plus the merge region; the default's marker in
    // the case list is a unit attribute in last position.
    let op = module.op(switches[0]);
    assert_eq!(op.regions.len(), 3);
    match op.attr("cases") {
        Some(Attribute::List(cases)) => {
            assert_eq!(cases.len(), 2);
            assert_eq!(cases[1], Attribute::Unit);
        }
        other => panic!("missing cases attribute: {:?}", other),
    }
}

#[test]
fn for_of_over_an_array_lowers_to_an_indexed_loop() {
    let out = compile_ok(|b| {
        let xs = b.sym("xs");
        let x = b.sym("x");
        let total = b.sym("total");
        let decl_total = build::let_decl(total, None, Some(build::int(0)));
        let decl_xs = build::let_decl(
            xs,
            None,
            Some(build::array(vec![build::int(1), build::int(2), build::int(3)])),
        );
        let for_of = Statement::ForOf(tsir_ast::ast::ForOfStatement {
            kind: tsir_ast::ast::VariableKind::Const,
            binding: tsir_ast::ast::Pattern::Identifier(build::ident(x)),
            iterable: build::ident_expr(xs),
            body: Box::new(build::expr_stmt(build::assign(
                build::ident_expr(total),
                build::binary(BinaryOperator::Add, build::ident_expr(total), build::ident_expr(x)),
            ))),
            is_await: false,
            span: Span::synthetic(),
        });
        vec![b.func("sum", vec![], None, vec![decl_total, decl_xs, for_of])]
    });

    let module = &out.module;
    let sum = symbol_op(module, "sum");
    let kinds = kinds_under(module, sum);
    assert!(kinds.contains(&OpKind::For));
    assert!(kinds.contains(&OpKind::Length));
}

#[test]
fn lowering_is_idempotent_across_runs() {
    let build_program = |b: &mut tsir_ast::build::AstBuilder| {
        let x = b.sym("x");
        let number = b.number_ty();
        let body = vec![build::return_stmt(Some(build::binary(
            BinaryOperator::Mul,
            build::ident_expr(x),
            build::ident_expr(x),
        )))];
        vec![b.func("sq", vec![build::param(x, Some(number))], None, body)]
    };
    let first = compile_ok(build_program);
    let second = compile_ok(build_program);
    assert_eq!(first.module.op_count(), second.module.op_count());
    assert_eq!(first.module.pretty(), second.module.pretty());
}
