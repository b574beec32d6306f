//! Expression lowering tests

use crate::harness::*;
use tsir_ast::ast::{BinaryOperator, Expression, TemplateLiteral, UpdateExpression};
use tsir_ast::{build, Span};
use tsir_ir::{Attribute, OpKind};
use tsir_types::Type;

#[test]
fn numeric_literals_pick_integer_widths() {
    let out = compile_ok(|b| {
        let small = build::int(5);
        let wide = Expression::NumberLiteral(tsir_ast::ast::NumberLiteral {
            raw: "4294967296".to_string(),
            value: 4294967296.0,
            span: Span::synthetic(),
        });
        let frac = build::number(1.5);
        let a = b.sym("a");
        let c = b.sym("c");
        let d = b.sym("d");
        vec![
            build::const_decl(a, None, small),
            build::const_decl(c, None, wide),
            build::const_decl(d, None, frac),
        ]
    });

    let mut widths = Vec::new();
    for op in ops_of_kind(&out.module, OpKind::Constant) {
        let result = out.module.op(op).result(0);
        widths.push(out.types.get(out.module.value_type(result)).clone());
    }
    assert!(widths.iter().any(|t| matches!(t, Type::Int(tsir_types::IntWidth::I32))));
    assert!(widths.iter().any(|t| matches!(t, Type::Int(tsir_types::IntWidth::I64))));
    assert!(widths.iter().any(|t| matches!(t, Type::Number)));
}

#[test]
fn short_circuit_lowers_to_branches() {
    let out = compile_ok(|b| {
        let x = b.sym("x");
        let y = b.sym("y");
        let boolean1 = b.boolean_ty();
        let boolean2 = b.boolean_ty();
        let and = build::binary(
            BinaryOperator::LogicalAnd,
            build::ident_expr(x),
            build::ident_expr(y),
        );
        let body = vec![build::return_stmt(Some(and))];
        vec![b.func(
            "both",
            vec![build::param(x, Some(boolean1)), build::param(y, Some(boolean2))],
            None,
            body,
        )]
    });
    let module = &out.module;
    let both = symbol_op(module, "both");
    assert!(kinds_under(module, both).contains(&OpKind::If));
}

#[test]
fn constant_template_folds_to_one_string() {
    let out = compile_ok(|b| {
        let head = b.sym("a");
        let tail = b.sym("b");
        let s = b.sym("s");
        let template = Expression::Template(TemplateLiteral {
            quasis: vec![head, tail],
            expressions: vec![build::int(1)],
            span: Span::synthetic(),
        });
        vec![build::const_decl(s, None, template)]
    });
    let module = &out.module;
    let folded = ops_of_kind(module, OpKind::Constant).into_iter().any(|op| {
        module.op(op).attr("value") == Some(&Attribute::Str("a1b".to_string()))
    });
    assert!(folded, "template did not fold:\n{}", module.pretty());
}

#[test]
fn typeof_known_operand_folds_to_its_tag() {
    let out = compile_ok(|b| {
        let t = b.sym("t");
        let operand = build::int(1);
        let type_of = build::unary(tsir_ast::ast::UnaryOperator::TypeOf, operand);
        vec![build::const_decl(t, None, type_of)]
    });
    let module = &out.module;
    let folded = ops_of_kind(module, OpKind::Constant).into_iter().any(|op| {
        module.op(op).attr("value") == Some(&Attribute::Str("number".to_string()))
    });
    assert!(folded);
}

#[test]
fn postfix_update_yields_the_old_value() {
    let out = compile_ok(|b| {
        let x = b.sym("x");
        let number = b.number_ty();
        let update = Expression::Update(UpdateExpression {
            increment: true,
            prefix: false,
            operand: Box::new(build::ident_expr(x)),
            span: Span::synthetic(),
        });
        let body = vec![build::return_stmt(Some(update))];
        vec![b.func("bump", vec![build::param(x, Some(number))], None, body)]
    });
    let module = &out.module;
    let bump = symbol_op(module, "bump");
    let kinds = kinds_under(module, bump);
    assert!(kinds.contains(&OpKind::Load));
    assert!(kinds.contains(&OpKind::Store));
    assert!(kinds.contains(&OpKind::Binary));
}

#[test]
fn missing_arguments_are_padded_with_undef() {
    let out = compile_ok(|b| {
        let a = b.sym("a");
        let c = b.sym("c");
        let n1 = b.number_ty();
        let n2 = b.number_ty();
        let func = b.func(
            "two",
            vec![build::param(a, Some(n1)), build::param(c, Some(n2))],
            None,
            vec![],
        );
        let call = b.call_named("two", vec![build::int(1)]);
        vec![func, build::expr_stmt(call)]
    });
    let module = &out.module;
    let call = ops_of_kind(module, OpKind::Call)
        .into_iter()
        .find(|&op| module.op(op).attr("callee").and_then(|a| a.as_str()) == Some("two"))
        .expect("call to 'two' not found");
    // Both declared parameters are present as operands.
    assert_eq!(module.op(call).operands.len(), 2);
    assert!(!ops_of_kind(module, OpKind::Undef).is_empty());
}

#[test]
fn incompatible_assignment_is_an_error() {
    let diags = compile_err(|b| {
        let x = b.sym("x");
        let boolean = b.boolean_ty();
        let bad = b.string("not a bool");
        vec![
            build::var_decl(
                tsir_ast::ast::VariableKind::Let,
                x,
                Some(boolean),
                Some(bad),
            ),
        ]
    });
    assert!(diags.iter().any(|d| d.message.contains("not assignable")));
}

#[test]
fn ternary_result_unifies_branch_types() {
    let out = compile_ok(|b| {
        let x = b.sym("x");
        let boolean = b.boolean_ty();
        let ternary = build::conditional(build::ident_expr(x), build::int(1), build::number(2.5));
        let body = vec![build::return_stmt(Some(ternary))];
        vec![b.func("pick", vec![build::param(x, Some(boolean))], None, body)]
    });
    let module = &out.module;
    let pick = symbol_op(module, "pick");
    let fn_ty = module.op(pick).attr("type").and_then(|a| a.as_type()).unwrap();
    let Type::Function { results, .. } = out.types.get(fn_ty) else {
        panic!("pick is not a function");
    };
    // i32 and number unify to number.
    assert!(matches!(out.types.get(results[0]), Type::Number));
}

#[test]
fn in_operator_rewrites_to_length_check() {
    let out = compile_ok(|b| {
        let i = b.sym("i");
        let xs = b.sym("xs");
        let number = b.number_ty();
        let number2 = b.number_ty();
        let array = tsir_ast::ast::TypeNode::Array(Box::new(number2), Span::synthetic());
        let test = build::binary(
            BinaryOperator::In,
            build::ident_expr(i),
            build::ident_expr(xs),
        );
        let body = vec![build::return_stmt(Some(test))];
        vec![b.func(
            "has",
            vec![build::param(i, Some(number)), build::param(xs, Some(array))],
            None,
            body,
        )]
    });
    let module = &out.module;
    let has = symbol_op(module, "has");
    let kinds = kinds_under(module, has);
    assert!(kinds.contains(&OpKind::Length));
}

#[test]
fn object_literal_methods_see_the_object_this() {
    let out = compile_ok(|b| {
        // const counter = { n: 0, bump() { return this.n; } };
        let n_sym = b.sym("n");
        let bump_sym = b.sym("bump");
        let counter = b.sym("counter");
        let method_body = build::block(vec![build::return_stmt(Some(build::member(
            build::this(),
            n_sym,
        )))]);
        let object = build::object(vec![
            build::key_value(n_sym, build::int(0)),
            build::method_prop(bump_sym, build::function_expr(vec![], None, method_body)),
        ]);
        vec![build::const_decl(counter, None, object)]
    });
    let module = &out.module;
    let method = func_with_prefix(module, "__object_bump").expect("object method not emitted");
    let fn_ty = module.op(method).attr("type").and_then(|a| a.as_type()).unwrap();
    let Type::Function { inputs, .. } = out.types.get(fn_ty) else {
        panic!("method is not a function");
    };
    // `this` is the finished object type, not opaque.
    assert!(matches!(out.types.get(inputs[0]), Type::Object(_)));
}
