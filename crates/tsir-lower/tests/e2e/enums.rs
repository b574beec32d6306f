//! Enum lowering tests

use crate::harness::*;
use tsir_ast::ast::BinaryOperator;
use tsir_ast::build;
use tsir_ir::{Attribute, OpKind};
use tsir_types::{IntWidth, Type};

#[test]
fn width_promotes_past_i32() {
    // enum E { A, B = 1 << 31, C }  — C == (1 << 31) + 1, storage i64.
    let out = compile_ok(|b| {
        let shift = build::binary(BinaryOperator::ShiftLeft, build::int(1), build::int(31));
        let decl = b.enum_decl("E", vec![("A", None), ("B", Some(shift)), ("C", None)]);
        // let x = E.C;
        let e = b.sym("E");
        let c = b.sym("C");
        let x = b.sym("x");
        let read = build::let_decl(x, None, Some(build::member(build::ident_expr(e), c)));
        vec![decl, read]
    });

    let module = &out.module;
    let expected = (1_i64 << 31) + 1;
    let constant = ops_of_kind(module, OpKind::Constant)
        .into_iter()
        .find(|&op| module.op(op).attr("value") == Some(&Attribute::Int(expected)))
        .expect("E.C constant not found");

    // The member constant carries the enum's storage width.
    let result = module.op(constant).result(0);
    match out.types.get(module.value_type(result)) {
        Type::Int(width) => assert_eq!(*width, IntWidth::I64),
        other => panic!("expected integer storage, got {:?}", other),
    }
}

#[test]
fn members_count_up_from_previous_value() {
    // enum Small { A = 3, B, C = 10, D }
    let out = compile_ok(|b| {
        let decl = b.enum_decl(
            "Small",
            vec![
                ("A", Some(build::int(3))),
                ("B", None),
                ("C", Some(build::int(10))),
                ("D", None),
            ],
        );
        let e = b.sym("Small");
        let bm = b.sym("B");
        let dm = b.sym("D");
        let x = b.sym("x");
        let y = b.sym("y");
        let read_b = build::let_decl(x, None, Some(build::member(build::ident_expr(e), bm)));
        let read_d = build::let_decl(y, None, Some(build::member(build::ident_expr(e), dm)));
        vec![decl, read_b, read_d]
    });

    let module = &out.module;
    let values: Vec<i64> = ops_of_kind(module, OpKind::Constant)
        .into_iter()
        .filter_map(|op| module.op(op).attr("value").and_then(|a| a.as_int()))
        .collect();
    assert!(values.contains(&4)); // B = A + 1
    assert!(values.contains(&11)); // D = C + 1
}

#[test]
fn non_constant_initializer_is_an_error() {
    let diags = compile_err(|b| {
        let f = b.sym("f");
        let call = build::call(build::ident_expr(f), vec![]);
        let decl = b.enum_decl("E", vec![("A", Some(call))]);
        vec![decl]
    });
    assert!(diags
        .iter()
        .any(|d| d.message.contains("constant") || d.message.contains("resolve")));
}
