//! Closure capture tests

use crate::harness::*;
use tsir_ast::ast::{BinaryOperator, Statement};
use tsir_ast::build;
use tsir_ir::OpKind;
use tsir_lower::CompilerOptions;
use tsir_types::Type;

/// `function mk() { let x = 1; return () => x; }`
fn capture_program(b: &mut tsir_ast::build::AstBuilder) -> Vec<Statement> {
    let x = b.sym("x");
    let arrow = b.arrow(vec![], build::ident_expr(x));
    let body = vec![
        build::let_decl(x, None, Some(build::int(1))),
        build::return_stmt(Some(arrow)),
    ];
    vec![b.func("mk", vec![], None, body)]
}

#[test]
fn captured_variable_appears_in_capture_tuple() {
    let out = compile_ok(capture_program);
    let module = &out.module;

    let lambda = func_with_prefix(module, "__lambda").expect("no lambda emitted");
    let fn_ty = module
        .op(lambda)
        .attr("type")
        .and_then(|a| a.as_type())
        .unwrap();
    let Type::Function { inputs, .. } = out.types.get(fn_ty) else {
        panic!("lambda is not a function");
    };
    // The first input is the capture tuple, with one field per captured
    // variable.
    let capture_ty = inputs[0];
    let fields = out
        .types
        .get(capture_ty)
        .as_tuple_fields()
        .expect("capture tuple missing");
    assert_eq!(fields.len(), 1);
    assert_eq!(fields[0].id.as_name(), Some("x"));
}

#[test]
fn use_site_materializes_capture_and_trampoline() {
    let out = compile_ok(capture_program);
    let module = &out.module;
    let mk = symbol_op(module, "mk");
    let kinds = kinds_under(module, mk);
    assert!(kinds.contains(&OpKind::Capture));
    assert!(kinds.contains(&OpKind::Trampoline));
}

#[test]
fn bound_function_mode_replaces_trampolines() {
    let options = CompilerOptions {
        replace_trampoline_with_bound_function: true,
        ..CompilerOptions::default()
    };
    let out = compile_with(options, capture_program).expect("compilation failed");
    let module = &out.module;
    assert!(ops_of_kind(module, OpKind::Trampoline).is_empty());
    assert!(!ops_of_kind(module, OpKind::CreateBoundFunction).is_empty());
}

#[test]
fn local_only_functions_have_no_captures() {
    let out = compile_ok(|b| {
        let y = b.sym("y");
        let body = vec![
            build::let_decl(y, None, Some(build::int(2))),
            build::return_stmt(Some(build::ident_expr(y))),
        ];
        vec![b.func("plain", vec![], None, body)]
    });
    let module = &out.module;
    assert!(ops_of_kind(module, OpKind::Capture).is_empty());
    assert!(ops_of_kind(module, OpKind::Trampoline).is_empty());
}

#[test]
fn writable_captures_go_by_reference() {
    // function mk() { let count = 0; return () => { count = count + 1;
    //   return count; }; }
    let out = compile_ok(|b| {
        let count = b.sym("count");
        let inc = build::assign(
            build::ident_expr(count),
            build::binary(BinaryOperator::Add, build::ident_expr(count), build::int(1)),
        );
        let arrow = b.arrow_block(
            vec![],
            vec![
                build::expr_stmt(inc),
                build::return_stmt(Some(build::ident_expr(count))),
            ],
        );
        let body = vec![
            build::let_decl(count, None, Some(build::int(0))),
            build::return_stmt(Some(arrow)),
        ];
        vec![b.func("mk", vec![], None, body)]
    });

    let module = &out.module;
    let lambda = func_with_prefix(module, "__lambda").expect("no lambda emitted");
    let fn_ty = module
        .op(lambda)
        .attr("type")
        .and_then(|a| a.as_type())
        .unwrap();
    let Type::Function { inputs, .. } = out.types.get(fn_ty) else {
        panic!("lambda is not a function");
    };
    let fields = out
        .types
        .get(inputs[0])
        .as_tuple_fields()
        .expect("capture tuple missing");
    // The writable capture keeps its ref type, so stores stay visible.
    assert!(matches!(out.types.get(fields[0].ty), Type::Ref(_)));
}

#[test]
fn global_reads_are_not_captures() {
    // Module-level variables are addressable by symbol; closures read
    // them directly.
    let out = compile_ok(|b| {
        let g = b.sym("g");
        let arrow = b.arrow(vec![], build::ident_expr(g));
        let use_arrow = b.const_decl("f", None, arrow);
        let decl_g = build::let_decl(g, None, Some(build::int(7)));
        vec![decl_g, use_arrow]
    });
    assert!(ops_of_kind(&out.module, OpKind::Capture).is_empty());
}
