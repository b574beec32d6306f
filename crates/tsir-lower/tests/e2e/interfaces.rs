//! Interface dispatch and adapter-table tests

use crate::harness::*;
use tsir_ast::ast::{BinaryOperator, Statement};
use tsir_ast::build;
use tsir_ir::Attribute;
use tsir_lower::CompilerOptions;

fn no_rtti() -> CompilerOptions {
    CompilerOptions {
        enable_rtti: false,
        ..CompilerOptions::default()
    }
}

/// `interface P { name: string; greet?(): string }` with one class
/// implementing `greet` and one leaving it out.
fn greeter_program(b: &mut tsir_ast::build::AstBuilder) -> Vec<Statement> {
    let string1 = b.string_ty();
    let string2 = b.string_ty();
    let string3 = b.string_ty();
    let string4 = b.string_ty();
    let name_field = b.iface_field("name", string1);
    let greet_method = b.iface_method("greet", vec![], string2, true);
    let iface = b.interface("P", vec![name_field, greet_method]);

    let a_name = b.string("a");
    let name_sym = b.sym("name");
    let greet_body = vec![build::return_stmt(Some(build::binary(
        BinaryOperator::Add,
        b.string("hi "),
        build::member(build::this(), name_sym),
    )))];
    let a_field = b.field("name", Some(string3), Some(a_name));
    let a_greet = b.method("greet", vec![], None, greet_body);
    let p1 = b.ty("P");
    let class_a = b.class_full("A", false, vec![], vec![p1], vec![a_field, a_greet]);

    let b_name = b.string("b");
    let b_field = b.field("name", Some(string4), Some(b_name));
    let p2 = b.ty("P");
    let class_b = b.class_full("B", false, vec![], vec![p2], vec![b_field]);

    vec![iface, class_a, class_b]
}

#[test]
fn implemented_optional_method_binds_directly() {
    let out = compile_with(no_rtti(), greeter_program).expect("compilation failed");
    let entries = global_entries(&out.module, "A.impl.P");
    assert_eq!(entries.len(), 2);
    // name is a field offset; greet binds the method symbol.
    assert_eq!(entries[0], Attribute::Int(0));
    assert_eq!(entries[1], Attribute::Str("A.greet".to_string()));
}

#[test]
fn missing_optional_method_takes_sentinel_slot() {
    let out = compile_with(no_rtti(), greeter_program).expect("compilation failed");
    let entries = global_entries(&out.module, "B.impl.P");
    assert_eq!(entries.len(), 2);
    assert_eq!(entries[0], Attribute::Int(0));
    // Conditional members with no implementation occupy the slot with -1.
    assert_eq!(entries[1], Attribute::Int(-1));
}

#[test]
fn missing_required_member_is_an_error() {
    let result = compile_with(no_rtti(), |b| {
        let string1 = b.string_ty();
        let string2 = b.string_ty();
        let name_field = b.iface_field("name", string1);
        let greet_method = b.iface_method("greet", vec![], string2, false);
        let iface = b.interface("P", vec![name_field, greet_method]);

        let init = b.string("b");
        let string3 = b.string_ty();
        let field = b.field("name", Some(string3), Some(init));
        let p = b.ty("P");
        let class_b = b.class_full("B", false, vec![], vec![p], vec![field]);
        vec![iface, class_b]
    });
    let diags = result.expect_err("required member must be enforced");
    assert!(diags.iter().any(|d| d.message.contains("greet")));
}

#[test]
fn extended_interface_members_offset_adapter_slots() {
    let out = compile_with(no_rtti(), |b| {
        let s1 = b.string_ty();
        let base_field = b.iface_field("id", s1);
        let base = b.interface("Base", vec![base_field]);

        let s2 = b.string_ty();
        let extra_field = b.iface_field("name", s2);
        let mut child = b.interface("Child", vec![extra_field]);
        if let Statement::InterfaceDecl(decl) = &mut child {
            decl.extends.push(b.ty("Base"));
        }

        let id_init = b.string("i");
        let name_init = b.string("n");
        let s3 = b.string_ty();
        let s4 = b.string_ty();
        let f1 = b.field("id", Some(s3), Some(id_init));
        let f2 = b.field("name", Some(s4), Some(name_init));
        let child_ty = b.ty("Child");
        let class_c = b.class_full("C", false, vec![], vec![child_ty], vec![f1, f2]);
        vec![base, child, class_c]
    })
    .expect("compilation failed");

    // Slot 0 comes from Base (`id`), slot 1 from Child (`name`).
    let entries = global_entries(&out.module, "C.impl.Child");
    assert_eq!(entries.len(), 2);
    assert_eq!(entries[0], Attribute::Int(0));
    assert_eq!(entries[1], Attribute::Int(1));
}

#[test]
fn tuple_cast_to_interface_builds_adapter() {
    let out = compile_with(no_rtti(), |b| {
        let s1 = b.string_ty();
        let s2 = b.string_ty();
        let name_field = b.iface_field("name", s1);
        let greet_method = b.iface_method("greet", vec![], s2, true);
        let iface = b.interface("P", vec![name_field, greet_method]);

        // const p = { name: "x" }; const q = p as P;
        let name_sym = b.sym("name");
        let x = b.string("x");
        let object = build::object(vec![build::key_value(name_sym, x)]);
        let decl_p = b.const_decl("p", None, object);
        let p_expr = b.ident_expr("p");
        let p_ty = b.ty("P");
        let cast = tsir_ast::ast::Expression::AsCast(tsir_ast::ast::AsCastExpression {
            expression: Box::new(p_expr),
            target: p_ty,
            span: tsir_ast::Span::synthetic(),
        });
        let decl_q = b.const_decl("q", None, cast);
        vec![iface, decl_p, decl_q]
    })
    .expect("compilation failed");

    // A per-object adapter table exists, keyed by the tuple type; greet
    // is conditional and missing.
    let module = &out.module;
    let adapter = func_with_prefix(module, "__adapter.");
    let adapter = adapter
        .or_else(|| {
            module
                .ops_of_kind(tsir_ir::OpKind::Global)
                .into_iter()
                .find(|&op| {
                    module
                        .op(op)
                        .sym_name()
                        .map(|n| n.starts_with("__adapter."))
                        .unwrap_or(false)
                })
        })
        .expect("no tuple adapter emitted");
    match module.op(adapter).attr("entries") {
        Some(Attribute::List(entries)) => {
            assert_eq!(entries.len(), 2);
            assert_eq!(entries[1], Attribute::Int(-1));
        }
        other => panic!("adapter has no entries: {:?}", other),
    }
}
