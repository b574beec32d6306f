//! Test harness: program construction and IR inspection helpers

use tsir_ast::ast::Statement;
use tsir_ast::build::AstBuilder;
use tsir_ir::{Attribute, IrModule, OpId, OpKind};
use tsir_lower::{compile_unit, CompileOutput, CompilerOptions, Diagnostic};

/// Build a program and compile it with the given options.
pub fn compile_with(
    options: CompilerOptions,
    f: impl FnOnce(&mut AstBuilder) -> Vec<Statement>,
) -> Result<CompileOutput, Vec<Diagnostic>> {
    let mut b = AstBuilder::new();
    let statements = f(&mut b);
    let source = b.source_file(statements);
    let mut interner = b.into_interner();
    compile_unit(&source, &mut interner, options)
}

/// Build and compile under default options.
pub fn compile_program(
    f: impl FnOnce(&mut AstBuilder) -> Vec<Statement>,
) -> Result<CompileOutput, Vec<Diagnostic>> {
    compile_with(CompilerOptions::default(), f)
}

/// Compile, panicking with rendered diagnostics on failure.
pub fn compile_ok(f: impl FnOnce(&mut AstBuilder) -> Vec<Statement>) -> CompileOutput {
    match compile_program(f) {
        Ok(out) => out,
        Err(diags) => {
            let messages: Vec<&str> = diags.iter().map(|d| d.message.as_str()).collect();
            panic!("compilation failed: {:?}", messages);
        }
    }
}

/// Compile expecting failure; returns the diagnostics.
pub fn compile_err(f: impl FnOnce(&mut AstBuilder) -> Vec<Statement>) -> Vec<Diagnostic> {
    match compile_program(f) {
        Ok(out) => panic!("expected failure, got module:\n{}", out.module.pretty()),
        Err(diags) => diags,
    }
}

/// Look up a symbol-defining op, panicking when absent.
pub fn symbol_op(module: &IrModule, name: &str) -> OpId {
    module
        .lookup_symbol(name)
        .unwrap_or_else(|| panic!("symbol '{}' not found in:\n{}", name, module.pretty()))
}

/// Every op kind reachable under an op (regions included), in emission
/// order.
pub fn kinds_under(module: &IrModule, op: OpId) -> Vec<OpKind> {
    let mut kinds = Vec::new();
    collect_kinds(module, op, &mut kinds);
    kinds
}

fn collect_kinds(module: &IrModule, op: OpId, out: &mut Vec<OpKind>) {
    for &region in &module.op(op).regions {
        for &block in &module.region(region).blocks {
            for nested in module.block_ops(block) {
                out.push(module.op(nested).kind);
                collect_kinds(module, nested, out);
            }
        }
    }
}

/// All live ops of a kind anywhere in the module.
pub fn ops_of_kind(module: &IrModule, kind: OpKind) -> Vec<OpId> {
    module.ops_of_kind(kind)
}

/// The `entries` list attribute of a vtable/adapter global.
pub fn global_entries(module: &IrModule, name: &str) -> Vec<Attribute> {
    let op = symbol_op(module, name);
    match module.op(op).attr("entries") {
        Some(Attribute::List(entries)) => entries.clone(),
        other => panic!("global '{}' has no entries list: {:?}", name, other),
    }
}

/// Find a function op whose symbol starts with the prefix.
pub fn func_with_prefix(module: &IrModule, prefix: &str) -> Option<OpId> {
    module
        .ops_of_kind(OpKind::Func)
        .into_iter()
        .find(|&op| {
            module
                .op(op)
                .sym_name()
                .map(|n| n.starts_with(prefix))
                .unwrap_or(false)
        })
}
