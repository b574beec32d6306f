//! Built-in names
//!
//! A name starting with a known built-in bypasses the symbol store.
//! Identifier built-ins produce constants; call built-ins are dispatched
//! from call lowering when the callee did not resolve to a declaration.

use super::{attr_str, CoreCompiler};
use crate::context::GenContext;
use crate::error::LowerResult;
use tsir_ast::ast::Expression;
use tsir_ast::Span;
use tsir_ir::{OpKind, Value};
use tsir_types::Type;

/// Call built-ins the lowering core understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Builtin {
    Print,
    ParseInt,
    ParseFloat,
    /// Generator re-entry dispatch: `switchstate(step)`.
    SwitchState,
    /// `#_last_field`: ordinal of the last field of the current `this`
    /// storage.
    LastField,
    Assert,
}

/// Data-driven name table; adding a built-in only touches this list.
const BUILTIN_CALLS: &[(&str, Builtin)] = &[
    ("print", Builtin::Print),
    ("parseInt", Builtin::ParseInt),
    ("parseFloat", Builtin::ParseFloat),
    ("switchstate", Builtin::SwitchState),
    ("#_last_field", Builtin::LastField),
    ("assert", Builtin::Assert),
];

impl<'a> CoreCompiler<'a> {
    /// Identifier built-ins: `undefined`, `NaN`, `Infinity`.
    pub(crate) fn builtin_identifier(&mut self, name: &str, span: Span) -> Option<Value> {
        match name {
            "undefined" => {
                let ty = self.types.undefined();
                Some(self.emit_undef(ty, span))
            }
            "NaN" => Some(self.emit_const_number(f64::NAN, span)),
            "Infinity" => Some(self.emit_const_number(f64::INFINITY, span)),
            _ => None,
        }
    }

    pub(crate) fn lookup_builtin_call(&self, name: &str) -> Option<Builtin> {
        BUILTIN_CALLS
            .iter()
            .find(|(n, _)| *n == name)
            .map(|(_, b)| *b)
    }

    pub(crate) fn lower_builtin_call(
        &mut self,
        builtin: Builtin,
        args: &[Expression],
        span: Span,
        ctx: &GenContext,
    ) -> LowerResult<Value> {
        match builtin {
            Builtin::Print => {
                let mut operands = Vec::with_capacity(args.len());
                for arg in args {
                    let value = self.lower_expr(arg, ctx)?;
                    operands.push(value.id);
                }
                let void = self.types.void();
                let op = self.emit_op(
                    OpKind::Call,
                    operands,
                    &[void],
                    vec![attr_str("callee", "print")],
                    span,
                );
                Ok(self.builder.result(op))
            }
            Builtin::ParseInt => {
                let value = self.lower_expr(&args[0], ctx)?;
                let string_ty = self.types.string();
                let value = self.coerce(value, string_ty, span)?;
                let i32_ty = self.types.i32();
                let op = self.emit_op(
                    OpKind::Call,
                    vec![value.id],
                    &[i32_ty],
                    vec![attr_str("callee", "parseInt")],
                    span,
                );
                Ok(self.builder.result(op))
            }
            Builtin::ParseFloat => {
                let value = self.lower_expr(&args[0], ctx)?;
                let string_ty = self.types.string();
                let value = self.coerce(value, string_ty, span)?;
                let number = self.types.number();
                let op = self.emit_op(
                    OpKind::Call,
                    vec![value.id],
                    &[number],
                    vec![attr_str("callee", "parseFloat")],
                    span,
                );
                Ok(self.builder.result(op))
            }
            Builtin::SwitchState => {
                let step = self.lower_expr(&args[0], ctx)?;
                let i32_ty = self.types.i32();
                let step = self.coerce(step, i32_ty, span)?;
                let void = self.types.void();
                let op = self.emit_op(OpKind::SwitchState, vec![step.id], &[void], vec![], span);
                Ok(self.builder.result(op))
            }
            Builtin::LastField => {
                let ordinal = ctx
                    .this_type
                    .map(|this_ty| {
                        let storage = match self.types.get(this_ty) {
                            Type::Class { storage, .. } => *storage,
                            Type::Object(storage) => *storage,
                            _ => this_ty,
                        };
                        self.types
                            .get(storage)
                            .as_tuple_fields()
                            .map(|fields| fields.len().saturating_sub(1) as i64)
                            .unwrap_or(0)
                    })
                    .unwrap_or(0);
                let i32_ty = self.types.i32();
                Ok(self.emit_const_int(ordinal, i32_ty, span))
            }
            Builtin::Assert => {
                let cond = self.lower_expr(&args[0], ctx)?;
                let cond = self.boolean_coerce(cond, span)?;
                let void = self.types.void();
                let op = self.emit_op(
                    OpKind::Call,
                    vec![cond.id],
                    &[void],
                    vec![attr_str("callee", "assert")],
                    span,
                );
                Ok(self.builder.result(op))
            }
        }
    }
}
