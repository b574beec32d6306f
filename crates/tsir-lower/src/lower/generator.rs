//! Generator lowering
//!
//! A function carrying the asterisk marker is rewritten before lowering:
//! it returns an object with a numeric `step` field and a synthesized
//! `next()` method whose first statement dispatches on `step`. Locals
//! (and parameters) live as fields of `this` so they survive across
//! yields; each `yield` stores a fresh state ordinal, returns an
//! iterator result with `done = false`, and plants the matching
//! state-label re-entry marker.

use super::{attr_int, attr_str, attr_type, CoreCompiler, FuncFrame};
use crate::context::GenContext;
use crate::error::LowerResult;
use crate::symbols::{FunctionEntry, VariableInfo, VarStorage};
use rustc_hash::FxHashMap;
use std::cell::{Cell, RefCell};
use std::rc::Rc;
use tsir_ast::ast::*;
use tsir_ast::Span;
use tsir_ir::{OpKind, Value};
use tsir_types::{TupleField, Type, TypeId};

use super::func::ParamSpec;

/// Everything discovered about a generator before emission.
pub(crate) struct GeneratorPlan {
    pub params: Vec<ParamSpec>,
    /// The state-machine object type returned by the generator.
    pub object_ty: TypeId,
    /// `next()`'s result: `{ done: boolean, value: V }`.
    pub result_ty: TypeId,
}

impl<'a> CoreCompiler<'a> {
    pub(crate) fn lower_generator_decl(
        &mut self,
        func: &FunctionDecl,
        ctx: &GenContext,
    ) -> LowerResult<()> {
        let name = self.interner.resolve(func.name.name).to_string();
        let full_name = self.symbols.qualify(&name);

        let plan = self.plan_generator(&func.params, &func.body.statements, ctx, func.span)?;

        let inputs: Vec<TypeId> = plan.params.iter().map(|p| p.ty).collect();
        let ty = self.types.function(inputs, vec![plan.object_ty]);

        let entry = FunctionEntry {
            full_name: full_name.clone(),
            ty,
            capture_fields: Vec::new(),
            op: None,
            is_generator: true,
            is_async: func.is_async,
        };
        let current = self.symbols.current_namespace();
        self.symbols
            .namespace_mut(current)
            .functions
            .insert(name.clone(), entry);

        if !ctx.dummy_run {
            let op = self.emit_generator(&full_name, &plan, &func.body.statements, ctx, func.span)?;
            let current = self.symbols.current_namespace();
            if let Some(entry) = self.symbols.namespace_mut(current).functions.get_mut(&name) {
                entry.op = Some(op);
            }
        }
        Ok(())
    }

    /// A generator function expression produces the generator function
    /// as a value under a fresh symbol.
    pub(crate) fn lower_generator_expr(
        &mut self,
        func: &FunctionExpression,
        ctx: &GenContext,
    ) -> LowerResult<Value> {
        let fresh = self.fresh_name("__generator");
        let full_name = self.symbols.qualify(&fresh);
        let plan = self.plan_generator(&func.params, &func.body.statements, ctx, func.span)?;

        let inputs: Vec<TypeId> = plan.params.iter().map(|p| p.ty).collect();
        let ty = self.types.function(inputs, vec![plan.object_ty]);

        if !ctx.dummy_run {
            self.emit_generator(&full_name, &plan, &func.body.statements, ctx, func.span)?;
        }
        Ok(self.emit_symbol_ref(&full_name, ty, func.span))
    }

    /// Probe the body as the future `next()` method: discover relocated
    /// locals, yield states, and the yielded element type.
    fn plan_generator(
        &mut self,
        params: &[Parameter],
        body: &[Statement],
        ctx: &GenContext,
        span: Span,
    ) -> LowerResult<GeneratorPlan> {
        let params = self.resolve_params(params, ctx)?;

        let i32_ty = self.types.i32();
        let mut seed_fields = vec![TupleField::named("step", i32_ty)];
        seed_fields.extend(params.iter().map(|p| TupleField::named(p.name.clone(), p.ty)));
        let seed_storage = self.types.tuple(seed_fields);
        let seed_this = self.types.object(seed_storage);

        let fields_sink = Rc::new(RefCell::new(Vec::new()));
        let counter = Rc::new(Cell::new(0));
        let probe_ctx = GenContext {
            allow_partial_resolve: true,
            dummy_run: true,
            alloc_vars_in_this_context: true,
            extra_fields_sink: Some(fields_sink.clone()),
            state_counter: Some(counter),
            ..ctx.for_function(Some(seed_this))
        };

        let probe_result_ty = self.probe_result_ty();
        self.yield_type_stack.push(Vec::new());
        self.begin_probe();
        let probe_result = self.emit_next_skeleton(
            "__probe_next",
            seed_this,
            probe_result_ty,
            &params,
            body,
            &probe_ctx,
            span,
        );
        self.end_probe();
        let yields = self.yield_type_stack.pop().unwrap_or_default();
        probe_result?;

        let elem_ty = {
            let mut unified: Option<TypeId> = None;
            for ty in yields {
                let widened = self.types.widen(ty);
                unified = Some(match unified {
                    None => widened,
                    Some(prev) => {
                        let any = self.types.any();
                        self.base_type(prev, widened, any)
                    }
                });
            }
            unified.unwrap_or_else(|| self.types.undefined())
        };

        let bool_ty = self.types.boolean();
        let result_storage = self.types.tuple(vec![
            TupleField::named("done", bool_ty),
            TupleField::named("value", elem_ty),
        ]);
        let result_ty = self.types.object(result_storage);

        let extra_fields: Vec<TupleField> = fields_sink.borrow().clone();

        // Final object layout: step, parameters, relocated locals, and
        // the `next` method (with an opaque `this` to break the cycle).
        let opaque = self.types.opaque();
        let next_ty = self.types.function(vec![opaque], vec![result_ty]);
        let mut object_fields = vec![TupleField::named("step", i32_ty)];
        object_fields.extend(params.iter().map(|p| TupleField::named(p.name.clone(), p.ty)));
        for field in &extra_fields {
            if !object_fields.iter().any(|f| f.id == field.id) {
                object_fields.push(field.clone());
            }
        }
        object_fields.push(TupleField::named("next", next_ty));
        let storage = self.types.tuple(object_fields);
        let object_ty = self.types.object(storage);

        Ok(GeneratorPlan {
            params,
            object_ty,
            result_ty,
        })
    }

    /// Emit the generator: the `next()` state machine plus the outer
    /// function building the state object.
    fn emit_generator(
        &mut self,
        full_name: &str,
        plan: &GeneratorPlan,
        body: &[Statement],
        ctx: &GenContext,
        span: Span,
    ) -> LowerResult<tsir_ir::OpId> {
        let next_name = format!("{}.next", full_name);

        let next_ctx = GenContext {
            allow_partial_resolve: ctx.allow_partial_resolve,
            dummy_run: ctx.dummy_run,
            alloc_vars_in_this_context: true,
            extra_fields_sink: Some(Rc::new(RefCell::new(Vec::new()))),
            state_counter: Some(Rc::new(Cell::new(0))),
            ..ctx.for_function(Some(plan.object_ty))
        };

        self.yield_type_stack.push(Vec::new());
        let module_block = self.builder.module().body_block();
        let saved = self.builder.insertion_point();
        self.builder.set_insertion_point_to_end(module_block);
        let next_result = self.emit_next_skeleton(
            &next_name,
            plan.object_ty,
            plan.result_ty,
            &plan.params,
            body,
            &next_ctx,
            span,
        );
        self.builder.set_insertion_point(saved);
        self.yield_type_stack.pop();
        next_result?;

        // Outer function: builds `{ step: 0, params…, next }`.
        let inputs: Vec<TypeId> = plan.params.iter().map(|p| p.ty).collect();
        let fn_ty = self.types.function(inputs.clone(), vec![plan.object_ty]);
        let saved = self.builder.insertion_point();
        self.builder.set_insertion_point_to_end(module_block);
        let func_op = self.builder.create_op(
            OpKind::Func,
            vec![],
            &[],
            vec![attr_str("sym_name", full_name), attr_type("type", fn_ty)],
            1,
            span,
        );
        let region = self.builder.op(func_op).regions[0];
        let entry = self.builder.create_block(region, &inputs);

        self.builder.set_insertion_point_to_end(entry);
        let i32_ty = self.types.i32();
        let step0 = self.emit_const_int(0, i32_ty, span);

        let storage = match self.types.get(plan.object_ty) {
            Type::Object(storage) => *storage,
            _ => plan.object_ty,
        };
        let fields: Vec<TupleField> = self
            .types
            .get(storage)
            .as_tuple_fields()
            .map(|f| f.to_vec())
            .unwrap_or_default();

        let opaque = self.types.opaque();
        let next_fn_ty = self.types.function(vec![opaque], vec![plan.result_ty]);
        let next_ref = self.emit_symbol_ref(&next_name, next_fn_ty, span);

        let mut operands = Vec::with_capacity(fields.len());
        for field in &fields {
            let field_name = field.id.as_name().unwrap_or_default();
            if field_name == "step" {
                operands.push(step0.id);
            } else if field_name == "next" {
                operands.push(next_ref.id);
            } else if let Some(position) =
                plan.params.iter().position(|p| p.name == field_name)
            {
                operands.push(self.builder.module().block_arg(entry, position).id);
            } else {
                // Relocated locals start undefined.
                operands.push(self.emit_undef(field.ty, span).id);
            }
        }
        let object = self.emit_op(OpKind::CreateTuple, operands, &[plan.object_ty], vec![], span);
        let object = self.builder.result(object);
        self.emit_op(OpKind::ReturnVal, vec![object.id], &[], vec![], span);
        self.builder.set_insertion_point(saved);

        Ok(func_op)
    }

    /// The `next()` body: `switchstate(this.step)` prologue, parameters
    /// bound as this-fields, the rewritten generator body, and the
    /// terminal `{ done: true }` result.
    #[allow(clippy::too_many_arguments)]
    fn emit_next_skeleton(
        &mut self,
        symbol: &str,
        this_ty: TypeId,
        result_ty: TypeId,
        params: &[ParamSpec],
        body: &[Statement],
        ctx: &GenContext,
        span: Span,
    ) -> LowerResult<tsir_ir::OpId> {
        let fn_ty = self.types.function(vec![this_ty], vec![result_ty]);

        let func_op = self.builder.create_op(
            OpKind::Func,
            vec![],
            &[],
            vec![attr_str("sym_name", symbol), attr_type("type", fn_ty)],
            1,
            span,
        );
        let region = self.builder.op(func_op).regions[0];
        let entry = self.builder.create_block(region, &[this_ty]);
        let this_value = self.builder.module().block_arg(entry, 0).id;

        self.func_stack.push(FuncFrame {
            name: symbol.to_string(),
            func_op,
            entry_block: entry,
            return_ty: result_ty,
            has_personality: false,
            is_generator: true,
            this_value: Some(this_value),
            captures: FxHashMap::default(),
            capture_param: None,
        });
        self.symbols.enter_function_scope();

        let saved = self.builder.insertion_point();
        self.builder.set_insertion_point_to_end(entry);

        let body_result = (|| -> LowerResult<()> {
            // Parameters live as fields of `this`.
            for param in params {
                let info = VariableInfo {
                    name: param.name.clone(),
                    full_name: param.name.clone(),
                    ty: param.ty,
                    location: param.span,
                    read_write: true,
                    storage: VarStorage::ThisField(param.name.clone()),
                    func_level: 0,
                };
                if self.symbols.declare(&param.name, info, true).is_err() {
                    return self.structural_error(
                        param.span,
                        format!("duplicate parameter '{}'", param.name),
                    );
                }
            }

            // Dispatch to the state label matching the stored step.
            let i32_ty = self.types.i32();
            let ref_ty = self.types.reference(i32_ty);
            let step_ref = self.emit_op(
                OpKind::PropertyRef,
                vec![this_value],
                &[ref_ty],
                vec![attr_str("field", "step")],
                span,
            );
            let step_ref = self.builder.result(step_ref);
            let step = self.emit_load(step_ref.id, i32_ty, span);
            let void = self.types.void();
            self.emit_op(OpKind::SwitchState, vec![step.id], &[void], vec![], span);

            self.lower_block_body(body, &ctx.for_block())
        })();

        // Falling off the end finishes the iteration.
        if body_result.is_ok() && !self.current_block_terminated() {
            let done = self.emit_iterator_result(true, None, result_ty, span)?;
            self.emit_op(OpKind::ReturnVal, vec![done.id], &[], vec![], span);
        }

        self.builder.set_insertion_point(saved);
        self.symbols.leave_scope();
        self.func_stack.pop();

        body_result?;
        Ok(func_op)
    }

    /// `yield expr`: store a fresh state ordinal into `this.step`,
    /// return `{ done: false, value }`, and plant the state label the
    /// runtime re-enters at.
    pub(crate) fn lower_yield(
        &mut self,
        yield_expr: &YieldExpression,
        ctx: &GenContext,
    ) -> LowerResult<Value> {
        let Some(state) = ctx.next_state() else {
            return self.structural_error(yield_expr.span, "'yield' outside of a generator");
        };
        let span = yield_expr.span;

        let value = match &yield_expr.value {
            Some(expr) => Some(self.lower_expr(expr, ctx)?),
            None => None,
        };
        if let (Some(value), Some(types)) = (value, self.yield_type_stack.last_mut()) {
            types.push(value.ty);
        }

        let frame = self
            .current_frame()
            .ok_or_else(|| crate::error::LowerError::unresolved("this", span))?;
        let this_value = frame.this_value.expect("generator without this");
        let result_ty = frame.return_ty;

        // this.step = K
        let i32_ty = self.types.i32();
        let ref_ty = self.types.reference(i32_ty);
        let step_ref = self.emit_op(
            OpKind::PropertyRef,
            vec![this_value],
            &[ref_ty],
            vec![attr_str("field", "step")],
            span,
        );
        let step_ref = self.builder.result(step_ref);
        let ordinal = self.emit_const_int(state as i64, i32_ty, span);
        self.emit_store(step_ref.id, ordinal.id, span);

        // return { done: false, value }
        let result = self.emit_iterator_result(false, value, result_ty, span)?;
        self.emit_op(OpKind::YieldReturnVal, vec![result.id], &[], vec![], span);

        // Re-entry point.
        self.emit_op(
            OpKind::StateLabel,
            vec![],
            &[],
            vec![attr_int("state", state as i64)],
            span,
        );

        let undefined = self.types.undefined();
        Ok(self.emit_undef(undefined, span))
    }

    /// Build an `{ done, value }` iterator result.
    fn emit_iterator_result(
        &mut self,
        done: bool,
        value: Option<Value>,
        result_ty: TypeId,
        span: Span,
    ) -> LowerResult<Value> {
        let done_value = self.emit_const_bool(done, span);
        let value_ty = self.iterator_value_type(result_ty);
        let payload = match value {
            Some(value) => self.coerce(value, value_ty, span)?,
            None => self.emit_undef(value_ty, span),
        };
        let op = self.emit_op(
            OpKind::CreateTuple,
            vec![done_value.id, payload.id],
            &[result_ty],
            vec![],
            span,
        );
        Ok(self.builder.result(op))
    }

    fn probe_result_ty(&mut self) -> TypeId {
        // During probing the element type is still unknown; the result
        // shape uses `any` for the payload and is re-derived for the
        // definitive emission.
        let bool_ty = self.types.boolean();
        let any = self.types.any();
        let storage = self.types.tuple(vec![
            TupleField::named("done", bool_ty),
            TupleField::named("value", any),
        ]);
        self.types.object(storage)
    }

    fn iterator_value_type(&mut self, result_ty: TypeId) -> TypeId {
        let storage = match self.types.get(result_ty) {
            Type::Object(storage) => *storage,
            _ => result_ty,
        };
        self.types
            .tuple_field(storage, &tsir_types::FieldId::Name("value".to_string()))
            .map(|(_, ty)| ty)
            .unwrap_or_else(|| self.types.any())
    }
}
