//! Function lowering and capture analysis
//!
//! Every function body is first probed in dummy mode with a capture
//! sink (and a return-type sink when the annotation is absent). The
//! probe discovers captured variables and the unified return type; the
//! definitive emission then installs a capture tuple as the first
//! parameter when the capture set is non-empty.

use super::{attr_bool, attr_str, attr_type, CoreCompiler, FrameCapture, FuncFrame};
use crate::context::{CaptureSet, GenContext, ReturnTypeAcc};
use crate::error::{LowerError, LowerResult};
use crate::symbols::FunctionEntry;
use rustc_hash::FxHashMap;
use std::cell::RefCell;
use std::rc::Rc;
use tsir_ast::ast::*;
use tsir_ast::Span;
use tsir_ir::{OpKind, Value};
use tsir_types::{TupleField, Type, TypeId};

/// One resolved formal parameter.
#[derive(Debug, Clone)]
pub(crate) struct ParamSpec {
    pub name: String,
    pub ty: TypeId,
    pub default: Option<Expression>,
    pub span: Span,
}

/// Everything discovered about a function before definitive emission.
pub(crate) struct FunctionPlan {
    pub params: Vec<ParamSpec>,
    pub return_ty: TypeId,
    pub capture_fields: Vec<TupleField>,
    /// Capture metadata keyed by name, in tuple order.
    pub captures: Vec<(String, FrameCapture)>,
}

impl FunctionPlan {
    /// The function type including the leading capture tuple (when any)
    /// and `this` input (for methods).
    pub fn function_type(
        &self,
        compiler: &mut CoreCompiler<'_>,
        this_ty: Option<TypeId>,
    ) -> TypeId {
        let mut inputs = Vec::new();
        if !self.capture_fields.is_empty() {
            inputs.push(compiler.types.tuple(self.capture_fields.clone()));
        }
        if let Some(this_ty) = this_ty {
            inputs.push(this_ty);
        }
        inputs.extend(self.params.iter().map(|p| p.ty));
        let results = if self.return_ty == compiler.types.void() {
            vec![]
        } else {
            vec![self.return_ty]
        };
        compiler.types.function(inputs, results)
    }
}

impl<'a> CoreCompiler<'a> {
    /// Lower a namespace-level function declaration.
    pub(crate) fn lower_function_decl(
        &mut self,
        func: &FunctionDecl,
        ctx: &GenContext,
    ) -> LowerResult<()> {
        if func.is_async && !self.opts.enable_async {
            return self.structural_error(func.span, "'async' functions require async support");
        }
        if func.is_generator {
            return self.lower_generator_decl(func, ctx);
        }

        let name = self.interner.resolve(func.name.name).to_string();
        let full_name = self.symbols.qualify(&name);

        // With a declared return type the prototype registers before the
        // body probe, so recursive and mutually-recursive bodies resolve.
        if let Some(annotation) = &func.return_type {
            let params = self.resolve_params(&func.params, ctx)?;
            let return_ty = self.resolve_type(annotation, ctx)?;
            let inputs: Vec<TypeId> = params.iter().map(|p| p.ty).collect();
            let results = if return_ty == self.types.void() {
                vec![]
            } else {
                vec![return_ty]
            };
            let proto_ty = self.types.function(inputs, results);
            let current = self.symbols.current_namespace();
            self.symbols.namespace_mut(current).functions.insert(
                name.clone(),
                FunctionEntry {
                    full_name: full_name.clone(),
                    ty: proto_ty,
                    capture_fields: Vec::new(),
                    op: None,
                    is_generator: false,
                    is_async: func.is_async,
                },
            );
        }

        let plan = self.plan_function(
            &func.params,
            func.return_type.as_ref(),
            &func.body.statements,
            None,
            ctx,
            func.span,
        )?;
        let ty = plan.function_type(self, None);

        let entry = FunctionEntry {
            full_name: full_name.clone(),
            ty,
            capture_fields: plan.capture_fields.clone(),
            op: None,
            is_generator: false,
            is_async: func.is_async,
        };
        let current = self.symbols.current_namespace();
        self.symbols
            .namespace_mut(current)
            .functions
            .insert(name.clone(), entry);

        if !ctx.dummy_run {
            let op = self.emit_function(&full_name, &plan, None, &func.body.statements, ctx, func.span)?;
            let current = self.symbols.current_namespace();
            if let Some(entry) = self.symbols.namespace_mut(current).functions.get_mut(&name) {
                entry.op = Some(op);
            }
        }
        Ok(())
    }

    /// Resolve the prototype and probe the body: parameter types first,
    /// then a dummy run that feeds the capture and return-type sinks.
    pub(crate) fn plan_function(
        &mut self,
        params: &[Parameter],
        return_annotation: Option<&TypeNode>,
        body: &[Statement],
        this_ty: Option<TypeId>,
        ctx: &GenContext,
        span: Span,
    ) -> LowerResult<FunctionPlan> {
        let params = self.resolve_params(params, ctx)?;

        let declared_return = match return_annotation {
            Some(annotation) => Some(self.resolve_type(annotation, ctx)?),
            None => None,
        };

        let capture_sink = Rc::new(RefCell::new(CaptureSet::default()));
        let return_sink = Rc::new(RefCell::new(ReturnTypeAcc::default()));

        let probe_return = declared_return.unwrap_or_else(|| self.types.undef_placeholder());
        let probe_ctx = GenContext {
            allow_partial_resolve: true,
            dummy_run: true,
            captured_vars_sink: Some(capture_sink.clone()),
            return_type_sink: if declared_return.is_none() {
                Some(return_sink.clone())
            } else {
                None
            },
            ..ctx.for_function(this_ty)
        };

        self.begin_probe();
        let probe_result =
            self.emit_function_skeleton("__probe", &params, probe_return, this_ty, &[], body, &probe_ctx, span);
        self.end_probe();
        probe_result?;

        // Fix the return type from the sink (§ return-type discovery):
        // the first type is taken verbatim, later ones must unify, and a
        // function that returned values without a fixable type stays
        // unresolved so the outer fixpoint reschedules it.
        let return_ty = match declared_return {
            Some(declared) => declared,
            None => {
                let acc = return_sink.borrow();
                if let Some((a, b, conflict_span)) = acc.conflict {
                    let a = self.types.display(a);
                    let b = self.types.display(b);
                    return self.structural_error(
                        conflict_span,
                        format!("incompatible return types '{}' and '{}'", a, b),
                    );
                }
                match acc.ty {
                    Some(ty) if ty != self.types.undef_placeholder() => ty,
                    _ if acc.required => {
                        return Err(LowerError::unresolved("<return type>", span));
                    }
                    _ => self.types.void(),
                }
            }
        };

        // Captured variables become the capture tuple, refs kept for
        // writable captures so stores stay visible.
        let mut capture_fields = Vec::new();
        let mut captures = Vec::new();
        for (index, var) in capture_sink.borrow().vars().iter().enumerate() {
            let field_ty = if var.by_ref {
                self.types.reference(var.ty)
            } else {
                var.ty
            };
            capture_fields.push(TupleField::named(var.name.clone(), field_ty));
            captures.push((
                var.name.clone(),
                FrameCapture {
                    index: index as u32,
                    ty: var.ty,
                    by_ref: var.by_ref,
                },
            ));
        }

        Ok(FunctionPlan {
            params,
            return_ty,
            capture_fields,
            captures,
        })
    }

    pub(crate) fn resolve_params(
        &mut self,
        params: &[Parameter],
        ctx: &GenContext,
    ) -> LowerResult<Vec<ParamSpec>> {
        // Parameter inference for lambdas reads the expected function
        // type at the call site.
        let expected: Vec<TypeId> = ctx
            .arg_type_dest
            .and_then(|dest| {
                self.types
                    .get(dest)
                    .as_signature()
                    .map(|(inputs, _)| inputs.to_vec())
            })
            .unwrap_or_default();

        let mut specs = Vec::with_capacity(params.len());
        for (index, param) in params.iter().enumerate() {
            let Some(ident) = param.pattern.as_identifier() else {
                return self.structural_error(param.span, "parameter patterns are not supported here");
            };
            let name = self.interner.resolve(ident.name).to_string();
            let mut ty = match &param.type_annotation {
                Some(annotation) => self.resolve_type(annotation, ctx)?,
                None => expected
                    .get(index)
                    .copied()
                    .unwrap_or_else(|| self.types.any()),
            };
            if param.is_optional && param.default_value.is_none() {
                ty = self.types.optional(ty);
            }
            if param.is_rest {
                ty = self.types.array(ty);
            }
            specs.push(ParamSpec {
                name,
                ty,
                default: param.default_value.clone(),
                span: param.span,
            });
        }
        Ok(specs)
    }

    /// Definitive function emission at module level.
    pub(crate) fn emit_function(
        &mut self,
        full_name: &str,
        plan: &FunctionPlan,
        this_ty: Option<TypeId>,
        body: &[Statement],
        ctx: &GenContext,
        span: Span,
    ) -> LowerResult<tsir_ir::OpId> {
        let body_ctx = GenContext {
            allow_partial_resolve: ctx.allow_partial_resolve,
            dummy_run: ctx.dummy_run,
            ..ctx.for_function(this_ty)
        };

        let module_block = self.builder.module().body_block();
        let saved = self.builder.insertion_point();
        self.builder.set_insertion_point_to_end(module_block);
        let result = self.emit_function_skeleton(
            full_name,
            &plan.params,
            plan.return_ty,
            this_ty,
            &plan.captures,
            body,
            &body_ctx,
            span,
        );
        self.builder.set_insertion_point(saved);
        result
    }

    /// Shared emission path for probes and definitive bodies.
    #[allow(clippy::too_many_arguments)]
    fn emit_function_skeleton(
        &mut self,
        full_name: &str,
        params: &[ParamSpec],
        return_ty: TypeId,
        this_ty: Option<TypeId>,
        captures: &[(String, FrameCapture)],
        body: &[Statement],
        ctx: &GenContext,
        span: Span,
    ) -> LowerResult<tsir_ir::OpId> {
        let capture_fields: Vec<TupleField> = captures
            .iter()
            .map(|(name, capture)| {
                let field_ty = if capture.by_ref {
                    self.types.reference(capture.ty)
                } else {
                    capture.ty
                };
                TupleField::named(name.clone(), field_ty)
            })
            .collect();

        let mut arg_types = Vec::new();
        if !capture_fields.is_empty() {
            arg_types.push(self.types.tuple(capture_fields));
        }
        if let Some(this_ty) = this_ty {
            arg_types.push(this_ty);
        }
        arg_types.extend(params.iter().map(|p| p.ty));

        let results = if return_ty == self.types.void() {
            vec![]
        } else {
            vec![return_ty]
        };
        let fn_ty = self.types.function(arg_types.clone(), results);

        let mut attrs = vec![attr_str("sym_name", full_name), attr_type("type", fn_ty)];
        if self.opts.enable_gc && !captures.is_empty() {
            attrs.push(attr_bool("gc", true));
        }

        let func_op = self
            .builder
            .create_op(OpKind::Func, vec![], &[], attrs, 1, span);
        let region = self.builder.op(func_op).regions[0];
        let entry = self.builder.create_block(region, &arg_types);

        let mut arg_index = 0;
        let capture_param = if !captures.is_empty() {
            let value = self.builder.module().block_arg(entry, arg_index).id;
            arg_index += 1;
            Some(value)
        } else {
            None
        };
        let this_value = if this_ty.is_some() {
            let value = self.builder.module().block_arg(entry, arg_index).id;
            arg_index += 1;
            Some(value)
        } else {
            None
        };

        let capture_map: FxHashMap<String, FrameCapture> = captures
            .iter()
            .map(|(name, capture)| (name.clone(), *capture))
            .collect();

        self.func_stack.push(FuncFrame {
            name: full_name.to_string(),
            func_op,
            entry_block: entry,
            return_ty,
            has_personality: false,
            is_generator: false,
            this_value,
            captures: capture_map,
            capture_param,
        });
        self.symbols.enter_function_scope();

        let saved = self.builder.insertion_point();
        self.builder.set_insertion_point_to_end(entry);

        let body_result = (|| -> LowerResult<()> {
            for (offset, param) in params.iter().enumerate() {
                let arg = self.builder.module().block_arg(entry, arg_index + offset);
                let value = match &param.default {
                    Some(default) => self.apply_param_default(arg, default, ctx, param.span)?,
                    None => arg,
                };
                // Parameters get local slots so the body may write them.
                let ref_ty = self.types.reference(param.ty);
                let slot = self.emit_op(
                    OpKind::Variable,
                    vec![value.id],
                    &[ref_ty],
                    vec![attr_str("name", &param.name)],
                    param.span,
                );
                let slot = self.builder.result(slot);
                let info = crate::symbols::VariableInfo {
                    name: param.name.clone(),
                    full_name: param.name.clone(),
                    ty: param.ty,
                    location: param.span,
                    read_write: true,
                    storage: crate::symbols::VarStorage::Local(slot.id),
                    func_level: 0,
                };
                if self.symbols.declare(&param.name, info, true).is_err() {
                    return self.structural_error(
                        param.span,
                        format!("duplicate parameter '{}'", param.name),
                    );
                }
            }

            self.lower_block_body(body, &ctx.for_block())
        })();

        // Guarantee a trailing return on an open fall-through path.
        if body_result.is_ok() && !self.current_block_terminated() {
            self.emit_op(OpKind::ReturnVal, vec![], &[], vec![], span);
        }

        self.builder.set_insertion_point(saved);
        self.symbols.leave_scope();
        let frame = self.func_stack.pop().expect("frame pushed above");
        if frame.has_personality {
            self.builder
                .op_mut(func_op)
                .set_attr("personality", tsir_ir::Attribute::Bool(true));
        }

        body_result?;
        Ok(func_op)
    }

    /// `x: T = d` selects the default when the argument is undefined.
    fn apply_param_default(
        &mut self,
        arg: Value,
        default: &Expression,
        ctx: &GenContext,
        span: Span,
    ) -> LowerResult<Value> {
        let stripped = self.types.strip_optional(arg.ty);
        let null_ty = self.types.null();
        let bool_ty = self.types.boolean();
        let nil = self.emit_undef(null_ty, span);
        let present = self.emit_op(
            OpKind::Binary,
            vec![arg.id, nil.id],
            &[bool_ty],
            vec![(
                "binop".to_string(),
                tsir_ir::Attribute::BinOp(tsir_ir::BinOp::Ne),
            )],
            span,
        );
        let present = self.builder.result(present);

        let if_op = self
            .builder
            .create_op(OpKind::If, vec![present.id], &[stripped], vec![], 2, span);
        let then_region = self.builder.op(if_op).regions[0];
        let else_region = self.builder.op(if_op).regions[1];
        let then_block = self.builder.create_block(then_region, &[]);
        let else_block = self.builder.create_block(else_region, &[]);

        let saved = self.builder.insertion_point();
        self.builder.set_insertion_point_to_end(then_block);
        let narrowed = self.emit_op(OpKind::Cast, vec![arg.id], &[stripped], vec![], span);
        let narrowed = self.builder.result(narrowed);
        self.emit_op(OpKind::ReturnVal, vec![narrowed.id], &[], vec![], span);

        self.builder.set_insertion_point_to_end(else_block);
        let fallback = match self.lower_expr(default, ctx) {
            Ok(value) => value,
            Err(err) => {
                self.builder.set_insertion_point(saved);
                return Err(err);
            }
        };
        let fallback = self.coerce(fallback, stripped, span)?;
        self.emit_op(OpKind::ReturnVal, vec![fallback.id], &[], vec![], span);
        self.builder.set_insertion_point(saved);

        Ok(self.builder.result(if_op))
    }

    // ── Closures ────────────────────────────────────────────────────────

    /// Arrow functions become module-level functions carrying a capture
    /// tuple; the use site materializes a trampoline or bound function.
    pub(crate) fn lower_arrow(&mut self, arrow: &ArrowFunction, ctx: &GenContext) -> LowerResult<Value> {
        if arrow.is_async && !self.opts.enable_async {
            return self.structural_error(arrow.span, "'async' arrows require async support");
        }
        let body: Vec<Statement> = match &arrow.body {
            ArrowBody::Expression(expr) => vec![Statement::Return(ReturnStatement {
                value: Some((**expr).clone()),
                span: arrow.span,
            })],
            ArrowBody::Block(block) => block.statements.clone(),
        };
        self.lower_closure(&arrow.params, arrow.return_type.as_ref(), &body, None, ctx, arrow.span)
    }

    pub(crate) fn lower_function_expr(
        &mut self,
        func: &FunctionExpression,
        ctx: &GenContext,
    ) -> LowerResult<Value> {
        if func.is_generator {
            return self.lower_generator_expr(func, ctx);
        }
        self.lower_closure(
            &func.params,
            func.return_type.as_ref(),
            &func.body.statements,
            None,
            ctx,
            func.span,
        )
    }

    /// A nested function declaration is a closure bound to its name.
    pub(crate) fn lower_nested_function(
        &mut self,
        func: &FunctionDecl,
        ctx: &GenContext,
    ) -> LowerResult<()> {
        if self.func_stack.is_empty() {
            // Module level reached through statement dispatch.
            return self.lower_function_decl(func, ctx);
        }
        if func.is_generator {
            let value = self.lower_generator_expr(
                &FunctionExpression {
                    name: Some(func.name),
                    params: func.params.clone(),
                    return_type: func.return_type.clone(),
                    body: func.body.clone(),
                    is_async: func.is_async,
                    is_generator: true,
                    span: func.span,
                },
                ctx,
            )?;
            let name = self.interner.resolve(func.name.name).to_string();
            return self.declare_value_binding(&name, value, false, func.span);
        }
        let value = self.lower_closure(
            &func.params,
            func.return_type.as_ref(),
            &func.body.statements,
            None,
            ctx,
            func.span,
        )?;
        let name = self.interner.resolve(func.name.name).to_string();
        self.declare_value_binding(&name, value, false, func.span)
    }

    /// Shared closure path: plan, emit at module level under a fresh
    /// symbol, and produce the use-site value.
    pub(crate) fn lower_closure(
        &mut self,
        params: &[Parameter],
        return_annotation: Option<&TypeNode>,
        body: &[Statement],
        this_ty: Option<TypeId>,
        ctx: &GenContext,
        span: Span,
    ) -> LowerResult<Value> {
        let plan = self.plan_function(params, return_annotation, body, this_ty, ctx, span)?;
        let name = self.fresh_name("__lambda");
        let full_name = self.symbols.qualify(&name);
        let ty = plan.function_type(self, this_ty);

        if !ctx.dummy_run {
            self.emit_function(&full_name, &plan, this_ty, body, ctx, span)?;
        }

        let entry = FunctionEntry {
            full_name,
            ty,
            capture_fields: plan.capture_fields,
            op: None,
            is_generator: false,
            is_async: false,
        };
        Ok(self.function_value(&entry, span, ctx))
    }

    // ── Object-literal methods ──────────────────────────────────────────

    /// The layout-phase placeholder type of an object method: a function
    /// whose `this` is opaque.
    pub(crate) fn method_prototype_type(
        &mut self,
        function: &FunctionExpression,
        this_placeholder: TypeId,
        ctx: &GenContext,
    ) -> LowerResult<TypeId> {
        let params = self.resolve_params(&function.params, ctx)?;
        let mut inputs = vec![this_placeholder];
        inputs.extend(params.iter().map(|p| p.ty));
        let results = match &function.return_type {
            Some(annotation) => {
                let ty = self.resolve_type(annotation, ctx)?;
                if ty == self.types.void() {
                    vec![]
                } else {
                    vec![ty]
                }
            }
            None => vec![self.types.any()],
        };
        Ok(self.types.function(inputs, results))
    }

    /// Phase-two lowering of an object-literal method against the
    /// finished object type.
    pub(crate) fn lower_object_method(
        &mut self,
        name: &str,
        function: &FunctionExpression,
        object_ty: TypeId,
        ctx: &GenContext,
    ) -> LowerResult<Value> {
        let plan = self.plan_function(
            &function.params,
            function.return_type.as_ref(),
            &function.body.statements,
            Some(object_ty),
            ctx,
            function.span,
        )?;

        let symbol = {
            let fresh = self.fresh_name(&format!("__object_{}", name));
            self.symbols.qualify(&fresh)
        };
        let ty = plan.function_type(self, Some(object_ty));

        if !ctx.dummy_run {
            self.emit_function(&symbol, &plan, Some(object_ty), &function.body.statements, ctx, function.span)?;
        }

        if plan.capture_fields.is_empty() {
            return Ok(self.emit_symbol_ref(&symbol, ty, function.span));
        }

        // Object-method captures pick trampoline or bound function per
        // configuration.
        let entry = FunctionEntry {
            full_name: symbol,
            ty,
            capture_fields: plan.capture_fields,
            op: None,
            is_generator: false,
            is_async: false,
        };
        if self.opts.bind_object_methods() {
            let saved = self.opts.replace_trampoline_with_bound_function;
            self.opts.replace_trampoline_with_bound_function = true;
            let value = self.function_value(&entry, function.span, ctx);
            self.opts.replace_trampoline_with_bound_function = saved;
            Ok(value)
        } else {
            Ok(self.function_value(&entry, function.span, ctx))
        }
    }

}
