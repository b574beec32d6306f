//! Class object model
//!
//! Class lowering runs in ordered phases: registration, heritage,
//! RTTI synthesis, storage layout, statics, default constructors,
//! method bodies (with constructor-injected initializers), virtual-slot
//! assignment, the per-class vtable global, and per-interface adapter
//! tables. A forward reference at any phase fails soft and re-enters
//! the outer fixpoint.

use super::func::ParamSpec;
use super::{attr_str, attr_type, CoreCompiler};
use crate::context::GenContext;
use crate::error::{LowerError, LowerResult};
use crate::model::{
    AccessorInfo, AdapterSlot, ClassInfo, ImplementInfo, InterfaceMemberInfo, MethodInfo,
};
use crate::symbols::ClassId;
use tsir_ast::ast::*;
use tsir_ast::{build, Span};
use tsir_ir::{Attribute, BinOp, OpKind, Value};
use tsir_types::{FieldId, TupleField, Type, TypeId};

/// One method gathered from the class body before lowering.
struct MemberPlan {
    name: String,
    kind: MethodKind,
    params: Vec<Parameter>,
    return_type: Option<TypeNode>,
    body: Option<Vec<Statement>>,
    is_static: bool,
    is_abstract: bool,
    span: Span,
}

impl<'a> CoreCompiler<'a> {
    pub(crate) fn lower_class_decl(&mut self, decl: &ClassDecl, ctx: &GenContext) -> LowerResult<()> {
        let name = self.interner.resolve(decl.name.name).to_string();
        let full_name = self.symbols.qualify(&name);

        // Phase 1: register the class name; the remaining phases populate
        // the info in place.
        let class_id = self.register_class_name(&name, &full_name, decl.is_abstract);
        if self.class(class_id).processed && !ctx.dummy_run {
            return Ok(());
        }

        // Phase 2: heritage links, fail-soft.
        let base_classes = self.resolve_heritage(&decl.extends, decl.span, ctx)?;
        let implements = self.resolve_implements(&decl.implements, decl.span, ctx)?;

        // Snapshot virtual markings so re-lowering keeps stable slots.
        let previous_methods: Vec<MethodInfo> = self.class(class_id).methods.clone();

        // Collect member plans.
        let mut members: Vec<MemberPlan> = Vec::new();
        let mut fields: Vec<(String, TypeId, Option<Expression>)> = Vec::new();
        let mut static_fields: Vec<(String, TypeId, Option<Expression>)> = Vec::new();
        for member in &decl.members {
            match member {
                ClassMember::Field(field) => {
                    let field_name = self.property_name(&field.name);
                    let ty = match &field.type_annotation {
                        Some(annotation) => self.resolve_type(annotation, ctx)?,
                        None => match &field.initializer {
                            Some(init) => self.probe_expr_type(init, ctx)?,
                            None => self.types.any(),
                        },
                    };
                    if field.is_static {
                        static_fields.push((field_name, ty, field.initializer.clone()));
                    } else {
                        fields.push((field_name, ty, field.initializer.clone()));
                    }
                }
                ClassMember::Method(method) => {
                    let method_name = self.property_name(&method.name);
                    members.push(MemberPlan {
                        name: method_name,
                        kind: method.kind,
                        params: method.params.clone(),
                        return_type: method.return_type.clone(),
                        body: method.body.as_ref().map(|b| b.statements.clone()),
                        is_static: method.is_static,
                        is_abstract: method.is_abstract,
                        span: method.span,
                    });
                }
            }
        }

        // Constructor parameter properties become fields.
        let ctor_plan = members.iter().find(|m| m.kind == MethodKind::Constructor);
        let mut param_properties: Vec<(String, TypeId)> = Vec::new();
        if let Some(ctor) = ctor_plan {
            for param in &ctor.params {
                if param.visibility.is_some() {
                    if let Some(ident) = param.pattern.as_identifier() {
                        let pname = self.interner.resolve(ident.name).to_string();
                        let ty = match &param.type_annotation {
                            Some(annotation) => self.resolve_type(annotation, ctx)?,
                            None => self.types.any(),
                        };
                        param_properties.push((pname, ty));
                    }
                }
            }
        }

        let has_constructor = members.iter().any(|m| m.kind == MethodKind::Constructor);
        let has_initializers = fields.iter().any(|(_, _, init)| init.is_some());

        // Phase 3: RTTI static field plus the synthesized virtual
        // `.instanceof(rtti_name)` method.
        let has_rtti = self.opts.enable_rtti;
        if has_rtti {
            let string_ty = self.types.string();
            if !static_fields.iter().any(|(n, _, _)| n == "rtti") {
                static_fields.push((
                    "rtti".to_string(),
                    string_ty,
                    Some(build::string(self.interner.intern(&full_name))),
                ));
            }
        }
        let has_static_initializers = static_fields.iter().any(|(_, _, init)| init.is_some());

        // Phase 8 (slot assignment precedes layout so the vtable field
        // is known): walk methods in declaration order, reusing parent
        // slots for overrides.
        let inherited_slots = base_classes
            .iter()
            .map(|&base| self.class(base).virtual_slot_count())
            .max()
            .unwrap_or(0);
        let mut next_slot = inherited_slots;
        let mut method_infos: Vec<MethodInfo> = Vec::new();

        let mut plan_method_info = |compiler: &mut Self,
                                    plan_name: &str,
                                    is_static: bool,
                                    is_abstract: bool|
         -> (bool, Option<u32>) {
            if is_static {
                return (false, None);
            }
            // An override reuses the parent's slot.
            if let Some((base_virtual, base_index)) =
                compiler.find_base_method_slot(&base_classes, plan_name)
            {
                if base_virtual {
                    return (true, base_index);
                }
            }
            let previous = previous_methods.iter().find(|m| m.name == plan_name);
            let mut is_virtual = is_abstract
                || compiler.opts.all_methods_virtual
                || previous.map(|m| m.is_virtual).unwrap_or(false);
            if plan_name == "instanceof" {
                is_virtual = true;
            }
            if is_virtual {
                if let Some(index) = previous.and_then(|m| m.virtual_index) {
                    return (true, Some(index));
                }
                let index = next_slot;
                next_slot += 1;
                (true, Some(index))
            } else {
                (false, None)
            }
        };

        for plan in &members {
            if plan.kind == MethodKind::Getter || plan.kind == MethodKind::Setter {
                continue;
            }
            let method_name = if plan.kind == MethodKind::Constructor {
                "constructor".to_string()
            } else {
                plan.name.clone()
            };
            let (is_virtual, virtual_index) = if plan.kind == MethodKind::Constructor {
                (false, None)
            } else {
                plan_method_info(self, &method_name, plan.is_static, plan.is_abstract)
            };
            method_infos.push(MethodInfo {
                name: method_name,
                func_ty: self.types.any(),
                func_op: None,
                is_static: plan.is_static,
                is_virtual,
                is_abstract: plan.is_abstract,
                virtual_index,
            });
        }

        if has_rtti && !method_infos.iter().any(|m| m.name == "instanceof") {
            let (is_virtual, virtual_index) = plan_method_info(self, "instanceof", false, false);
            let string_ty = self.types.string();
            let bool_ty = self.types.boolean();
            let class_ty = self.class(class_id).ty;
            let func_ty = self
                .types
                .function(vec![class_ty, string_ty], vec![bool_ty]);
            method_infos.push(MethodInfo {
                name: "instanceof".to_string(),
                func_ty,
                func_op: None,
                is_static: false,
                is_virtual,
                is_abstract: false,
                virtual_index,
            });
        }

        let has_virtual_table =
            next_slot > 0 || method_infos.iter().any(|m| m.virtual_index.is_some());

        // Phase 4: storage layout. Base-class fields come first, then a
        // leading vtable slot when any virtual member exists.
        let mut storage_fields: Vec<TupleField> = Vec::new();
        if has_virtual_table {
            let opaque = self.types.opaque();
            storage_fields.push(TupleField::named("vtable", opaque));
        }
        for &base in &base_classes {
            let base_storage = self.class(base).storage_ty;
            if let Some(base_fields) = self.types.get(base_storage).as_tuple_fields() {
                for field in base_fields {
                    if field.id.as_name() == Some("vtable") {
                        continue;
                    }
                    if !storage_fields.iter().any(|f| f.id == field.id) {
                        storage_fields.push(field.clone());
                    }
                }
            }
        }
        for (field_name, ty, _) in &fields {
            if !storage_fields.iter().any(|f| f.id.as_name() == Some(field_name)) {
                storage_fields.push(TupleField::named(field_name.clone(), *ty));
            }
        }
        for (pname, ty) in &param_properties {
            if !storage_fields.iter().any(|f| f.id.as_name() == Some(pname)) {
                storage_fields.push(TupleField::named(pname.clone(), *ty));
            }
        }
        let storage_ty = self.types.class_storage(full_name.clone(), storage_fields.clone());

        // Phase 5: statics are globals under the class fqn prefix.
        let static_field_list: Vec<(String, TypeId)> = static_fields
            .iter()
            .map(|(n, ty, _)| (n.clone(), *ty))
            .collect();

        // Phase 6: a default constructor exists iff initializers do and
        // none was declared.
        let synthesized_ctor = has_initializers && !has_constructor;

        {
            let info = self.class_mut(class_id);
            info.base_classes = base_classes.clone();
            info.implements = implements.clone();
            info.fields = storage_fields;
            info.static_fields = static_field_list;
            info.methods = method_infos;
            info.storage_ty = storage_ty;
            info.has_virtual_table = has_virtual_table;
            info.is_abstract = decl.is_abstract;
            info.has_constructor = has_constructor || synthesized_ctor;
            info.has_static_constructor = has_static_initializers;
            info.has_initializers = has_initializers;
            info.has_rtti = has_rtti;
        }

        // Concrete classes must implement every inherited abstract
        // method.
        if !decl.is_abstract {
            self.check_abstract_coverage(class_id, decl.span)?;
        }

        // Phase 7: lower member bodies under `this: C`, constructors
        // with injected initializer assignments, via an internal
        // fixpoint (members may reference each other).
        self.lower_class_members(
            class_id,
            &members,
            &fields,
            ctor_plan.map(|c| c.params.clone()),
            synthesized_ctor,
            ctx,
            decl.span,
        )?;

        // Statics and tables are definitive-pass output.
        if !ctx.dummy_run {
            self.emit_static_fields(class_id, &static_fields, ctx)?;
            if has_rtti {
                self.emit_instanceof_method(class_id, decl.span)?;
            }
            // Phases 9 and 10: the vtable global and the per-interface
            // adapter tables.
            if self.class(class_id).has_virtual_table || !implements.is_empty() {
                self.emit_class_tables(class_id, decl.span)?;
            }
        }

        self.class_mut(class_id).processed = true;
        Ok(())
    }

    fn register_class_name(&mut self, name: &str, full_name: &str, is_abstract: bool) -> ClassId {
        if let Some(&existing) = self.class_by_fqn.get(full_name) {
            return existing;
        }
        let empty_storage = self.types.class_storage(full_name.to_string(), vec![]);
        let ty = self.types.class(full_name.to_string(), empty_storage);
        let id = ClassId(self.classes.len() as u32);
        self.classes.push(ClassInfo {
            name: name.to_string(),
            full_name: full_name.to_string(),
            base_classes: Vec::new(),
            implements: Vec::new(),
            fields: Vec::new(),
            static_fields: Vec::new(),
            methods: Vec::new(),
            accessors: Vec::new(),
            ty,
            storage_ty: empty_storage,
            has_virtual_table: false,
            is_abstract,
            has_constructor: false,
            has_static_constructor: false,
            has_initializers: false,
            has_rtti: false,
            processed: false,
        });
        self.class_by_fqn.insert(full_name.to_string(), id);
        let current = self.symbols.current_namespace();
        self.symbols
            .namespace_mut(current)
            .classes
            .insert(name.to_string(), id);
        id
    }

    fn resolve_heritage(
        &mut self,
        extends: &[TypeNode],
        span: Span,
        ctx: &GenContext,
    ) -> LowerResult<Vec<ClassId>> {
        let mut bases = Vec::with_capacity(extends.len());
        for heritage in extends {
            let ty = self.resolve_type(heritage, ctx)?;
            match self.types.get(ty).clone() {
                Type::Class { name, .. } => match self.class_by_fqn.get(&name).copied() {
                    Some(id) if self.class(id).processed || !ctx.dummy_run => bases.push(id),
                    Some(id) => {
                        // Base registered but not yet populated: wait for
                        // the fixpoint to finish it first.
                        if self.class(id).fields.is_empty() && !self.class(id).processed {
                            return Err(LowerError::unresolved(name, span));
                        }
                        bases.push(id);
                    }
                    None => return Err(LowerError::unresolved(name, span)),
                },
                other => {
                    let shown = self.types.display(ty);
                    let _ = other;
                    return self.structural_error(
                        span,
                        format!("cannot extend non-class type '{}'", shown),
                    );
                }
            }
        }
        Ok(bases)
    }

    fn resolve_implements(
        &mut self,
        implements: &[TypeNode],
        span: Span,
        ctx: &GenContext,
    ) -> LowerResult<Vec<ImplementInfo>> {
        let mut resolved = Vec::with_capacity(implements.len());
        for heritage in implements {
            let ty = self.resolve_type(heritage, ctx)?;
            match self.types.get(ty) {
                Type::Interface { name } => match self.iface_by_fqn.get(name).copied() {
                    Some(id) => resolved.push(ImplementInfo {
                        iface: id,
                        vtable_slot: None,
                        processed: false,
                    }),
                    None => return Err(LowerError::unresolved(name.clone(), span)),
                },
                _ => {
                    let shown = self.types.display(ty);
                    return self.structural_error(
                        span,
                        format!("cannot implement non-interface type '{}'", shown),
                    );
                }
            }
        }
        Ok(resolved)
    }

    /// Probe an initializer's type without committing output.
    fn probe_expr_type(&mut self, expr: &Expression, ctx: &GenContext) -> LowerResult<TypeId> {
        let probe_ctx = GenContext {
            allow_partial_resolve: true,
            dummy_run: true,
            ..ctx.clone()
        };
        self.begin_probe();
        let result = self.lower_expr(expr, &probe_ctx);
        self.end_probe();
        let value = result?;
        Ok(self.types.widen(value.ty))
    }

    fn find_base_method_slot(
        &self,
        bases: &[ClassId],
        method_name: &str,
    ) -> Option<(bool, Option<u32>)> {
        for &base in bases {
            let info = self.class(base);
            if let Some(method) = info.method(method_name) {
                return Some((method.is_virtual, method.virtual_index));
            }
            if let Some(found) = self.find_base_method_slot(&info.base_classes, method_name) {
                return Some(found);
            }
        }
        None
    }

    fn check_abstract_coverage(&mut self, class_id: ClassId, span: Span) -> LowerResult<()> {
        let mut missing: Vec<String> = Vec::new();
        let info = self.class(class_id);
        for &base in &info.base_classes {
            let base_info = self.class(base);
            for method in &base_info.methods {
                if method.is_abstract && info.method(&method.name).is_none() {
                    missing.push(method.name.clone());
                }
            }
        }
        if let Some(name) = missing.first() {
            let class_name = self.class(class_id).name.clone();
            return self.structural_error(
                span,
                format!(
                    "class '{}' does not implement inherited abstract method '{}'",
                    class_name, name
                ),
            );
        }
        Ok(())
    }

    /// Phase 7: member bodies under an internal fixpoint.
    #[allow(clippy::too_many_arguments)]
    fn lower_class_members(
        &mut self,
        class_id: ClassId,
        members: &[MemberPlan],
        fields: &[(String, TypeId, Option<Expression>)],
        ctor_params: Option<Vec<Parameter>>,
        synthesized_ctor: bool,
        ctx: &GenContext,
        span: Span,
    ) -> LowerResult<()> {
        let this_ty = self.class(class_id).ty;
        let full_name = self.class(class_id).full_name.clone();

        // Constructor-injected statements: field initializers first,
        // then parameter-property assignments.
        let mut injected: Vec<Statement> = Vec::new();
        for (field_name, _, init) in fields {
            if let Some(init) = init {
                let field_sym = self.interner.intern(field_name);
                injected.push(build::expr_stmt(build::assign(
                    build::member(build::this(), field_sym),
                    init.clone(),
                )));
            }
        }
        if let Some(params) = &ctor_params {
            for param in params {
                if param.visibility.is_some() {
                    if let Some(ident) = param.pattern.as_identifier() {
                        injected.push(build::expr_stmt(build::assign(
                            build::member(build::this(), ident.name),
                            build::ident_expr(ident.name),
                        )));
                    }
                }
            }
        }

        // Method prototypes resolve before any body, so members can
        // reference each other regardless of declaration order.
        for plan in members {
            if plan.kind != MethodKind::Method {
                continue;
            }
            let params = self.resolve_params(&plan.params, ctx)?;
            let return_ty = match &plan.return_type {
                Some(annotation) => self.resolve_type(annotation, ctx)?,
                None => self.types.undef_placeholder(),
            };
            let mut inputs = Vec::new();
            if !plan.is_static {
                inputs.push(this_ty);
            }
            inputs.extend(params.iter().map(|p| p.ty));
            let results = if return_ty == self.types.void() {
                vec![]
            } else {
                vec![return_ty]
            };
            let func_ty = self.types.function(inputs, results);
            if let Some(method) = self.class_mut(class_id).method_mut(&plan.name) {
                method.func_ty = func_ty;
            }
        }

        // Internal fixpoint: methods can reference other members that
        // have not been lowered yet.
        let mut pending: Vec<usize> = (0..members.len()).collect();
        loop {
            let mut still_pending = Vec::new();
            let mut progressed = false;
            for &index in &pending {
                let plan = &members[index];
                match self.lower_one_member(class_id, &full_name, this_ty, plan, &injected, ctx) {
                    Ok(()) => progressed = true,
                    Err(LowerError::Unresolved { .. }) => still_pending.push(index),
                    Err(err) => return Err(err),
                }
            }
            if still_pending.is_empty() {
                break;
            }
            if !progressed {
                let plan = &members[still_pending[0]];
                return Err(LowerError::unresolved(plan.name.clone(), plan.span));
            }
            pending = still_pending;
        }

        // Synthesized default constructor assigns the declared
        // initializers.
        if synthesized_ctor {
            let default_ctor = MemberPlan {
                name: "constructor".to_string(),
                kind: MethodKind::Constructor,
                params: Vec::new(),
                return_type: None,
                body: Some(Vec::new()),
                is_static: false,
                is_abstract: false,
                span,
            };
            self.lower_one_member(class_id, &full_name, this_ty, &default_ctor, &injected, ctx)?;
        }
        Ok(())
    }

    fn lower_one_member(
        &mut self,
        class_id: ClassId,
        class_fqn: &str,
        this_ty: TypeId,
        plan: &MemberPlan,
        ctor_injected: &[Statement],
        ctx: &GenContext,
    ) -> LowerResult<()> {
        match plan.kind {
            MethodKind::Constructor => {
                let symbol = format!("{}.constructor", class_fqn);
                let mut body: Vec<Statement> = ctor_injected.to_vec();
                if let Some(declared) = &plan.body {
                    body.extend(declared.iter().cloned());
                }
                let function_plan = self.plan_function(
                    &plan.params,
                    None,
                    &body,
                    Some(this_ty),
                    ctx,
                    plan.span,
                )?;
                let func_ty = function_plan.function_type(self, Some(this_ty));
                if !ctx.dummy_run {
                    let op =
                        self.emit_function(&symbol, &function_plan, Some(this_ty), &body, ctx, plan.span)?;
                    if let Some(method) = self.class_mut(class_id).method_mut("constructor") {
                        method.func_op = Some(op);
                    }
                }
                if let Some(method) = self.class_mut(class_id).method_mut("constructor") {
                    method.func_ty = func_ty;
                } else {
                    self.class_mut(class_id).methods.push(MethodInfo {
                        name: "constructor".to_string(),
                        func_ty,
                        func_op: None,
                        is_static: false,
                        is_virtual: false,
                        is_abstract: false,
                        virtual_index: None,
                    });
                }
                Ok(())
            }
            MethodKind::Method => {
                let this_for_method = if plan.is_static { None } else { Some(this_ty) };
                let symbol = format!("{}.{}", class_fqn, plan.name);

                if plan.is_abstract || plan.body.is_none() {
                    // Prototype only: record the type; dispatch goes
                    // through the vtable slot.
                    let params = self.resolve_params(&plan.params, ctx)?;
                    let return_ty = match &plan.return_type {
                        Some(annotation) => self.resolve_type(annotation, ctx)?,
                        None => self.types.void(),
                    };
                    let mut inputs = vec![this_ty];
                    inputs.extend(params.iter().map(|p: &ParamSpec| p.ty));
                    let results = if return_ty == self.types.void() {
                        vec![]
                    } else {
                        vec![return_ty]
                    };
                    let func_ty = self.types.function(inputs, results);
                    if let Some(method) = self.class_mut(class_id).method_mut(&plan.name) {
                        method.func_ty = func_ty;
                    }
                    return Ok(());
                }

                let body = plan.body.as_ref().expect("checked above");
                let function_plan = self.plan_function(
                    &plan.params,
                    plan.return_type.as_ref(),
                    body,
                    this_for_method,
                    ctx,
                    plan.span,
                )?;
                let func_ty = function_plan.function_type(self, this_for_method);
                if !ctx.dummy_run {
                    let op = self.emit_function(
                        &symbol,
                        &function_plan,
                        this_for_method,
                        body,
                        ctx,
                        plan.span,
                    )?;
                    if let Some(method) = self.class_mut(class_id).method_mut(&plan.name) {
                        method.func_op = Some(op);
                    }
                }
                if let Some(method) = self.class_mut(class_id).method_mut(&plan.name) {
                    method.func_ty = func_ty;
                }
                Ok(())
            }
            MethodKind::Getter | MethodKind::Setter => {
                let prefix = if plan.kind == MethodKind::Getter {
                    "get_"
                } else {
                    "set_"
                };
                let symbol = format!("{}.{}{}", class_fqn, prefix, plan.name);
                let body = plan.body.clone().unwrap_or_default();
                let function_plan = self.plan_function(
                    &plan.params,
                    plan.return_type.as_ref(),
                    &body,
                    Some(this_ty),
                    ctx,
                    plan.span,
                )?;
                let accessor_ty = if plan.kind == MethodKind::Getter {
                    function_plan.return_ty
                } else {
                    function_plan
                        .params
                        .first()
                        .map(|p| p.ty)
                        .unwrap_or_else(|| self.types.any())
                };
                if !ctx.dummy_run {
                    self.emit_function(&symbol, &function_plan, Some(this_ty), &body, ctx, plan.span)?;
                }

                let is_virtual = self.opts.all_methods_virtual;
                let info = self.class_mut(class_id);
                match info.accessors.iter_mut().find(|a| a.name == plan.name) {
                    Some(accessor) => {
                        if plan.kind == MethodKind::Getter {
                            accessor.getter = Some(symbol);
                        } else {
                            accessor.setter = Some(symbol);
                        }
                    }
                    None => {
                        let (getter, setter) = if plan.kind == MethodKind::Getter {
                            (Some(symbol), None)
                        } else {
                            (None, Some(symbol))
                        };
                        info.accessors.push(AccessorInfo {
                            name: plan.name.clone(),
                            getter,
                            setter,
                            ty: accessor_ty,
                            is_static: plan.is_static,
                            is_virtual,
                        });
                    }
                }
                Ok(())
            }
        }
    }

    fn emit_static_fields(
        &mut self,
        class_id: ClassId,
        static_fields: &[(String, TypeId, Option<Expression>)],
        ctx: &GenContext,
    ) -> LowerResult<()> {
        if static_fields.is_empty() {
            return Ok(());
        }
        let full_name = self.class(class_id).full_name.clone();

        let body = self.builder.module().body_block();
        let saved = self.builder.insertion_point();
        self.builder.set_insertion_point_to_end(body);
        for (field_name, ty, _) in static_fields {
            let symbol = format!("{}.{}", full_name, field_name);
            self.builder.create_op(
                OpKind::Global,
                vec![],
                &[],
                vec![attr_str("sym_name", &symbol), attr_type("type", *ty)],
                0,
                Span::synthetic(),
            );
        }
        self.builder.set_insertion_point(saved);

        // Static initializers run in the class's static constructor.
        let with_inits: Vec<_> = static_fields
            .iter()
            .filter(|(_, _, init)| init.is_some())
            .collect();
        if with_inits.is_empty() {
            return Ok(());
        }

        let saved = self.builder.insertion_point();
        self.builder.set_insertion_point_to_end(body);
        let ctor_op = self.builder.create_op(
            OpKind::GlobalConstructor,
            vec![],
            &[],
            vec![attr_str("sym_name", &format!("{}.__static_init", full_name))],
            1,
            Span::synthetic(),
        );
        let region = self.builder.op(ctor_op).regions[0];
        let block = self.builder.create_block(region, &[]);
        self.builder.set_insertion_point_to_end(block);
        for (field_name, ty, init) in static_fields {
            let Some(init) = init else { continue };
            let value = self.lower_expr(init, ctx)?;
            let value = self.coerce(value, *ty, Span::synthetic())?;
            let symbol = format!("{}.{}", full_name, field_name);
            let ref_ty = self.types.reference(*ty);
            let addr = self.emit_op(
                OpKind::AddressOf,
                vec![],
                &[ref_ty],
                vec![attr_str("sym_name", &symbol)],
                Span::synthetic(),
            );
            let addr = self.builder.result(addr);
            self.emit_store(addr.id, value.id, Span::synthetic());
        }
        self.builder.set_insertion_point(saved);
        Ok(())
    }

    /// The synthesized `instanceof` body:
    /// `this.rtti == arg || super.instanceof(arg)`.
    fn emit_instanceof_method(&mut self, class_id: ClassId, span: Span) -> LowerResult<()> {
        let info = self.class(class_id).clone();
        let symbol = format!("{}.instanceof", info.full_name);
        let string_ty = self.types.string();
        let bool_ty = self.types.boolean();
        let fn_ty = self.types.function(vec![info.ty, string_ty], vec![bool_ty]);

        let body_block = self.builder.module().body_block();
        let saved = self.builder.insertion_point();
        self.builder.set_insertion_point_to_end(body_block);
        let func_op = self.builder.create_op(
            OpKind::Func,
            vec![],
            &[],
            vec![attr_str("sym_name", &symbol), attr_type("type", fn_ty)],
            1,
            span,
        );
        let region = self.builder.op(func_op).regions[0];
        let entry = self.builder.create_block(region, &[info.ty, string_ty]);
        let this_value = self.builder.module().block_arg(entry, 0);
        let rtti_arg = self.builder.module().block_arg(entry, 1);

        self.builder.set_insertion_point_to_end(entry);
        let rtti_sym = format!("{}.rtti", info.full_name);
        let ref_ty = self.types.reference(string_ty);
        let addr = self.emit_op(
            OpKind::AddressOf,
            vec![],
            &[ref_ty],
            vec![attr_str("sym_name", &rtti_sym)],
            span,
        );
        let addr = self.builder.result(addr);
        let own_rtti = self.emit_load(addr.id, string_ty, span);
        let eq = self.emit_op(
            OpKind::Binary,
            vec![own_rtti.id, rtti_arg.id],
            &[bool_ty],
            vec![("binop".to_string(), Attribute::BinOp(BinOp::Eq))],
            span,
        );
        let mut result = self.builder.result(eq);

        if let Some(&base) = info.base_classes.first() {
            let base_info = self.class(base).clone();
            let upcast = self.emit_op(OpKind::Cast, vec![this_value.id], &[base_info.ty], vec![], span);
            let upcast = self.builder.result(upcast);
            let base_call = self.emit_op(
                OpKind::Call,
                vec![upcast.id, rtti_arg.id],
                &[bool_ty],
                vec![attr_str("callee", &format!("{}.instanceof", base_info.full_name))],
                span,
            );
            let base_call = self.builder.result(base_call);
            let or = self.emit_op(
                OpKind::Binary,
                vec![result.id, base_call.id],
                &[bool_ty],
                vec![("binop".to_string(), Attribute::BinOp(BinOp::Or))],
                span,
            );
            result = self.builder.result(or);
        }
        self.emit_op(OpKind::ReturnVal, vec![result.id], &[], vec![], span);
        self.builder.set_insertion_point(saved);

        if let Some(method) = self.class_mut(class_id).method_mut("instanceof") {
            method.func_op = Some(func_op);
        }
        Ok(())
    }

    /// Phases 9 and 10: the per-class vtable global, interface adapter
    /// slots appended after method entries, and one adapter table per
    /// `implements`.
    fn emit_class_tables(&mut self, class_id: ClassId, span: Span) -> LowerResult<()> {
        let info = self.class(class_id).clone();

        // Method slots in index order (inherited slots included).
        let slot_count = self.total_slot_count(class_id);
        let mut entries: Vec<Attribute> = vec![Attribute::Int(-1); slot_count as usize];
        self.fill_vtable_entries(&info, &mut entries);

        // Interface adapter pointers follow; inherited interface tables
        // are copied unchanged from base classes.
        let mut adapters: Vec<(String, crate::symbols::InterfaceId)> = Vec::new();
        self.collect_class_adapters(class_id, &mut adapters);
        let mut implement_slots = Vec::new();
        for (adapter_symbol, _) in &adapters {
            implement_slots.push(entries.len() as u32);
            entries.push(Attribute::Str(adapter_symbol.clone()));
        }

        let vtable_symbol = format!("{}.vtable", info.full_name);
        let body = self.builder.module().body_block();
        let saved = self.builder.insertion_point();
        self.builder.set_insertion_point_to_end(body);
        self.builder.create_op(
            OpKind::Global,
            vec![],
            &[],
            vec![
                attr_str("sym_name", &vtable_symbol),
                ("entries".to_string(), Attribute::List(entries)),
            ],
            0,
            span,
        );
        self.builder.set_insertion_point(saved);

        // Record the adapter slots on our own implements entries.
        {
            let own_count = self.class(class_id).implements.len();
            let offset = adapters.len() - own_count;
            let info = self.class_mut(class_id);
            for (index, implement) in info.implements.iter_mut().enumerate() {
                implement.vtable_slot = implement_slots.get(offset + index).copied();
                implement.processed = true;
            }
        }

        // One adapter table per own `implements` entry.
        let own: Vec<ImplementInfo> = self.class(class_id).implements.clone();
        for implement in own {
            self.emit_class_adapter(class_id, implement.iface, span)?;
        }
        Ok(())
    }

    /// Virtual slots across the whole linearization.
    fn total_slot_count(&self, class_id: ClassId) -> u32 {
        let info = self.class(class_id);
        let own = info.virtual_slot_count();
        info.base_classes
            .iter()
            .map(|&base| self.total_slot_count(base))
            .max()
            .unwrap_or(0)
            .max(own)
    }

    fn fill_vtable_entries(&self, info: &ClassInfo, entries: &mut [Attribute]) {
        // Base entries first so overrides replace them.
        for &base in &info.base_classes {
            self.fill_vtable_entries(self.class(base), entries);
        }
        for method in &info.methods {
            if let Some(index) = method.virtual_index {
                if method.is_abstract {
                    continue;
                }
                entries[index as usize] =
                    Attribute::Str(format!("{}.{}", info.full_name, method.name));
            }
        }
    }

    fn collect_class_adapters(
        &self,
        class_id: ClassId,
        out: &mut Vec<(String, crate::symbols::InterfaceId)>,
    ) {
        let info = self.class(class_id);
        for &base in &info.base_classes {
            self.collect_class_adapters(base, out);
        }
        for implement in &info.implements {
            let iface = self.interface(implement.iface);
            out.push((
                format!("{}.impl.{}", info.full_name, iface.full_name),
                implement.iface,
            ));
        }
    }

    /// Phase 10: walk the interface's vtable template and bind each
    /// member to the matching class field or method.
    fn emit_class_adapter(
        &mut self,
        class_id: ClassId,
        iface_id: crate::symbols::InterfaceId,
        span: Span,
    ) -> LowerResult<()> {
        let info = self.class(class_id).clone();
        let iface = self.interface(iface_id).clone();
        let members: Vec<InterfaceMemberInfo> = self.collect_interface_members(&iface);

        let mut slots = Vec::with_capacity(members.len());
        for member in &members {
            let slot = self.match_class_member(&info, member, span)?;
            slots.push(slot);
        }

        let symbol = format!("{}.impl.{}", info.full_name, iface.full_name);
        self.emit_adapter_global(&symbol, &slots, span);
        self.tuple_adapters
            .insert((info.storage_ty, iface.full_name.clone()), slots);
        Ok(())
    }

    fn match_class_member(
        &mut self,
        info: &ClassInfo,
        member: &InterfaceMemberInfo,
        span: Span,
    ) -> LowerResult<AdapterSlot> {
        if member.is_method {
            // Methods match by name and function-shape compatibility.
            if let Some(method) = info.method(&member.name) {
                if self.signatures_compatible(member.ty, method.func_ty) {
                    return Ok(AdapterSlot::Method(format!(
                        "{}.{}",
                        info.full_name, member.name
                    )));
                }
                let expected = self.types.display(member.ty);
                let found = self.types.display(method.func_ty);
                return self.structural_error(
                    span,
                    format!(
                        "method '{}' of '{}' has signature '{}', interface requires '{}'",
                        member.name, info.name, found, expected
                    ),
                );
            }
            if member.is_conditional {
                return Ok(AdapterSlot::Missing);
            }
            return self.structural_error(
                span,
                format!(
                    "class '{}' does not implement interface method '{}'",
                    info.name, member.name
                ),
            );
        }

        // Fields match by id against the storage layout.
        let field = self
            .types
            .get(info.storage_ty)
            .as_tuple_fields()
            .and_then(|fields| {
                fields
                    .iter()
                    .position(|f| f.id == FieldId::Name(member.name.clone()))
                    .map(|index| (index, fields[index].ty))
            });
        match field {
            Some((index, field_ty)) => {
                if !self.castable(field_ty, member.ty) {
                    let expected = self.types.display(member.ty);
                    let found = self.types.display(field_ty);
                    return self.structural_error(
                        span,
                        format!(
                            "field '{}' of '{}' has type '{}', interface requires '{}'",
                            member.name, info.name, found, expected
                        ),
                    );
                }
                Ok(AdapterSlot::FieldOffset(index as u32))
            }
            None if member.is_conditional => Ok(AdapterSlot::Missing),
            None => self.structural_error(
                span,
                format!(
                    "class '{}' is missing interface field '{}'",
                    info.name, member.name
                ),
            ),
        }
    }

    /// Function-shape compatibility: arity match ignoring the `this`
    /// input on both sides.
    fn signatures_compatible(&self, iface_ty: TypeId, method_ty: TypeId) -> bool {
        let Some((iface_inputs, iface_results)) = self.types.get(iface_ty).as_signature() else {
            return false;
        };
        let Some((method_inputs, method_results)) = self.types.get(method_ty).as_signature() else {
            return false;
        };
        let iface_params = iface_inputs
            .split_first()
            .map(|(_, rest)| rest.len())
            .unwrap_or(0);
        let method_params = method_inputs
            .split_first()
            .map(|(_, rest)| rest.len())
            .unwrap_or(0);
        iface_params == method_params && iface_results.len() == method_results.len()
    }

    /// Constructor-style instantiation: `new C(...)`.
    pub(crate) fn construct_class(
        &mut self,
        class_id: ClassId,
        arguments: &[Expression],
        span: Span,
        ctx: &GenContext,
    ) -> LowerResult<Value> {
        let info = self.class(class_id).clone();
        if info.is_abstract {
            return self.structural_error(
                span,
                format!("cannot instantiate abstract class '{}'", info.name),
            );
        }

        let object = self.emit_op(
            OpKind::New,
            vec![],
            &[info.ty],
            vec![attr_str("class", &info.full_name)],
            span,
        );
        let object = self.builder.result(object);

        if info.has_constructor {
            let declared: Vec<TypeId> = info
                .method("constructor")
                .and_then(|m| self.types.get(m.func_ty).as_signature().map(|(i, _)| i.to_vec()))
                .map(|inputs| inputs.into_iter().skip(1).collect())
                .unwrap_or_default();
            let args = self.lower_call_arguments(arguments, &declared, span, ctx)?;
            let void = self.types.void();
            let mut operands = vec![object.id];
            operands.extend(args);
            self.emit_op(
                OpKind::Call,
                operands,
                &[void],
                vec![attr_str("callee", &format!("{}.constructor", info.full_name))],
                span,
            );
        }
        Ok(object)
    }
}
