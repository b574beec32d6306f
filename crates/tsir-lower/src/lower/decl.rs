//! Declaration lowering
//!
//! Variables (with structural destructuring), enums, type aliases,
//! import-equals bindings, and namespace bodies, plus the top-level
//! statement dispatch the discovery pass drives.

use super::{attr_str, CoreCompiler};
use crate::context::GenContext;
use crate::error::LowerResult;
use crate::symbols::{ImportTarget, Resolution, VariableInfo, VarStorage};
use tsir_ast::ast::*;
use tsir_ast::Span;
use tsir_ir::{OpKind, Value};
use tsir_types::{IntWidth, TupleField, Type, TypeId};

impl<'a> CoreCompiler<'a> {
    /// Lower one top-level statement. Declarations register themselves;
    /// imperative statements land in the module initializer.
    pub(crate) fn lower_top_statement(
        &mut self,
        stmt: &Statement,
        ctx: &GenContext,
    ) -> LowerResult<()> {
        match stmt {
            Statement::FunctionDecl(func) => self.lower_function_decl(func, ctx),
            Statement::ClassDecl(class) => self.lower_class_decl(class, ctx),
            Statement::InterfaceDecl(iface) => self.register_interface(iface, ctx),
            Statement::EnumDecl(decl) => self.lower_enum_decl(decl, ctx),
            Statement::TypeAliasDecl(decl) => self.lower_type_alias(decl, ctx),
            Statement::ImportEquals(decl) => self.lower_import_equals(decl, ctx),
            Statement::ModuleDecl(decl) => self.lower_module_decl(decl, ctx),
            Statement::VariableDecl(decl) => {
                if ctx.dummy_run {
                    self.lower_variable_decl(decl, ctx)
                } else {
                    let block = self.module_init_block();
                    let saved = self.builder.insertion_point();
                    self.builder.set_insertion_point_to_end(block);
                    let result = self.lower_variable_decl(decl, ctx);
                    self.builder.set_insertion_point(saved);
                    result
                }
            }
            other => {
                if ctx.dummy_run {
                    self.lower_stmt(other, ctx)
                } else {
                    let block = self.module_init_block();
                    let saved = self.builder.insertion_point();
                    self.builder.set_insertion_point_to_end(block);
                    let result = self.lower_stmt(other, ctx);
                    self.builder.set_insertion_point(saved);
                    result
                }
            }
        }
    }

    // ── Variables ───────────────────────────────────────────────────────

    pub(crate) fn lower_variable_decl(
        &mut self,
        decl: &VariableDecl,
        ctx: &GenContext,
    ) -> LowerResult<()> {
        for declarator in &decl.declarations {
            let declared_ty = match &declarator.type_annotation {
                Some(annotation) => Some(self.resolve_type(annotation, ctx)?),
                None => None,
            };
            let init = match &declarator.initializer {
                Some(expr) => {
                    let child = GenContext {
                        arg_type_dest: declared_ty,
                        ..ctx.clone()
                    };
                    Some(self.lower_expr(expr, &child)?)
                }
                None => None,
            };
            self.bind_pattern(&declarator.pattern, declared_ty, init, decl.kind, ctx, declarator.span)?;
        }
        Ok(())
    }

    /// Destructuring patterns recurse structurally, emitting one
    /// declaration per leaf.
    fn bind_pattern(
        &mut self,
        pattern: &Pattern,
        declared_ty: Option<TypeId>,
        init: Option<Value>,
        kind: VariableKind,
        ctx: &GenContext,
        span: Span,
    ) -> LowerResult<()> {
        match pattern {
            Pattern::Identifier(ident) => {
                let name = self.interner.resolve(ident.name).to_string();
                self.bind_identifier(&name, declared_ty, init, kind, ctx, span)
            }
            Pattern::Array(array) => {
                let Some(init) = init else {
                    return self.structural_error(span, "destructuring requires an initializer");
                };
                for (ordinal, element) in array.elements.iter().enumerate() {
                    let Some(element) = element else { continue };
                    let elem_ty = self.element_type(init.ty, ordinal);
                    let extracted = self.emit_op(
                        OpKind::ExtractField,
                        vec![init.id],
                        &[elem_ty],
                        vec![("index".to_string(), tsir_ir::Attribute::Int(ordinal as i64))],
                        span,
                    );
                    let extracted = self.builder.result(extracted);
                    self.bind_pattern(element, None, Some(extracted), kind, ctx, span)?;
                }
                Ok(())
            }
            Pattern::Object(object) => {
                let Some(init) = init else {
                    return self.structural_error(span, "destructuring requires an initializer");
                };
                for property in &object.properties {
                    let key = self.property_name(&property.key);
                    let mut extracted = self.member_on_value(init, &key, span, ctx)?;
                    if let Some(default) = &property.default {
                        // `{ a = d }`: the default replaces an undefined
                        // extraction.
                        let fallback = self.lower_expr(default, ctx)?;
                        let stripped = self.types.strip_optional(extracted.ty);
                        let unified = self.base_type(stripped, fallback.ty, stripped);
                        let null_ty = self.types.null();
                        let bool_ty = self.types.boolean();
                        let nil = self.emit_undef(null_ty, span);
                        let present = self.emit_op(
                            OpKind::Binary,
                            vec![extracted.id, nil.id],
                            &[bool_ty],
                            vec![(
                                "binop".to_string(),
                                tsir_ir::Attribute::BinOp(tsir_ir::BinOp::Ne),
                            )],
                            span,
                        );
                        let present = self.builder.result(present);
                        let if_op = self.builder.create_op(
                            OpKind::If,
                            vec![present.id],
                            &[unified],
                            vec![],
                            2,
                            span,
                        );
                        let then_region = self.builder.op(if_op).regions[0];
                        let else_region = self.builder.op(if_op).regions[1];
                        let then_block = self.builder.create_block(then_region, &[]);
                        let else_block = self.builder.create_block(else_region, &[]);
                        let saved = self.builder.insertion_point();
                        self.builder.set_insertion_point_to_end(then_block);
                        let narrowed =
                            self.emit_op(OpKind::Cast, vec![extracted.id], &[unified], vec![], span);
                        let narrowed = self.builder.result(narrowed);
                        self.emit_op(OpKind::ReturnVal, vec![narrowed.id], &[], vec![], span);
                        self.builder.set_insertion_point_to_end(else_block);
                        self.emit_op(OpKind::ReturnVal, vec![fallback.id], &[], vec![], span);
                        self.builder.set_insertion_point(saved);
                        extracted = self.builder.result(if_op);
                    }
                    self.bind_pattern(&property.value, None, Some(extracted), kind, ctx, span)?;
                }
                Ok(())
            }
        }
    }

    fn element_type(&mut self, container: TypeId, ordinal: usize) -> TypeId {
        match self.types.get(container).clone() {
            Type::Array(elem) | Type::ConstArray { element: elem, .. } => elem,
            Type::Tuple(fields) | Type::ConstTuple(fields) => fields
                .get(ordinal)
                .map(|f| f.ty)
                .unwrap_or_else(|| self.types.any()),
            _ => self.types.any(),
        }
    }

    fn bind_identifier(
        &mut self,
        name: &str,
        declared_ty: Option<TypeId>,
        init: Option<Value>,
        kind: VariableKind,
        ctx: &GenContext,
        span: Span,
    ) -> LowerResult<()> {
        let read_write = !matches!(kind, VariableKind::Const);

        // A name with an initializer but no annotation takes the
        // initializer's widened type; const keeps the const form.
        let ty = match (declared_ty, init) {
            (Some(declared), _) => declared,
            (None, Some(init)) => {
                if read_write {
                    self.types.widen(init.ty)
                } else {
                    init.ty
                }
            }
            (None, None) => self.types.any(),
        };

        let init = match init {
            Some(value) => Some(self.coerce(value, ty, span)?),
            None => None,
        };

        let storage = self.allocate_storage(name, ty, init, read_write, ctx, span)?;

        let info = VariableInfo {
            name: name.to_string(),
            full_name: self.symbols.qualify(name),
            ty,
            location: span,
            read_write,
            storage,
            func_level: 0,
        };
        if self.symbols.declare(name, info, true).is_err() {
            return self.structural_error(span, format!("'{}' is already declared", name));
        }
        Ok(())
    }

    /// Pick and materialize the storage for a binding: a const value, a
    /// this-field (generator locals), a namespace global, or a local
    /// slot.
    fn allocate_storage(
        &mut self,
        name: &str,
        ty: TypeId,
        init: Option<Value>,
        read_write: bool,
        ctx: &GenContext,
        span: Span,
    ) -> LowerResult<VarStorage> {
        // Generator lowering relocates locals into fields of `this`.
        if ctx.alloc_vars_in_this_context {
            if let Some(sink) = &ctx.extra_fields_sink {
                sink.borrow_mut().push(TupleField::named(name, ty));
            }
            if let Some(init) = init {
                let frame = self
                    .func_stack
                    .last()
                    .expect("generator locals outside a function");
                let this = frame.this_value.expect("generator without this");
                let ref_ty = self.types.reference(ty);
                let field_ref = self.emit_op(
                    OpKind::PropertyRef,
                    vec![this],
                    &[ref_ty],
                    vec![attr_str("field", name)],
                    span,
                );
                let field_ref = self.builder.result(field_ref);
                self.emit_store(field_ref.id, init.id, span);
            }
            return Ok(VarStorage::ThisField(name.to_string()));
        }

        // Const with a value binds directly; no slot exists to write.
        if !read_write {
            if let Some(init) = init {
                return Ok(VarStorage::Value(init.id));
            }
        }

        // Outside any function the binding is a namespace global. Dummy
        // runs keep a scratch slot instead so later probe statements can
        // still read and write the name.
        if self.func_stack.is_empty() && !ctx.dummy_run {
            let fqn = self.symbols.qualify(name);
            let saved = self.builder.insertion_point();
            let body = self.builder.module().body_block();
            self.builder.set_insertion_point_to_end(body);
            self.builder.create_op(
                OpKind::Global,
                vec![],
                &[],
                vec![
                    attr_str("sym_name", &fqn),
                    super::attr_type("type", ty),
                ],
                0,
                span,
            );
            self.builder.set_insertion_point(saved);
            if let Some(init) = init {
                let ref_ty = self.types.reference(ty);
                let addr = self.emit_op(
                    OpKind::AddressOf,
                    vec![],
                    &[ref_ty],
                    vec![attr_str("sym_name", &fqn)],
                    span,
                );
                let addr = self.builder.result(addr);
                self.emit_store(addr.id, init.id, span);
            }
            return Ok(VarStorage::Global(fqn));
        }

        // Local slot: a variable op producing a ref. Allocation escapes
        // to the function entry when the context demands it.
        let ref_ty = self.types.reference(ty);
        let slot = if ctx.alloc_vars_outside_current_op {
            let entry = self
                .func_stack
                .last()
                .map(|f| f.entry_block)
                .expect("escaping allocation outside a function");
            let saved = self.builder.insertion_point();
            self.builder.set_insertion_point_to_start(entry);
            let op = self.emit_op(
                OpKind::Variable,
                vec![],
                &[ref_ty],
                vec![attr_str("name", name)],
                span,
            );
            self.builder.set_insertion_point(saved);
            self.builder.result(op)
        } else {
            let op = self.emit_op(
                OpKind::Variable,
                vec![],
                &[ref_ty],
                vec![attr_str("name", name)],
                span,
            );
            self.builder.result(op)
        };
        if let Some(init) = init {
            self.emit_store(slot.id, init.id, span);
        }
        Ok(VarStorage::Local(slot.id))
    }

    /// Declare a name bound directly to an SSA value (catch variables,
    /// synthesized bindings).
    pub(crate) fn declare_value_binding(
        &mut self,
        name: &str,
        value: Value,
        read_write: bool,
        span: Span,
    ) -> LowerResult<()> {
        let info = VariableInfo {
            name: name.to_string(),
            full_name: self.symbols.qualify(name),
            ty: value.ty,
            location: span,
            read_write,
            storage: VarStorage::Value(value.id),
            func_level: 0,
        };
        if self.symbols.declare(name, info, true).is_err() {
            return self.structural_error(span, format!("'{}' is already declared", name));
        }
        Ok(())
    }

    /// Declare a const-ref binding aliasing existing storage.
    pub(crate) fn declare_const_ref(
        &mut self,
        name: &str,
        slot: Value,
        span: Span,
    ) -> LowerResult<()> {
        let value_ty = self.types.strip_ref(slot.ty);
        let info = VariableInfo {
            name: name.to_string(),
            full_name: self.symbols.qualify(name),
            ty: value_ty,
            location: span,
            read_write: false,
            storage: VarStorage::ConstRef(slot.id),
            func_level: 0,
        };
        if self.symbols.declare(name, info, true).is_err() {
            return self.structural_error(span, format!("'{}' is already declared", name));
        }
        Ok(())
    }

    // ── Enums ───────────────────────────────────────────────────────────

    /// Member values fold from their initializers; missing initializers
    /// take the previous value plus one. Storage is the smallest of
    /// {i32, i64, i128} covering the maximum magnitude.
    pub(crate) fn lower_enum_decl(&mut self, decl: &EnumDecl, ctx: &GenContext) -> LowerResult<()> {
        let name = self.interner.resolve(decl.name.name).to_string();
        let fqn = self.symbols.qualify(&name);

        let fold_ctx = GenContext {
            allow_const_eval: true,
            ..ctx.clone()
        };

        let mut members: Vec<(String, i128)> = Vec::with_capacity(decl.members.len());
        let mut next_value: i128 = 0;
        for member in &decl.members {
            let member_name = self.interner.resolve(member.name.name).to_string();
            let value = match &member.initializer {
                Some(init) => match self.eval_const_expr(init, &fold_ctx) {
                    Some(value) => value,
                    None => {
                        return self.structural_error(
                            member.span,
                            format!("enum member '{}' requires a constant initializer", member_name),
                        );
                    }
                },
                None => next_value,
            };
            next_value = value + 1;
            members.push((member_name, value));
        }

        let width = members
            .iter()
            .map(|(_, v)| IntWidth::covering(*v))
            .max()
            .unwrap_or(IntWidth::I32);
        let storage = self.types.int(width);
        let ty = self.types.enum_type(fqn.clone(), storage);

        let entry = crate::symbols::EnumEntry {
            full_name: fqn.clone(),
            ty,
            members,
        };
        self.enum_by_fqn.insert(fqn, entry.clone());
        let current = self.symbols.current_namespace();
        self.symbols
            .namespace_mut(current)
            .enums
            .insert(name, entry);
        Ok(())
    }

    // ── Type aliases ────────────────────────────────────────────────────

    /// The right-hand side resolves under a scope that temporarily
    /// extends the alias map with the alias's own type parameters.
    pub(crate) fn lower_type_alias(&mut self, decl: &TypeAliasDecl, ctx: &GenContext) -> LowerResult<()> {
        let name = self.interner.resolve(decl.name.name).to_string();

        let child = GenContext {
            type_alias_map: std::rc::Rc::new(std::cell::RefCell::new(
                ctx.type_alias_map.borrow().clone(),
            )),
            ..ctx.clone()
        };
        for param in &decl.type_params {
            let param_name = self.interner.resolve(param.name).to_string();
            let placeholder = self.types.intern(Type::Infer(param_name.clone()));
            child
                .type_alias_map
                .borrow_mut()
                .insert(param_name, placeholder);
        }

        let ty = self.resolve_type(&decl.ty, &child)?;
        let current = self.symbols.current_namespace();
        self.symbols
            .namespace_mut(current)
            .type_aliases
            .insert(name, ty);
        Ok(())
    }

    // ── Import-equals ───────────────────────────────────────────────────

    /// Binds a short name to a namespace, class, or interface via its
    /// fully-qualified name.
    pub(crate) fn lower_import_equals(
        &mut self,
        decl: &ImportEqualsDecl,
        ctx: &GenContext,
    ) -> LowerResult<()> {
        let name = self.interner.resolve(decl.name.name).to_string();
        let first = self.interner.resolve(decl.reference[0]).to_string();

        let mut resolution = self.symbols.lookup(&first);
        for segment in &decl.reference[1..] {
            let segment = self.interner.resolve(*segment).to_string();
            resolution = match resolution {
                Some(Resolution::Namespace(ns)) => self.symbols.lookup_in_namespace(ns, &segment),
                _ => None,
            };
        }

        let target = match resolution {
            Some(Resolution::Namespace(ns)) => ImportTarget::Namespace(ns),
            Some(Resolution::Class(class)) => ImportTarget::Class(class),
            Some(Resolution::Interface(iface)) => ImportTarget::Interface(iface),
            _ => {
                let path = decl
                    .reference
                    .iter()
                    .map(|s| self.interner.resolve(*s).to_string())
                    .collect::<Vec<_>>()
                    .join(".");
                ctx.record_unresolved(&path, decl.span);
                return if ctx.allow_partial_resolve {
                    Err(crate::error::LowerError::unresolved(path, decl.span))
                } else {
                    self.structural_error(decl.span, format!("cannot resolve import '{}'", path))
                };
            }
        };

        let current = self.symbols.current_namespace();
        self.symbols
            .namespace_mut(current)
            .imports
            .insert(name, target);
        Ok(())
    }

    // ── Namespaces ──────────────────────────────────────────────────────

    pub(crate) fn lower_module_decl(&mut self, decl: &ModuleDecl, ctx: &GenContext) -> LowerResult<()> {
        if decl.is_module_keyword && !self.opts.module_as_namespace {
            return self.structural_error(
                decl.span,
                "'module' declarations are not enabled; use 'namespace'",
            );
        }
        let name = self.interner.resolve(decl.name.name).to_string();
        self.symbols.enter_namespace(&name);
        let mut result = Ok(());
        for stmt in &decl.body {
            let stmt_result = self.lower_top_statement(stmt, ctx);
            if result.is_ok() {
                result = stmt_result;
            }
        }
        self.symbols.leave_namespace();
        result
    }
}
