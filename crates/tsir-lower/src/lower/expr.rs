//! Expression lowering
//!
//! One syntax-kind dispatch producing an IR value. Recoverable failures
//! (unknown names during discovery) unwind as `LowerError::Unresolved`;
//! structural failures diagnose and unwind as `Reported`.

use super::{attr_int, attr_str, CoreCompiler};
use crate::context::GenContext;
use crate::error::{LowerError, LowerResult};
use crate::symbols::Resolution;
use tsir_ast::ast::*;
use tsir_ast::Span;
use tsir_ir::{Attribute, BinOp, OpKind, UnOp, Value, ValueId};
use tsir_types::{FieldId, LiteralValue, TupleField, Type, TypeId};

/// Analyzed left side of an assignment.
pub(crate) enum AssignTarget {
    /// Ref-typed storage to store into.
    Slot(Value),
    /// Write-accessor: emit a setter call.
    Accessor {
        setter: String,
        receiver: Option<ValueId>,
        value_ty: TypeId,
    },
    /// Array element.
    Element {
        object: Value,
        index: Value,
        elem_ty: TypeId,
    },
    /// Array pattern: element-wise stores.
    Pattern(Vec<AssignTarget>),
}

impl<'a> CoreCompiler<'a> {
    /// Lower an expression to a value.
    pub(crate) fn lower_expr(&mut self, expr: &Expression, ctx: &GenContext) -> LowerResult<Value> {
        match expr {
            Expression::NumberLiteral(lit) => Ok(self.lower_number_literal(lit)),
            Expression::BigIntLiteral(lit) => {
                let ty = self.types.bigint();
                let raw = lit.raw.trim_end_matches('n');
                let value = raw.parse::<i64>().unwrap_or(0);
                Ok(self.emit_const_int(value, ty, lit.span))
            }
            Expression::StringLiteral(lit) => {
                let text = self.interner.resolve(lit.value).to_string();
                Ok(self.emit_const_string(&text, lit.span))
            }
            Expression::BooleanLiteral(lit) => Ok(self.emit_const_bool(lit.value, lit.span)),
            Expression::NullLiteral(span) => {
                let ty = self.types.null();
                Ok(self.emit_undef(ty, *span))
            }
            Expression::Identifier(ident) => {
                let name = self.interner.resolve(ident.name).to_string();
                self.resolve_identifier(&name, ident.span, ctx)
            }
            Expression::This(span) => self.lower_this(*span, ctx),
            Expression::Super(span) => self.lower_super(*span, ctx),
            Expression::Template(template) => self.lower_template(template, ctx),
            Expression::TaggedTemplate(tagged) => self.lower_tagged_template(tagged, ctx),
            Expression::ArrayLiteral(array) => self.lower_array_literal(array, ctx),
            Expression::ObjectLiteral(object) => self.lower_object_literal(object, ctx),
            Expression::Member(member) => self.lower_member(member, ctx),
            Expression::Index(index) => self.lower_index(index, ctx),
            Expression::Call(call) => self.lower_call(call, ctx),
            Expression::New(new) => self.lower_new(new, ctx),
            Expression::Binary(binary) => self.lower_binary(binary, ctx),
            Expression::Assignment(assign) => self.lower_assignment(assign, ctx),
            Expression::Conditional(cond) => self.lower_conditional(cond, ctx),
            Expression::Unary(unary) => self.lower_unary(unary, ctx),
            Expression::Update(update) => self.lower_update(update, ctx),
            Expression::Arrow(arrow) => self.lower_arrow(arrow, ctx),
            Expression::FunctionExpr(func) => self.lower_function_expr(func, ctx),
            Expression::Paren(paren) => self.lower_expr(&paren.expression, ctx),
            Expression::AsCast(cast) => self.lower_as_cast(cast, ctx),
            Expression::Yield(yield_expr) => self.lower_yield(yield_expr, ctx),
            Expression::Await(await_expr) => self.lower_await(await_expr, ctx),
            Expression::Spread(spread) => {
                self.structural_error(spread.span, "spread is not valid in this position")
            }
        }
    }

    /// Numerics: `i32` when the textual form has no fractional point and
    /// fits, `i64` when integral but wide, `number` when fractional.
    fn lower_number_literal(&mut self, lit: &NumberLiteral) -> Value {
        if lit.is_integral() {
            let as_int = lit.value as i64;
            if as_int as f64 == lit.value {
                let ty = if as_int >= i32::MIN as i64 && as_int <= i32::MAX as i64 {
                    self.types.i32()
                } else {
                    self.types.i64()
                };
                return self.emit_const_int(as_int, ty, lit.span);
            }
        }
        self.emit_const_number(lit.value, lit.span)
    }

    fn lower_this(&mut self, span: Span, ctx: &GenContext) -> LowerResult<Value> {
        let this_value = self.current_frame().and_then(|f| f.this_value);
        match (this_value, ctx.this_type) {
            (Some(value), _) => Ok(self.builder.module().value(value)),
            (None, Some(ty)) => Ok(self.emit_undef(ty, span)),
            (None, None) => self.structural_error(span, "'this' is not available here"),
        }
    }

    /// `super` is the receiver viewed as the base class storage.
    fn lower_super(&mut self, span: Span, ctx: &GenContext) -> LowerResult<Value> {
        let this = self.lower_this(span, ctx)?;
        let base = match self.types.get(this.ty) {
            Type::Class { name, .. } => {
                let class_id = self.class_by_fqn.get(name).copied();
                class_id.and_then(|id| self.class(id).base_classes.first().copied())
            }
            _ => None,
        };
        let Some(base) = base else {
            return self.structural_error(span, "'super' requires a base class");
        };
        let storage_ty = self.class(base).storage_ty;
        let op = self.emit_op(OpKind::Cast, vec![this.id], &[storage_ty], vec![], span);
        Ok(self.builder.result(op))
    }

    // ── Templates and literals ──────────────────────────────────────────

    /// Constant-folds when every part is constant, else concatenates.
    fn lower_template(&mut self, template: &TemplateLiteral, ctx: &GenContext) -> LowerResult<Value> {
        let mut parts: Vec<Value> = Vec::new();
        let mut folded = String::new();
        let mut all_const = true;

        for (i, quasi) in template.quasis.iter().enumerate() {
            let text = self.interner.resolve(*quasi).to_string();
            folded.push_str(&text);
            if i < template.expressions.len() {
                let value = self.lower_expr(&template.expressions[i], ctx)?;
                if let Some(constant) = self.constant_of(value) {
                    folded.push_str(&constant.to_string_value());
                } else {
                    all_const = false;
                }
                if !text.is_empty() {
                    parts.push(self.emit_const_string(&text, template.span));
                }
                parts.push(value);
            } else if !text.is_empty() {
                parts.push(self.emit_const_string(&text, template.span));
            }
        }

        if all_const {
            return Ok(self.emit_const_string(&folded, template.span));
        }

        let string_ty = self.types.string();
        let mut acc: Option<Value> = None;
        for part in parts {
            let part = self.coerce_to_string(part, template.span)?;
            acc = Some(match acc {
                None => part,
                Some(prev) => {
                    let op = self.emit_op(
                        OpKind::Binary,
                        vec![prev.id, part.id],
                        &[string_ty],
                        vec![("binop".to_string(), Attribute::BinOp(BinOp::Add))],
                        template.span,
                    );
                    self.builder.result(op)
                }
            });
        }
        Ok(acc.unwrap_or_else(|| self.emit_const_string("", template.span)))
    }

    /// `tag(strings, ...exprs)`
    fn lower_tagged_template(
        &mut self,
        tagged: &TaggedTemplate,
        ctx: &GenContext,
    ) -> LowerResult<Value> {
        let tag = self.lower_expr(&tagged.tag, ctx)?;

        let string_ty = self.types.string();
        let mut quasi_values = Vec::with_capacity(tagged.quasi.quasis.len());
        for quasi in &tagged.quasi.quasis {
            let text = self.interner.resolve(*quasi).to_string();
            quasi_values.push(self.emit_const_string(&text, tagged.span).id);
        }
        let strings_ty = self.types.const_array(string_ty, quasi_values.len() as u32);
        let strings = self.emit_op(OpKind::CreateArray, quasi_values, &[strings_ty], vec![], tagged.span);
        let strings = self.builder.result(strings);

        let mut operands = vec![tag.id, strings.id];
        for expr in &tagged.quasi.expressions {
            let value = self.lower_expr(expr, ctx)?;
            operands.push(value.id);
        }

        let result_ty = match self.types.get(tag.ty).as_signature() {
            Some((_, results)) => results.first().copied().unwrap_or_else(|| string_ty),
            None => string_ty,
        };
        let op = self.emit_op(OpKind::CallIndirect, operands, &[result_ty], vec![], tagged.span);
        Ok(self.builder.result(op))
    }

    fn lower_array_literal(&mut self, array: &ArrayLiteral, ctx: &GenContext) -> LowerResult<Value> {
        let mut elements = Vec::with_capacity(array.elements.len());
        let mut all_const = true;
        let mut has_spread = false;

        for element in &array.elements {
            if let Expression::Spread(spread) = element {
                has_spread = true;
                let value = self.lower_expr(&spread.expression, ctx)?;
                elements.push((value, true));
                continue;
            }
            let value = self.lower_expr(element, ctx)?;
            if self.constant_of(value).is_none() {
                all_const = false;
            }
            elements.push((value, false));
        }

        let elem_ty = {
            let mut unified: Option<TypeId> = None;
            for (value, is_spread) in &elements {
                let mut ty = if *is_spread {
                    match self.types.get(value.ty) {
                        Type::Array(e) | Type::ConstArray { element: e, .. } => *e,
                        _ => value.ty,
                    }
                } else {
                    value.ty
                };
                ty = self.types.widen(ty);
                unified = Some(match unified {
                    None => ty,
                    Some(prev) => {
                        let any = self.types.any();
                        self.base_type(prev, ty, any)
                    }
                });
            }
            unified.unwrap_or_else(|| self.types.any())
        };

        let ty = if all_const && !has_spread {
            self.types.const_array(elem_ty, elements.len() as u32)
        } else {
            self.types.array(elem_ty)
        };

        let operands: Vec<ValueId> = elements.iter().map(|(v, _)| v.id).collect();
        let kind = if has_spread { OpKind::NewArray } else { OpKind::CreateArray };
        let op = self.emit_op(kind, operands, &[ty], vec![], array.span);
        Ok(self.builder.result(op))
    }

    /// Object literals run a two-phase walk: field layout with opaque
    /// method prototypes first, then method lowering against the
    /// finished object type.
    fn lower_object_literal(&mut self, object: &ObjectLiteral, ctx: &GenContext) -> LowerResult<Value> {
        // Phase 1: layout. Methods contribute placeholder function types
        // whose `this` is opaque.
        let mut fields: Vec<TupleField> = Vec::new();
        let mut value_props: Vec<(String, Value)> = Vec::new();
        let mut methods: Vec<(String, &FunctionExpression)> = Vec::new();

        for property in &object.properties {
            match property {
                ObjectProperty::KeyValue { key, value } => {
                    let name = self.property_name(key);
                    let value = self.lower_expr(value, ctx)?;
                    let widened = self.types.widen(value.ty);
                    fields.push(TupleField::named(name.clone(), widened));
                    value_props.push((name, value));
                }
                ObjectProperty::Shorthand(ident) => {
                    let name = self.interner.resolve(ident.name).to_string();
                    let value = self.resolve_identifier(&name, ident.span, ctx)?;
                    let widened = self.types.widen(value.ty);
                    fields.push(TupleField::named(name.clone(), widened));
                    value_props.push((name, value));
                }
                ObjectProperty::Method { name, function } => {
                    let name = self.property_name(name);
                    let opaque = self.types.opaque();
                    let proto = self.method_prototype_type(function, opaque, ctx)?;
                    fields.push(TupleField::named(name.clone(), proto));
                    methods.push((name, function));
                }
            }
        }

        let storage = self.types.tuple(fields.clone());
        let object_ty = self.types.object(storage);

        // Phase 2: method prototypes are rewritten to reference the
        // finished object type as `this`.
        let mut operands: Vec<ValueId> = Vec::new();
        for field in &fields {
            let name = field.id.as_name().unwrap_or_default().to_string();
            if let Some((_, value)) = value_props.iter().find(|(n, _)| *n == name) {
                operands.push(value.id);
            } else if let Some((_, function)) = methods.iter().find(|(n, _)| *n == name) {
                let method_value =
                    self.lower_object_method(&name, function, object_ty, ctx)?;
                operands.push(method_value.id);
            }
        }

        let op = self.emit_op(OpKind::CreateTuple, operands, &[object_ty], vec![], object.span);
        Ok(self.builder.result(op))
    }

    pub(crate) fn property_name(&mut self, name: &PropertyName) -> String {
        match name {
            PropertyName::Ident(ident) => self.interner.resolve(ident.name).to_string(),
            PropertyName::String(sym, _) => self.interner.resolve(*sym).to_string(),
            PropertyName::Number(n, _) => n.to_string(),
        }
    }

    // ── Member access ───────────────────────────────────────────────────

    fn lower_member(&mut self, member: &MemberExpression, ctx: &GenContext) -> LowerResult<Value> {
        let property = self.interner.resolve(member.property.name).to_string();
        let object = self.lower_expr(&member.object, ctx)?;
        self.member_on_value(object, &property, member.span, ctx)
    }

    /// Dispatch member access on the receiver's type.
    pub(crate) fn member_on_value(
        &mut self,
        object: Value,
        property: &str,
        span: Span,
        ctx: &GenContext,
    ) -> LowerResult<Value> {
        let object_ty = self.types.get(object.ty).clone();
        match object_ty {
            Type::Enum { name, storage } => {
                let entry = match self.enum_by_fqn.get(&name) {
                    Some(entry) => entry.clone(),
                    None => return self.unresolved(&name, span, ctx),
                };
                match entry.members.iter().find(|(n, _)| n == property) {
                    Some((_, value)) => Ok(self.emit_const_int(*value as i64, storage, span)),
                    None => self.structural_error(
                        span,
                        format!("enum '{}' has no member '{}'", name, property),
                    ),
                }
            }

            Type::Namespace { name } => {
                let Some(ns) = self.symbols.namespace_by_fqn(&name) else {
                    return self.unresolved(&name, span, ctx);
                };
                match self.symbols.lookup_in_namespace(ns, property) {
                    Some(Resolution::Variable(var)) => {
                        let info = self.symbols.var(var).clone();
                        self.read_variable(&info, span)
                    }
                    Some(Resolution::Function(entry)) => Ok(self.function_value(&entry, span, ctx)),
                    Some(Resolution::Class(class_id)) => {
                        let ty = self.class(class_id).ty;
                        let fqn = self.class(class_id).full_name.clone();
                        Ok(self.emit_symbol_ref(&fqn, ty, span))
                    }
                    Some(Resolution::Enum(entry)) => {
                        let fqn = entry.full_name.clone();
                        Ok(self.emit_symbol_ref(&fqn, entry.ty, span))
                    }
                    Some(Resolution::Namespace(child)) => {
                        let fqn = self.symbols.namespace(child).full_name.clone();
                        let ty = self.types.namespace(fqn.clone());
                        Ok(self.emit_symbol_ref(&fqn, ty, span))
                    }
                    _ => self.unresolved(&format!("{}.{}", name, property), span, ctx),
                }
            }

            // Static side of a class: the value is the class symbol.
            Type::Class { ref name, .. } if self.is_class_symbol(object) => {
                self.static_member(name, property, span, ctx)
            }

            Type::Class { ref name, .. } => self.instance_member(object, name, property, span, ctx),

            Type::ClassStorage { ref name, .. } => {
                // `super.m`: direct, non-virtual reference to the base
                // class method, bound to this receiver.
                let Some(&class_id) = self.class_by_fqn.get(name) else {
                    return self.unresolved(name, span, ctx);
                };
                let info = self.class(class_id).clone();
                match info.method(property) {
                    Some(method) => {
                        let fqn = format!("{}.{}", info.full_name, property);
                        let (inputs, results) = self
                            .types
                            .get(method.func_ty)
                            .as_signature()
                            .map(|(i, r)| (i.to_vec(), r.to_vec()))
                            .unwrap_or_default();
                        let public: Vec<TypeId> = inputs.iter().skip(1).copied().collect();
                        let bound_ty = self.types.bound_function(public, results);
                        let op = self.emit_op(
                            OpKind::CreateBoundFunction,
                            vec![object.id],
                            &[bound_ty],
                            vec![attr_str("sym_name", &fqn)],
                            span,
                        );
                        Ok(self.builder.result(op))
                    }
                    None => self.structural_error(
                        span,
                        format!("base class '{}' has no method '{}'", name, property),
                    ),
                }
            }

            Type::Tuple(_) | Type::ConstTuple(_) => {
                self.tuple_member(object, property, span, ctx)
            }
            Type::Object(storage) => {
                let widened = Value {
                    id: object.id,
                    ty: storage,
                };
                self.tuple_member(widened, property, span, ctx)
            }

            Type::Union(ref members) => {
                // All members must carry the property in every arm; cast
                // to the front type, then access.
                for &member in members.iter() {
                    if !self.type_has_member(member, property) {
                        let shown = self.types.display(member);
                        return self.structural_error(
                            span,
                            format!("property '{}' is missing in '{}'", property, shown),
                        );
                    }
                }
                let front = members[0];
                let op = self.emit_op(OpKind::Cast, vec![object.id], &[front], vec![], span);
                let fronted = self.builder.result(op);
                self.member_on_value(fronted, property, span, ctx)
            }

            Type::Interface { ref name } => self.interface_member(object, name, property, span, ctx),

            Type::Array(_) | Type::ConstArray { .. } if property == "length" => {
                let i32_ty = self.types.i32();
                let op = self.emit_op(OpKind::Length, vec![object.id], &[i32_ty], vec![], span);
                Ok(self.builder.result(op))
            }
            Type::String | Type::Char if property == "length" => {
                let i32_ty = self.types.i32();
                let op = self.emit_op(OpKind::Length, vec![object.id], &[i32_ty], vec![], span);
                Ok(self.builder.result(op))
            }

            Type::Optional(inner) => {
                let op = self.emit_op(OpKind::Cast, vec![object.id], &[inner], vec![], span);
                let stripped = self.builder.result(op);
                self.member_on_value(stripped, property, span, ctx)
            }

            Type::Any | Type::Unknown => {
                let any = self.types.any();
                let op = self.emit_op(
                    OpKind::ExtractField,
                    vec![object.id],
                    &[any],
                    vec![attr_str("field", property)],
                    span,
                );
                Ok(self.builder.result(op))
            }

            _ => {
                let shown = self.types.display(object.ty);
                self.structural_error(
                    span,
                    format!("property '{}' does not exist on type '{}'", property, shown),
                )
            }
        }
    }

    fn tuple_member(
        &mut self,
        object: Value,
        property: &str,
        span: Span,
        _ctx: &GenContext,
    ) -> LowerResult<Value> {
        let field = FieldId::Name(property.to_string());
        match self.types.tuple_field(object.ty, &field) {
            Some((_, field_ty)) => {
                let op = self.emit_op(
                    OpKind::ExtractField,
                    vec![object.id],
                    &[field_ty],
                    vec![attr_str("field", property)],
                    span,
                );
                Ok(self.builder.result(op))
            }
            None => {
                let shown = self.types.display(object.ty);
                self.structural_error(
                    span,
                    format!("property '{}' does not exist on type '{}'", property, shown),
                )
            }
        }
    }

    /// Member on a class instance: fields, accessors, methods, then the
    /// base-class chain.
    fn instance_member(
        &mut self,
        object: Value,
        class_fqn: &str,
        property: &str,
        span: Span,
        ctx: &GenContext,
    ) -> LowerResult<Value> {
        let Some(&class_id) = self.class_by_fqn.get(class_fqn) else {
            return self.unresolved(class_fqn, span, ctx);
        };
        let info = self.class(class_id).clone();

        if let Some((_, field_ty)) = self
            .types
            .tuple_field(info.storage_ty, &FieldId::Name(property.to_string()))
        {
            let ref_ty = self.types.reference(field_ty);
            let field_ref = self.emit_op(
                OpKind::PropertyRef,
                vec![object.id],
                &[ref_ty],
                vec![attr_str("field", property)],
                span,
            );
            let field_ref = self.builder.result(field_ref);
            return Ok(self.emit_load(field_ref.id, field_ty, span));
        }

        if let Some(accessor) = info.accessor(property) {
            let Some(getter) = accessor.getter.clone() else {
                return self.structural_error(
                    span,
                    format!("property '{}' has no getter", property),
                );
            };
            let ty = accessor.ty;
            let op = self.emit_op(
                OpKind::AccessorRead,
                vec![object.id],
                &[ty],
                vec![attr_str("getter", &getter)],
                span,
            );
            return Ok(self.builder.result(op));
        }

        if let Some(method) = info.method(property) {
            let (inputs, results) = self
                .types
                .get(method.func_ty)
                .as_signature()
                .map(|(i, r)| (i.to_vec(), r.to_vec()))
                .unwrap_or_default();
            let public: Vec<TypeId> = inputs.iter().skip(1).copied().collect();
            let bound_ty = self.types.bound_function(public, results);
            let op = if method.is_virtual {
                self.emit_op(
                    OpKind::ThisVirtualSymbolRef,
                    vec![object.id],
                    &[bound_ty],
                    vec![
                        attr_str("sym_name", &format!("{}.{}", info.full_name, property)),
                        attr_int("vtable_index", method.virtual_index.unwrap_or(0) as i64),
                    ],
                    span,
                )
            } else {
                self.emit_op(
                    OpKind::ThisSymbolRef,
                    vec![object.id],
                    &[bound_ty],
                    vec![attr_str("sym_name", &format!("{}.{}", info.full_name, property))],
                    span,
                )
            };
            return Ok(self.builder.result(op));
        }

        // Base-class chain: only recurse where the member exists, so a
        // failed probe never leaves a stray diagnostic.
        for &base in &info.base_classes {
            let base_ty = self.class(base).ty;
            let base_fqn = self.class(base).full_name.clone();
            if !self.type_has_member(base_ty, property) {
                continue;
            }
            let op = self.emit_op(OpKind::Cast, vec![object.id], &[base_ty], vec![], span);
            let upcast = self.builder.result(op);
            return self.instance_member(upcast, &base_fqn, property, span, ctx);
        }

        // Statics are reachable through an instance as well.
        if info.static_field(property).is_some()
            || info.methods.iter().any(|m| m.is_static && m.name == property)
        {
            return self.static_member(class_fqn, property, span, ctx);
        }

        self.structural_error(
            span,
            format!("property '{}' does not exist on '{}'", property, info.name),
        )
    }

    fn static_member(
        &mut self,
        class_fqn: &str,
        property: &str,
        span: Span,
        ctx: &GenContext,
    ) -> LowerResult<Value> {
        let Some(&class_id) = self.class_by_fqn.get(class_fqn) else {
            return self.unresolved(class_fqn, span, ctx);
        };
        let info = self.class(class_id).clone();

        if let Some(ty) = info.static_field(property) {
            let sym = format!("{}.{}", info.full_name, property);
            let ref_ty = self.types.reference(ty);
            let addr = self.emit_op(
                OpKind::AddressOf,
                vec![],
                &[ref_ty],
                vec![attr_str("sym_name", &sym)],
                span,
            );
            let addr = self.builder.result(addr);
            return Ok(self.emit_load(addr.id, ty, span));
        }

        if let Some(method) = info.methods.iter().find(|m| m.is_static && m.name == property) {
            let sym = format!("{}.{}", info.full_name, property);
            return Ok(self.emit_symbol_ref(&sym, method.func_ty, span));
        }

        for &base in &info.base_classes {
            let base_info = self.class(base);
            let base_fqn = base_info.full_name.clone();
            let has_static = base_info.static_field(property).is_some()
                || base_info
                    .methods
                    .iter()
                    .any(|m| m.is_static && m.name == property);
            if has_static {
                return self.static_member(&base_fqn, property, span, ctx);
            }
        }

        self.structural_error(
            span,
            format!("class '{}' has no static member '{}'", info.name, property),
        )
    }

    /// Interface member access: an interface-symbol-reference indexed by
    /// the member's vtable slot. Function-typed members are rebound with
    /// the receiver.
    fn interface_member(
        &mut self,
        object: Value,
        iface_fqn: &str,
        property: &str,
        span: Span,
        ctx: &GenContext,
    ) -> LowerResult<Value> {
        let Some(&iface_id) = self.iface_by_fqn.get(iface_fqn) else {
            return self.unresolved(iface_fqn, span, ctx);
        };
        let info = self.interface(iface_id).clone();
        let members = self.collect_interface_members(&info);
        let Some((slot, member)) = members
            .iter()
            .enumerate()
            .find(|(_, m)| m.name == property)
        else {
            return self.structural_error(
                span,
                format!("interface '{}' has no member '{}'", info.name, property),
            );
        };

        if member.is_method || self.types.get(member.ty).is_callable() {
            // Rebind the opaque `this` with the actual receiver.
            let (inputs, results) = self
                .types
                .get(member.ty)
                .as_signature()
                .map(|(i, r)| (i.to_vec(), r.to_vec()))
                .unwrap_or_default();
            let public: Vec<TypeId> = inputs
                .iter()
                .copied()
                .skip(usize::from(matches!(
                    inputs.first().map(|t| self.types.get(*t)),
                    Some(Type::Opaque)
                )))
                .collect();
            let bound_ty = self.types.bound_function(public, results);
            let op = self.emit_op(
                OpKind::InterfaceSymbolRef,
                vec![object.id],
                &[bound_ty],
                vec![
                    attr_str("sym_name", property),
                    attr_int("vtable_index", slot as i64),
                ],
                span,
            );
            Ok(self.builder.result(op))
        } else {
            let op = self.emit_op(
                OpKind::InterfaceSymbolRef,
                vec![object.id],
                &[member.ty],
                vec![
                    attr_str("sym_name", property),
                    attr_int("vtable_index", slot as i64),
                ],
                span,
            );
            Ok(self.builder.result(op))
        }
    }

    fn lower_index(&mut self, index: &IndexExpression, ctx: &GenContext) -> LowerResult<Value> {
        let object = self.lower_expr(&index.object, ctx)?;
        let idx = self.lower_expr(&index.index, ctx)?;

        match self.types.get(object.ty).clone() {
            Type::Array(elem) | Type::ConstArray { element: elem, .. } => {
                let i32_ty = self.types.i32();
                let idx = self.coerce(idx, i32_ty, index.span)?;
                let ref_ty = self.types.reference(elem);
                let elem_ref = self.emit_op(
                    OpKind::ElementRef,
                    vec![object.id, idx.id],
                    &[ref_ty],
                    vec![],
                    index.span,
                );
                let elem_ref = self.builder.result(elem_ref);
                Ok(self.emit_load(elem_ref.id, elem, index.span))
            }
            Type::Tuple(_) | Type::ConstTuple(_) => {
                // Constant numeric index into a tuple.
                match self.constant_of(idx).and_then(|c| c.as_i64()) {
                    Some(ordinal) => {
                        let field = FieldId::Index(ordinal as u32);
                        match self.types.tuple_field(object.ty, &field) {
                            Some((_, ty)) => {
                                let op = self.emit_op(
                                    OpKind::ExtractField,
                                    vec![object.id],
                                    &[ty],
                                    vec![attr_int("index", ordinal)],
                                    index.span,
                                );
                                Ok(self.builder.result(op))
                            }
                            None => self.structural_error(
                                index.span,
                                format!("tuple has no element {}", ordinal),
                            ),
                        }
                    }
                    None => self.structural_error(
                        index.span,
                        "tuple element access requires a constant index",
                    ),
                }
            }
            Type::String | Type::Char => {
                let i32_ty = self.types.i32();
                let idx = self.coerce(idx, i32_ty, index.span)?;
                let char_ty = self.types.char();
                let op = self.emit_op(
                    OpKind::ElementRef,
                    vec![object.id, idx.id],
                    &[char_ty],
                    vec![],
                    index.span,
                );
                Ok(self.builder.result(op))
            }
            other => {
                let shown = self.types.display(object.ty);
                let _ = other;
                self.structural_error(index.span, format!("type '{}' is not indexable", shown))
            }
        }
    }

    // ── Calls ───────────────────────────────────────────────────────────

    pub(crate) fn lower_call(&mut self, call: &CallExpression, ctx: &GenContext) -> LowerResult<Value> {
        // super(...) invokes the base-class constructor on this.
        if let Expression::Super(span) = call.callee.as_ref() {
            return self.lower_super_call(call, *span, ctx);
        }

        // A named callee resolves to a declaration when it can; an
        // unresolved name consults the builtin table before failing.
        if let Expression::Identifier(ident) = call.callee.as_ref() {
            let name = self.interner.resolve(ident.name).to_string();
            match self.symbols.lookup(&name) {
                Some(Resolution::Function(entry)) => {
                    return self.lower_direct_call(&entry, &call.arguments, call.span, ctx);
                }
                Some(Resolution::Class(class_id)) => {
                    return self.construct_class(class_id, &call.arguments, call.span, ctx);
                }
                Some(_) => {}
                None => {
                    if self.builtin_identifier(&name, ident.span).is_none() {
                        if let Some(builtin) = self.lookup_builtin_call(&name) {
                            return self.lower_builtin_call(builtin, &call.arguments, call.span, ctx);
                        }
                    }
                }
            }
        }

        let callee = self.lower_expr(&call.callee, ctx)?;
        self.call_value(callee, &call.arguments, call.span, ctx)
    }

    /// Call a callee value, switching on its type.
    pub(crate) fn call_value(
        &mut self,
        callee: Value,
        arguments: &[Expression],
        span: Span,
        ctx: &GenContext,
    ) -> LowerResult<Value> {
        match self.types.get(callee.ty).clone() {
            Type::Function { inputs, results } => {
                let args = self.lower_call_arguments(arguments, &inputs, span, ctx)?;
                let mut operands = vec![callee.id];
                operands.extend(args);
                let result_ty = results.first().copied().unwrap_or_else(|| self.types.void());
                let op = self.emit_op(OpKind::CallIndirect, operands, &[result_ty], vec![], span);
                Ok(self.builder.result(op))
            }
            Type::HybridFunction { inputs, results } | Type::BoundFunction { inputs, results } => {
                // Unbind into (this, fn), then call with this prepended.
                let opaque = self.types.opaque();
                let this_field = self.emit_op(
                    OpKind::ExtractField,
                    vec![callee.id],
                    &[opaque],
                    vec![attr_str("field", "#this")],
                    span,
                );
                let this_value = self.builder.result(this_field);
                let mut fn_inputs = vec![opaque];
                fn_inputs.extend(inputs.iter().copied());
                let fn_ty = self.types.function(fn_inputs, results.clone());
                let fn_field = self.emit_op(
                    OpKind::ExtractField,
                    vec![callee.id],
                    &[fn_ty],
                    vec![attr_str("field", "#func")],
                    span,
                );
                let fn_value = self.builder.result(fn_field);

                let args = self.lower_call_arguments(arguments, &inputs, span, ctx)?;
                let mut operands = vec![fn_value.id, this_value.id];
                operands.extend(args);
                let result_ty = results.first().copied().unwrap_or_else(|| self.types.void());
                let op = self.emit_op(OpKind::CallIndirect, operands, &[result_ty], vec![], span);
                Ok(self.builder.result(op))
            }
            Type::Class { name, .. } => {
                let Some(&class_id) = self.class_by_fqn.get(&name) else {
                    return self.unresolved(&name, span, ctx);
                };
                self.construct_class(class_id, arguments, span, ctx)
            }
            _ => {
                let shown = self.types.display(callee.ty);
                self.structural_error(span, format!("type '{}' is not callable", shown))
            }
        }
    }

    /// Direct call to a known function; capture-carrying functions get
    /// their capture tuple materialized as the first argument.
    fn lower_direct_call(
        &mut self,
        entry: &crate::symbols::FunctionEntry,
        arguments: &[Expression],
        span: Span,
        ctx: &GenContext,
    ) -> LowerResult<Value> {
        let (inputs, results) = self
            .types
            .get(entry.ty)
            .as_signature()
            .map(|(i, r)| (i.to_vec(), r.to_vec()))
            .unwrap_or_default();

        let mut operands: Vec<ValueId> = Vec::new();
        let declared: Vec<TypeId> = if entry.capture_fields.is_empty() {
            inputs.clone()
        } else {
            let capture_ty = self.types.tuple(entry.capture_fields.clone());
            let mut capture_operands = Vec::new();
            for field in &entry.capture_fields {
                let name = field.id.as_name().unwrap_or_default().to_string();
                capture_operands.push(self.capture_operand(&name, field.ty, span, ctx));
            }
            let capture = self.emit_op(OpKind::Capture, capture_operands, &[capture_ty], vec![], span);
            operands.push(self.builder.result(capture).id);
            inputs.iter().skip(1).copied().collect()
        };

        let args = self.lower_call_arguments(arguments, &declared, span, ctx)?;
        operands.extend(args);

        let result_ty = results.first().copied().unwrap_or_else(|| self.types.void());
        let op = self.emit_op(
            OpKind::Call,
            operands,
            &[result_ty],
            vec![attr_str("callee", &entry.full_name)],
            span,
        );
        Ok(self.builder.result(op))
    }

    /// Lower call arguments against declared parameter types: coerce each
    /// one, pad missing arguments with `undef` of the declared type.
    pub(crate) fn lower_call_arguments(
        &mut self,
        arguments: &[Expression],
        declared: &[TypeId],
        span: Span,
        ctx: &GenContext,
    ) -> LowerResult<Vec<ValueId>> {
        let mut values = Vec::with_capacity(declared.len().max(arguments.len()));
        for (index, argument) in arguments.iter().enumerate() {
            if let Expression::Spread(spread) = argument {
                return self.structural_error(
                    spread.span,
                    "spread arguments require a rest parameter",
                );
            }
            let expected = declared.get(index).copied();
            let child = GenContext {
                arg_type_dest: expected,
                ..ctx.clone()
            };
            let value = self.lower_expr(argument, &child)?;
            let value = match expected {
                Some(expected) => self.coerce(value, expected, span)?,
                None => value,
            };
            values.push(value.id);
        }
        for missing in declared.iter().skip(arguments.len()) {
            values.push(self.emit_undef(*missing, span).id);
        }
        Ok(values)
    }

    fn lower_new(&mut self, new: &NewExpression, ctx: &GenContext) -> LowerResult<Value> {
        let callee = self.lower_expr(&new.callee, ctx)?;
        match self.types.get(callee.ty).clone() {
            Type::Class { name, .. } => {
                let Some(&class_id) = self.class_by_fqn.get(&name) else {
                    return self.unresolved(&name, new.span, ctx);
                };
                self.construct_class(class_id, &new.arguments, new.span, ctx)
            }
            _ => {
                let shown = self.types.display(callee.ty);
                self.structural_error(new.span, format!("'new' requires a class, found '{}'", shown))
            }
        }
    }

    fn lower_super_call(
        &mut self,
        call: &CallExpression,
        span: Span,
        ctx: &GenContext,
    ) -> LowerResult<Value> {
        let receiver = self.lower_super(span, ctx)?;
        let base_fqn = match self.types.get(receiver.ty) {
            Type::ClassStorage { name, .. } => name.clone(),
            _ => return self.structural_error(span, "'super' call requires a base class"),
        };
        let Some(&base_id) = self.class_by_fqn.get(&base_fqn) else {
            return self.unresolved(&base_fqn, span, ctx);
        };
        let base = self.class(base_id).clone();
        let void = self.types.void();
        if !base.has_constructor {
            return Ok(self.emit_undef(void, span));
        }
        let ctor = base.method("constructor").cloned();
        let declared: Vec<TypeId> = ctor
            .as_ref()
            .and_then(|m| self.types.get(m.func_ty).as_signature().map(|(i, _)| i.to_vec()))
            .map(|inputs| inputs.into_iter().skip(1).collect())
            .unwrap_or_default();
        let args = self.lower_call_arguments(&call.arguments, &declared, span, ctx)?;
        let mut operands = vec![receiver.id];
        operands.extend(args);
        let op = self.emit_op(
            OpKind::Call,
            operands,
            &[void],
            vec![attr_str("callee", &format!("{}.constructor", base.full_name))],
            span,
        );
        Ok(self.builder.result(op))
    }

    // ── Operators ───────────────────────────────────────────────────────

    fn lower_binary(&mut self, binary: &BinaryExpression, ctx: &GenContext) -> LowerResult<Value> {
        match binary.operator {
            BinaryOperator::LogicalAnd | BinaryOperator::LogicalOr => {
                self.lower_short_circuit(binary, ctx)
            }
            BinaryOperator::NullishCoalesce => self.lower_nullish(binary, ctx),
            BinaryOperator::In => {
                // `i in a` over arrays lowers as `i < a.length`.
                let left = self.lower_expr(&binary.left, ctx)?;
                let right = self.lower_expr(&binary.right, ctx)?;
                let i32_ty = self.types.i32();
                let left = self.coerce(left, i32_ty, binary.span)?;
                let len = self.emit_op(OpKind::Length, vec![right.id], &[i32_ty], vec![], binary.span);
                let len = self.builder.result(len);
                let bool_ty = self.types.boolean();
                let op = self.emit_op(
                    OpKind::Binary,
                    vec![left.id, len.id],
                    &[bool_ty],
                    vec![("binop".to_string(), Attribute::BinOp(BinOp::Lt))],
                    binary.span,
                );
                Ok(self.builder.result(op))
            }
            BinaryOperator::Instanceof => self.lower_instanceof(binary, ctx),
            _ => self.lower_arith_or_relational(binary, ctx),
        }
    }

    /// Short-circuit logical operators lower as if-then-else on a
    /// boolean-coerced left operand; the result is the narrower of the
    /// branch types.
    fn lower_short_circuit(
        &mut self,
        binary: &BinaryExpression,
        ctx: &GenContext,
    ) -> LowerResult<Value> {
        let left = self.lower_expr(&binary.left, ctx)?;
        let cond = self.boolean_coerce(left, binary.span)?;

        // The result type is deferred until both branches are lowered.
        let placeholder = self.types.undef_placeholder();
        let if_op = self
            .builder
            .create_op(OpKind::If, vec![cond.id], &[placeholder], vec![], 2, binary.span);
        let then_region = self.builder.op(if_op).regions[0];
        let else_region = self.builder.op(if_op).regions[1];
        let then_block = self.builder.create_block(then_region, &[]);
        let else_block = self.builder.create_block(else_region, &[]);

        // `a && b` takes the right operand on a truthy left; `a || b`
        // takes it on a falsy left.
        let (right_block, keep_block) = if binary.operator == BinaryOperator::LogicalAnd {
            (then_block, else_block)
        } else {
            (else_block, then_block)
        };

        let saved = self.builder.insertion_point();
        self.builder.set_insertion_point_to_end(right_block);
        let right = match self.lower_expr(&binary.right, ctx) {
            Ok(right) => {
                self.emit_op(OpKind::ReturnVal, vec![right.id], &[], vec![], binary.span);
                right
            }
            Err(err) => {
                self.builder.set_insertion_point(saved);
                return Err(err);
            }
        };
        self.builder.set_insertion_point_to_end(keep_block);
        self.emit_op(OpKind::ReturnVal, vec![left.id], &[], vec![], binary.span);
        self.builder.set_insertion_point(saved);

        let unified = {
            let union = self.types.union(vec![left.ty, right.ty]);
            self.base_type(left.ty, right.ty, union)
        };
        let result = self.builder.op(if_op).result(0);
        self.builder.module_mut().set_value_type(result, unified);
        Ok(self.builder.module().value(result))
    }

    /// `a ?? b`: yields `a` unless it is null/undefined.
    fn lower_nullish(&mut self, binary: &BinaryExpression, ctx: &GenContext) -> LowerResult<Value> {
        let left = self.lower_expr(&binary.left, ctx)?;
        let stripped = self.types.strip_optional(left.ty);
        let bool_ty = self.types.boolean();
        let null_ty = self.types.null();
        let null_value = self.emit_undef(null_ty, binary.span);
        let is_present = self.emit_op(
            OpKind::Binary,
            vec![left.id, null_value.id],
            &[bool_ty],
            vec![("binop".to_string(), Attribute::BinOp(BinOp::Ne))],
            binary.span,
        );
        let is_present = self.builder.result(is_present);

        let if_op = self
            .builder
            .create_op(OpKind::If, vec![is_present.id], &[stripped], vec![], 2, binary.span);
        let then_region = self.builder.op(if_op).regions[0];
        let else_region = self.builder.op(if_op).regions[1];
        let then_block = self.builder.create_block(then_region, &[]);
        let else_block = self.builder.create_block(else_region, &[]);

        let saved = self.builder.insertion_point();
        self.builder.set_insertion_point_to_end(then_block);
        let narrowed = self.emit_op(OpKind::Cast, vec![left.id], &[stripped], vec![], binary.span);
        let narrowed = self.builder.result(narrowed);
        self.emit_op(OpKind::ReturnVal, vec![narrowed.id], &[], vec![], binary.span);

        self.builder.set_insertion_point_to_end(else_block);
        let fallback = self.lower_expr(&binary.right, ctx);
        match fallback {
            Ok(fallback) => {
                let fallback = self.coerce(fallback, stripped, binary.span)?;
                self.emit_op(OpKind::ReturnVal, vec![fallback.id], &[], vec![], binary.span);
            }
            Err(err) => {
                self.builder.set_insertion_point(saved);
                return Err(err);
            }
        }
        self.builder.set_insertion_point(saved);

        Ok(self.builder.result(if_op))
    }

    fn lower_instanceof(&mut self, binary: &BinaryExpression, ctx: &GenContext) -> LowerResult<Value> {
        let left = self.lower_expr(&binary.left, ctx)?;
        let right = self.lower_expr(&binary.right, ctx)?;
        let bool_ty = self.types.boolean();

        if let Type::Class { name, .. } = self.types.get(right.ty).clone() {
            let rtti = self.emit_const_string(&name, binary.span);

            if matches!(self.types.get(left.ty), Type::Any | Type::Unknown) {
                // Branch on runtime type-of equality to "class" before the
                // instanceof call.
                let string_ty = self.types.string();
                let type_of = self.emit_op(OpKind::TypeOf, vec![left.id], &[string_ty], vec![], binary.span);
                let type_of = self.builder.result(type_of);
                let class_tag = self.emit_const_string("class", binary.span);
                let is_class = self.emit_op(
                    OpKind::Binary,
                    vec![type_of.id, class_tag.id],
                    &[bool_ty],
                    vec![("binop".to_string(), Attribute::BinOp(BinOp::Eq))],
                    binary.span,
                );
                let is_class = self.builder.result(is_class);

                let if_op = self
                    .builder
                    .create_op(OpKind::If, vec![is_class.id], &[bool_ty], vec![], 2, binary.span);
                let then_block = {
                    let region = self.builder.op(if_op).regions[0];
                    self.builder.create_block(region, &[])
                };
                let else_block = {
                    let region = self.builder.op(if_op).regions[1];
                    self.builder.create_block(region, &[])
                };

                let saved = self.builder.insertion_point();
                self.builder.set_insertion_point_to_end(then_block);
                let call = self.emit_op(
                    OpKind::Call,
                    vec![left.id, rtti.id],
                    &[bool_ty],
                    vec![attr_str("callee", &format!("{}.instanceof", name))],
                    binary.span,
                );
                let call = self.builder.result(call);
                self.emit_op(OpKind::ReturnVal, vec![call.id], &[], vec![], binary.span);

                self.builder.set_insertion_point_to_end(else_block);
                let no = self.emit_const_bool(false, binary.span);
                self.emit_op(OpKind::ReturnVal, vec![no.id], &[], vec![], binary.span);
                self.builder.set_insertion_point(saved);

                return Ok(self.builder.result(if_op));
            }

            let op = self.emit_op(
                OpKind::Call,
                vec![left.id, rtti.id],
                &[bool_ty],
                vec![attr_str("callee", &format!("{}.instanceof", name))],
                binary.span,
            );
            return Ok(self.builder.result(op));
        }

        // Fallback: runtime type-name equality.
        let string_ty = self.types.string();
        let left_tag = self.emit_op(OpKind::TypeOf, vec![left.id], &[string_ty], vec![], binary.span);
        let left_tag = self.builder.result(left_tag);
        let right_tag = self.emit_op(OpKind::TypeOf, vec![right.id], &[string_ty], vec![], binary.span);
        let right_tag = self.builder.result(right_tag);
        let op = self.emit_op(
            OpKind::Binary,
            vec![left_tag.id, right_tag.id],
            &[bool_ty],
            vec![("binop".to_string(), Attribute::BinOp(BinOp::Eq))],
            binary.span,
        );
        Ok(self.builder.result(op))
    }

    /// Arithmetic and relational operators under precedence-driven
    /// coercion: both-to-number for `/ % **`, both-to-int for shifts,
    /// string concatenation for `+` with a string side, widen otherwise.
    fn lower_arith_or_relational(
        &mut self,
        binary: &BinaryExpression,
        ctx: &GenContext,
    ) -> LowerResult<Value> {
        let left = self.lower_expr(&binary.left, ctx)?;
        let right = self.lower_expr(&binary.right, ctx)?;

        if ctx.allow_const_eval {
            if let Some(folded) = self.try_fold_binary(binary.operator, left, right, binary.span) {
                return Ok(folded);
            }
        }

        let op = binary.operator;
        let span = binary.span;

        let string_ty = self.types.string();
        let number_ty = self.types.number();
        let i32_ty = self.types.i32();
        let bool_ty = self.types.boolean();

        let left_is_string = self.types.strip_optional(left.ty) == string_ty
            || matches!(self.types.get(left.ty), Type::Literal { base, .. } if *base == string_ty);
        let right_is_string = self.types.strip_optional(right.ty) == string_ty
            || matches!(self.types.get(right.ty), Type::Literal { base, .. } if *base == string_ty);

        let (operand_ty, result_ty, bin) = match op {
            BinaryOperator::Add if left_is_string || right_is_string => {
                (string_ty, string_ty, BinOp::Add)
            }
            BinaryOperator::Div | BinaryOperator::Rem | BinaryOperator::Exp => {
                let bin = match op {
                    BinaryOperator::Div => BinOp::Div,
                    BinaryOperator::Rem => BinOp::Rem,
                    _ => BinOp::Exp,
                };
                (number_ty, number_ty, bin)
            }
            BinaryOperator::ShiftLeft | BinaryOperator::ShiftRight | BinaryOperator::ShiftRightUnsigned => {
                let bin = match op {
                    BinaryOperator::ShiftLeft => BinOp::Shl,
                    BinaryOperator::ShiftRight => BinOp::Shr,
                    _ => BinOp::ShrU,
                };
                (i32_ty, i32_ty, bin)
            }
            BinaryOperator::BitAnd | BinaryOperator::BitOr | BinaryOperator::BitXor => {
                let bin = match op {
                    BinaryOperator::BitAnd => BinOp::And,
                    BinaryOperator::BitOr => BinOp::Or,
                    _ => BinOp::Xor,
                };
                (i32_ty, i32_ty, bin)
            }
            BinaryOperator::Add | BinaryOperator::Sub | BinaryOperator::Mul => {
                let widened_l = self.types.widen(left.ty);
                let widened_r = self.types.widen(right.ty);
                let unified = self.base_type(widened_l, widened_r, number_ty);
                let unified = if self.types.get(unified).is_numeric() {
                    unified
                } else {
                    number_ty
                };
                let bin = match op {
                    BinaryOperator::Add => BinOp::Add,
                    BinaryOperator::Sub => BinOp::Sub,
                    _ => BinOp::Mul,
                };
                (unified, unified, bin)
            }
            BinaryOperator::Eq | BinaryOperator::StrictEq => {
                let unified = self.base_type(left.ty, right.ty, left.ty);
                (unified, bool_ty, BinOp::Eq)
            }
            BinaryOperator::NotEq | BinaryOperator::StrictNotEq => {
                let unified = self.base_type(left.ty, right.ty, left.ty);
                (unified, bool_ty, BinOp::Ne)
            }
            BinaryOperator::Less
            | BinaryOperator::LessEq
            | BinaryOperator::Greater
            | BinaryOperator::GreaterEq => {
                let widened_l = self.types.widen(left.ty);
                let widened_r = self.types.widen(right.ty);
                let unified = self.base_type(widened_l, widened_r, number_ty);
                let bin = match op {
                    BinaryOperator::Less => BinOp::Lt,
                    BinaryOperator::LessEq => BinOp::Le,
                    BinaryOperator::Greater => BinOp::Gt,
                    _ => BinOp::Ge,
                };
                (unified, bool_ty, bin)
            }
            BinaryOperator::LogicalAnd
            | BinaryOperator::LogicalOr
            | BinaryOperator::NullishCoalesce
            | BinaryOperator::In
            | BinaryOperator::Instanceof => unreachable!("handled in lower_binary"),
        };

        let left = self.coerce(left, operand_ty, span)?;
        let right = self.coerce(right, operand_ty, span)?;
        let result = self.emit_op(
            OpKind::Binary,
            vec![left.id, right.id],
            &[result_ty],
            vec![("binop".to_string(), Attribute::BinOp(bin))],
            span,
        );
        Ok(self.builder.result(result))
    }

    fn lower_conditional(
        &mut self,
        cond: &ConditionalExpression,
        ctx: &GenContext,
    ) -> LowerResult<Value> {
        let condition = self.lower_expr(&cond.condition, ctx)?;
        let condition = self.boolean_coerce(condition, cond.span)?;

        let placeholder = self.types.undef_placeholder();
        let if_op = self
            .builder
            .create_op(OpKind::If, vec![condition.id], &[placeholder], vec![], 2, cond.span);
        let then_region = self.builder.op(if_op).regions[0];
        let else_region = self.builder.op(if_op).regions[1];
        let then_block = self.builder.create_block(then_region, &[]);
        let else_block = self.builder.create_block(else_region, &[]);

        let saved = self.builder.insertion_point();
        self.builder.set_insertion_point_to_end(then_block);
        let then_value = match self.lower_expr(&cond.then_expr, ctx) {
            Ok(v) => v,
            Err(err) => {
                self.builder.set_insertion_point(saved);
                return Err(err);
            }
        };
        self.emit_op(OpKind::ReturnVal, vec![then_value.id], &[], vec![], cond.span);

        self.builder.set_insertion_point_to_end(else_block);
        let else_value = match self.lower_expr(&cond.else_expr, ctx) {
            Ok(v) => v,
            Err(err) => {
                self.builder.set_insertion_point(saved);
                return Err(err);
            }
        };
        self.emit_op(OpKind::ReturnVal, vec![else_value.id], &[], vec![], cond.span);
        self.builder.set_insertion_point(saved);

        let unified = {
            let union = self.types.union(vec![then_value.ty, else_value.ty]);
            self.base_type(then_value.ty, else_value.ty, union)
        };
        let result = self.builder.op(if_op).result(0);
        self.builder.module_mut().set_value_type(result, unified);
        Ok(self.builder.module().value(result))
    }

    fn lower_unary(&mut self, unary: &UnaryExpression, ctx: &GenContext) -> LowerResult<Value> {
        match unary.operator {
            UnaryOperator::Minus | UnaryOperator::Plus => {
                let value = self.lower_expr(&unary.operand, ctx)?;
                let widened = self.types.widen(value.ty);
                let number = self.types.number();
                let target = if self.types.get(widened).is_numeric() {
                    widened
                } else {
                    number
                };
                let value = self.coerce(value, target, unary.span)?;
                if matches!(unary.operator, UnaryOperator::Plus) {
                    return Ok(value);
                }
                let op = self.emit_op(
                    OpKind::Unary,
                    vec![value.id],
                    &[target],
                    vec![("unop".to_string(), Attribute::UnOp(UnOp::Neg))],
                    unary.span,
                );
                Ok(self.builder.result(op))
            }
            UnaryOperator::Not => {
                let value = self.lower_expr(&unary.operand, ctx)?;
                let value = self.boolean_coerce(value, unary.span)?;
                let bool_ty = self.types.boolean();
                let op = self.emit_op(
                    OpKind::Unary,
                    vec![value.id],
                    &[bool_ty],
                    vec![("unop".to_string(), Attribute::UnOp(UnOp::Not))],
                    unary.span,
                );
                Ok(self.builder.result(op))
            }
            UnaryOperator::BitNot => {
                let value = self.lower_expr(&unary.operand, ctx)?;
                let i32_ty = self.types.i32();
                let value = self.coerce(value, i32_ty, unary.span)?;
                let op = self.emit_op(
                    OpKind::Unary,
                    vec![value.id],
                    &[i32_ty],
                    vec![("unop".to_string(), Attribute::UnOp(UnOp::BitNot))],
                    unary.span,
                );
                Ok(self.builder.result(op))
            }
            UnaryOperator::TypeOf => {
                let value = self.lower_expr(&unary.operand, ctx)?;
                let string_ty = self.types.string();
                // Statically known operand types fold to their tag.
                if let Some(tag) = self.static_type_tag(value.ty) {
                    return Ok(self.emit_const_string(&tag, unary.span));
                }
                let op = self.emit_op(OpKind::TypeOf, vec![value.id], &[string_ty], vec![], unary.span);
                Ok(self.builder.result(op))
            }
            UnaryOperator::Void => {
                let _ = self.lower_expr(&unary.operand, ctx)?;
                let undefined = self.types.undefined();
                Ok(self.emit_undef(undefined, unary.span))
            }
            UnaryOperator::Delete => {
                let value = self.lower_expr(&unary.operand, ctx)?;
                let bool_ty = self.types.boolean();
                let op = self.emit_op(OpKind::Delete, vec![value.id], &[bool_ty], vec![], unary.span);
                Ok(self.builder.result(op))
            }
        }
    }

    /// The `typeof` tag of a statically known type.
    pub(crate) fn static_type_tag(&self, ty: TypeId) -> Option<String> {
        let tag = match self.types.get(ty) {
            Type::Number | Type::Int(_) | Type::Byte => "number",
            Type::String | Type::Char => "string",
            Type::Boolean => "boolean",
            Type::BigInt => "bigint",
            Type::Undefined => "undefined",
            Type::Function { .. } | Type::HybridFunction { .. } | Type::BoundFunction { .. } => {
                "function"
            }
            Type::Class { .. } | Type::Object(_) | Type::Tuple(_) | Type::ConstTuple(_) => "object",
            Type::Literal { base, .. } => return self.static_type_tag(*base),
            _ => return None,
        };
        Some(tag.to_string())
    }

    fn lower_update(&mut self, update: &UpdateExpression, ctx: &GenContext) -> LowerResult<Value> {
        let target = self.lower_target(&update.operand, ctx)?;
        let AssignTarget::Slot(slot) = target else {
            return self.structural_error(update.span, "invalid increment/decrement target");
        };
        let value_ty = self.types.strip_ref(slot.ty);
        let old = self.emit_load(slot.id, value_ty, update.span);
        let one = self.emit_const_int(1, value_ty, update.span);
        let bin = if update.increment { BinOp::Add } else { BinOp::Sub };
        let new = self.emit_op(
            OpKind::Binary,
            vec![old.id, one.id],
            &[value_ty],
            vec![("binop".to_string(), Attribute::BinOp(bin))],
            update.span,
        );
        let new = self.builder.result(new);
        self.emit_store(slot.id, new.id, update.span);
        Ok(if update.prefix { new } else { old })
    }

    fn lower_as_cast(&mut self, cast: &AsCastExpression, ctx: &GenContext) -> LowerResult<Value> {
        let value = self.lower_expr(&cast.expression, ctx)?;
        let target = self.resolve_type(&cast.target, ctx)?;
        if value.ty == target {
            return Ok(value);
        }
        if !self.castable(value.ty, target) && !self.castable(target, value.ty) {
            let from = self.types.display(value.ty);
            let to = self.types.display(target);
            return self.structural_error(
                cast.span,
                format!("conversion of '{}' to '{}' is not possible", from, to),
            );
        }
        self.emit_cast_value(value, target, cast.span)
    }

    /// Emit a cast, building an adapter vtable for tuple-to-interface
    /// conversions.
    pub(crate) fn emit_cast_value(&mut self, value: Value, target: TypeId, span: Span) -> LowerResult<Value> {
        if let Type::Interface { name } = self.types.get(target).clone() {
            let source_ty = match self.types.get(value.ty) {
                Type::Object(storage) => *storage,
                _ => value.ty,
            };
            if self.types.get(source_ty).as_tuple_fields().is_some() {
                self.ensure_tuple_adapter(source_ty, &name, span)?;
                let op = self.emit_op(
                    OpKind::NewInterface,
                    vec![value.id],
                    &[target],
                    vec![attr_str("interface", &name)],
                    span,
                );
                return Ok(self.builder.result(op));
            }
        }
        let op = self.emit_op(OpKind::Cast, vec![value.id], &[target], vec![], span);
        Ok(self.builder.result(op))
    }

    fn lower_await(&mut self, await_expr: &AwaitExpression, ctx: &GenContext) -> LowerResult<Value> {
        if !self.opts.enable_async {
            return self.structural_error(await_expr.span, "'await' requires async support");
        }
        let async_op = self
            .builder
            .create_op(OpKind::AsyncExec, vec![], &[], vec![], 1, await_expr.span);
        let region = self.builder.op(async_op).regions[0];
        let block = self.builder.create_block(region, &[]);

        let saved = self.builder.insertion_point();
        self.builder.set_insertion_point_to_end(block);
        let inner = self.lower_expr(&await_expr.value, ctx);
        let inner = match inner {
            Ok(inner) => {
                self.emit_op(OpKind::ReturnVal, vec![inner.id], &[], vec![], await_expr.span);
                inner
            }
            Err(err) => {
                self.builder.set_insertion_point(saved);
                return Err(err);
            }
        };
        self.builder.set_insertion_point(saved);

        let op = self.emit_op(
            OpKind::AwaitAll,
            vec![],
            &[inner.ty],
            vec![attr_int("tasks", 1)],
            await_expr.span,
        );
        Ok(self.builder.result(op))
    }

    // ── Assignment ──────────────────────────────────────────────────────

    fn lower_assignment(
        &mut self,
        assign: &AssignmentExpression,
        ctx: &GenContext,
    ) -> LowerResult<Value> {
        let target = self.lower_target(&assign.left, ctx)?;

        // Compound assignments read, combine, then write.
        let value = if let Some(binary_op) = assign.operator.binary_operator() {
            let synthetic = BinaryExpression {
                operator: binary_op,
                left: assign.left.clone(),
                right: assign.right.clone(),
                span: assign.span,
            };
            self.lower_binary(&synthetic, ctx)?
        } else {
            self.lower_expr(&assign.right, ctx)?
        };

        self.store_to_target(target, value, assign.span)?;
        Ok(value)
    }

    /// Analyze the left side of an assignment.
    pub(crate) fn lower_target(
        &mut self,
        expr: &Expression,
        ctx: &GenContext,
    ) -> LowerResult<AssignTarget> {
        match expr {
            Expression::Paren(paren) => self.lower_target(&paren.expression, ctx),
            Expression::Identifier(ident) => {
                let name = self.interner.resolve(ident.name).to_string();

                if let Some(frame) = self.func_stack.last() {
                    if let Some(capture) = frame.captures.get(&name).copied() {
                        if !capture.by_ref {
                            return self.structural_error(
                                ident.span,
                                format!("cannot assign to captured value '{}'", name),
                            );
                        }
                        let param = frame.capture_param.expect("capture without tuple param");
                        let ref_ty = self.types.reference(capture.ty);
                        let field = self.emit_op(
                            OpKind::ExtractField,
                            vec![param],
                            &[ref_ty],
                            vec![attr_str("field", &name)],
                            ident.span,
                        );
                        return Ok(AssignTarget::Slot(self.builder.result(field)));
                    }
                }

                match self.symbols.lookup(&name) {
                    Some(Resolution::Variable(var)) => {
                        let info = self.symbols.var(var).clone();
                        if !info.read_write {
                            return self.structural_error(
                                ident.span,
                                format!("cannot assign to constant '{}'", name),
                            );
                        }
                        let current_level = self.symbols.func_level();
                        if info.func_level > 0 && info.func_level < current_level {
                            ctx.record_capture(crate::context::CapturedVar {
                                name: info.name.clone(),
                                ty: info.ty,
                                by_ref: true,
                            });
                        }
                        let slot = self.variable_ref(&info, ident.span)?;
                        Ok(AssignTarget::Slot(slot))
                    }
                    _ => {
                        let _ = self.unresolved(&name, ident.span, ctx)?;
                        Err(LowerError::unresolved(name, ident.span))
                    }
                }
            }
            Expression::Member(member) => {
                let property = self.interner.resolve(member.property.name).to_string();
                let object = self.lower_expr(&member.object, ctx)?;
                self.member_target(object, &property, member.span, ctx)
            }
            Expression::Index(index) => {
                let object = self.lower_expr(&index.object, ctx)?;
                let idx = self.lower_expr(&index.index, ctx)?;
                match self.types.get(object.ty).clone() {
                    Type::Array(elem) => {
                        let i32_ty = self.types.i32();
                        let idx = self.coerce(idx, i32_ty, index.span)?;
                        Ok(AssignTarget::Element {
                            object,
                            index: idx,
                            elem_ty: elem,
                        })
                    }
                    _ => self.structural_error(index.span, "cannot assign into this value"),
                }
            }
            Expression::ArrayLiteral(array) => {
                let mut targets = Vec::with_capacity(array.elements.len());
                for element in &array.elements {
                    targets.push(self.lower_target(element, ctx)?);
                }
                Ok(AssignTarget::Pattern(targets))
            }
            _ => self.structural_error(expr.span(), "invalid assignment target"),
        }
    }

    /// Member write target: accessor setter, instance field ref, tuple
    /// field ref (via local storage), or this-field.
    fn member_target(
        &mut self,
        object: Value,
        property: &str,
        span: Span,
        _ctx: &GenContext,
    ) -> LowerResult<AssignTarget> {
        match self.types.get(object.ty).clone() {
            Type::Class { name, .. } => {
                let Some(&class_id) = self.class_by_fqn.get(&name) else {
                    return self.structural_error(span, format!("unknown class '{}'", name));
                };
                let info = self.class(class_id).clone();
                if let Some(accessor) = info.accessor(property) {
                    let Some(setter) = accessor.setter.clone() else {
                        return self.structural_error(
                            span,
                            format!("property '{}' has no setter", property),
                        );
                    };
                    return Ok(AssignTarget::Accessor {
                        setter,
                        receiver: Some(object.id),
                        value_ty: accessor.ty,
                    });
                }
                if let Some((_, field_ty)) = self
                    .types
                    .tuple_field(info.storage_ty, &FieldId::Name(property.to_string()))
                {
                    let ref_ty = self.types.reference(field_ty);
                    let field_ref = self.emit_op(
                        OpKind::PropertyRef,
                        vec![object.id],
                        &[ref_ty],
                        vec![attr_str("field", property)],
                        span,
                    );
                    return Ok(AssignTarget::Slot(self.builder.result(field_ref)));
                }
                self.structural_error(
                    span,
                    format!("property '{}' does not exist on '{}'", property, info.name),
                )
            }
            Type::Object(storage) => {
                match self
                    .types
                    .tuple_field(storage, &FieldId::Name(property.to_string()))
                {
                    Some((_, field_ty)) => {
                        let ref_ty = self.types.reference(field_ty);
                        let field_ref = self.emit_op(
                            OpKind::PropertyRef,
                            vec![object.id],
                            &[ref_ty],
                            vec![attr_str("field", property)],
                            span,
                        );
                        Ok(AssignTarget::Slot(self.builder.result(field_ref)))
                    }
                    None => self.structural_error(
                        span,
                        format!("property '{}' does not exist", property),
                    ),
                }
            }
            _ => self.structural_error(span, "cannot assign to this member"),
        }
    }

    pub(crate) fn store_to_target(
        &mut self,
        target: AssignTarget,
        value: Value,
        span: Span,
    ) -> LowerResult<()> {
        match target {
            AssignTarget::Slot(slot) => {
                let value_ty = self.types.strip_ref(slot.ty);
                let value = self.coerce(value, value_ty, span)?;
                self.emit_store(slot.id, value.id, span);
                Ok(())
            }
            AssignTarget::Accessor {
                setter,
                receiver,
                value_ty,
            } => {
                let value = self.coerce(value, value_ty, span)?;
                let mut operands = Vec::new();
                if let Some(receiver) = receiver {
                    operands.push(receiver);
                }
                operands.push(value.id);
                self.emit_op(
                    OpKind::AccessorWrite,
                    operands,
                    &[],
                    vec![attr_str("setter", &setter)],
                    span,
                );
                Ok(())
            }
            AssignTarget::Element {
                object,
                index,
                elem_ty,
            } => {
                let value = self.coerce(value, elem_ty, span)?;
                let ref_ty = self.types.reference(elem_ty);
                let elem_ref = self.emit_op(
                    OpKind::ElementRef,
                    vec![object.id, index.id],
                    &[ref_ty],
                    vec![],
                    span,
                );
                let elem_ref = self.builder.result(elem_ref);
                self.emit_store(elem_ref.id, value.id, span);
                Ok(())
            }
            AssignTarget::Pattern(targets) => {
                for (ordinal, element) in targets.into_iter().enumerate() {
                    let elem_ty = match self.types.get(value.ty) {
                        Type::Array(e) | Type::ConstArray { element: e, .. } => *e,
                        _ => self.types.any(),
                    };
                    let extracted = self.emit_op(
                        OpKind::ExtractField,
                        vec![value.id],
                        &[elem_ty],
                        vec![attr_int("index", ordinal as i64)],
                        span,
                    );
                    let extracted = self.builder.result(extracted);
                    self.store_to_target(element, extracted, span)?;
                }
                Ok(())
            }
        }
    }

    // ── Coercions ───────────────────────────────────────────────────────

    /// Coerce a value into a branch condition.
    pub(crate) fn boolean_coerce(&mut self, value: Value, span: Span) -> LowerResult<Value> {
        let bool_ty = self.types.boolean();
        if value.ty == bool_ty {
            return Ok(value);
        }
        let op = self.emit_op(OpKind::Cast, vec![value.id], &[bool_ty], vec![], span);
        Ok(self.builder.result(op))
    }

    fn coerce_to_string(&mut self, value: Value, span: Span) -> LowerResult<Value> {
        let string_ty = self.types.string();
        if value.ty == string_ty {
            return Ok(value);
        }
        let op = self.emit_op(OpKind::Cast, vec![value.id], &[string_ty], vec![], span);
        Ok(self.builder.result(op))
    }

    /// The constant payload of a value, when its defining op is a
    /// constant.
    pub(crate) fn constant_of(&self, value: Value) -> Option<LiteralValue> {
        let def = self.builder.module().value_def(value.id);
        let tsir_ir::ValueDef::OpResult(op_id, _) = def else {
            return None;
        };
        let op = self.builder.module().op(op_id);
        if op.kind != OpKind::Constant {
            return None;
        }
        match op.attr("value")? {
            Attribute::Int(i) => Some(LiteralValue::Int(*i)),
            Attribute::Float(f) => Some(LiteralValue::number(*f)),
            Attribute::Str(s) => Some(LiteralValue::Str(s.clone())),
            Attribute::Bool(b) => Some(LiteralValue::Bool(*b)),
            _ => None,
        }
    }

    /// True when the value is a reference to the class symbol itself
    /// (static side), not an instance.
    fn is_class_symbol(&self, value: Value) -> bool {
        let def = self.builder.module().value_def(value.id);
        match def {
            tsir_ir::ValueDef::OpResult(op_id, _) => {
                self.builder.module().op(op_id).kind == OpKind::SymbolRef
            }
            _ => false,
        }
    }

    /// Whether a type carries the named member (union member-access
    /// precondition).
    fn type_has_member(&self, ty: TypeId, property: &str) -> bool {
        match self.types.get(ty) {
            Type::Tuple(fields) | Type::ConstTuple(fields) => fields
                .iter()
                .any(|f| f.id.as_name() == Some(property)),
            Type::Object(storage) => self.type_has_member(*storage, property),
            Type::Class { name, .. } => self
                .class_by_fqn
                .get(name)
                .map(|&id| {
                    let info = self.class(id);
                    self.types
                        .get(info.storage_ty)
                        .as_tuple_fields()
                        .map(|fields| fields.iter().any(|f| f.id.as_name() == Some(property)))
                        .unwrap_or(false)
                        || info.method(property).is_some()
                        || info.accessor(property).is_some()
                })
                .unwrap_or(false),
            Type::Interface { name } => self
                .iface_by_fqn
                .get(name)
                .map(|&id| self.interface(id).member(property).is_some())
                .unwrap_or(false),
            _ => false,
        }
    }
}

trait LiteralText {
    fn to_string_value(&self) -> String;
}

impl LiteralText for LiteralValue {
    fn to_string_value(&self) -> String {
        match self {
            LiteralValue::Int(i) => i.to_string(),
            LiteralValue::Number(bits) => f64::from_bits(*bits).to_string(),
            LiteralValue::Str(s) => s.clone(),
            LiteralValue::Bool(b) => b.to_string(),
        }
    }
}
