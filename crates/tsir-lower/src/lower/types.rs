//! Type annotation resolution
//!
//! Maps syntactic `TypeNode`s onto interned lattice types. Named
//! references search the per-scope alias overrides first, then the
//! symbol store; unresolved names are recoverable outcomes that
//! reschedule the enclosing declaration.

use super::CoreCompiler;
use crate::context::GenContext;
use crate::error::{LowerError, LowerResult};
use crate::symbols::Resolution;
use tsir_ast::ast::{
    FunctionTypeNode, LiteralTypeValue, ObjectTypeMember, TypeNode, TypeReferenceNode,
};
use tsir_types::{LiteralValue, TupleField, Type, TypeId};

impl<'a> CoreCompiler<'a> {
    /// Resolve a type annotation.
    pub(crate) fn resolve_type(&mut self, node: &TypeNode, ctx: &GenContext) -> LowerResult<TypeId> {
        match node {
            TypeNode::Reference(reference) => self.resolve_type_reference(reference, ctx),
            TypeNode::Union(members, _) => {
                let mut ids = Vec::with_capacity(members.len());
                for member in members {
                    ids.push(self.resolve_type(member, ctx)?);
                }
                Ok(self.types.union(ids))
            }
            TypeNode::Intersection(members, _) => {
                let mut ids = Vec::with_capacity(members.len());
                for member in members {
                    ids.push(self.resolve_type(member, ctx)?);
                }
                Ok(self.types.intersection(ids))
            }
            TypeNode::Array(element, _) => {
                let element = self.resolve_type(element, ctx)?;
                Ok(self.types.array(element))
            }
            TypeNode::Tuple(elements, _) => {
                let mut fields = Vec::with_capacity(elements.len());
                for (index, element) in elements.iter().enumerate() {
                    let ty = self.resolve_type(element, ctx)?;
                    fields.push(TupleField::indexed(index as u32, ty));
                }
                Ok(self.types.tuple(fields))
            }
            TypeNode::Optional(inner, _) => {
                let inner = self.resolve_type(inner, ctx)?;
                Ok(self.types.optional(inner))
            }
            TypeNode::Function(func) => self.resolve_function_type(func, ctx),
            TypeNode::Literal(literal) => {
                let value = match &literal.value {
                    LiteralTypeValue::String(sym) => {
                        LiteralValue::Str(self.interner.resolve(*sym).to_string())
                    }
                    LiteralTypeValue::Number(n) => {
                        if n.fract() == 0.0 {
                            LiteralValue::Int(*n as i64)
                        } else {
                            LiteralValue::number(*n)
                        }
                    }
                    LiteralTypeValue::Boolean(b) => LiteralValue::Bool(*b),
                };
                Ok(self.literal_type(value))
            }
            TypeNode::Object(members, _) => self.resolve_object_type(members, ctx),
            TypeNode::KeyOf(inner, _) => {
                let inner = self.resolve_type(inner, ctx)?;
                Ok(self.eval_keyof(inner))
            }
            TypeNode::IndexedAccess { object, index, .. } => {
                let object = self.resolve_type(object, ctx)?;
                let index = self.resolve_type(index, ctx)?;
                Ok(self.eval_indexed_access(object, index))
            }
            TypeNode::Conditional {
                check,
                extends,
                true_type,
                false_type,
                ..
            } => {
                let check = self.resolve_type(check, ctx)?;
                let extends = self.resolve_type(extends, ctx)?;
                if self.castable(check, extends) {
                    self.resolve_type(true_type, ctx)
                } else {
                    self.resolve_type(false_type, ctx)
                }
            }
            TypeNode::Mapped {
                param,
                constraint,
                template,
                ..
            } => {
                let param_name = self.interner.resolve(param.name).to_string();
                let constraint = self.resolve_type(constraint, ctx)?;
                let template = self.resolve_type(template, ctx)?;
                Ok(self.types.intern(Type::Mapped {
                    param: param_name,
                    constraint,
                    template,
                }))
            }
            TypeNode::Infer(name, _) => {
                let name = self.interner.resolve(name.name).to_string();
                Ok(self.types.intern(Type::Infer(name)))
            }
        }
    }

    fn resolve_type_reference(
        &mut self,
        reference: &TypeReferenceNode,
        ctx: &GenContext,
    ) -> LowerResult<TypeId> {
        let first = self.interner.resolve(reference.segments[0]).to_string();

        if reference.segments.len() == 1 {
            // Per-scope alias overrides win over everything.
            if let Some(&overridden) = ctx.type_alias_map.borrow().get(&first) {
                return Ok(overridden);
            }
            if let Some(builtin) = self.builtin_type_name(&first, reference, ctx)? {
                return Ok(builtin);
            }
        }

        // Walk qualified segments through namespaces.
        let mut resolution = self.symbols.lookup(&first);
        for segment in &reference.segments[1..] {
            let segment = self.interner.resolve(*segment).to_string();
            resolution = match resolution {
                Some(Resolution::Namespace(ns)) => self.symbols.lookup_in_namespace(ns, &segment),
                _ => None,
            };
        }

        let span = reference.span;
        match resolution {
            Some(Resolution::Class(class_id)) => Ok(self.class(class_id).ty),
            Some(Resolution::Interface(iface_id)) => Ok(self.interface(iface_id).ty),
            Some(Resolution::Enum(entry)) => Ok(entry.ty),
            Some(Resolution::TypeAlias(ty)) => Ok(ty),
            Some(Resolution::Namespace(ns)) => {
                let name = self.symbols.namespace(ns).full_name.clone();
                Ok(self.types.namespace(name))
            }
            _ => {
                let full = reference
                    .segments
                    .iter()
                    .map(|s| self.interner.resolve(*s).to_string())
                    .collect::<Vec<_>>()
                    .join(".");
                ctx.record_unresolved(&full, span);
                if ctx.allow_partial_resolve {
                    Err(LowerError::unresolved(full, span))
                } else {
                    self.structural_error(span, format!("cannot resolve type '{}'", full))
                }
            }
        }
    }

    /// The built-in scalar and generic type names.
    fn builtin_type_name(
        &mut self,
        name: &str,
        reference: &TypeReferenceNode,
        ctx: &GenContext,
    ) -> LowerResult<Option<TypeId>> {
        let ty = match name {
            "number" => Some(self.types.number()),
            "string" => Some(self.types.string()),
            "boolean" => Some(self.types.boolean()),
            "void" => Some(self.types.void()),
            "any" => Some(self.types.any()),
            "unknown" => Some(self.types.unknown()),
            "never" => Some(self.types.never()),
            "null" => Some(self.types.null()),
            "undefined" => Some(self.types.undefined()),
            "bigint" => Some(self.types.bigint()),
            "symbol" => Some(self.types.intern(Type::SymbolTy)),
            "object" => {
                let storage = self.types.tuple(vec![]);
                Some(self.types.object(storage))
            }
            "Array" => {
                let element = match reference.type_args.first() {
                    Some(arg) => self.resolve_type(arg, ctx)?,
                    None => self.types.any(),
                };
                Some(self.types.array(element))
            }
            _ => None,
        };
        Ok(ty)
    }

    fn resolve_function_type(
        &mut self,
        func: &FunctionTypeNode,
        ctx: &GenContext,
    ) -> LowerResult<TypeId> {
        let mut inputs = Vec::with_capacity(func.params.len());
        for param in &func.params {
            let mut ty = match &param.type_annotation {
                Some(annotation) => self.resolve_type(annotation, ctx)?,
                None => self.types.any(),
            };
            if param.is_optional {
                ty = self.types.optional(ty);
            }
            if param.is_rest {
                ty = self.types.array(ty);
            }
            inputs.push(ty);
        }
        let ret = self.resolve_type(&func.return_type, ctx)?;
        let results = if ret == self.types.void() {
            vec![]
        } else {
            vec![ret]
        };
        Ok(self.types.function(inputs, results))
    }

    fn resolve_object_type(
        &mut self,
        members: &[ObjectTypeMember],
        ctx: &GenContext,
    ) -> LowerResult<TypeId> {
        let mut fields = Vec::with_capacity(members.len());
        for member in members {
            let name = self.interner.resolve(member.name).to_string();
            let mut ty = self.resolve_type(&member.ty, ctx)?;
            if member.optional {
                ty = self.types.optional(ty);
            }
            fields.push(TupleField::named(name, ty));
        }
        Ok(self.types.tuple(fields))
    }

    /// `keyof T` over a known member list becomes a union of string
    /// literal types; otherwise the operator is kept symbolic.
    pub(crate) fn eval_keyof(&mut self, inner: TypeId) -> TypeId {
        let names: Option<Vec<String>> = match self.types.get(inner).clone() {
            Type::Tuple(fields) | Type::ConstTuple(fields) | Type::ClassStorage { fields, .. } => {
                Some(
                    fields
                        .iter()
                        .filter_map(|f| f.id.as_name().map(str::to_string))
                        .collect(),
                )
            }
            Type::Interface { name } => self
                .iface_by_fqn
                .get(&name)
                .copied()
                .map(|id| {
                    let info = self.interface(id).clone();
                    self.collect_interface_members(&info)
                        .into_iter()
                        .map(|m| m.name)
                        .collect()
                }),
            Type::Class { storage, .. } => match self.types.get(storage) {
                Type::ClassStorage { fields, .. } => Some(
                    fields
                        .iter()
                        .filter_map(|f| f.id.as_name().map(str::to_string))
                        .collect(),
                ),
                _ => None,
            },
            _ => None,
        };

        match names {
            Some(names) => {
                let literals: Vec<TypeId> = names
                    .into_iter()
                    .map(|n| self.literal_type(LiteralValue::Str(n)))
                    .collect();
                self.types.union(literals)
            }
            None => self.types.intern(Type::KeyOf(inner)),
        }
    }

    /// `T[K]` with a literal key over a known member list becomes the
    /// member type.
    pub(crate) fn eval_indexed_access(&mut self, object: TypeId, index: TypeId) -> TypeId {
        if let Type::Literal {
            value: LiteralValue::Str(key),
            ..
        } = self.types.get(index).clone()
        {
            let field = self
                .types
                .tuple_field(object, &tsir_types::FieldId::Name(key.clone()));
            if let Some((_, ty)) = field {
                return ty;
            }
        }
        self.types.intern(Type::IndexedAccess { object, index })
    }
}

#[cfg(test)]
mod tests {
    use crate::context::GenContext;
    use crate::options::CompilerOptions;
    use crate::lower::CoreCompiler;
    use tsir_ast::build::AstBuilder;
    use tsir_ast::Span;
    use tsir_ir::IrModule;
    use tsir_types::Type;

    #[test]
    fn resolves_builtin_scalars_and_unions() {
        let mut b = AstBuilder::new();
        let n = b.number_ty();
        let s = b.string_ty();
        let union = b.union_ty(vec![n, s]);
        let mut interner = b.into_interner();
        let module = IrModule::new("t", Span::synthetic());
        let mut compiler = CoreCompiler::new(&mut interner, CompilerOptions::default(), module);
        let ctx = GenContext::strict();
        let id = compiler.resolve_type(&union, &ctx).unwrap();
        match compiler.types.get(id) {
            Type::Union(members) => assert_eq!(members.len(), 2),
            other => panic!("expected union, got {:?}", other),
        }
    }

    #[test]
    fn keyof_object_type_is_literal_union() {
        let mut b = AstBuilder::new();
        let n = b.number_ty();
        let s = b.string_ty();
        let obj = b.object_ty(vec![("a", n), ("b", s)]);
        let keyof = tsir_ast::ast::TypeNode::KeyOf(Box::new(obj), Span::synthetic());
        let mut interner = b.into_interner();
        let module = IrModule::new("t", Span::synthetic());
        let mut compiler = CoreCompiler::new(&mut interner, CompilerOptions::default(), module);
        let ctx = GenContext::strict();
        let id = compiler.resolve_type(&keyof, &ctx).unwrap();
        match compiler.types.get(id) {
            Type::Union(members) => assert_eq!(members.len(), 2),
            other => panic!("expected literal union, got {:?}", other),
        }
    }
}
