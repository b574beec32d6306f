//! Type store: structural interning of types
//!
//! Identical types always map to the same `TypeId`, so type equality in
//! the lowering core is an integer comparison.

use crate::ty::{FieldId, IntWidth, LiteralValue, TupleField, Type, TypeId};
use rustc_hash::FxHashMap;

/// Interning store for all types in a compilation.
#[derive(Debug, Clone)]
pub struct TypeStore {
    types: Vec<Type>,
    type_to_id: FxHashMap<Type, TypeId>,
}

impl Default for TypeStore {
    fn default() -> Self {
        Self::new()
    }
}

impl TypeStore {
    pub fn new() -> Self {
        let mut store = TypeStore {
            types: Vec::new(),
            type_to_id: FxHashMap::default(),
        };

        // Pre-intern the scalar lattice so their ids are stable and cheap.
        store.intern(Type::Void);
        store.intern(Type::Boolean);
        store.intern(Type::Number);
        store.intern(Type::String);
        store.intern(Type::Any);
        store.intern(Type::Unknown);
        store.intern(Type::Never);
        store.intern(Type::Null);
        store.intern(Type::Undefined);
        store.intern(Type::Opaque);
        store.intern(Type::Int(IntWidth::I32));
        store.intern(Type::Int(IntWidth::I64));

        store
    }

    /// Intern a type, returning its id. Identical structure returns the
    /// identical id.
    pub fn intern(&mut self, ty: Type) -> TypeId {
        if let Some(&id) = self.type_to_id.get(&ty) {
            return id;
        }
        let id = TypeId(self.types.len() as u32);
        self.types.push(ty.clone());
        self.type_to_id.insert(ty, id);
        id
    }

    /// Get a type by id.
    pub fn get(&self, id: TypeId) -> &Type {
        &self.types[id.0 as usize]
    }

    pub fn len(&self) -> usize {
        self.types.len()
    }

    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }

    // ── Scalar accessors ────────────────────────────────────────────────

    pub fn void(&mut self) -> TypeId {
        self.intern(Type::Void)
    }

    pub fn boolean(&mut self) -> TypeId {
        self.intern(Type::Boolean)
    }

    pub fn number(&mut self) -> TypeId {
        self.intern(Type::Number)
    }

    pub fn string(&mut self) -> TypeId {
        self.intern(Type::String)
    }

    pub fn char(&mut self) -> TypeId {
        self.intern(Type::Char)
    }

    pub fn any(&mut self) -> TypeId {
        self.intern(Type::Any)
    }

    pub fn unknown(&mut self) -> TypeId {
        self.intern(Type::Unknown)
    }

    pub fn never(&mut self) -> TypeId {
        self.intern(Type::Never)
    }

    pub fn null(&mut self) -> TypeId {
        self.intern(Type::Null)
    }

    pub fn undefined(&mut self) -> TypeId {
        self.intern(Type::Undefined)
    }

    pub fn undef_placeholder(&mut self) -> TypeId {
        self.intern(Type::UndefPlaceholder)
    }

    pub fn opaque(&mut self) -> TypeId {
        self.intern(Type::Opaque)
    }

    pub fn bigint(&mut self) -> TypeId {
        self.intern(Type::BigInt)
    }

    pub fn int(&mut self, width: IntWidth) -> TypeId {
        self.intern(Type::Int(width))
    }

    pub fn i32(&mut self) -> TypeId {
        self.int(IntWidth::I32)
    }

    pub fn i64(&mut self) -> TypeId {
        self.int(IntWidth::I64)
    }

    // ── Composite constructors ──────────────────────────────────────────

    pub fn array(&mut self, element: TypeId) -> TypeId {
        self.intern(Type::Array(element))
    }

    pub fn const_array(&mut self, element: TypeId, len: u32) -> TypeId {
        self.intern(Type::ConstArray { element, len })
    }

    pub fn tuple(&mut self, fields: Vec<TupleField>) -> TypeId {
        self.intern(Type::Tuple(fields))
    }

    pub fn const_tuple(&mut self, fields: Vec<TupleField>) -> TypeId {
        self.intern(Type::ConstTuple(fields))
    }

    pub fn reference(&mut self, element: TypeId) -> TypeId {
        self.intern(Type::Ref(element))
    }

    pub fn value_ref(&mut self, element: TypeId) -> TypeId {
        self.intern(Type::ValueRef(element))
    }

    pub fn optional(&mut self, element: TypeId) -> TypeId {
        // optional(optional(T)) collapses
        if matches!(self.get(element), Type::Optional(_)) {
            return element;
        }
        self.intern(Type::Optional(element))
    }

    pub fn literal(&mut self, value: LiteralValue, base: TypeId) -> TypeId {
        self.intern(Type::Literal { value, base })
    }

    pub fn enum_type(&mut self, name: impl Into<String>, storage: TypeId) -> TypeId {
        self.intern(Type::Enum {
            name: name.into(),
            storage,
        })
    }

    pub fn object(&mut self, storage: TypeId) -> TypeId {
        self.intern(Type::Object(storage))
    }

    pub fn function(&mut self, inputs: Vec<TypeId>, results: Vec<TypeId>) -> TypeId {
        self.intern(Type::Function { inputs, results })
    }

    pub fn hybrid_function(&mut self, inputs: Vec<TypeId>, results: Vec<TypeId>) -> TypeId {
        self.intern(Type::HybridFunction { inputs, results })
    }

    pub fn bound_function(&mut self, inputs: Vec<TypeId>, results: Vec<TypeId>) -> TypeId {
        self.intern(Type::BoundFunction { inputs, results })
    }

    pub fn class(&mut self, name: impl Into<String>, storage: TypeId) -> TypeId {
        self.intern(Type::Class {
            name: name.into(),
            storage,
        })
    }

    pub fn class_storage(&mut self, name: impl Into<String>, fields: Vec<TupleField>) -> TypeId {
        self.intern(Type::ClassStorage {
            name: name.into(),
            fields,
        })
    }

    pub fn interface(&mut self, name: impl Into<String>) -> TypeId {
        self.intern(Type::Interface { name: name.into() })
    }

    pub fn namespace(&mut self, name: impl Into<String>) -> TypeId {
        self.intern(Type::Namespace { name: name.into() })
    }

    /// Canonicalizing union constructor: flattens nested unions, removes
    /// duplicates (set semantics), folds `undefined` members into an
    /// enclosing `optional`, and unwraps a single residual member.
    pub fn union(&mut self, members: Vec<TypeId>) -> TypeId {
        let mut flat = Vec::with_capacity(members.len());
        for member in members {
            match self.get(member) {
                Type::Union(inner) => flat.extend_from_slice(inner),
                _ => flat.push(member),
            }
        }

        let undefined = self.undefined();
        let mut has_undefined = false;
        let mut seen = Vec::new();
        for member in flat {
            if member == undefined {
                has_undefined = true;
                continue;
            }
            if !seen.contains(&member) {
                seen.push(member);
            }
        }

        let inner = match seen.len() {
            0 => {
                return if has_undefined { undefined } else { self.never() };
            }
            1 => seen[0],
            _ => {
                seen.sort_unstable();
                self.intern(Type::Union(seen))
            }
        };

        if has_undefined {
            self.optional(inner)
        } else {
            inner
        }
    }

    /// Canonicalizing intersection constructor: dedupes and unwraps a
    /// single residual member.
    pub fn intersection(&mut self, members: Vec<TypeId>) -> TypeId {
        let mut flat = Vec::with_capacity(members.len());
        for member in members {
            match self.get(member) {
                Type::Intersection(inner) => flat.extend_from_slice(inner),
                _ => flat.push(member),
            }
        }

        let mut seen: Vec<TypeId> = Vec::new();
        for member in flat {
            if !seen.contains(&member) {
                seen.push(member);
            }
        }

        match seen.len() {
            0 => self.never(),
            1 => seen[0],
            _ => {
                seen.sort_unstable();
                self.intern(Type::Intersection(seen))
            }
        }
    }

    // ── Structural helpers ──────────────────────────────────────────────

    /// Strip `optional` wrappers.
    pub fn strip_optional(&self, mut id: TypeId) -> TypeId {
        while let Type::Optional(inner) = self.get(id) {
            id = *inner;
        }
        id
    }

    /// Strip `ref`/`value-ref` wrappers.
    pub fn strip_ref(&self, id: TypeId) -> TypeId {
        match self.get(id) {
            Type::Ref(inner) | Type::ValueRef(inner) => *inner,
            _ => id,
        }
    }

    /// Widen a type for a mutable binding: literals widen to their base,
    /// const-array/const-tuple to array/tuple.
    pub fn widen(&mut self, id: TypeId) -> TypeId {
        match self.get(id).clone() {
            Type::Literal { base, .. } => base,
            Type::ConstArray { element, .. } => self.array(element),
            Type::ConstTuple(fields) => self.tuple(fields),
            _ => id,
        }
    }

    /// Look up a field within a tuple-shaped type by id.
    pub fn tuple_field(&self, id: TypeId, field: &FieldId) -> Option<(usize, TypeId)> {
        let fields = self.get(id).as_tuple_fields()?;
        fields
            .iter()
            .enumerate()
            .find(|(_, f)| &f.id == field)
            .map(|(i, f)| (i, f.ty))
    }

    /// Render a type for diagnostics.
    pub fn display(&self, id: TypeId) -> String {
        match self.get(id) {
            Type::Void => "void".into(),
            Type::Boolean => "boolean".into(),
            Type::Number => "number".into(),
            Type::BigInt => "bigint".into(),
            Type::String => "string".into(),
            Type::Char => "char".into(),
            Type::Byte => "byte".into(),
            Type::Opaque => "opaque".into(),
            Type::Any => "any".into(),
            Type::Unknown => "unknown".into(),
            Type::Never => "never".into(),
            Type::Null => "null".into(),
            Type::Undefined => "undefined".into(),
            Type::SymbolTy => "symbol".into(),
            Type::UndefPlaceholder => "<undef>".into(),
            Type::Int(w) => format!("i{}", w.bits()),
            Type::Array(e) => format!("{}[]", self.display(*e)),
            Type::ConstArray { element, len } => {
                format!("const {}[{}]", self.display(*element), len)
            }
            Type::Tuple(fields) | Type::ConstTuple(fields) => {
                let inner: Vec<String> = fields
                    .iter()
                    .map(|f| format!("{}: {}", f.id, self.display(f.ty)))
                    .collect();
                format!("[{}]", inner.join(", "))
            }
            Type::Ref(e) => format!("ref<{}>", self.display(*e)),
            Type::ValueRef(e) => format!("value_ref<{}>", self.display(*e)),
            Type::Optional(e) => format!("{} | undefined", self.display(*e)),
            Type::Union(members) => members
                .iter()
                .map(|m| self.display(*m))
                .collect::<Vec<_>>()
                .join(" | "),
            Type::Intersection(members) => members
                .iter()
                .map(|m| self.display(*m))
                .collect::<Vec<_>>()
                .join(" & "),
            Type::Literal { value, .. } => format!("{}", value),
            Type::Enum { name, .. } => format!("enum {}", name),
            Type::Object(storage) => format!("object<{}>", self.display(*storage)),
            Type::Function { inputs, results }
            | Type::HybridFunction { inputs, results }
            | Type::BoundFunction { inputs, results } => {
                let params: Vec<String> = inputs.iter().map(|t| self.display(*t)).collect();
                let ret = match results.first() {
                    Some(r) => self.display(*r),
                    None => "void".into(),
                };
                format!("({}) => {}", params.join(", "), ret)
            }
            Type::Class { name, .. } => name.clone(),
            Type::ClassStorage { name, .. } => format!("{}@storage", name),
            Type::Interface { name } => name.clone(),
            Type::Namespace { name } => format!("namespace {}", name),
            Type::Conditional { .. } => "<conditional>".into(),
            Type::Mapped { .. } => "<mapped>".into(),
            Type::IndexedAccess { .. } => "<indexed-access>".into(),
            Type::KeyOf(e) => format!("keyof {}", self.display(*e)),
            Type::Infer(name) => format!("infer {}", name),
            Type::TypeRef { name, .. } => name.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interning_is_structural() {
        let mut store = TypeStore::new();
        let n = store.number();
        let a1 = store.array(n);
        let a2 = store.array(n);
        assert_eq!(a1, a2);
        let s = store.string();
        let a3 = store.array(s);
        assert_ne!(a1, a3);
    }

    #[test]
    fn union_dedupes_and_unwraps() {
        let mut store = TypeStore::new();
        let n = store.number();
        let s = store.string();
        assert_eq!(store.union(vec![n, n]), n);
        let u1 = store.union(vec![n, s]);
        let u2 = store.union(vec![s, n]);
        assert_eq!(u1, u2);
        assert!(store.get(u1).is_union());
    }

    #[test]
    fn union_folds_undefined_to_optional() {
        let mut store = TypeStore::new();
        let n = store.number();
        let u = store.undefined();
        let opt = store.union(vec![n, u]);
        assert_eq!(store.get(opt), &Type::Optional(n));
        // and strip gets back the inner type
        assert_eq!(store.strip_optional(opt), n);
    }

    #[test]
    fn nested_unions_flatten() {
        let mut store = TypeStore::new();
        let n = store.number();
        let s = store.string();
        let b = store.boolean();
        let inner = store.union(vec![n, s]);
        let outer = store.union(vec![inner, b]);
        match store.get(outer) {
            Type::Union(members) => assert_eq!(members.len(), 3),
            other => panic!("expected union, got {:?}", other),
        }
    }

    #[test]
    fn widen_literal_and_const_array() {
        let mut store = TypeStore::new();
        let n = store.number();
        let lit = store.literal(LiteralValue::Int(3), n);
        assert_eq!(store.widen(lit), n);

        let ca = store.const_array(n, 4);
        let widened = store.widen(ca);
        assert_eq!(store.get(widened), &Type::Array(n));
    }

    #[test]
    fn tuple_field_lookup() {
        let mut store = TypeStore::new();
        let n = store.number();
        let s = store.string();
        let t = store.tuple(vec![TupleField::named("a", n), TupleField::named("b", s)]);
        let (idx, ty) = store.tuple_field(t, &FieldId::name("b")).unwrap();
        assert_eq!(idx, 1);
        assert_eq!(ty, s);
        assert!(store.tuple_field(t, &FieldId::name("c")).is_none());
    }

    #[test]
    fn int_width_covering() {
        assert_eq!(IntWidth::covering(0), IntWidth::I32);
        assert_eq!(IntWidth::covering(1 << 31), IntWidth::I64);
        assert_eq!(IntWidth::covering(i64::MAX as i128 + 1), IntWidth::I128);
    }
}
