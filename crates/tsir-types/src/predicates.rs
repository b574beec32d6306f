//! Structural queries over the type lattice
//!
//! Pure helpers the lowering core drives: implicit-conversion legality,
//! common-base computation, constituent walks, and undefined-content
//! detection.

use crate::store::TypeStore;
use crate::ty::{FieldId, Type, TypeId};

/// Shape of one interface member as the castability check needs it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InterfaceMemberShape {
    pub id: FieldId,
    pub ty: TypeId,
    pub optional: bool,
    pub is_method: bool,
}

/// Resolver for nominal facts the type lattice does not carry: interface
/// member lists and class heritage. The lowering core implements this;
/// [`NoInterfaces`] is the empty environment.
pub trait InterfaceLookup {
    /// Members of the interface `name`, in declaration order (including
    /// extended interfaces), or `None` if unknown.
    fn interface_members(&self, name: &str) -> Option<Vec<InterfaceMemberShape>>;

    /// True if class `derived` has `base` in its base-class chain.
    fn is_subclass_of(&self, _derived: &str, _base: &str) -> bool {
        false
    }

    /// True if class `class_name` implements interface `iface_name`
    /// (directly or through a base class).
    fn class_implements(&self, _class_name: &str, _iface_name: &str) -> bool {
        false
    }
}

/// The empty nominal environment.
pub struct NoInterfaces;

impl InterfaceLookup for NoInterfaces {
    fn interface_members(&self, _name: &str) -> Option<Vec<InterfaceMemberShape>> {
        None
    }
}

/// Implicit-conversion legality: true when a value of `from` may be cast
/// to `to` without an explicit assertion.
pub fn is_castable(
    store: &TypeStore,
    from: TypeId,
    to: TypeId,
    env: &dyn InterfaceLookup,
) -> bool {
    if from == to {
        return true;
    }

    let from_ty = store.get(from);
    let to_ty = store.get(to);

    // any/unknown absorb everything; never converts to everything.
    if matches!(to_ty, Type::Any | Type::Unknown) {
        return true;
    }
    if matches!(from_ty, Type::Any | Type::Never | Type::UndefPlaceholder) {
        return true;
    }

    match (from_ty, to_ty) {
        // optional stripping in both directions
        (Type::Optional(inner), _) => is_castable(store, *inner, to, env),
        (_, Type::Optional(inner)) => {
            matches!(from_ty, Type::Undefined | Type::Null)
                || is_castable(store, from, *inner, env)
        }

        // a literal converts as its base type does
        (Type::Literal { base, .. }, _) => is_castable(store, *base, to, env),
        (_, Type::Literal { value, base }) => {
            // only the identical literal narrows into a literal type
            match store.get(from) {
                Type::Literal { value: v, base: b } => v == value && b == base,
                _ => false,
            }
        }

        // union on the target: castable to any arm
        (_, Type::Union(members)) => members.iter().any(|m| is_castable(store, from, *m, env)),
        // union on the source: every arm must convert
        (Type::Union(members), _) => members.iter().all(|m| is_castable(store, *m, to, env)),

        // numeric widening: integer <-> number, narrower -> wider integer
        (Type::Int(w1), Type::Int(w2)) => w2 >= w1,
        (Type::Int(_) | Type::Byte, Type::Number) => true,
        (Type::Number, Type::Int(_)) => true,
        (Type::Byte, Type::Int(_)) => true,
        (Type::Enum { storage, .. }, _) => is_castable(store, *storage, to, env),
        (_, Type::Enum { storage, .. }) => is_castable(store, from, *storage, env),

        // char widens to string
        (Type::Char, Type::String) => true,

        // const-array widens to array of the same element
        (Type::ConstArray { element, .. }, Type::Array(to_elem)) => {
            is_castable(store, *element, *to_elem, env)
        }
        (Type::Array(a), Type::Array(b)) => a == b,
        (Type::ConstTuple(a), Type::Tuple(b)) => a == b,

        // function shapes: hybrid accepts both plain and bound values
        (Type::Function { inputs: i1, results: r1 }, Type::HybridFunction { inputs: i2, results: r2 })
        | (Type::BoundFunction { inputs: i1, results: r1 }, Type::HybridFunction { inputs: i2, results: r2 }) => {
            i1 == i2 && r1 == r2
        }

        // nominal class upcasts
        (Type::Class { name: derived, .. }, Type::Class { name: base, .. }) => {
            env.is_subclass_of(derived, base)
        }
        (Type::Class { name: class_name, .. }, Type::Interface { name: iface }) => {
            env.class_implements(class_name, iface)
        }

        // self-referential fields are recorded as TypeRef to the class name
        (Type::TypeRef { name: a, .. }, Type::Class { name: b, .. })
        | (Type::Class { name: a, .. }, Type::TypeRef { name: b, .. }) => {
            a == b || env.is_subclass_of(a, b)
        }

        // structural match: tuple (or object over tuple) to interface
        (Type::Tuple(_) | Type::ConstTuple(_), Type::Interface { name }) => {
            tuple_satisfies_interface(store, from, name, env)
        }
        (Type::Object(storage), Type::Interface { name }) => {
            tuple_satisfies_interface(store, *storage, name, env)
        }

        (Type::Null, Type::Class { .. } | Type::Interface { .. } | Type::Object(_)) => true,

        _ => false,
    }
}

/// Every required member of the interface must have a matching field in
/// the tuple with a castable type; optional members may be missing.
fn tuple_satisfies_interface(
    store: &TypeStore,
    tuple: TypeId,
    iface_name: &str,
    env: &dyn InterfaceLookup,
) -> bool {
    let Some(members) = env.interface_members(iface_name) else {
        return false;
    };
    let Some(fields) = store.get(tuple).as_tuple_fields() else {
        return false;
    };

    members.iter().all(|member| {
        match fields.iter().find(|f| f.id == member.id) {
            Some(field) => is_castable(store, field.ty, member.ty, env)
                || matches!(store.get(member.ty), Type::Function { .. } | Type::HybridFunction { .. }),
            None => member.optional,
        }
    })
}

/// Smallest type assignable from both `a` and `b`, else `default`.
pub fn find_base_type(
    store: &TypeStore,
    a: TypeId,
    b: TypeId,
    default: TypeId,
    env: &dyn InterfaceLookup,
) -> TypeId {
    if a == b {
        return a;
    }
    if is_castable(store, a, b, env) {
        return b;
    }
    if is_castable(store, b, a, env) {
        return a;
    }
    default
}

/// Depth-first walk over a type's transitive constituents. The callback
/// returns `true` to continue the walk, `false` to stop; the function
/// returns `false` when the callback stopped it.
pub fn iterate_type(store: &TypeStore, id: TypeId, f: &mut dyn FnMut(TypeId) -> bool) -> bool {
    if !f(id) {
        return false;
    }

    match store.get(id).clone() {
        Type::Array(e)
        | Type::ConstArray { element: e, .. }
        | Type::Ref(e)
        | Type::ValueRef(e)
        | Type::Optional(e)
        | Type::Object(e)
        | Type::KeyOf(e) => iterate_type(store, e, f),
        Type::Tuple(fields) | Type::ConstTuple(fields) | Type::ClassStorage { fields, .. } => {
            fields.iter().all(|field| iterate_type(store, field.ty, f))
        }
        Type::Union(members) | Type::Intersection(members) => {
            members.iter().all(|m| iterate_type(store, *m, f))
        }
        Type::Literal { base, .. } => iterate_type(store, base, f),
        Type::Enum { storage, .. } => iterate_type(store, storage, f),
        Type::Function { inputs, results }
        | Type::HybridFunction { inputs, results }
        | Type::BoundFunction { inputs, results } => {
            inputs.iter().chain(results.iter()).all(|t| iterate_type(store, *t, f))
        }
        Type::Conditional {
            check,
            extends,
            true_ty,
            false_ty,
        } => [check, extends, true_ty, false_ty]
            .into_iter()
            .all(|t| iterate_type(store, t, f)),
        Type::Mapped {
            constraint,
            template,
            ..
        } => iterate_type(store, constraint, f) && iterate_type(store, template, f),
        Type::IndexedAccess { object, index } => {
            iterate_type(store, object, f) && iterate_type(store, index, f)
        }
        Type::TypeRef { args, .. } => args.iter().all(|t| iterate_type(store, *t, f)),
        // scalars and nominal references have no constituents to descend
        _ => true,
    }
}

/// True when the type's constituents include `undefined` or the
/// undefined placeholder. Such types do not override a concrete type
/// during return-type unification.
pub fn has_undefines(store: &TypeStore, id: TypeId) -> bool {
    let mut found = false;
    iterate_type(store, id, &mut |t| {
        if matches!(
            store.get(t),
            Type::Undefined | Type::UndefPlaceholder | Type::Optional(_)
        ) {
            found = true;
            return false;
        }
        true
    });
    found
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ty::{IntWidth, LiteralValue, TupleField};

    fn env() -> NoInterfaces {
        NoInterfaces
    }

    #[test]
    fn identity_and_any() {
        let mut store = TypeStore::new();
        let n = store.number();
        let a = store.any();
        assert!(is_castable(&store, n, n, &env()));
        assert!(is_castable(&store, n, a, &env()));
        assert!(is_castable(&store, a, n, &env()));
    }

    #[test]
    fn optional_strip() {
        let mut store = TypeStore::new();
        let n = store.number();
        let opt = store.optional(n);
        assert!(is_castable(&store, opt, n, &env()));
        assert!(is_castable(&store, n, opt, &env()));
        let u = store.undefined();
        assert!(is_castable(&store, u, opt, &env()));
    }

    #[test]
    fn numeric_widening() {
        let mut store = TypeStore::new();
        let i32t = store.i32();
        let i64t = store.i64();
        let n = store.number();
        assert!(is_castable(&store, i32t, i64t, &env()));
        assert!(!is_castable(&store, i64t, i32t, &env()));
        assert!(is_castable(&store, i32t, n, &env()));
        assert!(is_castable(&store, n, i32t, &env()));
    }

    #[test]
    fn char_to_string_one_way() {
        let mut store = TypeStore::new();
        let c = store.char();
        let s = store.string();
        assert!(is_castable(&store, c, s, &env()));
        assert!(!is_castable(&store, s, c, &env()));
    }

    #[test]
    fn const_array_widens() {
        let mut store = TypeStore::new();
        let n = store.number();
        let ca = store.const_array(n, 3);
        let arr = store.array(n);
        assert!(is_castable(&store, ca, arr, &env()));
        assert!(!is_castable(&store, arr, ca, &env()));
    }

    #[test]
    fn literal_converts_as_base() {
        let mut store = TypeStore::new();
        let s = store.string();
        let lit = store.literal(LiteralValue::Str("a".into()), s);
        assert!(is_castable(&store, lit, s, &env()));
        assert!(!is_castable(&store, s, lit, &env()));
    }

    #[test]
    fn union_membership() {
        let mut store = TypeStore::new();
        let n = store.number();
        let s = store.string();
        let b = store.boolean();
        let u = store.union(vec![n, s]);
        assert!(is_castable(&store, n, u, &env()));
        assert!(is_castable(&store, s, u, &env()));
        assert!(!is_castable(&store, b, u, &env()));
        assert!(!is_castable(&store, u, n, &env()));
    }

    #[test]
    fn tuple_to_interface_structural() {
        struct Env {
            member_ty: TypeId,
        }
        impl InterfaceLookup for Env {
            fn interface_members(&self, name: &str) -> Option<Vec<InterfaceMemberShape>> {
                if name != "P" {
                    return None;
                }
                Some(vec![
                    InterfaceMemberShape {
                        id: FieldId::name("name"),
                        ty: self.member_ty,
                        optional: false,
                        is_method: false,
                    },
                    InterfaceMemberShape {
                        id: FieldId::name("age"),
                        ty: self.member_ty,
                        optional: true,
                        is_method: false,
                    },
                ])
            }
        }

        let mut store = TypeStore::new();
        let s = store.string();
        let iface = store.interface("P");
        let good = store.tuple(vec![TupleField::named("name", s)]);
        let bad = store.tuple(vec![TupleField::named("other", s)]);
        let env = Env { member_ty: s };
        assert!(is_castable(&store, good, iface, &env));
        assert!(!is_castable(&store, bad, iface, &env));
    }

    #[test]
    fn base_type_prefers_wider() {
        let mut store = TypeStore::new();
        let i32t = store.int(IntWidth::I32);
        let i64t = store.int(IntWidth::I64);
        let n = store.number();
        let never = store.never();
        assert_eq!(find_base_type(&store, i32t, i64t, never, &env()), i64t);
        assert_eq!(find_base_type(&store, n, i32t, never, &env()), n);
        let s = store.string();
        let b = store.boolean();
        assert_eq!(find_base_type(&store, s, b, never, &env()), never);
    }

    #[test]
    fn undefines_detection() {
        let mut store = TypeStore::new();
        let n = store.number();
        let u = store.undefined();
        let opt = store.optional(n);
        assert!(!has_undefines(&store, n));
        assert!(has_undefines(&store, u));
        assert!(has_undefines(&store, opt));
        let fields = vec![TupleField::named("a", opt)];
        let t = store.tuple(fields);
        assert!(has_undefines(&store, t));
    }

    #[test]
    fn iterator_visits_constituents() {
        let mut store = TypeStore::new();
        let n = store.number();
        let s = store.string();
        let t = store.tuple(vec![TupleField::named("a", n), TupleField::named("b", s)]);
        let arr = store.array(t);
        let mut visited = Vec::new();
        iterate_type(&store, arr, &mut |id| {
            visited.push(id);
            true
        });
        assert!(visited.contains(&arr));
        assert!(visited.contains(&t));
        assert!(visited.contains(&n));
        assert!(visited.contains(&s));
    }

    #[test]
    fn cast_idempotence_law() {
        // cast(T, cast(T, x)) == cast(T, x): once a value has type T,
        // casting to T is the identity conversion.
        let mut store = TypeStore::new();
        let i32t = store.i32();
        let n = store.number();
        assert!(is_castable(&store, i32t, n, &env()));
        assert!(is_castable(&store, n, n, &env()));
    }
}
