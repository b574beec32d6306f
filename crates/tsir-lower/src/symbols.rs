//! Namespace tree and scoped symbol store
//!
//! A stack of block scopes is layered over a hierarchy of namespaces.
//! Lookup searches scopes innermost-first, then the current namespace
//! chain's tables, then the root namespace, and finally the
//! fully-qualified-name map. Resolution against a variable declared
//! outside the current function activation is the capture-discovery
//! signal.

use rustc_hash::FxHashMap;
use std::fmt;
use tsir_ast::Span;
use tsir_ir::{OpId, ValueId};
use tsir_types::{TupleField, TypeId};

/// Identifier of a namespace in the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NamespaceId(u32);

/// Identifier of a variable declaration in the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct VarId(u32);

/// Identifier of a class in the compiler's class table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ClassId(pub u32);

/// Identifier of an interface in the compiler's interface table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct InterfaceId(pub u32);

impl fmt::Display for ClassId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "class#{}", self.0)
    }
}

/// Where a variable's storage lives.
#[derive(Debug, Clone, PartialEq)]
pub enum VarStorage {
    /// A `variable` op result: a ref into the enclosing region.
    Local(ValueId),
    /// An immutable SSA value bound directly (const with value
    /// semantics).
    Value(ValueId),
    /// A ref that aliases existing storage (`const-ref` for-of bindings).
    ConstRef(ValueId),
    /// A module/namespace global, addressed by symbol.
    Global(String),
    /// Relocated into a field of `this` (generator locals).
    ThisField(String),
    /// Not yet materialized (discovery probe).
    Pending,
}

/// Descriptor of one declared variable.
#[derive(Debug, Clone)]
pub struct VariableInfo {
    pub name: String,
    pub full_name: String,
    pub ty: TypeId,
    pub location: Span,
    pub read_write: bool,
    pub storage: VarStorage,
    /// Function-activation depth at declaration; a use from a deeper
    /// activation is a capture.
    pub func_level: usize,
}

/// A function known to a namespace.
#[derive(Debug, Clone)]
pub struct FunctionEntry {
    pub full_name: String,
    /// The resolved function type.
    pub ty: TypeId,
    /// Capture tuple fields, when the function closes over outer
    /// variables; call sites must materialize this tuple.
    pub capture_fields: Vec<TupleField>,
    /// The definitive func op (absent during discovery).
    pub op: Option<OpId>,
    pub is_generator: bool,
    pub is_async: bool,
}

/// An enum known to a namespace.
#[derive(Debug, Clone)]
pub struct EnumEntry {
    pub full_name: String,
    pub ty: TypeId,
    pub members: Vec<(String, i128)>,
}

/// Target of an import-equals binding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImportTarget {
    Namespace(NamespaceId),
    Class(ClassId),
    Interface(InterfaceId),
}

/// One namespace's tables. At most one entry per short name per table.
#[derive(Debug, Default)]
pub struct Namespace {
    pub name: String,
    pub full_name: String,
    pub parent: Option<NamespaceId>,
    pub children: FxHashMap<String, NamespaceId>,
    pub functions: FxHashMap<String, FunctionEntry>,
    pub globals: FxHashMap<String, VarId>,
    pub classes: FxHashMap<String, ClassId>,
    pub interfaces: FxHashMap<String, InterfaceId>,
    pub enums: FxHashMap<String, EnumEntry>,
    pub type_aliases: FxHashMap<String, TypeId>,
    pub imports: FxHashMap<String, ImportTarget>,
}

/// What a successful lookup found.
#[derive(Debug, Clone)]
pub enum Resolution {
    Variable(VarId),
    Function(FunctionEntry),
    Class(ClassId),
    Interface(InterfaceId),
    Enum(EnumEntry),
    Namespace(NamespaceId),
    TypeAlias(TypeId),
}

/// One block scope.
#[derive(Debug, Default)]
struct Scope {
    bindings: FxHashMap<String, VarId>,
    /// Marks a function-activation boundary.
    func_boundary: bool,
}

/// The symbol store.
#[derive(Debug)]
pub struct SymbolStore {
    namespaces: Vec<Namespace>,
    vars: Vec<VariableInfo>,
    scopes: Vec<Scope>,
    /// Current-namespace stack; the last entry is active.
    namespace_stack: Vec<NamespaceId>,
    /// Fully-qualified name → namespace.
    fqn_namespaces: FxHashMap<String, NamespaceId>,
}

impl Default for SymbolStore {
    fn default() -> Self {
        Self::new()
    }
}

impl SymbolStore {
    pub fn new() -> Self {
        let root = Namespace {
            name: String::new(),
            full_name: String::new(),
            ..Namespace::default()
        };
        SymbolStore {
            namespaces: vec![root],
            vars: Vec::new(),
            scopes: vec![Scope::default()],
            namespace_stack: vec![NamespaceId(0)],
            fqn_namespaces: FxHashMap::default(),
        }
    }

    pub fn root(&self) -> NamespaceId {
        NamespaceId(0)
    }

    pub fn current_namespace(&self) -> NamespaceId {
        *self.namespace_stack.last().expect("namespace stack empty")
    }

    pub fn namespace(&self, id: NamespaceId) -> &Namespace {
        &self.namespaces[id.0 as usize]
    }

    pub fn namespace_mut(&mut self, id: NamespaceId) -> &mut Namespace {
        &mut self.namespaces[id.0 as usize]
    }

    /// Qualify a short name against the current namespace.
    pub fn qualify(&self, name: &str) -> String {
        let current = self.namespace(self.current_namespace());
        if current.full_name.is_empty() {
            name.to_string()
        } else {
            format!("{}.{}", current.full_name, name)
        }
    }

    /// Get or create a child namespace of the current one and push it.
    pub fn enter_namespace(&mut self, name: &str) -> NamespaceId {
        let current = self.current_namespace();
        if let Some(&existing) = self.namespace(current).children.get(name) {
            self.namespace_stack.push(existing);
            return existing;
        }
        let full_name = self.qualify(name);
        let id = NamespaceId(self.namespaces.len() as u32);
        self.namespaces.push(Namespace {
            name: name.to_string(),
            full_name: full_name.clone(),
            parent: Some(current),
            ..Namespace::default()
        });
        self.namespace_mut(current)
            .children
            .insert(name.to_string(), id);
        self.fqn_namespaces.insert(full_name, id);
        self.namespace_stack.push(id);
        id
    }

    pub fn leave_namespace(&mut self) {
        debug_assert!(self.namespace_stack.len() > 1, "left the root namespace");
        self.namespace_stack.pop();
    }

    /// Temporarily switch to an arbitrary namespace (member re-resolution).
    pub fn push_namespace(&mut self, id: NamespaceId) {
        self.namespace_stack.push(id);
    }

    pub fn namespace_by_fqn(&self, fqn: &str) -> Option<NamespaceId> {
        self.fqn_namespaces.get(fqn).copied()
    }

    // ── Scopes ──────────────────────────────────────────────────────────

    pub fn enter_scope(&mut self) {
        self.scopes.push(Scope::default());
    }

    /// Enter a scope that starts a new function activation.
    pub fn enter_function_scope(&mut self) {
        self.scopes.push(Scope {
            func_boundary: true,
            ..Scope::default()
        });
    }

    pub fn leave_scope(&mut self) {
        debug_assert!(self.scopes.len() > 1, "left the outermost scope");
        self.scopes.pop();
    }

    /// Current function-activation depth.
    pub fn func_level(&self) -> usize {
        self.scopes.iter().filter(|s| s.func_boundary).count()
    }

    // ── Declaration ─────────────────────────────────────────────────────

    /// Insert a variable into the current scope. Fails when the name
    /// already exists at this scope and `redeclare` is false.
    pub fn declare(
        &mut self,
        name: &str,
        mut info: VariableInfo,
        redeclare: bool,
    ) -> Result<VarId, VarId> {
        let scope = self.scopes.last_mut().expect("scope stack empty");
        if let Some(&existing) = scope.bindings.get(name) {
            if !redeclare {
                return Err(existing);
            }
        }
        info.func_level = self
            .scopes
            .iter()
            .filter(|s| s.func_boundary)
            .count();
        let id = VarId(self.vars.len() as u32);
        self.vars.push(info);
        self.scopes
            .last_mut()
            .expect("scope stack empty")
            .bindings
            .insert(name.to_string(), id);
        Ok(id)
    }

    pub fn var(&self, id: VarId) -> &VariableInfo {
        &self.vars[id.0 as usize]
    }

    pub fn var_mut(&mut self, id: VarId) -> &mut VariableInfo {
        &mut self.vars[id.0 as usize]
    }

    /// Register a namespace-level global variable.
    pub fn declare_global(&mut self, namespace: NamespaceId, name: &str, info: VariableInfo) -> VarId {
        let id = VarId(self.vars.len() as u32);
        self.vars.push(info);
        self.namespace_mut(namespace)
            .globals
            .insert(name.to_string(), id);
        id
    }

    // ── Lookup ──────────────────────────────────────────────────────────

    /// Resolve a short name: scopes innermost-first, the current
    /// namespace chain, the root namespace, then the fqn namespace map.
    pub fn lookup(&self, name: &str) -> Option<Resolution> {
        for scope in self.scopes.iter().rev() {
            if let Some(&var) = scope.bindings.get(name) {
                return Some(Resolution::Variable(var));
            }
        }

        let mut cursor = Some(self.current_namespace());
        while let Some(ns_id) = cursor {
            if let Some(resolution) = self.lookup_in_namespace(ns_id, name) {
                return Some(resolution);
            }
            cursor = self.namespace(ns_id).parent;
        }

        if let Some(resolution) = self.lookup_in_namespace(self.root(), name) {
            return Some(resolution);
        }

        self.fqn_namespaces
            .get(name)
            .map(|&id| Resolution::Namespace(id))
    }

    /// Resolve a name against one namespace's tables only.
    pub fn lookup_in_namespace(&self, ns_id: NamespaceId, name: &str) -> Option<Resolution> {
        let ns = self.namespace(ns_id);
        if let Some(&var) = ns.globals.get(name) {
            return Some(Resolution::Variable(var));
        }
        if let Some(entry) = ns.functions.get(name) {
            return Some(Resolution::Function(entry.clone()));
        }
        if let Some(&class) = ns.classes.get(name) {
            return Some(Resolution::Class(class));
        }
        if let Some(&iface) = ns.interfaces.get(name) {
            return Some(Resolution::Interface(iface));
        }
        if let Some(entry) = ns.enums.get(name) {
            return Some(Resolution::Enum(entry.clone()));
        }
        if let Some(&alias) = ns.type_aliases.get(name) {
            return Some(Resolution::TypeAlias(alias));
        }
        if let Some(&child) = ns.children.get(name) {
            return Some(Resolution::Namespace(child));
        }
        if let Some(&import) = ns.imports.get(name) {
            return Some(match import {
                ImportTarget::Namespace(id) => Resolution::Namespace(id),
                ImportTarget::Class(id) => Resolution::Class(id),
                ImportTarget::Interface(id) => Resolution::Interface(id),
            });
        }
        None
    }

    /// Drop every block scope back to the outermost one (between passes).
    pub fn reset_scopes(&mut self) {
        self.scopes.truncate(1);
        self.scopes[0].bindings.clear();
        self.namespace_stack.truncate(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tsir_types::TypeStore;

    fn var_info(name: &str, ty: TypeId) -> VariableInfo {
        VariableInfo {
            name: name.into(),
            full_name: name.into(),
            ty,
            location: Span::synthetic(),
            read_write: true,
            storage: VarStorage::Pending,
            func_level: 0,
        }
    }

    #[test]
    fn declare_and_lookup() {
        let mut types = TypeStore::new();
        let n = types.number();
        let mut store = SymbolStore::new();
        let id = store.declare("x", var_info("x", n), false).unwrap();
        match store.lookup("x") {
            Some(Resolution::Variable(found)) => assert_eq!(found, id),
            other => panic!("unexpected resolution {:?}", other),
        }
    }

    #[test]
    fn redeclare_fails_in_same_scope() {
        let mut types = TypeStore::new();
        let n = types.number();
        let mut store = SymbolStore::new();
        store.declare("x", var_info("x", n), false).unwrap();
        assert!(store.declare("x", var_info("x", n), false).is_err());
        assert!(store.declare("x", var_info("x", n), true).is_ok());
    }

    #[test]
    fn inner_scope_shadows_and_unwinds() {
        let mut types = TypeStore::new();
        let n = types.number();
        let s = types.string();
        let mut store = SymbolStore::new();
        let outer = store.declare("x", var_info("x", n), false).unwrap();
        store.enter_scope();
        let inner = store.declare("x", var_info("x", s), false).unwrap();
        match store.lookup("x") {
            Some(Resolution::Variable(found)) => assert_eq!(found, inner),
            other => panic!("unexpected resolution {:?}", other),
        }
        store.leave_scope();
        match store.lookup("x") {
            Some(Resolution::Variable(found)) => assert_eq!(found, outer),
            other => panic!("unexpected resolution {:?}", other),
        }
    }

    #[test]
    fn func_level_counts_boundaries() {
        let mut store = SymbolStore::new();
        assert_eq!(store.func_level(), 0);
        store.enter_function_scope();
        store.enter_scope();
        assert_eq!(store.func_level(), 1);
        store.enter_function_scope();
        assert_eq!(store.func_level(), 2);
        store.leave_scope();
        store.leave_scope();
        store.leave_scope();
        assert_eq!(store.func_level(), 0);
    }

    #[test]
    fn namespace_nesting_and_fqn() {
        let mut store = SymbolStore::new();
        store.enter_namespace("a");
        store.enter_namespace("b");
        assert_eq!(store.qualify("c"), "a.b.c");
        store.leave_namespace();
        store.leave_namespace();
        assert!(store.namespace_by_fqn("a.b").is_some());
        assert!(store.namespace_by_fqn("a.z").is_none());
    }

    #[test]
    fn namespace_lookup_walks_parents() {
        let mut types = TypeStore::new();
        let n = types.number();
        let mut store = SymbolStore::new();
        let root = store.root();
        store.declare_global(root, "g", var_info("g", n));
        store.enter_namespace("inner");
        match store.lookup("g") {
            Some(Resolution::Variable(_)) => {}
            other => panic!("unexpected resolution {:?}", other),
        }
    }
}
