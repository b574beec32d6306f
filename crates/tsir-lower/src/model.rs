//! Class and interface descriptors
//!
//! These outlive individual passes: the discovery pass populates them,
//! the definitive pass reads them, and re-lowering rebinds method
//! func-op references.

use crate::symbols::{ClassId, InterfaceId};
use tsir_ir::OpId;
use tsir_types::{TupleField, TypeId};

/// One class method.
#[derive(Debug, Clone)]
pub struct MethodInfo {
    pub name: String,
    /// Function type including the leading `this` input for instance
    /// methods.
    pub func_ty: TypeId,
    /// The definitive func op; rebound if re-lowering produced a new one.
    pub func_op: Option<OpId>,
    pub is_static: bool,
    pub is_virtual: bool,
    pub is_abstract: bool,
    /// Slot in the class vtable; inherited overrides reuse the parent's
    /// slot.
    pub virtual_index: Option<u32>,
}

/// A get/set accessor pair.
#[derive(Debug, Clone)]
pub struct AccessorInfo {
    pub name: String,
    /// Fully-qualified getter function symbol.
    pub getter: Option<String>,
    /// Fully-qualified setter function symbol.
    pub setter: Option<String>,
    pub ty: TypeId,
    pub is_static: bool,
    pub is_virtual: bool,
}

/// One `implements` entry of a class.
#[derive(Debug, Clone)]
pub struct ImplementInfo {
    pub iface: InterfaceId,
    /// Slot of the adapter-vtable pointer inside the class vtable.
    pub vtable_slot: Option<u32>,
    pub processed: bool,
}

/// Everything the object model knows about a class.
#[derive(Debug, Clone)]
pub struct ClassInfo {
    pub name: String,
    pub full_name: String,
    /// Ordered base classes.
    pub base_classes: Vec<ClassId>,
    /// Ordered interface implementations.
    pub implements: Vec<ImplementInfo>,
    /// Instance fields in storage order (leading `vtable` field when the
    /// class has any virtual slot).
    pub fields: Vec<TupleField>,
    /// Static fields: (name, type); storage is a global under the class
    /// fqn prefix.
    pub static_fields: Vec<(String, TypeId)>,
    pub methods: Vec<MethodInfo>,
    pub accessors: Vec<AccessorInfo>,
    /// The nominal class type.
    pub ty: TypeId,
    /// The class-storage type.
    pub storage_ty: TypeId,
    pub has_virtual_table: bool,
    pub is_abstract: bool,
    pub has_constructor: bool,
    pub has_static_constructor: bool,
    pub has_initializers: bool,
    pub has_rtti: bool,
    /// Member-level fixpoint bookkeeping.
    pub processed: bool,
}

impl ClassInfo {
    pub fn method(&self, name: &str) -> Option<&MethodInfo> {
        self.methods.iter().find(|m| m.name == name)
    }

    pub fn method_mut(&mut self, name: &str) -> Option<&mut MethodInfo> {
        self.methods.iter_mut().find(|m| m.name == name)
    }

    pub fn accessor(&self, name: &str) -> Option<&AccessorInfo> {
        self.accessors.iter().find(|a| a.name == name)
    }

    pub fn static_field(&self, name: &str) -> Option<TypeId> {
        self.static_fields
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, ty)| *ty)
    }

    /// Number of virtual slots defined so far (own and inherited).
    pub fn virtual_slot_count(&self) -> u32 {
        self.methods
            .iter()
            .filter_map(|m| m.virtual_index)
            .map(|i| i + 1)
            .max()
            .unwrap_or(0)
    }
}

/// One interface member with its adapter-table position.
#[derive(Debug, Clone)]
pub struct InterfaceMemberInfo {
    pub name: String,
    pub ty: TypeId,
    pub is_method: bool,
    /// Optional members: a missing implementation occupies the adapter
    /// slot with the sentinel pointer `-1`.
    pub is_conditional: bool,
    /// Declaration-order index within the declaring interface; the
    /// adapter slot is `interface_pos_index + extension offset`.
    pub interface_pos_index: u32,
}

/// Everything the object model knows about an interface.
#[derive(Debug, Clone)]
pub struct InterfaceInfo {
    pub name: String,
    pub full_name: String,
    pub extends: Vec<InterfaceId>,
    pub members: Vec<InterfaceMemberInfo>,
    /// Next free adapter-vtable slot (members of extended interfaces
    /// come first).
    pub next_vtable_slot: u32,
    pub ty: TypeId,
}

impl InterfaceInfo {
    pub fn member(&self, name: &str) -> Option<&InterfaceMemberInfo> {
        self.members.iter().find(|m| m.name == name)
    }
}

/// Adapter-vtable entry for one interface member.
#[derive(Debug, Clone, PartialEq)]
pub enum AdapterSlot {
    /// Direct function reference to the implementing method symbol.
    Method(String),
    /// Field offset within the implementing storage.
    FieldOffset(u32),
    /// Conditional member with no implementation.
    Missing,
}
