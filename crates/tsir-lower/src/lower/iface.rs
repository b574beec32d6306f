//! Interface model and adapter vtables
//!
//! Interface members keep their declared order; a member's adapter slot
//! is its `interface_pos_index` plus the offset contributed by extended
//! interfaces. Casting a structural tuple to an interface builds a
//! per-(tuple × interface) adapter keyed by the tuple's type identity.

use super::{attr_str, CoreCompiler};
use crate::context::GenContext;
use crate::error::{LowerError, LowerResult};
use crate::model::{AdapterSlot, InterfaceInfo, InterfaceMemberInfo};
use crate::symbols::InterfaceId;
use tsir_ast::ast::InterfaceDecl;
use tsir_ast::Span;
use tsir_ir::{Attribute, OpKind};
use tsir_types::{Type, TypeId};

impl<'a> CoreCompiler<'a> {
    /// Register (or refresh) an interface from its declaration.
    pub(crate) fn register_interface(
        &mut self,
        decl: &InterfaceDecl,
        ctx: &GenContext,
    ) -> LowerResult<()> {
        let name = self.interner.resolve(decl.name.name).to_string();
        let full_name = self.symbols.qualify(&name);

        // Extended interfaces must resolve first; a forward reference
        // re-enters the outer fixpoint.
        let mut extends = Vec::with_capacity(decl.extends.len());
        for heritage in &decl.extends {
            let ty = self.resolve_type(heritage, ctx)?;
            match self.types.get(ty) {
                Type::Interface { name } => {
                    let Some(&id) = self.iface_by_fqn.get(name) else {
                        return Err(LowerError::unresolved(name.clone(), decl.span));
                    };
                    extends.push(id);
                }
                _ => {
                    let shown = self.types.display(ty);
                    return self.structural_error(
                        decl.span,
                        format!("'{}' cannot extend non-interface '{}'", name, shown),
                    );
                }
            }
        }

        let mut members = Vec::with_capacity(decl.members.len());
        for (index, member) in decl.members.iter().enumerate() {
            let member_name = self.interner.resolve(member.name).to_string();
            let mut ty = self.resolve_type(&member.ty, ctx)?;
            if member.is_method {
                // Method prototypes take an opaque `this` first input;
                // the slot is re-typed per implementation.
                if let Some((inputs, results)) = self.types.get(ty).as_signature() {
                    let (inputs, results) = (inputs.to_vec(), results.to_vec());
                    let opaque = self.types.opaque();
                    let mut with_this = vec![opaque];
                    with_this.extend(inputs);
                    ty = self.types.function(with_this, results);
                }
            }
            members.push(InterfaceMemberInfo {
                name: member_name,
                ty,
                is_method: member.is_method,
                is_conditional: member.optional,
                interface_pos_index: index as u32,
            });
        }

        let extension_offset: u32 = extends
            .iter()
            .map(|&id| self.interface(id).next_vtable_slot)
            .sum();
        let next_vtable_slot = extension_offset + members.len() as u32;
        let ty = self.types.interface(full_name.clone());

        let info = InterfaceInfo {
            name,
            full_name: full_name.clone(),
            extends,
            members,
            next_vtable_slot,
            ty,
        };

        match self.iface_by_fqn.get(&full_name).copied() {
            Some(existing) => {
                *self.interface_mut(existing) = info;
            }
            None => {
                let id = InterfaceId(self.interfaces.len() as u32);
                self.interfaces.push(info);
                self.iface_by_fqn.insert(full_name, id);
                let short = self.interner.resolve(decl.name.name).to_string();
                let current = self.symbols.current_namespace();
                self.symbols
                    .namespace_mut(current)
                    .interfaces
                    .insert(short, id);
            }
        }
        Ok(())
    }

    /// All members of an interface in adapter-slot order: extended
    /// interfaces contribute first, own members follow at
    /// `extension_offset + interface_pos_index`.
    pub(crate) fn collect_interface_members(&self, info: &InterfaceInfo) -> Vec<InterfaceMemberInfo> {
        let mut collected = Vec::new();
        for &parent in &info.extends {
            collected.extend(self.collect_interface_members(self.interface(parent)));
        }
        collected.extend(info.members.iter().cloned());
        collected
    }

    /// Build (once) the adapter vtable for a structural tuple cast to an
    /// interface: one slot per member at its exact index, field offsets
    /// for fields and function-valued fields, `-1` for missing
    /// conditional members.
    pub(crate) fn ensure_tuple_adapter(
        &mut self,
        tuple_ty: TypeId,
        iface_fqn: &str,
        span: Span,
    ) -> LowerResult<()> {
        let key = (tuple_ty, iface_fqn.to_string());
        if self.tuple_adapters.contains_key(&key) {
            return Ok(());
        }
        let Some(&iface_id) = self.iface_by_fqn.get(iface_fqn) else {
            return Err(LowerError::unresolved(iface_fqn.to_string(), span));
        };
        let info = self.interface(iface_id).clone();
        let members = self.collect_interface_members(&info);

        let fields: Vec<tsir_types::TupleField> = self
            .types
            .get(tuple_ty)
            .as_tuple_fields()
            .map(|f| f.to_vec())
            .unwrap_or_default();

        let mut slots = Vec::with_capacity(members.len());
        for member in &members {
            let position = fields
                .iter()
                .position(|f| f.id.as_name() == Some(member.name.as_str()));
            match position {
                Some(index) => slots.push(AdapterSlot::FieldOffset(index as u32)),
                None if member.is_conditional => slots.push(AdapterSlot::Missing),
                None => {
                    return self.structural_error(
                        span,
                        format!(
                            "member '{}' of interface '{}' has no matching field",
                            member.name, info.name
                        ),
                    );
                }
            }
        }

        self.emit_adapter_global(
            &format!("__adapter.t{}.{}", tuple_ty.as_u32(), iface_fqn),
            &slots,
            span,
        );
        self.tuple_adapters.insert(key, slots);
        Ok(())
    }

    /// Emit the adapter table as a module-level global whose entries are
    /// symbol references, field offsets, or the `-1` sentinel.
    pub(crate) fn emit_adapter_global(&mut self, symbol: &str, slots: &[AdapterSlot], span: Span) {
        let entries: Vec<Attribute> = slots
            .iter()
            .map(|slot| match slot {
                AdapterSlot::Method(sym) => Attribute::Str(sym.clone()),
                AdapterSlot::FieldOffset(offset) => Attribute::Int(*offset as i64),
                AdapterSlot::Missing => Attribute::Int(-1),
            })
            .collect();

        let saved = self.builder.insertion_point();
        let body = self.builder.module().body_block();
        self.builder.set_insertion_point_to_end(body);
        self.builder.create_op(
            OpKind::Global,
            vec![],
            &[],
            vec![
                attr_str("sym_name", symbol),
                ("entries".to_string(), Attribute::List(entries)),
            ],
            0,
            span,
        );
        self.builder.set_insertion_point(saved);
    }
}
