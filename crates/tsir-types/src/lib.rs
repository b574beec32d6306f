//! The tsir type lattice
//!
//! Types are value types with structural identity: [`TypeStore`] interns
//! every [`Type`] and hands out [`TypeId`]s, so equality is an integer
//! comparison. The predicates module answers the structural questions the
//! lowering core asks (castability, base types, undefined-content,
//! constituent walks).

mod error;
pub mod predicates;
mod store;
mod ty;

pub use error::TypeError;
pub use predicates::{
    find_base_type, has_undefines, is_castable, iterate_type, InterfaceLookup,
    InterfaceMemberShape, NoInterfaces,
};
pub use store::TypeStore;
pub use ty::{FieldId, IntWidth, LiteralValue, TupleField, Type, TypeId};
