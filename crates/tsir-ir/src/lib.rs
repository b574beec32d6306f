//! IR container and builder
//!
//! The lowering core emits into this representation: a module owning
//! arenas of operations, regions, blocks, and SSA values. Operations are
//! structured (control flow carries regions, not an explicit CFG), and a
//! builder maintains the insertion point with scoped save/restore.

mod builder;
mod module;
mod op;
mod pretty;
mod verify;

pub use builder::{InsertPoint, IrBuilder};
pub use module::{Block, IrModule, Region, Value, ValueDef};
pub use op::{Attribute, BinOp, OpId, OpKind, Operation, UnOp};
pub use module::{BlockId, RegionId, ValueId};
pub use verify::verify;
