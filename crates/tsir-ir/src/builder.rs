//! IR builder with insertion-point discipline
//!
//! Every lowering routine emits through the builder. Nested lowering
//! (function prologues, switch cases, try regions, generator state
//! labels) brackets its work with `with_block`, which restores the
//! insertion point on every exit path.

use crate::module::{Block, BlockId, IrModule, RegionId, Value, ValueId};
use crate::op::{Attribute, OpId, OpKind, Operation};
use tsir_ast::Span;
use tsir_types::TypeId;

/// An insertion point: before `index` within `block`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InsertPoint {
    pub block: BlockId,
    pub index: usize,
}

/// Builder owning the module under construction.
#[derive(Debug)]
pub struct IrBuilder {
    module: IrModule,
    point: InsertPoint,
}

impl IrBuilder {
    /// Create a builder positioned at the end of the module body block.
    pub fn new(module: IrModule) -> Self {
        let block = module.body_block();
        let index = module.block(block).ops.len();
        IrBuilder {
            module,
            point: InsertPoint { block, index },
        }
    }

    pub fn module(&self) -> &IrModule {
        &self.module
    }

    pub fn module_mut(&mut self) -> &mut IrModule {
        &mut self.module
    }

    /// Consume the builder, yielding the finished module.
    pub fn finish(self) -> IrModule {
        self.module
    }

    // ── Insertion point ─────────────────────────────────────────────────

    pub fn insertion_point(&self) -> InsertPoint {
        self.point
    }

    pub fn set_insertion_point(&mut self, point: InsertPoint) {
        self.point = point;
    }

    pub fn set_insertion_point_to_end(&mut self, block: BlockId) {
        self.point = InsertPoint {
            block,
            index: self.module.block(block).ops.len(),
        };
    }

    pub fn set_insertion_point_to_start(&mut self, block: BlockId) {
        self.point = InsertPoint { block, index: 0 };
    }

    /// Run `f` with the insertion point at the end of `block`, restoring
    /// the previous point afterwards on every exit path.
    pub fn with_block<R>(&mut self, block: BlockId, f: impl FnOnce(&mut Self) -> R) -> R {
        let saved = self.point;
        self.set_insertion_point_to_end(block);
        let result = f(self);
        self.point = saved;
        result
    }

    // ── Creation ────────────────────────────────────────────────────────

    /// Create an op at the insertion point and advance past it.
    pub fn create_op(
        &mut self,
        kind: OpKind,
        operands: Vec<ValueId>,
        result_types: &[TypeId],
        attributes: Vec<(String, Attribute)>,
        num_regions: usize,
        location: Span,
    ) -> OpId {
        let op = self
            .module
            .make_op(kind, operands, result_types, attributes, num_regions, location);
        self.module.insert_op(self.point.block, self.point.index, op);
        self.point.index += 1;
        op
    }

    /// Create a block with argument types in `region`.
    pub fn create_block(&mut self, region: RegionId, arg_types: &[TypeId]) -> BlockId {
        self.module.new_block(region, arg_types)
    }

    /// Single-result value of an op.
    pub fn result(&self, op: OpId) -> Value {
        let id = self.module.op(op).result(0);
        self.module.value(id)
    }

    pub fn op(&self, id: OpId) -> &Operation {
        self.module.op(id)
    }

    pub fn op_mut(&mut self, id: OpId) -> &mut Operation {
        self.module.op_mut(id)
    }

    pub fn block(&self, id: BlockId) -> &Block {
        self.module.block(id)
    }

    /// Type of a value.
    pub fn type_of(&self, value: ValueId) -> TypeId {
        self.module.value_type(value)
    }

    /// The current block's owning function body, when the point sits in
    /// one. Used by variable allocation to hoist into the entry block.
    pub fn current_block(&self) -> BlockId {
        self.point.block
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tsir_types::TypeStore;

    #[test]
    fn with_block_restores_point_on_exit() {
        let mut types = TypeStore::new();
        let n = types.number();
        let module = IrModule::new("test", Span::synthetic());
        let mut builder = IrBuilder::new(module);

        let func = builder.create_op(
            OpKind::Func,
            vec![],
            &[],
            vec![("sym_name".into(), Attribute::Str("f".into()))],
            1,
            Span::synthetic(),
        );
        let body = builder.op(func).regions[0];
        let entry = builder.create_block(body, &[]);

        let before = builder.insertion_point();
        builder.with_block(entry, |b| {
            b.create_op(OpKind::Constant, vec![], &[n], vec![], 0, Span::synthetic());
        });
        assert_eq!(builder.insertion_point(), before);
        assert_eq!(builder.block(entry).ops.len(), 1);
    }

    #[test]
    fn create_op_advances_point() {
        let mut types = TypeStore::new();
        let n = types.number();
        let module = IrModule::new("test", Span::synthetic());
        let mut builder = IrBuilder::new(module);
        let first = builder.create_op(OpKind::Constant, vec![], &[n], vec![], 0, Span::synthetic());
        let second = builder.create_op(OpKind::Constant, vec![], &[n], vec![], 0, Span::synthetic());
        let body = builder.module().body_block();
        assert_eq!(builder.block(body).ops, vec![first, second]);
    }
}
