//! IR module: arena storage for ops, regions, blocks, and values

use crate::op::{Attribute, OpId, OpKind, Operation};
use rustc_hash::FxHashMap;
use std::fmt;
use tsir_ast::Span;
use tsir_types::TypeId;

/// Identifier of a region within a module.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RegionId(pub(crate) u32);

/// Identifier of a block within a module.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BlockId(pub(crate) u32);

/// Identifier of an SSA value within a module.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ValueId(pub(crate) u32);

impl fmt::Display for ValueId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "%{}", self.0)
    }
}

/// Where a value is defined.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueDef {
    OpResult(OpId, u16),
    BlockArg(BlockId, u16),
}

/// A typed SSA value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Value {
    pub id: ValueId,
    pub ty: TypeId,
}

#[derive(Debug, Clone)]
struct ValueData {
    ty: TypeId,
    def: ValueDef,
}

/// A region: an ordered list of blocks owned by one operation (or the
/// module body).
#[derive(Debug, Clone, Default)]
pub struct Region {
    pub blocks: Vec<BlockId>,
}

/// A block: ordered operations plus typed block arguments.
#[derive(Debug, Clone, Default)]
pub struct Block {
    pub args: Vec<ValueId>,
    pub ops: Vec<OpId>,
}

/// The IR module. Owns every operation created during lowering; the
/// compiler core does not.
#[derive(Debug, Clone)]
pub struct IrModule {
    pub name: String,
    ops: Vec<Operation>,
    regions: Vec<Region>,
    blocks: Vec<Block>,
    values: Vec<ValueData>,
    /// The module body region (one entry block).
    body: RegionId,
    /// Symbol table: `sym_name` → defining op.
    symbols: FxHashMap<String, OpId>,
    /// Module-level attributes (codegen selections and the like).
    pub attributes: Vec<(String, Attribute)>,
    pub location: Span,
}

impl IrModule {
    /// Create an empty module with a body region and entry block.
    pub fn new(name: impl Into<String>, location: Span) -> Self {
        let mut module = IrModule {
            name: name.into(),
            ops: Vec::new(),
            regions: Vec::new(),
            blocks: Vec::new(),
            values: Vec::new(),
            body: RegionId(0),
            symbols: FxHashMap::default(),
            attributes: Vec::new(),
            location,
        };
        let body = module.new_region();
        module.new_block(body, &[]);
        module.body = body;
        module
    }

    pub fn body_region(&self) -> RegionId {
        self.body
    }

    pub fn body_block(&self) -> BlockId {
        self.regions[self.body.0 as usize].blocks[0]
    }

    // ── Arena accessors ─────────────────────────────────────────────────

    pub fn op(&self, id: OpId) -> &Operation {
        &self.ops[id.0 as usize]
    }

    pub fn op_mut(&mut self, id: OpId) -> &mut Operation {
        &mut self.ops[id.0 as usize]
    }

    pub fn region(&self, id: RegionId) -> &Region {
        &self.regions[id.0 as usize]
    }

    pub fn block(&self, id: BlockId) -> &Block {
        &self.blocks[id.0 as usize]
    }

    pub fn value_type(&self, id: ValueId) -> TypeId {
        self.values[id.0 as usize].ty
    }

    pub fn value_def(&self, id: ValueId) -> ValueDef {
        self.values[id.0 as usize].def
    }

    /// The typed view of a value.
    pub fn value(&self, id: ValueId) -> Value {
        Value {
            id,
            ty: self.value_type(id),
        }
    }

    pub fn op_count(&self) -> usize {
        self.ops.iter().filter(|op| !op.erased).count()
    }

    // ── Construction ────────────────────────────────────────────────────

    pub fn new_region(&mut self) -> RegionId {
        let id = RegionId(self.regions.len() as u32);
        self.regions.push(Region::default());
        id
    }

    /// Create a block with the given argument types and append it to a
    /// region.
    pub fn new_block(&mut self, region: RegionId, arg_types: &[TypeId]) -> BlockId {
        let id = BlockId(self.blocks.len() as u32);
        self.blocks.push(Block::default());
        let args: Vec<ValueId> = arg_types
            .iter()
            .enumerate()
            .map(|(i, &ty)| self.new_value(ty, ValueDef::BlockArg(id, i as u16)))
            .collect();
        self.blocks[id.0 as usize].args = args;
        self.regions[region.0 as usize].blocks.push(id);
        id
    }

    pub fn block_arg(&self, block: BlockId, index: usize) -> Value {
        let id = self.blocks[block.0 as usize].args[index];
        self.value(id)
    }

    fn new_value(&mut self, ty: TypeId, def: ValueDef) -> ValueId {
        let id = ValueId(self.values.len() as u32);
        self.values.push(ValueData { ty, def });
        id
    }

    /// Retype a value whose final type was deferred (if-op results take
    /// the unified branch type once both branches are lowered).
    pub fn set_value_type(&mut self, id: ValueId, ty: TypeId) {
        self.values[id.0 as usize].ty = ty;
    }

    /// Allocate an operation (not yet inserted into any block). Result
    /// values are created from `result_types`; `num_regions` fresh empty
    /// regions are attached.
    pub fn make_op(
        &mut self,
        kind: OpKind,
        operands: Vec<ValueId>,
        result_types: &[TypeId],
        attributes: Vec<(String, Attribute)>,
        num_regions: usize,
        location: Span,
    ) -> OpId {
        let id = OpId::new(self.ops.len());
        let results: Vec<ValueId> = result_types
            .iter()
            .enumerate()
            .map(|(i, &ty)| self.new_value(ty, ValueDef::OpResult(id, i as u16)))
            .collect();
        let regions: Vec<RegionId> = (0..num_regions).map(|_| self.new_region()).collect();
        self.ops.push(Operation {
            kind,
            operands,
            results,
            attributes,
            regions,
            location,
            erased: false,
        });

        if kind.defines_symbol() {
            if let Some(name) = self.ops[id.0 as usize].sym_name() {
                self.symbols.insert(name.to_string(), id);
            }
        }

        id
    }

    /// Insert an op into a block at `index`.
    pub fn insert_op(&mut self, block: BlockId, index: usize, op: OpId) {
        self.blocks[block.0 as usize].ops.insert(index, op);
    }

    /// Remove an op from a block without erasing it.
    pub fn detach_op(&mut self, block: BlockId, op: OpId) {
        self.blocks[block.0 as usize].ops.retain(|&o| o != op);
    }

    /// Erase an operation and everything nested under it. The op stays in
    /// the arena as a tombstone; dummy passes use this to drop probe
    /// output.
    pub fn erase_op(&mut self, op: OpId) {
        let regions = self.ops[op.0 as usize].regions.clone();
        for region in regions {
            let blocks = self.regions[region.0 as usize].blocks.clone();
            for block in blocks {
                let ops = std::mem::take(&mut self.blocks[block.0 as usize].ops);
                for nested in ops {
                    self.erase_op(nested);
                }
            }
            self.regions[region.0 as usize].blocks.clear();
        }
        if let Some(name) = self.ops[op.0 as usize].sym_name().map(str::to_string) {
            if self.symbols.get(&name) == Some(&op) {
                self.symbols.remove(&name);
            }
        }
        self.ops[op.0 as usize].erased = true;
    }

    // ── Symbol table ────────────────────────────────────────────────────

    pub fn lookup_symbol(&self, name: &str) -> Option<OpId> {
        self.symbols.get(name).copied().filter(|&op| !self.op(op).erased)
    }

    /// Re-register a symbol (re-lowering rebinds method func-ops).
    pub fn rebind_symbol(&mut self, name: &str, op: OpId) {
        self.symbols.insert(name.to_string(), op);
    }

    /// Iterate the live ops of a block.
    pub fn block_ops<'a>(&'a self, block: BlockId) -> impl Iterator<Item = OpId> + 'a {
        self.blocks[block.0 as usize]
            .ops
            .iter()
            .copied()
            .filter(move |&op| !self.op(op).erased)
    }

    /// Find all live ops of a kind anywhere in the module.
    pub fn ops_of_kind(&self, kind: OpKind) -> Vec<OpId> {
        self.ops
            .iter()
            .enumerate()
            .filter(|(_, op)| !op.erased && op.kind == kind)
            .map(|(i, _)| OpId::new(i))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tsir_types::TypeStore;

    #[test]
    fn module_has_body_block() {
        let module = IrModule::new("test", Span::synthetic());
        assert_eq!(module.region(module.body_region()).blocks.len(), 1);
        assert_eq!(module.block(module.body_block()).ops.len(), 0);
    }

    #[test]
    fn make_op_allocates_results_and_regions() {
        let mut types = TypeStore::new();
        let n = types.number();
        let mut module = IrModule::new("test", Span::synthetic());
        let op = module.make_op(
            OpKind::Constant,
            vec![],
            &[n],
            vec![("value".into(), Attribute::Float(1.0))],
            0,
            Span::synthetic(),
        );
        assert_eq!(module.op(op).results.len(), 1);
        let result = module.op(op).result(0);
        assert_eq!(module.value_type(result), n);
        assert_eq!(module.value_def(result), ValueDef::OpResult(op, 0));
    }

    #[test]
    fn erase_op_is_deep_and_unregisters_symbol() {
        let mut types = TypeStore::new();
        let n = types.number();
        let mut module = IrModule::new("test", Span::synthetic());
        let func = module.make_op(
            OpKind::Func,
            vec![],
            &[],
            vec![("sym_name".into(), Attribute::Str("f".into()))],
            1,
            Span::synthetic(),
        );
        let body_region = module.op(func).regions[0];
        let entry = module.new_block(body_region, &[n]);
        let inner = module.make_op(OpKind::ReturnVal, vec![], &[], vec![], 0, Span::synthetic());
        module.insert_op(entry, 0, inner);

        assert_eq!(module.lookup_symbol("f"), Some(func));
        module.erase_op(func);
        assert!(module.op(func).erased);
        assert!(module.op(inner).erased);
        assert_eq!(module.lookup_symbol("f"), None);
    }
}
