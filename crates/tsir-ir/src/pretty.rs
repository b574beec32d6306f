//! Textual rendering of a module for tests and debugging

use crate::module::{BlockId, IrModule, RegionId};
use crate::op::{Attribute, Operation};
use std::fmt::Write;

impl IrModule {
    /// Render the module as indented text, one op per line.
    pub fn pretty(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "module @{} {{", self.name);
        self.pretty_region(self.body_region(), 1, &mut out);
        out.push_str("}\n");
        out
    }

    fn pretty_region(&self, region: RegionId, depth: usize, out: &mut String) {
        for (i, &block) in self.region(region).blocks.iter().enumerate() {
            if i > 0 || !self.block(block).args.is_empty() {
                let args: Vec<String> = self
                    .block(block)
                    .args
                    .iter()
                    .map(|a| format!("{}", a))
                    .collect();
                let _ = writeln!(out, "{}^bb{}({}):", "  ".repeat(depth), i, args.join(", "));
            }
            self.pretty_block(block, depth, out);
        }
    }

    fn pretty_block(&self, block: BlockId, depth: usize, out: &mut String) {
        let ops: Vec<_> = self.block_ops(block).collect();
        for op_id in ops {
            let op = self.op(op_id);
            let indent = "  ".repeat(depth);
            let _ = write!(out, "{}{}", indent, render_op(op));
            if op.regions.is_empty() {
                out.push('\n');
            } else {
                out.push_str(" {\n");
                for (i, &region) in op.regions.iter().enumerate() {
                    if i > 0 {
                        let _ = writeln!(out, "{}}}, {{", indent);
                    }
                    self.pretty_region(region, depth + 1, out);
                }
                let _ = writeln!(out, "{}}}", indent);
            }
        }
    }
}

fn render_op(op: &Operation) -> String {
    let mut s = String::new();
    if !op.results.is_empty() {
        let results: Vec<String> = op.results.iter().map(|r| format!("{}", r)).collect();
        let _ = write!(s, "{} = ", results.join(", "));
    }
    let _ = write!(s, "ts.{}", kind_name(op));
    if !op.operands.is_empty() {
        let operands: Vec<String> = op.operands.iter().map(|o| format!("{}", o)).collect();
        let _ = write!(s, " {}", operands.join(", "));
    }
    if !op.attributes.is_empty() {
        let attrs: Vec<String> = op
            .attributes
            .iter()
            .map(|(name, value)| format!("{} = {}", name, render_attr(value)))
            .collect();
        let _ = write!(s, " {{{}}}", attrs.join(", "));
    }
    s
}

fn kind_name(op: &Operation) -> String {
    format!("{:?}", op.kind).to_lowercase()
}

fn render_attr(attr: &Attribute) -> String {
    match attr {
        Attribute::Int(i) => format!("{}", i),
        Attribute::Float(f) => format!("{}", f),
        Attribute::Str(s) => format!("{:?}", s),
        Attribute::Bool(b) => format!("{}", b),
        Attribute::Type(t) => format!("{}", t),
        Attribute::BinOp(op) => format!("{:?}", op).to_lowercase(),
        Attribute::UnOp(op) => format!("{:?}", op).to_lowercase(),
        Attribute::List(items) => {
            let inner: Vec<String> = items.iter().map(render_attr).collect();
            format!("[{}]", inner.join(", "))
        }
        Attribute::Unit => "unit".into(),
    }
}

#[cfg(test)]
mod tests {
    use crate::builder::IrBuilder;
    use crate::module::IrModule;
    use crate::op::{Attribute, OpKind};
    use tsir_ast::Span;
    use tsir_types::TypeStore;

    #[test]
    fn pretty_prints_constants() {
        let mut types = TypeStore::new();
        let n = types.number();
        let module = IrModule::new("m", Span::synthetic());
        let mut builder = IrBuilder::new(module);
        builder.create_op(
            OpKind::Constant,
            vec![],
            &[n],
            vec![("value".into(), Attribute::Float(3.0))],
            0,
            Span::synthetic(),
        );
        let text = builder.finish().pretty();
        assert!(text.contains("ts.constant"));
        assert!(text.contains("value = 3"));
    }
}
