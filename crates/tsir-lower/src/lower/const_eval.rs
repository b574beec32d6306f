//! Compile-time constant folding
//!
//! Used by enum member initializers and, under `allow_const_eval`, by
//! binary expression lowering.

use super::CoreCompiler;
use crate::context::GenContext;
use tsir_ast::ast::{BinaryOperator, Expression, UnaryOperator};
use tsir_ast::Span;
use tsir_ir::Value;
use tsir_types::{LiteralValue, Type};

impl<'a> CoreCompiler<'a> {
    /// Evaluate an expression to an integer constant, when possible.
    pub(crate) fn eval_const_expr(&mut self, expr: &Expression, ctx: &GenContext) -> Option<i128> {
        match expr {
            Expression::NumberLiteral(lit) => {
                if lit.value.fract() == 0.0 {
                    Some(lit.value as i128)
                } else {
                    None
                }
            }
            Expression::Paren(paren) => self.eval_const_expr(&paren.expression, ctx),
            Expression::Unary(unary) => {
                let operand = self.eval_const_expr(&unary.operand, ctx)?;
                match unary.operator {
                    UnaryOperator::Minus => Some(-operand),
                    UnaryOperator::Plus => Some(operand),
                    UnaryOperator::BitNot => Some(!operand),
                    _ => None,
                }
            }
            Expression::Binary(binary) => {
                let left = self.eval_const_expr(&binary.left, ctx)?;
                let right = self.eval_const_expr(&binary.right, ctx)?;
                eval_int_binop(binary.operator, left, right)
            }
            Expression::Identifier(ident) => {
                // Previously folded enum members resolve by name.
                let name = self.interner.resolve(ident.name).to_string();
                for entry in self.enum_by_fqn.values() {
                    if let Some((_, value)) = entry.members.iter().find(|(n, _)| *n == name) {
                        return Some(*value);
                    }
                }
                None
            }
            Expression::Member(member) => {
                // `E.A` where E is an already-lowered enum.
                if let Expression::Identifier(enum_ident) = member.object.as_ref() {
                    let enum_name = self.interner.resolve(enum_ident.name).to_string();
                    let member_name = self.interner.resolve(member.property.name).to_string();
                    let fqn = self.symbols.qualify(&enum_name);
                    let entry = self
                        .enum_by_fqn
                        .get(&fqn)
                        .or_else(|| self.enum_by_fqn.get(&enum_name))?;
                    return entry
                        .members
                        .iter()
                        .find(|(n, _)| *n == member_name)
                        .map(|(_, v)| *v);
                }
                None
            }
            _ => None,
        }
    }

    /// Fold a binary op over two constant operands into a new constant.
    pub(crate) fn try_fold_binary(
        &mut self,
        operator: BinaryOperator,
        left: Value,
        right: Value,
        span: Span,
    ) -> Option<Value> {
        let lhs = self.constant_of(left)?;
        let rhs = self.constant_of(right)?;

        match (&lhs, &rhs) {
            (LiteralValue::Str(a), LiteralValue::Str(b)) => {
                if operator == BinaryOperator::Add {
                    let folded = format!("{}{}", a, b);
                    return Some(self.emit_const_string(&folded, span));
                }
                None
            }
            _ => {
                let a = lhs.as_f64()?;
                let b = rhs.as_f64()?;
                let both_int = matches!(
                    (self.types.get(left.ty), self.types.get(right.ty)),
                    (Type::Int(_), Type::Int(_))
                ) || matches!((&lhs, &rhs), (LiteralValue::Int(_), LiteralValue::Int(_)));

                if both_int {
                    let folded = eval_int_binop(operator, a as i128, b as i128)?;
                    let ty = if folded >= i32::MIN as i128 && folded <= i32::MAX as i128 {
                        self.types.i32()
                    } else {
                        self.types.i64()
                    };
                    return Some(self.emit_const_int(folded as i64, ty, span));
                }

                let folded = match operator {
                    BinaryOperator::Add => a + b,
                    BinaryOperator::Sub => a - b,
                    BinaryOperator::Mul => a * b,
                    BinaryOperator::Div => a / b,
                    BinaryOperator::Rem => a % b,
                    BinaryOperator::Exp => a.powf(b),
                    _ => return None,
                };
                Some(self.emit_const_number(folded, span))
            }
        }
    }
}

fn eval_int_binop(operator: BinaryOperator, left: i128, right: i128) -> Option<i128> {
    let value = match operator {
        BinaryOperator::Add => left.checked_add(right)?,
        BinaryOperator::Sub => left.checked_sub(right)?,
        BinaryOperator::Mul => left.checked_mul(right)?,
        BinaryOperator::Div => left.checked_div(right)?,
        BinaryOperator::Rem => left.checked_rem(right)?,
        BinaryOperator::ShiftLeft => left.checked_shl(u32::try_from(right).ok()?)?,
        BinaryOperator::ShiftRight => left.checked_shr(u32::try_from(right).ok()?)?,
        BinaryOperator::BitAnd => left & right,
        BinaryOperator::BitOr => left | right,
        BinaryOperator::BitXor => left ^ right,
        _ => return None,
    };
    Some(value)
}

#[cfg(test)]
mod tests {
    use super::eval_int_binop;
    use tsir_ast::ast::BinaryOperator;

    #[test]
    fn shift_produces_wide_values() {
        let v = eval_int_binop(BinaryOperator::ShiftLeft, 1, 31).unwrap();
        assert_eq!(v, 1_i128 << 31);
        assert!(v > i32::MAX as i128);
    }

    #[test]
    fn division_by_zero_does_not_fold() {
        assert!(eval_int_binop(BinaryOperator::Div, 1, 0).is_none());
    }
}
