//! Safe-cast narrowing
//!
//! `if (typeof x === "string")`, `if (x instanceof C)`, and
//! `if (x.k === literal)` over a discriminated union each generate a
//! synthetic const declaration of the tested name with the narrowed
//! type. The declaration is injected ahead of the branch body, so the
//! branch sees a redefined name; outside the branch the original
//! binding (and its union type) is untouched. Guards over unions also
//! narrow the else-branch to the complementary arms.

use super::CoreCompiler;
use crate::context::GenContext;
use crate::error::LowerResult;
use crate::symbols::Resolution;
use tsir_ast::ast::{BinaryExpression, BinaryOperator, Expression, Statement, UnaryOperator};
use tsir_ast::{build, Symbol};
use tsir_types::{LiteralValue, Type, TypeId};

/// The narrowed types a guard yields for each branch.
pub(crate) struct Narrowing {
    pub name: Symbol,
    pub then_ty: TypeId,
    pub else_ty: Option<TypeId>,
}

impl<'a> CoreCompiler<'a> {
    /// Narrowing opportunity in an if-condition. Returns the synthetic
    /// redeclarations to inject into the then- and else-branches.
    pub(crate) fn narrowing_for_condition(
        &mut self,
        condition: &Expression,
        then_ctx: &GenContext,
        else_ctx: &GenContext,
    ) -> LowerResult<(Option<Statement>, Option<Statement>)> {
        let Some(narrowing) = self.detect_guard(condition)? else {
            return Ok((None, None));
        };
        let then_stmt =
            self.synthesize_redeclaration(narrowing.name, narrowing.then_ty, then_ctx);
        let else_stmt = narrowing
            .else_ty
            .map(|ty| self.synthesize_redeclaration(narrowing.name, ty, else_ctx));
        Ok((Some(then_stmt), else_stmt))
    }

    /// Narrowing for a switch case: `switch (x.k) { case "a": … }`.
    pub(crate) fn narrowing_for_case(
        &mut self,
        discriminant: &Expression,
        test: &Expression,
        branch_ctx: &GenContext,
    ) -> LowerResult<Option<Statement>> {
        let Some(literal) = literal_of(test, self.interner) else {
            return Ok(None);
        };
        let Some(narrowing) = self.narrow_by_discriminant(discriminant, &literal)? else {
            return Ok(None);
        };
        Ok(Some(self.synthesize_redeclaration(
            narrowing.name,
            narrowing.then_ty,
            branch_ctx,
        )))
    }

    /// Recognize the three guard shapes.
    fn detect_guard(&mut self, condition: &Expression) -> LowerResult<Option<Narrowing>> {
        match condition {
            Expression::Paren(paren) => self.detect_guard(&paren.expression),

            // x instanceof C
            Expression::Binary(BinaryExpression {
                operator: BinaryOperator::Instanceof,
                left,
                right,
                ..
            }) => {
                let Expression::Identifier(var) = left.as_ref() else {
                    return Ok(None);
                };
                let Expression::Identifier(class_ident) = right.as_ref() else {
                    return Ok(None);
                };
                let class_name = self.interner.resolve(class_ident.name).to_string();
                let Some(Resolution::Class(class_id)) = self.symbols.lookup(&class_name) else {
                    return Ok(None);
                };
                Ok(Some(Narrowing {
                    name: var.name,
                    then_ty: self.class(class_id).ty,
                    else_ty: None,
                }))
            }

            Expression::Binary(BinaryExpression {
                operator: BinaryOperator::StrictEq | BinaryOperator::Eq,
                left,
                right,
                ..
            }) => {
                // typeof x === "tag"
                if let Expression::Unary(unary) = left.as_ref() {
                    if unary.operator == UnaryOperator::TypeOf {
                        let Expression::Identifier(var) = unary.operand.as_ref() else {
                            return Ok(None);
                        };
                        let Expression::StringLiteral(tag) = right.as_ref() else {
                            return Ok(None);
                        };
                        let tag = self.interner.resolve(tag.value).to_string();
                        let Some(current) = self.current_type_of(var.name) else {
                            return Ok(None);
                        };
                        return Ok(self.narrow_by_typeof(var.name, current, &tag));
                    }
                }

                // x.k === literal
                let Some(literal) = literal_of(right, self.interner) else {
                    return Ok(None);
                };
                self.narrow_by_discriminant(left, &literal)
            }

            _ => Ok(None),
        }
    }

    /// `x.k === literal` over a union of tuples discriminated by `k`:
    /// the then-branch keeps the matching arms, the else-branch the
    /// rest.
    fn narrow_by_discriminant(
        &mut self,
        member: &Expression,
        literal: &LiteralValue,
    ) -> LowerResult<Option<Narrowing>> {
        let Expression::Member(member) = member else {
            return Ok(None);
        };
        let Expression::Identifier(var) = member.object.as_ref() else {
            return Ok(None);
        };
        let key = self.interner.resolve(member.property.name).to_string();
        let Some(current) = self.current_type_of(var.name) else {
            return Ok(None);
        };
        let Type::Union(arms) = self.types.get(current).clone() else {
            return Ok(None);
        };

        let mut matching = Vec::new();
        let mut rest = Vec::new();
        for arm in arms {
            let storage = match self.types.get(arm) {
                Type::Object(storage) => *storage,
                _ => arm,
            };
            let field = self
                .types
                .tuple_field(storage, &tsir_types::FieldId::Name(key.clone()));
            let matches = matches!(
                field.map(|(_, field_ty)| self.types.get(field_ty).clone()),
                Some(Type::Literal { ref value, .. }) if value == literal
            );
            if matches {
                matching.push(arm);
            } else {
                rest.push(arm);
            }
        }

        if matching.is_empty() {
            return Ok(None);
        }
        let then_ty = self.types.union(matching);
        let else_ty = if rest.is_empty() {
            None
        } else {
            Some(self.types.union(rest))
        };
        Ok(Some(Narrowing {
            name: var.name,
            then_ty,
            else_ty,
        }))
    }

    /// Split a union's arms by a `typeof` tag.
    fn narrow_by_typeof(&mut self, name: Symbol, current: TypeId, tag: &str) -> Option<Narrowing> {
        let arms = match self.types.get(current).clone() {
            Type::Union(arms) => arms,
            Type::Optional(inner) => {
                let undefined = self.types.undefined();
                vec![inner, undefined]
            }
            _ => return None,
        };
        let (matching, rest): (Vec<TypeId>, Vec<TypeId>) = arms
            .into_iter()
            .partition(|arm| self.static_type_tag(*arm).as_deref() == Some(tag));
        if matching.is_empty() {
            return None;
        }
        let then_ty = self.types.union(matching);
        let else_ty = if rest.is_empty() {
            None
        } else {
            Some(self.types.union(rest))
        };
        Some(Narrowing {
            name,
            then_ty,
            else_ty,
        })
    }

    /// The tested variable's current type (scope binding wins).
    fn current_type_of(&self, name: Symbol) -> Option<TypeId> {
        let name = self.interner.resolve(name).to_string();
        match self.symbols.lookup(&name) {
            Some(Resolution::Variable(var)) => Some(self.symbols.var(var).ty),
            _ => None,
        }
    }

    /// `const x: __narrowN = x as __narrowN;` with the alias bound to
    /// the narrowed type in the branch context.
    fn synthesize_redeclaration(
        &mut self,
        name: Symbol,
        narrowed: TypeId,
        branch_ctx: &GenContext,
    ) -> Statement {
        let alias = self.fresh_name("__narrow");
        let alias_sym = self.interner.intern(&alias);
        branch_ctx
            .type_alias_map
            .borrow_mut()
            .insert(alias, narrowed);

        let annotation = build::type_ref(vec![alias_sym]);
        let cast = Expression::AsCast(tsir_ast::ast::AsCastExpression {
            expression: Box::new(build::ident_expr(name)),
            target: build::type_ref(vec![alias_sym]),
            span: tsir_ast::Span::synthetic(),
        });
        build::const_decl(name, Some(annotation), cast)
    }
}

fn literal_of(expr: &Expression, interner: &tsir_ast::Interner) -> Option<LiteralValue> {
    match expr {
        Expression::StringLiteral(lit) => {
            Some(LiteralValue::Str(interner.resolve(lit.value).to_string()))
        }
        Expression::NumberLiteral(lit) => {
            if lit.is_integral() {
                Some(LiteralValue::Int(lit.value as i64))
            } else {
                Some(LiteralValue::number(lit.value))
            }
        }
        Expression::BooleanLiteral(lit) => Some(LiteralValue::Bool(lit.value)),
        _ => None,
    }
}
