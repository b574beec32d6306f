//! Binding patterns

use super::{Expression, Identifier, PropertyName};
use crate::Span;

/// A binding pattern: plain identifier or array/object destructuring.
#[derive(Debug, Clone, PartialEq)]
pub enum Pattern {
    Identifier(Identifier),
    Array(ArrayPattern),
    Object(ObjectPattern),
}

impl Pattern {
    pub fn span(&self) -> Span {
        match self {
            Pattern::Identifier(id) => id.span,
            Pattern::Array(p) => p.span,
            Pattern::Object(p) => p.span,
        }
    }

    /// The single identifier of a non-destructuring pattern.
    pub fn as_identifier(&self) -> Option<Identifier> {
        match self {
            Pattern::Identifier(id) => Some(*id),
            _ => None,
        }
    }
}

/// Array destructuring: [a, , b]. Holes are `None`.
#[derive(Debug, Clone, PartialEq)]
pub struct ArrayPattern {
    pub elements: Vec<Option<Pattern>>,
    pub span: Span,
}

/// Object destructuring: { a, b: c }
#[derive(Debug, Clone, PartialEq)]
pub struct ObjectPattern {
    pub properties: Vec<ObjectPatternProperty>,
    pub span: Span,
}

/// One element of an object pattern.
#[derive(Debug, Clone, PartialEq)]
pub struct ObjectPatternProperty {
    /// Source property being destructured.
    pub key: PropertyName,
    /// Target binding (shorthand `{ a }` binds the key name itself).
    pub value: Pattern,
    /// Default value: { a = 1 }
    pub default: Option<Expression>,
    pub span: Span,
}
