//! AST data model for the tsir compiler core.
//!
//! The parser that produces these nodes is an external collaborator; this
//! crate defines the node shapes, the string interner, a visitor for
//! read-only walks, and a programmatic builder used by embedders and the
//! test harness. Nodes are immutable once constructed — the lowering core
//! never mutates structural content.

pub mod ast;
pub mod build;
mod interner;
mod span;
pub mod visitor;

pub use interner::{Interner, Symbol};
pub use span::Span;
