//! End-to-end lowering tests
//!
//! Each module builds a program through `tsir_ast::build`, runs the full
//! two-pass compiler, and asserts on the produced IR.

mod harness;

mod captures;
mod classes;
mod enums;
mod expressions;
mod generators;
mod interfaces;
mod narrowing;
mod statements;
