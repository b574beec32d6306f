//! tsir-lower: the semantic lowering core
//!
//! Consumes a parsed TypeScript AST and emits typed IR. The heart is a
//! two-pass whole-program resolver: a discovery pass probes declarations
//! in dummy mode until their mutual dependencies converge, then a single
//! strict pass emits the definitive module.
//!
//! ```no_run
//! use tsir_ast::build::AstBuilder;
//! use tsir_lower::{compile, CompilerOptions};
//!
//! let mut b = AstBuilder::new();
//! let source = b.source_file(vec![]);
//! let mut interner = b.into_interner();
//! let module = compile(&source, &mut interner, CompilerOptions::default()).unwrap();
//! println!("{}", module.pretty());
//! ```

mod context;
mod diag;
mod error;
mod lower;
mod model;
mod options;
mod symbols;

pub use context::{CaptureSet, CapturedVar, GenContext, ReturnTypeAcc, UnresolvedRef};
pub use diag::{Diagnostic, DiagnosticHandler, RelatedInfo, Severity};
pub use error::{LowerError, LowerResult};
pub use lower::{compile, compile_unit, CompileOutput, CoreCompiler};
pub use model::{
    AccessorInfo, AdapterSlot, ClassInfo, ImplementInfo, InterfaceInfo, InterfaceMemberInfo,
    MethodInfo,
};
pub use options::CompilerOptions;
pub use symbols::{ClassId, InterfaceId, NamespaceId, Resolution, SymbolStore, VarStorage};
