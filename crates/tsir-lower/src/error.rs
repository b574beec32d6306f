//! Lowering failure signals
//!
//! Recoverable failures are values, not exceptions: the discovery
//! fixpoint consumes `Unresolved` outcomes and reschedules. `Reported`
//! means a structural diagnostic was already emitted and the current
//! declaration's lowering should unwind.

use thiserror::Error;
use tsir_ast::Span;

pub type LowerResult<T> = Result<T, LowerError>;

#[derive(Debug, Clone, Error)]
pub enum LowerError {
    /// A name or type could not be resolved yet. The outer fixpoint
    /// retries the declaration; only a stalled fixpoint surfaces this as
    /// a diagnostic.
    #[error("unresolved reference to '{name}'")]
    Unresolved { name: String, span: Span },

    /// A structural error was diagnosed at the offending location; the
    /// surrounding pass continues with other declarations.
    #[error("lowering aborted after a reported error")]
    Reported,
}

impl LowerError {
    pub fn unresolved(name: impl Into<String>, span: Span) -> Self {
        LowerError::Unresolved {
            name: name.into(),
            span,
        }
    }

    pub fn is_unresolved(&self) -> bool {
        matches!(self, LowerError::Unresolved { .. })
    }
}
