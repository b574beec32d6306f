//! Type system errors

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TypeError {
    #[error("undefined type: {name}")]
    UndefinedType { name: String },

    #[error("type '{from}' is not castable to '{to}'")]
    NotCastable { from: String, to: String },

    #[error("duplicate field '{id}' in tuple type")]
    DuplicateField { id: String },
}
