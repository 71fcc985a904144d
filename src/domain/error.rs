//! Domain-level errors (no external dependencies)

use thiserror::Error;

/// Domain errors represent invalid input at the edges of the model.
///
/// Tree editing and compilation are total and never produce these;
/// they come from name resolution and catalog validation.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DomainError {
    #[error("unknown token type: {0}")]
    UnknownTokenType(String),

    #[error("unknown operator: {0}")]
    UnknownOperator(String),

    #[error("unknown field: {0}")]
    UnknownField(String),

    #[error("invalid catalog entry {model}.{field}: {message}")]
    InvalidCatalogEntry {
        model: String,
        field: String,
        message: String,
    },
}
