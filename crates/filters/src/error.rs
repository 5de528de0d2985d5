use thiserror::Error;

use crate::value::ValueKind;

/// Programmer error: an edit named a field the schema does not declare, or
/// supplied a value of the wrong kind.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InvalidFieldError {
    #[error("unknown filter field `{0}`")]
    UnknownField(String),

    #[error("filter field `{field}` holds {expected} values, got {actual}")]
    KindMismatch {
        field: String,
        expected: ValueKind,
        actual: ValueKind,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SchemaError {
    #[error("filter field `{0}` is declared more than once")]
    DuplicateField(String),

    /// Field names share a JSON object with `bbox` on the wire.
    #[error("filter field name `{0}` is reserved")]
    ReservedName(String),
}
