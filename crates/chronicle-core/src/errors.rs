//! Error types for raw ChangeSet parsing.
//!
//! The reducer, resolver and normalizers are total and never return these.
//! [`DeltaError`] only explains why a raw entry was quarantined by
//! [`normalize_raw`](crate::delta::normalize_raw).

/// Reason a raw ChangeSet entry was rejected.
#[derive(Clone, Debug, PartialEq, thiserror::Error)]
pub enum DeltaError {
    /// Neither a parameter name nor a usable `path` was given.
    #[error("variable op has no parameter name")]
    MissingParameter,

    /// The `operation` field is not one of the known operations.
    #[error("unknown operation: {0}")]
    UnknownOperation(String),

    /// The `scope` field is not one of the known scopes.
    #[error("unknown scope: {0}")]
    UnknownScope(String),

    /// A Set/Add op without a value.
    #[error("{operation} op has no value")]
    MissingValue {
        /// Operation name.
        operation: &'static str,
    },

    /// An Add op whose value is not a number.
    #[error("add op value is not numeric")]
    NonNumericValue,

    /// A numeric value that is NaN or infinite.
    #[error("numeric value is not finite: {0}")]
    NonFiniteValue(String),

    /// A value that has no scalar form (array, object).
    #[error("invalid value: {0}")]
    InvalidValue(String),

    /// A Symbolic op without a symbol.
    #[error("symbolic op has no symbol")]
    MissingSymbol,

    /// An entity op or cast entry without a name.
    #[error("entry has no name")]
    MissingName,

    /// The entity op action is not one of the known actions.
    #[error("unknown entity action: {0}")]
    UnknownEntityAction(String),

    /// The entity kind is not one of the known kinds.
    #[error("unknown entity kind: {0}")]
    UnknownEntityKind(String),

    /// The cast tier is not one of the known tiers.
    #[error("unknown cast tier: {0}")]
    UnknownCastTier(String),

    /// The entry does not have the expected shape.
    #[error("malformed entry: {0}")]
    Malformed(String),

    /// An unrecognised top-level section.
    #[error("unknown section: {0}")]
    UnknownSection(String),
}

/// Convenience result type for delta parsing.
pub type Result<T> = std::result::Result<T, DeltaError>;
