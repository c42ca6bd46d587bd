//! Error types.

use thiserror::Error;

/// Errors reported by the reactive core.
///
/// None of these leave the dependency graph in an inconsistent state; the
/// offending operation is simply not carried out.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ReactiveError {
    /// A computed value without a setter was written to.
    #[error("computed value is read-only")]
    ReadOnly,

    /// A named key was used on a list container.
    #[error("invalid key `{key}` for a list")]
    InvalidKey { key: String },

    /// `length` was assigned something other than a non-negative integer.
    #[error("invalid list length: {value}")]
    InvalidLength { value: String },

    /// A computed value was read inside its own getter before it had a value.
    #[error("computed value read from inside its own getter before its first evaluation")]
    CircularRead,

    /// Serializing a value graph that contains a cycle.
    #[error("value contains a reference cycle")]
    CyclicValue,

    /// Malformed input, or a list operation on a map.
    #[error("unsupported value: {0}")]
    Unsupported(String),
}

/// Result alias for fallible reactive operations.
pub type Result<T> = std::result::Result<T, ReactiveError>;
