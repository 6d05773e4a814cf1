//! Error types for record store operations.

use std::io;
use thiserror::Error;

/// Result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors that can occur during store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// An insert collided with an existing primary key.
    #[error("duplicate key {key} in table {table}")]
    DuplicateKey {
        /// Table written to.
        table: String,
        /// Rendered primary key value.
        key: String,
    },

    /// A row is missing a column the caller needed.
    #[error("missing column {column}")]
    MissingColumn {
        /// Column name.
        column: String,
    },

    /// A column holds a value of an unexpected type.
    #[error("column {column} is not a {expected}")]
    TypeMismatch {
        /// Column name.
        column: String,
        /// Expected type name.
        expected: &'static str,
    },

    /// An update tried to rewrite a primary key.
    #[error("column {column} of table {table} cannot be updated")]
    ImmutableColumn {
        /// Table written to.
        table: String,
        /// Column name.
        column: String,
    },

    /// Persisted store contents could not be decoded.
    #[error("store corrupted: {0}")]
    Corrupted(String),

    /// The store refused to serve the request.
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

impl StoreError {
    /// Creates a missing column error.
    pub fn missing_column(column: impl Into<String>) -> Self {
        Self::MissingColumn {
            column: column.into(),
        }
    }

    /// Creates a type mismatch error.
    pub fn type_mismatch(column: impl Into<String>, expected: &'static str) -> Self {
        Self::TypeMismatch {
            column: column.into(),
            expected,
        }
    }

    /// Creates an unavailable error.
    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::Unavailable(message.into())
    }
}
