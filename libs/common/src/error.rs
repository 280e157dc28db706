//! Custom error types for the common library
//!
//! `DatabaseError` covers infrastructure failures; `ValidationError` and
//! `StateError` are the domain error kinds shared by the API service and
//! the client.

use sqlx::Error as SqlxError;
use thiserror::Error;

use crate::models::{EnrollmentAction, EnrollmentStatus};

/// Custom error type for database operations
#[derive(Error, Debug)]
pub enum DatabaseError {
    /// Error occurred during database connection
    #[error("Database connection error: {0}")]
    Connection(#[source] SqlxError),

    /// Configuration error
    #[error("Database configuration error: {0}")]
    Configuration(String),
}

/// Type alias for Result with DatabaseError
pub type DatabaseResult<T> = Result<T, DatabaseError>;

/// Rejected user input: a missing or malformed field, or an unacceptable
/// receipt file.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("{0} is required")]
    MissingField(&'static str),

    #[error("{field}: {message}")]
    InvalidField {
        field: &'static str,
        message: String,
    },

    #[error("Unsupported receipt type: {0} (accepted: JPEG, PNG, PDF)")]
    UnsupportedReceiptType(String),

    #[error("Receipt is {size} bytes, the limit is {limit} bytes")]
    ReceiptTooLarge { size: usize, limit: usize },

    #[error("Receipt file is empty")]
    EmptyReceipt,

    #[error("Receipt content does not look like {0}")]
    ReceiptContentMismatch(&'static str),
}

impl ValidationError {
    pub(crate) fn invalid(field: &'static str, message: impl Into<String>) -> Self {
        ValidationError::InvalidField {
            field,
            message: message.into(),
        }
    }
}

/// An enrollment transition that is not legal from the record's current
/// status.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum StateError {
    #[error("Cannot {action} an enrollment that is {from}")]
    IllegalTransition {
        action: EnrollmentAction,
        from: EnrollmentStatus,
    },
}
