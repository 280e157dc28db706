//! Error types for the client library

use common::{StateError, ValidationError};
use reqwest::StatusCode;
use thiserror::Error;
use tokio_cron_scheduler::JobSchedulerError;

/// Authentication failures the UI reacts to, typically by showing the
/// login screen.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AuthError {
    #[error("Invalid email or password")]
    InvalidCredentials,

    #[error("Not logged in")]
    NotAuthenticated,

    #[error("Session expired, please log in again")]
    SessionExpired,

    #[error("Access denied: {0}")]
    Forbidden(String),
}

/// Client library error type
#[derive(Error, Debug)]
pub enum ClientError {
    #[error(transparent)]
    Auth(#[from] AuthError),

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    State(#[from] StateError),

    #[error("Request failed with status {status}: {message}")]
    Http { status: StatusCode, message: String },

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Invalid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Unexpected response: {0}")]
    UnexpectedResponse(String),

    #[error("Token storage error: {0}")]
    Storage(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("Scheduler error: {0}")]
    Scheduler(#[from] JobSchedulerError),

    #[error("Upload cancelled")]
    Cancelled,
}

impl ClientError {
    /// HTTP status carried by the error, if the server answered at all.
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            ClientError::Http { status, .. } => Some(*status),
            ClientError::NotFound(_) => Some(StatusCode::NOT_FOUND),
            ClientError::Auth(AuthError::Forbidden(_)) => Some(StatusCode::FORBIDDEN),
            ClientError::Network(e) => e.status(),
            _ => None,
        }
    }

    /// The session is gone and the user has to sign in again.
    pub fn requires_login(&self) -> bool {
        matches!(
            self,
            ClientError::Auth(AuthError::SessionExpired | AuthError::NotAuthenticated)
        )
    }
}
