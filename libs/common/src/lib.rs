//! Common library for the MedHome platform
//!
//! This crate holds what the API service and the client library share: the
//! domain models (users, courses, enrollments), the enrollment state machine,
//! request/response payloads, input and receipt validation, and the
//! PostgreSQL and Redis connection helpers used by the service.

pub mod cache;
pub mod database;
pub mod error;
pub mod models;
pub mod validation;

pub use error::{StateError, ValidationError};
