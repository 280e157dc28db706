//! MedHome client library
//!
//! Everything a front end needs to talk to the MedHome API:
//!
//! - [`SessionManager`] owns the access/refresh token pair, persists it
//!   through a [`TokenStore`], and renews it on demand with at most one
//!   refresh in flight.
//! - [`ApiClient`] attaches the bearer token to every [`ApiRequest`] and
//!   retries a request exactly once after a `401` triggered a refresh.
//! - [`RefreshScheduler`] renews the session proactively on a fixed
//!   interval.
//! - [`EnrollmentTracker`] mirrors the caller's enrollments and enforces the
//!   student-side transitions before they reach the server.

pub mod config;
pub mod enrollment;
pub mod error;
pub mod http;
pub mod receipt;
pub mod request;
pub mod scheduler;
pub mod session;
pub mod store;

pub use config::ClientConfig;
pub use enrollment::EnrollmentTracker;
pub use error::{AuthError, ClientError};
pub use http::ApiClient;
pub use receipt::ReceiptFile;
pub use request::{ApiRequest, MAX_AUTH_RETRIES};
pub use scheduler::RefreshScheduler;
pub use session::{Session, SessionManager, SessionState};
pub use store::{FileTokenStore, MemoryTokenStore, TokenStore};
