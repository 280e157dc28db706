//! MedHome REST API
//!
//! Auth, the course catalogue and the enrollment review workflow. The binary
//! in `main.rs` wires these together; tests drive [`routes::create_router`]
//! directly.

pub mod error;
pub mod jwt;
pub mod middleware;
pub mod rate_limiter;
pub mod receipts;
pub mod repositories;
pub mod routes;
pub mod session;
pub mod state;
