//! MedHome domain models

pub mod auth;
pub mod course;
pub mod enrollment;
pub mod user;

// Re-export for convenience
pub use auth::{ErrorBody, RefreshTokenRequest, TokenResponse};
pub use course::{Course, CourseModule, CourseState, Lesson, Notice, SetCourseStateRequest};
pub use enrollment::{
    Enrollment, EnrollmentAction, EnrollmentStatus, RejectEnrollmentRequest,
};
pub use user::{AdminUserUpdate, LoginCredentials, NewUser, Role, UpdateProfile, User};
