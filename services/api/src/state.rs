//! Application state shared across handlers

use common::cache::RedisPool;
use sqlx::PgPool;

use crate::{
    jwt::JwtService,
    rate_limiter::RateLimiter,
    receipts::ReceiptStore,
    repositories::{CourseRepository, EnrollmentRepository, UserRepository},
    session::RefreshSessions,
};

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub db_pool: PgPool,
    pub redis_pool: RedisPool,
    pub jwt_service: JwtService,
    pub refresh_sessions: RefreshSessions,
    pub rate_limiter: RateLimiter,
    pub receipts: ReceiptStore,
    pub user_repository: UserRepository,
    pub course_repository: CourseRepository,
    pub enrollment_repository: EnrollmentRepository,
}
