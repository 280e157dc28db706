//! API service routes

use axum::{
    Json, Router,
    extract::{DefaultBodyLimit, State},
    middleware,
    response::IntoResponse,
    routing::{get, patch, post},
};
use common::validation::MAX_RECEIPT_BYTES;
use serde_json::json;

use crate::{
    middleware::{admin_middleware, auth_middleware},
    state::AppState,
};

mod admin;
mod auth;
mod courses;
mod enrollments;

/// Room for the multipart framing and the other form fields around a
/// receipt of the maximum size.
const UPLOAD_BODY_LIMIT: usize = MAX_RECEIPT_BYTES + 64 * 1024;

/// Create the router for the API service
pub fn create_router(state: AppState) -> Router {
    let admin_routes = Router::new()
        .route("/admin/enrollments", get(admin::list_enrollments))
        .route(
            "/admin/enrollments/:id/approve",
            post(admin::approve_enrollment),
        )
        .route(
            "/admin/enrollments/:id/reject",
            post(admin::reject_enrollment),
        )
        .route(
            "/admin/enrollments/:id/receipt",
            get(admin::download_receipt),
        )
        .route("/admin/users/:id", patch(admin::update_user))
        .route("/admin/courses/:id/state", patch(admin::set_course_state))
        .route_layer(middleware::from_fn(admin_middleware));

    let protected_routes = Router::new()
        .route("/auth/me", get(auth::me).patch(auth::update_me))
        .route("/courses", get(courses::list_courses))
        .route("/courses/:id", get(courses::get_course))
        .route(
            "/enrollments",
            post(enrollments::submit_enrollment).get(enrollments::list_enrollments),
        )
        .route(
            "/enrollments/:id",
            get(enrollments::get_enrollment).delete(enrollments::cancel_enrollment),
        )
        .route(
            "/enrollments/:id/receipt",
            patch(enrollments::resubmit_receipt),
        )
        .merge(admin_routes)
        .layer(DefaultBodyLimit::max(UPLOAD_BODY_LIMIT))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            auth_middleware,
        ));

    Router::new()
        .route("/health", get(health_check))
        .route("/auth/register", post(auth::register))
        .route("/auth/login", post(auth::login))
        .route("/auth/refresh", post(auth::refresh_token))
        .route("/auth/logout", post(auth::logout))
        .merge(protected_routes)
        .with_state(state)
}

/// Health check endpoint
pub async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    let database = common::database::health_check(&state.db_pool)
        .await
        .unwrap_or(false);
    let redis = state.refresh_sessions.health_check().await.unwrap_or(false);

    Json(json!({
        "status": if database && redis { "ok" } else { "degraded" },
        "service": "medhome-api",
        "database": database,
        "redis": redis,
    }))
}
