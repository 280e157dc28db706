//! Admin review of enrollments, users and courses

use axum::{
    Extension, Json,
    extract::{Path, Query, State},
    http::header,
    response::IntoResponse,
};
use common::{
    models::{
        AdminUserUpdate, Course, Enrollment, EnrollmentStatus, RejectEnrollmentRequest, Role,
        SetCourseStateRequest, User,
    },
    validation::{ReceiptKind, validate_rejection_reason},
};
use serde::Deserialize;
use tracing::info;
use uuid::Uuid;

use super::enrollments::persist_transition;
use crate::{
    error::{ApiError, ApiResult},
    middleware::AuthUser,
    state::AppState,
};

#[derive(Debug, Deserialize)]
pub struct EnrollmentFilter {
    pub status: Option<EnrollmentStatus>,
}

async fn load_enrollment(state: &AppState, id: Uuid) -> ApiResult<Enrollment> {
    state
        .enrollment_repository
        .find_by_id(id)
        .await
        .map_err(ApiError::internal("Failed to load enrollment"))?
        .ok_or_else(|| ApiError::NotFound("Enrollment not found".to_string()))
}

/// Review queue, oldest first
pub async fn list_enrollments(
    State(state): State<AppState>,
    Query(filter): Query<EnrollmentFilter>,
) -> ApiResult<Json<Vec<Enrollment>>> {
    let enrollments = state
        .enrollment_repository
        .list_by_status(filter.status)
        .await
        .map_err(ApiError::internal("Failed to list enrollments"))?;

    Ok(Json(enrollments))
}

pub async fn approve_enrollment(
    State(state): State<AppState>,
    Extension(admin): Extension<AuthUser>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<Enrollment>> {
    let mut enrollment = load_enrollment(&state, id).await?;
    let expected = enrollment.status;
    enrollment.approve()?;

    persist_transition(&state, &enrollment, expected).await?;

    info!("Admin {} approved enrollment {}", admin.id, id);
    Ok(Json(enrollment))
}

pub async fn reject_enrollment(
    State(state): State<AppState>,
    Extension(admin): Extension<AuthUser>,
    Path(id): Path<Uuid>,
    Json(payload): Json<RejectEnrollmentRequest>,
) -> ApiResult<Json<Enrollment>> {
    validate_rejection_reason(&payload.reason)?;

    let mut enrollment = load_enrollment(&state, id).await?;
    let expected = enrollment.status;
    enrollment.reject(payload.reason.trim())?;

    persist_transition(&state, &enrollment, expected).await?;

    info!("Admin {} rejected enrollment {}", admin.id, id);
    Ok(Json(enrollment))
}

/// The stored payment receipt of an enrollment
pub async fn download_receipt(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<impl IntoResponse> {
    let enrollment = load_enrollment(&state, id).await?;
    let key = enrollment
        .payment_receipt
        .ok_or_else(|| ApiError::NotFound("Enrollment has no receipt".to_string()))?;

    let bytes = state
        .receipts
        .read(&key)
        .await
        .map_err(ApiError::internal("Failed to read receipt"))?;
    let content_type = ReceiptKind::from_file_name(&key)
        .map(|kind| kind.content_type())
        .unwrap_or("application/octet-stream");

    Ok(([(header::CONTENT_TYPE, content_type)], bytes))
}

/// Change a user's role or account flags
pub async fn update_user(
    State(state): State<AppState>,
    Extension(admin): Extension<AuthUser>,
    Path(id): Path<Uuid>,
    Json(payload): Json<AdminUserUpdate>,
) -> ApiResult<Json<User>> {
    let demotes_self = payload.role.is_some_and(|role| role != Role::Admin)
        || payload.is_blocked == Some(true)
        || payload.is_approved == Some(false);
    if id == admin.id && demotes_self {
        return Err(ApiError::BadRequest(
            "Admins cannot demote, block or unapprove themselves".to_string(),
        ));
    }

    let user = state
        .user_repository
        .admin_update(id, &payload)
        .await
        .map_err(ApiError::internal("Failed to update user"))?
        .ok_or_else(|| ApiError::NotFound("User not found".to_string()))?;

    info!("Admin {} updated user {}", admin.id, id);
    Ok(Json(user))
}

/// Publish, unpublish or retire a course
pub async fn set_course_state(
    State(state): State<AppState>,
    Extension(admin): Extension<AuthUser>,
    Path(id): Path<Uuid>,
    Json(payload): Json<SetCourseStateRequest>,
) -> ApiResult<Json<Course>> {
    let course = state
        .course_repository
        .set_state(id, payload.state)
        .await
        .map_err(ApiError::internal("Failed to update course"))?
        .ok_or_else(|| ApiError::NotFound("Course not found".to_string()))?;

    info!("Admin {} set course {} to {}", admin.id, id, course.state);
    Ok(Json(course))
}
