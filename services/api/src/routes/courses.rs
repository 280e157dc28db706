//! Course catalogue

use axum::{
    Extension, Json,
    extract::{Path, State},
};
use common::models::{Course, CourseState};
use uuid::Uuid;

use crate::{
    error::{ApiError, ApiResult},
    middleware::AuthUser,
    state::AppState,
};

/// Published courses; admins also see drafts and retired courses.
pub async fn list_courses(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
) -> ApiResult<Json<Vec<Course>>> {
    let courses = state
        .course_repository
        .list(auth.is_admin())
        .await
        .map_err(ApiError::internal("Failed to list courses"))?;

    Ok(Json(courses))
}

/// A course with its ordered modules, lessons and notice board
pub async fn get_course(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<Course>> {
    let course = state
        .course_repository
        .find_by_id(id)
        .await
        .map_err(ApiError::internal("Failed to load course"))?
        .filter(|course| course.state == CourseState::Active || auth.is_admin())
        .ok_or_else(|| ApiError::NotFound("Course not found".to_string()))?;

    Ok(Json(course))
}
