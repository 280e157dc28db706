//! Student enrollment requests
//!
//! Every status change goes through the shared state machine on a freshly
//! loaded row and is persisted with a compare-and-set on the status that
//! row had.

use axum::{
    Extension, Json,
    extract::{Multipart, Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use common::{
    models::{Enrollment, EnrollmentAction, EnrollmentStatus},
    validation::{ReceiptKind, validate_receipt},
};
use tracing::{info, warn};
use uuid::Uuid;

use crate::{
    error::{ApiError, ApiResult},
    middleware::AuthUser,
    repositories::WriteOutcome,
    state::AppState,
};

const DUPLICATE_ENROLLMENT: &str =
    "You already have a pending or approved enrollment for this course";

/// Form fields of an enrollment upload
#[derive(Debug, Default)]
pub(super) struct ReceiptUpload {
    pub course_id: Option<Uuid>,
    pub file_name: String,
    pub content_type: Option<String>,
    pub bytes: Vec<u8>,
}

impl ReceiptUpload {
    /// Read `course_id` and `receipt` parts; anything else is ignored.
    pub async fn read(mut multipart: Multipart) -> ApiResult<Self> {
        let mut upload = ReceiptUpload::default();
        let mut has_receipt = false;

        while let Some(field) = multipart
            .next_field()
            .await
            .map_err(|e| ApiError::BadRequest(e.body_text()))?
        {
            let name = field.name().map(str::to_string);
            match name.as_deref() {
                Some("course_id") => {
                    let raw = field
                        .text()
                        .await
                        .map_err(|e| ApiError::BadRequest(e.body_text()))?;
                    let course_id = raw.trim().parse().map_err(|_| {
                        ApiError::BadRequest("course_id must be a UUID".to_string())
                    })?;
                    upload.course_id = Some(course_id);
                }
                Some("receipt") => {
                    upload.file_name = field.file_name().unwrap_or("receipt").to_string();
                    upload.content_type = field.content_type().map(str::to_string);
                    upload.bytes = field
                        .bytes()
                        .await
                        .map_err(|e| ApiError::BadRequest(e.body_text()))?
                        .to_vec();
                    has_receipt = true;
                }
                _ => {}
            }
        }

        if !has_receipt {
            return Err(ApiError::BadRequest("receipt is required".to_string()));
        }
        Ok(upload)
    }

    pub fn validate(&self) -> ApiResult<ReceiptKind> {
        Ok(validate_receipt(
            &self.file_name,
            self.content_type.as_deref(),
            &self.bytes,
        )?)
    }
}

/// Load an enrollment the caller owns. Other users' enrollments look
/// missing.
async fn load_owned(state: &AppState, auth: &AuthUser, id: Uuid) -> ApiResult<Enrollment> {
    state
        .enrollment_repository
        .find_by_id(id)
        .await
        .map_err(ApiError::internal("Failed to load enrollment"))?
        .filter(|enrollment| enrollment.user_id == auth.id)
        .ok_or_else(|| ApiError::NotFound("Enrollment not found".to_string()))
}

/// Write a transition computed from a row that was in status `expected`.
pub(super) async fn persist_transition(
    state: &AppState,
    enrollment: &Enrollment,
    expected: EnrollmentStatus,
) -> ApiResult<()> {
    let outcome = state
        .enrollment_repository
        .update_if_status(enrollment, expected)
        .await
        .map_err(ApiError::internal("Failed to update enrollment"))?;

    match outcome {
        WriteOutcome::Written => Ok(()),
        WriteOutcome::Stale => Err(ApiError::Conflict(
            "Enrollment changed in the meantime, reload and try again".to_string(),
        )),
        WriteOutcome::Duplicate => Err(ApiError::Conflict(DUPLICATE_ENROLLMENT.to_string())),
    }
}

/// Best-effort cleanup of a receipt file that is no longer referenced
async fn discard_receipt(state: &AppState, key: &str) {
    if let Err(e) = state.receipts.remove(key).await {
        warn!("Failed to remove receipt {}: {}", key, e);
    }
}

/// Request access to a course with a payment receipt
pub async fn submit_enrollment(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
    multipart: Multipart,
) -> ApiResult<impl IntoResponse> {
    let upload = ReceiptUpload::read(multipart).await?;
    let course_id = upload
        .course_id
        .ok_or_else(|| ApiError::BadRequest("course_id is required".to_string()))?;
    let kind = upload.validate()?;

    let course = state
        .course_repository
        .find_by_id(course_id)
        .await
        .map_err(ApiError::internal("Failed to load course"))?
        .ok_or_else(|| ApiError::NotFound("Course not found".to_string()))?;
    if !course.accepts_enrollments() {
        return Err(ApiError::Conflict(
            "Course is not open for enrollment".to_string(),
        ));
    }

    let key = state
        .receipts
        .save(auth.id, kind, &upload.bytes)
        .await
        .map_err(ApiError::internal("Failed to store receipt"))?;

    let enrollment = Enrollment::new(auth.id, course_id, key.clone());
    let outcome = state
        .enrollment_repository
        .insert(&enrollment)
        .await
        .map_err(ApiError::internal("Failed to create enrollment"));

    match outcome {
        Ok(WriteOutcome::Written) => {
            info!("User {} requested enrollment in {}", auth.id, course_id);
            Ok((StatusCode::CREATED, Json(enrollment)))
        }
        Ok(_) => {
            discard_receipt(&state, &key).await;
            Err(ApiError::Conflict(DUPLICATE_ENROLLMENT.to_string()))
        }
        Err(e) => {
            discard_receipt(&state, &key).await;
            Err(e)
        }
    }
}

/// The caller's enrollments, newest first
pub async fn list_enrollments(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
) -> ApiResult<Json<Vec<Enrollment>>> {
    let enrollments = state
        .enrollment_repository
        .list_for_user(auth.id)
        .await
        .map_err(ApiError::internal("Failed to list enrollments"))?;

    Ok(Json(enrollments))
}

/// One enrollment, visible to its owner and to admins
pub async fn get_enrollment(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<Enrollment>> {
    let enrollment = state
        .enrollment_repository
        .find_by_id(id)
        .await
        .map_err(ApiError::internal("Failed to load enrollment"))?
        .filter(|enrollment| auth.can_access(enrollment.user_id))
        .ok_or_else(|| ApiError::NotFound("Enrollment not found".to_string()))?;

    Ok(Json(enrollment))
}

/// Replace the receipt of a rejected enrollment
pub async fn resubmit_receipt(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
    Path(id): Path<Uuid>,
    multipart: Multipart,
) -> ApiResult<Json<Enrollment>> {
    let mut enrollment = load_owned(&state, &auth, id).await?;
    let expected = enrollment.status;
    expected.transition(EnrollmentAction::Resubmit)?;

    let upload = ReceiptUpload::read(multipart).await?;
    let kind = upload.validate()?;

    let key = state
        .receipts
        .save(auth.id, kind, &upload.bytes)
        .await
        .map_err(ApiError::internal("Failed to store receipt"))?;
    let previous = enrollment.payment_receipt.clone();
    enrollment.resubmit_receipt(key.clone())?;

    if let Err(e) = persist_transition(&state, &enrollment, expected).await {
        discard_receipt(&state, &key).await;
        return Err(e);
    }
    if let Some(previous) = previous {
        discard_receipt(&state, &previous).await;
    }

    info!("User {} resubmitted receipt for enrollment {}", auth.id, id);
    Ok(Json(enrollment))
}

/// Withdraw a pending enrollment
pub async fn cancel_enrollment(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<Enrollment>> {
    let mut enrollment = load_owned(&state, &auth, id).await?;
    let expected = enrollment.status;
    enrollment.cancel()?;

    persist_transition(&state, &enrollment, expected).await?;

    info!("User {} cancelled enrollment {}", auth.id, id);
    Ok(Json(enrollment))
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::ValidationError;

    fn upload(file_name: &str, content_type: Option<&str>, bytes: &[u8]) -> ReceiptUpload {
        ReceiptUpload {
            course_id: Some(Uuid::new_v4()),
            file_name: file_name.to_string(),
            content_type: content_type.map(str::to_string),
            bytes: bytes.to_vec(),
        }
    }

    #[test]
    fn test_upload_validation() {
        let jpeg = upload("scan.jpg", Some("image/jpeg"), &[0xFF, 0xD8, 0xFF, 0xE0, 0x00]);
        assert_eq!(jpeg.validate().unwrap(), ReceiptKind::Jpeg);

        let text = upload("notes.txt", Some("text/plain"), b"paid");
        assert!(matches!(
            text.validate(),
            Err(ApiError::Validation(ValidationError::UnsupportedReceiptType(_)))
        ));

        let empty = upload("receipt.pdf", Some("application/pdf"), b"");
        assert!(matches!(
            empty.validate(),
            Err(ApiError::Validation(ValidationError::EmptyReceipt))
        ));
    }

    #[test]
    fn test_oversized_receipt_is_unprocessable() {
        let big = upload(
            "receipt.pdf",
            Some("application/pdf"),
            &vec![b'%'; common::validation::MAX_RECEIPT_BYTES + 1],
        );
        let err = big.validate().unwrap_err();

        assert_eq!(err.status(), StatusCode::UNPROCESSABLE_ENTITY);
    }
}
