//! Enrollment state tracking
//!
//! The server owns every enrollment; the tracker keeps the caller's view of
//! them. Student actions (resubmitting a receipt, cancelling) are checked
//! against the tracked status first, so an illegal attempt fails with a
//! [`StateError`](common::StateError) without a round trip and without
//! touching the tracked record. Admin decisions only show up after
//! [`EnrollmentTracker::refetch`] or [`EnrollmentTracker::refetch_all`].

use std::collections::HashMap;
use std::sync::Arc;

use common::models::{Enrollment, EnrollmentAction, EnrollmentStatus};
use reqwest::StatusCode;
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use uuid::Uuid;

use crate::{error::ClientError, http::ApiClient, receipt::ReceiptFile, request::ApiRequest};

/// Client-side view of the signed-in user's enrollments
#[derive(Clone)]
pub struct EnrollmentTracker {
    api: ApiClient,
    enrollments: Arc<RwLock<HashMap<Uuid, Enrollment>>>,
}

impl EnrollmentTracker {
    pub fn new(api: ApiClient) -> Self {
        Self {
            api,
            enrollments: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Request access to a course by uploading a payment receipt. The new
    /// enrollment is `pending`.
    pub async fn submit_enrollment(
        &self,
        course_id: Uuid,
        receipt: ReceiptFile,
    ) -> Result<Enrollment, ClientError> {
        receipt.validate()?;
        info!(
            "Submitting enrollment for course {} with {:?}",
            course_id, receipt
        );

        let request = ApiRequest::post("/enrollments").receipt(
            vec![("course_id".to_string(), course_id.to_string())],
            receipt,
        );
        let enrollment: Enrollment = self.api.send(request).await?;

        if enrollment.status != EnrollmentStatus::Pending {
            warn!(
                "New enrollment {} came back as {}",
                enrollment.id, enrollment.status
            );
        }

        self.track(enrollment.clone()).await;
        Ok(enrollment)
    }

    /// Like [`submit_enrollment`](Self::submit_enrollment), abandoned with
    /// [`ClientError::Cancelled`] as soon as `cancel` fires.
    pub async fn submit_enrollment_cancellable(
        &self,
        course_id: Uuid,
        receipt: ReceiptFile,
        cancel: CancellationToken,
    ) -> Result<Enrollment, ClientError> {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                info!("Receipt upload for course {} cancelled", course_id);
                Err(ClientError::Cancelled)
            }
            result = self.submit_enrollment(course_id, receipt) => result,
        }
    }

    /// Replace the receipt of a rejected enrollment, sending it back to
    /// `pending` with the rejection reason cleared.
    pub async fn resubmit_receipt(
        &self,
        enrollment_id: Uuid,
        receipt: ReceiptFile,
    ) -> Result<Enrollment, ClientError> {
        let current = self.current(enrollment_id).await?;
        current.status.transition(EnrollmentAction::Resubmit)?;
        receipt.validate()?;

        info!("Resubmitting receipt for enrollment {}", enrollment_id);
        let request =
            ApiRequest::patch(format!("/enrollments/{}/receipt", enrollment_id)).receipt(vec![], receipt);
        let updated = self.apply(enrollment_id, request).await?;
        Ok(updated)
    }

    /// Withdraw a pending enrollment.
    pub async fn cancel(&self, enrollment_id: Uuid) -> Result<Enrollment, ClientError> {
        let current = self.current(enrollment_id).await?;
        current.status.transition(EnrollmentAction::Cancel)?;

        info!("Cancelling enrollment {}", enrollment_id);
        let request = ApiRequest::delete(format!("/enrollments/{}", enrollment_id));
        self.apply(enrollment_id, request).await
    }

    /// Reload one enrollment from the server.
    pub async fn refetch(&self, enrollment_id: Uuid) -> Result<Enrollment, ClientError> {
        let enrollment: Enrollment = self
            .api
            .send(ApiRequest::get(format!("/enrollments/{}", enrollment_id)))
            .await?;
        self.track(enrollment.clone()).await;
        Ok(enrollment)
    }

    /// Reload all of the caller's enrollments, replacing the tracked set.
    pub async fn refetch_all(&self) -> Result<Vec<Enrollment>, ClientError> {
        let enrollments: Vec<Enrollment> = self.api.send(ApiRequest::get("/enrollments")).await?;

        let mut tracked = self.enrollments.write().await;
        tracked.clear();
        tracked.extend(enrollments.iter().cloned().map(|e| (e.id, e)));

        Ok(enrollments)
    }

    pub async fn get(&self, enrollment_id: Uuid) -> Option<Enrollment> {
        self.enrollments.read().await.get(&enrollment_id).cloned()
    }

    pub async fn status(&self, enrollment_id: Uuid) -> Option<EnrollmentStatus> {
        self.enrollments
            .read()
            .await
            .get(&enrollment_id)
            .map(|e| e.status)
    }

    /// Tracked enrollments, most recent first
    pub async fn enrollments(&self) -> Vec<Enrollment> {
        let mut all: Vec<Enrollment> = self.enrollments.read().await.values().cloned().collect();
        all.sort_by(|a, b| b.enrollment_date.cmp(&a.enrollment_date));
        all
    }

    /// Forget everything, e.g. after logout.
    pub async fn reset(&self) {
        self.enrollments.write().await.clear();
    }

    async fn current(&self, enrollment_id: Uuid) -> Result<Enrollment, ClientError> {
        match self.get(enrollment_id).await {
            Some(enrollment) => Ok(enrollment),
            None => self.refetch(enrollment_id).await,
        }
    }

    /// Send a transition request and track the result. A conflict means the
    /// tracked copy was stale, so it is reloaded before the error is
    /// returned.
    async fn apply(
        &self,
        enrollment_id: Uuid,
        request: ApiRequest,
    ) -> Result<Enrollment, ClientError> {
        match self.api.send::<Enrollment>(request).await {
            Ok(updated) => {
                self.track(updated.clone()).await;
                Ok(updated)
            }
            Err(e) => {
                if e.status() == Some(StatusCode::CONFLICT) {
                    if let Err(reload) = self.refetch(enrollment_id).await {
                        warn!(
                            "Failed to reload enrollment {} after conflict: {}",
                            enrollment_id, reload
                        );
                    }
                }
                Err(e)
            }
        }
    }

    async fn track(&self, enrollment: Enrollment) {
        self.enrollments
            .write()
            .await
            .insert(enrollment.id, enrollment);
    }
}
