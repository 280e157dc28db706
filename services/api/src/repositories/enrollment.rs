//! Enrollment persistence
//!
//! Status changes are written with a compare-and-set on the status the
//! caller read, so two concurrent transitions cannot both succeed.

use anyhow::Result;
use common::models::{Enrollment, EnrollmentStatus};
use sqlx::{PgPool, Row, postgres::PgRow};
use tracing::{info, warn};
use uuid::Uuid;

use super::{is_unique_violation, parse_column};

const ENROLLMENT_COLUMNS: &str =
    "id, user_id, course_id, status, enrollment_date, payment_receipt, rejection_reason, updated_at";

/// Result of a guarded write
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOutcome {
    Written,
    /// The row was no longer in the expected status
    Stale,
    /// Another pending or approved enrollment exists for the same course
    Duplicate,
}

#[derive(Clone)]
pub struct EnrollmentRepository {
    pool: PgPool,
}

impl EnrollmentRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn insert(&self, enrollment: &Enrollment) -> Result<WriteOutcome> {
        let result = sqlx::query(
            r#"
            INSERT INTO enrollments (id, user_id, course_id, status, enrollment_date,
                                     payment_receipt, rejection_reason, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(enrollment.id)
        .bind(enrollment.user_id)
        .bind(enrollment.course_id)
        .bind(enrollment.status.as_str())
        .bind(enrollment.enrollment_date)
        .bind(&enrollment.payment_receipt)
        .bind(&enrollment.rejection_reason)
        .bind(enrollment.updated_at)
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => {
                info!(
                    "Created enrollment {} for user {} in course {}",
                    enrollment.id, enrollment.user_id, enrollment.course_id
                );
                Ok(WriteOutcome::Written)
            }
            Err(e) if is_unique_violation(&e) => Ok(WriteOutcome::Duplicate),
            Err(e) => Err(e.into()),
        }
    }

    pub async fn find_by_id(&self, id: Uuid) -> Result<Option<Enrollment>> {
        let row = sqlx::query(&format!(
            "SELECT {ENROLLMENT_COLUMNS} FROM enrollments WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(enrollment_from_row).transpose()
    }

    /// A user's enrollments, newest first
    pub async fn list_for_user(&self, user_id: Uuid) -> Result<Vec<Enrollment>> {
        let rows = sqlx::query(&format!(
            "SELECT {ENROLLMENT_COLUMNS} FROM enrollments WHERE user_id = $1 \
             ORDER BY enrollment_date DESC"
        ))
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(enrollment_from_row).collect()
    }

    /// All enrollments, optionally narrowed to one status, oldest first so
    /// the review queue is worked in order.
    pub async fn list_by_status(&self, status: Option<EnrollmentStatus>) -> Result<Vec<Enrollment>> {
        let rows = sqlx::query(&format!(
            "SELECT {ENROLLMENT_COLUMNS} FROM enrollments \
             WHERE $1::TEXT IS NULL OR status = $1 ORDER BY enrollment_date ASC"
        ))
        .bind(status.map(|s| s.as_str()))
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(enrollment_from_row).collect()
    }

    /// Persist a transition of `enrollment` that was computed from a row in
    /// status `expected`.
    pub async fn update_if_status(
        &self,
        enrollment: &Enrollment,
        expected: EnrollmentStatus,
    ) -> Result<WriteOutcome> {
        let result = sqlx::query(
            r#"
            UPDATE enrollments
            SET status = $2, payment_receipt = $3, rejection_reason = $4, updated_at = $5
            WHERE id = $1 AND status = $6
            "#,
        )
        .bind(enrollment.id)
        .bind(enrollment.status.as_str())
        .bind(&enrollment.payment_receipt)
        .bind(&enrollment.rejection_reason)
        .bind(enrollment.updated_at)
        .bind(expected.as_str())
        .execute(&self.pool)
        .await;

        match result {
            Ok(done) if done.rows_affected() == 1 => {
                info!(
                    "Enrollment {} moved from {} to {}",
                    enrollment.id, expected, enrollment.status
                );
                Ok(WriteOutcome::Written)
            }
            Ok(_) => {
                warn!(
                    "Enrollment {} left {} before the update landed",
                    enrollment.id, expected
                );
                Ok(WriteOutcome::Stale)
            }
            Err(e) if is_unique_violation(&e) => Ok(WriteOutcome::Duplicate),
            Err(e) => Err(e.into()),
        }
    }
}

fn enrollment_from_row(row: &PgRow) -> Result<Enrollment> {
    Ok(Enrollment {
        id: row.try_get("id")?,
        user_id: row.try_get("user_id")?,
        course_id: row.try_get("course_id")?,
        status: parse_column(row, "status")?,
        enrollment_date: row.try_get("enrollment_date")?,
        payment_receipt: row.try_get("payment_receipt")?,
        rejection_reason: row.try_get("rejection_reason")?,
        updated_at: row.try_get("updated_at")?,
    })
}
