//! Enrollment model and its status state machine
//!
//! ```text
//! pending --approve--> approved
//! pending --reject---> rejected --resubmit--> pending
//! pending --cancel---> cancelled
//! ```
//!
//! `approved` and `cancelled` are terminal. Every transition is checked
//! against the current status before anything is mutated, so a failed
//! transition leaves the record exactly as it was.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::StateError;

/// Lifecycle status of an enrollment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EnrollmentStatus {
    Pending,
    Approved,
    Rejected,
    Cancelled,
}

impl EnrollmentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            EnrollmentStatus::Pending => "pending",
            EnrollmentStatus::Approved => "approved",
            EnrollmentStatus::Rejected => "rejected",
            EnrollmentStatus::Cancelled => "cancelled",
        }
    }

    /// No transition leaves a terminal status.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            EnrollmentStatus::Approved | EnrollmentStatus::Cancelled
        )
    }

    /// Pending and approved enrollments block a second enrollment in the
    /// same course.
    pub fn is_live(&self) -> bool {
        matches!(self, EnrollmentStatus::Pending | EnrollmentStatus::Approved)
    }

    /// Status reached by applying `action`, or the reason it is illegal.
    pub fn transition(self, action: EnrollmentAction) -> Result<Self, StateError> {
        use EnrollmentAction as A;
        use EnrollmentStatus as S;

        match (self, action) {
            (S::Pending, A::Approve) => Ok(S::Approved),
            (S::Pending, A::Reject) => Ok(S::Rejected),
            (S::Pending, A::Cancel) => Ok(S::Cancelled),
            (S::Rejected, A::Resubmit) => Ok(S::Pending),
            (from, action) => Err(StateError::IllegalTransition { action, from }),
        }
    }
}

impl fmt::Display for EnrollmentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EnrollmentStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(EnrollmentStatus::Pending),
            "approved" => Ok(EnrollmentStatus::Approved),
            "rejected" => Ok(EnrollmentStatus::Rejected),
            "cancelled" => Ok(EnrollmentStatus::Cancelled),
            other => Err(format!("Unknown enrollment status: {}", other)),
        }
    }
}

/// Something that can be done to an enrollment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EnrollmentAction {
    /// Admin accepts the payment receipt
    Approve,
    /// Admin refuses the payment receipt
    Reject,
    /// Student uploads a replacement receipt after a rejection
    Resubmit,
    /// Student withdraws a pending request
    Cancel,
}

impl fmt::Display for EnrollmentAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let verb = match self {
            EnrollmentAction::Approve => "approve",
            EnrollmentAction::Reject => "reject",
            EnrollmentAction::Resubmit => "resubmit a receipt for",
            EnrollmentAction::Cancel => "cancel",
        };
        f.write_str(verb)
    }
}

/// Enrollment entity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Enrollment {
    pub id: Uuid,
    pub user_id: Uuid,
    pub course_id: Uuid,
    pub status: EnrollmentStatus,
    pub enrollment_date: DateTime<Utc>,
    /// Storage key of the current payment receipt
    pub payment_receipt: Option<String>,
    pub rejection_reason: Option<String>,
    pub updated_at: DateTime<Utc>,
}

impl Enrollment {
    /// A freshly submitted enrollment, waiting for an admin decision.
    pub fn new(user_id: Uuid, course_id: Uuid, payment_receipt: String) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            user_id,
            course_id,
            status: EnrollmentStatus::Pending,
            enrollment_date: now,
            payment_receipt: Some(payment_receipt),
            rejection_reason: None,
            updated_at: now,
        }
    }

    pub fn approve(&mut self) -> Result<(), StateError> {
        self.status = self.status.transition(EnrollmentAction::Approve)?;
        self.rejection_reason = None;
        self.updated_at = Utc::now();
        Ok(())
    }

    pub fn reject(&mut self, reason: impl Into<String>) -> Result<(), StateError> {
        self.status = self.status.transition(EnrollmentAction::Reject)?;
        self.rejection_reason = Some(reason.into());
        self.updated_at = Utc::now();
        Ok(())
    }

    /// Attach a replacement receipt to a rejected enrollment, sending it
    /// back for review.
    pub fn resubmit_receipt(&mut self, payment_receipt: String) -> Result<(), StateError> {
        self.status = self.status.transition(EnrollmentAction::Resubmit)?;
        self.payment_receipt = Some(payment_receipt);
        self.rejection_reason = None;
        self.updated_at = Utc::now();
        Ok(())
    }

    pub fn cancel(&mut self) -> Result<(), StateError> {
        self.status = self.status.transition(EnrollmentAction::Cancel)?;
        self.updated_at = Utc::now();
        Ok(())
    }
}

/// Request body for an admin rejection
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RejectEnrollmentRequest {
    pub reason: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pending() -> Enrollment {
        Enrollment::new(Uuid::new_v4(), Uuid::new_v4(), "receipts/a.png".to_string())
    }

    #[test]
    fn test_new_enrollment_is_pending() {
        let enrollment = pending();
        assert_eq!(enrollment.status, EnrollmentStatus::Pending);
        assert_eq!(enrollment.payment_receipt.as_deref(), Some("receipts/a.png"));
        assert!(enrollment.rejection_reason.is_none());
    }

    #[test]
    fn test_rejected_then_resubmitted_clears_reason() {
        let mut enrollment = pending();
        enrollment.reject("blurry receipt").unwrap();
        assert_eq!(enrollment.status, EnrollmentStatus::Rejected);
        assert_eq!(enrollment.rejection_reason.as_deref(), Some("blurry receipt"));

        enrollment
            .resubmit_receipt("receipts/b.png".to_string())
            .unwrap();
        assert_eq!(enrollment.status, EnrollmentStatus::Pending);
        assert!(enrollment.rejection_reason.is_none());
        assert_eq!(enrollment.payment_receipt.as_deref(), Some("receipts/b.png"));
    }

    #[test]
    fn test_resubmit_only_from_rejected() {
        let mut enrollment = pending();
        let before = enrollment.clone();
        let err = enrollment
            .resubmit_receipt("receipts/b.png".to_string())
            .unwrap_err();
        assert_eq!(
            err,
            StateError::IllegalTransition {
                action: EnrollmentAction::Resubmit,
                from: EnrollmentStatus::Pending,
            }
        );
        assert_eq!(enrollment, before);

        enrollment.approve().unwrap();
        let before = enrollment.clone();
        assert!(
            enrollment
                .resubmit_receipt("receipts/b.png".to_string())
                .is_err()
        );
        assert_eq!(enrollment, before);
    }

    #[test]
    fn test_cancel_only_while_pending() {
        let mut enrollment = pending();
        enrollment.cancel().unwrap();
        assert_eq!(enrollment.status, EnrollmentStatus::Cancelled);
        assert!(enrollment.cancel().is_err());

        let mut approved = pending();
        approved.approve().unwrap();
        let err = approved.cancel().unwrap_err();
        assert_eq!(err.to_string(), "Cannot cancel an enrollment that is approved");
        assert_eq!(approved.status, EnrollmentStatus::Approved);

        let mut rejected = pending();
        rejected.reject("wrong amount").unwrap();
        assert!(rejected.cancel().is_err());
    }

    #[test]
    fn test_terminal_statuses_accept_nothing() {
        let actions = [
            EnrollmentAction::Approve,
            EnrollmentAction::Reject,
            EnrollmentAction::Resubmit,
            EnrollmentAction::Cancel,
        ];
        for status in [EnrollmentStatus::Approved, EnrollmentStatus::Cancelled] {
            assert!(status.is_terminal());
            for action in actions {
                assert!(status.transition(action).is_err(), "{status} -> {action}");
            }
        }
    }

    #[test]
    fn test_status_wire_format() {
        assert_eq!(
            serde_json::to_string(&EnrollmentStatus::Rejected).unwrap(),
            "\"rejected\""
        );
        assert_eq!(
            "cancelled".parse::<EnrollmentStatus>().unwrap(),
            EnrollmentStatus::Cancelled
        );
        assert!("done".parse::<EnrollmentStatus>().is_err());
    }
}
