use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::approvals::Decision;
use crate::domain::approval::{ApprovalStatus, ApprovalStep};
use crate::domain::request::{RequestId, StudentId, ValidationRequest};

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NotificationId(pub String);

/// Message delivered to a student after a reviewer acts on their request.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    pub id: NotificationId,
    pub student_id: StudentId,
    pub request_id: RequestId,
    pub message: String,
    pub created_at: DateTime<Utc>,
    pub read: bool,
}

impl Notification {
    /// Builds the notice for `step`, which must already carry the decision in `request`.
    pub fn for_decision(
        request: &ValidationRequest,
        step: &ApprovalStep,
        decision: Decision,
        created_at: DateTime<Utc>,
    ) -> Self {
        let verb = match decision {
            Decision::Approve => "approved",
            Decision::Reject => "rejected",
        };
        let validator =
            step.validator.as_ref().map(|validator| validator.name.as_str()).unwrap_or("staff");
        let mut message = format!("Step `{}` was {verb} by {validator}", step.title);
        if let Some(comment) = step.comment.as_deref() {
            message.push_str(": ");
            message.push_str(comment);
        }
        if request.status() == ApprovalStatus::Completed {
            message.push_str(". All signatures have been obtained.");
        }

        Self {
            id: NotificationId(format!("NTF-{}", Uuid::new_v4().simple())),
            student_id: request.student_id.clone(),
            request_id: request.id.clone(),
            message,
            created_at,
            read: false,
        }
    }
}
