//! Student-facing progress view of a validation request.
//!
//! Everything here is derived from a request snapshot and an explicit `now`,
//! so the same inputs always produce the same summary.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::approval::{ApprovalStatus, ApprovalStep, Approver};
use crate::domain::request::{RequestId, StudentId, ValidationRequest};

/// Average number of days one signature takes, used for completion estimates.
pub const AVERAGE_DAYS_PER_STEP: i64 = 2;
/// A pending request older than this many days raises an informational alert.
pub const LONG_PENDING_DAYS: i64 = 10;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackingSummary {
    pub request_id: RequestId,
    pub student_id: StudentId,
    pub status: ApprovalStatus,
    pub progress: u8,
    pub counts: SignatureCounts,
    pub steps: Vec<StepProgress>,
    pub timeline: Vec<TimelineEvent>,
    pub estimated_completion: EstimatedCompletion,
    pub alerts: Vec<TrackingAlert>,
    pub submitted_at: DateTime<Utc>,
    pub last_update: DateTime<Utc>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignatureCounts {
    pub total: usize,
    pub obtained: usize,
    pub pending: usize,
    pub rejected: usize,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepProgress {
    pub order_index: u32,
    pub title: String,
    pub required_role: Option<String>,
    pub status: ApprovalStatus,
    pub validator: Option<Approver>,
    pub decided_at: Option<DateTime<Utc>>,
    pub comment: Option<String>,
    pub is_current: bool,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimelineEventKind {
    Submission,
    Decision,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimelineEvent {
    pub occurred_at: DateTime<Utc>,
    pub kind: TimelineEventKind,
    pub title: String,
    pub actor: Option<String>,
    pub status: ApprovalStatus,
    pub description: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EstimatedCompletion {
    pub remaining_steps: usize,
    pub estimated_at: Option<DateTime<Utc>>,
    pub message: String,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertLevel {
    Info,
    Warning,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackingAlert {
    pub level: AlertLevel,
    pub message: String,
}

pub fn summarize(request: &ValidationRequest, now: DateTime<Utc>) -> TrackingSummary {
    let chain = &request.chain;
    let current_id = chain.active_step().map(|step| step.id);

    TrackingSummary {
        request_id: request.id.clone(),
        student_id: request.student_id.clone(),
        status: chain.overall_status(),
        progress: chain.progress(),
        counts: SignatureCounts {
            total: chain.len(),
            obtained: chain.count(ApprovalStatus::Completed),
            pending: chain.count(ApprovalStatus::Pending),
            rejected: chain.count(ApprovalStatus::Rejected),
        },
        steps: chain
            .steps()
            .iter()
            .map(|step| StepProgress {
                order_index: step.id,
                title: step.title.clone(),
                required_role: step.required_role.clone(),
                status: step.status,
                validator: step.validator.clone(),
                decided_at: step.completed_at,
                comment: step.comment.clone(),
                is_current: Some(step.id) == current_id,
            })
            .collect(),
        timeline: timeline(request),
        estimated_completion: estimate_completion(request, now),
        alerts: alerts(request, now),
        submitted_at: request.submitted_at,
        last_update: request.updated_at,
    }
}

fn timeline(request: &ValidationRequest) -> Vec<TimelineEvent> {
    let mut events = vec![TimelineEvent {
        occurred_at: request.submitted_at,
        kind: TimelineEventKind::Submission,
        title: "Request submitted".to_string(),
        actor: Some(request.student_id.0.clone()),
        status: ApprovalStatus::Completed,
        description: "Diploma validation request submitted".to_string(),
    }];

    events.extend(request.chain.steps().iter().filter_map(decision_event));
    // stable sort keeps step order for decisions sharing a timestamp
    events.sort_by_key(|event| event.occurred_at);
    events
}

fn decision_event(step: &ApprovalStep) -> Option<TimelineEvent> {
    let occurred_at = step.completed_at?;
    let description = match (step.status, step.validator.as_ref(), step.comment.as_deref()) {
        (ApprovalStatus::Completed, _, _) => "Signature approved".to_string(),
        (ApprovalStatus::Rejected, None, _) => {
            "Closed after an earlier rejection".to_string()
        }
        (ApprovalStatus::Rejected, Some(_), Some(comment)) => {
            format!("Signature rejected: {comment}")
        }
        (ApprovalStatus::Rejected, Some(_), None) => "Signature rejected".to_string(),
        (ApprovalStatus::Pending, _, _) => return None,
    };

    Some(TimelineEvent {
        occurred_at,
        kind: TimelineEventKind::Decision,
        title: step.title.clone(),
        actor: step.validator.as_ref().map(|validator| validator.name.clone()),
        status: step.status,
        description,
    })
}

fn estimate_completion(request: &ValidationRequest, now: DateTime<Utc>) -> EstimatedCompletion {
    match request.status() {
        ApprovalStatus::Completed => EstimatedCompletion {
            remaining_steps: 0,
            estimated_at: Some(request.updated_at),
            message: "All signatures have been processed".to_string(),
        },
        ApprovalStatus::Rejected => EstimatedCompletion {
            remaining_steps: 0,
            estimated_at: None,
            message: "The request was rejected; no further signatures are expected".to_string(),
        },
        ApprovalStatus::Pending => {
            let remaining = request.chain.count(ApprovalStatus::Pending);
            let days = i64::try_from(remaining).unwrap_or(i64::MAX / 2) * AVERAGE_DAYS_PER_STEP;
            EstimatedCompletion {
                remaining_steps: remaining,
                estimated_at: now.checked_add_signed(Duration::days(days)),
                message: format!("Estimate based on {AVERAGE_DAYS_PER_STEP} days per signature"),
            }
        }
    }
}

fn alerts(request: &ValidationRequest, now: DateTime<Utc>) -> Vec<TrackingAlert> {
    let mut alerts = Vec::new();
    let status = request.status();

    if status == ApprovalStatus::Rejected {
        alerts.push(TrackingAlert {
            level: AlertLevel::Warning,
            message: "A signature was rejected. Check the reviewer comments for details."
                .to_string(),
        });
    }

    let days_open = (now - request.submitted_at).num_days();
    if status == ApprovalStatus::Pending && days_open > LONG_PENDING_DAYS {
        alerts.push(TrackingAlert {
            level: AlertLevel::Info,
            message: format!("Your request has been in progress for {days_open} days"),
        });
    }

    if status == ApprovalStatus::Completed {
        alerts.push(TrackingAlert {
            level: AlertLevel::Info,
            message: "All signatures have been obtained. Your documents are now available."
                .to_string(),
        });
    }

    alerts
}
