use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::errors::DomainError;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApprovalStatus {
    Pending,
    Completed,
    Rejected,
}

impl ApprovalStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Completed => "completed",
            Self::Rejected => "rejected",
        }
    }
}

impl std::str::FromStr for ApprovalStatus {
    type Err = DomainError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "pending" => Ok(Self::Pending),
            "completed" => Ok(Self::Completed),
            "rejected" => Ok(Self::Rejected),
            other => Err(DomainError::InvalidArgument(format!(
                "unknown approval status `{other}` (expected pending|completed|rejected)"
            ))),
        }
    }
}

/// Identity of the person acting on a step, as supplied by the session layer.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Approver {
    pub name: String,
    pub role: String,
}

impl Approver {
    pub fn new(name: impl Into<String>, role: impl Into<String>) -> Self {
        Self { name: name.into(), role: role.into() }
    }

    /// Fails with `InvalidArgument` when the name or the role is blank.
    pub fn ensure_present(&self) -> Result<(), DomainError> {
        if self.name.trim().is_empty() {
            return Err(DomainError::InvalidArgument("approver name is required".to_string()));
        }
        if self.role.trim().is_empty() {
            return Err(DomainError::InvalidArgument("approver role is required".to_string()));
        }
        Ok(())
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApprovalStep {
    pub id: u32,
    pub title: String,
    pub required_role: Option<String>,
    pub status: ApprovalStatus,
    pub validator: Option<Approver>,
    pub completed_at: Option<DateTime<Utc>>,
    pub comment: Option<String>,
}

impl ApprovalStep {
    pub fn pending(id: u32, title: impl Into<String>, required_role: Option<String>) -> Self {
        Self {
            id,
            title: title.into(),
            required_role,
            status: ApprovalStatus::Pending,
            validator: None,
            completed_at: None,
            comment: None,
        }
    }

    pub fn is_pending(&self) -> bool {
        self.status == ApprovalStatus::Pending
    }
}

/// Ordered sign-off steps for one diploma request.
///
/// The step list is fixed at creation. Aggregate status and progress are
/// derived on every read from the steps themselves.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "Vec<ApprovalStep>", into = "Vec<ApprovalStep>")]
pub struct ApprovalChain {
    steps: Vec<ApprovalStep>,
}

impl ApprovalChain {
    /// Builds an all-pending chain from `(title, required_role)` pairs, numbering steps from 1.
    pub fn pending<I, T>(steps: I) -> Result<Self, DomainError>
    where
        I: IntoIterator<Item = (T, Option<String>)>,
        T: Into<String>,
    {
        let steps = steps
            .into_iter()
            .zip(1u32..)
            .map(|((title, required_role), id)| ApprovalStep::pending(id, title, required_role))
            .collect::<Vec<_>>();
        if steps.is_empty() {
            return Err(DomainError::InvalidArgument(
                "an approval chain needs at least one step".to_string(),
            ));
        }
        Self::from_steps(steps)
    }

    /// Rebuilds a chain from stored steps, re-checking every ordering invariant.
    pub fn from_steps(steps: Vec<ApprovalStep>) -> Result<Self, DomainError> {
        validate_steps(&steps)?;
        Ok(Self { steps })
    }

    pub fn steps(&self) -> &[ApprovalStep] {
        &self.steps
    }

    pub fn step(&self, id: u32) -> Option<&ApprovalStep> {
        self.steps.iter().find(|step| step.id == id)
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn active_step(&self) -> Option<&ApprovalStep> {
        if self.has_rejection() {
            return None;
        }
        self.steps.iter().find(|step| step.is_pending())
    }

    pub fn overall_status(&self) -> ApprovalStatus {
        if self.has_rejection() {
            ApprovalStatus::Rejected
        } else if self.steps.iter().all(|step| step.status == ApprovalStatus::Completed) {
            ApprovalStatus::Completed
        } else {
            ApprovalStatus::Pending
        }
    }

    pub fn progress(&self) -> u8 {
        if self.steps.is_empty() {
            return 0;
        }
        let completed = self.count(ApprovalStatus::Completed);
        // completed <= total, so the quotient never exceeds 100
        u8::try_from(completed * 100 / self.steps.len()).unwrap_or(100)
    }

    pub fn is_frozen(&self) -> bool {
        self.overall_status() != ApprovalStatus::Pending
    }

    pub fn count(&self, status: ApprovalStatus) -> usize {
        self.steps.iter().filter(|step| step.status == status).count()
    }

    fn has_rejection(&self) -> bool {
        self.steps.iter().any(|step| step.status == ApprovalStatus::Rejected)
    }

    pub(crate) fn into_steps(self) -> Vec<ApprovalStep> {
        self.steps
    }
}

impl TryFrom<Vec<ApprovalStep>> for ApprovalChain {
    type Error = DomainError;

    fn try_from(steps: Vec<ApprovalStep>) -> Result<Self, Self::Error> {
        Self::from_steps(steps)
    }
}

impl From<ApprovalChain> for Vec<ApprovalStep> {
    fn from(chain: ApprovalChain) -> Self {
        chain.into_steps()
    }
}

fn validate_steps(steps: &[ApprovalStep]) -> Result<(), DomainError> {
    if steps.is_empty() {
        return Err(DomainError::InvariantViolation("approval chain has no steps".to_string()));
    }

    let mut seen_unfinished = false;
    let mut seen_pending = false;
    for (expected_id, step) in (1u32..).zip(steps) {
        if step.id != expected_id {
            return Err(DomainError::InvariantViolation(format!(
                "step ids must be sequential from 1: expected {expected_id}, found {}",
                step.id
            )));
        }

        match step.status {
            ApprovalStatus::Completed if seen_unfinished => {
                return Err(DomainError::InvariantViolation(format!(
                    "step {} is completed after an undecided or rejected step",
                    step.id
                )));
            }
            ApprovalStatus::Rejected if seen_pending => {
                return Err(DomainError::InvariantViolation(format!(
                    "step {} is rejected after a pending step",
                    step.id
                )));
            }
            ApprovalStatus::Pending => {
                seen_unfinished = true;
                seen_pending = true;
            }
            ApprovalStatus::Rejected => seen_unfinished = true,
            ApprovalStatus::Completed => {}
        }

        if step.is_pending() && step.validator.is_some() {
            return Err(DomainError::InvariantViolation(format!(
                "pending step {} carries a validator",
                step.id
            )));
        }
        if step.is_pending() == step.completed_at.is_some() {
            return Err(DomainError::InvariantViolation(format!(
                "step {} completion time disagrees with status {}",
                step.id,
                step.status.as_str()
            )));
        }
    }

    Ok(())
}
