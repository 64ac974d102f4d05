use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::approval::Approver;
use crate::errors::DomainError;

/// Identity and tracing context handed to every operation that acts on behalf of someone.
///
/// Issued by the identity layer; nothing in this crate stores it globally.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionContext {
    pub approver: Approver,
    pub correlation_id: String,
}

impl SessionContext {
    pub fn new(approver: Approver, correlation_id: impl Into<String>) -> Self {
        Self { approver, correlation_id: correlation_id.into() }
    }

    pub fn with_generated_correlation(approver: Approver) -> Self {
        Self::new(approver, format!("req-{}", Uuid::new_v4().simple()))
    }

    /// Rejects a session whose approver name or role is missing.
    pub fn validate(&self) -> Result<(), DomainError> {
        self.approver.ensure_present()
    }
}
