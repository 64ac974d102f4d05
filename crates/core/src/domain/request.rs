use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::approval::{ApprovalChain, ApprovalStatus};

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RequestId(pub String);

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StudentId(pub String);

/// A student's diploma-validation request and its approval chain snapshot.
///
/// `version` starts at 1 and is bumped by the store on every accepted write.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationRequest {
    pub id: RequestId,
    pub student_id: StudentId,
    pub chain: ApprovalChain,
    pub version: u64,
    pub submitted_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ValidationRequest {
    pub fn submit(
        id: RequestId,
        student_id: StudentId,
        chain: ApprovalChain,
        submitted_at: DateTime<Utc>,
    ) -> Self {
        Self { id, student_id, chain, version: 1, submitted_at, updated_at: submitted_at }
    }

    pub fn status(&self) -> ApprovalStatus {
        self.chain.overall_status()
    }

    /// Next snapshot carrying `chain`; the version is left for the store to bump.
    pub fn with_chain(&self, chain: ApprovalChain, updated_at: DateTime<Utc>) -> Self {
        Self { chain, updated_at, ..self.clone() }
    }
}
