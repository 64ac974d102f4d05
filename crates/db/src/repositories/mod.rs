use async_trait::async_trait;
use thiserror::Error;

use diplomas_core::domain::approval::ApprovalStatus;
use diplomas_core::domain::request::{RequestId, StudentId, ValidationRequest};
use diplomas_core::errors::{ApplicationError, DomainError};
use diplomas_core::notifications::{Notification, NotificationId};

pub mod memory;
pub mod notification;
pub mod request;

pub use memory::{InMemoryNotificationRepository, InMemoryValidationRequestRepository};
pub use notification::SqlNotificationRepository;
pub use request::SqlValidationRequestRepository;

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("decode error: {0}")]
    Decode(String),
    #[error("record `{0}` already exists")]
    AlreadyExists(String),
    #[error("record `{0}` was not found")]
    NotFound(String),
    #[error("request `{request_id}` is at version {actual}, write expected {expected}")]
    VersionConflict { request_id: String, expected: u64, actual: u64 },
}

impl From<RepositoryError> for ApplicationError {
    fn from(error: RepositoryError) -> Self {
        match error {
            RepositoryError::VersionConflict { request_id, expected, .. } => {
                Self::ConcurrencyConflict { request_id, expected_version: expected }
            }
            RepositoryError::NotFound(id) => Self::NotFound(format!("validation request `{id}`")),
            RepositoryError::AlreadyExists(id) => {
                Self::Domain(DomainError::InvalidArgument(format!("`{id}` already exists")))
            }
            error @ (RepositoryError::Database(_) | RepositoryError::Decode(_)) => {
                Self::Persistence(error.to_string())
            }
        }
    }
}

/// Storage for validation requests and their approval chains.
///
/// Implementations must make `save_versioned` a compare-and-set on `version`.
#[async_trait]
pub trait ValidationRequestRepository: Send + Sync {
    async fn find_by_id(
        &self,
        id: &RequestId,
    ) -> Result<Option<ValidationRequest>, RepositoryError>;

    /// Oldest submission first.
    async fn list(
        &self,
        status: Option<ApprovalStatus>,
        limit: u32,
    ) -> Result<Vec<ValidationRequest>, RepositoryError>;

    /// Most recent submission first.
    async fn list_for_student(
        &self,
        student_id: &StudentId,
    ) -> Result<Vec<ValidationRequest>, RepositoryError>;

    async fn insert(&self, request: ValidationRequest) -> Result<(), RepositoryError>;

    /// Stores `request` if the stored version still equals `expected_version`
    /// and returns it at `expected_version + 1`.
    async fn save_versioned(
        &self,
        request: ValidationRequest,
        expected_version: u64,
    ) -> Result<ValidationRequest, RepositoryError>;
}

#[async_trait]
pub trait NotificationRepository: Send + Sync {
    async fn save(&self, notification: Notification) -> Result<(), RepositoryError>;

    /// Newest first.
    async fn list_for_student(
        &self,
        student_id: &StudentId,
        unread_only: bool,
    ) -> Result<Vec<Notification>, RepositoryError>;

    /// Returns `false` when no notification has this id.
    async fn mark_read(&self, id: &NotificationId) -> Result<bool, RepositoryError>;
}
