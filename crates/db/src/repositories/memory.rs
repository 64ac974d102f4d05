use std::collections::HashMap;

use tokio::sync::RwLock;

use diplomas_core::domain::approval::ApprovalStatus;
use diplomas_core::domain::request::{RequestId, StudentId, ValidationRequest};
use diplomas_core::notifications::{Notification, NotificationId};

use super::{NotificationRepository, RepositoryError, ValidationRequestRepository};

#[derive(Default)]
pub struct InMemoryValidationRequestRepository {
    requests: RwLock<HashMap<String, ValidationRequest>>,
}

#[async_trait::async_trait]
impl ValidationRequestRepository for InMemoryValidationRequestRepository {
    async fn find_by_id(
        &self,
        id: &RequestId,
    ) -> Result<Option<ValidationRequest>, RepositoryError> {
        let requests = self.requests.read().await;
        Ok(requests.get(&id.0).cloned())
    }

    async fn list(
        &self,
        status: Option<ApprovalStatus>,
        limit: u32,
    ) -> Result<Vec<ValidationRequest>, RepositoryError> {
        let requests = self.requests.read().await;
        let mut matching = requests
            .values()
            .filter(|request| status.map_or(true, |status| request.status() == status))
            .cloned()
            .collect::<Vec<_>>();
        matching.sort_by(|a, b| (a.submitted_at, &a.id.0).cmp(&(b.submitted_at, &b.id.0)));
        matching.truncate(usize::try_from(limit).unwrap_or(usize::MAX));
        Ok(matching)
    }

    async fn list_for_student(
        &self,
        student_id: &StudentId,
    ) -> Result<Vec<ValidationRequest>, RepositoryError> {
        let requests = self.requests.read().await;
        let mut history = requests
            .values()
            .filter(|request| &request.student_id == student_id)
            .cloned()
            .collect::<Vec<_>>();
        history.sort_by(|a, b| (b.submitted_at, &b.id.0).cmp(&(a.submitted_at, &a.id.0)));
        Ok(history)
    }

    async fn insert(&self, request: ValidationRequest) -> Result<(), RepositoryError> {
        let mut requests = self.requests.write().await;
        if requests.contains_key(&request.id.0) {
            return Err(RepositoryError::AlreadyExists(request.id.0));
        }
        requests.insert(request.id.0.clone(), request);
        Ok(())
    }

    async fn save_versioned(
        &self,
        request: ValidationRequest,
        expected_version: u64,
    ) -> Result<ValidationRequest, RepositoryError> {
        let mut requests = self.requests.write().await;
        let Some(stored) = requests.get_mut(&request.id.0) else {
            return Err(RepositoryError::NotFound(request.id.0));
        };
        if stored.version != expected_version {
            return Err(RepositoryError::VersionConflict {
                request_id: request.id.0,
                expected: expected_version,
                actual: stored.version,
            });
        }

        let saved = ValidationRequest { version: expected_version.saturating_add(1), ..request };
        *stored = saved.clone();
        Ok(saved)
    }
}

#[derive(Default)]
pub struct InMemoryNotificationRepository {
    notifications: RwLock<HashMap<String, Notification>>,
}

#[async_trait::async_trait]
impl NotificationRepository for InMemoryNotificationRepository {
    async fn save(&self, notification: Notification) -> Result<(), RepositoryError> {
        let mut notifications = self.notifications.write().await;
        notifications.insert(notification.id.0.clone(), notification);
        Ok(())
    }

    async fn list_for_student(
        &self,
        student_id: &StudentId,
        unread_only: bool,
    ) -> Result<Vec<Notification>, RepositoryError> {
        let notifications = self.notifications.read().await;
        let mut listed = notifications
            .values()
            .filter(|notification| &notification.student_id == student_id)
            .filter(|notification| !unread_only || !notification.read)
            .cloned()
            .collect::<Vec<_>>();
        listed.sort_by(|a, b| (b.created_at, &b.id.0).cmp(&(a.created_at, &a.id.0)));
        Ok(listed)
    }

    async fn mark_read(&self, id: &NotificationId) -> Result<bool, RepositoryError> {
        let mut notifications = self.notifications.write().await;
        Ok(notifications.get_mut(&id.0).map(|notification| notification.read = true).is_some())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::{Duration, TimeZone, Utc};

    use diplomas_core::approvals::{ApprovalEngine, Decision, RequiredRoleMatcher};
    use diplomas_core::domain::approval::Approver;
    use diplomas_core::domain::request::{RequestId, StudentId, ValidationRequest};
    use diplomas_core::domain::template::ChainTemplate;

    use crate::repositories::{
        InMemoryValidationRequestRepository, RepositoryError, ValidationRequestRepository,
    };

    fn submitted() -> ValidationRequest {
        ValidationRequest::submit(
            RequestId("VR-1".to_string()),
            StudentId("STU-1".to_string()),
            ChainTemplate::default().instantiate().expect("template"),
            Utc.with_ymd_and_hms(2026, 6, 1, 8, 0, 0).unwrap(),
        )
    }

    fn approved_by(request: &ValidationRequest, name: &str) -> ValidationRequest {
        let at = request.updated_at + Duration::hours(1);
        let chain = ApprovalEngine::<RequiredRoleMatcher>::default()
            .apply(&request.chain, Decision::Approve, &Approver::new(name, "accueil"), "", at)
            .expect("approve");
        request.with_chain(chain, at)
    }

    #[tokio::test]
    async fn in_memory_request_repo_round_trip() {
        let repo = InMemoryValidationRequestRepository::default();
        let request = submitted();

        repo.insert(request.clone()).await.expect("insert");
        let found = repo.find_by_id(&request.id).await.expect("find");

        assert_eq!(found, Some(request));
    }

    #[tokio::test]
    async fn racing_writers_from_same_snapshot_admit_exactly_one() {
        let repo = Arc::new(InMemoryValidationRequestRepository::default());
        let base = submitted();
        repo.insert(base.clone()).await.expect("insert");

        let handles = ["Mme Fall", "M. Ba"]
            .into_iter()
            .map(|name| {
                let repo = Arc::clone(&repo);
                let next = approved_by(&base, name);
                tokio::spawn(async move { repo.save_versioned(next, 1).await })
            })
            .collect::<Vec<_>>();

        let mut successes = 0;
        let mut conflicts = 0;
        for handle in handles {
            match handle.await.expect("join") {
                Ok(saved) => {
                    assert_eq!(saved.version, 2);
                    successes += 1;
                }
                Err(RepositoryError::VersionConflict { expected: 1, actual: 2, .. }) => {
                    conflicts += 1
                }
                Err(other) => panic!("unexpected error: {other}"),
            }
        }

        assert_eq!((successes, conflicts), (1, 1));
    }

    #[tokio::test]
    async fn duplicate_insert_is_refused() {
        let repo = InMemoryValidationRequestRepository::default();
        repo.insert(submitted()).await.expect("insert");

        let error = repo.insert(submitted()).await.expect_err("duplicate");

        assert!(matches!(error, RepositoryError::AlreadyExists(_)));
    }
}
