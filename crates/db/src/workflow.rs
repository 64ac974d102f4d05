//! Request intake and decision recording on top of the repositories.
//!
//! The approval engine stays pure; this service reads the latest snapshot,
//! authorizes the approver, applies the decision and stores the result under
//! the repository's version check.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{info, warn};
use uuid::Uuid;

use diplomas_core::approvals::{
    decision_applied_event, decision_refused_event, ApprovalEngine, Decision, RoleMatching,
};
use diplomas_core::audit::{
    AuditCategory, AuditContext, AuditEvent, AuditOutcome, AuditSink, TracingAuditSink,
};
use diplomas_core::config::WorkflowConfig;
use diplomas_core::domain::approval::ApprovalStatus;
use diplomas_core::domain::request::{RequestId, StudentId, ValidationRequest};
use diplomas_core::domain::session::SessionContext;
use diplomas_core::domain::template::ChainTemplate;
use diplomas_core::errors::{ApplicationError, DomainError};
use diplomas_core::notifications::{Notification, NotificationId};
use diplomas_core::tracking::{self, TrackingSummary};

use crate::repositories::{
    InMemoryNotificationRepository, InMemoryValidationRequestRepository, NotificationRepository,
    SqlNotificationRepository, SqlValidationRequestRepository, ValidationRequestRepository,
};
use crate::DbPool;

pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DecisionCommand {
    pub request_id: RequestId,
    pub decision: Decision,
    pub comment: String,
    /// Version the caller last read. `None` acts on whatever is stored now.
    pub expected_version: Option<u64>,
}

impl DecisionCommand {
    pub fn new(request_id: RequestId, decision: Decision, comment: impl Into<String>) -> Self {
        Self { request_id, decision, comment: comment.into(), expected_version: None }
    }

    pub fn expecting_version(mut self, version: u64) -> Self {
        self.expected_version = Some(version);
        self
    }
}

pub struct DecisionService {
    requests: Arc<dyn ValidationRequestRepository>,
    notifications: Arc<dyn NotificationRepository>,
    engine: ApprovalEngine<RoleMatching>,
    template: ChainTemplate,
    audit: Arc<dyn AuditSink>,
}

impl DecisionService {
    pub fn new(
        requests: Arc<dyn ValidationRequestRepository>,
        notifications: Arc<dyn NotificationRepository>,
        workflow: &WorkflowConfig,
        audit: Arc<dyn AuditSink>,
    ) -> Self {
        Self {
            requests,
            notifications,
            engine: ApprovalEngine::new(workflow.role_matching, workflow.rejection_policy),
            template: workflow.template.clone(),
            audit,
        }
    }

    pub fn sqlite(pool: DbPool, workflow: &WorkflowConfig) -> Self {
        Self::new(
            Arc::new(SqlValidationRequestRepository::new(pool.clone())),
            Arc::new(SqlNotificationRepository::new(pool)),
            workflow,
            Arc::new(TracingAuditSink),
        )
    }

    pub fn in_memory(workflow: &WorkflowConfig, audit: Arc<dyn AuditSink>) -> Self {
        Self::new(
            Arc::new(InMemoryValidationRequestRepository::default()),
            Arc::new(InMemoryNotificationRepository::default()),
            workflow,
            audit,
        )
    }

    pub fn engine(&self) -> &ApprovalEngine<RoleMatching> {
        &self.engine
    }

    /// Opens a new request with an all-pending chain built from the configured template.
    pub async fn submit(
        &self,
        student_id: StudentId,
        correlation_id: &str,
        submitted_at: DateTime<Utc>,
    ) -> Result<ValidationRequest, ApplicationError> {
        if student_id.0.trim().is_empty() {
            return Err(DomainError::InvalidArgument("student id is required".to_string()).into());
        }

        let chain = self.template.instantiate()?;
        let request =
            ValidationRequest::submit(next_request_id(), student_id, chain, submitted_at);
        self.requests.insert(request.clone()).await?;

        let context =
            AuditContext::new(Some(request.id.clone()), correlation_id, request.student_id.0.clone());
        self.audit.emit(
            AuditEvent::new(&context, "request.submitted", AuditCategory::Intake, AuditOutcome::Success)
                .with_metadata("steps", request.chain.len().to_string()),
        );
        info!(
            event_name = "workflow.request_submitted",
            correlation_id = %correlation_id,
            request_id = %request.id.0,
            student_id = %request.student_id.0,
            "validation request submitted"
        );

        Ok(request)
    }

    pub async fn get(&self, id: &RequestId) -> Result<ValidationRequest, ApplicationError> {
        self.requests
            .find_by_id(id)
            .await?
            .ok_or_else(|| ApplicationError::NotFound(format!("validation request `{}`", id.0)))
    }

    pub async fn list(
        &self,
        status: Option<ApprovalStatus>,
        limit: u32,
    ) -> Result<Vec<ValidationRequest>, ApplicationError> {
        Ok(self.requests.list(status, limit).await?)
    }

    /// Records one decision against the latest stored snapshot.
    ///
    /// A stale `expected_version` or a concurrent write between read and save
    /// both surface as `ConcurrencyConflict`.
    pub async fn decide(
        &self,
        command: &DecisionCommand,
        session: &SessionContext,
        decided_at: DateTime<Utc>,
    ) -> Result<ValidationRequest, ApplicationError> {
        self.decide_pinned(command, None, session, decided_at).await
    }

    /// Like [`DecisionService::decide`], retrying write races up to `max_attempts` times.
    ///
    /// Each retry re-reads the request and re-applies only while the step that
    /// was active at the first read is still the active step.
    pub async fn decide_with_retry(
        &self,
        command: &DecisionCommand,
        session: &SessionContext,
        decided_at: DateTime<Utc>,
        max_attempts: u32,
    ) -> Result<ValidationRequest, ApplicationError> {
        session.validate()?;
        let current = self.get(&command.request_id).await?;
        if let Some(expected) = command.expected_version {
            if expected != current.version {
                return Err(ApplicationError::ConcurrencyConflict {
                    request_id: current.id.0,
                    expected_version: expected,
                });
            }
        }
        let pinned = current.chain.active_step().map(|step| step.id);
        let command = DecisionCommand { expected_version: None, ..command.clone() };

        let mut attempt = 1;
        loop {
            match self.decide_pinned(&command, pinned, session, decided_at).await {
                Err(error) if error.is_retriable() && attempt < max_attempts => {
                    warn!(
                        event_name = "workflow.decision_retry",
                        correlation_id = %session.correlation_id,
                        request_id = %command.request_id.0,
                        attempt,
                        "concurrent write detected, re-reading request"
                    );
                    attempt += 1;
                }
                outcome => return outcome,
            }
        }
    }

    async fn decide_pinned(
        &self,
        command: &DecisionCommand,
        pinned_step: Option<u32>,
        session: &SessionContext,
        decided_at: DateTime<Utc>,
    ) -> Result<ValidationRequest, ApplicationError> {
        session.validate()?;
        let request = self.get(&command.request_id).await?;
        if let Some(expected) = command.expected_version {
            if expected != request.version {
                return Err(ApplicationError::ConcurrencyConflict {
                    request_id: request.id.0,
                    expected_version: expected,
                });
            }
        }

        let context = AuditContext::new(
            Some(request.id.clone()),
            session.correlation_id.clone(),
            session.approver.name.clone(),
        );
        let active = request.chain.active_step().map(|step| (step.id, step.title.clone()));

        if let (Some(pinned), Some((active_id, _))) = (pinned_step, active.as_ref()) {
            if pinned != *active_id {
                return Err(DomainError::InvalidTransition {
                    chain_status: request.status(),
                    reason: format!("step {pinned} was already decided"),
                }
                .into());
            }
        }

        if let Some((_, title)) = active.as_ref() {
            if !self.engine.can_act(&request.chain, &session.approver.role) {
                self.audit.emit(
                    AuditEvent::new(
                        &context,
                        "approval.decision_forbidden",
                        AuditCategory::Decision,
                        AuditOutcome::Rejected,
                    )
                    .with_metadata("approver_role", session.approver.role.clone())
                    .with_metadata("step_title", title.clone()),
                );
                return Err(ApplicationError::NotAuthorized {
                    approver_role: session.approver.role.clone(),
                    step_title: title.clone(),
                });
            }
        }

        let applied = self.engine.apply(
            &request.chain,
            command.decision,
            &session.approver,
            &command.comment,
            decided_at,
        );
        let chain = match applied {
            Ok(chain) => chain,
            Err(error) => {
                self.audit.emit(decision_refused_event(&context, command.decision, &error));
                return Err(error.into());
            }
        };

        let saved = match self
            .requests
            .save_versioned(request.with_chain(chain, decided_at), request.version)
            .await
        {
            Ok(saved) => saved,
            Err(error) => {
                let error = ApplicationError::from(error);
                if matches!(error, ApplicationError::ConcurrencyConflict { .. }) {
                    self.audit.emit(
                        AuditEvent::new(
                            &context,
                            "approval.decision_conflicted",
                            AuditCategory::Decision,
                            AuditOutcome::Failed,
                        )
                        .with_metadata("decision", command.decision.as_str())
                        .with_metadata("expected_version", request.version.to_string()),
                    );
                }
                return Err(error);
            }
        };
        if let Some((step_id, title)) = active.as_ref() {
            self.audit.emit(decision_applied_event(
                &context,
                command.decision,
                *step_id,
                title,
                &session.approver,
                &saved.chain,
            ));
        }
        info!(
            event_name = "workflow.decision_recorded",
            correlation_id = %session.correlation_id,
            request_id = %saved.id.0,
            decision = command.decision.as_str(),
            overall_status = saved.status().as_str(),
            progress = saved.chain.progress(),
            version = saved.version,
            "approval decision recorded"
        );

        if let Some(step) = active.and_then(|(id, _)| saved.chain.step(id)) {
            let notice = Notification::for_decision(&saved, step, command.decision, decided_at);
            if let Err(error) = self.notifications.save(notice).await {
                warn!(
                    event_name = "workflow.notification_failed",
                    correlation_id = %session.correlation_id,
                    request_id = %saved.id.0,
                    error = %error,
                    "decision stored but student notification was not"
                );
            }
        }

        Ok(saved)
    }

    pub async fn tracking(
        &self,
        id: &RequestId,
        now: DateTime<Utc>,
    ) -> Result<TrackingSummary, ApplicationError> {
        let request = self.get(id).await?;
        Ok(tracking::summarize(&request, now))
    }

    /// Most recently submitted request of `student_id`.
    pub async fn latest_for_student(
        &self,
        student_id: &StudentId,
    ) -> Result<ValidationRequest, ApplicationError> {
        self.requests.list_for_student(student_id).await?.into_iter().next().ok_or_else(|| {
            ApplicationError::NotFound(format!("no validation request for student `{}`", student_id.0))
        })
    }

    /// Pending requests whose active step `session` may act on, oldest first.
    pub async fn actionable_for(
        &self,
        session: &SessionContext,
        limit: u32,
    ) -> Result<Vec<ValidationRequest>, ApplicationError> {
        session.validate()?;
        let pending = self.requests.list(Some(ApprovalStatus::Pending), u32::MAX).await?;
        Ok(pending
            .into_iter()
            .filter(|request| self.engine.can_act(&request.chain, &session.approver.role))
            .take(usize::try_from(limit).unwrap_or(usize::MAX))
            .collect())
    }

    pub async fn notifications(
        &self,
        student_id: &StudentId,
        unread_only: bool,
    ) -> Result<Vec<Notification>, ApplicationError> {
        Ok(self.notifications.list_for_student(student_id, unread_only).await?)
    }

    pub async fn mark_notification_read(&self, id: &NotificationId) -> Result<(), ApplicationError> {
        if self.notifications.mark_read(id).await? {
            Ok(())
        } else {
            Err(ApplicationError::NotFound(format!("notification `{}`", id.0)))
        }
    }
}

fn next_request_id() -> RequestId {
    let token = Uuid::new_v4().simple().to_string();
    RequestId(format!("VR-{}", token[..12].to_ascii_uppercase()))
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;

    use async_trait::async_trait;
    use chrono::{DateTime, Duration, TimeZone, Utc};

    use diplomas_core::approvals::{Decision, RejectionPolicy};
    use diplomas_core::audit::InMemoryAuditSink;
    use diplomas_core::config::AppConfig;
    use diplomas_core::domain::approval::{ApprovalStatus, Approver};
    use diplomas_core::domain::request::{RequestId, StudentId, ValidationRequest};
    use diplomas_core::domain::session::SessionContext;
    use diplomas_core::errors::{ApplicationError, DomainError};

    use super::{DecisionCommand, DecisionService};
    use crate::repositories::{
        InMemoryNotificationRepository, InMemoryValidationRequestRepository, RepositoryError,
        ValidationRequestRepository,
    };
    use crate::{connect_with_settings, migrations};

    const ROLES: [&str; 5] = ["accueil", "scolarite", "chef_departement", "comptabilite", "directeur"];

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 9, 1, 8, 0, 0).unwrap()
    }

    fn session(role: &str) -> SessionContext {
        SessionContext::new(Approver::new(format!("agent {role}"), role), format!("req-{role}"))
    }

    fn service() -> (DecisionService, InMemoryAuditSink) {
        let sink = InMemoryAuditSink::default();
        let service =
            DecisionService::in_memory(&AppConfig::default().workflow, Arc::new(sink.clone()));
        (service, sink)
    }

    fn approve(id: &RequestId) -> DecisionCommand {
        DecisionCommand::new(id.clone(), Decision::Approve, "")
    }

    #[tokio::test]
    async fn submit_opens_pending_chain_from_template() {
        let (service, sink) = service();

        let request =
            service.submit(StudentId("STU-1".to_string()), "req-1", t0()).await.expect("submit");

        assert!(request.id.0.starts_with("VR-"));
        assert_eq!(request.version, 1);
        assert_eq!(request.chain.len(), 5);
        assert_eq!(request.status(), ApprovalStatus::Pending);
        assert_eq!(sink.events()[0].event_type, "request.submitted");
    }

    #[tokio::test]
    async fn submit_requires_student_id() {
        let (service, _) = service();

        let error =
            service.submit(StudentId("  ".to_string()), "req-1", t0()).await.expect_err("blank");

        assert!(matches!(error, ApplicationError::Domain(DomainError::InvalidArgument(_))));
    }

    #[tokio::test]
    async fn full_chain_completes_and_notifies_each_step() {
        let (service, _) = service();
        let submitted =
            service.submit(StudentId("STU-1".to_string()), "req-1", t0()).await.expect("submit");

        let mut latest = submitted.clone();
        for (offset, role) in ROLES.iter().enumerate() {
            let at = t0() + Duration::days(offset as i64 + 1);
            latest = service.decide(&approve(&submitted.id), &session(role), at).await.expect("decide");
        }

        assert_eq!(latest.status(), ApprovalStatus::Completed);
        assert_eq!(latest.chain.progress(), 100);
        assert_eq!(latest.version, 6);
        let notices =
            service.notifications(&StudentId("STU-1".to_string()), false).await.expect("notices");
        assert_eq!(notices.len(), 5);
        assert!(notices[0].message.contains("All signatures have been obtained"));
    }

    #[tokio::test]
    async fn wrong_role_is_not_authorized_and_audited() {
        let (service, sink) = service();
        let submitted =
            service.submit(StudentId("STU-1".to_string()), "req-1", t0()).await.expect("submit");

        let error = service
            .decide(&approve(&submitted.id), &session("directeur"), t0())
            .await
            .expect_err("directeur cannot sign the first step");

        assert_eq!(
            error,
            ApplicationError::NotAuthorized {
                approver_role: "directeur".to_string(),
                step_title: "Dépôt de la demande".to_string(),
            }
        );
        assert!(sink.events().iter().any(|e| e.event_type == "approval.decision_forbidden"));
        assert_eq!(service.get(&submitted.id).await.expect("get").version, 1);
    }

    #[tokio::test]
    async fn blank_approver_identity_is_an_invalid_argument() {
        let (service, sink) = service();
        let submitted =
            service.submit(StudentId("STU-1".to_string()), "req-1", t0()).await.expect("submit");
        let no_role = SessionContext::new(Approver::new("M. Sarr", "  "), "req-2");
        let no_name = SessionContext::new(Approver::new("", "accueil"), "req-3");
        let nobody = SessionContext::new(Approver::new("", ""), "req-4");

        let decided = service.decide(&approve(&submitted.id), &no_role, t0()).await;
        let retried = service.decide_with_retry(&approve(&submitted.id), &no_name, t0(), 3).await;
        let queue = service.actionable_for(&nobody, 10).await;

        assert!(matches!(decided, Err(ApplicationError::Domain(DomainError::InvalidArgument(_)))));
        assert!(matches!(retried, Err(ApplicationError::Domain(DomainError::InvalidArgument(_)))));
        assert!(matches!(queue, Err(ApplicationError::Domain(DomainError::InvalidArgument(_)))));
        assert_eq!(event_types(&sink), ["request.submitted"]);
        assert_eq!(service.get(&submitted.id).await.expect("get").version, 1);
    }

    #[tokio::test]
    async fn decisions_on_rejected_chain_are_invalid_transitions() {
        let (service, sink) = service();
        let submitted =
            service.submit(StudentId("STU-1".to_string()), "req-1", t0()).await.expect("submit");
        let reject = DecisionCommand::new(submitted.id.clone(), Decision::Reject, "pièce manquante");
        service.decide(&reject, &session("accueil"), t0()).await.expect("reject");

        let error = service
            .decide(&approve(&submitted.id), &session("scolarite"), t0())
            .await
            .expect_err("frozen");

        assert!(matches!(
            error,
            ApplicationError::Domain(DomainError::InvalidTransition {
                chain_status: ApprovalStatus::Rejected,
                ..
            })
        ));
        assert_eq!(
            event_types(&sink),
            [
                "request.submitted",
                "approval.decision_applied",
                "approval.decision_refused",
            ]
        );
    }

    #[tokio::test]
    async fn stale_expected_version_is_a_conflict() {
        let (service, _) = service();
        let submitted =
            service.submit(StudentId("STU-1".to_string()), "req-1", t0()).await.expect("submit");
        service.decide(&approve(&submitted.id), &session("accueil"), t0()).await.expect("first");

        let stale = approve(&submitted.id).expecting_version(submitted.version);
        let error = service.decide(&stale, &session("scolarite"), t0()).await.expect_err("stale");

        assert!(error.is_retriable());
        assert!(matches!(
            error,
            ApplicationError::ConcurrencyConflict { expected_version: 1, .. }
        ));
    }

    #[tokio::test]
    async fn missing_request_is_not_found() {
        let (service, _) = service();

        let error = service
            .decide(&approve(&RequestId("VR-404".to_string())), &session("accueil"), t0())
            .await
            .expect_err("missing");

        assert!(matches!(error, ApplicationError::NotFound(_)));
    }

    /// Delegates to an in-memory store but lets one rival write land first.
    struct RacingRepository {
        inner: InMemoryValidationRequestRepository,
        rival: std::sync::Mutex<Option<Box<dyn Fn(&ValidationRequest) -> ValidationRequest + Send>>>,
        raced: AtomicBool,
    }

    impl RacingRepository {
        fn new(rival: impl Fn(&ValidationRequest) -> ValidationRequest + Send + 'static) -> Self {
            Self {
                inner: InMemoryValidationRequestRepository::default(),
                rival: std::sync::Mutex::new(Some(Box::new(rival))),
                raced: AtomicBool::new(false),
            }
        }
    }

    #[async_trait]
    impl ValidationRequestRepository for RacingRepository {
        async fn find_by_id(
            &self,
            id: &RequestId,
        ) -> Result<Option<ValidationRequest>, RepositoryError> {
            self.inner.find_by_id(id).await
        }

        async fn list(
            &self,
            status: Option<ApprovalStatus>,
            limit: u32,
        ) -> Result<Vec<ValidationRequest>, RepositoryError> {
            self.inner.list(status, limit).await
        }

        async fn list_for_student(
            &self,
            student_id: &StudentId,
        ) -> Result<Vec<ValidationRequest>, RepositoryError> {
            self.inner.list_for_student(student_id).await
        }

        async fn insert(&self, request: ValidationRequest) -> Result<(), RepositoryError> {
            self.inner.insert(request).await
        }

        async fn save_versioned(
            &self,
            request: ValidationRequest,
            expected_version: u64,
        ) -> Result<ValidationRequest, RepositoryError> {
            if !self.raced.swap(true, Ordering::SeqCst) {
                let current = self.inner.find_by_id(&request.id).await?.expect("seeded");
                let rival = self.rival.lock().expect("lock").take().expect("rival");
                self.inner.save_versioned(rival(&current), current.version).await?;
            }
            self.inner.save_versioned(request, expected_version).await
        }
    }

    fn racing_service(repo: RacingRepository) -> (DecisionService, InMemoryAuditSink) {
        let sink = InMemoryAuditSink::default();
        let service = DecisionService::new(
            Arc::new(repo),
            Arc::new(InMemoryNotificationRepository::default()),
            &AppConfig::default().workflow,
            Arc::new(sink.clone()),
        );
        (service, sink)
    }

    fn event_types(sink: &InMemoryAuditSink) -> Vec<String> {
        sink.events().into_iter().map(|event| event.event_type).collect()
    }

    #[tokio::test]
    async fn retry_reapplies_when_rival_write_left_step_untouched() {
        let (service, sink) = racing_service(RacingRepository::new(|current| current.clone()));
        let submitted =
            service.submit(StudentId("STU-1".to_string()), "req-1", t0()).await.expect("submit");

        let saved = service
            .decide_with_retry(&approve(&submitted.id), &session("accueil"), t0(), 3)
            .await
            .expect("second attempt succeeds");

        assert_eq!(saved.version, 3);
        assert_eq!(saved.chain.progress(), 20);
        assert_eq!(
            event_types(&sink),
            [
                "request.submitted",
                "approval.decision_conflicted",
                "approval.decision_applied",
            ]
        );
    }

    #[tokio::test]
    async fn retry_stops_when_rival_already_decided_the_step() {
        let rival = |current: &ValidationRequest| {
            let chain = super::ApprovalEngine::<super::RoleMatching>::default()
                .apply(&current.chain, Decision::Approve, &Approver::new("rival", "accueil"), "", t0())
                .expect("rival approve");
            current.with_chain(chain, t0())
        };
        let (service, _) = racing_service(RacingRepository::new(rival));
        let submitted =
            service.submit(StudentId("STU-1".to_string()), "req-1", t0()).await.expect("submit");

        let error = service
            .decide_with_retry(&approve(&submitted.id), &session("accueil"), t0(), 3)
            .await
            .expect_err("step 1 already decided");

        assert!(matches!(error, ApplicationError::Domain(DomainError::InvalidTransition { .. })));
        let stored = service.get(&submitted.id).await.expect("get");
        let signer = stored.chain.step(1).and_then(|step| step.validator.clone());
        assert_eq!(signer.map(|validator| validator.name), Some("rival".to_string()));
    }

    #[tokio::test]
    async fn without_retry_a_race_surfaces_as_conflict() {
        let (service, sink) = racing_service(RacingRepository::new(|current| current.clone()));
        let submitted =
            service.submit(StudentId("STU-1".to_string()), "req-1", t0()).await.expect("submit");

        let error = service
            .decide(&approve(&submitted.id), &session("accueil"), t0())
            .await
            .expect_err("race lost");

        assert!(matches!(error, ApplicationError::ConcurrencyConflict { expected_version: 1, .. }));
        assert_eq!(event_types(&sink), ["request.submitted", "approval.decision_conflicted"]);
    }

    #[tokio::test]
    async fn actionable_queue_and_latest_request_follow_roles_and_dates() {
        let (service, _) = service();
        let student = StudentId("STU-1".to_string());
        let first = service.submit(student.clone(), "req-1", t0()).await.expect("first");
        let second =
            service.submit(student.clone(), "req-2", t0() + Duration::days(1)).await.expect("second");
        service.decide(&approve(&first.id), &session("accueil"), t0()).await.expect("advance");

        let for_registrar = service.actionable_for(&session("scolarite"), 10).await.expect("queue");
        let for_desk = service.actionable_for(&session("accueil"), 10).await.expect("queue");
        let latest = service.latest_for_student(&student).await.expect("latest");

        assert_eq!(for_registrar.iter().map(|r| r.id.clone()).collect::<Vec<_>>(), [first.id]);
        assert_eq!(for_desk.iter().map(|r| r.id.clone()).collect::<Vec<_>>(), [second.id.clone()]);
        assert_eq!(latest.id, second.id);
        assert!(matches!(
            service.latest_for_student(&StudentId("nobody".to_string())).await,
            Err(ApplicationError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn cascade_policy_from_config_closes_remaining_steps() {
        let mut workflow = AppConfig::default().workflow;
        workflow.rejection_policy = RejectionPolicy::CascadeRejection;
        let service = DecisionService::in_memory(&workflow, Arc::new(InMemoryAuditSink::default()));
        let submitted =
            service.submit(StudentId("STU-1".to_string()), "req-1", t0()).await.expect("submit");

        let saved = service
            .decide(
                &DecisionCommand::new(submitted.id.clone(), Decision::Reject, "incomplet"),
                &session("accueil"),
                t0(),
            )
            .await
            .expect("reject");

        assert_eq!(saved.chain.count(ApprovalStatus::Rejected), 5);
    }

    #[tokio::test]
    async fn sqlite_backed_service_tracks_and_marks_notifications_read() {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        migrations::run_pending(&pool).await.expect("migrations");
        let service = DecisionService::sqlite(pool, &AppConfig::default().workflow);
        let student = StudentId("STU-7".to_string());
        let submitted = service.submit(student.clone(), "req-1", t0()).await.expect("submit");
        service
            .decide(&approve(&submitted.id), &session("accueil"), t0() + Duration::hours(3))
            .await
            .expect("decide");

        let summary =
            service.tracking(&submitted.id, t0() + Duration::days(1)).await.expect("tracking");
        let notices = service.notifications(&student, true).await.expect("notices");
        service.mark_notification_read(&notices[0].id).await.expect("mark read");

        assert_eq!(summary.progress, 20);
        assert_eq!(summary.timeline.len(), 2);
        assert_eq!(notices.len(), 1);
        assert!(service.notifications(&student, true).await.expect("unread").is_empty());
    }
}
