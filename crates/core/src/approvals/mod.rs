use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::audit::{AuditCategory, AuditContext, AuditEvent, AuditOutcome, AuditSink};
use crate::domain::approval::{ApprovalChain, ApprovalStatus, ApprovalStep, Approver};
use crate::errors::DomainError;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Decision {
    Approve,
    Reject,
}

impl Decision {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Approve => "approve",
            Self::Reject => "reject",
        }
    }

    fn resulting_status(&self) -> ApprovalStatus {
        match self {
            Self::Approve => ApprovalStatus::Completed,
            Self::Reject => ApprovalStatus::Rejected,
        }
    }
}

impl std::str::FromStr for Decision {
    type Err = DomainError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match normalize_key(value).as_str() {
            "approve" | "approved" => Ok(Self::Approve),
            "reject" | "rejected" => Ok(Self::Reject),
            other => Err(DomainError::InvalidArgument(format!(
                "unknown decision `{other}` (expected approve|reject)"
            ))),
        }
    }
}

/// What happens to the steps after a rejected one.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RejectionPolicy {
    /// Later steps stay pending forever; the chain is frozen.
    #[default]
    FreezeRemaining,
    /// Later steps are marked rejected at the same instant, without a validator.
    CascadeRejection,
}

impl std::str::FromStr for RejectionPolicy {
    type Err = DomainError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match normalize_key(value).as_str() {
            "freeze_remaining" | "freeze" => Ok(Self::FreezeRemaining),
            "cascade_rejection" | "cascade" => Ok(Self::CascadeRejection),
            other => Err(DomainError::InvalidArgument(format!(
                "unknown rejection policy `{other}` (expected freeze_remaining|cascade_rejection)"
            ))),
        }
    }
}

/// Decides whether an approver role is the authority for a step.
pub trait RoleMatcher: Send + Sync {
    fn matches(&self, step: &ApprovalStep, approver_role: &str) -> bool;
}

impl<F> RoleMatcher for F
where
    F: Fn(&ApprovalStep, &str) -> bool + Send + Sync,
{
    fn matches(&self, step: &ApprovalStep, approver_role: &str) -> bool {
        self(step, approver_role)
    }
}

/// Matches the approver role against the step's `required_role`, ignoring case and padding.
#[derive(Clone, Copy, Debug, Default)]
pub struct RequiredRoleMatcher;

impl RoleMatcher for RequiredRoleMatcher {
    fn matches(&self, step: &ApprovalStep, approver_role: &str) -> bool {
        let approver_key = normalize_key(approver_role);
        if approver_key.is_empty() {
            return false;
        }
        step.required_role.as_deref().map(normalize_key).is_some_and(|key| key == approver_key)
    }
}

/// Legacy rule: the step title contains the approver role.
///
/// Kept as a placeholder for deployments that still name roles after step titles.
#[derive(Clone, Copy, Debug, Default)]
pub struct TitleSubstringMatcher;

impl RoleMatcher for TitleSubstringMatcher {
    fn matches(&self, step: &ApprovalStep, approver_role: &str) -> bool {
        let needle = approver_role.trim().to_lowercase();
        !needle.is_empty() && step.title.to_lowercase().contains(&needle)
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoleMatching {
    #[default]
    RequiredRole,
    TitleSubstring,
}

impl std::str::FromStr for RoleMatching {
    type Err = DomainError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match normalize_key(value).as_str() {
            "required_role" => Ok(Self::RequiredRole),
            "title_substring" => Ok(Self::TitleSubstring),
            other => Err(DomainError::InvalidArgument(format!(
                "unknown role matching `{other}` (expected required_role|title_substring)"
            ))),
        }
    }
}

impl RoleMatcher for RoleMatching {
    fn matches(&self, step: &ApprovalStep, approver_role: &str) -> bool {
        match self {
            Self::RequiredRole => RequiredRoleMatcher.matches(step, approver_role),
            Self::TitleSubstring => TitleSubstringMatcher.matches(step, approver_role),
        }
    }
}

#[derive(Clone, Debug, Default)]
pub struct ApprovalEngine<M> {
    matcher: M,
    rejection_policy: RejectionPolicy,
}

impl<M> ApprovalEngine<M>
where
    M: RoleMatcher,
{
    pub fn new(matcher: M, rejection_policy: RejectionPolicy) -> Self {
        Self { matcher, rejection_policy }
    }

    pub fn rejection_policy(&self) -> RejectionPolicy {
        self.rejection_policy
    }

    pub fn can_act(&self, chain: &ApprovalChain, approver_role: &str) -> bool {
        chain.active_step().is_some_and(|step| self.matcher.matches(step, approver_role))
    }

    /// Records `decision` on the active step and returns the next chain snapshot.
    ///
    /// `chain` itself is left untouched. Authorization is the caller's concern;
    /// pair this with [`ApprovalEngine::can_act`].
    pub fn apply(
        &self,
        chain: &ApprovalChain,
        decision: Decision,
        approver: &Approver,
        comment: &str,
        decided_at: DateTime<Utc>,
    ) -> Result<ApprovalChain, DomainError> {
        let chain_status = chain.overall_status();
        if chain_status != ApprovalStatus::Pending {
            return Err(DomainError::InvalidTransition {
                chain_status,
                reason: "chain is frozen".to_string(),
            });
        }
        let Some(active_id) = chain.active_step().map(|step| step.id) else {
            return Err(DomainError::InvalidTransition {
                chain_status,
                reason: "chain has no active step".to_string(),
            });
        };
        approver.ensure_present()?;

        let comment = comment.trim();
        let comment = (!comment.is_empty()).then(|| comment.to_string());
        let cascade = decision == Decision::Reject
            && self.rejection_policy == RejectionPolicy::CascadeRejection;

        let steps = chain
            .steps()
            .iter()
            .cloned()
            .map(|mut step| {
                if step.id == active_id {
                    step.status = decision.resulting_status();
                    step.validator = Some(approver.clone());
                    step.completed_at = Some(decided_at);
                    step.comment = comment.clone();
                } else if cascade && step.id > active_id {
                    step.status = ApprovalStatus::Rejected;
                    step.completed_at = Some(decided_at);
                }
                step
            })
            .collect();

        ApprovalChain::from_steps(steps)
    }

    #[allow(clippy::too_many_arguments)]
    pub fn apply_with_audit<S>(
        &self,
        chain: &ApprovalChain,
        decision: Decision,
        approver: &Approver,
        comment: &str,
        decided_at: DateTime<Utc>,
        sink: &S,
        audit: &AuditContext,
    ) -> Result<ApprovalChain, DomainError>
    where
        S: AuditSink + ?Sized,
    {
        let acted_on = chain.active_step().map(|step| (step.id, step.title.clone()));
        let result = self.apply(chain, decision, approver, comment, decided_at);
        match &result {
            Ok(next) => {
                let (step_id, step_title) = acted_on.unwrap_or_default();
                sink.emit(decision_applied_event(
                    audit,
                    decision,
                    step_id,
                    &step_title,
                    approver,
                    next,
                ));
            }
            Err(error) => sink.emit(decision_refused_event(audit, decision, error)),
        }
        result
    }
}

/// `approval.decision_applied`: `next` is the chain after the decision on step `step_id`.
pub fn decision_applied_event(
    audit: &AuditContext,
    decision: Decision,
    step_id: u32,
    step_title: &str,
    approver: &Approver,
    next: &ApprovalChain,
) -> AuditEvent {
    let outcome = AuditOutcome::Success;
    AuditEvent::new(audit, "approval.decision_applied", AuditCategory::Decision, outcome)
        .with_metadata("decision", decision.as_str())
        .with_metadata("step_id", step_id.to_string())
        .with_metadata("step_title", step_title.to_string())
        .with_metadata("approver_role", approver.role.clone())
        .with_metadata("overall_status", next.overall_status().as_str())
        .with_metadata("progress", next.progress().to_string())
}

pub fn decision_refused_event(
    audit: &AuditContext,
    decision: Decision,
    error: &impl std::fmt::Display,
) -> AuditEvent {
    let outcome = AuditOutcome::Rejected;
    AuditEvent::new(audit, "approval.decision_refused", AuditCategory::Decision, outcome)
        .with_metadata("decision", decision.as_str())
        .with_metadata("error", error.to_string())
}

fn normalize_key(raw: &str) -> String {
    raw.trim().to_ascii_lowercase()
}

#[cfg(test)]
mod tests {
    use chrono::{DateTime, Duration, TimeZone, Utc};

    use super::{
        ApprovalEngine, Decision, RejectionPolicy, RequiredRoleMatcher, RoleMatcher, RoleMatching,
        TitleSubstringMatcher,
    };
    use crate::audit::{AuditContext, AuditOutcome, InMemoryAuditSink};
    use crate::domain::approval::{ApprovalChain, ApprovalStatus, ApprovalStep, Approver};
    use crate::domain::template::ChainTemplate;
    use crate::errors::DomainError;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 6, 1, 8, 30, 0).unwrap()
    }

    fn engine() -> ApprovalEngine<RequiredRoleMatcher> {
        ApprovalEngine::default()
    }

    fn fresh_chain() -> ApprovalChain {
        ChainTemplate::default().instantiate().expect("default template")
    }

    fn approver(role: &str) -> Approver {
        Approver::new(format!("agent {role}"), role)
    }

    /// Steps 1-3 completed, steps 4-5 pending.
    fn three_completed() -> ApprovalChain {
        let engine = engine();
        let mut chain = fresh_chain();
        for (offset, role) in ["accueil", "scolarite", "chef_departement"].into_iter().enumerate() {
            let at = t0() + Duration::days(offset as i64);
            chain = engine
                .apply(&chain, Decision::Approve, &approver(role), "", at)
                .expect("approval on pending chain");
        }
        chain
    }

    #[test]
    fn approving_fourth_step_moves_progress_from_sixty_to_eighty() {
        let chain = three_completed();
        assert_eq!(chain.progress(), 60);
        assert_eq!(chain.active_step().map(|step| step.id), Some(4));

        let mme_x = Approver::new("Mme X", "comptabilite");
        let at = t0() + Duration::days(5);
        let next = engine()
            .apply(&chain, Decision::Approve, &mme_x, "ok", at)
            .expect("step 4 is actionable");

        let step = next.step(4).expect("step 4");
        assert_eq!(step.status, ApprovalStatus::Completed);
        assert_eq!(step.validator.as_ref(), Some(&mme_x));
        assert_eq!(step.completed_at, Some(at));
        assert_eq!(step.comment.as_deref(), Some("ok"));
        assert_eq!(next.overall_status(), ApprovalStatus::Pending);
        assert_eq!(next.progress(), 80);
        assert_eq!(next.active_step().map(|step| step.id), Some(5));
    }

    #[test]
    fn apply_leaves_the_input_snapshot_untouched() {
        let chain = three_completed();
        let before = chain.clone();

        let _ = engine()
            .apply(&chain, Decision::Reject, &approver("comptabilite"), "missing receipt", t0())
            .expect("reject on pending chain");

        assert_eq!(chain, before);
    }

    #[test]
    fn rejecting_fourth_step_freezes_the_fifth() {
        let chain = three_completed();
        let rejected = engine()
            .apply(&chain, Decision::Reject, &approver("comptabilite"), "fees unpaid", t0())
            .expect("reject on pending chain");

        assert_eq!(rejected.step(4).map(|step| step.status), Some(ApprovalStatus::Rejected));
        let fifth = rejected.step(5).expect("step 5");
        assert_eq!(fifth.status, ApprovalStatus::Pending);
        assert!(fifth.validator.is_none());
        assert!(fifth.completed_at.is_none());
        assert_eq!(rejected.overall_status(), ApprovalStatus::Rejected);
        assert!(rejected.active_step().is_none());

        for decision in [Decision::Approve, Decision::Reject] {
            let error = engine()
                .apply(&rejected, decision, &approver("directeur"), "", t0())
                .expect_err("frozen chain must refuse decisions");
            assert!(matches!(
                error,
                DomainError::InvalidTransition { chain_status: ApprovalStatus::Rejected, .. }
            ));
        }
    }

    #[test]
    fn cascade_policy_rejects_every_later_step() {
        let engine = ApprovalEngine::new(RequiredRoleMatcher, RejectionPolicy::CascadeRejection);
        let chain = three_completed();
        let at = t0() + Duration::hours(3);

        let rejected = engine
            .apply(&chain, Decision::Reject, &approver("comptabilite"), "", at)
            .expect("reject on pending chain");

        let fifth = rejected.step(5).expect("step 5");
        assert_eq!(fifth.status, ApprovalStatus::Rejected);
        assert_eq!(fifth.completed_at, Some(at));
        assert!(fifth.validator.is_none());
        assert_eq!(rejected.count(ApprovalStatus::Rejected), 2);
        assert_eq!(rejected.progress(), 60);
    }

    #[test]
    fn fully_approved_chain_is_completed_and_frozen() {
        let engine = engine();
        let mut chain = three_completed();
        chain = engine
            .apply(&chain, Decision::Approve, &approver("comptabilite"), "", t0())
            .expect("step 4");
        chain = engine
            .apply(&chain, Decision::Approve, &approver("directeur"), "", t0())
            .expect("step 5");

        assert!(chain.active_step().is_none());
        assert_eq!(chain.progress(), 100);
        assert_eq!(chain.overall_status(), ApprovalStatus::Completed);

        let error = engine
            .apply(&chain, Decision::Approve, &approver("directeur"), "", t0())
            .expect_err("completed chain is frozen");
        assert!(matches!(
            error,
            DomainError::InvalidTransition { chain_status: ApprovalStatus::Completed, .. }
        ));
    }

    #[test]
    fn progress_never_decreases_and_completes_on_last_step() {
        let engine = engine();
        let mut chain = fresh_chain();
        let mut last_progress = chain.progress();
        let total = chain.len();

        for index in 0..total {
            let active = chain.active_step().expect("pending chain has an active step");
            assert_eq!(active.id as usize, index + 1, "active step is the lowest pending id");
            assert_eq!(chain.overall_status(), ApprovalStatus::Pending);

            let role = active.required_role.clone().unwrap_or_default();
            chain = engine
                .apply(&chain, Decision::Approve, &approver(&role), "", t0())
                .expect("approve active step");

            assert!(chain.progress() >= last_progress);
            last_progress = chain.progress();
        }

        assert_eq!(chain.overall_status(), ApprovalStatus::Completed);
        assert_eq!(last_progress, 100);
    }

    #[test]
    fn blank_approver_identity_fails_fast() {
        let error = engine()
            .apply(&fresh_chain(), Decision::Approve, &Approver::new("  ", "accueil"), "", t0())
            .expect_err("missing name");
        assert!(matches!(error, DomainError::InvalidArgument(ref message) if message.contains("name")));

        let error = engine()
            .apply(&fresh_chain(), Decision::Approve, &Approver::new("M. Sarr", ""), "", t0())
            .expect_err("missing role");
        assert!(matches!(error, DomainError::InvalidArgument(ref message) if message.contains("role")));
    }

    #[test]
    fn blank_comment_is_not_stored() {
        let chain = engine()
            .apply(&fresh_chain(), Decision::Approve, &approver("accueil"), "   ", t0())
            .expect("approve first step");
        assert!(chain.step(1).and_then(|step| step.comment.as_ref()).is_none());
    }

    #[test]
    fn can_act_uses_required_role_of_active_step() {
        let engine = engine();
        let chain = three_completed();

        assert!(engine.can_act(&chain, "comptabilite"));
        assert!(engine.can_act(&chain, " Comptabilite "));
        assert!(!engine.can_act(&chain, "directeur"));
        assert!(!engine.can_act(&chain, ""));
    }

    #[test]
    fn can_act_is_false_on_frozen_chain() {
        let engine = engine();
        let rejected = engine
            .apply(&three_completed(), Decision::Reject, &approver("comptabilite"), "", t0())
            .expect("reject");

        assert!(!engine.can_act(&rejected, "directeur"));
        assert!(!engine.can_act(&rejected, "comptabilite"));
    }

    #[test]
    fn title_substring_matcher_reproduces_legacy_rule() {
        let step = ApprovalStep::pending(4, "Service Comptabilité", None);

        assert!(TitleSubstringMatcher.matches(&step, "Service Comptabilité"));
        assert!(TitleSubstringMatcher.matches(&step, "comptabilité"));
        assert!(!TitleSubstringMatcher.matches(&step, "Direction"));
        assert!(!TitleSubstringMatcher.matches(&step, " "));
        assert!(!RequiredRoleMatcher.matches(&step, "comptabilite"));
    }

    #[test]
    fn closures_can_be_injected_as_matchers() {
        let engine = ApprovalEngine::new(
            |step: &ApprovalStep, role: &str| step.id == 4 && role == "vice_recteur",
            RejectionPolicy::default(),
        );
        let chain = three_completed();

        assert!(engine.can_act(&chain, "vice_recteur"));
        assert!(!engine.can_act(&chain, "comptabilite"));
    }

    #[test]
    fn configured_matching_dispatches_to_selected_rule() {
        let step = ApprovalStep::pending(2, "Service Scolarité", Some("scolarite".to_string()));

        assert!(RoleMatching::RequiredRole.matches(&step, "scolarite"));
        assert!(!RoleMatching::RequiredRole.matches(&step, "Scolarité"));
        assert!(RoleMatching::TitleSubstring.matches(&step, "Scolarité"));
    }

    #[test]
    fn decision_and_policy_parse_from_config_strings() {
        assert_eq!("Approve".parse::<Decision>().unwrap(), Decision::Approve);
        assert_eq!("rejected".parse::<Decision>().unwrap(), Decision::Reject);
        assert!("maybe".parse::<Decision>().is_err());
        assert_eq!(
            "cascade_rejection".parse::<RejectionPolicy>().unwrap(),
            RejectionPolicy::CascadeRejection
        );
        assert_eq!("title_substring".parse::<RoleMatching>().unwrap(), RoleMatching::TitleSubstring);
    }

    #[test]
    fn apply_with_audit_records_success_and_refusal() {
        let engine = engine();
        let sink = InMemoryAuditSink::default();
        let context = AuditContext::new(None, "req-9", "agent comptabilite");
        let chain = three_completed();

        let rejected = engine
            .apply_with_audit(
                &chain,
                Decision::Reject,
                &approver("comptabilite"),
                "incomplete file",
                t0(),
                &sink,
                &context,
            )
            .expect("reject");
        let _ = engine.apply_with_audit(
            &rejected,
            Decision::Approve,
            &approver("directeur"),
            "",
            t0(),
            &sink,
            &context,
        );

        let events = sink.events();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].event_type, "approval.decision_applied");
        assert_eq!(events[0].metadata.get("step_id").map(String::as_str), Some("4"));
        assert_eq!(events[0].metadata.get("overall_status").map(String::as_str), Some("rejected"));
        assert_eq!(events[1].event_type, "approval.decision_refused");
        assert_eq!(events[1].outcome, AuditOutcome::Rejected);
    }
}
