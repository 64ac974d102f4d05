pub mod approvals;
pub mod audit;
pub mod config;
pub mod domain;
pub mod errors;
pub mod notifications;
pub mod tracking;

pub use approvals::{
    ApprovalEngine, Decision, RejectionPolicy, RequiredRoleMatcher, RoleMatcher, RoleMatching,
    TitleSubstringMatcher,
};
pub use audit::{AuditContext, AuditEvent, AuditSink, InMemoryAuditSink, TracingAuditSink};
pub use domain::approval::{ApprovalChain, ApprovalStatus, ApprovalStep, Approver};
pub use domain::request::{RequestId, StudentId, ValidationRequest};
pub use domain::session::SessionContext;
pub use domain::template::{ChainTemplate, StepTemplate};
pub use errors::{ApplicationError, DomainError, InterfaceError};
pub use notifications::{Notification, NotificationId};
pub use tracking::TrackingSummary;
