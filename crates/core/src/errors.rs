use thiserror::Error;

use crate::domain::approval::ApprovalStatus;

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum DomainError {
    #[error("invalid transition on {chain_status:?} chain: {reason}")]
    InvalidTransition { chain_status: ApprovalStatus, reason: String },
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    #[error("domain invariant violation: {0}")]
    InvariantViolation(String),
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ApplicationError {
    #[error(transparent)]
    Domain(#[from] DomainError),
    #[error("request `{request_id}` changed since version {expected_version} was read")]
    ConcurrencyConflict { request_id: String, expected_version: u64 },
    #[error("not found: {0}")]
    NotFound(String),
    #[error("role `{approver_role}` may not act on step `{step_title}`")]
    NotAuthorized { approver_role: String, step_title: String },
    #[error("persistence failure: {0}")]
    Persistence(String),
    #[error("configuration failure: {0}")]
    Configuration(String),
}

impl ApplicationError {
    /// Conflicts are the only failure a caller should resolve by re-reading and retrying.
    pub fn is_retriable(&self) -> bool {
        matches!(self, Self::ConcurrencyConflict { .. })
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum InterfaceError {
    #[error("bad request: {message}")]
    BadRequest { message: String, correlation_id: String },
    #[error("not found: {message}")]
    NotFound { message: String, correlation_id: String },
    #[error("forbidden: {message}")]
    Forbidden { message: String, correlation_id: String },
    #[error("conflict: {message}")]
    Conflict { message: String, correlation_id: String },
    #[error("service unavailable: {message}")]
    ServiceUnavailable { message: String, correlation_id: String },
    #[error("internal error: {message}")]
    Internal { message: String, correlation_id: String },
}

impl InterfaceError {
    pub fn user_message(&self) -> &'static str {
        match self {
            Self::BadRequest { .. } => {
                "The request could not be processed. Refresh the request and try again."
            }
            Self::NotFound { .. } => "The requested validation record does not exist.",
            Self::Forbidden { .. } => "You are not the approver for the current step.",
            Self::Conflict { .. } => {
                "The request was updated by someone else. Reload it before deciding again."
            }
            Self::ServiceUnavailable { .. } => {
                "The service is temporarily unavailable. Please retry shortly."
            }
            Self::Internal { .. } => "An unexpected internal error occurred.",
        }
    }

    pub fn is_retriable(&self) -> bool {
        matches!(self, Self::Conflict { .. } | Self::ServiceUnavailable { .. })
    }

    pub fn correlation_id(&self) -> &str {
        match self {
            Self::BadRequest { correlation_id, .. }
            | Self::NotFound { correlation_id, .. }
            | Self::Forbidden { correlation_id, .. }
            | Self::Conflict { correlation_id, .. }
            | Self::ServiceUnavailable { correlation_id, .. }
            | Self::Internal { correlation_id, .. } => correlation_id,
        }
    }
}

impl ApplicationError {
    pub fn into_interface(self, correlation_id: impl Into<String>) -> InterfaceError {
        let correlation_id = correlation_id.into();
        let mut mapped = InterfaceError::from(self);
        match &mut mapped {
            InterfaceError::BadRequest { correlation_id: id, .. }
            | InterfaceError::NotFound { correlation_id: id, .. }
            | InterfaceError::Forbidden { correlation_id: id, .. }
            | InterfaceError::Conflict { correlation_id: id, .. }
            | InterfaceError::ServiceUnavailable { correlation_id: id, .. }
            | InterfaceError::Internal { correlation_id: id, .. } => *id = correlation_id,
        }
        mapped
    }
}

impl From<ApplicationError> for InterfaceError {
    fn from(value: ApplicationError) -> Self {
        let correlation_id = "unassigned".to_owned();
        match value {
            ApplicationError::Domain(DomainError::InvariantViolation(message)) => {
                Self::Internal { message, correlation_id }
            }
            ApplicationError::Domain(error) => {
                Self::BadRequest { message: error.to_string(), correlation_id }
            }
            error @ ApplicationError::ConcurrencyConflict { .. } => {
                Self::Conflict { message: error.to_string(), correlation_id }
            }
            ApplicationError::NotFound(message) => Self::NotFound { message, correlation_id },
            error @ ApplicationError::NotAuthorized { .. } => {
                Self::Forbidden { message: error.to_string(), correlation_id }
            }
            ApplicationError::Persistence(message) => {
                Self::ServiceUnavailable { message, correlation_id }
            }
            ApplicationError::Configuration(message) => Self::Internal { message, correlation_id },
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::domain::approval::ApprovalStatus;
    use crate::errors::{ApplicationError, DomainError, InterfaceError};

    #[test]
    fn invalid_transition_maps_to_bad_request() {
        let interface = ApplicationError::from(DomainError::InvalidTransition {
            chain_status: ApprovalStatus::Rejected,
            reason: "chain is frozen".to_owned(),
        })
        .into_interface("req-1");

        assert!(matches!(
            interface,
            InterfaceError::BadRequest { ref correlation_id, .. } if correlation_id == "req-1"
        ));
        assert!(!interface.is_retriable());
    }

    #[test]
    fn concurrency_conflict_is_retriable_conflict() {
        let error = ApplicationError::ConcurrencyConflict {
            request_id: "VR-1".to_owned(),
            expected_version: 3,
        };
        assert!(error.is_retriable());

        let interface = error.into_interface("req-2");
        assert!(matches!(interface, InterfaceError::Conflict { .. }));
        assert!(interface.is_retriable());
        assert_eq!(
            interface.user_message(),
            "The request was updated by someone else. Reload it before deciding again."
        );
    }

    #[test]
    fn not_authorized_maps_to_forbidden() {
        let interface = ApplicationError::NotAuthorized {
            approver_role: "comptabilite".to_owned(),
            step_title: "Service Scolarité".to_owned(),
        }
        .into_interface("req-3");

        assert!(matches!(interface, InterfaceError::Forbidden { .. }));
        assert_eq!(interface.correlation_id(), "req-3");
    }

    #[test]
    fn invariant_violation_is_internal_not_user_error() {
        let interface =
            ApplicationError::from(DomainError::InvariantViolation("gap in step ids".to_owned()))
                .into_interface("req-4");

        assert!(matches!(interface, InterfaceError::Internal { .. }));
        assert_eq!(interface.user_message(), "An unexpected internal error occurred.");
    }

    #[test]
    fn persistence_error_maps_to_service_unavailable() {
        let interface = ApplicationError::Persistence("database lock timeout".to_owned())
            .into_interface("req-5");

        assert!(matches!(interface, InterfaceError::ServiceUnavailable { .. }));
        assert!(interface.is_retriable());
    }
}
