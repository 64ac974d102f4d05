pub mod config;
pub mod decide;
pub mod migrate;
pub mod notifications;
pub mod pending;
pub mod seed;
pub mod status;
pub mod submit;

use serde::Serialize;
use serde_json::Value;
use tokio::runtime::Runtime;

use diplomas_core::config::{AppConfig, LoadOptions};
use diplomas_core::errors::{ApplicationError, DomainError};
use diplomas_db::{connect_with_config, migrations, DbPool, DecisionService};

#[derive(Debug, Clone)]
pub struct CommandResult {
    pub exit_code: u8,
    pub output: String,
}

#[derive(Debug, Serialize)]
struct CommandOutcome {
    command: String,
    status: String,
    error_class: Option<String>,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<Value>,
}

impl CommandResult {
    pub fn success(command: &str, message: impl Into<String>) -> Self {
        let payload = CommandOutcome {
            command: command.to_string(),
            status: "ok".to_string(),
            error_class: None,
            message: message.into(),
            data: None,
        };
        Self { exit_code: 0, output: serialize_payload(payload) }
    }

    /// Success carrying a serialized record under `data`.
    pub fn success_with_data<T: Serialize>(
        command: &str,
        message: impl Into<String>,
        data: &T,
    ) -> Self {
        match serde_json::to_value(data) {
            Ok(value) => {
                let payload = CommandOutcome {
                    command: command.to_string(),
                    status: "ok".to_string(),
                    error_class: None,
                    message: message.into(),
                    data: Some(value),
                };
                Self { exit_code: 0, output: serialize_payload(payload) }
            }
            Err(error) => Self::failure(command, "serialization", error.to_string(), 1),
        }
    }

    pub fn failure(
        command: &str,
        error_class: &str,
        message: impl Into<String>,
        exit_code: u8,
    ) -> Self {
        let payload = CommandOutcome {
            command: command.to_string(),
            status: "error".to_string(),
            error_class: Some(error_class.to_string()),
            message: message.into(),
            data: None,
        };
        Self { exit_code, output: serialize_payload(payload) }
    }

    fn from_failure(command: &str, failure: Failure) -> Self {
        let (error_class, message, exit_code) = failure;
        Self::failure(command, error_class, message, exit_code)
    }
}

fn serialize_payload(payload: CommandOutcome) -> String {
    serde_json::to_string(&payload).unwrap_or_else(|error| {
        format!(
            "{{\"command\":\"unknown\",\"status\":\"error\",\"error_class\":\"serialization\",\"message\":\"{}\"}}",
            error.to_string().replace('\\', "\\\\").replace('"', "\\\"")
        )
    })
}

/// `(error_class, message, exit_code)` collected inside a command's async block.
pub(crate) type Failure = (&'static str, String, u8);

/// Loads config and a current-thread runtime, the two steps every database command starts with.
pub(crate) fn prepare(command: &str) -> Result<(AppConfig, Runtime), CommandResult> {
    let config = AppConfig::load(LoadOptions::default()).map_err(|error| {
        CommandResult::failure(
            command,
            "config_validation",
            format!("configuration issue: {error}"),
            2,
        )
    })?;

    let runtime =
        tokio::runtime::Builder::new_current_thread().enable_all().build().map_err(|error| {
            CommandResult::failure(
                command,
                "runtime_init",
                format!("failed to initialize async runtime: {error}"),
                3,
            )
        })?;

    Ok((config, runtime))
}

/// Connects and applies pending migrations.
pub(crate) async fn open_pool(config: &AppConfig) -> Result<DbPool, Failure> {
    let pool = connect_with_config(&config.database)
        .await
        .map_err(|error| ("db_connectivity", error.to_string(), 4u8))?;
    migrations::run_pending(&pool)
        .await
        .map_err(|error| ("migration", error.to_string(), 5u8))?;
    Ok(pool)
}

pub(crate) async fn open_service(
    config: &AppConfig,
) -> Result<(DbPool, DecisionService), Failure> {
    let pool = open_pool(config).await?;
    let service = DecisionService::sqlite(pool.clone(), &config.workflow);
    Ok((pool, service))
}

pub(crate) fn application_failure(error: ApplicationError) -> Failure {
    let message = error.to_string();
    match error {
        ApplicationError::Domain(DomainError::InvariantViolation(_)) => {
            ("invariant_violation", message, 11)
        }
        ApplicationError::Domain(_) => ("invalid_request", message, 7),
        ApplicationError::NotFound(_) => ("not_found", message, 8),
        ApplicationError::NotAuthorized { .. } => ("forbidden", message, 9),
        ApplicationError::ConcurrencyConflict { .. } => ("conflict", message, 10),
        ApplicationError::Persistence(_) => ("persistence", message, 4),
        ApplicationError::Configuration(_) => ("config_validation", message, 2),
    }
}

/// Finishes a command whose async block yielded `(message, record)`.
pub(crate) fn finish<T: Serialize>(
    command: &str,
    result: Result<(String, T), Failure>,
) -> CommandResult {
    match result {
        Ok((message, data)) => CommandResult::success_with_data(command, message, &data),
        Err(failure) => CommandResult::from_failure(command, failure),
    }
}

#[cfg(test)]
mod tests {
    use diplomas_core::domain::approval::ApprovalStatus;
    use diplomas_core::errors::{ApplicationError, DomainError};
    use serde_json::Value;

    use super::{application_failure, CommandResult};

    #[test]
    fn failure_payload_carries_error_class_without_data() {
        let result = CommandResult::failure("decide", "conflict", "reload first", 10);
        let payload: Value = serde_json::from_str(&result.output).expect("json");

        assert_eq!(result.exit_code, 10);
        assert_eq!(payload["status"], "error");
        assert_eq!(payload["error_class"], "conflict");
        assert!(payload.get("data").is_none());
    }

    #[test]
    fn success_payload_embeds_record() {
        let result = CommandResult::success_with_data("status", "found", &vec![1, 2]);
        let payload: Value = serde_json::from_str(&result.output).expect("json");

        assert_eq!(payload["status"], "ok");
        assert_eq!(payload["data"][1], 2);
    }

    #[test]
    fn application_errors_get_distinct_exit_codes() {
        let frozen = ApplicationError::from(DomainError::InvalidTransition {
            chain_status: ApprovalStatus::Rejected,
            reason: "chain is frozen".to_string(),
        });
        let conflict = ApplicationError::ConcurrencyConflict {
            request_id: "VR-1".to_string(),
            expected_version: 2,
        };

        assert_eq!(application_failure(frozen).0, "invalid_request");
        assert_eq!(application_failure(conflict).2, 10);
        assert_eq!(application_failure(ApplicationError::NotFound("x".to_string())).2, 8);
    }
}
