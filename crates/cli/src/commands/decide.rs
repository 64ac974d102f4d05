use chrono::Utc;
use uuid::Uuid;

use crate::commands::{
    application_failure, finish, open_service, prepare, CommandResult, Failure,
};
use diplomas_core::approvals::Decision;
use diplomas_core::domain::approval::Approver;
use diplomas_core::domain::request::RequestId;
use diplomas_core::domain::session::SessionContext;
use diplomas_db::DecisionCommand;

#[derive(Debug, Clone)]
pub struct DecideArgs {
    pub request_id: String,
    pub decision: String,
    pub approver_name: String,
    pub approver_role: String,
    pub comment: String,
    pub expected_version: Option<u64>,
    /// Total attempts when a concurrent write is detected; 1 disables retrying.
    pub attempts: u32,
}

pub fn run(args: DecideArgs) -> CommandResult {
    let decision = match args.decision.parse::<Decision>() {
        Ok(decision) => decision,
        Err(error) => {
            return CommandResult::failure("decide", "invalid_request", error.to_string(), 7)
        }
    };

    let (config, runtime) = match prepare("decide") {
        Ok(prepared) => prepared,
        Err(result) => return result,
    };

    let request_id = RequestId(args.request_id.trim().to_string());
    let mut command = DecisionCommand::new(request_id, decision, args.comment);
    command.expected_version = args.expected_version;
    let session = SessionContext::new(
        Approver::new(args.approver_name, args.approver_role),
        format!("cli-{}", Uuid::new_v4().simple()),
    );

    let result = runtime.block_on(async {
        let (pool, service) = open_service(&config).await?;
        let saved = service
            .decide_with_retry(&command, &session, Utc::now(), args.attempts.max(1))
            .await
            .map_err(application_failure);
        pool.close().await;

        let request = saved?;
        let message = format!(
            "{} recorded on {}: chain is {} at {}%",
            decision.as_str(),
            request.id.0,
            request.status().as_str(),
            request.chain.progress()
        );
        Ok::<_, Failure>((message, request))
    });

    finish("decide", result)
}
