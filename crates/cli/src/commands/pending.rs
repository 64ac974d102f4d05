use crate::commands::{
    application_failure, finish, open_service, prepare, CommandResult, Failure,
};
use diplomas_core::domain::approval::Approver;
use diplomas_core::domain::session::SessionContext;

pub fn run(approver_name: &str, approver_role: &str, limit: u32) -> CommandResult {
    let (config, runtime) = match prepare("pending") {
        Ok(prepared) => prepared,
        Err(result) => return result,
    };
    let session =
        SessionContext::with_generated_correlation(Approver::new(approver_name, approver_role));

    let result = runtime.block_on(async {
        let (pool, service) = open_service(&config).await?;
        let queue = service.actionable_for(&session, limit).await.map_err(application_failure);
        pool.close().await;

        let queue = queue?;
        let message =
            format!("{} request(s) waiting on role `{}`", queue.len(), session.approver.role);
        Ok::<_, Failure>((message, queue))
    });

    finish("pending", result)
}
