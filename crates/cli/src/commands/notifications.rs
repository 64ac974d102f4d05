use crate::commands::{
    application_failure, finish, open_service, prepare, CommandResult, Failure,
};
use diplomas_core::domain::request::StudentId;

pub fn run(student_id: &str, unread_only: bool) -> CommandResult {
    let (config, runtime) = match prepare("notifications") {
        Ok(prepared) => prepared,
        Err(result) => return result,
    };

    let result = runtime.block_on(async {
        let (pool, service) = open_service(&config).await?;
        let notices = service
            .notifications(&StudentId(student_id.trim().to_string()), unread_only)
            .await
            .map_err(application_failure);
        pool.close().await;

        let notices = notices?;
        Ok::<_, Failure>((format!("{} notification(s)", notices.len()), notices))
    });

    finish("notifications", result)
}
