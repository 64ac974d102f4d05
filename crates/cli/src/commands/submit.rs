use chrono::Utc;
use uuid::Uuid;

use crate::commands::{
    application_failure, finish, open_service, prepare, CommandResult, Failure,
};
use diplomas_core::domain::request::StudentId;

pub fn run(student_id: &str) -> CommandResult {
    let (config, runtime) = match prepare("submit") {
        Ok(prepared) => prepared,
        Err(result) => return result,
    };

    let result = runtime.block_on(async {
        let (pool, service) = open_service(&config).await?;
        let correlation_id = format!("cli-{}", Uuid::new_v4().simple());
        let submitted = service
            .submit(StudentId(student_id.trim().to_string()), &correlation_id, Utc::now())
            .await
            .map_err(application_failure);
        pool.close().await;

        let request = submitted?;
        Ok::<_, Failure>((format!("submitted {} for {}", request.id.0, request.student_id.0), request))
    });

    finish("submit", result)
}
