use chrono::Utc;

use crate::commands::{
    application_failure, finish, open_service, prepare, CommandResult, Failure,
};
use diplomas_core::domain::request::{RequestId, StudentId};

/// Which request to summarize: an explicit id, or the student's latest one.
#[derive(Debug, Clone)]
pub enum StatusTarget {
    Request(String),
    LatestForStudent(String),
}

pub fn run(target: StatusTarget) -> CommandResult {
    let (config, runtime) = match prepare("status") {
        Ok(prepared) => prepared,
        Err(result) => return result,
    };

    let result = runtime.block_on(async {
        let (pool, service) = open_service(&config).await?;
        let summary = async {
            let request_id = match &target {
                StatusTarget::Request(id) => RequestId(id.trim().to_string()),
                StatusTarget::LatestForStudent(student) => {
                    service.latest_for_student(&StudentId(student.trim().to_string())).await?.id
                }
            };
            service.tracking(&request_id, Utc::now()).await
        }
        .await
        .map_err(application_failure);
        pool.close().await;

        let summary = summary?;
        let message = format!(
            "{} is {} ({}% signed, {} of {} signatures)",
            summary.request_id.0,
            summary.status.as_str(),
            summary.progress,
            summary.counts.obtained,
            summary.counts.total
        );
        Ok::<_, Failure>((message, summary))
    });

    finish("status", result)
}
