use axum::{extract::State, http::StatusCode, routing::get, Json, Router};
use chrono::Utc;
use diplomas_db::DbPool;
use serde::Serialize;

#[derive(Clone)]
pub struct HealthState {
    db_pool: DbPool,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct HealthCheck {
    pub status: &'static str,
    pub detail: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub service: HealthCheck,
    pub database: HealthCheck,
    pub pending_requests: Option<i64>,
    pub checked_at: String,
}

pub fn router(db_pool: DbPool) -> Router {
    Router::new().route("/health", get(health)).with_state(HealthState { db_pool })
}

pub async fn health(State(state): State<HealthState>) -> (StatusCode, Json<HealthResponse>) {
    let (database, pending_requests) = database_check(&state.db_pool).await;
    let ready = database.status == "ready";

    let payload = HealthResponse {
        status: if ready { "ready" } else { "degraded" },
        service: HealthCheck {
            status: "ready",
            detail: "diplomas-server runtime initialized".to_string(),
        },
        database,
        pending_requests,
        checked_at: Utc::now().to_rfc3339(),
    };

    let status_code = if ready { StatusCode::OK } else { StatusCode::SERVICE_UNAVAILABLE };
    (status_code, Json(payload))
}

/// Reads the pending backlog, which also proves the schema is migrated.
async fn database_check(pool: &DbPool) -> (HealthCheck, Option<i64>) {
    let backlog = sqlx::query_scalar::<_, i64>(
        "SELECT COUNT(1) FROM validation_request WHERE status = 'pending'",
    )
    .fetch_one(pool)
    .await;

    match backlog {
        Ok(count) => (
            HealthCheck { status: "ready", detail: "database query succeeded".to_string() },
            Some(count),
        ),
        Err(error) => (
            HealthCheck { status: "degraded", detail: format!("database query failed: {error}") },
            None,
        ),
    }
}
