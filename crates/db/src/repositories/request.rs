use chrono::{DateTime, Utc};
use sqlx::sqlite::{Sqlite, SqliteRow};
use sqlx::{Row, SqliteConnection};

use diplomas_core::domain::approval::{ApprovalChain, ApprovalStatus, ApprovalStep, Approver};
use diplomas_core::domain::request::{RequestId, StudentId, ValidationRequest};

use super::{RepositoryError, ValidationRequestRepository};
use crate::DbPool;

pub struct SqlValidationRequestRepository {
    pool: DbPool,
}

impl SqlValidationRequestRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

/// Rows are read on `conn`; callers pass a transaction so the request row and
/// its steps come from the same snapshot.
async fn load_chain(
    conn: &mut SqliteConnection,
    request_id: &str,
) -> Result<ApprovalChain, RepositoryError> {
    let rows = sqlx::query(
        "SELECT step_id, title, required_role, status, validator_name, validator_role,
                completed_at, comment
         FROM approval_step WHERE request_id = ? ORDER BY step_id ASC",
    )
    .bind(request_id)
    .fetch_all(&mut *conn)
    .await?;

    let steps = rows.iter().map(row_to_step).collect::<Result<Vec<_>, _>>()?;
    ApprovalChain::from_steps(steps)
        .map_err(|error| RepositoryError::Decode(format!("request `{request_id}`: {error}")))
}

async fn hydrate(
    conn: &mut SqliteConnection,
    row: &SqliteRow,
) -> Result<ValidationRequest, RepositoryError> {
    let id: String = column(row, "id")?;
    let student_id: String = column(row, "student_id")?;
    let version: i64 = column(row, "version")?;
    let submitted_at: String = column(row, "submitted_at")?;
    let updated_at: String = column(row, "updated_at")?;
    let chain = load_chain(conn, &id).await?;

    Ok(ValidationRequest {
        id: RequestId(id),
        student_id: StudentId(student_id),
        chain,
        version: from_db_version(version)?,
        submitted_at: parse_timestamp("submitted_at", &submitted_at)?,
        updated_at: parse_timestamp("updated_at", &updated_at)?,
    })
}

async fn hydrate_all(
    conn: &mut SqliteConnection,
    rows: Vec<SqliteRow>,
) -> Result<Vec<ValidationRequest>, RepositoryError> {
    let mut requests = Vec::with_capacity(rows.len());
    for row in &rows {
        requests.push(hydrate(conn, row).await?);
    }
    Ok(requests)
}

pub(super) fn column<'r, T>(row: &'r SqliteRow, name: &str) -> Result<T, RepositoryError>
where
    T: sqlx::Decode<'r, Sqlite> + sqlx::Type<Sqlite>,
{
    row.try_get(name).map_err(|e| RepositoryError::Decode(e.to_string()))
}

pub(super) fn parse_timestamp(column: &str, value: &str) -> Result<DateTime<Utc>, RepositoryError> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| RepositoryError::Decode(format!("{column} `{value}`: {e}")))
}

fn to_db_version(version: u64) -> Result<i64, RepositoryError> {
    i64::try_from(version)
        .map_err(|_| RepositoryError::Decode(format!("version {version} does not fit sqlite")))
}

fn from_db_version(version: i64) -> Result<u64, RepositoryError> {
    u64::try_from(version)
        .map_err(|_| RepositoryError::Decode(format!("negative version {version}")))
}

fn row_to_step(row: &SqliteRow) -> Result<ApprovalStep, RepositoryError> {
    let step_id: i64 = column(row, "step_id")?;
    let status: String = column(row, "status")?;
    let validator_name: Option<String> = column(row, "validator_name")?;
    let validator_role: Option<String> = column(row, "validator_role")?;
    let completed_at: Option<String> = column(row, "completed_at")?;

    let validator = match (validator_name, validator_role) {
        (Some(name), Some(role)) => Some(Approver { name, role }),
        (None, None) => None,
        _ => {
            return Err(RepositoryError::Decode(format!(
                "step {step_id} has a partial validator identity"
            )))
        }
    };

    Ok(ApprovalStep {
        id: u32::try_from(step_id)
            .map_err(|_| RepositoryError::Decode(format!("invalid step id {step_id}")))?,
        title: column(row, "title")?,
        required_role: column(row, "required_role")?,
        status: status
            .parse::<ApprovalStatus>()
            .map_err(|e| RepositoryError::Decode(e.to_string()))?,
        validator,
        completed_at: completed_at
            .as_deref()
            .map(|value| parse_timestamp("completed_at", value))
            .transpose()?,
        comment: column(row, "comment")?,
    })
}

async fn write_step(
    conn: &mut SqliteConnection,
    request_id: &RequestId,
    step: &ApprovalStep,
) -> Result<(), RepositoryError> {
    sqlx::query(
        "INSERT INTO approval_step (request_id, step_id, title, required_role, status,
                                    validator_name, validator_role, completed_at, comment)
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
         ON CONFLICT(request_id, step_id) DO UPDATE SET
             status = excluded.status,
             validator_name = excluded.validator_name,
             validator_role = excluded.validator_role,
             completed_at = excluded.completed_at,
             comment = excluded.comment",
    )
    .bind(&request_id.0)
    .bind(i64::from(step.id))
    .bind(&step.title)
    .bind(&step.required_role)
    .bind(step.status.as_str())
    .bind(step.validator.as_ref().map(|validator| validator.name.as_str()))
    .bind(step.validator.as_ref().map(|validator| validator.role.as_str()))
    .bind(step.completed_at.map(|at| at.to_rfc3339()))
    .bind(&step.comment)
    .execute(&mut *conn)
    .await?;

    Ok(())
}

/// Writes a new request row and its steps on `conn`. The caller owns the transaction.
pub(crate) async fn insert_request(
    conn: &mut SqliteConnection,
    request: &ValidationRequest,
) -> Result<(), RepositoryError> {
    let inserted = sqlx::query(
        "INSERT INTO validation_request (id, student_id, status, version, submitted_at,
                                         updated_at)
         VALUES (?, ?, ?, ?, ?, ?)",
    )
    .bind(&request.id.0)
    .bind(&request.student_id.0)
    .bind(request.status().as_str())
    .bind(to_db_version(request.version)?)
    .bind(request.submitted_at.to_rfc3339())
    .bind(request.updated_at.to_rfc3339())
    .execute(&mut *conn)
    .await;

    if let Err(error) = inserted {
        let duplicate =
            error.as_database_error().is_some_and(|db_error| db_error.is_unique_violation());
        return Err(if duplicate {
            RepositoryError::AlreadyExists(request.id.0.clone())
        } else {
            RepositoryError::Database(error)
        });
    }

    for step in request.chain.steps() {
        write_step(conn, &request.id, step).await?;
    }
    Ok(())
}

const SELECT_REQUEST: &str =
    "SELECT id, student_id, version, submitted_at, updated_at FROM validation_request";

#[async_trait::async_trait]
impl ValidationRequestRepository for SqlValidationRequestRepository {
    async fn find_by_id(
        &self,
        id: &RequestId,
    ) -> Result<Option<ValidationRequest>, RepositoryError> {
        let mut tx = self.pool.begin().await?;
        let row = sqlx::query(&format!("{SELECT_REQUEST} WHERE id = ?"))
            .bind(&id.0)
            .fetch_optional(&mut *tx)
            .await?;

        let request = match row {
            Some(ref r) => Some(hydrate(&mut tx, r).await?),
            None => None,
        };
        tx.commit().await?;
        Ok(request)
    }

    async fn list(
        &self,
        status: Option<ApprovalStatus>,
        limit: u32,
    ) -> Result<Vec<ValidationRequest>, RepositoryError> {
        let status = status.map(|status| status.as_str());
        let mut tx = self.pool.begin().await?;
        let rows = sqlx::query(&format!(
            "{SELECT_REQUEST} WHERE (? IS NULL OR status = ?)
             ORDER BY submitted_at ASC, id ASC LIMIT ?"
        ))
        .bind(status)
        .bind(status)
        .bind(i64::from(limit))
        .fetch_all(&mut *tx)
        .await?;

        let requests = hydrate_all(&mut tx, rows).await?;
        tx.commit().await?;
        Ok(requests)
    }

    async fn list_for_student(
        &self,
        student_id: &StudentId,
    ) -> Result<Vec<ValidationRequest>, RepositoryError> {
        let mut tx = self.pool.begin().await?;
        let rows = sqlx::query(&format!(
            "{SELECT_REQUEST} WHERE student_id = ? ORDER BY submitted_at DESC, id DESC"
        ))
        .bind(&student_id.0)
        .fetch_all(&mut *tx)
        .await?;
        let requests = hydrate_all(&mut tx, rows).await?;
        tx.commit().await?;
        Ok(requests)
    }

    async fn insert(&self, request: ValidationRequest) -> Result<(), RepositoryError> {
        let mut tx = self.pool.begin().await?;
        insert_request(&mut tx, &request).await?;
        tx.commit().await?;
        Ok(())
    }

    async fn save_versioned(
        &self,
        request: ValidationRequest,
        expected_version: u64,
    ) -> Result<ValidationRequest, RepositoryError> {
        let next_version = expected_version.saturating_add(1);
        let mut tx = self.pool.begin().await?;

        let updated = sqlx::query(
            "UPDATE validation_request
             SET status = ?, version = ?, updated_at = ?
             WHERE id = ? AND version = ?",
        )
        .bind(request.status().as_str())
        .bind(to_db_version(next_version)?)
        .bind(request.updated_at.to_rfc3339())
        .bind(&request.id.0)
        .bind(to_db_version(expected_version)?)
        .execute(&mut *tx)
        .await?;

        if updated.rows_affected() == 0 {
            let current: Option<i64> =
                sqlx::query_scalar("SELECT version FROM validation_request WHERE id = ?")
                    .bind(&request.id.0)
                    .fetch_optional(&mut *tx)
                    .await?;
            tx.rollback().await?;

            return Err(match current {
                None => RepositoryError::NotFound(request.id.0.clone()),
                Some(actual) => RepositoryError::VersionConflict {
                    request_id: request.id.0.clone(),
                    expected: expected_version,
                    actual: from_db_version(actual)?,
                },
            });
        }

        for step in request.chain.steps() {
            write_step(&mut tx, &request.id, step).await?;
        }
        tx.commit().await?;

        Ok(ValidationRequest { version: next_version, ..request })
    }
}
