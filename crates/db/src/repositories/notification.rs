use sqlx::sqlite::SqliteRow;
use sqlx::SqliteConnection;

use diplomas_core::domain::request::{RequestId, StudentId};
use diplomas_core::notifications::{Notification, NotificationId};

use super::request::{column, parse_timestamp};
use super::{NotificationRepository, RepositoryError};
use crate::DbPool;

pub struct SqlNotificationRepository {
    pool: DbPool,
}

impl SqlNotificationRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

fn row_to_notification(row: &SqliteRow) -> Result<Notification, RepositoryError> {
    let created_at: String = column(row, "created_at")?;
    let is_read: i64 = column(row, "is_read")?;

    Ok(Notification {
        id: NotificationId(column(row, "id")?),
        student_id: StudentId(column(row, "student_id")?),
        request_id: RequestId(column(row, "request_id")?),
        message: column(row, "message")?,
        created_at: parse_timestamp("created_at", &created_at)?,
        read: is_read != 0,
    })
}

/// Upserts `notification` on `conn`, so it can join a caller's transaction.
pub(crate) async fn write_notification(
    conn: &mut SqliteConnection,
    notification: &Notification,
) -> Result<(), RepositoryError> {
    sqlx::query(
        "INSERT INTO notification (id, student_id, request_id, message, created_at, is_read)
         VALUES (?, ?, ?, ?, ?, ?)
         ON CONFLICT(id) DO UPDATE SET
             message = excluded.message,
             is_read = excluded.is_read",
    )
    .bind(&notification.id.0)
    .bind(&notification.student_id.0)
    .bind(&notification.request_id.0)
    .bind(&notification.message)
    .bind(notification.created_at.to_rfc3339())
    .bind(notification.read)
    .execute(&mut *conn)
    .await?;

    Ok(())
}

#[async_trait::async_trait]
impl NotificationRepository for SqlNotificationRepository {
    async fn save(&self, notification: Notification) -> Result<(), RepositoryError> {
        let mut conn = self.pool.acquire().await?;
        write_notification(&mut conn, &notification).await
    }

    async fn list_for_student(
        &self,
        student_id: &StudentId,
        unread_only: bool,
    ) -> Result<Vec<Notification>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT id, student_id, request_id, message, created_at, is_read
             FROM notification
             WHERE student_id = ? AND (? = 0 OR is_read = 0)
             ORDER BY created_at DESC, id DESC",
        )
        .bind(&student_id.0)
        .bind(unread_only)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_notification).collect::<Result<Vec<_>, _>>()
    }

    async fn mark_read(&self, id: &NotificationId) -> Result<bool, RepositoryError> {
        let result = sqlx::query("UPDATE notification SET is_read = 1 WHERE id = ?")
            .bind(&id.0)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }
}
