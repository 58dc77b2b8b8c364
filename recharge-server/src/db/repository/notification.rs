//! Notification Repository
//!
//! 终态通知记录。插入支持事务连接（跟随订单终态同事务落盘），
//! 投递状态由通知 worker 回写。

use super::RepoResult;
use shared::models::notification::{NotificationRecord, NotificationStatus};
use shared::util::now_millis;
use sqlx::{SqliteConnection, SqlitePool};

#[derive(Clone)]
pub struct NotificationRepository {
    pool: SqlitePool,
}

impl NotificationRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn insert_tx(conn: &mut SqliteConnection, record: &NotificationRecord) -> RepoResult<()> {
        sqlx::query(
            r#"INSERT INTO notification_records
               (id, order_id, customer_id, notify_url, payload, status, attempt_count,
                last_error, created_at, updated_at)
               VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"#,
        )
        .bind(record.id)
        .bind(record.order_id)
        .bind(record.customer_id)
        .bind(&record.notify_url)
        .bind(&record.payload)
        .bind(record.status)
        .bind(record.attempt_count)
        .bind(&record.last_error)
        .bind(record.created_at)
        .bind(record.updated_at)
        .execute(&mut *conn)
        .await?;
        Ok(())
    }

    /// 待投递记录（updated_at 升序，先到先投）
    pub async fn find_pending(&self, limit: i64) -> RepoResult<Vec<NotificationRecord>> {
        let records = sqlx::query_as::<_, NotificationRecord>(
            "SELECT * FROM notification_records WHERE status = ? ORDER BY updated_at ASC LIMIT ?",
        )
        .bind(NotificationStatus::Pending)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(records)
    }

    pub async fn mark_sent(&self, id: i64) -> RepoResult<()> {
        sqlx::query(
            "UPDATE notification_records SET status = ?, updated_at = ? WHERE id = ?",
        )
        .bind(NotificationStatus::Sent)
        .bind(now_millis())
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// 记一次失败尝试；达到上限后转 Failed
    pub async fn mark_attempt_failed(
        &self,
        id: i64,
        attempt_count: i64,
        max_attempts: i64,
        error: &str,
    ) -> RepoResult<()> {
        let status = if attempt_count >= max_attempts {
            NotificationStatus::Failed
        } else {
            NotificationStatus::Pending
        };
        sqlx::query(
            r#"UPDATE notification_records
               SET status = ?, attempt_count = ?, last_error = ?, updated_at = ?
               WHERE id = ?"#,
        )
        .bind(status)
        .bind(attempt_count)
        .bind(error)
        .bind(now_millis())
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn find_by_order(&self, order_id: i64) -> RepoResult<Vec<NotificationRecord>> {
        let records = sqlx::query_as::<_, NotificationRecord>(
            "SELECT * FROM notification_records WHERE order_id = ? ORDER BY created_at ASC",
        )
        .bind(order_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(records)
    }
}
