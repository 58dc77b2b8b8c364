//! Callback Log Repository
//!
//! 回调留存。UNIQUE(order_id, callback_type) 冲突以 Duplicate 上抛，
//! 回调对账层据此丢弃重复回调。

use super::RepoResult;
use shared::models::callback_log::CallbackLog;
use shared::util::{now_millis, snowflake_id};
use sqlx::{SqliteConnection, SqlitePool};

#[derive(Clone)]
pub struct CallbackLogRepository {
    pool: SqlitePool,
}

impl CallbackLogRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// 事务内留存回调，重复回调返回 Duplicate
    pub async fn insert_tx(
        conn: &mut SqliteConnection,
        order_id: i64,
        callback_type: &str,
        platform: &str,
        platform_order_no: &str,
        raw: &str,
    ) -> RepoResult<CallbackLog> {
        let log = CallbackLog {
            id: snowflake_id(),
            order_id,
            callback_type: callback_type.to_string(),
            platform: platform.to_string(),
            platform_order_no: platform_order_no.to_string(),
            raw: raw.to_string(),
            created_at: now_millis(),
        };
        sqlx::query(
            r#"INSERT INTO callback_logs
               (id, order_id, callback_type, platform, platform_order_no, raw, created_at)
               VALUES (?, ?, ?, ?, ?, ?, ?)"#,
        )
        .bind(log.id)
        .bind(log.order_id)
        .bind(&log.callback_type)
        .bind(&log.platform)
        .bind(&log.platform_order_no)
        .bind(&log.raw)
        .bind(log.created_at)
        .execute(&mut *conn)
        .await?;
        Ok(log)
    }

    pub async fn find_by_order(&self, order_id: i64) -> RepoResult<Vec<CallbackLog>> {
        let logs = sqlx::query_as::<_, CallbackLog>(
            "SELECT * FROM callback_logs WHERE order_id = ? ORDER BY created_at ASC",
        )
        .bind(order_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(logs)
    }
}
