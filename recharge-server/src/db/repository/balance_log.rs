//! Balance Log Repository
//!
//! 资金流水。插入走事务连接，UNIQUE(order_id, user_id, style)
//! 冲突以 Duplicate 上抛，由 ledger 判定幂等跳过。

use super::RepoResult;
use shared::models::balance_log::{BalanceLog, BalanceStyle};
use sqlx::{SqliteConnection, SqlitePool};

#[derive(Clone)]
pub struct BalanceLogRepository {
    pool: SqlitePool,
}

impl BalanceLogRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// 事务内写入流水，UNIQUE 冲突返回 Duplicate
    pub async fn insert_tx(conn: &mut SqliteConnection, log: &BalanceLog) -> RepoResult<()> {
        sqlx::query(
            r#"INSERT INTO balance_logs
               (id, user_id, order_id, style, direction, amount, before_balance, after_balance,
                operator, remark, created_at)
               VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"#,
        )
        .bind(log.id)
        .bind(log.user_id)
        .bind(log.order_id)
        .bind(log.style)
        .bind(log.direction)
        .bind(log.amount)
        .bind(log.before_balance)
        .bind(log.after_balance)
        .bind(&log.operator)
        .bind(&log.remark)
        .bind(log.created_at)
        .execute(&mut *conn)
        .await?;
        Ok(())
    }

    /// 事务内判断某类流水是否已入账（退款前确认确实扣过款）
    pub async fn exists_tx(
        conn: &mut SqliteConnection,
        order_id: i64,
        user_id: i64,
        style: BalanceStyle,
    ) -> RepoResult<bool> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM balance_logs WHERE order_id = ? AND user_id = ? AND style = ?",
        )
        .bind(order_id)
        .bind(user_id)
        .bind(style)
        .fetch_one(&mut *conn)
        .await?;
        Ok(count > 0)
    }

    pub async fn find_by_order(&self, order_id: i64) -> RepoResult<Vec<BalanceLog>> {
        let logs = sqlx::query_as::<_, BalanceLog>(
            "SELECT * FROM balance_logs WHERE order_id = ? ORDER BY created_at ASC",
        )
        .bind(order_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(logs)
    }

    pub async fn find_by_user(&self, user_id: i64, limit: i64) -> RepoResult<Vec<BalanceLog>> {
        let logs = sqlx::query_as::<_, BalanceLog>(
            "SELECT * FROM balance_logs WHERE user_id = ? ORDER BY created_at DESC LIMIT ?",
        )
        .bind(user_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(logs)
    }
}
