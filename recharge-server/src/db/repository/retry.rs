//! Retry Repository
//!
//! 平台切换重试记录。领取走 status 0 -> 1 的原子 CAS，
//! 并发扫描下一条记录只会被执行一次。切换后的记录保持执行中，
//! 由提单回执通过 [`RetryRepository::complete_routed`] 收尾。

use super::{RepoError, RepoResult};
use shared::models::retry::{RetryRecord, RetryStatus, RetryType};
use shared::util::{now_millis, snowflake_id};
use sqlx::SqlitePool;

#[derive(Clone)]
pub struct RetryRepository {
    pool: SqlitePool,
}

impl RetryRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// 创建一条切换计划，记录调度时刻的已用 API 快照
    #[allow(clippy::too_many_arguments)]
    pub async fn create(
        &self,
        order_id: i64,
        retry_type: RetryType,
        status: RetryStatus,
        from_api_id: i64,
        retry_count: i64,
        next_retry_time: i64,
        used_apis_json: &str,
        remark: &str,
    ) -> RepoResult<RetryRecord> {
        let now = now_millis();
        let record = RetryRecord {
            id: snowflake_id(),
            order_id,
            retry_type,
            status,
            from_api_id,
            to_api_id: 0,
            to_api_param_id: 0,
            retry_count,
            next_retry_time,
            used_apis: used_apis_json.to_string(),
            remark: remark.to_string(),
            created_at: now,
            updated_at: now,
        };
        sqlx::query(
            r#"INSERT INTO order_retry_records
               (id, order_id, retry_type, status, from_api_id, to_api_id, to_api_param_id,
                retry_count, next_retry_time, used_apis, remark, created_at, updated_at)
               VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"#,
        )
        .bind(record.id)
        .bind(record.order_id)
        .bind(record.retry_type)
        .bind(record.status)
        .bind(record.from_api_id)
        .bind(record.to_api_id)
        .bind(record.to_api_param_id)
        .bind(record.retry_count)
        .bind(record.next_retry_time)
        .bind(&record.used_apis)
        .bind(&record.remark)
        .bind(record.created_at)
        .bind(record.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(record)
    }

    pub async fn get(&self, id: i64) -> RepoResult<RetryRecord> {
        let record = sqlx::query_as::<_, RetryRecord>(
            "SELECT * FROM order_retry_records WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        record.ok_or_else(|| RepoError::NotFound(format!("retry record {id}")))
    }

    /// 到期的待执行记录
    pub async fn find_due(&self, now: i64, limit: i64) -> RepoResult<Vec<RetryRecord>> {
        let records = sqlx::query_as::<_, RetryRecord>(
            r#"SELECT * FROM order_retry_records
               WHERE status = ? AND next_retry_time <= ?
               ORDER BY next_retry_time ASC LIMIT ?"#,
        )
        .bind(RetryStatus::Pending)
        .bind(now)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(records)
    }

    /// 原子领取：待执行 -> 执行中
    pub async fn claim(&self, id: i64) -> RepoResult<bool> {
        let result = sqlx::query(
            "UPDATE order_retry_records SET status = ?, updated_at = ? WHERE id = ? AND status = ?",
        )
        .bind(RetryStatus::InProgress)
        .bind(now_millis())
        .bind(id)
        .bind(RetryStatus::Pending)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    /// 切换已执行，登记目标平台，等待提单结果
    pub async fn set_routing(
        &self,
        id: i64,
        to_api_id: i64,
        to_api_param_id: i64,
        remark: &str,
    ) -> RepoResult<()> {
        sqlx::query(
            r#"UPDATE order_retry_records
               SET to_api_id = ?, to_api_param_id = ?, remark = ?, updated_at = ?
               WHERE id = ?"#,
        )
        .bind(to_api_id)
        .bind(to_api_param_id)
        .bind(remark)
        .bind(now_millis())
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// 人工触发的计划标记为同平台强制重试
    pub async fn mark_manual(&self, id: i64) -> RepoResult<()> {
        sqlx::query(
            "UPDATE order_retry_records SET retry_type = ?, updated_at = ? WHERE id = ?",
        )
        .bind(RetryType::SamePlatform)
        .bind(now_millis())
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// 执行结果回写
    pub async fn complete(&self, id: i64, status: RetryStatus, remark: &str) -> RepoResult<()> {
        sqlx::query(
            "UPDATE order_retry_records SET status = ?, remark = ?, updated_at = ? WHERE id = ?",
        )
        .bind(status)
        .bind(remark)
        .bind(now_millis())
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// 按提单回执收尾：命中仍在执行中且目标为该 API 的记录
    pub async fn complete_routed(
        &self,
        order_id: i64,
        to_api_id: i64,
        status: RetryStatus,
        remark: &str,
    ) -> RepoResult<bool> {
        let result = sqlx::query(
            r#"UPDATE order_retry_records
               SET status = ?, remark = ?, updated_at = ?
               WHERE order_id = ? AND to_api_id = ? AND status = ?"#,
        )
        .bind(status)
        .bind(remark)
        .bind(now_millis())
        .bind(order_id)
        .bind(to_api_id)
        .bind(RetryStatus::InProgress)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// 订单是否已有未完结的切换计划（避免重复排程）
    pub async fn has_open_for_order(&self, order_id: i64) -> RepoResult<bool> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM order_retry_records WHERE order_id = ? AND status IN (?, ?)",
        )
        .bind(order_id)
        .bind(RetryStatus::Pending)
        .bind(RetryStatus::InProgress)
        .fetch_one(&self.pool)
        .await?;
        Ok(count > 0)
    }

    pub async fn find_by_order(&self, order_id: i64) -> RepoResult<Vec<RetryRecord>> {
        let records = sqlx::query_as::<_, RetryRecord>(
            "SELECT * FROM order_retry_records WHERE order_id = ? ORDER BY created_at ASC",
        )
        .bind(order_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(records)
    }
}
