//! Order Repository
//!
//! 订单表读写。worker 抢占走 [`OrderRepository::claim_for_processing`]
//! 的原子 CAS，状态回写的事务变体接受外部连接。

use super::{RepoError, RepoResult};
use shared::models::order::{Order, OrderStatus};
use shared::util::now_millis;
use sqlx::{SqliteConnection, SqlitePool};

#[derive(Clone)]
pub struct OrderRepository {
    pool: SqlitePool,
}

impl OrderRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn insert(&self, order: &Order) -> RepoResult<()> {
        sqlx::query(
            r#"INSERT INTO orders
               (id, order_number, customer_id, product_id, mobile, denom, price, const_price,
                origin, status, platform_account_id, api_cur_id, api_cur_param_id, used_apis,
                remark, notify_url, create_time, finish_time, created_at, updated_at)
               VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"#,
        )
        .bind(order.id)
        .bind(&order.order_number)
        .bind(order.customer_id)
        .bind(order.product_id)
        .bind(&order.mobile)
        .bind(order.denom)
        .bind(order.price)
        .bind(order.const_price)
        .bind(order.origin)
        .bind(order.status)
        .bind(order.platform_account_id)
        .bind(order.api_cur_id)
        .bind(order.api_cur_param_id)
        .bind(&order.used_apis)
        .bind(&order.remark)
        .bind(&order.notify_url)
        .bind(order.create_time)
        .bind(order.finish_time)
        .bind(order.created_at)
        .bind(order.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn find_by_id(&self, id: i64) -> RepoResult<Option<Order>> {
        let order = sqlx::query_as::<_, Order>("SELECT * FROM orders WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(order)
    }

    pub async fn get(&self, id: i64) -> RepoResult<Order> {
        self.find_by_id(id)
            .await?
            .ok_or_else(|| RepoError::NotFound(format!("order {id}")))
    }

    pub async fn find_by_number(&self, order_number: &str) -> RepoResult<Option<Order>> {
        let order = sqlx::query_as::<_, Order>("SELECT * FROM orders WHERE order_number = ?")
            .bind(order_number)
            .fetch_optional(&self.pool)
            .await?;
        Ok(order)
    }

    /// 原子抢占：待充值 -> 处理中，同时锁定本轮候选 API
    ///
    /// 多 worker 对同一订单只有一个能成功（rows_affected == 1）。
    /// api_cur_id 条件防止在读取和抢占之间订单被切换到其他平台。
    pub async fn claim_for_processing(
        &self,
        id: i64,
        api_id: i64,
        api_param_id: i64,
    ) -> RepoResult<bool> {
        let result = sqlx::query(
            r#"UPDATE orders
               SET status = ?, api_cur_id = ?, api_cur_param_id = ?, updated_at = ?
               WHERE id = ? AND status = ? AND (api_cur_id = 0 OR api_cur_id = ?)"#,
        )
        .bind(OrderStatus::Processing)
        .bind(api_id)
        .bind(api_param_id)
        .bind(now_millis())
        .bind(id)
        .bind(OrderStatus::PendingRecharge)
        .bind(api_id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    /// 提单受理成功：处理中 -> 充值中并冻结成本价
    ///
    /// 成本价只在首次受理时写入，已冻结的值不被覆盖。状态条件
    /// 挡住提单期间已被并发终结（如失败回调）的订单，终态不可
    /// 复活；返回 false 表示本次回写没有生效。
    pub async fn mark_recharging(
        &self,
        id: i64,
        api_id: i64,
        api_param_id: i64,
        const_price: f64,
        used_apis_json: &str,
    ) -> RepoResult<bool> {
        let result = sqlx::query(
            r#"UPDATE orders
               SET status = ?, api_cur_id = ?, api_cur_param_id = ?,
                   const_price = CASE WHEN const_price = 0 THEN ? ELSE const_price END,
                   used_apis = ?, updated_at = ?
               WHERE id = ? AND status = ?"#,
        )
        .bind(OrderStatus::Recharging)
        .bind(api_id)
        .bind(api_param_id)
        .bind(const_price)
        .bind(used_apis_json)
        .bind(now_millis())
        .bind(id)
        .bind(OrderStatus::Processing)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    /// 回到待充值并回写已用 API 列表（提单被拒、人工放行）
    pub async fn return_to_pending(&self, id: i64, used_apis_json: &str) -> RepoResult<()> {
        sqlx::query(
            "UPDATE orders SET status = ?, used_apis = ?, updated_at = ? WHERE id = ?",
        )
        .bind(OrderStatus::PendingRecharge)
        .bind(used_apis_json)
        .bind(now_millis())
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// 平台切换：指向新 API 并回到待充值
    pub async fn switch_api(&self, id: i64, api_id: i64, api_param_id: i64) -> RepoResult<()> {
        sqlx::query(
            r#"UPDATE orders
               SET status = ?, api_cur_id = ?, api_cur_param_id = ?, updated_at = ?
               WHERE id = ?"#,
        )
        .bind(OrderStatus::PendingRecharge)
        .bind(api_id)
        .bind(api_param_id)
        .bind(now_millis())
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn update_status(&self, id: i64, status: OrderStatus) -> RepoResult<()> {
        sqlx::query("UPDATE orders SET status = ?, updated_at = ? WHERE id = ?")
            .bind(status)
            .bind(now_millis())
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// 事务内状态更新（与通知记录同事务落盘）
    pub async fn update_status_tx(
        conn: &mut SqliteConnection,
        id: i64,
        status: OrderStatus,
    ) -> RepoResult<()> {
        sqlx::query("UPDATE orders SET status = ?, updated_at = ? WHERE id = ?")
            .bind(status)
            .bind(now_millis())
            .bind(id)
            .execute(&mut *conn)
            .await?;
        Ok(())
    }

    /// 事务内读取订单
    pub async fn get_tx(conn: &mut SqliteConnection, id: i64) -> RepoResult<Order> {
        let order = sqlx::query_as::<_, Order>("SELECT * FROM orders WHERE id = ?")
            .bind(id)
            .fetch_optional(&mut *conn)
            .await?;
        order.ok_or_else(|| RepoError::NotFound(format!("order {id}")))
    }

    /// 事务内终态回写
    pub async fn finalize_tx(
        conn: &mut SqliteConnection,
        id: i64,
        status: OrderStatus,
        remark: &str,
        finish_time: i64,
    ) -> RepoResult<()> {
        sqlx::query(
            r#"UPDATE orders
               SET status = ?, remark = ?, finish_time = ?, updated_at = ?
               WHERE id = ?"#,
        )
        .bind(status)
        .bind(remark)
        .bind(finish_time)
        .bind(now_millis())
        .bind(id)
        .execute(&mut *conn)
        .await?;
        Ok(())
    }

    /// 充值中且长时间未更新的订单（卡单扫描）
    pub async fn find_stuck_recharging(&self, updated_before: i64) -> RepoResult<Vec<Order>> {
        let orders = sqlx::query_as::<_, Order>(
            "SELECT * FROM orders WHERE status = ? AND updated_at < ? ORDER BY updated_at LIMIT 100",
        )
        .bind(OrderStatus::Recharging)
        .bind(updated_before)
        .fetch_all(&self.pool)
        .await?;
        Ok(orders)
    }
}
