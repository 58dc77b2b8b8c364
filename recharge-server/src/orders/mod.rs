//! 订单服务
//!
//! 订单生命周期的入口：创建、支付确认入队、终态落盘。
//!
//! 终态落盘在单个写事务内完成「退款 -> 状态回写 -> 通知记录」，
//! 三者要么同时生效要么同时回滚。退款只在订单确实扣过款时发生，
//! 外部预扣款订单例外（款项在上游收取，失败同样退给绑定账户）。
//! 重复落盘被终态检查与流水唯一约束双重挡住。

use crate::db::repository::{
    BalanceLogRepository, NotificationRepository, OrderRepository, PlatformApiRepository,
    ProductRepository, RepoError, UserRepository,
};
use crate::ledger::{LedgerError, LedgerService};
use crate::queue::{QueueError, TaskQueue};
use shared::models::balance_log::BalanceStyle;
use shared::models::notification::{NotificationRecord, NotificationStatus};
use shared::models::order::{Order, OrderCreate, OrderOrigin, OrderStatus};
use shared::util::{now_millis, order_number, snowflake_id};
use sqlx::{SqliteConnection, SqlitePool};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum OrderError {
    #[error("产品已下架: {0}")]
    ProductDisabled(i64),

    #[error("账户已停用: {0}")]
    UserDisabled(i64),

    #[error("平台资金账号已停用: {0}")]
    PlatformAccountDisabled(i64),

    #[error("订单状态不允许该操作: {0}")]
    InvalidState(String),

    #[error(transparent)]
    Ledger(#[from] LedgerError),

    #[error(transparent)]
    Repo(#[from] RepoError),

    #[error(transparent)]
    Queue(#[from] QueueError),
}

pub type OrderResult<T> = Result<T, OrderError>;

#[derive(Clone)]
pub struct OrderService {
    pool: SqlitePool,
    orders: OrderRepository,
    users: UserRepository,
    products: ProductRepository,
    platform_accounts: PlatformApiRepository,
    queue: TaskQueue,
}

impl OrderService {
    pub fn new(pool: SqlitePool, queue: TaskQueue) -> Self {
        Self {
            orders: OrderRepository::new(pool.clone()),
            users: UserRepository::new(pool.clone()),
            products: ProductRepository::new(pool.clone()),
            platform_accounts: PlatformApiRepository::new(pool.clone()),
            queue,
            pool,
        }
    }

    pub fn repository(&self) -> &OrderRepository {
        &self.orders
    }

    /// 创建订单
    ///
    /// 平台订单落在待支付，等 [`confirm_payment`] 扣款后入队；
    /// 外部订单已预扣款，直接进入待充值并入队。外部订单带平台
    /// 资金账号时，账号绑定的内部用户作为记账主体（退款退给它）。
    ///
    /// [`confirm_payment`]: OrderService::confirm_payment
    pub async fn create(&self, mut req: OrderCreate) -> OrderResult<Order> {
        let product = self.products.get(req.product_id).await?;
        if product.disabled != 0 {
            return Err(OrderError::ProductDisabled(product.id));
        }
        if req.origin == OrderOrigin::External && req.platform_account_id != 0 {
            let account = self
                .platform_accounts
                .get_account(req.platform_account_id)
                .await?;
            if account.disabled != 0 {
                return Err(OrderError::PlatformAccountDisabled(account.id));
            }
            req.customer_id = account.bind_user_id;
        }
        let user = self.users.get(req.customer_id).await?;
        if user.disabled != 0 {
            return Err(OrderError::UserDisabled(user.id));
        }

        let now = now_millis();
        let status = match req.origin {
            OrderOrigin::Platform => OrderStatus::PendingPayment,
            OrderOrigin::External => OrderStatus::PendingRecharge,
        };
        let order = Order {
            id: snowflake_id(),
            order_number: order_number(),
            customer_id: req.customer_id,
            product_id: req.product_id,
            mobile: req.mobile,
            denom: req.denom,
            price: req.price,
            const_price: 0.0,
            origin: req.origin,
            status,
            platform_account_id: req.platform_account_id,
            api_cur_id: 0,
            api_cur_param_id: 0,
            used_apis: "[]".to_string(),
            remark: String::new(),
            notify_url: req.notify_url.unwrap_or_default(),
            create_time: now,
            finish_time: None,
            created_at: now,
            updated_at: now,
        };
        self.orders.insert(&order).await?;

        if order.status == OrderStatus::PendingRecharge {
            self.queue.push(order.id)?;
        }
        tracing::info!(
            order_id = order.id,
            order_number = %order.order_number,
            origin = ?order.origin,
            "Order created"
        );
        Ok(order)
    }

    /// 支付确认：转待充值 + 通知记录同事务落盘，随后入队
    ///
    /// 实际扣款由编排器在提单前幂等执行，额度不足在那一步失败。
    pub async fn confirm_payment(&self, order_id: i64) -> OrderResult<Order> {
        let order = self.orders.get(order_id).await?;
        if order.status != OrderStatus::PendingPayment {
            return Err(OrderError::InvalidState(format!(
                "order {} is {}, expected pending_payment",
                order_id, order.status
            )));
        }

        let mut tx = self.pool.begin().await.map_err(RepoError::from)?;
        OrderRepository::update_status_tx(&mut tx, order_id, OrderStatus::PendingRecharge).await?;
        Self::insert_notification_tx(&mut tx, &order, OrderStatus::PendingRecharge, "支付确认")
            .await?;
        tx.commit().await.map_err(RepoError::from)?;
        self.queue.push(order_id)?;

        tracing::info!(order_id, "Order payment confirmed, enqueued for recharge");
        self.orders.get(order_id).await.map_err(Into::into)
    }

    /// 订单失败终态（独立事务）
    ///
    /// 返回 false 表示订单已在终态，本次为 no-op。
    pub async fn process_order_fail(&self, order_id: i64, reason: &str) -> OrderResult<bool> {
        let mut tx = self.pool.begin().await.map_err(RepoError::from)?;
        let order = OrderRepository::get_tx(&mut tx, order_id).await?;
        if order.status.is_terminal() {
            tracing::debug!(order_id, status = %order.status, "Order already terminal, skip fail");
            return Ok(false);
        }

        Self::finalize_fail_tx(&mut tx, &order, reason).await?;
        tx.commit().await.map_err(RepoError::from)?;

        tracing::warn!(order_id, reason, "Order failed and refunded");
        Ok(true)
    }

    /// 订单成功终态（独立事务）
    pub async fn complete_success(&self, order_id: i64, remark: &str) -> OrderResult<bool> {
        let mut tx = self.pool.begin().await.map_err(RepoError::from)?;
        let order = OrderRepository::get_tx(&mut tx, order_id).await?;
        if order.status.is_terminal() {
            tracing::debug!(order_id, status = %order.status, "Order already terminal, skip success");
            return Ok(false);
        }

        Self::finalize_success_tx(&mut tx, &order, remark).await?;
        tx.commit().await.map_err(RepoError::from)?;

        tracing::info!(order_id, "Order completed successfully");
        Ok(true)
    }

    /// 非终态状态变更的通知记录
    pub(crate) async fn notify_status(
        &self,
        order: &Order,
        status: OrderStatus,
        remark: &str,
    ) -> OrderResult<()> {
        let mut conn = self.pool.acquire().await.map_err(RepoError::from)?;
        Self::insert_notification_tx(&mut conn, order, status, remark).await?;
        Ok(())
    }

    /// 事务内失败落盘：退款 + 终态 + 通知记录
    ///
    /// 未扣过款的平台订单（如在额度校验前就失败）不退款，
    /// 外部预扣款订单始终退款。
    pub(crate) async fn finalize_fail_tx(
        conn: &mut SqliteConnection,
        order: &Order,
        reason: &str,
    ) -> OrderResult<()> {
        let debited = BalanceLogRepository::exists_tx(
            conn,
            order.id,
            order.customer_id,
            BalanceStyle::OrderDeduct,
        )
        .await?;
        if debited || order.origin == OrderOrigin::External {
            LedgerService::refund_for_order_tx(
                conn,
                order.customer_id,
                order.id,
                order.price,
                &format!("订单退款 {}", order.order_number),
            )
            .await?;
        }
        OrderRepository::finalize_tx(conn, order.id, OrderStatus::Failed, reason, now_millis())
            .await?;
        Self::insert_notification_tx(conn, order, OrderStatus::Failed, reason).await?;
        Ok(())
    }

    /// 事务内成功落盘：终态 + 通知记录
    pub(crate) async fn finalize_success_tx(
        conn: &mut SqliteConnection,
        order: &Order,
        remark: &str,
    ) -> OrderResult<()> {
        OrderRepository::finalize_tx(conn, order.id, OrderStatus::Success, remark, now_millis())
            .await?;
        Self::insert_notification_tx(conn, order, OrderStatus::Success, remark).await?;
        Ok(())
    }

    async fn insert_notification_tx(
        conn: &mut SqliteConnection,
        order: &Order,
        status: OrderStatus,
        remark: &str,
    ) -> OrderResult<()> {
        let now = now_millis();
        let payload = serde_json::json!({
            "order_number": order.order_number,
            "status": status.as_str(),
            "mobile": order.mobile,
            "denom": order.denom,
            "remark": remark,
            "finish_time": now,
        });
        let record = NotificationRecord {
            id: snowflake_id(),
            order_id: order.id,
            customer_id: order.customer_id,
            notify_url: order.notify_url.clone(),
            payload: payload.to_string(),
            status: NotificationStatus::Pending,
            attempt_count: 0,
            last_error: String::new(),
            created_at: now,
            updated_at: now,
        };
        NotificationRepository::insert_tx(conn, &record).await?;
        Ok(())
    }
}
