//! 平台切换重试
//!
//! 提单被拒时在这里排一条切换计划。首次切换立即到期，后续切换
//! 按配置退避。扫描器领取到期记录（status 0 -> 1 原子 CAS），
//! 选出下一个未用过的平台候选：有候选则把订单指向新平台并重新
//! 入队，记录保持执行中，等新平台的提单回执经
//! [`RetryService::resolve_routed`] 收尾；候选耗尽或切换次数达到
//! 上限则走订单失败终态（退款恰好一次）。

use crate::db::repository::{OrderRepository, ProductRepository, RetryRepository};
use crate::orders::{OrderResult, OrderService};
use crate::queue::TaskQueue;
use shared::models::order::OrderStatus;
use shared::models::retry::{RetryRecord, RetryStatus, RetryType};
use shared::util::now_millis;
use sqlx::SqlitePool;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

pub struct RetryService {
    retries: RetryRepository,
    orders: OrderRepository,
    products: ProductRepository,
    order_service: OrderService,
    queue: TaskQueue,
    /// 二次及以后切换的退避时间（毫秒）
    backoff_ms: i64,
    /// 单订单最大切换次数
    max_switches: i64,
}

impl RetryService {
    pub fn new(
        pool: SqlitePool,
        order_service: OrderService,
        queue: TaskQueue,
        backoff_ms: i64,
        max_switches: i64,
    ) -> Self {
        Self {
            retries: RetryRepository::new(pool.clone()),
            orders: OrderRepository::new(pool.clone()),
            products: ProductRepository::new(pool),
            order_service,
            queue,
            backoff_ms,
            max_switches,
        }
    }

    /// 为订单排一条平台切换计划
    ///
    /// - 已有未完结计划时去抖，不重复排程
    /// - 切换次数已达上限时直接走失败终态
    /// - 首次切换立即到期，后续切换退避 backoff_ms
    pub async fn schedule_switch(
        &self,
        order_id: i64,
        from_api_id: i64,
        reason: &str,
    ) -> OrderResult<()> {
        if self.retries.has_open_for_order(order_id).await? {
            tracing::debug!(order_id, "Switch already scheduled, skip");
            return Ok(());
        }

        let prior = self.retries.find_by_order(order_id).await?.len() as i64;
        if prior >= self.max_switches {
            tracing::warn!(order_id, switches = prior, "Platform switch limit reached");
            self.order_service
                .process_order_fail(order_id, &format!("平台切换次数耗尽: {reason}"))
                .await?;
            return Ok(());
        }

        let order = self.orders.get(order_id).await?;
        let next_retry_time = if prior == 0 {
            now_millis()
        } else {
            now_millis() + self.backoff_ms
        };
        let record = self
            .retries
            .create(
                order_id,
                RetryType::PlatformSwitch,
                RetryStatus::Pending,
                from_api_id,
                prior + 1,
                next_retry_time,
                &order.used_apis,
                reason,
            )
            .await?;
        tracing::info!(
            order_id,
            retry_id = record.id,
            from_api_id,
            next_retry_time,
            "Platform switch scheduled"
        );
        Ok(())
    }

    /// 提单回执收尾：受理即成功，被拒即失败
    ///
    /// 只命中仍在执行中且目标为该 API 的记录，首提（无切换计划）
    /// 时是 no-op。
    pub async fn resolve_routed(
        &self,
        order_id: i64,
        api_id: i64,
        accepted: bool,
        reason: &str,
    ) -> OrderResult<()> {
        let (status, remark) = if accepted {
            (RetryStatus::Succeeded, "切换后提单受理".to_string())
        } else {
            (RetryStatus::Failed, format!("切换后提单被拒: {reason}"))
        };
        if self
            .retries
            .complete_routed(order_id, api_id, status, &remark)
            .await?
        {
            tracing::info!(order_id, api_id, accepted, "Retry record resolved");
        }
        Ok(())
    }

    /// 执行所有到期的切换计划，返回执行条数
    pub async fn run_due(&self) -> usize {
        let records = match self.retries.find_due(now_millis(), 50).await {
            Ok(records) => records,
            Err(e) => {
                tracing::error!(error = %e, "Failed to scan due retry records");
                return 0;
            }
        };

        let mut executed = 0;
        for record in records {
            match self.retries.claim(record.id).await {
                Ok(true) => {}
                Ok(false) => continue,
                Err(e) => {
                    tracing::error!(retry_id = record.id, error = %e, "Failed to claim retry record");
                    continue;
                }
            }
            if let Err(e) = self.execute(&record).await {
                tracing::error!(retry_id = record.id, error = %e, "Retry execution failed");
                let _ = self
                    .retries
                    .complete(record.id, RetryStatus::Failed, &e.to_string())
                    .await;
            }
            executed += 1;
        }
        executed
    }

    /// 人工强制重试：立即执行一条待执行的切换计划
    ///
    /// 放行计划的来源平台，让它重新参与候选（强制重试允许再走
    /// 一遍失败过的平台），随后走与扫描器相同的执行路径。
    pub async fn manual_retry(&self, retry_id: i64) -> OrderResult<bool> {
        let record = self.retries.get(retry_id).await?;
        if record.status != RetryStatus::Pending || !self.retries.claim(record.id).await? {
            return Ok(false);
        }
        self.retries.mark_manual(record.id).await?;

        let order = self.orders.get(record.order_id).await?;
        if order.status == OrderStatus::PendingRecharge && record.from_api_id != 0 {
            let mut used = order.used_api_set();
            if used.remove(record.from_api_id) {
                self.orders
                    .return_to_pending(order.id, &used.to_json())
                    .await?;
            }
        }

        tracing::info!(
            order_id = record.order_id,
            retry_id = record.id,
            from_api_id = record.from_api_id,
            "Manual retry triggered"
        );
        self.execute(&record).await?;
        Ok(true)
    }

    /// 执行一条已领取的切换计划
    async fn execute(&self, record: &RetryRecord) -> OrderResult<()> {
        let order = self.orders.get(record.order_id).await?;
        if order.status != OrderStatus::PendingRecharge {
            self.retries
                .complete(record.id, RetryStatus::Failed, "订单不在待充值状态")
                .await?;
            return Ok(());
        }

        let used = order.used_api_set();
        let candidates = self.products.candidates(order.product_id).await?;
        let next = candidates.iter().find(|rel| !used.contains(rel.api_id));

        match next {
            Some(rel) => {
                self.orders
                    .switch_api(order.id, rel.api_id, rel.api_param_id)
                    .await?;
                self.retries
                    .set_routing(record.id, rel.api_id, rel.api_param_id, "已切换，等待提单")
                    .await?;
                self.queue.push(order.id)?;
                tracing::info!(
                    order_id = order.id,
                    retry_id = record.id,
                    to_api_id = rel.api_id,
                    "Order switched to next platform"
                );
            }
            None => {
                self.retries
                    .complete(record.id, RetryStatus::Failed, "无可用平台")
                    .await?;
                self.order_service
                    .process_order_fail(order.id, "所有平台均已尝试")
                    .await?;
            }
        }
        Ok(())
    }

    /// 周期扫描 worker
    pub async fn run_sweeper(
        self: Arc<Self>,
        interval: Duration,
        shutdown: CancellationToken,
    ) {
        tracing::info!(interval_ms = interval.as_millis() as u64, "Retry sweeper started");
        let mut tick = tokio::time::interval(interval);
        loop {
            tokio::select! {
                _ = tick.tick() => {
                    let executed = self.run_due().await;
                    if executed > 0 {
                        tracing::debug!(executed, "Retry sweep executed records");
                    }
                }
                _ = shutdown.cancelled() => {
                    tracing::info!("Retry sweeper shutting down");
                    break;
                }
            }
        }
    }
}
