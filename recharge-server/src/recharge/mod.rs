//! 充值编排
//!
//! 消费任务队列的核心流程：
//!
//! 1. 选平台：切换计划预先指好的 API 优先，否则按路由 sort 取
//!    第一个未尝试过的候选。
//! 2. 原子抢占订单（待充值 -> 处理中，同时锁定候选 API），抢不到
//!    说明别的 worker 在处理或状态已变，直接 ack 丢弃。本进程内
//!    另有一个 DashSet 作为快速短路，正确性只依赖 CAS。
//! 3. 扣款：平台订单在提单前按订单号幂等扣款，可用额度不足直接
//!    走失败终态（资金问题，切平台解决不了）。外部订单已预扣款，
//!    跳过。
//! 4. 提单。受理则进入充值中并冻结成本价；拒单（含超时）则记下
//!    已尝试的 API、收尾在途的切换计划并排下一条。
//!
//! 另有两个周期清扫：
//!
//! - 队列清扫：剔除就绪队列里已终态/不在待充值/超过 24 小时的
//!   订单（过期订单走失败终态退款）；刚被别处更新过的订单只跳过
//!   本轮，不出队。
//! - 卡单清扫：充值中长时间无回调的订单主动向平台查询状态，
//!   按查询结论落成功终态、失败终态（退款）或继续等待。

use crate::db::repository::{OrderRepository, PlatformApiRepository, ProductRepository, RepoError};
use crate::ledger::{LedgerError, LedgerService};
use crate::orders::{OrderResult, OrderService};
use crate::platform::{OrderProbe, PlatformRegistry};
use crate::queue::TaskQueue;
use crate::retry::RetryService;
use dashmap::DashSet;
use shared::models::order::{Order, OrderOrigin, OrderStatus};
use shared::util::now_millis;
use sqlx::SqlitePool;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// 订单在队列中的最长滞留时间，超过即过期
const QUEUE_MAX_AGE_MS: i64 = 24 * 60 * 60 * 1000;
/// 刚被别处更新过的订单本轮不投放
const SWEEP_RECENT_MS: i64 = 60 * 1000;
/// 创建后 5 秒内视为新单，豁免「刚更新」剔除
const SWEEP_FRESH_MS: i64 = 5 * 1000;

pub struct RechargeService {
    orders: OrderRepository,
    products: ProductRepository,
    platform_apis: PlatformApiRepository,
    registry: Arc<PlatformRegistry>,
    order_service: OrderService,
    ledger: LedgerService,
    retry: Arc<RetryService>,
    queue: TaskQueue,
    /// 本进程在途订单的快速短路，跨进程正确性由 CAS 保证
    processing: DashSet<i64>,
    /// 充值中订单多久未更新视为卡单（毫秒）
    stuck_timeout_ms: i64,
}

impl RechargeService {
    pub fn new(
        pool: SqlitePool,
        registry: Arc<PlatformRegistry>,
        order_service: OrderService,
        retry: Arc<RetryService>,
        queue: TaskQueue,
        stuck_timeout_ms: i64,
    ) -> Self {
        Self {
            orders: OrderRepository::new(pool.clone()),
            products: ProductRepository::new(pool.clone()),
            platform_apis: PlatformApiRepository::new(pool.clone()),
            registry,
            order_service,
            ledger: LedgerService::new(pool),
            retry,
            queue,
            processing: DashSet::new(),
            stuck_timeout_ms,
        }
    }

    /// 处理一个出队订单
    pub async fn process(&self, order_id: i64) -> OrderResult<()> {
        if !self.processing.insert(order_id) {
            tracing::debug!(order_id, "Order already in flight in this process");
            self.queue.ack(order_id)?;
            return Ok(());
        }
        let result = self.process_claimed(order_id).await;
        self.processing.remove(&order_id);
        self.queue.ack(order_id)?;
        result
    }

    async fn process_claimed(&self, order_id: i64) -> OrderResult<()> {
        let Some(order) = self.orders.find_by_id(order_id).await? else {
            tracing::warn!(order_id, "Queued order not found");
            return Ok(());
        };
        if order.status != OrderStatus::PendingRecharge {
            tracing::debug!(order_id, status = %order.status, "Order not pending, dropping");
            return Ok(());
        }

        // 选平台：切换计划预先指好的 API 优先
        let used = order.used_api_set();
        let route = if order.api_cur_id != 0 && !used.contains(order.api_cur_id) {
            Some((order.api_cur_id, order.api_cur_param_id))
        } else {
            self.products
                .candidates(order.product_id)
                .await?
                .iter()
                .find(|rel| !used.contains(rel.api_id))
                .map(|rel| (rel.api_id, rel.api_param_id))
        };
        let Some((api_id, param_id)) = route else {
            self.order_service
                .process_order_fail(order_id, "无可用充值平台")
                .await?;
            return Ok(());
        };

        // 抢占失败不是错误：别的 worker 拿走了，或状态刚被改掉
        if !self
            .orders
            .claim_for_processing(order_id, api_id, param_id)
            .await?
        {
            tracing::debug!(order_id, "Claim lost, dropping queue entry");
            return Ok(());
        }

        // 平台订单提单前扣款，订单号幂等，重复处理不二次扣
        if order.origin == OrderOrigin::Platform {
            match self
                .ledger
                .debit_for_order(
                    order.customer_id,
                    order.id,
                    order.price,
                    &format!("订单扣款 {}", order.order_number),
                )
                .await
            {
                Ok(_) => {}
                Err(LedgerError::Insufficient {
                    available,
                    requested,
                }) => {
                    tracing::warn!(order_id, available, requested, "Insufficient funds");
                    self.order_service
                        .process_order_fail(
                            order_id,
                            &format!("可用额度不足: 可用 {available}, 需要 {requested}"),
                        )
                        .await?;
                    return Ok(());
                }
                // 其余扣款错误同样终结订单，不能让订单停留在处理中
                Err(e) => {
                    tracing::error!(order_id, error = %e, "Order debit failed");
                    self.order_service
                        .process_order_fail(order_id, &format!("订单扣款失败: {e}"))
                        .await?;
                    return Ok(());
                }
            }
        }

        self.submit(&order, api_id, param_id).await
    }

    /// 抢占后的临时性故障：订单放回待充值并重新入队
    async fn release_claim(&self, order: &Order, reason: &str) -> OrderResult<()> {
        tracing::warn!(order_id = order.id, reason, "Releasing claimed order back to queue");
        self.orders
            .return_to_pending(order.id, &order.used_apis)
            .await?;
        self.queue.push(order.id)?;
        Ok(())
    }

    /// 向选定平台提单
    async fn submit(&self, order: &Order, api_id: i64, param_id: i64) -> OrderResult<()> {
        // 路由数据缺失是数据错误，直接终结；数据库故障放回队列重试
        let api = match self.platform_apis.get(api_id).await {
            Ok(api) => api,
            Err(RepoError::NotFound(what)) => {
                self.order_service
                    .process_order_fail(order.id, &format!("路由数据缺失: {what}"))
                    .await?;
                return Ok(());
            }
            Err(e) => return self.release_claim(order, &e.to_string()).await,
        };
        let param = match self.platform_apis.get_param(param_id).await {
            Ok(param) => param,
            Err(RepoError::NotFound(what)) => {
                self.order_service
                    .process_order_fail(order.id, &format!("路由数据缺失: {what}"))
                    .await?;
                return Ok(());
            }
            Err(e) => return self.release_claim(order, &e.to_string()).await,
        };
        let mut used = order.used_api_set();
        used.insert(api_id);

        let Some(adapter) = self.registry.get(&api.platform) else {
            tracing::error!(order_id = order.id, platform = %api.platform, "No adapter registered");
            let reason = format!("适配器未注册: {}", api.platform);
            self.handle_rejection(order, api_id, &used.to_json(), &reason)
                .await?;
            return Ok(());
        };

        match adapter.submit_order(&api, &param, order).await {
            Ok(ack) => {
                // 受理成功，成本价按本次套餐一次性冻结。回写不生效
                // 说明订单在提单期间已被并发终结，终态为准，平台侧
                // 结果交给回调/卡单对账收尾。
                if !self
                    .orders
                    .mark_recharging(order.id, api_id, param_id, param.price, &used.to_json())
                    .await?
                {
                    tracing::warn!(
                        order_id = order.id,
                        api_id,
                        "Order left processing concurrently, recharging write skipped"
                    );
                    return Ok(());
                }
                self.retry
                    .resolve_routed(order.id, api_id, true, "")
                    .await?;
                self.order_service
                    .notify_status(order, OrderStatus::Recharging, "平台已受理")
                    .await?;
                tracing::info!(
                    order_id = order.id,
                    api_id,
                    platform_order_no = %ack.platform_order_no,
                    const_price = param.price,
                    "Order accepted by platform"
                );
            }
            Err(e) => {
                tracing::warn!(order_id = order.id, api_id, error = %e, "Platform rejected order");
                self.handle_rejection(order, api_id, &used.to_json(), &e.to_string())
                    .await?;
            }
        }
        Ok(())
    }

    /// 提单被拒：回到待充值、收尾在途切换计划、排下一条
    async fn handle_rejection(
        &self,
        order: &Order,
        api_id: i64,
        used_apis_json: &str,
        reason: &str,
    ) -> OrderResult<()> {
        self.orders
            .return_to_pending(order.id, used_apis_json)
            .await?;
        self.retry
            .resolve_routed(order.id, api_id, false, reason)
            .await?;
        self.retry
            .schedule_switch(order.id, api_id, reason)
            .await?;
        Ok(())
    }

    /// 充值 worker：循环出队处理，shutdown 时退出
    pub async fn run_worker(
        self: Arc<Self>,
        worker_id: usize,
        shutdown: CancellationToken,
    ) {
        tracing::info!(worker_id, "Recharge worker started");
        loop {
            let Some(order_id) = self.queue.reserve_wait(&shutdown).await else {
                tracing::info!(worker_id, "Recharge worker shutting down");
                break;
            };
            if let Err(e) = self.process(order_id).await {
                tracing::error!(worker_id, order_id, error = %e, "Order processing failed");
            }
        }
    }

    /// 队列清扫：剔除不该留在就绪队列的订单
    ///
    /// 这是协作式过滤，worker 处理前仍会自查状态。
    pub async fn sweep_queue(&self) -> usize {
        let snapshot = match self.queue.snapshot_ready() {
            Ok(ids) => ids,
            Err(e) => {
                tracing::error!(error = %e, "Queue snapshot failed");
                return 0;
            }
        };

        let now = now_millis();
        let mut evicted = 0;
        for order_id in snapshot {
            let order = match self.orders.find_by_id(order_id).await {
                Ok(Some(order)) => order,
                Ok(None) => {
                    tracing::warn!(order_id, "Queued order not found, evicting");
                    let _ = self.queue.remove_ready(order_id);
                    evicted += 1;
                    continue;
                }
                Err(e) => {
                    tracing::error!(order_id, error = %e, "Sweep lookup failed");
                    continue;
                }
            };

            if order.status != OrderStatus::PendingRecharge {
                tracing::info!(order_id, status = %order.status, "Evicting non-pending order from queue");
                let _ = self.queue.remove_ready(order_id);
                evicted += 1;
                continue;
            }

            if now - order.created_at > QUEUE_MAX_AGE_MS {
                tracing::warn!(order_id, "Order expired in queue");
                let _ = self.queue.remove_ready(order_id);
                let _ = self
                    .order_service
                    .process_order_fail(order_id, "订单在队列中超过24小时")
                    .await;
                evicted += 1;
                continue;
            }

            // 刚被别处更新过的单本轮跳过但留在队列里，避免与退避中
            // 的切换计划抢跑；剔除会让订单永远失去投放机会。新建
            // 订单豁免
            let fresh = order.updated_at - order.created_at < SWEEP_FRESH_MS;
            if !fresh && now - order.updated_at < SWEEP_RECENT_MS {
                tracing::debug!(order_id, "Skipping recently touched order this sweep");
            }
        }
        evicted
    }

    /// 卡单清扫：充值中长时间无回调的订单主动查询平台状态
    pub async fn sweep_stuck(&self) -> usize {
        let cutoff = now_millis() - self.stuck_timeout_ms;
        let stuck = match self.orders.find_stuck_recharging(cutoff).await {
            Ok(orders) => orders,
            Err(e) => {
                tracing::error!(error = %e, "Stuck order scan failed");
                return 0;
            }
        };

        let mut handled = 0;
        for order in stuck {
            if let Err(e) = self.probe_stuck(&order).await {
                tracing::error!(order_id = order.id, error = %e, "Stuck order probe failed");
            } else {
                handled += 1;
            }
        }
        handled
    }

    async fn probe_stuck(&self, order: &Order) -> OrderResult<()> {
        let api = self.platform_apis.get(order.api_cur_id).await?;
        let Some(adapter) = self.registry.get(&api.platform) else {
            tracing::error!(order_id = order.id, platform = %api.platform, "No adapter for stuck order");
            return Ok(());
        };

        let probe = match adapter.query_status(&api, order).await {
            Ok(probe) => probe,
            Err(e) => {
                tracing::warn!(order_id = order.id, error = %e, "Status query failed");
                return Ok(());
            }
        };

        match probe {
            OrderProbe::Success => {
                tracing::info!(order_id = order.id, "Stuck order confirmed success via query");
                self.order_service
                    .complete_success(order.id, "状态查询确认成功")
                    .await?;
            }
            OrderProbe::Failed(reason) => {
                tracing::warn!(order_id = order.id, reason = %reason, "Stuck order confirmed failed via query");
                self.order_service
                    .process_order_fail(order.id, &format!("状态查询确认失败: {reason}"))
                    .await?;
            }
            OrderProbe::Processing | OrderProbe::Unknown => {
                // 仍在处理，刷新时间戳避免下一轮立刻再查
                self.orders
                    .update_status(order.id, OrderStatus::Recharging)
                    .await?;
            }
        }
        Ok(())
    }

    /// 周期清扫 worker（队列清扫 + 卡单清扫）
    pub async fn run_sweeper(
        self: Arc<Self>,
        interval: Duration,
        shutdown: CancellationToken,
    ) {
        tracing::info!(interval_ms = interval.as_millis() as u64, "Queue sweeper started");
        let mut tick = tokio::time::interval(interval);
        loop {
            tokio::select! {
                _ = tick.tick() => {
                    let evicted = self.sweep_queue().await;
                    if evicted > 0 {
                        tracing::info!(evicted, "Queue sweep evicted entries");
                    }
                    let handled = self.sweep_stuck().await;
                    if handled > 0 {
                        tracing::info!(handled, "Stuck order sweep handled orders");
                    }
                }
                _ = shutdown.cancelled() => {
                    tracing::info!("Queue sweeper shutting down");
                    break;
                }
            }
        }
    }
}
