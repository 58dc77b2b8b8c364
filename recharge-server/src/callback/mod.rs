//! 回调对账
//!
//! 平台异步回调的唯一入口。按 URL 平台段找到适配器解析报文，
//! 然后在一个写事务内完成「留存回调 -> 终态回写」：
//!
//! - 回调留存表 UNIQUE(order_id, callback_type) 挡住重复回调，
//!   重复回调直接回 ack，不做任何状态变更。
//! - 订单已在终态时同样只留存不变更，终态吸收迟到回调。
//! - 成功回调落成功终态；失败回调落失败终态并在同一事务内退款。
//!
//! 无论处理结论如何，能解析的回调一律回平台 ack，避免平台反复
//! 重发已经处理过的结论。

use crate::db::repository::{CallbackLogRepository, OrderRepository, RepoError};
use crate::orders::{OrderError, OrderService};
use crate::platform::PlatformRegistry;
use shared::models::platform::CallbackData;
use sqlx::SqlitePool;
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CallbackError {
    #[error("未知平台: {0}")]
    UnknownPlatform(String),

    #[error("报文解析失败: {0}")]
    InvalidPayload(String),

    #[error("订单不存在: {0}")]
    OrderNotFound(String),

    #[error(transparent)]
    Order(#[from] OrderError),
}

impl From<RepoError> for CallbackError {
    fn from(err: RepoError) -> Self {
        CallbackError::Order(OrderError::Repo(err))
    }
}

/// 一次回调的处理结论（日志与测试用）
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallbackOutcome {
    /// 成功回调已落终态
    Completed,
    /// 失败回调已落失败终态（含退款）
    Failed,
    /// 重复回调，丢弃
    Duplicate,
    /// 订单已终态，迟到回调只留存
    AlreadyTerminal,
}

pub struct CallbackService {
    pool: SqlitePool,
    registry: Arc<PlatformRegistry>,
    orders: OrderRepository,
}

impl CallbackService {
    pub fn new(pool: SqlitePool, registry: Arc<PlatformRegistry>) -> Self {
        Self {
            orders: OrderRepository::new(pool.clone()),
            pool,
            registry,
        }
    }

    /// 处理一条平台回调，返回处理结论与回平台的 ack 文本
    pub async fn handle(
        &self,
        platform: &str,
        body: &[u8],
    ) -> Result<(CallbackOutcome, &'static str), CallbackError> {
        let Some(adapter) = self.registry.get(platform) else {
            return Err(CallbackError::UnknownPlatform(platform.to_string()));
        };
        let data = adapter
            .parse_callback(body)
            .map_err(|e| CallbackError::InvalidPayload(e.to_string()))?;
        let ack = adapter.callback_ack();

        let outcome = self.reconcile(platform, &data).await?;
        tracing::info!(
            platform,
            order_number = %data.order_number,
            success = data.success,
            outcome = ?outcome,
            "Callback processed"
        );
        Ok((outcome, ack))
    }

    /// 留存回调并回写订单，一个写事务内完成
    async fn reconcile(
        &self,
        platform: &str,
        data: &CallbackData,
    ) -> Result<CallbackOutcome, CallbackError> {
        let order = self
            .orders
            .find_by_number(&data.order_number)
            .await?
            .ok_or_else(|| CallbackError::OrderNotFound(data.order_number.clone()))?;

        let callback_type = if data.success { "success" } else { "failed" };
        let mut tx = self.pool.begin().await.map_err(RepoError::from)?;

        match CallbackLogRepository::insert_tx(
            &mut tx,
            order.id,
            callback_type,
            platform,
            &data.platform_order_no,
            &data.raw,
        )
        .await
        {
            Ok(_) => {}
            Err(RepoError::Duplicate(_)) => {
                tracing::info!(
                    order_id = order.id,
                    callback_type,
                    "Duplicate callback, dropping"
                );
                return Ok(CallbackOutcome::Duplicate);
            }
            Err(e) => return Err(e.into()),
        }

        // 事务内重读，挡住与其它终态路径的竞争
        let order = OrderRepository::get_tx(&mut tx, order.id).await?;
        if order.status.is_terminal() {
            tx.commit().await.map_err(RepoError::from)?;
            return Ok(CallbackOutcome::AlreadyTerminal);
        }

        if data.success {
            OrderService::finalize_success_tx(&mut tx, &order, &data.message).await?;
            tx.commit().await.map_err(RepoError::from)?;
            Ok(CallbackOutcome::Completed)
        } else {
            let reason = if data.message.is_empty() {
                "平台回调失败".to_string()
            } else {
                format!("平台回调失败: {}", data.message)
            };
            OrderService::finalize_fail_tx(&mut tx, &order, &reason).await?;
            tx.commit().await.map_err(RepoError::from)?;
            Ok(CallbackOutcome::Failed)
        }
    }
}
