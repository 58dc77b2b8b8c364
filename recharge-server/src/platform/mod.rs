//! 平台适配层
//!
//! 每个上游充值平台实现一个 [`PlatformAdapter`]：提单、回调解析、
//! 状态查询、余额查询。编排器只面对统一的受理/拒绝语义，平台
//! 协议差异全部收敛在适配器内。
//!
//! 适配器按标识注册到 [`PlatformRegistry`]，回调路由用 URL 中的
//! 平台段查找适配器。

pub mod http;
pub mod mock;

use async_trait::async_trait;
use dashmap::DashMap;
use shared::models::order::Order;
use shared::models::platform::{CallbackData, PlatformApi, PlatformApiParam};
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AdapterError {
    /// 平台明确拒单（业务拒绝，触发平台切换）
    #[error("平台拒单: {0}")]
    Rejected(String),

    /// 传输层失败（超时、连接失败），同样按拒单处理
    #[error("平台请求失败: {0}")]
    Transport(#[from] reqwest::Error),

    /// 报文无法解析
    #[error("报文解析失败: {0}")]
    InvalidPayload(String),
}

pub type AdapterResult<T> = Result<T, AdapterError>;

/// 提单受理回执
#[derive(Debug, Clone)]
pub struct SubmitAck {
    /// 平台侧订单号
    pub platform_order_no: String,
}

/// 状态查询结论
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OrderProbe {
    /// 平台确认成功
    Success,
    /// 平台确认失败
    Failed(String),
    /// 平台仍在处理
    Processing,
    /// 平台查不到该单
    Unknown,
}

/// 上游平台适配器
#[async_trait]
pub trait PlatformAdapter: Send + Sync {
    /// 适配器标识（回调路径段）
    fn name(&self) -> &str;

    /// 提单。受理返回回执；业务拒绝返回 [`AdapterError::Rejected`]。
    async fn submit_order(
        &self,
        api: &PlatformApi,
        param: &PlatformApiParam,
        order: &Order,
    ) -> AdapterResult<SubmitAck>;

    /// 解析平台回调报文为统一结构
    fn parse_callback(&self, body: &[u8]) -> AdapterResult<CallbackData>;

    /// 主动查询平台侧订单状态（卡单扫描用）
    async fn query_status(&self, api: &PlatformApi, order: &Order) -> AdapterResult<OrderProbe>;

    /// 查询平台侧账户余额
    async fn query_balance(&self, api: &PlatformApi) -> AdapterResult<f64>;

    /// 回调响应体，平台据此停止重发
    fn callback_ack(&self) -> &'static str {
        "success"
    }
}

/// 适配器注册表
#[derive(Default)]
pub struct PlatformRegistry {
    adapters: DashMap<String, Arc<dyn PlatformAdapter>>,
}

impl PlatformRegistry {
    pub fn new() -> Self {
        Self {
            adapters: DashMap::new(),
        }
    }

    pub fn register(&self, adapter: Arc<dyn PlatformAdapter>) {
        let name = adapter.name().to_string();
        tracing::info!(platform = %name, "Registered platform adapter");
        self.adapters.insert(name, adapter);
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn PlatformAdapter>> {
        self.adapters.get(name).map(|entry| entry.value().clone())
    }

    pub fn len(&self) -> usize {
        self.adapters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.adapters.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::mock::MockAdapter;
    use super::*;

    #[test]
    fn registry_lookup_by_name() {
        let registry = PlatformRegistry::new();
        registry.register(Arc::new(MockAdapter::new("mockpay")));

        assert!(registry.get("mockpay").is_some());
        assert!(registry.get("unknown").is_none());
        assert_eq!(registry.len(), 1);
    }
}
