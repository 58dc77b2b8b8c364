//! 脚本化的平台适配器测试替身
//!
//! 提单结果按入队顺序逐次弹出，耗尽后默认受理。回调解析复用
//! 通用 JSON 协议，状态查询返回预设结论。

use super::{AdapterError, AdapterResult, OrderProbe, PlatformAdapter, SubmitAck};
use async_trait::async_trait;
use shared::models::order::Order;
use shared::models::platform::{CallbackData, PlatformApi, PlatformApiParam};
use std::collections::VecDeque;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

/// 单次提单脚本
pub enum SubmitScript {
    /// 受理，给定平台单号
    Accept(String),
    /// 业务拒单
    Reject(String),
}

pub struct MockAdapter {
    name: String,
    scripts: Mutex<VecDeque<SubmitScript>>,
    probe: Mutex<OrderProbe>,
    submit_calls: AtomicUsize,
}

impl MockAdapter {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            scripts: Mutex::new(VecDeque::new()),
            probe: Mutex::new(OrderProbe::Processing),
            submit_calls: AtomicUsize::new(0),
        }
    }

    /// 追加一次提单脚本
    pub fn script_submit(&self, script: SubmitScript) {
        self.scripts.lock().unwrap().push_back(script);
    }

    pub fn set_probe(&self, probe: OrderProbe) {
        *self.probe.lock().unwrap() = probe;
    }

    /// 提单被调用的次数
    pub fn submit_calls(&self) -> usize {
        self.submit_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PlatformAdapter for MockAdapter {
    fn name(&self) -> &str {
        &self.name
    }

    async fn submit_order(
        &self,
        _api: &PlatformApi,
        _param: &PlatformApiParam,
        order: &Order,
    ) -> AdapterResult<SubmitAck> {
        self.submit_calls.fetch_add(1, Ordering::SeqCst);
        match self.scripts.lock().unwrap().pop_front() {
            Some(SubmitScript::Accept(platform_order_no)) => Ok(SubmitAck { platform_order_no }),
            Some(SubmitScript::Reject(reason)) => Err(AdapterError::Rejected(reason)),
            None => Ok(SubmitAck {
                platform_order_no: format!("MOCK-{}", order.order_number),
            }),
        }
    }

    fn parse_callback(&self, body: &[u8]) -> AdapterResult<CallbackData> {
        #[derive(serde::Deserialize)]
        struct Payload {
            order_no: String,
            #[serde(default)]
            platform_order_no: String,
            status: String,
            #[serde(default)]
            message: String,
        }
        let payload: Payload = serde_json::from_slice(body)
            .map_err(|e| AdapterError::InvalidPayload(e.to_string()))?;
        let success = match payload.status.as_str() {
            "success" => true,
            "failed" => false,
            other => {
                return Err(AdapterError::InvalidPayload(format!(
                    "unknown callback status: {other}"
                )));
            }
        };
        Ok(CallbackData {
            order_number: payload.order_no,
            platform_order_no: payload.platform_order_no,
            success,
            message: payload.message,
            raw: String::from_utf8_lossy(body).into_owned(),
        })
    }

    async fn query_status(&self, _api: &PlatformApi, _order: &Order) -> AdapterResult<OrderProbe> {
        Ok(self.probe.lock().unwrap().clone())
    }

    async fn query_balance(&self, _api: &PlatformApi) -> AdapterResult<f64> {
        Ok(10_000.0)
    }
}
