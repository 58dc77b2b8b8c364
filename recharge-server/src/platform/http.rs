//! 通用 JSON 协议的 HTTP 适配器
//!
//! 适用于走标准 JSON 提单/回调协议的上游平台。提单与查询都有
//! 有界超时，超时按拒单处理，由重试层决定是否切换平台。
//!
//! # 协议
//!
//! 提单请求: `{ app_id, order_no, product_code, mobile, denom }`
//! 提单响应: `{ code, msg, platform_order_no }`，code == 0 为受理
//! 回调报文: `{ order_no, platform_order_no, status, message }`，
//! status 为 "success" | "failed"

use super::{AdapterError, AdapterResult, OrderProbe, PlatformAdapter, SubmitAck};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use shared::models::order::Order;
use shared::models::platform::{CallbackData, PlatformApi, PlatformApiParam};
use std::time::Duration;

#[derive(Serialize)]
struct SubmitRequest<'a> {
    app_id: &'a str,
    order_no: &'a str,
    product_code: &'a str,
    mobile: &'a str,
    denom: f64,
}

#[derive(Deserialize)]
struct SubmitResponse {
    code: i64,
    #[serde(default)]
    msg: String,
    #[serde(default)]
    platform_order_no: String,
}

#[derive(Deserialize)]
struct CallbackPayload {
    order_no: String,
    #[serde(default)]
    platform_order_no: String,
    status: String,
    #[serde(default)]
    message: String,
}

#[derive(Serialize)]
struct QueryRequest<'a> {
    app_id: &'a str,
    order_no: &'a str,
}

#[derive(Deserialize)]
struct QueryResponse {
    code: i64,
    #[serde(default)]
    status: String,
    #[serde(default)]
    msg: String,
    #[serde(default)]
    balance: f64,
}

pub struct HttpAdapter {
    name: String,
    client: reqwest::Client,
}

impl HttpAdapter {
    pub fn new(name: impl Into<String>, submit_timeout: Duration) -> Self {
        // 客户端级超时兜底所有请求
        let client = reqwest::Client::builder()
            .timeout(submit_timeout)
            .build()
            .unwrap_or_default();
        Self {
            name: name.into(),
            client,
        }
    }
}

#[async_trait]
impl PlatformAdapter for HttpAdapter {
    fn name(&self) -> &str {
        &self.name
    }

    async fn submit_order(
        &self,
        api: &PlatformApi,
        param: &PlatformApiParam,
        order: &Order,
    ) -> AdapterResult<SubmitAck> {
        let request = SubmitRequest {
            app_id: &api.app_id,
            order_no: &order.order_number,
            product_code: &param.product_code,
            mobile: &order.mobile,
            denom: order.denom,
        };

        let response: SubmitResponse = self
            .client
            .post(&api.submit_url)
            .header("X-App-Secret", &api.app_secret)
            .json(&request)
            .send()
            .await?
            .json()
            .await?;

        if response.code != 0 {
            return Err(AdapterError::Rejected(format!(
                "code={} msg={}",
                response.code, response.msg
            )));
        }
        Ok(SubmitAck {
            platform_order_no: response.platform_order_no,
        })
    }

    fn parse_callback(&self, body: &[u8]) -> AdapterResult<CallbackData> {
        let payload: CallbackPayload = serde_json::from_slice(body)
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

    async fn query_status(&self, api: &PlatformApi, order: &Order) -> AdapterResult<OrderProbe> {
        let request = QueryRequest {
            app_id: &api.app_id,
            order_no: &order.order_number,
        };
        let response: QueryResponse = self
            .client
            .post(&api.query_url)
            .header("X-App-Secret", &api.app_secret)
            .json(&request)
            .send()
            .await?
            .json()
            .await?;

        if response.code != 0 {
            return Ok(OrderProbe::Unknown);
        }
        Ok(match response.status.as_str() {
            "success" => OrderProbe::Success,
            "failed" => OrderProbe::Failed(response.msg),
            "processing" => OrderProbe::Processing,
            _ => OrderProbe::Unknown,
        })
    }

    async fn query_balance(&self, api: &PlatformApi) -> AdapterResult<f64> {
        let request = QueryRequest {
            app_id: &api.app_id,
            order_no: "",
        };
        let response: QueryResponse = self
            .client
            .post(&api.query_url)
            .header("X-App-Secret", &api.app_secret)
            .json(&request)
            .send()
            .await?
            .json()
            .await?;

        if response.code != 0 {
            return Err(AdapterError::Rejected(response.msg));
        }
        Ok(response.balance)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_callback_success_and_failed() {
        let adapter = HttpAdapter::new("generic", Duration::from_secs(5));

        let ok = adapter
            .parse_callback(br#"{"order_no":"R1","platform_order_no":"P1","status":"success"}"#)
            .unwrap();
        assert!(ok.success);
        assert_eq!(ok.order_number, "R1");

        let failed = adapter
            .parse_callback(
                br#"{"order_no":"R2","status":"failed","message":"line busy"}"#,
            )
            .unwrap();
        assert!(!failed.success);
        assert_eq!(failed.message, "line busy");

        assert!(adapter.parse_callback(b"not json").is_err());
        assert!(
            adapter
                .parse_callback(br#"{"order_no":"R3","status":"maybe"}"#)
                .is_err()
        );
    }
}
