//! Platform Model
//!
//! 上游充值平台的接入配置：API 通道、套餐参数、以及平台侧的资金
//! 账号。`CallbackData` 是各平台回调经适配器解析后的统一结构。

use serde::{Deserialize, Serialize};

/// 平台 API 通道
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "db", derive(sqlx::FromRow))]
pub struct PlatformApi {
    pub id: i64,
    pub name: String,
    /// 适配器标识（回调路径段，如 "mockpay"）
    pub platform: String,
    /// 提单接口地址
    pub submit_url: String,
    /// 状态查询接口地址
    pub query_url: String,
    pub app_id: String,
    pub app_secret: String,
    /// 0 启用 / 1 停用
    pub disabled: i64,
    pub created_at: i64,
    pub updated_at: i64,
}

/// 平台套餐参数
///
/// `price` 是该套餐的成本价，提单受理成功后冻结到订单 const_price。
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "db", derive(sqlx::FromRow))]
pub struct PlatformApiParam {
    pub id: i64,
    pub api_id: i64,
    /// 平台侧产品编码
    pub product_code: String,
    /// 面值
    pub denom: f64,
    /// 成本价
    pub price: f64,
    pub disabled: i64,
}

/// 平台资金账号
///
/// `bind_user_id` 指向承担该平台扣款的内部账户。
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "db", derive(sqlx::FromRow))]
pub struct PlatformAccount {
    pub id: i64,
    pub api_id: i64,
    pub name: String,
    pub bind_user_id: i64,
    pub disabled: i64,
    pub created_at: i64,
    pub updated_at: i64,
}

/// 适配器解析后的统一回调数据
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallbackData {
    /// 本系统订单号
    pub order_number: String,
    /// 平台侧订单号
    pub platform_order_no: String,
    /// true 充值成功 / false 充值失败
    pub success: bool,
    /// 平台给出的说明（失败原因等）
    pub message: String,
    /// 原始报文，审计留存
    pub raw: String,
}
