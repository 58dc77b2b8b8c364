//! Callback Log Model
//!
//! 平台回调留存。`(order_id, callback_type)` 唯一，重复回调在插入
//! 时即被拒绝，保证每个订单的成功/失败回调各处理一次。

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "db", derive(sqlx::FromRow))]
pub struct CallbackLog {
    pub id: i64,
    pub order_id: i64,
    /// 回调结论："success" / "failed"
    pub callback_type: String,
    /// 适配器标识
    pub platform: String,
    /// 平台侧订单号
    pub platform_order_no: String,
    /// 原始报文
    pub raw: String,
    pub created_at: i64,
}
