//! Notification Model
//!
//! 订单终态对客户的通知记录，由通知分发 worker 异步投递。

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "db", derive(sqlx::Type))]
#[repr(i64)]
pub enum NotificationStatus {
    /// 待投递
    Pending = 0,
    /// 已投递
    Sent = 1,
    /// 投递失败（已达最大尝试次数）
    Failed = 2,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "db", derive(sqlx::FromRow))]
pub struct NotificationRecord {
    pub id: i64,
    pub order_id: i64,
    pub customer_id: i64,
    /// 投递地址，空串表示客户未配置回调
    pub notify_url: String,
    /// 通知载荷（JSON）
    pub payload: String,
    pub status: NotificationStatus,
    pub attempt_count: i64,
    pub last_error: String,
    pub created_at: i64,
    pub updated_at: i64,
}
