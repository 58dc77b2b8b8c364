//! Retry Model
//!
//! 平台切换重试记录。一条记录代表一次待执行的切换计划，由重试
//! 扫描器按 `next_retry_time` 到期执行，结果在提单回执落地后回写。

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "db", derive(sqlx::Type))]
#[repr(i64)]
pub enum RetryStatus {
    /// 待执行
    Pending = 0,
    /// 执行中（已切换，等待提单结果）
    InProgress = 1,
    /// 已成功（切换后的提单被受理）
    Succeeded = 2,
    /// 已失败（候选耗尽或切换后提单仍被拒）
    Failed = 3,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "db", derive(sqlx::Type))]
#[repr(i64)]
pub enum RetryType {
    /// 平台切换
    PlatformSwitch = 1,
    /// 同平台人工重试
    SamePlatform = 2,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "db", derive(sqlx::FromRow))]
pub struct RetryRecord {
    pub id: i64,
    pub order_id: i64,
    pub retry_type: RetryType,
    pub status: RetryStatus,
    /// 失败来源 API
    pub from_api_id: i64,
    /// 切换目标 API，执行时选定前为 0
    pub to_api_id: i64,
    /// 切换目标 API 的参数档位，执行时选定前为 0
    pub to_api_param_id: i64,
    /// 已执行的切换次数
    pub retry_count: i64,
    /// 到期时间（毫秒），到期后可被扫描执行
    pub next_retry_time: i64,
    /// 调度时刻订单已用 API 列表的快照（JSON 数组）
    pub used_apis: String,
    pub remark: String,
    pub created_at: i64,
    pub updated_at: i64,
}
