//! Order Model
//!
//! 充值订单实体与状态机的类型定义。状态取值与数据库存储一致
//! （整数编码），状态迁移规则由 recharge-server 的订单服务执行。

use serde::{Deserialize, Serialize};

/// 订单状态
///
/// 终态：`Success` / `Failed` / `Refunded` / `Cancelled`，进入后不再迁移。
/// `Processing` 是 worker 抢占订单时的短暂占位态，区别于平台已受理的
/// `Recharging`。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "db", derive(sqlx::Type))]
#[repr(i64)]
pub enum OrderStatus {
    /// 待支付
    PendingPayment = 1,
    /// 待充值
    PendingRecharge = 2,
    /// 充值中（平台已受理）
    Recharging = 3,
    /// 充值成功
    Success = 4,
    /// 充值失败
    Failed = 5,
    /// 已退款
    Refunded = 6,
    /// 已取消
    Cancelled = 7,
    /// 部分充值
    Partial = 8,
    /// 已拆单
    Split = 9,
    /// 处理中（worker 已抢占，平台尚未受理）
    Processing = 10,
}

impl OrderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::PendingPayment => "pending_payment",
            OrderStatus::PendingRecharge => "pending_recharge",
            OrderStatus::Recharging => "recharging",
            OrderStatus::Success => "success",
            OrderStatus::Failed => "failed",
            OrderStatus::Refunded => "refunded",
            OrderStatus::Cancelled => "cancelled",
            OrderStatus::Partial => "partial",
            OrderStatus::Split => "split",
            OrderStatus::Processing => "processing",
        }
    }

    /// 终态判定，终态吸收一切后续迁移
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            OrderStatus::Success
                | OrderStatus::Failed
                | OrderStatus::Refunded
                | OrderStatus::Cancelled
        )
    }

    pub fn from_i64(v: i64) -> Option<Self> {
        Some(match v {
            1 => OrderStatus::PendingPayment,
            2 => OrderStatus::PendingRecharge,
            3 => OrderStatus::Recharging,
            4 => OrderStatus::Success,
            5 => OrderStatus::Failed,
            6 => OrderStatus::Refunded,
            7 => OrderStatus::Cancelled,
            8 => OrderStatus::Partial,
            9 => OrderStatus::Split,
            10 => OrderStatus::Processing,
            _ => return None,
        })
    }
}

impl std::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 订单来源
///
/// `External` 订单在接入时已预扣款，编排器不再重复扣款。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "db", derive(sqlx::Type))]
#[repr(i64)]
pub enum OrderOrigin {
    /// 平台内部订单（充值前从绑定账户扣款）
    Platform = 1,
    /// 外部 API 订单（创建时已预扣款）
    External = 2,
}

/// 已尝试过的平台 API 集合
///
/// 有序去重集合：保持首次加入的顺序，重复加入是 no-op。
/// 数据库中以 JSON 数组字符串落盘（`[3, 7, 12]`）。
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UsedApiSet(Vec<i64>);

impl UsedApiSet {
    pub fn new() -> Self {
        Self(Vec::new())
    }

    /// 从数据库 JSON 字符串解析；空串视为空集合
    pub fn parse(raw: &str) -> Result<Self, serde_json::Error> {
        if raw.trim().is_empty() {
            return Ok(Self::new());
        }
        serde_json::from_str(raw)
    }

    /// 加入一个 API id，已存在时返回 false
    pub fn insert(&mut self, api_id: i64) -> bool {
        if self.0.contains(&api_id) {
            return false;
        }
        self.0.push(api_id);
        true
    }

    /// 移除一个 API id（人工重试重新放行同平台时使用）
    pub fn remove(&mut self, api_id: i64) -> bool {
        let before = self.0.len();
        self.0.retain(|id| *id != api_id);
        self.0.len() != before
    }

    pub fn contains(&self, api_id: i64) -> bool {
        self.0.contains(&api_id)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = i64> + '_ {
        self.0.iter().copied()
    }

    pub fn to_json(&self) -> String {
        serde_json::to_string(&self.0).unwrap_or_else(|_| "[]".to_string())
    }
}

/// 充值订单实体
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "db", derive(sqlx::FromRow))]
pub struct Order {
    pub id: i64,
    /// 对外订单号（UNIQUE）
    pub order_number: String,
    pub customer_id: i64,
    pub product_id: i64,
    /// 充值目标（手机号等）
    pub mobile: String,
    /// 面值
    pub denom: f64,
    /// 客户价
    pub price: f64,
    /// 成本价，平台受理成功后一次性冻结
    pub const_price: f64,
    pub origin: OrderOrigin,
    pub status: OrderStatus,
    /// 扣款来源的平台账号（Platform 来源订单使用）
    pub platform_account_id: i64,
    /// 当前使用的平台 API
    pub api_cur_id: i64,
    /// 当前使用的套餐参数
    pub api_cur_param_id: i64,
    /// 已尝试的 API id 列表（JSON 数组字符串）
    pub used_apis: String,
    /// 终态备注（失败原因等）
    pub remark: String,
    /// 客户回调地址（通知分发用，可为空）
    pub notify_url: String,
    pub create_time: i64,
    pub finish_time: Option<i64>,
    pub created_at: i64,
    pub updated_at: i64,
}

impl Order {
    /// 解析已尝试 API 集合；脏数据回退为空集合
    pub fn used_api_set(&self) -> UsedApiSet {
        UsedApiSet::parse(&self.used_apis).unwrap_or_else(|e| {
            tracing::warn!(order_id = self.id, error = %e, "invalid used_apis json, treating as empty");
            UsedApiSet::new()
        })
    }
}

/// 创建订单的载荷
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderCreate {
    pub customer_id: i64,
    pub product_id: i64,
    pub mobile: String,
    pub denom: f64,
    pub price: f64,
    pub origin: OrderOrigin,
    pub platform_account_id: i64,
    pub notify_url: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn terminal_states() {
        assert!(OrderStatus::Success.is_terminal());
        assert!(OrderStatus::Failed.is_terminal());
        assert!(OrderStatus::Refunded.is_terminal());
        assert!(OrderStatus::Cancelled.is_terminal());
        assert!(!OrderStatus::Processing.is_terminal());
        assert!(!OrderStatus::Recharging.is_terminal());
        assert!(!OrderStatus::PendingRecharge.is_terminal());
    }

    #[test]
    fn used_api_set_ordered_dedup() {
        let mut set = UsedApiSet::new();
        assert!(set.insert(3));
        assert!(set.insert(7));
        assert!(!set.insert(3));
        assert_eq!(set.len(), 2);
        assert!(set.contains(7));
        assert_eq!(set.to_json(), "[3,7]");

        let parsed = UsedApiSet::parse("[3,7]").unwrap();
        assert_eq!(parsed, set);
        assert!(UsedApiSet::parse("").unwrap().is_empty());
    }
}
