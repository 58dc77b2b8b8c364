//! Balance Log Model
//!
//! 资金流水。`(order_id, user_id, style)` 唯一，保证同一订单对同一
//! 账户的同类资金操作恰好发生一次。

use serde::{Deserialize, Serialize};

/// 流水类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "db", derive(sqlx::Type))]
#[repr(i64)]
pub enum BalanceStyle {
    /// 订单扣款
    OrderDeduct = 1,
    /// 订单退款
    Refund = 2,
    /// 人工调整
    ManualAdjust = 3,
    /// 账户充值
    TopUp = 4,
}

/// 资金方向
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "db", derive(sqlx::Type))]
#[repr(i64)]
pub enum BalanceDirection {
    /// 入账
    Income = 1,
    /// 出账
    Expense = 2,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "db", derive(sqlx::FromRow))]
pub struct BalanceLog {
    pub id: i64,
    pub user_id: i64,
    /// 非订单流水（人工调整、充值）为 0
    pub order_id: i64,
    pub style: BalanceStyle,
    pub direction: BalanceDirection,
    /// 本次变动金额（恒为正，方向见 direction）
    pub amount: f64,
    /// 变动前余额
    pub before_balance: f64,
    /// 变动后余额
    pub after_balance: f64,
    /// 操作者，系统流水为 "system"，人工流水为操作员标识
    pub operator: String,
    pub remark: String,
    pub created_at: i64,
}
