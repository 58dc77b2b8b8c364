//! User Model
//!
//! 客户账户。余额可透支到授信额度为止：可用额度 = balance + credit，
//! balance 允许为负（负值即已占用的授信）。

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "db", derive(sqlx::FromRow))]
pub struct User {
    pub id: i64,
    pub username: String,
    /// 账户余额，可为负（透支授信）
    pub balance: f64,
    /// 授信额度
    pub credit: f64,
    /// 0 正常 / 1 停用
    pub disabled: i64,
    pub created_at: i64,
    pub updated_at: i64,
}

impl User {
    /// 可用额度 = 余额 + 授信
    pub fn available(&self) -> f64 {
        self.balance + self.credit
    }

    /// 已占用授信（余额为负的部分）
    pub fn credit_used(&self) -> f64 {
        if self.balance < 0.0 { -self.balance } else { 0.0 }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn available_includes_credit() {
        let u = User {
            id: 1,
            username: "t".into(),
            balance: -30.0,
            credit: 100.0,
            disabled: 0,
            created_at: 0,
            updated_at: 0,
        };
        assert_eq!(u.available(), 70.0);
        assert_eq!(u.credit_used(), 30.0);
    }
}
