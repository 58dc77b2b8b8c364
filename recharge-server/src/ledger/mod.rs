//! 资金台账
//!
//! 所有余额变更的唯一入口。每笔变更在一个写事务内完成
//! 「读余额 -> 写流水 -> 回写余额」，流水表的
//! UNIQUE(order_id, user_id, style) 保证同一笔业务恰好入账一次，
//! 重复请求得到 [`LedgerOutcome::AlreadyApplied`] 而非二次变更。
//!
//! 扣款允许透支到授信额度：可用额度 = balance + credit，balance
//! 可以为负。非订单流水（充值、人工调整）以调用方生成的 ref_id
//! 占用 order_id 列参与唯一约束。

use crate::db::repository::{BalanceLogRepository, RepoError, UserRepository};
use shared::models::balance_log::{BalanceDirection, BalanceLog, BalanceStyle};
use shared::util::{now_millis, snowflake_id};
use sqlx::{SqliteConnection, SqlitePool};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("余额不足: 可用 {available}, 需要 {requested}")]
    Insufficient { available: f64, requested: f64 },

    #[error("金额必须为正: {0}")]
    NonPositiveAmount(f64),

    #[error(transparent)]
    Repo(#[from] RepoError),
}

pub type LedgerResult<T> = Result<T, LedgerError>;

/// 一次资金操作的结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LedgerOutcome {
    /// 本次入账生效
    Applied,
    /// 同一笔业务已入账过，本次为 no-op
    AlreadyApplied,
}

#[derive(Clone)]
pub struct LedgerService {
    pool: SqlitePool,
}

impl LedgerService {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// 订单扣款。可用额度（余额+授信）不足时拒绝，不产生流水。
    pub async fn debit_for_order(
        &self,
        user_id: i64,
        order_id: i64,
        amount: f64,
        remark: &str,
    ) -> LedgerResult<LedgerOutcome> {
        if amount <= 0.0 {
            return Err(LedgerError::NonPositiveAmount(amount));
        }
        let mut tx = self.pool.begin().await.map_err(RepoError::from)?;

        let user = UserRepository::get_tx(&mut tx, user_id).await?;
        if user.available() < amount {
            return Err(LedgerError::Insufficient {
                available: user.available(),
                requested: amount,
            });
        }

        let outcome = Self::apply_tx(
            &mut tx,
            user.balance,
            user_id,
            order_id,
            BalanceStyle::OrderDeduct,
            BalanceDirection::Expense,
            amount,
            "system",
            remark,
        )
        .await?;

        tx.commit().await.map_err(RepoError::from)?;
        Ok(outcome)
    }

    /// 订单退款（独立事务）
    pub async fn refund_for_order(
        &self,
        user_id: i64,
        order_id: i64,
        amount: f64,
        remark: &str,
    ) -> LedgerResult<LedgerOutcome> {
        if amount <= 0.0 {
            return Err(LedgerError::NonPositiveAmount(amount));
        }
        let mut tx = self.pool.begin().await.map_err(RepoError::from)?;
        let outcome = Self::refund_for_order_tx(&mut tx, user_id, order_id, amount, remark).await?;
        tx.commit().await.map_err(RepoError::from)?;
        Ok(outcome)
    }

    /// 订单退款（调用方事务内，终态回写与退款同事务落盘）
    pub async fn refund_for_order_tx(
        conn: &mut SqliteConnection,
        user_id: i64,
        order_id: i64,
        amount: f64,
        remark: &str,
    ) -> LedgerResult<LedgerOutcome> {
        if amount <= 0.0 {
            return Err(LedgerError::NonPositiveAmount(amount));
        }
        let user = UserRepository::get_tx(conn, user_id).await?;
        Self::apply_tx(
            conn,
            user.balance,
            user_id,
            order_id,
            BalanceStyle::Refund,
            BalanceDirection::Income,
            amount,
            "system",
            remark,
        )
        .await
    }

    /// 账户充值。ref_id 由调用方生成，参与幂等约束。
    pub async fn top_up(
        &self,
        user_id: i64,
        ref_id: i64,
        amount: f64,
        operator: &str,
        remark: &str,
    ) -> LedgerResult<LedgerOutcome> {
        if amount <= 0.0 {
            return Err(LedgerError::NonPositiveAmount(amount));
        }
        let mut tx = self.pool.begin().await.map_err(RepoError::from)?;
        let user = UserRepository::get_tx(&mut tx, user_id).await?;
        let outcome = Self::apply_tx(
            &mut tx,
            user.balance,
            user_id,
            ref_id,
            BalanceStyle::TopUp,
            BalanceDirection::Income,
            amount,
            operator,
            remark,
        )
        .await?;
        tx.commit().await.map_err(RepoError::from)?;
        Ok(outcome)
    }

    /// 人工调整，delta 带符号
    pub async fn manual_adjust(
        &self,
        user_id: i64,
        ref_id: i64,
        delta: f64,
        operator: &str,
        remark: &str,
    ) -> LedgerResult<LedgerOutcome> {
        if delta == 0.0 {
            return Err(LedgerError::NonPositiveAmount(delta));
        }
        let (direction, amount) = if delta > 0.0 {
            (BalanceDirection::Income, delta)
        } else {
            (BalanceDirection::Expense, -delta)
        };
        let mut tx = self.pool.begin().await.map_err(RepoError::from)?;
        let user = UserRepository::get_tx(&mut tx, user_id).await?;
        let outcome = Self::apply_tx(
            &mut tx,
            user.balance,
            user_id,
            ref_id,
            BalanceStyle::ManualAdjust,
            direction,
            amount,
            operator,
            remark,
        )
        .await?;
        tx.commit().await.map_err(RepoError::from)?;
        Ok(outcome)
    }

    /// 写流水并回写余额。Duplicate 即幂等命中，余额不动。
    #[allow(clippy::too_many_arguments)]
    async fn apply_tx(
        conn: &mut SqliteConnection,
        before_balance: f64,
        user_id: i64,
        order_id: i64,
        style: BalanceStyle,
        direction: BalanceDirection,
        amount: f64,
        operator: &str,
        remark: &str,
    ) -> LedgerResult<LedgerOutcome> {
        let after_balance = match direction {
            BalanceDirection::Income => before_balance + amount,
            BalanceDirection::Expense => before_balance - amount,
        };
        let log = BalanceLog {
            id: snowflake_id(),
            user_id,
            order_id,
            style,
            direction,
            amount,
            before_balance,
            after_balance,
            operator: operator.to_string(),
            remark: remark.to_string(),
            created_at: now_millis(),
        };

        match BalanceLogRepository::insert_tx(conn, &log).await {
            Ok(()) => {}
            Err(RepoError::Duplicate(_)) => {
                tracing::info!(
                    user_id,
                    order_id,
                    style = ?style,
                    "Balance operation already applied, skipping"
                );
                return Ok(LedgerOutcome::AlreadyApplied);
            }
            Err(e) => return Err(e.into()),
        }

        UserRepository::set_balance_tx(conn, user_id, after_balance).await?;
        Ok(LedgerOutcome::Applied)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::DbService;
    use shared::models::user::User;

    async fn setup() -> (DbService, LedgerService) {
        let db = DbService::new_in_memory().await.unwrap();
        let users = crate::db::repository::UserRepository::new(db.pool.clone());
        users
            .insert(&User {
                id: 1,
                username: "acct".into(),
                balance: 100.0,
                credit: 50.0,
                disabled: 0,
                created_at: 0,
                updated_at: 0,
            })
            .await
            .unwrap();
        let ledger = LedgerService::new(db.pool.clone());
        (db, ledger)
    }

    #[tokio::test]
    async fn debit_is_idempotent_per_order() {
        let (db, ledger) = setup().await;
        let users = crate::db::repository::UserRepository::new(db.pool.clone());

        let first = ledger.debit_for_order(1, 900, 30.0, "order").await.unwrap();
        assert_eq!(first, LedgerOutcome::Applied);
        let second = ledger.debit_for_order(1, 900, 30.0, "order").await.unwrap();
        assert_eq!(second, LedgerOutcome::AlreadyApplied);

        let user = users.get(1).await.unwrap();
        assert_eq!(user.balance, 70.0);
    }

    #[tokio::test]
    async fn debit_overdrafts_into_credit() {
        let (db, ledger) = setup().await;
        let users = crate::db::repository::UserRepository::new(db.pool.clone());

        // 余额 100 + 授信 50，扣 130 允许，余额为负
        ledger.debit_for_order(1, 901, 130.0, "order").await.unwrap();
        let user = users.get(1).await.unwrap();
        assert_eq!(user.balance, -30.0);
        assert_eq!(user.credit_used(), 30.0);

        // 剩余可用 20，扣 30 拒绝
        let err = ledger.debit_for_order(1, 902, 30.0, "order").await.unwrap_err();
        assert!(matches!(err, LedgerError::Insufficient { .. }));
        let user = users.get(1).await.unwrap();
        assert_eq!(user.balance, -30.0);
    }

    #[tokio::test]
    async fn refund_restores_balance_once() {
        let (db, ledger) = setup().await;
        let users = crate::db::repository::UserRepository::new(db.pool.clone());

        ledger.debit_for_order(1, 903, 40.0, "order").await.unwrap();
        assert_eq!(
            ledger.refund_for_order(1, 903, 40.0, "refund").await.unwrap(),
            LedgerOutcome::Applied
        );
        assert_eq!(
            ledger.refund_for_order(1, 903, 40.0, "refund").await.unwrap(),
            LedgerOutcome::AlreadyApplied
        );

        let user = users.get(1).await.unwrap();
        assert_eq!(user.balance, 100.0);
    }

    #[tokio::test]
    async fn top_up_and_adjust() {
        let (db, ledger) = setup().await;
        let users = crate::db::repository::UserRepository::new(db.pool.clone());

        ledger.top_up(1, snowflake_id(), 200.0, "admin", "top up").await.unwrap();
        ledger
            .manual_adjust(1, snowflake_id(), -20.0, "admin", "correction")
            .await
            .unwrap();

        let user = users.get(1).await.unwrap();
        assert_eq!(user.balance, 280.0);

        let err = ledger.top_up(1, snowflake_id(), -5.0, "admin", "bad").await.unwrap_err();
        assert!(matches!(err, LedgerError::NonPositiveAmount(_)));
    }
}
