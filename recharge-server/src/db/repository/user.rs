//! User Repository
//!
//! 账户读写。余额变更只允许在资金事务内进行，见 ledger 模块。

use super::{RepoError, RepoResult};
use shared::models::user::User;
use shared::util::now_millis;
use sqlx::{SqliteConnection, SqlitePool};

#[derive(Clone)]
pub struct UserRepository {
    pool: SqlitePool,
}

impl UserRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn insert(&self, user: &User) -> RepoResult<()> {
        sqlx::query(
            r#"INSERT INTO users (id, username, balance, credit, disabled, created_at, updated_at)
               VALUES (?, ?, ?, ?, ?, ?, ?)"#,
        )
        .bind(user.id)
        .bind(&user.username)
        .bind(user.balance)
        .bind(user.credit)
        .bind(user.disabled)
        .bind(user.created_at)
        .bind(user.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn find_by_id(&self, id: i64) -> RepoResult<Option<User>> {
        let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(user)
    }

    pub async fn get(&self, id: i64) -> RepoResult<User> {
        self.find_by_id(id)
            .await?
            .ok_or_else(|| RepoError::NotFound(format!("user {id}")))
    }

    /// 事务内读取账户（资金事务入口）
    pub async fn get_tx(conn: &mut SqliteConnection, id: i64) -> RepoResult<User> {
        let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE id = ?")
            .bind(id)
            .fetch_optional(&mut *conn)
            .await?;
        user.ok_or_else(|| RepoError::NotFound(format!("user {id}")))
    }

    /// 事务内回写余额
    pub async fn set_balance_tx(
        conn: &mut SqliteConnection,
        id: i64,
        balance: f64,
    ) -> RepoResult<()> {
        sqlx::query("UPDATE users SET balance = ?, updated_at = ? WHERE id = ?")
            .bind(balance)
            .bind(now_millis())
            .bind(id)
            .execute(&mut *conn)
            .await?;
        Ok(())
    }
}
