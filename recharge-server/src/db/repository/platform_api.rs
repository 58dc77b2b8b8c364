//! Platform API Repository
//!
//! 平台 API 通道、套餐参数与平台资金账号的查询。

use super::{RepoError, RepoResult};
use shared::models::platform::{PlatformAccount, PlatformApi, PlatformApiParam};
use sqlx::SqlitePool;

#[derive(Clone)]
pub struct PlatformApiRepository {
    pool: SqlitePool,
}

impl PlatformApiRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn insert(&self, api: &PlatformApi) -> RepoResult<()> {
        sqlx::query(
            r#"INSERT INTO platform_apis
               (id, name, platform, submit_url, query_url, app_id, app_secret, disabled,
                created_at, updated_at)
               VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"#,
        )
        .bind(api.id)
        .bind(&api.name)
        .bind(&api.platform)
        .bind(&api.submit_url)
        .bind(&api.query_url)
        .bind(&api.app_id)
        .bind(&api.app_secret)
        .bind(api.disabled)
        .bind(api.created_at)
        .bind(api.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn get(&self, id: i64) -> RepoResult<PlatformApi> {
        let api = sqlx::query_as::<_, PlatformApi>("SELECT * FROM platform_apis WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        api.ok_or_else(|| RepoError::NotFound(format!("platform api {id}")))
    }

    pub async fn insert_param(&self, param: &PlatformApiParam) -> RepoResult<()> {
        sqlx::query(
            r#"INSERT INTO platform_api_params
               (id, api_id, product_code, denom, price, disabled)
               VALUES (?, ?, ?, ?, ?, ?)"#,
        )
        .bind(param.id)
        .bind(param.api_id)
        .bind(&param.product_code)
        .bind(param.denom)
        .bind(param.price)
        .bind(param.disabled)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn get_param(&self, id: i64) -> RepoResult<PlatformApiParam> {
        let param =
            sqlx::query_as::<_, PlatformApiParam>("SELECT * FROM platform_api_params WHERE id = ?")
                .bind(id)
                .fetch_optional(&self.pool)
                .await?;
        param.ok_or_else(|| RepoError::NotFound(format!("platform api param {id}")))
    }

    pub async fn insert_account(&self, account: &PlatformAccount) -> RepoResult<()> {
        sqlx::query(
            r#"INSERT INTO platform_accounts
               (id, api_id, name, bind_user_id, disabled, created_at, updated_at)
               VALUES (?, ?, ?, ?, ?, ?, ?)"#,
        )
        .bind(account.id)
        .bind(account.api_id)
        .bind(&account.name)
        .bind(account.bind_user_id)
        .bind(account.disabled)
        .bind(account.created_at)
        .bind(account.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn get_account(&self, id: i64) -> RepoResult<PlatformAccount> {
        let account =
            sqlx::query_as::<_, PlatformAccount>("SELECT * FROM platform_accounts WHERE id = ?")
                .bind(id)
                .fetch_optional(&self.pool)
                .await?;
        account.ok_or_else(|| RepoError::NotFound(format!("platform account {id}")))
    }
}
