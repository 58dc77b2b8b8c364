//! Repository Module
//!
//! SQLite 表的数据访问层。需要参与事务的操作接受
//! `&mut SqliteConnection`，其余操作直接使用连接池。

pub mod balance_log;
pub mod callback_log;
pub mod notification;
pub mod order;
pub mod platform_api;
pub mod product;
pub mod retry;
pub mod user;

pub use balance_log::BalanceLogRepository;
pub use callback_log::CallbackLogRepository;
pub use notification::NotificationRepository;
pub use order::OrderRepository;
pub use platform_api::PlatformApiRepository;
pub use product::ProductRepository;
pub use retry::RetryRepository;
pub use user::UserRepository;

use thiserror::Error;

/// Repository error types
#[derive(Debug, Error)]
pub enum RepoError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Duplicate: {0}")]
    Duplicate(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Validation error: {0}")]
    Validation(String),
}

impl From<sqlx::Error> for RepoError {
    fn from(err: sqlx::Error) -> Self {
        if is_unique_violation(&err) {
            return RepoError::Duplicate(err.to_string());
        }
        match err {
            sqlx::Error::RowNotFound => RepoError::NotFound("row not found".into()),
            other => RepoError::Database(other.to_string()),
        }
    }
}

/// Result type for repository operations
pub type RepoResult<T> = Result<T, RepoError>;

/// UNIQUE 约束冲突判定，幂等插入路径依赖它
pub fn is_unique_violation(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Database(db_err) => db_err.is_unique_violation(),
        _ => false,
    }
}
