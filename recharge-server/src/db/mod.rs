//! 数据库模块
//!
//! SQLite 连接池与迁移。订单、流水、重试记录都在这一个库里，
//! WAL 模式让回调写入不挡住清扫读取。

pub mod repository;

use sqlx::SqlitePool;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use std::str::FromStr;

use repository::{RepoError, RepoResult};

fn db_err(context: &str, e: impl std::fmt::Display) -> RepoError {
    RepoError::Database(format!("{context}: {e}"))
}

#[derive(Clone)]
pub struct DbService {
    pub pool: SqlitePool,
}

impl DbService {
    /// 打开（必要时创建）数据库并应用迁移
    pub async fn new(db_path: &str) -> RepoResult<Self> {
        let options = SqliteConnectOptions::from_str(&format!("sqlite:{db_path}"))
            .map_err(|e| db_err("invalid database path", e))?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .pragma("foreign_keys", "ON")
            .optimize_on_close(true, None);

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await
            .map_err(|e| db_err("failed to open database", e))?;

        // 写冲突时等 5s 而非立即失败
        sqlx::query("PRAGMA busy_timeout = 5000;")
            .execute(&pool)
            .await
            .map_err(|e| db_err("failed to set busy_timeout", e))?;

        sqlx::migrate!("./migrations")
            .set_ignore_missing(true)
            .run(&pool)
            .await
            .map_err(|e| db_err("failed to apply migrations", e))?;

        tracing::info!(db_path, "Database ready (WAL, busy_timeout=5000ms)");
        Ok(Self { pool })
    }

    /// 测试用内存库
    pub async fn new_in_memory() -> RepoResult<Self> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")
            .map_err(|e| db_err("invalid connection string", e))?;

        // 内存库必须单连接且不回收，否则每个连接各自一份空库
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await
            .map_err(|e| db_err("failed to open in-memory database", e))?;

        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .map_err(|e| db_err("failed to apply migrations", e))?;

        Ok(Self { pool })
    }
}
