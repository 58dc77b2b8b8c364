//! redb-based durable task queue
//!
//! # Tables
//!
//! | Table | Key | Value | Purpose |
//! |-------|-----|-------|---------|
//! | `ready` | `seq` | `order_id` | 就绪队列（FIFO） |
//! | `ready_index` | `order_id` | `seq` | 就绪成员索引（幂等入队） |
//! | `reserved` | `order_id` | `seq` | 在途集合（已被 worker 领取） |
//! | `meta` | `"seq"` | `u64` | 全局序号 |
//!
//! # Semantics
//!
//! - 入队幂等：订单已在就绪或在途集合中时，push 是 no-op。
//! - 领取即搬移：reserve 在一个写事务内把队头从就绪搬到在途，
//!   进程崩溃不会丢任务。
//! - 处理完成 ack 删除在途项；重启时 recover_reserved 把在途项
//!   搬回就绪队列重新投放。
//!
//! Note: redb operations are synchronous for stability; async 侧通过
//! [`TaskQueue::reserve_wait`] 的 Notify 等待新任务。

use redb::{Database, ReadableDatabase, ReadableTable, TableDefinition};
use std::path::Path;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;

const READY_TABLE: TableDefinition<u64, i64> = TableDefinition::new("ready");
const READY_INDEX_TABLE: TableDefinition<i64, u64> = TableDefinition::new("ready_index");
const RESERVED_TABLE: TableDefinition<i64, u64> = TableDefinition::new("reserved");
const META_TABLE: TableDefinition<&str, u64> = TableDefinition::new("meta");

const SEQ_KEY: &str = "seq";

/// Queue errors
#[derive(Debug, Error)]
pub enum QueueError {
    #[error("Database error: {0}")]
    Database(#[from] redb::DatabaseError),

    #[error("Transaction error: {0}")]
    Transaction(#[from] redb::TransactionError),

    #[error("Table error: {0}")]
    Table(#[from] redb::TableError),

    #[error("Storage error: {0}")]
    Storage(#[from] redb::StorageError),

    #[error("Commit error: {0}")]
    Commit(#[from] redb::CommitError),
}

pub type QueueResult<T> = Result<T, QueueError>;

/// Durable FIFO task queue backed by redb
#[derive(Clone)]
pub struct TaskQueue {
    db: Arc<Database>,
    notify: Arc<Notify>,
}

impl TaskQueue {
    pub fn open(path: impl AsRef<Path>) -> QueueResult<Self> {
        let db = Database::create(path)?;
        let queue = Self {
            db: Arc::new(db),
            notify: Arc::new(Notify::new()),
        };
        queue.ensure_tables()?;
        Ok(queue)
    }

    /// In-memory queue for tests
    pub fn open_in_memory() -> QueueResult<Self> {
        let db = Database::builder().create_with_backend(redb::backends::InMemoryBackend::new())?;
        let queue = Self {
            db: Arc::new(db),
            notify: Arc::new(Notify::new()),
        };
        queue.ensure_tables()?;
        Ok(queue)
    }

    fn ensure_tables(&self) -> QueueResult<()> {
        let txn = self.db.begin_write()?;
        {
            txn.open_table(READY_TABLE)?;
            txn.open_table(READY_INDEX_TABLE)?;
            txn.open_table(RESERVED_TABLE)?;
            txn.open_table(META_TABLE)?;
        }
        txn.commit()?;
        Ok(())
    }

    /// 幂等入队。返回 false 表示订单已在队列（就绪或在途）中。
    pub fn push(&self, order_id: i64) -> QueueResult<bool> {
        let txn = self.db.begin_write()?;
        let pushed = {
            let mut ready = txn.open_table(READY_TABLE)?;
            let mut index = txn.open_table(READY_INDEX_TABLE)?;
            let reserved = txn.open_table(RESERVED_TABLE)?;
            let mut meta = txn.open_table(META_TABLE)?;

            if index.get(order_id)?.is_some() || reserved.get(order_id)?.is_some() {
                false
            } else {
                let seq = meta.get(SEQ_KEY)?.map(|v| v.value()).unwrap_or(0) + 1;
                meta.insert(SEQ_KEY, seq)?;
                ready.insert(seq, order_id)?;
                index.insert(order_id, seq)?;
                true
            }
        };
        txn.commit()?;
        if pushed {
            self.notify.notify_one();
        }
        Ok(pushed)
    }

    /// 领取队头：就绪 -> 在途，一个写事务内完成
    pub fn reserve(&self) -> QueueResult<Option<i64>> {
        let txn = self.db.begin_write()?;
        let claimed = {
            let mut ready = txn.open_table(READY_TABLE)?;
            let mut index = txn.open_table(READY_INDEX_TABLE)?;
            let mut reserved = txn.open_table(RESERVED_TABLE)?;

            let head = ready
                .range::<u64>(..)?
                .next()
                .transpose()?
                .map(|(k, v)| (k.value(), v.value()));

            match head {
                Some((seq, order_id)) => {
                    ready.remove(seq)?;
                    index.remove(order_id)?;
                    reserved.insert(order_id, seq)?;
                    Some(order_id)
                }
                None => None,
            }
        };
        txn.commit()?;
        Ok(claimed)
    }

    /// 异步等待领取；shutdown 取消时返回 None
    pub async fn reserve_wait(&self, shutdown: &CancellationToken) -> Option<i64> {
        loop {
            match self.reserve() {
                Ok(Some(order_id)) => return Some(order_id),
                Ok(None) => {}
                Err(e) => {
                    tracing::error!(error = %e, "Task queue reserve failed");
                    tokio::time::sleep(std::time::Duration::from_secs(1)).await;
                }
            }
            tokio::select! {
                _ = self.notify.notified() => {}
                _ = shutdown.cancelled() => return None,
            }
        }
    }

    /// 处理完成，删除在途项
    pub fn ack(&self, order_id: i64) -> QueueResult<()> {
        let txn = self.db.begin_write()?;
        {
            let mut reserved = txn.open_table(RESERVED_TABLE)?;
            reserved.remove(order_id)?;
        }
        txn.commit()?;
        Ok(())
    }

    /// 启动恢复：把上次运行遗留的在途项搬回就绪队列
    pub fn recover_reserved(&self) -> QueueResult<usize> {
        let txn = self.db.begin_write()?;
        let recovered = {
            let mut ready = txn.open_table(READY_TABLE)?;
            let mut index = txn.open_table(READY_INDEX_TABLE)?;
            let mut reserved = txn.open_table(RESERVED_TABLE)?;
            let mut meta = txn.open_table(META_TABLE)?;

            let stranded: Vec<i64> = reserved
                .range::<i64>(..)?
                .filter_map(|r| r.ok().map(|(k, _)| k.value()))
                .collect();

            let mut seq = meta.get(SEQ_KEY)?.map(|v| v.value()).unwrap_or(0);
            for order_id in &stranded {
                reserved.remove(*order_id)?;
                seq += 1;
                ready.insert(seq, *order_id)?;
                index.insert(*order_id, seq)?;
            }
            meta.insert(SEQ_KEY, seq)?;
            stranded.len()
        };
        txn.commit()?;
        if recovered > 0 {
            self.notify.notify_one();
        }
        Ok(recovered)
    }

    /// 就绪队列当前全部订单（清扫用）
    pub fn snapshot_ready(&self) -> QueueResult<Vec<i64>> {
        let txn = self.db.begin_read()?;
        let ready = txn.open_table(READY_TABLE)?;
        let ids = ready
            .range::<u64>(..)?
            .filter_map(|r| r.ok().map(|(_, v)| v.value()))
            .collect();
        Ok(ids)
    }

    /// 从就绪队列移除一个订单（清扫剔除）
    pub fn remove_ready(&self, order_id: i64) -> QueueResult<bool> {
        let txn = self.db.begin_write()?;
        let removed = {
            let mut ready = txn.open_table(READY_TABLE)?;
            let mut index = txn.open_table(READY_INDEX_TABLE)?;
            match index.remove(order_id)? {
                Some(seq) => {
                    ready.remove(seq.value())?;
                    true
                }
                None => false,
            }
        };
        txn.commit()?;
        Ok(removed)
    }

    /// 在途集合的前 limit 个订单（巡检用）
    pub fn list_reserved(&self, limit: usize) -> QueueResult<Vec<i64>> {
        let txn = self.db.begin_read()?;
        let reserved = txn.open_table(RESERVED_TABLE)?;
        let ids = reserved
            .range::<i64>(..)?
            .filter_map(|r| r.ok().map(|(k, _)| k.value()))
            .take(limit)
            .collect();
        Ok(ids)
    }

    pub fn ready_len(&self) -> QueueResult<usize> {
        Ok(self.snapshot_ready()?.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn push_is_idempotent() {
        let queue = TaskQueue::open_in_memory().unwrap();
        assert!(queue.push(100).unwrap());
        assert!(!queue.push(100).unwrap());
        assert_eq!(queue.ready_len().unwrap(), 1);
    }

    #[test]
    fn reserve_moves_head_fifo() {
        let queue = TaskQueue::open_in_memory().unwrap();
        queue.push(1).unwrap();
        queue.push(2).unwrap();
        queue.push(3).unwrap();

        assert_eq!(queue.reserve().unwrap(), Some(1));
        assert_eq!(queue.reserve().unwrap(), Some(2));
        // 在途中的订单不可重复入队
        assert!(!queue.push(1).unwrap());
        assert_eq!(queue.reserve().unwrap(), Some(3));
        assert_eq!(queue.reserve().unwrap(), None);
    }

    #[test]
    fn ack_releases_membership() {
        let queue = TaskQueue::open_in_memory().unwrap();
        queue.push(7).unwrap();
        assert_eq!(queue.reserve().unwrap(), Some(7));
        queue.ack(7).unwrap();
        // ack 之后可再次入队
        assert!(queue.push(7).unwrap());
    }

    #[test]
    fn recover_returns_reserved_to_ready() {
        let queue = TaskQueue::open_in_memory().unwrap();
        queue.push(5).unwrap();
        queue.push(6).unwrap();
        assert_eq!(queue.reserve().unwrap(), Some(5));

        let recovered = queue.recover_reserved().unwrap();
        assert_eq!(recovered, 1);
        // 5 排回队尾
        assert_eq!(queue.reserve().unwrap(), Some(6));
        assert_eq!(queue.reserve().unwrap(), Some(5));
    }

    #[test]
    fn list_reserved_shows_in_flight() {
        let queue = TaskQueue::open_in_memory().unwrap();
        queue.push(1).unwrap();
        queue.push(2).unwrap();
        queue.reserve().unwrap();
        queue.reserve().unwrap();
        assert_eq!(queue.list_reserved(10).unwrap().len(), 2);
        assert_eq!(queue.list_reserved(1).unwrap().len(), 1);
        queue.ack(1).unwrap();
        assert_eq!(queue.list_reserved(10).unwrap(), vec![2]);
    }

    #[test]
    fn remove_ready_evicts() {
        let queue = TaskQueue::open_in_memory().unwrap();
        queue.push(1).unwrap();
        queue.push(2).unwrap();
        assert!(queue.remove_ready(1).unwrap());
        assert!(!queue.remove_ready(1).unwrap());
        assert_eq!(queue.reserve().unwrap(), Some(2));
    }
}
