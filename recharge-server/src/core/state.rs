//! 服务器状态
//!
//! 持有所有服务的共享引用。使用 Arc 实现浅拷贝，所有权成本极低。

use std::sync::Arc;

use crate::callback::CallbackService;
use crate::core::{BackgroundTasks, Config, TaskKind};
use crate::db::DbService;
use crate::ledger::LedgerService;
use crate::notification::NotificationDispatcher;
use crate::orders::OrderService;
use crate::platform::PlatformRegistry;
use crate::platform::http::HttpAdapter;
use crate::queue::TaskQueue;
use crate::recharge::RechargeService;
use crate::retry::RetryService;
use sqlx::SqlitePool;
use std::time::Duration;

/// 服务器状态 - 持有所有服务的单例引用
///
/// | 字段 | 说明 |
/// |------|------|
/// | config | 配置项（不可变） |
/// | pool | SQLite 连接池 |
/// | queue | redb 持久化任务队列 |
/// | registry | 平台适配器注册表 |
/// | orders | 订单服务 |
/// | ledger | 资金台账 |
/// | recharge | 充值编排 |
/// | retry | 平台切换重试 |
/// | callbacks | 回调对账 |
#[derive(Clone)]
pub struct ServerState {
    pub config: Config,
    pub pool: SqlitePool,
    pub queue: TaskQueue,
    pub registry: Arc<PlatformRegistry>,
    pub orders: OrderService,
    pub ledger: LedgerService,
    pub recharge: Arc<RechargeService>,
    pub retry: Arc<RetryService>,
    pub callbacks: Arc<CallbackService>,
}

impl ServerState {
    /// 初始化服务器状态
    ///
    /// 按顺序初始化：工作目录、数据库、任务队列、适配器注册表、
    /// 各服务。默认注册通用 JSON 协议适配器（标识 "generic"）。
    ///
    /// # Panics
    ///
    /// 数据库或队列初始化失败时 panic
    pub async fn initialize(config: &Config) -> Self {
        std::fs::create_dir_all(&config.work_dir).expect("Failed to create work directory");

        let db = DbService::new(&config.db_path())
            .await
            .expect("Failed to initialize database");
        let queue = TaskQueue::open(config.queue_path()).expect("Failed to open task queue");

        let registry = Arc::new(PlatformRegistry::new());
        registry.register(Arc::new(HttpAdapter::new(
            "generic",
            Duration::from_millis(config.submit_timeout_ms),
        )));

        Self::with_parts(config.clone(), db.pool, queue, registry)
    }

    /// 用现成的池、队列和注册表组装状态（测试入口）
    pub fn with_parts(
        config: Config,
        pool: SqlitePool,
        queue: TaskQueue,
        registry: Arc<PlatformRegistry>,
    ) -> Self {
        let orders = OrderService::new(pool.clone(), queue.clone());
        let ledger = LedgerService::new(pool.clone());
        let retry = Arc::new(RetryService::new(
            pool.clone(),
            orders.clone(),
            queue.clone(),
            config.retry_backoff_ms,
            config.max_platform_switches,
        ));
        let recharge = Arc::new(RechargeService::new(
            pool.clone(),
            registry.clone(),
            orders.clone(),
            retry.clone(),
            queue.clone(),
            config.stuck_order_timeout_ms,
        ));
        let callbacks = Arc::new(CallbackService::new(pool.clone(), registry.clone()));

        Self {
            config,
            pool,
            queue,
            registry,
            orders,
            ledger,
            recharge,
            retry,
            callbacks,
        }
    }

    /// 注册并启动所有后台任务
    ///
    /// 必须在 HTTP 服务启动前调用：
    ///
    /// - Warmup: 在途任务恢复（上次运行遗留的在途项搬回就绪队列）
    /// - Worker: N 个充值 worker
    /// - Periodic: 队列/卡单清扫、重试扫描、通知分发
    pub fn start_background_tasks(&self, tasks: &mut BackgroundTasks) {
        let shutdown = tasks.shutdown_token();

        let queue = self.queue.clone();
        tasks.spawn("queue_recovery", TaskKind::Warmup, async move {
            match queue.recover_reserved() {
                Ok(0) => {}
                Ok(n) => tracing::info!(count = n, "Recovered reserved queue entries"),
                Err(e) => tracing::error!(error = %e, "Queue recovery failed"),
            }
        });

        for worker_id in 0..self.config.recharge_workers {
            let recharge = self.recharge.clone();
            let token = shutdown.clone();
            tasks.spawn("recharge_worker", TaskKind::Worker, async move {
                recharge.run_worker(worker_id, token).await;
            });
        }

        let recharge = self.recharge.clone();
        let interval = Duration::from_millis(self.config.queue_sweep_interval_ms);
        let token = shutdown.clone();
        tasks.spawn("queue_sweeper", TaskKind::Periodic, async move {
            recharge.run_sweeper(interval, token).await;
        });

        let retry = self.retry.clone();
        let interval = Duration::from_millis(self.config.retry_scan_interval_ms);
        let token = shutdown.clone();
        tasks.spawn("retry_sweeper", TaskKind::Periodic, async move {
            retry.run_sweeper(interval, token).await;
        });

        let dispatcher =
            NotificationDispatcher::new(self.pool.clone(), self.config.notify_max_attempts);
        let token = shutdown.clone();
        tasks.spawn("notification_dispatcher", TaskKind::Periodic, async move {
            dispatcher.run(Duration::from_secs(5), token).await;
        });
    }
}
