/// 服务器配置 - 充值编排节点的所有配置项
///
/// # 环境变量
///
/// 所有配置项都可以通过环境变量覆盖：
///
/// | 环境变量 | 默认值 | 说明 |
/// |----------|--------|------|
/// | WORK_DIR | /var/lib/recharge | 工作目录（数据库、队列、日志） |
/// | HTTP_PORT | 3000 | HTTP 服务端口（回调入口） |
/// | ENVIRONMENT | development | 运行环境 |
/// | RECHARGE_WORKERS | 4 | 充值 worker 并发数 |
/// | SUBMIT_TIMEOUT_MS | 15000 | 平台提单请求超时(毫秒) |
/// | RETRY_SCAN_INTERVAL_MS | 10000 | 重试记录扫描间隔(毫秒) |
/// | RETRY_BACKOFF_MS | 300000 | 二次及以后切换的退避时间(毫秒) |
/// | MAX_PLATFORM_SWITCHES | 3 | 单订单最大平台切换次数 |
/// | QUEUE_SWEEP_INTERVAL_MS | 60000 | 队列清扫间隔(毫秒) |
/// | STUCK_ORDER_TIMEOUT_MS | 300000 | 充值中订单视为卡单的时长(毫秒) |
/// | NOTIFY_MAX_ATTEMPTS | 5 | 客户通知最大投递次数 |
/// | SHUTDOWN_TIMEOUT_MS | 10000 | 关闭超时(毫秒) |
///
/// # 示例
///
/// ```ignore
/// WORK_DIR=/data/recharge HTTP_PORT=8080 cargo run
/// ```
#[derive(Debug, Clone)]
pub struct Config {
    /// 工作目录，存储数据库、任务队列和日志
    pub work_dir: String,
    /// HTTP API 服务端口
    pub http_port: u16,
    /// 运行环境: development | staging | production
    pub environment: String,
    /// 充值 worker 并发数
    pub recharge_workers: usize,
    /// 平台提单请求超时 (毫秒)
    pub submit_timeout_ms: u64,
    /// 重试记录扫描间隔 (毫秒)
    pub retry_scan_interval_ms: u64,
    /// 二次及以后平台切换的退避时间 (毫秒)
    pub retry_backoff_ms: i64,
    /// 单订单最大平台切换次数
    pub max_platform_switches: i64,
    /// 队列清扫间隔 (毫秒)
    pub queue_sweep_interval_ms: u64,
    /// 充值中订单多久未更新视为卡单 (毫秒)
    pub stuck_order_timeout_ms: i64,
    /// 客户通知最大投递次数
    pub notify_max_attempts: i64,
    /// 关闭超时时间 (毫秒)
    pub shutdown_timeout_ms: u64,
}

impl Config {
    /// 从环境变量加载配置
    ///
    /// 如果环境变量未设置，使用默认值
    pub fn from_env() -> Self {
        Self {
            work_dir: std::env::var("WORK_DIR").unwrap_or_else(|_| "/var/lib/recharge".into()),
            http_port: std::env::var("HTTP_PORT")
                .ok()
                .and_then(|p| p.parse().ok())
                .unwrap_or(3000),
            environment: std::env::var("ENVIRONMENT").unwrap_or_else(|_| "development".into()),
            recharge_workers: std::env::var("RECHARGE_WORKERS")
                .ok()
                .and_then(|p| p.parse().ok())
                .unwrap_or(4),
            submit_timeout_ms: std::env::var("SUBMIT_TIMEOUT_MS")
                .ok()
                .and_then(|p| p.parse().ok())
                .unwrap_or(15000),
            retry_scan_interval_ms: std::env::var("RETRY_SCAN_INTERVAL_MS")
                .ok()
                .and_then(|p| p.parse().ok())
                .unwrap_or(10000),
            retry_backoff_ms: std::env::var("RETRY_BACKOFF_MS")
                .ok()
                .and_then(|p| p.parse().ok())
                .unwrap_or(300_000),
            max_platform_switches: std::env::var("MAX_PLATFORM_SWITCHES")
                .ok()
                .and_then(|p| p.parse().ok())
                .unwrap_or(3),
            queue_sweep_interval_ms: std::env::var("QUEUE_SWEEP_INTERVAL_MS")
                .ok()
                .and_then(|p| p.parse().ok())
                .unwrap_or(60_000),
            stuck_order_timeout_ms: std::env::var("STUCK_ORDER_TIMEOUT_MS")
                .ok()
                .and_then(|p| p.parse().ok())
                .unwrap_or(300_000),
            notify_max_attempts: std::env::var("NOTIFY_MAX_ATTEMPTS")
                .ok()
                .and_then(|p| p.parse().ok())
                .unwrap_or(5),
            shutdown_timeout_ms: std::env::var("SHUTDOWN_TIMEOUT_MS")
                .ok()
                .and_then(|p| p.parse().ok())
                .unwrap_or(10000),
        }
    }

    /// 使用自定义工作目录和端口覆盖配置
    ///
    /// 常用于测试场景
    pub fn with_overrides(work_dir: impl Into<String>, http_port: u16) -> Self {
        let mut config = Self::from_env();
        config.work_dir = work_dir.into();
        config.http_port = http_port;
        config
    }

    /// 数据库文件路径
    pub fn db_path(&self) -> String {
        format!("{}/recharge.db", self.work_dir)
    }

    /// 任务队列文件路径
    pub fn queue_path(&self) -> String {
        format!("{}/task_queue.redb", self.work_dir)
    }

    /// 是否生产环境
    pub fn is_production(&self) -> bool {
        self.environment == "production"
    }

    /// 是否开发环境
    pub fn is_development(&self) -> bool {
        self.environment == "development"
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::from_env()
    }
}
