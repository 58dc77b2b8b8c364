//! Recharge Server - 话费充值订单编排服务
//!
//! # 架构概述
//!
//! 本模块是充值编排节点的主入口，提供以下核心功能：
//!
//! - **任务队列** (`queue`): redb 持久化 FIFO 队列，幂等入队、
//!   领取即搬移、重启恢复
//! - **充值编排** (`recharge`): worker 抢占订单、选平台、提单，
//!   附带队列清扫与卡单清扫
//! - **平台切换** (`retry`): 拒单/失败后的多平台故障切换与退避
//! - **回调对账** (`callback`): 平台异步回调去重与终态回写
//! - **资金台账** (`ledger`): 事务化余额变更，授信透支，幂等流水
//! - **HTTP API** (`api`): 回调入口与健康检查
//!
//! # 模块结构
//!
//! ```text
//! recharge-server/src/
//! ├── core/          # 配置、状态、错误、后台任务
//! ├── db/            # SQLite 连接池与数据访问层
//! ├── queue/         # redb 持久化任务队列
//! ├── ledger/        # 资金台账
//! ├── platform/      # 平台适配器
//! ├── orders/        # 订单服务
//! ├── recharge/      # 充值编排与清扫
//! ├── retry/         # 平台切换重试
//! ├── callback/      # 回调对账
//! ├── notification/  # 终态通知分发
//! ├── api/           # HTTP 路由和处理器
//! └── utils/         # 日志等工具
//! ```

pub mod api;
pub mod callback;
pub mod core;
pub mod db;
pub mod ledger;
pub mod notification;
pub mod orders;
pub mod platform;
pub mod queue;
pub mod recharge;
pub mod retry;
pub mod utils;

// Re-export 公共类型
pub use core::{Config, Server, ServerState};
pub use db::DbService;
pub use ledger::{LedgerOutcome, LedgerService};
pub use orders::OrderService;
pub use platform::{PlatformAdapter, PlatformRegistry};
pub use queue::TaskQueue;

// Re-export logger functions
pub use utils::{init_logger, init_logger_with_file, setup_environment};
