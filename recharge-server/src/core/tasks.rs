//! 后台任务管理
//!
//! 充值 worker、各类清扫器和通知分发都通过这里注册，共享一个
//! 取消令牌，关机时统一收尾。

use futures::FutureExt;
use std::fmt;
use std::panic::AssertUnwindSafe;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskKind {
    /// 启动时运行一次（如队列在途恢复）
    Warmup,
    /// 长驻 worker，只应在 shutdown 时退出
    Worker,
    /// 周期扫描（队列清扫、重试扫描、通知分发）
    Periodic,
}

impl fmt::Display for TaskKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            TaskKind::Warmup => "warmup",
            TaskKind::Worker => "worker",
            TaskKind::Periodic => "periodic",
        };
        f.write_str(label)
    }
}

struct RegisteredTask {
    name: &'static str,
    kind: TaskKind,
    handle: JoinHandle<()>,
}

/// 后台任务管理器
///
/// 注册即启动。每个任务被包一层 panic 捕获，长驻任务在
/// shutdown 之外退出会留下告警日志。
pub struct BackgroundTasks {
    tasks: Vec<RegisteredTask>,
    shutdown: CancellationToken,
}

impl BackgroundTasks {
    pub fn new() -> Self {
        Self {
            tasks: Vec::new(),
            shutdown: CancellationToken::new(),
        }
    }

    /// 任务内部监听 shutdown 用的令牌
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// 注册并启动一个后台任务
    pub fn spawn<F>(&mut self, name: &'static str, kind: TaskKind, future: F)
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        let guarded = async move {
            match AssertUnwindSafe(future).catch_unwind().await {
                Ok(()) => {
                    // Warmup 任务跑完一次就该退出
                    if kind != TaskKind::Warmup {
                        tracing::warn!(task = %name, kind = %kind, "Background task exited outside shutdown");
                    }
                }
                Err(panic_info) => {
                    let msg = panic_info
                        .downcast_ref::<&str>()
                        .map(|s| (*s).to_string())
                        .or_else(|| panic_info.downcast_ref::<String>().cloned())
                        .unwrap_or_else(|| "unknown panic".to_string());
                    tracing::error!(task = %name, kind = %kind, panic = %msg, "Background task panicked");
                }
            }
        };

        self.tasks.push(RegisteredTask {
            name,
            kind,
            handle: tokio::spawn(guarded),
        });
        tracing::debug!(task = %name, kind = %kind, "Background task started");
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    pub fn log_summary(&self) {
        let count = |kind| self.tasks.iter().filter(|t| t.kind == kind).count();
        tracing::info!(
            total = self.tasks.len(),
            workers = count(TaskKind::Worker),
            periodic = count(TaskKind::Periodic),
            "Background tasks running"
        );
    }

    /// 返回已意外终止的任务数
    pub fn check_health(&self) -> usize {
        self.tasks
            .iter()
            .filter(|task| {
                if task.handle.is_finished() {
                    tracing::error!(task = %task.name, kind = %task.kind, "Background task is no longer running");
                    true
                } else {
                    false
                }
            })
            .count()
    }

    /// 取消全部任务并逐个等待退出
    pub async fn shutdown(self) {
        tracing::info!(total = self.tasks.len(), "Stopping background tasks");
        self.shutdown.cancel();

        for task in self.tasks {
            match task.handle.await {
                Ok(()) => tracing::debug!(task = %task.name, "Task stopped"),
                Err(e) if e.is_cancelled() => tracing::debug!(task = %task.name, "Task cancelled"),
                Err(e) => tracing::error!(task = %task.name, error = ?e, "Task join failed"),
            }
        }
        tracing::info!("All background tasks stopped");
    }
}

impl Default for BackgroundTasks {
    fn default() -> Self {
        Self::new()
    }
}
