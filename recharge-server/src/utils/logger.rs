//! 日志初始化
//!
//! EnvFilter + fmt，配置了 LOG_DIR 时改写按天滚动的文件。

use tracing_subscriber::EnvFilter;

pub fn init_logger() {
    init_logger_with_file(None, None);
}

/// 初始化日志
///
/// `log_dir` 指向已存在的目录时，输出落到按天滚动的文件而非
/// 控制台。
pub fn init_logger_with_file(log_level: Option<&str>, log_dir: Option<&str>) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(log_level.unwrap_or("info")));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false);

    match log_dir {
        Some(dir) if std::path::Path::new(dir).exists() => {
            let appender = tracing_appender::rolling::daily(dir, "recharge-server.log");
            builder.with_writer(appender).init();
        }
        _ => builder.init(),
    }
}
