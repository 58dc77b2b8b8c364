use anyhow::Context;
use recharge_server::{Config, Server, ServerState, setup_environment};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    setup_environment().context("environment setup failed")?;

    let config = Config::from_env();
    tracing::info!(
        port = config.http_port,
        workers = config.recharge_workers,
        "Recharge server starting"
    );

    let state = ServerState::initialize(&config).await;

    // Server::run 内部先启动后台任务再监听 HTTP
    Server::with_state(config, state)
        .run()
        .await
        .context("server exited with error")
}
