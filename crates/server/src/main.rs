mod bootstrap;
mod chat;
mod delivery;
mod health;
mod rater;
mod transcription;

use std::time::Duration;

use anyhow::{bail, Result};
use raterbot_core::config::{AppConfig, LoadOptions};
use raterbot_telegram::PollExit;
use tracing_subscriber::EnvFilter;

fn init_logging(config: &AppConfig) {
    use raterbot_core::config::LogFormat::*;

    let filter = EnvFilter::try_new(&config.logging.level)
        .unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt().with_target(false).with_env_filter(filter);

    match config.logging.format {
        Compact => builder.compact().init(),
        Pretty => builder.pretty().init(),
        Json => builder.json().init(),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    run().await
}

pub async fn run() -> Result<()> {
    let config = AppConfig::load(LoadOptions::default())?;
    init_logging(&config);

    let app = bootstrap::bootstrap_with_config(config).await?;

    health::spawn(
        &app.config.server.bind_address,
        app.config.server.health_check_port,
        health::HealthState::new(app.db_pool.clone(), Some(app.agent_runtime.clone())),
    )
    .await?;

    tracing::info!(
        event_name = "system.server.started",
        correlation_id = "bootstrap",
        rater_url = %app.config.rater.url,
        "raterbot-server polling telegram"
    );

    let grace = Duration::from_secs(app.config.server.graceful_shutdown_secs);
    let exit = app.telegram_runner.run_until(shutdown_signal(), grace).await;

    tracing::info!(
        event_name = "system.server.stopping",
        correlation_id = "shutdown",
        exit = ?exit,
        active_conversations = app.agent_runtime.active_conversations(),
        "raterbot-server stopping"
    );
    app.db_pool.close().await;

    if exit == PollExit::StreamClosed {
        bail!("telegram update stream closed unexpectedly");
    }
    Ok(())
}

async fn shutdown_signal() {
    if let Err(error) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %error, "failed to listen for ctrl-c; running until killed");
        std::future::pending::<()>().await;
    }
}
