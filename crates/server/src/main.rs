mod bootstrap;
mod health;
mod workflows;

use anyhow::Result;
use parley_core::config::{AppConfig, LoadOptions};

fn init_logging(config: &AppConfig) {
    use parley_core::config::LogFormat::*;
    use tracing::Level;

    let log_level = config.logging.level.parse::<Level>().unwrap_or(Level::INFO);

    match config.logging.format {
        Compact => {
            tracing_subscriber::fmt().with_target(false).with_max_level(log_level).compact().init();
        }
        Pretty => {
            tracing_subscriber::fmt().with_target(false).with_max_level(log_level).pretty().init();
        }
        Json => {
            tracing_subscriber::fmt().with_target(false).with_max_level(log_level).json().init();
        }
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    run().await
}

pub async fn run() -> Result<()> {
    let config = AppConfig::load(LoadOptions::default())?;
    init_logging(&config);

    let app = bootstrap::bootstrap_with_config(config)?;

    health::spawn(
        &app.config.server.bind_address,
        app.config.server.health_check_port,
        app.engine.registry().clone(),
    )
    .await?;

    tracing::info!(
        event_name = "system.server.started",
        correlation_id = "bootstrap",
        default_timeout_secs = app.engine.config().default_timeout.as_secs(),
        "parley-server started"
    );

    tokio::select! {
        result = app.runner.start() => {
            result?;
            wait_for_shutdown().await?;
        }
        result = wait_for_shutdown() => result?,
    }

    let pending = app.engine.registry().len();
    tracing::info!(
        event_name = "system.server.stopping",
        correlation_id = "shutdown",
        pending_prompts = pending,
        "parley-server stopping"
    );

    Ok(())
}

async fn wait_for_shutdown() -> Result<()> {
    tokio::signal::ctrl_c().await?;
    Ok(())
}
