use anyhow::{Context, Result};
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

use ou_access_service::build_router;
use ou_access_service::config::Config;

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::from_env().context("failed to load configuration from the environment")?;

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(&config.log_filter)),
        )
        .init();

    tracing::info!(
        target: "ou_access",
        bind_addr = %config.bind_addr,
        subject = %config.user_email,
        admin = %config.admin_email,
        daily_switch_limit = config.switch_limit,
        elevation_duration_minutes = config.duration_minutes,
        "starting ou-access-service",
    );

    let listener = TcpListener::bind(config.bind_addr)
        .await
        .with_context(|| format!("failed to bind {}", config.bind_addr))?;
    axum::serve(listener, build_router(config).into_make_service())
        .await
        .context("server exited unexpectedly")?;

    Ok(())
}
