//! `selrs` service entry point: opens local storage and runs the background
//! sync and refresh workers until interrupted.

use anyhow::Context;

use selrs_client::{AppState, ClientConfig};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    selrs_observability::init();

    let config = ClientConfig::from_env().context("invalid configuration")?;
    tracing::info!(
        api_url = %config.api_base_url,
        sync_url = %config.sync_server_url,
        flush_policy = config.flush_policy.as_str(),
        "starting selrs"
    );

    let state = AppState::open(config).await?;
    tracing::info!(
        mode = %state.get_mode().await,
        pending = state.sync_status().items_pending,
        "local storage ready"
    );

    let services = state.start_background();
    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for shutdown signal")?;

    tracing::info!("shutting down");
    services.stop().await;
    Ok(())
}
