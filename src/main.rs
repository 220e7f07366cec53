mod api;
mod combiner;
mod config;
mod error;
mod refresh;
mod sources;
mod state;
mod types;

use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use crate::api::routes::{router, ApiState};
use crate::config::Config;
use crate::error::Result;
use crate::refresh::RefreshCoordinator;

#[tokio::main]
async fn main() {
    let cfg = match Config::from_env() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Config error: {e}");
            std::process::exit(1);
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(&cfg.log_level))
        .init();

    if let Err(e) = run(cfg).await {
        error!("Fatal error: {e}");
        std::process::exit(1);
    }
}

async fn run(cfg: Config) -> Result<()> {
    info!(
        "Sources: listing={} rewards={} (min_vol=${:.0}, min_liq=${:.0}, page={})",
        cfg.gamma_api_url,
        cfg.rewards_base_url,
        cfg.min_volume,
        cfg.min_liquidity,
        cfg.listing_page_size,
    );
    if !cfg.rewards_enabled {
        warn!(
            "REWARDS_ENABLED=false: rewards membership will not be scraped, \
             every market reports has_rewards=false"
        );
    }

    let coordinator = RefreshCoordinator::from_config(&cfg)?;

    // --- Initial cycle; it re-arms the auto-refresh timer when done ---
    coordinator.start_refresh();
    info!(
        "Auto-refresh every {}s, adapter timeout {}s",
        cfg.refresh_interval.as_secs(),
        cfg.adapter_timeout.as_secs(),
    );

    // --- HTTP API server ---
    let app = router(ApiState { coordinator: coordinator.clone() });
    let bind_addr = format!("0.0.0.0:{}", cfg.api_port);
    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    info!("HTTP API listening on {bind_addr}");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    coordinator.cancel_auto_refresh();
    info!("Shut down");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for ctrl-c: {e}");
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
