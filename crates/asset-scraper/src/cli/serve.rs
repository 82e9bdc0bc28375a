//! `asset-scraper serve`: run the HTTP API until interrupted.

use super::{build_scraper, open_store};
use crate::api::{self, AppState};
use crate::config::Settings;
use crate::coordinator::{AssetSource, CacheCoordinator};
use anyhow::{Context, Result};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::Notify;
use tracing::{info, warn};

pub async fn run(settings: &Settings, port: Option<u16>) -> Result<()> {
    let token = settings
        .api_token
        .clone()
        .context("API_TOKEN must be set to serve the API")?;

    info!("starting asset-scraper v{}", env!("CARGO_PKG_VERSION"));

    let store = open_store(&settings.redis_url).await?;
    let scraper = build_scraper(settings);
    let coordinator = CacheCoordinator::new(
        store,
        Arc::clone(&scraper) as Arc<dyn AssetSource>,
        settings.cache.clone(),
    );

    let shutdown = Arc::new(Notify::new());
    let sweeper = settings
        .auto_refresh
        .then(|| coordinator.spawn_sweeper(settings.refresh_interval, Arc::clone(&shutdown)));

    let state = Arc::new(AppState {
        coordinator,
        queue: scraper.queue(),
        token,
    });
    let addr = SocketAddr::from(([0, 0, 0, 0], port.unwrap_or(settings.port)));

    // The signal stops the sweeper first, then the server stops accepting
    // and finishes in-flight requests.
    let signal = {
        let shutdown = Arc::clone(&shutdown);
        async move {
            wait_for_signal().await;
            info!("shutdown signal received");
            shutdown.notify_one();
        }
    };
    let served = api::serve(addr, state, signal).await;

    if let Some(sweeper) = sweeper {
        if let Err(e) = sweeper.await {
            warn!("cache sweeper task failed: {e}");
        }
    }
    scraper.shutdown().await?;
    info!("shutdown complete");
    served
}

async fn wait_for_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("failed to listen for Ctrl-C: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                warn!("failed to listen for SIGTERM: {e}");
                std::future::pending::<()>().await;
            }
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}
