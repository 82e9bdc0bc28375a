//! `asset-scraper sweep`: one refresh cycle against the configured store.

use super::{build_scraper, open_store};
use crate::config::Settings;
use crate::coordinator::{AssetSource, CacheCoordinator};
use anyhow::{Context, Result};
use std::sync::Arc;

pub async fn run(settings: &Settings) -> Result<()> {
    let store = open_store(&settings.redis_url).await?;
    let scraper = build_scraper(settings);
    let coordinator = CacheCoordinator::new(
        store,
        Arc::clone(&scraper) as Arc<dyn AssetSource>,
        settings.cache.clone(),
    );

    let report = coordinator.sweep().await;
    scraper.shutdown().await?;

    let report = report.context("cache sweep failed")?;
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}
