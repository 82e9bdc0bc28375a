//! Subcommand implementations for the `asset-scraper` binary.

pub mod scrape_cmd;
pub mod serve;
pub mod sweep_cmd;

use crate::config::Settings;
use crate::extractor::PageExtractor;
use crate::queue::JobQueue;
use crate::renderer::chromium::ChromiumLauncher;
use crate::scraper::Scraper;
use crate::session::SessionManager;
use crate::store::{CacheStore, MemoryStore, RedisStore, MEMORY_URL};
use anyhow::{Context, Result};
use std::sync::Arc;
use tracing::warn;

/// Wire the browser session, extractor and queue into a [`Scraper`].
///
/// No browser is started until the first job runs.
pub fn build_scraper(settings: &Settings) -> Arc<Scraper> {
    let session = Arc::new(SessionManager::new(ChromiumLauncher::new(
        settings.browser.clone(),
    )));
    let extractor = PageExtractor::new(
        Arc::clone(&session),
        &settings.base_url,
        settings.navigation_timeout,
    );
    let queue = Arc::new(JobQueue::new(settings.queue.clone()));
    Arc::new(Scraper::new(queue, session, extractor))
}

/// Open the cache backend named by `url`.
pub async fn open_store(url: &str) -> Result<Arc<dyn CacheStore>> {
    if url == MEMORY_URL {
        warn!("using the in-process cache, entries are lost on restart");
        return Ok(Arc::new(MemoryStore::new()));
    }
    let store = RedisStore::connect(url)
        .await
        .context("failed to open cache store")?;
    Ok(Arc::new(store))
}
