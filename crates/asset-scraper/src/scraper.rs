//! The scrape pipeline: queue admission in front of the page extractor.

use crate::asset::{AssetCode, AssetRecord, AssetType};
use crate::coordinator::AssetSource;
use crate::extractor::PageExtractor;
use crate::queue::{JobQueue, QueueError, QueueStats};
use crate::session::SessionManager;
use anyhow::Result;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Instant;
use tracing::{error, info, warn};

/// Runs extraction jobs through the bounded queue against one browser.
pub struct Scraper {
    queue: Arc<JobQueue>,
    session: Arc<SessionManager>,
    extractor: PageExtractor,
}

impl Scraper {
    pub fn new(queue: Arc<JobQueue>, session: Arc<SessionManager>, extractor: PageExtractor) -> Self {
        Self {
            queue,
            session,
            extractor,
        }
    }

    /// Queue an extraction and wait for it.
    ///
    /// `Ok(None)` means the job ran and produced nothing (unknown code or a
    /// failed scrape). Errors come only from the queue itself.
    pub async fn fetch(
        &self,
        asset: AssetType,
        code: &AssetCode,
    ) -> Result<Option<AssetRecord>, QueueError> {
        self.queue.submit(self.run_job(asset, code)).await
    }

    /// One extraction job. Failures are logged here and become `None`.
    async fn run_job(&self, asset: AssetType, code: &AssetCode) -> Option<AssetRecord> {
        let start = Instant::now();
        match self.extractor.extract(asset, code).await {
            Ok(record) => {
                info!(
                    %asset,
                    %code,
                    elapsed_ms = start.elapsed().as_millis() as u64,
                    "extracted"
                );
                Some(record)
            }
            Err(e) if e.is_not_found() => {
                warn!(%asset, %code, "{e}");
                None
            }
            Err(e) => {
                error!(
                    %asset,
                    %code,
                    elapsed_ms = start.elapsed().as_millis() as u64,
                    "extraction failed: {e}"
                );
                None
            }
        }
    }

    pub fn queue(&self) -> Arc<JobQueue> {
        Arc::clone(&self.queue)
    }

    pub fn stats(&self) -> QueueStats {
        self.queue.stats()
    }

    /// Stop taking jobs, wait for the queued ones, then close the browser.
    pub async fn shutdown(&self) -> Result<()> {
        self.queue.close();
        info!("draining job queue");
        self.queue.drain().await;
        self.session.shutdown().await
    }
}

#[async_trait]
impl AssetSource for Scraper {
    async fn fetch(
        &self,
        asset: AssetType,
        code: &AssetCode,
    ) -> Result<Option<AssetRecord>, QueueError> {
        Scraper::fetch(self, asset, code).await
    }
}
