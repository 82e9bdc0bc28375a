//! Read-through cache in front of the scraper.
//!
//! Entries are served while present. An entry whose remaining TTL drops
//! below the refresh threshold is still served, and a single background
//! refresh re-primes it. The sweep does the same for every cached key so
//! that popular entries never expire under load.

use crate::asset::{cache_key, parse_cache_key, AssetCode, AssetRecord, AssetType};
use crate::queue::QueueError;
use crate::store::{CacheStore, StoreError, TTL_MISSING};
use async_trait::async_trait;
use serde::Serialize;
use std::collections::HashSet;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

/// Where fresh records come from.
#[async_trait]
pub trait AssetSource: Send + Sync {
    /// `Ok(None)` when the asset could not be extracted.
    async fn fetch(
        &self,
        asset: AssetType,
        code: &AssetCode,
    ) -> Result<Option<AssetRecord>, QueueError>;
}

#[derive(Debug, Clone)]
pub struct CacheSettings {
    /// TTL written with every entry.
    pub expiration: Duration,
    /// Entries with less remaining TTL than this are refreshed.
    pub refresh_threshold: Duration,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            expiration: Duration::from_secs(86_400),
            refresh_threshold: Duration::from_secs(3_600),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    #[error("{asset} {code} not found")]
    NotFound { asset: AssetType, code: String },

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Queue(#[from] QueueError),

    #[error("failed to encode record: {0}")]
    Codec(#[from] serde_json::Error),
}

/// Outcome of one sweep cycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SweepReport {
    pub scanned: usize,
    pub refreshed: usize,
    pub failed: usize,
    /// Keys already being refreshed in the background.
    pub skipped: usize,
}

#[derive(Clone)]
pub struct CacheCoordinator {
    inner: Arc<Inner>,
}

struct Inner {
    store: Arc<dyn CacheStore>,
    source: Arc<dyn AssetSource>,
    settings: CacheSettings,
    refreshing: Mutex<HashSet<String>>,
}

impl CacheCoordinator {
    pub fn new(
        store: Arc<dyn CacheStore>,
        source: Arc<dyn AssetSource>,
        settings: CacheSettings,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                store,
                source,
                settings,
                refreshing: Mutex::new(HashSet::new()),
            }),
        }
    }

    pub fn settings(&self) -> &CacheSettings {
        &self.inner.settings
    }

    /// Serve a record from the cache, scraping it on a miss.
    pub async fn get(&self, asset: AssetType, raw_code: &str) -> Result<AssetRecord, CacheError> {
        let code = AssetCode::parse(raw_code).ok_or_else(|| CacheError::NotFound {
            asset,
            code: raw_code.to_string(),
        })?;
        let key = cache_key(asset, &code);
        let store = &self.inner.store;

        if let Some(raw) = store.get(&key).await? {
            match serde_json::from_str::<AssetRecord>(&raw) {
                Ok(record) => {
                    let ttl = store.ttl(&key).await?;
                    if self.is_stale(ttl) {
                        debug!(%key, ttl, "serving stale entry");
                        self.schedule_refresh(asset, code, key);
                    }
                    return Ok(record);
                }
                Err(e) => warn!(%key, "discarding unreadable cache entry: {e}"),
            }
        }

        debug!(%key, "cache miss");
        match self.inner.source.fetch(asset, &code).await? {
            Some(record) => {
                self.write(&key, &record).await?;
                Ok(record)
            }
            None => Err(CacheError::NotFound {
                asset,
                code: code.to_string(),
            }),
        }
    }

    /// Whether a TTL calls for a refresh. Missing keys never do.
    fn is_stale(&self, ttl: i64) -> bool {
        ttl != TTL_MISSING && ttl < self.inner.settings.refresh_threshold.as_secs() as i64
    }

    async fn write(&self, key: &str, record: &AssetRecord) -> Result<(), CacheError> {
        let value = serde_json::to_string(record)?;
        let ttl = self.inner.settings.expiration.as_secs().max(1);
        self.inner.store.set_ex(key, ttl, &value).await?;
        Ok(())
    }

    /// Claim `key` for refreshing. `None` if a refresh is already running.
    fn claim_refresh(&self, key: &str) -> Option<RefreshClaim> {
        let claimed = self
            .inner
            .refreshing
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.to_string());
        claimed.then(|| RefreshClaim {
            inner: Arc::clone(&self.inner),
            key: key.to_string(),
        })
    }

    /// Refresh `key` in the background unless that is already happening.
    pub fn schedule_refresh(&self, asset: AssetType, code: AssetCode, key: String) {
        let Some(claim) = self.claim_refresh(&key) else {
            debug!(%key, "refresh already in flight");
            return;
        };
        let this = self.clone();
        tokio::spawn(async move {
            let _claim = claim;
            if let Err(e) = this.refresh_one(asset, &code, &key).await {
                warn!(%key, "background refresh failed: {e}");
            }
        });
    }

    /// Scrape `code` again and overwrite its entry.
    ///
    /// Returns false when the scrape produced nothing. The existing entry is
    /// left as it was in that case.
    async fn refresh_one(
        &self,
        asset: AssetType,
        code: &AssetCode,
        key: &str,
    ) -> Result<bool, CacheError> {
        match self.inner.source.fetch(asset, code).await? {
            Some(record) => {
                self.write(key, &record).await?;
                info!(%key, "refreshed");
                Ok(true)
            }
            None => {
                warn!(%key, "refresh produced no data, keeping current entry");
                Ok(false)
            }
        }
    }

    /// Refresh every cached entry that is close to expiry.
    ///
    /// Keys are handled one at a time. A failing key is counted and logged,
    /// then the sweep moves on. Only a failure to list keys ends the cycle.
    pub async fn sweep(&self) -> Result<SweepReport, StoreError> {
        let mut report = SweepReport::default();
        let store = &self.inner.store;

        for asset in AssetType::ALL {
            let keys = store.keys(&format!("{}:*", asset.as_str())).await?;
            for key in keys {
                report.scanned += 1;
                let Some((asset, code)) = parse_cache_key(&key) else {
                    debug!(%key, "ignoring foreign key");
                    continue;
                };
                let ttl = match store.ttl(&key).await {
                    Ok(ttl) => ttl,
                    Err(e) => {
                        warn!(%key, "failed to read TTL: {e}");
                        report.failed += 1;
                        continue;
                    }
                };
                if !self.is_stale(ttl) {
                    continue;
                }
                let Some(_claim) = self.claim_refresh(&key) else {
                    report.skipped += 1;
                    continue;
                };
                debug!(%key, ttl, "refreshing near-expiry entry");
                match self.refresh_one(asset, &code, &key).await {
                    Ok(true) => report.refreshed += 1,
                    Ok(false) => report.failed += 1,
                    Err(e) => {
                        warn!(%key, "refresh failed: {e}");
                        report.failed += 1;
                    }
                }
            }
        }

        info!(
            scanned = report.scanned,
            refreshed = report.refreshed,
            failed = report.failed,
            "cache sweep finished"
        );
        Ok(report)
    }

    /// Run [`sweep`](Self::sweep) every `period` until `shutdown` is notified.
    ///
    /// A sweep in progress is abandoned at the notification. Its in-flight
    /// refresh is dropped and no further key is fetched.
    pub fn spawn_sweeper(&self, period: Duration, shutdown: Arc<Notify>) -> JoinHandle<()> {
        let this = self.clone();
        tokio::spawn(async move {
            let mut ticker = interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            info!(period_ms = period.as_millis() as u64, "cache sweeper started");

            loop {
                tokio::select! {
                    _ = shutdown.notified() => {
                        info!("cache sweeper shutting down");
                        break;
                    }
                    _ = ticker.tick() => {
                        tokio::select! {
                            _ = shutdown.notified() => {
                                info!("cache sweeper shutting down, sweep abandoned");
                                break;
                            }
                            result = this.sweep() => {
                                if let Err(e) = result {
                                    warn!("cache sweep aborted: {e}");
                                }
                            }
                        }
                    }
                }
            }
        })
    }
}

/// Holds a key in the in-flight set until dropped, so a cancelled refresh
/// never leaves its key claimed.
struct RefreshClaim {
    inner: Arc<Inner>,
    key: String,
}

impl Drop for RefreshClaim {
    fn drop(&mut self) {
        self.inner
            .refreshing
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&self.key);
    }
}
