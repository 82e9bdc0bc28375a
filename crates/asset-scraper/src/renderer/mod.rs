//! Browser seam.
//!
//! Asset pages only show their indicators after client-side rendering, so
//! extraction goes through a real browser. The traits here keep the session
//! and extractor independent of chromiumoxide.

pub mod chromium;

use crate::schema::WaitStrategy;
use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Where navigation ended up and how long it took.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NavigationResult {
    /// URL after redirects.
    pub final_url: String,
    /// Time taken until the page was ready, in milliseconds.
    pub load_time_ms: u64,
}

/// A running browser that hands out pages.
#[async_trait]
pub trait Renderer: Send + Sync {
    /// Open a fresh page.
    async fn new_context(&self) -> Result<Box<dyn RenderContext>>;
    /// Whether the connection to the browser is still alive.
    fn is_connected(&self) -> bool;
    /// Shut down the browser engine. Safe to call more than once.
    async fn shutdown(&self) -> Result<()>;
    /// Number of currently open contexts.
    fn active_contexts(&self) -> usize;
}

/// One page, owned by a single extraction job.
#[async_trait]
pub trait RenderContext: Send + Sync {
    /// Navigate to a URL and wait until it is ready per `wait`.
    async fn navigate(
        &mut self,
        url: &str,
        wait: WaitStrategy,
        timeout_ms: u64,
    ) -> Result<NavigationResult>;
    /// Serialized DOM of the current page.
    async fn html(&self) -> Result<String>;
    async fn close(self: Box<Self>) -> Result<()>;
}

/// Produces a fresh renderer whenever the session manager needs one.
#[async_trait]
pub trait Launcher: Send + Sync {
    async fn launch(&self) -> Result<std::sync::Arc<dyn Renderer>>;
}
