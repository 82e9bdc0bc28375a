//! Headless Chromium over the DevTools protocol (chromiumoxide).

use super::{Launcher, NavigationResult, RenderContext, Renderer};
use crate::schema::WaitStrategy;
use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::cdp::browser_protocol::fetch::{
    EnableParams, EventRequestPaused, FailRequestParams, RequestPattern, RequestStage,
};
use chromiumoxide::cdp::browser_protocol::network::{ErrorReason, ResourceType};
use chromiumoxide::cdp::browser_protocol::page::NavigateParams;
use chromiumoxide::page::Page;
use chromiumoxide::Handler;
use futures::StreamExt;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Fallback binary when nothing else is configured or found.
const DEFAULT_CHROMIUM_PATH: &str = "/usr/bin/chromium-browser";

/// Resource types the per-page filter refuses to load.
const BLOCKED_RESOURCES: [ResourceType; 4] = [
    ResourceType::Image,
    ResourceType::Stylesheet,
    ResourceType::Font,
    ResourceType::Media,
];

/// Poll interval while waiting for `document.readyState`.
const READY_POLL: Duration = Duration::from_millis(50);

/// Resolve the Chromium binary: configured path, then `PATH`, then the default.
pub fn find_chromium(configured: Option<&PathBuf>) -> PathBuf {
    if let Some(path) = configured {
        return path.clone();
    }
    for name in ["chromium-browser", "chromium", "google-chrome"] {
        if let Ok(path) = which::which(name) {
            return path;
        }
    }
    PathBuf::from(DEFAULT_CHROMIUM_PATH)
}

/// How to reach a browser: a remote DevTools endpoint or a local binary.
#[derive(Debug, Clone, Default)]
pub struct BrowserOptions {
    /// `ws://` DevTools endpoint of an already running browser.
    pub ws_endpoint: Option<String>,
    /// Explicit Chromium executable for local launches.
    pub executable: Option<PathBuf>,
}

/// Launches or connects a [`ChromiumRenderer`] from [`BrowserOptions`].
pub struct ChromiumLauncher {
    options: BrowserOptions,
}

impl ChromiumLauncher {
    pub fn new(options: BrowserOptions) -> Self {
        Self { options }
    }
}

#[async_trait]
impl Launcher for ChromiumLauncher {
    async fn launch(&self) -> Result<Arc<dyn Renderer>> {
        let renderer = match &self.options.ws_endpoint {
            Some(endpoint) => ChromiumRenderer::connect(endpoint).await?,
            None => {
                ChromiumRenderer::launch(find_chromium(self.options.executable.as_ref())).await?
            }
        };
        Ok(Arc::new(renderer))
    }
}

/// A launched or connected Chromium. Pages come from [`Renderer::new_context`].
pub struct ChromiumRenderer {
    browser: Mutex<Option<Browser>>,
    handler_task: JoinHandle<()>,
    active_count: Arc<AtomicUsize>,
}

impl ChromiumRenderer {
    /// Launch a local headless Chromium.
    pub async fn launch(chrome_path: PathBuf) -> Result<Self> {
        info!("launching Chromium from {}", chrome_path.display());

        let config = BrowserConfig::builder()
            .chrome_executable(chrome_path)
            .no_sandbox()
            .window_size(1280, 720)
            .arg("--headless=new")
            .arg("--disable-setuid-sandbox")
            .arg("--disable-dev-shm-usage")
            .arg("--disable-accelerated-2d-canvas")
            .arg("--disable-gpu")
            .arg("--disable-background-networking")
            .arg("--no-zygote")
            .build()
            .map_err(|e| anyhow::anyhow!("failed to build browser config: {e}"))?;

        let (browser, handler) = Browser::launch(config)
            .await
            .context("failed to launch Chromium")?;

        Ok(Self::from_parts(browser, handler))
    }

    /// Connect to a running browser over its DevTools WebSocket.
    pub async fn connect(endpoint: &str) -> Result<Self> {
        info!("connecting to Chromium at {endpoint}");

        let (browser, handler) = Browser::connect(endpoint)
            .await
            .with_context(|| format!("failed to connect to Chromium at {endpoint}"))?;

        Ok(Self::from_parts(browser, handler))
    }

    fn from_parts(browser: Browser, mut handler: Handler) -> Self {
        // The handler stream ends when the connection drops, which is what
        // `is_connected` observes.
        let handler_task = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(e) = event {
                    debug!("browser handler error: {e}");
                }
            }
            warn!("browser connection closed");
        });

        Self {
            browser: Mutex::new(Some(browser)),
            handler_task,
            active_count: Arc::new(AtomicUsize::new(0)),
        }
    }
}

#[async_trait]
impl Renderer for ChromiumRenderer {
    async fn new_context(&self) -> Result<Box<dyn RenderContext>> {
        let page = {
            let guard = self.browser.lock().await;
            let browser = guard.as_ref().context("browser already shut down")?;
            browser
                .new_page("about:blank")
                .await
                .context("failed to create new page")?
        };

        let filter_task = match install_resource_filter(&page).await {
            Ok(task) => task,
            Err(e) => {
                let _ = page.close().await;
                return Err(e);
            }
        };

        self.active_count.fetch_add(1, Ordering::Relaxed);

        Ok(Box::new(ChromiumContext {
            page,
            filter_task,
            active_count: Arc::clone(&self.active_count),
        }))
    }

    fn is_connected(&self) -> bool {
        !self.handler_task.is_finished()
    }

    async fn shutdown(&self) -> Result<()> {
        let Some(mut browser) = self.browser.lock().await.take() else {
            return Ok(());
        };
        if self.is_connected() {
            if let Err(e) = browser.close().await {
                warn!("failed to close browser cleanly: {e}");
            }
            let _ = browser.wait().await;
        }
        self.handler_task.abort();
        info!("browser closed");
        Ok(())
    }

    fn active_contexts(&self) -> usize {
        self.active_count.load(Ordering::Relaxed)
    }
}

/// Fail image, stylesheet, font and media requests for one page.
async fn install_resource_filter(page: &Page) -> Result<JoinHandle<()>> {
    let mut paused = page
        .event_listener::<EventRequestPaused>()
        .await
        .context("failed to subscribe to paused requests")?;

    let patterns = BLOCKED_RESOURCES
        .iter()
        .map(|resource| RequestPattern {
            url_pattern: None,
            resource_type: Some(resource.clone()),
            request_stage: Some(RequestStage::Request),
        })
        .collect();
    page.execute(EnableParams {
        patterns: Some(patterns),
        handle_auth_requests: None,
    })
    .await
    .context("failed to enable request interception")?;

    let page = page.clone();
    Ok(tokio::spawn(async move {
        while let Some(event) = paused.next().await {
            let fail = FailRequestParams::new(event.request_id.clone(), ErrorReason::BlockedByClient);
            if let Err(e) = page.execute(fail).await {
                debug!("failed to block request: {e}");
            }
        }
    }))
}

/// A Chromium tab with the resource filter installed.
pub struct ChromiumContext {
    page: Page,
    filter_task: JoinHandle<()>,
    active_count: Arc<AtomicUsize>,
}

impl ChromiumContext {
    async fn ready_state(&self) -> Result<bool> {
        let ready: bool = self
            .page
            .evaluate("document.readyState !== 'loading' && location.href !== 'about:blank'")
            .await
            .context("failed to read document state")?
            .into_value()
            .map_err(|e| anyhow::anyhow!("failed to convert document state: {e:?}"))?;
        Ok(ready)
    }

    async fn load(&mut self, url: &str, wait: WaitStrategy) -> Result<()> {
        match wait {
            WaitStrategy::DomContentLoaded => {
                let response = self
                    .page
                    .execute(NavigateParams::new(url))
                    .await
                    .context("navigation request failed")?;
                if let Some(error) = &response.result.error_text {
                    bail!("navigation failed: {error}");
                }
                while !self.ready_state().await? {
                    tokio::time::sleep(READY_POLL).await;
                }
            }
        }
        Ok(())
    }
}

#[async_trait]
impl RenderContext for ChromiumContext {
    async fn navigate(
        &mut self,
        url: &str,
        wait: WaitStrategy,
        timeout_ms: u64,
    ) -> Result<NavigationResult> {
        let start = Instant::now();

        let result =
            tokio::time::timeout(Duration::from_millis(timeout_ms), self.load(url, wait)).await;

        let load_time_ms = start.elapsed().as_millis() as u64;

        match result {
            Ok(Ok(())) => {
                let final_url = self
                    .page
                    .url()
                    .await
                    .unwrap_or_default()
                    .unwrap_or_else(|| url.to_string());

                Ok(NavigationResult {
                    final_url,
                    load_time_ms,
                })
            }
            Ok(Err(e)) => Err(e),
            Err(_) => bail!("navigation timed out after {timeout_ms}ms"),
        }
    }

    async fn html(&self) -> Result<String> {
        let result = self
            .page
            .evaluate("document.documentElement.outerHTML")
            .await
            .context("failed to get HTML")?;

        let html: String = result
            .into_value()
            .map_err(|e| anyhow::anyhow!("failed to convert HTML result: {e:?}"))?;

        Ok(html)
    }

    async fn close(self: Box<Self>) -> Result<()> {
        self.active_count.fetch_sub(1, Ordering::Relaxed);
        self.filter_task.abort();
        self.page
            .clone()
            .close()
            .await
            .context("failed to close page")?;
        Ok(())
    }
}
