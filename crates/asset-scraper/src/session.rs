//! Browser session management.
//!
//! Owns the single process-wide browser and hands out one exclusive page
//! per extraction job. The browser is launched lazily and relaunched when
//! the connection is found to be gone.

use crate::renderer::{Launcher, RenderContext, Renderer};
use anyhow::{Context, Result};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// Owner of the shared browser instance.
pub struct SessionManager {
    launcher: Box<dyn Launcher>,
    renderer: Mutex<Option<Arc<dyn Renderer>>>,
}

impl SessionManager {
    pub fn new(launcher: impl Launcher + 'static) -> Self {
        Self {
            launcher: Box::new(launcher),
            renderer: Mutex::new(None),
        }
    }

    /// The live renderer, launching or relaunching it if needed.
    async fn renderer(&self) -> Result<Arc<dyn Renderer>> {
        let mut slot = self.renderer.lock().await;
        if let Some(renderer) = slot.as_ref() {
            if renderer.is_connected() {
                return Ok(Arc::clone(renderer));
            }
            warn!("browser disconnected, starting a new one");
            if let Err(e) = renderer.shutdown().await {
                debug!("stale browser shutdown failed: {e}");
            }
        }
        let renderer = self.launcher.launch().await?;
        info!("browser ready");
        *slot = Some(Arc::clone(&renderer));
        Ok(renderer)
    }

    /// Open a fresh page scoped to the caller.
    pub async fn acquire(&self) -> Result<PageLease> {
        let context = self.renderer().await?.new_context().await?;
        Ok(PageLease {
            context: Some(context),
        })
    }

    /// Close a page obtained from [`acquire`](Self::acquire).
    pub async fn release(&self, lease: PageLease) {
        lease.close().await;
    }

    /// Whether a browser has been started and is still connected.
    pub async fn is_running(&self) -> bool {
        self.renderer
            .lock()
            .await
            .as_ref()
            .is_some_and(|r| r.is_connected())
    }

    /// Number of pages currently open on the live browser.
    pub async fn open_pages(&self) -> usize {
        self.renderer
            .lock()
            .await
            .as_ref()
            .map_or(0, |r| r.active_contexts())
    }

    /// Close the browser. Calling this again, or before any launch, is a no-op.
    pub async fn shutdown(&self) -> Result<()> {
        let renderer = self.renderer.lock().await.take();
        match renderer {
            Some(renderer) => renderer.shutdown().await,
            None => Ok(()),
        }
    }
}

/// An exclusive page borrowed from the [`SessionManager`].
///
/// Closed by [`close`](Self::close). A lease dropped without closing (for
/// instance when its job timed out) closes its page in the background.
pub struct PageLease {
    context: Option<Box<dyn RenderContext>>,
}

impl PageLease {
    pub fn page(&mut self) -> Result<&mut (dyn RenderContext + 'static)> {
        self.context
            .as_deref_mut()
            .context("page lease already closed")
    }

    pub async fn close(mut self) {
        if let Some(context) = self.context.take() {
            if let Err(e) = context.close().await {
                warn!("failed to close page: {e:#}");
            }
        }
    }
}

impl Drop for PageLease {
    fn drop(&mut self) {
        let Some(context) = self.context.take() else {
            return;
        };
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move {
                    if let Err(e) = context.close().await {
                        debug!("failed to close abandoned page: {e}");
                    }
                });
            }
            Err(_) => warn!("page dropped outside the runtime, leaving it open"),
        }
    }
}
