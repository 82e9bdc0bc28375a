//! End-to-end tests: HTTP router → cache → queue → session → extractor,
//! against an in-memory browser and store.

use anyhow::{bail, Result};
use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use asset_scraper::api::{self, AppState, TOKEN_HEADER};
use asset_scraper::coordinator::{AssetSource, CacheCoordinator, CacheSettings};
use asset_scraper::extractor::PageExtractor;
use asset_scraper::queue::{JobQueue, QueueConfig, TimeoutPolicy};
use asset_scraper::renderer::{Launcher, NavigationResult, RenderContext, Renderer};
use asset_scraper::schema::WaitStrategy;
use asset_scraper::scraper::Scraper;
use asset_scraper::session::SessionManager;
use asset_scraper::store::{CacheStore, MemoryStore, StoreError};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceExt;

const BASE: &str = "https://investidor10.com.br";
const TOKEN: &str = "test-token";

// ── fake browser ────────────────────────────────────────────────────

#[derive(Default)]
struct Counters {
    navigations: AtomicUsize,
    open: AtomicUsize,
    peak_open: AtomicUsize,
    shut_down: AtomicBool,
}

struct Site {
    pages: HashMap<String, String>,
    delay: Duration,
    counters: Counters,
}

struct StaticLauncher(Arc<Site>);

#[async_trait]
impl Launcher for StaticLauncher {
    async fn launch(&self) -> Result<Arc<dyn Renderer>> {
        Ok(Arc::new(StaticRenderer(Arc::clone(&self.0))))
    }
}

struct StaticRenderer(Arc<Site>);

#[async_trait]
impl Renderer for StaticRenderer {
    async fn new_context(&self) -> Result<Box<dyn RenderContext>> {
        let counters = &self.0.counters;
        let now = counters.open.fetch_add(1, Ordering::SeqCst) + 1;
        counters.peak_open.fetch_max(now, Ordering::SeqCst);
        Ok(Box::new(StaticPage {
            site: Arc::clone(&self.0),
            html: String::new(),
        }))
    }

    fn is_connected(&self) -> bool {
        !self.0.counters.shut_down.load(Ordering::SeqCst)
    }

    async fn shutdown(&self) -> Result<()> {
        self.0.counters.shut_down.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn active_contexts(&self) -> usize {
        self.0.counters.open.load(Ordering::SeqCst)
    }
}

struct StaticPage {
    site: Arc<Site>,
    html: String,
}

#[async_trait]
impl RenderContext for StaticPage {
    async fn navigate(
        &mut self,
        url: &str,
        _wait: WaitStrategy,
        _timeout_ms: u64,
    ) -> Result<NavigationResult> {
        self.site.counters.navigations.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(self.site.delay).await;
        match self.site.pages.get(url) {
            Some(html) => {
                self.html = html.clone();
                Ok(NavigationResult {
                    final_url: url.to_string(),
                    load_time_ms: 0,
                })
            }
            None => bail!("net::ERR_ABORTED at {url}"),
        }
    }

    async fn html(&self) -> Result<String> {
        Ok(self.html.clone())
    }

    async fn close(self: Box<Self>) -> Result<()> {
        self.site.counters.open.fetch_sub(1, Ordering::SeqCst);
        Ok(())
    }
}

struct DownStore;

#[async_trait]
impl CacheStore for DownStore {
    async fn get(&self, _key: &str) -> Result<Option<String>, StoreError> {
        Err(StoreError::Command("connection refused".into()))
    }
    async fn set_ex(&self, _key: &str, _ttl: u64, _value: &str) -> Result<(), StoreError> {
        Err(StoreError::Command("connection refused".into()))
    }
    async fn ttl(&self, _key: &str) -> Result<i64, StoreError> {
        Err(StoreError::Command("connection refused".into()))
    }
    async fn keys(&self, _pattern: &str) -> Result<Vec<String>, StoreError> {
        Err(StoreError::Command("connection refused".into()))
    }
}

// ── helpers ─────────────────────────────────────────────────────────

fn fii_page() -> String {
    r#"<html><body>
    <section id="cards-ticker">
      <div class="_card"><div class="_card-header"><span>MXRF11 Cotação</span></div>
        <div class="_card-body"><span>R$ 10,25</span></div></div>
      <div class="_card"><div class="_card-header"><span>P/VP</span></div>
        <div class="_card-body"><span>1,02</span></div></div>
    </section>
    <div id="table-indicators">
      <div class="cell"><div class="name">Segmento</div><div class="value">Papéis</div></div>
      <div class="cell"><div class="name">Valor Patrimonial</div><div class="value">R$ 1.234.567,89</div></div>
    </div>
    <div class="dy-history"><span>12,45%</span><span>11,90%</span></div>
    </body></html>"#
        .to_string()
}

fn stock_page() -> String {
    r#"<html><body>
    <section id="cards-ticker">
      <div class="_card"><div class="_card-header"><span>PETR4 Cotação</span></div>
        <div class="_card-body"><span>R$ 38,17</span></div></div>
      <div class="_card"><div class="_card-header"><span>P/L</span></div>
        <div class="_card-body"><span>4,12</span></div></div>
    </section>
    </body></html>"#
        .to_string()
}

fn site(delay: Duration) -> Arc<Site> {
    let mut pages = HashMap::new();
    pages.insert(format!("{BASE}/fiis/mxrf11"), fii_page());
    pages.insert(format!("{BASE}/stocks/petr4"), stock_page());
    pages.insert(
        format!("{BASE}/fiis/zzzz11"),
        "<html><body><h1>404</h1></body></html>".to_string(),
    );
    for i in 0..8 {
        pages.insert(format!("{BASE}/stocks/tick{i}"), stock_page());
    }
    Arc::new(Site {
        pages,
        delay,
        counters: Counters::default(),
    })
}

struct Harness {
    router: Router,
    scraper: Arc<Scraper>,
    store: Arc<MemoryStore>,
}

fn scraper(site: &Arc<Site>, concurrency: usize) -> Arc<Scraper> {
    let session = Arc::new(SessionManager::new(StaticLauncher(Arc::clone(site))));
    let extractor = PageExtractor::new(Arc::clone(&session), BASE, Duration::from_secs(15));
    let queue = Arc::new(JobQueue::new(QueueConfig {
        concurrency,
        job_timeout: Some(Duration::from_secs(60)),
        timeout_policy: TimeoutPolicy::Error,
    }));
    Arc::new(Scraper::new(queue, session, extractor))
}

fn harness_with_store(site: &Arc<Site>, store: Arc<dyn CacheStore>) -> (Router, Arc<Scraper>) {
    let scraper = scraper(site, 2);
    let coordinator = CacheCoordinator::new(
        store,
        Arc::clone(&scraper) as Arc<dyn AssetSource>,
        CacheSettings::default(),
    );
    let state = Arc::new(AppState {
        coordinator,
        queue: scraper.queue(),
        token: TOKEN.to_string(),
    });
    (api::router(state), scraper)
}

fn harness(site: &Arc<Site>) -> Harness {
    let store = Arc::new(MemoryStore::new());
    let (router, scraper) = harness_with_store(site, Arc::clone(&store) as Arc<dyn CacheStore>);
    Harness {
        router,
        scraper,
        store,
    }
}

async fn call(router: &Router, path: &str, token: Option<&str>) -> (StatusCode, Value) {
    let mut request = Request::builder().uri(path);
    if let Some(token) = token {
        request = request.header(TOKEN_HEADER, token);
    }
    let response = router
        .clone()
        .oneshot(request.body(Body::empty()).unwrap())
        .await
        .unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, body)
}

// ── tests ───────────────────────────────────────────────────────────

#[tokio::test]
async fn test_missing_or_wrong_token_is_forbidden_before_any_work() {
    let site = site(Duration::ZERO);
    let h = harness(&site);

    let (status, body) = call(&h.router, "/fii/mxrf11", None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert!(body["error"].is_string());

    let (status, _) = call(&h.router, "/stock/petr4", Some("nope")).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    assert_eq!(site.counters.navigations.load(Ordering::SeqCst), 0);
    assert!(h.store.is_empty().await);
}

#[tokio::test]
async fn test_fii_is_scraped_once_then_cached() {
    let site = site(Duration::ZERO);
    let h = harness(&site);

    let (status, body) = call(&h.router, "/fii/MXRF11", Some(TOKEN)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["patrimonialValue"], 1234567.89);
    assert_eq!(body["price"], 10.25);
    assert_eq!(body["segment"], "Papéis");
    assert_eq!(body["currentlyYield"], 12.45);
    assert_eq!(body["averageYield"], 11.9);
    assert!(body["dailyLiquidity"].is_null());

    let (status, again) = call(&h.router, "/fii/mxrf11", Some(TOKEN)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(again, body);
    assert_eq!(site.counters.navigations.load(Ordering::SeqCst), 1);
    assert_eq!(h.store.ttl("fii:mxrf11").await.unwrap(), 86_400);
}

#[tokio::test]
async fn test_stock_record() {
    let site = site(Duration::ZERO);
    let h = harness(&site);

    let (status, body) = call(&h.router, "/stock/petr4", Some(TOKEN)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["price"], 38.17);
    assert_eq!(body["pl"], 4.12);
    assert!(body["pvp"].is_null());
}

#[tokio::test]
async fn test_unknown_asset_is_not_found_and_not_cached() {
    let site = site(Duration::ZERO);
    let h = harness(&site);

    let (status, body) = call(&h.router, "/fii/zzzz11", Some(TOKEN)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(body["error"].is_string());

    let (status, _) = call(&h.router, "/stock/unknown3", Some(TOKEN)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    assert!(h.store.is_empty().await);
    assert_eq!(site.counters.open.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_store_failure_is_internal_error() {
    let site = site(Duration::ZERO);
    let (router, _scraper) = harness_with_store(&site, Arc::new(DownStore));

    let (status, body) = call(&router, "/fii/mxrf11", Some(TOKEN)).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert!(body["error"].is_string());
    assert_eq!(site.counters.navigations.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_health_needs_no_token() {
    let site = site(Duration::ZERO);
    let h = harness(&site);

    let (status, body) = call(&h.router, "/health", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
    assert_eq!(body["queue"]["concurrency"], 2);
    assert_eq!(body["queue"]["running"], 0);
}

#[tokio::test]
async fn test_concurrent_requests_are_bounded_by_the_queue() {
    let site = site(Duration::from_millis(20));
    let h = harness(&site);

    let requests = (0..8).map(|i| {
        let router = h.router.clone();
        tokio::spawn(async move { call(&router, &format!("/stock/tick{i}"), Some(TOKEN)).await })
    });
    for result in futures::future::join_all(requests).await {
        assert_eq!(result.unwrap().0, StatusCode::OK);
    }

    assert_eq!(site.counters.navigations.load(Ordering::SeqCst), 8);
    assert!(site.counters.peak_open.load(Ordering::SeqCst) <= 2);
    assert_eq!(site.counters.open.load(Ordering::SeqCst), 0);
    assert_eq!(h.scraper.stats().completed, 8);
}

#[tokio::test]
async fn test_shutdown_drains_then_closes_browser() {
    let site = site(Duration::from_millis(20));
    let h = harness(&site);

    let in_flight = {
        let router = h.router.clone();
        tokio::spawn(async move { call(&router, "/fii/mxrf11", Some(TOKEN)).await })
    };
    while site.counters.navigations.load(Ordering::SeqCst) == 0 {
        tokio::task::yield_now().await;
    }

    h.scraper.shutdown().await.unwrap();
    assert_eq!(in_flight.await.unwrap().0, StatusCode::OK);
    assert!(site.counters.shut_down.load(Ordering::SeqCst));

    let (status, _) = call(&h.router, "/stock/petr4", Some(TOKEN)).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
}
