// Copyright 2026 Asset Scraper Contributors
// SPDX-License-Identifier: Apache-2.0

//! HTTP API.
//!
//! `GET /fii/:code` and `GET /stock/:code` return the cached or freshly
//! scraped record and require the `x-api-token` header. `/health` is open.

use crate::asset::{AssetRecord, AssetType};
use crate::coordinator::{CacheCoordinator, CacheError};
use crate::queue::JobQueue;
use axum::extract::{Path, Request, State};
use axum::http::{HeaderMap, StatusCode};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing::error;

/// Request header carrying the API token.
pub const TOKEN_HEADER: &str = "x-api-token";

/// Shared state for all handlers.
pub struct AppState {
    pub coordinator: CacheCoordinator,
    pub queue: Arc<JobQueue>,
    pub token: String,
}

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("unauthorized")]
    Forbidden,

    #[error("{0} not found")]
    NotFound(&'static str),

    #[error("failed to fetch data")]
    Internal,
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self {
            Self::Forbidden => StatusCode::FORBIDDEN,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn from_cache(asset: AssetType, err: CacheError) -> Self {
        match err {
            CacheError::NotFound { .. } => Self::NotFound(match asset {
                AssetType::Fii => "FII",
                AssetType::Stock => "stock",
            }),
            other => {
                error!(%asset, "request failed: {other}");
                Self::Internal
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = serde_json::json!({ "error": self.to_string() });
        (self.status(), Json(body)).into_response()
    }
}

/// Build the router.
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/fii/:code", get(get_fii))
        .route("/stock/:code", get(get_stock))
        .layer(middleware::from_fn_with_state(state.clone(), auth_layer))
        .route("/health", get(health))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Serve on `addr` until `shutdown` resolves, then finish in-flight requests.
pub async fn serve(
    addr: SocketAddr,
    state: Arc<AppState>,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> anyhow::Result<()> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!("API listening on http://{}", listener.local_addr()?);

    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown)
        .await?;
    Ok(())
}

/// Rejects requests whose token header does not match.
/// /health is routed after this layer and never reaches it.
async fn auth_layer(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    request: Request,
    next: Next,
) -> Response {
    let authorized = headers
        .get(TOKEN_HEADER)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|token| token == state.token);

    if !authorized {
        return ApiError::Forbidden.into_response();
    }
    next.run(request).await
}

async fn get_fii(
    State(state): State<Arc<AppState>>,
    Path(code): Path<String>,
) -> Result<Json<AssetRecord>, ApiError> {
    lookup(&state, AssetType::Fii, &code).await
}

async fn get_stock(
    State(state): State<Arc<AppState>>,
    Path(code): Path<String>,
) -> Result<Json<AssetRecord>, ApiError> {
    lookup(&state, AssetType::Stock, &code).await
}

async fn lookup(
    state: &AppState,
    asset: AssetType,
    code: &str,
) -> Result<Json<AssetRecord>, ApiError> {
    state
        .coordinator
        .get(asset, code)
        .await
        .map(Json)
        .map_err(|e| ApiError::from_cache(asset, e))
}

async fn health(State(state): State<Arc<AppState>>) -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "queue": state.queue.stats(),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_statuses() {
        assert_eq!(ApiError::Forbidden.status(), StatusCode::FORBIDDEN);
        assert_eq!(ApiError::NotFound("FII").status(), StatusCode::NOT_FOUND);
        assert_eq!(ApiError::Internal.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn test_cache_errors_map_to_api_errors() {
        let not_found = CacheError::NotFound {
            asset: AssetType::Stock,
            code: "zzzz3".into(),
        };
        assert!(matches!(
            ApiError::from_cache(AssetType::Stock, not_found),
            ApiError::NotFound("stock")
        ));

        let closed = CacheError::Queue(crate::queue::QueueError::Closed);
        assert!(matches!(
            ApiError::from_cache(AssetType::Fii, closed),
            ApiError::Internal
        ));
    }
}
