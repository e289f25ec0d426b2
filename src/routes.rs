use std::path::Path;
use std::sync::Arc;

use axum::{
    extract::{Query, State},
    http::{header, HeaderValue, Method, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde::Deserialize;
use serde_json::{json, Value};
use tower_http::cors::CorsLayer;
use tower_http::services::{ServeDir, ServeFile};
use tower_http::trace::TraceLayer;
use tracing::{error, info};

use crate::cache::{TtlCache, TtlPolicy};
use crate::coordinator::{LATEST, TRENDING_KEY};
use crate::upstream::UpstreamClient;

const CACHE_CONTROL: &str = "public, max-age=300";

pub struct AppState {
    pub upstream: UpstreamClient,
    /// Raw upstream payloads: unpaginated category listings and trending
    pub cache: TtlCache<Value>,
}

impl AppState {
    pub fn new(upstream: UpstreamClient, policy: TtlPolicy) -> Self {
        Self {
            upstream,
            cache: TtlCache::new(policy),
        }
    }
}

/// The proxy's routes plus static files from `static_dir`, falling back to
/// its `index.html`.
pub fn app(state: Arc<AppState>, static_dir: impl AsRef<Path>, allowed_origins: &[String]) -> Router {
    let static_dir = static_dir.as_ref();
    let static_files =
        ServeDir::new(static_dir).fallback(ServeFile::new(static_dir.join("index.html")));

    let origins: Vec<HeaderValue> = allowed_origins
        .iter()
        .filter_map(|origin| origin.parse().ok())
        .collect();
    let cors = CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([Method::GET, Method::POST])
        .allow_credentials(true);

    Router::new()
        .route("/api/news", get(news))
        .route("/api/news/search", get(search))
        .route("/api/news/trending", get(trending))
        .route("/health", get(health))
        .fallback_service(static_files)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

// Error body shared by the listing endpoints
pub struct AppError {
    status: StatusCode,
    message: &'static str,
}

impl AppError {
    fn internal(message: &'static str) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            message,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        (self.status, Json(json!({ "error": self.message }))).into_response()
    }
}

#[derive(Debug, Deserialize)]
pub struct NewsQuery {
    pub category: Option<String>,
    pub page: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct SearchQuery {
    pub q: Option<String>,
    pub page: Option<String>,
}

fn news_cache_key(category: Option<&str>) -> String {
    format!("news:{}", category.unwrap_or(LATEST))
}

// Route handlers
pub async fn news(
    State(state): State<Arc<AppState>>,
    Query(query): Query<NewsQuery>,
) -> Result<Response, AppError> {
    let category = query.category.as_deref().filter(|c| !c.is_empty());
    let cache_key = news_cache_key(category);

    // Only first pages are cached; page tokens are one-shot
    if query.page.is_none() {
        if let Some(cached) = state.cache.get(&cache_key) {
            info!("Serving cached data for {}", cache_key);
            return Ok(([(header::CACHE_CONTROL, CACHE_CONTROL)], Json(cached)).into_response());
        }
    }

    let body = state
        .upstream
        .latest(category, query.page.as_deref())
        .await
        .map_err(|e| {
            error!("Error fetching news: {}", e);
            AppError::internal("Failed to fetch news")
        })?;

    if query.page.is_none() {
        state.cache.set(cache_key, body.clone(), false);
    }

    Ok(([(header::CACHE_CONTROL, CACHE_CONTROL)], Json(body)).into_response())
}

pub async fn search(
    State(state): State<Arc<AppState>>,
    Query(query): Query<SearchQuery>,
) -> Result<Json<Value>, AppError> {
    let q = query
        .q
        .filter(|q| !q.trim().is_empty())
        .ok_or(AppError {
            status: StatusCode::BAD_REQUEST,
            message: "Missing search query",
        })?;

    let body = state
        .upstream
        .search(&q, query.page.as_deref())
        .await
        .map_err(|e| {
            error!("Error searching news: {}", e);
            AppError::internal("Failed to search news")
        })?;

    Ok(Json(body))
}

pub async fn trending(State(state): State<Arc<AppState>>) -> Response {
    if let Some(results) = state.cache.get(TRENDING_KEY) {
        return Json(json!({ "status": "success", "results": results })).into_response();
    }

    let body = match state.upstream.trending().await {
        Ok(body) => body,
        Err(e) => {
            error!("Error fetching trending: {}", e);
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({
                    "status": "error",
                    "message": "Failed to fetch trending news",
                    "error": e.to_string(),
                })),
            )
                .into_response();
        }
    };

    if body["status"] != "success" {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({
                "status": "error",
                "message": "Failed to fetch trending news",
            })),
        )
            .into_response();
    }

    let results = body["results"].clone();
    state.cache.set(TRENDING_KEY, results.clone(), true);
    Json(json!({ "status": "success", "results": results })).into_response()
}

pub async fn health() -> impl IntoResponse {
    Json(json!({ "status": "ok" }))
}
