//! HTTP front end for listing and reading remote archives.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `GET`  | `/` | Liveness check |
//! | `GET`  | `/zipinfo?url=` | Ingest an archive and list its entry paths |
//! | `GET`  | `/zipcontent?url=&path=` | Read one file of an ingested archive |
//!
//! Listing failures answer HTTP 500 with `{"status": 500, "paths": []}` and
//! log the cause. Content failures (including a cache miss) answer HTTP 500
//! with `{"status": 500, "content": "error"}`. A missing query parameter is
//! a 400 with the same empty payload shape.

use anyhow::{Context, Result};
use axum::{
    Json, Router,
    extract::{Query, State},
    http::{HeaderValue, StatusCode},
    routing::get,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tracing::{error, info};

use crate::config::Config;
use crate::fetch::HttpFetcher;
use crate::ingest::Ingestor;

/// Content returned in place of file text when a lookup fails
pub const CONTENT_ERROR: &str = "error";

#[derive(Clone)]
struct AppState {
    ingestor: Arc<Ingestor>,
}

#[derive(Debug, Deserialize)]
struct ListQuery {
    url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ContentQuery {
    url: Option<String>,
    path: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct ListResponse {
    pub status: u16,
    pub paths: Vec<String>,
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct ContentResponse {
    pub status: u16,
    pub content: String,
}

impl ListResponse {
    fn failure(status: StatusCode) -> (StatusCode, Json<Self>) {
        let body = ListResponse {
            status: status.as_u16(),
            paths: Vec::new(),
        };
        (status, Json(body))
    }
}

impl ContentResponse {
    fn failure(status: StatusCode) -> (StatusCode, Json<Self>) {
        let body = ContentResponse {
            status: status.as_u16(),
            content: CONTENT_ERROR.to_string(),
        };
        (status, Json(body))
    }
}

/// Build the application router around an ingestor.
pub fn router(ingestor: Arc<Ingestor>, allowed_origins: &[String]) -> Result<Router> {
    let state = AppState { ingestor };

    Ok(Router::new()
        .route("/", get(hello))
        .route("/zipinfo", get(list_entries))
        .route("/zipcontent", get(get_content))
        .layer(cors_layer(allowed_origins)?)
        .with_state(state))
}

/// Start the HTTP server and run until ctrl-c.
pub async fn run_server(config: &Config) -> Result<()> {
    let fetcher = HttpFetcher::new(&config.fetch).context("Failed to build HTTP client")?;
    let ingestor = Arc::new(Ingestor::new(config, Arc::new(fetcher)));
    let app = router(ingestor, &config.server.allowed_origins)?;

    let listener = tokio::net::TcpListener::bind(&config.server.bind)
        .await
        .with_context(|| format!("Failed to bind {}", config.server.bind))?;
    info!(
        bind = %config.server.bind,
        base_dir = %config.base_dir.display(),
        "zipinfo server listening"
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await
        .context("Server error")?;

    Ok(())
}

fn cors_layer(allowed_origins: &[String]) -> Result<CorsLayer> {
    let layer = CorsLayer::new().allow_methods(Any).allow_headers(Any);
    if allowed_origins.is_empty() {
        return Ok(layer.allow_origin(Any));
    }

    let origins = allowed_origins
        .iter()
        .map(|origin| {
            HeaderValue::from_str(origin).with_context(|| format!("Invalid CORS origin: {origin}"))
        })
        .collect::<Result<Vec<_>>>()?;
    Ok(layer.allow_origin(AllowOrigin::list(origins)))
}

/// Clean a requested entry path before it reaches the cache.
///
/// Quote characters are stripped and leading slashes removed. Paths that
/// climb out with `..` are refused.
pub fn sanitize_entry_path(raw: &str) -> Option<String> {
    let cleaned: String = raw.chars().filter(|c| *c != '"' && *c != '\'').collect();
    let cleaned = cleaned.trim_start_matches('/');

    if cleaned.split(['/', '\\']).any(|segment| segment == "..") {
        return None;
    }
    Some(cleaned.to_string())
}

async fn hello() -> &'static str {
    "Hello, World!"
}

async fn list_entries(
    State(state): State<AppState>,
    Query(query): Query<ListQuery>,
) -> (StatusCode, Json<ListResponse>) {
    let Some(url) = query.url.filter(|u| !u.is_empty()) else {
        return ListResponse::failure(StatusCode::BAD_REQUEST);
    };

    match state.ingestor.ingest(&url).await {
        Ok(paths) => (
            StatusCode::OK,
            Json(ListResponse {
                status: StatusCode::OK.as_u16(),
                paths,
            }),
        ),
        Err(e) => {
            error!(url = %url, error = %e, "listing failed");
            ListResponse::failure(StatusCode::INTERNAL_SERVER_ERROR)
        }
    }
}

async fn get_content(
    State(state): State<AppState>,
    Query(query): Query<ContentQuery>,
) -> (StatusCode, Json<ContentResponse>) {
    let (Some(url), Some(raw_path)) = (query.url.filter(|u| !u.is_empty()), query.path) else {
        return ContentResponse::failure(StatusCode::BAD_REQUEST);
    };

    let Some(path) = sanitize_entry_path(&raw_path) else {
        error!(url = %url, path = %raw_path, "rejected entry path");
        return ContentResponse::failure(StatusCode::INTERNAL_SERVER_ERROR);
    };

    match state.ingestor.content(&url, &path).await {
        Ok(bytes) => (
            StatusCode::OK,
            Json(ContentResponse {
                status: StatusCode::OK.as_u16(),
                content: String::from_utf8_lossy(&bytes).into_owned(),
            }),
        ),
        Err(e) => {
            error!(url = %url, path = %path, error = %e, "content lookup failed");
            ContentResponse::failure(StatusCode::INTERNAL_SERVER_ERROR)
        }
    }
}
