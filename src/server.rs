//! HTTP server.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `GET`  | `/search?q=<query>` | Locate a record by student code or national ID |
//! | `GET`  | `/health` | Health check (returns version) |
//!
//! # Error Contract
//!
//! ```json
//! { "error": "Query parameter 'q' is required" }
//! { "error": "Error searching images", "details": "..." }
//! ```
//!
//! A missing or blank `q` is a 400. Any other failure is a 500 carrying the
//! failure rendered as a string; no partial results are returned.
//!
//! # Headers
//!
//! Every response is marked `X-Robots-Tag: noindex, nofollow, noarchive,
//! nosnippet` and `Cache-Control: no-store`: results carry signed links and
//! personal data.

use axum::{
    extract::{rejection::QueryRejection, Query, State},
    http::{
        header::{CACHE_CONTROL, CONTENT_TYPE},
        HeaderName, HeaderValue, Method, StatusCode,
    },
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::signal;
use tower_http::cors::{Any, CorsLayer};
use tower_http::set_header::SetResponseHeaderLayer;
use tracing::{error, info};

use crate::config::Config;
use crate::models::SearchResult;
use crate::search::{SearchError, Searcher};

const X_ROBOTS_TAG: &str = "x-robots-tag";
const NO_INDEX: &str = "noindex, nofollow, noarchive, nosnippet";

/// Shared application state passed to all route handlers.
#[derive(Clone)]
struct AppState {
    searcher: Arc<Searcher>,
}

/// Starts the HTTP server with clients built from `config`.
///
/// Loads the record dataset, binds to `[server].bind`, and serves until
/// Ctrl+C or SIGTERM.
pub async fn run_server(config: &Config) -> anyhow::Result<()> {
    let searcher = Arc::new(Searcher::from_config(config)?);
    run_server_with(config, searcher).await
}

/// Starts the HTTP server around an existing [`Searcher`].
pub async fn run_server_with(config: &Config, searcher: Arc<Searcher>) -> anyhow::Result<()> {
    let bind_addr = config.server.bind.clone();
    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    info!("Server listening on http://{}", bind_addr);

    axum::serve(listener, router(searcher))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server shut down");
    Ok(())
}

/// Build the router. Exposed so tests can serve it on an ephemeral port.
pub fn router(searcher: Arc<Searcher>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::OPTIONS])
        .allow_headers([CONTENT_TYPE]);

    Router::new()
        .route("/search", get(handle_search))
        .route("/health", get(handle_health))
        .layer(cors)
        .layer(SetResponseHeaderLayer::overriding(
            HeaderName::from_static(X_ROBOTS_TAG),
            HeaderValue::from_static(NO_INDEX),
        ))
        .layer(SetResponseHeaderLayer::overriding(
            CACHE_CONTROL,
            HeaderValue::from_static("no-store"),
        ))
        .with_state(AppState { searcher })
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
        info!("Received Ctrl+C, shutting down");
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
                info!("Received terminate signal, shutting down");
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

// ============ Error response ============

/// JSON error response body.
#[derive(Serialize)]
struct ErrorBody {
    error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<String>,
}

/// Internal error type that converts into an Axum HTTP response.
struct AppError {
    status: StatusCode,
    error: String,
    details: Option<String>,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: self.error,
            details: self.details,
        };
        (self.status, Json(body)).into_response()
    }
}

impl From<QueryRejection> for AppError {
    fn from(rejection: QueryRejection) -> Self {
        AppError {
            status: rejection.status(),
            error: rejection.body_text(),
            details: None,
        }
    }
}

impl From<SearchError> for AppError {
    fn from(err: SearchError) -> Self {
        match err {
            SearchError::EmptyQuery => AppError {
                status: StatusCode::BAD_REQUEST,
                error: err.to_string(),
                details: None,
            },
            SearchError::Internal(e) => {
                let details = format!("{:#}", e);
                error!(error = %details, "search failed");
                AppError {
                    status: StatusCode::INTERNAL_SERVER_ERROR,
                    error: "Error searching images".to_string(),
                    details: Some(details),
                }
            }
        }
    }
}

// ============ GET /health ============

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
}

async fn handle_health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

// ============ GET /search ============

#[derive(Deserialize)]
struct SearchParams {
    q: Option<String>,
}

/// Handler for `GET /search`.
///
/// Returns `400` for a missing, blank or unparsable `q`, `500` for any other
/// failure.
async fn handle_search(
    State(state): State<AppState>,
    params: Result<Query<SearchParams>, QueryRejection>,
) -> Result<Json<SearchResult>, AppError> {
    let Query(params) = params?;
    let q = params.q.unwrap_or_default();
    let result = state.searcher.search(&q).await?;
    Ok(Json(result))
}
