use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::routing::{get, post};
use axum::{Json, Router};
use comics_core::search::{find_comics, DEFAULT_RESULT_LEN};
use comics_core::{ComicRecord, SearchError};
use fetcher::{Pipeline, PipelineError};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;

pub const ADMIN_TOKEN_HEADER: &str = "X-ADMIN-TOKEN";

#[derive(Deserialize)]
pub struct SearchParams {
    #[serde(default)]
    pub search: String,
    #[serde(default = "default_limit")]
    pub limit: usize,
}
fn default_limit() -> usize { DEFAULT_RESULT_LEN }

#[derive(Serialize)]
pub struct PicsResponse {
    pub urls: Vec<String>,
}

#[derive(Serialize)]
pub struct UpdateResponse {
    pub new: usize,
    pub total: usize,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<String>,
}

#[derive(Serialize)]
pub struct ErrorBody {
    pub error: String,
}

type ApiError = (StatusCode, Json<ErrorBody>);

fn api_error(status: StatusCode, msg: impl Into<String>) -> ApiError {
    (status, Json(ErrorBody { error: msg.into() }))
}

#[derive(Clone)]
pub struct AppState {
    pub pipeline: Arc<Pipeline>,
    pub admin_token: Option<String>,
    /// Fired on process shutdown; in-flight updates observe it.
    pub shutdown: CancellationToken,
}

/// CORS from CORS_ALLOW_ORIGIN (comma-separated), or allow any origin.
pub fn cors_from_env() -> CorsLayer {
    let any = || CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any);
    match std::env::var("CORS_ALLOW_ORIGIN") {
        Ok(val) => {
            let origins: Vec<_> = val.split(',').filter_map(|s| s.trim().parse().ok()).collect();
            if origins.is_empty() {
                any()
            } else {
                CorsLayer::new().allow_origin(AllowOrigin::list(origins)).allow_methods(Any).allow_headers(Any)
            }
        }
        Err(_) => any(),
    }
}

pub fn build_app(state: AppState) -> Router {
    Router::new()
        .route("/health", get(|| async { "ok" }))
        .route("/pics", get(search_handler))
        .route("/comics/:id", get(comic_handler))
        .route("/update", post(update_handler))
        .with_state(state)
        .layer(cors_from_env())
        .layer(TraceLayer::new_for_http())
}

pub async fn search_handler(
    State(state): State<AppState>,
    Query(params): Query<SearchParams>,
) -> Result<Json<PicsResponse>, ApiError> {
    if params.search.trim().is_empty() {
        return Err(api_error(StatusCode::BAD_REQUEST, "missing search phrase"));
    }
    let store = Arc::clone(state.pipeline.store());
    let limit = params.limit.clamp(1, 100);
    let phrase = params.search;
    let found = tokio::task::spawn_blocking(move || find_comics(store.as_ref(), &phrase, limit))
        .await
        .map_err(|e| api_error(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))?;
    match found {
        Ok(hits) => Ok(Json(PicsResponse { urls: hits.into_iter().map(|r| r.url).collect() })),
        Err(SearchError::NoMatches) => Err(api_error(StatusCode::NOT_FOUND, "no comics match the query")),
        Err(e) => {
            tracing::error!(error = %e, "search failed");
            Err(api_error(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))
        }
    }
}

pub async fn comic_handler(State(state): State<AppState>, Path(id): Path<String>) -> Result<Json<ComicRecord>, ApiError> {
    let store = Arc::clone(state.pipeline.store());
    let found = tokio::task::spawn_blocking(move || store.get_by_id(&id))
        .await
        .map_err(|e| api_error(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))?;
    match found {
        Ok(rec) => Ok(Json(rec)),
        Err(e) if e.is_not_found() => Err(api_error(StatusCode::NOT_FOUND, e.to_string())),
        Err(e) => Err(api_error(StatusCode::INTERNAL_SERVER_ERROR, e.to_string())),
    }
}

pub async fn update_handler(State(state): State<AppState>, headers: HeaderMap) -> Result<Json<UpdateResponse>, ApiError> {
    authorize(&state, &headers)?;
    // Run detached so a dropped client connection does not tear the run down halfway.
    let pipeline = Arc::clone(&state.pipeline);
    let shutdown = state.shutdown.clone();
    let run = tokio::spawn(async move { pipeline.run(&shutdown).await })
        .await
        .map_err(|e| api_error(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))?;
    match run {
        Ok(report) => {
            let errors = report.diagnostics.map(|d| d.errors().iter().map(|e| e.to_string()).collect()).unwrap_or_default();
            Ok(Json(UpdateResponse { new: report.summary.new, total: report.summary.total, errors }))
        }
        Err(e @ PipelineError::Interrupted { .. }) => Err(api_error(StatusCode::SERVICE_UNAVAILABLE, e.to_string())),
        Err(e) => {
            tracing::error!(error = %e, "update failed");
            Err(api_error(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))
        }
    }
}

fn authorize(state: &AppState, headers: &HeaderMap) -> Result<(), ApiError> {
    let required = match &state.admin_token {
        Some(t) => t,
        None => return Err(api_error(StatusCode::UNAUTHORIZED, "ADMIN_TOKEN not set")),
    };
    let provided = headers.get(ADMIN_TOKEN_HEADER).and_then(|v| v.to_str().ok()).unwrap_or("");
    if provided == required {
        Ok(())
    } else {
        Err(api_error(StatusCode::UNAUTHORIZED, "invalid admin token"))
    }
}
