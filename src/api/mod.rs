//! HTTP surface: the streams endpoint plus health and metrics.
//!
//! Deliberately thin — every decision lives in the pipeline; handlers
//! translate between HTTP and the core types.

pub mod error;
pub mod observability;

use crate::config::Config;
use crate::models::{MediaType, ParsedStream, UserData};
use crate::state::SharedState;
use axum::{
    Json, Router,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
};
use error::ApiError;
use metrics_exporter_prometheus::PrometheusHandle;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

pub struct AppState {
    pub shared: SharedState,
    pub prometheus_handle: Option<PrometheusHandle>,
}

#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl<T> ApiResponse<T> {
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(message.into()),
        }
    }
}

pub async fn create_app_state(
    config: Config,
    prometheus_handle: Option<PrometheusHandle>,
) -> anyhow::Result<Arc<AppState>> {
    let shared = SharedState::new(config).await?;
    Ok(Arc::new(AppState {
        shared,
        prometheus_handle,
    }))
}

pub fn router(state: Arc<AppState>) -> Router {
    let cors = if state
        .shared
        .config
        .server
        .cors_allowed_origins
        .iter()
        .any(|origin| origin == "*")
    {
        CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any)
    } else {
        let origins: Vec<axum::http::HeaderValue> = state
            .shared
            .config
            .server
            .cors_allowed_origins
            .iter()
            .filter_map(|origin| origin.parse().ok())
            .collect();
        CorsLayer::new().allow_origin(origins).allow_methods(Any).allow_headers(Any)
    };

    Router::new()
        .route("/healthz", get(healthz))
        .route("/metrics", get(observability::get_metrics))
        .route("/api/v1/streams/{media_type}/{id}", post(get_streams))
        .layer(axum::middleware::from_fn(observability::request_middleware))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

async fn healthz(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    state.shared.cache.wait_until_ready().await;
    (StatusCode::OK, "ok")
}

#[derive(Debug, Serialize)]
struct StreamsPayload {
    streams: Vec<ParsedStream>,
    #[serde(skip_serializing_if = "Option::is_none")]
    message: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    warnings: Vec<String>,
}

#[derive(Debug, Default, Deserialize)]
struct StreamsRequest {
    #[serde(default)]
    user: UserData,
}

async fn get_streams(
    State(state): State<Arc<AppState>>,
    Path((media_type, id)): Path<(String, String)>,
    body: Option<Json<StreamsRequest>>,
) -> Result<Json<ApiResponse<StreamsPayload>>, ApiError> {
    let media_type = MediaType::parse(&media_type);
    if media_type == MediaType::Unknown {
        return Err(ApiError::validation("media type must be movie or series"));
    }
    if id.trim().is_empty() {
        return Err(ApiError::validation("id cannot be empty"));
    }

    let request = body.map(|Json(request)| request).unwrap_or_default();
    let user = Arc::new(request.user);

    let context = state.shared.context_for(media_type, &id, user);
    let outcome = state.shared.pipeline.run(&context).await;

    Ok(Json(ApiResponse::ok(StreamsPayload {
        streams: outcome.streams,
        message: outcome.message,
        warnings: outcome.warnings,
    })))
}
