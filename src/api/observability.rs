//! Request instrumentation: a per-request tracing span plus Prometheus
//! counters labelled by route, method, status and — for the streams
//! route — the requested media type.

use crate::api::AppState;
use crate::models::MediaType;
use axum::extract::{MatchedPath, Request, State};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use metrics_exporter_prometheus::PrometheusHandle;
use std::sync::Arc;
use std::time::Instant;
use tracing::{Instrument, info, info_span};
use uuid::Uuid;

pub async fn get_metrics(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    state.prometheus_handle.as_ref().map_or_else(
        || "Metrics not enabled or failed to initialize".to_string(),
        PrometheusHandle::render,
    )
}

pub async fn request_middleware(req: Request, next: Next) -> Response {
    let start = Instant::now();
    let request_id = Uuid::new_v4();
    let method = req.method().clone();

    // The matched route template keeps metric cardinality bounded; raw
    // paths carry arbitrary content ids.
    let route = req.extensions().get::<MatchedPath>().map_or_else(
        || req.uri().path().to_string(),
        |matched| matched.as_str().to_string(),
    );
    let media_type = media_type_label(&route, req.uri().path());

    let span = info_span!(
        "request",
        request_id = %request_id,
        method = %method,
        route = %route,
    );

    async move {
        let response = next.run(req).await;
        let status = response.status();

        let labels = [
            ("route", route.clone()),
            ("method", method.to_string()),
            ("status", status.as_u16().to_string()),
            ("media_type", media_type.to_string()),
        ];
        metrics::counter!("streamarr_http_requests_total", &labels).increment(1);
        metrics::histogram!("streamarr_http_request_seconds", &labels)
            .record(start.elapsed().as_secs_f64());

        info!(
            event = "request_finished",
            status = status.as_u16(),
            failed = status.is_server_error(),
            media_type = media_type,
            duration_ms = u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX),
            "Request finished"
        );

        response
    }
    .instrument(span)
    .await
}

/// `movie`/`series`/`unknown` for the streams route, `none` everywhere
/// else. Runs the raw segment through [`MediaType::parse`] so the label
/// set stays closed no matter what callers put in the path.
fn media_type_label(route: &str, path: &str) -> &'static str {
    if !route.contains("/streams/") {
        return "none";
    }
    path.split('/')
        .nth(4)
        .map_or("none", |segment| MediaType::parse(segment).as_str())
}
