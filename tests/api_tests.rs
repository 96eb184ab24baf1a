//! Smoke tests for the HTTP surface.

use axum::{
    body::Body,
    http::{Request, StatusCode},
};
use http_body_util::BodyExt;
use streamarr::config::Config;
use tower::ServiceExt;

async fn spawn_app() -> axum::Router {
    let mut config = Config::default();
    // No network: the anime database is disabled and no addons are
    // configured.
    config.anime_db.level_of_detail = "none".to_string();
    config.server.enabled = false;

    let state = streamarr::api::create_app_state(config, None)
        .await
        .expect("failed to create app state");
    streamarr::api::router(state)
}

#[tokio::test]
async fn healthz_reports_ready() {
    let app = spawn_app().await;

    let response = app
        .oneshot(
            Request::builder()
                .uri("/healthz")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn streams_endpoint_answers_with_a_status_message() {
    let app = spawn_app().await;

    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/v1/streams/movie/tt0111161")
                .header("Content-Type", mime::APPLICATION_JSON.as_ref())
                .body(Body::from(
                    serde_json::json!({ "user": { "excludedQualities": ["CAM"] } }).to_string(),
                ))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(body["success"], serde_json::json!(true));
    assert_eq!(body["data"]["streams"], serde_json::json!([]));
    // Zero configured addons means zero responses and a status message.
    assert!(body["data"]["message"].as_str().unwrap().contains("0"));
}

#[tokio::test]
async fn unknown_media_type_is_rejected() {
    let app = spawn_app().await;

    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/v1/streams/music/abc")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}
