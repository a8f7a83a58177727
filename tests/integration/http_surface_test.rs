//! Integration tests for the HTTP surface: routing, status mapping,
//! middleware headers and OpenAPI docs.
//!
//! Run with: `cargo test --test http_surface_test`
//!
//! Requests are driven through the router in-process; endpoints that reach
//! the upstream use a local fake.

mod fake_upstream;

use appintel_gateway::api::routes::create_router;
use appintel_gateway::api::state::AppState;
use appintel_gateway::application::AppIntelService;
use appintel_gateway::config::IntelConfig;
use appintel_gateway::domain::AppIntelApi;
use appintel_gateway::infrastructure::AppIntelClient;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use fake_upstream::{FakeUpstream, UNIFIED_ID};
use serde_json::Value;
use std::sync::Arc;
use tower::ServiceExt;

/// Never contacted; tests using it fail before any network call.
const UNREACHABLE_UPSTREAM: &str = "http://127.0.0.1:9";

fn router_for(config: IntelConfig) -> Router {
    let config = Arc::new(config);
    let api: Arc<dyn AppIntelApi> = Arc::new(AppIntelClient::new(config.clone()));
    let state = AppState {
        intel_service: Arc::new(AppIntelService::new(api, config)),
        metrics_handle: None,
    };
    create_router(state, "*")
}

fn offline_config(token: &str) -> IntelConfig {
    IntelConfig {
        base_url: UNREACHABLE_UPSTREAM.to_string(),
        auth_token: token.to_string(),
        ..IntelConfig::default()
    }
}

async fn get(router: Router, uri: &str) -> (StatusCode, axum::http::HeaderMap, Value) {
    let response = router
        .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap();
    let status = response.status();
    let headers = response.headers().clone();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, headers, body)
}

#[tokio::test]
async fn test_health_reports_auth_state() {
    let (status, _, body) = get(router_for(offline_config("token")), "/health").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
    assert_eq!(body["auth_configured"], true);
    assert!(body.get("version").is_some());

    let (status, _, body) = get(router_for(offline_config("")), "/health").await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["status"], "degraded");
}

#[tokio::test]
async fn test_security_and_request_id_headers() {
    let (_, headers, _) = get(router_for(offline_config("token")), "/health").await;
    assert_eq!(headers["x-content-type-options"], "nosniff");
    assert_eq!(headers["x-frame-options"], "DENY");
    assert!(headers.contains_key("x-request-id"));
}

#[tokio::test]
async fn test_metrics_without_recorder() {
    let response = router_for(offline_config("token"))
        .oneshot(Request::builder().uri("/metrics").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
}

#[tokio::test]
async fn test_openapi_lists_app_endpoints() {
    let (status, _, body) = get(router_for(offline_config("token")), "/v1/openapi.json").await;
    assert_eq!(status, StatusCode::OK);
    let paths = body["paths"].as_object().unwrap();
    for path in ["/health", "/v1/apps/resolve", "/v1/apps/snapshot", "/v1/apps/sales"] {
        assert!(paths.contains_key(path), "missing {path}");
    }
}

#[tokio::test]
async fn test_missing_identifier_returns_retry_hint() {
    let (status, _, body) = get(router_for(offline_config("token")), "/v1/apps/resolve").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["ok"], false);
    assert_eq!(body["kind"], "ambiguous_input");
    assert!(body["retry_hint"].as_str().unwrap().contains("app_query"));
    let keys: Vec<&str> = body["accepted_keys"]
        .as_array()
        .unwrap()
        .iter()
        .filter_map(Value::as_str)
        .collect();
    assert!(keys.contains(&"unified_app_id"));
    assert!(keys.contains(&"return_candidates"));
}

#[tokio::test]
async fn test_unknown_os_is_rejected() {
    let (status, _, body) = get(
        router_for(offline_config("token")),
        "/v1/apps/resolve?app_query=Demo&os=windows",
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["kind"], "validation");
}

#[tokio::test]
async fn test_invalid_month_is_rejected_before_upstream() {
    let (status, _, body) = get(
        router_for(offline_config("token")),
        "/v1/apps/sales?app_id=284882215&month=2026-13",
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["kind"], "validation");
}

#[tokio::test]
async fn test_missing_token_is_a_configuration_error() {
    let (status, _, body) = get(
        router_for(offline_config("")),
        "/v1/apps/snapshot?app_query=Demo%20App",
    )
    .await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["kind"], "configuration");
}

#[tokio::test]
async fn test_candidate_mode_over_http() {
    let upstream = FakeUpstream::demo().await;
    let (status, _, body) = get(
        router_for(upstream.config()),
        "/v1/apps/sales?app_query=Demo%20App&return_candidates=true&candidates_limit=1",
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["mode"], "candidates");
    assert_eq!(body["query"], "Demo App");
    let candidates = body["candidates"].as_array().unwrap();
    assert_eq!(candidates.len(), 1);
    assert_eq!(candidates[0]["unified_app_id"], UNIFIED_ID);
    assert!(body["next_step"].as_str().unwrap().contains("/v1/apps/sales"));
    assert_eq!(upstream.paths(), vec!["/v1/unified/search_entities"]);
}

#[tokio::test]
async fn test_candidate_flags_accept_loose_forms() {
    let upstream = FakeUpstream::demo().await;
    let (status, _, body) = get(
        router_for(upstream.config()),
        "/v1/apps/resolve?app_query=Demo%20App&return_candidates=yes&candidates_limit=1.9",
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["mode"], "candidates");
    assert_eq!(body["candidates"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn test_malformed_query_values_are_json_validation_errors() {
    for uri in [
        "/v1/apps/resolve?app_query=Demo&candidates_limit=abc",
        "/v1/apps/snapshot?app_query=Demo&return_candidates=perhaps",
        "/v1/apps/sales?app_id=284882215&top_countries_limit=lots",
    ] {
        let (status, _, body) = get(router_for(offline_config("token")), uri).await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "{uri}");
        assert_eq!(body["ok"], false, "{uri}");
        assert_eq!(body["kind"], "validation", "{uri}");
        assert!(body["error"].as_str().is_some());
    }
}

#[tokio::test]
async fn test_blank_month_is_rejected() {
    let (status, _, body) = get(
        router_for(offline_config("token")),
        "/v1/apps/sales?app_id=284882215&month=%20%20",
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["kind"], "validation");
}

#[tokio::test]
async fn test_snapshot_over_http() {
    let upstream = FakeUpstream::demo().await;
    let (status, _, body) = get(
        router_for(upstream.config()),
        &format!("/v1/apps/snapshot?unified_app_id={}", UNIFIED_ID),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["app_os"], "ios");
    assert_eq!(body["app_id"], fake_upstream::IOS_ID);
    assert_eq!(body["metadata"]["long_description"], "Long description body");
    assert_eq!(body["sources"]["details_endpoint"], "/v1/{os}/apps");
    assert!(body["notes"]
        .as_array()
        .unwrap()
        .iter()
        .any(|n| n.as_str().unwrap().contains("estimates")));
}

#[tokio::test]
async fn test_upstream_failure_maps_to_bad_gateway() {
    let upstream = FakeUpstream::spawn(|_, _| {
        fake_upstream::FakeReply::status(StatusCode::FORBIDDEN, "forbidden")
    })
    .await;
    let (status, _, body) = get(
        router_for(upstream.config()),
        "/v1/apps/resolve?app_query=Demo%20App",
    )
    .await;

    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert_eq!(body["kind"], "upstream_failure");
    assert!(!body["error"].as_str().unwrap().contains("test-token"));
}
