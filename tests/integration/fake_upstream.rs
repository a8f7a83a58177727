//! Local stand-in for the upstream app-intelligence API.
//!
//! Binds an ephemeral port, records every call and answers through a
//! test-supplied responder.

#![allow(dead_code)]

use appintel_gateway::config::IntelConfig;
use axum::{
    extract::{Query, State},
    http::{header, HeaderValue, StatusCode, Uri},
    response::{IntoResponse, Response},
    Router,
};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

pub const TEST_TOKEN: &str = "test-token";
pub const UNIFIED_ID: &str = "aaaaaaaaaaaaaaaaaaaaaaaa";
pub const IOS_ID: &str = "284882215";
pub const ANDROID_ID: &str = "com.demo.app";

#[derive(Debug, Clone)]
pub struct RecordedCall {
    pub path: String,
    pub params: HashMap<String, String>,
}

pub struct FakeReply {
    pub status: StatusCode,
    pub retry_after: Option<String>,
    pub body: String,
}

impl FakeReply {
    pub fn json(value: Value) -> Self {
        Self {
            status: StatusCode::OK,
            retry_after: None,
            body: value.to_string(),
        }
    }

    pub fn status(status: StatusCode, body: &str) -> Self {
        Self {
            status,
            retry_after: None,
            body: body.to_string(),
        }
    }

    pub fn with_retry_after(mut self, value: &str) -> Self {
        self.retry_after = Some(value.to_string());
        self
    }
}

/// `(call, earlier calls to the same path)` to reply.
type Responder = dyn Fn(&RecordedCall, usize) -> FakeReply + Send + Sync;

#[derive(Clone)]
struct FakeState {
    calls: Arc<Mutex<Vec<RecordedCall>>>,
    responder: Arc<Responder>,
}

pub struct FakeUpstream {
    pub base_url: String,
    calls: Arc<Mutex<Vec<RecordedCall>>>,
}

impl FakeUpstream {
    pub async fn spawn<F>(responder: F) -> Self
    where
        F: Fn(&RecordedCall, usize) -> FakeReply + Send + Sync + 'static,
    {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let state = FakeState {
            calls: Arc::new(Mutex::new(Vec::new())),
            responder: Arc::new(responder),
        };
        let calls = state.calls.clone();
        let app = Router::new().fallback(reply).with_state(state);
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        Self {
            base_url: format!("http://{}", addr),
            calls,
        }
    }

    /// Upstream serving the "Demo App" fixtures on every endpoint.
    pub async fn demo() -> Self {
        Self::spawn(demo_responder).await
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn paths(&self) -> Vec<String> {
        self.calls().into_iter().map(|c| c.path).collect()
    }

    /// Client configuration at the fastest allowed pacing.
    pub fn config(&self) -> IntelConfig {
        IntelConfig {
            base_url: self.base_url.clone(),
            auth_token: TEST_TOKEN.to_string(),
            requests_per_minute: 60,
            ..IntelConfig::default()
        }
    }
}

async fn reply(
    State(state): State<FakeState>,
    uri: Uri,
    Query(params): Query<HashMap<String, String>>,
) -> Response {
    let call = RecordedCall {
        path: uri.path().to_string(),
        params,
    };
    let seen = {
        let mut calls = state.calls.lock().unwrap();
        let seen = calls.iter().filter(|c| c.path == call.path).count();
        calls.push(call.clone());
        seen
    };
    let reply = (state.responder)(&call, seen);
    let mut response = (reply.status, reply.body).into_response();
    if let Some(retry_after) = reply.retry_after {
        response
            .headers_mut()
            .insert(header::RETRY_AFTER, HeaderValue::from_str(&retry_after).unwrap());
    }
    response
}

pub fn demo_responder(call: &RecordedCall, _seen: usize) -> FakeReply {
    match call.path.as_str() {
        "/v1/unified/search_entities" => FakeReply::json(serde_json::json!([
            {"$id": UNIFIED_ID, "name": "Demo App"},
            {"$id": "bbbbbbbbbbbbbbbbbbbbbbbb", "name": "Another Thing"},
            {"$id": "not-a-unified-id", "name": "Demo App Clone"}
        ])),
        // Mapping and unified details share this path.
        "/v1/unified/apps" => FakeReply::json(serde_json::json!([{
            "app_id": UNIFIED_ID,
            "name": "Demo App",
            "itunes_id": IOS_ID,
            "release_date": "2020-03-15T00:00:00Z"
        }])),
        "/v1/ios/apps" => FakeReply::json(serde_json::json!({
            "apps": [{
                "app_id": 284882215,
                "name": "Demo App",
                "subtitle": "Quick subtitle",
                "description": "Long description body",
                "languages": ["en", "ja", "en"],
                "release_date": "2020-03-15"
            }]
        })),
        "/v1/unified/sales_report_estimates"
        | "/v1/ios/sales_report_estimates"
        | "/v1/android/sales_report_estimates" => {
            if call.params.contains_key("countries") {
                FakeReply::json(serde_json::json!([
                    {"date": "2020-03-01", "country": "WW", "unified_units": 4000, "unified_revenue": 1000},
                    {"date": "2021-03-01", "country": "WW", "unified_units": 6000, "unified_revenue": 1500}
                ]))
            } else {
                FakeReply::json(serde_json::json!([
                    {"date": "2026-01-01", "country": "WW", "unified_units": 1800, "unified_revenue": 90},
                    {"date": "2026-01-01", "country": "US", "unified_units": 1000, "unified_revenue": 60},
                    {"date": "2026-01-01", "country": "CA", "unified_units": 800, "unified_revenue": 30}
                ]))
            }
        }
        _ => FakeReply::status(StatusCode::NOT_FOUND, "unknown endpoint"),
    }
}

/// "Demo App" published on Android only.
pub fn android_only_responder(call: &RecordedCall, seen: usize) -> FakeReply {
    match call.path.as_str() {
        "/v1/unified/apps" => FakeReply::json(serde_json::json!([{
            "app_id": UNIFIED_ID,
            "name": "Demo App",
            "android_apps": [{"app_id": ANDROID_ID}]
        }])),
        "/v1/android/apps" => FakeReply::json(serde_json::json!({
            "apps": [{
                "app_id": ANDROID_ID,
                "name": "Demo App",
                "short_description": "Android short",
                "description": "Android description",
                "release_date": "2019-06-01"
            }]
        })),
        path if path.starts_with("/v1/ios/") => {
            FakeReply::status(StatusCode::NOT_FOUND, "not on ios")
        }
        _ => demo_responder(call, seen),
    }
}
