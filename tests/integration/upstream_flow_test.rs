//! Integration tests for the resolve, snapshot and sales flows against a
//! local fake upstream.
//!
//! Run with: `cargo test --test upstream_flow_test`
//!
//! Every test owns its fake upstream (and therefore its own base URL and
//! rate limiter). Pacing runs at 60 requests/minute in real time, so each
//! extra upstream call adds about a second.

mod fake_upstream;

use appintel_gateway::application::{AppIntelService, AppReference, Purpose, ResolveMode};
use appintel_gateway::config::IntelConfig;
use appintel_gateway::domain::{AppIntelApi, AppOs, IntelError, Resolution};
use appintel_gateway::infrastructure::AppIntelClient;
use axum::http::StatusCode;
use fake_upstream::{
    android_only_responder, demo_responder, FakeReply, FakeUpstream, ANDROID_ID, IOS_ID,
    TEST_TOKEN, UNIFIED_ID,
};
use serde_json::json;
use std::sync::Arc;
use std::time::{Duration, Instant};

fn service_for(config: IntelConfig) -> AppIntelService {
    let config = Arc::new(config);
    let api: Arc<dyn AppIntelApi> = Arc::new(AppIntelClient::new(config.clone()));
    AppIntelService::new(api, config)
}

fn query(text: &str) -> AppReference {
    AppReference {
        query: Some(text.to_string()),
        ..AppReference::default()
    }
}

#[tokio::test]
async fn test_candidate_mode_only_searches() {
    let upstream = FakeUpstream::demo().await;
    let service = service_for(upstream.config());

    let resolution = service
        .resolve(query("Demo App"), ResolveMode::Candidates { limit: 5 })
        .await
        .unwrap();

    let candidates = match resolution {
        Resolution::Candidates(candidates) => candidates,
        other => panic!("expected candidates, got {other:?}"),
    };
    // The malformed id is dropped before ranking.
    assert_eq!(candidates.len(), 2);
    assert_eq!(candidates[0].rank, 1);
    assert_eq!(candidates[0].unified_app_id, UNIFIED_ID);
    assert_eq!(candidates[0].score, 1.0);
    assert!(candidates[1].score < candidates[0].score);

    assert_eq!(upstream.paths(), vec!["/v1/unified/search_entities"]);
    let search = &upstream.calls()[0];
    assert_eq!(search.params["entity_type"], "app");
    assert_eq!(search.params["term"], "Demo App");
    assert_eq!(search.params["limit"], "10");
    assert_eq!(search.params["auth_token"], TEST_TOKEN);
}

#[tokio::test]
async fn test_snapshot_from_query_cascades_to_ios() {
    let upstream = FakeUpstream::demo().await;
    let service = service_for(upstream.config());

    let snapshot = service
        .metadata_snapshot_for(query("Demo App"))
        .await
        .unwrap();

    assert_eq!(snapshot.unified_app_id.as_deref(), Some(UNIFIED_ID));
    assert_eq!(snapshot.app_id, IOS_ID);
    assert_eq!(snapshot.app_os, AppOs::Ios);
    assert_eq!(snapshot.app_name.as_deref(), Some("Demo App"));
    assert_eq!(
        snapshot.metadata.subtitle_or_short_description.as_deref(),
        Some("Quick subtitle")
    );
    assert_eq!(
        snapshot.metadata.long_description.as_deref(),
        Some("Long description body")
    );
    assert_eq!(snapshot.metadata.languages, vec!["en", "ja"]);
    assert_eq!(
        snapshot.release_date.map(|d| d.to_string()).as_deref(),
        Some("2020-03-15")
    );

    assert_eq!(
        upstream.paths(),
        vec![
            "/v1/unified/search_entities",
            "/v1/unified/apps",
            "/v1/ios/apps"
        ]
    );
    let calls = upstream.calls();
    assert_eq!(calls[1].params["app_id_type"], "unified");
    assert_eq!(calls[1].params["app_ids"], UNIFIED_ID);
    assert_eq!(calls[2].params["app_ids"], IOS_ID);
    assert_eq!(calls[2].params["country"], "US");
}

#[tokio::test]
async fn test_sales_summary_for_unified_id() {
    let upstream = FakeUpstream::demo().await;
    let service = service_for(upstream.config());

    let reference = AppReference {
        unified_app_id: Some(UNIFIED_ID.to_string()),
        ..AppReference::default()
    };
    let summary = service
        .sales_summary_for(reference, Some("2026-01"), None)
        .await
        .unwrap();

    assert_eq!(summary.app_os, AppOs::Unified);
    assert_eq!(summary.app_id, UNIFIED_ID);
    assert_eq!(summary.app_name, None);
    assert_eq!(summary.overall.start_date.to_string(), "2014-01-01");
    assert!(summary
        .notes
        .iter()
        .any(|n| n.contains("Release date unknown")));
    assert_eq!(summary.overall.downloads_estimate, Some(10_000.0));
    assert_eq!(summary.overall.revenue_estimate, Some(2_500.0));
    assert_eq!(summary.overall.rdp, Some(0.25));

    assert_eq!(summary.month.month, "2026-01");
    assert_eq!(summary.month.downloads_estimate, Some(1_800.0));
    assert_eq!(summary.month.revenue_estimate, Some(90.0));
    let countries: Vec<&str> = summary
        .month
        .top_countries
        .iter()
        .map(|c| c.country.as_str())
        .collect();
    assert_eq!(countries, vec!["US", "CA"]);

    // Only the two sales queries; no search, mapping or details.
    let sales = upstream.calls();
    assert_eq!(sales.len(), 2);
    assert!(sales
        .iter()
        .all(|c| c.path == "/v1/unified/sales_report_estimates"));
    let overall = sales
        .iter()
        .find(|c| c.params.contains_key("countries"))
        .expect("overall query carries a country filter");
    assert_eq!(overall.params["countries"], "WW");
    assert_eq!(overall.params["start_date"], "2014-01-01");
    assert_eq!(overall.params["date_granularity"], "monthly");
    let month = sales
        .iter()
        .find(|c| !c.params.contains_key("countries"))
        .expect("month query has no country filter");
    assert_eq!(month.params["start_date"], "2026-01-01");
    assert_eq!(month.params["end_date"], "2026-01-31");
}

#[tokio::test]
async fn test_sales_summary_in_ios_namespace() {
    let upstream = FakeUpstream::demo().await;
    let service = service_for(upstream.config());

    let reference = AppReference {
        os: Some(AppOs::Ios),
        ..query("Demo App")
    };
    let summary = service
        .sales_summary_for(reference, Some("2026-01"), Some(1))
        .await
        .unwrap();

    assert_eq!(summary.app_os, AppOs::Ios);
    assert_eq!(summary.app_id, IOS_ID);
    assert_eq!(summary.unified_app_id.as_deref(), Some(UNIFIED_ID));
    assert_eq!(summary.month.top_countries.len(), 1);
    assert_eq!(summary.month.top_countries[0].country, "US");

    let paths = upstream.paths();
    assert_eq!(
        &paths[..3],
        &[
            "/v1/unified/search_entities",
            "/v1/unified/apps",
            "/v1/ios/apps"
        ]
    );
    assert!(paths[3..]
        .iter()
        .all(|p| p == "/v1/ios/sales_report_estimates"));
    assert_eq!(paths.len(), 5);
}

#[tokio::test]
async fn test_android_only_app_stays_in_android_namespace() {
    let upstream = FakeUpstream::spawn(android_only_responder).await;
    let service = service_for(upstream.config());

    let snapshot = service
        .metadata_snapshot_for(query("Demo App"))
        .await
        .unwrap();
    assert_eq!(snapshot.app_os, AppOs::Android);
    assert_eq!(snapshot.app_id, ANDROID_ID);
    assert_eq!(
        snapshot.metadata.long_description.as_deref(),
        Some("Android description")
    );

    let reference = AppReference {
        os: Some(AppOs::Android),
        ..query("Demo App")
    };
    let summary = service
        .sales_summary_for(reference, Some("2026-01"), None)
        .await
        .unwrap();
    assert_eq!(summary.app_os, AppOs::Android);
    assert_eq!(summary.app_id, ANDROID_ID);
    assert_eq!(summary.overall.start_date.to_string(), "2019-06-01");

    let paths = upstream.paths();
    assert!(paths.iter().all(|p| !p.contains("/v1/ios/")));
    let follow_up: Vec<_> = upstream
        .calls()
        .into_iter()
        .filter(|c| c.path.ends_with("/sales_report_estimates") || c.path.ends_with("/apps"))
        .filter(|c| !c.params.contains_key("app_id_type"))
        .collect();
    // Snapshot details, sales details and both sales queries.
    assert_eq!(follow_up.len(), 4);
    for call in follow_up {
        assert!(call.path.contains("/v1/android/"), "{}", call.path);
        assert_eq!(call.params["app_ids"], ANDROID_ID);
    }
}

#[tokio::test]
async fn test_rate_limited_search_is_retried_once() {
    let upstream = FakeUpstream::spawn(|call, seen| {
        if call.path == "/v1/unified/search_entities" && seen == 0 {
            return FakeReply::status(StatusCode::TOO_MANY_REQUESTS, "slow down")
                .with_retry_after("1");
        }
        demo_responder(call, seen)
    })
    .await;
    let service = service_for(upstream.config());

    let started = Instant::now();
    let resolution = service
        .resolve(query("Demo App"), ResolveMode::Candidates { limit: 1 })
        .await
        .unwrap();

    assert!(started.elapsed() >= Duration::from_secs(1));
    assert!(matches!(resolution, Resolution::Candidates(ref c) if c.len() == 1));
    assert_eq!(upstream.paths().len(), 2);
}

#[tokio::test]
async fn test_forbidden_is_not_retried() {
    let upstream = FakeUpstream::spawn(|_, _| {
        FakeReply::status(StatusCode::FORBIDDEN, r#"{"error":"forbidden"}"#)
    })
    .await;
    let service = service_for(upstream.config());

    let err = service
        .resolve(query("Demo App"), ResolveMode::Single(Purpose::Metadata))
        .await
        .unwrap_err();

    match err {
        IntelError::UpstreamFailure {
            status,
            path,
            detail,
        } => {
            assert_eq!(status, 403);
            assert_eq!(path, "/v1/unified/search_entities");
            assert!(detail.contains("forbidden"));
            assert!(!path.contains(TEST_TOKEN));
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert_eq!(upstream.paths().len(), 1);
}

#[tokio::test]
async fn test_low_confidence_match_stops_before_follow_up() {
    let upstream = FakeUpstream::spawn(|call, _| match call.path.as_str() {
        "/v1/unified/search_entities" => FakeReply::json(json!([
            {"$id": UNIFIED_ID, "name": "Completely Unrelated Puzzle"}
        ])),
        _ => FakeReply::status(StatusCode::INTERNAL_SERVER_ERROR, "unexpected"),
    })
    .await;
    let service = service_for(upstream.config());

    let err = service
        .metadata_snapshot_for(query("Demo App"))
        .await
        .unwrap_err();

    match err {
        IntelError::LowConfidenceMatch { candidates, .. } => {
            assert_eq!(candidates, vec!["Completely Unrelated Puzzle"]);
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert_eq!(upstream.paths(), vec!["/v1/unified/search_entities"]);
}

#[tokio::test]
async fn test_missing_token_makes_no_calls() {
    let upstream = FakeUpstream::demo().await;
    let service = service_for(IntelConfig {
        auth_token: String::new(),
        ..upstream.config()
    });

    let err = service
        .metadata_snapshot_for(query("Demo App"))
        .await
        .unwrap_err();

    assert_eq!(err.kind(), "configuration");
    assert!(upstream.calls().is_empty());
}
