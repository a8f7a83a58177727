use crate::api::state::AppState;
use crate::application::resolver::DEFAULT_CANDIDATES_LIMIT;
use crate::application::{AppReference, Purpose, ResolveMode};
use crate::config::NumberLike;
use crate::domain::{
    AppOs, IntelError, MetadataSnapshot, RankedCandidate, Resolution, ResolvedApp, SalesSummary,
};
use axum::{
    extract::{rejection::QueryRejection, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Deserializer, Serialize};
use tracing::{instrument, warn};
use utoipa::{IntoParams, ToSchema};

#[allow(unused_imports)]
use serde_json::json; // Used in utoipa::path examples

const VERSION: &str = env!("CARGO_PKG_VERSION");

const RETRY_HINT: &str =
    r#"Retry with at least one field, e.g. {"app_query":"AiRide"} or {"app_id":"com.aimarket.ai_ride"}."#;

const RESOLVE_KEYS: &[&str] = &[
    "app_query",
    "query",
    "app_id",
    "unified_app_id",
    "os",
    "return_candidates",
    "candidates_limit",
];
const SNAPSHOT_KEYS: &[&str] = &[
    "app_query",
    "query",
    "app_id",
    "unified_app_id",
    "metadata_os",
    "return_candidates",
    "candidates_limit",
];
const SALES_KEYS: &[&str] = &[
    "app_query",
    "query",
    "app_id",
    "unified_app_id",
    "sales_os",
    "return_candidates",
    "candidates_limit",
    "month",
    "top_countries_limit",
];

// ============================================================================
// Request / Response Types
// ============================================================================

/// Identifier and option parameters shared by the app endpoints.
#[derive(Deserialize, IntoParams, Debug, Default)]
#[into_params(parameter_in = Query)]
pub struct AppLookupParams {
    /// App name or search text
    #[param(example = "Uber Eats")]
    pub app_query: Option<String>,

    /// Alias for `app_query`
    pub query: Option<String>,

    /// Literal platform id (iOS numeric id or Android package)
    #[param(example = "com.ubercab.eats")]
    pub app_id: Option<String>,

    /// Unified app id (24-char hex)
    #[param(example = "55c5022702ac64f9c0001f6f")]
    pub unified_app_id: Option<String>,

    /// Namespace for resolution (`unified`, `ios`, `android`)
    pub os: Option<String>,

    /// Namespace for the metadata lookup (snapshot)
    pub metadata_os: Option<String>,

    /// Namespace for the sales lookup (sales)
    pub sales_os: Option<String>,

    /// Return ranked candidates only; requires a query and no ids.
    /// Accepts `true/false`, `1/0`, `yes/no`, `y/n` and `on/off`.
    #[serde(default, deserialize_with = "lenient_flag")]
    pub return_candidates: Option<bool>,

    /// Candidates to return in candidate mode (1-10); fractions are floored
    #[serde(default, deserialize_with = "lenient_count")]
    #[param(default = 5, minimum = 1, maximum = 10)]
    pub candidates_limit: Option<usize>,

    /// Month in `YYYY-MM`; defaults to the previous calendar month (UTC) (sales)
    #[param(example = "2026-01")]
    pub month: Option<String>,

    /// Countries in the monthly breakdown (1-25) (sales)
    #[serde(default, deserialize_with = "lenient_count")]
    #[param(minimum = 1, maximum = 25)]
    pub top_countries_limit: Option<usize>,
}

fn parse_flag(raw: &str) -> Result<Option<bool>, String> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "" => Ok(None),
        "true" | "1" | "yes" | "y" | "on" => Ok(Some(true)),
        "false" | "0" | "no" | "n" | "off" => Ok(Some(false)),
        other => Err(format!("expected a boolean, got '{}'", other)),
    }
}

/// Negative counts become 0 and are clamped further down.
fn parse_count(raw: &str) -> Result<Option<usize>, String> {
    if raw.trim().is_empty() {
        return Ok(None);
    }
    NumberLike::Text(raw.to_string())
        .as_i64()
        .map(|v| Some(usize::try_from(v.max(0)).unwrap_or(usize::MAX)))
        .ok_or_else(|| format!("expected a number, got '{}'", raw.trim()))
}

fn lenient_flag<'de, D>(deserializer: D) -> Result<Option<bool>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    parse_flag(&raw).map_err(serde::de::Error::custom)
}

fn lenient_count<'de, D>(deserializer: D) -> Result<Option<usize>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    parse_count(&raw).map_err(serde::de::Error::custom)
}

/// Unwrap the query, reporting a rejection as a JSON validation error.
fn lookup_params(
    query: Result<Query<AppLookupParams>, QueryRejection>,
    keys: &[&str],
) -> Result<AppLookupParams, ApiError> {
    match query {
        Ok(Query(params)) => Ok(params),
        Err(rejection) => Err(api_error(IntelError::validation(rejection.body_text()), keys)),
    }
}

impl AppLookupParams {
    fn parse_os(value: Option<&str>) -> Result<Option<AppOs>, IntelError> {
        value
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(str::parse::<AppOs>)
            .transpose()
    }

    fn reference(&self, os: Option<&str>) -> Result<AppReference, IntelError> {
        Ok(AppReference {
            unified_app_id: self.unified_app_id.clone(),
            app_id: self.app_id.clone(),
            query: self.app_query.clone().or_else(|| self.query.clone()),
            os: Self::parse_os(os.or(self.os.as_deref()))?,
        }
        .normalized())
    }

    /// Candidate mode applies only to a bare query.
    fn candidate_mode(&self, reference: &AppReference) -> Option<ResolveMode> {
        (self.return_candidates == Some(true) && reference.is_query_only()).then(|| {
            ResolveMode::Candidates {
                limit: self.candidates_limit.unwrap_or(DEFAULT_CANDIDATES_LIMIT),
            }
        })
    }
}

#[derive(Serialize, ToSchema, Debug)]
pub struct ErrorResponse {
    pub ok: bool,
    /// Machine-readable failure kind
    pub kind: String,
    pub error: String,
    /// Runner-up names for a rejected match
    #[serde(skip_serializing_if = "Option::is_none")]
    pub candidates: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_hint: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub accepted_keys: Option<Vec<String>>,
}

type ApiError = (StatusCode, Json<ErrorResponse>);

/// HTTP status for a domain failure.
pub fn status_for(err: &IntelError) -> StatusCode {
    match err {
        IntelError::Configuration(_) => StatusCode::INTERNAL_SERVER_ERROR,
        IntelError::Validation(_) | IntelError::AmbiguousInput => StatusCode::BAD_REQUEST,
        IntelError::NoMatch { .. } | IntelError::UnresolvablePlatformId { .. } => {
            StatusCode::NOT_FOUND
        }
        IntelError::LowConfidenceMatch { .. } => StatusCode::UNPROCESSABLE_ENTITY,
        IntelError::UpstreamFailure { .. } | IntelError::Transport { .. } => {
            StatusCode::BAD_GATEWAY
        }
        IntelError::Timeout { .. } => StatusCode::GATEWAY_TIMEOUT,
    }
}

fn api_error(err: IntelError, accepted_keys: &[&str]) -> ApiError {
    let status = status_for(&err);
    if status.is_server_error() {
        warn!("Request failed ({}): {}", err.kind(), err);
    }
    let ambiguous = matches!(err, IntelError::AmbiguousInput);
    let candidates = match &err {
        IntelError::LowConfidenceMatch { candidates, .. } => Some(candidates.clone()),
        _ => None,
    };
    (
        status,
        Json(ErrorResponse {
            ok: false,
            kind: err.kind().to_string(),
            error: err.to_string(),
            candidates,
            retry_hint: ambiguous.then(|| RETRY_HINT.to_string()),
            accepted_keys: ambiguous
                .then(|| accepted_keys.iter().map(|k| k.to_string()).collect()),
        }),
    )
}

/// Ranked candidates returned instead of a resolution.
#[derive(Serialize, ToSchema, Debug)]
pub struct CandidatesResponse {
    /// Always `candidates`
    pub mode: String,
    pub query: String,
    pub candidates: Vec<RankedCandidate>,
    pub next_step: String,
    pub notes: Vec<String>,
}

impl CandidatesResponse {
    fn new(query: String, candidates: Vec<RankedCandidate>, follow_up: &str) -> Self {
        Self {
            mode: "candidates".to_string(),
            query,
            candidates,
            next_step: format!(
                "Choose one candidate and call {} with unified_app_id (or a resolved app_id).",
                follow_up
            ),
            notes: vec!["No follow-up fetch is performed in candidate mode.".to_string()],
        }
    }
}

/// Upstream endpoint templates that produced a response.
#[derive(Serialize, ToSchema, Debug)]
pub struct EndpointSources {
    pub search_endpoint: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details_endpoint: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sales_endpoint: Option<String>,
}

#[derive(Serialize, ToSchema, Debug)]
pub struct SnapshotResponse {
    #[serde(flatten)]
    pub snapshot: MetadataSnapshot,
    pub sources: EndpointSources,
}

#[derive(Serialize, ToSchema, Debug)]
pub struct SalesResponse {
    #[serde(flatten)]
    pub summary: SalesSummary,
    pub sources: EndpointSources,
}

#[derive(Serialize, ToSchema)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub upstream: String,
    pub auth_configured: bool,
    pub requests_per_minute: u32,
}

async fn list_candidates(
    state: &AppState,
    reference: AppReference,
    mode: ResolveMode,
    follow_up: &str,
    keys: &[&str],
) -> Result<Response, ApiError> {
    let query = reference.query.clone().unwrap_or_default();
    match state.intel_service.resolve(reference, mode).await {
        Ok(Resolution::Candidates(candidates)) => {
            Ok(Json(CandidatesResponse::new(query, candidates, follow_up)).into_response())
        }
        Ok(Resolution::App(app)) => Ok(Json(app).into_response()),
        Err(e) => Err(api_error(e, keys)),
    }
}

// ============================================================================
// System Handlers
// ============================================================================

#[utoipa::path(
    get,
    path = "/health",
    tag = "system",
    responses(
        (status = 200, description = "Health check passed", body = HealthResponse),
        (status = 503, description = "Upstream auth token missing", body = HealthResponse)
    )
)]
pub async fn health_handler(
    State(state): State<AppState>,
) -> Result<Json<HealthResponse>, (StatusCode, Json<HealthResponse>)> {
    let config = state.intel_service.config();
    let auth_configured = config.require_auth_token().is_ok();
    let response = HealthResponse {
        status: if auth_configured { "ok" } else { "degraded" }.to_string(),
        version: VERSION.to_string(),
        upstream: config.base_url.clone(),
        auth_configured,
        requests_per_minute: config.requests_per_minute,
    };

    if auth_configured {
        Ok(Json(response))
    } else {
        Err((StatusCode::SERVICE_UNAVAILABLE, Json(response)))
    }
}

#[utoipa::path(
    get,
    path = "/metrics",
    tag = "system",
    responses(
        (status = 200, description = "Prometheus metrics", content_type = "text/plain"),
        (status = 503, description = "Metrics recorder not installed")
    )
)]
pub async fn metrics_handler(State(state): State<AppState>) -> Response {
    match &state.metrics_handle {
        Some(handle) => handle.render().into_response(),
        None => (
            StatusCode::SERVICE_UNAVAILABLE,
            "metrics recorder not installed",
        )
            .into_response(),
    }
}

// ============================================================================
// App Handlers
// ============================================================================

/// Resolve an app reference to a platform id, or list candidates.
#[utoipa::path(
    get,
    path = "/v1/apps/resolve",
    params(AppLookupParams),
    responses(
        (status = 200, description = "Resolved app, or ranked candidates in candidate mode", body = ResolvedApp,
            example = json!({
                "unified_app_id": "55c5022702ac64f9c0001f6f",
                "app_id": "284882215",
                "app_os": "ios",
                "app_name": "Uber Eats",
                "note": null
            })
        ),
        (status = 400, description = "Missing or malformed identifier", body = ErrorResponse),
        (status = 404, description = "No app matched", body = ErrorResponse),
        (status = 422, description = "Best match below the acceptance threshold", body = ErrorResponse),
        (status = 502, description = "Upstream failure", body = ErrorResponse),
        (status = 504, description = "Upstream timeout", body = ErrorResponse)
    ),
    tag = "apps"
)]
#[instrument(skip(state))]
pub async fn resolve_handler(
    State(state): State<AppState>,
    query: Result<Query<AppLookupParams>, QueryRejection>,
) -> Result<Response, ApiError> {
    let params = lookup_params(query, RESOLVE_KEYS)?;
    let reference = params
        .reference(None)
        .map_err(|e| api_error(e, RESOLVE_KEYS))?;
    let mode = params
        .candidate_mode(&reference)
        .unwrap_or(ResolveMode::Single(Purpose::Metadata));
    list_candidates(&state, reference, mode, "/v1/apps/snapshot", RESOLVE_KEYS).await
}

/// Metadata snapshot: name, subtitle, description, languages, release date.
#[utoipa::path(
    get,
    path = "/v1/apps/snapshot",
    params(AppLookupParams),
    responses(
        (status = 200, description = "Metadata snapshot, or ranked candidates in candidate mode", body = SnapshotResponse),
        (status = 400, description = "Missing or malformed identifier", body = ErrorResponse),
        (status = 404, description = "No app matched", body = ErrorResponse),
        (status = 422, description = "Best match below the acceptance threshold", body = ErrorResponse),
        (status = 500, description = "Auth token not configured", body = ErrorResponse),
        (status = 502, description = "Upstream failure", body = ErrorResponse),
        (status = 504, description = "Upstream timeout", body = ErrorResponse)
    ),
    tag = "apps"
)]
#[instrument(skip(state))]
pub async fn snapshot_handler(
    State(state): State<AppState>,
    query: Result<Query<AppLookupParams>, QueryRejection>,
) -> Result<Response, ApiError> {
    let params = lookup_params(query, SNAPSHOT_KEYS)?;
    let reference = params
        .reference(params.metadata_os.as_deref())
        .map_err(|e| api_error(e, SNAPSHOT_KEYS))?;
    if let Some(mode) = params.candidate_mode(&reference) {
        return list_candidates(&state, reference, mode, "/v1/apps/snapshot", SNAPSHOT_KEYS).await;
    }

    let snapshot = state
        .intel_service
        .metadata_snapshot_for(reference)
        .await
        .map_err(|e| api_error(e, SNAPSHOT_KEYS))?;
    let endpoints = &state.intel_service.config().endpoints;
    Ok(Json(SnapshotResponse {
        snapshot,
        sources: EndpointSources {
            search_endpoint: endpoints.search_entities.clone(),
            details_endpoint: Some(endpoints.app_details.clone()),
            sales_endpoint: None,
        },
    })
    .into_response())
}

/// Sales and download estimates: all-time totals and one month by country.
#[utoipa::path(
    get,
    path = "/v1/apps/sales",
    params(AppLookupParams),
    responses(
        (status = 200, description = "Sales summary, or ranked candidates in candidate mode", body = SalesResponse),
        (status = 400, description = "Missing identifier or invalid month", body = ErrorResponse),
        (status = 404, description = "No app matched, or no id in the requested namespace", body = ErrorResponse),
        (status = 422, description = "Best match below the acceptance threshold", body = ErrorResponse),
        (status = 500, description = "Auth token not configured", body = ErrorResponse),
        (status = 502, description = "Upstream failure", body = ErrorResponse),
        (status = 504, description = "Upstream timeout", body = ErrorResponse)
    ),
    tag = "apps"
)]
#[instrument(skip(state))]
pub async fn sales_handler(
    State(state): State<AppState>,
    query: Result<Query<AppLookupParams>, QueryRejection>,
) -> Result<Response, ApiError> {
    let params = lookup_params(query, SALES_KEYS)?;
    let reference = params
        .reference(params.sales_os.as_deref())
        .map_err(|e| api_error(e, SALES_KEYS))?;
    if let Some(mode) = params.candidate_mode(&reference) {
        return list_candidates(&state, reference, mode, "/v1/apps/sales", SALES_KEYS).await;
    }

    let summary = state
        .intel_service
        .sales_summary_for(reference, params.month.as_deref(), params.top_countries_limit)
        .await
        .map_err(|e| api_error(e, SALES_KEYS))?;
    let endpoints = &state.intel_service.config().endpoints;
    let details_endpoint =
        (summary.app_os != AppOs::Unified).then(|| endpoints.app_details.clone());
    Ok(Json(SalesResponse {
        summary,
        sources: EndpointSources {
            search_endpoint: endpoints.search_entities.clone(),
            details_endpoint,
            sales_endpoint: Some(endpoints.sales_report.clone()),
        },
    })
    .into_response())
}
