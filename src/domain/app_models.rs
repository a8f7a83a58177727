//! Caller-facing models produced by resolution and aggregation.

use super::AppOs;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Outcome of resolving an app reference to a concrete upstream identity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct ResolvedApp {
    /// 24-char hex unified id, when known
    pub unified_app_id: Option<String>,
    /// Identifier used for details and sales calls
    pub app_id: String,
    /// Namespace the `app_id` belongs to
    pub app_os: AppOs,
    /// Display name from the search step, if resolution went through search
    pub app_name: Option<String>,
    /// Low-confidence or fallback note the caller should surface
    pub note: Option<String>,
}

/// Ranked search entry returned in candidate mode.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct RankedCandidate {
    pub rank: usize,
    pub unified_app_id: String,
    pub name: Option<String>,
    /// Name-match score rounded to four decimals
    pub score: f64,
}

/// Result of `resolve`: one app, or a candidate list for external disambiguation.
#[derive(Debug, Clone, PartialEq)]
pub enum Resolution {
    App(ResolvedApp),
    Candidates(Vec<RankedCandidate>),
}

/// Text metadata of one app.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct AppMetadata {
    pub subtitle_or_short_description: Option<String>,
    pub long_description: Option<String>,
    pub languages: Vec<String>,
}

/// Metadata snapshot of a resolved app.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct MetadataSnapshot {
    pub unified_app_id: Option<String>,
    pub app_id: String,
    pub app_os: AppOs,
    pub app_name: Option<String>,
    pub metadata: AppMetadata,
    pub release_date: Option<NaiveDate>,
    pub notes: Vec<String>,
}

/// Calendar month query bounds (UTC).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct MonthWindow {
    /// `YYYY-MM`
    pub month: String,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
}

/// Per-country downloads and revenue within the month window.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct TopCountry {
    pub country: String,
    pub downloads_estimate: f64,
    pub revenue_estimate: Option<f64>,
}

/// All-time totals from release (or fallback start) through today.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct OverallMetrics {
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub downloads_estimate: Option<f64>,
    pub revenue_estimate: Option<f64>,
    /// Revenue per download; `None` when downloads are zero or unknown
    pub rdp: Option<f64>,
}

/// Totals and country breakdown for one calendar month.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct MonthMetrics {
    pub month: String,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub downloads_estimate: Option<f64>,
    pub revenue_estimate: Option<f64>,
    pub top_countries: Vec<TopCountry>,
}

/// Sales and download estimates of a resolved app.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct SalesSummary {
    pub unified_app_id: Option<String>,
    pub app_id: String,
    pub app_os: AppOs,
    pub app_name: Option<String>,
    pub overall: OverallMetrics,
    pub month: MonthMetrics,
    pub notes: Vec<String>,
}
