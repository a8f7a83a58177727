//! Domain layer - app identities, upstream query types, and the client trait.
//!
//! This module defines the vocabulary shared by the resolver, the aggregator
//! and the HTTP surface:
//! - Identifier shapes (canonical unified ids, iOS numeric ids, Android packages)
//! - Platform namespaces and auth modes
//! - The `AppIntelApi` trait implemented by the upstream client
//! - Loosely-typed record readers and caller-facing summary models

pub mod app_models;
pub mod error;
pub mod records;

pub use app_models::*;
pub use error::IntelError;
pub use records::{JsonRecord, SalesRow};

use async_trait::async_trait;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use utoipa::ToSchema;

/// Platform namespace an upstream call targets.
///
/// `Unified` addresses the provider's cross-platform records; `Ios` and
/// `Android` address the store-specific endpoints that carry rich metadata.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum AppOs {
    Unified,
    Ios,
    Android,
}

impl AppOs {
    pub fn as_str(&self) -> &'static str {
        match self {
            AppOs::Unified => "unified",
            AppOs::Ios => "ios",
            AppOs::Android => "android",
        }
    }

    /// Value of the `app_id_type` parameter understood by the details endpoint.
    pub fn app_id_type(&self) -> &'static str {
        match self {
            AppOs::Unified => "unified",
            AppOs::Ios => "itunes",
            AppOs::Android => "android",
        }
    }

    pub fn is_platform(&self) -> bool {
        !matches!(self, AppOs::Unified)
    }
}

impl fmt::Display for AppOs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AppOs {
    type Err = IntelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "unified" => Ok(AppOs::Unified),
            "ios" => Ok(AppOs::Ios),
            "android" => Ok(AppOs::Android),
            other => Err(IntelError::validation(format!(
                "unknown os '{}', expected one of unified, ios, android",
                other
            ))),
        }
    }
}

/// How the auth token is attached to upstream requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuthMode {
    Bearer,
    Query,
    Both,
}

impl AuthMode {
    /// Lenient parse used by configuration loading.
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "bearer" => Some(AuthMode::Bearer),
            "query" | "query-param" | "query_param" => Some(AuthMode::Query),
            "both" => Some(AuthMode::Both),
            _ => None,
        }
    }

    pub fn uses_query(&self) -> bool {
        matches!(self, AuthMode::Query | AuthMode::Both)
    }

    pub fn uses_bearer(&self) -> bool {
        matches!(self, AuthMode::Bearer | AuthMode::Both)
    }
}

/// Returns true for a 24-character hexadecimal unified app id.
pub fn is_unified_app_id(value: &str) -> bool {
    let trimmed = value.trim();
    trimmed.len() == 24 && trimmed.chars().all(|c| c.is_ascii_hexdigit())
}

/// Infer the platform namespace of a bare platform id.
///
/// All-digit ids are iOS store ids, dotted ids are Android packages.
pub fn infer_os_from_app_id(app_id: &str) -> Option<AppOs> {
    let trimmed = app_id.trim();
    if !trimmed.is_empty() && trimmed.chars().all(|c| c.is_ascii_digit()) {
        return Some(AppOs::Ios);
    }
    if trimmed.contains('.') {
        return Some(AppOs::Android);
    }
    None
}

/// Returns true when a free-text value is shaped like an Android package name
/// (`segment(.segment)+`, first segment starting with a letter, no whitespace).
pub fn looks_like_android_package(value: &str) -> bool {
    let trimmed = value.trim();
    if trimmed.is_empty() || trimmed.chars().any(char::is_whitespace) {
        return false;
    }
    let segments: Vec<&str> = trimmed.split('.').collect();
    if segments.len() < 2 {
        return false;
    }
    let valid_segment =
        |s: &str| !s.is_empty() && s.chars().all(|c| c.is_ascii_alphanumeric() || c == '_');
    let starts_with_letter = segments[0]
        .chars()
        .next()
        .map(|c| c.is_ascii_alphabetic())
        .unwrap_or(false);
    starts_with_letter && segments.iter().all(|s| valid_segment(s))
}

/// One entry of the unified search endpoint, filtered to valid unified ids.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchCandidate {
    /// Lower-cased unified app id
    pub unified_app_id: String,
    pub name: Option<String>,
    pub raw: JsonRecord,
}

/// Platform ids a unified id maps to.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PlatformIds {
    pub ios_app_id: Option<String>,
    pub android_app_id: Option<String>,
}

impl PlatformIds {
    pub fn for_os(&self, os: AppOs) -> Option<&str> {
        match os {
            AppOs::Ios => self.ios_app_id.as_deref(),
            AppOs::Android => self.android_app_id.as_deref(),
            AppOs::Unified => None,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.ios_app_id.is_none() && self.android_app_id.is_none()
    }
}

/// Reporting granularity of the sales endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DateGranularity {
    Daily,
    Monthly,
    Yearly,
}

impl DateGranularity {
    pub fn as_str(&self) -> &'static str {
        match self {
            DateGranularity::Daily => "daily",
            DateGranularity::Monthly => "monthly",
            DateGranularity::Yearly => "yearly",
        }
    }
}

/// Parameters of one sales report request.
#[derive(Debug, Clone, PartialEq)]
pub struct SalesQuery {
    pub app_id: String,
    pub os: AppOs,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub granularity: DateGranularity,
    /// Comma-separated country filter; `None` returns every country
    pub countries: Option<String>,
}

/// Upstream app-intelligence operations used by the resolver and services.
///
/// Implementations must be thread-safe (`Send + Sync`) and pace their own
/// network calls.
///
/// # Implementations
///
/// See `infrastructure::intel_client::AppIntelClient` for the HTTP implementation.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait AppIntelApi: Send + Sync {
    /// Search unified app entities by free-text term.
    async fn search_apps(&self, term: &str, limit: usize)
        -> Result<Vec<SearchCandidate>, IntelError>;

    /// Map a unified id to its iOS and Android ids.
    async fn resolve_platform_ids(&self, unified_app_id: &str)
        -> Result<PlatformIds, IntelError>;

    /// Fetch the details record for an app in a namespace.
    ///
    /// Returns `Ok(None)` when the endpoint answered with no records.
    async fn app_details(&self, app_id: &str, os: AppOs)
        -> Result<Option<JsonRecord>, IntelError>;

    /// Fetch raw sales report rows.
    async fn sales_rows(&self, query: &SalesQuery) -> Result<Vec<JsonRecord>, IntelError>;
}
