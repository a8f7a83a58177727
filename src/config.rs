//! Configuration loading for the gateway and the upstream client.
//!
//! Settings come from an optional `config.yaml` plus environment variables
//! (loaded through `dotenvy` in `main`). Every upstream setting is optional;
//! missing or out-of-range values fall back to documented defaults.

use crate::application::matching::MatchThresholds;
use crate::domain::{AppOs, AuthMode, IntelError};
use anyhow::Context;
use chrono::NaiveDate;
use serde::Deserialize;
use std::fs;
use std::path::Path;
use std::time::Duration;
use tracing::{info, warn};

pub const DEFAULT_BASE_URL: &str = "https://api.sensortower.com";
pub const DEFAULT_REQUESTS_PER_MINUTE: u32 = 6;
pub const MAX_REQUESTS_PER_MINUTE: u32 = 60;
pub const DEFAULT_TIMEOUT_MS: u64 = 25_000;
pub const MIN_TIMEOUT_MS: u64 = 1_000;
pub const DEFAULT_COUNTRY: &str = "WW";
pub const DEFAULT_TOP_COUNTRIES_LIMIT: usize = 10;
pub const MAX_TOP_COUNTRIES_LIMIT: usize = 25;
pub const DEFAULT_ALL_TIME_FALLBACK_START_DATE: &str = "2014-01-01";

pub const DEFAULT_SEARCH_ENDPOINT: &str = "/v1/unified/search_entities";
pub const DEFAULT_DETAILS_ENDPOINT: &str = "/v1/{os}/apps";
pub const DEFAULT_SALES_ENDPOINT: &str = "/v1/{os}/sales_report_estimates";

/// Environment variables checked for the auth token, in order.
pub const AUTH_TOKEN_ENV_VARS: &[&str] = &[
    "APPINTEL_AUTH_TOKEN",
    "SENSORTOWER_AUTH_TOKEN",
    "SENSOR_TOWER_AUTH_TOKEN",
    "SENSORTOWER_API_KEY",
    "SENSOR_TOWER_API_KEY",
];

/// Top-level file configuration loaded from `config.yaml`.
#[derive(Deserialize, Debug, Clone, Default)]
pub struct AppConfig {
    /// Server configuration (host, port, CORS origins)
    #[serde(default)]
    pub server: ServerConfig,
    /// Upstream app-intelligence API settings
    #[serde(default)]
    pub intel: RawIntelConfig,
}

/// Server configuration settings.
#[derive(Deserialize, Debug, Clone)]
pub struct ServerConfig {
    /// Host address to bind to (default: "0.0.0.0")
    #[serde(default = "default_host")]
    pub host: String,
    /// Port number to listen on (default: 3010)
    #[serde(default = "default_port")]
    pub port: u16,
    /// Comma-separated list of allowed CORS origins (default: "*")
    #[serde(default = "default_allowed_origins")]
    pub allowed_origins: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            allowed_origins: default_allowed_origins(),
        }
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}
fn default_port() -> u16 {
    3010
}
fn default_allowed_origins() -> String {
    "*".to_string()
}

/// Integer settings may be written as numbers or numeric strings.
#[derive(Deserialize, Debug, Clone, PartialEq)]
#[serde(untagged)]
pub enum NumberLike {
    Int(i64),
    Float(f64),
    Text(String),
}

impl NumberLike {
    /// Whole value, floored; `None` for non-numeric or non-finite input.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            NumberLike::Int(v) => Some(*v),
            NumberLike::Float(v) if v.is_finite() => Some(v.floor() as i64),
            NumberLike::Float(_) => None,
            NumberLike::Text(s) => s
                .trim()
                .parse::<f64>()
                .ok()
                .filter(|v| v.is_finite())
                .map(|v| v.floor() as i64),
        }
    }
}

/// Endpoint template overrides as written in the file.
#[derive(Deserialize, Debug, Clone, Default)]
pub struct RawEndpoints {
    pub search_entities: Option<String>,
    pub app_details: Option<String>,
    pub sales_report: Option<String>,
    /// Legacy name for `sales_report`
    pub unified_sales_report: Option<String>,
}

/// Unvalidated upstream settings; see [`IntelConfig::from_raw`].
#[derive(Deserialize, Debug, Clone, Default)]
pub struct RawIntelConfig {
    pub base_url: Option<String>,
    pub auth_token: Option<String>,
    pub auth_mode: Option<String>,
    pub requests_per_minute: Option<NumberLike>,
    pub timeout_ms: Option<NumberLike>,
    pub default_metadata_os: Option<String>,
    pub default_country: Option<String>,
    pub default_top_countries_limit: Option<NumberLike>,
    pub all_time_fallback_start_date: Option<String>,
    #[serde(default)]
    pub endpoints: RawEndpoints,
    pub match_accept_threshold: Option<f64>,
    pub match_confident_threshold: Option<f64>,
}

/// Path templates of the three upstream endpoints.
///
/// `app_details` and `sales_report` contain an `{os}` placeholder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EndpointTemplates {
    pub search_entities: String,
    pub app_details: String,
    pub sales_report: String,
}

impl Default for EndpointTemplates {
    fn default() -> Self {
        Self {
            search_entities: DEFAULT_SEARCH_ENDPOINT.to_string(),
            app_details: DEFAULT_DETAILS_ENDPOINT.to_string(),
            sales_report: DEFAULT_SALES_ENDPOINT.to_string(),
        }
    }
}

/// Substitute the `{os}` placeholder of an endpoint template.
pub fn format_endpoint_path(template: &str, os: AppOs) -> String {
    template.replace("{os}", os.as_str())
}

/// Validated, immutable upstream client configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct IntelConfig {
    pub base_url: String,
    /// Empty when no token was configured; checked before any network call
    pub auth_token: String,
    pub auth_mode: AuthMode,
    pub requests_per_minute: u32,
    pub timeout: Duration,
    pub default_metadata_os: AppOs,
    pub default_country: String,
    pub default_top_countries_limit: usize,
    pub all_time_fallback_start_date: NaiveDate,
    pub endpoints: EndpointTemplates,
    pub match_thresholds: MatchThresholds,
}

impl Default for IntelConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            auth_token: String::new(),
            auth_mode: AuthMode::Query,
            requests_per_minute: DEFAULT_REQUESTS_PER_MINUTE,
            timeout: Duration::from_millis(DEFAULT_TIMEOUT_MS),
            default_metadata_os: AppOs::Unified,
            default_country: DEFAULT_COUNTRY.to_string(),
            default_top_countries_limit: DEFAULT_TOP_COUNTRIES_LIMIT,
            all_time_fallback_start_date: default_fallback_start_date(),
            endpoints: EndpointTemplates::default(),
            match_thresholds: MatchThresholds::default(),
        }
    }
}

fn default_fallback_start_date() -> NaiveDate {
    NaiveDate::from_ymd_opt(2014, 1, 1).unwrap_or_default()
}

fn non_empty(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

fn clamp_integer(value: &Option<NumberLike>, min: i64, max: i64, fallback: i64) -> i64 {
    value
        .as_ref()
        .and_then(NumberLike::as_i64)
        .map(|v| v.clamp(min, max))
        .unwrap_or(fallback)
}

impl IntelConfig {
    /// Build from file settings, reading the auth token fallback from the process environment.
    pub fn from_raw(raw: &RawIntelConfig) -> Self {
        Self::from_raw_with_env(raw, |key| std::env::var(key).ok())
    }

    /// Build from file settings with an injectable environment lookup.
    pub fn from_raw_with_env<F>(raw: &RawIntelConfig, env: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let auth_token = non_empty(&raw.auth_token)
            .or_else(|| {
                AUTH_TOKEN_ENV_VARS
                    .iter()
                    .find_map(|key| non_empty(&env(key)))
            })
            .unwrap_or_default();

        let auth_mode = raw
            .auth_mode
            .as_deref()
            .and_then(AuthMode::parse)
            .unwrap_or(defaults.auth_mode);

        let default_metadata_os = raw
            .default_metadata_os
            .as_deref()
            .and_then(|s| s.parse::<AppOs>().ok())
            .unwrap_or(defaults.default_metadata_os);

        let all_time_fallback_start_date = match non_empty(&raw.all_time_fallback_start_date) {
            Some(text) => NaiveDate::parse_from_str(&text, "%Y-%m-%d").unwrap_or_else(|_| {
                warn!(
                    "Invalid all_time_fallback_start_date '{}', using {}",
                    text, DEFAULT_ALL_TIME_FALLBACK_START_DATE
                );
                defaults.all_time_fallback_start_date
            }),
            None => defaults.all_time_fallback_start_date,
        };

        let endpoints = EndpointTemplates {
            search_entities: non_empty(&raw.endpoints.search_entities)
                .unwrap_or(defaults.endpoints.search_entities),
            app_details: non_empty(&raw.endpoints.app_details)
                .unwrap_or(defaults.endpoints.app_details),
            sales_report: non_empty(&raw.endpoints.sales_report)
                .or_else(|| non_empty(&raw.endpoints.unified_sales_report))
                .unwrap_or(defaults.endpoints.sales_report),
        };

        let match_thresholds = MatchThresholds::new(
            raw.match_accept_threshold
                .unwrap_or(defaults.match_thresholds.accept),
            raw.match_confident_threshold
                .unwrap_or(defaults.match_thresholds.confident),
        );

        Self {
            base_url: non_empty(&raw.base_url).unwrap_or(defaults.base_url),
            auth_token,
            auth_mode,
            requests_per_minute: clamp_integer(
                &raw.requests_per_minute,
                1,
                MAX_REQUESTS_PER_MINUTE as i64,
                DEFAULT_REQUESTS_PER_MINUTE as i64,
            ) as u32,
            timeout: Duration::from_millis(clamp_integer(
                &raw.timeout_ms,
                MIN_TIMEOUT_MS as i64,
                i64::MAX,
                DEFAULT_TIMEOUT_MS as i64,
            ) as u64),
            default_metadata_os,
            default_country: non_empty(&raw.default_country)
                .map(|c| c.to_ascii_uppercase())
                .unwrap_or(defaults.default_country),
            default_top_countries_limit: clamp_integer(
                &raw.default_top_countries_limit,
                1,
                MAX_TOP_COUNTRIES_LIMIT as i64,
                DEFAULT_TOP_COUNTRIES_LIMIT as i64,
            ) as usize,
            all_time_fallback_start_date,
            endpoints,
            match_thresholds,
        }
    }

    /// The auth token, or a configuration error when none is set.
    pub fn require_auth_token(&self) -> Result<&str, IntelError> {
        if self.auth_token.trim().is_empty() {
            return Err(IntelError::Configuration(format!(
                "auth token missing; set intel.auth_token in config.yaml or {}",
                AUTH_TOKEN_ENV_VARS[0]
            )));
        }
        Ok(&self.auth_token)
    }

    /// Fixed spacing between upstream requests: `ceil(60000 / requests_per_minute)` ms.
    pub fn request_interval(&self) -> Duration {
        interval_for_budget(self.requests_per_minute)
    }
}

/// `ceil(60000 / budget)` milliseconds, with the budget floored at 1.
pub fn interval_for_budget(requests_per_minute: u32) -> Duration {
    let budget = u64::from(requests_per_minute.max(1));
    Duration::from_millis(60_000u64.div_ceil(budget))
}

impl AppConfig {
    /// Load `config.yaml`; a missing file yields defaults.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        if !path.exists() {
            info!(
                "No config file at {}, using defaults and environment",
                path.display()
            );
            return Ok(Self::default());
        }
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        let config: AppConfig = serde_yaml::from_str(&content)
            .with_context(|| format!("Failed to parse {} - check YAML syntax and structure", path.display()))?;
        Ok(config)
    }
}
