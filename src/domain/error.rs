//! Error type shared by the client, resolver, and aggregator.

use std::time::Duration;
use thiserror::Error;

/// Tagged failure surfaced by every core operation.
///
/// Numeric gaps in upstream data are never reported through this type; they
/// degrade to `None` in the summaries instead.
#[derive(Debug, Error)]
pub enum IntelError {
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("validation error: {0}")]
    Validation(String),

    #[error("missing app identifier: provide unified_app_id, app_id, or app_query")]
    AmbiguousInput,

    #[error("no app found for query: {query}")]
    NoMatch { query: String },

    #[error("no confident app match for query \"{query}\". Top candidates: {}", candidates.join(", "))]
    LowConfidenceMatch {
        query: String,
        score: f64,
        candidates: Vec<String>,
    },

    #[error("upstream request failed ({status}) at {path}: {detail}")]
    UpstreamFailure {
        status: u16,
        path: String,
        detail: String,
    },

    #[error("upstream request timed out after {}ms", after.as_millis())]
    Timeout { after: Duration },

    #[error("unable to resolve {os} app id from unified_app_id {unified_app_id}; retry with app_id or use the unified namespace")]
    UnresolvablePlatformId { unified_app_id: String, os: String },

    #[error("upstream transport error at {path}: {message}")]
    Transport { path: String, message: String },
}

impl IntelError {
    /// Stable machine-readable tag for the failure.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Configuration(_) => "configuration",
            Self::Validation(_) => "validation",
            Self::AmbiguousInput => "ambiguous_input",
            Self::NoMatch { .. } => "no_match",
            Self::LowConfidenceMatch { .. } => "low_confidence_match",
            Self::UpstreamFailure { .. } => "upstream_failure",
            Self::Timeout { .. } => "timeout",
            Self::UnresolvablePlatformId { .. } => "unresolvable_platform_id",
            Self::Transport { .. } => "transport",
        }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }
}
