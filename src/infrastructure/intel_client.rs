//! HTTP client for the upstream app-intelligence API.
//!
//! Wraps the [`RequestExecutor`] with the four logical operations the
//! resolver and services need, and adapts the provider's loosely-typed
//! records into domain types.

use super::executor::RequestExecutor;
use super::transport::{HttpTransport, ReqwestTransport};
use crate::config::{format_endpoint_path, IntelConfig};
use crate::domain::records::{aliases, first_nested_record, read_identifier, read_string};
use crate::domain::{
    is_unified_app_id, AppIntelApi, AppOs, IntelError, JsonRecord, PlatformIds, SalesQuery,
    SearchCandidate,
};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, info};

/// Mapping endpoint translating unified ids to platform ids.
pub const UNIFIED_MAPPING_ENDPOINT: &str = "/v1/unified/apps";

/// Country sent with platform details lookups for richer metadata.
const DETAILS_COUNTRY: &str = "US";

const MAX_SEARCH_LIMIT: usize = 100;

/// Extract platform ids from a mapping record.
///
/// Nested `itunes_apps[0]` / `android_apps[0]` entries take priority over
/// flat aliased fields. Numeric ids are coerced to strings.
pub fn platform_ids_from_mapping(record: &JsonRecord) -> PlatformIds {
    let ios_app_id = first_nested_record(record, aliases::NESTED_IOS_APPS)
        .and_then(|nested| read_identifier(nested, aliases::NESTED_IOS_ID))
        .or_else(|| read_identifier(record, aliases::FLAT_IOS_ID));
    let android_app_id = first_nested_record(record, aliases::NESTED_ANDROID_APPS)
        .and_then(|nested| read_identifier(nested, aliases::NESTED_ANDROID_ID))
        .or_else(|| read_identifier(record, aliases::FLAT_ANDROID_ID));
    PlatformIds {
        ios_app_id,
        android_app_id,
    }
}

/// Search records with a canonical id; ids are lower-cased.
pub fn search_candidates(records: Vec<JsonRecord>) -> Vec<SearchCandidate> {
    records
        .into_iter()
        .filter_map(|record| {
            let id = read_string(&record, aliases::ENTITY_ID)?;
            if !is_unified_app_id(&id) {
                return None;
            }
            Some(SearchCandidate {
                unified_app_id: id.to_ascii_lowercase(),
                name: read_string(&record, aliases::SEARCH_NAME),
                raw: record,
            })
        })
        .collect()
}

/// Row whose id matches `app_id` case-insensitively, else the first row.
pub fn pick_details_record(records: Vec<JsonRecord>, app_id: &str) -> Option<JsonRecord> {
    let target = app_id.trim().to_ascii_lowercase();
    let position = records.iter().position(|record| {
        read_identifier(record, aliases::ENTITY_ID)
            .map(|id| id.to_ascii_lowercase() == target)
            .unwrap_or(false)
    });
    let mut records = records;
    match position {
        Some(index) => Some(records.swap_remove(index)),
        None => records.into_iter().next(),
    }
}

/// Upstream client implementing [`AppIntelApi`] over HTTP.
#[derive(Clone)]
pub struct AppIntelClient {
    config: Arc<IntelConfig>,
    executor: RequestExecutor,
}

impl AppIntelClient {
    /// Create a client using the default `reqwest` transport.
    pub fn new(config: Arc<IntelConfig>) -> Self {
        Self::with_transport(config, Arc::new(ReqwestTransport::new()))
    }

    pub fn with_transport(config: Arc<IntelConfig>, transport: Arc<dyn HttpTransport>) -> Self {
        let executor = RequestExecutor::new(&config, transport);
        Self { config, executor }
    }

    pub fn with_executor(config: Arc<IntelConfig>, executor: RequestExecutor) -> Self {
        Self { config, executor }
    }

    pub fn config(&self) -> &IntelConfig {
        &self.config
    }
}

#[async_trait]
impl AppIntelApi for AppIntelClient {
    async fn search_apps(
        &self,
        term: &str,
        limit: usize,
    ) -> Result<Vec<SearchCandidate>, IntelError> {
        info!("Searching apps for term: {}", term);
        let limit = limit.clamp(1, MAX_SEARCH_LIMIT);
        let records = self
            .executor
            .get_records(
                &self.config.endpoints.search_entities,
                &[
                    ("entity_type", "app".to_string()),
                    ("term", term.to_string()),
                    ("limit", limit.to_string()),
                ],
            )
            .await?;
        let candidates = search_candidates(records);
        debug!("Search for '{}' returned {} candidates", term, candidates.len());
        Ok(candidates)
    }

    async fn resolve_platform_ids(&self, unified_app_id: &str) -> Result<PlatformIds, IntelError> {
        info!("Resolving platform ids for unified app: {}", unified_app_id);
        let records = self
            .executor
            .get_records(
                UNIFIED_MAPPING_ENDPOINT,
                &[
                    ("app_id_type", AppOs::Unified.app_id_type().to_string()),
                    ("app_ids", unified_app_id.to_string()),
                ],
            )
            .await?;
        Ok(records
            .first()
            .map(platform_ids_from_mapping)
            .unwrap_or_default())
    }

    async fn app_details(
        &self,
        app_id: &str,
        os: AppOs,
    ) -> Result<Option<JsonRecord>, IntelError> {
        info!("Fetching {} app details: {}", os, app_id);
        let mut params = vec![("app_ids", app_id.to_string())];
        if os.is_platform() {
            params.push(("country", DETAILS_COUNTRY.to_string()));
        } else {
            params.push(("app_id_type", os.app_id_type().to_string()));
        }
        let path = format_endpoint_path(&self.config.endpoints.app_details, os);
        let records = self.executor.get_records(&path, &params).await?;
        Ok(pick_details_record(records, app_id))
    }

    async fn sales_rows(&self, query: &SalesQuery) -> Result<Vec<JsonRecord>, IntelError> {
        info!(
            "Fetching {} sales for {} from {} to {}",
            query.os, query.app_id, query.start_date, query.end_date
        );
        let mut params = vec![
            ("app_ids", query.app_id.clone()),
            ("start_date", query.start_date.format("%Y-%m-%d").to_string()),
            ("end_date", query.end_date.format("%Y-%m-%d").to_string()),
            ("date_granularity", query.granularity.as_str().to_string()),
        ];
        if let Some(countries) = query.countries.as_deref().map(str::trim) {
            if !countries.is_empty() {
                params.push(("countries", countries.to_string()));
            }
        }
        let path = format_endpoint_path(&self.config.endpoints.sales_report, query.os);
        self.executor.get_records(&path, &params).await
    }
}
