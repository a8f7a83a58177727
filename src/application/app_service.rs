//! Orchestrators for the caller-facing operations: resolution, metadata
//! snapshots, and sales summaries.
//!
//! Metadata and sales are independent, separately failable operations so the
//! caller decides how to combine partial results.

use super::aggregation::{overall_metrics, summarize_rows};
use super::month_window::resolve_month_window;
use super::resolver::{AppReference, IdentifierResolver, Purpose, ResolveMode};
use crate::config::IntelConfig;
use crate::domain::records::{
    aliases, extract_languages, read_release_date, read_string, JsonRecord,
};
use crate::domain::{
    is_unified_app_id, AppIntelApi, AppMetadata, AppOs, AuthMode, DateGranularity, IntelError,
    MetadataSnapshot, MonthMetrics, MonthWindow, Resolution, ResolvedApp, SalesQuery, SalesRow,
    SalesSummary,
};
use chrono::{NaiveDate, Utc};
use std::sync::Arc;
use tracing::{info, warn};

#[derive(Clone)]
pub struct AppIntelService {
    api: Arc<dyn AppIntelApi>,
    resolver: IdentifierResolver,
    config: Arc<IntelConfig>,
}

impl AppIntelService {
    pub fn new(api: Arc<dyn AppIntelApi>, config: Arc<IntelConfig>) -> Self {
        let resolver = IdentifierResolver::new(
            api.clone(),
            config.match_thresholds,
            config.default_metadata_os,
        );
        Self {
            api,
            resolver,
            config,
        }
    }

    pub fn config(&self) -> &IntelConfig {
        &self.config
    }

    /// Notes attached to every snapshot and summary.
    fn base_notes(&self, resolution_note: Option<&str>) -> Vec<String> {
        let mut notes = vec![
            "All values are upstream estimates.".to_string(),
            format!(
                "Upstream requests are paced to {} per minute.",
                self.config.requests_per_minute
            ),
        ];
        if self.config.auth_mode == AuthMode::Query {
            notes.push("Auth token is sent as a query parameter.".to_string());
        }
        notes.extend(resolution_note.map(str::to_string));
        notes
    }

    /// Resolve an app reference, or list candidates.
    pub async fn resolve(
        &self,
        reference: AppReference,
        mode: ResolveMode,
    ) -> Result<Resolution, IntelError> {
        self.config.require_auth_token()?;
        self.resolver.resolve(reference, mode).await
    }

    /// Fetch text metadata for a resolved app.
    ///
    /// A unified-namespace app is first cascaded to a platform id because the
    /// unified details record carries no descriptive metadata.
    pub async fn fetch_metadata_snapshot(
        &self,
        app: &ResolvedApp,
    ) -> Result<MetadataSnapshot, IntelError> {
        self.config.require_auth_token()?;

        let app = if app.app_os == AppOs::Unified {
            let mut cascaded = self
                .resolver
                .resolve_app(
                    AppReference {
                        unified_app_id: app.unified_app_id.clone().or(Some(app.app_id.clone())),
                        ..AppReference::default()
                    },
                    Purpose::Metadata,
                )
                .await?;
            cascaded.app_name = cascaded.app_name.or_else(|| app.app_name.clone());
            cascaded.note = match (app.note.clone(), cascaded.note) {
                (Some(a), Some(b)) => Some(format!("{} {}", a, b)),
                (a, b) => a.or(b),
            };
            cascaded
        } else {
            app.clone()
        };

        let details = self.api.app_details(&app.app_id, app.app_os).await?;
        let mut notes = self.base_notes(app.note.as_deref());
        if details.is_none() {
            warn!("No details record for {} app {}", app.app_os, app.app_id);
            notes.push(format!(
                "No details record was returned for {} app {}.",
                app.app_os, app.app_id
            ));
        }
        let details = details.unwrap_or_default();

        info!("Built metadata snapshot for {} app {}", app.app_os, app.app_id);
        Ok(MetadataSnapshot {
            unified_app_id: unified_id_or_details(&app, &details),
            app_id: app.app_id.clone(),
            app_os: app.app_os,
            app_name: read_string(&details, aliases::DETAILS_NAME).or(app.app_name.clone()),
            metadata: AppMetadata {
                subtitle_or_short_description: read_string(&details, aliases::SUBTITLE),
                long_description: read_string(&details, aliases::DESCRIPTION),
                languages: extract_languages(&details),
            },
            release_date: read_release_date(&details),
            notes,
        })
    }

    /// Resolve then fetch metadata.
    pub async fn metadata_snapshot_for(
        &self,
        reference: AppReference,
    ) -> Result<MetadataSnapshot, IntelError> {
        self.config.require_auth_token()?;
        let app = self.resolver.resolve_app(reference, Purpose::Metadata).await?;
        self.fetch_metadata_snapshot(&app).await
    }

    /// Fetch all-time and monthly sales estimates for a resolved app.
    pub async fn fetch_sales_summary(
        &self,
        app: &ResolvedApp,
        window: &MonthWindow,
        top_countries_limit: Option<usize>,
    ) -> Result<SalesSummary, IntelError> {
        self.fetch_sales_summary_on(app, window, top_countries_limit, Utc::now().date_naive())
            .await
    }

    /// [`Self::fetch_sales_summary`] with an explicit "today".
    ///
    /// # Errors
    ///
    /// Propagates upstream failures from both sales queries. A failed or
    /// missing release date falls back to the configured start date with a
    /// note, and missing data degrades to `None` fields.
    pub async fn fetch_sales_summary_on(
        &self,
        app: &ResolvedApp,
        window: &MonthWindow,
        top_countries_limit: Option<usize>,
        today: NaiveDate,
    ) -> Result<SalesSummary, IntelError> {
        self.config.require_auth_token()?;
        let top_limit = top_countries_limit.unwrap_or(self.config.default_top_countries_limit);

        let details = self.release_details(app).await;
        let mut notes = self.base_notes(app.note.as_deref());

        let start_date = match read_release_date(&details) {
            Some(released) => released.min(today),
            None => {
                notes.push(format!(
                    "Release date unknown; all-time totals start at {}.",
                    self.config.all_time_fallback_start_date
                ));
                self.config.all_time_fallback_start_date.min(today)
            }
        };

        let overall_query = SalesQuery {
            app_id: app.app_id.clone(),
            os: app.app_os,
            start_date,
            end_date: today,
            granularity: DateGranularity::Monthly,
            countries: Some(self.config.default_country.clone()),
        };
        let month_query = SalesQuery {
            start_date: window.start_date,
            end_date: window.end_date,
            countries: None,
            ..overall_query.clone()
        };

        let (overall_rows, month_rows) = tokio::try_join!(
            self.api.sales_rows(&overall_query),
            self.api.sales_rows(&month_query)
        )?;

        let overall = overall_metrics(&SalesRow::parse_all(&overall_rows), start_date, today);
        let month_totals = summarize_rows(&SalesRow::parse_all(&month_rows), top_limit);

        info!(
            "Built sales summary for {} app {} ({} overall rows, {} month rows)",
            app.app_os,
            app.app_id,
            overall_rows.len(),
            month_rows.len()
        );
        Ok(SalesSummary {
            unified_app_id: unified_id_or_details(app, &details),
            app_id: app.app_id.clone(),
            app_os: app.app_os,
            app_name: app
                .app_name
                .clone()
                .or_else(|| read_string(&details, aliases::DETAILS_NAME)),
            overall,
            month: MonthMetrics {
                month: window.month.clone(),
                start_date: window.start_date,
                end_date: window.end_date,
                downloads_estimate: month_totals.downloads,
                revenue_estimate: month_totals.revenue,
                top_countries: month_totals.top_countries,
            },
            notes,
        })
    }

    /// Details record used to anchor all-time totals.
    ///
    /// Unified ids skip the lookup entirely; platform lookups that fail are
    /// logged and treated as an empty record.
    async fn release_details(&self, app: &ResolvedApp) -> JsonRecord {
        if app.app_os == AppOs::Unified {
            return JsonRecord::new();
        }
        match self.api.app_details(&app.app_id, app.app_os).await {
            Ok(details) => details.unwrap_or_default(),
            Err(err) => {
                warn!(
                    "Release date lookup failed for {} app {}: {}",
                    app.app_os, app.app_id, err
                );
                JsonRecord::new()
            }
        }
    }

    /// Resolve then fetch sales for `month` (`YYYY-MM`, default previous month).
    pub async fn sales_summary_for(
        &self,
        reference: AppReference,
        month: Option<&str>,
        top_countries_limit: Option<usize>,
    ) -> Result<SalesSummary, IntelError> {
        self.config.require_auth_token()?;
        let window = resolve_month_window(month, Utc::now().date_naive())?;
        let app = self.resolver.resolve_app(reference, Purpose::Sales).await?;
        self.fetch_sales_summary(&app, &window, top_countries_limit)
            .await
    }
}

fn unified_id_or_details(app: &ResolvedApp, details: &JsonRecord) -> Option<String> {
    app.unified_app_id.clone().or_else(|| {
        read_string(details, aliases::DETAILS_UNIFIED_ID)
            .filter(|id| is_unified_app_id(id))
            .map(|id| id.to_ascii_lowercase())
    })
}
