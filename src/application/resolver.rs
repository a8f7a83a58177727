//! Identifier resolution: free-text queries, platform ids and unified ids.
//!
//! Precedence when several identifiers are supplied: an explicit platform id,
//! then a unified id, then a free-text query. A query shaped like an Android
//! package is treated as a platform id. Unified ids are cascaded down to a
//! platform id when the caller's purpose requires one.

use super::matching::{
    rank_candidates, to_ranked_candidates, MatchThresholds, ScoredCandidate, RUNNER_UP_NAMES,
};
use crate::domain::{
    infer_os_from_app_id, is_unified_app_id, looks_like_android_package, AppIntelApi, AppOs,
    IntelError, Resolution, ResolvedApp,
};
use std::sync::Arc;
use tracing::{info, warn};

/// Search page size used for resolution and candidate listing.
pub const SEARCH_RESULTS_LIMIT: usize = 10;

/// Default number of entries returned in candidate mode.
pub const DEFAULT_CANDIDATES_LIMIT: usize = 5;

/// Caller-supplied app reference. Any combination of fields may be present.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AppReference {
    pub unified_app_id: Option<String>,
    /// iOS numeric id, Android package, or a unified id
    pub app_id: Option<String>,
    pub query: Option<String>,
    /// Requested namespace for the follow-up calls
    pub os: Option<AppOs>,
}

fn clean(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

impl AppReference {
    /// Trim fields and move an Android-package-shaped query into `app_id`.
    pub fn normalized(self) -> Self {
        let mut app_id = clean(self.app_id);
        let mut query = clean(self.query);
        if app_id.is_none() {
            if let Some(q) = query.as_deref() {
                if looks_like_android_package(q) {
                    app_id = query.take();
                }
            }
        }
        Self {
            unified_app_id: clean(self.unified_app_id),
            app_id,
            query,
            os: self.os,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.unified_app_id.is_none() && self.app_id.is_none() && self.query.is_none()
    }

    /// True when only a free-text query was given.
    pub fn is_query_only(&self) -> bool {
        self.query.is_some() && self.unified_app_id.is_none() && self.app_id.is_none()
    }
}

/// What the resolved identity will be used for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Purpose {
    /// Rich metadata lives under platform namespaces only
    Metadata,
    /// Sales may be queried in any namespace
    Sales,
}

/// Resolution mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolveMode {
    /// Produce exactly one app for the given purpose
    Single(Purpose),
    /// Only search and rank; no follow-up calls
    Candidates { limit: usize },
}

/// Turns an [`AppReference`] into a [`Resolution`].
#[derive(Clone)]
pub struct IdentifierResolver {
    api: Arc<dyn AppIntelApi>,
    thresholds: MatchThresholds,
    default_metadata_os: AppOs,
}

impl IdentifierResolver {
    pub fn new(
        api: Arc<dyn AppIntelApi>,
        thresholds: MatchThresholds,
        default_metadata_os: AppOs,
    ) -> Self {
        Self {
            api,
            thresholds,
            default_metadata_os,
        }
    }

    /// Resolve a reference.
    ///
    /// # Errors
    ///
    /// * `AmbiguousInput` when no identifier of any kind is present
    /// * `Validation` for a malformed unified id given alone, or a platform id
    ///   whose namespace cannot be inferred
    /// * `NoMatch` / `LowConfidenceMatch` from free-text resolution
    /// * `UnresolvablePlatformId` when sales were requested in a platform
    ///   namespace the unified id does not map to
    pub async fn resolve(
        &self,
        reference: AppReference,
        mode: ResolveMode,
    ) -> Result<Resolution, IntelError> {
        let mut reference = reference.normalized();
        if reference.is_empty() {
            return Err(IntelError::AmbiguousInput);
        }

        if let Some(unified) = reference.unified_app_id.as_deref() {
            if !is_unified_app_id(unified) {
                if reference.app_id.is_none() && reference.query.is_none() {
                    return Err(IntelError::validation(
                        "unified_app_id must be a 24-char hex string",
                    ));
                }
                warn!("Ignoring malformed unified_app_id: {}", unified);
                reference.unified_app_id = None;
            }
        }

        match mode {
            ResolveMode::Candidates { limit } => {
                let query = reference.query.as_deref().ok_or_else(|| {
                    IntelError::validation("candidate mode requires a free-text query")
                })?;
                let ranked = self.search_ranked(query).await?;
                Ok(Resolution::Candidates(to_ranked_candidates(
                    &ranked,
                    limit.clamp(1, SEARCH_RESULTS_LIMIT),
                )))
            }
            ResolveMode::Single(purpose) => self
                .resolve_single(reference, purpose)
                .await
                .map(Resolution::App),
        }
    }

    /// Resolve to one app; a shortcut for [`ResolveMode::Single`].
    pub async fn resolve_app(
        &self,
        reference: AppReference,
        purpose: Purpose,
    ) -> Result<ResolvedApp, IntelError> {
        match self.resolve(reference, ResolveMode::Single(purpose)).await? {
            Resolution::App(app) => Ok(app),
            Resolution::Candidates(_) => Err(IntelError::validation(
                "expected a single resolution, got candidates",
            )),
        }
    }

    async fn resolve_single(
        &self,
        reference: AppReference,
        purpose: Purpose,
    ) -> Result<ResolvedApp, IntelError> {
        let requested = reference.os;

        if let Some(app_id) = reference.app_id.as_deref() {
            if is_unified_app_id(app_id) {
                return self
                    .cascade(&app_id.to_ascii_lowercase(), requested, purpose, None, None)
                    .await;
            }
            let app_os = self.platform_namespace(app_id, requested, purpose)?;
            info!("Resolved platform id {} in {} namespace", app_id, app_os);
            return Ok(ResolvedApp {
                unified_app_id: None,
                app_id: app_id.to_string(),
                app_os,
                app_name: None,
                note: None,
            });
        }

        if let Some(unified) = reference.unified_app_id.as_deref() {
            return self
                .cascade(&unified.to_ascii_lowercase(), requested, purpose, None, None)
                .await;
        }

        let query = reference.query.as_deref().unwrap_or_default();
        let ranked = self.search_ranked(query).await?;
        let best = ranked.first().ok_or_else(|| IntelError::NoMatch {
            query: query.to_string(),
        })?;

        if best.score < self.thresholds.accept {
            return Err(IntelError::LowConfidenceMatch {
                query: query.to_string(),
                score: best.score,
                candidates: ranked
                    .iter()
                    .take(RUNNER_UP_NAMES)
                    .map(|entry| entry.label().to_string())
                    .collect(),
            });
        }

        let note = match best.candidate.name.as_deref() {
            Some(name) if best.score < self.thresholds.confident => {
                warn!(
                    "Query '{}' weakly matched '{}' (score {:.2})",
                    query, name, best.score
                );
                Some(format!(
                    "Query \"{}\" weakly matched \"{}\" (score {:.2}). Verify before relying on this result.",
                    query, name, best.score
                ))
            }
            _ => None,
        };
        info!(
            "Resolved query '{}' to unified app {} (score {:.2})",
            query, best.candidate.unified_app_id, best.score
        );

        self.cascade(
            &best.candidate.unified_app_id,
            requested,
            purpose,
            best.candidate.name.clone(),
            note,
        )
        .await
    }

    async fn search_ranked(&self, query: &str) -> Result<Vec<ScoredCandidate>, IntelError> {
        let results = self.api.search_apps(query, SEARCH_RESULTS_LIMIT).await?;
        if results.is_empty() {
            return Err(IntelError::NoMatch {
                query: query.to_string(),
            });
        }
        Ok(rank_candidates(query, results))
    }

    /// Namespace for an explicit platform id.
    fn platform_namespace(
        &self,
        app_id: &str,
        requested: Option<AppOs>,
        purpose: Purpose,
    ) -> Result<AppOs, IntelError> {
        let inferred = infer_os_from_app_id(app_id);
        let chosen = match purpose {
            Purpose::Metadata => requested
                .filter(AppOs::is_platform)
                .or_else(|| Some(self.default_metadata_os).filter(AppOs::is_platform))
                .or(inferred),
            Purpose::Sales => requested.or(inferred),
        };
        chosen.ok_or_else(|| {
            IntelError::validation(format!(
                "cannot infer the platform of app_id '{}'; specify os as ios or android",
                app_id
            ))
        })
    }

    /// Map a unified id to the id and namespace the follow-up calls should use.
    async fn cascade(
        &self,
        unified_app_id: &str,
        requested: Option<AppOs>,
        purpose: Purpose,
        app_name: Option<String>,
        note: Option<String>,
    ) -> Result<ResolvedApp, IntelError> {
        let requested_platform = requested.filter(AppOs::is_platform);

        if purpose == Purpose::Sales {
            let Some(os) = requested_platform else {
                return Ok(ResolvedApp {
                    unified_app_id: Some(unified_app_id.to_string()),
                    app_id: unified_app_id.to_string(),
                    app_os: AppOs::Unified,
                    app_name,
                    note,
                });
            };
            let ids = self.api.resolve_platform_ids(unified_app_id).await?;
            let app_id = ids
                .for_os(os)
                .ok_or_else(|| IntelError::UnresolvablePlatformId {
                    unified_app_id: unified_app_id.to_string(),
                    os: os.to_string(),
                })?;
            return Ok(ResolvedApp {
                unified_app_id: Some(unified_app_id.to_string()),
                app_id: app_id.to_string(),
                app_os: os,
                app_name,
                note,
            });
        }

        let ids = self.api.resolve_platform_ids(unified_app_id).await?;
        let preference = [requested_platform, Some(AppOs::Ios), Some(AppOs::Android)];
        let mapped = preference
            .into_iter()
            .flatten()
            .find_map(|os| ids.for_os(os).map(|id| (os, id.to_string())));

        let (app_os, app_id, note) = match mapped {
            Some((os, id)) => (os, id, note),
            None => {
                let os = if requested_platform == Some(AppOs::Android) {
                    AppOs::Android
                } else {
                    AppOs::Ios
                };
                warn!(
                    "No platform id mapped for unified app {}, using it under {}",
                    unified_app_id, os
                );
                let fallback = format!(
                    "No {} or android id mapped for unified app {}; metadata was requested with the unified id under {} (best effort).",
                    AppOs::Ios, unified_app_id, os
                );
                let note = match note {
                    Some(existing) => Some(format!("{} {}", existing, fallback)),
                    None => Some(fallback),
                };
                (os, unified_app_id.to_string(), note)
            }
        };

        info!(
            "Cascaded unified app {} to {} id {}",
            unified_app_id, app_os, app_id
        );
        Ok(ResolvedApp {
            unified_app_id: Some(unified_app_id.to_string()),
            app_id,
            app_os,
            app_name,
            note,
        })
    }
}
