//! Fuzzy app-name matching used to pick a search result for a free-text query.

use crate::domain::{RankedCandidate, SearchCandidate};
use std::collections::HashSet;

/// Default minimum score for a match to be accepted at all.
pub const DEFAULT_ACCEPT_THRESHOLD: f64 = 0.55;
/// Default score at or above which a match needs no warning.
pub const DEFAULT_CONFIDENT_THRESHOLD: f64 = 0.75;

/// How many runner-up names a rejection error carries.
pub const RUNNER_UP_NAMES: usize = 5;

/// Acceptance boundaries for name matches.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MatchThresholds {
    pub accept: f64,
    pub confident: f64,
}

impl MatchThresholds {
    /// Both values are clamped to `[0, 1]` and `confident` is never below `accept`.
    pub fn new(accept: f64, confident: f64) -> Self {
        let accept = if accept.is_finite() {
            accept.clamp(0.0, 1.0)
        } else {
            DEFAULT_ACCEPT_THRESHOLD
        };
        let confident = if confident.is_finite() {
            confident.clamp(accept, 1.0)
        } else {
            DEFAULT_CONFIDENT_THRESHOLD.max(accept)
        };
        Self { accept, confident }
    }
}

impl Default for MatchThresholds {
    fn default() -> Self {
        Self {
            accept: DEFAULT_ACCEPT_THRESHOLD,
            confident: DEFAULT_CONFIDENT_THRESHOLD,
        }
    }
}

/// Lowercase and strip everything but ASCII letters and digits.
pub fn normalize_compact(value: &str) -> String {
    value
        .chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .map(|c| c.to_ascii_lowercase())
        .collect()
}

/// Lowercase tokens split on non-alphanumeric boundaries.
pub fn normalize_tokens(value: &str) -> Vec<String> {
    value
        .to_ascii_lowercase()
        .split(|c: char| !c.is_ascii_alphanumeric())
        .filter(|token| !token.is_empty())
        .map(str::to_string)
        .collect()
}

/// Score how well `candidate_name` matches `query`, in `[0, 1]`.
///
/// * exact match after compaction scores 1.0
/// * a compacted prefix relation scores `0.82 + 0.15 * shorter/longer`, capped at 0.97
/// * otherwise `0.6 * recall + 0.3 * precision + 0.1 * jaccard` over token sets
pub fn score_name_match(query: &str, candidate_name: &str) -> f64 {
    let query_compact = normalize_compact(query);
    let candidate_compact = normalize_compact(candidate_name);
    if query_compact.is_empty() || candidate_compact.is_empty() {
        return 0.0;
    }
    if query_compact == candidate_compact {
        return 1.0;
    }

    if candidate_compact.starts_with(&query_compact) || query_compact.starts_with(&candidate_compact)
    {
        let shorter = query_compact.len().min(candidate_compact.len()) as f64;
        let longer = query_compact.len().max(candidate_compact.len()) as f64;
        return (0.82 + (shorter / longer) * 0.15).min(0.97);
    }

    let query_tokens: HashSet<String> = normalize_tokens(query).into_iter().collect();
    let candidate_tokens: HashSet<String> = normalize_tokens(candidate_name).into_iter().collect();
    if query_tokens.is_empty() || candidate_tokens.is_empty() {
        return 0.0;
    }

    let overlap = query_tokens.intersection(&candidate_tokens).count() as f64;
    if overlap == 0.0 {
        return 0.0;
    }

    let recall = overlap / query_tokens.len() as f64;
    let precision = overlap / candidate_tokens.len() as f64;
    let union = query_tokens.len() as f64 + candidate_tokens.len() as f64 - overlap;
    let jaccard = if union > 0.0 { overlap / union } else { 0.0 };
    recall * 0.6 + precision * 0.3 + jaccard * 0.1
}

/// A search result paired with its score.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredCandidate {
    pub candidate: SearchCandidate,
    pub score: f64,
}

impl ScoredCandidate {
    /// Display name, falling back to the unified id.
    pub fn label(&self) -> &str {
        self.candidate
            .name
            .as_deref()
            .unwrap_or(&self.candidate.unified_app_id)
    }
}

/// Score every candidate against `query` and sort descending (stable for ties).
///
/// Candidates without a name score 0.
pub fn rank_candidates(query: &str, candidates: Vec<SearchCandidate>) -> Vec<ScoredCandidate> {
    let mut scored: Vec<ScoredCandidate> = candidates
        .into_iter()
        .map(|candidate| {
            let score = candidate
                .name
                .as_deref()
                .map(str::trim)
                .filter(|name| !name.is_empty())
                .map(|name| score_name_match(query, name))
                .unwrap_or(0.0);
            ScoredCandidate { candidate, score }
        })
        .collect();
    scored.sort_by(|a, b| b.score.total_cmp(&a.score));
    scored
}

fn round_score(score: f64) -> f64 {
    (score * 10_000.0).round() / 10_000.0
}

/// Top `limit` ranked entries for candidate mode, with scores rounded to four decimals.
pub fn to_ranked_candidates(scored: &[ScoredCandidate], limit: usize) -> Vec<RankedCandidate> {
    scored
        .iter()
        .take(limit)
        .enumerate()
        .map(|(index, entry)| RankedCandidate {
            rank: index + 1,
            unified_app_id: entry.candidate.unified_app_id.clone(),
            name: entry.candidate.name.clone(),
            score: round_score(entry.score),
        })
        .collect()
}
