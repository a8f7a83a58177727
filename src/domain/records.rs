//! Alias-table readers for the provider's loosely-versioned record shapes.
//!
//! The same logical field arrives under different keys depending on endpoint
//! and account (verbose `unified_units` vs compact `u`, `$id` vs `app_id`).
//! Every logical field is described by an ordered alias list in [`aliases`];
//! readers try each key in priority order and take the first usable value.

use chrono::{DateTime, NaiveDate};
use serde_json::Value;

/// A single JSON object as returned by the provider.
pub type JsonRecord = serde_json::Map<String, Value>;

/// Accepted key spellings per logical field, highest priority first.
pub mod aliases {
    pub const ENTITY_ID: &[&str] = &["$id", "unified_app_id", "app_id", "id"];
    pub const SEARCH_NAME: &[&str] = &["name", "title", "app_name"];

    pub const DETAILS_NAME: &[&str] = &["name", "app_name", "title"];
    pub const DETAILS_UNIFIED_ID: &[&str] = &["$id", "unified_app_id", "unified_id"];
    pub const SUBTITLE: &[&str] = &["subtitle", "short_description"];
    pub const DESCRIPTION: &[&str] = &["description"];
    pub const RELEASE_DATE: &[&str] = &[
        "release_date",
        "released",
        "initial_release_date",
        "launch_date",
    ];

    pub const LANGUAGE_LISTS: &[&str] = &[
        "languages",
        "language_codes",
        "supported_languages",
        "locales",
        "locale_codes",
        "translation_languages",
    ];
    pub const LANGUAGE_ENTRY: &[&str] = &["language", "language_code", "code", "locale", "name"];

    pub const NESTED_IOS_APPS: &str = "itunes_apps";
    pub const NESTED_IOS_ID: &[&str] = &["app_id", "itunes_id", "ios_app_id", "ios_id"];
    pub const FLAT_IOS_ID: &[&str] = &["itunes_id", "ios_app_id", "ios_id", "app_id_ios"];

    pub const NESTED_ANDROID_APPS: &str = "android_apps";
    pub const NESTED_ANDROID_ID: &[&str] =
        &["app_id", "android_id", "android_app_id", "android_package"];
    pub const FLAT_ANDROID_ID: &[&str] = &[
        "android_id",
        "android_app_id",
        "android_package",
        "app_id_android",
        "google_play_id",
    ];

    pub const SALES_DATE: &[&str] = &["date", "month", "period", "d"];
    pub const SALES_COUNTRY: &[&str] = &["country", "country_code", "c"];
    pub const SALES_DOWNLOADS: &[&str] = &["unified_units", "units", "downloads", "u"];
    pub const SALES_REVENUE: &[&str] = &["unified_revenue", "revenue", "r"];

    /// Wrapper keys a list payload may be nested under.
    pub const LIST_WRAPPERS: &[&str] = &["data", "results", "items", "apps"];
}

/// Pseudo-country codes that denote a worldwide rollup row.
const AGGREGATE_COUNTRIES: &[&str] = &["WW", "WORLDWIDE", "ALL"];

/// Epoch values above this are treated as milliseconds.
const EPOCH_MILLIS_THRESHOLD: f64 = 1e11;

/// First non-empty trimmed string under any of `keys`.
pub fn read_string(record: &JsonRecord, keys: &[&str]) -> Option<String> {
    keys.iter().find_map(|key| match record.get(*key) {
        Some(Value::String(s)) => {
            let trimmed = s.trim();
            (!trimmed.is_empty()).then(|| trimmed.to_string())
        }
        _ => None,
    })
}

/// First finite number under any of `keys`; numeric strings are accepted.
pub fn read_number(record: &JsonRecord, keys: &[&str]) -> Option<f64> {
    keys.iter().find_map(|key| match record.get(*key) {
        Some(Value::Number(n)) => n.as_f64().filter(|v| v.is_finite()),
        Some(Value::String(s)) => s.trim().parse::<f64>().ok().filter(|v| v.is_finite()),
        _ => None,
    })
}

/// Like [`read_string`], but integral numbers are coerced to their string form.
///
/// iOS store ids are frequently serialized as JSON numbers.
pub fn read_identifier(record: &JsonRecord, keys: &[&str]) -> Option<String> {
    keys.iter().find_map(|key| match record.get(*key) {
        Some(Value::String(s)) => {
            let trimmed = s.trim();
            (!trimmed.is_empty()).then(|| trimmed.to_string())
        }
        Some(Value::Number(n)) => {
            if let Some(v) = n.as_u64() {
                Some(v.to_string())
            } else if let Some(v) = n.as_i64() {
                Some(v.to_string())
            } else {
                n.as_f64()
                    .filter(|v| v.is_finite() && v.fract() == 0.0 && *v >= 0.0)
                    .map(|v| format!("{:.0}", v))
            }
        }
        _ => None,
    })
}

/// First element of an array field, if it is an object.
pub fn first_nested_record<'a>(record: &'a JsonRecord, key: &str) -> Option<&'a JsonRecord> {
    record
        .get(key)
        .and_then(Value::as_array)
        .and_then(|items| items.first())
        .and_then(Value::as_object)
}

/// Normalize an upstream payload into a list of records.
///
/// Accepts a raw array, an object wrapping an array under one of
/// [`aliases::LIST_WRAPPERS`], or a single bare object. Anything else is empty.
pub fn records_from_payload(payload: Value) -> Vec<JsonRecord> {
    fn objects(items: Vec<Value>) -> Vec<JsonRecord> {
        items
            .into_iter()
            .filter_map(|item| match item {
                Value::Object(map) => Some(map),
                _ => None,
            })
            .collect()
    }

    match payload {
        Value::Array(items) => objects(items),
        Value::Object(mut map) => {
            for key in aliases::LIST_WRAPPERS {
                if matches!(map.get(*key), Some(Value::Array(_))) {
                    if let Some(Value::Array(items)) = map.remove(*key) {
                        return objects(items);
                    }
                }
            }
            vec![map]
        }
        _ => Vec::new(),
    }
}

/// Returns true for the worldwide pseudo-country codes.
pub fn is_aggregate_country(country: Option<&str>) -> bool {
    match country {
        Some(code) => {
            let normalized = code.trim().to_ascii_uppercase();
            AGGREGATE_COUNTRIES.contains(&normalized.as_str())
        }
        None => false,
    }
}

/// One reporting-period row of the sales endpoint, dialect-independent.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SalesRow {
    pub date: Option<String>,
    pub country: Option<String>,
    pub downloads: Option<f64>,
    pub revenue: Option<f64>,
}

impl SalesRow {
    pub fn from_record(record: &JsonRecord) -> Self {
        Self {
            date: read_string(record, aliases::SALES_DATE),
            country: read_string(record, aliases::SALES_COUNTRY),
            downloads: read_number(record, aliases::SALES_DOWNLOADS),
            revenue: read_number(record, aliases::SALES_REVENUE),
        }
    }

    pub fn parse_all(records: &[JsonRecord]) -> Vec<SalesRow> {
        records.iter().map(SalesRow::from_record).collect()
    }

    pub fn is_aggregate(&self) -> bool {
        is_aggregate_country(self.country.as_deref())
    }
}

fn normalize_language_list(value: &Value) -> Vec<String> {
    let raw: Vec<String> = match value {
        Value::Array(entries) => entries
            .iter()
            .filter_map(|entry| match entry {
                Value::String(s) => Some(s.trim().to_string()),
                Value::Object(map) => read_string(map, aliases::LANGUAGE_ENTRY),
                _ => None,
            })
            .collect(),
        Value::String(s) => s
            .split(|c: char| c == ',' || c.is_whitespace())
            .map(|part| part.trim().to_string())
            .collect(),
        Value::Object(map) => map.keys().map(|key| key.trim().to_string()).collect(),
        _ => Vec::new(),
    };
    dedupe_non_empty(raw)
}

/// Remove empty entries and duplicates, keeping first-seen order.
pub fn dedupe_non_empty(values: Vec<String>) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();
    values
        .into_iter()
        .filter(|v| !v.is_empty() && seen.insert(v.clone()))
        .collect()
}

/// Supported languages from the first non-empty language field of a details record.
pub fn extract_languages(details: &JsonRecord) -> Vec<String> {
    aliases::LANGUAGE_LISTS
        .iter()
        .filter_map(|key| details.get(*key))
        .map(normalize_language_list)
        .find(|languages| !languages.is_empty())
        .unwrap_or_default()
}

fn date_from_epoch(value: f64) -> Option<NaiveDate> {
    if !value.is_finite() || value < 0.0 {
        return None;
    }
    let seconds = if value > EPOCH_MILLIS_THRESHOLD {
        value / 1000.0
    } else {
        value
    };
    DateTime::from_timestamp(seconds.floor() as i64, 0).map(|dt| dt.date_naive())
}

fn date_from_text(text: &str) -> Option<NaiveDate> {
    let trimmed = text.trim();
    if let Ok(numeric) = trimmed.parse::<f64>() {
        return date_from_epoch(numeric);
    }
    trimmed
        .get(..10)
        .and_then(|prefix| NaiveDate::parse_from_str(prefix, "%Y-%m-%d").ok())
}

/// Release date of a details record: a date string, epoch seconds, or epoch milliseconds.
pub fn read_release_date(details: &JsonRecord) -> Option<NaiveDate> {
    aliases::RELEASE_DATE
        .iter()
        .find_map(|key| match details.get(*key) {
            Some(Value::Number(n)) => n.as_f64().and_then(date_from_epoch),
            Some(Value::String(s)) => date_from_text(s),
            _ => None,
        })
}
