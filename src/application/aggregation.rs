//! Sales row aggregation: totals, top countries, and revenue per download.

use crate::domain::{OverallMetrics, SalesRow, TopCountry};
use chrono::NaiveDate;
use std::collections::HashMap;

/// Upper bound on the top-countries breakdown.
pub const MAX_TOP_COUNTRIES: usize = 25;

/// Scalar totals and the per-country breakdown of one row set.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RowTotals {
    pub downloads: Option<f64>,
    pub revenue: Option<f64>,
    pub top_countries: Vec<TopCountry>,
}

/// Running sum over the rows seen.
///
/// Missing or non-finite values add zero. `None` only when there were no rows.
pub fn sum_rows<'a, I, F>(rows: I, field: F) -> Option<f64>
where
    I: IntoIterator<Item = &'a SalesRow>,
    F: Fn(&SalesRow) -> Option<f64>,
{
    let mut seen = false;
    let mut total = 0.0;
    for row in rows {
        seen = true;
        if let Some(value) = field(row).filter(|v| v.is_finite()) {
            total += value;
        }
    }
    seen.then_some(total)
}

#[derive(Default)]
struct CountryAccumulator {
    downloads: f64,
    revenue: f64,
    has_downloads: bool,
    has_revenue: bool,
}

/// Per-country totals sorted by downloads, descending.
///
/// Aggregate pseudo-countries and rows without a country are skipped; a
/// country needs at least one numeric downloads value to appear. Ties keep
/// first-seen order. `limit` is clamped to `[1, 25]`.
pub fn top_countries(rows: &[SalesRow], limit: usize) -> Vec<TopCountry> {
    let mut order: Vec<String> = Vec::new();
    let mut by_country: HashMap<String, CountryAccumulator> = HashMap::new();

    for row in rows {
        let Some(country) = row
            .country
            .as_deref()
            .map(|c| c.trim().to_ascii_uppercase())
            .filter(|c| !c.is_empty())
        else {
            continue;
        };
        if row.is_aggregate() {
            continue;
        }
        let entry = by_country.entry(country.clone()).or_insert_with(|| {
            order.push(country);
            CountryAccumulator::default()
        });
        if let Some(downloads) = row.downloads.filter(|v| v.is_finite()) {
            entry.downloads += downloads;
            entry.has_downloads = true;
        }
        if let Some(revenue) = row.revenue.filter(|v| v.is_finite()) {
            entry.revenue += revenue;
            entry.has_revenue = true;
        }
    }

    let mut countries: Vec<TopCountry> = order
        .into_iter()
        .filter_map(|country| {
            let acc = by_country.remove(&country)?;
            acc.has_downloads.then(|| TopCountry {
                country,
                downloads_estimate: acc.downloads,
                revenue_estimate: acc.has_revenue.then_some(acc.revenue),
            })
        })
        .collect();
    countries.sort_by(|a, b| b.downloads_estimate.total_cmp(&a.downloads_estimate));
    countries.truncate(limit.clamp(1, MAX_TOP_COUNTRIES));
    countries
}

/// Totals for a row set, never double-counting worldwide rows.
///
/// Real-country rows are summed when present. When only aggregate rows
/// exist they provide the scalar totals and no breakdown is produced.
pub fn summarize_rows(rows: &[SalesRow], top_limit: usize) -> RowTotals {
    let countries: Vec<SalesRow> = rows.iter().filter(|r| !r.is_aggregate()).cloned().collect();
    if !countries.is_empty() {
        return RowTotals {
            downloads: sum_rows(&countries, |r| r.downloads),
            revenue: sum_rows(&countries, |r| r.revenue),
            top_countries: top_countries(&countries, top_limit),
        };
    }
    RowTotals {
        downloads: sum_rows(rows, |r| r.downloads),
        revenue: sum_rows(rows, |r| r.revenue),
        top_countries: Vec::new(),
    }
}

/// Revenue per download; `None` unless downloads are positive.
pub fn revenue_per_download(revenue: Option<f64>, downloads: Option<f64>) -> Option<f64> {
    match (revenue, downloads) {
        (Some(revenue), Some(downloads)) if downloads > 0.0 => Some(revenue / downloads),
        _ => None,
    }
}

/// All-time metrics for the window `[start_date, end_date]`.
pub fn overall_metrics(rows: &[SalesRow], start_date: NaiveDate, end_date: NaiveDate) -> OverallMetrics {
    let totals = summarize_rows(rows, MAX_TOP_COUNTRIES);
    OverallMetrics {
        start_date,
        end_date,
        downloads_estimate: totals.downloads,
        revenue_estimate: totals.revenue,
        rdp: revenue_per_download(totals.revenue, totals.downloads),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(country: &str, downloads: Option<f64>, revenue: Option<f64>) -> SalesRow {
        SalesRow {
            date: Some("2026-02-01".to_string()),
            country: Some(country.to_string()),
            downloads,
            revenue,
        }
    }

    #[test]
    fn test_worldwide_row_not_double_counted() {
        let rows = vec![
            row("WW", Some(1800.0), None),
            row("US", Some(1000.0), None),
            row("CA", Some(800.0), None),
        ];
        let totals = summarize_rows(&rows, 10);
        assert_eq!(totals.downloads, Some(1800.0));
        assert_eq!(
            totals
                .top_countries
                .iter()
                .map(|c| (c.country.as_str(), c.downloads_estimate))
                .collect::<Vec<_>>(),
            vec![("US", 1000.0), ("CA", 800.0)]
        );
        assert!(totals.top_countries.iter().all(|c| c.revenue_estimate.is_none()));
    }

    #[test]
    fn test_aggregate_only_rows_fill_totals_without_breakdown() {
        let rows = vec![row("WW", Some(500.0), Some(25.0))];
        let totals = summarize_rows(&rows, 10);
        assert_eq!(totals.downloads, Some(500.0));
        assert_eq!(totals.revenue, Some(25.0));
        assert!(totals.top_countries.is_empty());
    }

    #[test]
    fn test_empty_rows_are_none() {
        assert_eq!(summarize_rows(&[], 10), RowTotals::default());
    }

    #[test]
    fn test_rows_without_numbers_sum_to_zero() {
        let rows = vec![row("US", None, None), row("DE", Some(f64::NAN), None)];
        let totals = summarize_rows(&rows, 10);
        assert_eq!(totals.downloads, Some(0.0));
        assert_eq!(totals.revenue, Some(0.0));
        assert!(totals.top_countries.is_empty());
    }

    #[test]
    fn test_top_countries_merge_sort_and_clamp() {
        let rows = vec![
            row("us", Some(100.0), Some(10.0)),
            row("GB", Some(300.0), None),
            row("US", Some(250.0), Some(5.0)),
            row("FR", Some(300.0), Some(1.0)),
            row("JP", None, Some(99.0)),
        ];
        let top = top_countries(&rows, 10);
        assert_eq!(
            top,
            vec![
                TopCountry {
                    country: "US".to_string(),
                    downloads_estimate: 350.0,
                    revenue_estimate: Some(15.0)
                },
                TopCountry {
                    country: "GB".to_string(),
                    downloads_estimate: 300.0,
                    revenue_estimate: None
                },
                TopCountry {
                    country: "FR".to_string(),
                    downloads_estimate: 300.0,
                    revenue_estimate: Some(1.0)
                },
            ]
        );
        assert_eq!(top_countries(&rows, 0).len(), 1);
        assert_eq!(top_countries(&rows, 2).len(), 2);
    }

    #[test]
    fn test_rdp() {
        assert_eq!(revenue_per_download(Some(50.0), Some(100.0)), Some(0.5));
        assert_eq!(revenue_per_download(Some(50.0), Some(0.0)), None);
        assert_eq!(revenue_per_download(None, Some(10.0)), None);
    }

    #[test]
    fn test_overall_metrics_window() {
        let start = NaiveDate::from_ymd_opt(2016, 3, 15).unwrap();
        let end = NaiveDate::from_ymd_opt(2026, 10, 18).unwrap();
        let overall = overall_metrics(&[row("WW", Some(2000.0), Some(500.0))], start, end);
        assert_eq!(overall.start_date, start);
        assert_eq!(overall.downloads_estimate, Some(2000.0));
        assert_eq!(overall.rdp, Some(0.25));
    }
}
