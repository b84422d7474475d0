//! Cross-tester aggregation and statistics.
//!
//! For every test case reported by at least one tester, this module picks a
//! consensus value, measures how far each tester strays from it, and flags
//! the testers that exceed the test's tolerance.

use crate::catalog::TestCatalog;
use crate::models::{
    AggregateRow, ObservationSet, ObservedValue, RowCell, TestDef, TesterColumns, TesterSummary,
};
use std::collections::{BTreeSet, HashMap};
use tracing::debug;

/// Interpolated median: the mean of the two middle values for even counts.
pub fn interpolated_median(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }

    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);

    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        Some((sorted[mid - 1] + sorted[mid]) / 2.0)
    } else {
        Some(sorted[mid])
    }
}

/// Index of the reported value closest to the interpolated median.
///
/// Ties resolve to the earliest index, i.e. the higher-priority tester.
pub fn select_consensus(values: &[f64]) -> Option<usize> {
    let median = interpolated_median(values)?;

    let mut best = 0;
    let mut best_distance = (values[0] - median).abs();
    for (i, value) in values.iter().enumerate().skip(1) {
        let distance = (value - median).abs();
        if distance < best_distance {
            best = i;
            best_distance = distance;
        }
    }

    Some(best)
}

/// Relative deviation of `value` from `consensus`.
///
/// A zero consensus normalises by 1 so exact-zero answers stay well defined.
pub fn relative_deviation(value: f64, consensus: f64) -> f64 {
    let norm = if consensus == 0.0 { 1.0 } else { consensus };
    ((value - consensus) / norm).abs()
}

/// Aggregate one test case.
///
/// `values` are `(column, value)` pairs in column order. Returns `None` when
/// nobody reported the test.
pub fn aggregate_case(
    name: &str,
    def: &TestDef,
    column_count: usize,
    values: &[(usize, &ObservedValue)],
) -> Option<AggregateRow> {
    let numbers: Vec<f64> = values.iter().map(|(_, v)| v.value).collect();
    let consensus_idx = select_consensus(&numbers)?;
    let (consensus_column, consensus_value) = values[consensus_idx];
    let consensus = consensus_value.value;

    let mut cells: Vec<Option<RowCell>> = vec![None; column_count];
    let mut dispersion = 0.0_f64;
    let mut outlier = false;

    for (column, observed) in values {
        let deviation = relative_deviation(observed.value, consensus);
        let is_outlier = deviation > def.tolerance;

        dispersion = dispersion.max(deviation);
        outlier |= is_outlier;

        if let Some(slot) = cells.get_mut(*column) {
            *slot = Some(RowCell {
                text: observed.text.clone(),
                value: observed.value,
                deviation,
                outlier: is_outlier,
            });
        }
    }

    Some(AggregateRow {
        name: name.to_string(),
        test_type: def.test_type,
        tolerance: def.tolerance,
        ref_value: def.ref_value.clone(),
        cells,
        consensus,
        consensus_text: consensus_value.text.clone(),
        consensus_column,
        dispersion,
        outlier,
    })
}

/// Test cases present both in the catalog and in some tester's report.
///
/// Reported names unknown to the catalog (e.g. removed tests) are dropped.
pub fn surveyed_names(catalog: &TestCatalog, observations: &ObservationSet) -> BTreeSet<String> {
    let reported = observations.reported_names();
    let total = reported.len();

    let names: BTreeSet<String> = reported
        .into_iter()
        .filter(|name| catalog.get(name).is_some())
        .collect();

    if names.len() < total {
        debug!(
            "Dropped {} reported tests unknown to the catalog",
            total - names.len()
        );
    }

    names
}

/// Aggregate every surveyed test case, sorted by identifier.
pub fn aggregate_all(catalog: &TestCatalog, observations: &ObservationSet) -> Vec<AggregateRow> {
    let column_count = observations.columns().len();

    surveyed_names(catalog, observations)
        .into_iter()
        .filter_map(|name| {
            let def = catalog.get(&name)?;
            let values = observations.values_for(&name);
            aggregate_case(&name, def, column_count, &values)
        })
        .collect()
}

/// Count failures and skips per tester column.
///
/// `names` maps tester keys to display names; keys without an entry are
/// shown as-is.
pub fn summarize_testers(
    rows: &[AggregateRow],
    columns: &TesterColumns,
    names: &HashMap<String, String>,
) -> Vec<TesterSummary> {
    columns
        .iter()
        .map(|(column, key)| {
            let mut failed = 0;
            let mut skipped = 0;
            for row in rows {
                match row.cells.get(column).and_then(Option::as_ref) {
                    Some(cell) if cell.outlier => failed += 1,
                    Some(_) => {}
                    None => skipped += 1,
                }
            }

            TesterSummary {
                key: key.to_string(),
                name: names.get(key).cloned().unwrap_or_else(|| key.to_string()),
                failed,
                skipped,
            }
        })
        .collect()
}

/// Rows sorted by dispersion relative to tolerance, worst first.
pub fn most_divergent(rows: &[AggregateRow], n: usize) -> Vec<&AggregateRow> {
    let mut sorted: Vec<&AggregateRow> = rows.iter().filter(|r| r.outlier).collect();
    sorted.sort_by(|a, b| a.tolerance_ratio().total_cmp(&b.tolerance_ratio()));
    sorted.truncate(n);
    sorted
}
