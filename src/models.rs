//! Data models for the regression-test survey.
//!
//! This module contains the core data structures shared by the catalog
//! loader, the report parser, the aggregator and the survey generator.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};

/// Tolerance used when a `TEST_FILES` record does not name one.
pub const DEFAULT_TOLERANCE: f64 = 1.0e-14;

/// Floor applied to the dispersion before computing the Tol./MAD ratio.
pub const DISPERSION_FLOOR: f64 = 1.0e-14;

/// Catalog definition of a single test case.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestDef {
    /// Numeric-type code; 0 means existence check only.
    pub test_type: u32,
    /// Build flags required by the test directory.
    pub flags: Vec<String>,
    /// Maximum accepted relative deviation.
    pub tolerance: f64,
    /// Fixed reference value, kept as text. Empty when absent.
    pub ref_value: String,
}

impl TestDef {
    pub fn is_numeric(&self) -> bool {
        self.test_type != 0
    }

    pub fn has_reference(&self) -> bool {
        !self.ref_value.is_empty()
    }
}

/// A value observed by one tester, with the text it was printed as.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObservedValue {
    /// Original token from the report, preserving its printed precision.
    pub text: String,
    /// Parsed value.
    pub value: f64,
}

impl ObservedValue {
    /// Parse a report token. Returns `None` unless the token is a finite float.
    pub fn parse(text: &str) -> Option<Self> {
        let value: f64 = text.parse().ok()?;
        if !value.is_finite() {
            return None;
        }
        Some(Self {
            text: text.to_string(),
            value,
        })
    }
}

/// Observations of one tester, keyed by test-case identifier.
pub type TesterObservation = BTreeMap<String, ObservedValue>;

/// Ordered mapping from tester key to column index.
///
/// Column order is tester priority order and is shared by every row.
#[derive(Debug, Clone, Default)]
pub struct TesterColumns {
    keys: Vec<String>,
    index: HashMap<String, usize>,
}

impl TesterColumns {
    /// Append a tester and return its column. Re-adding a key returns the
    /// existing column.
    pub fn push(&mut self, key: &str) -> usize {
        if let Some(&column) = self.index.get(key) {
            return column;
        }
        let column = self.keys.len();
        self.keys.push(key.to_string());
        self.index.insert(key.to_string(), column);
        column
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (usize, &str)> {
        self.keys.iter().enumerate().map(|(i, k)| (i, k.as_str()))
    }
}

/// Observations of all accepted testers, stored by column.
#[derive(Debug, Clone, Default)]
pub struct ObservationSet {
    columns: TesterColumns,
    by_column: Vec<TesterObservation>,
}

impl ObservationSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a tester's observations in the next free column.
    pub fn insert(&mut self, key: &str, observation: TesterObservation) -> usize {
        let column = self.columns.push(key);
        if column == self.by_column.len() {
            self.by_column.push(observation);
        } else {
            self.by_column[column] = observation;
        }
        column
    }

    pub fn columns(&self) -> &TesterColumns {
        &self.columns
    }

    /// Values reported for `name`, in column order.
    pub fn values_for(&self, name: &str) -> Vec<(usize, &ObservedValue)> {
        self.by_column
            .iter()
            .enumerate()
            .filter_map(|(column, obs)| obs.get(name).map(|v| (column, v)))
            .collect()
    }

    /// Every test-case identifier reported by at least one tester.
    pub fn reported_names(&self) -> BTreeSet<String> {
        self.by_column
            .iter()
            .flat_map(|obs| obs.keys().cloned())
            .collect()
    }
}

/// One tester's contribution to an aggregate row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RowCell {
    pub text: String,
    pub value: f64,
    /// Relative deviation from the consensus.
    pub deviation: f64,
    pub outlier: bool,
}

/// Aggregated result for one test case.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregateRow {
    pub name: String,
    pub test_type: u32,
    pub tolerance: f64,
    pub ref_value: String,
    /// One entry per tester column; `None` when the tester has no value.
    pub cells: Vec<Option<RowCell>>,
    /// Reported value selected as representative.
    pub consensus: f64,
    /// Printed form of the consensus, as reported by its tester.
    pub consensus_text: String,
    /// Column that supplied the consensus.
    pub consensus_column: usize,
    /// Maximum relative deviation across contributing testers.
    pub dispersion: f64,
    /// True iff any tester is an outlier.
    pub outlier: bool,
}

impl AggregateRow {
    pub fn outlier_count(&self) -> usize {
        self.cells.iter().flatten().filter(|c| c.outlier).count()
    }

    /// Tolerance over dispersion. Display only; it never drives the flags.
    pub fn tolerance_ratio(&self) -> f64 {
        self.tolerance / self.dispersion.max(DISPERSION_FLOOR)
    }
}

/// Failure and skip counts of one tester across all rows.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TesterSummary {
    pub key: String,
    pub name: String,
    pub failed: usize,
    pub skipped: usize,
}

/// Catalog-wide counts shown above the survey table.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogFacts {
    pub total: usize,
    pub require_flags: usize,
    pub numeric: usize,
    pub with_reference: usize,
    /// `(k, n)`: `n` numeric tests have tolerance <= 10^-k.
    pub tolerance_buckets: Vec<(u32, usize)>,
}

impl CatalogFacts {
    /// Percentage of the catalog; 0 for an empty catalog.
    pub fn percent(&self, n: usize) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            n as f64 / (0.01 * self.total as f64)
        }
    }
}

/// Metadata about the generated survey.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SurveyMetadata {
    pub title: String,
    pub generated_at: DateTime<Utc>,
    pub tool_version: String,
}

/// The complete survey handed to the generator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Survey {
    pub metadata: SurveyMetadata,
    pub facts: CatalogFacts,
    pub testers: Vec<TesterSummary>,
    pub rows: Vec<AggregateRow>,
    /// Type taxonomy titles, indexed by type code.
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub test_types: Vec<String>,
}

impl Survey {
    pub fn flagged_rows(&self) -> usize {
        self.rows.iter().filter(|r| r.outlier).count()
    }

    /// Display title of a type code, empty if unknown.
    pub fn type_title(&self, code: u32) -> &str {
        self.test_types
            .get(code as usize)
            .map(String::as_str)
            .unwrap_or("")
    }
}
