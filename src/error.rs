//! Domain errors.
//!
//! These are the failures that mean the input pipeline itself is broken.
//! Everything recoverable (a tester that cannot be fetched, a log line that
//! does not parse) is logged and skipped instead of surfacing here.

use std::path::PathBuf;
use thiserror::Error;

/// Errors raised while loading the test catalog.
#[derive(Error, Debug)]
pub enum CatalogError {
    #[error("Failed to read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Found strange line in {}:{line}: expected 2 to 4 fields, got {fields}", path.display())]
    FieldCount {
        path: PathBuf,
        line: usize,
        fields: usize,
    },

    #[error("Invalid test type '{value}' in {}:{line}", path.display())]
    TestType {
        path: PathBuf,
        line: usize,
        value: String,
    },

    #[error("Invalid tolerance '{value}' in {}:{line}", path.display())]
    Tolerance {
        path: PathBuf,
        line: usize,
        value: String,
    },

    #[error("Invalid type count '{value}' in {}", path.display())]
    TypeCount { path: PathBuf, value: String },
}

/// Errors raised while parsing a tester report.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum ReportError {
    #[error("Directory marker on line {line} before any 'Work base dir:' line")]
    MissingBaseDir { line: usize },

    #[error("Directory marker on line {line} does not start with '{expected}': {found}")]
    BaseDirMismatch {
        line: usize,
        expected: String,
        found: String,
    },
}
