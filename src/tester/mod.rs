//! Tester report handling.
//!
//! Retrieval of each tester's latest report and extraction of its numeric
//! observations.

pub mod fetcher;
pub mod parser;

pub use fetcher::{ReportFetcher, ReportSource};
pub use parser::parse_report;
