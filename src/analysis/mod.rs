//! Analysis modules.
//!
//! Consensus, dispersion and outlier computation across testers.

pub mod aggregator;

pub use aggregator::*;
