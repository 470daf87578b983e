//! URL handling module for Sumi-Sieve
//!
//! This module provides domain extraction (the key for all per-domain state),
//! target validation, and normalization used to build stable cache keys.

mod domain;
mod normalize;

// Re-export main functions
pub use domain::{extract_domain, parse_target};
pub use normalize::normalize_url;
