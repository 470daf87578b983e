//! State module for per-domain bookkeeping
//!
//! # Components
//!
//! - `DomainState`: pacing history, rolling outcomes, breaker position and
//!   user agent rotation for one domain
//! - `DomainStore`: the synchronized arena all tasks share
//! - `BreakerState`: closed / open / half-open

mod domain_state;
mod store;

// Re-export main types
pub use domain_state::{BreakerState, DomainState, OUTCOME_WINDOW, VOLUME_WINDOW};
pub use store::{DomainSnapshot, DomainStore};
