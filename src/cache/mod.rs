//! Response cache keyed by normalized URL hash

mod response_cache;

pub use response_cache::{cache_key, CacheEntry, ResponseCache};

use thiserror::Error;

/// Cache persistence errors
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("Cache IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Cache serialization error: {0}")]
    Json(#[from] serde_json::Error),
}
