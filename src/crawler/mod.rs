//! Crawler module for fetching and processing pages
//!
//! This module contains the engine and its moving parts, including:
//! - The bounded priority queue and worker group
//! - Global and per-domain fetch permits
//! - The HTTP transport seam and its reqwest implementation
//! - The optional headless rendering seam
//! - Counters, cache housekeeping and memory pressure relief

mod engine;
mod fetcher;
mod housekeeping;
mod monitor;
mod queue;
mod render;
mod scheduler;
mod task;

pub use engine::{Engine, EngineBuilder};
pub use fetcher::{
    build_http_client, FailureKind, FetchOutcome, FetchRequest, FetchResponse, ReqwestTransport,
    Transport, TransportFailure,
};
pub use housekeeping::{Housekeeper, HousekeepingReport, MemoryProbe, SystemMemory};
pub use monitor::{EngineStats, PerformanceMonitor};
pub use queue::TaskQueue;
pub use render::{RenderError, Renderer};
pub use scheduler::{FetchPermit, Scheduler};
pub use task::{CrawlTask, ScrapeError, ScrapeOptions, ScrapeResult};
