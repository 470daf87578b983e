//! End-to-end tests for the engine
//!
//! HTTP scenarios run against wiremock servers; concurrency bounds are checked
//! with an instrumented in-process transport.

mod common;
mod concurrency_tests;
mod resilience_tests;
mod scrape_tests;
