//! The benchmark run lifecycle engine.
//!
//! [`Orchestrator::execute`] owns one run from `pending` to a terminal
//! state: deploy the model workload, wait for readiness, drive the load
//! generator, scrape serving-side telemetry, compute and persist metrics,
//! and tear down every cluster resource on every exit path.

pub mod lifecycle;
pub mod scraper;

pub use lifecycle::{Orchestrator, OrchestratorConfig, ResourceNames, RunConfig};
pub use scraper::GpuScraper;
