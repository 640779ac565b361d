//! HTTP surface for the AccelBench benchmarking platform.
//!
//! Thin translators from HTTP requests to repository and orchestrator
//! operations. The router is a library function so integration tests
//! exercise the exact middleware stack production runs.

pub mod config;
pub mod error;
pub mod handlers;
pub mod hf;
pub mod router;
pub mod routes;
pub mod state;
