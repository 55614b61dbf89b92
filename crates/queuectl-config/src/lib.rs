//! # Queuectl Config
//!
//! Configuration management for the queuectl job queue.
//! Supports layered configuration from a JSON file and environment
//! variables, runtime refresh, and persisting single keys back to disk.

mod error;
mod loader;
mod queue_config;
mod validation;

pub use error::*;
pub use loader::*;
pub use queue_config::*;
pub use validation::*;
