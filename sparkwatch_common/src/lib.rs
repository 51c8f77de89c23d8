//! Common types and utilities for the sparkwatch crates.

pub mod application;
pub mod config;
pub mod error;

// re-export the dependencies
pub use anyhow;
pub use k8s_openapi;
pub use kube;
pub use serde;
pub use serde_json;
pub use time;
pub use tokio;
pub use tracing;
pub use tracing_subscriber;
