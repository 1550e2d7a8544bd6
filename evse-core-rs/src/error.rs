//! Error types for the load balancer
//!
//! Nothing here is fatal to the balancer: a failing charger degrades to
//! "excluded from allocation" and the next poll retries.

use thiserror::Error;

/// Errors reported by a charger driver
#[derive(Debug, Error)]
pub enum ChargerError {
    #[error("charger {0} is unavailable")]
    Unavailable(String),

    #[error("charger {id} rejected current limit: {reason}")]
    WriteRejected { id: String, reason: String },
}

/// Errors from the allocator registry
#[derive(Debug, Error)]
pub enum AllocatorError {
    #[error("unknown charger: {0}")]
    UnknownCharger(String),

    #[error(transparent)]
    Charger(#[from] ChargerError),
}

/// Errors loading or validating configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse config: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}
