use thiserror::Error;

use crate::domain::repositories::broker_adapter::BrokerError;
use crate::domain::services::trade_execution_error::ExecutionError;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum ValidationError {
    #[error("Invalid price: {0}")]
    InvalidPrice(String),

    #[error("Invalid quantity: {0}")]
    InvalidQuantity(String),

    #[error("Invalid symbol: {0}")]
    InvalidSymbol(String),

    #[error("Invalid tick specification: {0}")]
    InvalidTick(String),

    #[error("Invalid risk configuration: {0}")]
    InvalidRisk(String),

    #[error("Invalid status transition from {from} to {to}")]
    InvalidTransition { from: String, to: String },

    #[error("Unrecognized value: {0}")]
    Unrecognized(String),

    #[error("Value must be finite")]
    MustBeFinite,
}

/// Failures behind the repository traits.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum StoreError {
    #[error("Query failed: {0}")]
    Query(String),

    #[error("Stored row could not be decoded: {0}")]
    Decode(String),

    #[error("Serialization failed: {0}")]
    Serialization(String),
}

impl From<ValidationError> for StoreError {
    fn from(error: ValidationError) -> Self {
        StoreError::Decode(error.to_string())
    }
}

/// Errors surfaced by the quote-to-order pipeline.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Execution error: {0}")]
    Execution(#[from] ExecutionError),

    #[error("Broker error: {0}")]
    Broker(#[from] BrokerError),

    #[error("Pipeline inbox closed")]
    InboxClosed,
}

/// Configuration that cannot be repaired by falling back to a default.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ConfigError {
    #[error("Missing required setting: {0}")]
    Missing(&'static str),

    #[error("Invalid setting {key}: {reason}")]
    Invalid { key: &'static str, reason: String },
}
