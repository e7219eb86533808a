//! Trade execution errors with detailed context

use std::fmt;
use thiserror::Error;

use crate::domain::entities::execution::ExecKey;
use crate::domain::errors::StoreError;
use crate::domain::repositories::broker_adapter::BrokerError;

/// Detailed error type for execution failures
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ExecutionError {
    /// The broker refused or failed the entry order; the row is now FAILED
    #[error("Order placement failed for {exec_key}: {source}")]
    Broker {
        exec_key: ExecKey,
        #[source]
        source: BrokerError,
    },

    /// The execution row could not be read or written
    #[error("Execution store failed: {0}")]
    Store(#[from] StoreError),
}

impl ExecutionError {
    /// Get the severity level of this error
    pub fn severity(&self) -> ErrorSeverity {
        match self {
            ExecutionError::Broker {
                source: BrokerError::OrderRejected(_),
                ..
            } => ErrorSeverity::Moderate,
            ExecutionError::Broker { .. } => ErrorSeverity::Critical,
            ExecutionError::Store(_) => ErrorSeverity::Critical,
        }
    }

    /// Could retrying the same call plausibly succeed?
    ///
    /// Execution keys are never retried by the worker; this only classifies
    /// the failure for logs.
    pub fn is_recoverable(&self) -> bool {
        match self {
            ExecutionError::Broker { source, .. } => matches!(
                source,
                BrokerError::NetworkError(_) | BrokerError::ConnectionFailed(_)
            ),
            ExecutionError::Store(StoreError::Query(_)) => true,
            ExecutionError::Store(_) => false,
        }
    }

    /// Get a short error code for logging/monitoring
    pub fn error_code(&self) -> &'static str {
        match self {
            ExecutionError::Broker { source, .. } => match source {
                BrokerError::ConnectionFailed(_) => "ERR_BROKER_CONNECTION",
                BrokerError::AuthorizationFailed(_) => "ERR_BROKER_AUTH",
                BrokerError::OrderRejected(_) => "ERR_ORDER_REJECTED",
                BrokerError::NetworkError(_) => "ERR_BROKER_NETWORK",
                BrokerError::MalformedPayload(_) => "ERR_BROKER_PAYLOAD",
                BrokerError::StreamClosed(_) => "ERR_BROKER_STREAM",
            },
            ExecutionError::Store(_) => "ERR_EXECUTION_STORE",
        }
    }
}

/// Severity levels for execution errors
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ErrorSeverity {
    /// Non-critical, expected to occur occasionally
    Minor,
    /// Moderate issues that indicate problems
    Moderate,
    /// Critical issues that require immediate attention
    Critical,
}

impl fmt::Display for ErrorSeverity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorSeverity::Minor => write!(f, "Minor"),
            ErrorSeverity::Moderate => write!(f, "Moderate"),
            ErrorSeverity::Critical => write!(f, "Critical"),
        }
    }
}
