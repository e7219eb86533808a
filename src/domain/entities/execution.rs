//! Execution entities: one row per order attempt, keyed by a deterministic key.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use std::str::FromStr;

use crate::domain::entities::order::{EntryType, Side};
use crate::domain::entities::signal::SignalKey;
use crate::domain::errors::ValidationError;

/// Idempotency key for an order attempt. Also sent to the broker as the custom tag.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ExecKey(String);

impl ExecKey {
    pub fn for_signal(signal_key: &SignalKey) -> Self {
        let digest = Sha256::digest(signal_key.as_str().as_bytes());
        let hex = hex::encode(digest);
        ExecKey(format!("ex_{}", &hex[..32]))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ExecKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for ExecKey {
    fn from(value: String) -> Self {
        ExecKey(value)
    }
}

impl From<&str> for ExecKey {
    fn from(value: &str) -> Self {
        ExecKey(value.to_string())
    }
}

/// Lifecycle of an order attempt.
///
/// ```text
/// INTENT_CREATED -> ORDER_SUBMITTED -> ORDER_ACCEPTED -> ORDER_FILLED -> POSITION_CLOSED
///        |                 |
///        +----> FAILED <---+
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ExecutionStatus {
    IntentCreated,
    OrderSubmitted,
    OrderAccepted,
    OrderFilled,
    PositionClosed,
    Failed,
}

impl ExecutionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExecutionStatus::IntentCreated => "INTENT_CREATED",
            ExecutionStatus::OrderSubmitted => "ORDER_SUBMITTED",
            ExecutionStatus::OrderAccepted => "ORDER_ACCEPTED",
            ExecutionStatus::OrderFilled => "ORDER_FILLED",
            ExecutionStatus::PositionClosed => "POSITION_CLOSED",
            ExecutionStatus::Failed => "FAILED",
        }
    }

    pub fn can_transition_to(&self, next: ExecutionStatus) -> bool {
        use ExecutionStatus::*;
        matches!(
            (self, next),
            (IntentCreated, OrderSubmitted)
                | (IntentCreated, Failed)
                // broker events for a submission whose ack was never recorded
                | (IntentCreated, OrderAccepted)
                | (IntentCreated, OrderFilled)
                | (OrderSubmitted, OrderAccepted)
                // fills can overtake the acceptance event
                | (OrderSubmitted, OrderFilled)
                | (OrderSubmitted, Failed)
                | (OrderAccepted, OrderFilled)
                | (OrderFilled, PositionClosed)
        )
    }
}

impl fmt::Display for ExecutionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ExecutionStatus {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "INTENT_CREATED" => Ok(ExecutionStatus::IntentCreated),
            "ORDER_SUBMITTED" => Ok(ExecutionStatus::OrderSubmitted),
            "ORDER_ACCEPTED" => Ok(ExecutionStatus::OrderAccepted),
            "ORDER_FILLED" => Ok(ExecutionStatus::OrderFilled),
            "POSITION_CLOSED" => Ok(ExecutionStatus::PositionClosed),
            "FAILED" => Ok(ExecutionStatus::Failed),
            other => Err(ValidationError::Unrecognized(format!(
                "execution status '{}'",
                other
            ))),
        }
    }
}

/// What to submit for one execution key.
#[derive(Debug, Clone, PartialEq)]
pub struct OrderSpec {
    pub user_id: String,
    pub broker: String,
    pub contract_id: String,
    pub side: Side,
    pub qty: i64,
    pub entry_type: EntryType,
    pub stop_loss_ticks: i64,
    pub take_profit_ticks: i64,
    pub signal_key: Option<SignalKey>,
}

/// A persisted execution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionRecord {
    pub id: i64,
    pub exec_key: ExecKey,
    pub signal_key: Option<String>,
    pub user_id: String,
    pub broker: String,
    pub contract_id: String,
    pub side: Side,
    pub qty: i64,
    pub entry_type: EntryType,
    pub stop_loss_ticks: i64,
    pub take_profit_ticks: i64,
    pub status: ExecutionStatus,
    pub entry_order_id: Option<String>,
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Fields changed by one status transition.
#[derive(Debug, Clone, PartialEq)]
pub struct ExecutionUpdate {
    pub status: ExecutionStatus,
    pub entry_order_id: Option<String>,
    pub error: Option<String>,
}

impl ExecutionUpdate {
    pub fn status(status: ExecutionStatus) -> Self {
        Self {
            status,
            entry_order_id: None,
            error: None,
        }
    }

    pub fn submitted(entry_order_id: String) -> Self {
        Self {
            status: ExecutionStatus::OrderSubmitted,
            entry_order_id: Some(entry_order_id),
            error: None,
        }
    }

    pub fn failed(error: String) -> Self {
        Self {
            status: ExecutionStatus::Failed,
            entry_order_id: None,
            error: Some(error),
        }
    }
}

/// Broker-side order lifecycle event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum OrderEventKind {
    Accepted,
    Filled,
    Rejected { reason: String },
    PositionClosed,
}

impl OrderEventKind {
    pub fn target_status(&self) -> ExecutionStatus {
        match self {
            OrderEventKind::Accepted => ExecutionStatus::OrderAccepted,
            OrderEventKind::Filled => ExecutionStatus::OrderFilled,
            OrderEventKind::Rejected { .. } => ExecutionStatus::Failed,
            OrderEventKind::PositionClosed => ExecutionStatus::PositionClosed,
        }
    }
}

/// An order event as delivered by the broker adapter, already normalized.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderUpdate {
    /// Custom tag sent with the order, which is the execution key
    pub custom_tag: Option<String>,
    pub order_id: Option<String>,
    pub kind: OrderEventKind,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::entities::signal::STRATEGY_NAME;

    #[test]
    fn test_exec_key_is_deterministic_and_short() {
        let signal = SignalKey::derive(STRATEGY_NAME, "user-1", "MNQ", Side::Long, 1_000, 720);
        let a = ExecKey::for_signal(&signal);
        let b = ExecKey::for_signal(&signal);
        assert_eq!(a, b);
        assert!(a.as_str().starts_with("ex_"));
        assert_eq!(a.as_str().len(), 35);
        assert!(a.as_str()[3..].chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_exec_key_differs_per_signal() {
        let s1 = SignalKey::derive(STRATEGY_NAME, "user-1", "MNQ", Side::Long, 1_000, 720);
        let s2 = SignalKey::derive(STRATEGY_NAME, "user-2", "MNQ", Side::Long, 1_000, 720);
        assert_ne!(ExecKey::for_signal(&s1), ExecKey::for_signal(&s2));
    }

    #[test]
    fn test_status_machine_forward_path() {
        use ExecutionStatus::*;
        assert!(IntentCreated.can_transition_to(OrderSubmitted));
        assert!(OrderSubmitted.can_transition_to(OrderAccepted));
        assert!(OrderAccepted.can_transition_to(OrderFilled));
        assert!(OrderFilled.can_transition_to(PositionClosed));
        assert!(IntentCreated.can_transition_to(OrderAccepted));
        assert!(IntentCreated.can_transition_to(OrderFilled));
        assert!(!IntentCreated.can_transition_to(PositionClosed));
    }

    #[test]
    fn test_status_machine_failure_edges() {
        use ExecutionStatus::*;
        assert!(IntentCreated.can_transition_to(Failed));
        assert!(OrderSubmitted.can_transition_to(Failed));
        assert!(!OrderAccepted.can_transition_to(Failed));
        assert!(!OrderFilled.can_transition_to(Failed));
        assert!(!Failed.can_transition_to(OrderSubmitted));
        assert!(!PositionClosed.can_transition_to(OrderFilled));
        assert!(!OrderSubmitted.can_transition_to(OrderSubmitted));
    }

    #[test]
    fn test_status_parsing() {
        for status in [
            ExecutionStatus::IntentCreated,
            ExecutionStatus::OrderSubmitted,
            ExecutionStatus::OrderAccepted,
            ExecutionStatus::OrderFilled,
            ExecutionStatus::PositionClosed,
            ExecutionStatus::Failed,
        ] {
            assert_eq!(status.as_str().parse::<ExecutionStatus>().unwrap(), status);
        }
    }
}
