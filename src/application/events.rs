//! Events emitted by the pipeline for observers (dashboard, notifier, logs).
//!
//! Serialized with an explicit `type` tag, e.g. `{"type": "signal.blocked", ...}`.

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::trace;

use crate::domain::entities::candle::{Candle, Interval};
use crate::domain::entities::execution::ExecutionStatus;
use crate::domain::entities::trade_intent::TradeIntent;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum TradingEvent {
    #[serde(rename = "candle.closed")]
    CandleClosed {
        interval: Interval,
        candle: Candle,
        /// Built from live quotes and fed to the strategy
        tradable: bool,
        /// Synthesized flat candle for a gap
        backfill: bool,
    },

    #[serde(rename = "signal.detected")]
    SignalDetected {
        signal_key: String,
        intent: TradeIntent,
    },

    #[serde(rename = "signal.blocked")]
    SignalBlocked { signal_key: String, reason: String },

    #[serde(rename = "signal.taken")]
    SignalTaken { signal_key: String, exec_key: String },

    #[serde(rename = "execution.submitted")]
    ExecutionSubmitted {
        exec_key: String,
        order_id: Option<String>,
    },

    #[serde(rename = "execution.failed")]
    ExecutionFailed {
        exec_key: String,
        error_code: String,
        error: String,
    },

    #[serde(rename = "execution.updated")]
    ExecutionUpdated {
        exec_key: String,
        status: ExecutionStatus,
    },
}

/// Fan-out of [`TradingEvent`]s over a broadcast channel.
#[derive(Debug, Clone)]
pub struct EventBus {
    sender: broadcast::Sender<TradingEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publish to current subscribers. Having none is not an error.
    pub fn publish(&self, event: TradingEvent) {
        if self.sender.send(event).is_err() {
            trace!("No event subscribers");
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<TradingEvent> {
        self.sender.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(1024)
    }
}
