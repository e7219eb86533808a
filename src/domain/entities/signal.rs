//! Signal ledger entities.
//!
//! A signal row is the audit record of one engine decision. Its key is a pure
//! function of the business identity of the decision, so the same candle
//! sequence always maps onto the same row, across restarts and replays.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::domain::entities::order::Side;
use crate::domain::entities::trade_intent::TradeIntent;
use crate::domain::errors::ValidationError;

/// Name under which this strategy's signals are keyed.
pub const STRATEGY_NAME: &str = "fvg_retest";

/// Deterministic signal identity.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SignalKey(String);

impl SignalKey {
    pub fn derive(
        strategy: &str,
        user_id: &str,
        symbol: &str,
        side: Side,
        entry_time: i64,
        fvg_time: i64,
    ) -> Self {
        SignalKey(format!(
            "{}:{}:{}:{}:{}:{}",
            strategy, user_id, symbol, side, entry_time, fvg_time
        ))
    }

    pub fn for_intent(user_id: &str, intent: &TradeIntent) -> Self {
        Self::derive(
            STRATEGY_NAME,
            user_id,
            &intent.symbol,
            intent.side,
            intent.entry_time,
            intent.fvg_time,
        )
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SignalKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for SignalKey {
    fn from(value: String) -> Self {
        SignalKey(value)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SignalStatus {
    Detected,
    Taken,
    Blocked,
}

impl SignalStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SignalStatus::Detected => "DETECTED",
            SignalStatus::Taken => "TAKEN",
            SignalStatus::Blocked => "BLOCKED",
        }
    }
}

impl FromStr for SignalStatus {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "DETECTED" => Ok(SignalStatus::Detected),
            "TAKEN" => Ok(SignalStatus::Taken),
            "BLOCKED" => Ok(SignalStatus::Blocked),
            other => Err(ValidationError::Unrecognized(format!(
                "signal status '{}'",
                other
            ))),
        }
    }
}

/// Why a signal did not lead to an order.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BlockReason {
    Paused,
    KillSwitch,
    DryRun,
    NotLiveCandle,
    InvalidBracket,
    InTrade,
    ExecutionFailed,
    Duplicate,
    DirectionMismatch,
    /// A reason written by a newer worker version
    Unknown(String),
}

impl BlockReason {
    pub fn as_str(&self) -> &str {
        match self {
            BlockReason::Paused => "PAUSED",
            BlockReason::KillSwitch => "KILL_SWITCH",
            BlockReason::DryRun => "DRY_RUN",
            BlockReason::NotLiveCandle => "NOT_LIVE_CANDLE",
            BlockReason::InvalidBracket => "INVALID_BRACKET",
            BlockReason::InTrade => "IN_TRADE",
            BlockReason::ExecutionFailed => "EXECUTION_FAILED",
            BlockReason::Duplicate => "DUPLICATE",
            BlockReason::DirectionMismatch => "DIRECTION_MISMATCH",
            BlockReason::Unknown(raw) => raw,
        }
    }
}

impl fmt::Display for BlockReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<&str> for BlockReason {
    fn from(s: &str) -> Self {
        match s {
            "PAUSED" => BlockReason::Paused,
            "KILL_SWITCH" => BlockReason::KillSwitch,
            "DRY_RUN" => BlockReason::DryRun,
            "NOT_LIVE_CANDLE" => BlockReason::NotLiveCandle,
            "INVALID_BRACKET" => BlockReason::InvalidBracket,
            "IN_TRADE" => BlockReason::InTrade,
            "EXECUTION_FAILED" => BlockReason::ExecutionFailed,
            "DUPLICATE" => BlockReason::Duplicate,
            "DIRECTION_MISMATCH" => BlockReason::DirectionMismatch,
            other => BlockReason::Unknown(other.to_string()),
        }
    }
}

/// An engine evaluation that fired but could not become an intent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignalCandidate {
    pub symbol: String,
    /// Direction the expansion pattern fired in
    pub side: Side,
    pub entry_time: i64,
    pub fvg_time: i64,
    pub entry_price: f64,
}

/// Fields written when a signal row is first inserted.
#[derive(Debug, Clone, PartialEq)]
pub struct NewSignal {
    pub signal_key: SignalKey,
    pub user_id: String,
    pub symbol: String,
    pub side: Side,
    pub entry_time: i64,
    pub fvg_time: i64,
    pub entry_price: f64,
    pub stop_price: Option<f64>,
    pub take_profit_price: Option<f64>,
    pub stop_ticks: Option<i64>,
    pub tp_ticks: Option<i64>,
    pub rr: Option<f64>,
    pub contracts: Option<i64>,
    pub risk_usd_planned: Option<f64>,
    pub status: SignalStatus,
    pub block_reason: Option<BlockReason>,
}

impl NewSignal {
    pub fn detected(user_id: &str, intent: &TradeIntent) -> Self {
        Self {
            signal_key: SignalKey::for_intent(user_id, intent),
            user_id: user_id.to_string(),
            symbol: intent.symbol.clone(),
            side: intent.side,
            entry_time: intent.entry_time,
            fvg_time: intent.fvg_time,
            entry_price: intent.entry_price,
            stop_price: Some(intent.stop_price),
            take_profit_price: Some(intent.take_profit_price),
            stop_ticks: Some(intent.stop_ticks),
            tp_ticks: Some(intent.tp_ticks),
            rr: Some(intent.rr),
            contracts: Some(intent.contracts),
            risk_usd_planned: Some(intent.risk_usd_planned),
            status: SignalStatus::Detected,
            block_reason: None,
        }
    }

    pub fn blocked(user_id: &str, candidate: &SignalCandidate, reason: BlockReason) -> Self {
        Self {
            signal_key: SignalKey::derive(
                STRATEGY_NAME,
                user_id,
                &candidate.symbol,
                candidate.side,
                candidate.entry_time,
                candidate.fvg_time,
            ),
            user_id: user_id.to_string(),
            symbol: candidate.symbol.clone(),
            side: candidate.side,
            entry_time: candidate.entry_time,
            fvg_time: candidate.fvg_time,
            entry_price: candidate.entry_price,
            stop_price: None,
            take_profit_price: None,
            stop_ticks: None,
            tp_ticks: None,
            rr: None,
            contracts: None,
            risk_usd_planned: None,
            status: SignalStatus::Blocked,
            block_reason: Some(reason),
        }
    }
}

/// A persisted signal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignalRecord {
    pub signal_key: SignalKey,
    pub user_id: String,
    pub symbol: String,
    pub side: Side,
    pub entry_time: i64,
    pub fvg_time: i64,
    pub entry_price: f64,
    pub stop_price: Option<f64>,
    pub take_profit_price: Option<f64>,
    pub stop_ticks: Option<i64>,
    pub tp_ticks: Option<i64>,
    pub rr: Option<f64>,
    pub contracts: Option<i64>,
    pub risk_usd_planned: Option<f64>,
    pub status: SignalStatus,
    pub block_reason: Option<BlockReason>,
    pub exec_key: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
