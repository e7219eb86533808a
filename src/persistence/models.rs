//! Database Models
//!
//! Row structures as stored, and their conversion into domain entities.
//! Enumerations are stored as text and parsed on the way out.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use crate::domain::entities::candle::Candle;
use crate::domain::entities::execution::{ExecKey, ExecutionRecord};
use crate::domain::entities::signal::{BlockReason, SignalKey, SignalRecord};
use crate::domain::errors::StoreError;
use crate::domain::repositories::trading_state::TradingState;
use crate::domain::value_objects::position_sizing::RiskConfig;

/// Candle row in database
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct CandleRow {
    pub interval: String, // "15s" or "3m"
    pub symbol: String,
    pub interval_start: i64,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub backfill: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<CandleRow> for Candle {
    fn from(row: CandleRow) -> Self {
        Candle::new(
            row.symbol,
            row.interval_start,
            row.open,
            row.high,
            row.low,
            row.close,
        )
    }
}

/// Signal row in database
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct SignalRow {
    pub signal_key: String,
    pub user_id: String,
    pub symbol: String,
    pub side: String, // "long" or "short"
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
    pub status: String, // "DETECTED", "TAKEN" or "BLOCKED"
    pub block_reason: Option<String>,
    pub exec_key: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TryFrom<SignalRow> for SignalRecord {
    type Error = StoreError;

    fn try_from(row: SignalRow) -> Result<Self, Self::Error> {
        Ok(SignalRecord {
            signal_key: SignalKey::from(row.signal_key),
            user_id: row.user_id,
            symbol: row.symbol,
            side: row.side.parse()?,
            entry_time: row.entry_time,
            fvg_time: row.fvg_time,
            entry_price: row.entry_price,
            stop_price: row.stop_price,
            take_profit_price: row.take_profit_price,
            stop_ticks: row.stop_ticks,
            tp_ticks: row.tp_ticks,
            rr: row.rr,
            contracts: row.contracts,
            risk_usd_planned: row.risk_usd_planned,
            status: row.status.parse()?,
            block_reason: row.block_reason.as_deref().map(BlockReason::from),
            exec_key: row.exec_key,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

/// Execution row in database
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct ExecutionRow {
    pub id: i64,
    pub exec_key: String,
    pub signal_key: Option<String>,
    pub user_id: String,
    pub broker: String,
    pub contract_id: String,
    pub side: String,
    pub qty: i64,
    pub entry_type: String, // "MARKET" or "LIMIT"
    pub stop_loss_ticks: i64,
    pub take_profit_ticks: i64,
    pub status: String,
    pub entry_order_id: Option<String>,
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TryFrom<ExecutionRow> for ExecutionRecord {
    type Error = StoreError;

    fn try_from(row: ExecutionRow) -> Result<Self, Self::Error> {
        Ok(ExecutionRecord {
            id: row.id,
            exec_key: ExecKey::from(row.exec_key),
            signal_key: row.signal_key,
            user_id: row.user_id,
            broker: row.broker,
            contract_id: row.contract_id,
            side: row.side.parse()?,
            qty: row.qty,
            entry_type: row.entry_type.parse()?,
            stop_loss_ticks: row.stop_loss_ticks,
            take_profit_ticks: row.take_profit_ticks,
            status: row.status.parse()?,
            entry_order_id: row.entry_order_id,
            error: row.error,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

/// Trading switches row in database
#[derive(Debug, Clone, FromRow)]
pub struct TradingStateRow {
    pub user_id: String,
    pub is_paused: bool,
    pub is_kill_switched: bool,
    pub updated_at: DateTime<Utc>,
}

impl From<TradingStateRow> for TradingState {
    fn from(row: TradingStateRow) -> Self {
        TradingState {
            is_paused: row.is_paused,
            is_kill_switched: row.is_kill_switched,
        }
    }
}

/// Risk settings row in database
#[derive(Debug, Clone, FromRow)]
pub struct RiskSettingsRow {
    pub user_id: String,
    pub risk_usd: f64,
    pub reward_risk_ratio: f64,
    pub max_stop_ticks: i64,
    pub entry_type: String,
    pub updated_at: DateTime<Utc>,
}

impl TryFrom<RiskSettingsRow> for RiskConfig {
    type Error = StoreError;

    fn try_from(row: RiskSettingsRow) -> Result<Self, Self::Error> {
        Ok(RiskConfig::new(
            row.risk_usd,
            row.reward_risk_ratio,
            row.max_stop_ticks,
            row.entry_type.parse()?,
        )?)
    }
}
