//! Externally owned switches and settings read by the worker.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::domain::errors::StoreError;
use crate::domain::value_objects::position_sizing::RiskConfig;

/// Per-user trading switches, owned by the dashboard.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TradingState {
    pub is_paused: bool,
    pub is_kill_switched: bool,
}

#[async_trait]
pub trait TradingStateSource: Send + Sync {
    async fn get_user_trading_state(&self, user_id: &str) -> Result<TradingState, StoreError>;
}

#[async_trait]
pub trait SettingsSource: Send + Sync {
    /// Current risk settings, or `None` when the user has not saved any.
    async fn load_risk_config(&self, user_id: &str) -> Result<Option<RiskConfig>, StoreError>;
}
