use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::application::pipeline::PipelineConfig;
use crate::domain::entities::order::EntryType;
use crate::domain::errors::ConfigError;
use crate::domain::services::candle_builder::CandleBuilderConfig;
use crate::domain::services::trading_gate::DEFAULT_TRADING_STATE_TTL;
use crate::domain::value_objects::position_sizing::RiskConfig;
use crate::domain::value_objects::tick::TickSpec;
use crate::persistence::DatabaseConfig;

/// Configuration for one worker process (one user, one instrument)
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    pub user_id: String,
    pub broker_name: String,
    pub symbol: String,
    pub contract_id: String,
    pub tick: TickSpec,
    /// Used until the settings store has a row for the user
    pub risk: RiskConfig,
    pub dry_run: bool,
    pub quote_freshness_ms: i64,
    pub force_close_grace_ms: i64,
    pub live_window_ms: i64,
    pub trading_state_ttl_seconds: u64,
    pub config_reload_interval_seconds: u64,
    pub max_backfill_intervals: i64,
    pub record_direction_mismatch: bool,
    /// JSON-lines quote capture fed through the replay broker
    pub quote_replay_path: Option<PathBuf>,
    /// Capture playback speed; 0 replays without pauses
    pub quote_replay_speed: f64,
    pub database: DatabaseConfig,
}

impl WorkerConfig {
    /// Defaults for everything except the user, which has none.
    pub fn with_user(user_id: impl Into<String>) -> WorkerConfig {
        WorkerConfig {
            user_id: user_id.into(),
            broker_name: "replay".to_string(),
            symbol: "MNQ".to_string(),
            contract_id: "CON.F.US.MNQ.Z25".to_string(),
            tick: TickSpec::default(),
            risk: RiskConfig::default(),
            dry_run: true,
            quote_freshness_ms: 15_000,
            force_close_grace_ms: 2_000,
            live_window_ms: 15_000,
            trading_state_ttl_seconds: DEFAULT_TRADING_STATE_TTL.as_secs(),
            config_reload_interval_seconds: 30,
            max_backfill_intervals: 240,
            record_direction_mismatch: false,
            quote_replay_path: None,
            quote_replay_speed: 1.0,
            database: DatabaseConfig::default(),
        }
    }

    /// Load configuration from environment variables
    pub fn from_env() -> Result<WorkerConfig, ConfigError> {
        let mut config = Self::from_lookup(|key| std::env::var(key).ok())?;
        config.database = DatabaseConfig::from_env();
        Ok(config)
    }

    /// Build from any key lookup. Bad optional values are logged and ignored.
    pub fn from_lookup<F>(lookup: F) -> Result<WorkerConfig, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let user_id = lookup("WORKER_USER_ID")
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
            .ok_or(ConfigError::Missing("WORKER_USER_ID"))?;
        let mut config = WorkerConfig::with_user(user_id);

        if let Some(name) = non_empty(lookup("BROKER_NAME")) {
            config.broker_name = name;
        }
        if let Some(symbol) = non_empty(lookup("INSTRUMENT_SYMBOL")) {
            config.symbol = symbol;
        }
        if let Some(contract) = non_empty(lookup("INSTRUMENT_CONTRACT_ID")) {
            config.contract_id = contract;
        }

        // a wrong tick size mis-sizes every order, so it never falls back
        let tick_size = parse_positive(&lookup, "TICK_SIZE", config.tick.tick_size())?;
        let tick_value = parse_positive(&lookup, "TICK_VALUE", config.tick.tick_value())?;
        config.tick = TickSpec::new(tick_size, tick_value).map_err(|e| ConfigError::Invalid {
            key: "TICK_SIZE/TICK_VALUE",
            reason: e.to_string(),
        })?;

        let mut risk = config.risk.clone();
        set_from(&lookup, "RISK_USD", &mut risk.risk_usd, |_| true);
        set_from(&lookup, "REWARD_RISK_RATIO", &mut risk.reward_risk_ratio, |_| true);
        set_from(&lookup, "MAX_STOP_TICKS", &mut risk.max_stop_ticks, |_| true);
        set_from(&lookup, "ENTRY_TYPE", &mut risk.entry_type, |_: &EntryType| true);
        match risk.validate() {
            Ok(()) => config.risk = risk,
            Err(e) => tracing::warn!(
                "Invalid risk settings in environment ({}), using defaults: {:?}",
                e,
                config.risk
            ),
        }

        set_from(&lookup, "DRY_RUN", &mut config.dry_run, |_| true);
        set_from(&lookup, "QUOTE_FRESHNESS_MS", &mut config.quote_freshness_ms, |v| *v > 0);
        set_from(&lookup, "FORCE_CLOSE_GRACE_MS", &mut config.force_close_grace_ms, |v| {
            (0..=15_000).contains(v)
        });
        set_from(&lookup, "LIVE_WINDOW_MS", &mut config.live_window_ms, |v| *v > 0);
        set_from(
            &lookup,
            "TRADING_STATE_TTL_SECONDS",
            &mut config.trading_state_ttl_seconds,
            |v| *v <= 300,
        );
        set_from(
            &lookup,
            "CONFIG_RELOAD_INTERVAL_SECONDS",
            &mut config.config_reload_interval_seconds,
            |v| (1..=3600).contains(v),
        );
        set_from(
            &lookup,
            "MAX_BACKFILL_INTERVALS",
            &mut config.max_backfill_intervals,
            |v| *v >= 0,
        );
        set_from(
            &lookup,
            "RECORD_DIRECTION_MISMATCH",
            &mut config.record_direction_mismatch,
            |_| true,
        );

        config.quote_replay_path = non_empty(lookup("QUOTE_REPLAY_PATH")).map(PathBuf::from);
        set_from(&lookup, "QUOTE_REPLAY_SPEED", &mut config.quote_replay_speed, |v| {
            v.is_finite() && *v >= 0.0
        });

        Ok(config)
    }

    pub fn trading_state_ttl(&self) -> Duration {
        Duration::from_secs(self.trading_state_ttl_seconds)
    }

    pub fn config_reload_interval(&self) -> Duration {
        Duration::from_secs(self.config_reload_interval_seconds)
    }

    pub fn pipeline_config(&self) -> PipelineConfig {
        PipelineConfig {
            user_id: self.user_id.clone(),
            symbol: self.symbol.clone(),
            contract_id: self.contract_id.clone(),
            tick: self.tick,
            dry_run: self.dry_run,
            live_window_ms: self.live_window_ms,
            max_backfill_intervals: self.max_backfill_intervals,
            record_direction_mismatch: self.record_direction_mismatch,
            max_quote_age_ms: self.quote_freshness_ms,
            candles: CandleBuilderConfig {
                freshness_ms: self.quote_freshness_ms,
                grace_ms: self.force_close_grace_ms,
            },
            trading_state_ttl: self.trading_state_ttl(),
        }
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

/// Accepts `true`/`false` and `1`/`0` for flags.
trait EnvValue: Sized {
    fn parse_env(raw: &str) -> Result<Self, String>;
}

macro_rules! env_value_via_from_str {
    ($($t:ty),*) => {
        $(impl EnvValue for $t {
            fn parse_env(raw: &str) -> Result<Self, String> {
                <$t>::from_str(raw).map_err(|e| e.to_string())
            }
        })*
    };
}

env_value_via_from_str!(f64, i64, u64, EntryType);

impl EnvValue for bool {
    fn parse_env(raw: &str) -> Result<Self, String> {
        match raw.to_lowercase().as_str() {
            "true" | "1" | "yes" => Ok(true),
            "false" | "0" | "no" => Ok(false),
            other => Err(format!("'{}' is not a boolean", other)),
        }
    }
}

fn set_from<F, T, V>(lookup: &F, key: &str, slot: &mut T, valid: V)
where
    F: Fn(&str) -> Option<String>,
    T: EnvValue + std::fmt::Debug,
    V: Fn(&T) -> bool,
{
    let Some(raw) = lookup(key) else {
        return;
    };
    match T::parse_env(raw.trim()) {
        Ok(value) if valid(&value) => *slot = value,
        Ok(value) => {
            tracing::warn!(
                "Invalid {} value: {:?}, using default: {:?}",
                key,
                value,
                slot
            );
        }
        Err(e) => {
            tracing::warn!(
                "Failed to parse {} '{}': {}, using default: {:?}",
                key,
                raw,
                e,
                slot
            );
        }
    }
}

fn parse_positive<F>(lookup: &F, key: &'static str, default: f64) -> Result<f64, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let Some(raw) = lookup(key) else {
        return Ok(default);
    };
    let value =
        f64::parse_env(raw.trim()).map_err(|reason| ConfigError::Invalid { key, reason })?;
    if !value.is_finite() || value <= 0.0 {
        return Err(ConfigError::Invalid {
            key,
            reason: format!("must be a positive number, got {}", value),
        });
    }
    Ok(value)
}
