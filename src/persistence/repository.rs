//! Database Repository
//!
//! SQLite implementations of the domain store traits. Every idempotency check
//! is a single statement: `INSERT ... ON CONFLICT DO NOTHING` for creation and
//! `UPDATE ... WHERE status = ?` for transitions.

use super::models::*;
use super::DbPool;
use async_trait::async_trait;
use chrono::Utc;
use tracing::{debug, error};

use crate::domain::entities::candle::{Candle, Interval};
use crate::domain::entities::execution::{
    ExecKey, ExecutionRecord, ExecutionStatus, ExecutionUpdate, OrderSpec,
};
use crate::domain::entities::signal::{NewSignal, SignalKey, SignalRecord, SignalStatus};
use crate::domain::errors::StoreError;
use crate::domain::repositories::store::{
    CandleStore, ExecutionStore, SignalStore, SignalTransition, StoreResult,
};
use crate::domain::repositories::trading_state::{
    SettingsSource, TradingState, TradingStateSource,
};
use crate::domain::value_objects::position_sizing::RiskConfig;

fn query_error(context: &str, e: sqlx::Error) -> StoreError {
    error!("Failed to {}: {}", context, e);
    StoreError::Query(format!("Failed to {}: {}", context, e))
}

/// Candle repository
pub struct CandleRepository {
    pool: DbPool,
}

impl CandleRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    /// Number of stored candles for a symbol, backfilled ones included
    pub async fn count(&self, interval: Interval, symbol: &str) -> StoreResult<i64> {
        let (count,): (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM candles WHERE interval = ?1 AND symbol = ?2")
                .bind(interval.as_str())
                .bind(symbol)
                .fetch_one(&self.pool)
                .await
                .map_err(|e| query_error("count candles", e))?;
        Ok(count)
    }
}

#[async_trait]
impl CandleStore for CandleRepository {
    async fn upsert_candle(
        &self,
        interval: Interval,
        candle: &Candle,
        backfill: bool,
    ) -> StoreResult<()> {
        let now = Utc::now();
        sqlx::query(
            r#"
            INSERT INTO candles (
                interval, symbol, interval_start, open, high, low, close,
                backfill, created_at, updated_at
            )
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?9)
            ON CONFLICT (interval, symbol, interval_start) DO UPDATE SET
                open = excluded.open,
                high = excluded.high,
                low = excluded.low,
                close = excluded.close,
                backfill = excluded.backfill,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(interval.as_str())
        .bind(&candle.symbol)
        .bind(candle.interval_start)
        .bind(candle.open)
        .bind(candle.high)
        .bind(candle.low)
        .bind(candle.close)
        .bind(backfill)
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(|e| query_error("upsert candle", e))?;

        debug!(
            "Stored {} candle {} @ {}{}",
            interval,
            candle.symbol,
            candle.interval_start,
            if backfill { " (backfill)" } else { "" }
        );
        Ok(())
    }

    async fn latest_candle(
        &self,
        interval: Interval,
        symbol: &str,
    ) -> StoreResult<Option<Candle>> {
        let row = sqlx::query_as::<_, CandleRow>(
            r#"
            SELECT * FROM candles
            WHERE interval = ?1 AND symbol = ?2
            ORDER BY interval_start DESC
            LIMIT 1
            "#,
        )
        .bind(interval.as_str())
        .bind(symbol)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| query_error("load latest candle", e))?;

        Ok(row.map(Candle::from))
    }

    async fn candles_between(
        &self,
        interval: Interval,
        symbol: &str,
        from: i64,
        to: i64,
    ) -> StoreResult<Vec<Candle>> {
        let rows = sqlx::query_as::<_, CandleRow>(
            r#"
            SELECT * FROM candles
            WHERE interval = ?1 AND symbol = ?2 AND interval_start BETWEEN ?3 AND ?4
            ORDER BY interval_start ASC
            "#,
        )
        .bind(interval.as_str())
        .bind(symbol)
        .bind(from)
        .bind(to)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| query_error("load candles", e))?;

        Ok(rows.into_iter().map(Candle::from).collect())
    }
}

/// Signal repository
pub struct SignalRepository {
    pool: DbPool,
}

impl SignalRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    /// All signals for a user, oldest first
    pub async fn list_for_user(&self, user_id: &str) -> StoreResult<Vec<SignalRecord>> {
        let rows = sqlx::query_as::<_, SignalRow>(
            "SELECT * FROM signals WHERE user_id = ?1 ORDER BY entry_time ASC, created_at ASC",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| query_error("list signals", e))?;

        rows.into_iter().map(SignalRecord::try_from).collect()
    }
}

#[async_trait]
impl SignalStore for SignalRepository {
    async fn insert_signal_if_absent(&self, signal: &NewSignal) -> StoreResult<bool> {
        let now = Utc::now();
        let result = sqlx::query(
            r#"
            INSERT INTO signals (
                signal_key, user_id, symbol, side, entry_time, fvg_time,
                entry_price, stop_price, take_profit_price, stop_ticks, tp_ticks,
                rr, contracts, risk_usd_planned, status, block_reason,
                created_at, updated_at
            )
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?17)
            ON CONFLICT (signal_key) DO NOTHING
            "#,
        )
        .bind(signal.signal_key.as_str())
        .bind(&signal.user_id)
        .bind(&signal.symbol)
        .bind(signal.side.as_str())
        .bind(signal.entry_time)
        .bind(signal.fvg_time)
        .bind(signal.entry_price)
        .bind(signal.stop_price)
        .bind(signal.take_profit_price)
        .bind(signal.stop_ticks)
        .bind(signal.tp_ticks)
        .bind(signal.rr)
        .bind(signal.contracts)
        .bind(signal.risk_usd_planned)
        .bind(signal.status.as_str())
        .bind(signal.block_reason.as_ref().map(|r| r.as_str().to_string()))
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(|e| query_error("insert signal", e))?;

        Ok(result.rows_affected() == 1)
    }

    async fn transition_signal(
        &self,
        key: &SignalKey,
        from: SignalStatus,
        transition: &SignalTransition,
    ) -> StoreResult<bool> {
        let now = Utc::now();
        let result = sqlx::query(
            r#"
            UPDATE signals
            SET status = ?1,
                block_reason = ?2,
                exec_key = COALESCE(?3, exec_key),
                updated_at = ?4
            WHERE signal_key = ?5 AND status = ?6
            "#,
        )
        .bind(transition.to.as_str())
        .bind(transition.block_reason.as_ref().map(|r| r.as_str().to_string()))
        .bind(transition.exec_key.as_ref().map(|k| k.as_str().to_string()))
        .bind(now)
        .bind(key.as_str())
        .bind(from.as_str())
        .execute(&self.pool)
        .await
        .map_err(|e| query_error("transition signal", e))?;

        Ok(result.rows_affected() == 1)
    }

    async fn find_signal(&self, key: &SignalKey) -> StoreResult<Option<SignalRecord>> {
        let row = sqlx::query_as::<_, SignalRow>("SELECT * FROM signals WHERE signal_key = ?1")
            .bind(key.as_str())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| query_error("find signal", e))?;

        row.map(SignalRecord::try_from).transpose()
    }
}

/// Execution repository
pub struct ExecutionRepository {
    pool: DbPool,
}

impl ExecutionRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ExecutionStore for ExecutionRepository {
    async fn create_execution_if_absent(
        &self,
        exec_key: &ExecKey,
        spec: &OrderSpec,
    ) -> StoreResult<(ExecutionRecord, bool)> {
        let now = Utc::now();
        let result = sqlx::query(
            r#"
            INSERT INTO executions (
                exec_key, signal_key, user_id, broker, contract_id, side, qty,
                entry_type, stop_loss_ticks, take_profit_ticks, status,
                created_at, updated_at
            )
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?12)
            ON CONFLICT (exec_key) DO NOTHING
            "#,
        )
        .bind(exec_key.as_str())
        .bind(spec.signal_key.as_ref().map(|k| k.as_str().to_string()))
        .bind(&spec.user_id)
        .bind(&spec.broker)
        .bind(&spec.contract_id)
        .bind(spec.side.as_str())
        .bind(spec.qty)
        .bind(spec.entry_type.as_str())
        .bind(spec.stop_loss_ticks)
        .bind(spec.take_profit_ticks)
        .bind(ExecutionStatus::IntentCreated.as_str())
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(|e| query_error("create execution", e))?;

        let created = result.rows_affected() == 1;
        let record = self.find_execution_by_key(exec_key).await?.ok_or_else(|| {
            StoreError::Query(format!("Execution {} missing after insert", exec_key))
        })?;

        if created {
            debug!("Created execution {} (id {})", exec_key, record.id);
        }
        Ok((record, created))
    }

    async fn find_execution_by_key(
        &self,
        exec_key: &ExecKey,
    ) -> StoreResult<Option<ExecutionRecord>> {
        let row = sqlx::query_as::<_, ExecutionRow>("SELECT * FROM executions WHERE exec_key = ?1")
            .bind(exec_key.as_str())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| query_error("find execution", e))?;

        row.map(ExecutionRecord::try_from).transpose()
    }

    async fn find_execution_by_order_id(
        &self,
        order_id: &str,
    ) -> StoreResult<Option<ExecutionRecord>> {
        let row = sqlx::query_as::<_, ExecutionRow>(
            "SELECT * FROM executions WHERE entry_order_id = ?1 LIMIT 1",
        )
        .bind(order_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| query_error("find execution by order id", e))?;

        row.map(ExecutionRecord::try_from).transpose()
    }

    async fn update_execution(
        &self,
        id: i64,
        expected: ExecutionStatus,
        update: &ExecutionUpdate,
    ) -> StoreResult<bool> {
        let now = Utc::now();
        let result = sqlx::query(
            r#"
            UPDATE executions
            SET status = ?1,
                entry_order_id = COALESCE(?2, entry_order_id),
                error = COALESCE(?3, error),
                updated_at = ?4
            WHERE id = ?5 AND status = ?6
            "#,
        )
        .bind(update.status.as_str())
        .bind(&update.entry_order_id)
        .bind(&update.error)
        .bind(now)
        .bind(id)
        .bind(expected.as_str())
        .execute(&self.pool)
        .await
        .map_err(|e| query_error("update execution", e))?;

        let applied = result.rows_affected() == 1;
        if applied {
            debug!("Execution {}: {} -> {}", id, expected, update.status);
        }
        Ok(applied)
    }

    async fn has_open_execution(&self, user_id: &str, contract_id: &str) -> StoreResult<bool> {
        let (count,): (i64,) = sqlx::query_as(
            r#"
            SELECT COUNT(*) FROM executions
            WHERE user_id = ?1 AND contract_id = ?2
              AND status IN ('INTENT_CREATED', 'ORDER_SUBMITTED', 'ORDER_ACCEPTED', 'ORDER_FILLED')
            "#,
        )
        .bind(user_id)
        .bind(contract_id)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| query_error("check open executions", e))?;

        Ok(count > 0)
    }
}

/// Trading switches repository
pub struct TradingStateRepository {
    pool: DbPool,
}

impl TradingStateRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    /// Write a user's switches (dashboard side, also used by tests)
    pub async fn set_trading_state(&self, user_id: &str, state: TradingState) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO trading_state (user_id, is_paused, is_kill_switched, updated_at)
            VALUES (?1, ?2, ?3, ?4)
            ON CONFLICT (user_id) DO UPDATE SET
                is_paused = excluded.is_paused,
                is_kill_switched = excluded.is_kill_switched,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(user_id)
        .bind(state.is_paused)
        .bind(state.is_kill_switched)
        .bind(Utc::now())
        .execute(&self.pool)
        .await
        .map_err(|e| query_error("store trading state", e))?;
        Ok(())
    }
}

#[async_trait]
impl TradingStateSource for TradingStateRepository {
    /// A user without a row trades normally.
    async fn get_user_trading_state(&self, user_id: &str) -> StoreResult<TradingState> {
        let row = sqlx::query_as::<_, TradingStateRow>(
            "SELECT * FROM trading_state WHERE user_id = ?1",
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| query_error("load trading state", e))?;

        Ok(row.map(TradingState::from).unwrap_or_default())
    }
}

/// Risk settings repository
pub struct RiskSettingsRepository {
    pool: DbPool,
}

impl RiskSettingsRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    pub async fn save_risk_config(&self, user_id: &str, config: &RiskConfig) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO risk_settings (
                user_id, risk_usd, reward_risk_ratio, max_stop_ticks, entry_type, updated_at
            )
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            ON CONFLICT (user_id) DO UPDATE SET
                risk_usd = excluded.risk_usd,
                reward_risk_ratio = excluded.reward_risk_ratio,
                max_stop_ticks = excluded.max_stop_ticks,
                entry_type = excluded.entry_type,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(user_id)
        .bind(config.risk_usd)
        .bind(config.reward_risk_ratio)
        .bind(config.max_stop_ticks)
        .bind(config.entry_type.as_str())
        .bind(Utc::now())
        .execute(&self.pool)
        .await
        .map_err(|e| query_error("store risk settings", e))?;
        Ok(())
    }
}

#[async_trait]
impl SettingsSource for RiskSettingsRepository {
    async fn load_risk_config(&self, user_id: &str) -> StoreResult<Option<RiskConfig>> {
        let row = sqlx::query_as::<_, RiskSettingsRow>(
            "SELECT * FROM risk_settings WHERE user_id = ?1",
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| query_error("load risk settings", e))?;

        row.map(RiskConfig::try_from).transpose()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::entities::order::{EntryType, Side};
    use crate::domain::entities::signal::BlockReason;
    use crate::persistence::init_database;

    async fn pool() -> DbPool {
        init_database("sqlite::memory:").await.unwrap()
    }

    fn spec(contract_id: &str) -> OrderSpec {
        OrderSpec {
            user_id: "user-1".to_string(),
            broker: "replay".to_string(),
            contract_id: contract_id.to_string(),
            side: Side::Long,
            qty: 1,
            entry_type: EntryType::Market,
            stop_loss_ticks: 8,
            take_profit_ticks: 16,
            signal_key: Some(SignalKey::from("fvg_retest:user-1:MNQ:long:1:2".to_string())),
        }
    }

    #[tokio::test]
    async fn test_candle_upsert_is_idempotent() {
        let repo = CandleRepository::new(pool().await);
        let candle = Candle::new("MNQ", 1_700_000_010, 1.0, 2.0, 0.5, 1.5);
        repo.upsert_candle(Interval::FifteenSeconds, &candle, false)
            .await
            .unwrap();
        repo.upsert_candle(Interval::FifteenSeconds, &candle, false)
            .await
            .unwrap();

        assert_eq!(repo.count(Interval::FifteenSeconds, "MNQ").await.unwrap(), 1);
        assert_eq!(repo.count(Interval::ThreeMinutes, "MNQ").await.unwrap(), 0);
        let latest = repo
            .latest_candle(Interval::FifteenSeconds, "MNQ")
            .await
            .unwrap();
        assert_eq!(latest, Some(candle));
    }

    #[tokio::test]
    async fn test_latest_and_range_queries() {
        let repo = CandleRepository::new(pool().await);
        for i in 0..4 {
            let candle = Candle::flat("MNQ", 1_700_000_010 + i * 15, 100.0 + i as f64);
            repo.upsert_candle(Interval::FifteenSeconds, &candle, i == 2)
                .await
                .unwrap();
        }

        let latest = repo
            .latest_candle(Interval::FifteenSeconds, "MNQ")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(latest.interval_start, 1_700_000_055);

        let range = repo
            .candles_between(Interval::FifteenSeconds, "MNQ", 1_700_000_025, 1_700_000_040)
            .await
            .unwrap();
        assert_eq!(range.len(), 2);
        assert_eq!(range[0].close, 101.0);
    }

    #[tokio::test]
    async fn test_execution_create_if_absent() {
        let repo = ExecutionRepository::new(pool().await);
        let key = ExecKey::from("ex_1");

        let (first, created) = repo
            .create_execution_if_absent(&key, &spec("MNQ"))
            .await
            .unwrap();
        assert!(created);
        assert_eq!(first.status, ExecutionStatus::IntentCreated);

        let (second, created) = repo
            .create_execution_if_absent(&key, &spec("MNQ"))
            .await
            .unwrap();
        assert!(!created);
        assert_eq!(first.id, second.id);
    }

    #[tokio::test]
    async fn test_update_execution_is_compare_and_swap() {
        let repo = ExecutionRepository::new(pool().await);
        let key = ExecKey::from("ex_2");
        let (record, _) = repo
            .create_execution_if_absent(&key, &spec("MNQ"))
            .await
            .unwrap();

        let submitted = ExecutionUpdate::submitted("77".to_string());
        assert!(repo
            .update_execution(record.id, ExecutionStatus::IntentCreated, &submitted)
            .await
            .unwrap());
        // status moved on, a second writer expecting INTENT_CREATED loses
        assert!(!repo
            .update_execution(
                record.id,
                ExecutionStatus::IntentCreated,
                &ExecutionUpdate::failed("late".to_string())
            )
            .await
            .unwrap());

        let stored = repo.find_execution_by_order_id("77").await.unwrap().unwrap();
        assert_eq!(stored.status, ExecutionStatus::OrderSubmitted);
        assert!(stored.error.is_none());
    }

    #[tokio::test]
    async fn test_has_open_execution() {
        let repo = ExecutionRepository::new(pool().await);
        let key = ExecKey::from("ex_3");
        let (record, _) = repo
            .create_execution_if_absent(&key, &spec("MNQ"))
            .await
            .unwrap();
        // an unconfirmed submission may already be live at the broker
        assert!(repo.has_open_execution("user-1", "MNQ").await.unwrap());

        repo.update_execution(
            record.id,
            ExecutionStatus::IntentCreated,
            &ExecutionUpdate::submitted("1".to_string()),
        )
        .await
        .unwrap();
        assert!(repo.has_open_execution("user-1", "MNQ").await.unwrap());
        assert!(!repo.has_open_execution("user-1", "MES").await.unwrap());
        assert!(!repo.has_open_execution("user-2", "MNQ").await.unwrap());

        repo.update_execution(
            record.id,
            ExecutionStatus::OrderSubmitted,
            &ExecutionUpdate::status(ExecutionStatus::OrderFilled),
        )
        .await
        .unwrap();
        repo.update_execution(
            record.id,
            ExecutionStatus::OrderFilled,
            &ExecutionUpdate::status(ExecutionStatus::PositionClosed),
        )
        .await
        .unwrap();
        assert!(!repo.has_open_execution("user-1", "MNQ").await.unwrap());

        let (failed, _) = repo
            .create_execution_if_absent(&ExecKey::from("ex_4"), &spec("MNQ"))
            .await
            .unwrap();
        repo.update_execution(
            failed.id,
            ExecutionStatus::IntentCreated,
            &ExecutionUpdate::failed("rejected".to_string()),
        )
        .await
        .unwrap();
        assert!(!repo.has_open_execution("user-1", "MNQ").await.unwrap());
    }

    #[tokio::test]
    async fn test_signal_transition_records_reason() {
        let repo = SignalRepository::new(pool().await);
        let candidate = crate::domain::entities::signal::SignalCandidate {
            symbol: "MNQ".to_string(),
            side: Side::Long,
            entry_time: 10,
            fvg_time: 5,
            entry_price: 100.0,
        };
        let mut signal = NewSignal::blocked("user-1", &candidate, BlockReason::DryRun);
        signal.status = SignalStatus::Detected;
        signal.block_reason = None;
        assert!(repo.insert_signal_if_absent(&signal).await.unwrap());

        let transition = SignalTransition {
            to: SignalStatus::Blocked,
            block_reason: Some(BlockReason::NotLiveCandle),
            exec_key: None,
        };
        assert!(repo
            .transition_signal(&signal.signal_key, SignalStatus::Detected, &transition)
            .await
            .unwrap());

        let listed = repo.list_for_user("user-1").await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].block_reason, Some(BlockReason::NotLiveCandle));
    }

    #[tokio::test]
    async fn test_trading_state_defaults_to_trading() {
        let repo = TradingStateRepository::new(pool().await);
        let state = repo.get_user_trading_state("nobody").await.unwrap();
        assert_eq!(state, TradingState::default());

        let switched = TradingState {
            is_paused: false,
            is_kill_switched: true,
        };
        repo.set_trading_state("user-1", switched).await.unwrap();
        assert_eq!(repo.get_user_trading_state("user-1").await.unwrap(), switched);
    }

    #[tokio::test]
    async fn test_risk_settings_round_trip() {
        let repo = RiskSettingsRepository::new(pool().await);
        assert!(repo.load_risk_config("user-1").await.unwrap().is_none());

        let config = RiskConfig::new(500.0, 1.5, 40, EntryType::Limit).unwrap();
        repo.save_risk_config("user-1", &config).await.unwrap();
        assert_eq!(repo.load_risk_config("user-1").await.unwrap(), Some(config));
    }
}
