//! Persistence traits the core depends on.
//!
//! Every keyed write is a single atomic store operation: inserts are
//! create-if-absent and status changes are compare-and-swap on the current
//! status. Callers never read a row and then decide whether to write it.

use async_trait::async_trait;

use crate::domain::entities::candle::{Candle, Interval};
use crate::domain::entities::execution::{
    ExecKey, ExecutionRecord, ExecutionStatus, ExecutionUpdate, OrderSpec,
};
use crate::domain::entities::signal::{BlockReason, NewSignal, SignalKey, SignalRecord, SignalStatus};
use crate::domain::errors::StoreError;

pub type StoreResult<T> = Result<T, StoreError>;

#[async_trait]
pub trait CandleStore: Send + Sync {
    /// Insert or overwrite the row for `(interval, symbol, interval_start)`.
    async fn upsert_candle(
        &self,
        interval: Interval,
        candle: &Candle,
        backfill: bool,
    ) -> StoreResult<()>;

    /// Most recent persisted candle for a symbol.
    async fn latest_candle(&self, interval: Interval, symbol: &str)
        -> StoreResult<Option<Candle>>;

    /// Candles in `[from, to]`, oldest first.
    async fn candles_between(
        &self,
        interval: Interval,
        symbol: &str,
        from: i64,
        to: i64,
    ) -> StoreResult<Vec<Candle>>;
}

/// Status change applied to a signal row.
#[derive(Debug, Clone, PartialEq)]
pub struct SignalTransition {
    pub to: SignalStatus,
    pub block_reason: Option<BlockReason>,
    pub exec_key: Option<ExecKey>,
}

#[async_trait]
pub trait SignalStore: Send + Sync {
    /// Insert the row unless the key exists. Returns whether a row was inserted.
    async fn insert_signal_if_absent(&self, signal: &NewSignal) -> StoreResult<bool>;

    /// Apply `transition` only if the row is currently in `from`. Returns whether it applied.
    async fn transition_signal(
        &self,
        key: &SignalKey,
        from: SignalStatus,
        transition: &SignalTransition,
    ) -> StoreResult<bool>;

    async fn find_signal(&self, key: &SignalKey) -> StoreResult<Option<SignalRecord>>;
}

#[async_trait]
pub trait ExecutionStore: Send + Sync {
    /// Create an `INTENT_CREATED` row unless the key exists.
    ///
    /// Returns the row now stored under the key and whether this call created it.
    async fn create_execution_if_absent(
        &self,
        exec_key: &ExecKey,
        spec: &OrderSpec,
    ) -> StoreResult<(ExecutionRecord, bool)>;

    async fn find_execution_by_key(&self, exec_key: &ExecKey)
        -> StoreResult<Option<ExecutionRecord>>;

    async fn find_execution_by_order_id(
        &self,
        order_id: &str,
    ) -> StoreResult<Option<ExecutionRecord>>;

    /// Apply `update` to row `id` only if its status is still `expected`.
    async fn update_execution(
        &self,
        id: i64,
        expected: ExecutionStatus,
        update: &ExecutionUpdate,
    ) -> StoreResult<bool>;

    /// Is any execution for this user and contract live, or possibly live, at the broker?
    async fn has_open_execution(&self, user_id: &str, contract_id: &str) -> StoreResult<bool>;
}
