//! Signal ledger: the durable record of every trading decision.
//!
//! All writes are keyed by [`SignalKey`] and idempotent. A signal is inserted
//! once and then moves out of `DETECTED` at most once.

use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::domain::entities::execution::ExecKey;
use crate::domain::entities::signal::{
    BlockReason, NewSignal, SignalCandidate, SignalKey, SignalStatus,
};
use crate::domain::entities::trade_intent::TradeIntent;
use crate::domain::repositories::store::{SignalStore, SignalTransition, StoreResult};

pub struct SignalLedger {
    store: Arc<dyn SignalStore>,
    user_id: String,
}

impl SignalLedger {
    pub fn new(store: Arc<dyn SignalStore>, user_id: impl Into<String>) -> Self {
        Self {
            store,
            user_id: user_id.into(),
        }
    }

    /// Record a sized intent as `DETECTED`.
    ///
    /// Returns the key and whether this call inserted it. A key that already
    /// exists, in any status, is left untouched.
    pub async fn record_detected(&self, intent: &TradeIntent) -> StoreResult<(SignalKey, bool)> {
        let signal = NewSignal::detected(&self.user_id, intent);
        let inserted = self.store.insert_signal_if_absent(&signal).await?;
        if inserted {
            info!(
                "Signal {} detected: {} {} @ {} ({} contracts)",
                signal.signal_key, intent.symbol, intent.side, intent.entry_price, intent.contracts
            );
        } else {
            debug!("Signal {} already recorded", signal.signal_key);
        }
        Ok((signal.signal_key, inserted))
    }

    /// Record a candidate that never became an intent directly as `BLOCKED`.
    pub async fn record_blocked(
        &self,
        candidate: &SignalCandidate,
        reason: BlockReason,
    ) -> StoreResult<(SignalKey, bool)> {
        let signal = NewSignal::blocked(&self.user_id, candidate, reason.clone());
        let inserted = self.store.insert_signal_if_absent(&signal).await?;
        if inserted {
            warn!(
                "Signal {} blocked at detection: {}",
                signal.signal_key, reason
            );
        }
        Ok((signal.signal_key, inserted))
    }

    /// Move a `DETECTED` signal to `BLOCKED`. Returns whether it applied.
    pub async fn mark_blocked(&self, key: &SignalKey, reason: BlockReason) -> StoreResult<bool> {
        let transition = SignalTransition {
            to: SignalStatus::Blocked,
            block_reason: Some(reason.clone()),
            exec_key: None,
        };
        let applied = self
            .store
            .transition_signal(key, SignalStatus::Detected, &transition)
            .await?;
        if applied {
            warn!("Signal {} blocked: {}", key, reason);
        } else {
            debug!("Signal {} not in DETECTED, block {} ignored", key, reason);
        }
        Ok(applied)
    }

    /// Move a `DETECTED` signal to `TAKEN`. Returns whether it applied.
    pub async fn mark_taken(&self, key: &SignalKey, exec_key: &ExecKey) -> StoreResult<bool> {
        let transition = SignalTransition {
            to: SignalStatus::Taken,
            block_reason: None,
            exec_key: Some(exec_key.clone()),
        };
        let applied = self
            .store
            .transition_signal(key, SignalStatus::Detected, &transition)
            .await?;
        if applied {
            info!("Signal {} taken as {}", key, exec_key);
        }
        Ok(applied)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::entities::order::Side;
    use crate::persistence::init_database;
    use crate::persistence::repository::SignalRepository;

    fn intent(entry_time: i64) -> TradeIntent {
        TradeIntent {
            symbol: "MNQ".to_string(),
            side: Side::Long,
            entry_time,
            fvg_time: 1_700_000_460,
            entry_price: 104.0,
            stop_price: 101.0,
            take_profit_price: 110.0,
            stop_ticks: 12,
            tp_ticks: 24,
            rr: 2.0,
            contracts: 20,
            risk_usd_planned: 240.0,
        }
    }

    async fn ledger() -> (SignalLedger, Arc<SignalRepository>) {
        let pool = init_database("sqlite::memory:").await.unwrap();
        let repo = Arc::new(SignalRepository::new(pool));
        (SignalLedger::new(repo.clone(), "user-1"), repo)
    }

    #[tokio::test]
    async fn test_record_detected_is_insert_if_absent() {
        let (ledger, _) = ledger().await;
        let (key, inserted) = ledger.record_detected(&intent(1_700_000_670)).await.unwrap();
        assert!(inserted);
        let (again, inserted) = ledger.record_detected(&intent(1_700_000_670)).await.unwrap();
        assert_eq!(key, again);
        assert!(!inserted);
    }

    #[tokio::test]
    async fn test_blocked_signal_is_not_resurrected() {
        let (ledger, repo) = ledger().await;
        let (key, _) = ledger.record_detected(&intent(1_700_000_670)).await.unwrap();
        assert!(ledger.mark_blocked(&key, BlockReason::KillSwitch).await.unwrap());

        let (_, inserted) = ledger.record_detected(&intent(1_700_000_670)).await.unwrap();
        assert!(!inserted);

        let record = repo.find_signal(&key).await.unwrap().unwrap();
        assert_eq!(record.status, SignalStatus::Blocked);
        assert_eq!(record.block_reason, Some(BlockReason::KillSwitch));
    }

    #[tokio::test]
    async fn test_transitions_out_of_detected_happen_once() {
        let (ledger, repo) = ledger().await;
        let (key, _) = ledger.record_detected(&intent(1_700_000_670)).await.unwrap();
        let exec_key = ExecKey::for_signal(&key);

        assert!(ledger.mark_taken(&key, &exec_key).await.unwrap());
        assert!(!ledger.mark_blocked(&key, BlockReason::InTrade).await.unwrap());
        assert!(!ledger.mark_taken(&key, &exec_key).await.unwrap());

        let record = repo.find_signal(&key).await.unwrap().unwrap();
        assert_eq!(record.status, SignalStatus::Taken);
        assert_eq!(record.exec_key.as_deref(), Some(exec_key.as_str()));
        assert!(record.block_reason.is_none());
    }

    #[tokio::test]
    async fn test_record_blocked_candidate() {
        let (ledger, repo) = ledger().await;
        let candidate = SignalCandidate {
            symbol: "MNQ".to_string(),
            side: Side::Short,
            entry_time: 1_700_000_670,
            fvg_time: 1_700_000_460,
            entry_price: 101.0,
        };
        let (key, inserted) = ledger
            .record_blocked(&candidate, BlockReason::DirectionMismatch)
            .await
            .unwrap();
        assert!(inserted);

        let record = repo.find_signal(&key).await.unwrap().unwrap();
        assert_eq!(record.status, SignalStatus::Blocked);
        assert_eq!(record.block_reason, Some(BlockReason::DirectionMismatch));
        assert!(record.stop_ticks.is_none());
    }
}
