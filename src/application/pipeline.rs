//! Quote-to-order pipeline
//!
//! Owns every piece of per-symbol state (quote snapshots, open candle buckets,
//! the 3-minute deriver and the strategy engine) and is driven one message at
//! a time by the pipeline actor.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use crate::application::events::{EventBus, TradingEvent};
use crate::domain::entities::candle::{Candle, ClosedCandle, Interval};
use crate::domain::entities::execution::{ExecKey, OrderSpec, OrderUpdate};
use crate::domain::entities::quote::Quote;
use crate::domain::entities::signal::{BlockReason, SignalKey};
use crate::domain::entities::trade_intent::TradeIntent;
use crate::domain::errors::PipelineError;
use crate::domain::repositories::broker_adapter::BrokerAdapter;
use crate::domain::repositories::store::{CandleStore, ExecutionStore, SignalStore};
use crate::domain::repositories::trading_state::TradingStateSource;
use crate::domain::services::candle_builder::{CandleBuilder, CandleBuilderConfig};
use crate::domain::services::candle_deriver::{CandleDeriver, CANDLES_PER_BUCKET};
use crate::domain::services::order_executor::ExecutionCoordinator;
use crate::domain::services::position_sizer::PositionSizer;
use crate::domain::services::quote_normalizer::QuoteNormalizer;
use crate::domain::services::signal_ledger::SignalLedger;
use crate::domain::services::strategy_engine::{EngineOutput, StrategyEngine};
use crate::domain::services::trade_execution_error::ExecutionError;
use crate::domain::services::trading_gate::TradingGate;
use crate::domain::value_objects::position_sizing::RiskConfig;
use crate::domain::value_objects::tick::TickSpec;

/// Static settings for one worker
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub user_id: String,
    /// Symbol used for candles and signals
    pub symbol: String,
    /// Broker contract traded for `symbol`
    pub contract_id: String,
    pub tick: TickSpec,
    pub dry_run: bool,
    /// How long after an entry candle ends its signal may still be executed
    pub live_window_ms: i64,
    /// Largest gap, in intervals, filled with flat candles
    pub max_backfill_intervals: i64,
    pub record_direction_mismatch: bool,
    pub max_quote_age_ms: i64,
    pub candles: CandleBuilderConfig,
    pub trading_state_ttl: Duration,
}

/// Store handles the pipeline writes through
#[derive(Clone)]
pub struct PipelineStores {
    pub candles: Arc<dyn CandleStore>,
    pub signals: Arc<dyn SignalStore>,
    pub executions: Arc<dyn ExecutionStore>,
    pub trading_state: Arc<dyn TradingStateSource>,
}

/// The 15s backfill horizon expressed in 3m buckets, rounded up
fn deriver_gap_buckets(max_backfill_intervals: i64) -> i64 {
    let per_bucket = i64::from(CANDLES_PER_BUCKET);
    (max_backfill_intervals.max(0) + per_bucket - 1) / per_bucket
}

pub struct TradingPipeline {
    config: PipelineConfig,
    normalizer: QuoteNormalizer,
    builder: CandleBuilder,
    deriver: CandleDeriver,
    engine: StrategyEngine,
    candles: Arc<dyn CandleStore>,
    executions: Arc<dyn ExecutionStore>,
    ledger: SignalLedger,
    coordinator: ExecutionCoordinator,
    gate: TradingGate,
    risk: watch::Receiver<RiskConfig>,
    events: EventBus,
    /// Last persisted 15s candle per symbol
    last_persisted: HashMap<String, Candle>,
}

impl TradingPipeline {
    pub fn new(
        config: PipelineConfig,
        stores: PipelineStores,
        broker: Arc<dyn BrokerAdapter>,
        risk: watch::Receiver<RiskConfig>,
        events: EventBus,
    ) -> Self {
        let engine = StrategyEngine::new(
            PositionSizer::new(config.tick),
            config.record_direction_mismatch,
        );
        let ledger = SignalLedger::new(stores.signals, config.user_id.clone());
        let coordinator = ExecutionCoordinator::new(stores.executions.clone(), broker);
        let gate = TradingGate::new(
            stores.trading_state,
            config.user_id.clone(),
            config.trading_state_ttl,
        );

        Self {
            normalizer: QuoteNormalizer::new(config.max_quote_age_ms),
            builder: CandleBuilder::new(config.candles),
            deriver: CandleDeriver::new(deriver_gap_buckets(config.max_backfill_intervals)),
            engine,
            candles: stores.candles,
            executions: stores.executions,
            ledger,
            coordinator,
            gate,
            risk,
            events,
            last_persisted: HashMap::new(),
            config,
        }
    }

    pub fn engine(&self) -> &StrategyEngine {
        &self.engine
    }

    /// Log aggregation state that stopping now discards
    pub fn log_unfinished(&self) {
        let symbol = &self.config.symbol;
        if let Some(bucket) = self.builder.open_bucket(symbol) {
            info!(
                "Discarding open 15s bucket {} for {} ({} ticks)",
                bucket.bucket_start, symbol, bucket.tick_count
            );
        }
        let pending = self.deriver.pending_count(symbol);
        if pending > 0 {
            info!(
                "Discarding {} 15s candles of the open 3m bucket for {}",
                pending, symbol
            );
        }
    }

    /// Feed one raw quote observed at `now_ms`
    pub async fn on_quote(&mut self, mut quote: Quote, now_ms: i64) -> Result<(), PipelineError> {
        if quote.instrument_id == self.config.contract_id {
            quote.instrument_id = self.config.symbol.clone();
        }

        let Some(snapshot) = self.normalizer.apply(&quote, now_ms) else {
            return Ok(());
        };
        if let Some(closed) = self.builder.ingest(&snapshot, now_ms) {
            self.on_closed_15s(closed, now_ms).await?;
        }
        Ok(())
    }

    /// Timer tick: close quiet buckets while the market is live
    pub async fn on_tick(&mut self, now_ms: i64) -> Result<(), PipelineError> {
        for closed in self.builder.force_close_if_due(now_ms) {
            self.on_closed_15s(closed, now_ms).await?;
        }
        Ok(())
    }

    /// Apply a broker order event to its execution
    pub async fn on_order_update(&mut self, update: &OrderUpdate) -> Result<(), PipelineError> {
        if let Some(record) = self.coordinator.apply_order_update(update).await? {
            self.events.publish(TradingEvent::ExecutionUpdated {
                exec_key: record.exec_key.to_string(),
                status: record.status,
            });
        }
        Ok(())
    }

    async fn on_closed_15s(&mut self, closed: ClosedCandle, now_ms: i64) -> Result<(), PipelineError> {
        let tradable = closed.is_tradable();
        self.events.publish(TradingEvent::CandleClosed {
            interval: Interval::FifteenSeconds,
            candle: closed.candle.clone(),
            tradable,
            backfill: false,
        });
        if !tradable {
            debug!(
                "Skipping non-tradable 15s candle {} @ {} ({} ticks, forced={})",
                closed.candle.symbol, closed.candle.interval_start, closed.tick_count, closed.forced
            );
            return Ok(());
        }

        let candle = closed.candle;
        let fillers = self.backfill_before(&candle).await?;
        self.candles
            .upsert_candle(Interval::FifteenSeconds, &candle, false)
            .await?;
        self.last_persisted
            .insert(candle.symbol.clone(), candle.clone());

        for filler in &fillers {
            self.derive(filler).await?;
        }
        self.derive(&candle).await?;

        let risk = self.risk.borrow().clone();
        match self.engine.on_15s_close(&candle, &risk) {
            Some(EngineOutput::Intent(intent)) => self.process_intent(intent, &risk, now_ms).await,
            Some(EngineOutput::NearMiss { candidate, reason }) => {
                let (key, inserted) = self.ledger.record_blocked(&candidate, reason.clone()).await?;
                if inserted {
                    self.publish_blocked(&key, &reason);
                }
                Ok(())
            }
            None => Ok(()),
        }
    }

    /// Persist flat candles for any 15s intervals missing before `candle`
    async fn backfill_before(&mut self, candle: &Candle) -> Result<Vec<Candle>, PipelineError> {
        let previous = match self.last_persisted.get(&candle.symbol) {
            Some(previous) => Some(previous.clone()),
            None => {
                self.candles
                    .latest_candle(Interval::FifteenSeconds, &candle.symbol)
                    .await?
            }
        };
        let Some(previous) = previous else {
            return Ok(Vec::new());
        };

        let step = Interval::FifteenSeconds.seconds();
        let missing = (candle.interval_start - previous.interval_start) / step - 1;
        if missing <= 0 {
            return Ok(Vec::new());
        }
        if missing > self.config.max_backfill_intervals {
            warn!(
                "Discontinuity in 15s series for {}: {} intervals missing after {}, not backfilling",
                candle.symbol, missing, previous.interval_start
            );
            return Ok(Vec::new());
        }

        info!(
            "Backfilling {} flat 15s candles for {} after {}",
            missing, candle.symbol, previous.interval_start
        );
        let mut fillers = Vec::with_capacity(missing as usize);
        for k in 1..=missing {
            let filler = Candle::flat(
                candle.symbol.clone(),
                previous.interval_start + k * step,
                previous.close,
            );
            self.candles
                .upsert_candle(Interval::FifteenSeconds, &filler, true)
                .await?;
            self.events.publish(TradingEvent::CandleClosed {
                interval: Interval::FifteenSeconds,
                candle: filler.clone(),
                tradable: false,
                backfill: true,
            });
            fillers.push(filler);
        }
        Ok(fillers)
    }

    async fn derive(&mut self, candle: &Candle) -> Result<(), PipelineError> {
        for bar in self.deriver.on_closed_15s(candle) {
            self.candles
                .upsert_candle(Interval::ThreeMinutes, &bar, false)
                .await?;
            self.events.publish(TradingEvent::CandleClosed {
                interval: Interval::ThreeMinutes,
                candle: bar.clone(),
                tradable: true,
                backfill: false,
            });
            self.engine.on_3m_close(&bar);
        }
        Ok(())
    }

    async fn process_intent(
        &mut self,
        intent: TradeIntent,
        risk: &RiskConfig,
        now_ms: i64,
    ) -> Result<(), PipelineError> {
        let (key, inserted) = self.ledger.record_detected(&intent).await?;
        if !inserted {
            return Ok(());
        }
        self.events.publish(TradingEvent::SignalDetected {
            signal_key: key.to_string(),
            intent: intent.clone(),
        });

        if let Some(reason) = self.blocking_reason(&intent, now_ms).await? {
            if self.ledger.mark_blocked(&key, reason.clone()).await? {
                self.publish_blocked(&key, &reason);
            }
            return Ok(());
        }

        let exec_key = ExecKey::for_signal(&key);
        let spec = OrderSpec {
            user_id: self.config.user_id.clone(),
            broker: self.coordinator.broker_name().to_string(),
            contract_id: self.config.contract_id.clone(),
            side: intent.side,
            qty: intent.contracts,
            entry_type: risk.entry_type,
            stop_loss_ticks: intent.stop_ticks,
            take_profit_ticks: intent.tp_ticks,
            signal_key: Some(key.clone()),
        };

        match self.coordinator.execute_tracked(&exec_key, &spec).await {
            Ok((record, true)) => {
                self.events.publish(TradingEvent::ExecutionSubmitted {
                    exec_key: exec_key.to_string(),
                    order_id: record.entry_order_id.clone(),
                });
                if self.ledger.mark_taken(&key, &exec_key).await? {
                    self.events.publish(TradingEvent::SignalTaken {
                        signal_key: key.to_string(),
                        exec_key: exec_key.to_string(),
                    });
                }
                if !self.engine.mark_traded(&intent.symbol, intent.fvg_time) {
                    debug!(
                        "Box from {} replaced before its order was confirmed",
                        intent.fvg_time
                    );
                }
                Ok(())
            }
            Ok((_, false)) => {
                if self.ledger.mark_blocked(&key, BlockReason::Duplicate).await? {
                    self.publish_blocked(&key, &BlockReason::Duplicate);
                }
                Ok(())
            }
            Err(ExecutionError::Store(e)) => Err(PipelineError::Store(e)),
            Err(e) => {
                error!(
                    "[{}] Execution for signal {} failed (recoverable: {}): {}",
                    e.error_code(),
                    key,
                    e.is_recoverable(),
                    e
                );
                self.events.publish(TradingEvent::ExecutionFailed {
                    exec_key: exec_key.to_string(),
                    error_code: e.error_code().to_string(),
                    error: e.to_string(),
                });
                if self
                    .ledger
                    .mark_blocked(&key, BlockReason::ExecutionFailed)
                    .await?
                {
                    self.publish_blocked(&key, &BlockReason::ExecutionFailed);
                }
                Ok(())
            }
        }
    }

    /// First policy check that stops this intent, in priority order
    async fn blocking_reason(
        &self,
        intent: &TradeIntent,
        now_ms: i64,
    ) -> Result<Option<BlockReason>, PipelineError> {
        let state = self.gate.current().await;
        if state.is_kill_switched {
            return Ok(Some(BlockReason::KillSwitch));
        }
        if state.is_paused {
            return Ok(Some(BlockReason::Paused));
        }
        if self.config.dry_run {
            return Ok(Some(BlockReason::DryRun));
        }

        let candle_end_ms = (intent.entry_time + Interval::FifteenSeconds.seconds()) * 1000;
        if now_ms - candle_end_ms > self.config.live_window_ms {
            return Ok(Some(BlockReason::NotLiveCandle));
        }
        if !intent.has_valid_bracket() {
            return Ok(Some(BlockReason::InvalidBracket));
        }
        if self
            .executions
            .has_open_execution(&self.config.user_id, &self.config.contract_id)
            .await?
        {
            return Ok(Some(BlockReason::InTrade));
        }
        Ok(None)
    }

    fn publish_blocked(&self, key: &SignalKey, reason: &BlockReason) {
        self.events.publish(TradingEvent::SignalBlocked {
            signal_key: key.to_string(),
            reason: reason.to_string(),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::entities::order::Side;
    use crate::domain::entities::signal::SignalStatus;
    use crate::domain::repositories::trading_state::TradingState;
    use crate::infrastructure::replay_broker::ReplayBroker;
    use crate::persistence::init_database;
    use crate::persistence::repository::{
        CandleRepository, ExecutionRepository, SignalRepository, TradingStateRepository,
    };

    const T0: i64 = 1_700_000_100;

    struct Harness {
        pipeline: TradingPipeline,
        candles: Arc<CandleRepository>,
        signals: Arc<SignalRepository>,
        state: Arc<TradingStateRepository>,
        _risk_tx: watch::Sender<RiskConfig>,
    }

    fn config(dry_run: bool) -> PipelineConfig {
        PipelineConfig {
            user_id: "user-1".to_string(),
            symbol: "MNQ".to_string(),
            contract_id: "CON.F.US.MNQ.Z25".to_string(),
            tick: TickSpec::new(0.25, 0.5).unwrap(),
            dry_run,
            live_window_ms: 15_000,
            max_backfill_intervals: 240,
            record_direction_mismatch: false,
            max_quote_age_ms: 15_000,
            candles: CandleBuilderConfig::default(),
            trading_state_ttl: Duration::ZERO,
        }
    }

    async fn harness(dry_run: bool) -> Harness {
        harness_with(config(dry_run)).await
    }

    async fn harness_with(config: PipelineConfig) -> Harness {
        let pool = init_database("sqlite::memory:").await.unwrap();
        let candles = Arc::new(CandleRepository::new(pool.clone()));
        let signals = Arc::new(SignalRepository::new(pool.clone()));
        let state = Arc::new(TradingStateRepository::new(pool.clone()));
        let stores = PipelineStores {
            candles: candles.clone(),
            signals: signals.clone(),
            executions: Arc::new(ExecutionRepository::new(pool)),
            trading_state: state.clone(),
        };
        let (risk_tx, risk_rx) = watch::channel(RiskConfig::default());
        let pipeline = TradingPipeline::new(
            config,
            stores,
            Arc::new(ReplayBroker::paper("replay")),
            risk_rx,
            EventBus::default(),
        );
        Harness {
            pipeline,
            candles,
            signals,
            state,
            _risk_tx: risk_tx,
        }
    }

    /// Four quotes inside the 15s bucket starting at `t`
    async fn feed_bar(pipeline: &mut TradingPipeline, t: i64, ohlc: [f64; 4]) {
        for (i, price) in ohlc.iter().enumerate() {
            let at = (t + 1 + i as i64) * 1000;
            pipeline
                .on_quote(Quote::last_trade("CON.F.US.MNQ.Z25", *price, at), at)
                .await
                .unwrap();
        }
    }

    #[test]
    fn test_deriver_gap_rounds_up_to_whole_buckets() {
        assert_eq!(deriver_gap_buckets(240), 20);
        assert_eq!(deriver_gap_buckets(241), 21);
        assert_eq!(deriver_gap_buckets(1), 1);
        assert_eq!(deriver_gap_buckets(11), 1);
        assert_eq!(deriver_gap_buckets(0), 0);
    }

    #[tokio::test]
    async fn test_quotes_become_persisted_candles() {
        let mut h = harness(false).await;
        feed_bar(&mut h.pipeline, T0, [100.0, 101.0, 99.5, 100.5]).await;
        feed_bar(&mut h.pipeline, T0 + 15, [100.5, 100.75, 100.25, 100.5]).await;

        let stored = h
            .candles
            .latest_candle(Interval::FifteenSeconds, "MNQ")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored, Candle::new("MNQ", T0, 100.0, 101.0, 99.5, 100.5));
    }

    #[tokio::test]
    async fn test_gap_is_backfilled_with_flat_candles() {
        let mut h = harness(false).await;
        feed_bar(&mut h.pipeline, T0, [100.0, 101.0, 99.5, 100.5]).await;
        feed_bar(&mut h.pipeline, T0 + 15, [100.5, 100.75, 100.25, 100.25]).await;
        // nothing traded for three intervals
        feed_bar(&mut h.pipeline, T0 + 75, [102.0, 102.5, 101.5, 102.0]).await;
        feed_bar(&mut h.pipeline, T0 + 90, [102.0, 102.0, 102.0, 102.0]).await;

        let stored = h
            .candles
            .candles_between(Interval::FifteenSeconds, "MNQ", T0, T0 + 75)
            .await
            .unwrap();
        let starts: Vec<i64> = stored.iter().map(|c| c.interval_start).collect();
        assert_eq!(starts, vec![T0, T0 + 15, T0 + 30, T0 + 45, T0 + 60, T0 + 75]);
        assert_eq!(stored[2], Candle::flat("MNQ", T0 + 30, 100.25));
    }

    #[tokio::test]
    async fn test_forced_close_is_not_persisted() {
        let mut h = harness(false).await;
        feed_bar(&mut h.pipeline, T0, [100.0, 101.0, 99.5, 100.5]).await;
        h.pipeline.on_tick((T0 + 17) * 1000).await.unwrap();
        assert!(h
            .candles
            .latest_candle(Interval::FifteenSeconds, "MNQ")
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_dry_run_blocks_detected_signal() {
        let mut h = harness(true).await;
        drive_to_long_entry(&mut h.pipeline).await;

        let signals = h.signals.list_for_user("user-1").await.unwrap();
        assert_eq!(signals.len(), 1);
        assert_eq!(signals[0].side, Side::Long);
        assert_eq!(signals[0].status, SignalStatus::Blocked);
        assert_eq!(signals[0].block_reason, Some(BlockReason::DryRun));
    }

    #[tokio::test]
    async fn test_kill_switch_outranks_dry_run() {
        let mut h = harness(true).await;
        h.state
            .set_trading_state(
                "user-1",
                TradingState {
                    is_paused: true,
                    is_kill_switched: true,
                },
            )
            .await
            .unwrap();
        drive_to_long_entry(&mut h.pipeline).await;

        let signals = h.signals.list_for_user("user-1").await.unwrap();
        assert_eq!(signals[0].block_reason, Some(BlockReason::KillSwitch));
    }

    #[tokio::test]
    async fn test_live_entry_is_taken() {
        let mut h = harness(false).await;
        let mut events = h.pipeline.events.subscribe();
        drive_to_long_entry(&mut h.pipeline).await;

        let signals = h.signals.list_for_user("user-1").await.unwrap();
        assert_eq!(signals[0].status, SignalStatus::Taken);
        assert!(signals[0].exec_key.is_some());
        assert!(h.pipeline.engine().active_box("MNQ").unwrap().traded);

        let mut saw_submitted = false;
        while let Ok(event) = events.try_recv() {
            if matches!(event, TradingEvent::ExecutionSubmitted { .. }) {
                saw_submitted = true;
            }
        }
        assert!(saw_submitted);
    }

    #[tokio::test]
    async fn test_inverted_bracket_is_blocked_before_submission() {
        let mut h = harness(false).await;
        let intent = TradeIntent {
            symbol: "MNQ".to_string(),
            side: Side::Long,
            entry_time: T0 + 540,
            fvg_time: T0 + 360,
            entry_price: 104.0,
            stop_price: 104.0,
            take_profit_price: 104.0,
            stop_ticks: 0,
            tp_ticks: 0,
            rr: 2.0,
            contracts: 1,
            risk_usd_planned: 0.0,
        };
        let now_ms = (T0 + 556) * 1000;
        h.pipeline
            .process_intent(intent, &RiskConfig::default(), now_ms)
            .await
            .unwrap();

        let signals = h.signals.list_for_user("user-1").await.unwrap();
        assert_eq!(signals.len(), 1);
        assert_eq!(signals[0].status, SignalStatus::Blocked);
        assert_eq!(signals[0].block_reason, Some(BlockReason::InvalidBracket));
        assert!(signals[0].exec_key.is_none());
        assert!(!h
            .pipeline
            .executions
            .has_open_execution("user-1", "CON.F.US.MNQ.Z25")
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn test_expansion_against_the_box_leaves_no_signal() {
        let mut h = harness(false).await;
        drive_to_short_expansion(&mut h.pipeline).await;

        assert!(h.signals.list_for_user("user-1").await.unwrap().is_empty());
        assert!(!h.pipeline.engine().active_box("MNQ").unwrap().traded);
    }

    #[tokio::test]
    async fn test_expansion_against_the_box_can_be_recorded() {
        let mut h = harness_with(PipelineConfig {
            record_direction_mismatch: true,
            ..config(false)
        })
        .await;
        drive_to_short_expansion(&mut h.pipeline).await;

        // the highs at 555 and 570 each sit below the low two candles earlier
        let signals = h.signals.list_for_user("user-1").await.unwrap();
        let mut entry_times: Vec<i64> = signals.iter().map(|s| s.entry_time).collect();
        entry_times.sort_unstable();
        assert_eq!(entry_times, vec![T0 + 555, T0 + 570]);
        assert!(signals.iter().all(|s| s.side == Side::Short
            && s.status == SignalStatus::Blocked
            && s.block_reason == Some(BlockReason::DirectionMismatch)));
    }

    async fn form_long_box(pipeline: &mut TradingPipeline) -> i64 {
        let bars_3m = [
            [98.0, 100.0, 97.0, 99.0],
            [99.0, 106.0, 99.0, 105.0],
            [105.0, 108.0, 104.0, 107.0],
        ];
        let mut t = T0;
        for ohlc in bars_3m {
            for _ in 0..12 {
                feed_bar(pipeline, t, ohlc).await;
                t += 15;
            }
        }
        t
    }

    /// A retest of the long box followed by three falling candles.
    async fn drive_to_short_expansion(pipeline: &mut TradingPipeline) {
        let t = form_long_box(pipeline).await;
        feed_bar(pipeline, t, [102.5, 103.0, 102.0, 102.75]).await;
        feed_bar(pipeline, t + 15, [102.0, 102.5, 101.5, 102.0]).await;
        feed_bar(pipeline, t + 30, [101.0, 101.5, 100.5, 101.0]).await;
        // opens the next bucket, closing the expansion candle only
        let at = (t + 46) * 1000;
        pipeline
            .on_quote(Quote::last_trade("CON.F.US.MNQ.Z25", 101.0, at), at)
            .await
            .unwrap();
    }

    /// 3m bars leave a long box in [100, 104], then a retest and a long expansion.
    async fn drive_to_long_entry(pipeline: &mut TradingPipeline) {
        let bars_3m = [
            [98.0, 100.0, 97.0, 99.0],
            [99.0, 106.0, 99.0, 105.0],
            [105.0, 108.0, 104.0, 107.0],
        ];
        let mut t = T0;
        for ohlc in bars_3m {
            for _ in 0..12 {
                feed_bar(pipeline, t, ohlc).await;
                t += 15;
            }
        }
        feed_bar(pipeline, t, [102.5, 103.0, 102.0, 102.75]).await;
        feed_bar(pipeline, t + 15, [102.75, 103.25, 101.0, 103.0]).await;
        feed_bar(pipeline, t + 30, [103.5, 104.5, 103.5, 104.0]).await;
        // the next bucket's first quote closes the entry candle
        feed_bar(pipeline, t + 45, [104.0, 104.0, 104.0, 104.0]).await;
    }
}
