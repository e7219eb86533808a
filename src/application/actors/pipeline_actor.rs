//! Pipeline Actor
//!
//! Owns the [`TradingPipeline`] and feeds it one message at a time, so candle
//! aggregation, strategy state and gating never race each other. Quotes,
//! timer ticks and broker order events all arrive through the same inbox.

use chrono::Utc;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

use crate::application::pipeline::TradingPipeline;
use crate::domain::entities::execution::OrderUpdate;
use crate::domain::entities::quote::Quote;

const INBOX_CAPACITY: usize = 1024;

/// Messages that can be sent to the pipeline actor
#[derive(Debug)]
pub enum PipelineMessage {
    /// Raw quote from the broker feed
    Quote(Quote),
    /// Timer tick for quiet-market candle closes
    Tick,
    /// Broker order lifecycle event
    OrderUpdate(OrderUpdate),
    /// Counters since start
    GetStats {
        reply: oneshot::Sender<PipelineStats>,
    },
    /// Drain and stop
    Shutdown,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct PipelineStats {
    pub quotes: u64,
    pub ticks: u64,
    pub order_updates: u64,
    pub errors: u64,
}

pub struct PipelineActor {
    pipeline: TradingPipeline,
    stats: PipelineStats,
}

impl PipelineActor {
    /// Spawn the actor
    ///
    /// # Returns
    /// Inbox sender and the task handle, which completes after `Shutdown`
    /// or once every sender is dropped
    pub fn spawn(pipeline: TradingPipeline) -> (mpsc::Sender<PipelineMessage>, JoinHandle<()>) {
        let (tx, rx) = mpsc::channel(INBOX_CAPACITY);
        let actor = Self {
            pipeline,
            stats: PipelineStats::default(),
        };
        let handle = tokio::spawn(actor.run(rx));
        info!("PipelineActor spawned");
        (tx, handle)
    }

    async fn run(mut self, mut rx: mpsc::Receiver<PipelineMessage>) {
        info!("PipelineActor started");

        while let Some(msg) = rx.recv().await {
            let now_ms = Utc::now().timestamp_millis();
            let result = match msg {
                PipelineMessage::Quote(quote) => {
                    self.stats.quotes += 1;
                    self.pipeline.on_quote(quote, now_ms).await
                }
                PipelineMessage::Tick => {
                    self.stats.ticks += 1;
                    self.pipeline.on_tick(now_ms).await
                }
                PipelineMessage::OrderUpdate(update) => {
                    self.stats.order_updates += 1;
                    self.pipeline.on_order_update(&update).await
                }
                PipelineMessage::GetStats { reply } => {
                    if reply.send(self.stats.clone()).is_err() {
                        debug!("Stats requester went away");
                    }
                    Ok(())
                }
                PipelineMessage::Shutdown => {
                    info!("PipelineActor shutting down");
                    break;
                }
            };

            // one bad message must not stop the stream
            if let Err(e) = result {
                self.stats.errors += 1;
                error!("Pipeline error: {}", e);
            }
        }

        self.pipeline.log_unfinished();
        info!(
            "PipelineActor stopped after {} quotes, {} ticks, {} order updates, {} errors",
            self.stats.quotes, self.stats.ticks, self.stats.order_updates, self.stats.errors
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::events::{EventBus, TradingEvent};
    use crate::application::pipeline::{PipelineConfig, PipelineStores};
    use crate::domain::services::candle_builder::CandleBuilderConfig;
    use crate::domain::value_objects::position_sizing::RiskConfig;
    use crate::domain::value_objects::tick::TickSpec;
    use crate::infrastructure::replay_broker::ReplayBroker;
    use crate::persistence::init_database;
    use crate::persistence::repository::{
        CandleRepository, ExecutionRepository, SignalRepository, TradingStateRepository,
    };
    use std::sync::Arc;
    use std::time::Duration;
    use tokio::sync::watch;

    async fn pipeline(events: EventBus) -> (TradingPipeline, watch::Sender<RiskConfig>) {
        let pool = init_database("sqlite::memory:").await.unwrap();
        let stores = PipelineStores {
            candles: Arc::new(CandleRepository::new(pool.clone())),
            signals: Arc::new(SignalRepository::new(pool.clone())),
            executions: Arc::new(ExecutionRepository::new(pool.clone())),
            trading_state: Arc::new(TradingStateRepository::new(pool)),
        };
        let config = PipelineConfig {
            user_id: "user-1".to_string(),
            symbol: "MNQ".to_string(),
            contract_id: "MNQ".to_string(),
            tick: TickSpec::new(0.25, 0.5).unwrap(),
            dry_run: true,
            live_window_ms: 15_000,
            max_backfill_intervals: 240,
            record_direction_mismatch: false,
            max_quote_age_ms: 15_000,
            candles: CandleBuilderConfig::default(),
            trading_state_ttl: Duration::from_secs(5),
        };
        let (risk_tx, risk_rx) = watch::channel(RiskConfig::default());
        let pipeline = TradingPipeline::new(
            config,
            stores,
            Arc::new(ReplayBroker::paper("replay")),
            risk_rx,
            events,
        );
        (pipeline, risk_tx)
    }

    async fn stats(tx: &mpsc::Sender<PipelineMessage>) -> PipelineStats {
        let (reply, rx) = oneshot::channel();
        tx.send(PipelineMessage::GetStats { reply }).await.unwrap();
        rx.await.unwrap()
    }

    #[tokio::test]
    async fn test_messages_are_counted() {
        let (pipeline, _risk) = pipeline(EventBus::default()).await;
        let (tx, handle) = PipelineActor::spawn(pipeline);

        let now = Utc::now().timestamp_millis();
        tx.send(PipelineMessage::Quote(Quote::last_trade("MNQ", 100.0, now)))
            .await
            .unwrap();
        tx.send(PipelineMessage::Tick).await.unwrap();

        let stats = stats(&tx).await;
        assert_eq!(stats.quotes, 1);
        assert_eq!(stats.ticks, 1);
        assert_eq!(stats.errors, 0);

        tx.send(PipelineMessage::Shutdown).await.unwrap();
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn test_stops_when_senders_drop() {
        let (pipeline, _risk) = pipeline(EventBus::default()).await;
        let (tx, handle) = PipelineActor::spawn(pipeline);
        drop(tx);
        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .unwrap()
            .unwrap();
    }

    #[tokio::test]
    async fn test_unknown_order_update_is_not_an_error() {
        let events = EventBus::default();
        let mut rx = events.subscribe();
        let (pipeline, _risk) = pipeline(events).await;
        let (tx, _handle) = PipelineActor::spawn(pipeline);

        tx.send(PipelineMessage::OrderUpdate(OrderUpdate {
            custom_tag: Some("ex_missing".to_string()),
            order_id: None,
            kind: crate::domain::entities::execution::OrderEventKind::Filled,
        }))
        .await
        .unwrap();

        let stats = stats(&tx).await;
        assert_eq!(stats.order_updates, 1);
        assert_eq!(stats.errors, 0);
        assert!(!matches!(
            rx.try_recv(),
            Ok(TradingEvent::ExecutionUpdated { .. })
        ));
    }
}
