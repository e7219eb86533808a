use std::sync::Arc;
use std::time::Duration;

use imbalance_trader::application::actors::{ConfigReloader, PipelineActor, PipelineMessage};
use imbalance_trader::application::events::{EventBus, TradingEvent};
use imbalance_trader::application::pipeline::{PipelineStores, TradingPipeline};
use imbalance_trader::config::WorkerConfig;
use imbalance_trader::domain::repositories::broker_adapter::BrokerAdapter;
use imbalance_trader::domain::repositories::trading_state::SettingsSource;
use imbalance_trader::infrastructure::replay_broker::ReplayBroker;
use imbalance_trader::persistence::init_database_with;
use imbalance_trader::persistence::repository::{
    CandleRepository, ExecutionRepository, RiskSettingsRepository, SignalRepository,
    TradingStateRepository,
};
use imbalance_trader::task_runner::BackoffConfig;
use tokio::sync::{mpsc, watch};
use tracing::{debug, error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const TICK_PERIOD: Duration = Duration::from_secs(1);

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();

    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "imbalance_trader=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = WorkerConfig::from_env()?;
    info!(
        "Imbalance retest worker starting for {} on {} ({}), broker {}, dry run: {}",
        config.user_id, config.symbol, config.contract_id, config.broker_name, config.dry_run
    );

    let pool = init_database_with(&config.database).await?;
    let settings = Arc::new(RiskSettingsRepository::new(pool.clone()));
    let stores = PipelineStores {
        candles: Arc::new(CandleRepository::new(pool.clone())),
        signals: Arc::new(SignalRepository::new(pool.clone())),
        executions: Arc::new(ExecutionRepository::new(pool.clone())),
        trading_state: Arc::new(TradingStateRepository::new(pool.clone())),
    };

    // Saved settings win over the environment defaults from the first candle on
    let initial_risk = match settings.load_risk_config(&config.user_id).await {
        Ok(Some(saved)) => saved,
        Ok(None) => config.risk.clone(),
        Err(e) => {
            warn!("Could not load saved risk settings, using environment: {}", e);
            config.risk.clone()
        }
    };
    info!("Risk settings: {:?}", initial_risk);
    let (risk_tx, risk_rx) = watch::channel(initial_risk);

    let (order_update_tx, mut order_update_rx) = mpsc::channel(256);
    let broker = match &config.quote_replay_path {
        Some(path) => ReplayBroker::from_file(config.broker_name.clone(), path)
            .with_speed(config.quote_replay_speed),
        None => ReplayBroker::paper(config.broker_name.clone()),
    }
    .with_order_updates(order_update_tx);
    let broker: Arc<dyn BrokerAdapter> = Arc::new(broker);
    broker.connect().await?;
    broker.authorize().await?;

    let events = EventBus::default();
    spawn_event_logger(&events);

    let pipeline = TradingPipeline::new(
        config.pipeline_config(),
        stores,
        broker.clone(),
        risk_rx,
        events,
    );
    let (inbox, pipeline_handle) = PipelineActor::spawn(pipeline);

    let reloader = ConfigReloader::new(settings, config.user_id.clone(), risk_tx)
        .spawn(config.config_reload_interval(), BackoffConfig::default());

    // Timer ticks close quiet buckets
    let tick_inbox = inbox.clone();
    let ticker = tokio::spawn(async move {
        let mut interval = tokio::time::interval(TICK_PERIOD);
        loop {
            interval.tick().await;
            if tick_inbox.send(PipelineMessage::Tick).await.is_err() {
                break;
            }
        }
    });

    let update_inbox = inbox.clone();
    let order_updates = tokio::spawn(async move {
        while let Some(update) = order_update_rx.recv().await {
            if update_inbox
                .send(PipelineMessage::OrderUpdate(update))
                .await
                .is_err()
            {
                break;
            }
        }
    });

    let (quote_tx, mut quote_rx) = mpsc::channel(1024);
    let feed_broker = broker.clone();
    let contract_id = config.contract_id.clone();
    let feed = tokio::spawn(async move {
        match feed_broker.stream_quotes(&contract_id, quote_tx).await {
            Ok(()) => info!("Quote feed for {} ended", contract_id),
            Err(e) => error!("Quote feed for {} failed: {}", contract_id, e),
        }
    });
    let quote_inbox = inbox.clone();
    let forwarder = tokio::spawn(async move {
        while let Some(quote) = quote_rx.recv().await {
            if quote_inbox.send(PipelineMessage::Quote(quote)).await.is_err() {
                break;
            }
        }
    });

    info!("Worker started successfully. Press Ctrl+C to stop.");
    shutdown_signal().await;
    info!("Worker shutting down gracefully...");

    feed.abort();
    forwarder.abort();
    ticker.abort();
    order_updates.abort();
    reloader.abort();

    if inbox.send(PipelineMessage::Shutdown).await.is_err() {
        warn!("Pipeline actor already stopped");
    }
    if let Err(e) = pipeline_handle.await {
        error!("Pipeline actor ended abnormally: {}", e);
    }
    pool.close().await;

    info!("Shutdown complete");
    Ok(())
}

fn spawn_event_logger(events: &EventBus) {
    let mut rx = events.subscribe();
    tokio::spawn(async move {
        loop {
            match rx.recv().await {
                Ok(event @ TradingEvent::CandleClosed { .. }) => {
                    debug!("event: {}", serde_json::to_string(&event).unwrap_or_default());
                }
                Ok(event) => match serde_json::to_string(&event) {
                    Ok(json) => info!("event: {}", json),
                    Err(e) => warn!("Unserializable event {:?}: {}", event, e),
                },
                Err(tokio::sync::broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!("Event logger lagged, {} events skipped", skipped);
                }
                Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
            }
        }
    });
}

async fn shutdown_signal() {
    let ctrl_c = async {
        match tokio::signal::ctrl_c().await {
            Ok(()) => info!("Received Ctrl+C signal"),
            Err(e) => error!("Failed to install Ctrl+C handler: {}", e),
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
                info!("Received SIGTERM signal");
            }
            Err(e) => error!("Failed to install SIGTERM handler: {}", e),
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
