//! Replay / paper broker
//!
//! Replays a JSON-lines capture through the payload normalizers and fills
//! orders locally. Quote timestamps are rebased onto the wall clock at stream
//! start so the capture looks live to the freshness checks downstream.
//! Capture lines with a `status` field are recorded order events and go to the
//! order update channel instead.

use async_trait::async_trait;
use chrono::Utc;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::fs::File;
use tokio::io::{AsyncBufReadExt, BufReader};
use serde_json::{json, Value};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::domain::entities::execution::OrderUpdate;
use crate::domain::entities::quote::Quote;
use crate::domain::repositories::broker_adapter::{
    BrokerAdapter, BrokerError, BrokerResult, OrderAck, PlaceOrderRequest,
};
use crate::infrastructure::payload::{
    normalize_order_ack, normalize_order_update, normalize_quote_payload,
};

pub struct ReplayBroker {
    name: String,
    quotes_path: Option<PathBuf>,
    /// Playback speed; 1.0 keeps the capture's own pacing, 0 disables pacing
    speed: f64,
    order_updates: Option<mpsc::Sender<OrderUpdate>>,
    next_order_id: AtomicU64,
}

impl ReplayBroker {
    /// Paper broker with no quote feed.
    pub fn paper(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            quotes_path: None,
            speed: 1.0,
            order_updates: None,
            next_order_id: AtomicU64::new(1),
        }
    }

    /// Paper broker replaying quotes from a JSON-lines file.
    pub fn from_file(name: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self {
            quotes_path: Some(path.into()),
            ..Self::paper(name)
        }
    }

    pub fn with_speed(mut self, speed: f64) -> Self {
        self.speed = if speed.is_finite() && speed > 0.0 { speed } else { 0.0 };
        self
    }

    /// Emit an `Accepted` event for every placed order, and forward recorded
    /// order events from the capture.
    pub fn with_order_updates(mut self, updates: mpsc::Sender<OrderUpdate>) -> Self {
        self.order_updates = Some(updates);
        self
    }

    fn pause_for(&self, capture_gap_ms: i64) -> Option<Duration> {
        if self.speed <= 0.0 || capture_gap_ms <= 0 {
            return None;
        }
        Some(Duration::from_millis(
            (capture_gap_ms as f64 / self.speed) as u64,
        ))
    }

    async fn forward_order_event(&self, line: &str) {
        let update = match normalize_order_update(line) {
            Ok(Some(update)) => update,
            Ok(None) => return,
            Err(e) => {
                warn!("Skipping recorded order event: {}", e);
                return;
            }
        };
        match &self.order_updates {
            Some(updates) => {
                if updates.send(update).await.is_err() {
                    debug!("Order update receiver dropped");
                }
            }
            None => debug!("No order update channel; dropping recorded {:?}", update.kind),
        }
    }
}

fn is_order_event(line: &str) -> bool {
    serde_json::from_str::<Value>(line)
        .map(|v| v.get("status").is_some())
        .unwrap_or(false)
}

#[async_trait]
impl BrokerAdapter for ReplayBroker {
    fn name(&self) -> &str {
        &self.name
    }

    async fn connect(&self) -> BrokerResult<()> {
        if let Some(path) = &self.quotes_path {
            if tokio::fs::metadata(path).await.is_err() {
                return Err(BrokerError::ConnectionFailed(format!(
                    "quote capture {} not found",
                    path.display()
                )));
            }
        }
        info!("{} broker ready (paper fills)", self.name);
        Ok(())
    }

    async fn authorize(&self) -> BrokerResult<String> {
        Ok(format!("{}-paper-session", self.name))
    }

    async fn stream_quotes(
        &self,
        instrument_id: &str,
        sink: mpsc::Sender<Quote>,
    ) -> BrokerResult<()> {
        let Some(path) = &self.quotes_path else {
            debug!("{} has no quote capture; feed is empty", self.name);
            return Ok(());
        };

        let file = File::open(path).await.map_err(|e| {
            BrokerError::ConnectionFailed(format!("{}: {}", path.display(), e))
        })?;
        let mut lines = BufReader::new(file).lines();

        let started_ms = Utc::now().timestamp_millis();
        let mut first_ms: Option<i64> = None;
        let mut previous_ms: Option<i64> = None;
        let mut sent = 0usize;

        while let Some(line) = lines
            .next_line()
            .await
            .map_err(|e| BrokerError::StreamClosed(e.to_string()))?
        {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            if is_order_event(line) {
                self.forward_order_event(line).await;
                continue;
            }

            let mut quote = match normalize_quote_payload(line, started_ms) {
                Ok(quote) => quote,
                Err(e) => {
                    warn!("Skipping capture line: {}", e);
                    continue;
                }
            };
            if quote.instrument_id != instrument_id {
                continue;
            }

            let base = *first_ms.get_or_insert(quote.observed_at_ms);
            if let Some(pause) = previous_ms.and_then(|p| self.pause_for(quote.observed_at_ms - p)) {
                tokio::time::sleep(pause).await;
            }
            previous_ms = Some(quote.observed_at_ms);
            quote.observed_at_ms = started_ms + (quote.observed_at_ms - base);

            if sink.send(quote).await.is_err() {
                debug!("Quote receiver dropped, stopping replay");
                return Ok(());
            }
            sent += 1;
        }

        info!("Replay of {} finished after {} quotes", path.display(), sent);
        Ok(())
    }

    async fn place_order(&self, request: &PlaceOrderRequest) -> BrokerResult<OrderAck> {
        // replies use the broker's wire shape so paper fills take the live parsing path
        let reply = if request.qty <= 0 {
            json!({
                "success": false,
                "errorMessage": format!("quantity {} must be positive", request.qty),
            })
        } else {
            json!({
                "success": true,
                "orderId": format!("paper-{}", self.next_order_id.fetch_add(1, Ordering::SeqCst)),
            })
        };
        let ack = normalize_order_ack(&reply.to_string())?;
        info!(
            "Paper {} {} x{} on {} as {} (tag {})",
            request.order_type, request.side, request.qty, request.contract_id, ack.order_id, request.custom_tag
        );

        if let Some(updates) = &self.order_updates {
            let event = json!({
                "customTag": request.custom_tag,
                "orderId": ack.order_id,
                "status": "Accepted",
            });
            match normalize_order_update(&event.to_string()) {
                Ok(Some(update)) => {
                    if updates.try_send(update).is_err() {
                        warn!(
                            "Order update channel full or closed; dropping accept for {}",
                            ack.order_id
                        );
                    }
                }
                Ok(None) => {}
                Err(e) => warn!("Could not build accept for {}: {}", ack.order_id, e),
            }
        }

        Ok(ack)
    }
}
