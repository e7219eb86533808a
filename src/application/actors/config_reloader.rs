//! Risk settings reloader
//!
//! Polls the settings store and publishes the whole [`RiskConfig`] through a
//! `watch` channel. Readers always see one consistent snapshot.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::domain::errors::StoreError;
use crate::domain::repositories::trading_state::SettingsSource;
use crate::domain::value_objects::position_sizing::RiskConfig;
use crate::task_runner::{run_periodic, BackoffConfig};

const RELOAD_TASK: &str = "risk_config_reload";

pub struct ConfigReloader {
    source: Arc<dyn SettingsSource>,
    user_id: String,
    publisher: watch::Sender<RiskConfig>,
}

impl ConfigReloader {
    pub fn new(
        source: Arc<dyn SettingsSource>,
        user_id: impl Into<String>,
        publisher: watch::Sender<RiskConfig>,
    ) -> Self {
        Self {
            source,
            user_id: user_id.into(),
            publisher,
        }
    }

    /// Load once and publish if the settings changed.
    ///
    /// Returns whether a new configuration was published. A saved row that
    /// fails validation is logged and the current value kept; only read
    /// failures are errors.
    pub async fn reload_once(&self) -> Result<bool, StoreError> {
        let loaded = match self.source.load_risk_config(&self.user_id).await {
            Ok(Some(loaded)) => loaded,
            Ok(None) => {
                debug!("No saved risk settings for {}, keeping current", self.user_id);
                return Ok(false);
            }
            Err(StoreError::Decode(reason)) => {
                warn!(
                    "Saved risk settings for {} are invalid, keeping current: {}",
                    self.user_id, reason
                );
                return Ok(false);
            }
            Err(e) => return Err(e),
        };

        let previous = self.publisher.borrow().clone();
        let changed = self.publisher.send_if_modified(|current| {
            if *current == loaded {
                return false;
            }
            *current = loaded.clone();
            true
        });

        if changed {
            info!(
                "Risk settings for {} changed: risk ${} -> ${}, rr {} -> {}, max stop {} -> {} ticks, entry {} -> {}",
                self.user_id,
                previous.risk_usd,
                loaded.risk_usd,
                previous.reward_risk_ratio,
                loaded.reward_risk_ratio,
                previous.max_stop_ticks,
                loaded.max_stop_ticks,
                previous.entry_type,
                loaded.entry_type
            );
        }
        Ok(changed)
    }

    /// Reload every `period` in the background.
    ///
    /// A run of read failures exhausts the periodic task; it is restarted after
    /// `backoff.max_retry_delay` so a recovered store is picked up again.
    pub fn spawn(self, period: Duration, backoff: BackoffConfig) -> JoinHandle<()> {
        let reloader = Arc::new(self);
        tokio::spawn(async move {
            loop {
                let iteration = reloader.clone();
                let result = run_periodic(RELOAD_TASK, period, backoff.clone(), move || {
                    let reloader = iteration.clone();
                    async move {
                        reloader
                            .reload_once()
                            .await
                            .map(|_| ())
                            .map_err(|e| e.to_string())
                    }
                })
                .await;

                if let Err(exhausted) = result {
                    error!(
                        "{}; restarting in {:?}",
                        exhausted, backoff.max_retry_delay
                    );
                }
                tokio::time::sleep(backoff.max_retry_delay).await;
            }
        })
    }
}
