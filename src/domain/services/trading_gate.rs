//! Cached view of the per-user trading switches.

use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::domain::repositories::trading_state::{TradingState, TradingStateSource};

pub const DEFAULT_TRADING_STATE_TTL: Duration = Duration::from_secs(5);

struct CachedState {
    state: TradingState,
    fetched_at: Instant,
}

/// Reads [`TradingState`] through a short TTL cache.
///
/// When the source fails, the last known state is reused; with nothing cached
/// the gate reports a paused state so no order goes out unchecked.
pub struct TradingGate {
    source: Arc<dyn TradingStateSource>,
    user_id: String,
    ttl: Duration,
    cache: Mutex<Option<CachedState>>,
}

impl TradingGate {
    pub fn new(source: Arc<dyn TradingStateSource>, user_id: impl Into<String>, ttl: Duration) -> Self {
        Self {
            source,
            user_id: user_id.into(),
            ttl,
            cache: Mutex::new(None),
        }
    }

    pub async fn current(&self) -> TradingState {
        let mut cache = self.cache.lock().await;
        if let Some(cached) = cache.as_ref() {
            if cached.fetched_at.elapsed() < self.ttl {
                return cached.state;
            }
        }

        match self.source.get_user_trading_state(&self.user_id).await {
            Ok(state) => {
                if cache.as_ref().map(|c| c.state) != Some(state) {
                    debug!("Trading state for {}: {:?}", self.user_id, state);
                }
                *cache = Some(CachedState {
                    state,
                    fetched_at: Instant::now(),
                });
                state
            }
            Err(e) => match cache.as_ref() {
                Some(cached) => {
                    warn!(
                        "Trading state refresh for {} failed, using last known: {}",
                        self.user_id, e
                    );
                    cached.state
                }
                None => {
                    warn!(
                        "Trading state for {} unavailable, treating as paused: {}",
                        self.user_id, e
                    );
                    TradingState {
                        is_paused: true,
                        is_kill_switched: false,
                    }
                }
            },
        }
    }

    /// Drop the cached state so the next read hits the source.
    pub async fn invalidate(&self) {
        *self.cache.lock().await = None;
    }
}
