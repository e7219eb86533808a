//! Periodic Task Runner with Failure Back-off
//!
//! Runs one iteration of a background task per period. Failures are retried
//! with exponential back-off, and the runner gives up after too many in a row
//! so the supervisor can decide what to do.

use std::time::Duration;
use tokio::time::{interval, sleep, MissedTickBehavior};
use tracing::{error, warn};

/// Back-off settings for a periodic task
#[derive(Debug, Clone)]
pub struct BackoffConfig {
    /// Consecutive failures tolerated before the runner returns
    pub max_consecutive_failures: u32,
    /// First delay after a failure
    pub initial_retry_delay: Duration,
    /// Cap on the delay between retries
    pub max_retry_delay: Duration,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            max_consecutive_failures: 10,
            initial_retry_delay: Duration::from_secs(1),
            max_retry_delay: Duration::from_secs(60),
        }
    }
}

#[derive(Debug, thiserror::Error, PartialEq)]
#[error("task '{task}' failed {failures} times in a row, last error: {last_error}")]
pub struct TaskExhausted {
    pub task: String,
    pub failures: u32,
    pub last_error: String,
}

#[derive(Debug)]
struct BackoffState {
    consecutive_failures: u32,
    current_retry_delay: Duration,
}

impl BackoffState {
    fn new(initial_delay: Duration) -> Self {
        Self {
            consecutive_failures: 0,
            current_retry_delay: initial_delay,
        }
    }

    /// Returns the delay to wait before the retry.
    fn record_failure(&mut self, max_delay: Duration) -> Duration {
        self.consecutive_failures += 1;
        let delay = self.current_retry_delay;
        self.current_retry_delay = std::cmp::min(self.current_retry_delay * 2, max_delay);
        delay
    }

    fn reset(&mut self, initial_delay: Duration) {
        self.consecutive_failures = 0;
        self.current_retry_delay = initial_delay;
    }
}

/// Run `task_fn` once per `period` until it fails too often
///
/// # Arguments
/// * `task_name` - Name used in log lines
/// * `period` - Time between successful iterations
/// * `config` - Back-off settings
/// * `task_fn` - Async function that executes one iteration of the task
///
/// # Errors
/// Returns [`TaskExhausted`] after `max_consecutive_failures` consecutive failures.
pub async fn run_periodic<F, Fut>(
    task_name: &str,
    period: Duration,
    config: BackoffConfig,
    mut task_fn: F,
) -> Result<(), TaskExhausted>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<(), String>>,
{
    let mut state = BackoffState::new(config.initial_retry_delay);
    let mut ticker = interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        ticker.tick().await;

        match task_fn().await {
            Ok(()) => {
                if state.consecutive_failures > 0 {
                    warn!(
                        "Task '{}' recovered after {} failures",
                        task_name, state.consecutive_failures
                    );
                }
                state.reset(config.initial_retry_delay);
            }
            Err(e) => {
                let delay = state.record_failure(config.max_retry_delay);
                error!(
                    "Task '{}' failed (attempt {}/{}): {}",
                    task_name, state.consecutive_failures, config.max_consecutive_failures, e
                );

                if state.consecutive_failures >= config.max_consecutive_failures {
                    return Err(TaskExhausted {
                        task: task_name.to_string(),
                        failures: state.consecutive_failures,
                        last_error: e,
                    });
                }

                warn!("Task '{}' will retry in {:?}", task_name, delay);
                sleep(delay).await;
            }
        }
    }
}
