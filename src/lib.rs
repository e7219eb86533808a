//! Imbalance Retest Trader Library
//!
//! Quotes become 15-second and 3-minute candles, the strategy engine turns
//! retests of 3-minute imbalance boxes into sized trade intents, and each
//! intent is recorded, gated and executed at most once.

pub mod application;
pub mod config;
pub mod domain;
pub mod infrastructure;
pub mod persistence;
pub mod task_runner;
