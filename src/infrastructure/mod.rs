//! Broker-facing adapters

pub mod payload;
pub mod replay_broker;
