//! Broker Adapter Trait
//!
//! This module defines the `BrokerAdapter` trait, the only way the core talks
//! to a broker. Wire protocols (REST calls, push hubs) live behind it, and every
//! adapter hands the core canonical `Quote` and `OrderAck` values.
//!
//! ## Benefits
//! - Keeps the strategy and execution code free of broker payload shapes
//! - Enables easy mocking for testing
//! - Lets a paper/replay adapter stand in for a live broker

use crate::domain::entities::order::{EntryType, Side};
use crate::domain::entities::quote::Quote;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::mpsc;

/// Common result type for broker operations
pub type BrokerResult<T> = Result<T, BrokerError>;

/// Errors that can occur during broker operations
#[derive(Debug, Clone, Error, PartialEq)]
pub enum BrokerError {
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Authorization failed: {0}")]
    AuthorizationFailed(String),

    #[error("Order rejected: {0}")]
    OrderRejected(String),

    #[error("Network error: {0}")]
    NetworkError(String),

    #[error("Malformed payload: {0}")]
    MalformedPayload(String),

    #[error("Quote stream closed: {0}")]
    StreamClosed(String),
}

/// Entry order as sent to the broker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlaceOrderRequest {
    pub contract_id: String,
    pub side: Side,
    pub qty: i64,
    pub order_type: EntryType,
    /// Caller-chosen tag echoed back on order events; carries the execution key
    pub custom_tag: String,
}

/// Broker acknowledgement of a placed order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderAck {
    pub order_id: String,
}

/// Broker adapter trait providing the interface the core depends on
#[async_trait]
pub trait BrokerAdapter: Send + Sync {
    /// Name recorded on execution rows
    fn name(&self) -> &str;

    /// Open the underlying connection
    async fn connect(&self) -> BrokerResult<()>;

    /// Authorize the session
    ///
    /// # Returns
    /// The session token issued by the broker
    async fn authorize(&self) -> BrokerResult<String>;

    /// Stream quotes for one instrument into `sink`
    ///
    /// Runs until the feed ends or the receiving side is dropped.
    async fn stream_quotes(&self, instrument_id: &str, sink: mpsc::Sender<Quote>)
        -> BrokerResult<()>;

    /// Place an entry order
    ///
    /// # Returns
    /// The broker-assigned order id
    async fn place_order(&self, request: &PlaceOrderRequest) -> BrokerResult<OrderAck>;
}
