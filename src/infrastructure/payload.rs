//! Broker payload normalization
//!
//! Broker feeds name the same field several ways and mix numbers with numeric
//! strings. Everything past this module sees only `Quote`, `OrderAck` and
//! `OrderUpdate`.

use chrono::DateTime;
use serde_json::{Map, Value};

use crate::domain::entities::execution::{OrderEventKind, OrderUpdate};
use crate::domain::entities::quote::Quote;
use crate::domain::repositories::broker_adapter::{BrokerError, BrokerResult, OrderAck};

const INSTRUMENT_FIELDS: &[&str] = &["contractId", "symbol", "instrumentId"];
const BID_FIELDS: &[&str] = &["bid", "bestBid", "b"];
const ASK_FIELDS: &[&str] = &["ask", "bestAsk", "a"];
const LAST_FIELDS: &[&str] = &["last", "lastPrice", "price"];
const ORDER_ID_FIELDS: &[&str] = &["orderId", "id", "order_id"];
const TAG_FIELDS: &[&str] = &["customTag", "custom_tag", "tag"];

/// Parse one quote message.
///
/// `received_at_ms` stands in for the exchange timestamp when the payload
/// carries none.
pub fn normalize_quote_payload(raw: &str, received_at_ms: i64) -> BrokerResult<Quote> {
    let value = parse_object(raw)?;
    let obj = as_object(&value)?;

    let instrument_id = first_string(obj, INSTRUMENT_FIELDS)
        .ok_or_else(|| BrokerError::MalformedPayload(format!("no instrument in {}", raw)))?;

    let observed_at_ms = match obj.get("timestamp") {
        Some(ts) => parse_timestamp_ms(ts)
            .ok_or_else(|| BrokerError::MalformedPayload(format!("bad timestamp {}", ts)))?,
        None => received_at_ms,
    };

    Ok(Quote {
        instrument_id,
        bid: first_number(obj, BID_FIELDS),
        ask: first_number(obj, ASK_FIELDS),
        last: first_number(obj, LAST_FIELDS),
        observed_at_ms,
    })
}

/// Parse the broker's reply to an order placement.
pub fn normalize_order_ack(raw: &str) -> BrokerResult<OrderAck> {
    let value = parse_object(raw)?;
    let obj = as_object(&value)?;

    if let Some(false) = obj.get("success").and_then(Value::as_bool) {
        let message = obj
            .get("errorMessage")
            .and_then(Value::as_str)
            .unwrap_or("no reason given");
        return Err(BrokerError::OrderRejected(message.to_string()));
    }

    let order_id = first_id(obj, ORDER_ID_FIELDS)
        .ok_or_else(|| BrokerError::MalformedPayload(format!("no order id in {}", raw)))?;
    Ok(OrderAck { order_id })
}

/// Parse an order event from the user hub.
///
/// Returns `Ok(None)` for statuses that carry no execution transition
/// (pending, working, partially filled).
pub fn normalize_order_update(raw: &str) -> BrokerResult<Option<OrderUpdate>> {
    let value = parse_object(raw)?;
    let obj = as_object(&value)?;

    let status = obj
        .get("status")
        .and_then(Value::as_str)
        .ok_or_else(|| BrokerError::MalformedPayload(format!("no status in {}", raw)))?;

    let kind = match status.to_lowercase().as_str() {
        "accepted" | "open" => OrderEventKind::Accepted,
        "filled" => OrderEventKind::Filled,
        "rejected" | "cancelled" | "canceled" | "expired" => OrderEventKind::Rejected {
            reason: obj
                .get("reason")
                .and_then(Value::as_str)
                .unwrap_or(status)
                .to_string(),
        },
        "closed" | "position_closed" | "positionclosed" => OrderEventKind::PositionClosed,
        _ => return Ok(None),
    };

    let update = OrderUpdate {
        custom_tag: first_string(obj, TAG_FIELDS),
        order_id: first_id(obj, ORDER_ID_FIELDS),
        kind,
    };
    if update.custom_tag.is_none() && update.order_id.is_none() {
        return Err(BrokerError::MalformedPayload(format!(
            "order event without tag or id: {}",
            raw
        )));
    }
    Ok(Some(update))
}

fn parse_object(raw: &str) -> BrokerResult<Value> {
    serde_json::from_str(raw)
        .map_err(|e| BrokerError::MalformedPayload(format!("invalid JSON: {}", e)))
}

fn as_object(value: &Value) -> BrokerResult<&Map<String, Value>> {
    value
        .as_object()
        .ok_or_else(|| BrokerError::MalformedPayload("expected JSON object".to_string()))
}

fn first_string(obj: &Map<String, Value>, fields: &[&str]) -> Option<String> {
    fields
        .iter()
        .filter_map(|f| obj.get(*f))
        .filter_map(Value::as_str)
        .map(str::trim)
        .find(|s| !s.is_empty())
        .map(str::to_string)
}

fn first_number(obj: &Map<String, Value>, fields: &[&str]) -> Option<f64> {
    fields.iter().filter_map(|f| obj.get(*f)).find_map(number)
}

/// Ids arrive as numbers or strings.
fn first_id(obj: &Map<String, Value>, fields: &[&str]) -> Option<String> {
    fields.iter().filter_map(|f| obj.get(*f)).find_map(|v| match v {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    })
}

fn number(value: &Value) -> Option<f64> {
    let parsed = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    parsed.filter(|v| v.is_finite())
}

fn parse_timestamp_ms(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)),
        Value::String(s) => match s.trim().parse::<i64>() {
            Ok(ms) => Some(ms),
            Err(_) => DateTime::parse_from_rfc3339(s.trim())
                .ok()
                .map(|dt| dt.timestamp_millis()),
        },
        _ => None,
    }
}
