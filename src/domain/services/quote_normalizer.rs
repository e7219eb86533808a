//! Merges partial quote updates into one coherent snapshot per instrument.

use std::collections::HashMap;
use tracing::{debug, trace};

use crate::domain::entities::quote::{Quote, QuoteSnapshot};
use crate::domain::value_objects::price::Price;

/// Default maximum age of a quote relative to the wall clock.
pub const DEFAULT_MAX_QUOTE_AGE_MS: i64 = 15_000;

pub struct QuoteNormalizer {
    max_quote_age_ms: i64,
    snapshots: HashMap<String, QuoteSnapshot>,
}

impl QuoteNormalizer {
    pub fn new(max_quote_age_ms: i64) -> Self {
        Self {
            max_quote_age_ms,
            snapshots: HashMap::new(),
        }
    }

    /// Merge `quote` into the instrument's snapshot.
    ///
    /// Returns the updated snapshot, or `None` when the quote is stale: older
    /// than the snapshot already held, or older than the age limit at `now_ms`.
    pub fn apply(&mut self, quote: &Quote, now_ms: i64) -> Option<QuoteSnapshot> {
        if now_ms - quote.observed_at_ms > self.max_quote_age_ms {
            debug!(
                "Dropping quote for {}: {}ms old",
                quote.instrument_id,
                now_ms - quote.observed_at_ms
            );
            return None;
        }

        let snapshot = self
            .snapshots
            .entry(quote.instrument_id.clone())
            .or_insert_with(|| QuoteSnapshot {
                instrument_id: quote.instrument_id.clone(),
                bid: None,
                ask: None,
                last: None,
                observed_at_ms: quote.observed_at_ms,
            });

        if quote.observed_at_ms < snapshot.observed_at_ms {
            trace!(
                "Dropping out-of-order quote for {} ({} < {})",
                quote.instrument_id,
                quote.observed_at_ms,
                snapshot.observed_at_ms
            );
            return None;
        }

        merge_field(&mut snapshot.bid, quote.bid);
        merge_field(&mut snapshot.ask, quote.ask);
        merge_field(&mut snapshot.last, quote.last);
        snapshot.observed_at_ms = quote.observed_at_ms;

        Some(snapshot.clone())
    }

    /// Last merged snapshot for an instrument.
    pub fn snapshot(&self, instrument_id: &str) -> Option<&QuoteSnapshot> {
        self.snapshots.get(instrument_id)
    }
}

impl Default for QuoteNormalizer {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_QUOTE_AGE_MS)
    }
}

// Absent or invalid values leave the previous value in place.
fn merge_field(slot: &mut Option<Price>, incoming: Option<f64>) {
    if let Some(value) = incoming {
        if let Ok(price) = Price::new(value) {
            *slot = Some(price);
        }
    }
}
