use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::types::{ExchangeId, PairId, Quote};

/// A successful poll, stamped with the time its request was dispatched.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuoteUpdate {
    pub pair: PairId,
    pub exchange: ExchangeId,
    pub quote: Quote,
    pub dispatched_at: DateTime<Utc>,
}

/// Raised when a pair's cross-exchange spread reaches its threshold.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpreadNotification {
    pub pair: PairId,
    pub high_exchange: ExchangeId,
    pub low_exchange: ExchangeId,
    pub spread: Decimal,
    pub timestamp: DateTime<Utc>,
}

impl SpreadNotification {
    /// Human readable one-liner for push delivery.
    #[must_use]
    pub fn message(&self) -> String {
        format!(
            "{} spread {} (buy {} / sell {})",
            self.pair, self.spread, self.low_exchange, self.high_exchange
        )
    }
}
