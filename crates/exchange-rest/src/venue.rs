//! Per-exchange data driving the shared REST adapter.
//!
//! Every venue is described by a static [`VenueProfile`]: where to send
//! requests, how pairs are spelled, what withdrawals cost, and how ticker and
//! balance payloads are decoded. The adapter itself contains no venue logic.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde_json::Value;
use spreadwatch_core::{AssetId, ExchangeError, ExchangeId, ExchangeResult, PairId, Quote};
use std::fmt;
use std::str::FromStr;

use crate::venues;

/// Inputs a ticker decoder needs besides the response body.
#[derive(Debug, Clone, Copy)]
pub struct TickerContext<'a> {
    pub exchange: ExchangeId,
    pub pair: &'a PairId,
    /// Symbol as the venue spells it.
    pub symbol: &'a str,
    /// Receive time, used when the venue does not timestamp its ticker.
    pub now: DateTime<Utc>,
}

impl TickerContext<'_> {
    pub(crate) fn unsupported(&self) -> ExchangeError {
        ExchangeError::unsupported_pair(self.exchange, self.pair)
    }
}

/// Builds the request path (with query) for a ticker.
pub type TickerPath = fn(symbol: &str, pair: &PairId) -> String;

/// Turns a ticker response body into a quote.
pub type TickerDecoder = fn(body: &Value, ctx: &TickerContext<'_>) -> ExchangeResult<Quote>;

/// Turns a balance response body into `(venue asset code, amount)` entries.
pub type BalanceDecoder = fn(body: &Value) -> ExchangeResult<Vec<(String, Decimal)>>;

/// How private requests are authenticated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SigningScheme {
    /// `API-Sign`: base64 HMAC-SHA512 over path + SHA256(nonce + body), base64 secret.
    Kraken,
    /// `apisign`: hex HMAC-SHA512 over the full request URL.
    Bittrex,
    /// `Sign`: hex HMAC-SHA512 over the form body.
    Poloniex,
    /// `X-BFX-SIGNATURE`: hex HMAC-SHA384 over the base64 JSON payload.
    Bitfinex,
}

/// Signed balance endpoint of a venue.
#[derive(Clone, Copy)]
pub struct PrivateApi {
    pub scheme: SigningScheme,
    pub decode_balances: BalanceDecoder,
}

impl fmt::Debug for PrivateApi {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PrivateApi")
            .field("scheme", &self.scheme)
            .finish_non_exhaustive()
    }
}

/// Static description of one exchange.
pub struct VenueProfile {
    pub id: ExchangeId,
    pub base_url: &'static str,
    pub requests_per_minute: u32,
    /// `(pair, venue symbol)` for every pair the venue is polled for.
    pub symbols: &'static [(&'static str, &'static str)],
    /// Withdrawal fee per asset, in units of that asset.
    pub withdrawal_fees: &'static [(&'static str, Decimal)],
    /// `(venue code, asset)` for venues that spell assets their own way.
    pub asset_codes: &'static [(&'static str, &'static str)],
    pub ticker_path: TickerPath,
    pub decode_ticker: TickerDecoder,
    /// `None` when the venue's private API is not supported.
    pub private_api: Option<PrivateApi>,
}

impl fmt::Debug for VenueProfile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VenueProfile")
            .field("id", &self.id)
            .field("base_url", &self.base_url)
            .field("requests_per_minute", &self.requests_per_minute)
            .field("pairs", &self.symbols.len())
            .field("private_api", &self.private_api)
            .finish_non_exhaustive()
    }
}

impl VenueProfile {
    /// Profile for `id`.
    #[must_use]
    pub fn for_exchange(id: ExchangeId) -> &'static VenueProfile {
        match id {
            ExchangeId::Kraken => &venues::kraken::PROFILE,
            ExchangeId::Bittrex => &venues::bittrex::PROFILE,
            ExchangeId::Bitfinex => &venues::bitfinex::PROFILE,
            ExchangeId::Poloniex => &venues::poloniex::PROFILE,
            ExchangeId::Coinbase => &venues::coinbase::PROFILE,
        }
    }

    /// Venue spelling of `pair`, if the venue trades it.
    #[must_use]
    pub fn venue_symbol(&self, pair: &PairId) -> Option<&'static str> {
        self.symbols
            .iter()
            .find(|(symbol, _)| *symbol == pair.as_str())
            .map(|(_, venue)| *venue)
    }

    #[must_use]
    pub fn supported_pairs(&self) -> Vec<PairId> {
        self.symbols
            .iter()
            .map(|(symbol, _)| PairId::new(symbol))
            .collect()
    }

    #[must_use]
    pub fn withdrawal_fee(&self, asset: &AssetId) -> Option<Decimal> {
        self.withdrawal_fees
            .iter()
            .find(|(code, _)| *code == asset.as_str())
            .map(|(_, fee)| *fee)
    }

    /// Maps a venue asset code (`XXBT`, `BCC`, `btc`) to the common asset id.
    #[must_use]
    pub fn normalize_asset(&self, code: &str) -> AssetId {
        self.asset_codes
            .iter()
            .find(|(venue, _)| venue.eq_ignore_ascii_case(code))
            .map_or_else(|| AssetId::new(code), |(_, asset)| AssetId::new(asset))
    }
}

// =============================================================================
// Decoding helpers shared by the venue modules
// =============================================================================

/// Reads a decimal that a venue may encode as a JSON string or number.
pub(crate) fn decimal_value(value: Option<&Value>, field: &str) -> ExchangeResult<Decimal> {
    let text = match value {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Number(n)) => n.to_string(),
        Some(other) => {
            return Err(ExchangeError::malformed(format!(
                "{field}: expected a number, got {other}"
            )))
        }
        None => return Err(ExchangeError::malformed(format!("missing field {field}"))),
    };

    Decimal::from_str(&text)
        .or_else(|_| Decimal::from_scientific(&text))
        .map_err(|e| ExchangeError::malformed(format!("{field}: {e}")))
}

/// Joins a JSON array of error strings into one message.
pub(crate) fn joined_errors(errors: &[Value]) -> String {
    errors
        .iter()
        .map(|e| e.as_str().map_or_else(|| e.to_string(), str::to_string))
        .collect::<Vec<_>>()
        .join(", ")
}
