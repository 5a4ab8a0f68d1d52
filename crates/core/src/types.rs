//! Identifiers and market data shared by every crate in the workspace.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::ConfigError;

// =============================================================================
// Exchange Identifiers
// =============================================================================

/// Identifies an exchange the engine can poll.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ExchangeId {
    Kraken,
    Bittrex,
    Bitfinex,
    Poloniex,
    Coinbase,
}

impl ExchangeId {
    /// All exchanges with a venue profile.
    pub const ALL: [ExchangeId; 5] = [
        Self::Kraken,
        Self::Bittrex,
        Self::Bitfinex,
        Self::Poloniex,
        Self::Coinbase,
    ];

    /// Returns the display name.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Kraken => "KRAKEN",
            Self::Bittrex => "BITTREX",
            Self::Bitfinex => "BITFINEX",
            Self::Poloniex => "POLONIEX",
            Self::Coinbase => "COINBASE",
        }
    }

    /// Venue-imposed drain pacing that replaces the global default, if any.
    #[must_use]
    pub fn default_drain_interval_ms(self) -> Option<u64> {
        match self {
            Self::Bitfinex => Some(2_000),
            _ => None,
        }
    }
}

impl fmt::Display for ExchangeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ExchangeId {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|id| id.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| ConfigError::UnknownExchange(s.to_string()))
    }
}

// =============================================================================
// Assets and Pairs
// =============================================================================

/// An asset code such as `BTC` or `ETH`, always upper case.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AssetId(String);

impl AssetId {
    #[must_use]
    pub fn new(code: impl AsRef<str>) -> Self {
        Self(code.as_ref().trim().to_ascii_uppercase())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AssetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for AssetId {
    fn from(code: &str) -> Self {
        Self::new(code)
    }
}

/// Quote currencies recognised when splitting a pair symbol, longest first.
const QUOTE_ASSETS: [&str; 5] = ["USDT", "BTC", "ETH", "USD", "EUR"];

/// A trading pair symbol such as `ETHBTC` (ETH priced in BTC).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PairId(String);

impl PairId {
    #[must_use]
    pub fn new(symbol: impl AsRef<str>) -> Self {
        Self(symbol.as_ref().trim().to_ascii_uppercase())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Splits the symbol into `(base, quote)` using the known quote suffixes.
    ///
    /// Returns `None` when no known quote asset terminates the symbol or the
    /// base would be empty.
    #[must_use]
    pub fn split(&self) -> Option<(AssetId, AssetId)> {
        QUOTE_ASSETS.iter().find_map(|quote| {
            self.0
                .strip_suffix(quote)
                .filter(|base| !base.is_empty())
                .map(|base| (AssetId::new(base), AssetId::new(quote)))
        })
    }

    /// The priced asset (`ETH` in `ETHBTC`).
    #[must_use]
    pub fn base(&self) -> Option<AssetId> {
        self.split().map(|(base, _)| base)
    }

    /// The pricing asset (`BTC` in `ETHBTC`).
    #[must_use]
    pub fn quote(&self) -> Option<AssetId> {
        self.split().map(|(_, quote)| quote)
    }
}

impl fmt::Display for PairId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for PairId {
    fn from(symbol: &str) -> Self {
        Self::new(symbol)
    }
}

// =============================================================================
// Quotes
// =============================================================================

/// One exchange's last traded price and volume for a pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Quote {
    /// Last price in quote-currency units.
    pub value: Decimal,
    /// Traded volume as reported by the exchange (zero when not reported).
    pub volume: Decimal,
    /// When the price was observed.
    pub observed_at: DateTime<Utc>,
}

impl Quote {
    #[must_use]
    pub fn new(value: Decimal, volume: Decimal, observed_at: DateTime<Utc>) -> Self {
        Self {
            value,
            volume,
            observed_at,
        }
    }
}

/// API key pair supplied by a user for private endpoints.
#[derive(Clone)]
pub struct Credentials {
    pub api_key: String,
    pub api_secret: String,
}

impl Credentials {
    #[must_use]
    pub fn new(api_key: impl Into<String>, api_secret: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            api_secret: api_secret.into(),
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("api_key", &self.api_key)
            .finish_non_exhaustive()
    }
}
