//! Error types for exchange access and configuration.
//!
//! Adapter failures are recoverable and scoped to one (exchange, pair) poll;
//! configuration errors are fatal at startup.

use thiserror::Error;

use crate::types::{ExchangeId, PairId};

/// Errors returned by an exchange adapter.
#[derive(Debug, Error)]
pub enum ExchangeError {
    /// Network or transport failure.
    #[error("network error: {0}")]
    Network(String),

    /// Request did not complete within the configured timeout.
    #[error("request timeout: {0}")]
    Timeout(String),

    /// The exchange refused the request because of its rate limit.
    #[error("rate limit exceeded, retry after {retry_after_secs}s")]
    RateLimited {
        /// Seconds to wait before retry.
        retry_after_secs: u64,
    },

    /// The response could not be decoded into a quote or balance.
    #[error("malformed response: {0}")]
    MalformedResponse(String),

    /// The exchange does not list the requested pair.
    #[error("unsupported pair {pair} on {exchange}")]
    UnsupportedPair {
        /// Exchange that was asked.
        exchange: ExchangeId,
        /// Pair it does not trade.
        pair: PairId,
    },

    /// The exchange answered with an error of its own.
    #[error("API error: {status_code} - {message}")]
    Api {
        /// HTTP status code.
        status_code: u16,
        /// Error message from the exchange.
        message: String,
    },

    /// Credentials were rejected or the venue has no private API support.
    #[error("authentication error: {0}")]
    Auth(String),
}

impl ExchangeError {
    /// Creates an API error from status code and message.
    pub fn api(status_code: u16, message: impl Into<String>) -> Self {
        Self::Api {
            status_code,
            message: message.into(),
        }
    }

    /// Creates a rate limit error.
    pub fn rate_limited(retry_after_secs: u64) -> Self {
        Self::RateLimited { retry_after_secs }
    }

    /// Creates an unsupported pair error.
    pub fn unsupported_pair(exchange: ExchangeId, pair: &PairId) -> Self {
        Self::UnsupportedPair {
            exchange,
            pair: pair.clone(),
        }
    }

    /// Creates a malformed response error.
    pub fn malformed(message: impl Into<String>) -> Self {
        Self::MalformedResponse(message.into())
    }

    /// Returns true if polling the same pair again later may succeed.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Network(_) | Self::Timeout(_) | Self::RateLimited { .. } => true,
            Self::Api { status_code, .. } => *status_code >= 500,
            _ => false,
        }
    }
}

impl From<serde_json::Error> for ExchangeError {
    fn from(err: serde_json::Error) -> Self {
        Self::MalformedResponse(err.to_string())
    }
}

/// Result type alias for adapter operations.
pub type ExchangeResult<T> = std::result::Result<T, ExchangeError>;

/// Errors detected while loading or validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// An exchange name is not one of the supported venues.
    #[error("unknown exchange: {0}")]
    UnknownExchange(String),

    /// A pair lists no exchanges to poll.
    #[error("pair {0} has no exchanges configured")]
    NoExchanges(PairId),

    /// The same pair is configured twice.
    #[error("pair {0} is configured more than once")]
    DuplicatePair(PairId),

    /// A pair symbol does not end in a known quote asset.
    #[error("pair {0} cannot be split into base and quote assets")]
    UnsplittablePair(PairId),

    /// A numeric setting is out of range.
    #[error("invalid setting {field}: {reason}")]
    InvalidSetting {
        /// Dotted path of the offending setting.
        field: String,
        /// Why it was rejected.
        reason: String,
    },
}

impl ConfigError {
    pub fn invalid(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidSetting {
            field: field.into(),
            reason: reason.into(),
        }
    }
}
