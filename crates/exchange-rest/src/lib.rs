//! REST exchange adapters for cross-exchange spread monitoring.
//!
//! This crate provides:
//! - [`RestExchange`], one rate-limited HTTP adapter implementing
//!   [`spreadwatch_core::ExchangeAdapter`] for every supported venue
//! - [`VenueProfile`] tables describing Kraken, Bittrex, Bitfinex, Poloniex
//!   and Coinbase (pair symbols, withdrawal fees, ticker decoders)
//! - HMAC signing for the private balance endpoints
//!
//! # Supported Venues
//!
//! | Exchange | Ticker endpoint                         | Balance |
//! |----------|-----------------------------------------|---------|
//! | Kraken   | `GET /0/public/Ticker?pair=`            | yes     |
//! | Bittrex  | `GET /v1.1/public/getticker?market=`    | yes     |
//! | Bitfinex | `GET /v1/pubticker/{symbol}`            | yes     |
//! | Poloniex | `GET /public?command=returnTicker`      | yes     |
//! | Coinbase | `GET /v2/exchange-rates?currency=`      | no      |

pub mod client;
pub mod signing;
pub mod venue;
pub mod venues;

pub use client::{RestExchange, RestExchangeConfig};
pub use signing::{sign_balance_request, SignedMethod, SignedRequest, SigningError};
pub use venue::{PrivateApi, SigningScheme, TickerContext, VenueProfile};
