//! Venue profiles, one module per exchange.

pub mod bitfinex;
pub mod bittrex;
pub mod coinbase;
pub mod kraken;
pub mod poloniex;
