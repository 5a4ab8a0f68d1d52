//! Bitfinex v1: `GET /v1/pubticker/ethbtc`, signed `POST /v1/balances`.

use chrono::{DateTime, Utc};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::Deserialize;
use serde_json::Value;
use spreadwatch_core::{ExchangeError, ExchangeId, ExchangeResult, PairId, Quote};

use crate::venue::{decimal_value, PrivateApi, SigningScheme, TickerContext, VenueProfile};

pub static PROFILE: VenueProfile = VenueProfile {
    id: ExchangeId::Bitfinex,
    base_url: "https://api.bitfinex.com",
    requests_per_minute: 30,
    symbols: &[
        ("BTCUSD", "btcusd"),
        ("ETHUSD", "ethusd"),
        ("LTCUSD", "ltcusd"),
        ("ETHBTC", "ethbtc"),
        ("LTCBTC", "ltcbtc"),
        ("XMRBTC", "xmrbtc"),
        ("ZECBTC", "zecbtc"),
        ("NEOBTC", "neobtc"),
        ("ETCBTC", "etcbtc"),
        ("BCHBTC", "bchbtc"),
        ("OMGBTC", "omgbtc"),
    ],
    withdrawal_fees: &[
        ("LTC", dec!(0.001)),
        ("BTC", dec!(0.0005)),
        ("ETH", dec!(0.01)),
    ],
    asset_codes: &[],
    ticker_path,
    decode_ticker,
    private_api: Some(PrivateApi {
        scheme: SigningScheme::Bitfinex,
        decode_balances,
    }),
};

#[derive(Debug, Deserialize)]
struct WalletEntry {
    currency: String,
    amount: Value,
}

fn ticker_path(symbol: &str, _pair: &PairId) -> String {
    format!("/v1/pubticker/{symbol}")
}

/// Bitfinex answers errors with `{"message": "..."}`.
fn error_message(body: &Value) -> Option<&str> {
    body.get("message").and_then(Value::as_str)
}

/// Converts fractional epoch seconds (`"1574000000.123"`) to a timestamp.
fn parse_timestamp(value: &Value) -> ExchangeResult<DateTime<Utc>> {
    let seconds = decimal_value(Some(value), "timestamp")?;
    let whole = seconds.trunc();
    let nanos = ((seconds - whole) * dec!(1_000_000_000)).trunc();

    whole
        .to_i64()
        .zip(nanos.to_u32())
        .and_then(|(secs, nanos)| DateTime::from_timestamp(secs, nanos))
        .ok_or_else(|| ExchangeError::malformed(format!("timestamp out of range: {seconds}")))
}

fn decode_ticker(body: &Value, ctx: &TickerContext<'_>) -> ExchangeResult<Quote> {
    if let Some(message) = error_message(body) {
        if message.eq_ignore_ascii_case("Unknown symbol") {
            return Err(ctx.unsupported());
        }
        return Err(ExchangeError::api(200, message));
    }

    let value = decimal_value(body.get("last_price"), "last_price")?;
    let volume = decimal_value(body.get("volume"), "volume")?;
    let observed_at = match body.get("timestamp") {
        Some(ts) => parse_timestamp(ts)?,
        None => ctx.now,
    };

    Ok(Quote::new(value, volume, observed_at))
}

fn decode_balances(body: &Value) -> ExchangeResult<Vec<(String, Decimal)>> {
    if let Some(message) = error_message(body) {
        return Err(ExchangeError::Auth(message.to_string()));
    }

    // One entry per wallet (exchange, margin, funding); the adapter sums them.
    let wallets = Vec::<WalletEntry>::deserialize(body)?;
    wallets
        .into_iter()
        .map(|wallet| {
            let amount = decimal_value(Some(&wallet.amount), &wallet.currency)?;
            Ok((wallet.currency, amount))
        })
        .collect()
}
