//! Coinbase: `GET /v2/exchange-rates?currency=BTC` returns every rate for the
//! base currency. No volume, no withdrawal fees, no signed endpoints.

use rust_decimal::Decimal;
use serde_json::Value;
use spreadwatch_core::{ExchangeError, ExchangeId, ExchangeResult, PairId, Quote};

use crate::venue::{decimal_value, joined_errors, TickerContext, VenueProfile};

pub static PROFILE: VenueProfile = VenueProfile {
    id: ExchangeId::Coinbase,
    base_url: "https://api.coinbase.com",
    requests_per_minute: 60,
    symbols: &[
        ("BTCUSD", "BTCUSD"),
        ("BTCEUR", "BTCEUR"),
        ("LTCUSD", "LTCUSD"),
        ("ETHBTC", "ETHBTC"),
        ("LTCBTC", "LTCBTC"),
    ],
    withdrawal_fees: &[],
    asset_codes: &[],
    ticker_path,
    decode_ticker,
    private_api: None,
};

fn ticker_path(_symbol: &str, pair: &PairId) -> String {
    let base = pair
        .base()
        .map_or_else(|| pair.as_str().to_string(), |base| base.to_string());
    format!("/v2/exchange-rates?currency={base}")
}

fn decode_ticker(body: &Value, ctx: &TickerContext<'_>) -> ExchangeResult<Quote> {
    if let Some(errors) = body.get("errors").and_then(Value::as_array) {
        let messages: Vec<Value> = errors
            .iter()
            .map(|e| e.get("message").cloned().unwrap_or_else(|| e.clone()))
            .collect();
        return Err(ExchangeError::api(200, joined_errors(&messages)));
    }

    let quote_asset = ctx.pair.quote().ok_or_else(|| ctx.unsupported())?;
    let rates = body
        .pointer("/data/rates")
        .ok_or_else(|| ExchangeError::malformed("missing data.rates"))?;
    let rate = rates
        .get(quote_asset.as_str())
        .ok_or_else(|| ctx.unsupported())?;

    let value = decimal_value(Some(rate), quote_asset.as_str())?;
    Ok(Quote::new(value, Decimal::ZERO, ctx.now))
}
