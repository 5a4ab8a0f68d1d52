//! Poloniex: one `returnTicker` call returns every market, keyed `BTC_ETH`.

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde_json::Value;
use spreadwatch_core::{ExchangeError, ExchangeId, ExchangeResult, PairId, Quote};

use crate::venue::{decimal_value, PrivateApi, SigningScheme, TickerContext, VenueProfile};

pub static PROFILE: VenueProfile = VenueProfile {
    id: ExchangeId::Poloniex,
    base_url: "https://poloniex.com",
    requests_per_minute: 60,
    symbols: &[
        ("ETHBTC", "BTC_ETH"),
        ("LTCBTC", "BTC_LTC"),
        ("DASHBTC", "BTC_DASH"),
        ("XMRBTC", "BTC_XMR"),
        ("ZECBTC", "BTC_ZEC"),
        ("ETCBTC", "BTC_ETC"),
        ("BCHBTC", "BTC_BCH"),
        ("OMGBTC", "BTC_OMG"),
    ],
    withdrawal_fees: &[
        ("LTC", dec!(0.001)),
        ("BTC", dec!(0.0001)),
        ("ETH", dec!(0.005)),
        ("BCH", dec!(0.0001)),
        ("OMG", dec!(0.1)),
        ("ZEC", dec!(0.001)),
        ("XRP", dec!(0.15)),
        ("DASH", dec!(0)),
        ("ETC", dec!(0.01)),
        ("XMR", dec!(0.05)),
    ],
    asset_codes: &[],
    ticker_path,
    decode_ticker,
    private_api: Some(PrivateApi {
        scheme: SigningScheme::Poloniex,
        decode_balances,
    }),
};

fn ticker_path(_symbol: &str, _pair: &PairId) -> String {
    "/public?command=returnTicker".to_string()
}

fn error_message(body: &Value) -> Option<&str> {
    body.get("error").and_then(Value::as_str)
}

fn decode_ticker(body: &Value, ctx: &TickerContext<'_>) -> ExchangeResult<Quote> {
    if let Some(message) = error_message(body) {
        return Err(ExchangeError::api(200, message));
    }

    let market = body.get(ctx.symbol).ok_or_else(|| ctx.unsupported())?;
    let value = decimal_value(market.get("last"), "last")?;
    let volume = decimal_value(market.get("baseVolume"), "baseVolume")?;

    Ok(Quote::new(value, volume, ctx.now))
}

fn decode_balances(body: &Value) -> ExchangeResult<Vec<(String, Decimal)>> {
    if let Some(message) = error_message(body) {
        return Err(ExchangeError::Auth(message.to_string()));
    }

    body.as_object()
        .ok_or_else(|| ExchangeError::malformed("balances: expected an object"))?
        .iter()
        .map(|(code, amount)| Ok((code.clone(), decimal_value(Some(amount), code)?)))
        .collect()
}
