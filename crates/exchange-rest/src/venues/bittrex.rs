//! Bittrex v1.1: `GET /v1.1/public/getticker?market=BTC-ETH`.
//!
//! Markets are spelled quote-first. Bittrex wraps every payload in
//! `{success, message, result}` and does not report volume on the ticker.

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::Deserialize;
use serde_json::Value;
use spreadwatch_core::{ExchangeError, ExchangeId, ExchangeResult, PairId, Quote};

use crate::venue::{decimal_value, PrivateApi, SigningScheme, TickerContext, VenueProfile};

pub static PROFILE: VenueProfile = VenueProfile {
    id: ExchangeId::Bittrex,
    base_url: "https://bittrex.com/api",
    requests_per_minute: 60,
    symbols: &[
        ("ETHBTC", "BTC-ETH"),
        ("LTCBTC", "BTC-LTC"),
        ("XMRBTC", "BTC-XMR"),
        ("ZECBTC", "BTC-ZEC"),
        ("NEOBTC", "BTC-NEO"),
        ("DASHBTC", "BTC-DASH"),
        ("ETCBTC", "BTC-ETC"),
        ("BCHBTC", "BTC-BCC"),
        ("OMGBTC", "BTC-OMG"),
    ],
    withdrawal_fees: &[
        ("LTC", dec!(0.01)),
        ("BTC", dec!(0.001)),
        ("ETH", dec!(0.005)),
        ("BCH", dec!(0.001)),
        ("NEO", dec!(0.025)),
        ("OMG", dec!(0.1)),
        ("ZEC", dec!(0.005)),
        ("XRP", dec!(5)),
        ("DASH", dec!(0.002)),
        ("ETC", dec!(0.01)),
        ("XMR", dec!(0.04)),
        ("USDT", dec!(5)),
    ],
    asset_codes: &[("BCC", "BCH")],
    ticker_path,
    decode_ticker,
    private_api: Some(PrivateApi {
        scheme: SigningScheme::Bittrex,
        decode_balances,
    }),
};

#[derive(Debug, Deserialize)]
struct Envelope {
    success: bool,
    #[serde(default)]
    message: String,
    #[serde(default)]
    result: Value,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct BalanceEntry {
    currency: String,
    #[serde(default)]
    balance: Option<Value>,
}

fn ticker_path(symbol: &str, _pair: &PairId) -> String {
    format!("/v1.1/public/getticker?market={symbol}")
}

fn decode_ticker(body: &Value, ctx: &TickerContext<'_>) -> ExchangeResult<Quote> {
    let envelope = Envelope::deserialize(body)?;
    if !envelope.success {
        if envelope.message.eq_ignore_ascii_case("INVALID_MARKET") {
            return Err(ctx.unsupported());
        }
        return Err(ExchangeError::api(200, envelope.message));
    }

    let value = decimal_value(envelope.result.get("Last"), "result.Last")?;
    Ok(Quote::new(value, Decimal::ZERO, ctx.now))
}

fn decode_balances(body: &Value) -> ExchangeResult<Vec<(String, Decimal)>> {
    let envelope = Envelope::deserialize(body)?;
    if !envelope.success {
        return Err(ExchangeError::Auth(envelope.message));
    }

    let entries = Vec::<BalanceEntry>::deserialize(&envelope.result)?;
    entries
        .into_iter()
        .map(|entry| {
            let amount = match entry.balance {
                Some(Value::Null) | None => Decimal::ZERO,
                balance => decimal_value(balance.as_ref(), &entry.currency)?,
            };
            Ok((entry.currency, amount))
        })
        .collect()
}
