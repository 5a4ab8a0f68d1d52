//! Kraken: `GET /0/public/Ticker?pair=XBTEUR`, signed `POST /0/private/Balance`.

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde_json::Value;
use spreadwatch_core::{ExchangeError, ExchangeId, ExchangeResult, PairId, Quote};

use crate::venue::{
    decimal_value, joined_errors, PrivateApi, SigningScheme, TickerContext, VenueProfile,
};

pub static PROFILE: VenueProfile = VenueProfile {
    id: ExchangeId::Kraken,
    base_url: "https://api.kraken.com",
    requests_per_minute: 60,
    symbols: &[
        ("BTCEUR", "XBTEUR"),
        ("BTCUSD", "XBTUSD"),
        ("ETHEUR", "ETHEUR"),
        ("ETHUSD", "ETHUSD"),
        ("LTCEUR", "LTCEUR"),
        ("LTCUSD", "LTCUSD"),
        ("ETHBTC", "ETHXBT"),
        ("LTCBTC", "LTCXBT"),
        ("DASHBTC", "DASHXBT"),
        ("ZECBTC", "ZECXBT"),
        ("XMRBTC", "XMRXBT"),
        ("ETCBTC", "ETCXBT"),
    ],
    withdrawal_fees: &[
        ("LTC", dec!(0.001)),
        ("BTC", dec!(0.001)),
        ("ETH", dec!(0.005)),
        ("EUR", dec!(0.09)),
        ("USDT", dec!(5)),
        ("XRP", dec!(0.02)),
        ("DASH", dec!(0.005)),
        ("XMR", dec!(0.05)),
        ("ETC", dec!(0.005)),
        ("ZEC", dec!(0.0001)),
        ("BCH", dec!(0.001)),
    ],
    asset_codes: &[
        ("ZEUR", "EUR"),
        ("XXBT", "BTC"),
        ("XBT", "BTC"),
        ("XLTC", "LTC"),
        ("XETH", "ETH"),
        ("ZUSD", "USD"),
        ("XUSD", "USD"),
        ("XETC", "ETC"),
        ("XXMR", "XMR"),
        ("XBCH", "BCH"),
        ("XZEC", "ZEC"),
    ],
    ticker_path,
    decode_ticker,
    private_api: Some(PrivateApi {
        scheme: SigningScheme::Kraken,
        decode_balances,
    }),
};

fn ticker_path(symbol: &str, _pair: &PairId) -> String {
    format!("/0/public/Ticker?pair={symbol}")
}

/// Kraken reports failures in an `error` array alongside an HTTP 200.
fn check_errors(body: &Value) -> Result<(), String> {
    match body.get("error").and_then(Value::as_array) {
        Some(errors) if !errors.is_empty() => Err(joined_errors(errors)),
        _ => Ok(()),
    }
}

fn decode_ticker(body: &Value, ctx: &TickerContext<'_>) -> ExchangeResult<Quote> {
    if let Err(message) = check_errors(body) {
        if message.contains("Unknown asset pair") {
            return Err(ctx.unsupported());
        }
        return Err(ExchangeError::api(200, message));
    }

    // The result is keyed by Kraken's canonical pair name, which need not
    // match the requested alias (XBTEUR comes back as XXBTZEUR).
    let ticker = body
        .get("result")
        .and_then(Value::as_object)
        .and_then(|result| result.values().next())
        .ok_or_else(|| ExchangeError::malformed("ticker result is empty"))?;

    let value = decimal_value(ticker.pointer("/c/0"), "c[0]")?;
    let volume = decimal_value(ticker.pointer("/v/1"), "v[1]")?;

    Ok(Quote::new(value, volume, ctx.now))
}

fn decode_balances(body: &Value) -> ExchangeResult<Vec<(String, Decimal)>> {
    if let Err(message) = check_errors(body) {
        return Err(ExchangeError::Auth(message));
    }

    let result = body
        .get("result")
        .and_then(Value::as_object)
        .ok_or_else(|| ExchangeError::malformed("balance result missing"))?;

    result
        .iter()
        .map(|(code, amount)| Ok((code.clone(), decimal_value(Some(amount), code)?)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use serde_json::json;

    fn ctx(pair: &PairId) -> TickerContext<'_> {
        TickerContext {
            exchange: ExchangeId::Kraken,
            pair,
            symbol: "ETHXBT",
            now: Utc::now(),
        }
    }

    #[test]
    fn test_decode_ticker() {
        let body = json!({
            "error": [],
            "result": {
                "XETHXXBT": {
                    "a": ["0.031300", "1", "1.000"],
                    "b": ["0.031100", "4", "4.000"],
                    "c": ["0.031200", "0.50000000"],
                    "v": ["812.1", "2291.57"]
                }
            }
        });
        let pair = PairId::new("ETHBTC");
        let quote = decode_ticker(&body, &ctx(&pair)).unwrap();
        assert_eq!(quote.value, dec!(0.0312));
        assert_eq!(quote.volume, dec!(2291.57));
    }

    #[test]
    fn test_decode_unknown_pair() {
        let body = json!({"error": ["EQuery:Unknown asset pair"]});
        let pair = PairId::new("ETHBTC");
        let err = decode_ticker(&body, &ctx(&pair)).unwrap_err();
        assert!(matches!(err, ExchangeError::UnsupportedPair { .. }));
    }

    #[test]
    fn test_decode_other_error() {
        let body = json!({"error": ["EService:Unavailable"]});
        let pair = PairId::new("ETHBTC");
        let err = decode_ticker(&body, &ctx(&pair)).unwrap_err();
        assert!(err.to_string().contains("EService:Unavailable"));
    }

    #[test]
    fn test_decode_empty_result_is_malformed() {
        let body = json!({"error": [], "result": {}});
        let pair = PairId::new("ETHBTC");
        let err = decode_ticker(&body, &ctx(&pair)).unwrap_err();
        assert!(matches!(err, ExchangeError::MalformedResponse(_)));
    }

    #[test]
    fn test_decode_balances() {
        let body = json!({"error": [], "result": {"XXBT": "0.5000000000", "ZEUR": "0.0000"}});
        let balances = decode_balances(&body).unwrap();
        assert_eq!(balances.len(), 2);
        assert!(balances.contains(&("XXBT".to_string(), dec!(0.5))));
    }

    #[test]
    fn test_decode_balances_rejected_key() {
        let body = json!({"error": ["EAPI:Invalid key"]});
        let err = decode_balances(&body).unwrap_err();
        assert!(matches!(err, ExchangeError::Auth(_)));
    }
}
