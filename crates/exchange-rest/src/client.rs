//! Rate-limited REST adapter shared by every venue.
//!
//! One [`RestExchange`] is built per exchange from its [`VenueProfile`]. It
//! paces requests with a governor quota, bounds each request with a timeout,
//! and delegates decoding to the profile.
//!
//! # Example
//!
//! ```ignore
//! use spreadwatch_core::{ExchangeAdapter, ExchangeId, PairId};
//! use spreadwatch_exchange_rest::{RestExchange, RestExchangeConfig};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let kraken = RestExchange::new(ExchangeId::Kraken, RestExchangeConfig::default())?;
//!     let quote = kraken.fetch_quote(&PairId::new("ETHBTC")).await?;
//!     println!("ETHBTC last {}", quote.value);
//!     Ok(())
//! }
//! ```

use async_trait::async_trait;
use chrono::Utc;
use governor::{Quota, RateLimiter};
use nonzero_ext::nonzero;
use reqwest::{Client, Response, StatusCode};
use rust_decimal::Decimal;
use serde_json::Value;
use spreadwatch_core::{
    AppConfig, AssetId, Credentials, ExchangeAdapter, ExchangeError, ExchangeId, ExchangeResult,
    PairId, Quote,
};
use std::collections::BTreeMap;
use std::num::NonZeroU32;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::signing::{sign_balance_request, SignedMethod};
use crate::venue::{TickerContext, VenueProfile};

// =============================================================================
// Configuration
// =============================================================================

/// Connection settings for one exchange.
#[derive(Debug, Clone, Default)]
pub struct RestExchangeConfig {
    /// Overrides the profile's base URL (used by tests and proxies).
    pub base_url: Option<String>,

    /// Overrides the profile's requests-per-minute quota.
    pub requests_per_minute: Option<NonZeroU32>,

    /// Per-request timeout; defaults to 5 seconds.
    pub timeout: Option<Duration>,
}

impl RestExchangeConfig {
    /// Builds the settings for `id` from the application config.
    #[must_use]
    pub fn from_app_config(config: &AppConfig, id: ExchangeId) -> Self {
        let overrides = config.exchange(id);
        Self {
            base_url: overrides.base_url,
            requests_per_minute: overrides.requests_per_minute.and_then(NonZeroU32::new),
            timeout: Some(config.polling.fetch_timeout()),
        }
    }

    /// Sets the base URL.
    #[must_use]
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = Some(url.into());
        self
    }

    /// Sets the rate limit.
    #[must_use]
    pub fn with_rate_limit(mut self, requests_per_minute: NonZeroU32) -> Self {
        self.requests_per_minute = Some(requests_per_minute);
        self
    }

    /// Sets the request timeout.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

// =============================================================================
// Client
// =============================================================================

/// REST adapter for one exchange.
pub struct RestExchange {
    profile: &'static VenueProfile,
    base_url: String,
    http: Client,
    rate_limiter: Arc<
        RateLimiter<
            governor::state::NotKeyed,
            governor::state::InMemoryState,
            governor::clock::DefaultClock,
        >,
    >,
    /// Last nonce handed out for signed requests; nonces must increase.
    last_nonce: AtomicU64,
}

impl std::fmt::Debug for RestExchange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RestExchange")
            .field("exchange", &self.profile.id)
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}

/// Maps transport failures onto the adapter error taxonomy.
pub(crate) fn transport_error(err: reqwest::Error) -> ExchangeError {
    if err.is_timeout() {
        ExchangeError::Timeout(err.to_string())
    } else if err.is_connect() {
        ExchangeError::Network(format!("connection failed: {err}"))
    } else {
        ExchangeError::Network(err.to_string())
    }
}

/// A response body that parsed as JSON, with the status it came with.
struct JsonReply {
    status: StatusCode,
    text: String,
    body: Value,
}

impl RestExchange {
    /// Creates the adapter for `id`.
    ///
    /// # Errors
    /// Returns error if the HTTP client cannot be built.
    pub fn new(id: ExchangeId, config: RestExchangeConfig) -> ExchangeResult<Self> {
        let profile = VenueProfile::for_exchange(id);

        let http = Client::builder()
            .timeout(config.timeout.unwrap_or(DEFAULT_TIMEOUT))
            .build()
            .map_err(|e| ExchangeError::Network(format!("failed to build HTTP client: {e}")))?;

        let requests_per_minute = config
            .requests_per_minute
            .or_else(|| NonZeroU32::new(profile.requests_per_minute))
            .unwrap_or(nonzero!(60u32));
        let rate_limiter = Arc::new(RateLimiter::direct(Quota::per_minute(requests_per_minute)));

        let base_url = config
            .base_url
            .unwrap_or_else(|| profile.base_url.to_string())
            .trim_end_matches('/')
            .to_string();

        Ok(Self {
            profile,
            base_url,
            http,
            rate_limiter,
            last_nonce: AtomicU64::new(0),
        })
    }

    /// Creates adapters for every exchange the configuration polls.
    ///
    /// # Errors
    /// Returns error if any HTTP client cannot be built.
    pub fn for_config(config: &AppConfig) -> ExchangeResult<Vec<Arc<dyn ExchangeAdapter>>> {
        config
            .active_exchanges()
            .into_iter()
            .map(|id| {
                let adapter = Self::new(id, RestExchangeConfig::from_app_config(config, id))?;
                Ok(Arc::new(adapter) as Arc<dyn ExchangeAdapter>)
            })
            .collect()
    }

    #[must_use]
    pub fn profile(&self) -> &'static VenueProfile {
        self.profile
    }

    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Strictly increasing microsecond nonce.
    fn next_nonce(&self) -> u64 {
        let now = u64::try_from(Utc::now().timestamp_micros()).unwrap_or_default();
        let previous = self
            .last_nonce
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |last| {
                Some(now.max(last + 1))
            })
            .unwrap_or_default();
        now.max(previous + 1)
    }

    /// Reads a response as JSON.
    ///
    /// Rate limiting and server errors are reported directly. Client errors
    /// with a JSON body are handed back so the venue decoder can interpret
    /// the venue's own error payload.
    async fn read_json(&self, response: Response) -> ExchangeResult<JsonReply> {
        let status = response.status();

        if status == StatusCode::TOO_MANY_REQUESTS {
            let retry_after = response
                .headers()
                .get("Retry-After")
                .and_then(|v| v.to_str().ok())
                .and_then(|s| s.parse().ok())
                .unwrap_or(60);
            return Err(ExchangeError::rate_limited(retry_after));
        }

        let text = response.text().await.map_err(transport_error)?;

        if status.is_server_error() {
            return Err(ExchangeError::api(status.as_u16(), text));
        }

        match serde_json::from_str(&text) {
            Ok(body) => Ok(JsonReply { status, text, body }),
            Err(_) if !status.is_success() => Err(ExchangeError::api(status.as_u16(), text)),
            Err(e) => Err(e.into()),
        }
    }

    /// Decoder output, except that an undecodable error reply is reported
    /// as the HTTP error it was.
    fn settle<T>(reply: &JsonReply, decoded: ExchangeResult<T>) -> ExchangeResult<T> {
        match decoded {
            Err(ExchangeError::MalformedResponse(_)) if !reply.status.is_success() => {
                Err(ExchangeError::api(reply.status.as_u16(), reply.text.clone()))
            }
            other => other,
        }
    }
}

#[async_trait]
impl ExchangeAdapter for RestExchange {
    fn id(&self) -> ExchangeId {
        self.profile.id
    }

    fn supported_pairs(&self) -> Vec<PairId> {
        self.profile.supported_pairs()
    }

    async fn fetch_quote(&self, pair: &PairId) -> ExchangeResult<Quote> {
        let exchange = self.profile.id;
        let symbol = self
            .profile
            .venue_symbol(pair)
            .ok_or_else(|| ExchangeError::unsupported_pair(exchange, pair))?;

        self.rate_limiter.until_ready().await;

        let url = format!("{}{}", self.base_url, (self.profile.ticker_path)(symbol, pair));
        tracing::debug!(exchange = %exchange, pair = %pair, "GET {}", url);

        let response = self
            .http
            .get(&url)
            .header("Accept", "application/json")
            .send()
            .await
            .map_err(transport_error)?;
        let reply = self.read_json(response).await?;

        let ctx = TickerContext {
            exchange,
            pair,
            symbol,
            now: Utc::now(),
        };
        let quote = Self::settle(&reply, (self.profile.decode_ticker)(&reply.body, &ctx))?;

        if quote.value <= Decimal::ZERO {
            return Err(ExchangeError::malformed(format!(
                "non-positive price {} for {pair}",
                quote.value
            )));
        }
        if quote.volume < Decimal::ZERO {
            return Err(ExchangeError::malformed(format!(
                "negative volume {} for {pair}",
                quote.volume
            )));
        }

        tracing::trace!(exchange = %exchange, pair = %pair, value = %quote.value, "quote decoded");
        Ok(quote)
    }

    fn withdrawal_fee(&self, asset: &AssetId) -> Option<Decimal> {
        self.profile.withdrawal_fee(asset)
    }

    async fn fetch_balance(
        &self,
        credentials: &Credentials,
    ) -> ExchangeResult<BTreeMap<AssetId, Decimal>> {
        let exchange = self.profile.id;
        let private_api = self.profile.private_api.ok_or_else(|| {
            ExchangeError::Auth(format!("{exchange} does not support signed requests"))
        })?;

        let signed = sign_balance_request(
            private_api.scheme,
            credentials,
            &self.base_url,
            self.next_nonce(),
        )?;

        self.rate_limiter.until_ready().await;

        let url = format!("{}{}", self.base_url, signed.path);
        tracing::debug!(exchange = %exchange, "signed balance request");

        let mut request = match signed.method {
            SignedMethod::Get => self.http.get(&url),
            SignedMethod::Post => self.http.post(&url),
        }
        .header("Accept", "application/json");
        for (name, value) in &signed.headers {
            request = request.header(*name, value);
        }
        if let Some(content_type) = signed.content_type {
            request = request.header("Content-Type", content_type);
        }
        if let Some(body) = signed.body {
            request = request.body(body);
        }

        let response = request.send().await.map_err(transport_error)?;
        let status = response.status();
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            let text = response.text().await.unwrap_or_default();
            return Err(ExchangeError::Auth(text));
        }
        let reply = self.read_json(response).await?;
        let entries = Self::settle(&reply, (private_api.decode_balances)(&reply.body))?;

        let mut balances: BTreeMap<AssetId, Decimal> = BTreeMap::new();
        for (code, amount) in entries {
            *balances
                .entry(self.profile.normalize_asset(&code))
                .or_default() += amount;
        }
        balances.retain(|_, amount| *amount > Decimal::ZERO);

        tracing::debug!(exchange = %exchange, assets = balances.len(), "balances fetched");
        Ok(balances)
    }
}
