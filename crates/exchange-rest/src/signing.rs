//! Request signing for private balance endpoints.
//!
//! Each venue authenticates with an HMAC over a different message; the
//! functions here only build the signed request and never touch the network.

use base64::{engine::general_purpose::STANDARD as BASE64_STANDARD, Engine};
use hmac::{Hmac, Mac};
use serde_json::json;
use sha2::{Digest, Sha256, Sha384, Sha512};
use spreadwatch_core::{Credentials, ExchangeError};
use thiserror::Error;

use crate::venue::SigningScheme;

type HmacSha512 = Hmac<Sha512>;
type HmacSha384 = Hmac<Sha384>;

/// Errors while preparing a signed request.
#[derive(Debug, Error)]
pub enum SigningError {
    /// The API secret is not valid base64 where the venue requires it.
    #[error("invalid API secret encoding: {0}")]
    SecretEncoding(String),

    /// HMAC key setup failed.
    #[error("HMAC computation failed: {0}")]
    Hmac(String),

    /// Key or secret is empty.
    #[error("API key and secret are required")]
    MissingCredentials,
}

impl From<SigningError> for ExchangeError {
    fn from(err: SigningError) -> Self {
        Self::Auth(err.to_string())
    }
}

/// HTTP verb used by a signed request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignedMethod {
    Get,
    Post,
}

/// A fully signed request, relative to the venue base URL.
#[derive(Debug, Clone)]
pub struct SignedRequest {
    pub method: SignedMethod,
    /// Path including any query string.
    pub path: String,
    pub headers: Vec<(&'static str, String)>,
    pub body: Option<String>,
    pub content_type: Option<&'static str>,
}

const FORM_CONTENT_TYPE: &str = "application/x-www-form-urlencoded";

/// Builds the balance request for `scheme`.
///
/// # Errors
///
/// Returns an error if the credentials are empty or cannot be used as a key.
pub fn sign_balance_request(
    scheme: SigningScheme,
    credentials: &Credentials,
    base_url: &str,
    nonce: u64,
) -> Result<SignedRequest, SigningError> {
    if credentials.api_key.is_empty() || credentials.api_secret.is_empty() {
        return Err(SigningError::MissingCredentials);
    }

    match scheme {
        SigningScheme::Kraken => kraken(credentials, nonce),
        SigningScheme::Bittrex => bittrex(credentials, base_url, nonce),
        SigningScheme::Poloniex => poloniex(credentials, nonce),
        SigningScheme::Bitfinex => bitfinex(credentials, nonce),
    }
}

fn hmac_sha512(key: &[u8], parts: &[&[u8]]) -> Result<Vec<u8>, SigningError> {
    let mut mac = HmacSha512::new_from_slice(key)
        .map_err(|e| SigningError::Hmac(format!("invalid key length: {e}")))?;
    for part in parts {
        mac.update(part);
    }
    Ok(mac.finalize().into_bytes().to_vec())
}

fn kraken(credentials: &Credentials, nonce: u64) -> Result<SignedRequest, SigningError> {
    let path = "/0/private/Balance";
    let body = format!("nonce={nonce}");

    let secret = BASE64_STANDARD
        .decode(credentials.api_secret.trim())
        .map_err(|e| SigningError::SecretEncoding(e.to_string()))?;

    let digest = Sha256::digest(format!("{nonce}{body}").as_bytes());
    let signature = hmac_sha512(&secret, &[path.as_bytes(), digest.as_slice()])?;

    Ok(SignedRequest {
        method: SignedMethod::Post,
        path: path.to_string(),
        headers: vec![
            ("API-Key", credentials.api_key.clone()),
            ("API-Sign", BASE64_STANDARD.encode(signature)),
        ],
        body: Some(body),
        content_type: Some(FORM_CONTENT_TYPE),
    })
}

fn bittrex(
    credentials: &Credentials,
    base_url: &str,
    nonce: u64,
) -> Result<SignedRequest, SigningError> {
    let path = format!(
        "/v1.1/account/getbalances?apikey={}&nonce={nonce}",
        credentials.api_key
    );
    let url = format!("{base_url}{path}");
    let signature = hmac_sha512(credentials.api_secret.as_bytes(), &[url.as_bytes()])?;

    Ok(SignedRequest {
        method: SignedMethod::Get,
        path,
        headers: vec![("apisign", hex::encode(signature))],
        body: None,
        content_type: None,
    })
}

fn poloniex(credentials: &Credentials, nonce: u64) -> Result<SignedRequest, SigningError> {
    let body = format!("command=returnBalances&nonce={nonce}");
    let signature = hmac_sha512(credentials.api_secret.as_bytes(), &[body.as_bytes()])?;

    Ok(SignedRequest {
        method: SignedMethod::Post,
        path: "/tradingApi".to_string(),
        headers: vec![
            ("Key", credentials.api_key.clone()),
            ("Sign", hex::encode(signature)),
        ],
        body: Some(body),
        content_type: Some(FORM_CONTENT_TYPE),
    })
}

fn bitfinex(credentials: &Credentials, nonce: u64) -> Result<SignedRequest, SigningError> {
    let path = "/v1/balances";
    let request = json!({"request": path, "nonce": nonce.to_string()}).to_string();
    let payload = BASE64_STANDARD.encode(request.as_bytes());

    let mut mac = HmacSha384::new_from_slice(credentials.api_secret.as_bytes())
        .map_err(|e| SigningError::Hmac(format!("invalid key length: {e}")))?;
    mac.update(payload.as_bytes());
    let signature = hex::encode(mac.finalize().into_bytes());

    Ok(SignedRequest {
        method: SignedMethod::Post,
        path: path.to_string(),
        headers: vec![
            ("X-BFX-APIKEY", credentials.api_key.clone()),
            ("X-BFX-PAYLOAD", payload),
            ("X-BFX-SIGNATURE", signature),
        ],
        body: Some(request),
        content_type: Some("application/json"),
    })
}
