//! # Configuration Management
//!
//! This module handles loading the ceremony client's configuration from
//! environment variables, "12-factor app" style.
//!
//! ## Environment Variables
//! - `PASSKEY_FUNCTIONS_URL`: Base URL the relying-party endpoints hang off
//! - `PASSKEY_ENDPOINT_PREFIX`: Prefix of the endpoint names (default: `webauthn-`)
//! - `PASSKEY_API_KEY`: Public project key, sent as the `apikey` header
//! - `PASSKEY_URL_SAFE`: Return-trip encoding (`true` = base64url, `false` = standard base64)
//! - `PASSKEY_REQUEST_TIMEOUT_SECS`: Timeout for each network call (default: 10)
//! - `PASSKEY_RETRY_BACKOFF_MS`: Delay before the single transport retry (default: 500)
//! - `PASSKEY_LOGIN_OUTCOME`: Expected `login-finish` shape
//!   (`auto`, `tokens`, `session`, `redirect`)
//! - `PASSKEY_LOCALE`: Language of user-facing messages (`en` or `ja`)
//! - `PASSKEY_LOGIN_EMAIL`: Optional login hint posted to `login-start`

use anyhow::{anyhow, Context, Result};
use reqwest::Url;
use std::env;
use std::time::Duration;

use crate::codec::Base64Variant;
use crate::error::Locale;
use crate::webauthn::types::OutcomeShape;

/// The four relying-party endpoints a deployment exposes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Endpoint {
    RegisterStart,
    RegisterFinish,
    LoginStart,
    LoginFinish,
}

impl Endpoint {
    /// Endpoint name without the deployment prefix.
    pub fn name(self) -> &'static str {
        match self {
            Endpoint::RegisterStart => "register-start",
            Endpoint::RegisterFinish => "register-finish",
            Endpoint::LoginStart => "login-start",
            Endpoint::LoginFinish => "login-finish",
        }
    }
}

/// Ceremony client configuration
///
/// All fields are public so hosts can build a `Config` by hand (tests do)
/// instead of going through the environment.
///
/// ## Relying-party terminology
/// - **Functions URL**: where the hosted serverless functions live, e.g.
///   `https://project.supabase.co/functions/v1`
/// - **Endpoint prefix**: deployments name their functions
///   `webauthn-login-start` and so on; the prefix is the `webauthn-` part
#[derive(Debug, Clone)]
pub struct Config {
    /// Base URL of the relying-party endpoints
    pub functions_url: Url,

    /// Prefix prepended to every endpoint name
    pub endpoint_prefix: String,

    /// Public project key sent as the `apikey` header, if the backend wants one
    pub api_key: Option<String>,

    /// Which base64 alphabet binary fields use on the way back to the server.
    /// Decoding always accepts both.
    pub wire_encoding: Base64Variant,

    /// Bounded timeout for `start` and `finish` network calls.
    /// The wait for user presence is never bounded.
    pub request_timeout: Duration,

    /// Delay before retrying a call that failed at the transport level
    pub retry_backoff: Duration,

    /// Which `login-finish` response shape this deployment returns
    pub login_outcome: OutcomeShape,

    /// Language for user-facing messages
    pub locale: Locale,

    /// Optional login hint; `login-start` posts `{ email }` when set
    pub login_email: Option<String>,
}

impl Config {
    /// Load configuration from environment variables
    ///
    /// 1. Loads variables from a `.env` file if one exists (dotenvy)
    /// 2. Reads each value, falling back to defaults
    /// 3. Returns an error when a value is present but does not parse
    ///
    /// ## Example .env file
    /// ```text
    /// PASSKEY_FUNCTIONS_URL=https://project.supabase.co/functions/v1
    /// PASSKEY_API_KEY=public-anon-key
    /// PASSKEY_URL_SAFE=false
    /// PASSKEY_LOCALE=ja
    /// ```
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build a configuration from any key/value source.
    ///
    /// `get` returns the raw value of a variable, `None` when unset.
    pub fn from_lookup(get: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let var = |key: &str, default: &str| get(key).unwrap_or_else(|| default.to_string());

        let functions_url = var("PASSKEY_FUNCTIONS_URL", "http://localhost:54321/functions/v1");
        let functions_url = Url::parse(&functions_url).with_context(|| {
            format!("PASSKEY_FUNCTIONS_URL is not a valid URL: {functions_url}")
        })?;
        if functions_url.cannot_be_a_base() {
            return Err(anyhow!(
                "PASSKEY_FUNCTIONS_URL cannot carry endpoint paths: {functions_url}"
            ));
        }

        let url_safe: bool = var("PASSKEY_URL_SAFE", "true")
            .parse()
            .context("PASSKEY_URL_SAFE must be true or false")?;

        let timeout_secs: u64 = var("PASSKEY_REQUEST_TIMEOUT_SECS", "10")
            .parse()
            .context("PASSKEY_REQUEST_TIMEOUT_SECS must be a whole number of seconds")?;

        let backoff_ms: u64 = var("PASSKEY_RETRY_BACKOFF_MS", "500")
            .parse()
            .context("PASSKEY_RETRY_BACKOFF_MS must be a whole number of milliseconds")?;

        let login_outcome = var("PASSKEY_LOGIN_OUTCOME", "auto")
            .parse::<OutcomeShape>()
            .map_err(|e| anyhow!("PASSKEY_LOGIN_OUTCOME: {e}"))?;

        let locale = var("PASSKEY_LOCALE", "en")
            .parse::<Locale>()
            .map_err(|e| anyhow!("PASSKEY_LOCALE: {e}"))?;

        Ok(Config {
            functions_url,
            endpoint_prefix: var("PASSKEY_ENDPOINT_PREFIX", "webauthn-"),
            api_key: get("PASSKEY_API_KEY").filter(|k| !k.is_empty()),
            wire_encoding: Base64Variant::from_url_safe(url_safe),
            request_timeout: Duration::from_secs(timeout_secs),
            retry_backoff: Duration::from_millis(backoff_ms),
            login_outcome,
            locale,
            login_email: get("PASSKEY_LOGIN_EMAIL").filter(|e| !e.is_empty()),
        })
    }

    /// Configuration pointing at `functions_url` with every other value at its default.
    pub fn for_functions_url(functions_url: Url) -> Self {
        Config {
            functions_url,
            endpoint_prefix: "webauthn-".to_string(),
            api_key: None,
            wire_encoding: Base64Variant::UrlSafe,
            request_timeout: Duration::from_secs(10),
            retry_backoff: Duration::from_millis(500),
            login_outcome: OutcomeShape::Auto,
            locale: Locale::En,
            login_email: None,
        }
    }

    /// Full URL of one endpoint, e.g. `.../functions/v1/webauthn-login-start`
    ///
    /// The base URL may or may not end in `/`; both join the same way.
    /// Returns `None` for URLs that cannot carry a path (`mailto:` and the like).
    pub fn endpoint_url(&self, endpoint: Endpoint) -> Option<Url> {
        let mut url = self.functions_url.clone();
        url.path_segments_mut()
            .ok()?
            .pop_if_empty()
            .push(&format!("{}{}", self.endpoint_prefix, endpoint.name()));
        Some(url)
    }
}
