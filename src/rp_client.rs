//! # Relying-Party Client
//!
//! Performs the two HTTP round trips of each ceremony against the
//! deployment's `register-start`, `register-finish`, `login-start` and
//! `login-finish` endpoints.
//!
//! ## Authentication
//! Registration calls carry the principal's bearer token. Login calls never
//! do: the principal is not known until the assertion is verified.
//!
//! ## Failure classification
//! | Response | Error |
//! |---|---|
//! | no response, timeout, body read failure | `TransportError` |
//! | non-2xx without a JSON body | `TransportError` |
//! | 2xx with malformed JSON | `ServerError` |
//! | 5xx with a JSON body | `ServerError` |
//! | 401/403 on `register-start` | `Unauthenticated` |
//! | other 4xx on a start endpoint | `ServerError` |
//! | 4xx on a finish endpoint | `VerificationFailed` |
//!
//! `TransportError` is retried once after the configured backoff, with the
//! identical request body. Nothing else is retried.

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::Serialize;
use serde_json::{Map, Value};
use tracing::{debug, warn};

use crate::config::{Config, Endpoint};
use crate::error::{CeremonyError, CeremonyResult};
use crate::webauthn::types::{
    AssertionResponse, AttestationResponse, CeremonyKind, CeremonyOutcome, ExpectedChallenge,
    FinishPayload, OutcomeShape, StartedCeremony,
};

/// The two network operations a ceremony needs from its relying party.
#[async_trait]
pub trait RelyingParty: Send + Sync {
    /// Fetch fresh challenge options.
    ///
    /// Registration requires `access_token`; without one this fails with
    /// `Unauthenticated` before any request is made.
    async fn start(
        &self,
        kind: CeremonyKind,
        access_token: Option<&str>,
    ) -> CeremonyResult<StartedCeremony>;

    /// Post the platform's response together with the challenge exactly as
    /// it was issued. Consumes the challenge.
    async fn finish(
        &self,
        payload: FinishPayload,
        expected_challenge: ExpectedChallenge,
        access_token: Option<&str>,
    ) -> CeremonyResult<CeremonyOutcome>;
}

/// `reqwest`-backed relying-party client.
#[derive(Debug, Clone)]
pub struct RelyingPartyClient {
    http: reqwest::Client,
    config: Config,
}

#[derive(Serialize)]
struct StartBody<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    email: Option<&'a str>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct RegisterFinishBody<'a> {
    attestation_response: &'a AttestationResponse,
    expected_challenge: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct LoginFinishBody<'a> {
    assertion_response: &'a AssertionResponse,
    expected_challenge: &'a str,
}

impl RelyingPartyClient {
    /// Build a client whose every request is bounded by `config.request_timeout`.
    pub fn new(config: Config) -> CeremonyResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| {
                CeremonyError::TransportError(format!("failed to build HTTP client: {e}"))
            })?;
        Ok(Self { http, config })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// The bearer to attach for `kind`, or `Unauthenticated`.
    fn bearer_for<'a>(
        &self,
        kind: CeremonyKind,
        access_token: Option<&'a str>,
    ) -> CeremonyResult<Option<&'a str>> {
        if !kind.requires_bearer() {
            return Ok(None);
        }
        match access_token {
            Some(token) if !token.is_empty() => Ok(Some(token)),
            _ => Err(CeremonyError::Unauthenticated(
                "registration requires a signed-in session".to_string(),
            )),
        }
    }

    /// POST with the single transport retry.
    async fn call<B: Serialize + Sync>(
        &self,
        endpoint: Endpoint,
        body: &B,
        bearer: Option<&str>,
    ) -> CeremonyResult<Value> {
        match self.attempt(endpoint, body, bearer, 1).await {
            Err(err) if err.is_retryable() => {
                warn!(
                    endpoint = endpoint.name(),
                    error = %err,
                    backoff_ms = self.config.retry_backoff.as_millis() as u64,
                    "transport failure, retrying once"
                );
                tokio::time::sleep(self.config.retry_backoff).await;
                self.attempt(endpoint, body, bearer, 2).await
            }
            other => other,
        }
    }

    async fn attempt<B: Serialize + Sync>(
        &self,
        endpoint: Endpoint,
        body: &B,
        bearer: Option<&str>,
        attempt: u32,
    ) -> CeremonyResult<Value> {
        let url = self.config.endpoint_url(endpoint).ok_or_else(|| {
            CeremonyError::TransportError(format!(
                "{} cannot carry endpoint paths",
                self.config.functions_url
            ))
        })?;

        let mut request = self.http.post(url).json(body);
        if let Some(key) = &self.config.api_key {
            request = request.header("apikey", key);
        }
        if let Some(token) = bearer {
            request = request.bearer_auth(token);
        }

        debug!(endpoint = endpoint.name(), attempt, "posting to relying party");
        let response = request
            .send()
            .await
            .map_err(|e| CeremonyError::TransportError(e.to_string()))?;
        let status = response.status();
        let bytes = response
            .bytes()
            .await
            .map_err(|e| CeremonyError::TransportError(e.to_string()))?;
        debug!(
            endpoint = endpoint.name(),
            attempt,
            status = status.as_u16(),
            "relying party responded"
        );

        classify_response(endpoint, status, &bytes)
    }
}

#[async_trait]
impl RelyingParty for RelyingPartyClient {
    async fn start(
        &self,
        kind: CeremonyKind,
        access_token: Option<&str>,
    ) -> CeremonyResult<StartedCeremony> {
        let bearer = self.bearer_for(kind, access_token)?;
        let body = StartBody {
            email: match kind {
                CeremonyKind::Login => self.config.login_email.as_deref(),
                CeremonyKind::Registration => None,
            },
        };
        let value = self.call(kind.start_endpoint(), &body, bearer).await?;
        StartedCeremony::from_response(kind, value)
    }

    async fn finish(
        &self,
        payload: FinishPayload,
        expected_challenge: ExpectedChallenge,
        access_token: Option<&str>,
    ) -> CeremonyResult<CeremonyOutcome> {
        let kind = payload.kind();
        let bearer = self.bearer_for(kind, access_token)?;
        let endpoint = kind.finish_endpoint();

        let value = match &payload {
            FinishPayload::Attestation(attestation) => {
                let body = RegisterFinishBody {
                    attestation_response: attestation,
                    expected_challenge: expected_challenge.as_str(),
                };
                self.call(endpoint, &body, bearer).await?
            }
            FinishPayload::Assertion(assertion) => {
                let body = LoginFinishBody {
                    assertion_response: assertion,
                    expected_challenge: expected_challenge.as_str(),
                };
                self.call(endpoint, &body, bearer).await?
            }
        };

        let shape = match kind {
            CeremonyKind::Login => self.config.login_outcome,
            CeremonyKind::Registration => OutcomeShape::Auto,
        };
        CeremonyOutcome::from_response(&value, shape)
    }
}

/// Map one HTTP response onto a JSON value or a typed error.
fn classify_response(endpoint: Endpoint, status: StatusCode, body: &[u8]) -> CeremonyResult<Value> {
    let blank = body.iter().all(u8::is_ascii_whitespace);

    if status.is_success() {
        if blank {
            return Ok(Value::Object(Map::new()));
        }
        return serde_json::from_slice(body).map_err(|e| {
            CeremonyError::ServerError(format!("malformed JSON from {}: {e}", endpoint.name()))
        });
    }

    let parsed = if blank {
        None
    } else {
        serde_json::from_slice::<Value>(body).ok()
    };
    let Some(json) = parsed else {
        return Err(CeremonyError::TransportError(format!(
            "{} returned HTTP {}",
            endpoint.name(),
            status.as_u16()
        )));
    };

    let reason = error_reason(&json).unwrap_or_else(|| {
        status
            .canonical_reason()
            .map(str::to_string)
            .unwrap_or_else(|| format!("HTTP {}", status.as_u16()))
    });

    let is_finish = matches!(endpoint, Endpoint::RegisterFinish | Endpoint::LoginFinish);
    Err(match status {
        s if s.is_server_error() => CeremonyError::ServerError(reason),
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN if endpoint == Endpoint::RegisterStart => {
            CeremonyError::Unauthenticated(reason)
        }
        s if s.is_client_error() && is_finish => CeremonyError::VerificationFailed(reason),
        _ => CeremonyError::ServerError(reason),
    })
}

/// Server-provided reason text, from the first of the usual fields.
fn error_reason(json: &Value) -> Option<String> {
    ["error", "message", "error_description", "msg"]
        .iter()
        .find_map(|key| match json.get(*key) {
            Some(Value::String(text)) if !text.is_empty() => Some(text.clone()),
            Some(Value::Object(inner)) => inner
                .get("message")
                .and_then(Value::as_str)
                .map(str::to_string),
            _ => None,
        })
}
