//! # Session Adapter
//!
//! Turns a successful ceremony outcome into an authenticated session in the
//! host application, and answers "who is signed in right now" for the
//! registration pre-check.
//!
//! The host's session store and navigator are injected; this module keeps
//! no state of its own.

use std::sync::Mutex;

use async_trait::async_trait;
use base64::prelude::*;
use chrono::{DateTime, Utc};
use reqwest::Url;
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, info};

use crate::error::{CeremonyError, CeremonyResult};
use crate::webauthn::types::{CeremonyOutcome, TokenPair};

/// Why the host refused to install a session.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SessionStoreError {
    #[error("malformed token: {0}")]
    MalformedToken(String),
    #[error("session store unavailable: {0}")]
    Unavailable(String),
}

/// The host application's session store.
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Make `tokens` the active session.
    async fn set_session(&self, tokens: TokenPair) -> Result<(), SessionStoreError>;

    /// The active, non-expired access token, if any.
    async fn access_token(&self) -> Option<String>;
}

/// The host's way of following a redirect artifact.
#[async_trait]
pub trait Navigator: Send + Sync {
    async fn navigate(&self, target: &Url) -> Result<(), String>;
}

/// Installs ceremony outcomes into the injected host session store.
pub struct SessionAdapter<S, N> {
    store: S,
    navigator: N,
}

impl<S: SessionStore, N: Navigator> SessionAdapter<S, N> {
    pub fn new(store: S, navigator: N) -> Self {
        Self { store, navigator }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn navigator(&self) -> &N {
        &self.navigator
    }

    /// Materialize the outcome as the host's authenticated session.
    ///
    /// ## Errors
    /// - SessionInstallFailed: the store rejected the tokens, or navigation
    ///   failed. Reported as a ceremony failure even though the server
    ///   verified the credential.
    pub async fn install(&self, outcome: CeremonyOutcome) -> CeremonyResult<()> {
        match outcome {
            CeremonyOutcome::Tokens(tokens) => {
                self.store
                    .set_session(tokens)
                    .await
                    .map_err(|e| CeremonyError::SessionInstallFailed(e.to_string()))?;
                info!("installed session tokens");
            }
            CeremonyOutcome::Redirect(target) => {
                self.navigator
                    .navigate(&target)
                    .await
                    .map_err(CeremonyError::SessionInstallFailed)?;
                info!(
                    host = target.host_str().unwrap_or_default(),
                    "navigated to redirect artifact"
                );
            }
            CeremonyOutcome::ServerManaged => {
                debug!("server-managed session, nothing to install");
            }
        }
        Ok(())
    }

    pub async fn current_access_token(&self) -> Option<String> {
        self.store.access_token().await
    }
}

/// In-process session store for headless hosts and tests.
///
/// Tokens containing `.` are treated as JWTs and must decode to three
/// segments with a JSON-object payload. A JWT's `exp` claim is honoured.
/// Other tokens are opaque and never expire.
#[derive(Debug, Default)]
pub struct MemorySessionStore {
    active: Mutex<Option<StoredSession>>,
}

#[derive(Debug, Clone)]
struct StoredSession {
    tokens: TokenPair,
    expires_at: Option<DateTime<Utc>>,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn clear(&self) {
        if let Ok(mut active) = self.active.lock() {
            *active = None;
        }
    }

    /// The full pair currently installed, expired or not.
    pub fn tokens(&self) -> Option<TokenPair> {
        self.active
            .lock()
            .ok()
            .and_then(|active| active.as_ref().map(|s| s.tokens.clone()))
    }
}

#[async_trait]
impl SessionStore for MemorySessionStore {
    async fn set_session(&self, tokens: TokenPair) -> Result<(), SessionStoreError> {
        if tokens.access_token.is_empty() || tokens.refresh_token.is_empty() {
            return Err(SessionStoreError::MalformedToken("empty token".to_string()));
        }
        let expires_at = token_expiry(&tokens.access_token)?;

        let mut active = self
            .active
            .lock()
            .map_err(|_| SessionStoreError::Unavailable("session lock poisoned".to_string()))?;
        *active = Some(StoredSession { tokens, expires_at });
        Ok(())
    }

    async fn access_token(&self) -> Option<String> {
        let active = self.active.lock().ok()?;
        let session = active.as_ref()?;
        match session.expires_at {
            Some(exp) if exp <= Utc::now() => None,
            _ => Some(session.tokens.access_token.clone()),
        }
    }
}

/// `exp` of a JWT-shaped token, `None` for opaque tokens.
fn token_expiry(token: &str) -> Result<Option<DateTime<Utc>>, SessionStoreError> {
    if !token.contains('.') {
        return Ok(None);
    }
    let segments: Vec<&str> = token.split('.').collect();
    let [_, payload, _] = segments.as_slice() else {
        return Err(SessionStoreError::MalformedToken(format!(
            "expected 3 JWT segments, found {}",
            segments.len()
        )));
    };
    let bytes = BASE64_URL_SAFE_NO_PAD
        .decode(payload.trim_end_matches('='))
        .map_err(|e| SessionStoreError::MalformedToken(format!("JWT payload: {e}")))?;
    let claims: Value = serde_json::from_slice(&bytes)
        .map_err(|e| SessionStoreError::MalformedToken(format!("JWT claims: {e}")))?;
    if !claims.is_object() {
        return Err(SessionStoreError::MalformedToken(
            "JWT claims are not an object".to_string(),
        ));
    }
    claims.get("exp").map(numeric_date).transpose()
}

/// RFC 7519 NumericDate: seconds since the epoch, possibly fractional.
fn numeric_date(exp: &Value) -> Result<DateTime<Utc>, SessionStoreError> {
    let invalid =
        || SessionStoreError::MalformedToken(format!("JWT exp is not a NumericDate: {exp}"));
    let instant = match exp.as_i64() {
        Some(secs) => DateTime::from_timestamp(secs, 0),
        None => {
            let secs = exp.as_f64().filter(|s| s.is_finite()).ok_or_else(invalid)?;
            let whole = secs.floor();
            DateTime::from_timestamp(whole as i64, ((secs - whole) * 1e9) as u32)
        }
    };
    instant.ok_or_else(invalid)
}

/// Records redirect targets for the host to follow.
#[derive(Debug, Default)]
pub struct RecordingNavigator {
    last: Mutex<Option<Url>>,
}

impl RecordingNavigator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Take the pending redirect, if any.
    pub fn take(&self) -> Option<Url> {
        self.last.lock().ok().and_then(|mut last| last.take())
    }
}

#[async_trait]
impl Navigator for RecordingNavigator {
    async fn navigate(&self, target: &Url) -> Result<(), String> {
        let mut last = self
            .last
            .lock()
            .map_err(|_| "navigator lock poisoned".to_string())?;
        *last = Some(target.clone());
        Ok(())
    }
}
