//! # Ceremony State Machine
//!
//! Drives one registration or login from button press to installed session:
//!
//! ```text
//! Idle -> Starting -> AwaitingUserPresence -> Finishing -> Succeeded
//!   \________\_______________\_____________________\____-> Failed
//! ```
//!
//! - Every `run` builds a fresh `CeremonySession`; nothing is shared
//!   between ceremonies and nothing outlives one.
//! - Registration without an active session fails before `Starting`, so no
//!   request is made.
//! - The wait in `AwaitingUserPresence` is unbounded; only the user ends it.
//! - `finish` is issued at most once per started challenge.
//! - Rejecting a second ceremony while one awaits the user is the UI's job
//!   (disable the button), not this module's.

use std::fmt;

use tracing::{debug, info, info_span, warn, Instrument};
use uuid::Uuid;

use crate::codec::Codec;
use crate::config::Config;
use crate::error::{CeremonyError, CeremonyResult, Locale};
use crate::gate::{CapabilityGate, GateDecision};
use crate::platform::PlatformAuthenticator;
use crate::rp_client::{RelyingParty, RelyingPartyClient};
use crate::session::{Navigator, SessionAdapter, SessionStore};
use crate::webauthn::types::{
    CeremonyKind, CeremonyOutcome, ChallengeOptions, FinishPayload, StartedCeremony,
};
use crate::webauthn::{authentication, registration};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CeremonyPhase {
    Idle,
    Starting,
    AwaitingUserPresence,
    Finishing,
    Succeeded,
    Failed,
}

impl CeremonyPhase {
    pub fn is_terminal(self) -> bool {
        matches!(self, CeremonyPhase::Succeeded | CeremonyPhase::Failed)
    }
}

impl fmt::Display for CeremonyPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            CeremonyPhase::Idle => "idle",
            CeremonyPhase::Starting => "starting",
            CeremonyPhase::AwaitingUserPresence => "awaiting_user_presence",
            CeremonyPhase::Finishing => "finishing",
            CeremonyPhase::Succeeded => "succeeded",
            CeremonyPhase::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Transient per-ceremony state. Never persisted.
#[derive(Debug)]
struct CeremonySession {
    id: Uuid,
    kind: CeremonyKind,
    phase: CeremonyPhase,
    transitions: Vec<CeremonyPhase>,
    access_token: Option<String>,
}

impl CeremonySession {
    fn new(kind: CeremonyKind) -> Self {
        Self {
            id: Uuid::new_v4(),
            kind,
            phase: CeremonyPhase::Idle,
            transitions: vec![CeremonyPhase::Idle],
            access_token: None,
        }
    }

    fn advance(&mut self, next: CeremonyPhase) {
        debug!(from = %self.phase, to = %next, "ceremony transition");
        self.phase = next;
        self.transitions.push(next);
    }
}

/// How one ceremony ended.
#[derive(Debug, Clone)]
pub struct CeremonyReport {
    pub id: Uuid,
    pub kind: CeremonyKind,
    /// Every phase entered, starting with `Idle`, ending with a terminal phase.
    pub transitions: Vec<CeremonyPhase>,
    pub result: CeremonyResult<CeremonyOutcome>,
}

impl CeremonyReport {
    pub fn phase(&self) -> CeremonyPhase {
        self.transitions
            .last()
            .copied()
            .unwrap_or(CeremonyPhase::Idle)
    }

    pub fn succeeded(&self) -> bool {
        self.phase() == CeremonyPhase::Succeeded
    }

    pub fn error(&self) -> Option<&CeremonyError> {
        self.result.as_ref().err()
    }

    pub fn entered(&self, phase: CeremonyPhase) -> bool {
        self.transitions.contains(&phase)
    }

    /// The single localized message for a failed ceremony.
    pub fn user_message(&self, locale: Locale) -> Option<String> {
        self.error().map(|err| err.user_message(locale))
    }
}

/// Runs passkey ceremonies for one host application.
///
/// Holds only the injected collaborators; all per-ceremony state lives in a
/// `CeremonySession` created by each call.
pub struct CeremonyClient<R, P, S, N> {
    relying_party: R,
    platform: P,
    sessions: SessionAdapter<S, N>,
    codec: Codec,
    locale: Locale,
}

impl<P, S, N> CeremonyClient<RelyingPartyClient, P, S, N>
where
    P: PlatformAuthenticator,
    S: SessionStore,
    N: Navigator,
{
    /// Wire an HTTP relying-party client from `config`.
    pub fn from_config(
        config: Config,
        platform: P,
        store: S,
        navigator: N,
    ) -> CeremonyResult<Self> {
        let codec = Codec::new(config.wire_encoding);
        let locale = config.locale;
        let relying_party = RelyingPartyClient::new(config)?;
        Ok(Self::new(
            relying_party,
            platform,
            SessionAdapter::new(store, navigator),
            codec,
            locale,
        ))
    }
}

impl<R, P, S, N> CeremonyClient<R, P, S, N>
where
    R: RelyingParty,
    P: PlatformAuthenticator,
    S: SessionStore,
    N: Navigator,
{
    pub fn new(
        relying_party: R,
        platform: P,
        sessions: SessionAdapter<S, N>,
        codec: Codec,
        locale: Locale,
    ) -> Self {
        Self {
            relying_party,
            platform,
            sessions,
            codec,
            locale,
        }
    }

    pub fn relying_party(&self) -> &R {
        &self.relying_party
    }

    pub fn platform(&self) -> &P {
        &self.platform
    }

    pub fn sessions(&self) -> &SessionAdapter<S, N> {
        &self.sessions
    }

    pub fn locale(&self) -> Locale {
        self.locale
    }

    pub fn gate(&self) -> CapabilityGate<'_, P> {
        CapabilityGate::new(&self.platform, self.locale)
    }

    /// Capability pre-check. Call before `register`/`login`.
    pub async fn guard(&self, kind: CeremonyKind) -> GateDecision {
        self.gate().guard(kind).await
    }

    /// "Register this device": create a passkey for the signed-in principal.
    pub async fn register(&self) -> CeremonyReport {
        self.run(CeremonyKind::Registration).await
    }

    /// "Sign in with passkey".
    pub async fn login(&self) -> CeremonyReport {
        self.run(CeremonyKind::Login).await
    }

    pub async fn run(&self, kind: CeremonyKind) -> CeremonyReport {
        let mut session = CeremonySession::new(kind);
        let span = info_span!("passkey_ceremony", ceremony_id = %session.id, %kind);

        async move {
            let result = self.drive(&mut session).await;
            match &result {
                Ok(_) => {
                    session.advance(CeremonyPhase::Succeeded);
                    info!("passkey ceremony succeeded");
                }
                Err(err) => {
                    let failed_in = session.phase;
                    session.advance(CeremonyPhase::Failed);
                    warn!(
                        error_kind = err.kind(),
                        %failed_in,
                        error = %err,
                        "passkey ceremony failed"
                    );
                }
            }
            CeremonyReport {
                id: session.id,
                kind,
                transitions: session.transitions,
                result,
            }
        }
        .instrument(span)
        .await
    }

    async fn drive(&self, session: &mut CeremonySession) -> CeremonyResult<CeremonyOutcome> {
        if session.kind.requires_bearer() {
            session.access_token = self.sessions.current_access_token().await;
            if session.access_token.is_none() {
                return Err(CeremonyError::Unauthenticated(
                    "no active session to register a passkey for".to_string(),
                ));
            }
        }

        session.advance(CeremonyPhase::Starting);
        let StartedCeremony {
            options,
            expected_challenge,
        } = self
            .relying_party
            .start(session.kind, session.access_token.as_deref())
            .await?;

        let payload = match options {
            ChallengeOptions::Creation(options) => {
                let options = registration::creation_options_for_platform(&self.codec, &options)?;
                session.advance(CeremonyPhase::AwaitingUserPresence);
                let credential = self
                    .platform
                    .create(options)
                    .await?
                    .ok_or(CeremonyError::UserCancelled)?;
                let attestation = registration::encode_attestation(&self.codec, credential);
                FinishPayload::Attestation(attestation)
            }
            ChallengeOptions::Request(options) => {
                if options.is_discoverable() {
                    debug!("discoverable credential mode");
                }
                let options = authentication::request_options_for_platform(&self.codec, &options)?;
                session.advance(CeremonyPhase::AwaitingUserPresence);
                let credential = self
                    .platform
                    .get(options)
                    .await?
                    .ok_or(CeremonyError::UserCancelled)?;
                FinishPayload::Assertion(authentication::encode_assertion(&self.codec, credential))
            }
        };

        session.advance(CeremonyPhase::Finishing);
        let outcome = self
            .relying_party
            .finish(payload, expected_challenge, session.access_token.as_deref())
            .await?;

        self.sessions.install(outcome.clone()).await?;
        Ok(outcome)
    }
}
