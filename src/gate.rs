//! # Capability Gate
//!
//! Checks, before any network traffic, that this platform can run a passkey
//! ceremony at all, and turns "no" into a message the user can act on.

use tracing::info;

use crate::error::{CeremonyError, Locale};
use crate::platform::PlatformAuthenticator;
use crate::webauthn::types::CeremonyKind;

/// Result of [`CapabilityGate::guard`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GateDecision {
    Proceed,
    /// Do not start the ceremony; show this instead.
    Blocked(String),
}

impl GateDecision {
    pub fn is_proceed(&self) -> bool {
        matches!(self, GateDecision::Proceed)
    }
}

pub struct CapabilityGate<'a, P: ?Sized> {
    platform: &'a P,
    locale: Locale,
}

impl<'a, P: PlatformAuthenticator + ?Sized> CapabilityGate<'a, P> {
    pub fn new(platform: &'a P, locale: Locale) -> Self {
        Self { platform, locale }
    }

    /// Whether a user-verifying platform authenticator is usable here.
    ///
    /// False when the credential API is missing entirely; otherwise asks the
    /// platform specifically about built-in authenticators.
    pub async fn platform_authenticator_available(&self) -> bool {
        self.platform.credential_api_present()
            && self.platform.platform_authenticator_available().await
    }

    /// Call before starting a ceremony.
    ///
    /// Only a missing credential API blocks: a platform without a built-in
    /// authenticator can still complete both ceremonies with a roaming
    /// security key or a phone.
    pub async fn guard(&self, action: CeremonyKind) -> GateDecision {
        if !self.platform.credential_api_present() {
            let err = CeremonyError::AuthenticatorUnavailable(
                "no platform credential API".to_string(),
            );
            info!(%action, "passkey ceremony blocked: credential API missing");
            return GateDecision::Blocked(err.user_message(self.locale));
        }
        GateDecision::Proceed
    }
}
