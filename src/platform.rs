//! # Platform Credential API
//!
//! The seam between the ceremony and whatever actually talks to the
//! authenticator (a browser's `navigator.credentials`, a CTAP stack, a test
//! double). Calls into this trait block on the user: biometric prompt,
//! security-key tap, PIN entry. They are never raced against a timer.

use async_trait::async_trait;
use thiserror::Error;

use crate::error::CeremonyError;
use crate::webauthn::types::{
    AssertionCredential, AttestationCredential, PublicKeyCreationOptions, PublicKeyRequestOptions,
};

/// Failures the platform credential API reports.
///
/// Mirrors the DOMException names browsers throw from
/// `navigator.credentials.create/get`.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PlatformError {
    /// `NotAllowedError`: the user dismissed the prompt, or it timed out on
    /// the platform side.
    #[error("not allowed: {0}")]
    NotAllowed(String),

    /// `InvalidStateError` on create: an excluded credential is present.
    #[error("invalid state: {0}")]
    InvalidState(String),

    /// `NotSupportedError`, or no credential API at all.
    #[error("not supported: {0}")]
    NotSupported(String),

    /// No authenticator holds any of the allowed credentials.
    #[error("no matching credential")]
    NoCredentials,

    /// `SecurityError`: RP id / origin mismatch detected by the platform.
    #[error("security error: {0}")]
    Security(String),

    #[error("{0}")]
    Other(String),
}

impl From<PlatformError> for CeremonyError {
    fn from(err: PlatformError) -> Self {
        match err {
            PlatformError::NotAllowed(_) => CeremonyError::UserCancelled,
            PlatformError::InvalidState(_) => CeremonyError::AlreadyRegistered,
            PlatformError::NotSupported(reason) => CeremonyError::AuthenticatorUnavailable(reason),
            PlatformError::NoCredentials => CeremonyError::NoCredentialFound,
            PlatformError::Security(reason) => {
                CeremonyError::VerificationFailed(format!("platform security check: {reason}"))
            }
            PlatformError::Other(reason) => CeremonyError::AuthenticatorUnavailable(reason),
        }
    }
}

/// Access to the platform authenticator.
///
/// `create` and `get` return `Ok(None)` when the platform resolved without
/// a credential; the ceremony treats that as a cancellation.
#[async_trait]
pub trait PlatformAuthenticator: Send + Sync {
    /// Whether a credential API exists at all (roaming keys included).
    fn credential_api_present(&self) -> bool;

    /// Whether a user-verifying platform authenticator (Touch ID, Windows
    /// Hello, Android biometrics) is available, as opposed to roaming keys.
    async fn platform_authenticator_available(&self) -> bool;

    async fn create(
        &self,
        options: PublicKeyCreationOptions,
    ) -> Result<Option<AttestationCredential>, PlatformError>;

    async fn get(
        &self,
        options: PublicKeyRequestOptions,
    ) -> Result<Option<AssertionCredential>, PlatformError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dismissal_maps_to_user_cancelled() {
        let err: CeremonyError =
            PlatformError::NotAllowed("The operation either timed out or was not allowed".into())
                .into();
        assert_eq!(err, CeremonyError::UserCancelled);
    }

    #[test]
    fn missing_credential_maps_to_no_credential_found() {
        let err: CeremonyError = PlatformError::NoCredentials.into();
        assert_eq!(err, CeremonyError::NoCredentialFound);
    }

    #[test]
    fn unsupported_maps_to_authenticator_unavailable() {
        let err: CeremonyError =
            PlatformError::NotSupported("no PublicKeyCredential".into()).into();
        assert!(matches!(err, CeremonyError::AuthenticatorUnavailable(_)));
    }
}
