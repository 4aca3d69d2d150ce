//! # Error Handling
//!
//! This module defines the ceremony error taxonomy and turns every error into
//! exactly one message a user can read.
//!
//! ## Propagation
//! - Codec and transport failures are converted to a typed `CeremonyError`
//!   at the relying-party client boundary.
//! - The ceremony state machine catches every error at each transition and
//!   moves to `Failed` carrying it.
//! - Only `TransportError` is ever retried, and only once.

use std::fmt;
use std::str::FromStr;

use thiserror::Error;

/// Everything that can end a passkey ceremony early.
///
/// Errors carry plain strings rather than source errors so a failed
/// ceremony can be cloned into reports and compared in tests.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CeremonyError {
    /// Registration needs a signed-in principal and none was available,
    /// or the relying party refused the bearer token.
    #[error("Unauthenticated: {0}")]
    Unauthenticated(String),

    /// A challenge or other binary wire field was not valid base64.
    #[error("Malformed challenge: {0}")]
    MalformedChallenge(String),

    /// Network failure, timeout, or a non-2xx response without a JSON body.
    /// Safe to retry once.
    #[error("Transport error: {0}")]
    TransportError(String),

    /// The relying party rejected the signature, origin or challenge.
    /// Never retried: the challenge is already consumed.
    #[error("Verification failed: {0}")]
    VerificationFailed(String),

    /// The relying party answered with a 5xx, malformed JSON, or an outcome
    /// that is missing required fields.
    #[error("Server error: {0}")]
    ServerError(String),

    /// The user dismissed the platform prompt.
    #[error("Cancelled by user")]
    UserCancelled,

    /// This platform has no usable credential API or authenticator.
    #[error("Authenticator unavailable: {0}")]
    AuthenticatorUnavailable(String),

    /// Login was attempted but no authenticator holds a matching credential.
    #[error("No matching credential found")]
    NoCredentialFound,

    /// The authenticator already holds a credential from `excludeCredentials`.
    #[error("Passkey already registered on this authenticator")]
    AlreadyRegistered,

    /// The server verified the ceremony but the host could not install the
    /// resulting session.
    #[error("Session install failed: {0}")]
    SessionInstallFailed(String),
}

/// Convenience alias used across the crate.
pub type CeremonyResult<T> = Result<T, CeremonyError>;

impl CeremonyError {
    /// Whether the relying-party client may transparently retry the call.
    pub fn is_retryable(&self) -> bool {
        matches!(self, CeremonyError::TransportError(_))
    }

    /// Short stable identifier, used as a tracing field.
    pub fn kind(&self) -> &'static str {
        match self {
            CeremonyError::Unauthenticated(_) => "unauthenticated",
            CeremonyError::MalformedChallenge(_) => "malformed_challenge",
            CeremonyError::TransportError(_) => "transport_error",
            CeremonyError::VerificationFailed(_) => "verification_failed",
            CeremonyError::ServerError(_) => "server_error",
            CeremonyError::UserCancelled => "user_cancelled",
            CeremonyError::AuthenticatorUnavailable(_) => "authenticator_unavailable",
            CeremonyError::NoCredentialFound => "no_credential_found",
            CeremonyError::AlreadyRegistered => "already_registered",
            CeremonyError::SessionInstallFailed(_) => "session_install_failed",
        }
    }

    /// The one message shown to the user for this failure.
    ///
    /// Server-provided reasons are surfaced for `VerificationFailed` and
    /// `ServerError`; internal details of transport and codec failures are not.
    pub fn user_message(&self, locale: Locale) -> String {
        match (locale, self) {
            (Locale::En, CeremonyError::Unauthenticated(_)) => {
                "Please sign in before registering a passkey.".to_string()
            }
            (Locale::En, CeremonyError::MalformedChallenge(_)) => {
                "The server sent an invalid passkey challenge. Please try again.".to_string()
            }
            (Locale::En, CeremonyError::TransportError(_)) => {
                "Could not reach the server. Check your connection and try again.".to_string()
            }
            (Locale::En, CeremonyError::VerificationFailed(reason)) => {
                format!("Passkey verification failed: {reason}")
            }
            (Locale::En, CeremonyError::ServerError(reason)) => {
                format!("The server could not complete the request: {reason}")
            }
            (Locale::En, CeremonyError::UserCancelled) => {
                "The passkey prompt was cancelled.".to_string()
            }
            (Locale::En, CeremonyError::AuthenticatorUnavailable(_)) => {
                "This browser does not support passkeys (WebAuthn).".to_string()
            }
            (Locale::En, CeremonyError::NoCredentialFound) => {
                "No passkey for this site was found on this device.".to_string()
            }
            (Locale::En, CeremonyError::AlreadyRegistered) => {
                "A passkey for this account is already registered on this device.".to_string()
            }
            (Locale::En, CeremonyError::SessionInstallFailed(_)) => {
                "Your passkey was accepted but signing in did not complete. Please try again."
                    .to_string()
            }

            (Locale::Ja, CeremonyError::Unauthenticated(_)) => {
                "パスキーを登録するには先にログインしてください。".to_string()
            }
            (Locale::Ja, CeremonyError::MalformedChallenge(_)) => {
                "サーバーから不正なチャレンジを受信しました。もう一度お試しください。".to_string()
            }
            (Locale::Ja, CeremonyError::TransportError(_)) => {
                "サーバーに接続できませんでした。通信環境を確認してもう一度お試しください。"
                    .to_string()
            }
            (Locale::Ja, CeremonyError::VerificationFailed(reason)) => {
                format!("パスキーの検証に失敗しました：{reason}")
            }
            (Locale::Ja, CeremonyError::ServerError(reason)) => {
                format!("サーバーでエラーが発生しました：{reason}")
            }
            (Locale::Ja, CeremonyError::UserCancelled) => {
                "認証がキャンセルされました。".to_string()
            }
            (Locale::Ja, CeremonyError::AuthenticatorUnavailable(_)) => {
                "このブラウザはパスキー(WebAuthn)に対応していません。".to_string()
            }
            (Locale::Ja, CeremonyError::NoCredentialFound) => {
                "この端末にこのサイトのパスキーが見つかりませんでした。".to_string()
            }
            (Locale::Ja, CeremonyError::AlreadyRegistered) => {
                "この端末には既にパスキーが登録されています。".to_string()
            }
            (Locale::Ja, CeremonyError::SessionInstallFailed(_)) => {
                "パスキーは確認されましたが、ログインを完了できませんでした。".to_string()
            }
        }
    }
}

/// Language of user-facing messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Locale {
    #[default]
    En,
    Ja,
}

impl FromStr for Locale {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "en" => Ok(Locale::En),
            "ja" => Ok(Locale::Ja),
            other => Err(format!("unsupported locale '{other}', expected 'en' or 'ja'")),
        }
    }
}

impl fmt::Display for Locale {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Locale::En => f.write_str("en"),
            Locale::Ja => f.write_str("ja"),
        }
    }
}
