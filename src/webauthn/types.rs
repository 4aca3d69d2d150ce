//! # WebAuthn Ceremony Types
//!
//! This module defines two families of types:
//!
//! - **Wire types**: what the relying party sends and receives. Every binary
//!   value is base64 text here.
//! - **Platform types**: what the platform credential API consumes and
//!   produces. Every binary value is raw bytes here.
//!
//! The `registration` and `authentication` modules convert between the two
//! through the [`Codec`](crate::codec::Codec).

use std::fmt;
use std::str::FromStr;

use reqwest::Url;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::config::Endpoint;
use crate::error::{CeremonyError, CeremonyResult};

/// The only credential type WebAuthn defines.
pub const PUBLIC_KEY_CREDENTIAL_TYPE: &str = "public-key";

/// Which ceremony is being run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CeremonyKind {
    /// Create a new passkey for the signed-in principal
    Registration,
    /// Sign in with an existing passkey
    Login,
}

impl CeremonyKind {
    pub fn start_endpoint(self) -> Endpoint {
        match self {
            CeremonyKind::Registration => Endpoint::RegisterStart,
            CeremonyKind::Login => Endpoint::LoginStart,
        }
    }

    pub fn finish_endpoint(self) -> Endpoint {
        match self {
            CeremonyKind::Registration => Endpoint::RegisterFinish,
            CeremonyKind::Login => Endpoint::LoginFinish,
        }
    }

    /// Registration needs a bearer token; login cannot have one yet.
    pub fn requires_bearer(self) -> bool {
        matches!(self, CeremonyKind::Registration)
    }
}

impl fmt::Display for CeremonyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CeremonyKind::Registration => f.write_str("registration"),
            CeremonyKind::Login => f.write_str("login"),
        }
    }
}

// ---------------------------------------------------------------------------
// Wire types: start responses
// ---------------------------------------------------------------------------

/// Identifies one registered authenticator.
///
/// ## Example JSON
/// ```json
/// { "id": "q83vEjRWeJA", "type": "public-key", "transports": ["internal"] }
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CredentialDescriptor {
    pub id: String,
    #[serde(rename = "type")]
    pub cred_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transports: Option<Vec<String>>,
}

impl CredentialDescriptor {
    pub fn is_public_key(&self) -> bool {
        self.cred_type == PUBLIC_KEY_CREDENTIAL_TYPE
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelyingPartyInfo {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub name: String,
}

/// The principal a credential is being created for. `id` is the user
/// handle, base64url on the wire.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserInfo {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub display_name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PubKeyCredParam {
    #[serde(rename = "type")]
    pub cred_type: String,
    /// COSE algorithm identifier, e.g. -7 (ES256) or -257 (RS256)
    pub alg: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthenticatorSelection {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub authenticator_attachment: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resident_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub require_resident_key: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_verification: Option<String>,
}

/// `register-start` options.
///
/// ## Example JSON
/// ```json
/// {
///   "challenge": "abc123_-",
///   "rp": { "id": "notes.example", "name": "Lecture Notes" },
///   "user": { "id": "dXNlci0x", "name": "alice@example.com", "displayName": "alice" },
///   "pubKeyCredParams": [{ "type": "public-key", "alg": -7 }],
///   "excludeCredentials": []
/// }
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreationOptions {
    pub challenge: String,
    pub rp: RelyingPartyInfo,
    pub user: UserInfo,
    #[serde(default)]
    pub pub_key_cred_params: Vec<PubKeyCredParam>,
    #[serde(default)]
    pub exclude_credentials: Vec<CredentialDescriptor>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub authenticator_selection: Option<AuthenticatorSelection>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attestation: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout: Option<u64>,
}

/// `login-start` options. An empty `allowCredentials` means discoverable
/// mode: the authenticator picks the credential itself.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestOptions {
    pub challenge: String,
    #[serde(default)]
    pub allow_credentials: Vec<CredentialDescriptor>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_verification: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rp_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout: Option<u64>,
}

impl RequestOptions {
    pub fn is_discoverable(&self) -> bool {
        self.allow_credentials.is_empty()
    }
}

/// Server-issued options for either ceremony.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChallengeOptions {
    Creation(CreationOptions),
    Request(RequestOptions),
}

impl ChallengeOptions {
    pub fn kind(&self) -> CeremonyKind {
        match self {
            ChallengeOptions::Creation(_) => CeremonyKind::Registration,
            ChallengeOptions::Request(_) => CeremonyKind::Login,
        }
    }

    pub fn challenge(&self) -> &str {
        match self {
            ChallengeOptions::Creation(options) => &options.challenge,
            ChallengeOptions::Request(options) => &options.challenge,
        }
    }
}

/// The challenge string exactly as the relying party issued it.
///
/// It is echoed back unmodified in the finish call, never re-encoded.
/// Not `Clone`: handing it to `finish` consumes it, so one started
/// ceremony can only ever be finished once.
#[derive(PartialEq, Eq)]
pub struct ExpectedChallenge(String);

impl ExpectedChallenge {
    pub fn new(issued: impl Into<String>) -> Self {
        Self(issued.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for ExpectedChallenge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ExpectedChallenge({} chars)", self.0.len())
    }
}

/// Result of a successful `start()` call.
#[derive(Debug)]
pub struct StartedCeremony {
    pub options: ChallengeOptions,
    pub expected_challenge: ExpectedChallenge,
}

impl StartedCeremony {
    /// Normalize a start response body.
    ///
    /// Options arrive either flat or nested under `publicKey`. When nested,
    /// a top-level `challenge` is the value to echo back; otherwise the
    /// options' own challenge string is.
    pub fn from_response(kind: CeremonyKind, body: Value) -> CeremonyResult<Self> {
        let Value::Object(mut top) = body else {
            return Err(CeremonyError::ServerError(format!(
                "{kind}-start returned a non-object body"
            )));
        };

        let top_challenge = match top.get("challenge") {
            Some(Value::String(c)) => Some(c.clone()),
            _ => None,
        };
        let options_value = match top.remove("publicKey") {
            Some(nested @ Value::Object(_)) => nested,
            _ => Value::Object(top),
        };

        let options = match kind {
            CeremonyKind::Registration => serde_json::from_value(options_value)
                .map(ChallengeOptions::Creation),
            CeremonyKind::Login => {
                serde_json::from_value(options_value).map(ChallengeOptions::Request)
            }
        }
        .map_err(|e| CeremonyError::ServerError(format!("{kind}-start options: {e}")))?;

        let expected = top_challenge.unwrap_or_else(|| options.challenge().to_string());
        Ok(StartedCeremony {
            options,
            expected_challenge: ExpectedChallenge::new(expected),
        })
    }
}

// ---------------------------------------------------------------------------
// Wire types: finish requests
// ---------------------------------------------------------------------------

/// Registration result, encoded for the relying party.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttestationResponse {
    pub id: String,
    pub raw_id: String,
    #[serde(rename = "type")]
    pub cred_type: String,
    pub response: AttestationPayload,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub authenticator_attachment: Option<String>,
    #[serde(default)]
    pub client_extension_results: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttestationPayload {
    #[serde(rename = "clientDataJSON")]
    pub client_data_json: String,
    #[serde(rename = "attestationObject")]
    pub attestation_object: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub transports: Vec<String>,
}

/// Login result, encoded for the relying party.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssertionResponse {
    pub id: String,
    pub raw_id: String,
    #[serde(rename = "type")]
    pub cred_type: String,
    pub response: AssertionPayload,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub authenticator_attachment: Option<String>,
    #[serde(default)]
    pub client_extension_results: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssertionPayload {
    #[serde(rename = "clientDataJSON")]
    pub client_data_json: String,
    #[serde(rename = "authenticatorData")]
    pub authenticator_data: String,
    pub signature: String,
    /// Sent as `null` when the authenticator returned no user handle.
    #[serde(rename = "userHandle")]
    pub user_handle: Option<String>,
}

/// Whatever the platform produced, ready for the finish call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FinishPayload {
    Attestation(AttestationResponse),
    Assertion(AssertionResponse),
}

impl FinishPayload {
    pub fn kind(&self) -> CeremonyKind {
        match self {
            FinishPayload::Attestation(_) => CeremonyKind::Registration,
            FinishPayload::Assertion(_) => CeremonyKind::Login,
        }
    }
}

// ---------------------------------------------------------------------------
// Platform types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlatformCredentialDescriptor {
    pub id: Vec<u8>,
    pub transports: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlatformUser {
    pub id: Vec<u8>,
    pub name: String,
    pub display_name: String,
}

/// Decoded options for the platform `create` call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublicKeyCreationOptions {
    pub challenge: Vec<u8>,
    pub rp: RelyingPartyInfo,
    pub user: PlatformUser,
    pub pub_key_cred_params: Vec<PubKeyCredParam>,
    pub exclude_credentials: Vec<PlatformCredentialDescriptor>,
    pub authenticator_selection: Option<AuthenticatorSelection>,
    pub attestation: Option<String>,
    pub timeout: Option<u64>,
}

/// Decoded options for the platform `get` call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublicKeyRequestOptions {
    pub challenge: Vec<u8>,
    pub allow_credentials: Vec<PlatformCredentialDescriptor>,
    pub user_verification: Option<String>,
    pub rp_id: Option<String>,
    pub timeout: Option<u64>,
}

/// What the platform `create` call returned.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttestationCredential {
    pub id: String,
    pub raw_id: Vec<u8>,
    pub client_data_json: Vec<u8>,
    pub attestation_object: Vec<u8>,
    pub transports: Vec<String>,
    pub authenticator_attachment: Option<String>,
}

/// What the platform `get` call returned.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssertionCredential {
    pub id: String,
    pub raw_id: Vec<u8>,
    pub client_data_json: Vec<u8>,
    pub authenticator_data: Vec<u8>,
    pub signature: Vec<u8>,
    pub user_handle: Option<Vec<u8>>,
    pub authenticator_attachment: Option<String>,
}

// ---------------------------------------------------------------------------
// Outcomes
// ---------------------------------------------------------------------------

/// Bearer token pair issued by the relying party.
#[derive(Clone, PartialEq, Eq)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
}

impl fmt::Debug for TokenPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenPair")
            .field("access_token", &"<redacted>")
            .field("refresh_token", &"<redacted>")
            .finish()
    }
}

/// What a successful finish call hands to the session adapter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CeremonyOutcome {
    /// Install these tokens as the active session.
    Tokens(TokenPair),
    /// Navigate here; the session is installed server-side.
    Redirect(Url),
    /// The server answered `{}` (or an acknowledgement) and manages the
    /// session itself; nothing to install client-side.
    ServerManaged,
}

/// The `login-finish` response shape a deployment is known to return.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutcomeShape {
    /// Accept any of the shapes below, or an empty acknowledgement.
    #[default]
    Auto,
    /// `{ accessToken, refreshToken }` (camelCase or snake_case)
    Tokens,
    /// `{ session: { access_token, refresh_token } }`
    Session,
    /// `{ redirectUrl }`
    Redirect,
}

impl FromStr for OutcomeShape {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "auto" => Ok(OutcomeShape::Auto),
            "tokens" => Ok(OutcomeShape::Tokens),
            "session" => Ok(OutcomeShape::Session),
            "redirect" => Ok(OutcomeShape::Redirect),
            other => Err(format!(
                "unknown outcome shape '{other}', expected auto, tokens, session or redirect"
            )),
        }
    }
}

impl CeremonyOutcome {
    /// Discriminate a finish response body.
    ///
    /// A body that carries only half a token pair, a `session` without
    /// tokens, or an unparseable `redirectUrl` is malformed and fails with
    /// `ServerError`, whatever `shape` says.
    pub fn from_response(body: &Value, shape: OutcomeShape) -> CeremonyResult<Self> {
        let empty = Map::new();
        let obj = match body {
            Value::Object(obj) => obj,
            Value::Null => &empty,
            _ => {
                return Err(CeremonyError::ServerError(
                    "finish returned a non-object body".to_string(),
                ))
            }
        };

        let tokens = token_pair(obj)?;
        let session = match obj.get("session") {
            Some(Value::Object(session)) => Some(token_pair(session)?.ok_or_else(|| {
                CeremonyError::ServerError("session object carries no tokens".to_string())
            })?),
            _ => None,
        };
        let redirect = match string_field(obj, &["redirectUrl", "redirect_url"]) {
            Some(raw) => Some(Url::parse(raw).map_err(|e| {
                CeremonyError::ServerError(format!("invalid redirectUrl: {e}"))
            })?),
            None => None,
        };

        let missing =
            |what: &str| CeremonyError::ServerError(format!("expected {what} in response"));
        match shape {
            OutcomeShape::Auto => Ok(if let Some(pair) = tokens.or(session) {
                CeremonyOutcome::Tokens(pair)
            } else if let Some(url) = redirect {
                CeremonyOutcome::Redirect(url)
            } else {
                CeremonyOutcome::ServerManaged
            }),
            OutcomeShape::Tokens => tokens
                .map(CeremonyOutcome::Tokens)
                .ok_or_else(|| missing("accessToken and refreshToken")),
            OutcomeShape::Session => session
                .map(CeremonyOutcome::Tokens)
                .ok_or_else(|| missing("a session object")),
            OutcomeShape::Redirect => redirect
                .map(CeremonyOutcome::Redirect)
                .ok_or_else(|| missing("redirectUrl")),
        }
    }
}

fn string_field<'a>(obj: &'a Map<String, Value>, names: &[&str]) -> Option<&'a str> {
    names
        .iter()
        .find_map(|name| obj.get(*name).and_then(Value::as_str))
}

fn token_pair(obj: &Map<String, Value>) -> CeremonyResult<Option<TokenPair>> {
    let access = string_field(obj, &["accessToken", "access_token"]);
    let refresh = string_field(obj, &["refreshToken", "refresh_token"]);
    match (access, refresh) {
        (Some(access), Some(refresh)) => Ok(Some(TokenPair {
            access_token: access.to_string(),
            refresh_token: refresh.to_string(),
        })),
        (None, None) => Ok(None),
        _ => Err(CeremonyError::ServerError(
            "incomplete token pair in response".to_string(),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn outcome_shape_parses_case_insensitively() {
        assert_eq!(" Tokens ".parse::<OutcomeShape>(), Ok(OutcomeShape::Tokens));
        assert_eq!("REDIRECT".parse::<OutcomeShape>(), Ok(OutcomeShape::Redirect));
        assert_eq!("session".parse::<OutcomeShape>(), Ok(OutcomeShape::Session));
        assert_eq!("auto".parse::<OutcomeShape>(), Ok(OutcomeShape::Auto));
        assert!("magic-link".parse::<OutcomeShape>().unwrap_err().contains("magic-link"));
    }

    #[test]
    fn start_response_flat_echoes_options_challenge() {
        let started = StartedCeremony::from_response(
            CeremonyKind::Login,
            json!({ "challenge": "abc123_-", "allowCredentials": [] }),
        )
        .unwrap();
        assert_eq!(started.expected_challenge.as_str(), "abc123_-");
        match started.options {
            ChallengeOptions::Request(options) => assert!(options.is_discoverable()),
            other => panic!("unexpected options: {other:?}"),
        }
    }

    #[test]
    fn start_response_nested_prefers_top_level_challenge() {
        let started = StartedCeremony::from_response(
            CeremonyKind::Login,
            json!({
                "challenge": "top+level/=",
                "publicKey": { "challenge": "dG9wK2xldmVsLw", "userVerification": "preferred" }
            }),
        )
        .unwrap();
        assert_eq!(started.expected_challenge.as_str(), "top+level/=");
        assert_eq!(started.options.challenge(), "dG9wK2xldmVsLw");
    }

    #[test]
    fn registration_start_requires_user_and_rp() {
        let err = StartedCeremony::from_response(
            CeremonyKind::Registration,
            json!({ "challenge": "abc" }),
        )
        .unwrap_err();
        assert!(matches!(err, CeremonyError::ServerError(_)));
    }

    #[test]
    fn outcome_accepts_both_token_spellings() {
        let camel = json!({ "accessToken": "t1", "refreshToken": "r1" });
        let snake = json!({ "access_token": "t1", "refresh_token": "r1" });
        for body in [camel, snake] {
            match CeremonyOutcome::from_response(&body, OutcomeShape::Auto).unwrap() {
                CeremonyOutcome::Tokens(pair) => {
                    assert_eq!(pair.access_token, "t1");
                    assert_eq!(pair.refresh_token, "r1");
                }
                other => panic!("unexpected outcome: {other:?}"),
            }
        }
    }

    #[test]
    fn outcome_unwraps_session_object() {
        let body = json!({ "session": { "access_token": "a", "refresh_token": "b" } });
        let outcome = CeremonyOutcome::from_response(&body, OutcomeShape::Session).unwrap();
        assert!(matches!(outcome, CeremonyOutcome::Tokens(_)));
    }

    #[test]
    fn outcome_redirect() {
        let body = json!({ "redirectUrl": "https://notes.example/auth/callback#token=x" });
        match CeremonyOutcome::from_response(&body, OutcomeShape::Auto).unwrap() {
            CeremonyOutcome::Redirect(url) => assert_eq!(url.host_str(), Some("notes.example")),
            other => panic!("unexpected outcome: {other:?}"),
        }
    }

    #[test]
    fn empty_body_is_server_managed() {
        assert_eq!(
            CeremonyOutcome::from_response(&json!({}), OutcomeShape::Auto).unwrap(),
            CeremonyOutcome::ServerManaged
        );
        assert_eq!(
            CeremonyOutcome::from_response(&Value::Null, OutcomeShape::Auto).unwrap(),
            CeremonyOutcome::ServerManaged
        );
    }

    #[test]
    fn half_token_pair_is_malformed() {
        let body = json!({ "accessToken": "t1" });
        let err = CeremonyOutcome::from_response(&body, OutcomeShape::Auto).unwrap_err();
        assert!(matches!(err, CeremonyError::ServerError(_)));
    }

    #[test]
    fn pinned_shape_rejects_other_shapes() {
        let body = json!({ "redirectUrl": "https://notes.example/" });
        assert!(CeremonyOutcome::from_response(&body, OutcomeShape::Tokens).is_err());
        assert!(CeremonyOutcome::from_response(&json!({}), OutcomeShape::Redirect).is_err());
    }

    #[test]
    fn token_pair_debug_is_redacted() {
        let pair = TokenPair {
            access_token: "secret-access".into(),
            refresh_token: "secret-refresh".into(),
        };
        assert!(!format!("{pair:?}").contains("secret"));
    }
}
