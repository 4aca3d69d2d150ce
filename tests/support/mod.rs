//! In-process relying party and platform doubles shared by the integration tests.
#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use axum::{
    body::Bytes,
    extract::{Request, State},
    http::{HeaderMap, StatusCode},
    middleware::{self as axum_middleware, Next},
    response::{IntoResponse, Response},
    routing::post,
    Json, Router,
};
use passkey_ceremony::webauthn::types::{
    AssertionCredential, AttestationCredential, PublicKeyCreationOptions, PublicKeyRequestOptions,
};
use passkey_ceremony::{Config, Locale, OutcomeShape, PlatformAuthenticator, PlatformError};
use reqwest::Url;
use serde_json::{json, Value};
use tower_http::trace::TraceLayer;

pub const REGISTER_START: &str = "webauthn-register-start";
pub const REGISTER_FINISH: &str = "webauthn-register-finish";
pub const LOGIN_START: &str = "webauthn-login-start";
pub const LOGIN_FINISH: &str = "webauthn-login-finish";

/// One canned response.
#[derive(Debug, Clone)]
pub enum Scripted {
    Json(StatusCode, Value),
    Raw(StatusCode, &'static str),
    Delayed(Duration, Box<Scripted>),
}

impl Scripted {
    pub fn ok(body: Value) -> Self {
        Scripted::Json(StatusCode::OK, body)
    }
}

#[derive(Debug, Default)]
struct Recorded {
    hits: HashMap<String, u32>,
    bodies: HashMap<String, Vec<Value>>,
    headers: HashMap<String, Vec<HeaderMap>>,
    scripts: HashMap<String, VecDeque<Scripted>>,
}

/// Shared state of the mock relying party: scripted responses in, observed
/// requests out.
#[derive(Clone, Default)]
pub struct MockState {
    inner: Arc<Mutex<Recorded>>,
}

impl MockState {
    pub fn script(&self, endpoint: &str, response: Scripted) {
        self.inner
            .lock()
            .unwrap()
            .scripts
            .entry(endpoint.to_string())
            .or_default()
            .push_back(response);
    }

    /// Requests that reached the server for `endpoint`, rejected or not.
    pub fn hits(&self, endpoint: &str) -> u32 {
        self.inner.lock().unwrap().hits.get(endpoint).copied().unwrap_or(0)
    }

    pub fn total_hits(&self) -> u32 {
        self.inner.lock().unwrap().hits.values().sum()
    }

    pub fn bodies(&self, endpoint: &str) -> Vec<Value> {
        self.inner
            .lock()
            .unwrap()
            .bodies
            .get(endpoint)
            .cloned()
            .unwrap_or_default()
    }

    pub fn header_values(&self, endpoint: &str, name: &str) -> Vec<Option<String>> {
        self.inner
            .lock()
            .unwrap()
            .headers
            .get(endpoint)
            .map(|all| {
                all.iter()
                    .map(|h| h.get(name).and_then(|v| v.to_str().ok()).map(str::to_string))
                    .collect()
            })
            .unwrap_or_default()
    }

    fn next_response(&self, endpoint: &str) -> Scripted {
        self.inner
            .lock()
            .unwrap()
            .scripts
            .get_mut(endpoint)
            .and_then(VecDeque::pop_front)
            .unwrap_or_else(|| {
                Scripted::Json(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    json!({ "error": format!("no scripted response for {endpoint}") }),
                )
            })
    }

    async fn respond(&self, endpoint: &str, headers: HeaderMap, body: Bytes) -> Response {
        {
            let mut recorded = self.inner.lock().unwrap();
            let parsed = serde_json::from_slice(&body).unwrap_or(Value::Null);
            recorded.bodies.entry(endpoint.to_string()).or_default().push(parsed);
            recorded.headers.entry(endpoint.to_string()).or_default().push(headers);
        }

        let mut scripted = self.next_response(endpoint);
        loop {
            match scripted {
                Scripted::Delayed(delay, inner) => {
                    tokio::time::sleep(delay).await;
                    scripted = *inner;
                }
                Scripted::Json(status, value) => return (status, Json(value)).into_response(),
                Scripted::Raw(status, text) => return (status, text).into_response(),
            }
        }
    }
}

/// Counts every request by its last path segment before anything can reject it.
async fn count_hits(State(state): State<MockState>, request: Request, next: Next) -> Response {
    let endpoint = request
        .uri()
        .path()
        .rsplit('/')
        .next()
        .unwrap_or_default()
        .to_string();
    *state.inner.lock().unwrap().hits.entry(endpoint).or_default() += 1;
    next.run(request).await
}

/// Registration endpoints need a bearer token.
async fn require_bearer(request: Request, next: Next) -> Response {
    let has_bearer = request
        .headers()
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.starts_with("Bearer ") && v.len() > "Bearer ".len());
    if has_bearer {
        next.run(request).await
    } else {
        (StatusCode::UNAUTHORIZED, Json(json!({ "msg": "missing bearer token" }))).into_response()
    }
}

pub struct MockRelyingParty {
    pub base_url: Url,
    pub state: MockState,
}

impl MockRelyingParty {
    pub async fn spawn() -> Self {
        let state = MockState::default();

        let registration = Router::new()
            .route(
                &format!("/functions/v1/{REGISTER_START}"),
                post(|State(s): State<MockState>, headers: HeaderMap, body: Bytes| async move {
                    s.respond(REGISTER_START, headers, body).await
                }),
            )
            .route(
                &format!("/functions/v1/{REGISTER_FINISH}"),
                post(|State(s): State<MockState>, headers: HeaderMap, body: Bytes| async move {
                    s.respond(REGISTER_FINISH, headers, body).await
                }),
            )
            .layer(axum_middleware::from_fn(require_bearer));

        let app = Router::new()
            .route(
                &format!("/functions/v1/{LOGIN_START}"),
                post(|State(s): State<MockState>, headers: HeaderMap, body: Bytes| async move {
                    s.respond(LOGIN_START, headers, body).await
                }),
            )
            .route(
                &format!("/functions/v1/{LOGIN_FINISH}"),
                post(|State(s): State<MockState>, headers: HeaderMap, body: Bytes| async move {
                    s.respond(LOGIN_FINISH, headers, body).await
                }),
            )
            .merge(registration)
            .layer(axum_middleware::from_fn_with_state(state.clone(), count_hits))
            .layer(TraceLayer::new_for_http())
            .with_state(state.clone());

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind mock relying party");
        let addr = listener.local_addr().expect("local addr");
        tokio::spawn(async move {
            axum::serve(listener, app).await.expect("mock relying party crashed");
        });

        Self {
            base_url: Url::parse(&format!("http://{addr}/functions/v1")).expect("base url"),
            state,
        }
    }

    /// Client configuration pointing at this server with fast retries.
    pub fn config(&self) -> Config {
        let mut config = Config::for_functions_url(self.base_url.clone());
        config.api_key = Some("anon-test-key".to_string());
        config.request_timeout = Duration::from_secs(2);
        config.retry_backoff = Duration::from_millis(10);
        config.login_outcome = OutcomeShape::Auto;
        config.locale = Locale::En;
        config
    }
}

pub fn creation_options(challenge: &str) -> Value {
    json!({
        "challenge": challenge,
        "rp": { "id": "localhost", "name": "Lecture Notes" },
        "user": { "id": "dXNlci0x", "name": "alice@example.com", "displayName": "alice" },
        "pubKeyCredParams": [
            { "type": "public-key", "alg": -7 },
            { "type": "public-key", "alg": -257 }
        ],
        "excludeCredentials": [{ "id": "AQID", "type": "public-key" }],
        "authenticatorSelection": { "residentKey": "preferred", "userVerification": "preferred" },
        "attestation": "none"
    })
}

pub fn request_options(challenge: &str) -> Value {
    json!({
        "challenge": challenge,
        "allowCredentials": [],
        "userVerification": "preferred"
    })
}

/// What the fake authenticator does when asked for a credential.
#[derive(Debug, Clone)]
pub enum Presence {
    Approve,
    Dismiss,
    Fail(PlatformError),
}

/// Software stand-in for the platform credential API.
pub struct SoftPlatform {
    pub api_present: bool,
    pub builtin: bool,
    pub presence: Presence,
    pub calls: Mutex<u32>,
    pub seen_challenges: Mutex<Vec<Vec<u8>>>,
}

impl SoftPlatform {
    pub fn new(presence: Presence) -> Self {
        Self {
            api_present: true,
            builtin: true,
            presence,
            calls: Mutex::new(0),
            seen_challenges: Mutex::new(Vec::new()),
        }
    }

    pub fn unsupported() -> Self {
        Self {
            api_present: false,
            builtin: false,
            ..Self::new(Presence::Approve)
        }
    }

    pub fn calls(&self) -> u32 {
        *self.calls.lock().unwrap()
    }

    fn observe(&self, challenge: Vec<u8>) -> Result<(), PlatformError> {
        *self.calls.lock().unwrap() += 1;
        self.seen_challenges.lock().unwrap().push(challenge);
        match &self.presence {
            Presence::Fail(err) => Err(err.clone()),
            _ => Ok(()),
        }
    }
}

#[async_trait]
impl PlatformAuthenticator for SoftPlatform {
    fn credential_api_present(&self) -> bool {
        self.api_present
    }

    async fn platform_authenticator_available(&self) -> bool {
        self.builtin
    }

    async fn create(
        &self,
        options: PublicKeyCreationOptions,
    ) -> Result<Option<AttestationCredential>, PlatformError> {
        self.observe(options.challenge)?;
        if matches!(self.presence, Presence::Dismiss) {
            return Ok(None);
        }
        Ok(Some(AttestationCredential {
            id: "-_8".to_string(),
            raw_id: vec![0xfb, 0xff],
            client_data_json: br#"{"type":"webauthn.create","challenge":"abc123_-"}"#.to_vec(),
            attestation_object: vec![0xa3, 0x63, 0x66, 0x6d, 0x74],
            transports: vec!["internal".to_string()],
            authenticator_attachment: Some("platform".to_string()),
        }))
    }

    async fn get(
        &self,
        options: PublicKeyRequestOptions,
    ) -> Result<Option<AssertionCredential>, PlatformError> {
        self.observe(options.challenge)?;
        if matches!(self.presence, Presence::Dismiss) {
            return Ok(None);
        }
        Ok(Some(AssertionCredential {
            id: "-_8".to_string(),
            raw_id: vec![0xfb, 0xff],
            client_data_json: br#"{"type":"webauthn.get"}"#.to_vec(),
            authenticator_data: vec![0x49; 37],
            signature: vec![0x30, 0x44, 0x02, 0x20],
            user_handle: Some(b"user-1".to_vec()),
            authenticator_attachment: Some("platform".to_string()),
        }))
    }
}
