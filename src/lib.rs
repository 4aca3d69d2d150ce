//! # Passkey Ceremony Client
//!
//! Client side of WebAuthn passkey registration and login against a hosted
//! relying party that exposes `register-start`, `register-finish`,
//! `login-start` and `login-finish` endpoints.
//!
//! ## Key Concepts
//! - **Relying Party**: the backend that issues challenges and verifies responses
//! - **Ceremony**: one complete registration or login exchange
//! - **Platform authenticator**: Touch ID, Windows Hello and friends, reached
//!   through the [`PlatformAuthenticator`] trait
//!
//! ## Flow
//! UI action → [`CapabilityGate`] → [`CeremonyClient`] → [`RelyingPartyClient`]
//! → [`Codec`] → platform credential API → [`SessionAdapter`] → UI

pub mod ceremony;   // State machine tying the pieces together
pub mod codec;      // base64 wire encoding
pub mod config;     // Environment configuration
pub mod error;      // Error taxonomy and user-facing messages
pub mod gate;       // Capability pre-check
pub mod platform;   // Platform credential API seam
pub mod rp_client;  // HTTP calls to the relying party
pub mod session;    // Session installation in the host
pub mod webauthn;   // Wire/platform types and conversions

pub use ceremony::{CeremonyClient, CeremonyPhase, CeremonyReport};
pub use codec::{Base64Variant, Codec};
pub use config::{Config, Endpoint};
pub use error::{CeremonyError, CeremonyResult, Locale};
pub use gate::{CapabilityGate, GateDecision};
pub use platform::{PlatformAuthenticator, PlatformError};
pub use rp_client::{RelyingParty, RelyingPartyClient};
pub use session::{
    MemorySessionStore, Navigator, RecordingNavigator, SessionAdapter, SessionStore,
    SessionStoreError,
};
pub use webauthn::types::{CeremonyKind, CeremonyOutcome, OutcomeShape, TokenPair};
