//! # Wire Codec
//!
//! Converts between the base64 text the relying party speaks and the binary
//! buffers the platform credential API wants.
//!
//! Servers disagree about the alphabet they expect on the return trip: some
//! want base64url without padding, some want standard padded base64 (what
//! `btoa` produces). The encoding side is therefore an explicit deployment
//! setting, never guessed. The decoding side is lenient and accepts either
//! alphabet, padded or not, because translating `-_` to `+/` is lossless.

use base64::alphabet;
use base64::engine::general_purpose::GeneralPurpose;
use base64::engine::{DecodePaddingMode, GeneralPurposeConfig};
use base64::prelude::*;

use crate::error::{CeremonyError, CeremonyResult};

/// Alphabet used when binary fields are encoded for the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Base64Variant {
    /// RFC 4648 §5, no padding (`-` and `_`)
    #[default]
    UrlSafe,
    /// RFC 4648 §4, padded (`+`, `/` and `=`)
    Standard,
}

impl Base64Variant {
    pub fn from_url_safe(url_safe: bool) -> Self {
        if url_safe {
            Base64Variant::UrlSafe
        } else {
            Base64Variant::Standard
        }
    }
}

/// Pure encode/decode helpers bound to one wire variant.
#[derive(Debug, Clone, Copy, Default)]
pub struct Codec {
    variant: Base64Variant,
}

impl Codec {
    pub fn new(variant: Base64Variant) -> Self {
        Self { variant }
    }

    pub fn variant(&self) -> Base64Variant {
        self.variant
    }

    /// Decode a server-issued challenge into the bytes the authenticator signs.
    ///
    /// Fails with `MalformedChallenge` on characters outside both alphabets,
    /// on impossible lengths, and on misplaced padding.
    pub fn decode_challenge(&self, wire: &str) -> CeremonyResult<Vec<u8>> {
        decode_lenient(wire).map_err(|reason| {
            CeremonyError::MalformedChallenge(format!("challenge: {reason}"))
        })
    }

    /// Decode any other binary wire field (credential ids, user handles).
    ///
    /// `field` names the offending field in the error.
    pub fn decode_field(&self, field: &str, wire: &str) -> CeremonyResult<Vec<u8>> {
        decode_lenient(wire)
            .map_err(|reason| CeremonyError::MalformedChallenge(format!("{field}: {reason}")))
    }

    /// Encode bytes for the return trip in the configured variant.
    pub fn encode_for_wire(&self, buf: &[u8]) -> String {
        match self.variant {
            Base64Variant::UrlSafe => BASE64_URL_SAFE_NO_PAD.encode(buf),
            Base64Variant::Standard => BASE64_STANDARD.encode(buf),
        }
    }
}

/// Standard alphabet, padding optional but canonical when present.
const LENIENT: GeneralPurpose = GeneralPurpose::new(
    &alphabet::STANDARD,
    GeneralPurposeConfig::new().with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

/// Translate the URL-safe alphabet to the standard one and decode.
fn decode_lenient(wire: &str) -> Result<Vec<u8>, String> {
    let standard: String = wire
        .trim()
        .chars()
        .map(|c| match c {
            '-' => '+',
            '_' => '/',
            other => other,
        })
        .collect();

    LENIENT.decode(standard.as_bytes()).map_err(|e| e.to_string())
}
