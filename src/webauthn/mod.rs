//! # WebAuthn Module
//!
//! Conversion between relying-party wire messages and platform credential
//! API values.
//!
//! ## Submodules
//! - `types`: Wire types, platform types and ceremony outcomes
//! - `registration`: Creation options in, attestation out
//! - `authentication`: Request options in, assertion out
//!
//! ## Flow Overview
//!
//! ### Registration (Creating a Passkey)
//! 1. `register-start` returns creation options with a base64 challenge
//! 2. `registration::creation_options_for_platform()` decodes them
//! 3. The platform creates a credential (user present)
//! 4. `registration::encode_attestation()` re-encodes it for `register-finish`
//!
//! ### Authentication (Logging In)
//! 1. `login-start` returns request options, possibly with no allowed
//!    credentials (discoverable mode)
//! 2. `authentication::request_options_for_platform()` decodes them
//! 3. The platform signs the challenge (user present)
//! 4. `authentication::encode_assertion()` re-encodes it for `login-finish`

pub mod authentication;
pub mod registration;
pub mod types;

use tracing::debug;

use crate::codec::Codec;
use crate::error::CeremonyResult;
use types::{CredentialDescriptor, PlatformCredentialDescriptor};

/// Decode a descriptor list, dropping entries whose type is not `public-key`.
fn decode_descriptors(
    codec: &Codec,
    field: &str,
    descriptors: &[CredentialDescriptor],
) -> CeremonyResult<Vec<PlatformCredentialDescriptor>> {
    descriptors
        .iter()
        .enumerate()
        .filter(|(index, descriptor)| {
            let keep = descriptor.is_public_key();
            if !keep {
                debug!(
                    field,
                    index,
                    cred_type = %descriptor.cred_type,
                    "skipping non public-key descriptor"
                );
            }
            keep
        })
        .map(|(index, descriptor)| {
            Ok(PlatformCredentialDescriptor {
                id: codec.decode_field(&format!("{field}[{index}].id"), &descriptor.id)?,
                transports: descriptor.transports.clone().unwrap_or_default(),
            })
        })
        .collect()
}
