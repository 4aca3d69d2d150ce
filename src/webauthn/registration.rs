//! # Passkey Registration Conversion
//!
//! Registration binds a new credential to the signed-in principal.
//!
//! ## What gets decoded
//! - `challenge`: the bytes the authenticator embeds in `clientDataJSON`
//! - `user.id`: the user handle stored inside the credential
//! - `excludeCredentials[].id`: credentials the principal already has, so
//!   the authenticator refuses to create a duplicate
//!
//! ## What gets encoded
//! `rawId`, `clientDataJSON` and `attestationObject`, in the deployment's
//! configured base64 variant.

use serde_json::Map;

use super::decode_descriptors;
use super::types::{
    AttestationCredential, AttestationPayload, AttestationResponse, CreationOptions, PlatformUser,
    PublicKeyCreationOptions, PUBLIC_KEY_CREDENTIAL_TYPE,
};
use crate::codec::Codec;
use crate::error::CeremonyResult;

/// Decode `register-start` options into what the platform `create` call takes.
///
/// ## Errors
/// - MalformedChallenge: the challenge, user handle or an excluded
///   credential id is not valid base64
pub fn creation_options_for_platform(
    codec: &Codec,
    options: &CreationOptions,
) -> CeremonyResult<PublicKeyCreationOptions> {
    let challenge = codec.decode_challenge(&options.challenge)?;
    let user_id = codec.decode_field("user.id", &options.user.id)?;
    let exclude_credentials =
        decode_descriptors(codec, "excludeCredentials", &options.exclude_credentials)?;

    Ok(PublicKeyCreationOptions {
        challenge,
        rp: options.rp.clone(),
        user: PlatformUser {
            id: user_id,
            name: options.user.name.clone(),
            display_name: options.user.display_name.clone(),
        },
        pub_key_cred_params: options.pub_key_cred_params.clone(),
        exclude_credentials,
        authenticator_selection: options.authenticator_selection.clone(),
        attestation: options.attestation.clone(),
        timeout: options.timeout,
    })
}

/// Encode the platform's new credential for `register-finish`.
///
/// The credential is consumed: it is forwarded exactly once and never kept.
pub fn encode_attestation(codec: &Codec, credential: AttestationCredential) -> AttestationResponse {
    AttestationResponse {
        id: credential.id,
        raw_id: codec.encode_for_wire(&credential.raw_id),
        cred_type: PUBLIC_KEY_CREDENTIAL_TYPE.to_string(),
        response: AttestationPayload {
            client_data_json: codec.encode_for_wire(&credential.client_data_json),
            attestation_object: codec.encode_for_wire(&credential.attestation_object),
            transports: credential.transports,
        },
        authenticator_attachment: credential.authenticator_attachment,
        client_extension_results: Map::new(),
    }
}
