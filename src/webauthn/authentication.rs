use serde_json::Map;

use super::decode_descriptors;
use super::types::{
    AssertionCredential, AssertionPayload, AssertionResponse, PublicKeyRequestOptions,
    RequestOptions, PUBLIC_KEY_CREDENTIAL_TYPE,
};
use crate::codec::Codec;
use crate::error::CeremonyResult;

/// Decode `login-start` options into what the platform `get` call takes.
///
/// An empty `allowCredentials` stays empty: discoverable mode.
pub fn request_options_for_platform(
    codec: &Codec,
    options: &RequestOptions,
) -> CeremonyResult<PublicKeyRequestOptions> {
    Ok(PublicKeyRequestOptions {
        challenge: codec.decode_challenge(&options.challenge)?,
        allow_credentials: decode_descriptors(
            codec,
            "allowCredentials",
            &options.allow_credentials,
        )?,
        user_verification: options.user_verification.clone(),
        rp_id: options.rp_id.clone(),
        timeout: options.timeout,
    })
}

/// Encode the platform's assertion for `login-finish`.
pub fn encode_assertion(codec: &Codec, credential: AssertionCredential) -> AssertionResponse {
    AssertionResponse {
        id: credential.id,
        raw_id: codec.encode_for_wire(&credential.raw_id),
        cred_type: PUBLIC_KEY_CREDENTIAL_TYPE.to_string(),
        response: AssertionPayload {
            client_data_json: codec.encode_for_wire(&credential.client_data_json),
            authenticator_data: codec.encode_for_wire(&credential.authenticator_data),
            signature: codec.encode_for_wire(&credential.signature),
            user_handle: credential
                .user_handle
                .as_deref()
                .map(|handle| codec.encode_for_wire(handle)),
        },
        authenticator_attachment: credential.authenticator_attachment,
        client_extension_results: Map::new(),
    }
}
