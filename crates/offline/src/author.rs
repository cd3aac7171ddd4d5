//! Client-side entry authoring.

use ledgerpay_signing::{KeyPair, SigningError};

use crate::frame::{EntryParts, encode_entry};
use crate::payload::OfflinePayload;

/// Sign `payload` with the author's key and frame it for submission.
///
/// `certificate` is the authority's signature over the author's PEM public key, as
/// issued by `SigningService::certify_key`.
pub fn author_entry(
    payload: &OfflinePayload,
    author: &KeyPair,
    certificate: &[u8],
) -> Result<Vec<u8>, SigningError> {
    let raw_data = serde_json::to_vec(payload).map_err(|e| SigningError::Encoding(e.to_string()))?;
    let public_key = author.public_key_pem()?;
    let signature = author.sign(&raw_data)?;

    Ok(encode_entry(EntryParts {
        signature: &signature,
        public_key_signature: certificate,
        public_key: public_key.as_bytes(),
        raw_data: &raw_data,
    }))
}
