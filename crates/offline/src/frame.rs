//! Offline batch framing.
//!
//! ```text
//! entry := signature[author_signature_len]
//!       || public_key_signature[authority_signature_len]
//!       || public_key (PEM, ends with "-----END PUBLIC KEY-----\n")
//!       || json_payload
//! batch := entry ("-----LEDGER SERPERATOR-----\n" entry)*
//! ```
//! The delimiter spelling is part of the wire format and must not be corrected.

use ledgerpay_signing::{DEFAULT_RSA_BITS, KeyScheme, PUBLIC_KEY_PEM_TRAILER, SigningService};

use crate::payload::OfflinePayload;
use crate::rejection::Rejection;

pub const LEDGER_DELIMITER: &[u8] = b"-----LEDGER SERPERATOR-----\n";

/// Sizes of the two fixed-length signature segments.
///
/// The default matches RSA-2048 keys on both sides.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameLayout {
    /// Entry author's signature over the JSON payload (K_u / 8).
    pub author_signature_len: usize,
    /// Authority's certification of the author's public key (K_s / 8).
    pub authority_signature_len: usize,
}

impl Default for FrameLayout {
    fn default() -> Self {
        let len = KeyScheme::RsaPss.signature_len(DEFAULT_RSA_BITS);
        Self::new(len, len)
    }
}

impl FrameLayout {
    pub fn new(author_signature_len: usize, authority_signature_len: usize) -> Self {
        Self {
            author_signature_len,
            authority_signature_len,
        }
    }

    /// Layout whose certificate segment is sized by `signing`'s own key.
    pub fn for_authority(signing: &SigningService, author_signature_len: usize) -> Self {
        Self::new(author_signature_len, signing.signature_len())
    }

    fn prefix_len(&self) -> usize {
        self.author_signature_len + self.authority_signature_len
    }
}

/// Borrowed segments of one entry, exactly as they appeared on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EntryParts<'a> {
    pub signature: &'a [u8],
    pub public_key_signature: &'a [u8],
    /// PEM bytes including the trailer line.
    pub public_key: &'a [u8],
    pub raw_data: &'a [u8],
}

/// A parsed entry: the wire segments plus the decoded payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OfflineEntry {
    pub index: usize,
    pub signature: Vec<u8>,
    pub public_key_signature: Vec<u8>,
    pub public_key: Vec<u8>,
    pub raw_data: Vec<u8>,
    pub payload: OfflinePayload,
}

/// Split and decode a whole batch. Any malformed entry rejects the batch.
///
/// One trailing delimiter is tolerated.
pub fn parse_batch(blob: &[u8], layout: FrameLayout) -> Result<Vec<OfflineEntry>, Rejection> {
    let blob = blob.strip_suffix(LEDGER_DELIMITER).unwrap_or(blob);
    if blob.is_empty() {
        return Err(Rejection::EmptyBatch);
    }

    split_on(blob, LEDGER_DELIMITER)
        .into_iter()
        .enumerate()
        .map(|(index, piece)| parse_entry(index, piece, layout))
        .collect()
}

fn parse_entry(index: usize, piece: &[u8], layout: FrameLayout) -> Result<OfflineEntry, Rejection> {
    let parts = slice_entry(index, piece, layout)?;
    let payload = OfflinePayload::decode(parts.raw_data)
        .map_err(|reason| Rejection::Payload { index, reason })?;

    Ok(OfflineEntry {
        index,
        signature: parts.signature.to_vec(),
        public_key_signature: parts.public_key_signature.to_vec(),
        public_key: parts.public_key.to_vec(),
        raw_data: parts.raw_data.to_vec(),
        payload,
    })
}

fn slice_entry(index: usize, piece: &[u8], layout: FrameLayout) -> Result<EntryParts<'_>, Rejection> {
    if piece.len() <= layout.prefix_len() {
        return Err(Rejection::Truncated { index });
    }
    let (signature, rest) = piece.split_at(layout.author_signature_len);
    let (public_key_signature, rest) = rest.split_at(layout.authority_signature_len);

    let mut halves = split_on(rest, PUBLIC_KEY_PEM_TRAILER);
    if halves.len() != 2 {
        return Err(Rejection::PublicKeyFraming { index });
    }
    let raw_data = halves.pop().unwrap_or_default();
    let key_len = rest.len() - raw_data.len();

    Ok(EntryParts {
        signature,
        public_key_signature,
        public_key: &rest[..key_len],
        raw_data,
    })
}

/// Assemble one entry in wire order.
pub fn encode_entry(parts: EntryParts<'_>) -> Vec<u8> {
    let mut out = Vec::with_capacity(
        parts.signature.len()
            + parts.public_key_signature.len()
            + parts.public_key.len()
            + parts.raw_data.len(),
    );
    out.extend_from_slice(parts.signature);
    out.extend_from_slice(parts.public_key_signature);
    out.extend_from_slice(parts.public_key);
    out.extend_from_slice(parts.raw_data);
    out
}

/// Join encoded entries with the ledger delimiter.
pub fn encode_batch<I, E>(entries: I) -> Vec<u8>
where
    I: IntoIterator<Item = E>,
    E: AsRef<[u8]>,
{
    let mut out = Vec::new();
    for (i, entry) in entries.into_iter().enumerate() {
        if i > 0 {
            out.extend_from_slice(LEDGER_DELIMITER);
        }
        out.extend_from_slice(entry.as_ref());
    }
    out
}

fn split_on<'a>(haystack: &'a [u8], needle: &[u8]) -> Vec<&'a [u8]> {
    let mut pieces = Vec::new();
    let mut rest = haystack;
    while let Some(pos) = find(rest, needle) {
        pieces.push(&rest[..pos]);
        rest = &rest[pos + needle.len()..];
    }
    pieces.push(rest);
    pieces
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    if needle.is_empty() || haystack.len() < needle.len() {
        return None;
    }
    haystack.windows(needle.len()).position(|w| w == needle)
}
