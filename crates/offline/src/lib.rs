//! `ledgerpay-offline` — ledger entries authored without the server.
//!
//! Participants exchange signed entries peer-to-peer and later hand the server one
//! opaque batch. This crate owns the pure parts of admitting such a batch:
//!
//! - [`frame`]: the bit-exact wire framing (split, slice, encode)
//! - [`payload`]: the JSON document each entry carries
//! - [`verify`]: the per-entry signature/authorization chain
//!
//! Everything that needs the store or the identity directory lives in the infra crate.

pub mod author;
pub mod frame;
pub mod payload;
pub mod rejection;
pub mod verify;

pub use author::author_entry;
pub use frame::{
    EntryParts, FrameLayout, LEDGER_DELIMITER, OfflineEntry, encode_batch, encode_entry, parse_batch,
};
pub use payload::OfflinePayload;
pub use rejection::Rejection;
pub use verify::{EntryVerifier, same_public_key};
