//! The JSON document carried by an offline entry.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use ledgerpay_core::{Amount, ParticipantId, TransactionId};
use ledgerpay_ledger::Transaction;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OfflinePayload {
    pub id: TransactionId,
    pub sender_id: ParticipantId,
    pub receiver_id: ParticipantId,
    pub amount: Amount,
    /// Client clock; accepted as either epoch seconds or an RFC 3339 string.
    #[serde(with = "client_timestamp")]
    pub timestamp: DateTime<Utc>,
}

impl OfflinePayload {
    pub fn decode(raw: &[u8]) -> Result<Self, String> {
        let payload: Self = serde_json::from_slice(raw).map_err(|e| e.to_string())?;
        if payload.sender_id == payload.receiver_id {
            return Err("sender and receiver are the same participant".to_string());
        }
        Ok(payload)
    }

    pub fn involves(&self, participant: &ParticipantId) -> bool {
        &self.sender_id == participant || &self.receiver_id == participant
    }

    /// Offline entries are always settled transfers.
    pub fn into_transaction(self, now: DateTime<Utc>) -> Transaction {
        Transaction::offline_transfer(
            self.id,
            self.sender_id,
            self.receiver_id,
            self.amount,
            self.timestamp,
            now,
        )
    }
}

mod client_timestamp {
    use chrono::{DateTime, SecondsFormat, Utc};
    use serde::{Deserialize, Deserializer, Serializer, de::Error};

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Epoch(f64),
        Text(String),
    }

    pub fn serialize<S: Serializer>(value: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&value.to_rfc3339_opts(SecondsFormat::Micros, true))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<DateTime<Utc>, D::Error> {
        match Raw::deserialize(deserializer)? {
            Raw::Epoch(secs) => from_epoch(secs).ok_or_else(|| D::Error::custom("timestamp out of range")),
            Raw::Text(text) => DateTime::parse_from_rfc3339(&text)
                .map(|t| t.with_timezone(&Utc))
                .map_err(D::Error::custom),
        }
    }

    fn from_epoch(secs: f64) -> Option<DateTime<Utc>> {
        if !secs.is_finite() {
            return None;
        }
        let whole = secs.floor();
        let nanos = (((secs - whole) * 1e9).round() as u32).min(999_999_999);
        DateTime::from_timestamp(whole as i64, nanos)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ledgerpay_ledger::{Origin, TransactionKind};
    use rust_decimal_macros::dec;

    #[test]
    fn decodes_fractional_epoch_and_float_amount() {
        let raw = br#"{"sender_id":"alice","receiver_id":"bob","amount":25.5,"timestamp":1700000000.25,"id":"0b9e-1700000000"}"#;
        let p = OfflinePayload::decode(raw).unwrap();
        assert_eq!(p.amount.value(), dec!(25.5));
        assert_eq!(p.timestamp.timestamp(), 1_700_000_000);
        assert_eq!(p.timestamp.timestamp_subsec_millis(), 250);
    }

    #[test]
    fn decodes_rfc3339_timestamp() {
        let raw = br#"{"sender_id":"alice","receiver_id":"bob","amount":"3","timestamp":"2024-01-02T03:04:05Z","id":"x"}"#;
        assert!(OfflinePayload::decode(raw).is_ok());
    }

    #[test]
    fn rejects_bad_fields() {
        for raw in [
            &br#"{"sender_id":"alice","receiver_id":"bob","amount":0,"timestamp":1,"id":"x"}"#[..],
            &br#"{"sender_id":"alice","receiver_id":"alice","amount":1,"timestamp":1,"id":"x"}"#[..],
            &br#"{"sender_id":"","receiver_id":"bob","amount":1,"timestamp":1,"id":"x"}"#[..],
            &br#"{"sender_id":"alice","receiver_id":"bob","amount":1,"id":"x"}"#[..],
            &br#"{"sender_id":"alice","receiver_id":"bob","amount":1,"timestamp":"yesterday","id":"x"}"#[..],
            &b"not json"[..],
        ] {
            assert!(OfflinePayload::decode(raw).is_err(), "accepted {}", String::from_utf8_lossy(raw));
        }
    }

    #[test]
    fn becomes_an_offline_transfer() {
        let raw = br#"{"sender_id":"alice","receiver_id":"bob","amount":7,"timestamp":1700000000,"id":"e1"}"#;
        let tx = OfflinePayload::decode(raw).unwrap().into_transaction(Utc::now());
        assert_eq!(tx.kind, TransactionKind::Transfer);
        assert_eq!(tx.origin, Origin::Offline);
        assert_eq!(tx.id.as_str(), "e1");
        assert!(tx.request_state.is_none());
    }
}
