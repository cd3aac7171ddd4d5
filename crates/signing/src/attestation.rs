//! Signed balance quotes.

use chrono::{DateTime, SecondsFormat, SubsecRound, Utc};
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};

use ledgerpay_core::amount::fixed_precision;

/// A balance bound to the instant it was quoted.
///
/// `signature` is the base64 authority signature over [`attestation_message`]. `amount`
/// carries exactly the precision that was signed: two decimal places.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BalanceAttestation {
    pub amount: Decimal,
    pub timestamp: DateTime<Utc>,
    pub signature: String,
}

/// Bytes covered by an attestation signature: the amount rendered with two decimals
/// immediately followed by the RFC 3339 timestamp (microseconds, `Z` suffix).
pub fn attestation_message(amount: Decimal, timestamp: DateTime<Utc>) -> Vec<u8> {
    format!(
        "{}{}",
        fixed_precision(amount),
        timestamp.to_rfc3339_opts(SecondsFormat::Micros, true)
    )
    .into_bytes()
}

/// The signed form of an amount: two decimals, half away from zero.
pub(crate) fn quote_amount(amount: Decimal) -> Decimal {
    amount.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}

pub(crate) fn quote_time(now: DateTime<Utc>) -> DateTime<Utc> {
    now.trunc_subsecs(6)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use rust_decimal_macros::dec;

    #[test]
    fn message_concatenates_fixed_amount_and_timestamp() {
        let ts = Utc.with_ymd_and_hms(2024, 3, 1, 10, 30, 0).unwrap();
        let msg = attestation_message(dec!(700), ts);
        assert_eq!(
            String::from_utf8(msg).unwrap(),
            "700.002024-03-01T10:30:00.000000Z"
        );
    }

    #[test]
    fn quoted_amounts_keep_two_decimals() {
        assert_eq!(quote_amount(dec!(1.004)), dec!(1.00));
        assert_eq!(quote_amount(dec!(1.005)), dec!(1.01));
        assert_eq!(quote_amount(dec!(-2.345)), dec!(-2.35));
        assert_eq!(quote_amount(dec!(700)), dec!(700));
    }
}
