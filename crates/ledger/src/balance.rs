//! Balance engine.
//!
//! A balance is never stored: it is recomputed from the log on every call so the log
//! stays the single source of truth. Every code path that needs a balance (transfer,
//! settlement, offline admission, quotes) goes through [`balance_of`].

use rust_decimal::Decimal;

use ledgerpay_core::{Amount, LedgerError, ParticipantId};

use crate::Transaction;

/// Credits minus debits of `participant` over `transactions`, ignoring `REQUEST` rows.
///
/// Amounts are capped at [`MAX_AMOUNT`](ledgerpay_core::MAX_AMOUNT), so overflow needs
/// an absurdly long history; it is still reported instead of panicking.
pub fn balance_of<'a, I>(participant: &ParticipantId, transactions: I) -> Result<Decimal, LedgerError>
where
    I: IntoIterator<Item = &'a Transaction>,
{
    transactions
        .into_iter()
        .filter(|tx| tx.affects_balance())
        .try_fold(Decimal::ZERO, |mut acc, tx| {
            if &tx.receiver_id == participant {
                acc = checked(acc.checked_add(tx.amount.value()), participant)?;
            }
            if tx.sender_id.as_ref() == Some(participant) {
                acc = checked(acc.checked_sub(tx.amount.value()), participant)?;
            }
            Ok(acc)
        })
}

fn checked(value: Option<Decimal>, participant: &ParticipantId) -> Result<Decimal, LedgerError> {
    value.ok_or_else(|| LedgerError::validation(format!("balance of {participant} overflows")))
}

/// Solvency check shared by transfers and settlements.
pub fn ensure_covers(available: Decimal, amount: Amount) -> Result<(), LedgerError> {
    if available < amount.value() {
        return Err(LedgerError::insufficient(available, amount.value()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use proptest::prelude::*;
    use rust_decimal_macros::dec;

    fn pid(s: &str) -> ParticipantId {
        ParticipantId::parse(s).unwrap()
    }

    fn amt(d: Decimal) -> Amount {
        Amount::new(d).unwrap()
    }

    #[test]
    fn recharge_then_transfer() {
        let (a, b) = (pid("a"), pid("b"));
        let now = Utc::now();
        let log = vec![
            Transaction::recharge(a.clone(), amt(dec!(1000)), now),
            Transaction::transfer(a.clone(), b.clone(), amt(dec!(300)), now),
        ];
        assert_eq!(balance_of(&a, &log), Ok(dec!(700)));
        assert_eq!(balance_of(&b, &log), Ok(dec!(300)));
    }

    #[test]
    fn requests_are_ignored_in_any_state() {
        let (a, b) = (pid("a"), pid("b"));
        let now = Utc::now();
        let mut approved = Transaction::request(a.clone(), b.clone(), amt(dec!(40)), now);
        approved.request_state = Some(crate::RequestState::Approved);
        let log = vec![
            Transaction::recharge(b.clone(), amt(dec!(100)), now),
            Transaction::request(a.clone(), b.clone(), amt(dec!(50)), now),
            approved,
        ];
        assert_eq!(balance_of(&a, &log), Ok(Decimal::ZERO));
        assert_eq!(balance_of(&b, &log), Ok(dec!(100)));
    }

    #[test]
    fn overflow_is_an_error_not_a_panic() {
        let a = pid("a");
        assert!(matches!(
            checked(Decimal::MAX.checked_add(dec!(1)), &a),
            Err(LedgerError::Validation(_))
        ));
        assert_eq!(checked(Decimal::MAX.checked_sub(dec!(1)), &a), Ok(Decimal::MAX - dec!(1)));
    }

    #[test]
    fn capped_amounts_sum_without_overflow() {
        let (a, b) = (pid("a"), pid("b"));
        let now = Utc::now();
        let max = amt(ledgerpay_core::MAX_AMOUNT);
        let mut log: Vec<_> = (0..1000).map(|_| Transaction::recharge(a.clone(), max, now)).collect();
        log.push(Transaction::transfer(a.clone(), b.clone(), max, now));
        assert_eq!(balance_of(&a, &log), Ok(ledgerpay_core::MAX_AMOUNT * dec!(999)));
        assert_eq!(balance_of(&b, &log), Ok(ledgerpay_core::MAX_AMOUNT));
    }

    #[test]
    fn ensure_covers_allows_exact_balance() {
        assert!(ensure_covers(dec!(50), amt(dec!(50))).is_ok());
        assert_eq!(
            ensure_covers(dec!(49.99), amt(dec!(50))),
            Err(LedgerError::insufficient(dec!(49.99), dec!(50)))
        );
    }

    proptest! {
        /// Sum of all balances equals the sum of recharges; transfers only move funds.
        #[test]
        fn transfers_conserve_total(
            recharges in prop::collection::vec((0usize..4, 1i64..100_000), 1..8),
            transfers in prop::collection::vec((0usize..4, 0usize..4, 1i64..100_000), 0..16),
        ) {
            let people: Vec<ParticipantId> = (0..4).map(|i| pid(&format!("p{i}"))).collect();
            let now = Utc::now();
            let mut log = Vec::new();
            let mut recharged = Decimal::ZERO;

            for (who, cents) in recharges {
                let d = Decimal::new(cents, 2);
                recharged += d;
                log.push(Transaction::recharge(people[who].clone(), amt(d), now));
            }
            for (from, to, cents) in transfers {
                if from == to {
                    continue;
                }
                log.push(Transaction::transfer(
                    people[from].clone(),
                    people[to].clone(),
                    amt(Decimal::new(cents, 2)),
                    now,
                ));
            }

            let total: Decimal = people.iter().map(|p| balance_of(p, &log).unwrap()).sum();
            prop_assert_eq!(total, recharged);
        }
    }
}
