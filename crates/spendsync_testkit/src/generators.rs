//! Property-based test generators using proptest.
//!
//! Provides strategies for generating random test data
//! that maintains required invariants.

use chrono::{Days, NaiveDate};
use proptest::prelude::*;
use spendsync_core::{Amount, Attachment, ExpensePayload, TransactionType};

/// Strategy for generating positive amounts up to 100 000.00.
pub fn amount_strategy() -> impl Strategy<Value = Amount> {
    (1i64..10_000_000).prop_map(Amount::from_cents)
}

/// Strategy for generating dates between 2020 and 2025.
pub fn date_strategy() -> impl Strategy<Value = NaiveDate> {
    let base = NaiveDate::from_ymd_opt(2020, 1, 1).expect("Invalid base date");
    (0u64..2000).prop_map(move |offset| {
        base.checked_add_days(Days::new(offset))
            .expect("Date out of range")
    })
}

/// Strategy for generating transaction types.
pub fn transaction_type_strategy() -> impl Strategy<Value = TransactionType> {
    prop_oneof![Just(TransactionType::Expense), Just(TransactionType::Income)]
}

/// Strategy for generating small receipt attachments.
pub fn attachment_strategy() -> impl Strategy<Value = Attachment> {
    (
        prop::string::string_regex("[a-z]{1,12}\\.(jpg|png|pdf)").expect("Invalid regex"),
        prop::collection::vec(any::<u8>(), 1..256),
    )
        .prop_map(|(file_name, bytes)| {
            let content_type = if file_name.ends_with(".pdf") {
                "application/pdf"
            } else if file_name.ends_with(".png") {
                "image/png"
            } else {
                "image/jpeg"
            };
            Attachment {
                file_name,
                content_type: content_type.into(),
                bytes,
            }
        })
}

/// Strategy for generating write payloads.
pub fn payload_strategy() -> impl Strategy<Value = ExpensePayload> {
    (
        amount_strategy(),
        transaction_type_strategy(),
        prop::option::of(prop::string::string_regex("[A-Za-z ]{1,40}").expect("Invalid regex")),
        prop::option::of(date_strategy()),
        prop::option::of(1u64..50),
        prop::option::weighted(0.1, attachment_strategy()),
    )
        .prop_map(|(amount, kind, description, date, category, receipt)| {
            let mut payload = ExpensePayload::new(amount).with_type(kind);
            payload.description = description;
            payload.date = date;
            payload.category = category;
            payload.receipt = receipt;
            payload
        })
}

/// Strategy for generating a batch of payloads.
pub fn payloads_strategy(max_len: usize) -> impl Strategy<Value = Vec<ExpensePayload>> {
    prop::collection::vec(payload_strategy(), 0..=max_len)
}

#[cfg(test)]
mod tests {
    use super::*;

    proptest! {
        #[test]
        fn amounts_are_positive(amount in amount_strategy()) {
            prop_assert!(amount.cents() > 0);
        }

        #[test]
        fn attachment_flag_matches_receipt(payload in payload_strategy()) {
            prop_assert_eq!(payload.has_attachment(), payload.receipt.is_some());
        }
    }
}
