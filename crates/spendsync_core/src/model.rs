//! Expense domain model.

use crate::amount::Amount;
use crate::id::{RecordId, TempId};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Icon assigned to categories that do not name one.
pub const DEFAULT_CATEGORY_ICON: &str = "mdi-help-circle";

/// Whether money leaves or enters the account.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransactionType {
    /// Money spent.
    #[default]
    Expense,
    /// Money received.
    Income,
}

impl TransactionType {
    /// Returns the wire name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            TransactionType::Expense => "expense",
            TransactionType::Income => "income",
        }
    }
}

/// A file attached to an expense, such as a photographed receipt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attachment {
    /// Original file name.
    pub file_name: String,
    /// MIME type of the content.
    pub content_type: String,
    /// Raw file content.
    #[serde(with = "serde_bytes_vec")]
    pub bytes: Vec<u8>,
}

/// The fields a user submits when recording an expense.
///
/// This is the "original write payload" kept in the pending write queue
/// until the server confirms it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExpensePayload {
    /// Expense or income.
    #[serde(default)]
    pub transaction_type: TransactionType,
    /// Amount of money.
    pub amount: Amount,
    /// Free-form note.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Booking date; the store fills in the current date when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date: Option<NaiveDate>,
    /// Server id of the category.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<u64>,
    /// Optional receipt to upload with the expense.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub receipt: Option<Attachment>,
}

impl ExpensePayload {
    /// Creates a payload for a plain expense of the given amount.
    #[must_use]
    pub fn new(amount: Amount) -> Self {
        Self {
            transaction_type: TransactionType::Expense,
            amount,
            description: None,
            date: None,
            category: None,
            receipt: None,
        }
    }

    /// Sets the transaction type.
    #[must_use]
    pub fn with_type(mut self, transaction_type: TransactionType) -> Self {
        self.transaction_type = transaction_type;
        self
    }

    /// Sets the description.
    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Sets the booking date.
    #[must_use]
    pub fn with_date(mut self, date: NaiveDate) -> Self {
        self.date = Some(date);
        self
    }

    /// Sets the category.
    #[must_use]
    pub fn with_category(mut self, category: u64) -> Self {
        self.category = Some(category);
        self
    }

    /// Attaches a receipt.
    #[must_use]
    pub fn with_receipt(mut self, receipt: Attachment) -> Self {
        self.receipt = Some(receipt);
        self
    }

    /// Returns true if a receipt is attached.
    #[must_use]
    pub fn has_attachment(&self) -> bool {
        self.receipt.is_some()
    }
}

/// An expense as the server returns it after accepting a write.
///
/// Carries the permanent id and the server-computed fields.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfirmedExpense {
    /// Permanent server id.
    pub id: u64,
    /// Expense or income.
    #[serde(default)]
    pub transaction_type: TransactionType,
    /// Amount of money.
    pub amount: Amount,
    /// Free-form note.
    #[serde(default)]
    pub description: Option<String>,
    /// Booking date.
    pub date: NaiveDate,
    /// Server id of the category.
    #[serde(default)]
    pub category: Option<u64>,
    /// Category name resolved by the server.
    #[serde(default)]
    pub category_name: Option<String>,
    /// Category icon resolved by the server.
    #[serde(default)]
    pub category_icon: Option<String>,
    /// URL of the uploaded receipt.
    #[serde(default)]
    pub receipt: Option<String>,
}

/// A record in the local store.
///
/// The pending flag is not stored: a record is pending exactly when its
/// identity is [`RecordId::Temporary`], so replacing the identity flips
/// both at once.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Expense {
    /// Temporary or permanent identity.
    pub id: RecordId,
    /// Expense or income.
    pub transaction_type: TransactionType,
    /// Amount of money.
    pub amount: Amount,
    /// Free-form note.
    pub description: Option<String>,
    /// Booking date.
    pub date: NaiveDate,
    /// Server id of the category.
    pub category: Option<u64>,
    /// Category name (server-computed, absent while pending).
    pub category_name: Option<String>,
    /// Category icon (server-computed, absent while pending).
    pub category_icon: Option<String>,
    /// Receipt URL once confirmed, local file name while pending.
    pub receipt: Option<String>,
}

impl Expense {
    /// Builds the optimistic record shown before the server confirms it.
    #[must_use]
    pub fn optimistic(temp_id: TempId, payload: &ExpensePayload, today: NaiveDate) -> Self {
        Self {
            id: RecordId::Temporary(temp_id),
            transaction_type: payload.transaction_type,
            amount: payload.amount,
            description: payload.description.clone(),
            date: payload.date.unwrap_or(today),
            category: payload.category,
            category_name: None,
            category_icon: None,
            receipt: payload.receipt.as_ref().map(|r| r.file_name.clone()),
        }
    }

    /// Returns true while the record awaits server confirmation.
    #[must_use]
    pub const fn is_pending(&self) -> bool {
        self.id.is_temporary()
    }

    /// Rebuilds a write payload from this record.
    ///
    /// Used to recover an intent whose queue entry was lost; the receipt
    /// bytes cannot be recovered and are dropped.
    #[must_use]
    pub fn to_payload(&self) -> ExpensePayload {
        ExpensePayload {
            transaction_type: self.transaction_type,
            amount: self.amount,
            description: self.description.clone(),
            date: Some(self.date),
            category: self.category,
            receipt: None,
        }
    }
}

impl From<ConfirmedExpense> for Expense {
    fn from(confirmed: ConfirmedExpense) -> Self {
        Self {
            id: RecordId::Permanent(confirmed.id),
            transaction_type: confirmed.transaction_type,
            amount: confirmed.amount,
            description: confirmed.description,
            date: confirmed.date,
            category: confirmed.category,
            category_name: confirmed.category_name,
            category_icon: confirmed.category_icon,
            receipt: confirmed.receipt,
        }
    }
}

/// A category, cached locally for offline entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Category {
    /// Server id.
    pub id: u64,
    /// Display name.
    pub name: String,
    /// Icon name.
    #[serde(default = "default_icon")]
    pub icon: String,
    /// Whether the category groups expenses or income.
    #[serde(rename = "type", default)]
    pub kind: TransactionType,
    /// Parent category; `None` for top-level categories.
    #[serde(default)]
    pub parent: Option<u64>,
}

fn default_icon() -> String {
    DEFAULT_CATEGORY_ICON.to_string()
}

/// Serializes byte vectors as a single byte string instead of an array of
/// integers, which keeps CBOR-encoded receipts compact.
mod serde_bytes_vec {
    use serde::de::{self, SeqAccess, Visitor};
    use serde::{Deserializer, Serializer};
    use std::fmt;

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_bytes(bytes)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        struct BytesVisitor;

        impl<'de> Visitor<'de> for BytesVisitor {
            type Value = Vec<u8>;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a byte string")
            }

            fn visit_bytes<E: de::Error>(self, v: &[u8]) -> Result<Vec<u8>, E> {
                Ok(v.to_vec())
            }

            fn visit_byte_buf<E: de::Error>(self, v: Vec<u8>) -> Result<Vec<u8>, E> {
                Ok(v)
            }

            fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> Result<Vec<u8>, A::Error> {
                let mut out = Vec::with_capacity(seq.size_hint().unwrap_or(0));
                while let Some(b) = seq.next_element()? {
                    out.push(b);
                }
                Ok(out)
            }
        }

        deserializer.deserialize_byte_buf(BytesVisitor)
    }
}
