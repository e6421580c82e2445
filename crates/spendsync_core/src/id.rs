//! Record identity.
//!
//! A record is either known only locally, under a [`TempId`] handed out by
//! the record store, or confirmed by the server under a permanent id. The
//! client never invents permanent ids.

use crate::error::{CoreError, CoreResult};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Prefix used when displaying temporary ids.
const TEMP_PREFIX: &str = "tmp-";

/// A locally allocated, not-yet-confirmed record identity.
///
/// Temporary ids come from a strictly monotonic counter owned by the
/// [`LocalRecordStore`](crate::LocalRecordStore), so two rapid offline writes
/// can never collide.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TempId(u64);

impl TempId {
    /// Creates a temporary id from its raw counter value.
    #[must_use]
    pub const fn new(value: u64) -> Self {
        Self(value)
    }

    /// Returns the raw counter value.
    #[must_use]
    pub const fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for TempId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{TEMP_PREFIX}{}", self.0)
    }
}

impl FromStr for TempId {
    type Err = CoreError;

    /// Accepts both `tmp-42` and a bare `42`.
    fn from_str(s: &str) -> CoreResult<Self> {
        let digits = s.strip_prefix(TEMP_PREFIX).unwrap_or(s);
        digits
            .parse::<u64>()
            .map(TempId)
            .map_err(|_| CoreError::InvalidTempId(s.to_string()))
    }
}

/// Identity of a record in the local store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordId {
    /// Allocated locally; the record awaits server confirmation.
    Temporary(TempId),
    /// Assigned by the server.
    Permanent(u64),
}

impl RecordId {
    /// Returns true for locally allocated identities.
    #[must_use]
    pub const fn is_temporary(&self) -> bool {
        matches!(self, RecordId::Temporary(_))
    }

    /// Returns the temporary id, if any.
    #[must_use]
    pub const fn temp_id(&self) -> Option<TempId> {
        match self {
            RecordId::Temporary(id) => Some(*id),
            RecordId::Permanent(_) => None,
        }
    }

    /// Returns the server id, if any.
    #[must_use]
    pub const fn permanent_id(&self) -> Option<u64> {
        match self {
            RecordId::Temporary(_) => None,
            RecordId::Permanent(id) => Some(*id),
        }
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RecordId::Temporary(id) => id.fmt(f),
            RecordId::Permanent(id) => id.fmt(f),
        }
    }
}

impl From<TempId> for RecordId {
    fn from(id: TempId) -> Self {
        RecordId::Temporary(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn temp_id_display_and_parse() {
        let id = TempId::new(42);
        assert_eq!(id.to_string(), "tmp-42");
        assert_eq!("tmp-42".parse::<TempId>().unwrap(), id);
        assert_eq!("42".parse::<TempId>().unwrap(), id);
        assert!("tmp-".parse::<TempId>().is_err());
        assert!("abc".parse::<TempId>().is_err());
    }

    #[test]
    fn record_id_kinds() {
        let temp = RecordId::from(TempId::new(1));
        assert!(temp.is_temporary());
        assert_eq!(temp.temp_id(), Some(TempId::new(1)));
        assert_eq!(temp.permanent_id(), None);

        let perm = RecordId::Permanent(99);
        assert!(!perm.is_temporary());
        assert_eq!(perm.permanent_id(), Some(99));
        assert_eq!(perm.to_string(), "99");
    }

    #[test]
    fn temp_ids_order_by_counter() {
        assert!(TempId::new(2) > TempId::new(1));
    }
}
