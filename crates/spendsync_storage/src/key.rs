//! Versioned storage identifiers.

use crate::error::{StorageError, StorageResult};
use std::fmt;

/// Maximum length of a key name.
const MAX_NAME_LEN: usize = 64;

/// A stable, versionable storage identifier.
///
/// A key is a dotted name such as `expenses.queue` plus a format version.
/// Its rendered form, `expenses.queue.v1`, is what backends store under, so
/// bumping the version of a persisted layout never reads the old bytes by
/// accident.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct StorageKey {
    name: String,
    version: u16,
}

impl StorageKey {
    /// Creates a key from a name and format version.
    ///
    /// Names are limited to lowercase ASCII letters, digits, `.`, `_` and
    /// `-`, must not start with `.` and must not end in a `.vN` suffix of
    /// their own.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::InvalidKey`] for malformed names.
    pub fn new(name: impl Into<String>, version: u16) -> StorageResult<Self> {
        let name = name.into();
        if name.is_empty() || name.len() > MAX_NAME_LEN {
            return Err(StorageError::InvalidKey(format!(
                "key name must be 1..={MAX_NAME_LEN} characters: {name:?}"
            )));
        }
        if name.starts_with('.') || name.ends_with('.') {
            return Err(StorageError::InvalidKey(format!(
                "key name must not start or end with '.': {name:?}"
            )));
        }
        let valid = name.bytes().all(|b| {
            b.is_ascii_lowercase() || b.is_ascii_digit() || matches!(b, b'.' | b'_' | b'-')
        });
        if !valid {
            return Err(StorageError::InvalidKey(format!(
                "key name contains invalid characters: {name:?}"
            )));
        }
        if Self::split_version(&name).is_some() {
            return Err(StorageError::InvalidKey(format!(
                "key name must not carry its own version suffix: {name:?}"
            )));
        }
        Ok(Self { name, version })
    }

    /// Parses a rendered key (`name.vN`) back into a [`StorageKey`].
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::InvalidKey`] if the suffix is missing.
    pub fn parse(rendered: &str) -> StorageResult<Self> {
        let (name, version) = Self::split_version(rendered).ok_or_else(|| {
            StorageError::InvalidKey(format!("missing version suffix: {rendered:?}"))
        })?;
        Self::new(name, version)
    }

    /// Returns the key name without its version.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the format version.
    #[must_use]
    pub const fn version(&self) -> u16 {
        self.version
    }

    /// Returns the rendered form used by backends.
    #[must_use]
    pub fn rendered(&self) -> String {
        self.to_string()
    }

    fn split_version(rendered: &str) -> Option<(&str, u16)> {
        let (name, suffix) = rendered.rsplit_once(".v")?;
        if suffix.is_empty() || !suffix.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        suffix.parse().ok().map(|v| (name, v))
    }
}

impl fmt::Display for StorageKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.v{}", self.name, self.version)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn renders_with_version() {
        let key = StorageKey::new("expenses.queue", 1).unwrap();
        assert_eq!(key.to_string(), "expenses.queue.v1");
        assert_eq!(key.name(), "expenses.queue");
        assert_eq!(key.version(), 1);
    }

    #[test]
    fn parse_rendered() {
        let key = StorageKey::parse("expenses.records.v12").unwrap();
        assert_eq!(key.name(), "expenses.records");
        assert_eq!(key.version(), 12);
    }

    #[test]
    fn rejects_bad_names() {
        assert!(StorageKey::new("", 1).is_err());
        assert!(StorageKey::new("Upper", 1).is_err());
        assert!(StorageKey::new("with/slash", 1).is_err());
        assert!(StorageKey::new(".hidden", 1).is_err());
        assert!(StorageKey::new("trailing.", 1).is_err());
        assert!(StorageKey::new("already.v2", 1).is_err());
        assert!(StorageKey::new("x".repeat(65), 1).is_err());
    }

    #[test]
    fn parse_requires_suffix() {
        assert!(StorageKey::parse("expenses.queue").is_err());
        assert!(StorageKey::parse("expenses.queue.v").is_err());
        assert!(StorageKey::parse("expenses.queue.vx").is_err());
    }

    proptest! {
        #[test]
        fn rendered_form_parses_back(name in "[a-z][a-z0-9_-]{0,20}(\\.[a-uw-z][a-z0-9_-]{0,10}){0,2}", version in any::<u16>()) {
            let key = StorageKey::new(name, version).unwrap();
            let parsed = StorageKey::parse(&key.rendered()).unwrap();
            prop_assert_eq!(parsed, key);
        }
    }
}
