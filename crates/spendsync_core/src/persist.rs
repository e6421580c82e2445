//! Persisted state layout.
//!
//! Each piece of state lives under its own versioned [`StorageKey`] and is
//! encoded as a CBOR envelope `{ version, body }`. The envelope version is
//! checked before the body is decoded, so a layout change is reported as
//! [`CoreError::UnsupportedVersion`] instead of a confusing decode error.

use crate::error::{CoreError, CoreResult};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use spendsync_storage::{StorageBackend, StorageKey};

/// Version of every persisted layout written by this build.
pub const FORMAT_VERSION: u16 = 1;

/// Key name of the record list (and temporary id counter).
pub const RECORDS_KEY: &str = "expenses.records";
/// Key name of the cached category list.
pub const CATEGORIES_KEY: &str = "expenses.categories";
/// Key name of the pending write queue.
pub const QUEUE_KEY: &str = "expenses.queue";
/// Key name of the rejected write intents.
pub const DEAD_LETTERS_KEY: &str = "expenses.dead_letters";
/// Key name of server acknowledgments not yet reconciled on disk.
pub const ACKNOWLEDGED_KEY: &str = "expenses.acknowledged";

#[derive(Serialize)]
struct EnvelopeOut<'a, T> {
    version: u16,
    body: &'a T,
}

#[derive(Deserialize)]
struct EnvelopeIn {
    version: u16,
    body: ciborium::Value,
}

/// Returns the storage key for a state name at the current format version.
pub(crate) fn key(name: &str) -> CoreResult<StorageKey> {
    Ok(StorageKey::new(name, FORMAT_VERSION)?)
}

/// Encodes `body` into a versioned envelope.
pub(crate) fn encode<T: Serialize>(body: &T) -> CoreResult<Vec<u8>> {
    let mut bytes = Vec::new();
    ciborium::into_writer(
        &EnvelopeOut {
            version: FORMAT_VERSION,
            body,
        },
        &mut bytes,
    )
    .map_err(CoreError::codec)?;
    Ok(bytes)
}

/// Decodes a versioned envelope written under `key`.
pub(crate) fn decode<T: DeserializeOwned>(key: &StorageKey, bytes: &[u8]) -> CoreResult<T> {
    let envelope: EnvelopeIn = ciborium::from_reader(bytes).map_err(CoreError::codec)?;
    if envelope.version != FORMAT_VERSION {
        return Err(CoreError::UnsupportedVersion {
            key: key.rendered(),
            found: envelope.version,
            expected: FORMAT_VERSION,
        });
    }
    envelope.body.deserialized().map_err(CoreError::codec)
}

/// Loads and decodes the value stored under `name`, if any.
pub(crate) fn load<T: DeserializeOwned>(
    backend: &dyn StorageBackend,
    name: &str,
) -> CoreResult<Option<T>> {
    let key = key(name)?;
    match backend.read(&key)? {
        Some(bytes) => decode(&key, &bytes).map(Some),
        None => Ok(None),
    }
}

/// Encodes and durably writes `body` under `name`.
pub(crate) fn save<T: Serialize>(
    backend: &dyn StorageBackend,
    name: &str,
    body: &T,
) -> CoreResult<()> {
    let key = key(name)?;
    backend.write(&key, &encode(body)?)?;
    Ok(())
}
