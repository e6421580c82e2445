//! File-based storage backend for persistent storage.

use crate::backend::StorageBackend;
use crate::error::{StorageError, StorageResult};
use crate::key::StorageKey;
use fs2::FileExt;
use std::fs::{self, File, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

/// Name of the advisory lock file inside the data directory.
const LOCK_FILE: &str = "LOCK";
/// Extension used for value files.
const VALUE_EXT: &str = "bin";

/// A directory-based storage backend.
///
/// Every key is stored in its own file, `<dir>/<name>.v<version>.bin`.
/// Data survives process restarts.
///
/// ```text
/// <data_dir>/
/// ├─ LOCK                     # Advisory lock for single-writer
/// ├─ expenses.records.v1.bin
/// └─ expenses.queue.v1.bin
/// ```
///
/// # Durability
///
/// - `write()` writes a temporary file in the same directory, calls
///   `sync_all()` and renames it over the old value, so readers see either
///   the old or the new bytes, never a torn mix
/// - `sync()` additionally syncs the directory entry where supported
///
/// # Thread Safety
///
/// The backend holds an exclusive advisory lock on the directory for its
/// whole lifetime; a second `open` of the same directory, from this or any
/// other process, fails with [`StorageError::Locked`].
///
/// # Example
///
/// ```no_run
/// use spendsync_storage::{FileBackend, StorageBackend, StorageKey};
/// use std::path::Path;
///
/// let backend = FileBackend::open(Path::new("data")).unwrap();
/// let key = StorageKey::new("expenses.queue", 1).unwrap();
/// backend.write(&key, b"persistent data").unwrap();
/// ```
#[derive(Debug)]
pub struct FileBackend {
    dir: PathBuf,
    _lock_file: File,
}

impl FileBackend {
    /// Opens or creates a data directory and takes its lock.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The directory cannot be created
    /// - The path exists but is not a directory
    /// - Another handle holds the lock (returns `Locked`)
    pub fn open(dir: &Path) -> StorageResult<Self> {
        fs::create_dir_all(dir)?;
        if !dir.is_dir() {
            return Err(StorageError::Io(std::io::Error::new(
                ErrorKind::InvalidInput,
                format!("path is not a directory: {}", dir.display()),
            )));
        }

        let lock_file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(dir.join(LOCK_FILE))?;

        if lock_file.try_lock_exclusive().is_err() {
            return Err(StorageError::Locked(dir.display().to_string()));
        }

        tracing::debug!(dir = %dir.display(), "opened storage directory");

        Ok(Self {
            dir: dir.to_path_buf(),
            _lock_file: lock_file,
        })
    }

    /// Returns the path to the data directory.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.dir
    }

    /// Returns the file path a key is stored at.
    #[must_use]
    pub fn value_path(&self, key: &StorageKey) -> PathBuf {
        self.dir.join(format!("{key}.{VALUE_EXT}"))
    }
}

impl StorageBackend for FileBackend {
    fn read(&self, key: &StorageKey) -> StorageResult<Option<Vec<u8>>> {
        match fs::read(self.value_path(key)) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn write(&self, key: &StorageKey, data: &[u8]) -> StorageResult<()> {
        let mut temp = NamedTempFile::new_in(&self.dir)?;
        temp.write_all(data)?;
        temp.as_file().sync_all()?;
        temp.persist(self.value_path(key))
            .map_err(|e| StorageError::Io(e.error))?;
        Ok(())
    }

    fn remove(&self, key: &StorageKey) -> StorageResult<()> {
        match fs::remove_file(self.value_path(key)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    fn keys(&self) -> StorageResult<Vec<StorageKey>> {
        let mut keys = Vec::new();
        for entry in fs::read_dir(&self.dir)? {
            let entry = entry?;
            let file_name = entry.file_name();
            let Some(name) = file_name.to_str() else {
                continue;
            };
            let Some(rendered) = name.strip_suffix(&format!(".{VALUE_EXT}")) else {
                continue;
            };
            match StorageKey::parse(rendered) {
                Ok(key) => keys.push(key),
                Err(_) => tracing::debug!(file = name, "ignoring foreign file in data directory"),
            }
        }
        keys.sort();
        Ok(keys)
    }

    fn sync(&self) -> StorageResult<()> {
        #[cfg(unix)]
        {
            File::open(&self.dir)?.sync_all()?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn key(name: &str) -> StorageKey {
        StorageKey::new(name, 1).unwrap()
    }

    #[test]
    fn file_create_new() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("data");

        let backend = FileBackend::open(&path).unwrap();
        assert!(backend.keys().unwrap().is_empty());
        assert!(path.join(LOCK_FILE).exists());
    }

    #[test]
    fn file_write_and_read() {
        let dir = tempdir().unwrap();
        let backend = FileBackend::open(dir.path()).unwrap();

        backend.write(&key("expenses.queue"), b"hello").unwrap();
        let data = backend.read(&key("expenses.queue")).unwrap().unwrap();
        assert_eq!(&data, b"hello");
        assert!(dir.path().join("expenses.queue.v1.bin").exists());
    }

    #[test]
    fn file_read_missing_is_none() {
        let dir = tempdir().unwrap();
        let backend = FileBackend::open(dir.path()).unwrap();
        assert!(backend.read(&key("missing")).unwrap().is_none());
    }

    #[test]
    fn file_write_replaces() {
        let dir = tempdir().unwrap();
        let backend = FileBackend::open(dir.path()).unwrap();

        backend.write(&key("a"), b"a much longer first value").unwrap();
        backend.write(&key("a"), b"short").unwrap();
        assert_eq!(backend.read(&key("a")).unwrap().unwrap(), b"short");
    }

    #[test]
    fn file_persistence() {
        let dir = tempdir().unwrap();

        {
            let backend = FileBackend::open(dir.path()).unwrap();
            backend.write(&key("a"), b"persistent data").unwrap();
            backend.sync().unwrap();
        }

        {
            let backend = FileBackend::open(dir.path()).unwrap();
            let data = backend.read(&key("a")).unwrap().unwrap();
            assert_eq!(&data, b"persistent data");
        }
    }

    #[test]
    fn file_lock_is_exclusive() {
        let dir = tempdir().unwrap();
        let _first = FileBackend::open(dir.path()).unwrap();

        let second = FileBackend::open(dir.path());
        assert!(matches!(second, Err(StorageError::Locked(_))));
    }

    #[test]
    fn file_lock_released_on_drop() {
        let dir = tempdir().unwrap();
        drop(FileBackend::open(dir.path()).unwrap());
        assert!(FileBackend::open(dir.path()).is_ok());
    }

    #[test]
    fn file_keys_ignore_foreign_files() {
        let dir = tempdir().unwrap();
        let backend = FileBackend::open(dir.path()).unwrap();

        backend.write(&key("b"), b"2").unwrap();
        backend.write(&key("a"), b"1").unwrap();
        fs::write(dir.path().join("notes.txt"), b"ignored").unwrap();
        fs::write(dir.path().join("noversion.bin"), b"ignored").unwrap();

        assert_eq!(backend.keys().unwrap(), vec![key("a"), key("b")]);
    }

    #[test]
    fn file_remove() {
        let dir = tempdir().unwrap();
        let backend = FileBackend::open(dir.path()).unwrap();

        backend.write(&key("a"), b"x").unwrap();
        backend.remove(&key("a")).unwrap();
        backend.remove(&key("a")).unwrap();
        assert!(backend.read(&key("a")).unwrap().is_none());
    }

    #[test]
    fn file_path() {
        let dir = tempdir().unwrap();
        let backend = FileBackend::open(dir.path()).unwrap();
        assert_eq!(backend.path(), dir.path());
        assert_eq!(
            backend.value_path(&key("x")),
            dir.path().join("x.v1.bin")
        );
    }
}
