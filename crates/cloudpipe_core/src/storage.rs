//! Object storage capability used by the mapper.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use crate::error::StorageError;

pub trait ObjectStorage {
    /// Downloads `key` into `local_path`, replacing any existing file.
    fn fetch(&self, key: &str, local_path: &Path) -> Result<(), StorageError>;

    /// Uploads the file at `local_path` as `key`.
    fn store(&self, local_path: &Path, key: &str) -> Result<(), StorageError>;
}

/// Backend for running outside the cloud: inputs are expected to already be
/// on disk and outputs stay there.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopStorage;

impl ObjectStorage for NoopStorage {
    fn fetch(&self, _key: &str, _local_path: &Path) -> Result<(), StorageError> {
        Ok(())
    }

    fn store(&self, local_path: &Path, _key: &str) -> Result<(), StorageError> {
        ensure_local_file(local_path)
    }
}

/// In-process object store that records every call.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    objects: Mutex<BTreeMap<String, Vec<u8>>>,
    fetches: Mutex<Vec<(String, PathBuf)>>,
    stores: Mutex<Vec<(PathBuf, String)>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_object(self, key: impl Into<String>, body: impl Into<Vec<u8>>) -> Self {
        self.seed_object(key, body);
        self
    }

    pub fn seed_object(&self, key: impl Into<String>, body: impl Into<Vec<u8>>) {
        self.objects
            .lock()
            .expect("poisoned mutex")
            .insert(key.into(), body.into());
    }

    pub fn object(&self, key: &str) -> Option<Vec<u8>> {
        self.objects
            .lock()
            .expect("poisoned mutex")
            .get(key)
            .cloned()
    }

    pub fn keys(&self) -> Vec<String> {
        self.objects
            .lock()
            .expect("poisoned mutex")
            .keys()
            .cloned()
            .collect()
    }

    /// `(key, local path)` pairs in call order.
    pub fn fetches(&self) -> Vec<(String, PathBuf)> {
        self.fetches.lock().expect("poisoned mutex").clone()
    }

    /// `(local path, key)` pairs in call order.
    pub fn stores(&self) -> Vec<(PathBuf, String)> {
        self.stores.lock().expect("poisoned mutex").clone()
    }

    pub fn stored_keys(&self) -> Vec<String> {
        self.stores().into_iter().map(|(_, key)| key).collect()
    }
}

impl ObjectStorage for MemoryStorage {
    fn fetch(&self, key: &str, local_path: &Path) -> Result<(), StorageError> {
        self.fetches
            .lock()
            .expect("poisoned mutex")
            .push((key.to_string(), local_path.to_path_buf()));

        let body = self
            .object(key)
            .ok_or_else(|| StorageError::ObjectNotFound {
                key: key.to_string(),
            })?;
        fs::write(local_path, body).map_err(|source| StorageError::Io {
            path: local_path.to_path_buf(),
            source,
        })
    }

    fn store(&self, local_path: &Path, key: &str) -> Result<(), StorageError> {
        self.stores
            .lock()
            .expect("poisoned mutex")
            .push((local_path.to_path_buf(), key.to_string()));

        ensure_local_file(local_path)?;
        let body = fs::read(local_path).map_err(|source| StorageError::Io {
            path: local_path.to_path_buf(),
            source,
        })?;
        self.seed_object(key, body);
        Ok(())
    }
}

pub fn ensure_local_file(path: &Path) -> Result<(), StorageError> {
    if path.is_file() {
        Ok(())
    } else {
        Err(StorageError::LocalFileNotFound {
            path: path.to_path_buf(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_storage_round_trips_through_local_files() {
        let dir = tempfile::tempdir().expect("tempdir should be created");
        let storage = MemoryStorage::new().with_object("in/a.txt", b"hello".to_vec());
        let local = dir.path().join("a.txt");

        storage.fetch("in/a.txt", &local).expect("fetch should succeed");
        storage.store(&local, "out/a.txt").expect("store should succeed");

        assert_eq!(storage.object("out/a.txt"), Some(b"hello".to_vec()));
        assert_eq!(storage.fetches(), vec![("in/a.txt".to_string(), local.clone())]);
        assert_eq!(storage.stored_keys(), vec!["out/a.txt".to_string()]);
    }

    #[test]
    fn missing_object_and_missing_file_are_distinct() {
        let dir = tempfile::tempdir().expect("tempdir should be created");
        let storage = MemoryStorage::new();

        assert!(matches!(
            storage.fetch("absent", &dir.path().join("x")),
            Err(StorageError::ObjectNotFound { .. })
        ));
        assert!(matches!(
            storage.store(&dir.path().join("y"), "k"),
            Err(StorageError::LocalFileNotFound { .. })
        ));
    }

    #[test]
    fn noop_storage_only_checks_outputs_exist() {
        let dir = tempfile::tempdir().expect("tempdir should be created");
        let local = dir.path().join("out.txt");

        NoopStorage.fetch("any", &local).expect("fetch is a no-op");
        assert!(!local.exists());
        assert!(NoopStorage.store(&local, "k").is_err());

        fs::write(&local, b"x").expect("file should be written");
        NoopStorage.store(&local, "k").expect("store should succeed");
    }
}
