use std::{fs, io, path::PathBuf};

use rewind_core::{model::CredentialRecord, StoreError};
use tracing::{debug, instrument};

use crate::{atomic::write_private, key_manager::KeyManager, vault};

/// Encrypted single-record store for cloud credentials.
pub struct CredentialStore<K: KeyManager> {
    path: PathBuf,
    keys: K,
}

impl<K: KeyManager> CredentialStore<K> {
    pub fn new(path: impl Into<PathBuf>, keys: K) -> Self {
        Self {
            path: path.into(),
            keys,
        }
    }

    /// Replace the stored credentials wholesale.
    #[instrument(skip_all, fields(access_key_id = %record.access_key_id, region = %record.region))]
    pub fn save(&self, record: &CredentialRecord) -> Result<(), StoreError> {
        let key = self.keys.load_key()?;
        let blob = vault::seal_json(record, &key)?;
        write_private(&self.path, &blob)?;
        debug!("credentials saved");
        Ok(())
    }

    /// Stored credentials, or `None` if configuration never ran.
    #[instrument(skip_all)]
    pub fn load(&self) -> Result<Option<CredentialRecord>, StoreError> {
        let blob = match fs::read(&self.path) {
            Ok(blob) => blob,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(StoreError::storage(err)),
        };
        let key = self.keys.load_key()?;
        vault::open_json(&blob, &key).map(Some)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::key_manager::{FileKeyManager, InMemoryKeyManager};

    #[test]
    fn round_trip_credentials() {
        let dir = tempfile::tempdir().expect("tempdir");
        let keys = FileKeyManager::new(dir.path().join("master.key"));
        keys.ensure_key().expect("key");
        let store = CredentialStore::new(dir.path().join("credentials.enc"), keys);

        assert_eq!(store.load().expect("load"), None);

        let record = CredentialRecord::new("AK", "SK", "us-east-1");
        store.save(&record).expect("save");
        assert_eq!(store.load().expect("load"), Some(record));

        let stored = fs::read(dir.path().join("credentials.enc")).expect("blob");
        assert!(!String::from_utf8_lossy(&stored).contains("SK\""));
    }

    #[test]
    fn save_overwrites_previous_record() {
        let dir = tempfile::tempdir().expect("tempdir");
        let keys = InMemoryKeyManager::default();
        keys.ensure_key().expect("key");
        let store = CredentialStore::new(dir.path().join("credentials.enc"), keys);

        store
            .save(&CredentialRecord::new("AK1", "SK1", "us-east-1"))
            .expect("first");
        let second = CredentialRecord::new("AK2", "SK2", "eu-west-1");
        store.save(&second).expect("second");
        assert_eq!(store.load().expect("load"), Some(second));
    }

    #[test]
    fn save_without_key_is_key_not_found() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = CredentialStore::new(
            dir.path().join("credentials.enc"),
            InMemoryKeyManager::default(),
        );
        let err = store
            .save(&CredentialRecord::new("AK", "SK", "us-east-1"))
            .expect_err("no key");
        assert!(matches!(err, StoreError::KeyNotFound { .. }));
    }

    #[test]
    fn blob_under_another_key_is_a_decryption_error() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("credentials.enc");

        let writer_keys = InMemoryKeyManager::default();
        writer_keys.ensure_key().unwrap();
        CredentialStore::new(&path, writer_keys)
            .save(&CredentialRecord::new("AK", "SK", "us-east-1"))
            .expect("save");

        let reader_keys = InMemoryKeyManager::default();
        reader_keys.ensure_key().unwrap();
        let err = CredentialStore::new(&path, reader_keys)
            .load()
            .expect_err("other key");
        assert!(matches!(err, StoreError::Decryption { .. }));
    }
}
