use std::{
    path::{Path, PathBuf},
    sync::Arc,
};

use rewind_core::{
    model::{CredentialRecord, VersionRecord},
    normalize::RawValue,
    storage::ObjectStore,
    StoreError,
};
use tracing::debug;
use uuid::Uuid;

use crate::{
    backend::{LocalBackend, RemoteBackend},
    credentials::CredentialStore,
    key_manager::{EncryptionKey, FileKeyManager, KeyManager},
    version_store::{SavedVersion, TargetChooser, VersionListing, VersionStore},
};

const KEY_FILE: &str = "master.key";
const CREDENTIALS_FILE: &str = "credentials.enc";
const VERSIONS_DIR: &str = "versions";

/// On-disk layout of an installation, rooted at one owner-only directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorePaths {
    root: PathBuf,
}

impl StorePaths {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn key_file(&self) -> PathBuf {
        self.root.join(KEY_FILE)
    }

    pub fn credentials_file(&self) -> PathBuf {
        self.root.join(CREDENTIALS_FILE)
    }

    pub fn versions_dir(&self) -> PathBuf {
        self.root.join(VERSIONS_DIR)
    }
}

/// Everything the command layer needs: key, credentials, and versions.
pub struct Ledger<O: ObjectStore> {
    keys: Arc<FileKeyManager>,
    credentials: CredentialStore<Arc<FileKeyManager>>,
    versions: VersionStore<Arc<FileKeyManager>, O>,
}

impl<O: ObjectStore> Ledger<O> {
    pub fn open(paths: &StorePaths, remote: RemoteBackend<O>) -> Self {
        debug!(root = %paths.root().display(), bucket = remote.bucket(), "opening ledger");
        let keys = Arc::new(FileKeyManager::new(paths.key_file()));
        Self {
            credentials: CredentialStore::new(paths.credentials_file(), Arc::clone(&keys)),
            versions: VersionStore::new(
                Arc::clone(&keys),
                LocalBackend::new(paths.versions_dir()),
                remote,
            ),
            keys,
        }
    }

    pub fn ensure_key(&self) -> Result<EncryptionKey, StoreError> {
        self.keys.ensure_key()
    }

    pub fn load_key(&self) -> Result<EncryptionKey, StoreError> {
        self.keys.load_key()
    }

    pub fn save_credentials(&self, record: &CredentialRecord) -> Result<(), StoreError> {
        self.credentials.save(record)
    }

    pub fn load_credentials(&self) -> Result<Option<CredentialRecord>, StoreError> {
        self.credentials.load()
    }

    pub fn save_version(
        &self,
        comment: impl Into<String>,
        content: &[RawValue],
        chooser: &dyn TargetChooser,
    ) -> Result<SavedVersion, StoreError> {
        self.versions.save(comment, content, chooser)
    }

    pub fn load_version(&self, id: Uuid) -> Result<VersionRecord, StoreError> {
        self.versions.load(id)
    }

    pub fn list_versions(&self) -> Result<VersionListing, StoreError> {
        self.versions.list()
    }

    pub fn remote(&self) -> &RemoteBackend<O> {
        self.versions.remote()
    }
}
