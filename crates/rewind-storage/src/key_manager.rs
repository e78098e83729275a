use std::{
    fmt, fs, io,
    path::PathBuf,
    sync::{Arc, Mutex},
};

use rand::{rngs::OsRng, RngCore};
use rewind_core::StoreError;
use tracing::{info, instrument};

use crate::atomic::write_private_new;

/// Length of the installation key in bytes (AES-256).
pub const KEY_LEN: usize = 32;

/// The single symmetric key protecting every secret at rest.
#[derive(Clone, PartialEq, Eq)]
pub struct EncryptionKey([u8; KEY_LEN]);

impl EncryptionKey {
    pub fn generate() -> Self {
        let mut bytes = [0u8; KEY_LEN];
        OsRng.fill_bytes(&mut bytes);
        Self(bytes)
    }

    pub fn from_slice(bytes: &[u8]) -> Result<Self, StoreError> {
        let bytes: [u8; KEY_LEN] = bytes.try_into().map_err(|_| StoreError::InvalidKey {
            reason: format!("expected {KEY_LEN} bytes, got {}", bytes.len()),
        })?;
        Ok(Self(bytes))
    }

    pub fn as_bytes(&self) -> &[u8; KEY_LEN] {
        &self.0
    }
}

impl fmt::Debug for EncryptionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EncryptionKey")
            .field("key", &"[REDACTED]")
            .finish()
    }
}

/// Supplies the installation key (key file in production; memory in tests).
pub trait KeyManager: Send + Sync {
    /// Return the key, generating and persisting it first if none exists.
    fn ensure_key(&self) -> Result<EncryptionKey, StoreError>;

    /// Return the existing key; `StoreError::KeyNotFound` if never generated.
    fn load_key(&self) -> Result<EncryptionKey, StoreError>;
}

impl<T> KeyManager for Arc<T>
where
    T: KeyManager + ?Sized,
{
    fn ensure_key(&self) -> Result<EncryptionKey, StoreError> {
        (**self).ensure_key()
    }

    fn load_key(&self) -> Result<EncryptionKey, StoreError> {
        (**self).load_key()
    }
}

/// Key kept as raw bytes in an owner-only file.
///
/// File presence is the source of truth: the key is written once, never
/// rotated, and shared by every process of the installation.
#[derive(Debug, Clone)]
pub struct FileKeyManager {
    path: PathBuf,
}

impl FileKeyManager {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl KeyManager for FileKeyManager {
    #[instrument(skip_all, fields(path = %self.path.display()))]
    fn ensure_key(&self) -> Result<EncryptionKey, StoreError> {
        match self.load_key() {
            Err(StoreError::KeyNotFound { .. }) => {}
            other => return other,
        }

        let key = EncryptionKey::generate();
        if write_private_new(&self.path, key.as_bytes())? {
            info!("generated new installation key");
            Ok(key)
        } else {
            // Lost a creation race with another process; theirs wins.
            self.load_key()
        }
    }

    #[instrument(skip_all, fields(path = %self.path.display()))]
    fn load_key(&self) -> Result<EncryptionKey, StoreError> {
        match fs::read(&self.path) {
            Ok(bytes) => EncryptionKey::from_slice(&bytes),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Err(StoreError::KeyNotFound {
                path: self.path.display().to_string(),
            }),
            Err(err) => Err(StoreError::storage(err)),
        }
    }
}

/// In-memory key manager for tests and ephemeral sessions.
#[derive(Debug, Default, Clone)]
pub struct InMemoryKeyManager {
    inner: Arc<Mutex<Option<EncryptionKey>>>,
}

impl KeyManager for InMemoryKeyManager {
    fn ensure_key(&self) -> Result<EncryptionKey, StoreError> {
        let mut guard = self
            .inner
            .lock()
            .map_err(|err| StoreError::storage(format!("lock poisoned: {err}")))?;

        if let Some(existing) = guard.clone() {
            return Ok(existing);
        }

        let key = EncryptionKey::generate();
        *guard = Some(key.clone());
        Ok(key)
    }

    fn load_key(&self) -> Result<EncryptionKey, StoreError> {
        let guard = self
            .inner
            .lock()
            .map_err(|err| StoreError::storage(format!("lock poisoned: {err}")))?;
        guard.clone().ok_or_else(|| StoreError::KeyNotFound {
            path: "<memory>".to_string(),
        })
    }
}
