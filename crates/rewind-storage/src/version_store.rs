//! Versioned snapshots of provisioning actions.
//!
//! Records are normalized, encrypted, and written to exactly one backend:
//! the remote bucket when it exists, otherwise wherever the caller's
//! [`TargetChooser`] decides. Reads probe the local directory first, then the
//! remote bucket; listing merges both.

use std::collections::BTreeMap;

use rewind_core::{
    model::{Location, VersionRecord, VersionSummary},
    normalize::{normalize_each, RawValue},
    storage::{Backend, ObjectStore},
    StoreError,
};
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::{
    backend::{LocalBackend, RemoteBackend},
    key_manager::{EncryptionKey, KeyManager},
    vault,
};

/// What to do when the remote bucket is missing at save time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fallback {
    /// Create the bucket now and write there.
    ProvisionRemote,
    /// Write to the local directory instead.
    Local,
    /// Give up; the save fails with `BackendUnavailable`.
    Abort,
}

/// Decides where a save goes when the remote bucket does not exist.
/// The command layer implements this with an operator prompt.
pub trait TargetChooser {
    fn choose(&self, bucket: &str) -> Fallback;
}

/// A fixed policy, for non-interactive callers.
impl TargetChooser for Fallback {
    fn choose(&self, _bucket: &str) -> Fallback {
        *self
    }
}

/// Outcome of a successful save.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SavedVersion {
    pub version_id: Uuid,
    pub location: Location,
}

/// A listed version whose blob could not be read back.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnreadableVersion {
    pub version_id: Uuid,
    pub location: Location,
    pub error: StoreError,
}

/// Result of a full listing. Unreadable entries do not abort the scan.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VersionListing {
    pub versions: Vec<VersionSummary>,
    pub unreadable: Vec<UnreadableVersion>,
}

pub struct VersionStore<K: KeyManager, O: ObjectStore> {
    keys: K,
    local: LocalBackend,
    remote: RemoteBackend<O>,
}

impl<K: KeyManager, O: ObjectStore> VersionStore<K, O> {
    pub fn new(keys: K, local: LocalBackend, remote: RemoteBackend<O>) -> Self {
        Self {
            keys,
            local,
            remote,
        }
    }

    pub fn local(&self) -> &LocalBackend {
        &self.local
    }

    pub fn remote(&self) -> &RemoteBackend<O> {
        &self.remote
    }

    /// Normalize, encrypt, and persist a new version; returns its id.
    ///
    /// Normalization and key lookup happen before any backend is touched, so
    /// a failed save leaves nothing behind. The chosen backend is written
    /// exactly once.
    #[instrument(skip_all, fields(items = content.len()))]
    pub fn save(
        &self,
        comment: impl Into<String>,
        content: &[RawValue],
        chooser: &dyn TargetChooser,
    ) -> Result<SavedVersion, StoreError> {
        let record = VersionRecord::new(comment, normalize_each(content)?);
        let key = self.keys.load_key()?;
        let blob = vault::seal_json(&record, &key)?;

        let location = self.select_target(chooser)?;
        match location {
            Location::Local => self.local.put(record.version_id, &blob)?,
            Location::Remote => self.remote.put(record.version_id, &blob)?,
        }

        info!(version_id = %record.version_id, %location, "version saved");
        Ok(SavedVersion {
            version_id: record.version_id,
            location,
        })
    }

    /// Read a version back: local first, then remote.
    ///
    /// A blob that exists but cannot be decrypted is an error; the other
    /// backend is not consulted.
    #[instrument(skip_all, fields(version_id = %id))]
    pub fn load(&self, id: Uuid) -> Result<VersionRecord, StoreError> {
        let key = self.keys.load_key()?;

        match self.read_from(id, Location::Local, &key) {
            Err(err) if err.is_not_found() => {}
            other => return other,
        }

        if !self.remote.exists_target() {
            return Err(StoreError::VersionNotFound { id });
        }
        match self.read_from(id, Location::Remote, &key) {
            Err(err) if err.is_not_found() => Err(StoreError::VersionNotFound { id }),
            other => other,
        }
    }

    /// Summaries of every version in either backend, ordered by id.
    ///
    /// Each entry is fully loaded and decrypted; an id present in both
    /// backends is read from the local copy.
    #[instrument(skip_all)]
    pub fn list(&self) -> Result<VersionListing, StoreError> {
        let mut ids: BTreeMap<Uuid, Location> = self
            .local
            .list()?
            .into_iter()
            .map(|id| (id, Location::Local))
            .collect();

        if self.remote.exists_target() {
            match self.remote.list() {
                Ok(remote_ids) => {
                    for id in remote_ids {
                        ids.entry(id).or_insert(Location::Remote);
                    }
                }
                Err(err) => warn!(error = %err, "remote listing failed; showing local versions only"),
            }
        }

        let mut listing = VersionListing::default();
        if ids.is_empty() {
            return Ok(listing);
        }

        let key = self.keys.load_key()?;
        for (id, location) in ids {
            match self.read_from(id, location, &key) {
                Ok(record) => listing
                    .versions
                    .push(VersionSummary::from_record(&record, location)),
                Err(error) => {
                    warn!(version_id = %id, %location, %error, "skipping unreadable version");
                    listing.unreadable.push(UnreadableVersion {
                        version_id: id,
                        location,
                        error,
                    });
                }
            }
        }
        Ok(listing)
    }

    fn select_target(&self, chooser: &dyn TargetChooser) -> Result<Location, StoreError> {
        if self.remote.exists_target() {
            return Ok(Location::Remote);
        }
        match chooser.choose(self.remote.bucket()) {
            Fallback::ProvisionRemote => {
                self.remote.provision_target()?;
                Ok(Location::Remote)
            }
            Fallback::Local => Ok(Location::Local),
            Fallback::Abort => Err(StoreError::BackendUnavailable {
                backend: "remote",
                reason: format!("bucket {} does not exist", self.remote.bucket()),
            }),
        }
    }

    fn read_from(
        &self,
        id: Uuid,
        location: Location,
        key: &EncryptionKey,
    ) -> Result<VersionRecord, StoreError> {
        let blob = match location {
            Location::Local => self.local.get(id)?,
            Location::Remote => self.remote.get(id)?,
        };
        let record: VersionRecord = vault::open_json(&blob, key)?;
        if record.version_id != id {
            return Err(StoreError::serialization(format!(
                "record stored as {id} claims id {}",
                record.version_id
            )));
        }
        Ok(record)
    }
}
