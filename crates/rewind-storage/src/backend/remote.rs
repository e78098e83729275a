use std::collections::BTreeSet;

use rewind_core::{
    storage::{parse_record_name, record_name, Backend, ObjectStore},
    StoreError,
};
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

/// Version blobs as `<id>.enc` objects in one designated bucket.
pub struct RemoteBackend<O: ObjectStore> {
    store: O,
    bucket: String,
    region: String,
}

impl<O: ObjectStore> RemoteBackend<O> {
    pub fn new(store: O, bucket: impl Into<String>, region: impl Into<String>) -> Self {
        Self {
            store,
            bucket: bucket.into(),
            region: region.into(),
        }
    }

    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    pub fn region(&self) -> &str {
        &self.region
    }

    /// Create the designated bucket in the configured region.
    #[instrument(skip_all, fields(bucket = %self.bucket, region = %self.region))]
    pub fn provision_target(&self) -> Result<(), StoreError> {
        self.store.create_bucket(&self.bucket, &self.region)?;
        info!("provisioned remote version bucket");
        Ok(())
    }
}

impl<O: ObjectStore> Backend for RemoteBackend<O> {
    fn name(&self) -> &'static str {
        "remote"
    }

    #[instrument(skip_all, fields(backend = self.name(), bucket = %self.bucket, id = %id))]
    fn put(&self, id: Uuid, bytes: &[u8]) -> Result<(), StoreError> {
        self.store
            .put_object(&self.bucket, &record_name(id), bytes)
            .map_err(StoreError::from)
    }

    #[instrument(skip_all, fields(backend = self.name(), bucket = %self.bucket, id = %id))]
    fn get(&self, id: Uuid) -> Result<Vec<u8>, StoreError> {
        self.store
            .get_object(&self.bucket, &record_name(id))?
            .ok_or(StoreError::NotFound {
                backend: self.name(),
                id,
            })
    }

    #[instrument(skip_all, fields(backend = self.name(), bucket = %self.bucket))]
    fn list(&self) -> Result<BTreeSet<Uuid>, StoreError> {
        let objects = self.store.list_objects(&self.bucket)?;
        Ok(objects
            .iter()
            .filter_map(|object| parse_record_name(&object.key))
            .collect())
    }

    /// Probe the bucket. Absence and provider failures (missing or rejected
    /// credentials included) both read as "not there".
    fn exists_target(&self) -> bool {
        match self.store.bucket_exists(&self.bucket) {
            Ok(true) => true,
            Ok(false) => {
                debug!(bucket = %self.bucket, "remote bucket does not exist");
                false
            }
            Err(err) => {
                warn!(bucket = %self.bucket, error = %err, "remote bucket unreachable");
                false
            }
        }
    }
}
