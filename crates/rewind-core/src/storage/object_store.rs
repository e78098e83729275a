use std::{
    collections::{BTreeMap, HashMap},
    sync::{Arc, Mutex, MutexGuard},
};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ProviderError;

/// Metadata for one object in a bucket listing.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ObjectInfo {
    pub key: String,
    pub size: u64,
    pub last_modified: Option<DateTime<Utc>>,
}

/// Bucket and object operations of the cloud provider.
///
/// Calls block until the provider answers. Every failure carries the
/// operation name and the bucket/object it targeted.
pub trait ObjectStore: Send + Sync {
    fn bucket_exists(&self, bucket: &str) -> Result<bool, ProviderError>;

    fn create_bucket(&self, bucket: &str, region: &str) -> Result<(), ProviderError>;

    fn delete_bucket(&self, bucket: &str) -> Result<(), ProviderError>;

    /// Write an object, replacing any existing one under the same key.
    fn put_object(&self, bucket: &str, key: &str, bytes: &[u8]) -> Result<(), ProviderError>;

    /// Read an object; `Ok(None)` when the key does not exist.
    fn get_object(&self, bucket: &str, key: &str) -> Result<Option<Vec<u8>>, ProviderError>;

    fn list_objects(&self, bucket: &str) -> Result<Vec<ObjectInfo>, ProviderError>;
}

/// In-memory object store for tests and offline smoke runs.
///
/// Clones share state, so a test can hand one clone to a backend and inspect
/// the other.
#[derive(Debug, Clone)]
pub struct InMemoryObjectStore {
    buckets: Arc<Mutex<HashMap<String, BTreeMap<String, Vec<u8>>>>>,
    reachable: bool,
}

impl Default for InMemoryObjectStore {
    fn default() -> Self {
        Self {
            buckets: Arc::default(),
            reachable: true,
        }
    }
}

impl InMemoryObjectStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store that starts with an empty bucket already provisioned.
    pub fn with_bucket(bucket: &str) -> Self {
        let store = Self::default();
        if let Ok(mut buckets) = store.buckets.lock() {
            buckets.insert(bucket.to_string(), BTreeMap::new());
        }
        store
    }

    /// Store whose every call fails, as with missing or rejected credentials.
    pub fn unreachable() -> Self {
        Self {
            reachable: false,
            ..Self::default()
        }
    }

    /// Keys currently held in `bucket` (empty if the bucket is absent).
    pub fn object_keys(&self, bucket: &str) -> Vec<String> {
        self.buckets
            .lock()
            .map(|buckets| {
                buckets
                    .get(bucket)
                    .map(|objects| objects.keys().cloned().collect())
                    .unwrap_or_default()
            })
            .unwrap_or_default()
    }

    fn lock(
        &self,
        operation: &'static str,
        resource: &str,
    ) -> Result<MutexGuard<'_, HashMap<String, BTreeMap<String, Vec<u8>>>>, ProviderError> {
        if !self.reachable {
            return Err(ProviderError::new(
                operation,
                resource,
                "provider unreachable: credentials missing or rejected",
            ));
        }
        self.buckets
            .lock()
            .map_err(|err| ProviderError::new(operation, resource, format!("lock poisoned: {err}")))
    }
}

fn no_such_bucket(operation: &'static str, bucket: &str) -> ProviderError {
    ProviderError::new(operation, bucket, "NoSuchBucket")
}

impl ObjectStore for InMemoryObjectStore {
    fn bucket_exists(&self, bucket: &str) -> Result<bool, ProviderError> {
        let buckets = self.lock("head_bucket", bucket)?;
        Ok(buckets.contains_key(bucket))
    }

    fn create_bucket(&self, bucket: &str, _region: &str) -> Result<(), ProviderError> {
        let mut buckets = self.lock("create_bucket", bucket)?;
        if buckets.contains_key(bucket) {
            return Err(ProviderError::new(
                "create_bucket",
                bucket,
                "BucketAlreadyOwnedByYou",
            ));
        }
        buckets.insert(bucket.to_string(), BTreeMap::new());
        Ok(())
    }

    fn delete_bucket(&self, bucket: &str) -> Result<(), ProviderError> {
        let mut buckets = self.lock("delete_bucket", bucket)?;
        match buckets.get(bucket) {
            None => Err(no_such_bucket("delete_bucket", bucket)),
            Some(objects) if !objects.is_empty() => {
                Err(ProviderError::new("delete_bucket", bucket, "BucketNotEmpty"))
            }
            Some(_) => {
                buckets.remove(bucket);
                Ok(())
            }
        }
    }

    fn put_object(&self, bucket: &str, key: &str, bytes: &[u8]) -> Result<(), ProviderError> {
        let resource = format!("{bucket}/{key}");
        let mut buckets = self.lock("put_object", &resource)?;
        let objects = buckets
            .get_mut(bucket)
            .ok_or_else(|| no_such_bucket("put_object", bucket))?;
        objects.insert(key.to_string(), bytes.to_vec());
        Ok(())
    }

    fn get_object(&self, bucket: &str, key: &str) -> Result<Option<Vec<u8>>, ProviderError> {
        let resource = format!("{bucket}/{key}");
        let buckets = self.lock("get_object", &resource)?;
        let objects = buckets
            .get(bucket)
            .ok_or_else(|| no_such_bucket("get_object", bucket))?;
        Ok(objects.get(key).cloned())
    }

    fn list_objects(&self, bucket: &str) -> Result<Vec<ObjectInfo>, ProviderError> {
        let buckets = self.lock("list_objects", bucket)?;
        let objects = buckets
            .get(bucket)
            .ok_or_else(|| no_such_bucket("list_objects", bucket))?;
        Ok(objects
            .iter()
            .map(|(key, bytes)| ObjectInfo {
                key: key.clone(),
                size: bytes.len() as u64,
                last_modified: None,
            })
            .collect())
    }
}
