use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::normalize::ResourceDescriptor;

/// Trailing characters of a secret left readable when masked.
const MASK_VISIBLE: usize = 4;

/// Cloud credentials as entered during configuration.
///
/// Only ever plaintext in memory; the vault stores it encrypted.
#[derive(Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CredentialRecord {
    pub access_key_id: String,
    pub secret_key: String,
    pub region: String,
}

impl CredentialRecord {
    pub fn new(
        access_key_id: impl Into<String>,
        secret_key: impl Into<String>,
        region: impl Into<String>,
    ) -> Self {
        Self {
            access_key_id: access_key_id.into(),
            secret_key: secret_key.into(),
            region: region.into(),
        }
    }

    /// Secret key with everything but the last four characters hidden.
    /// Secrets of four characters or fewer are hidden entirely.
    pub fn masked_secret(&self) -> String {
        let len = self.secret_key.chars().count();
        if len <= MASK_VISIBLE {
            return "*".repeat(MASK_VISIBLE);
        }
        let visible: String = self.secret_key.chars().skip(len - MASK_VISIBLE).collect();
        format!("{}{}", "*".repeat(len - MASK_VISIBLE), visible)
    }
}

impl fmt::Debug for CredentialRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CredentialRecord")
            .field("access_key_id", &self.access_key_id)
            .field("secret_key", &"[REDACTED]")
            .field("region", &self.region)
            .finish()
    }
}

/// Immutable snapshot of a provisioning action.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct VersionRecord {
    pub version_id: Uuid,
    pub comment: String,
    pub content: Vec<ResourceDescriptor>,
}

impl VersionRecord {
    /// Build a record under a freshly generated id.
    pub fn new(comment: impl Into<String>, content: Vec<ResourceDescriptor>) -> Self {
        Self {
            version_id: Uuid::new_v4(),
            comment: comment.into(),
            content,
        }
    }

    pub fn instance_count(&self) -> usize {
        self.content.len()
    }
}

/// Where a version blob was found or written.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "lowercase")]
pub enum Location {
    Local,
    Remote,
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Location::Local => f.pad("local"),
            Location::Remote => f.pad("remote"),
        }
    }
}

/// One line of `list` output.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct VersionSummary {
    pub version_id: Uuid,
    pub comment: String,
    pub instance_count: usize,
    pub location: Location,
}

impl VersionSummary {
    pub fn from_record(record: &VersionRecord, location: Location) -> Self {
        Self {
            version_id: record.version_id,
            comment: record.comment.clone(),
            instance_count: record.instance_count(),
            location,
        }
    }
}
