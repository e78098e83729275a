use thiserror::Error;
use uuid::Uuid;

use crate::normalize::NormalizeError;

/// Failure reported by the cloud provider collaborator.
///
/// Carries the operation name and the resource it targeted so the caller can
/// report it verbatim without guessing what was in flight.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{operation} failed for {resource}: {reason}")]
pub struct ProviderError {
    pub operation: &'static str,
    pub resource: String,
    pub reason: String,
}

impl ProviderError {
    pub fn new(operation: &'static str, resource: impl Into<String>, reason: impl ToString) -> Self {
        Self {
            operation,
            resource: resource.into(),
            reason: reason.to_string(),
        }
    }
}

/// Errors produced by the key manager, vault, backends, and version store.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StoreError {
    /// No key has been generated yet; run configuration first.
    #[error("encryption key not found at {path}; run `rewind configure` first")]
    KeyNotFound { path: String },
    /// Key file exists but does not hold usable key material.
    #[error("invalid key material: {reason}")]
    InvalidKey { reason: String },
    /// Ciphertext present but unreadable under the installation key.
    #[error("decryption failed: {reason}")]
    Decryption { reason: String },
    /// Neither backend holds the requested version.
    #[error("version {id} not found")]
    VersionNotFound { id: Uuid },
    /// A single backend has no blob for the id.
    #[error("{backend} backend has no entry for {id}")]
    NotFound { backend: &'static str, id: Uuid },
    /// The storage target is missing or unreachable.
    #[error("{backend} backend unavailable: {reason}")]
    BackendUnavailable {
        backend: &'static str,
        reason: String,
    },
    #[error(transparent)]
    Normalize(#[from] NormalizeError),
    /// Plaintext could not be encoded or parsed as JSON.
    #[error("serialization failure: {reason}")]
    Serialization { reason: String },
    /// Underlying local storage failure.
    #[error("storage failure: {reason}")]
    Storage { reason: String },
    #[error(transparent)]
    Provider(#[from] ProviderError),
}

impl StoreError {
    pub fn storage(err: impl ToString) -> Self {
        Self::Storage {
            reason: err.to_string(),
        }
    }

    pub fn decryption(reason: impl ToString) -> Self {
        Self::Decryption {
            reason: reason.to_string(),
        }
    }

    pub fn serialization(err: impl ToString) -> Self {
        Self::Serialization {
            reason: err.to_string(),
        }
    }

    /// True when the error means "nothing stored under this id".
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            StoreError::NotFound { .. } | StoreError::VersionNotFound { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn provider_error_names_operation_and_resource() {
        let err = ProviderError::new("put_object", "ops-bucket/abc.enc", "403 Forbidden");
        assert_eq!(
            err.to_string(),
            "put_object failed for ops-bucket/abc.enc: 403 Forbidden"
        );
    }

    #[test]
    fn provider_error_converts_into_store_error() {
        let err: StoreError = ProviderError::new("head_bucket", "b", "timeout").into();
        assert!(matches!(err, StoreError::Provider(ref p) if p.operation == "head_bucket"));
        assert!(!err.is_not_found());
    }
}
