use std::collections::BTreeSet;

use uuid::Uuid;

use crate::error::StoreError;

/// File extension (and object-key suffix) of encrypted version records.
pub const RECORD_EXTENSION: &str = "enc";

/// Byte storage for encrypted version blobs, addressed by version id.
pub trait Backend: Send + Sync {
    /// Short name used for logging and error context.
    fn name(&self) -> &'static str;

    /// Persist a blob under `id`, overwriting any existing entry.
    fn put(&self, id: Uuid, bytes: &[u8]) -> Result<(), StoreError>;

    /// Retrieve the blob for `id`; `StoreError::NotFound` when absent.
    fn get(&self, id: Uuid) -> Result<Vec<u8>, StoreError>;

    /// Ids of every record held by this backend.
    fn list(&self) -> Result<BTreeSet<Uuid>, StoreError>;

    /// Whether the destination itself is provisioned and reachable.
    fn exists_target(&self) -> bool;
}

/// `<version_id>.enc`
pub fn record_name(id: Uuid) -> String {
    format!("{id}.{RECORD_EXTENSION}")
}

/// Inverse of [`record_name`]; `None` for anything that is not a record.
pub fn parse_record_name(name: &str) -> Option<Uuid> {
    let stem = name.strip_suffix(RECORD_EXTENSION)?.strip_suffix('.')?;
    Uuid::parse_str(stem).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_names_round_trip() {
        let id = Uuid::new_v4();
        let name = record_name(id);
        assert!(name.ends_with(".enc"));
        assert_eq!(parse_record_name(&name), Some(id));
    }

    #[test]
    fn foreign_names_are_ignored() {
        assert_eq!(parse_record_name(".tmpA1b2C3"), None);
        assert_eq!(parse_record_name("notes.enc"), None);
        assert_eq!(parse_record_name("master.key"), None);
        let id = Uuid::new_v4();
        assert_eq!(parse_record_name(&format!("{id}.json")), None);
        assert_eq!(parse_record_name(&format!("{id}enc")), None);
    }
}
