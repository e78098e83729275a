use std::{collections::BTreeSet, fs, io, path::PathBuf};

use rewind_core::{
    storage::{parse_record_name, record_name, Backend},
    StoreError,
};
use tracing::instrument;
use uuid::Uuid;

use crate::atomic::{ensure_private_dir, write_private};

/// Version blobs as `<id>.enc` files in an owner-only directory.
#[derive(Debug, Clone)]
pub struct LocalBackend {
    dir: PathBuf,
}

impl LocalBackend {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub(crate) fn path_for(&self, id: Uuid) -> PathBuf {
        self.dir.join(record_name(id))
    }
}

impl Backend for LocalBackend {
    fn name(&self) -> &'static str {
        "local"
    }

    #[instrument(skip_all, fields(backend = self.name(), id = %id))]
    fn put(&self, id: Uuid, bytes: &[u8]) -> Result<(), StoreError> {
        ensure_private_dir(&self.dir)?;
        write_private(&self.path_for(id), bytes)
    }

    #[instrument(skip_all, fields(backend = self.name(), id = %id))]
    fn get(&self, id: Uuid) -> Result<Vec<u8>, StoreError> {
        fs::read(self.path_for(id)).map_err(|err| {
            if err.kind() == io::ErrorKind::NotFound {
                StoreError::NotFound {
                    backend: self.name(),
                    id,
                }
            } else {
                StoreError::storage(err)
            }
        })
    }

    #[instrument(skip_all, fields(backend = self.name()))]
    fn list(&self) -> Result<BTreeSet<Uuid>, StoreError> {
        let entries = match fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(BTreeSet::new()),
            Err(err) => return Err(StoreError::storage(err)),
        };

        let mut ids = BTreeSet::new();
        for entry in entries {
            let entry = entry.map_err(StoreError::storage)?;
            if let Some(id) = entry.file_name().to_str().and_then(parse_record_name) {
                ids.insert(id);
            }
        }
        Ok(ids)
    }

    fn exists_target(&self) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn put_get_list() {
        let dir = tempfile::tempdir().expect("tempdir");
        let backend = LocalBackend::new(dir.path().join("versions"));
        let id = Uuid::new_v4();

        backend.put(id, b"blob").expect("put");
        assert_eq!(backend.get(id).expect("get"), b"blob");
        assert_eq!(backend.list().expect("list"), BTreeSet::from([id]));
        assert!(backend.path_for(id).ends_with(format!("{id}.enc")));
    }

    #[test]
    fn missing_directory_lists_empty() {
        let dir = tempfile::tempdir().expect("tempdir");
        let backend = LocalBackend::new(dir.path().join("never-created"));
        assert!(backend.list().expect("list").is_empty());
        assert!(backend.exists_target());
    }

    #[test]
    fn missing_entry_is_not_found() {
        let dir = tempfile::tempdir().expect("tempdir");
        let backend = LocalBackend::new(dir.path());
        let id = Uuid::new_v4();
        let err = backend.get(id).expect_err("missing");
        assert_eq!(err, StoreError::NotFound { backend: "local", id });
    }

    #[test]
    fn list_skips_foreign_files() {
        let dir = tempfile::tempdir().expect("tempdir");
        let backend = LocalBackend::new(dir.path());
        let id = Uuid::new_v4();
        backend.put(id, b"blob").expect("put");
        fs::write(dir.path().join("README.txt"), b"hi").unwrap();
        fs::write(dir.path().join(".tmpXYZ"), b"partial").unwrap();

        assert_eq!(backend.list().expect("list"), BTreeSet::from([id]));
    }
}
