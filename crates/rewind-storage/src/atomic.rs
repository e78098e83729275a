use std::{
    fs,
    io::{self, Write},
    path::Path,
};

use rewind_core::StoreError;
use tempfile::NamedTempFile;

/// Create `dir` (and missing parents) with owner-only permissions.
/// An existing `dir` is tightened to owner-only; its parents are not touched.
pub(crate) fn ensure_private_dir(dir: &Path) -> Result<(), StoreError> {
    if dir.is_dir() {
        return restrict_dir(dir);
    }
    let mut builder = fs::DirBuilder::new();
    builder.recursive(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::DirBuilderExt;
        builder.mode(0o700);
    }
    builder.create(dir).map_err(StoreError::storage)
}

#[cfg(unix)]
fn restrict_dir(dir: &Path) -> Result<(), StoreError> {
    use std::os::unix::fs::PermissionsExt;

    let mode = fs::metadata(dir)
        .map_err(StoreError::storage)?
        .permissions()
        .mode();
    if mode & 0o777 == 0o700 {
        return Ok(());
    }
    fs::set_permissions(dir, fs::Permissions::from_mode(0o700)).map_err(StoreError::storage)
}

#[cfg(not(unix))]
fn restrict_dir(_dir: &Path) -> Result<(), StoreError> {
    Ok(())
}

/// Atomically replace `path` with `bytes` (owner-only file).
pub(crate) fn write_private(path: &Path, bytes: &[u8]) -> Result<(), StoreError> {
    let tmp = stage(path, bytes)?;
    tmp.persist(path)
        .map_err(|e| StoreError::storage(e.error))?;
    Ok(())
}

/// Atomically create `path` with `bytes` unless it already exists.
///
/// Returns `false` when another writer got there first; the existing file is
/// left untouched.
pub(crate) fn write_private_new(path: &Path, bytes: &[u8]) -> Result<bool, StoreError> {
    let tmp = stage(path, bytes)?;
    match tmp.persist_noclobber(path) {
        Ok(_) => Ok(true),
        Err(err) if err.error.kind() == io::ErrorKind::AlreadyExists => Ok(false),
        Err(err) => Err(StoreError::storage(err.error)),
    }
}

fn stage(path: &Path, bytes: &[u8]) -> Result<NamedTempFile, StoreError> {
    let parent = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => {
            ensure_private_dir(parent)?;
            parent
        }
        _ => Path::new("."),
    };

    let mut tmp = NamedTempFile::new_in(parent).map_err(StoreError::storage)?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        tmp.as_file()
            .set_permissions(fs::Permissions::from_mode(0o600))
            .map_err(StoreError::storage)?;
    }
    tmp.write_all(bytes).map_err(StoreError::storage)?;
    tmp.flush().map_err(StoreError::storage)?;
    tmp.as_file().sync_all().map_err(StoreError::storage)?;
    Ok(tmp)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn write_replaces_contents_and_leaves_no_temp_files() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("nested").join("blob.enc");

        write_private(&path, b"first").expect("write");
        write_private(&path, b"second").expect("overwrite");

        assert_eq!(fs::read(&path).expect("read"), b"second");
        let entries: Vec<_> = fs::read_dir(path.parent().unwrap())
            .expect("read_dir")
            .collect();
        assert_eq!(entries.len(), 1, "temp file must be renamed away");
    }

    #[test]
    fn write_new_does_not_clobber() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("master.key");

        assert!(write_private_new(&path, b"one").expect("create"));
        assert!(!write_private_new(&path, b"two").expect("second create"));
        assert_eq!(fs::read(&path).expect("read"), b"one");
    }

    #[cfg(unix)]
    #[test]
    fn files_and_directories_are_owner_only() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().expect("tempdir");
        let root = dir.path().join("state");
        let path = root.join("credentials.enc");
        write_private(&path, b"x").expect("write");

        let file_mode = fs::metadata(&path).unwrap().permissions().mode() & 0o777;
        let dir_mode = fs::metadata(&root).unwrap().permissions().mode() & 0o777;
        assert_eq!(file_mode, 0o600);
        assert_eq!(dir_mode, 0o700);
    }

    #[cfg(unix)]
    #[test]
    fn existing_open_directory_is_tightened() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().expect("tempdir");
        let root = dir.path().join("state");
        fs::create_dir(&root).expect("mkdir");
        fs::set_permissions(&root, fs::Permissions::from_mode(0o755)).expect("chmod");

        write_private(&root.join("master.key"), b"k").expect("write");

        let dir_mode = fs::metadata(&root).unwrap().permissions().mode() & 0o777;
        assert_eq!(dir_mode, 0o700);
    }
}
