use std::path::PathBuf;

use color_eyre::Result;
use dirs::data_dir;
use rewind_cloud::{S3ObjectStore, S3Settings};
use rewind_core::{model::CredentialRecord, storage::ObjectStore, StoreError};
use rewind_storage::{
    backend::RemoteBackend, credentials::CredentialStore, key_manager::FileKeyManager, Ledger,
    StorePaths,
};
use tracing::{debug, warn};

use crate::config::Config;

const DEFAULT_REGION: &str = "us-east-1";

/// Resolve the default data directory for Rewind.
pub fn default_data_dir() -> Result<PathBuf> {
    let base = data_dir().ok_or_else(|| color_eyre::eyre::eyre!("no data dir available"))?;
    Ok(base.join("rewind"))
}

pub fn store_paths(config: &Config) -> Result<StorePaths> {
    let root = match &config.data_dir {
        Some(root) => root.clone(),
        None => default_data_dir()?,
    };
    Ok(StorePaths::new(root))
}

/// Build the ledger against the configured S3 bucket, signing with whatever
/// credentials are already stored.
pub fn open_ledger(config: &Config) -> Result<Ledger<S3ObjectStore>> {
    let paths = store_paths(config)?;
    debug!(root = %paths.root().display(), "opening encrypted store");
    let credentials = stored_credentials(&paths);
    let region = resolve_region(config, credentials.as_ref());
    let settings = S3Settings {
        endpoint: config.endpoint().map(str::to_string),
        region: region.clone(),
    };
    let store = S3ObjectStore::new(&settings, credentials)?;
    debug!(endpoint = store.endpoint(), bucket = config.bucket(), "remote snapshot target");
    Ok(ledger_with(&paths, store, config.bucket(), region))
}

pub fn ledger_with<O: ObjectStore>(
    paths: &StorePaths,
    store: O,
    bucket: &str,
    region: String,
) -> Ledger<O> {
    Ledger::open(paths, RemoteBackend::new(store, bucket, region))
}

fn resolve_region(config: &Config, credentials: Option<&CredentialRecord>) -> String {
    config
        .region()
        .or_else(|| credentials.map(|c| c.region.as_str()))
        .filter(|r| !r.is_empty())
        .unwrap_or(DEFAULT_REGION)
        .to_string()
}

/// Credentials for signing remote calls. Any failure leaves the remote
/// unauthenticated, which reads as an unreachable bucket.
fn stored_credentials(paths: &StorePaths) -> Option<CredentialRecord> {
    let keys = FileKeyManager::new(paths.key_file());
    match CredentialStore::new(paths.credentials_file(), keys).load() {
        Ok(record) => record,
        Err(StoreError::KeyNotFound { .. }) => None,
        Err(err) => {
            warn!(error = %err, "stored credentials unreadable; run `rewind configure`");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use rewind_core::storage::InMemoryObjectStore;

    use super::*;
    use crate::config::RemoteConfig;

    #[test]
    fn data_dir_override_wins() {
        let config = Config {
            data_dir: Some(PathBuf::from("/srv/rewind")),
            remote: None,
        };
        let paths = store_paths(&config).expect("paths");
        assert_eq!(paths.root(), PathBuf::from("/srv/rewind"));
    }

    #[test]
    fn region_prefers_config_then_credentials() {
        let creds = CredentialRecord::new("AK", "SK", "ap-south-1");
        let mut config = Config::default();
        assert_eq!(resolve_region(&config, None), "us-east-1");
        assert_eq!(resolve_region(&config, Some(&creds)), "ap-south-1");

        config.remote = Some(RemoteConfig {
            region: Some("eu-west-1".into()),
            ..RemoteConfig::default()
        });
        assert_eq!(resolve_region(&config, Some(&creds)), "eu-west-1");
    }

    #[test]
    fn missing_key_means_no_credentials() {
        let dir = tempfile::tempdir().expect("tempdir");
        assert_eq!(stored_credentials(&StorePaths::new(dir.path())), None);
    }

    #[test]
    fn configured_credentials_are_picked_up() {
        let dir = tempfile::tempdir().expect("tempdir");
        let paths = StorePaths::new(dir.path());
        let ledger = ledger_with(
            &paths,
            InMemoryObjectStore::new(),
            "b",
            "us-east-1".into(),
        );
        ledger.ensure_key().expect("key");
        let record = CredentialRecord::new("AK", "SK", "us-east-1");
        ledger.save_credentials(&record).expect("save");

        assert_eq!(stored_credentials(&paths), Some(record));
    }

    #[test]
    fn opens_without_network_or_credentials() {
        let dir = tempfile::tempdir().expect("tempdir");
        let config = Config {
            data_dir: Some(dir.path().to_path_buf()),
            remote: None,
        };
        let ledger = open_ledger(&config).expect("open");
        assert_eq!(ledger.remote().bucket(), "rewind-versions");
        assert_eq!(ledger.load_credentials().expect("load"), None);
    }
}
