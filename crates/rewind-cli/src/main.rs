mod cli;
mod config;
mod configure;
mod snapshot;
mod storage;

use crate::cli::ConfigCommand;
use clap::Parser;
use color_eyre::Result;
use rewind_core::storage::{Backend, ObjectStore};
use rewind_storage::{vault, Ledger};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

fn main() -> Result<()> {
    color_eyre::install()?;
    init_tracing();

    let cli = cli::Cli::parse();
    let config = config::load()?;
    match cli.command {
        cli::Command::Version => print_version(),
        cli::Command::Health => run_health_check(&config)?,
        cli::Command::Config(ConfigCommand::Init) => init_config(&config)?,
        cli::Command::Configure(args) => configure::run(args, &config)?,
        cli::Command::Credentials => configure::show(&config)?,
        cli::Command::Snapshot(cmd) => snapshot::handle(cmd, &config)?,
    }

    Ok(())
}

fn init_tracing() {
    // Respect user-provided filters, default to info to avoid noisy stdout.
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_target(false)
        .with_writer(std::io::stderr);
    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .init();
}

fn print_version() {
    println!("rewind {}", env!("CARGO_PKG_VERSION"));
}

/// Checks the vault round-trip and whether the remote bucket answers.
fn run_health_check(config: &config::Config) -> Result<()> {
    let ledger = storage::open_ledger(config)?;
    run_vault_health(&ledger)?;
    println!("Vault: ok");

    let bucket = ledger.remote().bucket();
    if ledger.remote().exists_target() {
        println!("Remote bucket {bucket}: reachable");
    } else {
        println!("Remote bucket {bucket}: missing or unreachable");
    }
    Ok(())
}

fn run_vault_health<O: ObjectStore>(ledger: &Ledger<O>) -> Result<()> {
    let payload = b"ok";
    let key = ledger.load_key()?;
    let blob = vault::encrypt(payload, &key)?;
    let round_trip = vault::decrypt(&blob, &key)?;
    if round_trip != payload {
        color_eyre::eyre::bail!("vault round-trip failed");
    }
    ledger.load_credentials()?;
    Ok(())
}

fn init_config(config: &config::Config) -> Result<()> {
    let path = config::write_default_if_missing(config)?;
    println!("Config initialized at {}", path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use rewind_core::{model::CredentialRecord, storage::InMemoryObjectStore, StoreError};
    use rewind_storage::StorePaths;

    use super::*;

    fn test_ledger(root: &std::path::Path) -> Ledger<InMemoryObjectStore> {
        storage::ledger_with(
            &StorePaths::new(root),
            InMemoryObjectStore::new(),
            "rewind-versions",
            "us-east-1".into(),
        )
    }

    #[test]
    fn health_check_with_configured_store_succeeds() {
        let dir = tempfile::tempdir().expect("tempdir");
        let ledger = test_ledger(dir.path());
        ledger.ensure_key().expect("key");
        ledger
            .save_credentials(&CredentialRecord::new("AK", "SK", "us-east-1"))
            .expect("save");
        run_vault_health(&ledger).expect("health check should succeed");
    }

    #[test]
    fn health_check_without_key_fails() {
        let dir = tempfile::tempdir().expect("tempdir");
        let err = run_vault_health(&test_ledger(dir.path())).expect_err("no key");
        assert!(matches!(
            err.downcast_ref::<StoreError>(),
            Some(StoreError::KeyNotFound { .. })
        ));
    }

    #[test]
    fn health_check_detects_corrupt_credentials() {
        let dir = tempfile::tempdir().expect("tempdir");
        let ledger = test_ledger(dir.path());
        ledger.ensure_key().expect("key");
        std::fs::write(dir.path().join("credentials.enc"), b"garbage").expect("write");
        assert!(run_vault_health(&ledger).is_err());
    }
}
