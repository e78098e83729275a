use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};
use uuid::Uuid;

/// CLI surface definition.
#[derive(Parser, Debug)]
#[command(
    name = "rewind",
    about = "Encrypted credentials and reversible provisioning snapshots",
    version,
    propagate_version = true
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Print version and exit.
    Version,
    /// Check the vault and the remote version bucket.
    Health,
    /// Manage CLI configuration.
    #[command(subcommand)]
    Config(ConfigCommand),
    /// Store cloud credentials, creating the installation key if needed.
    Configure(ConfigureArgs),
    /// Show the stored credentials with the secret masked.
    Credentials,
    /// Save, inspect, and list provisioning snapshots.
    #[command(subcommand)]
    Snapshot(SnapshotCommand),
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum ConfigCommand {
    /// Create a default config file if one does not exist.
    Init,
}

/// Fields left out are prompted for on stdin.
#[derive(Args, Debug, Clone, Default, PartialEq, Eq)]
pub struct ConfigureArgs {
    #[arg(long)]
    pub access_key_id: Option<String>,
    #[arg(long)]
    pub secret_key: Option<String>,
    #[arg(long)]
    pub region: Option<String>,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum SnapshotCommand {
    /// Record the resources produced by a provisioning action.
    Save {
        /// Operator note stored with the snapshot.
        #[arg(long, short)]
        comment: String,
        /// JSON document with the resources (`-` reads stdin).
        #[arg(long, short)]
        file: PathBuf,
        /// What to do if the remote bucket is missing; prompts when absent.
        /// Required with `--file -`, since stdin then carries the document.
        #[arg(long, value_enum, required_if_eq("file", "-"))]
        fallback: Option<FallbackArg>,
    },
    /// Print one snapshot as JSON.
    Show { id: Uuid },
    /// List every snapshot, local and remote.
    List,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum FallbackArg {
    /// Write to the local versions directory.
    Local,
    /// Create the remote bucket and write there.
    Provision,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn requires_a_subcommand() {
        assert!(Cli::try_parse_from(["rewind"]).is_err());
    }

    #[test]
    fn parses_health_subcommand() {
        let cli = Cli::try_parse_from(["rewind", "health"]).expect("parse should succeed");
        assert_eq!(cli.command, Command::Health);
    }

    #[test]
    fn parses_config_init_subcommand() {
        let cli = Cli::try_parse_from(["rewind", "config", "init"]).expect("parse should succeed");
        assert_eq!(cli.command, Command::Config(ConfigCommand::Init));
    }

    #[test]
    fn parses_partial_configure_flags() {
        let cli = Cli::try_parse_from(["rewind", "configure", "--region", "eu-west-1"])
            .expect("parse should succeed");
        assert_eq!(
            cli.command,
            Command::Configure(ConfigureArgs {
                region: Some("eu-west-1".into()),
                ..ConfigureArgs::default()
            })
        );
    }

    #[test]
    fn parses_snapshot_save() {
        let cli = Cli::try_parse_from([
            "rewind",
            "snapshot",
            "save",
            "--comment",
            "initial provisioning",
            "--file",
            "run.json",
            "--fallback",
            "local",
        ])
        .expect("parse should succeed");
        assert_eq!(
            cli.command,
            Command::Snapshot(SnapshotCommand::Save {
                comment: "initial provisioning".into(),
                file: PathBuf::from("run.json"),
                fallback: Some(FallbackArg::Local),
            })
        );
    }

    #[test]
    fn stdin_document_needs_explicit_fallback() {
        let without = Cli::try_parse_from([
            "rewind", "snapshot", "save", "-c", "from pipe", "-f", "-",
        ]);
        assert!(without.is_err());

        let cli = Cli::try_parse_from([
            "rewind",
            "snapshot",
            "save",
            "-c",
            "from pipe",
            "-f",
            "-",
            "--fallback",
            "provision",
        ])
        .expect("parse should succeed");
        assert_eq!(
            cli.command,
            Command::Snapshot(SnapshotCommand::Save {
                comment: "from pipe".into(),
                file: PathBuf::from("-"),
                fallback: Some(FallbackArg::Provision),
            })
        );
    }

    #[test]
    fn snapshot_show_requires_uuid() {
        assert!(Cli::try_parse_from(["rewind", "snapshot", "show", "not-a-uuid"]).is_err());
        let id = Uuid::new_v4();
        let raw = id.to_string();
        let cli = Cli::try_parse_from(["rewind", "snapshot", "show", raw.as_str()])
            .expect("parse should succeed");
        assert_eq!(cli.command, Command::Snapshot(SnapshotCommand::Show { id }));
    }
}
