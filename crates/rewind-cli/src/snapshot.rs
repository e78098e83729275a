use std::{
    cell::RefCell,
    fs,
    io::{self, BufRead, Read, Write},
    path::Path,
};

use color_eyre::Result;
use rewind_core::{normalize::RawValue, storage::ObjectStore};
use rewind_storage::{
    version_store::{Fallback, TargetChooser, VersionListing},
    Ledger,
};
use serde_json::Value;
use tracing::warn;

use crate::{
    cli::{FallbackArg, SnapshotCommand},
    config::Config,
    storage,
};

/// Execute a snapshot subcommand against the configured store.
pub fn handle(cmd: SnapshotCommand, config: &Config) -> Result<()> {
    let ledger = storage::open_ledger(config)?;

    match cmd {
        SnapshotCommand::Save {
            comment,
            file,
            fallback,
        } => {
            let resources = parse_resources(&read_document(&file)?)?;
            let saved = match fallback {
                Some(arg) => save(&ledger, &comment, &resources, &fallback_for(arg))?,
                None => {
                    let stdin = io::stdin();
                    let chooser = PromptChooser::new(stdin.lock(), io::stderr());
                    save(&ledger, &comment, &resources, &chooser)?
                }
            };
            println!("Saved snapshot {} ({})", saved.version_id, saved.location);
        }
        SnapshotCommand::Show { id } => {
            let record = ledger.load_version(id)?;
            println!("{}", serde_json::to_string_pretty(&record)?);
        }
        SnapshotCommand::List => {
            let listing = ledger.list_versions()?;
            let lines = render_listing(&listing);
            if lines.is_empty() {
                println!("No snapshots yet. Save one with `rewind snapshot save`.");
            }
            for line in lines {
                println!("{line}");
            }
        }
    }

    Ok(())
}

fn save<O: ObjectStore>(
    ledger: &Ledger<O>,
    comment: &str,
    resources: &[RawValue],
    chooser: &dyn TargetChooser,
) -> Result<rewind_storage::version_store::SavedVersion> {
    Ok(ledger.save_version(comment, resources, chooser)?)
}

fn fallback_for(arg: FallbackArg) -> Fallback {
    match arg {
        FallbackArg::Local => Fallback::Local,
        FallbackArg::Provision => Fallback::ProvisionRemote,
    }
}

fn read_document(path: &Path) -> Result<String> {
    if path == Path::new("-") {
        let mut body = String::new();
        io::stdin().read_to_string(&mut body)?;
        return Ok(body);
    }
    Ok(fs::read_to_string(path)?)
}

/// A JSON array is a list of resources; anything else is a single resource.
fn parse_resources(document: &str) -> Result<Vec<RawValue>> {
    let value: Value = serde_json::from_str(document)?;
    Ok(match value {
        Value::Array(items) => items.into_iter().map(RawValue::from).collect(),
        other => vec![RawValue::from(other)],
    })
}

fn render_listing(listing: &VersionListing) -> Vec<String> {
    let readable = listing.versions.iter().map(|v| {
        format!(
            "{}  {:<6}  {:>3}  {}",
            v.version_id, v.location, v.instance_count, v.comment
        )
    });
    let unreadable = listing.unreadable.iter().map(|u| {
        format!(
            "{}  {:<6}  unreadable: {}",
            u.version_id, u.location, u.error
        )
    });
    readable.chain(unreadable).collect()
}

/// Asks the operator what to do about a missing bucket.
pub struct PromptChooser<R, W> {
    io: RefCell<(R, W)>,
}

impl<R: BufRead, W: Write> PromptChooser<R, W> {
    pub fn new(input: R, output: W) -> Self {
        Self {
            io: RefCell::new((input, output)),
        }
    }

    fn ask(&self, bucket: &str) -> io::Result<Fallback> {
        let mut io = self.io.borrow_mut();
        let (input, output) = &mut *io;
        write!(
            output,
            "Bucket {bucket} does not exist. [p]rovision it, save [l]ocally, or [a]bort? "
        )?;
        output.flush()?;

        let mut line = String::new();
        input.read_line(&mut line)?;
        Ok(match line.trim().to_ascii_lowercase().as_str() {
            "p" | "provision" => Fallback::ProvisionRemote,
            "l" | "local" => Fallback::Local,
            _ => Fallback::Abort,
        })
    }
}

impl<R: BufRead, W: Write> TargetChooser for PromptChooser<R, W> {
    fn choose(&self, bucket: &str) -> Fallback {
        self.ask(bucket).unwrap_or_else(|err| {
            warn!(error = %err, "prompt failed; aborting save");
            Fallback::Abort
        })
    }
}
