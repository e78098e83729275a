use std::io::{self, BufRead, Write};

use color_eyre::Result;
use rewind_core::model::CredentialRecord;
use tracing::warn;

use crate::{cli::ConfigureArgs, config::Config, storage};

const DEFAULT_REGION: &str = "us-east-1";

/// Ensure the installation key exists, then store credentials, prompting on
/// stdin for anything not given as a flag.
pub fn run(args: ConfigureArgs, config: &Config) -> Result<()> {
    let ledger = storage::open_ledger(config)?;
    ledger.ensure_key()?;
    let existing = ledger.load_credentials().unwrap_or_else(|err| {
        warn!(error = %err, "existing credentials unreadable; they will be replaced");
        None
    });

    let stdin = io::stdin();
    let mut input = stdin.lock();
    let mut out = io::stderr();
    let record = collect(args, existing.as_ref(), &mut input, &mut out)?;
    ledger.save_credentials(&record)?;
    println!(
        "Credentials saved for {} in {}",
        record.access_key_id, record.region
    );
    Ok(())
}

/// Show what is stored, secret masked.
pub fn show(config: &Config) -> Result<()> {
    let ledger = storage::open_ledger(config)?;
    match ledger.load_credentials()? {
        Some(record) => {
            println!("access_key_id: {}", record.access_key_id);
            println!("secret_key:    {}", record.masked_secret());
            println!("region:        {}", record.region);
        }
        None => println!("No credentials stored. Run `rewind configure`."),
    }
    Ok(())
}

fn collect<R: BufRead, W: Write>(
    args: ConfigureArgs,
    existing: Option<&CredentialRecord>,
    input: &mut R,
    out: &mut W,
) -> Result<CredentialRecord> {
    let access_key_id = match args.access_key_id {
        Some(value) => value,
        None => {
            let current = existing.map(|c| c.access_key_id.as_str());
            ask(input, out, "Access key id", current, current)?
        }
    };
    let secret_key = match args.secret_key {
        Some(value) => value,
        None => {
            let masked = existing.map(CredentialRecord::masked_secret);
            ask(
                input,
                out,
                "Secret access key",
                existing.map(|c| c.secret_key.as_str()),
                masked.as_deref(),
            )?
        }
    };
    let region = match args.region {
        Some(value) => value,
        None => {
            let current = existing
                .map(|c| c.region.as_str())
                .unwrap_or(DEFAULT_REGION);
            ask(input, out, "Region", Some(current), Some(current))?
        }
    };

    if access_key_id.is_empty() || secret_key.is_empty() {
        color_eyre::eyre::bail!("access key id and secret key are both required");
    }
    Ok(CredentialRecord::new(access_key_id, secret_key, region))
}

/// One prompt line. Blank input takes the default; `shown` is what the
/// operator sees in brackets.
fn ask<R: BufRead, W: Write>(
    input: &mut R,
    out: &mut W,
    label: &str,
    default: Option<&str>,
    shown: Option<&str>,
) -> Result<String> {
    match shown {
        Some(shown) => write!(out, "{label} [{shown}]: ")?,
        None => write!(out, "{label}: ")?,
    }
    out.flush()?;

    let mut line = String::new();
    input.read_line(&mut line)?;
    let answer = line.trim();
    if answer.is_empty() {
        return Ok(default.unwrap_or_default().to_string());
    }
    Ok(answer.to_string())
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::*;

    #[test]
    fn prompts_only_for_missing_fields() {
        let args = ConfigureArgs {
            access_key_id: Some("AK".into()),
            secret_key: None,
            region: None,
        };
        let mut input = Cursor::new("SK\n\n");
        let mut out = Vec::new();
        let record = collect(args, None, &mut input, &mut out).expect("collect");

        assert_eq!(record, CredentialRecord::new("AK", "SK", "us-east-1"));
        let prompts = String::from_utf8(out).expect("utf8");
        assert!(!prompts.contains("Access key id"));
        assert!(prompts.contains("Secret access key: "));
        assert!(prompts.contains("Region [us-east-1]: "));
    }

    #[test]
    fn blank_answers_keep_existing_values() {
        let existing = CredentialRecord::new("AKOLD", "very-secret-1234", "eu-west-1");
        let mut input = Cursor::new("\n\n\n");
        let mut out = Vec::new();
        let record = collect(
            ConfigureArgs::default(),
            Some(&existing),
            &mut input,
            &mut out,
        )
        .expect("collect");

        assert_eq!(record, existing);
        let prompts = String::from_utf8(out).expect("utf8");
        assert!(prompts.contains("1234"));
        assert!(!prompts.contains("very-secret"));
    }

    #[test]
    fn missing_secret_is_rejected() {
        let args = ConfigureArgs {
            access_key_id: Some("AK".into()),
            secret_key: None,
            region: Some("us-east-1".into()),
        };
        let mut input = Cursor::new("");
        let mut out = Vec::new();
        assert!(collect(args, None, &mut input, &mut out).is_err());
    }
}
