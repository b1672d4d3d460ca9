//! Recipient and view variable input files.

use domain_bulk_mail::{InMemoryDirectory, Recipient, RecipientRef};
use eyre::{Result, WrapErr, eyre};
use serde::Deserialize;
use serde_json::{Map, Value};
use std::path::Path;

/// Contents of a `--recipients` file.
///
/// Either a bare list of references, or an object that also carries the
/// directory entries the identifiers resolve against and the acting user.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RecipientsFile {
    List(Vec<RecipientRef>),
    Document {
        recipients: Vec<RecipientRef>,
        #[serde(default)]
        directory: Vec<Recipient>,
        #[serde(default)]
        actor: Option<Recipient>,
    },
}

/// Parsed recipient input.
#[derive(Debug)]
pub struct RecipientInput {
    pub recipients: Vec<RecipientRef>,
    pub directory: InMemoryDirectory,
    pub actor: Option<Recipient>,
}

pub fn parse_recipients(raw: &str) -> Result<RecipientInput> {
    let file: RecipientsFile =
        serde_json::from_str(raw).wrap_err("Recipients must be a JSON list or document")?;

    Ok(match file {
        RecipientsFile::List(recipients) => RecipientInput {
            recipients,
            directory: InMemoryDirectory::default(),
            actor: None,
        },
        RecipientsFile::Document {
            recipients,
            directory,
            actor,
        } => RecipientInput {
            recipients,
            directory: InMemoryDirectory::new(directory),
            actor,
        },
    })
}

pub fn load_recipients(path: &Path) -> Result<RecipientInput> {
    let raw = std::fs::read_to_string(path)
        .wrap_err_with(|| format!("Failed to read {}", path.display()))?;
    parse_recipients(&raw)
}

/// Parse `--vars`, which must be a JSON object.
pub fn parse_vars(raw: Option<&str>) -> Result<Map<String, Value>> {
    let Some(raw) = raw else {
        return Ok(Map::new());
    };

    match serde_json::from_str(raw).wrap_err("--vars is not valid JSON")? {
        Value::Object(vars) => Ok(vars),
        other => Err(eyre!("--vars must be a JSON object, got {}", other)),
    }
}
