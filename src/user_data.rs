//! Instance user-data entries.
//!
//! User-data is given as space-separated `KEY=VALUE` pairs. A value starting
//! with `@` names a local file whose content becomes the value, so
//! `FOO=BAR FILE=@/tmp/file` stores `BAR` under `FOO` and the content of
//! `/tmp/file` under `FILE`. Parsing is pure; files are only read by
//! [`resolve`], which the provisioner calls at create time.

use camino::Utf8PathBuf;
use thiserror::Error;

use crate::paths::{expand_tilde, read_to_string_ambient};

/// Where the value of a user-data entry comes from.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum UserDataValue {
    /// Literal value given on the command line.
    Inline(String),
    /// Local file whose content is uploaded.
    File(Utf8PathBuf),
}

/// One user-data key and its value source.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct UserDataEntry {
    /// Key under which the provider stores the value.
    pub key: String,
    /// Value source.
    pub value: UserDataValue,
}

/// User-data entry with its value loaded.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ResolvedUserData {
    /// Key under which the provider stores the value.
    pub key: String,
    /// Value to upload.
    pub content: String,
}

/// Errors raised while parsing or resolving user-data.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum UserDataError {
    /// An entry is not of the form `KEY=VALUE`.
    #[error("user-data entry `{0}` must be of the form KEY=VALUE")]
    MissingSeparator(String),
    /// An entry has an empty key.
    #[error("user-data entry `{0}` has an empty key")]
    EmptyKey(String),
    /// An `@` value names no file.
    #[error("user-data entry `{0}` names an empty file path")]
    EmptyFilePath(String),
    /// A referenced file could not be read.
    #[error("failed to read user-data file `{path}` for key {key}: {message}")]
    FileRead {
        /// Key whose value was being loaded.
        key: String,
        /// Expanded path that failed to read.
        path: String,
        /// Underlying error message.
        message: String,
    },
}

/// Parses a space-separated list of `KEY=VALUE` entries.
///
/// # Errors
///
/// Returns [`UserDataError`] for the first malformed entry.
pub fn parse(raw: &str) -> Result<Vec<UserDataEntry>, UserDataError> {
    raw.split_whitespace().map(parse_entry).collect()
}

fn parse_entry(entry: &str) -> Result<UserDataEntry, UserDataError> {
    let (key, value) = entry
        .split_once('=')
        .ok_or_else(|| UserDataError::MissingSeparator(entry.to_owned()))?;
    if key.is_empty() {
        return Err(UserDataError::EmptyKey(entry.to_owned()));
    }

    let value = match value.strip_prefix('@') {
        Some("") => return Err(UserDataError::EmptyFilePath(entry.to_owned())),
        Some(path) => UserDataValue::File(Utf8PathBuf::from(expand_tilde(path))),
        None => UserDataValue::Inline(value.to_owned()),
    };

    Ok(UserDataEntry {
        key: key.to_owned(),
        value,
    })
}

/// Loads file-backed values, returning every entry with its content.
///
/// # Errors
///
/// Returns [`UserDataError::FileRead`] when a referenced file cannot be read.
pub fn resolve(entries: &[UserDataEntry]) -> Result<Vec<ResolvedUserData>, UserDataError> {
    entries
        .iter()
        .map(|entry| {
            let content = match &entry.value {
                UserDataValue::Inline(value) => value.clone(),
                UserDataValue::File(path) => {
                    read_to_string_ambient(path).map_err(|message| UserDataError::FileRead {
                        key: entry.key.clone(),
                        path: path.to_string(),
                        message,
                    })?
                }
            };
            Ok(ResolvedUserData {
                key: entry.key.clone(),
                content,
            })
        })
        .collect()
}
