//! Throwaway SSH key pairs for `--tmp-ssh-key` runs.
//!
//! An ephemeral key is generated before the instance is created so its public
//! half can be authorised through an instance tag, used as the session
//! identity, and discarded during cleanup whatever the outcome of the run.

use std::process::Command;

use camino::{Utf8Path, Utf8PathBuf};
use tempfile::TempDir;
use thiserror::Error;

use crate::paths::read_to_string_ambient;

const KEY_FILE_NAME: &str = "id_ed25519";
const KEY_COMMENT: &str = "sortie-ephemeral";

/// Session-scoped key pair.
#[derive(Debug)]
pub struct EphemeralKey {
    /// Public key in OpenSSH `authorized_keys` format.
    pub public_key: String,
    /// Path to the private key, used as the session identity.
    pub identity_file: Utf8PathBuf,
    workdir: Option<TempDir>,
}

impl EphemeralKey {
    /// Wraps key material that lives outside a managed temporary directory.
    #[must_use]
    pub fn new(public_key: impl Into<String>, identity_file: impl Into<Utf8PathBuf>) -> Self {
        Self {
            public_key: public_key.into(),
            identity_file: identity_file.into(),
            workdir: None,
        }
    }
}

/// Errors raised while generating or discarding key material.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum KeyError {
    /// The temporary directory could not be created.
    #[error("failed to create key directory: {0}")]
    Workdir(String),
    /// The generator could not be started.
    #[error("failed to spawn {program}: {message}")]
    Spawn {
        /// Program that failed to start.
        program: String,
        /// Operating system error string.
        message: String,
    },
    /// The generator exited unsuccessfully.
    #[error("{program} exited with status {status}: {stderr}")]
    Generate {
        /// Program that failed.
        program: String,
        /// Exit status text.
        status: String,
        /// Captured stderr.
        stderr: String,
    },
    /// The generated public key could not be read.
    #[error("failed to read public key: {0}")]
    ReadPublicKey(String),
    /// Key material could not be removed.
    #[error("failed to discard key material: {0}")]
    Discard(String),
}

/// Generates and discards session-scoped key pairs.
pub trait KeyProvisioner {
    /// Generates a fresh key pair.
    ///
    /// # Errors
    ///
    /// Returns [`KeyError`] when the key pair cannot be produced.
    fn generate_ephemeral(&self) -> Result<EphemeralKey, KeyError>;

    /// Destroys both halves of `key`.
    ///
    /// # Errors
    ///
    /// Returns [`KeyError::Discard`] when the material cannot be removed.
    fn discard(&self, key: EphemeralKey) -> Result<(), KeyError>;
}

/// Key provisioner backed by the OpenSSH `ssh-keygen` tool.
#[derive(Clone, Debug)]
pub struct SshKeygen {
    program: String,
}

impl SshKeygen {
    /// Uses `program` (usually `ssh-keygen`) to generate keys.
    #[must_use]
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }

    fn keygen_args(path: &Utf8Path) -> [&str; 9] {
        [
            "-q",
            "-t",
            "ed25519",
            "-N",
            "",
            "-C",
            KEY_COMMENT,
            "-f",
            path.as_str(),
        ]
    }
}

impl Default for SshKeygen {
    fn default() -> Self {
        Self::new("ssh-keygen")
    }
}

impl KeyProvisioner for SshKeygen {
    fn generate_ephemeral(&self) -> Result<EphemeralKey, KeyError> {
        let workdir = tempfile::Builder::new()
            .prefix("sortie-key-")
            .tempdir()
            .map_err(|err| KeyError::Workdir(err.to_string()))?;
        let dir = Utf8Path::from_path(workdir.path())
            .ok_or_else(|| KeyError::Workdir(workdir.path().display().to_string()))?;
        let identity_file = dir.join(KEY_FILE_NAME);

        let output = Command::new(&self.program)
            .args(Self::keygen_args(&identity_file))
            .output()
            .map_err(|err| KeyError::Spawn {
                program: self.program.clone(),
                message: err.to_string(),
            })?;
        if !output.status.success() {
            return Err(KeyError::Generate {
                program: self.program.clone(),
                status: output
                    .status
                    .code()
                    .map_or_else(|| String::from("unknown"), |code| code.to_string()),
                stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            });
        }

        let public_key = read_to_string_ambient(&identity_file.with_extension("pub"))
            .map_err(KeyError::ReadPublicKey)?;

        Ok(EphemeralKey {
            public_key: public_key.trim().to_owned(),
            identity_file,
            workdir: Some(workdir),
        })
    }

    fn discard(&self, key: EphemeralKey) -> Result<(), KeyError> {
        match key.workdir {
            Some(dir) => dir
                .close()
                .map_err(|err| KeyError::Discard(err.to_string())),
            None => Ok(()),
        }
    }
}
