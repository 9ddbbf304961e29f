//! Session configuration structures and validation.
//!
//! [`SessionConfig`] holds the local SSH client settings. Configuration is
//! loaded via `ortho-config`, merging defaults, configuration files, and
//! environment variables.

use std::time::Duration;

use ortho_config::OrthoConfig;
use serde::Deserialize;
use thiserror::Error;

/// SSH client settings loaded via `ortho-config`.
#[derive(Clone, Debug, Deserialize, OrthoConfig, PartialEq, Eq)]
#[ortho_config(
    prefix = "SORTIE_SSH",
    discovery(
        app_name = "sortie",
        env_var = "SORTIE_CONFIG_PATH",
        config_file_name = "sortie.toml",
        dotfile_name = ".sortie.toml",
        project_file_name = "sortie.toml"
    )
)]
pub struct SessionConfig {
    /// Path to the `ssh` executable.
    #[ortho_config(default = "ssh".to_owned())]
    pub ssh_bin: String,
    /// Path to the `ssh-keygen` executable used for temporary keys.
    #[ortho_config(default = "ssh-keygen".to_owned())]
    pub ssh_keygen_bin: String,
    /// Whether to force batch mode so SSH never prompts for passwords.
    #[ortho_config(default = false)]
    pub batch_mode: bool,
    /// Whether to enforce host key checking; disabled by default because
    /// every instance is new.
    #[ortho_config(default = false)]
    pub strict_host_key_checking: bool,
    /// Known hosts file override; defaults to `/dev/null` for throwaway hosts.
    #[ortho_config(default = "/dev/null".to_owned())]
    pub known_hosts_file: String,
    /// Private key used when no temporary key is requested. Supports tilde
    /// expansion; when unset SSH falls back to its default key locations.
    pub identity_file: Option<String>,
    /// User for the gateway hop; defaults to the session user.
    pub gateway_user: Option<String>,
    /// Seconds to wait for the first hop to accept TCP connections.
    #[ortho_config(default = 60)]
    pub connect_wait_secs: u64,
}

/// Errors raised when loading the session configuration.
#[derive(Debug, Error, Eq, PartialEq)]
pub enum SessionConfigLoadError {
    /// Indicates that parsing or merging configuration layers failed.
    #[error("session configuration parsing failed: {0}")]
    Parse(String),
}

/// Errors raised when the session configuration is unusable.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum SessionConfigError {
    /// A required value is empty.
    #[error("missing {field}: set SORTIE_SSH_{env_suffix} or add {field} to [ssh] in sortie.toml", env_suffix = field.to_uppercase())]
    InvalidConfig {
        /// Configuration field that failed validation.
        field: String,
    },
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            ssh_bin: String::from("ssh"),
            ssh_keygen_bin: String::from("ssh-keygen"),
            batch_mode: false,
            strict_host_key_checking: false,
            known_hosts_file: String::from("/dev/null"),
            identity_file: None,
            gateway_user: None,
            connect_wait_secs: 60,
        }
    }
}

impl SessionConfig {
    /// Loads configuration using defaults, configuration files, and
    /// environment variables without parsing CLI arguments.
    ///
    /// # Errors
    ///
    /// Returns [`SessionConfigLoadError::Parse`] when merging sources fails.
    pub fn load_without_cli_args() -> Result<Self, SessionConfigLoadError> {
        Self::load_from_iter([std::ffi::OsString::from("sortie")])
            .map_err(|err| SessionConfigLoadError::Parse(err.to_string()))
    }

    /// Ensures required values are present after trimming whitespace.
    ///
    /// # Errors
    ///
    /// Returns [`SessionConfigError::InvalidConfig`] when a value is empty.
    pub fn validate(&self) -> Result<(), SessionConfigError> {
        Self::require_value(Some(&self.ssh_bin), "ssh_bin")?;
        Self::require_value(Some(&self.ssh_keygen_bin), "ssh_keygen_bin")?;
        Self::require_value(self.identity_file.as_deref(), "identity_file")?;
        Self::require_value(self.gateway_user.as_deref(), "gateway_user")?;
        Ok(())
    }

    /// Returns how long to wait for the first hop to accept connections.
    #[must_use]
    pub const fn connect_wait(&self) -> Duration {
        Duration::from_secs(self.connect_wait_secs)
    }

    fn require_value(value: Option<&str>, field: &str) -> Result<(), SessionConfigError> {
        match value {
            None => Ok(()),
            Some(v) if !v.trim().is_empty() => Ok(()),
            Some(_) => Err(SessionConfigError::InvalidConfig {
                field: field.to_owned(),
            }),
        }
    }
}
