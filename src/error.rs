//! Error taxonomy shared by the run lifecycle and its callers.
//!
//! Every failure that reaches the caller is folded into a [`RunError`], which
//! pairs a machine-readable [`ErrorKind`] with a human-readable message. The
//! kind decides the reserved process exit code so scripts can tell "my
//! command failed" apart from "the run never reached my command".

use std::fmt;

use thiserror::Error;

/// Exit code used for usage errors (missing arguments, conflicting flags).
pub const EXIT_USAGE: i32 = 2;
/// Exit code used when the boot console could not be reported.
pub const EXIT_BOOT_OUTPUT_FAILED: i32 = 123;
/// Exit code used when the run exceeds its timeout budget.
pub const EXIT_TIMEOUT: i32 = 124;
/// Exit code used when the instance could not be provisioned.
pub const EXIT_PROVISIONING_FAILED: i32 = 125;
/// Exit code used when a session was interrupted locally.
pub const EXIT_INTERRUPTED: i32 = 130;
/// Exit code used when the target or gateway could not be reached. Matches
/// the status `ssh` reports for its own connection failures.
pub const EXIT_CONNECTION_FAILED: i32 = 255;

/// Classification of every failure the run lifecycle can surface.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum ErrorKind {
    /// No image was given.
    MissingArgument,
    /// Two or more options cannot be combined.
    ConflictingOptions,
    /// An option value could not be interpreted.
    InvalidValue,
    /// The provider refused or failed to create the instance.
    ProvisioningFailed,
    /// The run did not complete within its timeout budget.
    Timeout,
    /// The target instance or gateway could not be reached.
    ConnectionFailed,
    /// The remote command ran and returned a non-zero status.
    RemoteCommandFailed,
    /// The run was cancelled locally, for example by Ctrl-C.
    SessionInterrupted,
    /// Streaming the boot console failed.
    BootOutputFailed,
    /// Deleting the instance after the run failed.
    CleanupFailed,
}

impl ErrorKind {
    /// Returns the reserved exit code for orchestration-level failures.
    ///
    /// [`ErrorKind::RemoteCommandFailed`] and [`ErrorKind::CleanupFailed`]
    /// return `None`: the former reports the remote command's own status and
    /// the latter never overrides the exit code of the run.
    #[must_use]
    pub const fn exit_code(self) -> Option<i32> {
        match self {
            Self::MissingArgument | Self::ConflictingOptions | Self::InvalidValue => {
                Some(EXIT_USAGE)
            }
            Self::ProvisioningFailed => Some(EXIT_PROVISIONING_FAILED),
            Self::Timeout => Some(EXIT_TIMEOUT),
            Self::ConnectionFailed => Some(EXIT_CONNECTION_FAILED),
            Self::SessionInterrupted => Some(EXIT_INTERRUPTED),
            Self::BootOutputFailed => Some(EXIT_BOOT_OUTPUT_FAILED),
            Self::RemoteCommandFailed | Self::CleanupFailed => None,
        }
    }

    /// Returns `true` for kinds raised before any remote side effect.
    #[must_use]
    pub const fn is_validation(self) -> bool {
        matches!(
            self,
            Self::MissingArgument | Self::ConflictingOptions | Self::InvalidValue
        )
    }

    const fn label(self) -> &'static str {
        match self {
            Self::MissingArgument => "missing argument",
            Self::ConflictingOptions => "conflicting options",
            Self::InvalidValue => "invalid value",
            Self::ProvisioningFailed => "provisioning failed",
            Self::Timeout => "timeout",
            Self::ConnectionFailed => "connection failed",
            Self::RemoteCommandFailed => "remote command failed",
            Self::SessionInterrupted => "session interrupted",
            Self::BootOutputFailed => "boot output failed",
            Self::CleanupFailed => "cleanup failed",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Structured error returned to the caller of the run lifecycle.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
#[error("{kind}: {message}")]
pub struct RunError {
    /// Classification of the failure.
    pub kind: ErrorKind,
    /// Human-readable description including provider or transport context.
    pub message: String,
}

impl RunError {
    /// Builds a new error of the given kind.
    #[must_use]
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    /// Returns the exit code a process should report for this error alone.
    ///
    /// Kinds without a reserved code map to `1`.
    #[must_use]
    pub fn exit_code(&self) -> i32 {
        self.kind.exit_code().unwrap_or(1)
    }
}
