//! Interactive and command sessions on a booted instance.
//!
//! The orchestrator hands a [`SessionRequest`] to a [`SessionRunner`] once the
//! instance is ready. The runner owns the client process: it waits for the
//! first hop to accept connections, attaches the local terminal, and reports
//! the remote exit code. How the connection reaches the instance is decided
//! by a [`Transport`], either [`Direct`] or [`Relayed`] through a gateway.

mod config;
mod ssh;
mod transport;

use std::future::Future;
use std::net::IpAddr;
use std::pin::Pin;

use camino::Utf8PathBuf;
use thiserror::Error;

use crate::backend::InstanceStatus;
use crate::error::ErrorKind;

pub use config::{SessionConfig, SessionConfigError, SessionConfigLoadError};
pub use ssh::SshSessionRunner;
pub use transport::{Direct, GATEWAY_SSH_PORT, Gateway, Hop, Relayed, Transport};

/// Address and login of the instance end of a session.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct SessionTarget {
    /// Instance address reachable from the first hop.
    pub host: IpAddr,
    /// SSH port on the instance.
    pub port: u16,
    /// Login user on the instance.
    pub user: String,
}

/// Everything needed to open one session.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct SessionRequest {
    /// Instance end of the session.
    pub target: SessionTarget,
    /// Gateway to relay through, if any.
    pub gateway: Option<Gateway>,
    /// Allocate a pseudo-terminal.
    pub tty: bool,
    /// Remote command; empty opens a login shell.
    pub command: Vec<String>,
    /// Identity overriding the configured one, such as a temporary key.
    pub identity_file: Option<Utf8PathBuf>,
}

/// Outcome of a session that ran to completion.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct SessionExit {
    /// Exit code of the remote command or shell.
    pub code: i32,
}

impl SessionExit {
    /// Returns `true` when the remote side exited with status zero.
    #[must_use]
    pub const fn success(self) -> bool {
        self.code == 0
    }
}

/// Failures that stop a session before the remote side reports an exit code.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum SessionError {
    /// The instance or gateway could not be reached or refused the session.
    #[error("could not connect to {host}: {message}")]
    ConnectionFailed {
        /// Host that failed.
        host: String,
        /// Failure detail.
        message: String,
    },
    /// The client was terminated by a signal.
    #[error("session interrupted")]
    Interrupted,
    /// The client process could not be started.
    #[error("failed to spawn {program}: {message}")]
    Spawn {
        /// Client binary.
        program: String,
        /// Operating system error string.
        message: String,
    },
}

impl SessionError {
    /// Run error category this failure maps to.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::ConnectionFailed { .. } | Self::Spawn { .. } => ErrorKind::ConnectionFailed,
            Self::Interrupted => ErrorKind::SessionInterrupted,
        }
    }
}

/// Future returned by [`SessionRunner::open`].
pub type SessionFuture<'a> = Pin<Box<dyn Future<Output = Result<SessionExit, SessionError>> + Send + 'a>>;

/// Opens sessions on ready instances.
pub trait SessionRunner {
    /// Runs one session to completion.
    ///
    /// Dropping the returned future tears the session down.
    fn open<'a>(&'a self, request: &'a SessionRequest) -> SessionFuture<'a>;
}

/// Picks the instance address a session should target.
///
/// Relayed sessions reach the instance from inside the provider network and
/// prefer the private address; direct sessions need the public one. Either
/// falls back to the other address when the preferred one is missing.
#[must_use]
pub fn target_address(status: &InstanceStatus, relayed: bool) -> Option<IpAddr> {
    if relayed {
        status.private_ip.or(status.public_ip)
    } else {
        status.public_ip.or(status.private_ip)
    }
}
