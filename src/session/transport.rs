//! Routes from the local machine to the instance.
//!
//! A [`Transport`] decides which host the client dials first and which extra
//! client options carry the connection on to the instance. Sessions either
//! dial the instance directly or hop through a gateway.

use std::ffi::OsString;
use std::fmt;

use super::SessionTarget;

/// Port the gateway's SSH daemon listens on.
pub const GATEWAY_SSH_PORT: u16 = 22;

/// Host and port the client opens its TCP connection to.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Hop {
    /// Host name or address.
    pub host: String,
    /// TCP port.
    pub port: u16,
}

/// Gateway named by `--gateway`, optionally as `user@host`.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Gateway {
    /// Gateway host name or address.
    pub host: String,
    /// Login for the gateway hop when given inline.
    pub user: Option<String>,
}

impl Gateway {
    /// Splits an optional `user@` prefix from `value`.
    #[must_use]
    pub fn parse(value: &str) -> Self {
        match value.trim().split_once('@') {
            Some((user, host)) if !user.is_empty() => Self {
                host: host.to_owned(),
                user: Some(user.to_owned()),
            },
            Some((_, host)) => Self {
                host: host.to_owned(),
                user: None,
            },
            None => Self {
                host: value.trim().to_owned(),
                user: None,
            },
        }
    }
}

/// Route a session takes to reach its target.
pub trait Transport: fmt::Debug + Send + Sync {
    /// Returns the first host the client connects to.
    fn first_hop(&self, target: &SessionTarget) -> Hop;

    /// Returns client options that route the connection to the target.
    ///
    /// `client` is the rendered client invocation (binary plus common
    /// options) for transports that spawn a nested client.
    fn route_options(&self, client: &str) -> Vec<OsString>;
}

/// Connects straight to the instance address.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct Direct;

impl Transport for Direct {
    fn first_hop(&self, target: &SessionTarget) -> Hop {
        Hop {
            host: target.host.to_string(),
            port: target.port,
        }
    }

    fn route_options(&self, _client: &str) -> Vec<OsString> {
        Vec::new()
    }
}

/// Tunnels through a gateway host with `ssh -W`.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Relayed {
    host: String,
    user: String,
}

impl Relayed {
    /// Relays through `host`, logging in as `user`.
    #[must_use]
    pub fn new(host: impl Into<String>, user: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            user: user.into(),
        }
    }

    /// Gateway host.
    #[must_use]
    pub fn host(&self) -> &str {
        &self.host
    }

    /// Gateway login.
    #[must_use]
    pub fn user(&self) -> &str {
        &self.user
    }
}

impl Transport for Relayed {
    fn first_hop(&self, _target: &SessionTarget) -> Hop {
        Hop {
            host: self.host.clone(),
            port: GATEWAY_SSH_PORT,
        }
    }

    fn route_options(&self, client: &str) -> Vec<OsString> {
        vec![
            OsString::from("-o"),
            OsString::from(format!(
                "ProxyCommand={client} -p {GATEWAY_SSH_PORT} -W %h:%p {}@{}",
                self.user, self.host
            )),
        ]
    }
}
