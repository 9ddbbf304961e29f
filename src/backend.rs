//! Provisioner abstraction for the instances a run boots.
//!
//! The run lifecycle only needs four things from a provider: create an
//! instance, read its state, stream its boot console, and delete it. The
//! [`Provisioner`] trait captures exactly those so the orchestrator can be
//! driven by scripted doubles in tests and by [`crate::ScalewayBackend`] in
//! production.

use std::collections::BTreeSet;
use std::fmt;
use std::future::Future;
use std::net::IpAddr;
use std::pin::Pin;

use tokio::sync::mpsc;

use crate::request::{BootType, IpPolicy, RunRequest};
use crate::user_data::UserDataEntry;
use crate::volume::VolumeSize;

/// Tag prefix that makes an instance authorise a public key at boot.
pub const AUTHORIZED_KEY_TAG_PREFIX: &str = "AUTHORIZED_KEY=";

/// Create-relevant subset of a [`RunRequest`].
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct InstanceSpec {
    /// Image label or identifier.
    pub image: String,
    /// Instance name; generated by the provisioner when unset.
    pub name: Option<String>,
    /// Bootscript identifier.
    pub bootscript: Option<String>,
    /// Commercial type (instance size).
    pub commercial_type: String,
    /// Boot policy.
    pub boot_type: BootType,
    /// Instance tags.
    pub tags: BTreeSet<String>,
    /// Additional volumes.
    pub volumes: Vec<VolumeSize>,
    /// User-data entries.
    pub user_data: Vec<UserDataEntry>,
    /// Public address policy.
    pub ip_policy: IpPolicy,
    /// Enable IPv6.
    pub ipv6: bool,
}

impl InstanceSpec {
    /// Extracts the create-relevant fields of `request`.
    #[must_use]
    pub fn from_request(request: &RunRequest) -> Self {
        Self {
            image: request.image.clone(),
            name: request.name.clone(),
            bootscript: request.bootscript.clone(),
            commercial_type: request.commercial_type.clone(),
            boot_type: request.boot_type,
            tags: request.tags.clone(),
            volumes: request.volumes.clone(),
            user_data: request.user_data.clone(),
            ip_policy: request.ip_policy.clone(),
            ipv6: request.ipv6,
        }
    }

    /// Adds the tag that authorises `public_key` on the instance.
    ///
    /// Tags cannot contain spaces, so spaces in the OpenSSH key line are
    /// replaced with underscores; the instance reverses this at boot.
    #[must_use]
    pub fn with_authorized_key(mut self, public_key: &str) -> Self {
        let encoded = public_key.trim().replace(' ', "_");
        self.tags.insert(format!("{AUTHORIZED_KEY_TAG_PREFIX}{encoded}"));
        self
    }
}

/// Handle returned by a provisioner once an instance has been created.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct InstanceHandle {
    /// Provider specific identifier for the instance.
    pub id: String,
    /// Zone in which the instance was created.
    pub zone: String,
}

/// Lifecycle state reported by the provider.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum InstanceState {
    /// Created but not powered on.
    Stopped,
    /// Powering on and booting.
    Starting,
    /// Powered on.
    Running,
    /// Booted and ready for sessions.
    Booted,
    /// Powering off.
    Stopping,
    /// Any other provider state, kept verbatim.
    Other(String),
}

impl InstanceState {
    /// Returns `true` once the instance can accept a session.
    #[must_use]
    pub const fn is_ready(&self) -> bool {
        matches!(self, Self::Running | Self::Booted)
    }

    /// Returns `true` while the instance is still coming up.
    #[must_use]
    pub const fn is_booting(&self) -> bool {
        matches!(self, Self::Stopped | Self::Starting)
    }
}

impl From<&str> for InstanceState {
    fn from(value: &str) -> Self {
        match value {
            "stopped" | "stopped in place" => Self::Stopped,
            "starting" => Self::Starting,
            "running" => Self::Running,
            "booted" => Self::Booted,
            "stopping" => Self::Stopping,
            other => Self::Other(other.to_owned()),
        }
    }
}

impl fmt::Display for InstanceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Stopped => f.write_str("stopped"),
            Self::Starting => f.write_str("starting"),
            Self::Running => f.write_str("running"),
            Self::Booted => f.write_str("booted"),
            Self::Stopping => f.write_str("stopping"),
            Self::Other(state) => f.write_str(state),
        }
    }
}

/// Live view of an instance returned by [`Provisioner::poll`].
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct InstanceStatus {
    /// Current lifecycle state.
    pub state: InstanceState,
    /// Public address, when one is attached.
    pub public_ip: Option<IpAddr>,
    /// Private address inside the provider network.
    pub private_ip: Option<IpAddr>,
}

impl InstanceStatus {
    /// Status with the given state and no addresses yet.
    #[must_use]
    pub const fn new(state: InstanceState) -> Self {
        Self {
            state,
            public_ip: None,
            private_ip: None,
        }
    }
}

/// Channel the boot console is written into, one chunk of bytes at a time.
pub type BootOutputSink = mpsc::UnboundedSender<Vec<u8>>;

/// Future returned by provisioner operations.
pub type BackendFuture<'a, T, E> = Pin<Box<dyn Future<Output = Result<T, E>> + Send + 'a>>;

/// Interface implemented by instance providers.
pub trait Provisioner {
    /// Provider specific error type returned by the provisioner.
    type Error: std::error::Error + Send + Sync + 'static;

    /// Creates and powers on a new instance.
    ///
    /// Creation is not assumed idempotent and is never retried by callers.
    fn create<'a>(
        &'a self,
        spec: &'a InstanceSpec,
    ) -> BackendFuture<'a, InstanceHandle, Self::Error>;

    /// Reads the current state of the instance.
    fn poll<'a>(
        &'a self,
        handle: &'a InstanceHandle,
    ) -> BackendFuture<'a, InstanceStatus, Self::Error>;

    /// Streams boot console output into `sink` until the instance leaves its
    /// boot state. The returned future completes when the stream ends; it
    /// fails when the console cannot be read.
    fn stream_boot_output<'a>(
        &'a self,
        handle: &'a InstanceHandle,
        sink: BootOutputSink,
    ) -> BackendFuture<'a, (), Self::Error>;

    /// Deletes the instance and waits until the provider no longer lists it.
    fn delete(&self, handle: InstanceHandle) -> BackendFuture<'_, (), Self::Error>;
}
