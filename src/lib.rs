//! Core library for the `sortie` one-shot instance runner.
//!
//! A run boots a Scaleway instance, optionally opens an SSH session on it,
//! and cleans up according to policy (create → await boot → session →
//! cleanup). The pieces are exposed separately so callers can drive the
//! lifecycle with their own provisioner, session runner, or key provisioner.

pub mod backend;
pub mod config;
pub mod error;
pub mod interrupt;
pub mod keys;
pub mod paths;
pub mod request;
pub mod run;
pub mod scaleway;
pub mod session;
pub mod user_data;
pub mod volume;

pub use backend::{
    BootOutputSink, InstanceHandle, InstanceSpec, InstanceState, InstanceStatus, Provisioner,
};
pub use config::{ConfigError, ScalewayConfig};
pub use error::{ErrorKind, RunError};
pub use interrupt::{Interrupt, InterruptTrigger};
pub use keys::{EphemeralKey, KeyError, KeyProvisioner, SshKeygen};
pub use request::{RunFlags, RunRequest, SessionMode, Validated, ValidationError, validate};
pub use run::{RunOrchestrator, RunReport, RunState};
pub use scaleway::{ScalewayBackend, ScalewayBackendError};
pub use session::{
    SessionConfig, SessionError, SessionExit, SessionRequest, SessionRunner, SshSessionRunner,
};
