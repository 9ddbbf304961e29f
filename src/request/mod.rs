//! Run request construction and validation.
//!
//! The front end collects raw option values into [`RunFlags`]; [`validate`]
//! turns them into an immutable [`RunRequest`] or explains every rule the
//! flags break. Validation is pure: it performs no I/O, so calling it twice on
//! the same flags yields the same result.

use std::collections::BTreeSet;
use std::fmt;
use std::net::IpAddr;
use std::time::Duration;

use thiserror::Error;
use uuid::Uuid;

use crate::error::{ErrorKind, RunError};
use crate::user_data::{self, UserDataEntry};
use crate::volume::VolumeSize;

/// Commercial type used when none is requested.
pub const DEFAULT_COMMERCIAL_TYPE: &str = "DEV1-S";
/// Boot type used when none is requested.
pub const DEFAULT_BOOT_TYPE: &str = "auto";
/// SSH user used when none is requested.
pub const DEFAULT_SSH_USER: &str = "root";
/// SSH port used when none is requested.
pub const DEFAULT_SSH_PORT: u32 = 22;

/// Raw option values and positional arguments as collected by the front end.
#[derive(Clone, Debug, Eq, PartialEq)]
#[expect(
    clippy::struct_excessive_bools,
    reason = "mirrors the boolean command-line switches one to one"
)]
pub struct RunFlags {
    /// `-h, --help`.
    pub help: bool,
    /// Positional arguments: `IMAGE [COMMAND] [ARG...]`.
    pub args: Vec<String>,
    /// `--name`.
    pub name: Option<String>,
    /// `--bootscript`.
    pub bootscript: Option<String>,
    /// `-e, --env`: space-delimited tags.
    pub env: Option<String>,
    /// `-v, --volume`: space-delimited volume sizes.
    pub volume: Option<String>,
    /// `-T, --timeout` in seconds; zero disables the timeout.
    pub timeout: i64,
    /// `--ip-address`: `none`, `dynamic`, or a reserved address.
    pub ip_address: Option<String>,
    /// `-a, --attach`.
    pub attach: bool,
    /// `-d, --detach`.
    pub detach: bool,
    /// `-g, --gateway`.
    pub gateway: Option<String>,
    /// `-u, --userdata`.
    pub userdata: Option<String>,
    /// `--commercial-type`.
    pub commercial_type: String,
    /// `--boot-type`.
    pub boot_type: String,
    /// `--user`.
    pub ssh_user: String,
    /// `--rm`.
    pub auto_remove: bool,
    /// `--ipv6`.
    pub ipv6: bool,
    /// `--tmp-ssh-key`.
    pub tmp_ssh_key: bool,
    /// `--show-boot`.
    pub show_boot: bool,
    /// `-p, --port`.
    pub ssh_port: u32,
    /// `--no-tty`.
    pub no_tty: bool,
}

impl Default for RunFlags {
    fn default() -> Self {
        Self {
            help: false,
            args: Vec::new(),
            name: None,
            bootscript: None,
            env: None,
            volume: None,
            timeout: 0,
            ip_address: None,
            attach: false,
            detach: false,
            gateway: None,
            userdata: None,
            commercial_type: DEFAULT_COMMERCIAL_TYPE.to_owned(),
            boot_type: DEFAULT_BOOT_TYPE.to_owned(),
            ssh_user: DEFAULT_SSH_USER.to_owned(),
            auto_remove: false,
            ipv6: false,
            tmp_ssh_key: false,
            show_boot: false,
            ssh_port: DEFAULT_SSH_PORT,
            no_tty: false,
        }
    }
}

/// How the run interacts with the instance once it is up.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum SessionMode {
    /// Open an interactive session (a shell when no command is given).
    Attach,
    /// Print the instance identifier and leave it running.
    Detach,
    /// Stream the boot console, then stop without a session.
    ShowBoot,
    /// Run the command to completion and exit with its status.
    Default,
}

/// How the instance obtains its public address.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum IpPolicy {
    /// No public address; reachable through a gateway only.
    None,
    /// A dynamic public address allocated for the lifetime of the instance.
    Dynamic,
    /// A previously reserved address, given as an address or its identifier.
    Reserved(String),
}

/// How the instance boots.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum BootType {
    /// Let the provider decide.
    Auto,
    /// Boot the kernel installed on the local volume.
    Local,
    /// Boot through a provider bootscript.
    Bootscript,
}

impl BootType {
    /// Returns the provider spelling of the boot type.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Auto => "auto",
            Self::Local => "local",
            Self::Bootscript => "bootscript",
        }
    }
}

/// Fully validated description of one run.
#[derive(Clone, Debug, Eq, PartialEq)]
#[expect(
    clippy::struct_excessive_bools,
    reason = "independent run policies that are naturally expressed as booleans"
)]
pub struct RunRequest {
    /// Image label or identifier to boot.
    pub image: String,
    /// Remote command and its arguments; empty means the image default.
    pub command: Vec<String>,
    /// Instance name; the provisioner generates one when unset.
    pub name: Option<String>,
    /// Bootscript identifier.
    pub bootscript: Option<String>,
    /// Gateway host through which sessions are relayed.
    pub gateway: Option<String>,
    /// Public address policy.
    pub ip_policy: IpPolicy,
    /// User-data entries uploaded before first boot.
    pub user_data: Vec<UserDataEntry>,
    /// Remote user for the session.
    pub ssh_user: String,
    /// Commercial type (instance size).
    pub commercial_type: String,
    /// Boot policy.
    pub boot_type: BootType,
    /// Instance tags.
    pub tags: BTreeSet<String>,
    /// Additional volumes, in attachment order.
    pub volumes: Vec<VolumeSize>,
    /// Session policy.
    pub session_mode: SessionMode,
    /// Delete the instance once the run concludes.
    pub auto_remove: bool,
    /// Enable IPv6.
    pub ipv6: bool,
    /// Use a throwaway key pair instead of account keys.
    pub tmp_ssh_key: bool,
    /// Disable pseudo-terminal allocation.
    pub no_tty: bool,
    /// Run timeout in seconds; zero means no timeout.
    pub timeout_seconds: u64,
    /// Remote SSH port.
    pub ssh_port: u16,
}

impl RunRequest {
    /// Builds a request for `image` with every option at its default.
    ///
    /// Useful for callers that assemble requests programmatically rather than
    /// from command-line flags.
    #[must_use]
    pub fn new(image: impl Into<String>) -> Self {
        Self {
            image: image.into(),
            command: Vec::new(),
            name: None,
            bootscript: None,
            gateway: None,
            ip_policy: IpPolicy::Dynamic,
            user_data: Vec::new(),
            ssh_user: DEFAULT_SSH_USER.to_owned(),
            commercial_type: DEFAULT_COMMERCIAL_TYPE.to_owned(),
            boot_type: BootType::Auto,
            tags: BTreeSet::new(),
            volumes: Vec::new(),
            session_mode: SessionMode::Default,
            auto_remove: false,
            ipv6: false,
            tmp_ssh_key: false,
            no_tty: false,
            timeout_seconds: 0,
            ssh_port: 22,
        }
    }

    /// Returns the timeout budget, or `None` when the run is unbounded.
    #[must_use]
    pub const fn timeout(&self) -> Option<Duration> {
        if self.timeout_seconds == 0 {
            None
        } else {
            Some(Duration::from_secs(self.timeout_seconds))
        }
    }

    /// Returns `true` when the session should allocate a pseudo-terminal.
    #[must_use]
    pub const fn wants_tty(&self) -> bool {
        !self.no_tty
    }
}

/// Outcome of validation.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Validated {
    /// Help was requested; nothing else was checked.
    Help,
    /// The flags describe a runnable request.
    Run(RunRequest),
}

/// One pair of options that cannot be combined.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Conflict {
    /// `--attach` with a command.
    AttachCommand,
    /// `--attach` with `--detach`.
    AttachDetach,
    /// `--attach` with `--show-boot`.
    AttachShowBoot,
    /// `--show-boot` with a command.
    ShowBootCommand,
    /// `--show-boot` with `--detach`.
    ShowBootDetach,
    /// `--detach` with a command.
    DetachCommand,
    /// `--detach` with `--rm`; a detached exit cannot trigger removal.
    DetachAutoRemove,
}

impl fmt::Display for Conflict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Self::AttachCommand => "-a and COMMAND",
            Self::AttachDetach => "-a and -d",
            Self::AttachShowBoot => "-a and --show-boot",
            Self::ShowBootCommand => "--show-boot and COMMAND",
            Self::ShowBootDetach => "--show-boot and -d",
            Self::DetachCommand => "-d and COMMAND",
            Self::DetachAutoRemove => "--detach and --rm",
        };
        f.write_str(text)
    }
}

/// Errors raised while validating run flags.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum ValidationError {
    /// No image was given.
    #[error("missing argument: IMAGE")]
    MissingArgument,
    /// One or more option pairs conflict, listed in priority order.
    #[error("conflicting options: {}", render_conflicts(.0))]
    ConflictingOptions(Vec<Conflict>),
    /// An option value cannot be interpreted.
    #[error("invalid value for {field}: {message}")]
    InvalidValue {
        /// Option that carried the value.
        field: &'static str,
        /// Why the value was rejected.
        message: String,
    },
}

impl ValidationError {
    /// Returns the taxonomy kind of this error.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::MissingArgument => ErrorKind::MissingArgument,
            Self::ConflictingOptions(_) => ErrorKind::ConflictingOptions,
            Self::InvalidValue { .. } => ErrorKind::InvalidValue,
        }
    }

    fn invalid(field: &'static str, message: impl fmt::Display) -> Self {
        Self::InvalidValue {
            field,
            message: message.to_string(),
        }
    }
}

impl From<ValidationError> for RunError {
    fn from(value: ValidationError) -> Self {
        Self::new(value.kind(), value.to_string())
    }
}

fn render_conflicts(conflicts: &[Conflict]) -> String {
    conflicts
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// Validates raw flags and builds a [`RunRequest`].
///
/// Help short-circuits every other check. Otherwise a missing image is
/// reported first, then every conflicting option pair (in priority order),
/// then the first option value that cannot be interpreted.
///
/// # Errors
///
/// Returns [`ValidationError`] describing the violated rules.
pub fn validate(flags: &RunFlags) -> Result<Validated, ValidationError> {
    if flags.help {
        return Ok(Validated::Help);
    }

    let Some((image, command)) = flags.args.split_first() else {
        return Err(ValidationError::MissingArgument);
    };

    let conflicts = conflicts(flags, !command.is_empty());
    if !conflicts.is_empty() {
        return Err(ValidationError::ConflictingOptions(conflicts));
    }

    build_request(flags, image, command).map(Validated::Run)
}

/// Lists every conflicting option pair present in `flags`, in priority order.
#[must_use]
pub fn conflicts(flags: &RunFlags, has_command: bool) -> Vec<Conflict> {
    let rules = [
        (flags.attach && has_command, Conflict::AttachCommand),
        (flags.attach && flags.detach, Conflict::AttachDetach),
        (flags.attach && flags.show_boot, Conflict::AttachShowBoot),
        (flags.show_boot && has_command, Conflict::ShowBootCommand),
        (flags.show_boot && flags.detach, Conflict::ShowBootDetach),
        (flags.detach && has_command, Conflict::DetachCommand),
        (flags.auto_remove && flags.detach, Conflict::DetachAutoRemove),
    ];
    rules
        .into_iter()
        .filter_map(|(violated, conflict)| violated.then_some(conflict))
        .collect()
}

fn build_request(
    flags: &RunFlags,
    image: &str,
    command: &[String],
) -> Result<RunRequest, ValidationError> {
    if image.trim().is_empty() {
        return Err(ValidationError::invalid("IMAGE", "image must not be empty"));
    }

    let gateway = non_empty(flags.gateway.as_deref());
    let ip_policy = ip_policy(flags.ip_address.as_deref(), gateway.is_some())?;
    let boot_type = boot_type(&flags.boot_type)?;
    let ssh_port = u16::try_from(flags.ssh_port)
        .ok()
        .filter(|port| *port != 0)
        .ok_or_else(|| {
            ValidationError::invalid("--port", format!("{} is not in 1-65535", flags.ssh_port))
        })?;
    let timeout_seconds = u64::try_from(flags.timeout).map_err(|_| {
        ValidationError::invalid("--timeout", format!("{} is negative", flags.timeout))
    })?;
    let volumes = flags
        .volume
        .as_deref()
        .unwrap_or_default()
        .split_whitespace()
        .map(VolumeSize::parse)
        .collect::<Result<Vec<_>, _>>()
        .map_err(|err| ValidationError::invalid("--volume", err))?;
    let user_data = user_data::parse(flags.userdata.as_deref().unwrap_or_default())
        .map_err(|err| ValidationError::invalid("--userdata", err))?;
    let ssh_user = flags.ssh_user.trim();
    if ssh_user.is_empty() {
        return Err(ValidationError::invalid("--user", "user must not be empty"));
    }
    let commercial_type = flags.commercial_type.trim();
    if commercial_type.is_empty() {
        return Err(ValidationError::invalid(
            "--commercial-type",
            "commercial type must not be empty",
        ));
    }

    Ok(RunRequest {
        image: image.trim().to_owned(),
        command: command.to_vec(),
        name: non_empty(flags.name.as_deref()),
        bootscript: non_empty(flags.bootscript.as_deref()),
        gateway,
        ip_policy,
        user_data,
        ssh_user: ssh_user.to_owned(),
        commercial_type: commercial_type.to_owned(),
        boot_type,
        tags: flags
            .env
            .as_deref()
            .unwrap_or_default()
            .split_whitespace()
            .map(str::to_owned)
            .collect(),
        volumes,
        session_mode: session_mode(flags),
        auto_remove: flags.auto_remove,
        ipv6: flags.ipv6,
        tmp_ssh_key: flags.tmp_ssh_key,
        no_tty: flags.no_tty,
        timeout_seconds,
        ssh_port,
    })
}

const fn session_mode(flags: &RunFlags) -> SessionMode {
    if flags.attach {
        SessionMode::Attach
    } else if flags.detach {
        SessionMode::Detach
    } else if flags.show_boot {
        SessionMode::ShowBoot
    } else {
        SessionMode::Default
    }
}

/// Selects the address policy; without an explicit value, instances behind
/// a gateway get no public address.
fn ip_policy(raw: Option<&str>, has_gateway: bool) -> Result<IpPolicy, ValidationError> {
    let Some(value) = non_empty(raw) else {
        return Ok(if has_gateway {
            IpPolicy::None
        } else {
            IpPolicy::Dynamic
        });
    };

    match value.to_ascii_lowercase().as_str() {
        "none" => Ok(IpPolicy::None),
        "dynamic" => Ok(IpPolicy::Dynamic),
        _ if value.parse::<IpAddr>().is_ok() || Uuid::parse_str(&value).is_ok() => {
            Ok(IpPolicy::Reserved(value))
        }
        _ => Err(ValidationError::invalid(
            "--ip-address",
            format!("`{value}` is not 'none', 'dynamic', an IP address, or an IP identifier"),
        )),
    }
}

fn boot_type(raw: &str) -> Result<BootType, ValidationError> {
    match raw.trim() {
        "auto" => Ok(BootType::Auto),
        "local" => Ok(BootType::Local),
        "bootscript" => Ok(BootType::Bootscript),
        other => Err(ValidationError::invalid(
            "--boot-type",
            format!("`{other}` is not one of auto, local, bootscript"),
        )),
    }
}

fn non_empty(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|trimmed| !trimmed.is_empty())
        .map(str::to_owned)
}
