//! Session runner backed by the OpenSSH client.

use std::ffi::OsString;
use std::process::{ExitStatus, Stdio};
use std::time::Duration;

use camino::Utf8Path;
use shell_escape::unix::escape;
use tokio::net::TcpStream;
use tokio::process::Command;
use tokio::time::{Instant, sleep, timeout};
use tracing::{debug, info};

use super::{
    Direct, Hop, Relayed, SessionConfig, SessionError, SessionExit, SessionFuture,
    SessionRequest, SessionRunner, Transport,
};
use crate::paths::expand_tilde;

const DEFAULT_PROBE_INTERVAL: Duration = Duration::from_secs(1);
const PROBE_CONNECT_TIMEOUT: Duration = Duration::from_secs(3);

/// Exit status the OpenSSH client reserves for its own failures.
const SSH_CLIENT_FAILURE: i32 = 255;

/// Runs sessions by spawning `ssh` with the local terminal attached.
#[derive(Clone, Debug)]
pub struct SshSessionRunner {
    config: SessionConfig,
    probe_interval: Duration,
}

impl SshSessionRunner {
    /// Creates a runner using the given client settings.
    #[must_use]
    pub const fn new(config: SessionConfig) -> Self {
        Self {
            config,
            probe_interval: DEFAULT_PROBE_INTERVAL,
        }
    }

    /// Overrides the delay between first-hop reachability probes.
    #[must_use]
    pub const fn with_probe_interval(mut self, interval: Duration) -> Self {
        self.probe_interval = interval;
        self
    }

    /// Client settings in use.
    #[must_use]
    pub const fn config(&self) -> &SessionConfig {
        &self.config
    }

    fn transport_for(&self, request: &SessionRequest) -> Box<dyn Transport> {
        match request.gateway {
            Some(ref gateway) => {
                let user = gateway
                    .user
                    .clone()
                    .or_else(|| self.config.gateway_user.clone())
                    .unwrap_or_else(|| request.target.user.clone());
                Box::new(Relayed::new(gateway.host.clone(), user))
            }
            None => Box::new(Direct),
        }
    }

    fn common_ssh_options(&self, identity_override: Option<&Utf8Path>) -> Vec<OsString> {
        let mut args = Vec::new();

        let identity = identity_override
            .map(|path| path.as_str().to_owned())
            .or_else(|| self.config.identity_file.as_deref().map(expand_tilde));
        if let Some(identity) = identity {
            args.push(OsString::from("-i"));
            args.push(OsString::from(identity));
        }
        if identity_override.is_some() {
            args.push(OsString::from("-o"));
            args.push(OsString::from("IdentitiesOnly=yes"));
        }

        if self.config.batch_mode {
            args.push(OsString::from("-o"));
            args.push(OsString::from("BatchMode=yes"));
        }

        if !self.config.strict_host_key_checking {
            args.push(OsString::from("-o"));
            args.push(OsString::from("StrictHostKeyChecking=no"));
        }

        if !self.config.known_hosts_file.trim().is_empty() {
            args.push(OsString::from("-o"));
            args.push(OsString::from(format!(
                "UserKnownHostsFile={}",
                self.config.known_hosts_file
            )));
        }

        args
    }

    fn render_client(&self, identity_override: Option<&Utf8Path>) -> String {
        let mut rendered = escape(self.config.ssh_bin.as_str().into()).into_owned();
        for arg in self.common_ssh_options(identity_override) {
            let text = arg.to_string_lossy().into_owned();
            rendered.push(' ');
            rendered.push_str(&escape(text.into()));
        }
        rendered
    }

    pub(super) fn build_ssh_args(
        &self,
        request: &SessionRequest,
        transport: &dyn Transport,
    ) -> Vec<OsString> {
        let identity = request.identity_file.as_deref();
        let mut args = vec![
            OsString::from(if request.tty { "-t" } else { "-T" }),
            OsString::from("-p"),
            OsString::from(request.target.port.to_string()),
        ];
        args.extend(self.common_ssh_options(identity));
        // The gateway never authorises a per-run key; only the target does.
        args.extend(transport.route_options(&self.render_client(None)));
        args.push(OsString::from(format!(
            "{}@{}",
            request.target.user, request.target.host
        )));
        if !request.command.is_empty() {
            args.push(OsString::from(render_remote_command(&request.command)));
        }
        args
    }

    pub(super) async fn wait_for_first_hop(&self, hop: &Hop) -> Result<(), SessionError> {
        let deadline = Instant::now() + self.config.connect_wait();
        loop {
            let connect = timeout(
                PROBE_CONNECT_TIMEOUT,
                TcpStream::connect((hop.host.as_str(), hop.port)),
            )
            .await;
            let reason = match connect {
                Ok(Ok(_)) => return Ok(()),
                Ok(Err(err)) => err.to_string(),
                Err(_) => String::from("connection attempt timed out"),
            };
            debug!(host = %hop.host, port = hop.port, %reason, "first hop not reachable yet");
            if Instant::now() + self.probe_interval > deadline {
                return Err(SessionError::ConnectionFailed {
                    host: hop.host.clone(),
                    message: format!(
                        "port {} not reachable within {}s: {reason}",
                        hop.port, self.config.connect_wait_secs
                    ),
                });
            }
            sleep(self.probe_interval).await;
        }
    }

    async fn run(&self, request: &SessionRequest) -> Result<SessionExit, SessionError> {
        let transport = self.transport_for(request);
        let hop = transport.first_hop(&request.target);
        self.wait_for_first_hop(&hop).await?;

        let args = self.build_ssh_args(request, transport.as_ref());
        info!(
            target = %request.target.host,
            via = ?request.gateway.as_ref().map(|gateway| gateway.host.as_str()),
            tty = request.tty,
            "opening session"
        );
        let mut child = Command::new(&self.config.ssh_bin)
            .args(&args)
            .stdin(Stdio::inherit())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit())
            .kill_on_drop(true)
            .spawn()
            .map_err(|err| SessionError::Spawn {
                program: self.config.ssh_bin.clone(),
                message: err.to_string(),
            })?;
        let status = child.wait().await.map_err(|err| SessionError::Spawn {
            program: self.config.ssh_bin.clone(),
            message: err.to_string(),
        })?;

        classify_exit(status, &hop)
    }
}

impl SessionRunner for SshSessionRunner {
    fn open<'a>(&'a self, request: &'a SessionRequest) -> SessionFuture<'a> {
        Box::pin(self.run(request))
    }
}

/// Joins `command` into one shell-escaped remote command line.
pub(super) fn render_remote_command(command: &[String]) -> String {
    command
        .iter()
        .map(|arg| escape(arg.as_str().into()).into_owned())
        .collect::<Vec<_>>()
        .join(" ")
}

pub(super) fn classify_exit(status: ExitStatus, hop: &Hop) -> Result<SessionExit, SessionError> {
    match status.code() {
        Some(SSH_CLIENT_FAILURE) => Err(SessionError::ConnectionFailed {
            host: hop.host.clone(),
            message: String::from("ssh exited with status 255"),
        }),
        Some(code) => Ok(SessionExit { code }),
        None => Err(SessionError::Interrupted),
    }
}
