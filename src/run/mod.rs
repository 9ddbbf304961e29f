//! Lifecycle orchestration for a single run.
//!
//! [`RunOrchestrator::execute`] drives one validated [`RunRequest`] through
//! provisioning, boot, the session, and cleanup. Every path that created
//! something passes through cleanup, so `--rm` and temporary keys are honoured
//! on failure, timeout, and interrupt alike. The outcome is reported as a
//! [`RunReport`] carrying the exit code the process should use.

mod boot;

use std::fmt;
use std::future::Future;
use std::io::Write;
use std::time::Duration;

use tokio::time::{Instant, sleep_until, timeout};
use tracing::{debug, info, warn};

use crate::backend::{InstanceHandle, InstanceSpec, Provisioner};
use crate::error::{ErrorKind, RunError};
use crate::interrupt::Interrupt;
use crate::keys::{EphemeralKey, KeyProvisioner};
use crate::request::{RunRequest, SessionMode};
use crate::session::{
    Gateway, SessionExit, SessionRequest, SessionRunner, SessionTarget, target_address,
};

const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(2);
const DEFAULT_MAX_BACKOFF: Duration = Duration::from_secs(30);
/// Longest wait for an in-flight create to settle after the run was stopped.
const CREATE_SETTLE_LIMIT: Duration = Duration::from_secs(600);

/// States of the run lifecycle, in the order a successful run visits them.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum RunState {
    /// The request is being checked.
    Validating,
    /// The instance is being created.
    Provisioning,
    /// Waiting for the instance to report that it is up.
    AwaitingBoot,
    /// A session is open on the instance.
    SessionActive,
    /// Removing the instance and key material.
    Cleanup,
    /// The run finished; the exit code reflects the session outcome.
    Done,
    /// The run stopped on an orchestration failure.
    Aborted,
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Validating => "validating",
            Self::Provisioning => "provisioning",
            Self::AwaitingBoot => "awaiting-boot",
            Self::SessionActive => "session-active",
            Self::Cleanup => "cleanup",
            Self::Done => "done",
            Self::Aborted => "aborted",
        };
        f.write_str(label)
    }
}

/// Result of [`RunOrchestrator::execute`].
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct RunReport {
    /// Exit code the process should report.
    pub exit_code: i32,
    /// Failure that decided the exit code, if any.
    pub error: Option<RunError>,
    /// Failure raised while cleaning up; reported but never changes the exit
    /// code.
    pub cleanup_error: Option<RunError>,
    /// Identifier of the instance, once one was created.
    pub instance_id: Option<String>,
    /// Every state visited, in order.
    pub states: Vec<RunState>,
}

impl RunReport {
    /// Terminal state of the run.
    #[must_use]
    pub fn final_state(&self) -> Option<RunState> {
        self.states.last().copied()
    }

    /// Returns `true` when the state was visited.
    #[must_use]
    pub fn visited(&self, state: RunState) -> bool {
        self.states.contains(&state)
    }
}

/// What the run reached before cleanup.
#[derive(Debug)]
enum Outcome {
    Exited(SessionExit),
    Detached,
    BootShown,
}

/// Resolution of an operation raced against the deadline and the interrupt.
enum Guarded<T> {
    Done(T),
    TimedOut,
    Interrupted,
}

async fn guarded<F: Future>(
    deadline: Option<Instant>,
    interrupt: &mut Interrupt,
    operation: F,
) -> Guarded<F::Output> {
    let expiry = async move {
        match deadline {
            Some(at) => sleep_until(at).await,
            None => std::future::pending().await,
        }
    };
    tokio::select! {
        biased;
        () = interrupt.fired() => Guarded::Interrupted,
        () = expiry => Guarded::TimedOut,
        output = operation => Guarded::Done(output),
    }
}

/// Mutable bookkeeping for one run.
#[derive(Debug, Default)]
struct Progress {
    states: Vec<RunState>,
    handle: Option<InstanceHandle>,
    key: Option<EphemeralKey>,
}

impl Progress {
    fn enter(&mut self, state: RunState) {
        debug!(%state, "run state");
        self.states.push(state);
    }
}

/// Executes runs using the provided provisioner, session runner, and key
/// provisioner.
#[derive(Debug)]
pub struct RunOrchestrator<P, S, K> {
    provisioner: P,
    sessions: S,
    keys: K,
    interrupt: Interrupt,
    poll_interval: Duration,
    max_backoff: Duration,
}

impl<P, S, K> RunOrchestrator<P, S, K>
where
    P: Provisioner,
    S: SessionRunner,
    K: KeyProvisioner,
{
    /// Creates a new orchestrator that is never interrupted.
    #[must_use]
    pub const fn new(provisioner: P, sessions: S, keys: K) -> Self {
        Self {
            provisioner,
            sessions,
            keys,
            interrupt: Interrupt::never(),
            poll_interval: DEFAULT_POLL_INTERVAL,
            max_backoff: DEFAULT_MAX_BACKOFF,
        }
    }

    /// Cancels the run when `interrupt` fires; cleanup still runs.
    #[must_use]
    pub fn with_interrupt(self, interrupt: Interrupt) -> Self {
        Self { interrupt, ..self }
    }

    /// Overrides the interval between instance state polls.
    ///
    /// This is primarily used by tests to keep polling scenarios fast.
    #[must_use]
    pub const fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Overrides the longest delay between polls after read failures.
    #[must_use]
    pub const fn with_max_backoff(mut self, max_backoff: Duration) -> Self {
        self.max_backoff = max_backoff;
        self
    }

    /// Returns the provisioner.
    #[must_use]
    pub const fn provisioner(&self) -> &P {
        &self.provisioner
    }

    /// Runs `request` to completion.
    ///
    /// Instance identifiers (`--detach`) and boot output (`--show-boot`) are
    /// written to `out`; the session itself uses the process terminal. The
    /// report's exit code is the remote command's status when a session ran,
    /// zero for detached and boot-only runs, and the reserved code of the
    /// failure otherwise. Cleanup failures are reported alongside but never
    /// change the exit code.
    pub async fn execute<W: Write>(&self, request: &RunRequest, out: &mut W) -> RunReport {
        let mut progress = Progress::default();
        let mut interrupt = self.interrupt.clone();
        let deadline = request.timeout().map(|budget| Instant::now() + budget);

        let outcome = self
            .drive(request, &mut progress, &mut interrupt, deadline, out)
            .await;
        self.finish(request, progress, &mut interrupt, outcome).await
    }

    async fn drive<W: Write>(
        &self,
        request: &RunRequest,
        progress: &mut Progress,
        interrupt: &mut Interrupt,
        deadline: Option<Instant>,
        out: &mut W,
    ) -> Result<Outcome, RunError> {
        progress.enter(RunState::Validating);
        progress.enter(RunState::Provisioning);

        let mut spec = InstanceSpec::from_request(request);
        if request.tmp_ssh_key {
            let key = self.keys.generate_ephemeral().map_err(|err| {
                RunError::new(
                    ErrorKind::ProvisioningFailed,
                    format!("failed to generate temporary SSH key: {err}"),
                )
            })?;
            spec = spec.with_authorized_key(&key.public_key);
            progress.key = Some(key);
        }

        let handle = self
            .create(&spec, progress, interrupt, deadline, request)
            .await?;

        progress.enter(RunState::AwaitingBoot);
        if request.session_mode == SessionMode::ShowBoot {
            return match guarded(deadline, interrupt, self.watch_boot(&handle, out)).await {
                Guarded::Done(result) => result.map(|()| Outcome::BootShown),
                Guarded::TimedOut => Err(timeout_error(request, Some(&handle))),
                Guarded::Interrupted => Err(interrupted_error("waiting for boot")),
            };
        }
        let status = match guarded(deadline, interrupt, self.await_boot(&handle)).await {
            Guarded::Done(status) => status,
            Guarded::TimedOut => return Err(timeout_error(request, Some(&handle))),
            Guarded::Interrupted => return Err(interrupted_error("waiting for boot")),
        };
        info!(instance_id = %handle.id, state = %status.state, "instance ready");

        if request.session_mode == SessionMode::Detach {
            if let Err(err) = writeln!(out, "{}", handle.id) {
                warn!(instance_id = %handle.id, error = %err, "failed to print instance id");
            }
            return Ok(Outcome::Detached);
        }

        progress.enter(RunState::SessionActive);
        let gateway = request.gateway.as_deref().map(Gateway::parse);
        let host = target_address(&status, gateway.is_some()).ok_or_else(|| {
            RunError::new(
                ErrorKind::ConnectionFailed,
                format!("instance {} has no reachable address", handle.id),
            )
        })?;
        let session = SessionRequest {
            target: SessionTarget {
                host,
                port: request.ssh_port,
                user: request.ssh_user.clone(),
            },
            gateway,
            tty: request.wants_tty(),
            command: request.command.clone(),
            identity_file: progress.key.as_ref().map(|key| key.identity_file.clone()),
        };

        match guarded(deadline, interrupt, self.sessions.open(&session)).await {
            Guarded::Done(Ok(exit)) => Ok(Outcome::Exited(exit)),
            Guarded::Done(Err(err)) => Err(RunError::new(err.kind(), err.to_string())),
            Guarded::TimedOut => Err(timeout_error(request, Some(&handle))),
            Guarded::Interrupted => Err(interrupted_error("session")),
        }
    }

    /// Creates the instance and records its handle in `progress`.
    ///
    /// A create that is still in flight when the deadline passes or the run is
    /// interrupted is awaited (up to [`CREATE_SETTLE_LIMIT`], or until a second
    /// interrupt) so the instance it produces still reaches cleanup.
    async fn create(
        &self,
        spec: &InstanceSpec,
        progress: &mut Progress,
        interrupt: &mut Interrupt,
        deadline: Option<Instant>,
        request: &RunRequest,
    ) -> Result<InstanceHandle, RunError> {
        info!(
            image = %spec.image,
            commercial_type = %spec.commercial_type,
            "creating instance"
        );
        let mut creation = self.provisioner.create(spec);
        let stopped = match guarded(deadline, interrupt, &mut creation).await {
            Guarded::Done(Ok(handle)) => {
                info!(instance_id = %handle.id, zone = %handle.zone, "instance created");
                progress.handle = Some(handle.clone());
                return Ok(handle);
            }
            Guarded::Done(Err(err)) => {
                return Err(RunError::new(
                    ErrorKind::ProvisioningFailed,
                    format!("failed to create instance: {err}"),
                ));
            }
            Guarded::TimedOut => timeout_error(request, None),
            Guarded::Interrupted => interrupted_error("instance creation"),
        };

        info!("run stopped during instance creation; waiting for it to settle");
        let settled = tokio::select! {
            biased;
            () = interrupt.forced() => None,
            result = timeout(CREATE_SETTLE_LIMIT, creation) => result.ok(),
        };
        match settled {
            Some(Ok(handle)) => {
                info!(instance_id = %handle.id, "instance created after the run stopped");
                progress.handle = Some(handle);
            }
            Some(Err(err)) => {
                debug!(error = %err, "instance creation failed after the run stopped");
            }
            None => warn!("gave up waiting for instance creation; an instance may remain"),
        }
        Err(stopped)
    }

    async fn finish(
        &self,
        request: &RunRequest,
        mut progress: Progress,
        interrupt: &mut Interrupt,
        outcome: Result<Outcome, RunError>,
    ) -> RunReport {
        let detached = matches!(outcome, Ok(Outcome::Detached));
        let mut cleanup_error = None;

        if !detached && (progress.handle.is_some() || progress.key.is_some()) {
            progress.enter(RunState::Cleanup);
        }

        match progress.handle {
            Some(ref handle) if !detached && request.auto_remove => {
                cleanup_error = self.remove(handle.clone(), interrupt).await.err();
            }
            Some(ref handle) if !detached => {
                info!(instance_id = %handle.id, "leaving instance running");
            }
            _ => {}
        }

        if let Some(key) = progress.key.take()
            && let Err(err) = self.keys.discard(key)
        {
            warn!(error = %err, "failed to discard temporary SSH key");
            cleanup_error.get_or_insert_with(|| {
                RunError::new(
                    ErrorKind::CleanupFailed,
                    format!("failed to discard temporary SSH key: {err}"),
                )
            });
        }

        let (exit_code, error) = match outcome {
            Ok(Outcome::Exited(exit)) if exit.success() => (0, None),
            Ok(Outcome::Exited(exit)) => (
                exit.code,
                Some(RunError::new(
                    ErrorKind::RemoteCommandFailed,
                    format!("remote command exited with status {}", exit.code),
                )),
            ),
            Ok(Outcome::Detached | Outcome::BootShown) => (0, None),
            Err(err) => (err.exit_code(), Some(err)),
        };

        let aborted = error
            .as_ref()
            .is_some_and(|err| err.kind != ErrorKind::RemoteCommandFailed);
        progress.enter(if aborted {
            RunState::Aborted
        } else {
            RunState::Done
        });

        RunReport {
            exit_code,
            error,
            cleanup_error,
            instance_id: progress.handle.map(|handle| handle.id),
            states: progress.states,
        }
    }

    /// Deletes the instance unless a second interrupt abandons the wait.
    async fn remove(
        &self,
        handle: InstanceHandle,
        interrupt: &mut Interrupt,
    ) -> Result<(), RunError> {
        let instance_id = handle.id.clone();
        info!(%instance_id, "removing instance");
        tokio::select! {
            biased;
            result = self.provisioner.delete(handle) => match result {
                Ok(()) => {
                    info!(%instance_id, "instance removed");
                    Ok(())
                }
                Err(err) => {
                    warn!(%instance_id, error = %err, "failed to remove instance");
                    Err(RunError::new(
                        ErrorKind::CleanupFailed,
                        format!("failed to remove instance {instance_id}: {err}"),
                    ))
                }
            },
            () = interrupt.forced() => {
                warn!(%instance_id, "instance removal abandoned");
                Err(RunError::new(
                    ErrorKind::CleanupFailed,
                    format!(
                        "removal of instance {instance_id} abandoned after a second interrupt; \
                         it may remain"
                    ),
                ))
            }
        }
    }
}

fn timeout_error(request: &RunRequest, handle: Option<&InstanceHandle>) -> RunError {
    let subject = handle.map_or_else(
        || String::from("instance creation"),
        |created| format!("instance {}", created.id),
    );
    RunError::new(
        ErrorKind::Timeout,
        format!(
            "{subject} did not complete within {}s",
            request.timeout_seconds
        ),
    )
}

fn interrupted_error(during: &str) -> RunError {
    RunError::new(
        ErrorKind::SessionInterrupted,
        format!("interrupted during {during}"),
    )
}
