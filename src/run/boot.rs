//! Waiting for an instance to boot, optionally echoing its console.

use std::io::Write;

use tokio::sync::mpsc;
use tokio::time::sleep;
use tracing::{debug, warn};

use super::RunOrchestrator;
use crate::backend::{InstanceHandle, InstanceStatus, Provisioner};
use crate::error::{ErrorKind, RunError};

impl<P, S, K> RunOrchestrator<P, S, K>
where
    P: Provisioner,
{
    /// Polls until the instance reports a ready state.
    ///
    /// Read failures are retried with exponential backoff capped at
    /// `max_backoff`; the caller bounds the wait.
    pub(super) async fn await_boot(&self, handle: &InstanceHandle) -> InstanceStatus {
        let mut backoff = self.poll_interval;
        loop {
            let pause = match self.provisioner.poll(handle).await {
                Ok(status) if status.state.is_ready() => return status,
                Ok(status) => {
                    debug!(instance_id = %handle.id, state = %status.state, "instance not ready");
                    backoff = self.poll_interval;
                    self.poll_interval
                }
                Err(err) => {
                    warn!(
                        instance_id = %handle.id,
                        error = %err,
                        retry_in = ?backoff,
                        "failed to read instance state"
                    );
                    let current = backoff;
                    backoff = backoff.saturating_mul(2).min(self.max_backoff);
                    current
                }
            };
            sleep(pause).await;
        }
    }

    /// Copies the boot console into `out` until the console ends or the
    /// instance reports ready, whichever comes first.
    ///
    /// A console that cannot be read or written fails the wait.
    pub(super) async fn watch_boot<W: Write>(
        &self,
        handle: &InstanceHandle,
        out: &mut W,
    ) -> Result<(), RunError> {
        let (sink, mut console) = mpsc::unbounded_channel();
        let stream = self.provisioner.stream_boot_output(handle, sink);
        let ready = self.await_boot(handle);
        tokio::pin!(stream);
        tokio::pin!(ready);

        loop {
            tokio::select! {
                biased;
                Some(chunk) = console.recv() => write_console(out, &chunk, handle)?,
                result = &mut stream => {
                    if let Err(err) = result {
                        return Err(RunError::new(
                            ErrorKind::BootOutputFailed,
                            format!("failed to read boot output of {}: {err}", handle.id),
                        ));
                    }
                    debug!(instance_id = %handle.id, "boot output stream ended");
                    return drain_console(&mut console, out, handle);
                }
                status = &mut ready => {
                    debug!(instance_id = %handle.id, state = %status.state, "instance ready");
                    return drain_console(&mut console, out, handle);
                }
            }
        }
    }
}

fn drain_console<W: Write>(
    console: &mut mpsc::UnboundedReceiver<Vec<u8>>,
    out: &mut W,
    handle: &InstanceHandle,
) -> Result<(), RunError> {
    while let Ok(chunk) = console.try_recv() {
        write_console(out, &chunk, handle)?;
    }
    Ok(())
}

fn write_console<W: Write>(
    out: &mut W,
    chunk: &[u8],
    handle: &InstanceHandle,
) -> Result<(), RunError> {
    out.write_all(chunk)
        .and_then(|()| out.flush())
        .map_err(|err| {
            RunError::new(
                ErrorKind::BootOutputFailed,
                format!("failed to write boot output of {}: {err}", handle.id),
            )
        })
}
