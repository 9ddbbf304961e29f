//! Polling, boot console, and teardown helpers for the Scaleway backend.

use std::future::Future;
use std::time::Duration;

use reqwest::StatusCode;
use tokio::time::{Instant, sleep};
use tracing::{debug, info};

use crate::backend::{BootOutputSink, InstanceHandle};
use crate::scaleway::types::Action;

use super::super::{ScalewayBackend, ScalewayBackendError};
use super::{ServerEnvelope, ServerSnapshot, client, decode, send, server_url};

/// Returns the console line for `server` when it differs from `previous`.
pub(in crate::scaleway) fn next_boot_line(
    previous: Option<&str>,
    server: &ServerSnapshot,
) -> Option<String> {
    let line = server.boot_line();
    if previous == Some(line.as_str()) {
        None
    } else {
        Some(line)
    }
}

impl ScalewayBackend {
    /// Reads the server, returning `None` once the API no longer lists it.
    pub(in crate::scaleway) async fn fetch_server(
        &self,
        handle: &InstanceHandle,
    ) -> Result<Option<ServerSnapshot>, ScalewayBackendError> {
        let url = server_url(&handle.zone, &handle.id);
        let (status, body) = send(client().get(&url), &self.config.secret_key).await?;
        if status == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        decode::<ServerEnvelope>(status, &body).map(|envelope| Some(ServerSnapshot::from(envelope)))
    }

    /// Writes each boot state transition into `sink` until the server leaves
    /// its boot states.
    pub(in crate::scaleway) async fn stream_boot(
        &self,
        handle: &InstanceHandle,
        sink: BootOutputSink,
    ) -> Result<(), ScalewayBackendError> {
        let mut previous: Option<String> = None;
        loop {
            let server = self
                .fetch_server(handle)
                .await?
                .ok_or_else(|| ScalewayBackendError::InstanceGone {
                    instance_id: handle.id.clone(),
                })?;

            if let Some(line) = next_boot_line(previous.as_deref(), &server) {
                if sink.send(line.clone().into_bytes()).is_err() {
                    debug!(instance_id = %handle.id, "boot output receiver closed");
                    return Ok(());
                }
                previous = Some(line);
            }

            if !server.state.is_booting() {
                return Ok(());
            }
            sleep(self.poll_interval).await;
        }
    }

    /// Deletes the server and waits until the API no longer lists it.
    ///
    /// `terminate` is used when the server allows it, which also releases its
    /// volumes and dynamic address; stopped servers are deleted directly.
    pub(in crate::scaleway) async fn remove_server(
        &self,
        handle: &InstanceHandle,
    ) -> Result<(), ScalewayBackendError> {
        let Some(server) = self.fetch_server(handle).await? else {
            return Ok(());
        };

        if server.allows(Action::TERMINATE) {
            info!(instance_id = %handle.id, "terminating server");
            self.api
                .perform_instance_action_async(&handle.zone, &handle.id, Action::TERMINATE)
                .await?;
        } else {
            info!(instance_id = %handle.id, "deleting server");
            self.api
                .delete_instance_async(&handle.zone, &handle.id)
                .await?;
        }
        self.wait_until_gone(handle).await
    }

    pub(in crate::scaleway) async fn wait_until_gone(
        &self,
        handle: &InstanceHandle,
    ) -> Result<(), ScalewayBackendError> {
        let gone = poll_until_gone(self.wait_timeout, self.poll_interval, || async move {
            Ok(self.fetch_server(handle).await?.is_some())
        })
        .await?;
        if gone {
            return Ok(());
        }

        Err(ScalewayBackendError::ResidualResource {
            instance_id: handle.id.clone(),
        })
    }
}

/// Calls `present` every `interval` until it reports `false` or `limit`
/// elapses on the runtime clock. Returns whether the resource went away.
pub(in crate::scaleway) async fn poll_until_gone<F, Fut>(
    limit: Duration,
    interval: Duration,
    mut present: F,
) -> Result<bool, ScalewayBackendError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<bool, ScalewayBackendError>>,
{
    let deadline = Instant::now() + limit;
    while Instant::now() <= deadline {
        if !present().await? {
            return Ok(true);
        }
        sleep(interval).await;
    }
    Ok(false)
}
