//! Instance lifecycle helpers for the Scaleway backend.

use std::net::IpAddr;
use std::sync::LazyLock;
use std::time::Duration;

use reqwest::{RequestBuilder, StatusCode};
use scaleway_rs::ScalewayApiError;
use serde::Deserialize;
use serde::de::DeserializeOwned;

mod create;
mod image;
mod ip;
mod wait;

use super::ScalewayBackendError;
use crate::backend::{InstanceState, InstanceStatus};
use crate::scaleway::types::{Action, ServerId};

const HTTP_TIMEOUT: Duration = Duration::from_secs(30);
pub(crate) const SCALEWAY_INSTANCE_API_BASE: &str = "https://api.scaleway.com/instance/v1";

static HTTP_CLIENT: LazyLock<reqwest::Client> = LazyLock::new(|| {
    reqwest::Client::builder()
        .timeout(HTTP_TIMEOUT)
        .build()
        .unwrap_or_else(|_| reqwest::Client::new())
});

/// Point-in-time view of a server as returned by `GET /servers/{id}`.
#[derive(Clone, Debug, Eq, PartialEq)]
pub(crate) struct ServerSnapshot {
    pub(crate) id: ServerId,
    pub(crate) state: InstanceState,
    pub(crate) state_detail: String,
    pub(crate) allowed_actions: Vec<Action>,
    pub(crate) public_ip: Option<IpAddr>,
    pub(crate) private_ip: Option<IpAddr>,
}

impl ServerSnapshot {
    pub(crate) fn allows(&self, action: &str) -> bool {
        self.allowed_actions
            .iter()
            .any(|allowed| allowed.as_str() == action)
    }

    pub(crate) fn status(&self) -> InstanceStatus {
        InstanceStatus {
            state: self.state.clone(),
            public_ip: self.public_ip,
            private_ip: self.private_ip,
        }
    }

    /// One line describing the boot progress, as shown by `--show-boot`.
    pub(crate) fn boot_line(&self) -> String {
        if self.state_detail.trim().is_empty() {
            format!("{}\n", self.state)
        } else {
            format!("{}: {}\n", self.state, self.state_detail.trim())
        }
    }
}

#[derive(Deserialize)]
pub(crate) struct ServerEnvelope {
    server: ServerPayload,
}

#[derive(Deserialize)]
struct ServerPayload {
    id: String,
    state: String,
    #[serde(default)]
    state_detail: String,
    #[serde(default)]
    allowed_actions: Vec<String>,
    #[serde(default)]
    public_ip: Option<AddressPayload>,
    #[serde(default)]
    private_ip: Option<String>,
}

#[derive(Deserialize)]
struct AddressPayload {
    address: String,
}

impl From<ServerEnvelope> for ServerSnapshot {
    fn from(value: ServerEnvelope) -> Self {
        let server = value.server;
        Self {
            id: server.id.into(),
            state: InstanceState::from(server.state.as_str()),
            state_detail: server.state_detail,
            allowed_actions: server
                .allowed_actions
                .into_iter()
                .map(Action::from)
                .collect(),
            public_ip: server
                .public_ip
                .and_then(|ip| ip.address.parse().ok()),
            private_ip: server.private_ip.and_then(|ip| ip.parse().ok()),
        }
    }
}

/// Sends `request` with authentication and returns the status and body.
pub(crate) async fn send(
    request: RequestBuilder,
    secret_key: &str,
) -> Result<(StatusCode, Vec<u8>), ScalewayBackendError> {
    let response = request.header("X-Auth-Token", secret_key).send().await?;
    let status = response.status();
    let body = response.bytes().await?;
    Ok((status, body.to_vec()))
}

/// Decodes a successful response body or maps an error status.
pub(crate) fn decode<T: DeserializeOwned>(
    status: StatusCode,
    body: &[u8],
) -> Result<T, ScalewayBackendError> {
    if !status.is_success() {
        return Err(api_error(status, body));
    }
    serde_json::from_slice(body).map_err(|err| ScalewayBackendError::Provider {
        message: err.to_string(),
    })
}

/// Maps an error response to [`ScalewayBackendError::Api`], preferring the
/// message field of a JSON error body.
pub(crate) fn api_error(status: StatusCode, body: &[u8]) -> ScalewayBackendError {
    let message = serde_json::from_slice::<ScalewayApiError>(body).map_or_else(
        |_| String::from_utf8_lossy(body).into_owned(),
        |parsed| parsed.message,
    );
    ScalewayBackendError::Api {
        status: status.as_u16(),
        message,
    }
}

pub(crate) fn server_url(zone: &str, server_id: &str) -> String {
    format!("{SCALEWAY_INSTANCE_API_BASE}/zones/{zone}/servers/{server_id}")
}

pub(crate) fn client() -> &'static reqwest::Client {
    &HTTP_CLIENT
}

#[cfg(test)]
mod tests;
