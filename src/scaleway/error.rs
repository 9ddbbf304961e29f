//! Error types for the Scaleway backend.

use crate::config::ConfigError;
use scaleway_rs::ScalewayError;
use thiserror::Error;

/// Errors raised by the Scaleway backend.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum ScalewayBackendError {
    /// Raised when the high-level configuration is incomplete.
    #[error("configuration error: {0}")]
    Config(String),
    /// Raised when the requested image label cannot be resolved.
    #[error("image '{label}' (arch {arch}) not found in zone {zone}")]
    ImageNotFound {
        /// Image label passed by the caller.
        label: String,
        /// Architecture requested by the caller.
        arch: String,
        /// Zone used for the lookup.
        zone: String,
    },
    /// Raised when the server type is not available in the selected zone.
    #[error("commercial type '{commercial_type}' not available in zone {zone}")]
    InstanceTypeUnavailable {
        /// Requested commercial type.
        commercial_type: String,
        /// Target zone.
        zone: String,
    },
    /// Raised when a reserved address is not owned by the project.
    #[error("reserved IP '{address}' not found in zone {zone}")]
    ReservedIpNotFound {
        /// Address or identifier passed by the caller.
        address: String,
        /// Zone used for the lookup.
        zone: String,
    },
    /// Raised when a user-data value cannot be read locally.
    #[error("{0}")]
    UserDataSource(String),
    /// Raised when user-data cannot be uploaded.
    #[error("user-data '{key}' for instance {instance_id}: {message}")]
    UserData {
        /// User-data key.
        key: String,
        /// Provider instance identifier.
        instance_id: String,
        /// Failure detail.
        message: String,
    },
    /// Raised when the instance is no longer listed by the API.
    #[error("instance {instance_id} not found")]
    InstanceGone {
        /// Provider instance identifier.
        instance_id: String,
    },
    /// Raised when teardown leaves a server visible in the API.
    #[error("instance {instance_id} still present after teardown")]
    ResidualResource {
        /// Provider instance identifier.
        instance_id: String,
    },
    /// Raised when an instance cannot be powered on.
    #[error("instance {instance_id} in state {state} cannot be powered on")]
    PowerOnNotAllowed {
        /// Provider instance identifier.
        instance_id: String,
        /// Current state reported by the provider.
        state: String,
    },
    /// Raised when the API answers with an error status.
    #[error("API returned {status}: {message}")]
    Api {
        /// HTTP status code.
        status: u16,
        /// Message returned by the API.
        message: String,
    },
    /// Wrapper for transport and decoding failures.
    #[error("provider error: {message}")]
    Provider {
        /// Message returned by the provider SDK or HTTP client.
        message: String,
    },
}

impl From<ScalewayError> for ScalewayBackendError {
    fn from(value: ScalewayError) -> Self {
        Self::Provider {
            message: value.to_string(),
        }
    }
}

impl From<reqwest::Error> for ScalewayBackendError {
    fn from(value: reqwest::Error) -> Self {
        Self::Provider {
            message: value.to_string(),
        }
    }
}

impl From<ConfigError> for ScalewayBackendError {
    fn from(value: ConfigError) -> Self {
        Self::Config(value.to_string())
    }
}
