//! Scaleway backend implementation of the instance lifecycle.

mod error;
mod lifecycle;
mod types;
mod user_data;
mod volume;

use std::time::Duration;

use crate::backend::{
    BackendFuture, BootOutputSink, InstanceHandle, InstanceSpec, InstanceStatus, Provisioner,
};
use crate::config::ScalewayConfig;
use scaleway_rs::ScalewayApi;

const POLL_INTERVAL: Duration = Duration::from_secs(2);
const WAIT_TIMEOUT: Duration = Duration::from_secs(300);

pub use error::ScalewayBackendError;

/// Backend that provisions instances through the Scaleway Instances API.
#[derive(Clone)]
pub struct ScalewayBackend {
    api: ScalewayApi,
    config: ScalewayConfig,
    poll_interval: Duration,
    wait_timeout: Duration,
}

impl ScalewayBackend {
    /// Constructs a new backend from configuration.
    ///
    /// # Errors
    ///
    /// Returns [`ScalewayBackendError::Config`] when the provided configuration
    /// fails validation.
    pub fn new(config: ScalewayConfig) -> Result<Self, ScalewayBackendError> {
        config.validate()?;
        Ok(Self {
            api: ScalewayApi::new(&config.secret_key),
            config,
            poll_interval: POLL_INTERVAL,
            wait_timeout: WAIT_TIMEOUT,
        })
    }

    /// Zone instances are created in.
    #[must_use]
    pub fn zone(&self) -> &str {
        &self.config.default_zone
    }

    /// Overrides the interval between API polls while streaming boot output
    /// and waiting for deletion.
    #[must_use]
    pub const fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }
}

impl Provisioner for ScalewayBackend {
    type Error = ScalewayBackendError;

    fn create<'a>(
        &'a self,
        spec: &'a InstanceSpec,
    ) -> BackendFuture<'a, InstanceHandle, Self::Error> {
        Box::pin(self.provision(spec))
    }

    fn poll<'a>(
        &'a self,
        handle: &'a InstanceHandle,
    ) -> BackendFuture<'a, InstanceStatus, Self::Error> {
        Box::pin(async move {
            self.fetch_server(handle)
                .await?
                .map(|server| server.status())
                .ok_or_else(|| ScalewayBackendError::InstanceGone {
                    instance_id: handle.id.clone(),
                })
        })
    }

    fn stream_boot_output<'a>(
        &'a self,
        handle: &'a InstanceHandle,
        sink: BootOutputSink,
    ) -> BackendFuture<'a, (), Self::Error> {
        Box::pin(self.stream_boot(handle, sink))
    }

    fn delete(&self, handle: InstanceHandle) -> BackendFuture<'_, (), Self::Error> {
        Box::pin(async move { self.remove_server(&handle).await })
    }
}
