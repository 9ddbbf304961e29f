//! Instance creation helpers for the Scaleway backend.
//!
//! User-data must be in place before first boot, so servers are created with
//! `stopped: true`, receive their user-data, and are then powered on. A server
//! that fails any step after creation is removed again so a failed create
//! never leaves anything behind.

use std::collections::BTreeMap;

use serde::Serialize;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::backend::{InstanceHandle, InstanceSpec};
use crate::request::IpPolicy;
use crate::scaleway::types::{Action, Zone};
use crate::scaleway::user_data::user_data_url;
use crate::scaleway::volume::{VolumeTemplate, volume_templates};
use crate::user_data::{ResolvedUserData, resolve};

use super::super::{ScalewayBackend, ScalewayBackendError};
use super::{SCALEWAY_INSTANCE_API_BASE, ServerEnvelope, ServerSnapshot, api_error, client, decode, send};

#[derive(Debug, Serialize)]
pub(in crate::scaleway) struct CreateServerRequest {
    pub(in crate::scaleway) name: String,
    pub(in crate::scaleway) commercial_type: String,
    pub(in crate::scaleway) image: String,
    pub(in crate::scaleway) project: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(in crate::scaleway) organization: Option<String>,
    pub(in crate::scaleway) tags: Vec<String>,
    pub(in crate::scaleway) boot_type: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(in crate::scaleway) bootscript: Option<String>,
    pub(in crate::scaleway) dynamic_ip_required: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(in crate::scaleway) public_ip: Option<String>,
    pub(in crate::scaleway) enable_ipv6: bool,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub(in crate::scaleway) volumes: BTreeMap<String, VolumeTemplate>,
    pub(in crate::scaleway) stopped: bool,
}

impl ScalewayBackend {
    fn is_instance_type_error(api_err: &scaleway_rs::ScalewayApiError, commercial_type: &str) -> bool {
        matches!(api_err.resource.as_deref(), Some("commercial_type"))
            || api_err
                .resource_id
                .as_deref()
                .is_some_and(|id| id == commercial_type)
            || (api_err.etype == "invalid_arguments"
                && api_err
                    .message
                    .to_ascii_lowercase()
                    .contains("commercial_type"))
    }

    /// Builds the create payload for `spec`.
    pub(in crate::scaleway) fn create_payload(
        &self,
        spec: &InstanceSpec,
        image_id: &str,
        reserved_ip_id: Option<String>,
    ) -> CreateServerRequest {
        let name = spec
            .name
            .clone()
            .unwrap_or_else(|| format!("sortie-{}", Uuid::new_v4().simple()));
        let volumes = volume_templates(&name, &spec.volumes);
        CreateServerRequest {
            commercial_type: spec.commercial_type.clone(),
            image: image_id.to_owned(),
            project: self.config.default_project_id.clone(),
            organization: self.config.default_organization_id.clone(),
            tags: spec.tags.iter().cloned().collect(),
            boot_type: spec.boot_type.as_str(),
            bootscript: spec.bootscript.clone(),
            dynamic_ip_required: matches!(spec.ip_policy, IpPolicy::Dynamic),
            public_ip: reserved_ip_id,
            enable_ipv6: spec.ipv6,
            volumes,
            stopped: true,
            name,
        }
    }

    /// Creates the instance, uploads its user-data, and powers it on.
    pub(in crate::scaleway) async fn provision(
        &self,
        spec: &InstanceSpec,
    ) -> Result<InstanceHandle, ScalewayBackendError> {
        let zone = Zone::from(self.config.default_zone.as_str());
        let user_data = resolve(&spec.user_data)
            .map_err(|err| ScalewayBackendError::UserDataSource(err.to_string()))?;
        let image_id = self.resolve_image_id(&spec.image, &zone).await?;
        let reserved_ip_id = match spec.ip_policy {
            IpPolicy::Reserved(ref address) => Some(self.resolve_reserved_ip(&zone, address).await?),
            IpPolicy::None | IpPolicy::Dynamic => None,
        };

        let payload = self.create_payload(spec, &image_id, reserved_ip_id);
        let server = self.create_server_stopped(&zone, &payload).await?;
        let handle = InstanceHandle {
            id: server.id.as_str().to_owned(),
            zone: zone.as_str().to_owned(),
        };
        info!(instance_id = %handle.id, name = %payload.name, "server created");

        if let Err(err) = self.start_server(&zone, &server, &user_data).await {
            warn!(instance_id = %handle.id, error = %err, "removing server after failed start");
            if let Err(cleanup) = self.remove_server(&handle).await {
                warn!(instance_id = %handle.id, error = %cleanup, "failed to remove server");
            }
            return Err(err);
        }
        Ok(handle)
    }

    async fn start_server(
        &self,
        zone: &Zone,
        server: &ServerSnapshot,
        user_data: &[ResolvedUserData],
    ) -> Result<(), ScalewayBackendError> {
        for entry in user_data {
            self.upload_user_data(zone, server, entry).await?;
        }
        self.power_on_if_needed(zone, server).await
    }

    async fn create_server_stopped(
        &self,
        zone: &Zone,
        payload: &CreateServerRequest,
    ) -> Result<ServerSnapshot, ScalewayBackendError> {
        let url = format!("{SCALEWAY_INSTANCE_API_BASE}/zones/{zone}/servers", zone = zone.as_str());
        let (status, body) = send(client().post(&url).json(payload), &self.config.secret_key).await?;

        if !status.is_success()
            && let Ok(api_err) = serde_json::from_slice::<scaleway_rs::ScalewayApiError>(&body)
            && Self::is_instance_type_error(&api_err, &payload.commercial_type)
        {
            return Err(ScalewayBackendError::InstanceTypeUnavailable {
                commercial_type: payload.commercial_type.clone(),
                zone: zone.as_str().to_owned(),
            });
        }

        decode::<ServerEnvelope>(status, &body).map(ServerSnapshot::from)
    }

    async fn upload_user_data(
        &self,
        zone: &Zone,
        server: &ServerSnapshot,
        entry: &ResolvedUserData,
    ) -> Result<(), ScalewayBackendError> {
        let url = user_data_url(zone.as_str(), server.id.as_str(), &entry.key);
        let request = client()
            .patch(&url)
            .header("Content-Type", "text/plain")
            .body(entry.content.clone());
        let (status, body) = send(request, &self.config.secret_key).await?;
        if !status.is_success() {
            return Err(ScalewayBackendError::UserData {
                key: entry.key.clone(),
                instance_id: server.id.as_str().to_owned(),
                message: api_error(status, &body).to_string(),
            });
        }
        debug!(instance_id = %server.id.as_str(), key = %entry.key, "user-data uploaded");
        Ok(())
    }

    pub(in crate::scaleway) async fn power_on_if_needed(
        &self,
        zone: &Zone,
        server: &ServerSnapshot,
    ) -> Result<(), ScalewayBackendError> {
        if server.state.is_ready() {
            return Ok(());
        }

        if server.allows(Action::POWER_ON) {
            self.api
                .perform_instance_action_async(zone.as_str(), server.id.as_str(), Action::POWER_ON)
                .await?;
            return Ok(());
        }

        Err(ScalewayBackendError::PowerOnNotAllowed {
            instance_id: server.id.as_str().to_owned(),
            state: server.state.to_string(),
        })
    }
}
