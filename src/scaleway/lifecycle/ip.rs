//! Reserved public address lookup.

use serde::Deserialize;
use uuid::Uuid;

use crate::scaleway::types::Zone;

use super::super::{ScalewayBackend, ScalewayBackendError};
use super::{SCALEWAY_INSTANCE_API_BASE, client, decode, send};

const IP_PAGE_SIZE: u32 = 100;

#[derive(Debug, Deserialize)]
pub(in crate::scaleway) struct IpList {
    pub(in crate::scaleway) ips: Vec<ReservedIp>,
}

#[derive(Clone, Debug, Deserialize, Eq, PartialEq)]
pub(in crate::scaleway) struct ReservedIp {
    pub(in crate::scaleway) id: String,
    pub(in crate::scaleway) address: String,
}

impl ScalewayBackend {
    /// Returns the identifier of the reserved IP named by `address`.
    ///
    /// Identifiers pass through unchanged; addresses are looked up among the
    /// project's reserved IPs in `zone`.
    pub(in crate::scaleway) async fn resolve_reserved_ip(
        &self,
        zone: &Zone,
        address: &str,
    ) -> Result<String, ScalewayBackendError> {
        if Uuid::parse_str(address).is_ok() {
            return Ok(address.to_owned());
        }

        let url = format!("{SCALEWAY_INSTANCE_API_BASE}/zones/{zone}/ips", zone = zone.as_str());
        let request = client().get(&url).query(&[
            ("project", self.config.default_project_id.clone()),
            ("per_page", IP_PAGE_SIZE.to_string()),
        ]);
        let (status, body) = send(request, &self.config.secret_key).await?;
        let listed: IpList = decode(status, &body)?;

        Self::select_reserved_ip(listed.ips, address, zone.as_str())
    }

    pub(in crate::scaleway) fn select_reserved_ip(
        ips: Vec<ReservedIp>,
        address: &str,
        zone: &str,
    ) -> Result<String, ScalewayBackendError> {
        ips.into_iter()
            .find(|ip| ip.address == address)
            .map(|ip| ip.id)
            .ok_or_else(|| ScalewayBackendError::ReservedIpNotFound {
                address: address.to_owned(),
                zone: zone.to_owned(),
            })
    }
}
