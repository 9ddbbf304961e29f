//! User-data helpers for the Scaleway backend.
//!
//! Scaleway exposes instance user-data as a per-server key/value store. Each
//! `--userdata` entry becomes one key whose value the instance can read from
//! its metadata service at boot.

use super::lifecycle::SCALEWAY_INSTANCE_API_BASE;

pub(crate) fn user_data_url(zone: &str, server_id: &str, key: &str) -> String {
    format!("{SCALEWAY_INSTANCE_API_BASE}/zones/{zone}/servers/{server_id}/user_data/{key}")
}
