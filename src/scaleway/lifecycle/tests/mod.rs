//! Unit tests for Scaleway lifecycle helpers.

use std::collections::{BTreeSet, HashMap};
use std::net::IpAddr;
use std::time::Duration;

use reqwest::StatusCode;
use scaleway_rs::{ScalewayApi, ScalewayImage};

use super::{ServerEnvelope, ServerSnapshot, api_error, decode};
use crate::ScalewayConfig;
use crate::backend::{InstanceSpec, InstanceState};
use crate::request::{IpPolicy, RunRequest};
use crate::scaleway::types::{Action, Zone};
use crate::scaleway::{ScalewayBackend, ScalewayBackendError};
use crate::volume::VolumeSize;

fn snapshot(
    state: &str,
    allowed: impl IntoIterator<Item = impl Into<Action>>,
    public_ip: Option<&str>,
) -> ServerSnapshot {
    ServerSnapshot {
        id: "id".into(),
        state: InstanceState::from(state),
        state_detail: String::new(),
        allowed_actions: allowed.into_iter().map(Into::into).collect(),
        public_ip: public_ip.and_then(|ip| ip.parse().ok()),
        private_ip: None,
    }
}

struct ImageSpec<'a> {
    id: &'a str,
    arch: &'a str,
    state: &'a str,
    creation_date: &'a str,
}

fn image(spec: ImageSpec) -> ScalewayImage {
    ScalewayImage {
        id: spec.id.to_owned(),
        name: String::new(),
        arch: spec.arch.to_owned(),
        creation_date: spec.creation_date.to_owned(),
        modification_date: String::new(),
        from_server: None,
        organization: String::new(),
        public: true,
        state: spec.state.to_owned(),
        project: String::new(),
        tags: vec![],
        zone: String::new(),
        root_volume: scaleway_rs::ScalewayImageRootVolume {
            id: String::new(),
            name: String::new(),
            size: 0,
            volume_type: String::new(),
        },
        default_bootscript: None,
        extra_volumes: scaleway_rs::ScalewayImageExtraVolumes {
            volumes: HashMap::new(),
        },
    }
}

fn dummy_config() -> ScalewayConfig {
    ScalewayConfig {
        secret_key: String::from("dummy"),
        default_organization_id: None,
        default_project_id: String::from("proj"),
        default_zone: String::from("zone"),
        default_architecture: String::from("x86_64"),
    }
}

fn backend_fixture() -> ScalewayBackend {
    ScalewayBackend {
        api: ScalewayApi::new("dummy"),
        config: dummy_config(),
        poll_interval: Duration::from_millis(1),
        wait_timeout: Duration::from_millis(5),
    }
}

#[test]
fn server_envelope_maps_to_snapshot() {
    let body = br#"{
        "server": {
            "id": "srv-1",
            "state": "starting",
            "state_detail": "provisioning node",
            "allowed_actions": ["stop_in_place", "terminate"],
            "public_ip": {"id": "ip-1", "address": "51.15.1.2"},
            "private_ip": "10.1.2.3",
            "name": "ignored"
        }
    }"#;

    let snapshot = decode::<ServerEnvelope>(StatusCode::OK, body)
        .map(ServerSnapshot::from)
        .unwrap_or_else(|err| panic!("decode: {err}"));

    assert_eq!(snapshot.id.as_str(), "srv-1");
    assert_eq!(snapshot.state, InstanceState::Starting);
    assert!(snapshot.allows(Action::TERMINATE));
    assert_eq!(snapshot.public_ip, "51.15.1.2".parse::<IpAddr>().ok());
    assert_eq!(snapshot.status().private_ip, "10.1.2.3".parse::<IpAddr>().ok());
    assert_eq!(snapshot.boot_line(), "starting: provisioning node\n");
}

#[test]
fn server_without_addresses_decodes() {
    let body = br#"{"server": {"id": "srv-2", "state": "stopped", "public_ip": null}}"#;

    let snapshot = decode::<ServerEnvelope>(StatusCode::OK, body)
        .map(ServerSnapshot::from)
        .unwrap_or_else(|err| panic!("decode: {err}"));

    assert_eq!(snapshot.public_ip, None);
    assert_eq!(snapshot.private_ip, None);
    assert_eq!(snapshot.boot_line(), "stopped\n");
}

#[test]
fn error_status_uses_api_message() {
    let body = br#"{"type": "not_found", "message": "resource is not found"}"#;

    let err = api_error(StatusCode::NOT_FOUND, body);

    assert_eq!(
        err,
        ScalewayBackendError::Api {
            status: 404,
            message: String::from("resource is not found"),
        }
    );
}

#[test]
fn error_status_falls_back_to_raw_body() {
    let err = decode::<ServerEnvelope>(StatusCode::BAD_GATEWAY, b"upstream down")
        .err()
        .unwrap_or_else(|| panic!("error status should fail"));

    assert!(err.to_string().contains("upstream down"), "{err}");
}

#[test]
fn create_payload_carries_request_fields() {
    let mut request = RunRequest::new("ubuntu-noble");
    request.name = Some(String::from("builder"));
    request.commercial_type = String::from("GP1-XS");
    request.ipv6 = true;
    request.bootscript = Some(String::from("rescue"));
    request.tags = BTreeSet::from([String::from("boot=live")]);
    request.volumes = vec![VolumeSize::parse("20G").unwrap_or_else(|err| panic!("{err}"))];
    let spec = InstanceSpec::from_request(&request);

    let payload = backend_fixture().create_payload(&spec, "img-1", None);

    assert_eq!(payload.name, "builder");
    assert_eq!(payload.image, "img-1");
    assert_eq!(payload.project, "proj");
    assert_eq!(payload.boot_type, "auto");
    assert!(payload.dynamic_ip_required);
    assert!(payload.enable_ipv6);
    assert!(payload.stopped);
    assert_eq!(payload.tags, vec![String::from("boot=live")]);
    assert_eq!(payload.volumes.len(), 1);

    let json = serde_json::to_value(&payload).unwrap_or_else(|err| panic!("serialise: {err}"));
    assert_eq!(json.get("bootscript").and_then(|v| v.as_str()), Some("rescue"));
    assert!(json.get("organization").is_none());
    assert!(json.get("public_ip").is_none());
}

#[test]
fn create_payload_generates_name_and_honours_ip_policy() {
    let mut request = RunRequest::new("ubuntu-noble");
    request.ip_policy = IpPolicy::Reserved(String::from("51.15.1.2"));
    let spec = InstanceSpec::from_request(&request);

    let payload = backend_fixture().create_payload(&spec, "img-1", Some(String::from("ip-1")));

    assert!(payload.name.starts_with("sortie-"));
    assert!(!payload.dynamic_ip_required);
    assert_eq!(payload.public_ip.as_deref(), Some("ip-1"));
    let json = serde_json::to_value(&payload).unwrap_or_else(|err| panic!("serialise: {err}"));
    assert!(json.get("volumes").is_none());
}

#[tokio::test]
async fn power_on_if_needed_returns_ok_for_running() {
    let snap = snapshot("running", [Action::from("poweron")], Some("1.1.1.1"));
    let zone = Zone::from("zone");
    let result = backend_fixture().power_on_if_needed(&zone, &snap).await;
    assert!(result.is_ok());
}

#[tokio::test]
async fn power_on_if_needed_errors_when_not_allowed() {
    let snap = snapshot("stopped", Vec::<Action>::new(), None);
    let zone = Zone::from("zone");
    let result = backend_fixture().power_on_if_needed(&zone, &snap).await;
    assert!(matches!(
        result,
        Err(ScalewayBackendError::PowerOnNotAllowed { .. })
    ));
}
