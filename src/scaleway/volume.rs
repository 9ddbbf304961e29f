//! Additional volume templates for server creation.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::volume::VolumeSize;

/// Volume type used for additional volumes.
pub(crate) const ADDITIONAL_VOLUME_TYPE: &str = "l_ssd";

/// Volume created alongside the server.
#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
pub(crate) struct VolumeTemplate {
    /// Volume name.
    pub name: String,
    /// Size in bytes.
    pub size: u64,
    /// Storage class.
    pub volume_type: &'static str,
}

/// Builds the `volumes` map of a create request.
///
/// Index `0` is the root volume, which comes from the image, so additional
/// volumes start at `1`.
pub(crate) fn volume_templates(
    server_name: &str,
    sizes: &[VolumeSize],
) -> BTreeMap<String, VolumeTemplate> {
    sizes
        .iter()
        .zip(1_usize..)
        .map(|(size, index)| {
            (
                index.to_string(),
                VolumeTemplate {
                    name: format!("{server_name}-{index}"),
                    size: size.bytes(),
                    volume_type: ADDITIONAL_VOLUME_TYPE,
                },
            )
        })
        .collect()
}
