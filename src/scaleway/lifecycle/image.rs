//! Image resolution helpers for the Scaleway backend.
//!
//! An image is either an identifier, used as is, or a label resolved to the
//! newest available image with that name for the configured architecture.
//! Project images shadow public ones with the same label.

use std::future::Future;

use scaleway_rs::{ScalewayImage, ScalewayListInstanceImagesBuilder};
use uuid::Uuid;

use crate::scaleway::types::Zone;

use super::super::{ScalewayBackend, ScalewayBackendError};

/// What an image lookup is for, used to filter and report.
#[derive(Clone, Copy, Debug)]
pub(in crate::scaleway) struct ImageQuery<'a> {
    pub(in crate::scaleway) label: &'a str,
    pub(in crate::scaleway) arch: &'a str,
    pub(in crate::scaleway) zone: &'a str,
}

impl ScalewayBackend {
    pub(in crate::scaleway) async fn resolve_image_id(
        &self,
        image: &str,
        zone: &Zone,
    ) -> Result<String, ScalewayBackendError> {
        if Uuid::parse_str(image).is_ok() {
            return Ok(image.to_owned());
        }

        let query = ImageQuery {
            label: image,
            arch: &self.config.default_architecture,
            zone: zone.as_str(),
        };
        self.resolve_image_id_with(
            query,
            || async move {
                let mut scoped =
                    ScalewayListInstanceImagesBuilder::new(self.api.clone(), query.zone)
                        .project(&self.config.default_project_id)
                        .name(query.label)
                        .arch(query.arch);
                if let Some(org) = &self.config.default_organization_id {
                    scoped = scoped.organization(org);
                }
                scoped.run_async().await.map_err(ScalewayBackendError::from)
            },
            || async move {
                ScalewayListInstanceImagesBuilder::new(self.api.clone(), query.zone)
                    .public(true)
                    .name(query.label)
                    .arch(query.arch)
                    .run_async()
                    .await
                    .map_err(ScalewayBackendError::from)
            },
        )
        .await
    }

    pub(in crate::scaleway) async fn resolve_image_id_with<FutA, FutB, FetchA, FetchB>(
        &self,
        query: ImageQuery<'_>,
        project_fetch: FetchA,
        public_fetch: FetchB,
    ) -> Result<String, ScalewayBackendError>
    where
        FetchA: FnOnce() -> FutA,
        FetchB: FnOnce() -> FutB,
        FutA: Future<Output = Result<Vec<ScalewayImage>, ScalewayBackendError>>,
        FutB: Future<Output = Result<Vec<ScalewayImage>, ScalewayBackendError>>,
    {
        let project_images = Self::filter_images(project_fetch().await?, query);
        let candidates = if project_images.is_empty() {
            Self::filter_images(public_fetch().await?, query)
        } else {
            project_images
        };

        Self::select_image_id(candidates, query)
    }

    pub(in crate::scaleway) fn select_image_id(
        candidates: Vec<ScalewayImage>,
        query: ImageQuery<'_>,
    ) -> Result<String, ScalewayBackendError> {
        candidates
            .into_iter()
            .max_by(|lhs, rhs| lhs.creation_date.cmp(&rhs.creation_date))
            .map(|image| image.id)
            .ok_or_else(|| ScalewayBackendError::ImageNotFound {
                label: query.label.to_owned(),
                arch: query.arch.to_owned(),
                zone: query.zone.to_owned(),
            })
    }

    pub(in crate::scaleway) fn filter_images(
        images: Vec<ScalewayImage>,
        query: ImageQuery<'_>,
    ) -> Vec<ScalewayImage> {
        images
            .into_iter()
            .filter(|image| image.arch == query.arch)
            .filter(|image| image.state == "available")
            .collect()
    }
}
