//! Facts extraction.
//!
//! Turns a live image reference into an [`ImageFacts`] snapshot:
//!
//! 1. `pull` the image (barrier, must succeed first)
//! 2. fan out three independent reads: the image manifest (decoded once and
//!    shared by the base image, labels and layers), the tags and the licenses
//! 3. join and build the snapshot
//!
//! The first failing read aborts the rest and no facts are returned.

mod error;

pub use error::{ExtractionError, Step};

use std::collections::BTreeMap;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::EngineConfig;
use crate::engine::{ContainerEngine, ImageInspect};
use crate::models::ImageFacts;

/// Top-level directory that must hold the partner's terms and conditions
pub const LICENSES_DIR: &str = "licenses";

/// Builds [`ImageFacts`] through a [`ContainerEngine`]
pub struct FactsExtractor<E: ContainerEngine> {
    engine: E,
    base_registry: String,
}

impl<E: ContainerEngine> FactsExtractor<E> {
    pub fn new(engine: E, base_registry: impl Into<String>) -> Self {
        Self {
            engine,
            base_registry: base_registry.into(),
        }
    }

    pub fn from_config(engine: E, config: &EngineConfig) -> Self {
        Self::new(engine, config.base_registry.clone())
    }

    /// Pull, then run every read concurrently and assemble the snapshot
    pub async fn extract(&self, image: &str) -> Result<ImageFacts, ExtractionError> {
        info!(image = %image, builder = %self.engine.builder(), "Extracting image facts");

        self.pull(image).await?;

        let manifest = async {
            let inspect = self.inspect_image(image).await?;
            let base = self.inspect_base_image(&inspect).await;
            Ok::<_, ExtractionError>((inspect, base))
        };

        let ((inspect, (base_image, base_layers)), tags, has_licenses) = tokio::try_join!(
            manifest,
            self.inspect_tags(image),
            self.inspect_licenses(image),
        )?;

        let facts = ImageFacts::builder(image, self.engine.builder())
            .base_image(base_image, base_layers)
            .labels(inspect_labels(&inspect))
            .layer_digests(inspect_layers(&inspect))
            .tags(tags)
            .has_licenses(has_licenses)
            .build()?;

        info!(
            image = %image,
            base_image = %facts.base_image(),
            layers = facts.layer_digests().len(),
            tags = facts.tags().len(),
            labels = facts.labels().len(),
            has_licenses = facts.has_licenses(),
            "Image facts extracted"
        );
        Ok(facts)
    }

    /// Same as [`extract`](Self::extract) but gives up as soon as `cancel` fires.
    ///
    /// In-flight engine calls are dropped, which kills their child processes
    /// and removes any materialized filesystem.
    pub async fn extract_with_cancel(
        &self,
        image: &str,
        cancel: &CancellationToken,
    ) -> Result<ImageFacts, ExtractionError> {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                warn!(image = %image, "Extraction cancelled");
                Err(ExtractionError::Cancelled { image: image.to_string() })
            }
            result = self.extract(image) => result,
        }
    }

    pub async fn pull(&self, image: &str) -> Result<(), ExtractionError> {
        debug!(image = %image, "Pulling image");
        self.engine
            .pull(image)
            .await
            .map_err(|source| ExtractionError::Pull {
                image: image.to_string(),
                source,
            })
    }

    /// Inspect the image and decode the payload into its typed view
    pub async fn inspect_image(&self, image: &str) -> Result<ImageInspect, ExtractionError> {
        let payload = self
            .engine
            .inspect(image)
            .await
            .map_err(|source| ExtractionError::Engine {
                step: Step::Manifest,
                image: image.to_string(),
                source,
            })?;
        ImageInspect::decode(payload).map_err(|source| ExtractionError::Decode {
            step: Step::Manifest,
            image: image.to_string(),
            source,
        })
    }

    /// Infer the base image from the parent configuration and read its layers.
    ///
    /// An unidentifiable base yields an empty reference. A base that can't be
    /// pulled or inspected yields empty layers; both are left for the
    /// provenance rule to judge.
    pub async fn inspect_base_image(&self, inspect: &ImageInspect) -> (String, Vec<String>) {
        let reference = base_reference(&self.base_registry, &inspect.parent_labels());

        if reference.is_empty() {
            debug!("No base image name in parent configuration");
            return (reference, Vec::new());
        }

        if let Err(e) = self.engine.pull(&reference).await {
            warn!(base_image = %reference, error = %e, "Couldn't pull base image");
            return (reference, Vec::new());
        }

        let layers = match self.engine.inspect(&reference).await {
            Ok(payload) => match ImageInspect::decode(payload) {
                Ok(base) => base.layers(),
                Err(e) => {
                    warn!(base_image = %reference, error = %e, "Couldn't decode base image");
                    Vec::new()
                }
            },
            Err(e) => {
                warn!(base_image = %reference, error = %e, "Couldn't inspect base image");
                Vec::new()
            }
        };

        debug!(base_image = %reference, layers = layers.len(), "Base image resolved");
        (reference, layers)
    }

    pub async fn inspect_tags(&self, image: &str) -> Result<Vec<String>, ExtractionError> {
        self.engine
            .list_tags(image)
            .await
            .map_err(|source| ExtractionError::Engine {
                step: Step::Tags,
                image: image.to_string(),
                source,
            })
    }

    /// Materialize the filesystem and look for a top-level `licenses` directory
    pub async fn inspect_licenses(&self, image: &str) -> Result<bool, ExtractionError> {
        let exported = self
            .engine
            .export_filesystem(image)
            .await
            .map_err(|source| ExtractionError::Engine {
                step: Step::Licenses,
                image: image.to_string(),
                source,
            })?;

        let present = exported
            .has_top_level_dir(LICENSES_DIR)
            .await
            .map_err(|source| ExtractionError::Io {
                image: image.to_string(),
                source,
            })?;

        let path = exported.path().to_path_buf();
        if let Err(e) = exported.close() {
            warn!(path = %path.display(), error = %e, "Failed to remove exported filesystem");
        }

        Ok(present)
    }
}

/// Labels the image declares about itself
pub fn inspect_labels(inspect: &ImageInspect) -> BTreeMap<String, String> {
    inspect.labels()
}

/// Layer digests, base to top
pub fn inspect_layers(inspect: &ImageInspect) -> Vec<String> {
    inspect.layers()
}

/// Canonical base image reference from parent labels:
/// `<registry>/<name>:<version>-<release>`.
///
/// Returns an empty string when `name` is missing or blank. Missing version or
/// release parts are dropped from the tag; with neither, no tag is written.
pub fn base_reference(registry: &str, parent_labels: &BTreeMap<String, String>) -> String {
    let label = |key: &str| {
        parent_labels
            .get(key)
            .map(|v| v.trim().trim_matches('"').to_string())
            .filter(|v| !v.is_empty())
    };

    let Some(name) = label("name") else {
        return String::new();
    };

    let tag: Vec<String> = [label("version"), label("release")]
        .into_iter()
        .flatten()
        .collect();

    let registry = registry.trim_end_matches('/');
    if tag.is_empty() {
        format!("{}/{}", registry, name)
    } else {
        format!("{}/{}:{}", registry, name, tag.join("-"))
    }
}
