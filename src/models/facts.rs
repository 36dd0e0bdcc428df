use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Container engine that produced a facts snapshot
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum Builder {
    #[default]
    Docker,
    Podman,
}

impl Builder {
    /// Name of the engine binary
    pub fn binary(&self) -> &'static str {
        match self {
            Builder::Docker => "docker",
            Builder::Podman => "podman",
        }
    }
}

impl fmt::Display for Builder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.binary())
    }
}

impl FromStr for Builder {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "docker" => Ok(Builder::Docker),
            "podman" => Ok(Builder::Podman),
            other => Err(format!(
                "unknown builder '{}', expected 'docker' or 'podman'",
                other
            )),
        }
    }
}

/// Everything the rules need to know about one image.
///
/// Built once by the extractor and never mutated afterwards. Fields are
/// private so a value can only come out of [`ImageFactsBuilder::build`],
/// which requires every field to be supplied.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct ImageFacts {
    image: String,
    builder: Builder,
    base_image: String,
    base_image_layers: Vec<String>,
    layer_digests: Vec<String>,
    tags: BTreeSet<String>,
    labels: BTreeMap<String, String>,
    has_licenses: bool,
}

impl ImageFacts {
    pub fn builder(image: impl Into<String>, builder: Builder) -> ImageFactsBuilder {
        ImageFactsBuilder {
            image: image.into(),
            builder,
            base_image: None,
            base_image_layers: None,
            layer_digests: None,
            tags: None,
            labels: None,
            has_licenses: None,
        }
    }

    /// Fully-qualified reference under test
    pub fn image(&self) -> &str {
        &self.image
    }

    pub fn engine(&self) -> Builder {
        self.builder
    }

    /// Inferred upstream base image reference. Empty means no identifiable base.
    pub fn base_image(&self) -> &str {
        &self.base_image
    }

    pub fn base_image_layers(&self) -> &[String] {
        &self.base_image_layers
    }

    /// Layer digests of the image under test, root to top
    pub fn layer_digests(&self) -> &[String] {
        &self.layer_digests
    }

    pub fn tags(&self) -> &BTreeSet<String> {
        &self.tags
    }

    pub fn labels(&self) -> &BTreeMap<String, String> {
        &self.labels
    }

    pub fn has_licenses(&self) -> bool {
        self.has_licenses
    }
}

/// Error returned when a facts snapshot is built with a field missing
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FactsBuildError {
    #[error("image reference is empty")]
    EmptyImage,
    #[error("facts field '{0}' was never populated")]
    Missing(&'static str),
}

/// Collects extracted values and yields an [`ImageFacts`] only when complete.
#[derive(Debug, Clone)]
pub struct ImageFactsBuilder {
    image: String,
    builder: Builder,
    base_image: Option<String>,
    base_image_layers: Option<Vec<String>>,
    layer_digests: Option<Vec<String>>,
    tags: Option<BTreeSet<String>>,
    labels: Option<BTreeMap<String, String>>,
    has_licenses: Option<bool>,
}

impl ImageFactsBuilder {
    pub fn base_image(mut self, reference: impl Into<String>, layers: Vec<String>) -> Self {
        self.base_image = Some(reference.into());
        self.base_image_layers = Some(layers);
        self
    }

    pub fn layer_digests(mut self, layers: Vec<String>) -> Self {
        self.layer_digests = Some(layers);
        self
    }

    pub fn tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags = Some(tags.into_iter().map(Into::into).collect());
        self
    }

    pub fn labels<I, K, V>(mut self, labels: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        self.labels = Some(
            labels
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        );
        self
    }

    pub fn has_licenses(mut self, present: bool) -> Self {
        self.has_licenses = Some(present);
        self
    }

    pub fn build(self) -> Result<ImageFacts, FactsBuildError> {
        if self.image.trim().is_empty() {
            return Err(FactsBuildError::EmptyImage);
        }

        Ok(ImageFacts {
            image: self.image,
            builder: self.builder,
            base_image: self.base_image.ok_or(FactsBuildError::Missing("base_image"))?,
            base_image_layers: self
                .base_image_layers
                .ok_or(FactsBuildError::Missing("base_image_layers"))?,
            layer_digests: self
                .layer_digests
                .ok_or(FactsBuildError::Missing("layer_digests"))?,
            tags: self.tags.ok_or(FactsBuildError::Missing("tags"))?,
            labels: self.labels.ok_or(FactsBuildError::Missing("labels"))?,
            has_licenses: self
                .has_licenses
                .ok_or(FactsBuildError::Missing("has_licenses"))?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn complete(image: &str) -> ImageFactsBuilder {
        ImageFacts::builder(image, Builder::Podman)
            .base_image("registry.access.redhat.com/ubi8:8.4-200", vec!["sha256:a".into()])
            .layer_digests(vec!["sha256:a".into(), "sha256:b".into()])
            .tags(["quay.io/acme/app:1.0"])
            .labels([("name", "app")])
            .has_licenses(true)
    }

    #[test]
    fn test_build_complete_facts() {
        let facts = complete("quay.io/acme/app:1.0").build().unwrap();
        assert_eq!(facts.image(), "quay.io/acme/app:1.0");
        assert_eq!(facts.engine(), Builder::Podman);
        assert_eq!(facts.layer_digests().len(), 2);
        assert_eq!(facts.labels().get("name").map(String::as_str), Some("app"));
        assert!(facts.has_licenses());
    }

    #[test]
    fn test_build_rejects_missing_field() {
        let result = ImageFacts::builder("quay.io/acme/app:1.0", Builder::Docker)
            .layer_digests(vec![])
            .build();
        assert_eq!(result, Err(FactsBuildError::Missing("base_image")));
    }

    #[test]
    fn test_build_rejects_empty_image() {
        let result = complete("  ").build();
        assert_eq!(result, Err(FactsBuildError::EmptyImage));
    }

    #[test]
    fn test_builder_parse() {
        assert_eq!("Podman".parse::<Builder>(), Ok(Builder::Podman));
        assert_eq!("docker".parse::<Builder>(), Ok(Builder::Docker));
        assert!("buildah".parse::<Builder>().is_err());
        assert_eq!(Builder::Podman.to_string(), "podman");
    }
}
