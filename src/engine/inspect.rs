//! Typed view of an engine's `image inspect` payload.
//!
//! Both docker and podman print a JSON array with one object per reference.
//! Only the fields the extractor reads are modelled; everything else is
//! ignored. Missing or `null` sections decode to empty values.

use std::collections::BTreeMap;

use serde::{Deserialize, Deserializer};

/// Error decoding an inspection payload
#[derive(Debug, thiserror::Error)]
pub enum InspectDecodeError {
    #[error("inspection payload is an empty array")]
    Empty,
    #[error("inspection payload has unexpected shape: {0}")]
    Shape(#[from] serde_json::Error),
}

/// The parts of `image inspect` output used to build facts
#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "PascalCase")]
pub struct ImageInspect {
    /// The image's own configuration
    #[serde(default)]
    pub config: Option<ImageConfig>,
    /// Configuration of the container the top layer was committed from.
    /// Carries the labels inherited from the parent image.
    #[serde(default)]
    pub container_config: Option<ImageConfig>,
    #[serde(rename = "RootFS", default)]
    pub root_fs: Option<RootFs>,
}

#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "PascalCase")]
pub struct ImageConfig {
    #[serde(default, deserialize_with = "null_as_default")]
    pub labels: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "PascalCase")]
pub struct RootFs {
    #[serde(default, deserialize_with = "null_as_default")]
    pub layers: Vec<String>,
}

fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

impl ImageInspect {
    /// Decode a raw payload. Accepts the usual one-element array or a bare object.
    pub fn decode(payload: serde_json::Value) -> Result<Self, InspectDecodeError> {
        match payload {
            serde_json::Value::Array(items) => {
                let first = items.into_iter().next().ok_or(InspectDecodeError::Empty)?;
                Ok(serde_json::from_value(first)?)
            }
            other => Ok(serde_json::from_value(other)?),
        }
    }

    /// Labels the image declares about itself
    pub fn labels(&self) -> BTreeMap<String, String> {
        self.config
            .as_ref()
            .map(|c| c.labels.clone())
            .unwrap_or_default()
    }

    /// Labels from the parent configuration
    pub fn parent_labels(&self) -> BTreeMap<String, String> {
        self.container_config
            .as_ref()
            .map(|c| c.labels.clone())
            .unwrap_or_default()
    }

    /// Root filesystem layer digests, base to top
    pub fn layers(&self) -> Vec<String> {
        self.root_fs
            .as_ref()
            .map(|r| r.layers.clone())
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_decode_docker_payload() {
        let payload = json!([{
            "Id": "sha256:abc",
            "RepoTags": ["quay.io/acme/app:1.0", "quay.io/acme/app:latest"],
            "ContainerConfig": {
                "Labels": {"name": "ubi8", "version": "8.4", "release": "206"}
            },
            "Config": {
                "Labels": {"name": "acme-app", "vendor": "Acme"}
            },
            "RootFS": {"Type": "layers", "Layers": ["sha256:1", "sha256:2"]}
        }]);

        let inspect = ImageInspect::decode(payload).unwrap();
        assert_eq!(inspect.labels()["name"], "acme-app");
        assert_eq!(inspect.parent_labels()["name"], "ubi8");
        assert_eq!(inspect.layers(), vec!["sha256:1", "sha256:2"]);
    }

    #[test]
    fn test_null_sections_decode_empty() {
        let payload = json!([{
            "RepoTags": null,
            "Config": {"Labels": null},
            "ContainerConfig": null,
            "RootFS": {"Type": "layers", "Layers": null}
        }]);

        let inspect = ImageInspect::decode(payload).unwrap();
        assert!(inspect.labels().is_empty());
        assert!(inspect.parent_labels().is_empty());
        assert!(inspect.layers().is_empty());
    }

    #[test]
    fn test_decode_bare_object() {
        let inspect = ImageInspect::decode(json!({
            "Id": "sha256:def",
            "Config": {"Labels": {"vendor": "Acme"}}
        }))
        .unwrap();
        assert_eq!(inspect.labels()["vendor"], "Acme");
        assert!(inspect.layers().is_empty());
    }

    #[test]
    fn test_decode_empty_array() {
        assert!(matches!(
            ImageInspect::decode(json!([])),
            Err(InspectDecodeError::Empty)
        ));
    }

    #[test]
    fn test_decode_wrong_shape() {
        let payload = json!([{"RootFS": {"Layers": "not-a-list"}}]);
        assert!(matches!(
            ImageInspect::decode(payload),
            Err(InspectDecodeError::Shape(_))
        ));
    }
}
