//! The certification rules. Each one is a pure function over [`ImageFacts`].

use crate::models::{CheckResult, ImageFacts};

/// Labels every certified image must define, in reporting order
pub const REQUIRED_LABELS: &[(&str, &str)] = &[
    ("name", "name of the image"),
    ("vendor", "company name"),
    ("version", "version of the image"),
    ("release", "number identifying this specific build"),
    ("summary", "short overview of the application or component"),
    ("description", "long description of the application or component"),
];

/// Images with this many layers or more fail
pub const MAX_LAYERS: usize = 40;

const LATEST: &str = "latest";

/// Image must be built on an unmodified base image from the certified registry
pub fn check_base_image_provenance(facts: &ImageFacts) -> CheckResult {
    let mut r = CheckResult::new("Base Image Provenance");

    let base = facts.base_image();
    if base.is_empty() {
        r.error("Base image provenance is unknown: the parent configuration has no name label")
            .suggest("Verify that the base image comes from the Red Hat container catalog.")
            .suggest("Keep the name, version and release labels inherited from the base image.");
        return r;
    }

    let ours = facts.layer_digests();
    let theirs = facts.base_image_layers();

    if theirs.is_empty() && !ours.is_empty() {
        r.error(format!(
            "Couldn't verify base image {}: its layers could not be read",
            base
        ))
        .suggest(format!(
            "Verify that {} is provided by Red Hat and can be pulled.",
            base
        ));
        return r;
    }

    for (i, (layer, expected)) in ours.iter().zip(theirs).enumerate() {
        if layer != expected {
            r.error(format!(
                "Base image layer {} at position {} doesn't match Red Hat's layer {}",
                layer, i, expected
            ));
        }
    }

    if !r.passed() {
        r.suggest("Verify that base image is provided by Red Hat.")
            .suggest("Make sure base layers weren't changed, combined or squashed.");
    }
    r
}

/// Image must define every label in [`REQUIRED_LABELS`]
pub fn check_required_labels(facts: &ImageFacts) -> CheckResult {
    let mut r = CheckResult::new("Has Labels");

    for (label, meaning) in REQUIRED_LABELS {
        if !facts.labels().contains_key(*label) {
            r.error(format!("Label {} not present.", label))
                .suggest(format!(
                    "Add `LABEL {}=<{}>` to the Containerfile.",
                    label, meaning
                ));
        }
    }
    r
}

/// Image must have fewer than [`MAX_LAYERS`] layers
pub fn check_layer_count(facts: &ImageFacts) -> CheckResult {
    let mut r = CheckResult::new("Has Under 40 Layers");

    let count = facts.layer_digests().len();
    if count >= MAX_LAYERS {
        r.error(format!(
            "Image has {} layers, it must have fewer than {}.",
            count, MAX_LAYERS
        ))
        .suggest("Reduce the number of layers by optimizing the container file.");
    }
    r
}

/// Image must carry at least one tag other than `latest`
pub fn check_tags(facts: &ImageFacts) -> CheckResult {
    let mut r = CheckResult::new("Good Tags");

    if facts.tags().iter().any(|t| tag_portion(t) != LATEST) {
        return r;
    }

    if facts.tags().is_empty() {
        r.error("Image has no tags.");
    } else {
        r.error("Image is only tagged 'latest'.");
    }
    r.suggest(format!(
        "Add a tag that identifies this build, such as the image version: `{} tag {} <repository>:<version>`.",
        facts.engine(),
        facts.image()
    ));
    r
}

/// Image must ship its terms and conditions under `/licenses`
pub fn check_licenses(facts: &ImageFacts) -> CheckResult {
    let mut r = CheckResult::new("Has Licenses");

    if !facts.has_licenses() {
        r.error("Image has no /licenses directory.").suggest(
            "Create a directory named /licenses holding the software terms and conditions \
             and the licenses of any open source components.",
        );
    }
    r
}

/// Portion of `repo:tag` after the last separator.
///
/// A colon that belongs to a registry port (followed by a path) is not a tag
/// separator; with no separator the whole string is returned.
fn tag_portion(tag: &str) -> &str {
    match tag.rsplit_once(':') {
        Some((_, t)) if !t.contains('/') => t,
        _ => tag,
    }
}
