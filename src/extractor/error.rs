use std::fmt;
use std::io;

use thiserror::Error;

use crate::engine::{EngineError, InspectDecodeError};
use crate::models::FactsBuildError;

/// Informational read that failed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    /// Image inspection shared by base image, labels and layers
    Manifest,
    Tags,
    Licenses,
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Step::Manifest => "manifest",
            Step::Tags => "tags",
            Step::Licenses => "licenses",
        })
    }
}

/// Fatal extraction failure. No facts exist when one of these is returned.
#[derive(Debug, Error)]
pub enum ExtractionError {
    #[error("couldn't pull image {image}: {source}")]
    Pull {
        image: String,
        #[source]
        source: EngineError,
    },

    #[error("couldn't read {step} from {image}: {source}")]
    Engine {
        step: Step,
        image: String,
        #[source]
        source: EngineError,
    },

    #[error("couldn't decode {step} of {image}: {source}")]
    Decode {
        step: Step,
        image: String,
        #[source]
        source: InspectDecodeError,
    },

    #[error("couldn't read directory structure from {image}: {source}")]
    Io {
        image: String,
        #[source]
        source: io::Error,
    },

    #[error("incomplete image facts: {0}")]
    Incomplete(#[from] FactsBuildError),

    #[error("extraction of {image} was cancelled")]
    Cancelled { image: String },
}

impl ExtractionError {
    /// Engine error underneath, if the failure came from the engine
    pub fn engine_error(&self) -> Option<&EngineError> {
        match self {
            ExtractionError::Pull { source, .. } | ExtractionError::Engine { source, .. } => {
                Some(source)
            }
            _ => None,
        }
    }

    /// Step that failed, if the pull succeeded
    pub fn step(&self) -> Option<Step> {
        match self {
            ExtractionError::Engine { step, .. } | ExtractionError::Decode { step, .. } => {
                Some(*step)
            }
            ExtractionError::Io { .. } => Some(Step::Licenses),
            _ => None,
        }
    }
}
