//! Container engine capability.
//!
//! The extractor only talks to an engine through [`ContainerEngine`]. The
//! production implementation shells out to docker or podman ([`CliEngine`]);
//! tests provide in-memory fakes.

mod cli;
pub mod inspect;

pub use cli::CliEngine;
pub use inspect::{ImageConfig, ImageInspect, InspectDecodeError, RootFs};

use std::io;
use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use tempfile::TempDir;
use thiserror::Error;

use crate::models::Builder;

/// Broad classification of an engine failure
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineErrorKind {
    /// The engine reported a missing repository or image
    NotFound,
    /// The engine did not answer within the configured bound
    Timeout,
    /// Anything else
    Unexpected,
}

/// Errors from engine invocations
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("couldn't find repository for image {image}")]
    NotFound { image: String },

    #[error("`{command}` exited with {status}: {stderr}")]
    Unexpected {
        command: String,
        status: String,
        stderr: String,
    },

    #[error("`{command}` did not finish within {}s", timeout.as_secs())]
    Timeout { command: String, timeout: Duration },

    #[error("failed to run `{command}`: {source}")]
    Spawn {
        command: String,
        #[source]
        source: io::Error,
    },

    #[error("unreadable output from `{command}`: {message}")]
    Malformed { command: String, message: String },
}

impl EngineError {
    pub fn kind(&self) -> EngineErrorKind {
        match self {
            EngineError::NotFound { .. } => EngineErrorKind::NotFound,
            EngineError::Timeout { .. } => EngineErrorKind::Timeout,
            _ => EngineErrorKind::Unexpected,
        }
    }
}

/// An image filesystem materialized on disk.
///
/// The directory is removed when the handle is dropped, so every exit path
/// (including a cancelled future) cleans up after itself.
#[derive(Debug)]
pub struct ExportedFs {
    dir: TempDir,
}

impl ExportedFs {
    pub fn new(dir: TempDir) -> Self {
        Self { dir }
    }

    /// Root of the materialized filesystem
    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Whether the root holds a directory with exactly this name.
    /// Symlinks are not followed.
    pub async fn has_top_level_dir(&self, name: &str) -> io::Result<bool> {
        let mut entries = tokio::fs::read_dir(self.dir.path()).await?;
        while let Some(entry) = entries.next_entry().await? {
            if entry.file_name() == name && entry.file_type().await?.is_dir() {
                return Ok(true);
            }
        }
        Ok(false)
    }

    /// Remove the directory now and report failures instead of ignoring them
    pub fn close(self) -> io::Result<()> {
        self.dir.close()
    }
}

/// Operations the facts extractor needs from a container engine
#[async_trait]
pub trait ContainerEngine: Send + Sync {
    /// Engine the implementation drives
    fn builder(&self) -> Builder;

    /// Make the reference locally resolvable
    async fn pull(&self, reference: &str) -> Result<(), EngineError>;

    /// Raw `image inspect` payload
    async fn inspect(&self, reference: &str) -> Result<serde_json::Value, EngineError>;

    /// Every `repo:tag` currently pointing at the image
    async fn list_tags(&self, reference: &str) -> Result<Vec<String>, EngineError>;

    /// Materialize the image filesystem into a scoped temporary directory
    async fn export_filesystem(&self, reference: &str) -> Result<ExportedFs, EngineError>;
}
