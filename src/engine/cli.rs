//! docker/podman backed engine.

use std::path::{Path, PathBuf};
use std::process::{Output, Stdio};
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::{debug, warn};

use super::{ContainerEngine, EngineError, ExportedFs};
use crate::config::EngineConfig;
use crate::models::Builder;

/// stderr fragments that mean an image reference does not exist
const NOT_FOUND_MARKERS: &[&str] = &[
    "repo not found",
    "manifest unknown",
    "name unknown",
    "repository does not exist",
    "no such image",
    "image not known",
];

/// Prefix of the directories an image filesystem is copied into
const EXPORT_DIR_PREFIX: &str = "opcert-fs-";

/// Runs the configured engine binary as a subprocess.
///
/// Every invocation is bounded by `timeout`; a child that overruns it is
/// killed when its future is dropped.
#[derive(Debug, Clone)]
pub struct CliEngine {
    builder: Builder,
    program: PathBuf,
    timeout: Duration,
    scratch_dir: Option<PathBuf>,
}

impl CliEngine {
    pub fn new(builder: Builder, timeout: Duration) -> Self {
        Self {
            builder,
            program: PathBuf::from(builder.binary()),
            timeout,
            scratch_dir: None,
        }
    }

    pub fn from_config(config: &EngineConfig) -> Self {
        let engine = Self::new(config.builder, Duration::from_secs(config.timeout_secs));
        match &config.scratch_dir {
            Some(dir) => engine.with_scratch_dir(dir),
            None => engine,
        }
    }

    /// Run `program` instead of looking the builder's binary up on `PATH`
    pub fn with_program(mut self, program: impl Into<PathBuf>) -> Self {
        self.program = program.into();
        self
    }

    /// Parent directory for exported filesystems (system temp dir otherwise)
    pub fn with_scratch_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.scratch_dir = Some(dir.into());
        self
    }

    fn describe(&self, args: &[&str]) -> String {
        format!("{} {}", self.program.display(), args.join(" "))
    }

    fn export_dir(&self) -> std::io::Result<tempfile::TempDir> {
        let mut builder = tempfile::Builder::new();
        builder.prefix(EXPORT_DIR_PREFIX);
        match &self.scratch_dir {
            Some(parent) => builder.tempdir_in(parent),
            None => builder.tempdir(),
        }
    }

    async fn run(&self, args: &[&str]) -> Result<Output, EngineError> {
        let command = self.describe(args);
        debug!(command = %command, "Running engine command");

        let child = Command::new(&self.program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| EngineError::Spawn {
                command: command.clone(),
                source,
            })?;

        match tokio::time::timeout(self.timeout, child.wait_with_output()).await {
            Ok(Ok(output)) => Ok(output),
            Ok(Err(source)) => Err(EngineError::Spawn { command, source }),
            Err(_) => Err(EngineError::Timeout {
                command,
                timeout: self.timeout,
            }),
        }
    }

    /// Run and require a zero exit status, returning stdout.
    ///
    /// `image` names the reference the command resolves; only then can a
    /// failure be reported as [`EngineError::NotFound`].
    async fn run_checked(&self, image: Option<&str>, args: &[&str]) -> Result<Vec<u8>, EngineError> {
        let output = self.run(args).await?;
        if output.status.success() {
            return Ok(output.stdout);
        }

        let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
        Err(classify_failure(
            image,
            self.describe(args),
            output.status.to_string(),
            stderr,
        ))
    }
}

fn classify_failure(
    image: Option<&str>,
    command: String,
    status: String,
    stderr: String,
) -> EngineError {
    if let Some(image) = image {
        let lowered = stderr.to_lowercase();
        if NOT_FOUND_MARKERS.iter().any(|m| lowered.contains(m)) {
            return EngineError::NotFound {
                image: image.to_string(),
            };
        }
    }
    EngineError::Unexpected {
        command,
        status,
        stderr,
    }
}

/// Removes a created container when dropped unless already removed.
struct ContainerGuard {
    program: PathBuf,
    id: Option<String>,
}

impl ContainerGuard {
    fn new(program: &Path, id: String) -> Self {
        Self {
            program: program.to_path_buf(),
            id: Some(id),
        }
    }

    fn id(&self) -> &str {
        self.id.as_deref().unwrap_or_default()
    }

    async fn remove(mut self, engine: &CliEngine) {
        if let Some(id) = self.id.take()
            && let Err(e) = engine.run_checked(None, &["rm", "-f", &id]).await
        {
            warn!(container = %id, error = %e, "Failed to remove temporary container");
        }
    }
}

impl Drop for ContainerGuard {
    fn drop(&mut self) {
        // Reached only when the export future was dropped mid-flight.
        if let Some(id) = self.id.take() {
            let spawned = std::process::Command::new(&self.program)
                .args(["rm", "-f", id.as_str()])
                .stdin(Stdio::null())
                .stdout(Stdio::null())
                .stderr(Stdio::null())
                .spawn();
            if let Err(e) = spawned {
                warn!(container = %id, error = %e, "Failed to schedule container removal");
            }
        }
    }
}

#[async_trait]
impl ContainerEngine for CliEngine {
    fn builder(&self) -> Builder {
        self.builder
    }

    async fn pull(&self, reference: &str) -> Result<(), EngineError> {
        self.run_checked(Some(reference), &["pull", reference]).await?;
        Ok(())
    }

    async fn inspect(&self, reference: &str) -> Result<serde_json::Value, EngineError> {
        let args = ["image", "inspect", reference];
        let stdout = self.run_checked(Some(reference), &args).await?;
        serde_json::from_slice(&stdout).map_err(|e| EngineError::Malformed {
            command: self.describe(&args),
            message: e.to_string(),
        })
    }

    async fn list_tags(&self, reference: &str) -> Result<Vec<String>, EngineError> {
        let args = ["image", "inspect", "--format", "{{json .RepoTags}}", reference];
        let stdout = self.run_checked(Some(reference), &args).await?;
        let tags: Option<Vec<String>> =
            serde_json::from_slice(&stdout).map_err(|e| EngineError::Malformed {
                command: self.describe(&args),
                message: e.to_string(),
            })?;
        Ok(tags.unwrap_or_default())
    }

    async fn export_filesystem(&self, reference: &str) -> Result<ExportedFs, EngineError> {
        let stdout = self
            .run_checked(Some(reference), &["create", reference])
            .await?;
        let id = String::from_utf8_lossy(&stdout)
            .lines()
            .last()
            .map(|l| l.trim().to_string())
            .filter(|l| !l.is_empty())
            .ok_or_else(|| EngineError::Malformed {
                command: self.describe(&["create", reference]),
                message: "no container id printed".to_string(),
            })?;
        let container = ContainerGuard::new(&self.program, id);

        let dir = match self.export_dir() {
            Ok(dir) => dir,
            Err(source) => {
                container.remove(self).await;
                return Err(EngineError::Spawn {
                    command: "create temporary directory".to_string(),
                    source,
                });
            }
        };

        let source = format!("{}:/.", container.id());
        let dest = dir.path().to_string_lossy().to_string();
        let copied = self.run_checked(None, &["cp", &source, &dest]).await;
        container.remove(self).await;
        copied?;

        debug!(image = %reference, path = %dir.path().display(), "Materialized image filesystem");
        Ok(ExportedFs::new(dir))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::EngineErrorKind;

    #[test]
    fn test_classify_repo_not_found() {
        let err = classify_failure(
            Some("quay.io/acme/missing:1.0"),
            "docker pull quay.io/acme/missing:1.0".into(),
            "exit status: 1".into(),
            "Error response from daemon: Repo not found".into(),
        );
        assert!(matches!(err, EngineError::NotFound { image } if image == "quay.io/acme/missing:1.0"));
    }

    #[test]
    fn test_classify_manifest_unknown() {
        let err = classify_failure(
            Some("quay.io/acme/app:nope"),
            "podman pull quay.io/acme/app:nope".into(),
            "exit status: 125".into(),
            "Error: initializing source: reading manifest nope: manifest unknown".into(),
        );
        assert!(matches!(err, EngineError::NotFound { .. }));
    }

    #[test]
    fn test_classify_other_failure() {
        let err = classify_failure(
            Some("quay.io/acme/app:1.0"),
            "docker pull quay.io/acme/app:1.0".into(),
            "exit status: 1".into(),
            "dial tcp: connection refused".into(),
        );
        match err {
            EngineError::Unexpected { stderr, status, .. } => {
                assert_eq!(stderr, "dial tcp: connection refused");
                assert_eq!(status, "exit status: 1");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_classify_without_image_is_unexpected() {
        let err = classify_failure(
            None,
            "podman rm -f abc123".into(),
            "exit status: 1".into(),
            "Error: no such image or container: abc123".into(),
        );
        assert_eq!(err.kind(), EngineErrorKind::Unexpected);
    }

    #[test]
    fn test_generic_not_found_is_unexpected() {
        let err = classify_failure(
            Some("quay.io/acme/app:1.0"),
            "podman pull quay.io/acme/app:1.0".into(),
            "exit status: 125".into(),
            "Error: credential helper not found".into(),
        );
        assert_eq!(err.kind(), EngineErrorKind::Unexpected);
    }

    #[test]
    fn test_describe_uses_configured_builder() {
        let engine = CliEngine::new(Builder::Podman, Duration::from_secs(1));
        assert_eq!(engine.describe(&["pull", "ubi8"]), "podman pull ubi8");
        assert_eq!(engine.builder(), Builder::Podman);
    }

    #[tokio::test]
    async fn test_missing_program_is_spawn_error() {
        let engine = CliEngine::new(Builder::Podman, Duration::from_secs(5))
            .with_program("/nonexistent/opcert/podman");
        let err = engine.pull("ubi8").await.unwrap_err();
        assert!(matches!(err, EngineError::Spawn { .. }));
    }

    #[cfg(unix)]
    mod subprocess {
        use super::*;
        use std::os::unix::fs::PermissionsExt;
        use std::time::Instant;

        const IMAGE: &str = "quay.io/acme/app:1.0";

        /// Write an executable shell script standing in for the engine binary
        fn fake_engine(dir: &Path, body: &str) -> PathBuf {
            let path = dir.join("podman");
            std::fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
            std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
            path
        }

        fn scripted(program: PathBuf, timeout: Duration) -> CliEngine {
            CliEngine::new(Builder::Podman, timeout).with_program(program)
        }

        #[tokio::test]
        async fn test_hung_command_times_out() {
            let bin = tempfile::tempdir().unwrap();
            let engine = scripted(
                fake_engine(bin.path(), "exec sleep 30"),
                Duration::from_millis(300),
            );

            let started = Instant::now();
            let err = engine.pull(IMAGE).await.unwrap_err();

            assert_eq!(err.kind(), EngineErrorKind::Timeout);
            assert!(started.elapsed() < Duration::from_secs(10));
        }

        #[tokio::test]
        async fn test_manifest_unknown_is_not_found() {
            let bin = tempfile::tempdir().unwrap();
            let engine = scripted(
                fake_engine(
                    bin.path(),
                    "echo 'Error: reading manifest 1.0 in quay.io/acme/app: manifest unknown' >&2\nexit 125",
                ),
                Duration::from_secs(10),
            );

            let err = engine.pull(IMAGE).await.unwrap_err();
            assert!(matches!(err, EngineError::NotFound { image } if image == IMAGE));
        }

        #[tokio::test]
        async fn test_other_stderr_is_unexpected() {
            let bin = tempfile::tempdir().unwrap();
            let engine = scripted(
                fake_engine(bin.path(), "echo 'dial tcp: connection refused' >&2\nexit 125"),
                Duration::from_secs(10),
            );

            match engine.pull(IMAGE).await.unwrap_err() {
                EngineError::Unexpected { stderr, command, .. } => {
                    assert_eq!(stderr, "dial tcp: connection refused");
                    assert!(command.ends_with(&format!("pull {IMAGE}")));
                }
                other => panic!("unexpected error: {other:?}"),
            }
        }

        #[tokio::test]
        async fn test_list_tags_reads_repo_tags() {
            let bin = tempfile::tempdir().unwrap();
            let engine = scripted(
                fake_engine(bin.path(), r#"echo '["quay.io/acme/app:1.0","quay.io/acme/app:latest"]'"#),
                Duration::from_secs(10),
            );
            assert_eq!(
                engine.list_tags(IMAGE).await.unwrap(),
                vec!["quay.io/acme/app:1.0", "quay.io/acme/app:latest"]
            );

            let untagged = tempfile::tempdir().unwrap();
            let engine = scripted(fake_engine(untagged.path(), "echo null"), Duration::from_secs(10));
            assert!(engine.list_tags(IMAGE).await.unwrap().is_empty());
        }

        /// Script that logs every invocation, creates container `abc123`
        /// and handles `cp` with `cp_body`
        fn logging_engine(dir: &Path, cp_body: &str) -> (PathBuf, PathBuf) {
            let log = dir.join("calls.log");
            let body = format!(
                "echo \"$*\" >> '{}'\ncase \"$1\" in\n  create) echo abc123 ;;\n  cp) {cp_body} ;;\nesac",
                log.display()
            );
            (fake_engine(dir, &body), log)
        }

        fn scratch_entries(dir: &Path) -> Vec<String> {
            std::fs::read_dir(dir)
                .unwrap()
                .map(|e| e.unwrap().file_name().to_string_lossy().to_string())
                .filter(|name| name.starts_with(EXPORT_DIR_PREFIX))
                .collect()
        }

        #[tokio::test]
        async fn test_failed_copy_removes_container_and_directory() {
            let bin = tempfile::tempdir().unwrap();
            let scratch = tempfile::tempdir().unwrap();
            let (program, log) = logging_engine(bin.path(), "echo 'Error: copy failed' >&2; exit 1");
            let engine = scripted(program, Duration::from_secs(10)).with_scratch_dir(scratch.path());

            let err = engine.export_filesystem(IMAGE).await.unwrap_err();
            assert_eq!(err.kind(), EngineErrorKind::Unexpected);

            let calls = std::fs::read_to_string(&log).unwrap();
            assert!(calls.lines().any(|l| l == format!("create {IMAGE}")));
            assert!(calls.lines().any(|l| l.starts_with("cp abc123:/. ")));
            assert_eq!(calls.lines().last(), Some("rm -f abc123"));
            assert!(scratch_entries(scratch.path()).is_empty());
        }

        #[tokio::test]
        async fn test_export_copies_then_removes_container() {
            let bin = tempfile::tempdir().unwrap();
            let scratch = tempfile::tempdir().unwrap();
            let (program, log) = logging_engine(bin.path(), "mkdir -p \"$3/licenses\"");
            let engine = scripted(program, Duration::from_secs(10)).with_scratch_dir(scratch.path());

            let exported = engine.export_filesystem(IMAGE).await.unwrap();
            assert!(exported.path().starts_with(scratch.path()));
            assert!(exported.has_top_level_dir("licenses").await.unwrap());

            let calls = std::fs::read_to_string(&log).unwrap();
            assert_eq!(calls.lines().last(), Some("rm -f abc123"));

            exported.close().unwrap();
            assert!(scratch_entries(scratch.path()).is_empty());
        }
    }
}
