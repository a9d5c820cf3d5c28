//! Container engine abstraction.
//!
//! The add-on pipeline needs a handful of engine operations:
//! - `pull_image`: fetch the base image for a build
//! - `status` / `is_running`: liveness check before injection
//! - `exec`: permission repairs and database queries inside a container
//! - `copy_into`: transfer staged files into a container
//! - `build` / `push`: bake a recipe into an image and publish it
//!
//! [`CliRuntime`] implements them by driving the `docker` or `podman`
//! command line. Tests substitute in-memory fakes.

use crate::constants::RUNTIME_ENV;
use crate::error::{Error, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::ffi::OsStr;
use std::path::Path;
use tokio::process::Command;
use tracing::{debug, info};

// =============================================================================
// Container Status
// =============================================================================

/// Engine-reported container status (`.State.Status`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContainerStatus {
    Created,
    Running,
    Paused,
    Restarting,
    Removing,
    Exited,
    Dead,
    /// Status string the engine reported but this crate does not know.
    Unknown,
}

impl ContainerStatus {
    /// Parses an engine status string.
    pub fn parse(s: &str) -> Self {
        match s.trim().to_ascii_lowercase().as_str() {
            "created" | "configured" | "initialized" => Self::Created,
            "running" => Self::Running,
            "paused" => Self::Paused,
            "restarting" => Self::Restarting,
            "removing" => Self::Removing,
            "exited" | "stopped" => Self::Exited,
            "dead" => Self::Dead,
            _ => Self::Unknown,
        }
    }
}

impl std::fmt::Display for ContainerStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Created => write!(f, "created"),
            Self::Running => write!(f, "running"),
            Self::Paused => write!(f, "paused"),
            Self::Restarting => write!(f, "restarting"),
            Self::Removing => write!(f, "removing"),
            Self::Exited => write!(f, "exited"),
            Self::Dead => write!(f, "dead"),
            Self::Unknown => write!(f, "unknown"),
        }
    }
}

// =============================================================================
// Exec Result
// =============================================================================

/// Captured output of an engine command.
#[derive(Debug, Clone, Default)]
pub struct ExecResult {
    /// Exit code of the command (-1 when killed by a signal).
    pub exit_code: i32,
    /// Standard output.
    pub stdout: Vec<u8>,
    /// Standard error.
    pub stderr: Vec<u8>,
}

impl ExecResult {
    /// Creates a successful result with the given stdout.
    pub fn success(stdout: impl Into<Vec<u8>>) -> Self {
        Self {
            exit_code: 0,
            stdout: stdout.into(),
            stderr: Vec::new(),
        }
    }

    /// Creates a failed result with the given stderr.
    pub fn failure(exit_code: i32, stderr: impl Into<Vec<u8>>) -> Self {
        Self {
            exit_code,
            stdout: Vec::new(),
            stderr: stderr.into(),
        }
    }

    /// Returns true if the command succeeded (exit code 0).
    pub fn is_success(&self) -> bool {
        self.exit_code == 0
    }

    /// Stdout as trimmed UTF-8 (lossy).
    pub fn stdout_str(&self) -> String {
        String::from_utf8_lossy(&self.stdout).trim().to_string()
    }

    /// Stdout followed by stderr, verbatim.
    pub fn combined_output(&self) -> String {
        let mut out = String::from_utf8_lossy(&self.stdout).into_owned();
        out.push_str(&String::from_utf8_lossy(&self.stderr));
        out
    }
}

// =============================================================================
// Container Runtime Trait
// =============================================================================

/// Container engine operations used by the catalog and the injector.
#[async_trait]
pub trait ContainerRuntime: Send + Sync {
    /// Engine name, e.g. `docker`.
    fn name(&self) -> &str;

    /// Pulls an image.
    async fn pull_image(&self, reference: &str) -> Result<()>;

    /// Reports a container's status. Fails with
    /// [`Error::ContainerNotFound`] when the container does not exist.
    async fn status(&self, container: &str) -> Result<ContainerStatus>;

    /// True only when the container exists and is running.
    async fn is_running(&self, container: &str) -> bool {
        matches!(self.status(container).await, Ok(ContainerStatus::Running))
    }

    /// Runs `argv` inside a container.
    async fn exec(&self, container: &str, argv: &[&str]) -> Result<ExecResult>;

    /// Copies a host file or directory to `dest` inside a container.
    async fn copy_into(&self, container: &str, host_path: &Path, dest: &str) -> Result<()>;

    /// Builds `context_dir` (containing a Dockerfile) into `tag`.
    ///
    /// A non-zero exit is returned as an [`ExecResult`], not an error, so
    /// callers can surface the combined output.
    async fn build(&self, tag: &str, context_dir: &Path) -> Result<ExecResult>;

    /// Pushes an image to its registry.
    async fn push(&self, image: &str) -> Result<()>;
}

// =============================================================================
// CLI Runtime
// =============================================================================

/// Runtime backed by the `docker` or `podman` binary.
#[derive(Debug, Clone)]
pub struct CliRuntime {
    binary: String,
}

impl CliRuntime {
    /// Runtime driving the given binary.
    pub fn new(binary: impl Into<String>) -> Self {
        Self { binary: binary.into() }
    }

    pub fn docker() -> Self {
        Self::new("docker")
    }

    pub fn podman() -> Self {
        Self::new("podman")
    }

    /// Picks an engine: `REDDOCK_RUNTIME` if set, else podman when
    /// `podman ps` works, else docker.
    pub async fn detect() -> Self {
        if let Ok(binary) = std::env::var(RUNTIME_ENV)
            && !binary.is_empty()
        {
            return Self::new(binary);
        }

        if which::which("podman").is_ok() {
            let usable = Command::new("podman")
                .arg("ps")
                .output()
                .await
                .is_ok_and(|o| o.status.success());
            if usable {
                debug!("Using podman");
                return Self::podman();
            }
        }

        debug!("Using docker");
        Self::docker()
    }

    /// Command handle for an engine subcommand.
    pub fn command<I, S>(&self, args: I) -> Command
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        let mut cmd = Command::new(&self.binary);
        cmd.args(args);
        cmd.kill_on_drop(true);
        cmd
    }

    /// Runs an engine command and captures its output.
    async fn run<I, S>(&self, args: I) -> Result<ExecResult>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        let args: Vec<_> = args.into_iter().map(|a| a.as_ref().to_os_string()).collect();
        let described = self.describe(&args);
        debug!("Running {}", described);

        let output = self
            .command(&args)
            .output()
            .await
            .map_err(|e| Error::RuntimeCommandFailed {
                command: described,
                reason: e.to_string(),
            })?;

        Ok(ExecResult {
            exit_code: output.status.code().unwrap_or(-1),
            stdout: output.stdout,
            stderr: output.stderr,
        })
    }

    /// Runs an engine command, failing on a non-zero exit.
    async fn run_checked<I, S>(&self, args: I) -> Result<ExecResult>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        let args: Vec<_> = args.into_iter().map(|a| a.as_ref().to_os_string()).collect();
        let result = self.run(&args).await?;
        if !result.is_success() {
            return Err(Error::RuntimeCommandFailed {
                command: self.describe(&args),
                reason: result.combined_output().trim().to_string(),
            });
        }
        Ok(result)
    }

    fn describe(&self, args: &[std::ffi::OsString]) -> String {
        let mut parts = vec![self.binary.clone()];
        parts.extend(args.iter().map(|a| a.to_string_lossy().into_owned()));
        parts.join(" ")
    }
}

#[async_trait]
impl ContainerRuntime for CliRuntime {
    fn name(&self) -> &str {
        &self.binary
    }

    async fn pull_image(&self, reference: &str) -> Result<()> {
        info!("Pulling {}", reference);
        self.run_checked(["pull", reference]).await?;
        Ok(())
    }

    async fn status(&self, container: &str) -> Result<ContainerStatus> {
        let result = self
            .run(["inspect", "-f", "{{.State.Status}}", container])
            .await?;
        if !result.is_success() {
            return Err(Error::ContainerNotFound(container.to_string()));
        }
        Ok(ContainerStatus::parse(&result.stdout_str()))
    }

    async fn exec(&self, container: &str, argv: &[&str]) -> Result<ExecResult> {
        let mut args = vec!["exec", container];
        args.extend_from_slice(argv);
        self.run(args).await
    }

    async fn copy_into(&self, container: &str, host_path: &Path, dest: &str) -> Result<()> {
        let target = format!("{container}:{dest}");
        self.run_checked([OsStr::new("cp"), host_path.as_os_str(), OsStr::new(&target)])
            .await?;
        Ok(())
    }

    async fn build(&self, tag: &str, context_dir: &Path) -> Result<ExecResult> {
        info!("Building {} from {}", tag, context_dir.display());
        self.run([OsStr::new("build"), OsStr::new("-t"), OsStr::new(tag), context_dir.as_os_str()])
            .await
    }

    async fn push(&self, image: &str) -> Result<()> {
        info!("Pushing {}", image);
        self.run_checked(["push", image]).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_parse() {
        assert_eq!(ContainerStatus::parse("running\n"), ContainerStatus::Running);
        assert_eq!(ContainerStatus::parse("exited"), ContainerStatus::Exited);
        assert_eq!(ContainerStatus::parse("weird"), ContainerStatus::Unknown);
    }

    #[test]
    fn test_combined_output_is_verbatim() {
        let result = ExecResult {
            exit_code: 1,
            stdout: b"step 1\n".to_vec(),
            stderr: b"error: boom\n".to_vec(),
        };
        assert_eq!(result.combined_output(), "step 1\nerror: boom\n");
        assert!(!result.is_success());
    }

    #[test]
    fn test_describe() {
        let runtime = CliRuntime::podman();
        let args = vec!["ps".into(), "-a".into()];
        assert_eq!(runtime.describe(&args), "podman ps -a");
    }
}
