//! Error types for add-on acquisition, staging and injection.

use std::path::PathBuf;

/// Result type alias for reddock operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while resolving, staging or injecting add-ons.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    // =========================================================================
    // Resolution Errors
    // =========================================================================
    /// Add-on name is not in the catalog.
    #[error("addon not found: {0}")]
    AddonNotFound(String),

    /// Platform version is not in the add-on's supported set.
    #[error("{addon} does not support Android {version}")]
    VersionUnsupported { addon: String, version: String },

    /// Architecture has no source for the requested version.
    #[error("{addon} is not available for architecture {arch} on Android {version}")]
    ArchitectureUnsupported {
        addon: String,
        version: String,
        arch: String,
    },

    /// Architecture name could not be parsed.
    #[error("unknown architecture: {0}")]
    UnknownArch(String),

    // =========================================================================
    // Pipeline Errors
    // =========================================================================
    /// HTTP transfer failed.
    #[error("failed to download {url}: {reason}")]
    DownloadFailed { url: String, reason: String },

    /// Downloaded content does not match the manifest checksum.
    #[error("checksum mismatch for {path}: expected {expected}, got {actual}")]
    ChecksumMismatch {
        path: PathBuf,
        expected: String,
        actual: String,
    },

    /// Archive is malformed or could not be unpacked.
    #[error("failed to extract {archive}: {reason}")]
    ExtractFailed { archive: PathBuf, reason: String },

    /// Vendor tree could not be placed into the staged output.
    #[error("failed to stage {addon}: {reason}")]
    StagingFailed { addon: String, reason: String },

    /// Another process holds the add-on's staging lock.
    #[error("staging directory for {addon} is locked by another process")]
    StagingLocked { addon: String },

    /// Preparation wrapper used by the catalog.
    #[error("failed to prepare {addon}: {source}")]
    PreparationFailed {
        addon: String,
        #[source]
        source: Box<Error>,
    },

    // =========================================================================
    // Container Errors
    // =========================================================================
    /// Container does not exist.
    #[error("container not found: {0}")]
    ContainerNotFound(String),

    /// Container exists but is not in the running state.
    #[error("container '{name}' is not running (status: {status})")]
    ContainerNotRunning { name: String, status: String },

    /// Copying staged files into the container failed.
    #[error("failed to copy {path} into container '{container}': {reason}")]
    TransferFailed {
        container: String,
        path: PathBuf,
        reason: String,
    },

    /// Container engine command failed.
    #[error("'{command}' failed: {reason}")]
    RuntimeCommandFailed { command: String, reason: String },

    /// Image build failed; output is the engine's combined output.
    #[error("failed to build image '{image}':\n{output}")]
    BuildFailed { image: String, output: String },

    /// Image name contains characters the engine will reject.
    #[error("invalid image name '{name}': {reason}")]
    InvalidImageName { name: String, reason: String },

    /// GSF database did not yield an Android ID.
    #[error("android id not found in container '{0}'")]
    AndroidIdUnavailable(String),

    // =========================================================================
    // Configuration Errors
    // =========================================================================
    /// Config file could not be read, parsed or written.
    #[error("config error at {path}: {reason}")]
    Config { path: PathBuf, reason: String },

    // =========================================================================
    // Generic Errors
    // =========================================================================
    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Returns true for the "not available" family of resolution errors.
    #[must_use]
    pub fn is_unsupported(&self) -> bool {
        matches!(
            self,
            Self::VersionUnsupported { .. } | Self::ArchitectureUnsupported { .. }
        )
    }

    /// Returns the innermost error, unwrapping preparation wrappers.
    #[must_use]
    pub fn root_cause(&self) -> &Error {
        match self {
            Self::PreparationFailed { source, .. } => source.root_cause(),
            other => other,
        }
    }
}
