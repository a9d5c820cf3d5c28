//! # reddock Constants
//!
//! Well-known paths, file names and fixed command tables shared by the
//! catalog, the injector and the CLI. Every default that a user can
//! override (staging root, config path, runtime binary) starts here.
//!
//! ## Cross-References
//!
//! - [`crate::staging`]: Uses the staging layout names
//! - [`crate::catalog`]: Uses the recipe file names and base boot arguments
//! - [`crate::injector`]: Uses the container destination root
//! - [`crate::register`]: Uses the GSF database query

use std::time::Duration;

// =============================================================================
// Staging Layout
// =============================================================================
//
// <root>/
// ├── Dockerfile
// ├── .dockerignore
// ├── .work/
// │   ├── <addon>.lock
// │   └── <addon>/{download,extract}/
// └── <addon>/system/...
// =============================================================================

/// Default staging root shared by all add-ons and invocations.
///
/// **Rationale**: A fixed, well-known path lets `prepare` and a later
/// `inject` in a separate process find the same staged output.
pub const DEFAULT_STAGING_DIR: &str = "/tmp/reddock-addons";

/// Environment variable overriding the staging root.
pub const STAGING_DIR_ENV: &str = "REDDOCK_STAGING_DIR";

/// Scratch subdirectory for raw downloads and extracted trees.
///
/// Excluded from the build context via [`DOCKERIGNORE_CONTENTS`].
pub const WORK_DIR_NAME: &str = ".work";

/// Raw archive directory inside an add-on's work subtree.
pub const DOWNLOAD_DIR_NAME: &str = "download";

/// Extracted vendor tree directory inside an add-on's work subtree.
pub const EXTRACT_DIR_NAME: &str = "extract";

/// Suffix of the per-add-on lock file in the work directory.
pub const LOCK_FILE_SUFFIX: &str = ".lock";

/// Generated build recipe file name.
pub const DOCKERFILE_NAME: &str = "Dockerfile";

/// Build context ignore file name.
pub const DOCKERIGNORE_NAME: &str = ".dockerignore";

/// Keeps scratch archives out of the image build context.
pub const DOCKERIGNORE_CONTENTS: &str = ".work\n";

// =============================================================================
// Configuration
// =============================================================================

/// Directory under the user config dir holding reddock state.
pub const CONFIG_DIR_NAME: &str = "reddock";

/// Config file name.
pub const CONFIG_FILE_NAME: &str = "config.json";

/// Environment variable overriding the config file path.
pub const CONFIG_PATH_ENV: &str = "REDDOCK_CONFIG";

/// Environment variable forcing a container engine (`docker` or `podman`).
pub const RUNTIME_ENV: &str = "REDDOCK_RUNTIME";

/// Base image repository used when building custom images.
pub const BASE_IMAGE_REPOSITORY: &str = "redroid/redroid";

/// Returns the default base image for a platform version.
#[must_use]
pub fn default_base_image(version: &str) -> String {
    format!("{BASE_IMAGE_REPOSITORY}:{version}-latest")
}

/// Platform versions recognized when inferring a version from an image tag.
///
/// **Ordering**: Longer variants precede their prefixes so that
/// `13.0.0_64only` wins over `13.0.0`.
pub const KNOWN_IMAGE_VERSIONS: &[&str] = &[
    "8.1.0",
    "9.0.0",
    "10.0.0",
    "11.0.0_64only",
    "11.0.0",
    "12.0.0_64only",
    "12.0.0",
    "13.0.0_64only",
    "13.0.0",
    "14.0.0_64only",
    "14.0.0",
    "15.0.0_64only",
    "15.0.0",
    "16.0.0_64only",
    "16.0.0",
];

/// Characters accepted in image names (`NAMESPACE/REPOSITORY[:TAG]`).
pub const IMAGE_NAME_VALID_CHARS: &str = "abcdefghijklmnopqrstuvwxyz0123456789._-:/";

/// Validates an image name before handing it to the engine.
///
/// Uppercase letters and `HOST[:PORT]/` style characters such as `@` are
/// rejected; the engine would refuse them after a long build.
#[must_use = "validation result must be checked"]
pub fn validate_image_name(name: &str) -> std::result::Result<(), &'static str> {
    if name.is_empty() {
        return Err("image name cannot be empty");
    }
    if !name.chars().all(|c| IMAGE_NAME_VALID_CHARS.contains(c)) {
        return Err("use lowercase NAMESPACE/REPOSITORY[:TAG]");
    }
    Ok(())
}

// =============================================================================
// Boot Arguments
// =============================================================================

/// Boot arguments always present in the generated `CMD` directive.
pub const BASE_BOOT_ARGS: &[&str] = &["androidboot.redroid_gpu_mode=auto"];

// =============================================================================
// Injection
// =============================================================================

/// Destination root inside the container for staged entries.
pub const CONTAINER_ROOT: &str = "/";

/// Shell used to run permission repairs so globs expand inside the container.
pub const CONTAINER_SHELL: &str = "sh";

// =============================================================================
// Registration
// =============================================================================

/// GSF database holding the Android ID.
pub const GSF_DATABASE: &str = "/data/data/com.google.android.gsf/databases/gservices.db";

/// Query selecting the Android ID from the GSF database.
pub const ANDROID_ID_QUERY: &str = "select value from main where name = 'android_id';";

/// sqlite3 binaries tried in order.
pub const SQLITE_BINARIES: &[&str] = &["sqlite3", "/system/xbin/sqlite3"];

/// Page where the Android ID is registered.
pub const UNCERTIFIED_DEVICE_URL: &str = "https://www.google.com/android/uncertified/";

// =============================================================================
// Progress
// =============================================================================

/// Spinner redraw interval.
pub const SPINNER_INTERVAL: Duration = Duration::from_millis(100);

/// Spinner animation frames.
pub const SPINNER_FRAMES: &[&str] = &["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"];
