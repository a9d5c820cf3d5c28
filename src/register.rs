//! Device registration helper.
//!
//! Google apps on an uncertified device only work after the device's GSF
//! Android ID has been registered by hand. This module reads that ID out of
//! a running container.

use crate::constants::{ANDROID_ID_QUERY, GSF_DATABASE, SQLITE_BINARIES, UNCERTIFIED_DEVICE_URL};
use crate::error::{Error, Result};
use crate::runtime::ContainerRuntime;
use tracing::debug;

/// Reads the GSF Android ID from a container's services database.
///
/// Each sqlite binary in [`SQLITE_BINARIES`] is tried in turn; the first
/// non-empty answer wins.
pub async fn android_id(runtime: &dyn ContainerRuntime, container: &str) -> Result<String> {
    for &binary in SQLITE_BINARIES {
        let result = runtime
            .exec(container, &[binary, GSF_DATABASE, ANDROID_ID_QUERY])
            .await?;

        if !result.is_success() {
            debug!(
                "{} failed in {}: {}",
                binary,
                container,
                result.combined_output().trim()
            );
            continue;
        }

        let id = result.stdout_str();
        if !id.is_empty() {
            return Ok(id);
        }
    }

    Err(Error::AndroidIdUnavailable(container.to_string()))
}

/// Operator instructions for registering an Android ID.
pub fn registration_instructions(android_id: &str) -> String {
    format!(
        "Android ID: {android_id}\n\
         \n\
         1. Open {UNCERTIFIED_DEVICE_URL}\n\
         2. Sign in with the Google account used on the device\n\
         3. Enter the Android ID above and register\n\
         4. Restart the container; registration can take a few minutes to apply"
    )
}
