//! OpenGapps (pico) Google apps suite for Android 11.
//!
//! The zip holds a `Core/` directory of lzip-compressed tarballs, one per
//! package. Each package is unpacked into a fresh scratch directory and
//! classified:
//!
//! - **application packages** descend `<app>/<dpi>/<priv>/` and each payload
//!   entry lands in `system/priv-app/<entry>`,
//! - **common packages** copy every `<pkg>/common/<dir>` to `system/<dir>`.
//!
//! Packages matching the denylist are skipped.

use super::{
    Addon, AddonCategory, AddonContext, AddonDescriptor, GAPPS_PERMISSION_REPAIRS, Source,
    SourceManifest, fresh_output, place, staging_error,
};
use crate::archive::{self, Compression};
use crate::error::{Error, Result};
use crate::platform::Arch;
use crate::progress::Progress;
use crate::staging::reset_dir;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tracing::debug;

const ID: &str = "opengapps";

const DESCRIPTOR: AddonDescriptor = AddonDescriptor {
    id: ID,
    name: "OpenGapps",
    category: AddonCategory::GoogleApps,
    versions: &["11.0.0"],
};

const SOURCES: &[(Arch, Source)] = &[
    (
        Arch::X86_64,
        Source::new(
            "https://sourceforge.net/projects/opengapps/files/x86_64/20220503/open_gapps-x86_64-11.0-pico-20220503.zip",
            "5a6d242be34ad1acf92899c7732afa1b",
        ),
    ),
    (
        Arch::X86,
        Source::new(
            "https://sourceforge.net/projects/opengapps/files/x86/20220503/open_gapps-x86-11.0-pico-20220503.zip",
            "efda4943076016d00b40e0874b12ddd3",
        ),
    ),
    (
        Arch::Arm64,
        Source::new(
            "https://sourceforge.net/projects/opengapps/files/arm64/20220503/open_gapps-arm64-11.0-pico-20220503.zip",
            "67e927e4943757f418e4f934825cf987",
        ),
    ),
    (
        Arch::Arm,
        Source::new(
            "https://sourceforge.net/projects/opengapps/files/arm/20220215/open_gapps-arm-11.0-pico-20220215.zip",
            "8719519fa32ae83a62621c6056d32814",
        ),
    ),
];

/// Packages whose payload lives under `common/` rather than a priv-app tree.
pub const COMMON_PACKAGES: &[&str] = &[
    "defaultetc-common.tar.lz",
    "defaultframework-common.tar.lz",
    "googlepixelconfig-common.tar.lz",
    "vending-common.tar.lz",
];

/// Substrings of package names that are never staged.
pub const DENYLIST: &[&str] = &["setupwizarddefault-x86_64.tar.lz", "setupwizardtablet-x86_64.tar.lz"];

const ARCHIVE_FILE: &str = "opengapps.zip";
const CORE_DIR: &str = "Core";
const UNPACK_DIR: &str = "appunpack";

/// OpenGapps add-on.
#[derive(Debug, Clone, Copy, Default)]
pub struct OpenGapps;

impl OpenGapps {
    /// True when a package name matches a denylist entry.
    pub fn is_denied(package: &str) -> bool {
        DENYLIST.iter().any(|d| package.contains(d))
    }

    /// True for packages staged from their `common/` tree.
    pub fn is_common(package: &str) -> bool {
        COMMON_PACKAGES.contains(&package)
    }
}

/// First entry of a directory in name order, `None` when empty or unreadable.
fn first_entry(dir: &Path) -> Option<PathBuf> {
    archive::read_dir_sorted(dir).ok()?.into_iter().next()
}

fn stage_application(progress: &Progress, package: &str, unpack: &Path, out: &Path) -> Result<()> {
    let Some(payload) = first_entry(unpack)
        .and_then(|app| first_entry(&app))
        .and_then(|dpi| first_entry(&dpi))
    else {
        progress.warning(format!("{package}: unexpected layout, no <app>/<dpi>/<priv> tree; skipped"));
        return Ok(());
    };

    let entries = archive::read_dir_sorted(&payload).map_err(staging_error(ID))?;
    let priv_app = out.join("system").join("priv-app");
    for entry in entries {
        let Some(name) = entry.file_name() else { continue };
        debug!("{}: staging {}", package, name.to_string_lossy());
        place(ID, &entry, &priv_app.join(name))?;
    }
    Ok(())
}

fn stage_common(progress: &Progress, package: &str, unpack: &Path, out: &Path) -> Result<()> {
    let Some(common) = first_entry(unpack).map(|pkg| pkg.join("common")).filter(|c| c.is_dir()) else {
        progress.warning(format!("{package}: unexpected layout, no common/ tree; skipped"));
        return Ok(());
    };

    let system = out.join("system");
    for entry in archive::read_dir_sorted(&common).map_err(staging_error(ID))? {
        let Some(name) = entry.file_name() else { continue };
        place(ID, &entry, &system.join(name))?;
    }
    Ok(())
}

/// Stages every package under `core` into `<output_dir>/opengapps`.
///
/// Each package is unpacked by `unpack_package` into `unpack`, which is
/// emptied first.
fn stage_core(
    progress: &Progress,
    core: &Path,
    unpack: &Path,
    output_dir: &Path,
    mut unpack_package: impl FnMut(&Path, &Path) -> Result<()>,
) -> Result<()> {
    let packages = archive::read_dir_sorted(core).map_err(|e| Error::StagingFailed {
        addon: ID.to_string(),
        reason: format!("failed to read {}: {e}", core.display()),
    })?;

    let out = fresh_output(ID, output_dir)?;

    for package_path in packages {
        let Some(package) = package_path.file_name().map(|n| n.to_string_lossy().into_owned()) else {
            continue;
        };

        if OpenGapps::is_denied(&package) {
            debug!("Skipping denylisted package {}", package);
            continue;
        }

        reset_dir(unpack).map_err(staging_error(ID))?;
        unpack_package(&package_path, unpack)?;

        if OpenGapps::is_common(&package) {
            progress.status(format!("Processing extra package: {package}"));
            stage_common(progress, &package, unpack, &out)?;
        } else {
            progress.status(format!("Processing app package: {package}"));
            stage_application(progress, &package, unpack, &out)?;
        }
    }

    Ok(())
}

#[async_trait]
impl Addon for OpenGapps {
    fn descriptor(&self) -> &AddonDescriptor {
        &DESCRIPTOR
    }

    fn manifest(&self) -> SourceManifest {
        SourceManifest::PerArch(SOURCES)
    }

    async fn download(&self, ctx: &AddonContext, version: &str, arch: Arch) -> Result<()> {
        let source = self.resolve(version, arch)?;
        ctx.progress().status(format!("Downloading OpenGapps for Android {version} ({arch})"));
        ctx.fetch(ID, &source, ARCHIVE_FILE).await?;
        Ok(())
    }

    async fn extract(&self, ctx: &AddonContext, _version: &str, _arch: Arch) -> Result<()> {
        ctx.progress().status("Extracting OpenGapps archive");
        archive::extract_zip(
            &ctx.staging().download_dir(ID).join(ARCHIVE_FILE),
            &ctx.staging().extract_dir(ID),
        )
    }

    async fn stage(&self, ctx: &AddonContext, _version: &str, _arch: Arch, output_dir: &Path) -> Result<()> {
        let extract = ctx.staging().extract_dir(ID);
        stage_core(
            ctx.progress(),
            &extract.join(CORE_DIR),
            &extract.join(UNPACK_DIR),
            output_dir,
            |package, dest| archive::extract_tar(package, dest, Compression::Lzip),
        )
    }

    fn permission_repairs(&self) -> &'static [&'static str] {
        GAPPS_PERMISSION_REPAIRS
    }
}
