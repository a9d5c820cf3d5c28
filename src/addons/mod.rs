//! # Add-on Contract
//!
//! Every vendor package implements [`Addon`]. The catalog and the injector
//! only ever see `Arc<dyn Addon>`, so five structurally different packages
//! (zip vs. nested tar, flat vs. four-level trees, per-arch vs. single
//! source) are driven identically:
//!
//! ```text
//! resolve(version, arch) ──► download ──► extract ──► stage ──► <root>/<id>/system/...
//!        │                     │            │           │
//!        └─ fails fast,        └──── each stage short-circuits the install ────┘
//!           no network
//! ```
//!
//! ## Shared State
//!
//! The only shared state is pure data ([`AddonDescriptor`]). Everything
//! environmental (transport, staging root, progress sink) is passed in an
//! [`AddonContext`] per call.
//!
//! ## Failure Policy
//!
//! Within one add-on's pipeline every failure is fatal and propagates
//! unchanged. Lenient policies live one level up, in the catalog (build
//! path) and the injector (batch injection and permission repair).

pub mod houdini;
pub mod litegapps;
pub mod mindthegapps;
pub mod ndk;
pub mod opengapps;

pub use houdini::Houdini;
pub use litegapps::LiteGapps;
pub use mindthegapps::MindTheGapps;
pub use ndk::NdkTranslation;
pub use opengapps::OpenGapps;

use crate::archive::{self, Transport};
use crate::error::{Error, Result};
use crate::platform::Arch;
use crate::progress::{PrepareState, Progress};
use crate::staging::{StagingLock, StagingRoot};
use async_trait::async_trait;
use std::fmt;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

// =============================================================================
// Descriptor Types
// =============================================================================

/// Add-on category. Display and filtering only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AddonCategory {
    /// Intel ARM translation (libhoudini).
    CpuTranslationA,
    /// Google ARM translation (libndk_translation).
    CpuTranslationB,
    GoogleApps,
    RootTool,
    DrmTool,
}

impl fmt::Display for AddonCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AddonCategory::CpuTranslationA => write!(f, "cpu-translation-a"),
            AddonCategory::CpuTranslationB => write!(f, "cpu-translation-b"),
            AddonCategory::GoogleApps => write!(f, "google-apps"),
            AddonCategory::RootTool => write!(f, "root-tool"),
            AddonCategory::DrmTool => write!(f, "drm-tool"),
        }
    }
}

/// Immutable identity of an add-on type.
#[derive(Debug, Clone)]
pub struct AddonDescriptor {
    /// Catalog key and staged subdirectory name.
    pub id: &'static str,
    /// Human-readable name.
    pub name: &'static str,
    pub category: AddonCategory,
    /// Exact-match platform version tokens, e.g. `13.0.0_64only`.
    pub versions: &'static [&'static str],
}

// =============================================================================
// Source Manifest
// =============================================================================

/// A remote archive and its recorded checksum.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Source {
    pub url: &'static str,
    /// Lowercase hex MD5; `None` when upstream publishes no checksum.
    pub md5: Option<&'static str>,
}

impl Source {
    pub const fn new(url: &'static str, md5: &'static str) -> Self {
        Self { url, md5: Some(md5) }
    }

    pub const fn unchecked(url: &'static str) -> Self {
        Self { url, md5: None }
    }

    /// Last path segment of the URL without its extension, e.g. the commit
    /// hash of a GitHub archive link.
    pub fn stem(&self) -> Option<&'static str> {
        let file = self.url.rsplit('/').next()?;
        let stem = file.split('.').next()?;
        (!stem.is_empty()).then_some(stem)
    }
}

/// Resolves `(version, arch)` to a [`Source`].
///
/// Absent combinations are errors, never a fallback URL.
#[derive(Debug, Clone, Copy)]
pub enum SourceManifest {
    /// Full version × architecture matrix.
    Matrix(&'static [(&'static str, &'static [(Arch, Source)])]),
    /// One source per version, valid for an architecture allow-list.
    PerVersion {
        sources: &'static [(&'static str, Source)],
        arches: &'static [Arch],
    },
    /// One source per architecture (single platform version).
    PerArch(&'static [(Arch, Source)]),
    /// A single version-independent source with an architecture allow-list.
    Single { source: Source, arches: &'static [Arch] },
}

impl SourceManifest {
    /// Looks up the source for a combination.
    pub fn resolve(&self, addon: &str, version: &str, arch: Arch) -> Result<Source> {
        let version_missing = || Error::VersionUnsupported {
            addon: addon.to_string(),
            version: version.to_string(),
        };
        let arch_missing = || Error::ArchitectureUnsupported {
            addon: addon.to_string(),
            version: version.to_string(),
            arch: arch.to_string(),
        };

        match self {
            SourceManifest::Matrix(rows) => {
                let (_, by_arch) = rows
                    .iter()
                    .find(|(v, _)| *v == version)
                    .ok_or_else(version_missing)?;
                by_arch
                    .iter()
                    .find(|(a, _)| *a == arch)
                    .map(|(_, s)| *s)
                    .ok_or_else(arch_missing)
            }
            SourceManifest::PerVersion { sources, arches } => {
                let (_, source) = sources
                    .iter()
                    .find(|(v, _)| *v == version)
                    .ok_or_else(version_missing)?;
                if !arches.contains(&arch) {
                    return Err(arch_missing());
                }
                Ok(*source)
            }
            SourceManifest::PerArch(by_arch) => by_arch
                .iter()
                .find(|(a, _)| *a == arch)
                .map(|(_, s)| *s)
                .ok_or_else(arch_missing),
            SourceManifest::Single { source, arches } => {
                if !arches.contains(&arch) {
                    return Err(arch_missing());
                }
                Ok(*source)
            }
        }
    }

    /// Versions with at least one entry, for manifest-shaped tables.
    pub fn versions(&self) -> Vec<&'static str> {
        match self {
            SourceManifest::Matrix(rows) => rows.iter().map(|(v, _)| *v).collect(),
            SourceManifest::PerVersion { sources, .. } => sources.iter().map(|(v, _)| *v).collect(),
            SourceManifest::PerArch(_) | SourceManifest::Single { .. } => Vec::new(),
        }
    }
}

// =============================================================================
// Pipeline Context
// =============================================================================

/// Environment an add-on pipeline runs in.
#[derive(Clone)]
pub struct AddonContext {
    transport: Arc<dyn Transport>,
    staging: StagingRoot,
    progress: Progress,
    verify_checksums: bool,
}

impl AddonContext {
    /// Creates a context with checksum verification enabled and no progress listener.
    pub fn new(transport: Arc<dyn Transport>, staging: StagingRoot) -> Self {
        Self {
            transport,
            staging,
            progress: Progress::silent(),
            verify_checksums: true,
        }
    }

    /// Enables or disables manifest checksum verification.
    pub fn with_verify_checksums(mut self, verify: bool) -> Self {
        self.verify_checksums = verify;
        self
    }

    /// Returns a copy reporting to another progress sink.
    pub fn with_progress(&self, progress: Progress) -> Self {
        Self {
            progress,
            ..self.clone()
        }
    }

    pub fn staging(&self) -> &StagingRoot {
        &self.staging
    }

    pub fn progress(&self) -> &Progress {
        &self.progress
    }

    pub fn verify_checksums(&self) -> bool {
        self.verify_checksums
    }

    /// Downloads a source into the add-on's download directory and verifies
    /// its checksum when one is recorded.
    pub async fn fetch(&self, addon: &str, source: &Source, file_name: &str) -> Result<PathBuf> {
        let dir = self.staging.download_dir(addon);
        std::fs::create_dir_all(&dir)?;
        let dest = dir.join(file_name);

        info!("Downloading {} for {}", source.url, addon);
        self.transport.fetch(source.url, &dest).await?;

        match source.md5 {
            Some(expected) if self.verify_checksums => {
                archive::verify_md5(&dest, expected)?;
                debug!("Checksum verified for {}", dest.display());
            }
            Some(_) => debug!("Checksum verification disabled for {}", dest.display()),
            None => debug!("No checksum recorded for {}", source.url),
        }

        Ok(dest)
    }
}

/// Maps an I/O failure during placement to [`Error::StagingFailed`].
pub(crate) fn staging_error(addon: &str) -> impl Fn(io::Error) -> Error + '_ {
    move |e| Error::StagingFailed {
        addon: addon.to_string(),
        reason: e.to_string(),
    }
}

/// Copies a vendor subtree into the staged output, failing with
/// [`Error::StagingFailed`] when the expected layout is missing.
pub(crate) fn place(addon: &str, src: &Path, dst: &Path) -> Result<()> {
    if !src.exists() {
        return Err(Error::StagingFailed {
            addon: addon.to_string(),
            reason: format!("expected {} in extracted archive", src.display()),
        });
    }
    archive::copy_tree(src, dst).map_err(staging_error(addon))
}

/// Recreates `<output_dir>/<addon>` empty and returns it.
pub(crate) fn fresh_output(addon: &str, output_dir: &Path) -> Result<PathBuf> {
    let dir = output_dir.join(addon);
    crate::staging::reset_dir(&dir).map_err(staging_error(addon))?;
    Ok(dir)
}

/// Returns the wrapper directory GitHub archives unpack into, or `dir`
/// itself when the archive has no single top-level directory.
pub(crate) fn archive_root(dir: &Path) -> io::Result<PathBuf> {
    let entries = archive::read_dir_sorted(dir)?;
    match entries.as_slice() {
        [only] if only.is_dir() => Ok(only.clone()),
        _ => Ok(dir.to_path_buf()),
    }
}

/// Sets the mode of a staged file.
pub(crate) fn set_mode(addon: &str, path: &Path, mode: u32) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(mode)).map_err(staging_error(addon))
}

// =============================================================================
// Addon Trait
// =============================================================================

/// Capability set shared by every add-on.
#[async_trait]
pub trait Addon: Send + Sync {
    /// Identity and supported versions.
    fn descriptor(&self) -> &AddonDescriptor;

    /// Version × architecture source table.
    fn manifest(&self) -> SourceManifest;

    /// Catalog key and staged subdirectory name.
    fn id(&self) -> &'static str {
        self.descriptor().id
    }

    /// Display name.
    fn name(&self) -> &'static str {
        self.descriptor().name
    }

    fn category(&self) -> AddonCategory {
        self.descriptor().category
    }

    fn supported_versions(&self) -> &'static [&'static str] {
        self.descriptor().versions
    }

    fn is_supported(&self, version: &str) -> bool {
        self.supported_versions().contains(&version)
    }

    /// Validates version support and resolves the primary source.
    ///
    /// Runs before any network call.
    fn resolve(&self, version: &str, arch: Arch) -> Result<Source> {
        if !self.is_supported(version) {
            return Err(Error::VersionUnsupported {
                addon: self.id().to_string(),
                version: version.to_string(),
            });
        }
        self.manifest().resolve(self.id(), version, arch)
    }

    /// Fetches the vendor archive(s) into the download directory.
    async fn download(&self, ctx: &AddonContext, version: &str, arch: Arch) -> Result<()>;

    /// Unpacks the downloaded archive(s) into the extract directory.
    async fn extract(&self, ctx: &AddonContext, version: &str, arch: Arch) -> Result<()>;

    /// Places the vendor tree under `<output_dir>/<id>/system` and applies
    /// any post-processing.
    async fn stage(&self, ctx: &AddonContext, version: &str, arch: Arch, output_dir: &Path) -> Result<()>;

    /// Runs download, extract and stage under the add-on's staging lock,
    /// after wiping its previous subtree.
    ///
    /// The lock is returned so callers reading the staged output keep it
    /// held until they are done.
    async fn install(
        &self,
        ctx: &AddonContext,
        version: &str,
        arch: Arch,
        output_dir: &Path,
    ) -> Result<StagingLock> {
        self.resolve(version, arch)?;

        let lock = ctx.staging().lock(self.id())?;
        ctx.staging().reset(self.id())?;

        ctx.progress().state(self.id(), PrepareState::Downloading);
        self.download(ctx, version, arch).await?;
        ctx.progress().state(self.id(), PrepareState::Extracting);
        self.extract(ctx, version, arch).await?;
        ctx.progress().state(self.id(), PrepareState::Staging);
        self.stage(ctx, version, arch, output_dir).await?;
        Ok(lock)
    }

    /// Recipe fragment copying the staged subtree into an image layer.
    fn build_layer_instructions(&self) -> String {
        format!("COPY {} /\n", self.id())
    }

    /// Kernel command line properties the add-on needs at boot.
    fn boot_args(&self, _version: &str) -> Vec<&'static str> {
        Vec::new()
    }

    /// Shell commands run inside a live container after injection.
    fn permission_repairs(&self) -> &'static [&'static str] {
        &[]
    }
}

/// Permission repairs shared by the Google apps suites.
pub const GAPPS_PERMISSION_REPAIRS: &[&str] = &[
    "chmod -R 755 /system/priv-app",
    "chmod -R 644 /system/etc/permissions",
    "chmod -R 644 /system/framework",
];

/// Every built-in add-on, in catalog order.
pub fn builtin() -> Vec<Arc<dyn Addon>> {
    vec![
        Arc::new(Houdini),
        Arc::new(NdkTranslation),
        Arc::new(LiteGapps),
        Arc::new(MindTheGapps),
        Arc::new(OpenGapps),
    ]
}
