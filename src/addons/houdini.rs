//! Intel Houdini ARM translation layer.
//!
//! Staging is a two-archive overlay:
//!
//! 1. the vendor prebuilts for the platform version go to `houdini/system`
//!    together with a generated `houdini.rc` init script,
//! 2. a per-version compatibility patch is overlaid on top, replacing the
//!    init script among other files.
//!
//! Two named exceptions apply and are matched exactly, never by prefix:
//! the oldest version (`8.1.0`) gets no patch overlay, and the second
//! oldest (`9.0.0`) keeps the patch's init script mode untouched.

use super::{
    Addon, AddonCategory, AddonContext, AddonDescriptor, Source, SourceManifest, archive_root,
    fresh_output, place, set_mode, staging_error,
};
use crate::archive;
use crate::error::{Error, Result};
use crate::platform::Arch;
use async_trait::async_trait;
use std::fs;
use std::path::Path;
use tracing::debug;

const ID: &str = "houdini";

/// Only version without a compatibility patch.
pub const PATCHLESS_VERSION: &str = "8.1.0";

/// Only version whose init script mode is left as the patch ships it.
pub const KEEP_INIT_MODE_VERSION: &str = "9.0.0";

const DESCRIPTOR: AddonDescriptor = AddonDescriptor {
    id: ID,
    name: "Houdini",
    category: AddonCategory::CpuTranslationA,
    versions: &[
        "8.1.0", "9.0.0", "10.0.0", "11.0.0", "12.0.0", "13.0.0", "14.0.0", "15.0.0", "16.0.0",
    ],
};

const X86_ONLY: &[Arch] = &[Arch::X86, Arch::X86_64];

const PIE: Source = Source::new(
    "https://github.com/rote66/vendor_intel_proprietary_houdini/archive/46682f423b8497db3f96222f2669d770eff764c3.zip",
    "cd4dd2891aa18e7699d33dcc3fe3ffd4",
);

const Q_AND_LATER: Source = Source::new(
    "https://github.com/rote66/vendor_intel_proprietary_houdini/archive/debc3dc91cf12b5c5b8a1c546a5b0b7bf7f838a8.zip",
    "cb7ffac26d47ec7c89df43818e126b47",
);

const SOURCES: &[(&str, Source)] = &[
    ("8.1.0", PIE),
    ("9.0.0", PIE),
    ("10.0.0", Q_AND_LATER),
    ("11.0.0", Q_AND_LATER),
    ("12.0.0", Q_AND_LATER),
    ("13.0.0", Q_AND_LATER),
    ("14.0.0", Q_AND_LATER),
    ("15.0.0", Q_AND_LATER),
    ("16.0.0", Q_AND_LATER),
];

/// Compatibility patches, one branch per platform version. Upstream
/// publishes no checksums for these.
const PATCHES: &[(&str, Source)] = &[
    ("9.0.0", Source::unchecked("https://github.com/rote66/redroid_libhoudini_hack/archive/refs/heads/9.0.0.zip")),
    ("10.0.0", Source::unchecked("https://github.com/rote66/redroid_libhoudini_hack/archive/refs/heads/10.0.0.zip")),
    ("11.0.0", Source::unchecked("https://github.com/rote66/redroid_libhoudini_hack/archive/refs/heads/11.0.0.zip")),
    ("12.0.0", Source::unchecked("https://github.com/rote66/redroid_libhoudini_hack/archive/refs/heads/12.0.0.zip")),
    ("13.0.0", Source::unchecked("https://github.com/rote66/redroid_libhoudini_hack/archive/refs/heads/13.0.0.zip")),
    ("14.0.0", Source::unchecked("https://github.com/rote66/redroid_libhoudini_hack/archive/refs/heads/14.0.0.zip")),
    ("15.0.0", Source::unchecked("https://github.com/rote66/redroid_libhoudini_hack/archive/refs/heads/15.0.0.zip")),
    ("16.0.0", Source::unchecked("https://github.com/rote66/redroid_libhoudini_hack/archive/refs/heads/16.0.0.zip")),
];

const ARCHIVE_FILE: &str = "libhoudini.zip";
const PATCH_FILE: &str = "libhoudini-patch.zip";
const PATCH_DIR: &str = "patch";
const VENDOR_PREFIX: &str = "vendor_intel_proprietary_houdini-";
const INIT_RC: &str = "system/etc/init/houdini.rc";

const INIT_RC_CONTENTS: &str = r#"
on early-init
    mount binfmt_misc binfmt_misc /proc/sys/fs/binfmt_misc

on property:ro.enable.native.bridge.exec=1
    copy /system/etc/binfmt_misc/arm_exe /proc/sys/fs/binfmt_misc/register
    copy /system/etc/binfmt_misc/arm_dyn /proc/sys/fs/binfmt_misc/register

on property:ro.enable.native.bridge.exec64=1
    copy /system/etc/binfmt_misc/arm64_exe /proc/sys/fs/binfmt_misc/register
    copy /system/etc/binfmt_misc/arm64_dyn /proc/sys/fs/binfmt_misc/register

on property:sys.boot_completed=1
    exec -- /system/bin/sh -c "echo ':arm_exe:M::\\\\x7f\\\\x45\\\\x4c\\\\x46\\\\x01\\\\x01\\\\x01\\\\x00\\\\x00\\\\x00\\\\x00\\\\x00\\\\x00\\\\x00\\\\x00\\\\x00\\\\x02\\\\x00\\\\x28::/system/bin/houdini:P' >> /proc/sys/fs/binfmt_misc/register"
    exec -- /system/bin/sh -c "echo ':arm_dyn:M::\\\\x7f\\\\x45\\\\x4c\\\\x46\\\\x01\\\\x01\\\\x01\\\\x00\\\\x00\\\\x00\\\\x00\\\\x00\\\\x00\\\\x00\\\\x00\\\\x00\\\\x03\\\\x00\\\\x28::/system/bin/houdini:P' >> /proc/sys/fs/binfmt_misc/register"
    exec -- /system/bin/sh -c "echo ':arm64_exe:M::\\\\x7f\\\\x45\\\\x4c\\\\x46\\\\x02\\\\x01\\\\x01\\\\x00\\\\x00\\\\x00\\\\x00\\\\x00\\\\x00\\\\x00\\\\x00\\\\x00\\\\x02\\\\x00\\\\xb7::/system/bin/houdini64:P' >> /proc/sys/fs/binfmt_misc/register"
    exec -- /system/bin/sh -c "echo ':arm64_dyn:M::\\\\x7f\\\\x45\\\\x4c\\\\x46\\\\x02\\\\x01\\\\x01\\\\x00\\\\x00\\\\x00\\\\x00\\\\x00\\\\x00\\\\x00\\\\x00\\\\x00\\\\x03\\\\x00\\\\xb7::/system/bin/houdini64:P' >> /proc/sys/fs/binfmt_misc/register"
"#;

const BOOT_ARGS: &[&str] = &[
    "ro.product.cpu.abilist=x86_64,arm64-v8a,x86,armeabi-v7a,armeabi",
    "ro.product.cpu.abilist64=x86_64,arm64-v8a",
    "ro.product.cpu.abilist32=x86,armeabi-v7a,armeabi",
    "ro.dalvik.vm.isa.arm=x86",
    "ro.dalvik.vm.isa.arm64=x86_64",
    "ro.enable.native.bridge.exec=1",
    "ro.vendor.enable.native.bridge.exec=1",
    "ro.vendor.enable.native.bridge.exec64=1",
    "ro.dalvik.vm.native.bridge=libhoudini.so",
];

const BOOT_ARGS_64ONLY: &[&str] = &[
    "androidboot.use_memfd=1",
    "ro.product.cpu.abilist=x86_64,arm64-v8a",
    "ro.product.cpu.abilist64=x86_64,arm64-v8a",
    "ro.dalvik.vm.isa.arm64=x86_64",
    "ro.enable.native.bridge.exec=1",
    "ro.dalvik.vm.native.bridge=libhoudini.so",
];

const PERMISSION_REPAIRS: &[&str] = &[
    "chmod 644 /system/etc/init/houdini.rc",
    "chmod -R 755 /system/bin/houdini*",
    "chmod -R 644 /system/lib*/libhoudini*",
];

/// Intel Houdini add-on.
#[derive(Debug, Clone, Copy, Default)]
pub struct Houdini;

impl Houdini {
    /// Compatibility patch for a version, `None` for [`PATCHLESS_VERSION`].
    pub fn patch_source(version: &str) -> Option<Source> {
        if version == PATCHLESS_VERSION {
            return None;
        }
        PATCHES.iter().find(|(v, _)| *v == version).map(|(_, s)| *s)
    }

    fn patch_required(version: &str) -> Result<Option<Source>> {
        match Self::patch_source(version) {
            Some(source) => Ok(Some(source)),
            None if version == PATCHLESS_VERSION => Ok(None),
            None => Err(Error::VersionUnsupported {
                addon: ID.to_string(),
                version: version.to_string(),
            }),
        }
    }
}

#[async_trait]
impl Addon for Houdini {
    fn descriptor(&self) -> &AddonDescriptor {
        &DESCRIPTOR
    }

    fn manifest(&self) -> SourceManifest {
        SourceManifest::PerVersion {
            sources: SOURCES,
            arches: X86_ONLY,
        }
    }

    async fn download(&self, ctx: &AddonContext, version: &str, arch: Arch) -> Result<()> {
        let source = self.resolve(version, arch)?;
        let patch = Self::patch_required(version)?;

        ctx.progress().status(format!("Downloading Houdini for Android {version}"));
        ctx.fetch(ID, &source, ARCHIVE_FILE).await?;

        if let Some(patch) = patch {
            ctx.progress().status(format!("Downloading Houdini patch for Android {version}"));
            ctx.fetch(ID, &patch, PATCH_FILE).await?;
        }
        Ok(())
    }

    async fn extract(&self, ctx: &AddonContext, version: &str, _arch: Arch) -> Result<()> {
        let download = ctx.staging().download_dir(ID);
        let extract = ctx.staging().extract_dir(ID);

        ctx.progress().status("Extracting Houdini archive");
        archive::extract_zip(&download.join(ARCHIVE_FILE), &extract)?;

        if version != PATCHLESS_VERSION {
            ctx.progress().status("Extracting Houdini patch");
            archive::extract_zip(&download.join(PATCH_FILE), &extract.join(PATCH_DIR))?;
        }
        Ok(())
    }

    async fn stage(&self, ctx: &AddonContext, version: &str, arch: Arch, output_dir: &Path) -> Result<()> {
        let source = self.resolve(version, arch)?;
        let commit = source.stem().ok_or_else(|| Error::StagingFailed {
            addon: ID.to_string(),
            reason: format!("cannot derive archive root from {}", source.url),
        })?;

        let extract = ctx.staging().extract_dir(ID);
        let out = fresh_output(ID, output_dir)?;

        ctx.progress().status("Copying Houdini library files");
        let prebuilts = extract.join(format!("{VENDOR_PREFIX}{commit}")).join("prebuilts");
        place(ID, &prebuilts, &out.join("system"))?;

        let init_rc = out.join(INIT_RC);
        if let Some(parent) = init_rc.parent() {
            fs::create_dir_all(parent).map_err(staging_error(ID))?;
        }
        fs::write(&init_rc, INIT_RC_CONTENTS).map_err(staging_error(ID))?;

        if version != PATCHLESS_VERSION {
            ctx.progress().status(format!("Applying Houdini patch for Android {version}"));
            let patch_root = archive_root(&extract.join(PATCH_DIR)).map_err(staging_error(ID))?;
            place(ID, &patch_root, &out)?;
        } else {
            debug!("No Houdini patch for Android {}", version);
        }

        if version != KEEP_INIT_MODE_VERSION {
            set_mode(ID, &init_rc, 0o644)?;
        }

        Ok(())
    }

    fn boot_args(&self, version: &str) -> Vec<&'static str> {
        if version.ends_with("_64only") {
            BOOT_ARGS_64ONLY.to_vec()
        } else {
            BOOT_ARGS.to_vec()
        }
    }

    fn permission_repairs(&self) -> &'static [&'static str] {
        PERMISSION_REPAIRS
    }
}
