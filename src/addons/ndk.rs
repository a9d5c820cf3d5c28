//! Google libndk_translation ARM translation layer.
//!
//! One version-independent archive serves every platform version.

use super::{
    Addon, AddonCategory, AddonContext, AddonDescriptor, Source, SourceManifest, fresh_output, place,
    set_mode,
};
use crate::archive;
use crate::error::{Error, Result};
use crate::platform::Arch;
use async_trait::async_trait;
use std::path::Path;

const ID: &str = "ndk";

const DESCRIPTOR: AddonDescriptor = AddonDescriptor {
    id: ID,
    name: "NDK Translation",
    category: AddonCategory::CpuTranslationB,
    versions: &[
        "8.1.0",
        "9.0.0",
        "10.0.0",
        "11.0.0",
        "12.0.0",
        "12.0.0_64only",
        "13.0.0",
        "14.0.0",
        "15.0.0",
        "16.0.0",
    ],
};

const SOURCE: Source = Source::new(
    "https://github.com/supremegamers/vendor_google_proprietary_ndk_translation-prebuilt/archive/9324a8914b649b885dad6f2bfd14a67e5d1520bf.zip",
    "c9572672d1045594448068079b34c350",
);

const ARCHIVE_FILE: &str = "libndktranslation.zip";
const VENDOR_PREFIX: &str = "vendor_google_proprietary_ndk_translation-prebuilt-";
const INIT_RC: &str = "system/etc/init/ndk_translation.rc";

const PERMISSION_REPAIRS: &[&str] = &[
    "chmod 644 /system/etc/init/ndk_translation.rc",
    "chmod -R 644 /system/lib*/libndk*",
];

/// libndk_translation add-on.
#[derive(Debug, Clone, Copy, Default)]
pub struct NdkTranslation;

#[async_trait]
impl Addon for NdkTranslation {
    fn descriptor(&self) -> &AddonDescriptor {
        &DESCRIPTOR
    }

    fn manifest(&self) -> SourceManifest {
        SourceManifest::Single {
            source: SOURCE,
            arches: &[Arch::X86, Arch::X86_64],
        }
    }

    async fn download(&self, ctx: &AddonContext, version: &str, arch: Arch) -> Result<()> {
        let source = self.resolve(version, arch)?;
        ctx.progress().status(format!("Downloading NDK Translation for Android {version}"));
        ctx.fetch(ID, &source, ARCHIVE_FILE).await?;
        Ok(())
    }

    async fn extract(&self, ctx: &AddonContext, _version: &str, _arch: Arch) -> Result<()> {
        ctx.progress().status("Extracting NDK Translation archive");
        archive::extract_zip(
            &ctx.staging().download_dir(ID).join(ARCHIVE_FILE),
            &ctx.staging().extract_dir(ID),
        )
    }

    async fn stage(&self, ctx: &AddonContext, version: &str, arch: Arch, output_dir: &Path) -> Result<()> {
        let source = self.resolve(version, arch)?;
        let commit = source.stem().ok_or_else(|| Error::StagingFailed {
            addon: ID.to_string(),
            reason: format!("cannot derive archive root from {}", source.url),
        })?;
        let out = fresh_output(ID, output_dir)?;

        ctx.progress().status("Copying NDK Translation files");
        let prebuilts = ctx
            .staging()
            .extract_dir(ID)
            .join(format!("{VENDOR_PREFIX}{commit}"))
            .join("prebuilts");
        place(ID, &prebuilts, &out.join("system"))?;

        let init_rc = out.join(INIT_RC);
        if init_rc.exists() {
            set_mode(ID, &init_rc, 0o644)?;
        }
        Ok(())
    }

    fn permission_repairs(&self) -> &'static [&'static str] {
        PERMISSION_REPAIRS
    }
}
