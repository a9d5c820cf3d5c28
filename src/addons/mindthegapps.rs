//! MindTheGapps Google apps suite.
//!
//! The release zip already carries a `system/` tree, so staging is a
//! single copy.

use super::{
    Addon, AddonCategory, AddonContext, AddonDescriptor, GAPPS_PERMISSION_REPAIRS, Source,
    SourceManifest, fresh_output, place,
};
use crate::archive;
use crate::error::Result;
use crate::platform::Arch;
use async_trait::async_trait;
use std::path::Path;

const ID: &str = "mindthegapps";

const DESCRIPTOR: AddonDescriptor = AddonDescriptor {
    id: ID,
    name: "MindTheGapps",
    category: AddonCategory::GoogleApps,
    versions: &[
        "12.0.0",
        "12.0.0_64only",
        "13.0.0",
        "13.0.0_64only",
        "14.0.0",
        "15.0.0",
        "16.0.0",
    ],
};

macro_rules! release {
    ($tag:literal, $file:literal, $md5:literal) => {
        Source::new(
            concat!("https://github.com/s1204IT/MindTheGappsBuilder/releases/download/", $tag, "/", $file),
            $md5,
        )
    };
}

const V15_X86_64: Source = release!("20250330", "MindTheGapps-15.0.0-x86_64-20250330.zip", "e54694828bd74e9066b2534a9675c31e");
const V15_ARM64: Source = release!("20250330", "MindTheGapps-15.0.0-arm64-20250330.zip", "79acb62f0f7c66b0f0bcadae5624f3d1");
const V15_ARM: Source = release!("20250330", "MindTheGapps-15.0.0-arm-20250330.zip", "4ced6a404a714e61831e16068c3642b3");
const V13_X86_64: Source = release!("20240226", "MindTheGapps-13.0.0-x86_64-20240226.zip", "eee87a540b6e778f3a114fff29e133aa");
const V13_ARM64: Source = release!("20240226", "MindTheGapps-13.0.0-arm64-20240226.zip", "ebdf35e17bc1c22337762fcf15cd6e97");
const V12_X86_64: Source = release!("20240619", "MindTheGapps-12.1.0-x86_64-20240619.zip", "05d6e99b6e6567e66d43774559b15fbd");
const V12_ARM64: Source = release!("20240619", "MindTheGapps-12.1.0-arm64-20240619.zip", "94dd174ff16c2f0006b66b25025efd04");

/// Version × architecture sources.
pub const SOURCES: &[(&str, &[(Arch, Source)])] = &[
    ("16.0.0", &[(Arch::X86_64, V15_X86_64), (Arch::Arm64, V15_ARM64), (Arch::Arm, V15_ARM)]),
    ("15.0.0", &[(Arch::X86_64, V15_X86_64), (Arch::Arm64, V15_ARM64), (Arch::Arm, V15_ARM)]),
    (
        "14.0.0",
        &[
            (Arch::X86_64, release!("20240226", "MindTheGapps-14.0.0-x86_64-20240226.zip", "a827a84ccb0cf5914756e8561257ed13")),
            (Arch::X86, release!("20240226", "MindTheGapps-14.0.0-x86-20240226.zip", "45736b21475464e4a45196b9aa9d3b7f")),
            (Arch::Arm64, release!("20240226", "MindTheGapps-14.0.0-arm64-20240226.zip", "a0905cc7bf3f4f4f2e3f59a4e1fc789b")),
            (Arch::Arm, release!("20240226", "MindTheGapps-14.0.0-arm-20240226.zip", "fa167a3b7a10c4d3e688a59cd794f75b")),
        ],
    ),
    (
        "13.0.0",
        &[
            (Arch::X86_64, V13_X86_64),
            (Arch::X86, release!("20240226", "MindTheGapps-13.0.0-x86-20240226.zip", "d928c5eabb4394a97f2d7a5c663e7c2e")),
            (Arch::Arm64, V13_ARM64),
            (Arch::Arm, release!("20240619", "MindTheGapps-13.0.0-arm-20240619.zip", "ec7aa5efc9e449b101bc2ee7448a49bf")),
        ],
    ),
    ("13.0.0_64only", &[(Arch::X86_64, V13_X86_64), (Arch::Arm64, V13_ARM64)]),
    ("12.0.0_64only", &[(Arch::X86_64, V12_X86_64), (Arch::Arm64, V12_ARM64)]),
    (
        "12.0.0",
        &[
            (Arch::X86_64, V12_X86_64),
            (Arch::X86, release!("20240619", "MindTheGapps-12.1.0-x86-20240619.zip", "ff2421a75afbdda8a003e4fd25e95050")),
            (Arch::Arm64, V12_ARM64),
            (Arch::Arm, release!("20240619", "MindTheGapps-12.1.0-arm-20240619.zip", "5af756b3b5776c2f6ee024a9f7f42a2f")),
        ],
    ),
];

const ARCHIVE_FILE: &str = "mindthegapps.zip";

/// MindTheGapps add-on.
#[derive(Debug, Clone, Copy, Default)]
pub struct MindTheGapps;

#[async_trait]
impl Addon for MindTheGapps {
    fn descriptor(&self) -> &AddonDescriptor {
        &DESCRIPTOR
    }

    fn manifest(&self) -> SourceManifest {
        SourceManifest::Matrix(SOURCES)
    }

    async fn download(&self, ctx: &AddonContext, version: &str, arch: Arch) -> Result<()> {
        let source = self.resolve(version, arch)?;
        ctx.progress().status(format!("Downloading MindTheGapps for Android {version} ({arch})"));
        ctx.fetch(ID, &source, ARCHIVE_FILE).await?;
        Ok(())
    }

    async fn extract(&self, ctx: &AddonContext, _version: &str, _arch: Arch) -> Result<()> {
        ctx.progress().status("Extracting MindTheGapps archive");
        archive::extract_zip(
            &ctx.staging().download_dir(ID).join(ARCHIVE_FILE),
            &ctx.staging().extract_dir(ID),
        )
    }

    async fn stage(&self, ctx: &AddonContext, _version: &str, _arch: Arch, output_dir: &Path) -> Result<()> {
        let out = fresh_output(ID, output_dir)?;
        ctx.progress().status("Copying MindTheGapps files");
        place(ID, &ctx.staging().extract_dir(ID).join("system"), &out.join("system"))
    }

    fn boot_args(&self, _version: &str) -> Vec<&'static str> {
        vec!["ro.setupwizard.mode=DISABLED"]
    }

    fn permission_repairs(&self) -> &'static [&'static str] {
        GAPPS_PERMISSION_REPAIRS
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_descriptor_matches_manifest() {
        let mut declared: Vec<_> = DESCRIPTOR.versions.to_vec();
        let mut manifest = MindTheGapps.manifest().versions();
        declared.sort_unstable();
        manifest.sort_unstable();
        assert_eq!(declared, manifest);
    }

    #[test]
    fn test_no_x86_for_android_15() {
        assert!(MindTheGapps.resolve("15.0.0", Arch::X86).unwrap_err().is_unsupported());
        assert!(MindTheGapps.resolve("15.0.0", Arch::X86_64).is_ok());
    }
}
