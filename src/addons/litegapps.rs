//! LiteGapps Google apps suite.
//!
//! The flashable zip carries a nested `files/files.tar.xz` holding one
//! system tree per `<arch>/<api-level>`. Staging unpacks the nested archive
//! and copies the tree matching the host architecture and the platform
//! version's API level.
//!
//! [`SOURCES`] and [`API_LEVELS`] are keyed by the same version strings and
//! must be kept in sync; a test enforces it.

use super::{
    Addon, AddonCategory, AddonContext, AddonDescriptor, GAPPS_PERMISSION_REPAIRS, Source,
    SourceManifest, fresh_output, place,
};
use crate::archive::{self, Compression};
use crate::error::{Error, Result};
use crate::platform::Arch;
use crate::staging::reset_dir;
use async_trait::async_trait;
use std::path::Path;

const ID: &str = "litegapps";

const DESCRIPTOR: AddonDescriptor = AddonDescriptor {
    id: ID,
    name: "LiteGapps",
    category: AddonCategory::GoogleApps,
    versions: &[
        "8.1.0",
        "9.0.0",
        "10.0.0",
        "11.0.0",
        "12.0.0",
        "12.0.0_64only",
        "13.0.0",
        "13.0.0_64only",
        "14.0.0",
        "14.0.0_64only",
        "15.0.0",
        "15.0.0_64only",
        "16.0.0",
    ],
};

macro_rules! sf {
    ($path:literal, $md5:literal) => {
        Source::new(concat!("https://sourceforge.net/projects/litegapps/files/litegapps/", $path), $md5)
    };
}

const V35_X86_64: Source = sf!("x86_64/35/lite/2024-10-27/LiteGapps-x86_64-15.0-20241027-official.zip", "ff6d94d6a0344320644b66fa9f662eda");
const V35_X86: Source = sf!("x86/35/lite/2024-10-27/LiteGapps-x86-15.0-20241027-official.zip", "9fcc749616bf362d5152c94ec73c2534");
const V35_ARM64: Source = sf!("arm64/35/lite/2024-10-23/LiteGapps-arm64-15.0-20241023-official.zip", "fdf6ab112e1cb1125b5b926669e40e6d");
const V35_ARM: Source = sf!("arm/35/lite/2024-10-26/LiteGapps-arm-15.0-20241026-official.zip", "4b08efae685ddd4846acfffc40dd0062");
const V34_X86_64: Source = sf!("x86_64/34/lite/v3.0/AUTO_LiteGapps_x86_64_14.0_v3.0_official.zip", "51cbdb561f9c9162e4fdcbffe691c4bc");
const V34_ARM64: Source = sf!("arm64/34/lite/2024-10-22/LiteGapps-arm64-14.0-20241022-official.zip", "30be139a5f9c52b78e3f852877ad2f0b");
const V34_ARM: Source = sf!("arm/34/lite/2024-10-28/LiteGapps-arm-14.0-20241028-official.zip", "94669d92feec6724bc521ece19754fb0");
const V33_X86_64: Source = Source::new(
    "https://master.dl.sourceforge.net/project/litegapps/litegapps/x86_64/33/lite/2024-02-22/AUTO-LiteGapps-x86_64-13.0-20240222-official.zip",
    "d91a18a28cc2718c18726a59aedcb8da",
);
const V33_ARM64: Source = sf!("arm64/33/lite/2024-10-22/LiteGapps-arm64-13.0-20241022-official.zip", "a8b1181291fe70d1e838a8579218a47c");
const V33_ARM: Source = sf!("arm/33/lite/2024-08-15/AUTO-LiteGapps-arm-13.0-20240815-official.zip", "5a1d192a42ef97693f63d166dea89849");
const V31_ARM64: Source = sf!("arm64/31/lite/2024-10-10/AUTO-LiteGapps-arm64-12.0-20241010-official.zip", "ed3196b7d6048ef4adca6388a771cd84");
const V31_ARM: Source = sf!("arm/31/lite/v2.5/%5BAUTO%5DLiteGapps_arm_12.0_v2.5_official.zip", "35e1f98dd136114fc1ca74e3a0539cfa");

/// Version × architecture sources.
pub const SOURCES: &[(&str, &[(Arch, Source)])] = &[
    (
        "16.0.0",
        &[(Arch::X86_64, V35_X86_64), (Arch::X86, V35_X86), (Arch::Arm64, V35_ARM64), (Arch::Arm, V35_ARM)],
    ),
    (
        "15.0.0",
        &[(Arch::X86_64, V35_X86_64), (Arch::X86, V35_X86), (Arch::Arm64, V35_ARM64), (Arch::Arm, V35_ARM)],
    ),
    ("15.0.0_64only", &[(Arch::X86_64, V35_X86_64), (Arch::Arm64, V35_ARM64)]),
    (
        "14.0.0",
        &[(Arch::X86_64, V34_X86_64), (Arch::X86, V35_X86), (Arch::Arm64, V34_ARM64), (Arch::Arm, V34_ARM)],
    ),
    ("14.0.0_64only", &[(Arch::X86_64, V34_X86_64), (Arch::Arm64, V34_ARM64)]),
    ("13.0.0", &[(Arch::X86_64, V33_X86_64), (Arch::Arm64, V33_ARM64), (Arch::Arm, V33_ARM)]),
    ("13.0.0_64only", &[(Arch::X86_64, V33_X86_64), (Arch::Arm64, V33_ARM64)]),
    ("12.0.0", &[(Arch::Arm64, V31_ARM64), (Arch::Arm, V31_ARM)]),
    ("12.0.0_64only", &[(Arch::Arm64, V31_ARM64)]),
    (
        "11.0.0",
        &[
            (Arch::X86_64, sf!("x86_64/30/lite/2024-10-12/AUTO-LiteGapps-x86_64-11.0-20241012-official.zip", "5c2a6c354b6faa6973dd3f399bbe162d")),
            (Arch::X86, sf!("x86/30/lite/2024-10-12/AUTO-LiteGapps-x86-11.0-20241012-official.zip", "7252ea97a1d66ae420f114bfe7089070")),
            (Arch::Arm64, sf!("arm64/30/lite/2024-10-21/LiteGapps-arm64-11.0-20241021-official.zip", "901fd830fe4968b6979f38169fe49ceb")),
            (Arch::Arm, sf!("arm/30/lite/2024-08-18/AUTO-LiteGapps-arm-11.0-20240818-official.zip", "d4b2471d94facc13c9e7a026f2dff80d")),
        ],
    ),
    (
        "10.0.0",
        &[
            (Arch::X86_64, sf!("x86_64/29/lite/v2.6/%5BAUTO%5DLiteGapps_x86_64_10.0_v2.6_official.zip", "d2d70e3e59149e23bdc8975dd6fa49e1")),
            (Arch::X86, sf!("x86/29/lite/v2.6/%5BAUTO%5DLiteGapps_x86_10.0_v2.6_official.zip", "14e20a4628dc3198bbe79774cb1c33dc")),
            (Arch::Arm64, sf!("arm64/29/lite/2024-10-22/LiteGapps-arm64-10.0-20241022-official.zip", "0d079569cb5e2687939993776abb538c")),
            (Arch::Arm, sf!("arm/29/lite/2024-08-18/AUTO-LiteGapps-arm-10.0-20240818-official.zip", "a467f73d2b5a1ff9882d070989db0f0e")),
        ],
    ),
    (
        "9.0.0",
        &[
            (Arch::X86_64, sf!("x86_64/28/lite/v2.6/%5BAUTO%5DLiteGapps_x86_64_9.0_v2.6_official.zip", "fc17a35518af188015baf1a682eb9fc7")),
            (Arch::X86, sf!("x86/28/lite/v2.6/%5BAUTO%5DLiteGapps_x86_9.0_v2.6_official.zip", "31981cd14199d6b3610064b09d96e278")),
            (Arch::Arm64, sf!("arm64/28/lite/2024-02-23/AUTO-LiteGapps-arm64-9.0-20240223-official.zip", "b8ccfbedbf003803af19346c610988c0")),
            (Arch::Arm, sf!("arm/28/lite/%5BAUTO%5DLiteGapps_arm_9.0_v2.5_official.zip", "8034245b695b6b31cd6a5d2ed5b2b670")),
        ],
    ),
    (
        "8.1.0",
        &[
            (Arch::X86_64, sf!("x86_64/27/lite/v2.6/%5BAUTO%5DLiteGapps_x86_64_8.1_v2.6_official.zip", "eee0ebdea5eb7580cab9dec307b46f56")),
            (Arch::X86, sf!("x86/27/lite/v2.6/%5BAUTO%5DLiteGapps_x86_8.1_v2.6_official.zip", "5739feb54fdf85dc1d870998aeeee43a")),
            (Arch::Arm64, sf!("arm64/27/lite/2024-02-22/AUTO-LiteGapps-arm64-8.1-20240222-official.zip", "35d4195595961dc229f617c30c5460bb")),
            (Arch::Arm, sf!("arm/27/lite/%5BAUTO%5DLiteGapps_arm_8.1_v2.5_official.zip", "b0f7f5ba418b1696005f4e3f5abe924f")),
        ],
    ),
];

/// Platform version → API level of the tree inside `files.tar.xz`.
///
/// Android 16 ships the API 35 build.
pub const API_LEVELS: &[(&str, &str)] = &[
    ("16.0.0", "35"),
    ("15.0.0", "35"),
    ("15.0.0_64only", "35"),
    ("14.0.0", "34"),
    ("14.0.0_64only", "34"),
    ("13.0.0", "33"),
    ("13.0.0_64only", "33"),
    ("12.0.0", "31"),
    ("12.0.0_64only", "31"),
    ("11.0.0", "30"),
    ("10.0.0", "29"),
    ("9.0.0", "28"),
    ("8.1.0", "27"),
];

const ARCHIVE_FILE: &str = "litegapps.zip";
const NESTED_ARCHIVE: &str = "files/files.tar.xz";
const UNPACK_DIR: &str = "appunpack";

/// LiteGapps add-on.
#[derive(Debug, Clone, Copy, Default)]
pub struct LiteGapps;

impl LiteGapps {
    /// API level directory for a platform version.
    pub fn api_level(version: &str) -> Option<&'static str> {
        API_LEVELS.iter().find(|(v, _)| *v == version).map(|(_, api)| *api)
    }
}

#[async_trait]
impl Addon for LiteGapps {
    fn descriptor(&self) -> &AddonDescriptor {
        &DESCRIPTOR
    }

    fn manifest(&self) -> SourceManifest {
        SourceManifest::Matrix(SOURCES)
    }

    async fn download(&self, ctx: &AddonContext, version: &str, arch: Arch) -> Result<()> {
        let source = self.resolve(version, arch)?;
        ctx.progress().status(format!("Downloading LiteGapps for Android {version} ({arch})"));
        ctx.fetch(ID, &source, ARCHIVE_FILE).await?;
        Ok(())
    }

    async fn extract(&self, ctx: &AddonContext, _version: &str, _arch: Arch) -> Result<()> {
        ctx.progress().status("Extracting LiteGapps archive");
        archive::extract_zip(
            &ctx.staging().download_dir(ID).join(ARCHIVE_FILE),
            &ctx.staging().extract_dir(ID),
        )
    }

    async fn stage(&self, ctx: &AddonContext, version: &str, arch: Arch, output_dir: &Path) -> Result<()> {
        let api = Self::api_level(version).ok_or_else(|| Error::StagingFailed {
            addon: ID.to_string(),
            reason: format!("no API level known for Android {version}"),
        })?;

        let extract = ctx.staging().extract_dir(ID);
        let unpack = extract.join(UNPACK_DIR);
        reset_dir(&unpack).map_err(super::staging_error(ID))?;

        ctx.progress().status("Extracting files.tar.xz");
        archive::extract_tar(&extract.join(NESTED_ARCHIVE), &unpack, Compression::Xz)?;

        let out = fresh_output(ID, output_dir)?;
        ctx.progress().status("Copying LiteGapps files");
        let tree = unpack.join(arch.as_str()).join(api).join("system");
        place(ID, &tree, &out.join("system"))
    }

    fn permission_repairs(&self) -> &'static [&'static str] {
        GAPPS_PERMISSION_REPAIRS
    }
}
