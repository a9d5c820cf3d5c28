//! Host architecture detection.
//!
//! Add-on manifests are keyed by the Android ABI family of the host, not by
//! the Rust target triple. The four families redroid images ship for are
//! modeled by [`Arch`].

use crate::error::Error;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// CPU architecture as used by add-on manifests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Arch {
    X86,
    X86_64,
    Arm,
    Arm64,
}

impl Arch {
    /// All architectures, in manifest order.
    pub const ALL: [Arch; 4] = [Arch::X86, Arch::X86_64, Arch::Arm, Arch::Arm64];

    /// Detects the host architecture.
    ///
    /// Targets outside the four families fall back to `x86_64`, the most
    /// common redroid host.
    pub fn detect() -> Self {
        #[cfg(target_arch = "x86")]
        return Arch::X86;

        #[cfg(target_arch = "x86_64")]
        return Arch::X86_64;

        #[cfg(target_arch = "arm")]
        return Arch::Arm;

        #[cfg(target_arch = "aarch64")]
        return Arch::Arm64;

        #[cfg(not(any(
            target_arch = "x86",
            target_arch = "x86_64",
            target_arch = "arm",
            target_arch = "aarch64"
        )))]
        return Arch::X86_64;
    }

    /// Canonical manifest name.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Arch::X86 => "x86",
            Arch::X86_64 => "x86_64",
            Arch::Arm => "arm",
            Arch::Arm64 => "arm64",
        }
    }

    /// True for the Intel families, the only hosts CPU translators run on.
    #[must_use]
    pub fn is_x86(self) -> bool {
        matches!(self, Arch::X86 | Arch::X86_64)
    }
}

impl fmt::Display for Arch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Arch {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "x86" | "i386" | "i686" => Ok(Arch::X86),
            "x86_64" | "amd64" => Ok(Arch::X86_64),
            "arm" | "armv7" | "armv7l" => Ok(Arch::Arm),
            "arm64" | "aarch64" => Ok(Arch::Arm64),
            _ => Err(Error::UnknownArch(s.to_string())),
        }
    }
}
