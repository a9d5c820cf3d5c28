//! # Archive Utilities
//!
//! Add-on agnostic I/O primitives used by every pipeline stage:
//!
//! - [`Transport`] / [`HttpTransport`]: a single HTTP GET per archive
//! - [`verify_md5`]: manifest checksum verification
//! - [`extract_zip`] / [`extract_tar`]: full decompression into a directory
//! - [`copy_tree`]: recursive, mode-preserving copy used for staging
//!
//! ## Failure Semantics
//!
//! Every function fails immediately and leaves partial output in place.
//! Callers never roll back: the next install of the same add-on wipes its
//! own subtree before re-staging.
//!
//! ## Path Safety
//!
//! Vendor archives come from third-party hosts. Zip entries are resolved
//! through [`zip::read::ZipFile::enclosed_name`] and tar entries are
//! checked for absolute paths and `..` components before unpacking.

use crate::error::{Error, Result};
use async_trait::async_trait;
use flate2::read::GzDecoder;
use std::fs::{self, File};
use std::io::{self, BufReader, Read};
use std::os::unix::fs::{PermissionsExt, symlink};
use std::path::{Component, Path, PathBuf};
use std::process::{Command, Stdio};
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};
use walkdir::WalkDir;
use xz2::read::XzDecoder;
use zip::ZipArchive;

const S_IFMT: u32 = 0o170000;
const S_IFLNK: u32 = 0o120000;

// =============================================================================
// Transport
// =============================================================================

/// Fetches a remote archive into a local file.
///
/// The pipeline never talks to the network directly; tests substitute a
/// recording implementation to assert that unsupported combinations make
/// no calls.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Downloads `url` into `dest`, returning the number of bytes written.
    async fn fetch(&self, url: &str, dest: &Path) -> Result<u64>;
}

/// Plain HTTP(S) transport: one GET, no retry, no resume, no timeout.
pub struct HttpTransport {
    client: reqwest::Client,
}

impl HttpTransport {
    /// Creates a transport with a reddock user agent.
    pub fn new() -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("reddock/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| Error::DownloadFailed {
                url: String::new(),
                reason: format!("failed to build HTTP client: {e}"),
            })?;
        Ok(Self { client })
    }

    async fn stream_to(&self, url: &str, temp_path: &Path) -> Result<u64> {
        let fail = |reason: String| Error::DownloadFailed {
            url: url.to_string(),
            reason,
        };

        let mut response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| fail(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(fail(format!("HTTP {status}")));
        }

        let mut file = tokio::fs::File::create(temp_path)
            .await
            .map_err(|e| fail(format!("cannot create {}: {e}", temp_path.display())))?;

        let mut written = 0u64;
        while let Some(chunk) = response.chunk().await.map_err(|e| fail(e.to_string()))? {
            file.write_all(&chunk)
                .await
                .map_err(|e| fail(e.to_string()))?;
            written += chunk.len() as u64;
        }
        file.flush().await.map_err(|e| fail(e.to_string()))?;

        Ok(written)
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn fetch(&self, url: &str, dest: &Path) -> Result<u64> {
        debug!("GET {}", url);

        // Atomic placement: stream to a sibling temp file, then rename.
        let temp_name = format!(".tmp.{}", uuid::Uuid::now_v7());
        let temp_path = dest.with_file_name(temp_name);

        let written = match self.stream_to(url, &temp_path).await {
            Ok(n) => n,
            Err(e) => {
                let _ = tokio::fs::remove_file(&temp_path).await;
                return Err(e);
            }
        };

        tokio::fs::rename(&temp_path, dest)
            .await
            .map_err(|e| Error::DownloadFailed {
                url: url.to_string(),
                reason: format!("cannot place {}: {e}", dest.display()),
            })?;

        debug!("Downloaded {} bytes to {}", written, dest.display());
        Ok(written)
    }
}

// =============================================================================
// Checksums
// =============================================================================

/// Computes the lowercase hex MD5 of a file, streaming its contents.
pub fn md5_hex(path: &Path) -> Result<String> {
    let mut reader = BufReader::new(File::open(path)?);
    let mut context = md5::Context::new();
    io::copy(&mut reader, &mut context)?;
    Ok(format!("{:x}", context.compute()))
}

/// Verifies a file against an expected MD5 digest (case-insensitive).
pub fn verify_md5(path: &Path, expected: &str) -> Result<()> {
    let actual = md5_hex(path)?;
    if !actual.eq_ignore_ascii_case(expected) {
        return Err(Error::ChecksumMismatch {
            path: path.to_path_buf(),
            expected: expected.to_ascii_lowercase(),
            actual,
        });
    }
    Ok(())
}

// =============================================================================
// Extraction
// =============================================================================

/// Compression applied to a tar stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Compression {
    None,
    Gzip,
    Xz,
    /// Decoded by the external `lzip` binary.
    Lzip,
}

impl Compression {
    /// Guesses the compression from a file name.
    #[must_use]
    pub fn from_path(path: &Path) -> Self {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_ascii_lowercase())
            .unwrap_or_default();
        if name.ends_with(".gz") || name.ends_with(".tgz") {
            Compression::Gzip
        } else if name.ends_with(".xz") || name.ends_with(".txz") {
            Compression::Xz
        } else if name.ends_with(".lz") {
            Compression::Lzip
        } else {
            Compression::None
        }
    }
}

/// Extracts a zip archive into `dest`, preserving unix modes and symlinks.
pub fn extract_zip(archive: &Path, dest: &Path) -> Result<()> {
    let fail = |reason: String| Error::ExtractFailed {
        archive: archive.to_path_buf(),
        reason,
    };

    fs::create_dir_all(dest).map_err(|e| fail(format!("cannot create {}: {e}", dest.display())))?;

    let file = File::open(archive).map_err(|e| fail(e.to_string()))?;
    let mut zip = ZipArchive::new(file).map_err(|e| fail(e.to_string()))?;

    debug!("Extracting {} entries from {}", zip.len(), archive.display());

    for i in 0..zip.len() {
        let mut entry = zip.by_index(i).map_err(|e| fail(e.to_string()))?;

        let Some(relative) = entry.enclosed_name() else {
            return Err(fail(format!("unsafe entry path: {}", entry.name())));
        };
        let target = dest.join(relative);
        let mode = entry.unix_mode();

        if entry.is_dir() {
            fs::create_dir_all(&target).map_err(|e| fail(e.to_string()))?;
            continue;
        }

        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent).map_err(|e| fail(e.to_string()))?;
        }

        if mode.is_some_and(|m| m & S_IFMT == S_IFLNK) {
            let mut link = String::new();
            entry
                .read_to_string(&mut link)
                .map_err(|e| fail(e.to_string()))?;
            remove_existing(&target).map_err(|e| fail(e.to_string()))?;
            symlink(&link, &target).map_err(|e| fail(e.to_string()))?;
            continue;
        }

        let mut out = File::create(&target).map_err(|e| fail(e.to_string()))?;
        io::copy(&mut entry, &mut out).map_err(|e| fail(e.to_string()))?;

        if let Some(mode) = mode {
            fs::set_permissions(&target, fs::Permissions::from_mode(mode & 0o7777))
                .map_err(|e| fail(e.to_string()))?;
        }
    }

    Ok(())
}

/// Extracts a (possibly compressed) tar archive into `dest`.
pub fn extract_tar(archive: &Path, dest: &Path, compression: Compression) -> Result<()> {
    let fail = |reason: String| Error::ExtractFailed {
        archive: archive.to_path_buf(),
        reason,
    };

    fs::create_dir_all(dest).map_err(|e| fail(format!("cannot create {}: {e}", dest.display())))?;

    debug!("Extracting {} ({:?}) to {}", archive.display(), compression, dest.display());

    match compression {
        Compression::None => {
            let file = File::open(archive).map_err(|e| fail(e.to_string()))?;
            unpack_tar(file, archive, dest)
        }
        Compression::Gzip => {
            let file = File::open(archive).map_err(|e| fail(e.to_string()))?;
            unpack_tar(GzDecoder::new(file), archive, dest)
        }
        Compression::Xz => {
            let file = File::open(archive).map_err(|e| fail(e.to_string()))?;
            unpack_tar(XzDecoder::new(file), archive, dest)
        }
        Compression::Lzip => {
            let lzip = which::which("lzip").map_err(|_| fail("lzip not found in PATH".into()))?;

            let mut child = Command::new(lzip)
                .arg("-dc")
                .arg(archive)
                .stdin(Stdio::null())
                .stdout(Stdio::piped())
                .stderr(Stdio::piped())
                .spawn()
                .map_err(|e| fail(format!("failed to spawn lzip: {e}")))?;

            let stdout = child
                .stdout
                .take()
                .ok_or_else(|| fail("lzip stdout unavailable".into()))?;
            let unpacked = unpack_tar(stdout, archive, dest);

            let output = child.wait_with_output().map_err(|e| fail(e.to_string()))?;
            unpacked?;
            if !output.status.success() {
                return Err(fail(format!(
                    "lzip exited with {}: {}",
                    output.status,
                    String::from_utf8_lossy(&output.stderr).trim()
                )));
            }
            Ok(())
        }
    }
}

fn unpack_tar<R: Read>(reader: R, archive: &Path, dest: &Path) -> Result<()> {
    let fail = |reason: String| Error::ExtractFailed {
        archive: archive.to_path_buf(),
        reason,
    };

    let mut tar = tar::Archive::new(reader);
    tar.set_preserve_permissions(true);
    tar.set_overwrite(true);

    for entry in tar.entries().map_err(|e| fail(e.to_string()))? {
        let mut entry = entry.map_err(|e| fail(e.to_string()))?;
        let path = entry.path().map_err(|e| fail(e.to_string()))?.into_owned();

        if path.is_absolute() || path.components().any(|c| matches!(c, Component::ParentDir)) {
            return Err(fail(format!("unsafe entry path: {}", path.display())));
        }

        entry.unpack_in(dest).map_err(|e| fail(e.to_string()))?;
    }

    Ok(())
}

// =============================================================================
// Tree Copy
// =============================================================================

/// Recursively copies `src` onto `dst`, preserving mode bits and symlinks.
///
/// Existing files at the destination are replaced, so the copy doubles as
/// an overlay. A regular file `src` is copied to the path `dst`.
pub fn copy_tree(src: &Path, dst: &Path) -> io::Result<()> {
    let with_path = |path: &Path, e: io::Error| io::Error::new(e.kind(), format!("{}: {e}", path.display()));

    // Directory modes are applied last so read-only dirs can still be filled.
    let mut dir_modes: Vec<(PathBuf, fs::Permissions)> = Vec::new();

    for entry in WalkDir::new(src).follow_links(false) {
        let entry = entry.map_err(io::Error::from)?;
        let relative = entry
            .path()
            .strip_prefix(src)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e.to_string()))?;
        let target = if relative.as_os_str().is_empty() {
            dst.to_path_buf()
        } else {
            dst.join(relative)
        };
        let file_type = entry.file_type();

        if file_type.is_dir() {
            if fs::symlink_metadata(&target).is_ok_and(|m| !m.is_dir()) {
                fs::remove_file(&target).map_err(|e| with_path(&target, e))?;
            }
            fs::create_dir_all(&target).map_err(|e| with_path(&target, e))?;
            let perms = entry.metadata().map_err(io::Error::from)?.permissions();
            dir_modes.push((target, perms));
            continue;
        }

        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent).map_err(|e| with_path(parent, e))?;
        }
        remove_existing(&target).map_err(|e| with_path(&target, e))?;

        if file_type.is_symlink() {
            let link = fs::read_link(entry.path()).map_err(|e| with_path(entry.path(), e))?;
            symlink(&link, &target).map_err(|e| with_path(&target, e))?;
        } else {
            fs::copy(entry.path(), &target).map_err(|e| with_path(entry.path(), e))?;
        }
    }

    for (dir, perms) in dir_modes.into_iter().rev() {
        fs::set_permissions(&dir, perms).map_err(|e| with_path(&dir, e))?;
    }

    Ok(())
}

/// Removes a non-directory entry at `path`, or a directory a symlink will replace.
fn remove_existing(path: &Path) -> io::Result<()> {
    match fs::symlink_metadata(path) {
        Ok(meta) if meta.is_dir() => {
            warn!("Replacing directory {} with a file", path.display());
            fs::remove_dir_all(path)
        }
        Ok(_) => fs::remove_file(path),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e),
    }
}

/// Lists a directory's entries sorted by file name.
pub fn read_dir_sorted(dir: &Path) -> io::Result<Vec<PathBuf>> {
    let mut entries = fs::read_dir(dir)?
        .map(|entry| entry.map(|e| e.path()))
        .collect::<io::Result<Vec<_>>>()?;
    entries.sort();
    Ok(entries)
}
