//! # Staging Directory
//!
//! A single, well-known scratch tree shared by every add-on and every
//! invocation:
//!
//! ```text
//! /tmp/reddock-addons/
//! ├── Dockerfile            (build path only)
//! ├── .dockerignore
//! ├── .work/
//! │   ├── houdini.lock      (held for the duration of an install)
//! │   └── houdini/
//! │       ├── download/     (raw archives)
//! │       └── extract/      (vendor tree + scratch dirs)
//! └── houdini/
//!     └── system/...        (final staged output)
//! ```
//!
//! ## Isolation
//!
//! Each add-on only touches `.work/<id>/` and `<id>/`. Both are wiped at
//! the start of every install, so no partial state survives between runs.
//!
//! ## Locking
//!
//! Two processes installing the same add-on would corrupt each other's
//! subtree. [`StagingRoot::lock`] takes an exclusive, non-blocking
//! `flock(2)` on `.work/<id>.lock`; the second installer fails with
//! [`Error::StagingLocked`] instead of racing. Different add-ons never
//! contend. The lock is released when the guard drops (or the process
//! exits).

use crate::constants::{
    DEFAULT_STAGING_DIR, DOWNLOAD_DIR_NAME, EXTRACT_DIR_NAME, LOCK_FILE_SUFFIX, WORK_DIR_NAME,
};
use crate::error::{Error, Result};
use std::fs::{self, File, OpenOptions};
use std::io;
use std::os::fd::AsRawFd;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Handle on the staging root directory.
#[derive(Debug, Clone)]
pub struct StagingRoot {
    root: PathBuf,
}

impl StagingRoot {
    /// Staging root at the default well-known path.
    pub fn new() -> Self {
        Self::with_path(PathBuf::from(DEFAULT_STAGING_DIR))
    }

    /// Staging root at a custom path. Nothing is created until first use.
    pub fn with_path(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Returns the root path.
    pub fn path(&self) -> &Path {
        &self.root
    }

    /// Creates the root if missing.
    pub fn ensure(&self) -> Result<()> {
        fs::create_dir_all(&self.root)?;
        Ok(())
    }

    /// Final staged output for an add-on: `<root>/<id>`.
    pub fn addon_dir(&self, id: &str) -> PathBuf {
        self.root.join(id)
    }

    /// Scratch subtree for an add-on: `<root>/.work/<id>`.
    pub fn work_dir(&self, id: &str) -> PathBuf {
        self.root.join(WORK_DIR_NAME).join(id)
    }

    /// Raw archive directory for an add-on.
    pub fn download_dir(&self, id: &str) -> PathBuf {
        self.work_dir(id).join(DOWNLOAD_DIR_NAME)
    }

    /// Extracted tree directory for an add-on.
    pub fn extract_dir(&self, id: &str) -> PathBuf {
        self.work_dir(id).join(EXTRACT_DIR_NAME)
    }

    fn lock_path(&self, id: &str) -> PathBuf {
        self.root
            .join(WORK_DIR_NAME)
            .join(format!("{id}{LOCK_FILE_SUFFIX}"))
    }

    /// Takes the exclusive install lock for an add-on.
    pub fn lock(&self, id: &str) -> Result<StagingLock> {
        let path = self.lock_path(id);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(&path)?;

        // SAFETY: flock is called on a valid, owned file descriptor.
        let rc = unsafe { libc::flock(file.as_raw_fd(), libc::LOCK_EX | libc::LOCK_NB) };
        if rc != 0 {
            let err = io::Error::last_os_error();
            if err.kind() == io::ErrorKind::WouldBlock {
                return Err(Error::StagingLocked {
                    addon: id.to_string(),
                });
            }
            return Err(Error::Io(err));
        }

        debug!("Acquired staging lock {}", path.display());
        Ok(StagingLock { _file: file, path })
    }

    /// Wipes and recreates the add-on's scratch subtree and removes its
    /// previous staged output.
    pub fn reset(&self, id: &str) -> Result<()> {
        remove_dir_if_exists(&self.work_dir(id))?;
        remove_dir_if_exists(&self.addon_dir(id))?;
        fs::create_dir_all(self.download_dir(id))?;
        fs::create_dir_all(self.extract_dir(id))?;
        Ok(())
    }

    /// Removes the whole staging root.
    pub fn cleanup(&self) -> Result<()> {
        if remove_dir_if_exists(&self.root)? {
            info!("Removed staging root {}", self.root.display());
        }
        Ok(())
    }
}

impl Default for StagingRoot {
    fn default() -> Self {
        Self::new()
    }
}

/// Exclusive install lock on one add-on's staging subtree.
///
/// Released when dropped; closing the descriptor drops the `flock`.
#[derive(Debug)]
pub struct StagingLock {
    _file: File,
    path: PathBuf,
}

impl StagingLock {
    /// Lock file path.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Removes a directory tree and recreates it empty.
pub fn reset_dir(path: &Path) -> io::Result<()> {
    remove_dir_if_exists(path)?;
    fs::create_dir_all(path)
}

fn remove_dir_if_exists(path: &Path) -> io::Result<bool> {
    match fs::remove_dir_all(path) {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(e),
    }
}
