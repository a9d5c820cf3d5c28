//! Shared fixtures for the integration tests.
//!
//! - [`StubTransport`]: serves canned bytes per URL and records every call
//! - [`FakeRuntime`]: in-memory container engine recording copies and execs
//! - [`FixtureAddon`]: minimal add-on staging `system/etc/<id>.conf`

#![allow(dead_code)]

use async_trait::async_trait;
use reddock::addons::{Addon, AddonCategory, AddonContext, AddonDescriptor, Source, SourceManifest};
use reddock::archive::{self, Transport};
use reddock::config::{Config, ContainerRecord, MemoryConfigStore};
use reddock::runtime::{ContainerRuntime, ContainerStatus, ExecResult};
use reddock::staging::{StagingRoot, reset_dir};
use reddock::{AddonCatalog, Arch, Error, Result};
use std::collections::HashMap;
use std::future::Future;
use std::io::{Cursor, Write};
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use zip::write::SimpleFileOptions;

// =============================================================================
// Transport
// =============================================================================

/// Serves registered payloads; any other URL fails like an HTTP 404.
#[derive(Default)]
pub struct StubTransport {
    payloads: Mutex<HashMap<String, Vec<u8>>>,
    calls: Mutex<Vec<String>>,
}

impl StubTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn serve(&self, url: &str, bytes: Vec<u8>) {
        self.payloads.lock().unwrap().insert(url.to_string(), bytes);
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

#[async_trait]
impl Transport for StubTransport {
    async fn fetch(&self, url: &str, dest: &Path) -> Result<u64> {
        self.calls.lock().unwrap().push(url.to_string());
        let bytes = self
            .payloads
            .lock()
            .unwrap()
            .get(url)
            .cloned()
            .ok_or_else(|| Error::DownloadFailed {
                url: url.to_string(),
                reason: "HTTP 404 Not Found".to_string(),
            })?;
        std::fs::write(dest, &bytes)?;
        Ok(bytes.len() as u64)
    }
}

// =============================================================================
// Container Runtime
// =============================================================================

/// Callback awaited when the engine reads host files (`cp` or `build`).
pub type EngineHook = Box<dyn Fn(&str) -> Pin<Box<dyn Future<Output = ()> + Send>> + Send + Sync>;

/// A container engine that only remembers what it was asked to do.
pub struct FakeRuntime {
    pub status: Mutex<ContainerStatus>,
    /// When false, `status` reports the container as missing.
    pub exists: Mutex<bool>,
    pub copies: Mutex<Vec<(String, PathBuf, String)>>,
    pub execs: Mutex<Vec<Vec<String>>>,
    /// Exec commands (joined argv) mapped to canned results.
    pub exec_results: Mutex<HashMap<String, ExecResult>>,
    pub fail_copies: Mutex<bool>,
    pub builds: Mutex<Vec<(String, PathBuf)>>,
    pub build_result: Mutex<ExecResult>,
    pub pulls: Mutex<Vec<String>>,
    pub pushes: Mutex<Vec<String>>,
    pub host_read_hook: Mutex<Option<EngineHook>>,
}

impl FakeRuntime {
    pub fn running() -> Arc<Self> {
        Arc::new(Self::with_status(ContainerStatus::Running))
    }

    pub fn with_status(status: ContainerStatus) -> Self {
        Self {
            status: Mutex::new(status),
            exists: Mutex::new(true),
            copies: Mutex::default(),
            execs: Mutex::default(),
            exec_results: Mutex::default(),
            fail_copies: Mutex::new(false),
            builds: Mutex::default(),
            build_result: Mutex::new(ExecResult::success("built")),
            pulls: Mutex::default(),
            pushes: Mutex::default(),
            host_read_hook: Mutex::default(),
        }
    }

    /// Awaits `hook` with the engine command name on every `cp` and `build`,
    /// while the caller is blocked on that command.
    pub fn on_host_read<F, Fut>(&self, hook: F)
    where
        F: Fn(&str) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let boxed: EngineHook = Box::new(move |command: &str| -> Pin<Box<dyn Future<Output = ()> + Send>> {
            Box::pin(hook(command))
        });
        *self.host_read_hook.lock().unwrap() = Some(boxed);
    }

    async fn host_read(&self, command: &str) {
        let pending = self.host_read_hook.lock().unwrap().as_ref().map(|hook| hook(command));
        if let Some(pending) = pending {
            pending.await;
        }
    }

    pub fn respond(&self, argv: &[&str], result: ExecResult) {
        self.exec_results.lock().unwrap().insert(argv.join(" "), result);
    }

    pub fn copied_paths(&self) -> Vec<PathBuf> {
        self.copies.lock().unwrap().iter().map(|(_, p, _)| p.clone()).collect()
    }

    pub fn exec_log(&self) -> Vec<String> {
        self.execs.lock().unwrap().iter().map(|a| a.join(" ")).collect()
    }
}

#[async_trait]
impl ContainerRuntime for FakeRuntime {
    fn name(&self) -> &str {
        "fake"
    }

    async fn pull_image(&self, reference: &str) -> Result<()> {
        self.pulls.lock().unwrap().push(reference.to_string());
        Ok(())
    }

    async fn status(&self, container: &str) -> Result<ContainerStatus> {
        if !*self.exists.lock().unwrap() {
            return Err(Error::ContainerNotFound(container.to_string()));
        }
        Ok(*self.status.lock().unwrap())
    }

    async fn exec(&self, _container: &str, argv: &[&str]) -> Result<ExecResult> {
        let owned: Vec<String> = argv.iter().map(|a| a.to_string()).collect();
        self.execs.lock().unwrap().push(owned);
        let canned = self.exec_results.lock().unwrap().get(&argv.join(" ")).cloned();
        Ok(canned.unwrap_or_default())
    }

    async fn copy_into(&self, container: &str, host_path: &Path, dest: &str) -> Result<()> {
        self.host_read("cp").await;
        if *self.fail_copies.lock().unwrap() {
            return Err(Error::RuntimeCommandFailed {
                command: format!("cp {} {container}:{dest}", host_path.display()),
                reason: "no space left on device".to_string(),
            });
        }
        self.copies
            .lock()
            .unwrap()
            .push((container.to_string(), host_path.to_path_buf(), dest.to_string()));
        Ok(())
    }

    async fn build(&self, tag: &str, context_dir: &Path) -> Result<ExecResult> {
        self.host_read("build").await;
        self.builds
            .lock()
            .unwrap()
            .push((tag.to_string(), context_dir.to_path_buf()));
        Ok(self.build_result.lock().unwrap().clone())
    }

    async fn push(&self, image: &str) -> Result<()> {
        self.pushes.lock().unwrap().push(image.to_string());
        Ok(())
    }
}

// =============================================================================
// Archives
// =============================================================================

/// Builds an in-memory zip from `(path, contents)` pairs. Paths ending in
/// `/` become directories.
pub fn zip_bytes(entries: &[(&str, &[u8])]) -> Vec<u8> {
    let with_modes: Vec<_> = entries
        .iter()
        .map(|(path, contents)| (*path, *contents, if path.ends_with('/') { 0o755 } else { 0o644 }))
        .collect();
    zip_with_modes(&with_modes)
}

/// Like [`zip_bytes`] with an explicit unix mode per entry.
pub fn zip_with_modes(entries: &[(&str, &[u8], u32)]) -> Vec<u8> {
    let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
    for (path, contents, mode) in entries {
        let options = SimpleFileOptions::default().unix_permissions(*mode);
        if path.ends_with('/') {
            writer.add_directory(*path, options).unwrap();
        } else {
            writer.start_file(*path, options).unwrap();
            writer.write_all(contents).unwrap();
        }
    }
    writer.finish().unwrap().into_inner()
}

/// Builds an in-memory `.tar.xz` from `(path, contents)` pairs.
pub fn tar_xz(entries: &[(&str, &[u8])]) -> Vec<u8> {
    let mut builder = tar::Builder::new(xz2::write::XzEncoder::new(Vec::new(), 6));
    for (path, contents) in entries {
        let mut header = tar::Header::new_gnu();
        header.set_size(contents.len() as u64);
        header.set_mode(0o644);
        builder.append_data(&mut header, path, *contents).unwrap();
    }
    builder.into_inner().unwrap().finish().unwrap()
}

/// Reads a file's permission bits.
pub fn mode_of(path: &Path) -> u32 {
    use std::os::unix::fs::PermissionsExt;
    std::fs::metadata(path).unwrap().permissions().mode() & 0o7777
}

// =============================================================================
// Fixture Add-on
// =============================================================================

/// An add-on whose payload is `system/etc/<id>.conf`.
pub struct FixtureAddon {
    descriptor: AddonDescriptor,
    source: Source,
    boot_args: Vec<&'static str>,
    repairs: &'static [&'static str],
}

pub const ALPHA_URL: &str = "https://fixtures.invalid/alpha.zip";
pub const BETA_URL: &str = "https://fixtures.invalid/beta.zip";

const FIXTURE_ARCHES: &[Arch] = &[Arch::X86_64, Arch::Arm64];

impl FixtureAddon {
    /// Supports `1.0` on x86_64 and arm64; one permission repair.
    pub fn alpha() -> Self {
        Self {
            descriptor: AddonDescriptor {
                id: "alpha",
                name: "Alpha",
                category: AddonCategory::GoogleApps,
                versions: &["1.0"],
            },
            source: Source::unchecked(ALPHA_URL),
            boot_args: vec!["ro.alpha=1"],
            repairs: &["chmod 644 /system/etc/alpha.conf"],
        }
    }

    /// Supports `1.0` and `2.0`; no repairs.
    pub fn beta() -> Self {
        Self {
            descriptor: AddonDescriptor {
                id: "beta",
                name: "Beta",
                category: AddonCategory::CpuTranslationB,
                versions: &["1.0", "2.0"],
            },
            source: Source::unchecked(BETA_URL),
            boot_args: Vec::new(),
            repairs: &[],
        }
    }

    /// The payload this add-on expects to download.
    pub fn payload(&self) -> Vec<u8> {
        let conf = format!("system/etc/{}.conf", self.descriptor.id);
        zip_bytes(&[("system/", b""), ("system/etc/", b""), (conf.as_str(), b"enabled=1\n")])
    }
}

#[async_trait]
impl Addon for FixtureAddon {
    fn descriptor(&self) -> &AddonDescriptor {
        &self.descriptor
    }

    fn manifest(&self) -> SourceManifest {
        SourceManifest::Single {
            source: self.source,
            arches: FIXTURE_ARCHES,
        }
    }

    async fn download(&self, ctx: &AddonContext, version: &str, arch: Arch) -> Result<()> {
        let source = self.resolve(version, arch)?;
        ctx.fetch(self.id(), &source, "payload.zip").await?;
        Ok(())
    }

    async fn extract(&self, ctx: &AddonContext, _version: &str, _arch: Arch) -> Result<()> {
        archive::extract_zip(
            &ctx.staging().download_dir(self.id()).join("payload.zip"),
            &ctx.staging().extract_dir(self.id()),
        )
    }

    async fn stage(&self, ctx: &AddonContext, _version: &str, _arch: Arch, output_dir: &Path) -> Result<()> {
        let out = output_dir.join(self.id());
        reset_dir(&out)?;
        archive::copy_tree(&ctx.staging().extract_dir(self.id()).join("system"), &out.join("system"))?;
        Ok(())
    }

    fn boot_args(&self, _version: &str) -> Vec<&'static str> {
        self.boot_args.clone()
    }

    fn permission_repairs(&self) -> &'static [&'static str] {
        self.repairs
    }
}

// =============================================================================
// Assembly
// =============================================================================

/// Transport serving both fixture payloads.
pub fn serving_transport() -> Arc<StubTransport> {
    let transport = StubTransport::new();
    transport.serve(ALPHA_URL, FixtureAddon::alpha().payload());
    transport.serve(BETA_URL, FixtureAddon::beta().payload());
    transport
}

/// Catalog of `alpha` and `beta` staging under `root`.
pub fn fixture_catalog(root: &Path, transport: Arc<StubTransport>) -> AddonCatalog {
    let ctx = AddonContext::new(transport, StagingRoot::with_path(root));
    AddonCatalog::with_addons(ctx, vec![Arc::new(FixtureAddon::alpha()), Arc::new(FixtureAddon::beta())])
}

/// Config tracking a single container.
pub fn tracked_config(container: &str) -> Arc<MemoryConfigStore> {
    let mut config = Config::default();
    config.add_container(ContainerRecord::new(container, "redroid/redroid:13.0.0-latest"));
    Arc::new(MemoryConfigStore::new(config))
}
