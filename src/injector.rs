//! # Runtime Injection
//!
//! Installs an add-on into a **running** container:
//!
//! ```text
//! resolve ──► liveness ──► install into staging ──► cp <root>/<id>/* container:/
//!                                                         │
//!                              record in config ◄── sh -c <repair>…
//! ```
//!
//! Resolution and liveness are checked before anything touches the staging
//! root. The add-on name is recorded only after every transfer succeeded;
//! there is no rollback of a partially copied tree.
//!
//! Failure policies:
//! - pipeline and transfer failures are fatal for that add-on,
//! - permission repairs and config bookkeeping only warn,
//! - [`Injector::inject_multiple`] continues past per-add-on failures.

use crate::addons::Addon;
use crate::archive;
use crate::catalog::AddonCatalog;
use crate::config::ConfigStore;
use crate::constants::{CONTAINER_ROOT, CONTAINER_SHELL};
use crate::error::{Error, Result};
use crate::platform::Arch;
use crate::progress::Progress;
use crate::runtime::{ContainerRuntime, ContainerStatus};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// One add-on of a batch injection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InjectionRequest {
    pub name: String,
    pub version: String,
    pub arch: Arch,
}

impl InjectionRequest {
    pub fn new(name: impl Into<String>, version: impl Into<String>, arch: Arch) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
            arch,
        }
    }
}

/// Result of one batch item.
#[derive(Debug)]
pub struct InjectionOutcome {
    pub addon: String,
    pub result: Result<()>,
}

/// Per-item outcomes of [`Injector::inject_multiple`], in request order.
#[derive(Debug, Default)]
pub struct InjectionReport {
    pub outcomes: Vec<InjectionOutcome>,
}

impl InjectionReport {
    /// Outcomes that failed.
    pub fn failed(&self) -> impl Iterator<Item = &InjectionOutcome> {
        self.outcomes.iter().filter(|o| o.result.is_err())
    }

    /// Names of the add-ons that were injected.
    pub fn succeeded(&self) -> impl Iterator<Item = &str> {
        self.outcomes
            .iter()
            .filter(|o| o.result.is_ok())
            .map(|o| o.addon.as_str())
    }

    pub fn all_succeeded(&self) -> bool {
        self.failed().next().is_none()
    }
}

/// Injects staged add-ons into live containers.
pub struct Injector {
    catalog: Arc<AddonCatalog>,
    runtime: Arc<dyn ContainerRuntime>,
    config: Arc<dyn ConfigStore>,
}

impl Injector {
    pub fn new(catalog: Arc<AddonCatalog>, runtime: Arc<dyn ContainerRuntime>, config: Arc<dyn ConfigStore>) -> Self {
        Self {
            catalog,
            runtime,
            config,
        }
    }

    pub fn catalog(&self) -> &AddonCatalog {
        &self.catalog
    }

    /// Installs one add-on into a running container.
    pub async fn inject_to_container(
        &self,
        container: &str,
        addon: &str,
        version: &str,
        arch: Arch,
        progress: &Progress,
    ) -> Result<()> {
        let resolved = self.catalog.get(addon)?;
        resolved.resolve(version, arch)?;

        self.ensure_running(container).await?;
        self.inject_resolved(container, resolved.as_ref(), version, arch, progress)
            .await
    }

    /// Installs several add-ons in order, continuing past failures.
    ///
    /// Only a dead container aborts the whole batch.
    pub async fn inject_multiple(
        &self,
        container: &str,
        requests: &[InjectionRequest],
        progress: &Progress,
    ) -> Result<InjectionReport> {
        self.ensure_running(container).await?;

        let mut report = InjectionReport::default();
        for request in requests {
            let resolved = self
                .catalog
                .get(&request.name)
                .and_then(|addon| addon.resolve(&request.version, request.arch).map(|_| addon));
            let result = match resolved {
                Ok(addon) => {
                    self.inject_resolved(container, addon.as_ref(), &request.version, request.arch, progress)
                        .await
                }
                Err(e) => Err(e),
            };

            if let Err(e) = &result {
                progress.warning(format!("{}: {e}", request.name));
            }
            report.outcomes.push(InjectionOutcome {
                addon: request.name.clone(),
                result,
            });
        }
        Ok(report)
    }

    async fn ensure_running(&self, container: &str) -> Result<()> {
        let status = self.runtime.status(container).await?;
        if status != ContainerStatus::Running {
            return Err(Error::ContainerNotRunning {
                name: container.to_string(),
                status: status.to_string(),
            });
        }
        Ok(())
    }

    async fn inject_resolved(
        &self,
        container: &str,
        addon: &dyn Addon,
        version: &str,
        arch: Arch,
        progress: &Progress,
    ) -> Result<()> {
        let id = addon.id();
        // Held until the add-on is recorded.
        let _lock = self.catalog.install(id, version, arch, progress).await?;

        let staged = self.catalog.staging().addon_dir(id);
        let entries = archive::read_dir_sorted(&staged).map_err(|e| Error::TransferFailed {
            container: container.to_string(),
            path: staged.clone(),
            reason: e.to_string(),
        })?;

        for entry in entries {
            progress.status(format!("Copying {} to {container}", entry.display()));
            self.runtime
                .copy_into(container, &entry, CONTAINER_ROOT)
                .await
                .map_err(|e| Error::TransferFailed {
                    container: container.to_string(),
                    path: entry.clone(),
                    reason: e.to_string(),
                })?;
            debug!("Copied {} into {}", entry.display(), container);
        }

        self.repair_permissions(container, addon, progress).await;
        self.record(container, id, progress);

        info!("Injected {} into {}", id, container);
        progress.notice(format!("{} installed into {container}", addon.name()));
        Ok(())
    }

    async fn repair_permissions(&self, container: &str, addon: &dyn Addon, progress: &Progress) {
        for &repair in addon.permission_repairs() {
            progress.status(format!("Running {repair}"));
            match self.runtime.exec(container, &[CONTAINER_SHELL, "-c", repair]).await {
                Ok(result) if result.is_success() => debug!("{} succeeded", repair),
                Ok(result) => progress.warning(format!(
                    "'{repair}' exited with {}: {}",
                    result.exit_code,
                    result.combined_output().trim()
                )),
                Err(e) => progress.warning(format!("'{repair}' failed: {e}")),
            }
        }
    }

    fn record(&self, container: &str, addon: &str, progress: &Progress) {
        let mut config = match self.config.load() {
            Ok(config) => config,
            Err(e) => {
                progress.warning(format!("{addon} installed but not recorded: {e}"));
                return;
            }
        };

        let Some(record) = config.container_mut(container) else {
            warn!("Container {} is not tracked, not recording {}", container, addon);
            progress.warning(format!("{container} is not tracked in the config; {addon} not recorded"));
            return;
        };

        if !record.record_addon(addon) {
            debug!("{} already recorded for {}", addon, container);
            return;
        }

        if let Err(e) = self.config.save(&config) {
            progress.warning(format!("{addon} installed but not recorded: {e}"));
        }
    }
}
