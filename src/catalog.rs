//! # Add-on Catalog
//!
//! Registry of add-on implementations and the build-time orchestration
//! around them.
//!
//! ## Failure Policies
//!
//! | Call                   | Policy                                              |
//! |------------------------|-----------------------------------------------------|
//! | [`AddonCatalog::install`]  | strict: first stage failure is returned unchanged |
//! | [`AddonCatalog::prepare`]  | strict, wrapped in [`Error::PreparationFailed`]   |
//! | [`AddonCatalog::build_custom_image`] | lenient: an add-on that fails to prepare is skipped with a warning |
//!
//! ## Generated Recipe
//!
//! ```text
//! FROM redroid/redroid:13.0.0-latest
//! COPY houdini /
//! COPY litegapps /
//! CMD ["androidboot.redroid_gpu_mode=auto","ro.dalvik.vm.native.bridge=libhoudini.so",...]
//! ```
//!
//! The recipe is written to `<staging root>/Dockerfile`, so the staging
//! root doubles as the build context.

use crate::addons::{self, Addon, AddonContext};
use crate::constants::{
    BASE_BOOT_ARGS, DOCKERFILE_NAME, DOCKERIGNORE_CONTENTS, DOCKERIGNORE_NAME, validate_image_name,
};
use crate::error::{Error, Result};
use crate::platform::Arch;
use crate::progress::{PrepareState, Progress};
use crate::runtime::ContainerRuntime;
use crate::staging::{StagingLock, StagingRoot};
use std::fs;
use std::sync::Arc;
use tracing::{debug, info};

/// Parameters for [`AddonCatalog::build_custom_image`].
#[derive(Debug, Clone)]
pub struct BuildRequest {
    pub base_image: String,
    pub target_image: String,
    pub version: String,
    pub arch: Arch,
    /// Add-on ids in layer order.
    pub addons: Vec<String>,
    /// Push the image after a successful build.
    pub push: bool,
}

/// What [`AddonCatalog::build_custom_image`] actually baked in.
#[derive(Debug, Clone, Default)]
pub struct BuildReport {
    /// Add-ons present in the image, in layer order.
    pub included: Vec<String>,
    /// Add-ons skipped, with the reason.
    pub skipped: Vec<(String, String)>,
    /// The recipe handed to the engine.
    pub recipe: String,
}

/// Registry of add-ons plus the environment their pipelines run in.
pub struct AddonCatalog {
    addons: Vec<Arc<dyn Addon>>,
    context: AddonContext,
}

impl AddonCatalog {
    /// Catalog of every built-in add-on.
    pub fn new(context: AddonContext) -> Self {
        Self::with_addons(context, addons::builtin())
    }

    /// Catalog of a custom add-on set, in listing order.
    pub fn with_addons(context: AddonContext, addons: Vec<Arc<dyn Addon>>) -> Self {
        Self { addons, context }
    }

    pub fn context(&self) -> &AddonContext {
        &self.context
    }

    pub fn staging(&self) -> &StagingRoot {
        self.context.staging()
    }

    /// Looks up an add-on by id.
    pub fn get(&self, name: &str) -> Result<Arc<dyn Addon>> {
        self.addons
            .iter()
            .find(|a| a.id() == name)
            .cloned()
            .ok_or_else(|| Error::AddonNotFound(name.to_string()))
    }

    /// Add-on ids in registration order.
    pub fn list(&self) -> Vec<&'static str> {
        self.addons.iter().map(|a| a.id()).collect()
    }

    /// All registered add-ons.
    pub fn all(&self) -> &[Arc<dyn Addon>] {
        &self.addons
    }

    pub fn supported_versions(&self, name: &str) -> Result<&'static [&'static str]> {
        Ok(self.get(name)?.supported_versions())
    }

    /// Runs the full pipeline for one add-on into the staging root.
    ///
    /// Errors are returned unchanged. Unsupported combinations fail before
    /// the staging root is touched. The returned lock keeps `<root>/<id>`
    /// from being re-staged by another install while the caller reads it.
    pub async fn install(&self, name: &str, version: &str, arch: Arch, progress: &Progress) -> Result<StagingLock> {
        let addon = self.get(name)?;
        addon.resolve(version, arch)?;

        self.staging().ensure()?;
        let ctx = self.context.with_progress(progress.clone());

        progress.state(addon.id(), PrepareState::Idle);
        match addon.install(&ctx, version, arch, self.staging().path()).await {
            Ok(lock) => {
                progress.state(addon.id(), PrepareState::Done);
                info!("Staged {} for Android {} ({})", addon.id(), version, arch);
                Ok(lock)
            }
            Err(e) => {
                progress.state(addon.id(), PrepareState::Failed);
                Err(e)
            }
        }
    }

    /// Prepares an add-on for later injection or building.
    ///
    /// Unknown names fail with [`Error::AddonNotFound`]; every other failure
    /// is wrapped in [`Error::PreparationFailed`] with the cause preserved.
    pub async fn prepare(&self, name: &str, version: &str, arch: Arch, progress: &Progress) -> Result<()> {
        self.prepare_locked(name, version, arch, progress).await?;
        Ok(())
    }

    async fn prepare_locked(&self, name: &str, version: &str, arch: Arch, progress: &Progress) -> Result<StagingLock> {
        self.install(name, version, arch, progress)
            .await
            .map_err(|e| match e {
                Error::AddonNotFound(_) => e,
                other => Error::PreparationFailed {
                    addon: name.to_string(),
                    source: Box::new(other),
                },
            })
    }

    /// Base directive followed by each add-on's layer instructions, in the
    /// given order. Any unknown name fails before output is produced.
    pub fn build_dockerfile<S: AsRef<str>>(&self, base_image: &str, names: &[S]) -> Result<String> {
        let selected = names
            .iter()
            .map(|n| self.get(n.as_ref()))
            .collect::<Result<Vec<_>>>()?;

        let mut recipe = format!("FROM {base_image}\n");
        for addon in selected {
            recipe.push_str(&addon.build_layer_instructions());
        }
        Ok(recipe)
    }

    /// [`build_dockerfile`](Self::build_dockerfile) terminated by the
    /// boot-argument `CMD` directive.
    pub fn build_recipe<S: AsRef<str>>(&self, base_image: &str, version: &str, names: &[S]) -> Result<String> {
        let mut recipe = self.build_dockerfile(base_image, names)?;

        let mut args: Vec<&str> = BASE_BOOT_ARGS.to_vec();
        for name in names {
            for arg in self.get(name.as_ref())?.boot_args(version) {
                if !args.contains(&arg) {
                    args.push(arg);
                }
            }
        }

        let cmd = serde_json::to_string(&args).map_err(|e| Error::StagingFailed {
            addon: "recipe".to_string(),
            reason: e.to_string(),
        })?;
        recipe.push_str(&format!("CMD {cmd}\n"));
        Ok(recipe)
    }

    /// Prepares the requested add-ons, writes the recipe into the staging
    /// root and builds it with the engine.
    ///
    /// An add-on that fails to prepare is reported as a warning and left
    /// out of the image; the build continues with the rest.
    pub async fn build_custom_image(
        &self,
        runtime: &dyn ContainerRuntime,
        request: &BuildRequest,
        progress: &Progress,
    ) -> Result<BuildReport> {
        validate_image_name(&request.target_image).map_err(|reason| Error::InvalidImageName {
            name: request.target_image.clone(),
            reason: reason.to_string(),
        })?;
        if request.push && !request.target_image.contains('/') {
            return Err(Error::InvalidImageName {
                name: request.target_image.clone(),
                reason: "pushing requires NAMESPACE/REPOSITORY[:TAG]".to_string(),
            });
        }
        for name in &request.addons {
            self.get(name)?;
        }

        self.staging().ensure()?;

        progress.status(format!("Pulling base image {}", request.base_image));
        runtime.pull_image(&request.base_image).await?;
        progress.notice(format!("Base image {} pulled", request.base_image));

        // Held until the engine has read the build context.
        let mut locks = Vec::new();
        let mut report = BuildReport::default();
        for name in &request.addons {
            if report.included.contains(name) || report.skipped.iter().any(|(n, _)| n == name) {
                debug!("{} requested twice, staging once", name);
                continue;
            }
            match self.prepare_locked(name, &request.version, request.arch, progress).await {
                Ok(lock) => {
                    locks.push(lock);
                    report.included.push(name.clone());
                }
                Err(e) => {
                    progress.warning(format!("{e}; continuing without {name}"));
                    report.skipped.push((name.clone(), e.to_string()));
                }
            }
        }

        report.recipe = self.build_recipe(&request.base_image, &request.version, &report.included)?;

        let root = self.staging().path();
        fs::write(root.join(DOCKERFILE_NAME), &report.recipe)?;
        fs::write(root.join(DOCKERIGNORE_NAME), DOCKERIGNORE_CONTENTS)?;
        debug!("Wrote recipe to {}", root.join(DOCKERFILE_NAME).display());
        progress.notice(format!("Dockerfile:\n{}", report.recipe));

        progress.status(format!("Building {}", request.target_image));
        let result = runtime.build(&request.target_image, root).await;
        drop(locks);
        let result = result?;
        if !result.is_success() {
            return Err(Error::BuildFailed {
                image: request.target_image.clone(),
                output: result.combined_output(),
            });
        }
        progress.notice(format!("Built {}", request.target_image));

        if request.push {
            progress.status(format!("Pushing {}", request.target_image));
            runtime.push(&request.target_image).await?;
            progress.notice(format!("Pushed {}", request.target_image));
        }

        Ok(report)
    }

    /// Removes the staging root.
    pub fn cleanup(&self) -> Result<()> {
        self.staging().cleanup()
    }
}
