//! reddock - redroid add-on manager
//!
//! Downloads vendor add-ons (ARM translation, Google apps), bakes them into
//! custom redroid images or injects them into running containers.
//!
//! ## Usage
//!
//! ```sh
//! reddock list
//! reddock prepare <addon> <version> [--arch <arch>]
//! reddock build <image> <version> <addon>... [--base <image>] [--push]
//! reddock inject <container> <addon> [--version <v>] [--arch <arch>]
//! reddock inject-multi <container> <addon>... [--version <v>] [--arch <arch>]
//! reddock register <container>
//! reddock cleanup
//! ```
//!
//! ## Container Engine
//!
//! By default, podman is used when `podman ps` works, docker otherwise.
//! Override with `--runtime` or `REDDOCK_RUNTIME`.

use anyhow::Context;
use clap::{Parser, Subcommand};
use reddock::constants::{
    CONFIG_PATH_ENV, DEFAULT_STAGING_DIR, RUNTIME_ENV, STAGING_DIR_ENV, default_base_image,
};
use reddock::injector::InjectionRequest;
use reddock::{
    AddonCatalog, AddonContext, Arch, BuildRequest, CliRuntime, ConfigStore, ContainerRuntime,
    HttpTransport, Injector, JsonConfigStore, Spinner, StagingRoot, register,
};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

// =============================================================================
// CLI Parsing
// =============================================================================

#[derive(Parser)]
#[command(name = "reddock", version, about = "redroid add-on manager")]
struct Cli {
    /// Staging root for downloads and staged add-ons
    #[arg(long, global = true, env = STAGING_DIR_ENV, default_value = DEFAULT_STAGING_DIR)]
    staging_dir: PathBuf,

    /// Container engine binary (docker or podman)
    #[arg(long, global = true, env = RUNTIME_ENV)]
    runtime: Option<String>,

    /// Path of the container config file
    #[arg(long, global = true, env = CONFIG_PATH_ENV)]
    config: Option<PathBuf>,

    /// Skip checksum verification of downloaded archives
    #[arg(long, global = true)]
    no_verify: bool,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// List available add-ons and their supported versions
    List,

    /// Download and stage an add-on without installing it
    Prepare {
        addon: String,
        version: String,
        #[arg(long)]
        arch: Option<Arch>,
    },

    /// Build a redroid image with add-ons baked in
    Build {
        /// Target image name, e.g. myname/redroid:13-gapps
        image: String,
        /// Android version, e.g. 13.0.0
        version: String,
        #[arg(required = true)]
        addons: Vec<String>,
        /// Base image (default: redroid/redroid:<version>-latest)
        #[arg(long)]
        base: Option<String>,
        #[arg(long)]
        arch: Option<Arch>,
        /// Push the image after building
        #[arg(long)]
        push: bool,
        /// Keep the staging directory after the build
        #[arg(long)]
        keep_staging: bool,
    },

    /// Install an add-on into a running container
    Inject {
        container: String,
        addon: String,
        /// Android version (default: inferred from the container's image)
        #[arg(long)]
        version: Option<String>,
        #[arg(long)]
        arch: Option<Arch>,
    },

    /// Install several add-ons into a running container
    ///
    /// Failed add-ons are reported and skipped. The exit status is non-zero
    /// only when the container is not running.
    InjectMulti {
        container: String,
        #[arg(required = true)]
        addons: Vec<String>,
        #[arg(long)]
        version: Option<String>,
        #[arg(long)]
        arch: Option<Arch>,
    },

    /// Print the Android ID and device registration steps
    Register { container: String },

    /// Remove the staging directory
    Cleanup,
}

// =============================================================================
// Setup
// =============================================================================

struct App {
    catalog: Arc<AddonCatalog>,
    config: Arc<dyn ConfigStore>,
    runtime_override: Option<String>,
}

impl App {
    fn new(cli: &Cli) -> anyhow::Result<Self> {
        let transport = HttpTransport::new().context("failed to initialize HTTP client")?;
        let ctx = AddonContext::new(Arc::new(transport), StagingRoot::with_path(&cli.staging_dir))
            .with_verify_checksums(!cli.no_verify);

        let config: Arc<dyn ConfigStore> = match &cli.config {
            Some(path) => Arc::new(JsonConfigStore::with_path(path)),
            None => Arc::new(JsonConfigStore::new()),
        };

        Ok(Self {
            catalog: Arc::new(AddonCatalog::new(ctx)),
            config,
            runtime_override: cli.runtime.clone(),
        })
    }

    async fn runtime(&self) -> Arc<dyn ContainerRuntime> {
        match &self.runtime_override {
            Some(binary) => Arc::new(CliRuntime::new(binary.clone())),
            None => Arc::new(CliRuntime::detect().await),
        }
    }

    fn injector(&self, runtime: Arc<dyn ContainerRuntime>) -> Injector {
        Injector::new(self.catalog.clone(), runtime, self.config.clone())
    }

    /// Version from the flag, else from the container's recorded image.
    fn container_version(&self, container: &str, version: Option<String>) -> anyhow::Result<String> {
        if let Some(version) = version {
            return Ok(version);
        }
        let config = self.config.load()?;
        config
            .container(container)
            .and_then(|record| record.version())
            .with_context(|| format!("cannot infer the Android version of '{container}'; pass --version"))
    }
}

// =============================================================================
// Command Implementations
// =============================================================================

fn cmd_list(app: &App) {
    println!("{:<14} {:<18} {:<18} VERSIONS", "ID", "NAME", "CATEGORY");
    for addon in app.catalog.all() {
        println!(
            "{:<14} {:<18} {:<18} {}",
            addon.id(),
            addon.name(),
            addon.category().to_string(),
            addon.supported_versions().join(", ")
        );
    }
}

async fn cmd_prepare(app: &App, addon: &str, version: &str, arch: Arch) -> anyhow::Result<()> {
    let (spinner, progress) = Spinner::start(format!("Preparing {addon} for Android {version} ({arch})"));
    let result = app.catalog.prepare(addon, version, arch, &progress).await;
    spinner
        .finish(result.is_ok(), format!("{addon} for Android {version} ({arch})"))
        .await;
    Ok(result?)
}

async fn cmd_build(app: &App, request: BuildRequest, keep_staging: bool) -> anyhow::Result<()> {
    let runtime = app.runtime().await;

    let (spinner, progress) = Spinner::start(format!("Building {}", request.target_image));
    let result = app
        .catalog
        .build_custom_image(runtime.as_ref(), &request, &progress)
        .await;
    spinner
        .finish(result.is_ok(), format!("Image {}", request.target_image))
        .await;
    let report = result?;

    for (addon, reason) in &report.skipped {
        eprintln!("skipped {addon}: {reason}");
    }
    println!("Run it with: {} run -itd --privileged {}", runtime.name(), request.target_image);

    if !keep_staging {
        app.catalog.cleanup()?;
    }
    Ok(())
}

async fn cmd_inject(app: &App, container: &str, addon: &str, version: &str, arch: Arch) -> anyhow::Result<()> {
    let runtime = app.runtime().await;
    let injector = app.injector(runtime.clone());

    let (spinner, progress) = Spinner::start(format!("Injecting {addon} into {container}"));
    let result = injector
        .inject_to_container(container, addon, version, arch, &progress)
        .await;
    spinner.finish(result.is_ok(), format!("{addon} → {container}")).await;
    result?;

    println!("Restart the container to apply: {} restart {container}", runtime.name());
    Ok(())
}

async fn cmd_inject_multi(app: &App, container: &str, requests: &[InjectionRequest]) -> anyhow::Result<()> {
    let runtime = app.runtime().await;
    let injector = app.injector(runtime.clone());

    let (spinner, progress) = Spinner::start(format!("Injecting {} add-ons into {container}", requests.len()));
    let result = injector.inject_multiple(container, requests, &progress).await;
    let all_ok = result.as_ref().is_ok_and(|r| r.all_succeeded());
    spinner.finish(all_ok, format!("add-ons → {container}")).await;
    let report = result?;

    for outcome in report.failed() {
        if let Err(e) = &outcome.result {
            eprintln!("failed {}: {e}", outcome.addon);
        }
    }

    let installed: Vec<_> = report.succeeded().collect();
    if installed.is_empty() {
        println!("No add-ons were installed");
        return Ok(());
    }
    println!("Installed: {}", installed.join(", "));
    println!("Restart the container to apply: {} restart {container}", runtime.name());
    Ok(())
}

async fn cmd_register(app: &App, container: &str) -> anyhow::Result<()> {
    let runtime = app.runtime().await;
    let id = register::android_id(runtime.as_ref(), container).await?;
    println!("{}", register::registration_instructions(&id));
    Ok(())
}

fn cmd_cleanup(app: &App) -> anyhow::Result<()> {
    app.catalog.cleanup()?;
    println!("Removed {}", app.catalog.staging().path().display());
    Ok(())
}

// =============================================================================
// Main
// =============================================================================

async fn run(cli: Cli) -> anyhow::Result<()> {
    let app = App::new(&cli)?;

    match cli.command {
        Command::List => cmd_list(&app),
        Command::Prepare { addon, version, arch } => {
            cmd_prepare(&app, &addon, &version, arch.unwrap_or_else(Arch::detect)).await?
        }
        Command::Build {
            image,
            version,
            addons,
            base,
            arch,
            push,
            keep_staging,
        } => {
            let request = BuildRequest {
                base_image: base.unwrap_or_else(|| default_base_image(&version)),
                target_image: image,
                version,
                arch: arch.unwrap_or_else(Arch::detect),
                addons,
                push,
            };
            cmd_build(&app, request, keep_staging).await?
        }
        Command::Inject {
            container,
            addon,
            version,
            arch,
        } => {
            let version = app.container_version(&container, version)?;
            cmd_inject(&app, &container, &addon, &version, arch.unwrap_or_else(Arch::detect)).await?
        }
        Command::InjectMulti {
            container,
            addons,
            version,
            arch,
        } => {
            let version = app.container_version(&container, version)?;
            let arch = arch.unwrap_or_else(Arch::detect);
            let requests: Vec<_> = addons
                .iter()
                .map(|name| InjectionRequest::new(name.as_str(), version.as_str(), arch))
                .collect();
            cmd_inject_multi(&app, &container, &requests).await?
        }
        Command::Register { container } => cmd_register(&app, &container).await?,
        Command::Cleanup => cmd_cleanup(&app)?,
    }

    Ok(())
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)))
        .with_writer(std::io::stderr)
        .init();

    let runtime = match tokio::runtime::Builder::new_multi_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(e) => {
            eprintln!("error: failed to start async runtime: {e}");
            return ExitCode::FAILURE;
        }
    };

    match runtime.block_on(run(cli)) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e:#}");
            ExitCode::FAILURE
        }
    }
}
