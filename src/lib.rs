//! # reddock
//!
//! **Add-on acquisition, staging and injection for redroid containers**
//!
//! redroid runs Android in a container. This crate augments those
//! containers with vendor add-ons: ARM translation layers (Houdini, NDK
//! translation) and Google apps suites (LiteGapps, MindTheGapps, OpenGapps).
//!
//! # Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────┐
//! │                              reddock                                │
//! ├─────────────────────────────────────────────────────────────────────┤
//! │  ┌─────────────────────────────────────────────────────────────┐    │
//! │  │                       Addon Trait                           │    │
//! │  │   resolve(version, arch) → download → extract → stage       │    │
//! │  └─────────────────────────────────────────────────────────────┘    │
//! │          │ Houdini │ NDK │ LiteGapps │ MindTheGapps │ OpenGapps     │
//! │                              │                                      │
//! │  ┌───────────────────────────┼───────────────────────────────┐      │
//! │  │                     AddonCatalog                          │      │
//! │  │  lookup │ prepare │ recipe generation │ image build       │      │
//! │  └───────────────────────────┼───────────────────────────────┘      │
//! │                              │                                      │
//! │  ┌───────────────────────────┼───────────────────────────────┐      │
//! │  │                       Injector                            │      │
//! │  │  liveness │ cp into container │ permission repair │ record│      │
//! │  └───────────────────────────────────────────────────────────┘      │
//! ├─────────────────────────────────────────────────────────────────────┤
//! │                          Collaborators                              │
//! │  ┌──────────────┐  ┌───────────────┐  ┌──────────────┐              │
//! │  │  Transport   │  │ContainerRuntime│ │ ConfigStore  │              │
//! │  │  (reqwest)   │  │docker / podman │ │    (JSON)    │              │
//! │  └──────────────┘  └───────────────┘  └──────────────┘              │
//! └─────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Staging Layout
//!
//! ```text
//! /tmp/reddock-addons/
//! ├── .work/
//! │   ├── houdini.lock          per-add-on install lock
//! │   └── houdini/
//! │       ├── download/         raw archives
//! │       └── extract/          unpacked vendor tree, scratch dirs
//! ├── houdini/system/...        staged output, one subtree per add-on
//! ├── Dockerfile                written by the build path
//! └── .dockerignore             excludes .work from the build context
//! ```
//!
//! # Security Properties
//!
//! - **Path traversal protection**: zip and tar extraction reject absolute
//!   paths and `..` components (see [`archive`]).
//! - **Checksum verification**: recorded MD5 sums are checked after
//!   download unless disabled.
//! - **Scoped staging**: an add-on only ever writes below its own
//!   `<root>/<id>` and `<root>/.work/<id>` subtrees.
//!
//! # Example
//!
//! ```rust,ignore
//! use reddock::{AddonCatalog, AddonContext, Arch, HttpTransport, Progress, StagingRoot};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> reddock::Result<()> {
//!     let ctx = AddonContext::new(Arc::new(HttpTransport::new()?), StagingRoot::new());
//!     let catalog = AddonCatalog::new(ctx);
//!     catalog.prepare("litegapps", "13.0.0", Arch::X86_64, &Progress::silent()).await?;
//!     println!("{}", catalog.build_recipe("redroid/redroid:13.0.0-latest", "13.0.0", &["litegapps"])?);
//!     Ok(())
//! }
//! ```

pub mod addons;
pub mod archive;
pub mod catalog;
pub mod config;
pub mod constants;
pub mod error;
pub mod injector;
pub mod platform;
pub mod progress;
pub mod register;
pub mod runtime;
pub mod staging;

// Re-exports
pub use addons::{Addon, AddonCategory, AddonContext, AddonDescriptor, Source, SourceManifest};
pub use archive::{HttpTransport, Transport};
pub use catalog::{AddonCatalog, BuildReport, BuildRequest};
pub use config::{Config, ConfigStore, ContainerRecord, JsonConfigStore, MemoryConfigStore};
pub use error::{Error, Result};
pub use injector::{InjectionOutcome, InjectionReport, InjectionRequest, Injector};
pub use platform::Arch;
pub use progress::{PrepareState, Progress, ProgressEvent, Spinner};
pub use runtime::{CliRuntime, ContainerRuntime, ContainerStatus, ExecResult};
pub use staging::StagingRoot;
