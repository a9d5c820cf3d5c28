//! Tests for the add-on catalog.
//!
//! Covers lookup, preparation, recipe generation and the lenient custom
//! image build path.

mod common;

use common::{ALPHA_URL, BETA_URL, FakeRuntime, FixtureAddon, StubTransport, fixture_catalog, serving_transport};
use reddock::catalog::BuildRequest;
use reddock::progress::{PrepareState, ProgressEvent, drain};
use reddock::runtime::ExecResult;
use reddock::{AddonCatalog, AddonContext, Arch, Error, Progress, StagingRoot};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use std::sync::{Arc, Mutex};
use tempfile::TempDir;
use walkdir::WalkDir;

fn snapshot(dir: &Path) -> BTreeMap<String, Vec<u8>> {
    WalkDir::new(dir)
        .into_iter()
        .map(|e| e.unwrap())
        .filter(|e| e.file_type().is_file())
        .map(|e| {
            let relative = e.path().strip_prefix(dir).unwrap().to_string_lossy().into_owned();
            (relative, fs::read(e.path()).unwrap())
        })
        .collect()
}

fn build_request(addons: &[&str]) -> BuildRequest {
    BuildRequest {
        base_image: "redroid/redroid:1.0-latest".to_string(),
        target_image: "tester/redroid:custom".to_string(),
        version: "1.0".to_string(),
        arch: Arch::X86_64,
        addons: addons.iter().map(|a| a.to_string()).collect(),
        push: false,
    }
}

// =============================================================================
// Lookup Tests
// =============================================================================

#[test]
fn test_list_and_get() {
    let temp = TempDir::new().unwrap();
    let catalog = fixture_catalog(temp.path(), StubTransport::new());

    let mut names = catalog.list();
    names.sort_unstable();
    assert_eq!(names, ["alpha", "beta"]);

    assert!(catalog.get("alpha").is_ok());
    assert!(matches!(catalog.get("gamma"), Err(Error::AddonNotFound(name)) if name == "gamma"));
    assert_eq!(catalog.supported_versions("beta").unwrap(), ["1.0", "2.0"]);
}

#[test]
fn test_builtin_catalog_order() {
    let ctx = AddonContext::new(StubTransport::new(), StagingRoot::with_path("/nonexistent"));
    let catalog = AddonCatalog::new(ctx);
    assert_eq!(catalog.list(), ["houdini", "ndk", "litegapps", "mindthegapps", "opengapps"]);
}

// =============================================================================
// Prepare Tests
// =============================================================================

#[tokio::test]
async fn test_prepare_unsupported_version_skips_download() {
    let temp = TempDir::new().unwrap();
    let transport = serving_transport();
    let root = temp.path().join("staging");
    let catalog = fixture_catalog(&root, transport.clone());

    let err = catalog
        .prepare("alpha", "2.0", Arch::X86_64, &Progress::silent())
        .await
        .unwrap_err();

    assert!(matches!(err, Error::PreparationFailed { ref addon, .. } if addon == "alpha"));
    assert!(err.root_cause().is_unsupported());
    assert_eq!(transport.call_count(), 0);
    assert!(!root.exists(), "staging root must stay untouched");
}

#[tokio::test]
async fn test_prepare_unknown_addon_is_not_wrapped() {
    let temp = TempDir::new().unwrap();
    let catalog = fixture_catalog(temp.path(), StubTransport::new());

    let err = catalog
        .prepare("gamma", "1.0", Arch::X86_64, &Progress::silent())
        .await
        .unwrap_err();
    assert!(matches!(err, Error::AddonNotFound(_)));
}

#[tokio::test]
async fn test_prepare_is_idempotent() {
    let first = TempDir::new().unwrap();
    let second = TempDir::new().unwrap();

    let mut outputs = Vec::new();
    for temp in [&first, &second] {
        let catalog = fixture_catalog(temp.path(), serving_transport());
        catalog
            .prepare("beta", "2.0", Arch::Arm64, &Progress::silent())
            .await
            .unwrap();
        // Twice into the same root: the second run wipes and re-stages.
        catalog
            .prepare("beta", "2.0", Arch::Arm64, &Progress::silent())
            .await
            .unwrap();
        outputs.push(snapshot(&temp.path().join("beta")));
    }

    assert_eq!(outputs[0], outputs[1]);
    assert_eq!(outputs[0].get("system/etc/beta.conf").map(Vec::as_slice), Some(&b"enabled=1\n"[..]));
}

#[tokio::test]
async fn test_prepare_reports_state_transitions() {
    let temp = TempDir::new().unwrap();
    let catalog = fixture_catalog(temp.path(), serving_transport());
    let (progress, mut rx) = Progress::channel();

    catalog
        .prepare("alpha", "1.0", Arch::X86_64, &progress)
        .await
        .unwrap();

    let states: Vec<_> = drain(&mut rx)
        .into_iter()
        .filter_map(|e| match e {
            ProgressEvent::State { addon, state } => Some((addon, state)),
            _ => None,
        })
        .collect();
    let expected: Vec<_> = [
        PrepareState::Idle,
        PrepareState::Downloading,
        PrepareState::Extracting,
        PrepareState::Staging,
        PrepareState::Done,
    ]
    .into_iter()
    .map(|s| ("alpha".to_string(), s))
    .collect();
    assert_eq!(states, expected);
}

#[tokio::test]
async fn test_prepare_failure_ends_in_failed_state() {
    let temp = TempDir::new().unwrap();
    let catalog = fixture_catalog(temp.path(), StubTransport::new());
    let (progress, mut rx) = Progress::channel();

    let err = catalog
        .prepare("beta", "1.0", Arch::X86_64, &progress)
        .await
        .unwrap_err();
    assert!(matches!(err.root_cause(), Error::DownloadFailed { url, .. } if url == BETA_URL));

    let last_state = drain(&mut rx).into_iter().rev().find_map(|e| match e {
        ProgressEvent::State { state, .. } => Some(state),
        _ => None,
    });
    assert_eq!(last_state, Some(PrepareState::Failed));
}

#[tokio::test]
async fn test_prepare_different_addons_stay_scoped() {
    let temp = TempDir::new().unwrap();
    let catalog = fixture_catalog(temp.path(), serving_transport());
    let progress = Progress::silent();

    catalog.prepare("alpha", "1.0", Arch::X86_64, &progress).await.unwrap();
    catalog.prepare("beta", "1.0", Arch::X86_64, &progress).await.unwrap();
    // Re-preparing beta must not disturb alpha's output.
    catalog.prepare("beta", "1.0", Arch::X86_64, &progress).await.unwrap();

    assert!(temp.path().join("alpha/system/etc/alpha.conf").is_file());
    assert!(!temp.path().join("alpha/system/etc/beta.conf").exists());
    assert!(temp.path().join("beta/system/etc/beta.conf").is_file());
}

#[tokio::test]
async fn test_concurrent_install_of_same_addon_is_locked() {
    let temp = TempDir::new().unwrap();
    let transport = serving_transport();
    let catalog = fixture_catalog(temp.path(), transport.clone());

    let held = catalog.staging().lock("alpha").unwrap();
    let err = catalog
        .install("alpha", "1.0", Arch::X86_64, &Progress::silent())
        .await
        .unwrap_err();
    assert!(matches!(err, Error::StagingLocked { ref addon } if addon == "alpha"));
    assert_eq!(transport.call_count(), 0);

    // Other add-ons are unaffected while the lock is held.
    catalog
        .install("beta", "1.0", Arch::X86_64, &Progress::silent())
        .await
        .unwrap();

    drop(held);
    catalog
        .install("alpha", "1.0", Arch::X86_64, &Progress::silent())
        .await
        .unwrap();
}

// =============================================================================
// Recipe Tests
// =============================================================================

#[test]
fn test_dockerfile_without_addons_is_base_only() {
    let temp = TempDir::new().unwrap();
    let catalog = fixture_catalog(temp.path(), StubTransport::new());

    let empty: [&str; 0] = [];
    assert_eq!(
        catalog.build_dockerfile("redroid/redroid:13.0.0-latest", &empty).unwrap(),
        "FROM redroid/redroid:13.0.0-latest\n"
    );
}

#[test]
fn test_dockerfile_unknown_addon_fails() {
    let temp = TempDir::new().unwrap();
    let catalog = fixture_catalog(temp.path(), StubTransport::new());

    let err = catalog.build_dockerfile("base", &["alpha", "unknown"]).unwrap_err();
    assert!(matches!(err, Error::AddonNotFound(name) if name == "unknown"));
}

#[test]
fn test_dockerfile_preserves_caller_order() {
    let temp = TempDir::new().unwrap();
    let catalog = fixture_catalog(temp.path(), StubTransport::new());

    let recipe = catalog.build_dockerfile("base", &["beta", "alpha"]).unwrap();
    assert_eq!(recipe, "FROM base\nCOPY beta /\nCOPY alpha /\n");
}

#[test]
fn test_recipe_appends_boot_args() {
    let temp = TempDir::new().unwrap();
    let catalog = fixture_catalog(temp.path(), StubTransport::new());

    let recipe = catalog.build_recipe("base", "1.0", &["alpha", "beta"]).unwrap();
    assert_eq!(
        recipe,
        "FROM base\nCOPY alpha /\nCOPY beta /\nCMD [\"androidboot.redroid_gpu_mode=auto\",\"ro.alpha=1\"]\n"
    );
}

// =============================================================================
// Build Tests
// =============================================================================

#[tokio::test]
async fn test_build_skips_failed_addons() {
    let temp = TempDir::new().unwrap();
    let transport = StubTransport::new();
    transport.serve(ALPHA_URL, FixtureAddon::alpha().payload());
    let catalog = fixture_catalog(temp.path(), transport);
    let runtime = FakeRuntime::running();
    let (progress, mut rx) = Progress::channel();

    let report = catalog
        .build_custom_image(runtime.as_ref(), &build_request(&["alpha", "beta"]), &progress)
        .await
        .unwrap();

    assert_eq!(report.included, ["alpha"]);
    assert_eq!(report.skipped.len(), 1);
    assert_eq!(report.skipped[0].0, "beta");

    let dockerfile = fs::read_to_string(temp.path().join("Dockerfile")).unwrap();
    assert_eq!(dockerfile, report.recipe);
    assert!(dockerfile.contains("COPY alpha /"));
    assert!(!dockerfile.contains("COPY beta /"));
    assert_eq!(fs::read_to_string(temp.path().join(".dockerignore")).unwrap(), ".work\n");

    assert_eq!(*runtime.pulls.lock().unwrap(), ["redroid/redroid:1.0-latest"]);
    let builds = runtime.builds.lock().unwrap().clone();
    assert_eq!(builds, [("tester/redroid:custom".to_string(), temp.path().to_path_buf())]);

    let events = drain(&mut rx);
    assert!(events.iter().any(|e| matches!(e, ProgressEvent::Warning(w) if w.contains("beta"))));
    assert!(events.iter().any(|e| matches!(e, ProgressEvent::Notice(n) if n.contains("FROM redroid/redroid:1.0-latest"))));
}

#[tokio::test]
async fn test_build_holds_staging_until_engine_returns() {
    let temp = TempDir::new().unwrap();
    let catalog = Arc::new(fixture_catalog(temp.path(), serving_transport()));
    let runtime = FakeRuntime::running();

    let rival = catalog.clone();
    let attempts = Arc::new(Mutex::new(Vec::new()));
    let seen = attempts.clone();
    runtime.on_host_read(move |command| {
        assert_eq!(command, "build");
        let rival = rival.clone();
        let seen = seen.clone();
        async move {
            let result = rival.install("alpha", "1.0", Arch::X86_64, &Progress::silent()).await;
            seen.lock().unwrap().push(result.err());
        }
    });

    let report = catalog
        .build_custom_image(runtime.as_ref(), &build_request(&["alpha"]), &Progress::silent())
        .await
        .unwrap();
    assert_eq!(report.included, ["alpha"]);

    let attempts = attempts.lock().unwrap();
    assert_eq!(attempts.len(), 1);
    assert!(matches!(attempts[0], Some(Error::StagingLocked { ref addon }) if addon == "alpha"));
    assert_eq!(
        fs::read_to_string(temp.path().join("alpha/system/etc/alpha.conf")).unwrap(),
        "enabled=1\n"
    );

    catalog.staging().lock("alpha").unwrap();
}

#[tokio::test]
async fn test_build_stages_repeated_addon_once() {
    let temp = TempDir::new().unwrap();
    let transport = serving_transport();
    let catalog = fixture_catalog(temp.path(), transport.clone());
    let runtime = FakeRuntime::running();

    let report = catalog
        .build_custom_image(runtime.as_ref(), &build_request(&["alpha", "beta", "alpha"]), &Progress::silent())
        .await
        .unwrap();

    assert_eq!(report.included, ["alpha", "beta"]);
    assert!(report.skipped.is_empty());
    assert_eq!(report.recipe.matches("COPY alpha /").count(), 1);
    assert_eq!(transport.call_count(), 2);
}

#[tokio::test]
async fn test_build_failure_carries_engine_output() {
    let temp = TempDir::new().unwrap();
    let catalog = fixture_catalog(temp.path(), serving_transport());
    let runtime = FakeRuntime::running();
    *runtime.build_result.lock().unwrap() = ExecResult {
        exit_code: 1,
        stdout: b"Step 2/3 : COPY alpha /\n".to_vec(),
        stderr: b"no space left on device\n".to_vec(),
    };

    let err = catalog
        .build_custom_image(runtime.as_ref(), &build_request(&["alpha"]), &Progress::silent())
        .await
        .unwrap_err();

    match err {
        Error::BuildFailed { image, output } => {
            assert_eq!(image, "tester/redroid:custom");
            assert_eq!(output, "Step 2/3 : COPY alpha /\nno space left on device\n");
        }
        other => panic!("expected BuildFailed, got {other}"),
    }
}

#[tokio::test]
async fn test_build_rejects_invalid_image_name() {
    let temp = TempDir::new().unwrap();
    let catalog = fixture_catalog(temp.path(), serving_transport());
    let runtime = FakeRuntime::running();

    let mut request = build_request(&["alpha"]);
    request.target_image = "Tester/Redroid".to_string();
    let err = catalog
        .build_custom_image(runtime.as_ref(), &request, &Progress::silent())
        .await
        .unwrap_err();
    assert!(matches!(err, Error::InvalidImageName { .. }));

    let mut request = build_request(&["alpha"]);
    request.target_image = "redroid-custom".to_string();
    request.push = true;
    let err = catalog
        .build_custom_image(runtime.as_ref(), &request, &Progress::silent())
        .await
        .unwrap_err();
    assert!(matches!(err, Error::InvalidImageName { .. }));

    assert!(runtime.pulls.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_build_pushes_on_request() {
    let temp = TempDir::new().unwrap();
    let catalog = fixture_catalog(temp.path(), serving_transport());
    let runtime = FakeRuntime::running();

    let mut request = build_request(&["beta"]);
    request.push = true;
    catalog
        .build_custom_image(runtime.as_ref(), &request, &Progress::silent())
        .await
        .unwrap();

    assert_eq!(*runtime.pushes.lock().unwrap(), ["tester/redroid:custom"]);
}

#[tokio::test]
async fn test_cleanup_removes_root() {
    let temp = TempDir::new().unwrap();
    let root = temp.path().join("staging");
    let catalog = fixture_catalog(&root, serving_transport());

    catalog
        .prepare("alpha", "1.0", Arch::X86_64, &Progress::silent())
        .await
        .unwrap();
    assert!(root.exists());

    catalog.cleanup().unwrap();
    assert!(!root.exists());
    catalog.cleanup().unwrap();
}

#[tokio::test]
async fn test_catalog_is_shareable() {
    let temp = TempDir::new().unwrap();
    let catalog = Arc::new(fixture_catalog(temp.path(), serving_transport()));
    let shared = catalog.clone();

    let handle = tokio::spawn(async move {
        shared
            .prepare("alpha", "1.0", Arch::X86_64, &Progress::silent())
            .await
    });
    handle.await.unwrap().unwrap();
    assert!(catalog.staging().addon_dir("alpha").join("system").is_dir());
}
