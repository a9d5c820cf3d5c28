//! Tests for error types.
//!
//! Validates display formatting, the unsupported family and cause unwrapping.

use reddock::Error;
use std::error::Error as _;
use std::path::PathBuf;

// =============================================================================
// Resolution Error Tests
// =============================================================================

#[test]
fn test_addon_not_found_display() {
    let err = Error::AddonNotFound("gapps".to_string());
    assert_eq!(err.to_string(), "addon not found: gapps");
}

#[test]
fn test_unsupported_errors_name_addon_version_and_arch() {
    let err = Error::VersionUnsupported {
        addon: "mindthegapps".to_string(),
        version: "11.0.0".to_string(),
    };
    assert_eq!(err.to_string(), "mindthegapps does not support Android 11.0.0");

    let err = Error::ArchitectureUnsupported {
        addon: "litegapps".to_string(),
        version: "13.0.0".to_string(),
        arch: "x86".to_string(),
    };
    let msg = err.to_string();
    assert!(msg.contains("litegapps"));
    assert!(msg.contains("x86"));
    assert!(msg.contains("13.0.0"));
}

#[test]
fn test_is_unsupported_family() {
    let unsupported = [
        Error::VersionUnsupported {
            addon: "a".into(),
            version: "1".into(),
        },
        Error::ArchitectureUnsupported {
            addon: "a".into(),
            version: "1".into(),
            arch: "arm".into(),
        },
    ];
    for err in &unsupported {
        assert!(err.is_unsupported(), "{err}");
    }

    let other = [
        Error::AddonNotFound("a".into()),
        Error::UnknownArch("mips".into()),
        Error::StagingLocked { addon: "a".into() },
    ];
    for err in &other {
        assert!(!err.is_unsupported(), "{err}");
    }
}

// =============================================================================
// Pipeline Error Tests
// =============================================================================

#[test]
fn test_download_failed_names_url() {
    let err = Error::DownloadFailed {
        url: "https://example.invalid/a.zip".to_string(),
        reason: "HTTP 404 Not Found".to_string(),
    };
    let msg = err.to_string();
    assert!(msg.contains("https://example.invalid/a.zip"));
    assert!(msg.contains("404"));
}

#[test]
fn test_checksum_mismatch_shows_both_digests() {
    let err = Error::ChecksumMismatch {
        path: PathBuf::from("/tmp/x/houdini.zip"),
        expected: "aaaa".to_string(),
        actual: "bbbb".to_string(),
    };
    let msg = err.to_string();
    assert!(msg.contains("/tmp/x/houdini.zip"));
    assert!(msg.contains("expected aaaa"));
    assert!(msg.contains("got bbbb"));
}

#[test]
fn test_preparation_failed_exposes_source() {
    let inner = Error::ExtractFailed {
        archive: PathBuf::from("ndk.zip"),
        reason: "invalid Zip archive".to_string(),
    };
    let err = Error::PreparationFailed {
        addon: "ndk".to_string(),
        source: Box::new(inner),
    };

    assert!(err.to_string().starts_with("failed to prepare ndk: failed to extract ndk.zip"));
    assert!(err.source().is_some());
    assert!(matches!(err.root_cause(), Error::ExtractFailed { .. }));
}

#[test]
fn test_root_cause_unwraps_nested_preparation() {
    let err = Error::PreparationFailed {
        addon: "outer".into(),
        source: Box::new(Error::PreparationFailed {
            addon: "inner".into(),
            source: Box::new(Error::VersionUnsupported {
                addon: "inner".into(),
                version: "9.0.0".into(),
            }),
        }),
    };
    assert!(err.root_cause().is_unsupported());
    assert!(!err.is_unsupported());
}

// =============================================================================
// Container Error Tests
// =============================================================================

#[test]
fn test_container_not_running_reports_status() {
    let err = Error::ContainerNotRunning {
        name: "redroid13".to_string(),
        status: "exited".to_string(),
    };
    assert_eq!(err.to_string(), "container 'redroid13' is not running (status: exited)");
}

#[test]
fn test_build_failed_keeps_output_verbatim() {
    let output = "STEP 1/3: FROM redroid/redroid:13.0.0-latest\nError: no space left on device\n";
    let err = Error::BuildFailed {
        image: "user/custom:13".to_string(),
        output: output.to_string(),
    };
    assert!(err.to_string().ends_with(output));
}

#[test]
fn test_io_error_converts() {
    let io = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied");
    let err: Error = io.into();
    assert!(matches!(err, Error::Io(_)));
    assert!(err.to_string().contains("denied"));
}
