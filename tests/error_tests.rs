//! Tests for error types.
//!
//! Validates display formatting, category mapping and context wrapping.

use magikrestore::{Error, ErrorKind, ResultExt};
use std::path::PathBuf;

// =============================================================================
// Display Tests
// =============================================================================

#[test]
fn test_not_found_display() {
    let err = Error::container_not_found("abc123", "ID does not exist");
    let msg = err.to_string();

    assert!(msg.contains("abc123"), "should include container ID");
    assert!(msg.contains("not found"), "should indicate not found");
    assert_eq!(err.kind(), ErrorKind::NotFound);
}

#[test]
fn test_sandbox_not_found_display() {
    let err = Error::sandbox_not_found("pod-1", "no such sandbox");
    assert_eq!(err.to_string(), "sandbox pod-1 not found: no such sandbox");
}

#[test]
fn test_import_names_file() {
    let err = Error::Import {
        file: "io.kubernetes.cri-o.Metadata".to_string(),
        reason: "EOF while parsing a value".to_string(),
    };
    assert!(err.to_string().contains("\"io.kubernetes.cri-o.Metadata\""));
    assert_eq!(err.kind(), ErrorKind::Import);
}

#[test]
fn test_unpack_is_import_kind() {
    let err = Error::Unpack {
        path: PathBuf::from("/tmp/cp.tar"),
        reason: "path traversal detected: ../etc/passwd".to_string(),
    };
    assert!(err.to_string().contains("/tmp/cp.tar"));
    assert_eq!(err.kind(), ErrorKind::Import);
}

#[test]
fn test_cancellation_display() {
    assert_eq!(Error::Cancelled.to_string(), "context canceled");
    assert_eq!(Error::DeadlineExceeded.to_string(), "context deadline exceeded");
    assert_eq!(Error::DeadlineExceeded.kind(), ErrorKind::Cancelled);
}

// =============================================================================
// Category Coverage
// =============================================================================

#[test]
fn test_every_variant_has_a_kind() {
    let cases = [
        (Error::Validation("bad".into()), ErrorKind::Validation),
        (
            Error::Reconstruction {
                id: "abc".into(),
                reason: "name in use".into(),
            },
            ErrorKind::Reconstruction,
        ),
        (
            Error::Engine {
                id: "abc".into(),
                reason: "restore failed".into(),
            },
            ErrorKind::Engine,
        ),
        (Error::Serialization("bad json".into()), ErrorKind::Internal),
        (Error::Internal("lock".into()), ErrorKind::Internal),
        (
            Error::Io(std::io::Error::other("disk")),
            ErrorKind::Internal,
        ),
    ];
    for (err, kind) in cases {
        assert_eq!(err.kind(), kind, "{err}");
    }
}

// =============================================================================
// Context Wrapping
// =============================================================================

#[test]
fn test_with_context_is_lazy_and_preserves_kind() {
    let ok: magikrestore::Result<u32> = Ok(1);
    let value = ok
        .with_context(|| -> String { panic!("context built on success") })
        .unwrap();
    assert_eq!(value, 1);

    let err: magikrestore::Result<()> = Err(Error::Engine {
        id: "abc".into(),
        reason: "criu failed".into(),
    });
    let err = err
        .with_context(|| "failed to restore container abc")
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Engine);
    assert!(matches!(err.root(), Error::Engine { .. }));
    assert!(err.to_string().starts_with("failed to restore container abc: "));
}

#[test]
fn test_source_chain() {
    use std::error::Error as _;

    let err = Error::Validation("inner".into()).context("outer");
    assert_eq!(err.source().map(|s| s.to_string()), Some("inner".to_string()));
}

#[test]
fn test_serde_json_conversion() {
    let parse: Result<serde_json::Value, _> = serde_json::from_str("{");
    let err: Error = parse.unwrap_err().into();
    assert!(matches!(err, Error::Serialization(_)));
}
