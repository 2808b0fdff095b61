//! Error types for the checkpoint/restore layer.
//!
//! Every failure belongs to one of the categories in [`ErrorKind`]. Errors
//! raised deep inside an operation are wrapped with the operation's context
//! (archive path, container or pod id, failing file name) via [`ResultExt`],
//! and [`Error::kind`] sees through those wrappers.

use std::path::PathBuf;

/// Result type alias for checkpoint/restore operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Broad failure category, independent of context wrapping.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Feature disabled, bad path, malformed request. No side effects yet.
    Validation,
    /// Container, pod or archive absent.
    NotFound,
    /// Corrupt archive or unparseable metadata.
    Import,
    /// Name/id conflict, sandbox stopped, storage failure.
    Reconstruction,
    /// Opaque failure reported by the checkpoint/restore engine.
    Engine,
    /// The caller cancelled the request or its deadline passed.
    Cancelled,
    /// Local I/O, serialization or internal failure.
    Internal,
}

/// Errors that can occur in the checkpoint/restore layer.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    // =========================================================================
    // Request Errors
    // =========================================================================
    /// The request cannot be served as given.
    #[error("{0}")]
    Validation(String),

    /// A container, pod or archive does not exist.
    #[error("{kind} {id} not found: {reason}")]
    NotFound {
        kind: &'static str,
        id: String,
        reason: String,
    },

    // =========================================================================
    // Import Errors
    // =========================================================================
    /// An archive or one of its metadata files could not be read.
    #[error("failed to read {file:?}: {reason}")]
    Import { file: String, reason: String },

    /// Unpacking the archive itself failed.
    #[error("unpacking of checkpoint archive {} failed: {reason}", path.display())]
    Unpack { path: PathBuf, reason: String },

    // =========================================================================
    // Reconstruction Errors
    // =========================================================================
    /// Rebuilding a container or pod failed.
    #[error("failed to reconstruct '{id}': {reason}")]
    Reconstruction { id: String, reason: String },

    // =========================================================================
    // Engine Errors
    // =========================================================================
    /// The checkpoint/restore engine reported a failure.
    #[error("checkpoint/restore engine failed for '{id}': {reason}")]
    Engine { id: String, reason: String },

    // =========================================================================
    // Cancellation
    // =========================================================================
    /// The request was cancelled by the caller.
    #[error("context canceled")]
    Cancelled,

    /// The request deadline passed.
    #[error("context deadline exceeded")]
    DeadlineExceeded,

    // =========================================================================
    // I/O Errors
    // =========================================================================
    /// Generic I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Internal error (should not happen).
    #[error("internal error: {0}")]
    Internal(String),

    // =========================================================================
    // Wrapping
    // =========================================================================
    /// An error annotated with the operation it interrupted.
    #[error("{context}: {source}")]
    Context {
        context: String,
        #[source]
        source: Box<Error>,
    },
}

impl Error {
    /// Shorthand for a not-found container.
    pub fn container_not_found(id: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::NotFound {
            kind: "container",
            id: id.into(),
            reason: reason.into(),
        }
    }

    /// Shorthand for a not-found sandbox.
    pub fn sandbox_not_found(id: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::NotFound {
            kind: "sandbox",
            id: id.into(),
            reason: reason.into(),
        }
    }

    /// Returns the category of this error, looking through context wrappers.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Validation(_) => ErrorKind::Validation,
            Self::NotFound { .. } => ErrorKind::NotFound,
            Self::Import { .. } | Self::Unpack { .. } => ErrorKind::Import,
            Self::Reconstruction { .. } => ErrorKind::Reconstruction,
            Self::Engine { .. } => ErrorKind::Engine,
            Self::Cancelled | Self::DeadlineExceeded => ErrorKind::Cancelled,
            Self::Io(_) | Self::Serialization(_) | Self::Internal(_) => ErrorKind::Internal,
            Self::Context { source, .. } => source.kind(),
        }
    }

    /// Returns the innermost error beneath any context wrappers.
    pub fn root(&self) -> &Error {
        match self {
            Self::Context { source, .. } => source.root(),
            other => other,
        }
    }

    /// Wraps this error with a context message.
    pub fn context(self, context: impl Into<String>) -> Self {
        Self::Context {
            context: context.into(),
            source: Box::new(self),
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Self::Serialization(e.to_string())
    }
}

/// Adds operation context to fallible results.
pub trait ResultExt<T> {
    /// Wraps the error with a fixed message.
    fn context(self, context: impl Into<String>) -> Result<T>;

    /// Wraps the error with a lazily built message.
    fn with_context<F, S>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> S,
        S: Into<String>;
}

impl<T, E: Into<Error>> ResultExt<T> for std::result::Result<T, E> {
    fn context(self, context: impl Into<String>) -> Result<T> {
        self.map_err(|e| e.into().context(context))
    }

    fn with_context<F, S>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> S,
        S: Into<String>,
    {
        self.map_err(|e| e.into().context(f()))
    }
}
