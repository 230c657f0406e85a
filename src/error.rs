//! Error types for report conversion.
//!
//! All errors implement the `std::error::Error` trait and carry structured
//! context (session identifier, file path) so failures can be reported and
//! scoped correctly.
//!
//! ## Error Categories
//!
//! - **Payload Errors**: a line matched the envelope grammar but its embedded
//!   payload is not well-formed
//! - **Buffer Errors**: staging file create/write/flush/close failures
//! - **Discovery Errors**: no report file found, or the report directory is
//!   unreadable
//! - **I/O Errors**: report file read failures
//! - **Config/Export Errors**: startup configuration and output packaging
//!
//! ## Failure Scope
//!
//! Errors are either fatal to a single session or fatal to the whole run:
//!
//! ```rust
//! use debrief::ReportError;
//!
//! let error = ReportError::malformed_payload("frame data", "expected JSON array");
//! assert!(error.is_session_fatal());
//! ```
//!
//! A session-fatal error aborts that session's processing and leaves sibling
//! sessions untouched; a run-fatal error aborts the conversion immediately.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for conversion operations.
pub type Result<T, E = ReportError> = std::result::Result<T, E>;

/// Main error type for report conversion.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum ReportError {
    #[error("malformed payload in {context}: {details}")]
    MalformedPayload { context: String, details: String },

    #[error("staging buffer failure for session '{session_id}'")]
    Buffer {
        session_id: String,
        #[source]
        source: std::io::Error,
    },

    #[error("report discovery failed in {}: {reason}", dir.display())]
    Discovery { dir: PathBuf, reason: String },

    #[error("report file error: {path}")]
    ReportIo {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("configuration error in {}: {reason}", path.display())]
    Config { path: PathBuf, reason: String },

    #[error("export failed: {path}")]
    Export {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("conversion cancelled")]
    Cancelled,
}

impl ReportError {
    /// Returns whether this error is scoped to a single session.
    ///
    /// Session-fatal errors abort only the owning session; the orchestrator
    /// reports the session by identifier, omits it from the output set and
    /// keeps processing siblings. Everything else aborts the run.
    pub fn is_session_fatal(&self) -> bool {
        match self {
            ReportError::MalformedPayload { .. } => true,
            ReportError::Buffer { .. } => true,
            ReportError::Discovery { .. } => false,
            ReportError::ReportIo { .. } => false,
            ReportError::Config { .. } => false,
            ReportError::Export { .. } => false,
            ReportError::Cancelled => false,
        }
    }

    /// Helper constructor for malformed payload errors.
    pub fn malformed_payload(context: impl Into<String>, details: impl Into<String>) -> Self {
        ReportError::MalformedPayload { context: context.into(), details: details.into() }
    }

    /// Helper constructor for staging buffer failures.
    pub fn buffer_failure(session_id: impl Into<String>, source: std::io::Error) -> Self {
        ReportError::Buffer { session_id: session_id.into(), source }
    }

    /// Helper constructor for discovery failures.
    pub fn discovery_failed(dir: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        ReportError::Discovery { dir: dir.into(), reason: reason.into() }
    }

    /// Helper constructor for report file I/O errors.
    pub fn report_io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        ReportError::ReportIo { path: path.into(), source }
    }

    /// Helper constructor for configuration errors.
    pub fn config_error(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        ReportError::Config { path: path.into(), reason: reason.into() }
    }

    /// Helper constructor for export errors.
    pub fn export_failed(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        ReportError::Export { path: path.into(), source }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn error_constructors_validation() {
        let payload_error = ReportError::malformed_payload("session metadata", "bad JSON");
        assert!(matches!(payload_error, ReportError::MalformedPayload { .. }));

        let buffer_error = ReportError::buffer_failure(
            "m1",
            std::io::Error::new(std::io::ErrorKind::PermissionDenied, "test"),
        );
        assert!(matches!(buffer_error, ReportError::Buffer { .. }));

        let discovery_error = ReportError::discovery_failed(PathBuf::from("/logs"), "empty");
        assert!(matches!(discovery_error, ReportError::Discovery { .. }));
    }

    #[test]
    fn error_traits_validation() {
        // Compile-time check: ReportError must be Send + Sync + 'static
        fn assert_send_sync_static<T: Send + Sync + 'static>() {}
        assert_send_sync_static::<ReportError>();

        let error = ReportError::malformed_payload("test", "test");
        let _: &dyn std::error::Error = &error;
    }

    #[test]
    fn failure_scope_classification() {
        assert!(ReportError::malformed_payload("frame data", "x").is_session_fatal());
        assert!(
            ReportError::buffer_failure("m1", std::io::Error::other("disk full")).is_session_fatal()
        );

        assert!(!ReportError::discovery_failed("/logs", "no report files").is_session_fatal());
        assert!(!ReportError::Cancelled.is_session_fatal());
        assert!(!ReportError::config_error("config.json", "missing field").is_session_fatal());
    }

    #[test]
    fn error_messages_contain_context() {
        let error = ReportError::malformed_payload("frame data", "expected array");
        let message = error.to_string();
        assert!(message.contains("frame data"));
        assert!(message.contains("expected array"));

        let error = ReportError::buffer_failure("m1", std::io::Error::other("disk full"));
        assert!(error.to_string().contains("m1"));
    }

    #[test]
    fn buffer_error_preserves_source() {
        let error = ReportError::buffer_failure("m1", std::io::Error::other("underlying failure"));
        let source = std::error::Error::source(&error).expect("Buffer errors carry a source");
        assert_eq!(source.to_string(), "underlying failure");
    }
}
