//! Error types for the native container format.

use thiserror::Error;

/// Errors that can occur reading or writing a DCA archive.
#[derive(Error, Debug)]
pub enum ArchiveError {
    /// I/O error reading or writing a file.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A read would pass the end of the buffer.
    #[error("buffer underflow: needed {needed} bytes, {remaining} remaining")]
    Underflow {
        /// Bytes the field required.
        needed: usize,
        /// Bytes left in the buffer.
        remaining: usize,
    },

    /// Bad magic, bad chunk tag, or inconsistent counts.
    #[error("Malformed archive: {0}")]
    Malformed(String),

    /// The mandatory manifest entry is absent.
    #[error("Archive has no manifest.json entry")]
    MissingManifest,

    /// Manifest serialization problem.
    #[error("Manifest error: {0}")]
    Json(#[from] serde_json::Error),

    /// The operation was cancelled by the caller.
    #[error("Operation cancelled")]
    Cancelled,
}
