//! Error types for IGES file operations.

use thiserror::Error;

/// Errors that can occur during IGES file operations.
#[derive(Error, Debug)]
pub enum IgesError {
    /// I/O error reading or writing a file.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Structurally unusable file (no sections, no terminator).
    #[error("Malformed IGES file: {0}")]
    Malformed(String),

    /// A directory entry references data that is not there.
    #[error("Missing entity at directory entry {0}")]
    MissingEntity(usize),

    /// Unsupported entity type code.
    #[error("Unsupported entity type {0}")]
    UnsupportedEntity(i64),

    /// Invalid geometry (e.g. degenerate axis, bad knot vector).
    #[error("Invalid geometry: {0}")]
    InvalidGeometry(String),

    /// The operation was cancelled by the caller.
    #[error("Operation cancelled")]
    Cancelled,
}
