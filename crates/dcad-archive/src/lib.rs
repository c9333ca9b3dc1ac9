#![warn(missing_docs)]

//! Native DCA container format for dcad projects.
//!
//! An archive is a flat sequence of named, length-prefixed entries behind
//! the `ARCH` magic. The mandatory `manifest.json` carries the project and
//! per-body metadata; binary payloads (`MESH`, `SURF`, `CURV`, `SKCH`
//! chunks) carry render meshes, full face geometry with trim loops, and
//! sketches. Every binary read is bounds-checked: a truncated or hostile
//! archive fails with an underflow error instead of producing garbage.
//!
//! # Example
//!
//! ```no_run
//! use dcad_archive::{read_dca, write_dca, DcaWriteOptions};
//!
//! let import = read_dca("project.dca").unwrap();
//! write_dca(&import.model, "copy.dca", &DcaWriteOptions::default()).unwrap();
//! ```

mod bytes;
mod container;
mod error;
mod manifest;

pub use bytes::{ByteReader, ByteWriter};
pub use container::{
    read_dca, read_dca_from_buffer, write_dca, write_dca_to_vec, DcaImport, DcaWriteOptions, MAGIC,
};
pub use error::ArchiveError;
pub use manifest::{BodyMeta, Manifest, ProjectSettings, SketchMeta, MANIFEST_VERSION};
