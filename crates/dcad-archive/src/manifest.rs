//! The mandatory `manifest.json` entry of a DCA archive.

use serde::{Deserialize, Serialize};

/// Current manifest format version.
pub const MANIFEST_VERSION: u32 = 1;

/// Top-level manifest: format version, project settings, and metadata for
/// every payload entry in the archive.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Manifest {
    /// Manifest format version (currently 1).
    pub version: u32,
    /// Project-wide settings.
    pub project: ProjectSettings,
    /// Per-body metadata, in body order.
    pub bodies: Vec<BodyMeta>,
    /// Per-sketch metadata, in sketch order.
    #[serde(default)]
    pub sketches: Vec<SketchMeta>,
}

/// Project-wide settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectSettings {
    /// Project name.
    pub name: String,
    /// Length unit of all stored coordinates.
    pub units: String,
    /// Application that wrote the archive.
    pub application: String,
}

/// Metadata for one body.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BodyMeta {
    /// Body name.
    pub name: String,
    /// Display color, RGB in [0, 1].
    pub color: [f64; 3],
    /// Closed manifold solid vs. open shell.
    pub is_solid: bool,
    /// Number of `surfaces/body_<i>_face_<j>.bin` entries.
    pub face_count: u32,
}

/// Metadata for one sketch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SketchMeta {
    /// Sketch name.
    pub name: String,
}
