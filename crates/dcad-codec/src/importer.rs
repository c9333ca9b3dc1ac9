//! The import entry point: file dispatch, unit fallback, sewing, stats.

use std::collections::HashMap;
use std::path::Path;

use crate::options::{import_tolerance, ImportOptions};
use dcad_iges::{read_iges_from_buffer, IgesError, IgesReadOptions};
use dcad_math::Point3;
use dcad_model::{Model, ProgressReporter};
use dcad_step::{read_step_from_buffer, StepError, StepReadOptions};

/// Per-import statistics, available from [`Importer::stats`].
#[derive(Debug, Clone, Default)]
pub struct ImportStats {
    /// Raw records or directory entries ingested.
    pub entity_count: usize,
    /// Bodies in the returned model.
    pub body_count: usize,
    /// Faces across all bodies.
    pub face_count: usize,
    /// Millimeters per file unit applied.
    pub unit_scale: f64,
    /// Recoverable problems, in encounter order.
    pub warnings: Vec<String>,
}

/// Imports interchange files into [`Model`]s.
///
/// Errors never escape as panics or results: a failed import returns
/// `None` and leaves the message in [`Importer::error_message`]. A
/// cancelled import additionally sets [`Importer::was_cancelled`] and
/// reports no warnings.
#[derive(Debug, Default)]
pub struct Importer {
    error: Option<String>,
    stats: ImportStats,
    cancelled: bool,
}

impl Importer {
    /// A fresh importer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Last import's error message, empty when the import succeeded.
    pub fn error_message(&self) -> &str {
        self.error.as_deref().unwrap_or("")
    }

    /// Last import's statistics.
    pub fn stats(&self) -> &ImportStats {
        &self.stats
    }

    /// True when the last import ended on a cancellation request.
    pub fn was_cancelled(&self) -> bool {
        self.cancelled
    }

    /// Import a file, dispatching on its extension.
    ///
    /// Returns `None` on failure; see [`Importer::error_message`].
    pub fn import_file(&mut self, path: impl AsRef<Path>, options: &ImportOptions) -> Option<Model> {
        let path = path.as_ref();
        self.error = None;
        self.stats = ImportStats::default();
        self.cancelled = false;

        let data = match std::fs::read(path) {
            Ok(d) => d,
            Err(e) => {
                self.error = Some(format!("I/O error: {e}"));
                return None;
            }
        };

        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase())
            .unwrap_or_default();

        match ext.as_str() {
            "step" | "stp" => self.import_step(&data, options),
            "igs" | "iges" => self.import_iges(&data, options),
            "dca" => self.import_dca(&data, options),
            other => {
                self.error = Some(format!("unsupported file extension '{other}'"));
                None
            }
        }
    }

    fn finish(&mut self, mut model: Model, options: &ImportOptions) -> Option<Model> {
        if options.sew_faces {
            sew_model(&mut model, options.sew_tolerance);
        }
        if !options.import_as_assembly && model.bodies.len() > 1 {
            tracing::debug!(target: "dcad", bodies = model.bodies.len(), "keeping bodies separate");
        }
        self.stats.body_count = model.bodies.len();
        self.stats.face_count = model.face_count();
        Some(model)
    }

    fn import_step(&mut self, data: &[u8], options: &ImportOptions) -> Option<Model> {
        let read_options = StepReadOptions {
            assumed_scale: options.assumed_units.to_mm(),
            import_colors: options.import_colors,
            tolerance: import_tolerance(options),
            ..StepReadOptions::default()
        };
        let mut progress = ProgressReporter::new(options.progress.clone());
        match read_step_from_buffer(data, &read_options, &options.cancel, &mut progress) {
            Ok(import) => {
                self.stats.entity_count = import.entity_count;
                self.stats.unit_scale = import.scale;
                self.stats.warnings = import.warnings;
                self.finish(import.model, options)
            }
            Err(StepError::Cancelled) => {
                self.cancelled = true;
                self.error = Some(StepError::Cancelled.to_string());
                None
            }
            Err(e) => {
                self.error = Some(e.to_string());
                None
            }
        }
    }

    fn import_iges(&mut self, data: &[u8], options: &ImportOptions) -> Option<Model> {
        let read_options = IgesReadOptions {
            assumed_scale: options.assumed_units.to_mm(),
            import_colors: options.import_colors,
            tolerance: import_tolerance(options),
            ..IgesReadOptions::default()
        };
        let mut progress = ProgressReporter::new(options.progress.clone());
        match read_iges_from_buffer(data, &read_options, &options.cancel, &mut progress) {
            Ok(import) => {
                self.stats.entity_count = import.entity_count;
                self.stats.unit_scale = import.scale;
                self.stats.warnings = import.warnings;
                self.finish(import.model, options)
            }
            Err(IgesError::Cancelled) => {
                self.cancelled = true;
                self.error = Some(IgesError::Cancelled.to_string());
                None
            }
            Err(e) => {
                self.error = Some(e.to_string());
                None
            }
        }
    }

    fn import_dca(&mut self, data: &[u8], options: &ImportOptions) -> Option<Model> {
        match dcad_archive::read_dca_from_buffer(data, &options.cancel) {
            Ok(import) => {
                self.stats.entity_count = import.model.face_count();
                self.stats.unit_scale = 1.0;
                self.stats.warnings = import.warnings;
                self.finish(import.model, options)
            }
            Err(dcad_archive::ArchiveError::Cancelled) => {
                self.cancelled = true;
                self.error = Some(dcad_archive::ArchiveError::Cancelled.to_string());
                None
            }
            Err(e) => {
                self.error = Some(e.to_string());
                None
            }
        }
    }
}

/// Import the in-memory contents of a file with a known extension.
///
/// Library-level convenience that skips the filesystem; the CLI and tests
/// use it with synthesized buffers.
pub fn import_buffer(
    data: &[u8],
    extension: &str,
    options: &ImportOptions,
    importer: &mut Importer,
) -> Option<Model> {
    importer.error = None;
    importer.stats = ImportStats::default();
    importer.cancelled = false;
    match extension.to_ascii_lowercase().as_str() {
        "step" | "stp" => importer.import_step(data, options),
        "igs" | "iges" => importer.import_iges(data, options),
        "dca" => importer.import_dca(data, options),
        other => {
            importer.error = Some(format!("unsupported file extension '{other}'"));
            None
        }
    }
}

/// Snap edge endpoints that fall within `tolerance` of each other onto a
/// shared position, so faces meet exactly after lossy interchange.
fn sew_model(model: &mut Model, tolerance: f64) {
    if tolerance <= 0.0 {
        return;
    }
    for body in &mut model.bodies {
        let mut clusters: HashMap<(i64, i64, i64), Point3> = HashMap::new();
        let key = |p: &Point3| -> (i64, i64, i64) {
            (
                (p.x / tolerance).round() as i64,
                (p.y / tolerance).round() as i64,
                (p.z / tolerance).round() as i64,
            )
        };

        // First pass: the first point seen in a cell is its anchor.
        for face in &body.faces {
            for ring in std::iter::once(&face.outer).chain(face.inner.iter()) {
                for edge in &ring.edges {
                    clusters.entry(key(&edge.start)).or_insert(edge.start);
                    clusters.entry(key(&edge.end)).or_insert(edge.end);
                }
            }
        }

        // Second pass: snap endpoints onto their cell anchors.
        for face in &mut body.faces {
            for ring in std::iter::once(&mut face.outer).chain(face.inner.iter_mut()) {
                for edge in &mut ring.edges {
                    if let Some(anchor) = clusters.get(&key(&edge.start)) {
                        edge.start = *anchor;
                    }
                    if let Some(anchor) = clusters.get(&key(&edge.end)) {
                        edge.end = *anchor;
                    }
                    // Straight edges follow their endpoints.
                    if let Some(curve) = &mut edge.curve {
                        if curve.degree == 1 && curve.control_points.len() == 2 {
                            *curve = dcad_nurbs::NurbsCurve::line_segment(edge.start, edge.end);
                        }
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dcad_model::{Body, Edge, Face, Loop};
    use dcad_nurbs::NurbsSurface;
    use dcad_math::{Dir3, Vec3};

    #[test]
    fn test_unsupported_extension_sets_error() {
        let mut importer = Importer::new();
        let r = import_buffer(b"", "xyz", &ImportOptions::default(), &mut importer);
        assert!(r.is_none());
        assert!(importer.error_message().contains("unsupported"));
        assert!(!importer.was_cancelled());
    }

    #[test]
    fn test_step_buffer_import_populates_stats() {
        let step = "ISO-10303-21;\nHEADER;\nENDSEC;\nDATA;\n#1 = CARTESIAN_POINT('', (0.0, 0.0, 0.0));\nENDSEC;\nEND-ISO-10303-21;\n";
        let mut importer = Importer::new();
        let model = import_buffer(
            step.as_bytes(),
            "step",
            &ImportOptions::default(),
            &mut importer,
        );
        let model = model.unwrap();
        assert_eq!(model.bodies.len(), 0);
        assert_eq!(importer.stats().entity_count, 1);
        // "no bodies" is a recoverable warning.
        assert!(!importer.stats().warnings.is_empty());
        assert!(importer.error_message().is_empty());
    }

    #[test]
    fn test_cancelled_import_has_no_warnings() {
        let step = "ISO-10303-21;\nHEADER;\nENDSEC;\nDATA;\nENDSEC;\nEND-ISO-10303-21;\n";
        let options = ImportOptions::default();
        options.cancel.cancel();
        let mut importer = Importer::new();
        let r = import_buffer(step.as_bytes(), "step", &options, &mut importer);
        assert!(r.is_none());
        assert!(importer.was_cancelled());
        assert!(importer.stats().warnings.is_empty());
        assert!(!importer.error_message().is_empty());
    }

    #[test]
    fn test_dca_underflow_message() {
        // Valid magic, one entry whose declared length overruns the buffer.
        let mut bytes = Vec::new();
        bytes.extend_from_slice(&0x41524348u32.to_le_bytes());
        bytes.extend_from_slice(&1u32.to_le_bytes());
        bytes.extend_from_slice(&13u32.to_le_bytes());
        bytes.extend_from_slice(b"manifest.json");
        bytes.extend_from_slice(&9999u32.to_le_bytes());
        bytes.extend_from_slice(b"short");
        let mut importer = Importer::new();
        let r = import_buffer(&bytes, "dca", &ImportOptions::default(), &mut importer);
        assert!(r.is_none());
        assert!(importer.error_message().contains("underflow"));
    }

    #[test]
    fn test_sewing_snaps_nearby_endpoints() {
        let mut model = Model::new("m");
        let mut body = Body::new("b");
        let a = Point3::new(0.0, 0.0, 0.0);
        let b = Point3::new(10.0, 0.0, 0.0);
        let b_off = Point3::new(10.0, 1e-4, 0.0);
        let c = Point3::new(10.0, 10.0, 0.0);
        let face = Face {
            outer: Loop::new(vec![Edge::segment(a, b), Edge::segment(b_off, c)]),
            inner: Vec::new(),
            surface: NurbsSurface::plane_patch(
                Point3::origin(),
                Dir3::new_normalize(Vec3::z()),
                None,
                10.0,
            ),
            same_sense: true,
            color: Default::default(),
        };
        body.faces.push(face);
        model.bodies.push(body);

        sew_model(&mut model, 1e-3);
        let ring = &model.bodies[0].faces[0].outer;
        assert_eq!(ring.edges[0].end, ring.edges[1].start);
    }
}
