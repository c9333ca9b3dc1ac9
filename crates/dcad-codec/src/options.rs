//! Import and export options, units, and format/extension mapping.

use dcad_math::{CoordinateSystem, Tolerance};
use dcad_model::{CancelToken, ProgressFn};
use dcad_tessellate::Quality;
use std::path::Path;

/// Length units exposed at the codec boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Units {
    /// Millimeters.
    #[default]
    Millimetres,
    /// Centimeters.
    Centimetres,
    /// Meters.
    Metres,
    /// Inches.
    Inches,
    /// Feet.
    Feet,
}

impl Units {
    /// Millimeters per one of this unit (import direction).
    pub fn to_mm(&self) -> f64 {
        match self {
            Units::Millimetres => 1.0,
            Units::Centimetres => 10.0,
            Units::Metres => 1000.0,
            Units::Inches => 25.4,
            Units::Feet => 304.8,
        }
    }

    /// File units per internal millimeter (export direction).
    pub fn scale_factor(&self) -> f64 {
        1.0 / self.to_mm()
    }
}

/// Supported export formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Format {
    /// STEP AP203 (configuration-controlled design).
    StepAp203,
    /// STEP AP214 (automotive design).
    #[default]
    StepAp214,
    /// IGES 5.x.
    Iges,
    /// ASCII STL (tessellated).
    StlAscii,
    /// Binary STL (tessellated).
    StlBinary,
    /// Wavefront OBJ (tessellated).
    Obj,
    /// Native DCA container.
    Dca,
}

impl Format {
    /// Canonical file extension for the format.
    pub fn extension(&self) -> &'static str {
        match self {
            Format::StepAp203 | Format::StepAp214 => "step",
            Format::Iges => "igs",
            Format::StlAscii | Format::StlBinary => "stl",
            Format::Obj => "obj",
            Format::Dca => "dca",
        }
    }

    /// Guess the export format from a path's extension.
    pub fn from_path(path: &Path) -> Option<Format> {
        let ext = path.extension()?.to_str()?.to_ascii_lowercase();
        match ext.as_str() {
            "step" | "stp" => Some(Format::StepAp214),
            "igs" | "iges" => Some(Format::Iges),
            "stl" => Some(Format::StlBinary),
            "obj" => Some(Format::Obj),
            "dca" => Some(Format::Dca),
            _ => None,
        }
    }
}

/// Options controlling import.
#[derive(Clone)]
pub struct ImportOptions {
    /// Units assumed when the file does not declare any.
    pub assumed_units: Units,
    /// Snap almost-touching edge endpoints together.
    pub sew_faces: bool,
    /// Sewing tolerance in internal units (mm).
    pub sew_tolerance: f64,
    /// Reserved: geometric healing beyond sewing is not performed.
    pub heal_geometry: bool,
    /// Keep bodies separate rather than merging into one part.
    pub import_as_assembly: bool,
    /// Import presentation colors.
    pub import_colors: bool,
    /// Reserved: layer/level data is parsed but not yet surfaced on the
    /// model.
    pub import_layers: bool,
    /// Tessellation quality for caller-facing meshes.
    pub tessellation_quality: Quality,
    /// Optional progress sink (percent complete, monotone).
    pub progress: Option<ProgressFn>,
    /// Cooperative cancellation token.
    pub cancel: CancelToken,
}

impl Default for ImportOptions {
    fn default() -> Self {
        Self {
            assumed_units: Units::Millimetres,
            sew_faces: false,
            sew_tolerance: 1e-3,
            heal_geometry: false,
            import_as_assembly: false,
            import_colors: true,
            import_layers: false,
            tessellation_quality: Quality::Standard,
            progress: None,
            cancel: CancelToken::new(),
        }
    }
}

impl std::fmt::Debug for ImportOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ImportOptions")
            .field("assumed_units", &self.assumed_units)
            .field("sew_faces", &self.sew_faces)
            .field("sew_tolerance", &self.sew_tolerance)
            .field("import_colors", &self.import_colors)
            .field("tessellation_quality", &self.tessellation_quality)
            .finish_non_exhaustive()
    }
}

/// Options controlling export.
#[derive(Clone)]
pub struct ExportOptions {
    /// Target format.
    pub format: Format,
    /// Length unit of the written file.
    pub units: Units,
    /// Target coordinate frame.
    pub coordinate_system: CoordinateSystem,
    /// Tessellation quality for mesh formats.
    pub tessellation_quality: Quality,
    /// Emit presentation colors (STEP AP214).
    pub include_colors: bool,
    /// Reserved: the model carries no layer data to emit.
    pub include_layer_info: bool,
    /// Keep bodies as separate parts.
    pub export_as_assembly: bool,
    /// Application name written into headers.
    pub application_name: String,
    /// Application version written into headers.
    pub application_version: String,
    /// Author written into headers.
    pub author: String,
    /// Organization written into headers.
    pub organization: String,
    /// IGES specification version flag (11 = 5.3).
    pub iges_version: i64,
    /// Emit IGES color entities.
    pub iges_include_colors: bool,
    /// Write per-facet normals in STL output.
    pub stl_include_normals: bool,
    /// Reserved: the model carries no visibility flags.
    pub export_hidden: bool,
    /// Reserved: coplanar-face merging is not performed.
    pub merge_coplanar: bool,
    /// Reserved: geometric healing beyond sewing is not performed.
    pub heal_geometry: bool,
    /// Timestamp override for reproducible output.
    pub timestamp: Option<String>,
    /// Optional progress sink.
    pub progress: Option<ProgressFn>,
    /// Cooperative cancellation token.
    pub cancel: CancelToken,
}

impl Default for ExportOptions {
    fn default() -> Self {
        Self {
            format: Format::StepAp214,
            units: Units::Millimetres,
            coordinate_system: CoordinateSystem::RightHandedYUp,
            tessellation_quality: Quality::Standard,
            include_colors: true,
            include_layer_info: false,
            export_as_assembly: false,
            application_name: "dcad".into(),
            application_version: env!("CARGO_PKG_VERSION").into(),
            author: String::new(),
            organization: String::new(),
            iges_version: 11,
            iges_include_colors: true,
            stl_include_normals: true,
            export_hidden: false,
            merge_coplanar: false,
            heal_geometry: false,
            timestamp: None,
            progress: None,
            cancel: CancelToken::new(),
        }
    }
}

impl std::fmt::Debug for ExportOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExportOptions")
            .field("format", &self.format)
            .field("units", &self.units)
            .field("coordinate_system", &self.coordinate_system)
            .field("include_colors", &self.include_colors)
            .field("tessellation_quality", &self.tessellation_quality)
            .finish_non_exhaustive()
    }
}

/// Tolerance derived from import options.
pub(crate) fn import_tolerance(options: &ImportOptions) -> Tolerance {
    Tolerance {
        linear: if options.sew_faces {
            options.sew_tolerance.max(Tolerance::DEFAULT.linear)
        } else {
            Tolerance::DEFAULT.linear
        },
        angular: Tolerance::DEFAULT.angular,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unit_scales() {
        assert_eq!(Units::Millimetres.to_mm(), 1.0);
        assert_eq!(Units::Inches.to_mm(), 25.4);
        assert_eq!(Units::Metres.scale_factor(), 1e-3);
        assert_eq!(Units::Feet.scale_factor(), 1.0 / 304.8);
    }

    #[test]
    fn test_format_extensions() {
        assert_eq!(Format::StepAp203.extension(), "step");
        assert_eq!(Format::Iges.extension(), "igs");
        assert_eq!(Format::StlBinary.extension(), "stl");
        assert_eq!(Format::Obj.extension(), "obj");
        assert_eq!(Format::Dca.extension(), "dca");
    }

    #[test]
    fn test_format_from_path() {
        assert_eq!(
            Format::from_path(Path::new("a/part.STP")),
            Some(Format::StepAp214)
        );
        assert_eq!(Format::from_path(Path::new("part.iges")), Some(Format::Iges));
        assert_eq!(Format::from_path(Path::new("part.xyz")), None);
    }
}
