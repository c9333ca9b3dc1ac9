//! The export entry point: format dispatch, frame/unit mapping, size
//! estimation.
//!
//! All formats serialize fully in memory and hit the filesystem with one
//! write, so a failed or cancelled export leaves no truncated artifact.

use std::path::Path;

use crate::export::{obj, stl};
use crate::options::{ExportOptions, Format, Units};
use dcad_iges::{write_iges_to_string, IgesUnit, IgesWriteOptions};
use dcad_math::Transform;
use dcad_model::{Model, ProgressReporter};
use dcad_step::{write_step_to_string, StepSchema, StepUnit, StepWriteOptions};
use dcad_tessellate::{tessellate_body, MeshData};

/// Exports [`Model`]s to interchange files.
///
/// Failures return `false` and leave the message in
/// [`Exporter::error_message`]; a cancelled export additionally sets
/// [`Exporter::was_cancelled`].
#[derive(Debug, Default)]
pub struct Exporter {
    error: Option<String>,
    cancelled: bool,
}

impl Exporter {
    /// A fresh exporter.
    pub fn new() -> Self {
        Self::default()
    }

    /// Last export's error message, empty when it succeeded.
    pub fn error_message(&self) -> &str {
        self.error.as_deref().unwrap_or("")
    }

    /// True when the last export ended on a cancellation request.
    pub fn was_cancelled(&self) -> bool {
        self.cancelled
    }

    /// Export a model to `path` in the configured format.
    pub fn export_model(
        &mut self,
        model: &Model,
        path: impl AsRef<Path>,
        options: &ExportOptions,
    ) -> bool {
        self.error = None;
        self.cancelled = false;
        let mut progress = ProgressReporter::new(options.progress.clone());

        let bytes = match self.serialize(model, options) {
            Ok(b) => b,
            Err(_) => return false,
        };
        progress.report(90.0);

        if options.cancel.is_cancelled() {
            self.cancelled = true;
            self.error = Some("Operation cancelled".into());
            return false;
        }
        if let Err(e) = std::fs::write(path, bytes) {
            self.error = Some(format!("I/O error: {e}"));
            return false;
        }
        progress.report(100.0);
        true
    }

    /// Size in bytes the export would produce, without touching the
    /// filesystem. Returns 0 (with an error message) when serialization
    /// fails.
    pub fn estimate_file_size(&mut self, model: &Model, options: &ExportOptions) -> usize {
        self.error = None;
        self.cancelled = false;
        match self.serialize(model, options) {
            Ok(b) => b.len(),
            Err(_) => 0,
        }
    }

    fn serialize(&mut self, model: &Model, options: &ExportOptions) -> Result<Vec<u8>, ()> {
        if options.cancel.is_cancelled() {
            self.cancelled = true;
            self.error = Some("Operation cancelled".into());
            return Err(());
        }
        let result: Result<Vec<u8>, String> = match options.format {
            Format::StepAp203 | Format::StepAp214 => {
                write_step_to_string(model, &step_options(options))
                    .map(String::into_bytes)
                    .map_err(|e| e.to_string())
            }
            Format::Iges => write_iges_to_string(model, &iges_options(options))
                .map(String::into_bytes)
                .map_err(|e| e.to_string()),
            Format::StlAscii => {
                let meshes = self.transformed_meshes(model, options)?;
                return Ok(
                    stl::write_stl_ascii(&model.name, &meshes, options.stl_include_normals)
                        .into_bytes(),
                );
            }
            Format::StlBinary => {
                let meshes = self.transformed_meshes(model, options)?;
                return Ok(stl::write_stl_binary(
                    &model.name,
                    &meshes,
                    options.stl_include_normals,
                ));
            }
            Format::Obj => {
                let meshes = self.transformed_meshes(model, options)?;
                let objects: Vec<(String, MeshData)> = model
                    .bodies
                    .iter()
                    .map(|b| b.name.clone())
                    .zip(meshes)
                    .collect();
                return Ok(obj::write_obj(&objects).into_bytes());
            }
            Format::Dca => dcad_archive::write_dca_to_vec(
                model,
                &dcad_archive::DcaWriteOptions {
                    quality: options.tessellation_quality,
                    application: options.application_name.clone(),
                },
            )
            .map_err(|e| e.to_string()),
        };
        result.map_err(|message| {
            self.error = Some(message);
        })
    }

    /// Tessellate every body and map the meshes into the output frame and
    /// units. A mirroring frame flips triangle winding so normals stay
    /// outward.
    fn transformed_meshes(
        &mut self,
        model: &Model,
        options: &ExportOptions,
    ) -> Result<Vec<MeshData>, ()> {
        let frame = Transform::for_frame(options.coordinate_system);
        let scale = options.units.scale_factor();
        let mirrored = frame.matrix.determinant() < 0.0;

        let mut meshes = Vec::with_capacity(model.bodies.len());
        for body in &model.bodies {
            if options.cancel.is_cancelled() {
                self.cancelled = true;
                self.error = Some("Operation cancelled".into());
                return Err(());
            }
            let mut mesh = tessellate_body(body, options.tessellation_quality);
            for p in mesh.positions.chunks_exact_mut(3) {
                let q = frame.apply_point(&dcad_math::Point3::new(p[0], p[1], p[2]));
                p[0] = q.x * scale;
                p[1] = q.y * scale;
                p[2] = q.z * scale;
            }
            for n in mesh.normals.chunks_exact_mut(3) {
                let v = frame.apply_vec(&dcad_math::Vec3::new(n[0], n[1], n[2]));
                let len = v.norm();
                if len > 1e-30 {
                    n[0] = v.x / len;
                    n[1] = v.y / len;
                    n[2] = v.z / len;
                }
            }
            if mirrored {
                for tri in mesh.indices.chunks_exact_mut(3) {
                    tri.swap(1, 2);
                }
            }
            meshes.push(mesh);
        }
        Ok(meshes)
    }
}

fn step_options(options: &ExportOptions) -> StepWriteOptions {
    StepWriteOptions {
        schema: match options.format {
            Format::StepAp203 => StepSchema::Ap203,
            _ => StepSchema::Ap214,
        },
        include_colors: options.include_colors && options.format == Format::StepAp214,
        unit: match options.units {
            Units::Millimetres => StepUnit::Millimetre,
            Units::Centimetres => StepUnit::Centimetre,
            Units::Metres => StepUnit::Metre,
            Units::Inches => StepUnit::Inch,
            Units::Feet => StepUnit::Foot,
        },
        frame: Transform::for_frame(options.coordinate_system),
        timestamp: options.timestamp.clone(),
        author: options.author.clone(),
        organization: options.organization.clone(),
        application_name: options.application_name.clone(),
        application_version: options.application_version.clone(),
        merge_epsilon: 1e-9,
    }
}

fn iges_options(options: &ExportOptions) -> IgesWriteOptions {
    IgesWriteOptions {
        unit: match options.units {
            Units::Millimetres => IgesUnit::Millimetre,
            Units::Centimetres => IgesUnit::Centimetre,
            Units::Metres => IgesUnit::Metre,
            Units::Inches => IgesUnit::Inch,
            Units::Feet => IgesUnit::Foot,
        },
        include_colors: options.iges_include_colors,
        frame: Transform::for_frame(options.coordinate_system),
        timestamp: options.timestamp.clone(),
        author: options.author.clone(),
        organization: options.organization.clone(),
        application_name: options.application_name.clone(),
        version: options.iges_version,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dcad_math::{CoordinateSystem, Dir3, Point3, Vec3};
    use dcad_model::{Body, Face};
    use dcad_nurbs::NurbsSurface;

    fn simple_model() -> Model {
        let mut model = Model::new("part");
        let mut body = Body::new("Body");
        body.faces.push(Face::unbounded(NurbsSurface::plane_patch(
            Point3::origin(),
            Dir3::new_normalize(Vec3::z()),
            None,
            10.0,
        )));
        model.bodies.push(body);
        model
    }

    #[test]
    fn test_estimate_matches_serialization() {
        let model = simple_model();
        let mut exporter = Exporter::new();
        for format in [
            Format::StepAp203,
            Format::StepAp214,
            Format::Iges,
            Format::StlAscii,
            Format::StlBinary,
            Format::Obj,
            Format::Dca,
        ] {
            let options = ExportOptions {
                format,
                timestamp: Some("2024-06-01T12:00:00".into()),
                ..ExportOptions::default()
            };
            let size = exporter.estimate_file_size(&model, &options);
            assert!(size > 0, "empty estimate for {format:?}");
            assert!(exporter.error_message().is_empty());
        }
    }

    #[test]
    fn test_cancel_reports_flag() {
        let model = simple_model();
        let options = ExportOptions::default();
        options.cancel.cancel();
        let mut exporter = Exporter::new();
        let size = exporter.estimate_file_size(&model, &options);
        assert_eq!(size, 0);
        assert!(exporter.was_cancelled());
    }

    #[test]
    fn test_z_up_frame_moves_up_axis() {
        let model = simple_model();
        let mut exporter = Exporter::new();
        let options = ExportOptions {
            format: Format::StlAscii,
            coordinate_system: CoordinateSystem::RightHandedZUp,
            ..ExportOptions::default()
        };
        let meshes = exporter.transformed_meshes(&model, &options).unwrap();
        // The XY-plane patch (+Z internal up becomes +Y... its points lie
        // in the XZ' output plane after the frame swap).
        for p in meshes[0].positions.chunks_exact(3) {
            assert!(p[1].abs() < 1e-9, "y should be flattened: {p:?}");
        }
    }

    #[test]
    fn test_mirrored_frame_flips_winding() {
        let model = simple_model();
        let mut exporter = Exporter::new();
        let straight = exporter
            .transformed_meshes(&model, &ExportOptions::default())
            .unwrap();
        let mirrored = exporter
            .transformed_meshes(
                &model,
                &ExportOptions {
                    coordinate_system: CoordinateSystem::LeftHandedYUp,
                    ..ExportOptions::default()
                },
            )
            .unwrap();
        let a = &straight[0].indices;
        let b = &mirrored[0].indices;
        assert_eq!(a[0], b[0]);
        assert_eq!(a[1], b[2]);
        assert_eq!(a[2], b[1]);
    }

    #[test]
    fn test_unit_scale_in_stl() {
        let model = simple_model();
        let mut exporter = Exporter::new();
        let options = ExportOptions {
            format: Format::StlAscii,
            units: Units::Centimetres,
            ..ExportOptions::default()
        };
        let meshes = exporter.transformed_meshes(&model, &options).unwrap();
        // 10 mm half-extent becomes 1 cm.
        let max_x = meshes[0]
            .positions
            .chunks_exact(3)
            .map(|p| p[0])
            .fold(f64::MIN, f64::max);
        assert!((max_x - 1.0).abs() < 1e-9, "max x {max_x}");
    }
}
