//! IGES writer: serializes a [`Model`] into the five fixed-column sections.
//!
//! Every face becomes a rational B-spline surface (type 128); faces with
//! boundary loops additionally get their curves (110/126), a composite
//! (102) when a loop has several edges, a curve-on-surface (142), and a
//! trimmed surface (144). Directory entries are two 80-column lines of
//! 8-wide right-justified fields; parameter data is chunked into 64-column
//! lines carrying the owning entry in columns 65-72.
//!
//! Output is assembled in memory and written with one filesystem call, so
//! a failed export never leaves a truncated file.

use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};

use crate::error::IgesError;
use dcad_math::{Point3, Transform};
use dcad_model::{Color, Loop, Model};
use dcad_nurbs::{NurbsCurve, NurbsSurface};

/// Length unit declared in the global section.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum IgesUnit {
    /// Millimeters (flag 2).
    #[default]
    Millimetre,
    /// Centimeters (flag 10).
    Centimetre,
    /// Meters (flag 6).
    Metre,
    /// Inches (flag 1).
    Inch,
    /// Feet (flag 4).
    Foot,
}

impl IgesUnit {
    /// File units per internal millimeter.
    pub fn scale(&self) -> f64 {
        match self {
            IgesUnit::Millimetre => 1.0,
            IgesUnit::Centimetre => 0.1,
            IgesUnit::Metre => 1e-3,
            IgesUnit::Inch => 1.0 / 25.4,
            IgesUnit::Foot => 1.0 / 304.8,
        }
    }

    fn flag(&self) -> i64 {
        match self {
            IgesUnit::Millimetre => 2,
            IgesUnit::Centimetre => 10,
            IgesUnit::Metre => 6,
            IgesUnit::Inch => 1,
            IgesUnit::Foot => 4,
        }
    }

    fn name(&self) -> &'static str {
        match self {
            IgesUnit::Millimetre => "MM",
            IgesUnit::Centimetre => "CM",
            IgesUnit::Metre => "M",
            IgesUnit::Inch => "INCH",
            IgesUnit::Foot => "FT",
        }
    }
}

/// Options controlling IGES export.
#[derive(Debug, Clone)]
pub struct IgesWriteOptions {
    /// Length unit declared in the global section.
    pub unit: IgesUnit,
    /// Emit color definition entities (type 314).
    pub include_colors: bool,
    /// Coordinate conversion applied at serialization time.
    pub frame: Transform,
    /// Timestamp override (`YYYYMMDD.HHMMSS`) for reproducible output.
    pub timestamp: Option<String>,
    /// Author for the global section.
    pub author: String,
    /// Organization for the global section.
    pub organization: String,
    /// Sending system identification.
    pub application_name: String,
    /// Specification version flag (11 = IGES 5.3).
    pub version: i64,
}

impl Default for IgesWriteOptions {
    fn default() -> Self {
        Self {
            unit: IgesUnit::Millimetre,
            include_colors: true,
            frame: Transform::identity(),
            timestamp: None,
            author: String::new(),
            organization: String::new(),
            application_name: "dcad".into(),
            version: 11,
        }
    }
}

/// Serialize a model to IGES and write it to `path` in one call.
pub fn write_iges(
    model: &Model,
    path: impl AsRef<Path>,
    options: &IgesWriteOptions,
) -> Result<(), IgesError> {
    let text = write_iges_to_string(model, options)?;
    std::fs::write(path, text)?;
    Ok(())
}

/// Serialize a model to the IGES fixed-column format.
pub fn write_iges_to_string(model: &Model, options: &IgesWriteOptions) -> Result<String, IgesError> {
    let mut writer = IgesWriter::new(options);
    writer.write_model(model)?;
    Ok(writer.finish(model, options))
}

fn fmt_real(x: f64) -> Result<String, IgesError> {
    if !x.is_finite() {
        return Err(IgesError::InvalidGeometry(format!(
            "cannot format non-finite real {x}"
        )));
    }
    let s = format!("{:.14E}", x);
    let epos = s.find('E').unwrap_or(s.len());
    let (mant, exp) = s.split_at(epos);
    let mant = mant.trim_end_matches('0');
    if mant.ends_with('.') {
        Ok(format!("{mant}0{exp}"))
    } else {
        Ok(format!("{mant}{exp}"))
    }
}

fn hollerith(s: &str) -> String {
    format!("{}H{}", s.len(), s)
}

fn timestamp_now() -> String {
    let secs = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0);
    let days = (secs / 86_400) as i64;
    let rem = secs % 86_400;
    let (y, m, d) = civil_from_days(days);
    format!(
        "{y:04}{m:02}{d:02}.{:02}{:02}{:02}",
        rem / 3600,
        (rem % 3600) / 60,
        rem % 60
    )
}

fn civil_from_days(z: i64) -> (i64, u32, u32) {
    let z = z + 719_468;
    let era = if z >= 0 { z } else { z - 146_096 } / 146_097;
    let doe = (z - era * 146_097) as u64;
    let yoe = (doe - doe / 1460 + doe / 36_524 - doe / 146_096) / 365;
    let y = yoe as i64 + era * 400;
    let doy = doe - (365 * yoe + yoe / 4 - yoe / 100);
    let mp = (5 * doy + 2) / 153;
    let d = (doy - (153 * mp + 2) / 5 + 1) as u32;
    let m = if mp < 10 { mp + 3 } else { mp - 9 } as u32;
    (if m <= 2 { y + 1 } else { y }, m, d)
}

/// One entity queued for the directory and parameter sections.
struct PendingEntity {
    entity_type: i64,
    /// Parameter fields, without the leading type or record delimiter.
    params: String,
    color: i64,
    form: i64,
    subordinate: bool,
}

struct IgesWriter<'a> {
    options: &'a IgesWriteOptions,
    scale: f64,
    entities: Vec<PendingEntity>,
}

impl<'a> IgesWriter<'a> {
    fn new(options: &'a IgesWriteOptions) -> Self {
        Self {
            options,
            scale: options.unit.scale(),
            entities: Vec::new(),
        }
    }

    /// Queue an entity; returns its directory pointer (odd, 1-based).
    fn push(&mut self, entity: PendingEntity) -> usize {
        self.entities.push(entity);
        self.entities.len() * 2 - 1
    }

    fn map_point(&self, p: &Point3) -> Point3 {
        let q = self.options.frame.apply_point(p);
        Point3::new(q.x * self.scale, q.y * self.scale, q.z * self.scale)
    }

    // =========================================================================
    // Entities
    // =========================================================================

    fn write_model(&mut self, model: &Model) -> Result<(), IgesError> {
        for body in &model.bodies {
            let color_de = if self.options.include_colors {
                Some(self.write_color(&body.color)?)
            } else {
                None
            };
            let color_field = color_de.map(|de| -(de as i64)).unwrap_or(0);
            for face in &body.faces {
                self.write_face(face, color_field)?;
            }
        }
        Ok(())
    }

    /// Type 314: color definition, components in percent.
    fn write_color(&mut self, color: &Color) -> Result<usize, IgesError> {
        let params = format!(
            "{},{},{}",
            fmt_real(color.r * 100.0)?,
            fmt_real(color.g * 100.0)?,
            fmt_real(color.b * 100.0)?
        );
        Ok(self.push(PendingEntity {
            entity_type: 314,
            params,
            color: 0,
            form: 0,
            subordinate: true,
        }))
    }

    fn write_face(&mut self, face: &dcad_model::Face, color: i64) -> Result<(), IgesError> {
        let trimmed = !face.outer.edges.is_empty();
        let surface_de = self.write_surface(&face.surface, trimmed, if trimmed { 0 } else { color })?;
        if !trimmed {
            return Ok(());
        }

        let outer_142 = self.write_boundary(&face.outer, surface_de)?;
        let mut inner_142 = Vec::with_capacity(face.inner.len());
        for ring in &face.inner {
            inner_142.push(self.write_boundary(ring, surface_de)?);
        }

        let mut params = format!("{surface_de},1,{}", inner_142.len());
        params.push_str(&format!(",{outer_142}"));
        for de in &inner_142 {
            params.push_str(&format!(",{de}"));
        }
        self.push(PendingEntity {
            entity_type: 144,
            params,
            color,
            form: 0,
            subordinate: false,
        });
        Ok(())
    }

    /// Type 142 wrapping the loop's model-space curve.
    fn write_boundary(&mut self, ring: &Loop, surface_de: usize) -> Result<usize, IgesError> {
        let mut curve_des = Vec::with_capacity(ring.edges.len());
        for edge in &ring.edges {
            let curve = match &edge.curve {
                Some(c) => c.clone(),
                None => NurbsCurve::line_segment(edge.start, edge.end),
            };
            curve_des.push(self.write_curve(&curve)?);
        }
        let model_curve = if curve_des.len() == 1 {
            curve_des[0]
        } else {
            let mut params = format!("{}", curve_des.len());
            for de in &curve_des {
                params.push_str(&format!(",{de}"));
            }
            self.push(PendingEntity {
                entity_type: 102,
                params,
                color: 0,
                form: 0,
                subordinate: true,
            })
        };
        // (creation flag, surface, model curve, parameter curve, preference)
        Ok(self.push(PendingEntity {
            entity_type: 142,
            params: format!("0,{surface_de},{model_curve},0,1"),
            color: 0,
            form: 0,
            subordinate: true,
        }))
    }

    /// Type 110 for straight segments, type 126 otherwise.
    fn write_curve(&mut self, curve: &NurbsCurve) -> Result<usize, IgesError> {
        if curve.degree == 1 && curve.control_points.len() == 2 && curve.weights.is_none() {
            let a = self.map_point(&curve.control_points[0]);
            let b = self.map_point(&curve.control_points[1]);
            let params = format!(
                "{},{},{},{},{},{}",
                fmt_real(a.x)?,
                fmt_real(a.y)?,
                fmt_real(a.z)?,
                fmt_real(b.x)?,
                fmt_real(b.y)?,
                fmt_real(b.z)?
            );
            return Ok(self.push(PendingEntity {
                entity_type: 110,
                params,
                color: 0,
                form: 0,
                subordinate: true,
            }));
        }

        let k = curve.control_points.len() - 1;
        let m = curve.degree;
        let polynomial = i64::from(curve.weights.is_none());
        let closed = i64::from(curve.is_closed);
        let planar = i64::from(curve.is_planar);
        let mut params = format!("{k},{m},{planar},{closed},{polynomial},0");
        for knot in &curve.knots {
            params.push_str(&format!(",{}", fmt_real(*knot)?));
        }
        for i in 0..=k {
            params.push_str(&format!(",{}", fmt_real(curve.weight(i))?));
        }
        for p in &curve.control_points {
            let q = self.map_point(p);
            params.push_str(&format!(
                ",{},{},{}",
                fmt_real(q.x)?,
                fmt_real(q.y)?,
                fmt_real(q.z)?
            ));
        }
        params.push_str(&format!(
            ",{},{}",
            fmt_real(curve.t_min)?,
            fmt_real(curve.t_max)?
        ));
        Ok(self.push(PendingEntity {
            entity_type: 126,
            params,
            color: 0,
            form: 0,
            subordinate: true,
        }))
    }

    /// Type 128: rational B-spline surface; the first index varies fastest.
    fn write_surface(
        &mut self,
        surface: &NurbsSurface,
        subordinate: bool,
        color: i64,
    ) -> Result<usize, IgesError> {
        let k1 = surface.nu() - 1;
        let k2 = surface.nv() - 1;
        let m1 = surface.degree_u;
        let m2 = surface.degree_v;
        let polynomial = i64::from(surface.weights.is_none());

        let mut params = format!("{k1},{k2},{m1},{m2},0,0,{polynomial},0,0");
        for knot in &surface.knots_u {
            params.push_str(&format!(",{}", fmt_real(*knot)?));
        }
        for knot in &surface.knots_v {
            params.push_str(&format!(",{}", fmt_real(*knot)?));
        }
        for j in 0..=k2 {
            for i in 0..=k1 {
                params.push_str(&format!(",{}", fmt_real(surface.weight(i, j))?));
            }
        }
        for j in 0..=k2 {
            for i in 0..=k1 {
                let q = self.map_point(&surface.control_points[i][j]);
                params.push_str(&format!(
                    ",{},{},{}",
                    fmt_real(q.x)?,
                    fmt_real(q.y)?,
                    fmt_real(q.z)?
                ));
            }
        }
        let ((u0, u1), (v0, v1)) = surface.domain();
        params.push_str(&format!(
            ",{},{},{},{}",
            fmt_real(u0)?,
            fmt_real(u1)?,
            fmt_real(v0)?,
            fmt_real(v1)?
        ));
        Ok(self.push(PendingEntity {
            entity_type: 128,
            params,
            color,
            form: 0,
            subordinate,
        }))
    }

    // =========================================================================
    // Section assembly
    // =========================================================================

    fn finish(self, model: &Model, options: &IgesWriteOptions) -> String {
        let timestamp = options.timestamp.clone().unwrap_or_else(timestamp_now);

        // Start section.
        let mut out = String::new();
        let start_line = format!("{} exported by {}", model.name, options.application_name);
        out.push_str(&format!("{:<72}S{:>7}\n", truncate(&start_line, 72), 1));

        // Global section.
        let global = format!(
            "1H,,1H;,{},{},{},{},32,38,6,308,15,{},{},{},{},1,0.08,{},{},0.0,{},{},{},0;",
            hollerith(&truncate(&model.name, 60)),
            hollerith(&format!("{}.igs", truncate(&model.name, 56))),
            hollerith(&options.application_name),
            hollerith("1.0"),
            hollerith(&truncate(&model.name, 60)),
            "1.0",
            options.unit.flag(),
            hollerith(options.unit.name()),
            hollerith(&timestamp),
            "1.0E-6",
            hollerith(&options.author),
            hollerith(&options.organization),
            options.version,
        );
        let global_lines = chunk(&global, 72);
        for (i, line) in global_lines.iter().enumerate() {
            out.push_str(&format!("{line:<72}G{:>7}\n", i + 1));
        }

        // Lay out parameter lines first so directory entries can point at
        // them.
        let mut parameter_lines: Vec<(String, usize)> = Vec::new();
        let mut pointers = Vec::with_capacity(self.entities.len());
        let mut line_counts = Vec::with_capacity(self.entities.len());
        for (i, entity) in self.entities.iter().enumerate() {
            let de = i * 2 + 1;
            let text = format!("{},{};", entity.entity_type, entity.params);
            let chunks = chunk(&text, 64);
            pointers.push(parameter_lines.len() + 1);
            line_counts.push(chunks.len());
            for c in chunks {
                parameter_lines.push((c, de));
            }
        }

        // Directory section: two lines per entity.
        let mut directory_lines = Vec::with_capacity(self.entities.len() * 2);
        for (i, entity) in self.entities.iter().enumerate() {
            let status = if entity.subordinate {
                "00010000"
            } else {
                "00000000"
            };
            directory_lines.push(format!(
                "{:>8}{:>8}{:>8}{:>8}{:>8}{:>8}{:>8}{:>8}{status}",
                entity.entity_type, pointers[i], 0, 0, 0, 0, 0, 0
            ));
            directory_lines.push(format!(
                "{:>8}{:>8}{:>8}{:>8}{:>8}{:>8}{:>8}{:>8}",
                entity.entity_type, 0, entity.color, line_counts[i], entity.form, 0, 0, 0
            ));
        }
        for (i, line) in directory_lines.iter().enumerate() {
            out.push_str(&format!("{line:<72}D{:>7}\n", i + 1));
        }

        // Parameter section with back-references in columns 65-72.
        for (i, (line, de)) in parameter_lines.iter().enumerate() {
            out.push_str(&format!("{line:<64}{de:>8}P{:>7}\n", i + 1));
        }

        // Terminator.
        let summary = format!(
            "S{:>7}G{:>7}D{:>7}P{:>7}",
            1,
            global_lines.len(),
            directory_lines.len(),
            parameter_lines.len()
        );
        out.push_str(&format!("{summary:<72}T{:>7}\n", 1));
        out
    }
}

fn chunk(text: &str, width: usize) -> Vec<String> {
    if text.is_empty() {
        return vec![String::new()];
    }
    text.as_bytes()
        .chunks(width)
        .map(|c| String::from_utf8_lossy(c).into_owned())
        .collect()
}

fn truncate(s: &str, max: usize) -> String {
    s.chars().take(max).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reader::{read_iges_from_buffer, IgesReadOptions};
    use approx::assert_relative_eq;
    use dcad_math::{Dir3, Vec3};
    use dcad_model::{Body, CancelToken, Edge, Face, ProgressReporter};

    fn pinned_options() -> IgesWriteOptions {
        IgesWriteOptions {
            timestamp: Some("20240601.120000".into()),
            ..IgesWriteOptions::default()
        }
    }

    fn patch_model() -> Model {
        let mut model = Model::new("patch");
        let mut body = Body::new("Patch");
        body.color = Color::new(1.0, 0.0, 0.0);
        let a = Point3::new(0.0, 0.0, 0.0);
        let b = Point3::new(10.0, 0.0, 0.0);
        let c = Point3::new(10.0, 10.0, 0.0);
        let d = Point3::new(0.0, 10.0, 0.0);
        let face = Face {
            outer: Loop::new(vec![
                Edge::segment(a, b),
                Edge::segment(b, c),
                Edge::segment(c, d),
                Edge::segment(d, a),
            ]),
            inner: Vec::new(),
            surface: NurbsSurface::plane_patch(
                Point3::new(5.0, 5.0, 0.0),
                Dir3::new_normalize(Vec3::z()),
                None,
                10.0,
            ),
            same_sense: true,
            color: Color::new(1.0, 0.0, 0.0),
        };
        body.faces.push(face);
        model.bodies.push(body);
        model
    }

    #[test]
    fn test_sections_are_80_columns() {
        let text = write_iges_to_string(&patch_model(), &pinned_options()).unwrap();
        for line in text.lines() {
            assert_eq!(line.len(), 80, "bad line: {line:?}");
        }
        // Exactly one terminator at the end.
        let last = text.lines().last().unwrap();
        assert_eq!(&last[72..73], "T");
    }

    #[test]
    fn test_directory_entries_two_lines_each() {
        let text = write_iges_to_string(&patch_model(), &pinned_options()).unwrap();
        let d_lines: Vec<&str> = text
            .lines()
            .filter(|l| &l[72..73] == "D")
            .collect();
        assert_eq!(d_lines.len() % 2, 0);
        // Entity types present: color, lines, composite, curve on surface,
        // surface, trimmed surface.
        let types: Vec<i64> = d_lines
            .iter()
            .step_by(2)
            .map(|l| l[0..8].trim().parse::<i64>().unwrap())
            .collect();
        assert!(types.contains(&314));
        assert!(types.contains(&110));
        assert!(types.contains(&102));
        assert!(types.contains(&142));
        assert!(types.contains(&128));
        assert!(types.contains(&144));
    }

    #[test]
    fn test_export_idempotent_with_pinned_timestamp() {
        let model = patch_model();
        let a = write_iges_to_string(&model, &pinned_options()).unwrap();
        let b = write_iges_to_string(&model, &pinned_options()).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_roundtrip_trimmed_plane() {
        let model = patch_model();
        let text = write_iges_to_string(&model, &pinned_options()).unwrap();
        let import = read_iges_from_buffer(
            text.as_bytes(),
            &IgesReadOptions::default(),
            &CancelToken::new(),
            &mut ProgressReporter::default(),
        )
        .unwrap();
        assert_eq!(import.model.bodies.len(), 1);
        let body = &import.model.bodies[0];
        assert_eq!(body.faces.len(), 1);
        let face = &body.faces[0];
        // Boundary came back as one composite curve loop.
        assert_eq!(face.outer.edges.len(), 1);
        assert!(face.color.close_to(&Color::new(1.0, 0.0, 0.0), 0.01));

        // Surface geometry survives to 1e-6.
        let original = &model.bodies[0].faces[0].surface;
        let back = &face.surface;
        for i in 0..=4 {
            for j in 0..=4 {
                let u = i as f64 / 4.0;
                let v = j as f64 / 4.0;
                let p = original.point_at(u, v);
                let q = back.point_at(u, v);
                assert!((p - q).norm() < 1e-6, "mismatch at ({u},{v})");
            }
        }
    }

    #[test]
    fn test_inch_export_scales_coordinates() {
        let options = IgesWriteOptions {
            unit: IgesUnit::Inch,
            ..pinned_options()
        };
        let mut model = Model::new("inch");
        let mut body = Body::new("B");
        body.faces.push(Face::unbounded(NurbsSurface::plane_patch(
            Point3::new(25.4, 0.0, 0.0),
            Dir3::new_normalize(Vec3::z()),
            None,
            25.4,
        )));
        model.bodies.push(body);
        let text = write_iges_to_string(&model, &options).unwrap();
        // Units flag 1 in the global section (joined across G lines).
        let global: String = text
            .lines()
            .filter(|l| &l[72..73] == "G")
            .map(|l| &l[..72])
            .collect();
        assert!(global.contains(",1,4HINCH,"));

        // Re-import: flag 1 scales everything back to mm.
        let import = read_iges_from_buffer(
            text.as_bytes(),
            &IgesReadOptions::default(),
            &CancelToken::new(),
            &mut ProgressReporter::default(),
        )
        .unwrap();
        let back = &import.model.bodies[0].faces[0].surface;
        let center = back.point_at(0.5, 0.5);
        assert_relative_eq!(center.x, 25.4, epsilon = 1e-6);
    }

    #[test]
    fn test_untrimmed_face_emits_surface_only() {
        let mut model = Model::new("u");
        let mut body = Body::new("B");
        body.faces.push(Face::unbounded(NurbsSurface::cylinder_patch(
            Point3::origin(),
            Dir3::new_normalize(Vec3::z()),
            None,
            3.0,
            10.0,
        )));
        model.bodies.push(body);
        let options = IgesWriteOptions {
            include_colors: false,
            ..pinned_options()
        };
        let text = write_iges_to_string(&model, &options).unwrap();
        let d_first_lines: Vec<&str> = text
            .lines()
            .filter(|l| &l[72..73] == "D")
            .step_by(2)
            .collect();
        assert_eq!(d_first_lines.len(), 1);
        assert!(d_first_lines[0].trim_start().starts_with("128"));
    }
}
