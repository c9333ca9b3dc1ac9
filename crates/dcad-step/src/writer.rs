//! STEP writer: serializes a [`Model`] into a Part 21 record stream.
//!
//! Ids are allocated monotonically from 1. Identity maps keyed on
//! epsilon-rounded coordinates make shared sub-objects (a point reused by
//! two edges, an edge shared by two faces) emit exactly once. Output is
//! deterministic: identical model + pinned timestamp means identical bytes.
//!
//! The whole record stream is assembled in memory and written with a
//! single filesystem call, so a failed export never leaves a truncated
//! file behind.

use std::collections::HashMap;
use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};

use crate::error::StepError;
use dcad_math::{Dir3, Point3, Transform, Vec3};
use dcad_model::{Body, Edge, Face, Loop, Model};
use dcad_nurbs::{compress_knots, NurbsCurve, NurbsSurface};

/// Application protocol for the emitted file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StepSchema {
    /// AP203, configuration-controlled design.
    Ap203,
    /// AP214, automotive design (supports presentation color).
    #[default]
    Ap214,
}

impl StepSchema {
    fn schema_name(&self) -> &'static str {
        match self {
            StepSchema::Ap203 => "CONFIG_CONTROL_DESIGN",
            StepSchema::Ap214 => "AUTOMOTIVE_DESIGN",
        }
    }
}

/// Length unit written into the file's unit context.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StepUnit {
    /// Millimeters (scale 1).
    #[default]
    Millimetre,
    /// Centimeters (scale 0.1).
    Centimetre,
    /// Meters (scale 1e-3).
    Metre,
    /// Inches (scale 1/25.4).
    Inch,
    /// Feet (scale 1/304.8).
    Foot,
}

impl StepUnit {
    /// File units per internal millimeter.
    pub fn scale(&self) -> f64 {
        match self {
            StepUnit::Millimetre => 1.0,
            StepUnit::Centimetre => 0.1,
            StepUnit::Metre => 1e-3,
            StepUnit::Inch => 1.0 / 25.4,
            StepUnit::Foot => 1.0 / 304.8,
        }
    }
}

/// Options controlling STEP export.
#[derive(Debug, Clone)]
pub struct StepWriteOptions {
    /// Target application protocol.
    pub schema: StepSchema,
    /// Emit the per-body presentation color chain (AP214 only).
    pub include_colors: bool,
    /// Length unit declared in the file.
    pub unit: StepUnit,
    /// Coordinate conversion applied to every point and direction at
    /// serialization time.
    pub frame: Transform,
    /// Timestamp override for reproducible output (ISO-8601); the current
    /// time is used when absent.
    pub timestamp: Option<String>,
    /// Author written into FILE_NAME.
    pub author: String,
    /// Organization written into FILE_NAME.
    pub organization: String,
    /// Originating application name.
    pub application_name: String,
    /// Originating application version.
    pub application_version: String,
    /// Rounding applied to coordinates for identity mapping, in mm.
    pub merge_epsilon: f64,
}

impl Default for StepWriteOptions {
    fn default() -> Self {
        Self {
            schema: StepSchema::Ap214,
            include_colors: true,
            unit: StepUnit::Millimetre,
            frame: Transform::identity(),
            timestamp: None,
            author: String::new(),
            organization: String::new(),
            application_name: "dcad".into(),
            application_version: env!("CARGO_PKG_VERSION").into(),
            merge_epsilon: 1e-9,
        }
    }
}

/// Serialize a model to STEP and write it to `path` in one call.
pub fn write_step(
    model: &Model,
    path: impl AsRef<Path>,
    options: &StepWriteOptions,
) -> Result<(), StepError> {
    let text = write_step_to_string(model, options)?;
    std::fs::write(path, text)?;
    Ok(())
}

/// Serialize a model to a STEP record stream.
pub fn write_step_to_string(model: &Model, options: &StepWriteOptions) -> Result<String, StepError> {
    let mut writer = StepWriter::new(options);
    writer.write_model(model)?;
    Ok(writer.finish(model, options))
}

/// Format a real in uppercase-E scientific notation, at most 15
/// significant digits, trailing zeros trimmed (`1.0E0`, `2.54E1`).
fn fmt_real(x: f64) -> Result<String, StepError> {
    if !x.is_finite() {
        return Err(StepError::InvalidGeometry(format!(
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

/// Escape a string literal: backslash doubles, quote doubles.
fn escape(s: &str) -> String {
    s.replace('\\', "\\\\").replace('\'', "''")
}

/// UTC now as ISO-8601, without pulling in a date-time dependency.
fn iso8601_now() -> String {
    let secs = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0);
    let days = (secs / 86_400) as i64;
    let rem = secs % 86_400;
    let (y, m, d) = civil_from_days(days);
    format!(
        "{y:04}-{m:02}-{d:02}T{:02}:{:02}:{:02}",
        rem / 3600,
        (rem % 3600) / 60,
        rem % 60
    )
}

/// Days-since-epoch to (year, month, day) in the proleptic Gregorian
/// calendar.
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

type CoordKey = (i64, i64, i64);

struct StepWriter<'a> {
    options: &'a StepWriteOptions,
    scale: f64,
    next_id: u64,
    records: Vec<String>,
    point_ids: HashMap<CoordKey, u64>,
    dir_ids: HashMap<CoordKey, u64>,
    vertex_ids: HashMap<CoordKey, u64>,
    edge_ids: HashMap<(CoordKey, CoordKey), u64>,
}

impl<'a> StepWriter<'a> {
    fn new(options: &'a StepWriteOptions) -> Self {
        Self {
            options,
            scale: options.unit.scale(),
            next_id: 1,
            records: Vec::new(),
            point_ids: HashMap::new(),
            dir_ids: HashMap::new(),
            vertex_ids: HashMap::new(),
            edge_ids: HashMap::new(),
        }
    }

    fn emit(&mut self, body: String) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        self.records.push(format!("#{id}={body};"));
        id
    }

    fn finish(self, model: &Model, options: &StepWriteOptions) -> String {
        let timestamp = options.timestamp.clone().unwrap_or_else(iso8601_now);
        let mut out = String::new();
        out.push_str("ISO-10303-21;\n");
        out.push_str("HEADER;\n");
        out.push_str("FILE_DESCRIPTION((''),'2;1');\n");
        out.push_str(&format!(
            "FILE_NAME('{}','{}',('{}'),('{}'),'{} {}','{}','');\n",
            escape(&model.name),
            escape(&timestamp),
            escape(&options.author),
            escape(&options.organization),
            escape(&options.application_name),
            escape(&options.application_version),
            escape(&options.application_name),
        ));
        out.push_str(&format!(
            "FILE_SCHEMA(('{}'));\n",
            options.schema.schema_name()
        ));
        out.push_str("ENDSEC;\n");
        out.push_str("DATA;\n");
        for record in &self.records {
            out.push_str(record);
            out.push('\n');
        }
        out.push_str("ENDSEC;\n");
        out.push_str("END-ISO-10303-21;\n");
        out
    }

    // =========================================================================
    // Mapping into the output frame
    // =========================================================================

    fn map_point(&self, p: &Point3) -> Point3 {
        let q = self.options.frame.apply_point(p);
        Point3::new(q.x * self.scale, q.y * self.scale, q.z * self.scale)
    }

    fn map_dir(&self, d: &Dir3) -> Dir3 {
        self.options.frame.apply_dir(d)
    }

    fn key_for(&self, p: &Point3) -> CoordKey {
        let eps = self.options.merge_epsilon.max(1e-15);
        (
            (p.x / eps).round() as i64,
            (p.y / eps).round() as i64,
            (p.z / eps).round() as i64,
        )
    }

    // =========================================================================
    // Shared leaf records
    // =========================================================================

    fn point_id(&mut self, p: &Point3) -> Result<u64, StepError> {
        let mapped = self.map_point(p);
        let key = self.key_for(&mapped);
        if let Some(&id) = self.point_ids.get(&key) {
            return Ok(id);
        }
        let record = format!(
            "CARTESIAN_POINT('',({},{},{}))",
            fmt_real(mapped.x)?,
            fmt_real(mapped.y)?,
            fmt_real(mapped.z)?
        );
        let id = self.emit(record);
        self.point_ids.insert(key, id);
        Ok(id)
    }

    fn dir_id(&mut self, d: &Dir3) -> Result<u64, StepError> {
        let mapped = self.map_dir(d);
        let v = mapped.as_ref();
        let key = self.key_for(&Point3::new(v.x, v.y, v.z));
        if let Some(&id) = self.dir_ids.get(&key) {
            return Ok(id);
        }
        let record = format!(
            "DIRECTION('',({},{},{}))",
            fmt_real(v.x)?,
            fmt_real(v.y)?,
            fmt_real(v.z)?
        );
        let id = self.emit(record);
        self.dir_ids.insert(key, id);
        Ok(id)
    }

    fn placement_id(&mut self, origin: &Point3, z: &Dir3, x: &Dir3) -> Result<u64, StepError> {
        let origin_id = self.point_id(origin)?;
        let z_id = self.dir_id(z)?;
        let x_id = self.dir_id(x)?;
        Ok(self.emit(format!(
            "AXIS2_PLACEMENT_3D('',#{origin_id},#{z_id},#{x_id})"
        )))
    }

    fn vertex_id(&mut self, p: &Point3) -> Result<u64, StepError> {
        let key = self.key_for(&self.map_point(p));
        if let Some(&id) = self.vertex_ids.get(&key) {
            return Ok(id);
        }
        let point_id = self.point_id(p)?;
        let id = self.emit(format!("VERTEX_POINT('',#{point_id})"));
        self.vertex_ids.insert(key, id);
        Ok(id)
    }

    // =========================================================================
    // Units
    // =========================================================================

    fn write_unit_context(&mut self) -> Result<(), StepError> {
        let si_mm = "( LENGTH_UNIT() NAMED_UNIT(*) SI_UNIT(.MILLI.,.METRE.) )";
        let length_unit = match self.options.unit {
            StepUnit::Millimetre => self.emit(si_mm.into()),
            StepUnit::Centimetre => {
                self.emit("( LENGTH_UNIT() NAMED_UNIT(*) SI_UNIT(.CENTI.,.METRE.) )".into())
            }
            StepUnit::Metre => {
                self.emit("( LENGTH_UNIT() NAMED_UNIT(*) SI_UNIT($,.METRE.) )".into())
            }
            StepUnit::Inch => {
                let base = self.emit(si_mm.into());
                self.conversion_unit("INCH", 25.4, base)?
            }
            StepUnit::Foot => {
                let base = self.emit(si_mm.into());
                self.conversion_unit("FOOT", 304.8, base)?
            }
        };
        let angle_unit =
            self.emit("( NAMED_UNIT(*) PLANE_ANGLE_UNIT() SI_UNIT($,.RADIAN.) )".into());
        let solid_angle_unit =
            self.emit("( NAMED_UNIT(*) SOLID_ANGLE_UNIT() SI_UNIT($,.STERADIAN.) )".into());
        let uncertainty = self.emit(format!(
            "UNCERTAINTY_MEASURE_WITH_UNIT(LENGTH_MEASURE({}),#{length_unit},'distance_accuracy_value','')",
            fmt_real(1e-6)?
        ));
        self.emit(format!(
            "( GEOMETRIC_REPRESENTATION_CONTEXT(3) GLOBAL_UNCERTAINTY_ASSIGNED_CONTEXT((#{uncertainty})) GLOBAL_UNIT_ASSIGNED_CONTEXT((#{length_unit},#{angle_unit},#{solid_angle_unit})) REPRESENTATION_CONTEXT('','') )"
        ));
        Ok(())
    }

    fn conversion_unit(&mut self, name: &str, mm: f64, si_mm: u64) -> Result<u64, StepError> {
        let exponents = self.emit(format!(
            "DIMENSIONAL_EXPONENTS({},{},{},{},{},{},{})",
            fmt_real(1.0)?,
            fmt_real(0.0)?,
            fmt_real(0.0)?,
            fmt_real(0.0)?,
            fmt_real(0.0)?,
            fmt_real(0.0)?,
            fmt_real(0.0)?
        ));
        let measure = self.emit(format!(
            "MEASURE_WITH_UNIT(LENGTH_MEASURE({}),#{si_mm})",
            fmt_real(mm)?
        ));
        Ok(self.emit(format!(
            "( CONVERSION_BASED_UNIT('{name}',#{measure}) LENGTH_UNIT() NAMED_UNIT(#{exponents}) )"
        )))
    }

    // =========================================================================
    // Geometry
    // =========================================================================

    fn write_surface(&mut self, surface: &NurbsSurface) -> Result<u64, StepError> {
        if let Some((origin, normal, x_axis)) = surface.as_plane() {
            let placement = self.placement_id(&origin, &normal, &x_axis)?;
            return Ok(self.emit(format!("PLANE('',#{placement})")));
        }
        if let Some((origin, axis, ref_dir, radius, _half_height)) = surface.as_cylinder() {
            let placement = self.placement_id(&origin, &axis, &ref_dir)?;
            return Ok(self.emit(format!(
                "CYLINDRICAL_SURFACE('',#{placement},{})",
                fmt_real(radius * self.scale)?
            )));
        }
        self.write_bspline_surface(surface)
    }

    fn write_bspline_surface(&mut self, surface: &NurbsSurface) -> Result<u64, StepError> {
        let mut rows = Vec::with_capacity(surface.nu());
        for row in &surface.control_points {
            let mut ids = Vec::with_capacity(row.len());
            for p in row {
                ids.push(format!("#{}", self.point_id(p)?));
            }
            rows.push(format!("({})", ids.join(",")));
        }
        let net = rows.join(",");

        let (u_values, u_mults) = compress_knots(&surface.knots_u);
        let (v_values, v_mults) = compress_knots(&surface.knots_v);
        let u_knots = reals(&u_values)?;
        let v_knots = reals(&v_values)?;
        let u_m = ints(&u_mults);
        let v_m = ints(&v_mults);
        let (du, dv) = (surface.degree_u, surface.degree_v);

        match &surface.weights {
            None => Ok(self.emit(format!(
                "B_SPLINE_SURFACE_WITH_KNOTS('',{du},{dv},({net}),.UNSPECIFIED.,.F.,.F.,.F.,({u_m}),({v_m}),({u_knots}),({v_knots}),.UNSPECIFIED.)"
            ))),
            Some(weights) => {
                let mut wrows = Vec::with_capacity(weights.len());
                for row in weights {
                    wrows.push(format!("({})", reals(row)?));
                }
                let grid = wrows.join(",");
                Ok(self.emit(format!(
                    "( BOUNDED_SURFACE() B_SPLINE_SURFACE({du},{dv},({net}),.UNSPECIFIED.,.F.,.F.,.F.) B_SPLINE_SURFACE_WITH_KNOTS(({u_m}),({v_m}),({u_knots}),({v_knots}),.UNSPECIFIED.) GEOMETRIC_REPRESENTATION_ITEM() RATIONAL_B_SPLINE_SURFACE(({grid})) REPRESENTATION_ITEM('') SURFACE() )"
                )))
            }
        }
    }

    fn write_curve(&mut self, curve: &NurbsCurve) -> Result<u64, StepError> {
        if curve.degree == 1 && curve.control_points.len() == 2 && curve.weights.is_none() {
            let start = curve.control_points[0];
            let end = curve.control_points[1];
            let delta = end - start;
            let magnitude = (self.map_point(&end) - self.map_point(&start)).norm();
            let dir = if delta.norm() < 1e-15 {
                Dir3::new_normalize(Vec3::x())
            } else {
                Dir3::new_normalize(delta)
            };
            let point_id = self.point_id(&start)?;
            let dir_id = self.dir_id(&dir)?;
            let vector_id = self.emit(format!("VECTOR('',#{dir_id},{})", fmt_real(magnitude)?));
            return Ok(self.emit(format!("LINE('',#{point_id},#{vector_id})")));
        }
        self.write_bspline_curve(curve)
    }

    fn write_bspline_curve(&mut self, curve: &NurbsCurve) -> Result<u64, StepError> {
        let mut ids = Vec::with_capacity(curve.control_points.len());
        for p in &curve.control_points {
            ids.push(format!("#{}", self.point_id(p)?));
        }
        let cps = ids.join(",");
        let (values, mults) = compress_knots(&curve.knots);
        let knots = reals(&values)?;
        let m = ints(&mults);
        let degree = curve.degree;

        match &curve.weights {
            None => Ok(self.emit(format!(
                "B_SPLINE_CURVE_WITH_KNOTS('',{degree},({cps}),.UNSPECIFIED.,.F.,.F.,({m}),({knots}),.UNSPECIFIED.)"
            ))),
            Some(weights) => {
                let w = reals(weights)?;
                Ok(self.emit(format!(
                    "( BOUNDED_CURVE() B_SPLINE_CURVE({degree},({cps}),.UNSPECIFIED.,.F.,.F.) B_SPLINE_CURVE_WITH_KNOTS(({m}),({knots}),.UNSPECIFIED.) CURVE() GEOMETRIC_REPRESENTATION_ITEM() RATIONAL_B_SPLINE_CURVE(({w})) REPRESENTATION_ITEM('') )"
                )))
            }
        }
    }

    // =========================================================================
    // Topology
    // =========================================================================

    /// Emit the EDGE_CURVE for an edge, reusing a previous one when the
    /// same (epsilon-keyed) endpoints were already written. Returns the id
    /// and whether the stored record runs opposite to this edge.
    fn edge_curve_id(&mut self, edge: &Edge) -> Result<(u64, bool), StepError> {
        let start_key = self.key_for(&self.map_point(&edge.start));
        let end_key = self.key_for(&self.map_point(&edge.end));
        if let Some(&id) = self.edge_ids.get(&(start_key, end_key)) {
            return Ok((id, false));
        }
        if let Some(&id) = self.edge_ids.get(&(end_key, start_key)) {
            return Ok((id, true));
        }

        let start_vertex = self.vertex_id(&edge.start)?;
        let end_vertex = self.vertex_id(&edge.end)?;
        let curve_id = match &edge.curve {
            Some(curve) => self.write_curve(curve)?,
            None => self.write_curve(&NurbsCurve::line_segment(edge.start, edge.end))?,
        };
        let id = self.emit(format!(
            "EDGE_CURVE('',#{start_vertex},#{end_vertex},#{curve_id},.T.)"
        ));
        self.edge_ids.insert((start_key, end_key), id);
        Ok((id, false))
    }

    fn write_loop(&mut self, ring: &Loop) -> Result<u64, StepError> {
        let mut oriented = Vec::with_capacity(ring.edges.len());
        for edge in &ring.edges {
            let (edge_id, reversed) = self.edge_curve_id(edge)?;
            let orientation = edge.forward != reversed;
            let flag = if orientation { ".T." } else { ".F." };
            let oe = self.emit(format!("ORIENTED_EDGE('',*,*,#{edge_id},{flag})"));
            oriented.push(format!("#{oe}"));
        }
        Ok(self.emit(format!("EDGE_LOOP('',({}))", oriented.join(","))))
    }

    fn write_face(&mut self, face: &Face) -> Result<u64, StepError> {
        let surface_id = self.write_surface(&face.surface)?;
        let mut bounds = Vec::with_capacity(1 + face.inner.len());
        if !face.outer.edges.is_empty() {
            let loop_id = self.write_loop(&face.outer)?;
            let b = self.emit(format!("FACE_OUTER_BOUND('',#{loop_id},.T.)"));
            bounds.push(format!("#{b}"));
        }
        for ring in &face.inner {
            let loop_id = self.write_loop(ring)?;
            let b = self.emit(format!("FACE_BOUND('',#{loop_id},.T.)"));
            bounds.push(format!("#{b}"));
        }
        let sense = if face.same_sense { ".T." } else { ".F." };
        Ok(self.emit(format!(
            "ADVANCED_FACE('',({}),#{surface_id},{sense})",
            bounds.join(",")
        )))
    }

    fn write_body(&mut self, body: &Body) -> Result<u64, StepError> {
        let mut face_ids = Vec::with_capacity(body.faces.len());
        for face in &body.faces {
            let id = self.write_face(face)?;
            face_ids.push(format!("#{id}"));
        }
        let faces = face_ids.join(",");
        let name = escape(&body.name);
        if body.is_solid {
            let shell = self.emit(format!("CLOSED_SHELL('',({faces}))"));
            Ok(self.emit(format!("MANIFOLD_SOLID_BREP('{name}',#{shell})")))
        } else {
            let shell = self.emit(format!("OPEN_SHELL('',({faces}))"));
            Ok(self.emit(format!(
                "SHELL_BASED_SURFACE_MODEL('{name}',(#{shell}))"
            )))
        }
    }

    /// The AP214 presentation chain tying a COLOUR_RGB back to a body.
    fn write_style_chain(&mut self, body_id: u64, body: &Body) -> Result<(), StepError> {
        let colour = self.emit(format!(
            "COLOUR_RGB('',{},{},{})",
            fmt_real(body.color.r)?,
            fmt_real(body.color.g)?,
            fmt_real(body.color.b)?
        ));
        let fill_colour = self.emit(format!("FILL_AREA_STYLE_COLOUR('',#{colour})"));
        let fill_style = self.emit(format!("FILL_AREA_STYLE('',(#{fill_colour}))"));
        let style_fill = self.emit(format!("SURFACE_STYLE_FILL_AREA(#{fill_style})"));
        let side_style = self.emit(format!("SURFACE_SIDE_STYLE('',(#{style_fill}))"));
        let usage = self.emit(format!("SURFACE_STYLE_USAGE(.BOTH.,#{side_style})"));
        let assignment = self.emit(format!("PRESENTATION_STYLE_ASSIGNMENT((#{usage}))"));
        self.emit(format!("STYLED_ITEM('',(#{assignment}),#{body_id})"));
        Ok(())
    }

    fn write_model(&mut self, model: &Model) -> Result<(), StepError> {
        self.write_unit_context()?;
        for body in &model.bodies {
            let body_id = self.write_body(body)?;
            if self.options.include_colors && self.options.schema == StepSchema::Ap214 {
                self.write_style_chain(body_id, body)?;
            }
        }
        Ok(())
    }
}

fn reals(values: &[f64]) -> Result<String, StepError> {
    let parts: Result<Vec<String>, StepError> = values.iter().map(|&v| fmt_real(v)).collect();
    Ok(parts?.join(","))
}

fn ints(values: &[usize]) -> String {
    values
        .iter()
        .map(|v| v.to_string())
        .collect::<Vec<_>>()
        .join(",")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reader::{read_step_from_buffer, StepReadOptions};
    use approx::assert_relative_eq;
    use dcad_math::Tolerance;
    use dcad_model::{CancelToken, Color, ProgressReporter};

    fn pinned_options() -> StepWriteOptions {
        StepWriteOptions {
            timestamp: Some("2024-06-01T12:00:00".into()),
            ..StepWriteOptions::default()
        }
    }

    fn quad_face(z: f64) -> Face {
        let a = Point3::new(0.0, 0.0, z);
        let b = Point3::new(10.0, 0.0, z);
        let c = Point3::new(10.0, 10.0, z);
        let d = Point3::new(0.0, 10.0, z);
        Face {
            outer: Loop::new(vec![
                dcad_model::Edge::segment(a, b),
                dcad_model::Edge::segment(b, c),
                dcad_model::Edge::segment(c, d),
                dcad_model::Edge::segment(d, a),
            ]),
            inner: Vec::new(),
            surface: NurbsSurface::plane_patch(
                Point3::new(5.0, 5.0, z),
                Dir3::new_normalize(Vec3::z()),
                None,
                10.0,
            ),
            same_sense: true,
            color: Color::default(),
        }
    }

    fn single_face_model() -> Model {
        let mut model = Model::new("patch");
        let mut body = Body::new("Patch");
        body.faces.push(quad_face(0.0));
        model.bodies.push(body);
        model
    }

    #[test]
    fn test_fmt_real() {
        assert_eq!(fmt_real(1.0).unwrap(), "1.0E0");
        assert_eq!(fmt_real(0.0).unwrap(), "0.0E0");
        assert_eq!(fmt_real(25.4).unwrap(), "2.54E1");
        assert_eq!(fmt_real(-0.5).unwrap(), "-5.0E-1");
        assert!(fmt_real(f64::NAN).is_err());
    }

    #[test]
    fn test_escape() {
        assert_eq!(escape("it's"), "it''s");
        assert_eq!(escape(r"a\b"), r"a\\b");
    }

    #[test]
    fn test_civil_from_days() {
        assert_eq!(civil_from_days(0), (1970, 1, 1));
        assert_eq!(civil_from_days(19_723), (2024, 1, 1));
    }

    #[test]
    fn test_header_and_framing() {
        let text = write_step_to_string(&single_face_model(), &pinned_options()).unwrap();
        assert!(text.starts_with("ISO-10303-21;\n"));
        assert!(text.ends_with("END-ISO-10303-21;\n"));
        assert!(text.contains("FILE_SCHEMA(('AUTOMOTIVE_DESIGN'));"));
        assert!(text.contains("SI_UNIT(.MILLI.,.METRE.)"));
        // One record per line, no trailing whitespace anywhere.
        for line in text.lines() {
            assert_eq!(line, line.trim_end());
        }
    }

    #[test]
    fn test_ap203_schema_name() {
        let options = StepWriteOptions {
            schema: StepSchema::Ap203,
            include_colors: false,
            ..pinned_options()
        };
        let text = write_step_to_string(&single_face_model(), &options).unwrap();
        assert!(text.contains("FILE_SCHEMA(('CONFIG_CONTROL_DESIGN'));"));
        assert!(!text.contains("STYLED_ITEM"));
    }

    #[test]
    fn test_export_is_idempotent_with_pinned_timestamp() {
        let model = single_face_model();
        let options = pinned_options();
        let a = write_step_to_string(&model, &options).unwrap();
        let b = write_step_to_string(&model, &options).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_shared_points_emit_once() {
        let text = write_step_to_string(&single_face_model(), &pinned_options()).unwrap();
        // 4 loop corners + 4 plane patch corners share (0,0,0) and (10,10,0):
        // the corner point record appears exactly once.
        let needle = "CARTESIAN_POINT('',(0.0E0,0.0E0,0.0E0))";
        assert_eq!(text.matches(needle).count(), 1);
    }

    #[test]
    fn test_red_body_styled_chain() {
        let mut model = single_face_model();
        model.bodies[0].color = Color::new(1.0, 0.0, 0.0);
        model.bodies[0].is_solid = true;
        let text = write_step_to_string(&model, &pinned_options()).unwrap();

        assert!(text.contains("COLOUR_RGB('',1.0E0,0.0E0,0.0E0)"));
        // STYLED_ITEM is the last record and references the body id.
        let body_line = text
            .lines()
            .find(|l| l.contains("MANIFOLD_SOLID_BREP"))
            .unwrap();
        let body_id = body_line.split('=').next().unwrap().to_string();
        let styled_line = text.lines().find(|l| l.contains("STYLED_ITEM")).unwrap();
        assert!(styled_line.contains(&format!(",{body_id})")));
        // The chain appears in dependency order.
        let idx = |needle: &str| text.find(needle).unwrap();
        assert!(idx("COLOUR_RGB") < idx("FILL_AREA_STYLE_COLOUR"));
        assert!(idx("FILL_AREA_STYLE_COLOUR") < idx("SURFACE_SIDE_STYLE"));
        assert!(idx("SURFACE_STYLE_USAGE") < idx("PRESENTATION_STYLE_ASSIGNMENT"));
        assert!(idx("PRESENTATION_STYLE_ASSIGNMENT") < idx("STYLED_ITEM"));
    }

    #[test]
    fn test_roundtrip_plane_face() {
        let model = single_face_model();
        let text = write_step_to_string(&model, &pinned_options()).unwrap();
        let import = read_step_from_buffer(
            text.as_bytes(),
            &StepReadOptions::default(),
            &CancelToken::new(),
            &mut ProgressReporter::default(),
        )
        .unwrap();
        assert_eq!(import.model.bodies.len(), 1);
        let face = &import.model.bodies[0].faces[0];
        assert_eq!(face.outer.edges.len(), 4);
        assert!(face.outer.is_closed(&Tolerance::DEFAULT));

        // Geometric equivalence of the surfaces on a sample grid.
        let original = &model.bodies[0].faces[0].surface;
        let imported = &face.surface;
        let (origin_a, normal_a, _) = original.as_plane().unwrap();
        let (origin_b, normal_b, _) = imported.as_plane().unwrap();
        assert!((origin_a.z - origin_b.z).abs() < 1e-6);
        assert!(
            (normal_a.as_ref() - normal_b.as_ref()).norm() < 1e-6
                || (normal_a.as_ref() + normal_b.as_ref()).norm() < 1e-6
        );
    }

    #[test]
    fn test_roundtrip_cylinder_surface() {
        let mut model = Model::new("cyl");
        let mut body = Body::new("Cylinder");
        body.faces.push(Face::unbounded(NurbsSurface::cylinder_patch(
            Point3::new(1.0, 2.0, 3.0),
            Dir3::new_normalize(Vec3::z()),
            None,
            7.5,
            40.0,
        )));
        model.bodies.push(body);

        let text = write_step_to_string(&model, &pinned_options()).unwrap();
        assert!(text.contains("CYLINDRICAL_SURFACE"));

        let import = read_step_from_buffer(
            text.as_bytes(),
            &StepReadOptions::default(),
            &CancelToken::new(),
            &mut ProgressReporter::default(),
        )
        .unwrap();
        let surface = &import.model.bodies[0].faces[0].surface;
        let sampled = surface.point_at(0.25, 0.5);
        let r = ((sampled.x - 1.0).powi(2) + (sampled.y - 2.0).powi(2)).sqrt();
        assert_relative_eq!(r, 7.5, epsilon = 1e-6);
    }

    #[test]
    fn test_rational_surface_roundtrip_through_complex_record() {
        let mut model = Model::new("rational");
        let mut body = Body::new("Rational");
        // A cylinder patch scaled so the canonical pattern is broken and the
        // writer falls back to the rational B-spline form.
        let mut surface = NurbsSurface::cylinder_patch(
            Point3::origin(),
            Dir3::new_normalize(Vec3::z()),
            None,
            5.0,
            10.0,
        );
        surface.control_points[0][0].x += 0.5; // break the pattern
        body.faces.push(Face::unbounded(surface.clone()));
        model.bodies.push(body);

        let text = write_step_to_string(&model, &pinned_options()).unwrap();
        assert!(text.contains("RATIONAL_B_SPLINE_SURFACE"));

        let import = read_step_from_buffer(
            text.as_bytes(),
            &StepReadOptions::default(),
            &CancelToken::new(),
            &mut ProgressReporter::default(),
        )
        .unwrap();
        let back = &import.model.bodies[0].faces[0].surface;
        assert_eq!(back.degree_u, 2);
        assert!(back.weights.is_some());
        // Sample agreement between original and re-imported surface.
        for i in 0..=4 {
            for j in 0..=4 {
                let u = i as f64 / 4.0;
                let v = j as f64 / 4.0;
                let p = surface.point_at(u, v);
                let q = back.point_at(u, v);
                assert!((p - q).norm() < 1e-6, "mismatch at ({u},{v})");
            }
        }
    }

    #[test]
    fn test_unit_scale_applied_on_export() {
        let options = StepWriteOptions {
            unit: StepUnit::Inch,
            ..pinned_options()
        };
        let mut model = Model::new("inch");
        let mut body = Body::new("B");
        let mut face = quad_face(0.0);
        // One distinctive coordinate: 25.4 mm becomes exactly 1 inch.
        face.outer.edges[0].end = Point3::new(25.4, 0.0, 0.0);
        body.faces.push(face);
        model.bodies.push(body);
        let text = write_step_to_string(&model, &options).unwrap();
        assert!(text.contains("CONVERSION_BASED_UNIT('INCH'"));
        assert!(text.contains("CARTESIAN_POINT('',(1.0E0,0.0E0,0.0E0))"));
    }
}
