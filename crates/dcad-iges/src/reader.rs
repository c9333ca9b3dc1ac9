//! IGES reader: realizes directory + parameter data into a [`Model`].
//!
//! Entities are realized on demand from the trimmed-surface roots (type
//! 144) and from independent surface entries, with memo tables keyed by
//! directory pointer and an in-progress set guarding against reference
//! cycles. All coordinates are scaled to millimeters using the global
//! section's unit flag before any geometry is built.

use std::collections::{HashMap, HashSet};
use std::f64::consts::PI;
use std::path::Path;

use crate::error::IgesError;
use crate::sections::{
    int_field, parameter_fields, parse_directory, real_field, split_sections, DirectoryEntry,
    GlobalSection,
};
use dcad_math::{Dir3, Point3, Tolerance, Transform, Vec3};
use dcad_model::{Body, CancelToken, Color, Edge, Face, Loop, Model, ProgressReporter, Warnings};
use dcad_nurbs::{validate_knots, NurbsCurve, NurbsSurface};

/// Options controlling IGES import.
#[derive(Debug, Clone)]
pub struct IgesReadOptions {
    /// Millimeters per file unit when the units flag is unusable.
    pub assumed_scale: f64,
    /// Import entity colors.
    pub import_colors: bool,
    /// Geometric tolerance for loop-closure checks.
    pub tolerance: Tolerance,
    /// Transform applied to all geometry after unit scaling.
    pub frame: Transform,
}

impl Default for IgesReadOptions {
    fn default() -> Self {
        Self {
            assumed_scale: 1.0,
            import_colors: true,
            tolerance: Tolerance::DEFAULT,
            frame: Transform::identity(),
        }
    }
}

/// The product of an IGES import.
#[derive(Debug)]
pub struct IgesImport {
    /// The realized model.
    pub model: Model,
    /// Recoverable problems encountered along the way.
    pub warnings: Vec<String>,
    /// Number of directory entries ingested.
    pub entity_count: usize,
    /// Millimeters per file unit actually applied.
    pub scale: f64,
}

/// Read an IGES file from a path.
pub fn read_iges(path: impl AsRef<Path>, options: &IgesReadOptions) -> Result<IgesImport, IgesError> {
    let data = std::fs::read(path)?;
    read_iges_from_buffer(
        &data,
        options,
        &CancelToken::new(),
        &mut ProgressReporter::default(),
    )
}

/// Read an IGES model from a byte buffer.
pub fn read_iges_from_buffer(
    data: &[u8],
    options: &IgesReadOptions,
    cancel: &CancelToken,
    progress: &mut ProgressReporter,
) -> Result<IgesImport, IgesError> {
    let text = String::from_utf8_lossy(data);
    let mut warnings = Warnings::new();

    if cancel.is_cancelled() {
        return Err(IgesError::Cancelled);
    }
    let sections = split_sections(&text, &mut warnings)?;
    let global = GlobalSection::parse(&sections.global, &mut warnings);
    let entries = parse_directory(&sections.directory, &mut warnings);
    progress.report(30.0);

    let scale = global.unit_scale(options.assumed_scale, &mut warnings) * {
        if global.model_scale > 0.0 {
            // Model space scale is model units per real-world unit.
            1.0 / global.model_scale
        } else {
            1.0
        }
    };

    let mut reader = IgesReader {
        entries: entries.iter().map(|e| (e.de_pointer, e.clone())).collect(),
        order: entries.iter().map(|e| e.de_pointer).collect(),
        parameter_lines: sections.parameter,
        global,
        scale,
        frame: options.frame.clone(),
        tolerance: options.tolerance,
        import_colors: options.import_colors,
        curves: HashMap::new(),
        surfaces: HashMap::new(),
        transforms: HashMap::new(),
        in_progress: HashSet::new(),
        referenced: HashSet::new(),
        warnings,
    };

    let model = reader.read_model(cancel, progress)?;
    progress.report(100.0);

    Ok(IgesImport {
        model,
        entity_count: reader.order.len(),
        warnings: reader.warnings.into_messages(),
        scale,
    })
}

struct IgesReader {
    entries: HashMap<usize, DirectoryEntry>,
    order: Vec<usize>,
    parameter_lines: Vec<String>,
    global: GlobalSection,
    scale: f64,
    frame: Transform,
    tolerance: Tolerance,
    import_colors: bool,
    curves: HashMap<usize, NurbsCurve>,
    surfaces: HashMap<usize, NurbsSurface>,
    transforms: HashMap<usize, Transform>,
    in_progress: HashSet<usize>,
    /// Directory pointers consumed as children of a trimmed surface.
    referenced: HashSet<usize>,
    warnings: Warnings,
}

impl IgesReader {
    fn entry(&self, de: usize) -> Result<&DirectoryEntry, IgesError> {
        self.entries.get(&de).ok_or(IgesError::MissingEntity(de))
    }

    fn fields(&mut self, de: usize) -> Result<Vec<String>, IgesError> {
        let entry = self.entry(de)?.clone();
        Ok(parameter_fields(
            &entry,
            &self.parameter_lines,
            &self.global,
            &mut self.warnings,
        ))
    }

    /// Compose the frame conversion with the entity's placement transform.
    fn total_transform(&mut self, de: usize) -> Transform {
        let entry = match self.entries.get(&de) {
            Some(e) => e.clone(),
            None => return self.frame.clone(),
        };
        if entry.transform == 0 {
            return self.frame.clone();
        }
        let placement = self.transform(entry.transform);
        self.frame.then(&placement)
    }

    /// Realize a type-124 transformation matrix, composing chained ones.
    fn transform(&mut self, de: usize) -> Transform {
        if let Some(t) = self.transforms.get(&de) {
            return t.clone();
        }
        if !self.in_progress.insert(de) {
            self.warnings
                .push(format!("cyclic transformation chain at entry {de}"));
            return Transform::identity();
        }
        let t = self.transform_uncached(de).unwrap_or_else(|e| {
            self.warnings.push(format!("transform at entry {de}: {e}"));
            Transform::identity()
        });
        self.in_progress.remove(&de);
        self.transforms.insert(de, t.clone());
        t
    }

    fn transform_uncached(&mut self, de: usize) -> Result<Transform, IgesError> {
        let entry = self.entry(de)?.clone();
        if entry.entity_type != 124 {
            return Err(IgesError::UnsupportedEntity(entry.entity_type));
        }
        let fields = self.fields(de)?;
        let mut values = [0.0f64; 12];
        for (i, v) in values.iter_mut().enumerate() {
            *v = real_field(&fields, i, &mut self.warnings);
        }
        // Twelve values: three rows of rotation plus translation. The
        // translation carries length units.
        let m = Transform::from_row_major(&[
            values[0],
            values[1],
            values[2],
            values[3] * self.scale,
            values[4],
            values[5],
            values[6],
            values[7] * self.scale,
            values[8],
            values[9],
            values[10],
            values[11] * self.scale,
            0.0,
            0.0,
            0.0,
            1.0,
        ]);
        let composed = if entry.transform != 0 && entry.transform != de {
            self.transform(entry.transform).then(&m)
        } else {
            m
        };
        Ok(composed)
    }

    // =========================================================================
    // Curves
    // =========================================================================

    fn curve(&mut self, de: usize) -> Result<NurbsCurve, IgesError> {
        if let Some(c) = self.curves.get(&de) {
            return Ok(c.clone());
        }
        if !self.in_progress.insert(de) {
            self.warnings
                .push(format!("cyclic curve reference at entry {de}, using placeholder"));
            return Ok(NurbsCurve::line_segment(
                Point3::origin(),
                Point3::new(1.0, 0.0, 0.0),
            ));
        }
        let result = self.curve_uncached(de);
        self.in_progress.remove(&de);
        let c = result?;
        self.curves.insert(de, c.clone());
        Ok(c)
    }

    fn curve_uncached(&mut self, de: usize) -> Result<NurbsCurve, IgesError> {
        let entry = self.entry(de)?.clone();
        let fields = self.fields(de)?;
        let t = self.total_transform(de);
        let s = self.scale;
        let mut real = |i: usize| real_field(&fields, i, &mut self.warnings);

        match entry.entity_type {
            110 => {
                // Line: X1, Y1, Z1, X2, Y2, Z2
                let a = Point3::new(real(0) * s, real(1) * s, real(2) * s);
                let b = Point3::new(real(3) * s, real(4) * s, real(5) * s);
                Ok(NurbsCurve::line_segment(a, b).transformed(&t))
            }
            100 => {
                // Circular arc: ZT, center, start, end; counter-clockwise
                // in the definition plane.
                let zt = real(0) * s;
                let center = Point3::new(real(1) * s, real(2) * s, zt);
                let start = Point3::new(real(3) * s, real(4) * s, zt);
                let end = Point3::new(real(5) * s, real(6) * s, zt);
                let normal = Dir3::new_normalize(Vec3::z());
                if (start - end).norm() < self.tolerance.linear {
                    let radius = (start - center).norm();
                    Ok(NurbsCurve::full_circle(center, normal, radius).transformed(&t))
                } else {
                    Ok(NurbsCurve::circular_arc(center, start, end, normal).transformed(&t))
                }
            }
            102 => self.composite_curve(de, &fields),
            126 => self.spline_curve(de, &fields).map(|c| c.transformed(&t)),
            other => Err(IgesError::UnsupportedEntity(other)),
        }
    }

    fn composite_curve(&mut self, de: usize, fields: &[String]) -> Result<NurbsCurve, IgesError> {
        let n = int_field(fields, 0, &mut self.warnings).max(0) as usize;
        let mut parts = Vec::with_capacity(n);
        for i in 0..n {
            let child = int_field(fields, 1 + i, &mut self.warnings).max(0) as usize;
            self.referenced.insert(child);
            match self.curve(child) {
                Ok(c) => parts.push(c),
                Err(e) => self
                    .warnings
                    .push(format!("composite curve {de}: segment {child}: {e}")),
            }
        }
        NurbsCurve::concatenate(&parts)
            .ok_or_else(|| IgesError::InvalidGeometry(format!("empty composite curve at {de}")))
    }

    /// Type 126: rational B-spline curve.
    fn spline_curve(&mut self, de: usize, fields: &[String]) -> Result<NurbsCurve, IgesError> {
        let k = int_field(fields, 0, &mut self.warnings).max(0) as usize;
        let degree = int_field(fields, 1, &mut self.warnings).max(1) as usize;
        let polynomial = int_field(fields, 4, &mut self.warnings) == 1;

        let n_points = k + 1;
        let n_knots = k + degree + 2;
        let mut idx = 6;
        let mut knots = Vec::with_capacity(n_knots);
        for _ in 0..n_knots {
            knots.push(real_field(fields, idx, &mut self.warnings));
            idx += 1;
        }
        let mut weights = Vec::with_capacity(n_points);
        for _ in 0..n_points {
            weights.push(real_field(fields, idx, &mut self.warnings));
            idx += 1;
        }
        let mut points = Vec::with_capacity(n_points);
        for _ in 0..n_points {
            let x = real_field(fields, idx, &mut self.warnings) * self.scale;
            let y = real_field(fields, idx + 1, &mut self.warnings) * self.scale;
            let z = real_field(fields, idx + 2, &mut self.warnings) * self.scale;
            points.push(Point3::new(x, y, z));
            idx += 3;
        }

        if !validate_knots(&knots, n_points, degree) {
            return Err(IgesError::InvalidGeometry(format!(
                "spline curve at {de}: {} knots for {} points of degree {}",
                knots.len(),
                n_points,
                degree
            )));
        }
        let weights = if polynomial || weights.iter().all(|&w| (w - 1.0).abs() < 1e-12) {
            None
        } else {
            Some(weights)
        };
        Ok(NurbsCurve::new(degree, points, weights, knots))
    }

    // =========================================================================
    // Surfaces
    // =========================================================================

    fn surface(&mut self, de: usize) -> Result<NurbsSurface, IgesError> {
        if let Some(s) = self.surfaces.get(&de) {
            return Ok(s.clone());
        }
        if !self.in_progress.insert(de) {
            self.warnings
                .push(format!("cyclic surface reference at entry {de}, using placeholder"));
            return Ok(placeholder_surface());
        }
        let result = self.surface_uncached(de);
        self.in_progress.remove(&de);
        let s = result?;
        self.surfaces.insert(de, s.clone());
        Ok(s)
    }

    fn surface_uncached(&mut self, de: usize) -> Result<NurbsSurface, IgesError> {
        let entry = self.entry(de)?.clone();
        let fields = self.fields(de)?;
        let t = self.total_transform(de);
        let s = self.scale;
        let mut real = |i: usize| real_field(&fields, i, &mut self.warnings);

        match entry.entity_type {
            108 => {
                // Plane by equation Ax + By + Cz = D.
                let a = real(0);
                let b = real(1);
                let c = real(2);
                let d = real(3) * s;
                let n = Vec3::new(a, b, c);
                if n.norm() < 1e-12 {
                    return Err(IgesError::InvalidGeometry(format!(
                        "degenerate plane normal at entry {de}"
                    )));
                }
                let normal = Dir3::new_normalize(n);
                let origin = Point3::from(normal.as_ref() * (d / n.norm()));
                Ok(
                    NurbsSurface::plane_patch(origin, normal, None, NurbsSurface::ANALYTIC_EXTENT)
                        .transformed(&t),
                )
            }
            118 => {
                // Ruled surface between two curves.
                let c1 = int_field(&fields, 0, &mut self.warnings).max(0) as usize;
                let c2 = int_field(&fields, 1, &mut self.warnings).max(0) as usize;
                self.referenced.insert(c1);
                self.referenced.insert(c2);
                let a = self.curve(c1)?;
                let b = self.curve(c2)?;
                Ok(NurbsSurface::ruled(&a, &b).transformed(&t))
            }
            120 => {
                // Surface of revolution: axis line, generatrix, angles.
                let axis_de = int_field(&fields, 0, &mut self.warnings).max(0) as usize;
                let gen_de = int_field(&fields, 1, &mut self.warnings).max(0) as usize;
                let start_angle = real_field(&fields, 2, &mut self.warnings);
                let end_angle = real_field(&fields, 3, &mut self.warnings);
                self.referenced.insert(axis_de);
                self.referenced.insert(gen_de);

                let axis_line = self.curve(axis_de)?;
                let origin = axis_line.start_point();
                let axis_vec = axis_line.end_point() - origin;
                if axis_vec.norm() < 1e-12 {
                    return Err(IgesError::InvalidGeometry(format!(
                        "degenerate revolution axis at entry {de}"
                    )));
                }
                let axis = Dir3::new_normalize(axis_vec);

                let mut generator = self.curve(gen_de)?;
                let mut sweep = end_angle - start_angle;
                if sweep <= 1e-12 {
                    sweep += 2.0 * PI;
                }
                if start_angle.abs() > 1e-12 {
                    generator = generator
                        .transformed(&Transform::rotation_about_line(&origin, &axis, start_angle));
                }
                Ok(NurbsSurface::revolve(&generator, origin, axis, sweep).transformed(&t))
            }
            122 => {
                // Tabulated cylinder: directrix extruded to a point.
                let gen_de = int_field(&fields, 0, &mut self.warnings).max(0) as usize;
                let target = Point3::new(
                    real_field(&fields, 1, &mut self.warnings) * s,
                    real_field(&fields, 2, &mut self.warnings) * s,
                    real_field(&fields, 3, &mut self.warnings) * s,
                );
                self.referenced.insert(gen_de);
                let generator = self.curve(gen_de)?;
                let direction = target - generator.start_point();
                Ok(NurbsSurface::extrude(&generator, direction).transformed(&t))
            }
            128 => self.spline_surface(de, &fields).map(|sf| sf.transformed(&t)),
            other => Err(IgesError::UnsupportedEntity(other)),
        }
    }

    /// Type 128: rational B-spline surface. The first index varies fastest
    /// in the weight and control point sequences.
    fn spline_surface(&mut self, de: usize, fields: &[String]) -> Result<NurbsSurface, IgesError> {
        let k1 = int_field(fields, 0, &mut self.warnings).max(0) as usize;
        let k2 = int_field(fields, 1, &mut self.warnings).max(0) as usize;
        let m1 = int_field(fields, 2, &mut self.warnings).max(1) as usize;
        let m2 = int_field(fields, 3, &mut self.warnings).max(1) as usize;
        let polynomial = int_field(fields, 6, &mut self.warnings) == 1;

        let nu = k1 + 1;
        let nv = k2 + 1;
        let n_knots_u = k1 + m1 + 2;
        let n_knots_v = k2 + m2 + 2;

        let mut idx = 9;
        let mut knots_u = Vec::with_capacity(n_knots_u);
        for _ in 0..n_knots_u {
            knots_u.push(real_field(fields, idx, &mut self.warnings));
            idx += 1;
        }
        let mut knots_v = Vec::with_capacity(n_knots_v);
        for _ in 0..n_knots_v {
            knots_v.push(real_field(fields, idx, &mut self.warnings));
            idx += 1;
        }

        let mut weights = vec![vec![0.0; nv]; nu];
        for j in 0..nv {
            for i in 0..nu {
                weights[i][j] = real_field(fields, idx, &mut self.warnings);
                idx += 1;
            }
        }
        let mut grid = vec![vec![Point3::origin(); nv]; nu];
        for j in 0..nv {
            for i in 0..nu {
                let x = real_field(fields, idx, &mut self.warnings) * self.scale;
                let y = real_field(fields, idx + 1, &mut self.warnings) * self.scale;
                let z = real_field(fields, idx + 2, &mut self.warnings) * self.scale;
                grid[i][j] = Point3::new(x, y, z);
                idx += 3;
            }
        }

        if !validate_knots(&knots_u, nu, m1) || !validate_knots(&knots_v, nv, m2) {
            return Err(IgesError::InvalidGeometry(format!(
                "spline surface at {de}: knot counts u={}/{} v={}/{}",
                knots_u.len(),
                nu + m1 + 1,
                knots_v.len(),
                nv + m2 + 1
            )));
        }

        let all_unit = weights
            .iter()
            .all(|row| row.iter().all(|&w| (w - 1.0).abs() < 1e-12));
        let weights = if polynomial || all_unit {
            None
        } else {
            Some(weights)
        };
        Ok(NurbsSurface::new(m1, m2, grid, weights, knots_u, knots_v))
    }

    // =========================================================================
    // Colors
    // =========================================================================

    /// Color from a directory entry: negative numbers point at a type-314
    /// definition, positive ones index the fixed palette.
    fn entity_color(&mut self, entry: &DirectoryEntry) -> Option<Color> {
        if !self.import_colors {
            return None;
        }
        if entry.color < 0 {
            let de = (-entry.color) as usize;
            self.referenced.insert(de);
            let fields = self.fields(de).ok()?;
            // Components are percentages.
            let r = real_field(&fields, 0, &mut self.warnings) / 100.0;
            let g = real_field(&fields, 1, &mut self.warnings) / 100.0;
            let b = real_field(&fields, 2, &mut self.warnings) / 100.0;
            return Some(Color::new(r, g, b));
        }
        match entry.color {
            1 => Some(Color::new(0.0, 0.0, 0.0)),
            2 => Some(Color::new(1.0, 0.0, 0.0)),
            3 => Some(Color::new(0.0, 1.0, 0.0)),
            4 => Some(Color::new(0.0, 0.0, 1.0)),
            5 => Some(Color::new(1.0, 1.0, 0.0)),
            6 => Some(Color::new(1.0, 0.0, 1.0)),
            7 => Some(Color::new(0.0, 1.0, 1.0)),
            8 => Some(Color::new(1.0, 1.0, 1.0)),
            _ => None,
        }
    }

    // =========================================================================
    // Model assembly
    // =========================================================================

    fn read_model(
        &mut self,
        cancel: &CancelToken,
        progress: &mut ProgressReporter,
    ) -> Result<Model, IgesError> {
        let name = if self.global.product_id.is_empty() {
            self.global.file_name.clone()
        } else {
            self.global.product_id.clone()
        };
        let mut model = Model::new(name.clone());
        let mut body = Body::new(if name.is_empty() { "IGES" } else { &name });

        let order = self.order.clone();
        let total = order.len().max(1) as f32;

        // First pass: trimmed surfaces own their children.
        for (i, de) in order.iter().copied().enumerate() {
            if cancel.is_cancelled() {
                return Err(IgesError::Cancelled);
            }
            let entry = match self.entries.get(&de) {
                Some(e) => e.clone(),
                None => continue,
            };
            if entry.entity_type == 144 {
                match self.read_trimmed_surface(de, &entry) {
                    Ok(face) => body.faces.push(face),
                    Err(e) => self.warnings.push(format!("trimmed surface {de}: {e}")),
                }
            }
            progress.report(30.0 + 50.0 * (i + 1) as f32 / total);
        }

        // Second pass: independent untrimmed surfaces become faces too.
        for de in order.iter().copied() {
            if cancel.is_cancelled() {
                return Err(IgesError::Cancelled);
            }
            let entry = match self.entries.get(&de) {
                Some(e) => e.clone(),
                None => continue,
            };
            if !matches!(entry.entity_type, 118 | 120 | 122 | 128) {
                continue;
            }
            if entry.subordinate != 0 || self.referenced.contains(&de) {
                continue;
            }
            match self.surface(de) {
                Ok(surface) => {
                    let mut face = Face::unbounded(surface);
                    if let Some(color) = self.entity_color(&entry) {
                        face.color = color;
                    }
                    body.faces.push(face);
                }
                Err(e) => self.warnings.push(format!("surface {de}: {e}")),
            }
        }

        if body.faces.is_empty() {
            self.warnings.push("no surfaces found in file".to_string());
        } else {
            body.color = body.faces[0].color;
            model.bodies.push(body);
        }
        Ok(model)
    }

    /// Type 144: trimmed parametric surface.
    fn read_trimmed_surface(
        &mut self,
        de: usize,
        entry: &DirectoryEntry,
    ) -> Result<Face, IgesError> {
        let fields = self.fields(de)?;
        let surface_de = int_field(&fields, 0, &mut self.warnings).max(0) as usize;
        let n1 = int_field(&fields, 1, &mut self.warnings);
        let n2 = int_field(&fields, 2, &mut self.warnings).max(0) as usize;
        let outer_de = int_field(&fields, 3, &mut self.warnings).max(0) as usize;

        self.referenced.insert(surface_de);
        let surface = self.surface(surface_de)?;

        let mut face = Face::unbounded(surface);
        if n1 != 0 && outer_de != 0 {
            self.referenced.insert(outer_de);
            if let Some(ring) = self.boundary_loop(outer_de) {
                face.outer = ring;
            }
        }
        for i in 0..n2 {
            let inner_de = int_field(&fields, 4 + i, &mut self.warnings).max(0) as usize;
            if inner_de == 0 {
                continue;
            }
            self.referenced.insert(inner_de);
            if let Some(ring) = self.boundary_loop(inner_de) {
                face.inner.push(ring);
            }
        }
        if let Some(color) = self.entity_color(entry) {
            face.color = color;
        }
        Ok(face)
    }

    /// A boundary loop from a type-142 curve-on-surface (via its model
    /// space curve), or directly from a curve entity.
    fn boundary_loop(&mut self, de: usize) -> Option<Loop> {
        let entry = self.entries.get(&de)?.clone();
        let curve_de = if entry.entity_type == 142 {
            // (CRTN, surface, B = model space curve, C = parameter curve, PREF)
            let fields = self.fields(de).ok()?;
            let b = int_field(&fields, 2, &mut self.warnings).max(0) as usize;
            self.referenced.insert(b);
            b
        } else {
            de
        };
        match self.curve(curve_de) {
            Ok(curve) => {
                let edge = Edge {
                    start: curve.start_point(),
                    end: curve.end_point(),
                    curve: Some(curve),
                    forward: true,
                };
                let ring = Loop::new(vec![edge]);
                if !ring.is_closed(&self.tolerance) && ring.edges.len() > 1 {
                    self.warnings.push(format!(
                        "boundary at entry {de}: edges do not chain within tolerance"
                    ));
                }
                Some(ring)
            }
            Err(e) => {
                self.warnings.push(format!("boundary at entry {de}: {e}"));
                None
            }
        }
    }
}

fn placeholder_surface() -> NurbsSurface {
    NurbsSurface::plane_patch(
        Point3::origin(),
        Dir3::new_normalize(Vec3::z()),
        None,
        NurbsSurface::ANALYTIC_EXTENT,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    /// Assemble a minimal IGES file around directory/parameter bodies.
    fn iges_file(global_tail: &str, directory: &[String], parameter: &[String]) -> String {
        let mut out = String::new();
        out.push_str(&format!("{:<72}S{:>7}\n", "dcad test file", 1));
        let global = format!("1H,,1H;,{global_tail}");
        for (i, chunk) in global.as_bytes().chunks(72).enumerate() {
            out.push_str(&format!(
                "{:<72}G{:>7}\n",
                String::from_utf8_lossy(chunk),
                i + 1
            ));
        }
        for (i, line) in directory.iter().enumerate() {
            out.push_str(&format!("{:<72}D{:>7}\n", line, i + 1));
        }
        for (i, line) in parameter.iter().enumerate() {
            out.push_str(&format!("{:<64}{:>8}P{:>7}\n", line, 1, i + 1));
        }
        out.push_str(&format!(
            "{:<72}T{:>7}\n",
            format!("S{:>7}G{:>7}D{:>7}P{:>7}", 1, 1, directory.len(), parameter.len()),
            1
        ));
        out
    }

    fn dir_pair(entity_type: i64, param_ptr: usize, lines: usize, color: i64) -> Vec<String> {
        vec![
            format!(
                "{:>8}{:>8}{:>8}{:>8}{:>8}{:>8}{:>8}{:>8}00000000",
                entity_type, param_ptr, 0, 0, 0, 0, 0, 0
            ),
            format!(
                "{:>8}{:>8}{:>8}{:>8}{:>8}{:>8}{:>8}{:>8}",
                entity_type, 0, color, lines, 0, 0, 0, 0
            ),
        ]
    }

    fn import(text: &str) -> IgesImport {
        read_iges_from_buffer(
            text.as_bytes(),
            &IgesReadOptions::default(),
            &CancelToken::new(),
            &mut ProgressReporter::default(),
        )
        .unwrap()
    }

    const GLOBAL_MM: &str = "4Htest,8Htest.igs,4Hdcad,4Hdcad,32,38,6,308,15,4Htest,1.0,2,2HMM,1,0.08,13H240601.120000,1.0E-6,0.0,2Hme,3Horg,11,0;";
    const GLOBAL_INCH: &str = "4Htest,8Htest.igs,4Hdcad,4Hdcad,32,38,6,308,15,4Htest,1.0,1,2HIN,1,0.08,13H240601.120000,1.0E-6,0.0,2Hme,3Horg,11,0;";

    #[test]
    fn test_inch_units_scale_points() {
        // A ruled surface between two lines; unitsFlag = 1 scales by 25.4.
        let mut dir = Vec::new();
        dir.extend(dir_pair(110, 1, 1, 0));
        dir.extend(dir_pair(110, 2, 1, 0));
        dir.extend(dir_pair(118, 3, 1, 0));
        let params = vec![
            "110,0.0,0.0,0.0,1.0,0.0,0.0;".to_string(),
            "110,0.0,1.0,0.0,1.0,1.0,0.0;".to_string(),
            "118,1,3,0,0;".to_string(),
        ];
        let text = iges_file(GLOBAL_INCH, &dir, &params);
        let import = import(&text);
        assert_eq!(import.scale, 25.4);
        assert_eq!(import.model.bodies.len(), 1);
        let surface = &import.model.bodies[0].faces[0].surface;
        let p = surface.point_at(1.0, 0.0);
        assert_relative_eq!(p.x, 25.4, epsilon = 1e-9);
    }

    #[test]
    fn test_line_and_arc_curves() {
        let mut dir = Vec::new();
        dir.extend(dir_pair(100, 1, 1, 0));
        dir.extend(dir_pair(110, 2, 1, 0));
        dir.extend(dir_pair(118, 3, 1, 0));
        let params = vec![
            "100,0.0,0.0,0.0,1.0,0.0,0.0,1.0;".to_string(),
            "110,0.0,0.0,5.0,1.0,0.0,5.0;".to_string(),
            "118,1,3,0,0;".to_string(),
        ];
        let text = iges_file(GLOBAL_MM, &dir, &params);
        let import = import(&text);
        assert!(import.warnings.is_empty(), "{:?}", import.warnings);
        let surface = &import.model.bodies[0].faces[0].surface;
        // v=0 follows the quarter arc; sampled rows sit on the unit circle.
        let p = surface.point_at(5.0 / 15.0, 0.0);
        assert_relative_eq!((p.x * p.x + p.y * p.y).sqrt(), 1.0, epsilon = 1e-9);
    }

    #[test]
    fn test_arc_counter_clockwise_wrap() {
        // End angle behind start angle: winds forward through 2*pi.
        let mut dir = Vec::new();
        dir.extend(dir_pair(100, 1, 1, 0));
        dir.extend(dir_pair(122, 2, 1, 0));
        let params = vec![
            "100,0.0,0.0,0.0,1.0,0.0,0.0,-1.0;".to_string(),
            "122,1,0.0,0.0,4.0;".to_string(),
        ];
        let text = iges_file(GLOBAL_MM, &dir, &params);
        let import = import(&text);
        let surface = &import.model.bodies[0].faces[0].surface;
        // Mid-arc at 3/4 turn winding means u=0.5 sits at angle 135 deg.
        let p = surface.point_at(0.5, 0.0);
        assert!(p.x < 0.0 && p.y > 0.0, "unexpected winding: {p:?}");
    }

    #[test]
    fn test_spline_curve_roundtrip_values() {
        let mut dir = Vec::new();
        dir.extend(dir_pair(126, 1, 2, 0));
        dir.extend(dir_pair(122, 3, 1, 0));
        let params = vec![
            "126,2,2,0,0,1,0,0.0,0.0,0.0,1.0,1.0,1.0,1.0,1.0,1.0,0.0,".to_string(),
            "0.0,0.0,5.0,1.0,0.0,10.0,0.0,0.0,0.0,1.0;".to_string(),
            "122,1,0.0,0.0,7.0;".to_string(),
        ];
        let text = iges_file(GLOBAL_MM, &dir, &params);
        let import = import(&text);
        assert!(import.warnings.is_empty(), "{:?}", import.warnings);
        let surface = &import.model.bodies[0].faces[0].surface;
        let start = surface.point_at(0.0, 0.0);
        let end = surface.point_at(1.0, 0.0);
        assert_relative_eq!(start.x, 0.0, epsilon = 1e-9);
        assert_relative_eq!(end.x, 10.0, epsilon = 1e-9);
        // Extrusion direction lands the far edge at z = 7.
        let top = surface.point_at(0.0, 1.0);
        assert_relative_eq!(top.z, 7.0, epsilon = 1e-9);
    }

    #[test]
    fn test_revolution_uses_axis_line_direction() {
        // Axis along +X through the origin (not the Z default): revolving
        // a point offset in +Y sweeps a circle in the YZ plane.
        let mut dir = Vec::new();
        dir.extend(dir_pair(110, 1, 1, 0)); // axis line along +X
        dir.extend(dir_pair(110, 2, 1, 0)); // generatrix
        dir.extend(dir_pair(120, 3, 1, 0));
        let params = vec![
            "110,0.0,0.0,0.0,1.0,0.0,0.0;".to_string(),
            "110,0.0,2.0,0.0,1.0,2.0,0.0;".to_string(),
            "120,1,3,0.0,6.283185307179586;".to_string(),
        ];
        let text = iges_file(GLOBAL_MM, &dir, &params);
        let import = import(&text);
        let surface = &import.model.bodies[0].faces[0].surface;
        // Sweep circle: distance from the X axis stays 2.
        for j in 0..=8 {
            let p = surface.point_at(0.0, j as f64 / 8.0);
            let r = (p.y * p.y + p.z * p.z).sqrt();
            assert_relative_eq!(r, 2.0, epsilon = 1e-9);
        }
    }

    #[test]
    fn test_trimmed_surface_and_color() {
        let mut dir = Vec::new();
        dir.extend(dir_pair(128, 1, 3, 0)); // surface (referenced by 144)
        dir.extend(dir_pair(110, 4, 1, 0)); // boundary model curve
        dir.extend(dir_pair(142, 5, 1, 0)); // curve on surface
        dir.extend(dir_pair(314, 6, 1, 0)); // color definition
        dir.extend(dir_pair(144, 7, 1, -7)); // trimmed surface, color at DE 7
        let params = vec![
            // Bilinear patch: K1=K2=1, M1=M2=1, clamped knots, unit weights
            "128,1,1,1,1,0,0,1,0,0,0.0,0.0,1.0,1.0,0.0,0.0,1.0,1.0,".to_string(),
            "1.0,1.0,1.0,1.0,0.0,0.0,0.0,10.0,0.0,0.0,0.0,10.0,0.0,".to_string(),
            "10.0,10.0,0.0,0.0,1.0,0.0,1.0;".to_string(),
            "110,0.0,0.0,0.0,10.0,0.0,0.0;".to_string(),
            "142,0,1,3,0,1;".to_string(),
            "314,100.0,0.0,0.0,;".to_string(),
            "144,1,1,0,5;".to_string(),
        ];
        let text = iges_file(GLOBAL_MM, &dir, &params);
        let import = import(&text);
        assert_eq!(import.model.bodies.len(), 1);
        let body = &import.model.bodies[0];
        // Only the trimmed face: the 128 is consumed as a child.
        assert_eq!(body.faces.len(), 1);
        let face = &body.faces[0];
        assert_eq!(face.outer.edges.len(), 1);
        assert!(face.color.close_to(&Color::new(1.0, 0.0, 0.0), 1e-9));
    }

    #[test]
    fn test_cancel_returns_cancelled() {
        let cancel = CancelToken::new();
        cancel.cancel();
        let text = iges_file(GLOBAL_MM, &[], &[]);
        let r = read_iges_from_buffer(
            text.as_bytes(),
            &IgesReadOptions::default(),
            &cancel,
            &mut ProgressReporter::default(),
        );
        assert!(matches!(r, Err(IgesError::Cancelled)));
    }
}
