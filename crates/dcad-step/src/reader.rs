//! STEP reader: realizes the raw entity graph into a [`Model`].
//!
//! Realization is demand-driven from the topology roots
//! (`MANIFOLD_SOLID_BREP`, `SHELL_BASED_SURFACE_MODEL`) with memo tables
//! per geometry class, which visits leaves before owners without an
//! explicit scheduling pass. Unresolvable fields degrade to defaults with
//! a warning; only I/O and cancellation abort the import.

use std::collections::{HashMap, HashSet};
use std::f64::consts::PI;
use std::path::Path;

use crate::entities::{integer_list, EntityArgs};
use crate::error::StepError;
use crate::graph::{EntityGraph, RawEntity, StepValue};

use dcad_math::{orthonormal_x_from_z, Dir3, Point3, Tolerance, Transform, Vec3};
use dcad_model::{Body, CancelToken, Color, Edge, Face, Loop, Model, ProgressReporter, Warnings};
use dcad_nurbs::{expand_knots, validate_knots, NurbsCurve, NurbsSurface};

/// Options controlling STEP import.
#[derive(Debug, Clone)]
pub struct StepReadOptions {
    /// Millimeters per file unit when the file declares no unit context.
    pub assumed_scale: f64,
    /// Import presentation colors.
    pub import_colors: bool,
    /// Geometric tolerance for loop-closure checks.
    pub tolerance: Tolerance,
    /// Transform applied to all geometry after unit scaling (frame
    /// normalization); identity when the source frame is unknown.
    pub frame: Transform,
}

impl Default for StepReadOptions {
    fn default() -> Self {
        Self {
            assumed_scale: 1.0,
            import_colors: true,
            tolerance: Tolerance::DEFAULT,
            frame: Transform::identity(),
        }
    }
}

/// The product of a STEP import.
#[derive(Debug)]
pub struct StepImport {
    /// The realized model.
    pub model: Model,
    /// Recoverable problems encountered along the way.
    pub warnings: Vec<String>,
    /// Number of raw records ingested.
    pub entity_count: usize,
    /// Millimeters per file unit actually applied.
    pub scale: f64,
}

/// Read a STEP file from a path.
pub fn read_step(path: impl AsRef<Path>, options: &StepReadOptions) -> Result<StepImport, StepError> {
    let data = std::fs::read(path)?;
    read_step_from_buffer(
        &data,
        options,
        &CancelToken::new(),
        &mut ProgressReporter::default(),
    )
}

/// Read a STEP model from a byte buffer.
pub fn read_step_from_buffer(
    data: &[u8],
    options: &StepReadOptions,
    cancel: &CancelToken,
    progress: &mut ProgressReporter,
) -> Result<StepImport, StepError> {
    let mut warnings = Warnings::new();
    let graph = EntityGraph::parse(data, &mut warnings, cancel)?;
    progress.report(40.0);

    let mut reader = StepReader::new(&graph, options, warnings);
    let model = reader.read_model(cancel, progress)?;
    progress.report(100.0);

    Ok(StepImport {
        model,
        warnings: reader.warnings.into_messages(),
        entity_count: graph.len(),
        scale: reader.scale,
    })
}

/// Axis placement data (origin plus optional z and x directions).
#[derive(Debug, Clone)]
struct Placement {
    location: Point3,
    axis: Option<Dir3>,
    ref_direction: Option<Dir3>,
}

impl Placement {
    fn z_axis(&self) -> Dir3 {
        self.axis.unwrap_or_else(|| Dir3::new_normalize(Vec3::z()))
    }

    fn x_axis(&self) -> Dir3 {
        match self.ref_direction {
            Some(x) => x,
            None => orthonormal_x_from_z(&self.z_axis()),
        }
    }
}

/// Realization context: memo tables, cycle defense, units, warnings.
struct StepReader<'a> {
    graph: &'a EntityGraph,
    scale: f64,
    import_colors: bool,
    tolerance: Tolerance,
    frame: Transform,
    points: HashMap<u64, Point3>,
    directions: HashMap<u64, Dir3>,
    curves: HashMap<u64, NurbsCurve>,
    surfaces: HashMap<u64, NurbsSurface>,
    in_progress: HashSet<u64>,
    colors: HashMap<u64, Color>,
    warnings: Warnings,
}

impl<'a> StepReader<'a> {
    fn new(graph: &'a EntityGraph, options: &StepReadOptions, warnings: Warnings) -> Self {
        let mut reader = Self {
            graph,
            scale: options.assumed_scale,
            import_colors: options.import_colors,
            tolerance: options.tolerance,
            frame: options.frame.clone(),
            points: HashMap::new(),
            directions: HashMap::new(),
            curves: HashMap::new(),
            surfaces: HashMap::new(),
            in_progress: HashSet::new(),
            colors: HashMap::new(),
            warnings,
        };
        reader.scale = reader.resolve_scale(options.assumed_scale);
        reader
    }

    // =========================================================================
    // Units
    // =========================================================================

    /// Resolve millimeters-per-file-unit once from the unit context.
    fn resolve_scale(&mut self, fallback: f64) -> f64 {
        let graph = self.graph;
        for context in graph.of_type("GLOBAL_UNIT_ASSIGNED_CONTEXT") {
            let args: &[StepValue] = if context.type_name == "COMPLEX" {
                match context.complex_part("GLOBAL_UNIT_ASSIGNED_CONTEXT") {
                    Some(a) => a,
                    None => continue,
                }
            } else {
                &context.args
            };
            let Some(units) = args.iter().find_map(|a| a.as_list()) else {
                continue;
            };
            for unit_ref in units {
                let Some(id) = unit_ref.as_entity_ref() else { continue };
                let Some(unit) = graph.get(id) else { continue };
                if !unit.has_type("LENGTH_UNIT") {
                    continue;
                }
                if let Some(scale) = self.length_unit_scale(unit) {
                    return scale;
                }
            }
        }
        fallback
    }

    /// Millimeters per unit for a LENGTH_UNIT-bearing record.
    fn length_unit_scale(&mut self, unit: &RawEntity) -> Option<f64> {
        if let Some(si) = unit.complex_part("SI_UNIT") {
            let prefix = si.first().and_then(|v| v.as_enum());
            let name = si.get(1).and_then(|v| v.as_enum());
            if name != Some("METRE") {
                return None;
            }
            let factor = match prefix {
                None => 1.0,
                Some("MILLI") => 1e-3,
                Some("CENTI") => 1e-2,
                Some("DECI") => 1e-1,
                Some("KILO") => 1e3,
                Some("MICRO") => 1e-6,
                Some("NANO") => 1e-9,
                Some(other) => {
                    self.warnings
                        .push(format!("unknown SI prefix .{other}., assuming none"));
                    1.0
                }
            };
            return Some(factor * 1000.0);
        }
        if let Some(conv) = unit.complex_part("CONVERSION_BASED_UNIT") {
            let name = conv
                .first()
                .and_then(|v| v.as_string())
                .unwrap_or_default()
                .to_uppercase();
            return match name.as_str() {
                "INCH" | "'INCH'" => Some(25.4),
                "FOOT" => Some(304.8),
                "MILE" => Some(1_609_344.0),
                "METRE" | "METER" => Some(1000.0),
                _ => {
                    self.warnings
                        .push(format!("unknown conversion-based unit '{name}'"));
                    None
                }
            };
        }
        None
    }

    // =========================================================================
    // Leaf geometry
    // =========================================================================

    fn point(&mut self, id: u64) -> Result<Point3, StepError> {
        if let Some(p) = self.points.get(&id) {
            return Ok(*p);
        }
        let entity = self.graph.require(id)?;
        if entity.type_name != "CARTESIAN_POINT" {
            return Err(StepError::type_mismatch("CARTESIAN_POINT", &entity.type_name));
        }
        let coords = entity.real_list(1)?;
        if coords.len() < 3 {
            return Err(StepError::parser(
                Some(id),
                format!("CARTESIAN_POINT needs 3 coordinates, got {}", coords.len()),
            ));
        }
        let raw = Point3::new(
            coords[0] * self.scale,
            coords[1] * self.scale,
            coords[2] * self.scale,
        );
        let p = self.frame.apply_point(&raw);
        self.points.insert(id, p);
        Ok(p)
    }

    fn direction(&mut self, id: u64) -> Result<Dir3, StepError> {
        if let Some(d) = self.directions.get(&id) {
            return Ok(*d);
        }
        let entity = self.graph.require(id)?;
        if entity.type_name != "DIRECTION" {
            return Err(StepError::type_mismatch("DIRECTION", &entity.type_name));
        }
        let coords = entity.real_list(1)?;
        if coords.len() < 3 {
            return Err(StepError::parser(Some(id), "DIRECTION needs 3 components"));
        }
        let v = Vec3::new(coords[0], coords[1], coords[2]);
        if v.norm() < 1e-15 {
            return Err(StepError::InvalidGeometry(format!(
                "zero-length direction #{id}"
            )));
        }
        let d = self.frame.apply_dir(&Dir3::new_normalize(v));
        self.directions.insert(id, d);
        Ok(d)
    }

    fn vector(&mut self, id: u64) -> Result<Vec3, StepError> {
        let entity = self.graph.require(id)?;
        if entity.type_name != "VECTOR" {
            return Err(StepError::type_mismatch("VECTOR", &entity.type_name));
        }
        let dir = self.direction(entity.entity_ref(1)?)?;
        let magnitude = entity.real(2)? * self.scale;
        Ok(magnitude * dir.as_ref())
    }

    fn placement(&mut self, id: u64) -> Result<Placement, StepError> {
        let entity = self.graph.require(id)?;
        match entity.type_name.as_str() {
            "AXIS2_PLACEMENT_3D" => {
                let location = self.point(entity.entity_ref(1)?)?;
                let axis = if entity.is_null(2) {
                    None
                } else {
                    Some(self.direction(entity.entity_ref(2)?)?)
                };
                let ref_direction = if entity.is_null(3) {
                    None
                } else {
                    Some(self.direction(entity.entity_ref(3)?)?)
                };
                Ok(Placement {
                    location,
                    axis,
                    ref_direction,
                })
            }
            "AXIS1_PLACEMENT" => {
                let location = self.point(entity.entity_ref(1)?)?;
                let axis = if entity.is_null(2) {
                    None
                } else {
                    Some(self.direction(entity.entity_ref(2)?)?)
                };
                Ok(Placement {
                    location,
                    axis,
                    ref_direction: None,
                })
            }
            other => Err(StepError::type_mismatch("AXIS2_PLACEMENT_3D", other)),
        }
    }

    // =========================================================================
    // Curves
    // =========================================================================

    /// Realize a standalone curve entity, cycle-defended.
    fn curve(&mut self, id: u64) -> Result<NurbsCurve, StepError> {
        if let Some(c) = self.curves.get(&id) {
            return Ok(c.clone());
        }
        if !self.in_progress.insert(id) {
            self.warnings
                .push(format!("cyclic curve reference at #{id}, using placeholder"));
            return Ok(placeholder_curve());
        }
        let result = self.curve_uncached(id);
        self.in_progress.remove(&id);
        let c = result?;
        self.curves.insert(id, c.clone());
        Ok(c)
    }

    fn curve_uncached(&mut self, id: u64) -> Result<NurbsCurve, StepError> {
        let entity = self.graph.require(id)?.clone();
        match entity.type_name.as_str() {
            "LINE" => {
                let origin = self.point(entity.entity_ref(1)?)?;
                let dir = self.vector(entity.entity_ref(2)?)?;
                Ok(NurbsCurve::line_segment(origin, origin + dir))
            }
            "CIRCLE" => {
                let placement = self.placement(entity.entity_ref(1)?)?;
                let radius = entity.real(2)? * self.scale;
                Ok(NurbsCurve::full_circle(
                    placement.location,
                    placement.z_axis(),
                    radius,
                ))
            }
            "TRIMMED_CURVE" => {
                // Basis curve with the trim approximated by its own range
                let basis = entity.entity_ref(1)?;
                self.warnings.push(format!(
                    "TRIMMED_CURVE #{id}: using basis curve parameter range"
                ));
                self.curve(basis)
            }
            "COMPOSITE_CURVE" => self.composite_curve(&entity),
            "B_SPLINE_CURVE_WITH_KNOTS" | "COMPLEX" => self.bspline_curve(&entity),
            other => Err(StepError::UnsupportedEntity(other.to_string())),
        }
    }

    fn composite_curve(&mut self, entity: &RawEntity) -> Result<NurbsCurve, StepError> {
        let segment_ids = entity.entity_ref_list(1)?;
        let mut parts = Vec::new();
        for seg_id in segment_ids {
            let seg = self.graph.require(seg_id)?.clone();
            // COMPOSITE_CURVE_SEGMENT(transition, same_sense, parent_curve)
            let (curve_id, same_sense) = if seg.type_name == "COMPOSITE_CURVE_SEGMENT" {
                (seg.entity_ref(2)?, seg.enumeration(1).map(|e| e == "T").unwrap_or(true))
            } else {
                (seg_id, true)
            };
            match self.curve(curve_id) {
                Ok(mut c) => {
                    if !same_sense {
                        c.control_points.reverse();
                        if let Some(w) = &mut c.weights {
                            w.reverse();
                        }
                    }
                    parts.push(c);
                }
                Err(e) => {
                    self.warnings
                        .push(format!("composite segment #{curve_id}: {e}"));
                }
            }
        }
        NurbsCurve::concatenate(&parts).ok_or_else(|| {
            StepError::InvalidGeometry(format!("empty composite curve #{}", entity.id))
        })
    }

    /// B-spline curve, simple or complex (rational weights part).
    fn bspline_curve(&mut self, entity: &RawEntity) -> Result<NurbsCurve, StepError> {
        let (degree, cp_refs, mults, knot_values, weights) = if entity.type_name
            == "B_SPLINE_CURVE_WITH_KNOTS"
        {
            // (name, degree, control_points, form, closed, self_intersect,
            //  multiplicities, knots, knot_spec)
            (
                entity.integer(1)? as usize,
                entity.entity_ref_list(2)?,
                integer_list(entity, 6)?,
                entity.real_list(7)?,
                None,
            )
        } else {
            let bsc = entity
                .complex_part("B_SPLINE_CURVE")
                .ok_or_else(|| StepError::UnsupportedEntity(format!("complex record #{}", entity.id)))?;
            let degree = bsc
                .first()
                .and_then(|v| v.as_integer())
                .ok_or_else(|| StepError::parser(Some(entity.id), "missing curve degree"))?
                as usize;
            let cp_refs: Vec<u64> = bsc
                .get(1)
                .and_then(|v| v.as_list())
                .map(|l| l.iter().filter_map(|v| v.as_entity_ref()).collect())
                .unwrap_or_default();
            let with_knots = entity
                .complex_part("B_SPLINE_CURVE_WITH_KNOTS")
                .ok_or_else(|| StepError::UnsupportedEntity(format!("complex record #{}", entity.id)))?;
            let mults: Vec<usize> = with_knots
                .first()
                .and_then(|v| v.as_list())
                .map(|l| l.iter().filter_map(|v| v.as_integer()).map(|n| n.max(0) as usize).collect())
                .unwrap_or_default();
            let knot_values: Vec<f64> = with_knots
                .get(1)
                .and_then(|v| v.as_list())
                .map(|l| l.iter().filter_map(|v| v.as_real()).collect())
                .unwrap_or_default();
            let weights = entity.complex_part("RATIONAL_B_SPLINE_CURVE").map(|part| {
                part.first()
                    .and_then(|v| v.as_list())
                    .map(|l| l.iter().filter_map(|v| v.as_real()).collect::<Vec<f64>>())
                    .unwrap_or_default()
            });
            (degree, cp_refs, mults, knot_values, weights)
        };

        let mut control_points = Vec::with_capacity(cp_refs.len());
        for cp_id in cp_refs {
            control_points.push(self.point(cp_id)?);
        }

        let knots = expand_knots(&knot_values, &mults);
        if !validate_knots(&knots, control_points.len(), degree) {
            return Err(StepError::InvalidGeometry(format!(
                "curve #{}: knot count {} does not match {} control points of degree {}",
                entity.id,
                knots.len(),
                control_points.len(),
                degree
            )));
        }
        let weights = match weights {
            Some(w) if w.len() == control_points.len() => Some(w),
            Some(_) => {
                self.warnings.push(format!(
                    "curve #{}: weight count mismatch, treating as non-rational",
                    entity.id
                ));
                None
            }
            None => None,
        };
        Ok(NurbsCurve::new(degree, control_points, weights, knots))
    }

    // =========================================================================
    // Surfaces
    // =========================================================================

    fn surface(&mut self, id: u64) -> Result<NurbsSurface, StepError> {
        if let Some(s) = self.surfaces.get(&id) {
            return Ok(s.clone());
        }
        if !self.in_progress.insert(id) {
            self.warnings
                .push(format!("cyclic surface reference at #{id}, using placeholder"));
            return Ok(placeholder_surface());
        }
        let result = self.surface_uncached(id);
        self.in_progress.remove(&id);
        let s = result?;
        self.surfaces.insert(id, s.clone());
        Ok(s)
    }

    fn surface_uncached(&mut self, id: u64) -> Result<NurbsSurface, StepError> {
        let entity = self.graph.require(id)?.clone();
        let extent = NurbsSurface::ANALYTIC_EXTENT;
        match entity.type_name.as_str() {
            "PLANE" => {
                let placement = self.placement(entity.entity_ref(1)?)?;
                Ok(NurbsSurface::plane_patch(
                    placement.location,
                    placement.z_axis(),
                    Some(placement.x_axis()),
                    extent,
                ))
            }
            "CYLINDRICAL_SURFACE" => {
                let placement = self.placement(entity.entity_ref(1)?)?;
                let radius = entity.real(2)? * self.scale;
                Ok(NurbsSurface::cylinder_patch(
                    placement.location,
                    placement.z_axis(),
                    Some(placement.x_axis()),
                    radius,
                    extent,
                ))
            }
            "SPHERICAL_SURFACE" => {
                let placement = self.placement(entity.entity_ref(1)?)?;
                let radius = entity.real(2)? * self.scale;
                let center = placement.location;
                let z = placement.z_axis();
                let x = placement.x_axis();
                // Meridian from south to north pole, revolved about z.
                let generator = NurbsCurve::circular_arc(
                    center,
                    center - radius * z.as_ref(),
                    center + radius * z.as_ref(),
                    Dir3::new_normalize(z.as_ref().cross(x.as_ref())),
                );
                Ok(NurbsSurface::revolve(&generator, center, z, 2.0 * PI))
            }
            "CONICAL_SURFACE" => {
                let placement = self.placement(entity.entity_ref(1)?)?;
                let radius = entity.real(2)? * self.scale;
                let semi_angle = entity.real(3)?;
                let center = placement.location;
                let z = placement.z_axis();
                let x = placement.x_axis();
                // Slanted ruling line, revolved about z; the line is
                // clipped at the apex so the sheet never crosses the axis.
                let tan = semi_angle.tan();
                let mut h0 = -extent;
                let mut r0 = radius - extent * tan;
                if tan.abs() > 1e-12 && r0 < 0.0 {
                    h0 = -radius / tan;
                    r0 = 0.0;
                }
                let r1 = radius + extent * tan;
                let generator = NurbsCurve::line_segment(
                    center + r0 * x.as_ref() + h0 * z.as_ref(),
                    center + r1 * x.as_ref() + extent * z.as_ref(),
                );
                Ok(NurbsSurface::revolve(&generator, center, z, 2.0 * PI))
            }
            "TOROIDAL_SURFACE" => {
                let placement = self.placement(entity.entity_ref(1)?)?;
                let major = entity.real(2)? * self.scale;
                let minor = entity.real(3)? * self.scale;
                let center = placement.location;
                let z = placement.z_axis();
                let x = placement.x_axis();
                let tube_center = center + major * x.as_ref();
                let generator = NurbsCurve::full_circle(
                    tube_center,
                    Dir3::new_normalize(z.as_ref().cross(x.as_ref())),
                    minor,
                );
                Ok(NurbsSurface::revolve(&generator, center, z, 2.0 * PI))
            }
            "SURFACE_OF_REVOLUTION" => {
                let generator = self.curve(entity.entity_ref(1)?)?;
                let axis = self.placement(entity.entity_ref(2)?)?;
                Ok(NurbsSurface::revolve(
                    &generator,
                    axis.location,
                    axis.z_axis(),
                    2.0 * PI,
                ))
            }
            "SURFACE_OF_LINEAR_EXTRUSION" => {
                let generator = self.curve(entity.entity_ref(1)?)?;
                let direction = self.vector(entity.entity_ref(2)?)?;
                Ok(NurbsSurface::extrude(&generator, direction))
            }
            "B_SPLINE_SURFACE_WITH_KNOTS" | "COMPLEX" | "BOUNDED_SURFACE" | "B_SPLINE_SURFACE" => {
                self.bspline_surface(&entity)
            }
            other => Err(StepError::UnsupportedEntity(other.to_string())),
        }
    }

    /// B-spline surface, simple or complex (rational weight grid part).
    fn bspline_surface(&mut self, entity: &RawEntity) -> Result<NurbsSurface, StepError> {
        let (degree_u, degree_v, cp_grid, u_mults, v_mults, u_values, v_values, weights) =
            if entity.type_name == "B_SPLINE_SURFACE_WITH_KNOTS" {
                // (name, u_degree, v_degree, control_points, form, u_closed,
                //  v_closed, self_intersect, u_mults, v_mults, u_knots,
                //  v_knots, knot_spec)
                (
                    entity.integer(1)? as usize,
                    entity.integer(2)? as usize,
                    entity.list(3)?.to_vec(),
                    integer_list(entity, 8)?,
                    integer_list(entity, 9)?,
                    entity.real_list(10)?,
                    entity.real_list(11)?,
                    None,
                )
            } else {
                let bss = entity.complex_part("B_SPLINE_SURFACE").ok_or_else(|| {
                    StepError::UnsupportedEntity(format!("complex record #{}", entity.id))
                })?;
                let degree_u = bss
                    .first()
                    .and_then(|v| v.as_integer())
                    .ok_or_else(|| StepError::parser(Some(entity.id), "missing u degree"))?
                    as usize;
                let degree_v = bss
                    .get(1)
                    .and_then(|v| v.as_integer())
                    .ok_or_else(|| StepError::parser(Some(entity.id), "missing v degree"))?
                    as usize;
                let cp_grid = bss
                    .get(2)
                    .and_then(|v| v.as_list())
                    .ok_or_else(|| StepError::parser(Some(entity.id), "missing control net"))?
                    .to_vec();
                let with_knots = entity
                    .complex_part("B_SPLINE_SURFACE_WITH_KNOTS")
                    .ok_or_else(|| {
                        StepError::UnsupportedEntity(format!("complex record #{}", entity.id))
                    })?;
                let as_usize_list = |v: Option<&StepValue>| -> Vec<usize> {
                    v.and_then(|v| v.as_list())
                        .map(|l| {
                            l.iter()
                                .filter_map(|v| v.as_integer())
                                .map(|n| n.max(0) as usize)
                                .collect()
                        })
                        .unwrap_or_default()
                };
                let as_real_list = |v: Option<&StepValue>| -> Vec<f64> {
                    v.and_then(|v| v.as_list())
                        .map(|l| l.iter().filter_map(|v| v.as_real()).collect())
                        .unwrap_or_default()
                };
                let u_mults = as_usize_list(with_knots.first());
                let v_mults = as_usize_list(with_knots.get(1));
                let u_values = as_real_list(with_knots.get(2));
                let v_values = as_real_list(with_knots.get(3));
                let weights = entity.complex_part("RATIONAL_B_SPLINE_SURFACE").map(|part| {
                    part.first()
                        .and_then(|v| v.as_list())
                        .map(|rows| {
                            rows.iter()
                                .map(|row| {
                                    row.as_list()
                                        .map(|l| l.iter().filter_map(|v| v.as_real()).collect())
                                        .unwrap_or_default()
                                })
                                .collect::<Vec<Vec<f64>>>()
                        })
                        .unwrap_or_default()
                });
                (
                    degree_u, degree_v, cp_grid, u_mults, v_mults, u_values, v_values, weights,
                )
            };

        let mut grid = Vec::with_capacity(cp_grid.len());
        for row in &cp_grid {
            let refs = row
                .as_list()
                .ok_or_else(|| StepError::parser(Some(entity.id), "control net row is not a list"))?;
            let mut points = Vec::with_capacity(refs.len());
            for r in refs {
                let pid = r.as_entity_ref().ok_or_else(|| {
                    StepError::parser(Some(entity.id), "control net entry is not a reference")
                })?;
                points.push(self.point(pid)?);
            }
            grid.push(points);
        }

        let nu = grid.len();
        let nv = grid.first().map(|r| r.len()).unwrap_or(0);
        if nu == 0 || nv == 0 || grid.iter().any(|r| r.len() != nv) {
            return Err(StepError::InvalidGeometry(format!(
                "surface #{}: ragged or empty control net",
                entity.id
            )));
        }

        let knots_u = expand_knots(&u_values, &u_mults);
        let knots_v = expand_knots(&v_values, &v_mults);
        if !validate_knots(&knots_u, nu, degree_u) || !validate_knots(&knots_v, nv, degree_v) {
            return Err(StepError::InvalidGeometry(format!(
                "surface #{}: knot counts u={}/{} v={}/{}",
                entity.id,
                knots_u.len(),
                nu + degree_u + 1,
                knots_v.len(),
                nv + degree_v + 1
            )));
        }

        let weights = match weights {
            Some(w) if w.len() == nu && w.iter().all(|row| row.len() == nv) => Some(w),
            Some(_) => {
                self.warnings.push(format!(
                    "surface #{}: weight grid mismatch, treating as non-rational",
                    entity.id
                ));
                None
            }
            None => None,
        };

        Ok(NurbsSurface::new(
            degree_u, degree_v, grid, weights, knots_u, knots_v,
        ))
    }

    // =========================================================================
    // Topology
    // =========================================================================

    fn read_model(
        &mut self,
        cancel: &CancelToken,
        progress: &mut ProgressReporter,
    ) -> Result<Model, StepError> {
        if self.import_colors {
            self.collect_styles();
        }

        let mut model = Model::new(self.model_name());

        let solids: Vec<RawEntity> = self
            .graph
            .of_type("MANIFOLD_SOLID_BREP")
            .cloned()
            .collect();
        let shell_models: Vec<RawEntity> = self
            .graph
            .of_type("SHELL_BASED_SURFACE_MODEL")
            .cloned()
            .collect();
        let total = (solids.len() + shell_models.len()).max(1) as f32;
        let mut done = 0usize;

        for solid in &solids {
            if cancel.is_cancelled() {
                return Err(StepError::Cancelled);
            }
            match self.read_solid(solid) {
                Ok(body) => model.bodies.push(body),
                Err(e) => self.warnings.push(format!("solid #{}: {e}", solid.id)),
            }
            done += 1;
            progress.report(40.0 + 60.0 * done as f32 / total);
        }

        for shell_model in &shell_models {
            if cancel.is_cancelled() {
                return Err(StepError::Cancelled);
            }
            match self.read_shell_model(shell_model) {
                Ok(body) => model.bodies.push(body),
                Err(e) => self
                    .warnings
                    .push(format!("shell model #{}: {e}", shell_model.id)),
            }
            done += 1;
            progress.report(40.0 + 60.0 * done as f32 / total);
        }

        // Standalone faces with no owning shell become one open body.
        if model.bodies.is_empty() {
            let face_ids: Vec<u64> = self.graph.of_type("ADVANCED_FACE").map(|e| e.id).collect();
            if !face_ids.is_empty() {
                let mut body = Body::new("Surfaces");
                for fid in face_ids {
                    if cancel.is_cancelled() {
                        return Err(StepError::Cancelled);
                    }
                    match self.read_face(fid) {
                        Ok(face) => body.faces.push(face),
                        Err(e) => self.warnings.push(format!("face #{fid}: {e}")),
                    }
                }
                if !body.faces.is_empty() {
                    model.bodies.push(body);
                }
            }
        }

        if model.bodies.is_empty() {
            self.warnings.push("no bodies found in file".to_string());
        }

        Ok(model)
    }

    fn model_name(&self) -> String {
        self.graph
            .header
            .iter()
            .find(|e| e.type_name == "FILE_NAME")
            .and_then(|e| e.args.first())
            .and_then(|v| v.as_string())
            .unwrap_or("")
            .to_string()
    }

    fn read_solid(&mut self, solid: &RawEntity) -> Result<Body, StepError> {
        let name = solid.string(0).unwrap_or("").to_string();
        let shell_id = solid.entity_ref(1)?;
        let mut body = self.read_shell(shell_id, if name.is_empty() { "Solid" } else { &name })?;
        body.is_solid = true;
        if let Some(color) = self.body_color(solid.id, shell_id) {
            body.color = color;
        }
        Ok(body)
    }

    fn read_shell_model(&mut self, shell_model: &RawEntity) -> Result<Body, StepError> {
        let name = shell_model.string(0).unwrap_or("").to_string();
        let shell_ids = shell_model.entity_ref_list(1)?;
        let mut body = Body::new(if name.is_empty() { "Shell" } else { &name });
        for shell_id in shell_ids {
            let shell = self.read_shell(shell_id, "")?;
            body.faces.extend(shell.faces);
        }
        body.is_solid = false;
        if let Some(color) = self.body_color(shell_model.id, shell_model.id) {
            body.color = color;
        }
        Ok(body)
    }

    fn read_shell(&mut self, shell_id: u64, name: &str) -> Result<Body, StepError> {
        let shell = self.graph.require(shell_id)?.clone();
        match shell.type_name.as_str() {
            "CLOSED_SHELL" | "OPEN_SHELL" => {}
            other => return Err(StepError::type_mismatch("CLOSED_SHELL", other)),
        }
        let mut body = Body::new(name);
        body.is_solid = shell.type_name == "CLOSED_SHELL";
        for face_id in shell.entity_ref_list(1)? {
            match self.read_face(face_id) {
                Ok(face) => body.faces.push(face),
                Err(e) => self.warnings.push(format!("face #{face_id}: {e}")),
            }
        }
        Ok(body)
    }

    fn read_face(&mut self, face_id: u64) -> Result<Face, StepError> {
        let entity = self.graph.require(face_id)?.clone();
        if entity.type_name != "ADVANCED_FACE" {
            return Err(StepError::type_mismatch("ADVANCED_FACE", &entity.type_name));
        }
        let bound_ids = entity.entity_ref_list(1)?;
        let surface_id = entity.entity_ref(2)?;
        let same_sense = entity.enumeration(3)? == "T";

        let surface = match self.surface(surface_id) {
            Ok(s) => s,
            Err(e) => {
                self.warnings
                    .push(format!("surface #{surface_id}: {e}, using placeholder"));
                placeholder_surface()
            }
        };

        let mut bounds: Vec<(bool, Loop)> = Vec::new();
        for bound_id in bound_ids {
            let bound = self.graph.require(bound_id)?.clone();
            let is_outer = bound.type_name == "FACE_OUTER_BOUND";
            if !is_outer && bound.type_name != "FACE_BOUND" {
                self.warnings.push(format!(
                    "face #{face_id}: unexpected bound type {}",
                    bound.type_name
                ));
                continue;
            }
            let loop_id = bound.entity_ref(1)?;
            let ring = self.read_loop(loop_id)?;
            if !ring.is_closed(&self.tolerance) {
                self.warnings.push(format!(
                    "loop #{loop_id}: edges do not chain within tolerance (gap {:.3e})",
                    ring.max_gap()
                ));
            }
            bounds.push((is_outer, ring));
        }

        // The FACE_OUTER_BOUND wins; with none marked, the first bound does.
        let outer_idx = bounds.iter().position(|(o, _)| *o).unwrap_or(0);
        let mut outer = Loop::default();
        let mut inner = Vec::new();
        for (i, (_, ring)) in bounds.into_iter().enumerate() {
            if i == outer_idx {
                outer = ring;
            } else {
                inner.push(ring);
            }
        }

        let mut face = Face {
            outer,
            inner,
            surface,
            same_sense,
            color: Color::default(),
        };
        if let Some(color) = self.colors.get(&face_id) {
            face.color = *color;
        }
        Ok(face)
    }

    fn read_loop(&mut self, loop_id: u64) -> Result<Loop, StepError> {
        let entity = self.graph.require(loop_id)?.clone();
        if entity.type_name != "EDGE_LOOP" {
            return Err(StepError::type_mismatch("EDGE_LOOP", &entity.type_name));
        }
        let mut edges = Vec::new();
        for oe_id in entity.entity_ref_list(1)? {
            match self.read_oriented_edge(oe_id) {
                Ok(edge) => edges.push(edge),
                Err(e) => self.warnings.push(format!("edge #{oe_id}: {e}")),
            }
        }
        Ok(Loop::new(edges))
    }

    fn read_oriented_edge(&mut self, oe_id: u64) -> Result<Edge, StepError> {
        let oe = self.graph.require(oe_id)?.clone();
        if oe.type_name != "ORIENTED_EDGE" {
            return Err(StepError::type_mismatch("ORIENTED_EDGE", &oe.type_name));
        }
        // (name, *, *, edge_element, orientation)
        let edge_id = oe.entity_ref(3)?;
        let orientation = oe.enumeration(4)? == "T";

        let ec = self.graph.require(edge_id)?.clone();
        if ec.type_name != "EDGE_CURVE" {
            return Err(StepError::type_mismatch("EDGE_CURVE", &ec.type_name));
        }
        let start = self.vertex_point(ec.entity_ref(1)?)?;
        let end = self.vertex_point(ec.entity_ref(2)?)?;
        let curve_id = ec.entity_ref(3)?;
        let same_sense = ec.enumeration(4)? == "T";

        let (start, end) = if same_sense { (start, end) } else { (end, start) };
        let curve = self.edge_geometry(curve_id, start, end);

        Ok(Edge {
            start,
            end,
            curve,
            forward: orientation,
        })
    }

    /// Curve geometry for an edge, trimmed between the vertex points.
    fn edge_geometry(&mut self, curve_id: u64, start: Point3, end: Point3) -> Option<NurbsCurve> {
        let Some(raw) = self.graph.get(curve_id) else {
            self.warnings
                .push(format!("missing curve #{curve_id}, using straight edge"));
            return Some(NurbsCurve::line_segment(start, end));
        };
        let type_name = raw.type_name.clone();
        match type_name.as_str() {
            "LINE" => Some(NurbsCurve::line_segment(start, end)),
            "CIRCLE" => {
                let entity = self.graph.get(curve_id)?.clone();
                let placement_id = entity.entity_ref(1).ok()?;
                let placement = match self.placement(placement_id) {
                    Ok(p) => p,
                    Err(e) => {
                        self.warnings.push(format!("circle #{curve_id}: {e}"));
                        return Some(NurbsCurve::line_segment(start, end));
                    }
                };
                let radius = entity.real(2).unwrap_or(0.0) * self.scale;
                if (start - end).norm() < self.tolerance.linear {
                    Some(NurbsCurve::full_circle(
                        placement.location,
                        placement.z_axis(),
                        radius,
                    ))
                } else {
                    Some(NurbsCurve::circular_arc(
                        placement.location,
                        start,
                        end,
                        placement.z_axis(),
                    ))
                }
            }
            _ => match self.curve(curve_id) {
                Ok(c) => Some(c),
                Err(e) => {
                    self.warnings
                        .push(format!("curve #{curve_id}: {e}, using straight edge"));
                    Some(NurbsCurve::line_segment(start, end))
                }
            },
        }
    }

    fn vertex_point(&mut self, id: u64) -> Result<Point3, StepError> {
        let entity = self.graph.require(id)?;
        if entity.type_name != "VERTEX_POINT" {
            return Err(StepError::type_mismatch("VERTEX_POINT", &entity.type_name));
        }
        let point_id = entity.entity_ref(1)?;
        self.point(point_id)
    }

    // =========================================================================
    // Presentation
    // =========================================================================

    /// Map STYLED_ITEM targets to their transitively referenced COLOUR_RGB.
    fn collect_styles(&mut self) {
        let styled: Vec<RawEntity> = self.graph.of_type("STYLED_ITEM").cloned().collect();
        for item in styled {
            // (name, styles, item)
            let Ok(target) = item.entity_ref(2) else {
                continue;
            };
            if let Some(color) = self.find_colour(&item, 0) {
                self.colors.insert(target, color);
            }
        }
    }

    /// Depth-first search through references for a COLOUR_RGB record.
    fn find_colour(&self, entity: &RawEntity, depth: usize) -> Option<Color> {
        if depth > 8 {
            return None;
        }
        if entity.type_name == "COLOUR_RGB" {
            // (name, r, g, b) in [0, 1]
            let r = entity.args.get(1).and_then(|v| v.as_real())?;
            let g = entity.args.get(2).and_then(|v| v.as_real())?;
            let b = entity.args.get(3).and_then(|v| v.as_real())?;
            return Some(Color::new(r, g, b));
        }
        for id in collect_refs(&entity.args) {
            if let Some(next) = self.graph.get(id) {
                if let Some(c) = self.find_colour(next, depth + 1) {
                    return Some(c);
                }
            }
        }
        None
    }

    fn body_color(&self, body_id: u64, shell_id: u64) -> Option<Color> {
        self.colors
            .get(&body_id)
            .or_else(|| self.colors.get(&shell_id))
            .copied()
    }
}

fn collect_refs(values: &[StepValue]) -> Vec<u64> {
    let mut out = Vec::new();
    for v in values {
        match v {
            StepValue::EntityRef(id) => out.push(*id),
            StepValue::List(inner) => out.extend(collect_refs(inner)),
            StepValue::Typed { args, .. } => out.extend(collect_refs(args)),
            _ => {}
        }
    }
    out
}

/// Default curve returned when realization fails recoverably.
fn placeholder_curve() -> NurbsCurve {
    NurbsCurve::line_segment(Point3::origin(), Point3::new(1.0, 0.0, 0.0))
}

/// Default surface returned when realization fails recoverably.
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

    fn import(data: &str) -> StepImport {
        read_step_from_buffer(
            data.as_bytes(),
            &StepReadOptions::default(),
            &CancelToken::new(),
            &mut ProgressReporter::default(),
        )
        .unwrap()
    }

    const BOX_STEP: &str = r#"ISO-10303-21;
HEADER;
FILE_DESCRIPTION((''), '2;1');
FILE_NAME('box.step', '2024-01-01', (''), (''), '', '', '');
FILE_SCHEMA(('AUTOMOTIVE_DESIGN'));
ENDSEC;
DATA;
#1 = CARTESIAN_POINT('', (0.0, 0.0, 0.0));
#2 = CARTESIAN_POINT('', (10.0, 0.0, 0.0));
#3 = CARTESIAN_POINT('', (10.0, 10.0, 0.0));
#4 = CARTESIAN_POINT('', (0.0, 10.0, 0.0));
#11 = VERTEX_POINT('', #1);
#12 = VERTEX_POINT('', #2);
#13 = VERTEX_POINT('', #3);
#14 = VERTEX_POINT('', #4);
#20 = DIRECTION('', (0.0, 0.0, 1.0));
#21 = DIRECTION('', (1.0, 0.0, 0.0));
#30 = AXIS2_PLACEMENT_3D('', #1, #20, #21);
#40 = PLANE('', #30);
#50 = DIRECTION('', (1.0, 0.0, 0.0));
#51 = DIRECTION('', (0.0, 1.0, 0.0));
#60 = VECTOR('', #50, 10.0);
#61 = VECTOR('', #51, 10.0);
#70 = LINE('', #1, #60);
#71 = LINE('', #2, #61);
#72 = LINE('', #4, #60);
#73 = LINE('', #1, #61);
#100 = EDGE_CURVE('', #11, #12, #70, .T.);
#101 = EDGE_CURVE('', #12, #13, #71, .T.);
#102 = EDGE_CURVE('', #14, #13, #72, .T.);
#103 = EDGE_CURVE('', #11, #14, #73, .T.);
#120 = ORIENTED_EDGE('', *, *, #100, .T.);
#121 = ORIENTED_EDGE('', *, *, #101, .T.);
#122 = ORIENTED_EDGE('', *, *, #102, .F.);
#123 = ORIENTED_EDGE('', *, *, #103, .F.);
#150 = EDGE_LOOP('', (#120, #121, #122, #123));
#160 = FACE_OUTER_BOUND('', #150, .T.);
#170 = ADVANCED_FACE('', (#160), #40, .T.);
#180 = CLOSED_SHELL('', (#170));
#190 = MANIFOLD_SOLID_BREP('Slab', #180);
ENDSEC;
END-ISO-10303-21;
"#;

    #[test]
    fn test_read_single_face_solid() {
        let import = import(BOX_STEP);
        assert_eq!(import.model.bodies.len(), 1);
        let body = &import.model.bodies[0];
        assert_eq!(body.name, "Slab");
        assert!(body.is_solid);
        assert_eq!(body.faces.len(), 1);
        let face = &body.faces[0];
        assert!(face.same_sense);
        assert_eq!(face.outer.edges.len(), 4);
        assert!(face.outer.is_closed(&Tolerance::DEFAULT));
        assert!(face.inner.is_empty());
        assert!(import.warnings.is_empty(), "{:?}", import.warnings);
    }

    #[test]
    fn test_reversed_oriented_edge_swaps_traversal() {
        let import = import(BOX_STEP);
        let face = &import.model.bodies[0].faces[0];
        let e = &face.outer.edges[2];
        assert!(!e.forward);
        // Reversed edge: traversal starts from the edge's stored end.
        assert_relative_eq!(e.first_point().x, 10.0, epsilon = 1e-9);
        assert_relative_eq!(e.first_point().y, 10.0, epsilon = 1e-9);
    }

    #[test]
    fn test_millimetre_unit_context_is_identity() {
        let with_units = BOX_STEP.replace(
            "#190 = MANIFOLD_SOLID_BREP('Slab', #180);",
            "#190 = MANIFOLD_SOLID_BREP('Slab', #180);\n#200 = ( GEOMETRIC_REPRESENTATION_CONTEXT(3) GLOBAL_UNIT_ASSIGNED_CONTEXT((#201)) REPRESENTATION_CONTEXT('','') );\n#201 = ( LENGTH_UNIT() NAMED_UNIT(*) SI_UNIT(.MILLI.,.METRE.) );",
        );
        let a = import(BOX_STEP);
        let b = import(&with_units);
        assert_eq!(b.scale, 1.0);
        let pa = a.model.bodies[0].faces[0].outer.edges[0].start;
        let pb = b.model.bodies[0].faces[0].outer.edges[0].start;
        assert_eq!(pa, pb);
    }

    #[test]
    fn test_metre_unit_context_scales() {
        let with_units = BOX_STEP.replace(
            "#190 = MANIFOLD_SOLID_BREP('Slab', #180);",
            "#190 = MANIFOLD_SOLID_BREP('Slab', #180);\n#200 = ( GEOMETRIC_REPRESENTATION_CONTEXT(3) GLOBAL_UNIT_ASSIGNED_CONTEXT((#201)) REPRESENTATION_CONTEXT('','') );\n#201 = ( LENGTH_UNIT() NAMED_UNIT(*) SI_UNIT($,.METRE.) );",
        );
        let b = import(&with_units);
        assert_eq!(b.scale, 1000.0);
        let p = b.model.bodies[0].faces[0].outer.edges[0].end;
        assert_relative_eq!(p.x, 10000.0, epsilon = 1e-6);
    }

    #[test]
    fn test_unknown_reference_degrades_with_warning() {
        let broken = BOX_STEP.replace("#40 = PLANE('', #30);", "#40 = PLANE('', #999);");
        let import = read_step_from_buffer(
            broken.as_bytes(),
            &StepReadOptions::default(),
            &CancelToken::new(),
            &mut ProgressReporter::default(),
        )
        .unwrap();
        assert!(!import.warnings.is_empty());
        // The face still exists, on a placeholder surface.
        assert_eq!(import.model.bodies[0].faces.len(), 1);
    }

    #[test]
    fn test_cancel_returns_cancelled() {
        let cancel = CancelToken::new();
        cancel.cancel();
        let r = read_step_from_buffer(
            BOX_STEP.as_bytes(),
            &StepReadOptions::default(),
            &cancel,
            &mut ProgressReporter::default(),
        );
        assert!(matches!(r, Err(StepError::Cancelled)));
    }

    #[test]
    fn test_styled_item_color_applied() {
        let styled = BOX_STEP.replace(
            "ENDSEC;\nEND-ISO-10303-21;",
            r#"#300 = COLOUR_RGB('', 1.0, 0.0, 0.0);
#301 = FILL_AREA_STYLE_COLOUR('', #300);
#302 = FILL_AREA_STYLE('', (#301));
#303 = SURFACE_STYLE_FILL_AREA(#302);
#304 = SURFACE_SIDE_STYLE('', (#303));
#305 = SURFACE_STYLE_USAGE(.BOTH., #304);
#306 = PRESENTATION_STYLE_ASSIGNMENT((#305));
#307 = STYLED_ITEM('', (#306), #190);
ENDSEC;
END-ISO-10303-21;"#,
        );
        let import = import(&styled);
        let body = &import.model.bodies[0];
        assert!(body.color.close_to(&Color::new(1.0, 0.0, 0.0), 1e-9));
    }

    #[test]
    fn test_bspline_curve_knot_invariant() {
        let data = r#"ISO-10303-21;
HEADER;
ENDSEC;
DATA;
#1 = CARTESIAN_POINT('', (0.0, 0.0, 0.0));
#2 = CARTESIAN_POINT('', (1.0, 1.0, 0.0));
#3 = CARTESIAN_POINT('', (2.0, -1.0, 0.0));
#4 = CARTESIAN_POINT('', (3.0, 0.0, 0.0));
#10 = VERTEX_POINT('', #1);
#11 = VERTEX_POINT('', #4);
#20 = B_SPLINE_CURVE_WITH_KNOTS('', 3, (#1, #2, #3, #4), .UNSPECIFIED., .F., .F., (4, 4), (0.0, 1.0), .UNSPECIFIED.);
#30 = EDGE_CURVE('', #10, #11, #20, .T.);
#31 = ORIENTED_EDGE('', *, *, #30, .T.);
#32 = EDGE_LOOP('', (#31));
#33 = FACE_OUTER_BOUND('', #32, .T.);
#40 = CARTESIAN_POINT('', (0.0, 0.0, 0.0));
#41 = DIRECTION('', (0.0, 0.0, 1.0));
#42 = AXIS2_PLACEMENT_3D('', #40, #41, $);
#43 = PLANE('', #42);
#44 = ADVANCED_FACE('', (#33), #43, .T.);
#45 = OPEN_SHELL('', (#44));
#46 = SHELL_BASED_SURFACE_MODEL('Patch', (#45));
ENDSEC;
END-ISO-10303-21;
"#;
        let import = import(data);
        let body = &import.model.bodies[0];
        assert!(!body.is_solid);
        let edge = &body.faces[0].outer.edges[0];
        let curve = edge.curve.as_ref().unwrap();
        assert_eq!(curve.degree, 3);
        assert_eq!(curve.knots.len(), curve.control_points.len() + curve.degree + 1);
        assert_relative_eq!(curve.start_point().x, 0.0, epsilon = 1e-9);
        assert_relative_eq!(curve.end_point().x, 3.0, epsilon = 1e-9);
    }

    #[test]
    fn test_arc_edge_realizes_rational_quadratic() {
        let data = r#"ISO-10303-21;
HEADER;
ENDSEC;
DATA;
#1 = CARTESIAN_POINT('', (0.0, 0.0, 0.0));
#2 = CARTESIAN_POINT('', (1.0, 0.0, 0.0));
#3 = CARTESIAN_POINT('', (0.0, 1.0, 0.0));
#4 = DIRECTION('', (0.0, 0.0, 1.0));
#5 = DIRECTION('', (1.0, 0.0, 0.0));
#6 = AXIS2_PLACEMENT_3D('', #1, #4, #5);
#7 = CIRCLE('', #6, 1.0);
#10 = VERTEX_POINT('', #2);
#11 = VERTEX_POINT('', #3);
#30 = EDGE_CURVE('', #10, #11, #7, .T.);
#31 = ORIENTED_EDGE('', *, *, #30, .T.);
#32 = EDGE_LOOP('', (#31));
#33 = FACE_OUTER_BOUND('', #32, .T.);
#43 = PLANE('', #6);
#44 = ADVANCED_FACE('', (#33), #43, .T.);
#45 = OPEN_SHELL('', (#44));
#46 = SHELL_BASED_SURFACE_MODEL('Arc', (#45));
ENDSEC;
END-ISO-10303-21;
"#;
        let import = import(data);
        let curve = import.model.bodies[0].faces[0].outer.edges[0]
            .curve
            .as_ref()
            .unwrap()
            .clone();
        assert_eq!(curve.degree, 2);
        assert_eq!(curve.control_points.len(), 3);
        let w = (std::f64::consts::PI / 4.0).cos();
        let weights = curve.weights.as_ref().unwrap();
        assert_relative_eq!(weights[1], w, epsilon = 1e-9);
        // Middle control point at the tangent intersection.
        assert_relative_eq!(curve.control_points[1].x, 1.0, epsilon = 1e-9);
        assert_relative_eq!(curve.control_points[1].y, 1.0, epsilon = 1e-9);
        // Samples stay on the circle.
        for i in 0..=10 {
            let p = curve.point_at(i as f64 / 10.0);
            assert_relative_eq!(p.coords.norm(), 1.0, epsilon = 1e-9);
        }
    }
}
