#![warn(missing_docs)]

//! Rational B-spline curves and surfaces for the dcad interchange codec.
//!
//! Every piece of curve and surface geometry the codec moves between STEP,
//! IGES, and the native container is carried in one of two types:
//!
//! - [`NurbsCurve`] — degree-n curve with optional weights (weights present
//!   marks the curve rational)
//! - [`NurbsSurface`] — tensor-product surface with an optional weight grid
//!
//! Evaluation uses De Boor's algorithm in homogeneous coordinates. The
//! module also synthesizes exact rational representations of the analytic
//! primitives the exchange formats describe symbolically: line segments,
//! circular arcs, planes, cylinders, surfaces of revolution, tabulated
//! cylinders, and ruled surfaces.

use dcad_math::{orthonormal_x_from_z, Dir3, Point3, Transform, Vec3};
use std::f64::consts::PI;

// =============================================================================
// Knot vector utilities
// =============================================================================

/// Validate a knot vector: non-decreasing, length = n_control_points + degree + 1.
///
/// Also rejects control nets too small for the degree (fewer than
/// degree + 1 points).
pub fn validate_knots(knots: &[f64], n_points: usize, degree: usize) -> bool {
    if n_points <= degree || knots.len() != n_points + degree + 1 {
        return false;
    }
    for i in 1..knots.len() {
        if knots[i] < knots[i - 1] {
            return false;
        }
    }
    true
}

/// Expand a `(value, multiplicity)` knot list into a flat knot vector.
///
/// Both STEP and IGES emit compressed knots; readers re-expand them here.
pub fn expand_knots(values: &[f64], multiplicities: &[usize]) -> Vec<f64> {
    let mut knots = Vec::with_capacity(values.len());
    for (&k, &m) in values.iter().zip(multiplicities.iter()) {
        for _ in 0..m {
            knots.push(k);
        }
    }
    knots
}

/// Compress a flat knot vector into `(value, multiplicity)` pairs.
///
/// Successive equal knots collapse; the inverse of [`expand_knots`].
pub fn compress_knots(knots: &[f64]) -> (Vec<f64>, Vec<usize>) {
    let mut values = Vec::new();
    let mut mults = Vec::new();
    for &k in knots {
        if values.last() == Some(&k) {
            *mults.last_mut().unwrap() += 1;
        } else {
            values.push(k);
            mults.push(1);
        }
    }
    (values, mults)
}

/// Build a clamped knot vector with uniform interior spacing on [0, 1].
pub fn clamped_uniform_knots(n_points: usize, degree: usize) -> Vec<f64> {
    let m = n_points + degree + 1;
    let mut knots = vec![0.0; m];
    let n_internal = m - 2 * (degree + 1);
    for i in 0..=degree {
        knots[i] = 0.0;
        knots[m - 1 - i] = 1.0;
    }
    for i in 1..=n_internal {
        knots[degree + i] = i as f64 / (n_internal + 1) as f64;
    }
    knots
}

/// Find the knot span index for parameter `t`.
///
/// Returns `i` such that `knots[i] <= t < knots[i+1]`, clamped to the valid
/// range; `t` at the end of the domain returns the last valid span.
fn find_span(knots: &[f64], n: usize, degree: usize, t: f64) -> usize {
    if t >= knots[n + 1] {
        return n;
    }
    if t <= knots[degree] {
        return degree;
    }
    let mut low = degree;
    let mut high = n + 1;
    let mut mid = (low + high) / 2;
    while t < knots[mid] || t >= knots[mid + 1] {
        if t < knots[mid] {
            high = mid;
        } else {
            low = mid;
        }
        mid = (low + high) / 2;
    }
    mid
}

/// Compute the `degree + 1` non-zero basis function values at `t`.
fn basis_functions(knots: &[f64], span: usize, degree: usize, t: f64) -> Vec<f64> {
    let mut n = vec![0.0; degree + 1];
    let mut left = vec![0.0; degree + 1];
    let mut right = vec![0.0; degree + 1];
    n[0] = 1.0;

    for j in 1..=degree {
        left[j] = t - knots[span + 1 - j];
        right[j] = knots[span + j] - t;
        let mut saved = 0.0;
        for r in 0..j {
            let denom = right[r + 1] + left[j - r];
            if denom.abs() < 1e-30 {
                // Zero-length knot interval
                n[j] = saved;
                continue;
            }
            let temp = n[r] / denom;
            n[r] = saved + right[r + 1] * temp;
            saved = left[j - r] * temp;
        }
        n[j] = saved;
    }

    n
}

// =============================================================================
// NURBS curve
// =============================================================================

/// A degree-n B-spline curve in 3D, rational when `weights` is present.
///
/// Invariants: `degree >= 1`, knots non-decreasing with
/// `knots.len() == control_points.len() + degree + 1`, weights (if any)
/// match the control point count, `t_min <= t_max`.
#[derive(Debug, Clone, PartialEq)]
pub struct NurbsCurve {
    /// Polynomial degree (order = degree + 1).
    pub degree: usize,
    /// Control points in 3D.
    pub control_points: Vec<Point3>,
    /// Weights; `Some` marks the curve rational.
    pub weights: Option<Vec<f64>>,
    /// Knot vector.
    pub knots: Vec<f64>,
    /// Lower parameter bound.
    pub t_min: f64,
    /// Upper parameter bound.
    pub t_max: f64,
    /// True when the curve lies in a single plane.
    pub is_planar: bool,
    /// True when start and end coincide.
    pub is_closed: bool,
}

impl NurbsCurve {
    /// Create a curve with the parameter range taken from the knot vector.
    ///
    /// # Panics
    /// Panics on an invalid knot vector or weight count; readers validate
    /// raw data with [`validate_knots`] before constructing.
    pub fn new(
        degree: usize,
        control_points: Vec<Point3>,
        weights: Option<Vec<f64>>,
        knots: Vec<f64>,
    ) -> Self {
        assert!(degree >= 1, "curve degree must be at least 1");
        assert!(
            validate_knots(&knots, control_points.len(), degree),
            "invalid knot vector: len={} but expected {} (n={}, p={})",
            knots.len(),
            control_points.len() + degree + 1,
            control_points.len(),
            degree
        );
        if let Some(w) = &weights {
            assert_eq!(w.len(), control_points.len(), "weight count mismatch");
        }
        let t_min = knots[degree];
        let t_max = knots[control_points.len()];
        let is_closed = (control_points[0] - control_points[control_points.len() - 1]).norm() < 1e-9;
        let is_planar = points_coplanar(&control_points);
        Self {
            degree,
            control_points,
            weights,
            knots,
            t_min,
            t_max,
            is_planar,
            is_closed,
        }
    }

    /// A straight segment as a degree-1 curve with knots {0, 0, 1, 1}.
    pub fn line_segment(start: Point3, end: Point3) -> Self {
        Self::new(1, vec![start, end], None, vec![0.0, 0.0, 1.0, 1.0])
    }

    /// A circular arc through `start` and `end` about `center`, counter-
    /// clockwise in the plane spanned by `normal`.
    ///
    /// Each segment of at most a quarter turn becomes one rational quadratic
    /// span: control points {start, center + r·(cos m, sin m)/w, end} in the
    /// arc plane with m the segment mid-angle and w = cos(half-angle),
    /// weights {1, w, 1}. Sweeps beyond pi/2 are split into equal segments
    /// with doubled interior knots; a full turn yields the canonical 9-point
    /// circle.
    pub fn circular_arc(center: Point3, start: Point3, end: Point3, normal: Dir3) -> Self {
        let radius = (start - center).norm();
        if radius < 1e-12 {
            return Self::line_segment(start, end);
        }
        let x_axis = Dir3::new_normalize(start - center);
        let y_axis = Dir3::new_normalize(normal.as_ref().cross(x_axis.as_ref()));

        let ev = end - center;
        let mut sweep = ev.dot(y_axis.as_ref()).atan2(ev.dot(x_axis.as_ref()));
        // Arcs wind counter-clockwise; a non-positive end angle wraps forward.
        if sweep <= 1e-12 {
            sweep += 2.0 * PI;
        }

        Self::arc_in_frame(center, x_axis, y_axis, radius, sweep)
    }

    /// A full circle of `radius` about `axis` through `center`.
    pub fn full_circle(center: Point3, axis: Dir3, radius: f64) -> Self {
        let x_axis = orthonormal_x_from_z(&axis);
        let y_axis = Dir3::new_normalize(axis.as_ref().cross(x_axis.as_ref()));
        Self::arc_in_frame(center, x_axis, y_axis, radius, 2.0 * PI)
    }

    fn arc_in_frame(center: Point3, x_axis: Dir3, y_axis: Dir3, radius: f64, sweep: f64) -> Self {
        let segments = ((sweep - 1e-9) / (PI / 2.0)).ceil().max(1.0) as usize;
        let seg_sweep = sweep / segments as f64;
        let w = (seg_sweep / 2.0).cos();

        let at = |angle: f64, scale: f64| -> Point3 {
            center
                + radius * scale * angle.cos() * x_axis.as_ref()
                + radius * scale * angle.sin() * y_axis.as_ref()
        };

        let mut points = Vec::with_capacity(2 * segments + 1);
        let mut weights = Vec::with_capacity(2 * segments + 1);
        points.push(at(0.0, 1.0));
        weights.push(1.0);
        for k in 0..segments {
            let a0 = k as f64 * seg_sweep;
            let mid = a0 + seg_sweep / 2.0;
            points.push(at(mid, 1.0 / w));
            weights.push(w);
            points.push(at(a0 + seg_sweep, 1.0));
            weights.push(1.0);
        }

        let mut knots = vec![0.0; 3];
        for k in 1..segments {
            let v = k as f64 / segments as f64;
            knots.push(v);
            knots.push(v);
        }
        knots.extend_from_slice(&[1.0, 1.0, 1.0]);

        Self::new(2, points, Some(weights), knots)
    }

    /// Concatenate curves end to end.
    ///
    /// Control points are appended in order and re-parameterized over a
    /// clamped uniform knot vector of the maximum component degree. This is
    /// an approximation: component parameterization is not preserved.
    pub fn concatenate(parts: &[NurbsCurve]) -> Option<Self> {
        if parts.is_empty() {
            return None;
        }
        let degree = parts.iter().map(|c| c.degree).max().unwrap_or(1);
        let rational = parts.iter().any(|c| c.weights.is_some());

        let mut points = Vec::new();
        let mut weights = Vec::new();
        for (i, part) in parts.iter().enumerate() {
            let skip = usize::from(i > 0); // shared joint point appears once
            for (j, p) in part.control_points.iter().enumerate().skip(skip) {
                points.push(*p);
                weights.push(part.weights.as_ref().map_or(1.0, |w| w[j]));
            }
        }
        if points.len() < degree + 1 {
            return None;
        }

        let knots = clamped_uniform_knots(points.len(), degree);
        Some(Self::new(
            degree,
            points,
            rational.then_some(weights),
            knots,
        ))
    }

    /// Evaluate at parameter `t` by De Boor in homogeneous coordinates.
    pub fn point_at(&self, t: f64) -> Point3 {
        let n = self.control_points.len() - 1;
        let t = t.clamp(self.t_min, self.t_max);
        let span = find_span(&self.knots, n, self.degree, t);
        let basis = basis_functions(&self.knots, span, self.degree, t);

        let mut h = [0.0; 4];
        for (i, &b) in basis.iter().enumerate() {
            let idx = span - self.degree + i;
            let w = self.weight(idx);
            let cp = &self.control_points[idx];
            h[0] += b * w * cp.x;
            h[1] += b * w * cp.y;
            h[2] += b * w * cp.z;
            h[3] += b * w;
        }

        if h[3].abs() < 1e-30 {
            Point3::origin()
        } else {
            Point3::new(h[0] / h[3], h[1] / h[3], h[2] / h[3])
        }
    }

    /// Tangent at `t` by central finite differences.
    pub fn tangent_at(&self, t: f64) -> Vec3 {
        let dt = (self.t_max - self.t_min).max(1e-12) * 1e-7;
        let p0 = self.point_at((t - dt).max(self.t_min));
        let p1 = self.point_at((t + dt).min(self.t_max));
        (p1 - p0) / (2.0 * dt)
    }

    /// Start point (first Greville abscissa of a clamped curve).
    pub fn start_point(&self) -> Point3 {
        self.point_at(self.t_min)
    }

    /// End point.
    pub fn end_point(&self) -> Point3 {
        self.point_at(self.t_max)
    }

    /// Weight of control point `i` (1.0 for non-rational curves).
    pub fn weight(&self, i: usize) -> f64 {
        self.weights.as_ref().map_or(1.0, |w| w[i])
    }

    /// Apply a transform to every control point.
    pub fn transformed(&self, t: &Transform) -> Self {
        let mut out = self.clone();
        for p in &mut out.control_points {
            *p = t.apply_point(p);
        }
        out
    }

    /// Scale every control point about the origin (unit conversion).
    pub fn scaled(&self, s: f64) -> Self {
        let mut out = self.clone();
        for p in &mut out.control_points {
            *p = Point3::new(p.x * s, p.y * s, p.z * s);
        }
        out
    }
}

fn points_coplanar(points: &[Point3]) -> bool {
    if points.len() <= 3 {
        return true;
    }
    let origin = points[0];
    let mut normal = Vec3::zeros();
    for i in 1..points.len() - 1 {
        let n = (points[i] - origin).cross(&(points[i + 1] - origin));
        if n.norm() > 1e-9 {
            normal = n.normalize();
            break;
        }
    }
    if normal.norm() < 0.5 {
        return true; // degenerate: collinear
    }
    points
        .iter()
        .all(|p| (p - origin).dot(&normal).abs() < 1e-6)
}

// =============================================================================
// NURBS surface
// =============================================================================

/// A tensor-product B-spline surface, rational when `weights` is present.
///
/// The control net is indexed `[i][j]` with `i` along u and `j` along v;
/// every row has the same length. Knot vectors satisfy
/// `knots_u.len() == nu + degree_u + 1` (and likewise in v).
#[derive(Debug, Clone, PartialEq)]
pub struct NurbsSurface {
    /// Degree in the u direction.
    pub degree_u: usize,
    /// Degree in the v direction.
    pub degree_v: usize,
    /// Control net rows indexed `[i][j]` = `[u][v]`.
    pub control_points: Vec<Vec<Point3>>,
    /// Weight grid matching the control net; `Some` marks the surface rational.
    pub weights: Option<Vec<Vec<f64>>>,
    /// Knot vector in u.
    pub knots_u: Vec<f64>,
    /// Knot vector in v.
    pub knots_v: Vec<f64>,
}

impl NurbsSurface {
    /// Create a surface.
    ///
    /// # Panics
    /// Panics on ragged rows, invalid knot vectors, or a mismatched weight
    /// grid; readers validate raw data before constructing.
    pub fn new(
        degree_u: usize,
        degree_v: usize,
        control_points: Vec<Vec<Point3>>,
        weights: Option<Vec<Vec<f64>>>,
        knots_u: Vec<f64>,
        knots_v: Vec<f64>,
    ) -> Self {
        let nu = control_points.len();
        assert!(nu > 0, "empty control net");
        let nv = control_points[0].len();
        assert!(
            control_points.iter().all(|row| row.len() == nv),
            "ragged control net"
        );
        assert!(validate_knots(&knots_u, nu, degree_u), "invalid u knot vector");
        assert!(validate_knots(&knots_v, nv, degree_v), "invalid v knot vector");
        if let Some(w) = &weights {
            assert!(
                w.len() == nu && w.iter().all(|row| row.len() == nv),
                "weight grid mismatch"
            );
        }
        Self {
            degree_u,
            degree_v,
            control_points,
            weights,
            knots_u,
            knots_v,
        }
    }

    /// Number of control points in u.
    pub fn nu(&self) -> usize {
        self.control_points.len()
    }

    /// Number of control points in v.
    pub fn nv(&self) -> usize {
        self.control_points[0].len()
    }

    /// Weight at `(i, j)` (1.0 for non-rational surfaces).
    pub fn weight(&self, i: usize, j: usize) -> f64 {
        self.weights.as_ref().map_or(1.0, |w| w[i][j])
    }

    /// Parameter box `((u_min, u_max), (v_min, v_max))`.
    pub fn domain(&self) -> ((f64, f64), (f64, f64)) {
        (
            (self.knots_u[self.degree_u], self.knots_u[self.nu()]),
            (self.knots_v[self.degree_v], self.knots_v[self.nv()]),
        )
    }

    /// Evaluate at `(u, v)` by tensor-product De Boor in homogeneous space.
    pub fn point_at(&self, u: f64, v: f64) -> Point3 {
        let nu = self.nu() - 1;
        let nv = self.nv() - 1;
        let ((u_min, u_max), (v_min, v_max)) = self.domain();
        let u = u.clamp(u_min, u_max);
        let v = v.clamp(v_min, v_max);

        let span_u = find_span(&self.knots_u, nu, self.degree_u, u);
        let span_v = find_span(&self.knots_v, nv, self.degree_v, v);
        let basis_u = basis_functions(&self.knots_u, span_u, self.degree_u, u);
        let basis_v = basis_functions(&self.knots_v, span_v, self.degree_v, v);

        let mut h = [0.0; 4];
        for (i, &bu) in basis_u.iter().enumerate() {
            let ui = span_u - self.degree_u + i;
            for (j, &bv) in basis_v.iter().enumerate() {
                let vj = span_v - self.degree_v + j;
                let w = self.weight(ui, vj);
                let b = bu * bv * w;
                let cp = &self.control_points[ui][vj];
                h[0] += b * cp.x;
                h[1] += b * cp.y;
                h[2] += b * cp.z;
                h[3] += b;
            }
        }

        if h[3].abs() < 1e-30 {
            Point3::origin()
        } else {
            Point3::new(h[0] / h[3], h[1] / h[3], h[2] / h[3])
        }
    }

    /// Surface normal at `(u, v)` by finite-difference partials.
    pub fn normal_at(&self, u: f64, v: f64) -> Dir3 {
        let ((u_min, u_max), (v_min, v_max)) = self.domain();
        let du = (u_max - u_min).max(1e-12) * 1e-6;
        let dv = (v_max - v_min).max(1e-12) * 1e-6;

        let p0 = self.point_at(u, v);
        let pu = self.point_at((u + du).min(u_max), v);
        let pv = self.point_at(u, (v + dv).min(v_max));

        let n = (pu - p0).cross(&(pv - p0));
        if n.norm() < 1e-18 {
            Dir3::new_normalize(Vec3::z())
        } else {
            Dir3::new_normalize(n)
        }
    }

    /// Apply a transform to every control point.
    pub fn transformed(&self, t: &Transform) -> Self {
        let mut out = self.clone();
        for row in &mut out.control_points {
            for p in row.iter_mut() {
                *p = t.apply_point(p);
            }
        }
        out
    }

    /// Scale every control point about the origin (unit conversion).
    pub fn scaled(&self, s: f64) -> Self {
        let mut out = self.clone();
        for row in &mut out.control_points {
            for p in row.iter_mut() {
                *p = Point3::new(p.x * s, p.y * s, p.z * s);
            }
        }
        out
    }

    // =========================================================================
    // Analytic synthesis
    // =========================================================================

    /// Half-extent used for unbounded analytic surfaces (mm).
    pub const ANALYTIC_EXTENT: f64 = 1000.0;

    /// A plane as a degree-1x1 bilinear patch spanning `half_extent` along
    /// the orthonormal in-plane axes.
    pub fn plane_patch(origin: Point3, z_axis: Dir3, x_axis: Option<Dir3>, half_extent: f64) -> Self {
        let x = x_axis.unwrap_or_else(|| orthonormal_x_from_z(&z_axis));
        let y = Dir3::new_normalize(z_axis.as_ref().cross(x.as_ref()));
        let e = half_extent;
        let corner = |su: f64, sv: f64| origin + su * e * x.as_ref() + sv * e * y.as_ref();
        Self::new(
            1,
            1,
            vec![
                vec![corner(-1.0, -1.0), corner(-1.0, 1.0)],
                vec![corner(1.0, -1.0), corner(1.0, 1.0)],
            ],
            None,
            vec![0.0, 0.0, 1.0, 1.0],
            vec![0.0, 0.0, 1.0, 1.0],
        )
    }

    /// A full cylinder as the exact rational quadratic: 9 control points at
    /// angles k*pi/4 in u (weights alternating 1, sqrt(2)/2), degree 1 in v
    /// along the axis, spanning `half_height` each side of the origin.
    pub fn cylinder_patch(
        origin: Point3,
        axis: Dir3,
        ref_dir: Option<Dir3>,
        radius: f64,
        half_height: f64,
    ) -> Self {
        let x = ref_dir.unwrap_or_else(|| orthonormal_x_from_z(&axis));
        let y = Dir3::new_normalize(axis.as_ref().cross(x.as_ref()));
        let w = std::f64::consts::FRAC_1_SQRT_2;

        let mut rows = Vec::with_capacity(9);
        let mut weights = Vec::with_capacity(9);
        for k in 0..9 {
            let angle = k as f64 * PI / 4.0;
            // Odd indices are the tangent-intersection points, pushed out 1/w.
            let scale = if k % 2 == 1 { 1.0 / w } else { 1.0 };
            let radial =
                radius * scale * (angle.cos() * x.as_ref() + angle.sin() * y.as_ref());
            let bottom = origin + radial - half_height * axis.as_ref();
            let top = origin + radial + half_height * axis.as_ref();
            rows.push(vec![bottom, top]);
            let wk = if k % 2 == 1 { w } else { 1.0 };
            weights.push(vec![wk, wk]);
        }

        Self::new(
            2,
            1,
            rows,
            Some(weights),
            vec![0.0, 0.0, 0.0, 0.25, 0.25, 0.5, 0.5, 0.75, 0.75, 1.0, 1.0, 1.0],
            vec![0.0, 0.0, 1.0, 1.0],
        )
    }

    /// Surface of revolution: rotate `generator` about the axis through
    /// `axis_origin` along `axis_dir` by `sweep` radians.
    ///
    /// The angular direction is v. A sweep of at most pi/2 is one rational
    /// quadratic span; larger sweeps split into quarter sections with
    /// doubled interior knots.
    pub fn revolve(
        generator: &NurbsCurve,
        axis_origin: Point3,
        axis_dir: Dir3,
        sweep: f64,
    ) -> Self {
        let sweep = if sweep <= 1e-12 { 2.0 * PI } else { sweep };
        let segments = ((sweep - 1e-9) / (PI / 2.0)).ceil().max(1.0) as usize;
        let seg_sweep = sweep / segments as f64;
        let w_seg = (seg_sweep / 2.0).cos();

        let nv = 2 * segments + 1;
        let mut rows = Vec::with_capacity(generator.control_points.len());
        let mut weights = Vec::with_capacity(generator.control_points.len());

        for (i, gp) in generator.control_points.iter().enumerate() {
            let gw = generator.weight(i);
            // Decompose the generator point into axis foot + radial offset.
            let rel = gp - axis_origin;
            let h = rel.dot(axis_dir.as_ref());
            let foot = axis_origin + h * axis_dir.as_ref();
            let radial = gp - foot;

            let mut row = Vec::with_capacity(nv);
            let mut wrow = Vec::with_capacity(nv);
            for j in 0..nv {
                let seg = j / 2;
                let is_mid = j % 2 == 1;
                let angle = if is_mid {
                    (seg as f64 + 0.5) * seg_sweep
                } else {
                    seg as f64 * seg_sweep
                };
                let rot = Transform::rotation_about_axis(&axis_dir, angle);
                let mut p = foot + rot.apply_vec(&radial);
                if is_mid {
                    // Tangent-intersection point sits 1/w beyond the circle.
                    let r = p - foot;
                    p = foot + r / w_seg;
                }
                row.push(p);
                wrow.push(if is_mid { gw * w_seg } else { gw });
            }
            rows.push(row);
            weights.push(wrow);
        }

        let mut knots_v = vec![0.0; 3];
        for k in 1..segments {
            let t = k as f64 / segments as f64;
            knots_v.push(t);
            knots_v.push(t);
        }
        knots_v.extend_from_slice(&[1.0, 1.0, 1.0]);

        Self::new(
            generator.degree,
            2,
            rows,
            Some(weights),
            generator.knots.clone(),
            knots_v,
        )
    }

    /// Tabulated cylinder: translate-extrude `generator` along `direction`.
    pub fn extrude(generator: &NurbsCurve, direction: Vec3) -> Self {
        let rows: Vec<Vec<Point3>> = generator
            .control_points
            .iter()
            .map(|p| vec![*p, p + direction])
            .collect();
        let weights = generator
            .weights
            .as_ref()
            .map(|ws| ws.iter().map(|&w| vec![w, w]).collect());
        Self::new(
            generator.degree,
            1,
            rows,
            weights,
            generator.knots.clone(),
            vec![0.0, 0.0, 1.0, 1.0],
        )
    }

    /// Ruled surface: degree-1 blend between two generator curves.
    ///
    /// When the generators share degree and knots the blend is exact on the
    /// control net; otherwise both are sampled uniformly and the result
    /// interpolates the samples with a degree-1 net.
    pub fn ruled(a: &NurbsCurve, b: &NurbsCurve) -> Self {
        if a.degree == b.degree
            && a.knots == b.knots
            && a.control_points.len() == b.control_points.len()
        {
            let rows: Vec<Vec<Point3>> = a
                .control_points
                .iter()
                .zip(b.control_points.iter())
                .map(|(p, q)| vec![*p, *q])
                .collect();
            let rational = a.weights.is_some() || b.weights.is_some();
            let weights = rational.then(|| {
                (0..a.control_points.len())
                    .map(|i| vec![a.weight(i), b.weight(i)])
                    .collect()
            });
            return Self::new(
                a.degree,
                1,
                rows,
                weights,
                a.knots.clone(),
                vec![0.0, 0.0, 1.0, 1.0],
            );
        }

        const SAMPLES: usize = 16;
        let rows: Vec<Vec<Point3>> = (0..SAMPLES)
            .map(|i| {
                let f = i as f64 / (SAMPLES - 1) as f64;
                let ta = a.t_min + f * (a.t_max - a.t_min);
                let tb = b.t_min + f * (b.t_max - b.t_min);
                vec![a.point_at(ta), b.point_at(tb)]
            })
            .collect();
        Self::new(
            1,
            1,
            rows,
            None,
            clamped_uniform_knots(SAMPLES, 1),
            vec![0.0, 0.0, 1.0, 1.0],
        )
    }

    // =========================================================================
    // Analytic recognition (used on export)
    // =========================================================================

    /// A 2x2 degree-1x1 patch is a plane; returns (origin, normal, x_axis).
    pub fn as_plane(&self) -> Option<(Point3, Dir3, Dir3)> {
        if self.degree_u != 1 || self.degree_v != 1 || self.nu() != 2 || self.nv() != 2 {
            return None;
        }
        if self.weights.is_some() {
            return None;
        }
        let p00 = self.control_points[0][0];
        let p10 = self.control_points[1][0];
        let p01 = self.control_points[0][1];
        let p11 = self.control_points[1][1];
        // Planar only if the fourth corner closes the parallelogram.
        let closing = p00 + (p10 - p00) + (p01 - p00);
        if (closing - p11).norm() > 1e-6 {
            return None;
        }
        let u = p10 - p00;
        let v = p01 - p00;
        let n = u.cross(&v);
        if n.norm() < 1e-12 {
            return None;
        }
        let origin = Point3::from((p00.coords + p11.coords) * 0.5);
        Some((
            origin,
            Dir3::new_normalize(n),
            Dir3::new_normalize(u),
        ))
    }

    /// Recognize the canonical 9-point rational-quadratic cylinder pattern
    /// within 1e-6; returns (origin, axis, ref_dir, radius, half_height).
    pub fn as_cylinder(&self) -> Option<(Point3, Dir3, Dir3, f64, f64)> {
        if self.degree_u != 2 || self.degree_v != 1 || self.nu() != 9 || self.nv() != 2 {
            return None;
        }
        let weights = self.weights.as_ref()?;
        let w = std::f64::consts::FRAC_1_SQRT_2;
        for (k, row) in weights.iter().enumerate() {
            let expect = if k % 2 == 1 { w } else { 1.0 };
            if row.iter().any(|&wk| (wk - expect).abs() > 1e-6) {
                return None;
            }
        }
        // Seam rows must coincide.
        if (self.control_points[0][0] - self.control_points[8][0]).norm() > 1e-6 {
            return None;
        }

        let bottom: Vec<Point3> = self.control_points.iter().map(|r| r[0]).collect();
        let top: Vec<Point3> = self.control_points.iter().map(|r| r[1]).collect();
        // Centers from the four on-circle points at k = 0, 2, 4, 6.
        let center_of = |ring: &[Point3]| -> Point3 {
            let mut c = Vec3::zeros();
            for &k in &[0usize, 2, 4, 6] {
                c += ring[k].coords;
            }
            Point3::from(c / 4.0)
        };
        let c_bot = center_of(&bottom);
        let c_top = center_of(&top);
        let axis_vec = c_top - c_bot;
        if axis_vec.norm() < 1e-9 {
            return None;
        }
        let axis = Dir3::new_normalize(axis_vec);
        let radius = (bottom[0] - c_bot).norm();
        if radius < 1e-9 {
            return None;
        }
        // Every even point must sit on the circle, odd points 1/w outside.
        for (k, p) in bottom.iter().enumerate() {
            let expect = if k % 2 == 1 { radius / w } else { radius };
            if ((p - c_bot).norm() - expect).abs() > 1e-6 {
                return None;
            }
            if (p - c_bot).dot(axis.as_ref()).abs() > 1e-6 {
                return None;
            }
        }
        let origin = Point3::from((c_bot.coords + c_top.coords) * 0.5);
        let ref_dir = Dir3::new_normalize(bottom[0] - c_bot);
        let half_height = axis_vec.norm() / 2.0;
        Some((origin, axis, ref_dir, radius, half_height))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_knot_compress_expand_roundtrip() {
        let knots = vec![0.0, 0.0, 0.0, 0.25, 0.25, 0.5, 0.5, 0.75, 0.75, 1.0, 1.0, 1.0];
        let (values, mults) = compress_knots(&knots);
        assert_eq!(values, vec![0.0, 0.25, 0.5, 0.75, 1.0]);
        assert_eq!(mults, vec![3, 2, 2, 2, 3]);
        assert_eq!(expand_knots(&values, &mults), knots);
    }

    #[test]
    fn test_validate_knots() {
        assert!(validate_knots(&[0.0, 0.0, 1.0, 1.0], 2, 1));
        assert!(!validate_knots(&[0.0, 0.0, 1.0], 2, 1));
        assert!(!validate_knots(&[0.0, 1.0, 0.5, 1.0], 2, 1));
    }

    #[test]
    fn test_line_segment() {
        let c = NurbsCurve::line_segment(Point3::origin(), Point3::new(10.0, 0.0, 0.0));
        assert_eq!(c.degree, 1);
        assert_eq!(c.knots, vec![0.0, 0.0, 1.0, 1.0]);
        assert!(c.weights.is_none());
        let mid = c.point_at(0.5);
        assert_relative_eq!(mid.x, 5.0, epsilon = 1e-12);
        assert!(!c.is_closed);
        assert!(c.is_planar);
    }

    #[test]
    fn test_quarter_arc_control_net() {
        // Quarter arc from (1,0,0) to (0,1,0) about the origin: one rational
        // quadratic span, middle control point at the tangent intersection
        // center + r(cos 45, sin 45)/cos(45), weights {1, cos 45, 1}.
        let c = NurbsCurve::circular_arc(
            Point3::origin(),
            Point3::new(1.0, 0.0, 0.0),
            Point3::new(0.0, 1.0, 0.0),
            Dir3::new_normalize(Vec3::z()),
        );
        assert_eq!(c.degree, 2);
        assert_eq!(c.control_points.len(), 3);
        assert_eq!(c.knots, vec![0.0, 0.0, 0.0, 1.0, 1.0, 1.0]);

        let w = (PI / 4.0).cos();
        let mid = c.control_points[1];
        assert_relative_eq!(mid.x, (PI / 4.0).cos() / w, epsilon = 1e-9);
        assert_relative_eq!(mid.y, (PI / 4.0).sin() / w, epsilon = 1e-9);
        let weights = c.weights.as_ref().unwrap();
        assert_relative_eq!(weights[0], 1.0, epsilon = 1e-12);
        assert_relative_eq!(weights[1], w, epsilon = 1e-12);
        assert_relative_eq!(weights[2], 1.0, epsilon = 1e-12);

        // Every sample lies on the unit circle.
        for i in 0..=20 {
            let t = i as f64 / 20.0;
            let p = c.point_at(t);
            assert_relative_eq!(p.coords.norm(), 1.0, epsilon = 1e-9);
        }
    }

    #[test]
    fn test_arc_wraps_when_end_angle_behind_start() {
        // End at angle -90 (= 270 CCW): the arc must run forward 3/4 turn.
        let c = NurbsCurve::circular_arc(
            Point3::origin(),
            Point3::new(1.0, 0.0, 0.0),
            Point3::new(0.0, -1.0, 0.0),
            Dir3::new_normalize(Vec3::z()),
        );
        let end = c.end_point();
        assert_relative_eq!(end.y, -1.0, epsilon = 1e-9);
        // 3 quarter segments: 7 control points
        assert_eq!(c.control_points.len(), 7);
        // Mid of the sweep sits at angle 135.
        let mid = c.point_at(0.5);
        assert!(mid.x < 0.0 && mid.y > 0.0);
    }

    #[test]
    fn test_full_circle() {
        let c = NurbsCurve::full_circle(Point3::origin(), Dir3::new_normalize(Vec3::z()), 2.0);
        assert_eq!(c.control_points.len(), 9);
        assert!(c.is_closed);
        for i in 0..=32 {
            let t = i as f64 / 32.0;
            assert_relative_eq!(c.point_at(t).coords.norm(), 2.0, epsilon = 1e-9);
        }
    }

    #[test]
    fn test_concatenate_degree_is_max() {
        let a = NurbsCurve::line_segment(Point3::origin(), Point3::new(1.0, 0.0, 0.0));
        let b = NurbsCurve::circular_arc(
            Point3::new(1.0, 1.0, 0.0),
            Point3::new(1.0, 0.0, 0.0),
            Point3::new(2.0, 1.0, 0.0),
            Dir3::new_normalize(Vec3::z()),
        );
        let joined = NurbsCurve::concatenate(&[a, b]).unwrap();
        assert_eq!(joined.degree, 2);
        assert!(joined.weights.is_some());
        assert!(validate_knots(
            &joined.knots,
            joined.control_points.len(),
            joined.degree
        ));
    }

    #[test]
    fn test_plane_patch_and_recognition() {
        let s = NurbsSurface::plane_patch(
            Point3::new(0.0, 0.0, 5.0),
            Dir3::new_normalize(Vec3::z()),
            None,
            1000.0,
        );
        assert_eq!(s.degree_u, 1);
        assert_eq!(s.degree_v, 1);
        assert_eq!(s.nu(), 2);
        // Every sample has z = 5.
        for i in 0..=4 {
            for j in 0..=4 {
                let p = s.point_at(i as f64 / 4.0, j as f64 / 4.0);
                assert_relative_eq!(p.z, 5.0, epsilon = 1e-9);
            }
        }
        let (origin, normal, _x) = s.as_plane().unwrap();
        assert_relative_eq!(origin.z, 5.0, epsilon = 1e-9);
        assert_relative_eq!(normal.as_ref().z.abs(), 1.0, epsilon = 1e-12);
    }

    #[test]
    fn test_cylinder_patch_and_recognition() {
        let s = NurbsSurface::cylinder_patch(
            Point3::origin(),
            Dir3::new_normalize(Vec3::z()),
            None,
            4.0,
            50.0,
        );
        assert_eq!(s.nu(), 9);
        assert_eq!(
            s.knots_u,
            vec![0.0, 0.0, 0.0, 0.25, 0.25, 0.5, 0.5, 0.75, 0.75, 1.0, 1.0, 1.0]
        );
        // Every sample is at radius 4 from the axis.
        for i in 0..=16 {
            for j in 0..=4 {
                let p = s.point_at(i as f64 / 16.0, j as f64 / 4.0);
                let r = (p.x * p.x + p.y * p.y).sqrt();
                assert_relative_eq!(r, 4.0, epsilon = 1e-9);
            }
        }
        let (origin, axis, _ref, radius, half_height) = s.as_cylinder().unwrap();
        assert_relative_eq!(radius, 4.0, epsilon = 1e-9);
        assert_relative_eq!(half_height, 50.0, epsilon = 1e-9);
        assert_relative_eq!(axis.as_ref().z.abs(), 1.0, epsilon = 1e-9);
        assert!(origin.coords.norm() < 1e-9);
    }

    #[test]
    fn test_plane_not_recognized_as_cylinder() {
        let s = NurbsSurface::plane_patch(
            Point3::origin(),
            Dir3::new_normalize(Vec3::z()),
            None,
            10.0,
        );
        assert!(s.as_cylinder().is_none());
    }

    #[test]
    fn test_revolve_sphere() {
        // Revolve a half-circle generator about Z: every sample at radius 3.
        let gen = NurbsCurve::circular_arc(
            Point3::origin(),
            Point3::new(0.0, 0.0, -3.0),
            Point3::new(0.0, 0.0, 3.0),
            Dir3::new_normalize(Vec3::y()),
        );
        let s = NurbsSurface::revolve(
            &gen,
            Point3::origin(),
            Dir3::new_normalize(Vec3::z()),
            2.0 * PI,
        );
        assert_eq!(s.degree_v, 2);
        for i in 0..=8 {
            for j in 0..=8 {
                let p = s.point_at(i as f64 / 8.0, j as f64 / 8.0);
                assert_relative_eq!(p.coords.norm(), 3.0, epsilon = 1e-6);
            }
        }
    }

    #[test]
    fn test_revolve_quarter_sweep_single_segment() {
        let gen = NurbsCurve::line_segment(Point3::new(2.0, 0.0, 0.0), Point3::new(2.0, 0.0, 5.0));
        let s = NurbsSurface::revolve(
            &gen,
            Point3::origin(),
            Dir3::new_normalize(Vec3::z()),
            PI / 2.0,
        );
        assert_eq!(s.nv(), 3);
        assert_eq!(s.knots_v, vec![0.0, 0.0, 0.0, 1.0, 1.0, 1.0]);
        // Larger sweep doubles interior knots.
        let s2 = NurbsSurface::revolve(
            &gen,
            Point3::origin(),
            Dir3::new_normalize(Vec3::z()),
            PI,
        );
        assert_eq!(s2.nv(), 5);
        assert_eq!(s2.knots_v, vec![0.0, 0.0, 0.0, 0.5, 0.5, 1.0, 1.0, 1.0]);
    }

    #[test]
    fn test_extrude() {
        let gen = NurbsCurve::line_segment(Point3::origin(), Point3::new(1.0, 0.0, 0.0));
        let s = NurbsSurface::extrude(&gen, Vec3::new(0.0, 0.0, 7.0));
        let p = s.point_at(0.5, 1.0);
        assert_relative_eq!(p.x, 0.5, epsilon = 1e-12);
        assert_relative_eq!(p.z, 7.0, epsilon = 1e-12);
    }

    #[test]
    fn test_ruled_matching_generators() {
        let a = NurbsCurve::line_segment(Point3::origin(), Point3::new(1.0, 0.0, 0.0));
        let b = NurbsCurve::line_segment(Point3::new(0.0, 2.0, 0.0), Point3::new(1.0, 2.0, 0.0));
        let s = NurbsSurface::ruled(&a, &b);
        let p = s.point_at(0.5, 0.5);
        assert_relative_eq!(p.y, 1.0, epsilon = 1e-12);
    }

    #[test]
    fn test_curve_knot_invariant_holds_for_all_constructors() {
        let curves = vec![
            NurbsCurve::line_segment(Point3::origin(), Point3::new(1.0, 1.0, 1.0)),
            NurbsCurve::full_circle(Point3::origin(), Dir3::new_normalize(Vec3::z()), 1.0),
            NurbsCurve::circular_arc(
                Point3::origin(),
                Point3::new(1.0, 0.0, 0.0),
                Point3::new(0.0, 1.0, 0.0),
                Dir3::new_normalize(Vec3::z()),
            ),
        ];
        for c in &curves {
            assert_eq!(c.knots.len(), c.control_points.len() + c.degree + 1);
            for i in 1..c.knots.len() {
                assert!(c.knots[i] >= c.knots[i - 1]);
            }
            assert!(c.t_min <= c.t_max);
        }
    }
}
