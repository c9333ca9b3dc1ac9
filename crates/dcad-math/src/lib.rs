#![warn(missing_docs)]

//! Math types for the dcad interchange codec.
//!
//! Thin wrappers around nalgebra providing the value types shared by every
//! codec crate: points, vectors, directions, 4x4 transforms, coordinate
//! frames, and tolerance constants. Internal units are millimeters; the
//! internal frame is right-handed with +Y up.

use nalgebra::{Matrix4, Unit, Vector2, Vector3, Vector4};

/// A point in 3D space.
pub type Point3 = nalgebra::Point3<f64>;

/// A vector in 3D space.
pub type Vec3 = Vector3<f64>;

/// A unit (normalized) direction vector in 3D space.
pub type Dir3 = Unit<Vector3<f64>>;

/// A point in 2D parameter space.
pub type Point2 = nalgebra::Point2<f64>;

/// A vector in 2D space.
pub type Vec2 = Vector2<f64>;

/// Derive an orthonormal in-plane x axis from a plane normal.
///
/// Crosses with world X unless the normal is nearly parallel to it
/// (|z·X| >= 0.9), in which case world Y is used instead.
pub fn orthonormal_x_from_z(z: &Dir3) -> Dir3 {
    let seed = if z.as_ref().x.abs() < 0.9 {
        Vec3::x()
    } else {
        Vec3::y()
    };
    Dir3::new_normalize(seed - seed.dot(z.as_ref()) * z.as_ref())
}

/// Target coordinate frame for serialization.
///
/// The internal frame is right-handed +Y-up; exporters convert every point
/// and direction once at the moment of writing, importers apply the inverse
/// when the source frame is known.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CoordinateSystem {
    /// Right-handed, +Y up (the internal frame; identity).
    #[default]
    RightHandedYUp,
    /// Right-handed, +Z up (common CAD convention).
    RightHandedZUp,
    /// Left-handed, +Y up (X mirrored).
    LeftHandedYUp,
}

/// A 4x4 affine transformation matrix.
#[derive(Debug, Clone, PartialEq)]
pub struct Transform {
    /// The underlying 4x4 matrix.
    pub matrix: Matrix4<f64>,
}

impl Transform {
    /// Identity transform.
    pub fn identity() -> Self {
        Self {
            matrix: Matrix4::identity(),
        }
    }

    /// Translation by `(dx, dy, dz)`.
    pub fn translation(dx: f64, dy: f64, dz: f64) -> Self {
        let mut m = Matrix4::identity();
        m[(0, 3)] = dx;
        m[(1, 3)] = dy;
        m[(2, 3)] = dz;
        Self { matrix: m }
    }

    /// Uniform scale by `s`.
    pub fn uniform_scale(s: f64) -> Self {
        let mut m = Matrix4::identity();
        m[(0, 0)] = s;
        m[(1, 1)] = s;
        m[(2, 2)] = s;
        Self { matrix: m }
    }

    /// Rotation about an arbitrary axis through the origin by `angle` radians.
    ///
    /// Uses Rodrigues' rotation formula.
    pub fn rotation_about_axis(axis: &Dir3, angle: f64) -> Self {
        let (s, c) = angle.sin_cos();
        let t = 1.0 - c;
        let (x, y, z) = (axis.as_ref().x, axis.as_ref().y, axis.as_ref().z);
        let mut m = Matrix4::identity();
        m[(0, 0)] = t * x * x + c;
        m[(0, 1)] = t * x * y - s * z;
        m[(0, 2)] = t * x * z + s * y;
        m[(1, 0)] = t * x * y + s * z;
        m[(1, 1)] = t * y * y + c;
        m[(1, 2)] = t * y * z - s * x;
        m[(2, 0)] = t * x * z - s * y;
        m[(2, 1)] = t * y * z + s * x;
        m[(2, 2)] = t * z * z + c;
        Self { matrix: m }
    }

    /// Rotation about an axis through `origin` by `angle` radians.
    pub fn rotation_about_line(origin: &Point3, axis: &Dir3, angle: f64) -> Self {
        let to_origin = Transform::translation(-origin.x, -origin.y, -origin.z);
        let back = Transform::translation(origin.x, origin.y, origin.z);
        back.then(&Transform::rotation_about_axis(axis, angle)).then(&to_origin)
    }

    /// Build from 16 values in row-major order (STEP matrix convention).
    pub fn from_row_major(v: &[f64; 16]) -> Self {
        let mut m = Matrix4::identity();
        for r in 0..4 {
            for c in 0..4 {
                m[(r, c)] = v[r * 4 + c];
            }
        }
        Self { matrix: m }
    }

    /// Build from 16 values in column-major order (IGES matrix convention).
    pub fn from_column_major(v: &[f64; 16]) -> Self {
        let mut m = Matrix4::identity();
        for c in 0..4 {
            for r in 0..4 {
                m[(r, c)] = v[c * 4 + r];
            }
        }
        Self { matrix: m }
    }

    /// Conversion applied at serialization time for the chosen target frame.
    ///
    /// Internal frame is right-handed +Y-up. RH-Z-up maps (x, y, z) to
    /// (x, -z, y); LH-Y-up mirrors X.
    pub fn for_frame(frame: CoordinateSystem) -> Self {
        let mut m = Matrix4::identity();
        match frame {
            CoordinateSystem::RightHandedYUp => {}
            CoordinateSystem::RightHandedZUp => {
                m[(1, 1)] = 0.0;
                m[(1, 2)] = -1.0;
                m[(2, 1)] = 1.0;
                m[(2, 2)] = 0.0;
            }
            CoordinateSystem::LeftHandedYUp => {
                m[(0, 0)] = -1.0;
            }
        }
        Self { matrix: m }
    }

    /// True when the last row is [0, 0, 0, 1], the rigid-placement invariant.
    pub fn is_affine(&self) -> bool {
        self.matrix[(3, 0)] == 0.0
            && self.matrix[(3, 1)] == 0.0
            && self.matrix[(3, 2)] == 0.0
            && self.matrix[(3, 3)] == 1.0
    }

    /// Compose: apply `other` first, then `self` (self * other).
    pub fn then(&self, other: &Transform) -> Self {
        Self {
            matrix: self.matrix * other.matrix,
        }
    }

    /// Transform a point.
    pub fn apply_point(&self, p: &Point3) -> Point3 {
        let v = self.matrix * Vector4::new(p.x, p.y, p.z, 1.0);
        Point3::new(v.x, v.y, v.z)
    }

    /// Transform a direction vector (ignores translation).
    pub fn apply_vec(&self, v: &Vec3) -> Vec3 {
        let r = self.matrix * Vector4::new(v.x, v.y, v.z, 0.0);
        Vec3::new(r.x, r.y, r.z)
    }

    /// Transform a unit direction, re-normalizing the result.
    pub fn apply_dir(&self, d: &Dir3) -> Dir3 {
        let v = self.apply_vec(d.as_ref());
        if v.norm() < 1e-15 {
            *d
        } else {
            Dir3::new_normalize(v)
        }
    }

    /// Inverse of this transform, if it exists.
    pub fn inverse(&self) -> Option<Self> {
        self.matrix.try_inverse().map(|matrix| Self { matrix })
    }
}

impl Default for Transform {
    fn default() -> Self {
        Self::identity()
    }
}

/// Tolerance constants for geometric comparisons.
#[derive(Debug, Clone, Copy)]
pub struct Tolerance {
    /// Linear distance tolerance in mm.
    pub linear: f64,
    /// Angular tolerance in radians.
    pub angular: f64,
}

impl Tolerance {
    /// Default codec tolerances (1e-6 mm linear, 1e-9 rad angular).
    pub const DEFAULT: Self = Self {
        linear: 1e-6,
        angular: 1e-9,
    };

    /// Check if two points are coincident within tolerance.
    pub fn points_equal(&self, a: &Point3, b: &Point3) -> bool {
        (a - b).norm() < self.linear
    }

    /// Check if a scalar distance is effectively zero.
    pub fn is_zero(&self, d: f64) -> bool {
        d.abs() < self.linear
    }
}

impl Default for Tolerance {
    fn default() -> Self {
        Self::DEFAULT
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use std::f64::consts::PI;

    #[test]
    fn test_identity_transform() {
        let t = Transform::identity();
        let p = Point3::new(1.0, 2.0, 3.0);
        assert!((t.apply_point(&p) - p).norm() < 1e-12);
        assert!(t.is_affine());
    }

    #[test]
    fn test_translation_and_inverse() {
        let t = Transform::translation(10.0, 20.0, 30.0);
        let p = Point3::new(1.0, 2.0, 3.0);
        let q = t.apply_point(&p);
        assert_relative_eq!(q.x, 11.0, epsilon = 1e-12);
        assert_relative_eq!(q.y, 22.0, epsilon = 1e-12);
        assert_relative_eq!(q.z, 33.0, epsilon = 1e-12);

        let inv = t.inverse().unwrap();
        let back = inv.apply_point(&q);
        assert!((back - p).norm() < 1e-12);
    }

    #[test]
    fn test_rotation_about_axis() {
        let axis = Dir3::new_normalize(Vec3::z());
        let t = Transform::rotation_about_axis(&axis, PI / 2.0);
        let r = t.apply_point(&Point3::new(1.0, 0.0, 0.0));
        assert!(r.x.abs() < 1e-12);
        assert_relative_eq!(r.y, 1.0, epsilon = 1e-12);
    }

    #[test]
    fn test_rotation_about_line() {
        // 180 degrees about the vertical line through (1, 0, 0)
        let t = Transform::rotation_about_line(
            &Point3::new(1.0, 0.0, 0.0),
            &Dir3::new_normalize(Vec3::y()),
            PI,
        );
        let r = t.apply_point(&Point3::new(2.0, 0.0, 0.0));
        assert_relative_eq!(r.x, 0.0, epsilon = 1e-12);
        assert_relative_eq!(r.z, 0.0, epsilon = 1e-12);
    }

    #[test]
    fn test_row_column_major_agree() {
        // A translation written in both conventions lands on the same matrix.
        let row = Transform::from_row_major(&[
            1.0, 0.0, 0.0, 5.0, //
            0.0, 1.0, 0.0, 6.0, //
            0.0, 0.0, 1.0, 7.0, //
            0.0, 0.0, 0.0, 1.0,
        ]);
        let col = Transform::from_column_major(&[
            1.0, 0.0, 0.0, 0.0, //
            0.0, 1.0, 0.0, 0.0, //
            0.0, 0.0, 1.0, 0.0, //
            5.0, 6.0, 7.0, 1.0,
        ]);
        assert_eq!(row, col);
        assert!(row.is_affine());
    }

    #[test]
    fn test_frame_z_up() {
        let t = Transform::for_frame(CoordinateSystem::RightHandedZUp);
        // +Y (internal up) becomes +Z
        let up = t.apply_vec(&Vec3::y());
        assert_relative_eq!(up.z, 1.0, epsilon = 1e-12);
        assert!(up.y.abs() < 1e-12);
        // Round trip through the inverse
        let inv = t.inverse().unwrap();
        let back = inv.apply_vec(&up);
        assert!((back - Vec3::y()).norm() < 1e-12);
    }

    #[test]
    fn test_frame_left_handed() {
        let t = Transform::for_frame(CoordinateSystem::LeftHandedYUp);
        let p = t.apply_point(&Point3::new(2.0, 3.0, 4.0));
        assert_relative_eq!(p.x, -2.0, epsilon = 1e-12);
        assert_relative_eq!(p.y, 3.0, epsilon = 1e-12);
    }

    #[test]
    fn test_orthonormal_x_from_z() {
        let z = Dir3::new_normalize(Vec3::z());
        let x = orthonormal_x_from_z(&z);
        assert!(x.as_ref().dot(z.as_ref()).abs() < 1e-12);

        // Nearly-X normal falls back to the Y seed
        let z2 = Dir3::new_normalize(Vec3::new(1.0, 0.01, 0.0));
        let x2 = orthonormal_x_from_z(&z2);
        assert!(x2.as_ref().dot(z2.as_ref()).abs() < 1e-12);
        assert!(x2.as_ref().norm() > 0.999);
    }

    #[test]
    fn test_tolerance_points_equal() {
        let tol = Tolerance::DEFAULT;
        let a = Point3::new(1.0, 2.0, 3.0);
        assert!(tol.points_equal(&a, &Point3::new(1.0 + 1e-7, 2.0, 3.0)));
        assert!(!tol.points_equal(&a, &Point3::new(1.001, 2.0, 3.0)));
    }
}
