//! Oriented planes in Hesse normal form.
//!
//! A plane is stored as a unit normal `n` and offset `w` with `n·x = w`. The
//! side a point lies on is decided against an absolute distance tolerance, so
//! points within the tolerance band are reported as [`PlaneSide::ON`].

use nalgebra::{Point3, Vector3};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Classification of a point against a plane.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PlaneSide {
    /// Strictly on the side the normal points to.
    FRONT,
    /// Strictly on the side opposite the normal.
    BACK,
    /// Within tolerance of the plane.
    ON,
}

impl fmt::Display for PlaneSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::FRONT => write!(f, "FRONT"),
            Self::BACK => write!(f, "BACK"),
            Self::ON => write!(f, "ON"),
        }
    }
}

/// An oriented plane `normal · x = w` with unit normal.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Plane {
    /// Unit normal.
    pub normal: Vector3<f64>,
    /// Signed distance of the plane from the origin along `normal`.
    pub w: f64,
}

impl Plane {
    /// Plane through `point` with the given normal.
    ///
    /// Returns `None` for a zero or non-finite normal.
    #[must_use]
    pub fn from_normal_and_point(normal: &Vector3<f64>, point: &Point3<f64>) -> Option<Self> {
        let length = normal.norm();
        if !length.is_finite() || length <= f64::MIN_POSITIVE {
            return None;
        }
        let normal = normal / length;
        Some(Self {
            normal,
            w: normal.dot(&point.coords),
        })
    }

    /// Plane through three points, oriented by the right-hand rule.
    ///
    /// Returns `None` if the points are collinear.
    #[must_use]
    pub fn from_points(a: &Point3<f64>, b: &Point3<f64>, c: &Point3<f64>) -> Option<Self> {
        let normal = (b - a).cross(&(c - a));
        let scale = (b - a).norm_squared().max((c - a).norm_squared());
        if normal.norm_squared() <= 1e-28 * scale * scale {
            return None;
        }
        Self::from_normal_and_point(&normal, a)
    }

    /// Signed distance of `p` from the plane (positive on the front side).
    #[inline]
    #[must_use]
    pub fn signed_distance(&self, p: &Point3<f64>) -> f64 {
        self.normal.dot(&p.coords) - self.w
    }

    /// Classify `p` against the plane with absolute tolerance `tolerance`.
    #[inline]
    #[must_use]
    pub fn classify(&self, p: &Point3<f64>, tolerance: f64) -> PlaneSide {
        let d = self.signed_distance(p);
        if d > tolerance {
            PlaneSide::FRONT
        } else if d < -tolerance {
            PlaneSide::BACK
        } else {
            PlaneSide::ON
        }
    }

    /// The same plane with the opposite orientation.
    #[must_use]
    pub fn flipped(&self) -> Self {
        Self {
            normal: -self.normal,
            w: -self.w,
        }
    }

    /// Whether `other` describes the same geometric plane, ignoring orientation.
    #[must_use]
    pub fn coincides_with(&self, other: &Self, tolerance: f64) -> bool {
        let cos = self.normal.dot(&other.normal);
        if cos.abs() < 1.0 - 1e-12 {
            return false;
        }
        let w = if cos > 0.0 { other.w } else { -other.w };
        (self.w - w).abs() <= tolerance
    }

    /// Orthogonal projection of `p` onto the plane.
    #[must_use]
    pub fn project(&self, p: &Point3<f64>) -> Point3<f64> {
        p - self.normal * self.signed_distance(p)
    }

    /// Point where the segment `a`–`b` crosses the plane.
    ///
    /// `da` and `db` are the signed distances of the end points; they must have
    /// opposite signs.
    #[must_use]
    pub fn segment_crossing(a: &Point3<f64>, b: &Point3<f64>, da: f64, db: f64) -> Point3<f64> {
        let t = da / (da - db);
        a + (b - a) * t
    }

    /// An orthonormal basis `(u, v)` spanning the plane, with `u × v = normal`.
    #[must_use]
    pub fn in_plane_basis(&self) -> (Vector3<f64>, Vector3<f64>) {
        in_plane_basis(&self.normal)
    }
}

/// An orthonormal basis `(u, v)` perpendicular to the unit vector `normal`.
#[must_use]
pub fn in_plane_basis(normal: &Vector3<f64>) -> (Vector3<f64>, Vector3<f64>) {
    let helper = if normal.x.abs() < 0.9 {
        Vector3::x()
    } else {
        Vector3::y()
    };
    let u = normal.cross(&helper).normalize();
    let v = normal.cross(&u);
    (u, v)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_plane_from_points_orientation_and_distance() {
        let plane = Plane::from_points(
            &Point3::new(0.0, 0.0, 1.0),
            &Point3::new(1.0, 0.0, 1.0),
            &Point3::new(0.0, 1.0, 1.0),
        )
        .unwrap();
        assert_relative_eq!(plane.normal, Vector3::z(), epsilon = 1e-14);
        assert_relative_eq!(plane.w, 1.0);
        assert_relative_eq!(plane.signed_distance(&Point3::new(3.0, -2.0, 3.0)), 2.0);
        assert_eq!(plane.classify(&Point3::new(0.0, 0.0, 2.0), 1e-10), PlaneSide::FRONT);
        assert_eq!(plane.classify(&Point3::new(0.0, 0.0, 0.0), 1e-10), PlaneSide::BACK);
        assert_eq!(plane.classify(&Point3::new(5.0, 5.0, 1.0 + 1e-12), 1e-10), PlaneSide::ON);
    }

    #[test]
    fn test_plane_rejects_collinear_points() {
        assert!(
            Plane::from_points(
                &Point3::origin(),
                &Point3::new(1.0, 1.0, 1.0),
                &Point3::new(2.0, 2.0, 2.0),
            )
            .is_none()
        );
        assert!(Plane::from_normal_and_point(&Vector3::zeros(), &Point3::origin()).is_none());
    }

    #[test]
    fn test_plane_coincidence_ignores_orientation() {
        let plane = Plane::from_normal_and_point(&Vector3::new(1.0, 1.0, 0.0), &Point3::new(1.0, 0.0, 0.0))
            .unwrap();
        assert!(plane.coincides_with(&plane.flipped(), 1e-12));
        let shifted =
            Plane::from_normal_and_point(&Vector3::new(1.0, 1.0, 0.0), &Point3::new(1.1, 0.0, 0.0)).unwrap();
        assert!(!plane.coincides_with(&shifted, 1e-12));
    }

    #[test]
    fn test_segment_crossing_and_projection() {
        let plane = Plane::from_normal_and_point(&Vector3::x(), &Point3::new(0.5, 0.0, 0.0)).unwrap();
        let a = Point3::new(0.0, 0.0, 0.0);
        let b = Point3::new(1.0, 2.0, 0.0);
        let x = Plane::segment_crossing(&a, &b, plane.signed_distance(&a), plane.signed_distance(&b));
        assert_relative_eq!(x, Point3::new(0.5, 1.0, 0.0), epsilon = 1e-14);
        assert_relative_eq!(plane.project(&b), Point3::new(0.5, 2.0, 0.0), epsilon = 1e-14);

        let (u, v) = plane.in_plane_basis();
        assert_relative_eq!(u.cross(&v), plane.normal, epsilon = 1e-14);
    }
}
