//! Geometric predicates on tetrahedra, triangles and points.
//!
//! Orientation decisions use a tolerance that scales with the magnitude of the
//! input, so the same predicate works for unit cubes and for millimetre meshes
//! expressed in metres.

use nalgebra::{Point3, Vector3};

/// Represents the orientation of a tetrahedron.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Orientation {
    /// The tetrahedron has negative orientation (signed volume < 0)
    NEGATIVE,
    /// The tetrahedron is degenerate (signed volume ≈ 0)
    DEGENERATE,
    /// The tetrahedron has positive orientation (signed volume > 0)
    POSITIVE,
}

impl std::fmt::Display for Orientation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NEGATIVE => write!(f, "NEGATIVE"),
            Self::DEGENERATE => write!(f, "DEGENERATE"),
            Self::POSITIVE => write!(f, "POSITIVE"),
        }
    }
}

/// Signed volume of the tetrahedron `(a, b, c, d)`.
///
/// Positive when `d` lies on the side of triangle `(a, b, c)` that its
/// right-hand normal points to.
#[inline]
#[must_use]
pub fn tet_signed_volume(a: &Point3<f64>, b: &Point3<f64>, c: &Point3<f64>, d: &Point3<f64>) -> f64 {
    (b - a).cross(&(c - a)).dot(&(d - a)) / 6.0
}

/// Orientation of a tetrahedron with a relative tolerance.
///
/// The volume is compared against `relative_tolerance · L³`, where `L` is the
/// longest edge from `a`.
///
/// # Example
///
/// ```
/// use nalgebra::Point3;
/// use xfem_cut::geometry::predicates::{Orientation, tet_orientation};
///
/// let tet = [
///     Point3::new(0.0, 0.0, 0.0),
///     Point3::new(1.0, 0.0, 0.0),
///     Point3::new(0.0, 1.0, 0.0),
///     Point3::new(0.0, 0.0, 1.0),
/// ];
/// assert_eq!(tet_orientation(&tet, 1e-12), Orientation::POSITIVE);
/// ```
#[must_use]
pub fn tet_orientation(points: &[Point3<f64>; 4], relative_tolerance: f64) -> Orientation {
    let [a, b, c, d] = points;
    let volume = tet_signed_volume(a, b, c, d);
    let scale = [b, c, d]
        .iter()
        .map(|p| (*p - a).norm())
        .fold(0.0, f64::max);
    let tolerance = adaptive_tolerance(scale.powi(3), relative_tolerance);
    if volume > tolerance {
        Orientation::POSITIVE
    } else if volume < -tolerance {
        Orientation::NEGATIVE
    } else {
        Orientation::DEGENERATE
    }
}

/// Scale a relative tolerance by a magnitude, never below machine precision.
#[inline]
#[must_use]
pub fn adaptive_tolerance(magnitude: f64, relative_tolerance: f64) -> f64 {
    (magnitude.abs() * relative_tolerance).max(f64::EPSILON * magnitude.abs())
}

/// Closest point to `p` on the triangle `(a, b, c)`.
#[must_use]
pub fn closest_point_on_triangle(
    p: &Point3<f64>,
    a: &Point3<f64>,
    b: &Point3<f64>,
    c: &Point3<f64>,
) -> Point3<f64> {
    let ab = b - a;
    let ac = c - a;
    let ap = p - a;
    let d1 = ab.dot(&ap);
    let d2 = ac.dot(&ap);
    if d1 <= 0.0 && d2 <= 0.0 {
        return *a;
    }

    let bp = p - b;
    let d3 = ab.dot(&bp);
    let d4 = ac.dot(&bp);
    if d3 >= 0.0 && d4 <= d3 {
        return *b;
    }

    let vc = d1 * d4 - d3 * d2;
    if vc <= 0.0 && d1 >= 0.0 && d3 <= 0.0 {
        return a + ab * (d1 / (d1 - d3));
    }

    let cp = p - c;
    let d5 = ab.dot(&cp);
    let d6 = ac.dot(&cp);
    if d6 >= 0.0 && d5 <= d6 {
        return *c;
    }

    let vb = d5 * d2 - d1 * d6;
    if vb <= 0.0 && d2 >= 0.0 && d6 <= 0.0 {
        return a + ac * (d2 / (d2 - d6));
    }

    let va = d3 * d6 - d5 * d4;
    if va <= 0.0 && (d4 - d3) >= 0.0 && (d5 - d6) >= 0.0 {
        return b + (c - b) * ((d4 - d3) / ((d4 - d3) + (d5 - d6)));
    }

    let denom = va + vb + vc;
    if denom.abs() <= f64::MIN_POSITIVE {
        return *a;
    }
    a + ab * (vb / denom) + ac * (vc / denom)
}

/// Distance from `p` to the triangle `(a, b, c)`.
#[must_use]
pub fn point_triangle_distance(
    p: &Point3<f64>,
    a: &Point3<f64>,
    b: &Point3<f64>,
    c: &Point3<f64>,
) -> f64 {
    (p - closest_point_on_triangle(p, a, b, c)).norm()
}

/// Axis-aligned bounding box of a point set as `(min, max)`.
#[must_use]
pub fn bounding_box<'a, I>(points: I) -> Option<(Point3<f64>, Point3<f64>)>
where
    I: IntoIterator<Item = &'a Point3<f64>>,
{
    let mut iter = points.into_iter();
    let first = iter.next()?;
    let (mut min, mut max) = (*first, *first);
    for p in iter {
        min = min.inf(p);
        max = max.sup(p);
    }
    Some((min, max))
}

/// Whether two bounding boxes overlap after growing both by `tolerance`.
#[must_use]
pub fn boxes_overlap(
    a: &(Point3<f64>, Point3<f64>),
    b: &(Point3<f64>, Point3<f64>),
    tolerance: f64,
) -> bool {
    (0..3).all(|i| a.0[i] <= b.1[i] + tolerance && b.0[i] <= a.1[i] + tolerance)
}

/// Length of the box diagonal; used as the length scale of an element.
#[must_use]
pub fn box_diagonal(bounds: &(Point3<f64>, Point3<f64>)) -> f64 {
    let extent: Vector3<f64> = bounds.1 - bounds.0;
    extent.norm()
}
