//! Planar convex polygons embedded in 3D.
//!
//! Facets, element-side pieces and cutter triangles are all handled as flat
//! convex polygons. The routines here clip, order, measure and overlap them.

use nalgebra::{Point3, Vector3};

use crate::core::collections::{POLYGON_INLINE_CAPACITY, SmallBuffer};
use crate::geometry::plane::{Plane, in_plane_basis};

/// A polygon's corner list.
pub type Polygon = SmallBuffer<Point3<f64>, POLYGON_INLINE_CAPACITY>;

/// Area vector (Newell's method): direction is the right-hand normal, length
/// is the area.
#[must_use]
pub fn area_vector(points: &[Point3<f64>]) -> Vector3<f64> {
    let Some(origin) = points.first() else {
        return Vector3::zeros();
    };
    let mut sum = Vector3::zeros();
    for pair in points[1..].windows(2) {
        sum += (pair[0] - origin).cross(&(pair[1] - origin));
    }
    sum * 0.5
}

/// Polygon area.
#[must_use]
pub fn area(points: &[Point3<f64>]) -> f64 {
    area_vector(points).norm()
}

/// Unit normal, or `None` for a degenerate polygon.
#[must_use]
pub fn unit_normal(points: &[Point3<f64>]) -> Option<Vector3<f64>> {
    let a = area_vector(points);
    let n = a.norm();
    (n > f64::MIN_POSITIVE && n.is_finite()).then(|| a / n)
}

/// Area-weighted centroid; falls back to the vertex mean for degenerate polygons.
#[must_use]
pub fn centroid(points: &[Point3<f64>]) -> Point3<f64> {
    let Some(origin) = points.first() else {
        return Point3::origin();
    };
    let normal = area_vector(points);
    let mut weighted = Vector3::zeros();
    let mut total = 0.0;
    for pair in points[1..].windows(2) {
        let tri_area = (pair[0] - origin).cross(&(pair[1] - origin)).dot(&normal);
        weighted += (origin.coords + pair[0].coords + pair[1].coords) * (tri_area / 3.0);
        total += tri_area;
    }
    if total.abs() > f64::MIN_POSITIVE {
        Point3::from(weighted / total)
    } else {
        vertex_mean(points)
    }
}

/// Arithmetic mean of the corners.
#[must_use]
pub fn vertex_mean(points: &[Point3<f64>]) -> Point3<f64> {
    if points.is_empty() {
        return Point3::origin();
    }
    let sum = points
        .iter()
        .fold(Vector3::zeros(), |acc, p| acc + p.coords);
    #[allow(clippy::cast_precision_loss)]
    Point3::from(sum / points.len() as f64)
}

/// Keep the part of `polygon` on the back side of `plane` (Sutherland–Hodgman).
///
/// Corners within `tolerance` of the plane are kept as they are.
#[must_use]
pub fn clip_to_back(polygon: &[Point3<f64>], plane: &Plane, tolerance: f64) -> Polygon {
    let mut out = Polygon::new();
    let n = polygon.len();
    if n == 0 {
        return out;
    }
    let distances: SmallBuffer<f64, POLYGON_INLINE_CAPACITY> =
        polygon.iter().map(|p| plane.signed_distance(p)).collect();
    for i in 0..n {
        let j = (i + 1) % n;
        let (p, q) = (&polygon[i], &polygon[j]);
        let (dp, dq) = (distances[i], distances[j]);
        if dp <= tolerance {
            out.push(*p);
        }
        if (dp > tolerance && dq < -tolerance) || (dp < -tolerance && dq > tolerance) {
            out.push(Plane::segment_crossing(p, q, dp, dq));
        }
    }
    remove_near_duplicates(&mut out, tolerance);
    out
}

/// Drop consecutive (cyclic) corners closer than `tolerance`.
pub fn remove_near_duplicates(points: &mut Polygon, tolerance: f64) {
    let tol2 = tolerance * tolerance;
    points.dedup_by(|b, a| (*b - *a).norm_squared() <= tol2);
    while points.len() > 1 {
        let (first, last) = (points[0], points[points.len() - 1]);
        if (first - last).norm_squared() <= tol2 {
            points.pop();
        } else {
            break;
        }
    }
}

/// Sort corners of a convex planar point set counter-clockwise around `normal`.
pub fn order_around_normal(points: &mut [Point3<f64>], normal: &Vector3<f64>) {
    if points.len() < 3 {
        return;
    }
    let center = vertex_mean(points);
    let (u, v) = in_plane_basis(normal);
    points.sort_by(|a, b| {
        let da = a - center;
        let db = b - center;
        let angle_a = da.dot(&v).atan2(da.dot(&u));
        let angle_b = db.dot(&v).atan2(db.dot(&u));
        angle_a.total_cmp(&angle_b)
    });
}

/// Intersection of a convex polygon with a convex clip polygon in (nearly)
/// the same plane.
///
/// `subject` is clipped against the in-plane edge half-spaces of `clip`.
#[must_use]
pub fn convex_overlap(subject: &[Point3<f64>], clip: &[Point3<f64>], tolerance: f64) -> Polygon {
    let mut out: Polygon = subject.iter().copied().collect();
    let Some(normal) = unit_normal(clip) else {
        return Polygon::new();
    };
    let n = clip.len();
    for i in 0..n {
        if out.len() < 3 {
            return Polygon::new();
        }
        let p = clip[i];
        let q = clip[(i + 1) % n];
        let edge = q - p;
        // Outward in-plane normal of a counter-clockwise edge.
        let outward = edge.cross(&normal);
        let Some(edge_plane) = Plane::from_normal_and_point(&outward, &p) else {
            continue;
        };
        out = clip_to_back(&out, &edge_plane, tolerance);
    }
    if out.len() < 3 {
        Polygon::new()
    } else {
        out
    }
}

/// Triangle fan `(p0, p_i, p_{i+1})` of a convex polygon.
pub fn fan_triangles(points: &[Point3<f64>]) -> impl Iterator<Item = [Point3<f64>; 3]> + '_ {
    let origin = points.first().copied().unwrap_or_else(Point3::origin);
    points
        .get(1..)
        .unwrap_or_default()
        .windows(2)
        .map(move |pair| [origin, pair[0], pair[1]])
}

/// Whether every corner of `points` lies within `tolerance` of `plane`.
#[must_use]
pub fn lies_in_plane(points: &[Point3<f64>], plane: &Plane, tolerance: f64) -> bool {
    points
        .iter()
        .all(|p| plane.signed_distance(p).abs() <= tolerance)
}
