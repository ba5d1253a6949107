//! Intersection kernels: segments against cutter sides, triangles against
//! convex regions, and triangle pairs against each other.
//!
//! Every kernel distinguishes "no intersection" from a degenerate
//! (coincident/coplanar) configuration; neither case yields a point.

use nalgebra::{Matrix3, Point3, Vector3};

use crate::geometry::plane::{Plane, PlaneSide};
use crate::geometry::polygon::{self, Polygon};
use crate::geometry::predicates::point_triangle_distance;

const NEWTON_MAX_ITERATIONS: usize = 25;

/// Where a segment `p + t (q - p)` pierces a cutter side.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SegmentHit {
    /// Segment parameter in `[0, 1]`.
    pub t: f64,
    /// Intersection point.
    pub point: Point3<f64>,
    /// Local coordinates on the side (barycentric `(λ1, λ2)` for triangles,
    /// `(ξ, η)` for bilinear quads).
    pub local: [f64; 2],
}

/// Result of intersecting a segment with a cutter side.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum IntersectionOutcome {
    /// The segment misses the side.
    None,
    /// The segment pierces the side in a single point.
    Point(SegmentHit),
    /// The segment lies in the side's surface and overlaps it.
    Coincident,
}

impl IntersectionOutcome {
    /// The hit, if the outcome is a single point.
    #[must_use]
    pub const fn hit(&self) -> Option<&SegmentHit> {
        match self {
            Self::Point(hit) => Some(hit),
            Self::None | Self::Coincident => None,
        }
    }
}

/// Result of intersecting two triangles.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TriangleIntersection {
    /// Disjoint triangles.
    None,
    /// The triangles touch in a single point.
    Point(Point3<f64>),
    /// The triangles cross along a segment.
    Segment([Point3<f64>; 2]),
    /// The triangles are coplanar and overlap with positive area.
    Coplanar,
}

/// Clip a convex polygon to the intersection of the back half-spaces of
/// `planes`.
#[must_use]
pub fn clip_to_halfspaces(subject: &[Point3<f64>], planes: &[Plane], tolerance: f64) -> Polygon {
    let mut out: Polygon = subject.iter().copied().collect();
    for plane in planes {
        if out.is_empty() {
            break;
        }
        out = polygon::clip_to_back(&out, plane, tolerance);
    }
    out
}

/// Clip the segment `a`–`b`, lying in the plane of `tri`, to the triangle.
///
/// Returns `None` when the segment lies outside.
fn clip_segment_to_triangle(
    mut a: Point3<f64>,
    mut b: Point3<f64>,
    tri: &[Point3<f64>; 3],
    normal: &Vector3<f64>,
    tolerance: f64,
) -> Option<[Point3<f64>; 2]> {
    for i in 0..3 {
        let p = tri[i];
        let edge = tri[(i + 1) % 3] - p;
        let Some(edge_plane) = Plane::from_normal_and_point(&edge.cross(normal), &p) else {
            continue;
        };
        let (da, db) = (edge_plane.signed_distance(&a), edge_plane.signed_distance(&b));
        match (da > tolerance, db > tolerance) {
            (true, true) => return None,
            (true, false) if db < -tolerance => a = Plane::segment_crossing(&a, &b, da, db),
            (false, true) if da < -tolerance => b = Plane::segment_crossing(&a, &b, da, db),
            (true, false) => a = b,
            (false, true) => b = a,
            (false, false) => {}
        }
    }
    Some([a, b])
}

/// Intersection of the segment `p`–`q` with the triangle `tri`.
///
/// End points within `tolerance` of the triangle count as hits. A segment in
/// the triangle's plane that overlaps it is [`IntersectionOutcome::Coincident`].
#[must_use]
pub fn segment_triangle(
    p: &Point3<f64>,
    q: &Point3<f64>,
    tri: &[Point3<f64>; 3],
    tolerance: f64,
) -> IntersectionOutcome {
    let Some(plane) = Plane::from_points(&tri[0], &tri[1], &tri[2]) else {
        return IntersectionOutcome::None;
    };
    let dp = plane.signed_distance(p);
    let dq = plane.signed_distance(q);
    let t = match (plane.classify(p, tolerance), plane.classify(q, tolerance)) {
        (PlaneSide::ON, PlaneSide::ON) => {
            return if clip_segment_to_triangle(*p, *q, tri, &plane.normal, tolerance).is_some() {
                IntersectionOutcome::Coincident
            } else {
                IntersectionOutcome::None
            };
        }
        (PlaneSide::ON, _) => 0.0,
        (_, PlaneSide::ON) => 1.0,
        (a, b) if a == b => return IntersectionOutcome::None,
        _ => dp / (dp - dq),
    };
    let point = p + (q - p) * t;
    if point_triangle_distance(&point, &tri[0], &tri[1], &tri[2]) > tolerance {
        return IntersectionOutcome::None;
    }
    let local = barycentric(&point, tri);
    IntersectionOutcome::Point(SegmentHit { t, point, local })
}

/// Barycentric coordinates `(λ1, λ2)` of `p` projected onto `tri`.
#[must_use]
pub fn barycentric(p: &Point3<f64>, tri: &[Point3<f64>; 3]) -> [f64; 2] {
    let e1 = tri[1] - tri[0];
    let e2 = tri[2] - tri[0];
    let d = p - tri[0];
    let (a11, a12, a22) = (e1.dot(&e1), e1.dot(&e2), e2.dot(&e2));
    let (b1, b2) = (e1.dot(&d), e2.dot(&d));
    let det = a11 * a22 - a12 * a12;
    if det.abs() <= f64::MIN_POSITIVE {
        return [0.0, 0.0];
    }
    [(a22 * b1 - a12 * b2) / det, (a11 * b2 - a12 * b1) / det]
}

/// Point on the bilinear quad `corners` at local coordinates `(ξ, η)`, with
/// its two tangent vectors.
fn bilinear(corners: &[Point3<f64>; 4], xi: f64, eta: f64) -> (Point3<f64>, Vector3<f64>, Vector3<f64>) {
    const SIGNS: [(f64, f64); 4] = [(-1.0, -1.0), (1.0, -1.0), (1.0, 1.0), (-1.0, 1.0)];
    let mut x = Vector3::zeros();
    let mut dxi = Vector3::zeros();
    let mut deta = Vector3::zeros();
    for (corner, (sx, sy)) in corners.iter().zip(SIGNS) {
        let fx = sx.mul_add(xi, 1.0);
        let fy = sy.mul_add(eta, 1.0);
        x += corner.coords * (0.25 * fx * fy);
        dxi += corner.coords * (0.25 * sx * fy);
        deta += corner.coords * (0.25 * fx * sy);
    }
    (Point3::from(x), dxi, deta)
}

/// Intersection of the segment `p`–`q` with a (possibly warped) bilinear quad.
///
/// Solves `X(ξ, η) = p + t (q − p)` by Newton iteration. If the Jacobian is
/// singular or the iteration does not settle, the quad is split along its 0–2
/// diagonal and the segment is tested against both triangles.
#[must_use]
pub fn segment_bilinear_quad(
    p: &Point3<f64>,
    q: &Point3<f64>,
    corners: &[Point3<f64>; 4],
    tolerance: f64,
) -> IntersectionOutcome {
    let direction = q - p;
    let length = direction.norm();
    if length <= tolerance {
        return IntersectionOutcome::None;
    }

    let magnitude = corners
        .iter()
        .map(|c| c.coords.amax())
        .fold(p.coords.amax().max(q.coords.amax()), f64::max);
    let converged = (1e-3 * tolerance).max(64.0 * f64::EPSILON * magnitude);

    let mut unknowns = Vector3::new(0.0, 0.0, 0.5);
    for _ in 0..NEWTON_MAX_ITERATIONS {
        let (x, dxi, deta) = bilinear(corners, unknowns.x, unknowns.y);
        let residual = x - (p + direction * unknowns.z);
        if residual.norm() <= converged {
            let local_tol = tolerance / length;
            let (xi, eta, t) = (unknowns.x, unknowns.y, unknowns.z);
            let inside = xi.abs() <= 1.0 + local_tol && eta.abs() <= 1.0 + local_tol;
            if inside && (-local_tol..=1.0 + local_tol).contains(&t) {
                return IntersectionOutcome::Point(SegmentHit {
                    t: t.clamp(0.0, 1.0),
                    point: x,
                    local: [xi.clamp(-1.0, 1.0), eta.clamp(-1.0, 1.0)],
                });
            }
            return IntersectionOutcome::None;
        }
        let jacobian = Matrix3::from_columns(&[dxi, deta, -direction]);
        let Some(step) = jacobian.lu().solve(&residual) else {
            break;
        };
        unknowns -= step;
        if !unknowns.iter().all(|v| v.is_finite()) || unknowns.x.abs() > 1e3 || unknowns.y.abs() > 1e3 {
            break;
        }
    }

    // Parallel or badly warped: test the two diagonal triangles.
    let mut outcome = IntersectionOutcome::None;
    for [a, b, c] in [[0, 1, 2], [0, 2, 3]] {
        match segment_triangle(p, q, &[corners[a], corners[b], corners[c]], tolerance) {
            IntersectionOutcome::Point(hit) => {
                let local = quad_local_from_point(corners, &hit.point);
                return IntersectionOutcome::Point(SegmentHit { local, ..hit });
            }
            IntersectionOutcome::Coincident => outcome = IntersectionOutcome::Coincident,
            IntersectionOutcome::None => {}
        }
    }
    outcome
}

/// Approximate `(ξ, η)` of a point on a quad by a few Gauss–Newton steps.
fn quad_local_from_point(corners: &[Point3<f64>; 4], x: &Point3<f64>) -> [f64; 2] {
    let (mut xi, mut eta) = (0.0, 0.0);
    for _ in 0..NEWTON_MAX_ITERATIONS {
        let (y, dxi, deta) = bilinear(corners, xi, eta);
        let r = y - x;
        let (a11, a12, a22) = (dxi.dot(&dxi), dxi.dot(&deta), deta.dot(&deta));
        let det = a11 * a22 - a12 * a12;
        if det.abs() <= f64::MIN_POSITIVE {
            break;
        }
        let (b1, b2) = (dxi.dot(&r), deta.dot(&r));
        let dx = (a22 * b1 - a12 * b2) / det;
        let de = (a11 * b2 - a12 * b1) / det;
        xi -= dx;
        eta -= de;
        if dx.abs() + de.abs() <= 1e-14 {
            break;
        }
    }
    [xi.clamp(-1.0, 1.0), eta.clamp(-1.0, 1.0)]
}

/// Intersection of two triangles.
#[must_use]
pub fn triangle_triangle(
    first: &[Point3<f64>; 3],
    second: &[Point3<f64>; 3],
    tolerance: f64,
) -> TriangleIntersection {
    let Some(plane) = Plane::from_points(&second[0], &second[1], &second[2]) else {
        return TriangleIntersection::None;
    };
    if polygon::lies_in_plane(first, &plane, tolerance) {
        let overlap = polygon::convex_overlap(first, second, tolerance);
        return if polygon::area(&overlap) > tolerance * tolerance {
            TriangleIntersection::Coplanar
        } else {
            TriangleIntersection::None
        };
    }

    // Part of `first` lying in the plane of `second`.
    let mut crossing: Polygon = Polygon::new();
    let distances = first.map(|p| plane.signed_distance(&p));
    for i in 0..3 {
        let j = (i + 1) % 3;
        let (di, dj) = (distances[i], distances[j]);
        if di.abs() <= tolerance {
            crossing.push(first[i]);
        } else if dj.abs() > tolerance && (di > 0.0) != (dj > 0.0) {
            crossing.push(Plane::segment_crossing(&first[i], &first[j], di, dj));
        }
    }
    polygon::remove_near_duplicates(&mut crossing, tolerance);
    let (a, b) = match crossing.as_slice() {
        [] => return TriangleIntersection::None,
        [single] => (*single, *single),
        [a, b, ..] => (*a, *b),
    };

    match clip_segment_to_triangle(a, b, second, &plane.normal, tolerance) {
        None => TriangleIntersection::None,
        Some([a, b]) if (b - a).norm() > tolerance => TriangleIntersection::Segment([a, b]),
        Some([a, _]) => {
            if point_triangle_distance(&a, &second[0], &second[1], &second[2]) <= tolerance {
                TriangleIntersection::Point(a)
            } else {
                TriangleIntersection::None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn unit_triangle(z: f64) -> [Point3<f64>; 3] {
        [
            Point3::new(0.0, 0.0, z),
            Point3::new(1.0, 0.0, z),
            Point3::new(0.0, 1.0, z),
        ]
    }

    #[test]
    fn test_segment_triangle_hit_and_miss() {
        let tri = unit_triangle(0.5);
        let outcome = segment_triangle(
            &Point3::new(0.2, 0.2, 0.0),
            &Point3::new(0.2, 0.2, 1.0),
            &tri,
            1e-12,
        );
        let hit = outcome.hit().unwrap();
        assert_relative_eq!(hit.t, 0.5, epsilon = 1e-14);
        assert_relative_eq!(hit.local[0], 0.2, epsilon = 1e-14);
        assert_relative_eq!(hit.local[1], 0.2, epsilon = 1e-14);

        // Outside the triangle.
        assert_eq!(
            segment_triangle(&Point3::new(0.8, 0.8, 0.0), &Point3::new(0.8, 0.8, 1.0), &tri, 1e-12),
            IntersectionOutcome::None
        );
        // End point touching the triangle.
        let touch = segment_triangle(&Point3::new(0.1, 0.1, 0.5), &Point3::new(0.1, 0.1, 2.0), &tri, 1e-12);
        assert_relative_eq!(touch.hit().unwrap().t, 0.0);
    }

    #[test]
    fn test_segment_triangle_coplanar_cases() {
        let tri = unit_triangle(0.5);
        assert_eq!(
            segment_triangle(&Point3::new(0.1, 0.1, 0.5), &Point3::new(0.2, 0.1, 0.5), &tri, 1e-12),
            IntersectionOutcome::Coincident
        );
        assert_eq!(
            segment_triangle(&Point3::new(2.0, 2.0, 0.5), &Point3::new(3.0, 2.0, 0.5), &tri, 1e-12),
            IntersectionOutcome::None
        );
    }

    #[test]
    fn test_segment_bilinear_quad_flat_and_warped() {
        let flat = [
            Point3::new(-1.0, -1.0, 0.0),
            Point3::new(1.0, -1.0, 0.0),
            Point3::new(1.0, 1.0, 0.0),
            Point3::new(-1.0, 1.0, 0.0),
        ];
        let outcome =
            segment_bilinear_quad(&Point3::new(0.5, -0.25, -1.0), &Point3::new(0.5, -0.25, 1.0), &flat, 1e-10);
        let hit = outcome.hit().unwrap();
        assert_relative_eq!(hit.t, 0.5, epsilon = 1e-10);
        assert_relative_eq!(hit.local[0], 0.5, epsilon = 1e-10);
        assert_relative_eq!(hit.local[1], -0.25, epsilon = 1e-10);

        let mut warped = flat;
        warped[2].z = 0.5;
        let outcome = segment_bilinear_quad(&Point3::new(0.0, 0.0, -1.0), &Point3::new(0.0, 0.0, 1.0), &warped, 1e-10);
        // The centre of a bilinear patch is the mean of its corners.
        assert_relative_eq!(outcome.hit().unwrap().point.z, 0.125, epsilon = 1e-10);

        assert_eq!(
            segment_bilinear_quad(&Point3::new(3.0, 0.0, -1.0), &Point3::new(3.0, 0.0, 1.0), &flat, 1e-10),
            IntersectionOutcome::None
        );
    }

    #[test]
    fn test_segment_in_quad_plane_is_coincident() {
        let flat = [
            Point3::new(-1.0, -1.0, 0.0),
            Point3::new(1.0, -1.0, 0.0),
            Point3::new(1.0, 1.0, 0.0),
            Point3::new(-1.0, 1.0, 0.0),
        ];
        assert_eq!(
            segment_bilinear_quad(&Point3::new(-0.5, 0.0, 0.0), &Point3::new(0.5, 0.0, 0.0), &flat, 1e-10),
            IntersectionOutcome::Coincident
        );
    }

    #[test]
    fn test_triangle_triangle_outcomes() {
        let horizontal = [
            Point3::new(-1.0, -1.0, 0.0),
            Point3::new(2.0, -1.0, 0.0),
            Point3::new(-1.0, 2.0, 0.0),
        ];
        let vertical = [
            Point3::new(0.0, 0.0, -1.0),
            Point3::new(0.0, 0.0, 1.0),
            Point3::new(0.0, 0.5, 0.0),
        ];
        let TriangleIntersection::Segment([a, b]) = triangle_triangle(&vertical, &horizontal, 1e-12) else {
            panic!("expected a segment");
        };
        assert_relative_eq!((b - a).norm(), 0.5, epsilon = 1e-12);

        assert_eq!(
            triangle_triangle(&unit_triangle(1.0), &horizontal, 1e-12),
            TriangleIntersection::None
        );
        assert_eq!(
            triangle_triangle(&unit_triangle(0.0), &horizontal, 1e-12),
            TriangleIntersection::Coplanar
        );

        let apex_down = [
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(1.0, 0.0, 1.0),
            Point3::new(0.0, 1.0, 1.0),
        ];
        assert_eq!(
            triangle_triangle(&apex_down, &horizontal, 1e-12),
            TriangleIntersection::Point(Point3::new(0.0, 0.0, 0.0))
        );
    }

    #[test]
    fn test_clip_to_halfspaces_box() {
        let planes = [
            Plane::from_normal_and_point(&Vector3::x(), &Point3::new(0.5, 0.0, 0.0)).unwrap(),
            Plane::from_normal_and_point(&Vector3::y(), &Point3::new(0.0, 0.5, 0.0)).unwrap(),
        ];
        let clipped = clip_to_halfspaces(&unit_triangle(0.0), &planes, 1e-12);
        assert_relative_eq!(polygon::area(&clipped), 0.25, epsilon = 1e-14);
    }
}
