//! Quadrature on cut volume cells and boundary cells.
//!
//! Two strategies are available for volume cells (see
//! [`IntegrationMode`](crate::core::options::IntegrationMode)):
//!
//! - **Tessellation**: every convex piece of the cell is fanned into `Tet4`
//!   integration cells, each carrying a mapped tetrahedron rule.
//! - **Direct divergence**: the volume integral is rewritten as a surface
//!   integral over the cell facets. For every facet quadrature point a 1D
//!   Gauss–Legendre rule along `x` runs from the reference plane `x = x0` to
//!   the point, giving volume points whose weights carry the facet normal.
//!
//! Boundary cells get triangle rules scaled by their area.

use nalgebra::Point3;
use serde::{Deserialize, Serialize};

use crate::core::node::Position;
use crate::core::point_pool::PointPool;
use crate::core::polyhedron::ConvexPiece;
use crate::geometry::polygon;
use crate::geometry::quadrature::{
    QuadratureError, gauss_legendre, line_points_for_degree, tet_rule, triangle_rule,
};
use crate::geometry::shape::CellShape;

/// Normal components below this magnitude contribute nothing to the
/// divergence rule.
const TINY_NORMAL: f64 = 1e-14;

/// A quadrature point in physical coordinates.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct IntegrationPoint {
    /// Physical coordinates.
    pub coords: Point3<f64>,
    /// Weight (includes the Jacobian of the mapping).
    pub weight: f64,
}

/// A tetrahedron of a tessellated volume cell.
#[derive(Clone, Debug, PartialEq)]
pub struct IntegrationCell {
    /// Corners with positive orientation.
    pub points: [Point3<f64>; 4],
    /// Volume.
    pub volume: f64,
    /// Position of the owning volume cell.
    pub position: Position,
}

impl IntegrationCell {
    /// Shape of the cell (always `Tet4`).
    #[must_use]
    pub const fn shape(&self) -> CellShape {
        CellShape::Tet4
    }
}

/// Fan the pieces into positively oriented tetrahedra.
pub(crate) fn tessellate(pieces: &[ConvexPiece], pool: &PointPool, position: Position) -> Vec<IntegrationCell> {
    let mut cells = Vec::new();
    for piece in pieces {
        let apex = piece.centroid(pool);
        for face in piece.faces() {
            let coords = ConvexPiece::face_coords(face, pool);
            for [a, b, c] in polygon::fan_triangles(&coords) {
                let volume = (a - apex).dot(&(b - apex).cross(&(c - apex))) / 6.0;
                if volume <= f64::EPSILON * piece.volume() {
                    continue;
                }
                cells.push(IntegrationCell {
                    points: [apex, a, b, c],
                    volume,
                    position,
                });
            }
        }
    }
    cells
}

/// Map the reference tetrahedron rule of `degree` onto every integration cell.
///
/// # Errors
///
/// Returns [`QuadratureError`] when no rule of the requested degree exists.
pub fn tessellation_rule(cells: &[IntegrationCell], degree: usize) -> Result<Vec<IntegrationPoint>, QuadratureError> {
    let rule = tet_rule(degree)?;
    let mut points = Vec::with_capacity(rule.len() * cells.len());
    for cell in cells {
        let [p0, p1, p2, p3] = cell.points;
        let (e1, e2, e3) = (p1 - p0, p2 - p0, p3 - p0);
        for gp in &rule {
            let [r, s, t] = gp.coords;
            points.push(IntegrationPoint {
                coords: p0 + e1 * r + e2 * s + e3 * t,
                weight: gp.weight * 6.0 * cell.volume,
            });
        }
    }
    Ok(points)
}

/// Triangle rule of `degree` mapped onto `tri`, weights scaled by its area.
///
/// # Errors
///
/// Returns [`QuadratureError`] when no rule of the requested degree exists.
pub fn triangle_points(tri: &[Point3<f64>; 3], degree: usize) -> Result<Vec<IntegrationPoint>, QuadratureError> {
    let rule = triangle_rule(degree)?;
    let [a, b, c] = *tri;
    let area = (b - a).cross(&(c - a)).norm() * 0.5;
    Ok(rule
        .iter()
        .map(|gp| IntegrationPoint {
            coords: a + (b - a) * gp.coords[0] + (c - a) * gp.coords[1],
            weight: gp.weight * 2.0 * area,
        })
        .collect())
}

/// Direct divergence rule over a closed set of outward-oriented convex
/// polygons, integrating polynomials of `degree` exactly.
///
/// `x0` is the reference plane; any value works, the minimum `x` of the cell
/// keeps all line segments inside its bounding box.
///
/// # Errors
///
/// Returns [`QuadratureError`] when no rule of the requested degree exists.
pub fn direct_divergence_rule<'a, I>(facets: I, x0: f64, degree: usize) -> Result<Vec<IntegrationPoint>, QuadratureError>
where
    I: IntoIterator<Item = &'a [Point3<f64>]>,
{
    let line = gauss_legendre(line_points_for_degree(degree))?;
    let surface_degree = degree + 1;
    let mut points = Vec::new();
    for facet in facets {
        let Some(normal) = polygon::unit_normal(facet) else {
            continue;
        };
        if normal.x.abs() <= TINY_NORMAL {
            continue;
        }
        for tri in polygon::fan_triangles(facet) {
            for fp in triangle_points(&tri, surface_degree)? {
                let length = fp.coords.x - x0;
                for &(eta, omega) in &line {
                    let s = x0 + length * (eta + 1.0) * 0.5;
                    points.push(IntegrationPoint {
                        coords: Point3::new(s, fp.coords.y, fp.coords.z),
                        weight: fp.weight * normal.x * omega * length * 0.5,
                    });
                }
            }
        }
    }
    Ok(points)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::polyhedron::FaceTag;
    use crate::geometry::polygon::Polygon;
    use approx::assert_relative_eq;

    fn unit_cube_faces() -> Vec<Polygon> {
        let p = |x: f64, y: f64, z: f64| Point3::new(x, y, z);
        let quads = [
            [p(0., 0., 0.), p(0., 1., 0.), p(1., 1., 0.), p(1., 0., 0.)],
            [p(0., 0., 1.), p(1., 0., 1.), p(1., 1., 1.), p(0., 1., 1.)],
            [p(0., 0., 0.), p(1., 0., 0.), p(1., 0., 1.), p(0., 0., 1.)],
            [p(0., 1., 0.), p(0., 1., 1.), p(1., 1., 1.), p(1., 1., 0.)],
            [p(0., 0., 0.), p(0., 0., 1.), p(0., 1., 1.), p(0., 1., 0.)],
            [p(1., 0., 0.), p(1., 1., 0.), p(1., 1., 1.), p(1., 0., 1.)],
        ];
        quads.iter().map(|q| q.iter().copied().collect()).collect()
    }

    fn integrate(points: &[IntegrationPoint], f: impl Fn(&Point3<f64>) -> f64) -> f64 {
        points.iter().map(|p| p.weight * f(&p.coords)).sum()
    }

    #[test]
    fn test_direct_divergence_integrates_polynomials_on_cube() {
        let faces = unit_cube_faces();
        let rule = direct_divergence_rule(faces.iter().map(|f| f.as_slice()), -0.5, 3).unwrap();
        assert_relative_eq!(integrate(&rule, |_| 1.0), 1.0, epsilon = 1e-12);
        assert_relative_eq!(integrate(&rule, |p| p.x), 0.5, epsilon = 1e-12);
        assert_relative_eq!(integrate(&rule, |p| p.x * p.y * p.z), 0.125, epsilon = 1e-12);
        assert_relative_eq!(integrate(&rule, |p| p.x.powi(2) * p.z), 1.0 / 6.0, epsilon = 1e-12);
    }

    #[test]
    fn test_tessellation_of_tet_piece() {
        let mut pool = PointPool::new(1e-10);
        let keys = [
            pool.get_or_insert(Point3::new(0.0, 0.0, 0.0)),
            pool.get_or_insert(Point3::new(2.0, 0.0, 0.0)),
            pool.get_or_insert(Point3::new(0.0, 2.0, 0.0)),
            pool.get_or_insert(Point3::new(0.0, 0.0, 2.0)),
        ];
        let piece = ConvexPiece::from_tet(keys, [FaceTag::Internal; 4], &pool, 0.0).unwrap();
        let cells = tessellate(std::slice::from_ref(&piece), &pool, Position::Outside);
        assert_eq!(cells.len(), 4);
        assert!(cells.iter().all(|c| c.shape() == CellShape::Tet4 && c.position == Position::Outside));
        let volume: f64 = cells.iter().map(|c| c.volume).sum();
        assert_relative_eq!(volume, 8.0 / 6.0, epsilon = 1e-13);

        let rule = tessellation_rule(&cells, 2).unwrap();
        assert_relative_eq!(integrate(&rule, |_| 1.0), 8.0 / 6.0, epsilon = 1e-12);
        // ∫ x over the tet = V · x̄ = (4/3)(1/2)
        assert_relative_eq!(integrate(&rule, |p| p.x), 2.0 / 3.0, epsilon = 1e-12);
        // ∫ x² = 2·(2^5)/5! = 8/15
        assert_relative_eq!(integrate(&rule, |p| p.x * p.x), 8.0 / 15.0, epsilon = 1e-12);
    }

    #[test]
    fn test_triangle_points_scale_with_area() {
        let tri = [
            Point3::new(0.0, 0.0, 1.0),
            Point3::new(3.0, 0.0, 1.0),
            Point3::new(0.0, 2.0, 1.0),
        ];
        let rule = triangle_points(&tri, 2).unwrap();
        assert_relative_eq!(integrate(&rule, |_| 1.0), 3.0, epsilon = 1e-13);
        assert_relative_eq!(integrate(&rule, |p| p.x), 3.0, epsilon = 1e-13);
        assert!(triangle_points(&tri, 99).is_err());
    }
}
