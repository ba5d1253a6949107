//! Splitting the convex pieces of one element by the cutter planes.
//!
//! 1. Cutter triangles whose bounding box overlaps the element are tested
//!    against every piece by clipping them to the piece's half-spaces; a
//!    non-empty remainder (a touching point is enough) makes them relevant.
//! 2. The planes of the relevant triangles are collected, merging coincident
//!    planes (in either orientation) into one cut plane.
//! 3. Every piece is split by every cut plane.

use nalgebra::Point3;

use crate::core::collections::SmallBuffer;
use crate::core::point_pool::PointPool;
use crate::core::polyhedron::{ConvexPiece, CrossingCache, SplitTolerances};
use crate::core::side::CutTriangle;
use crate::geometry::intersection::clip_to_halfspaces;
use crate::geometry::plane::Plane;
use crate::geometry::polygon;
use crate::geometry::predicates::boxes_overlap;

/// A plane cutting an element, with the triangles lying in it.
#[derive(Clone, Debug, PartialEq)]
pub struct CutPlane {
    /// Plane (orientation of the first triangle).
    pub plane: Plane,
    /// Indices of the relevant triangles in this plane.
    pub triangles: SmallBuffer<usize, 8>,
}

/// Outward face planes of a piece; the piece is the intersection of their
/// back half-spaces.
fn face_planes(piece: &ConvexPiece, pool: &PointPool) -> SmallBuffer<Plane, 8> {
    piece
        .faces()
        .iter()
        .filter_map(|face| {
            let coords = ConvexPiece::face_coords(face, pool);
            let normal = polygon::unit_normal(&coords)?;
            Plane::from_normal_and_point(&normal, coords.first()?)
        })
        .collect()
}

/// Indices of the `candidates` that intersect or touch at least one piece.
pub fn relevant_triangles(
    pieces: &[ConvexPiece],
    pool: &PointPool,
    bounds: &(Point3<f64>, Point3<f64>),
    candidates: impl IntoIterator<Item = usize>,
    triangles: &[CutTriangle],
    tolerance: f64,
) -> Vec<usize> {
    let planes: Vec<SmallBuffer<Plane, 8>> = pieces.iter().map(|p| face_planes(p, pool)).collect();
    candidates
        .into_iter()
        .filter(|&t| {
            let Some(tri) = triangles.get(t) else {
                return false;
            };
            boxes_overlap(&tri.bounds, bounds, tolerance)
                && planes
                    .iter()
                    .any(|p| !clip_to_halfspaces(&tri.points, p, tolerance).is_empty())
        })
        .collect()
}

/// Group the relevant triangles by their supporting plane.
#[must_use]
pub fn collect_planes(relevant: &[usize], triangles: &[CutTriangle], tolerance: f64) -> Vec<CutPlane> {
    let mut planes: Vec<CutPlane> = Vec::new();
    for &t in relevant {
        let Some(tri) = triangles.get(t) else {
            continue;
        };
        match planes
            .iter_mut()
            .find(|c| c.plane.coincides_with(&tri.plane, tolerance))
        {
            Some(existing) => existing.triangles.push(t),
            None => planes.push(CutPlane {
                plane: tri.plane,
                triangles: std::iter::once(t).collect(),
            }),
        }
    }
    planes
}

/// Split every piece by every plane.
pub fn split_by_planes(
    mut pieces: Vec<ConvexPiece>,
    planes: &[CutPlane],
    pool: &mut PointPool,
    tolerances: SplitTolerances,
) -> Vec<ConvexPiece> {
    let mut cache = CrossingCache::default();
    for (index, cut) in planes.iter().enumerate() {
        let mut next = Vec::with_capacity(pieces.len() * 2);
        for piece in &pieces {
            let split = piece.split(&cut.plane, index, pool, &mut cache, tolerances);
            next.extend(split.back);
            next.extend(split.front);
        }
        pieces = next;
    }
    tracing::trace!(planes = planes.len(), pieces = pieces.len(), "element pieces split");
    pieces
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::polyhedron::FaceTag;
    use approx::assert_relative_eq;

    fn tet(pool: &mut PointPool) -> ConvexPiece {
        let keys = [
            pool.get_or_insert(Point3::new(0.0, 0.0, 0.0)),
            pool.get_or_insert(Point3::new(1.0, 0.0, 0.0)),
            pool.get_or_insert(Point3::new(0.0, 1.0, 0.0)),
            pool.get_or_insert(Point3::new(0.0, 0.0, 1.0)),
        ];
        ConvexPiece::from_tet(keys, [FaceTag::Internal; 4], pool, 0.0).unwrap()
    }

    fn tri(points: [[f64; 3]; 3]) -> CutTriangle {
        CutTriangle::new(1, 0, points.map(|p| Point3::new(p[0], p[1], p[2]))).unwrap()
    }

    #[test]
    fn test_relevant_triangles_include_touching_and_skip_distant() {
        let mut pool = PointPool::new(1e-10);
        let piece = tet(&mut pool);
        let triangles = vec![
            // crosses the tet
            tri([[-1.0, -1.0, 0.2], [2.0, -1.0, 0.2], [-1.0, 2.0, 0.2]]),
            // touches the corner (1, 0, 0)
            tri([[1.0, 0.0, 0.0], [2.0, 0.0, 0.0], [1.0, 1.0, 0.0]]),
            // bounding boxes overlap but the triangle misses the tet
            tri([[1.0, 1.0, 0.5], [0.6, 1.0, 0.5], [1.0, 0.6, 0.5]]),
        ];
        let bounds = (Point3::origin(), Point3::new(1.0, 1.0, 1.0));
        let relevant = relevant_triangles(std::slice::from_ref(&piece), &pool, &bounds, 0..3, &triangles, 1e-10);
        assert_eq!(relevant, vec![0, 1]);
    }

    #[test]
    fn test_coincident_planes_are_merged() {
        let triangles = vec![
            tri([[0.0, 0.0, 0.5], [1.0, 0.0, 0.5], [0.0, 1.0, 0.5]]),
            tri([[1.0, 0.0, 0.5], [0.0, 1.0, 0.5], [1.0, 1.0, 0.5]]),
            // same plane, opposite orientation
            tri([[0.0, 0.0, 0.5], [0.0, 1.0, 0.5], [1.0, 0.0, 0.5]]),
            tri([[0.5, 0.0, 0.0], [0.5, 1.0, 0.0], [0.5, 0.0, 1.0]]),
        ];
        let planes = collect_planes(&[0, 1, 2, 3], &triangles, 1e-10);
        assert_eq!(planes.len(), 2);
        assert_eq!(planes[0].triangles.as_slice(), &[0, 1, 2]);
        assert_eq!(planes[1].triangles.as_slice(), &[3]);
    }

    #[test]
    fn test_split_by_planes_conserves_volume() {
        let mut pool = PointPool::new(1e-10);
        let piece = tet(&mut pool);
        let triangles = vec![
            tri([[0.0, 0.0, 0.2], [1.0, 0.0, 0.2], [0.0, 1.0, 0.2]]),
            tri([[0.3, 0.0, 0.0], [0.3, 1.0, 0.0], [0.3, 0.0, 1.0]]),
        ];
        let planes = collect_planes(&[0, 1], &triangles, 1e-10);
        let tolerances = SplitTolerances {
            distance: 1e-10,
            volume: 1e-14,
        };
        let pieces = split_by_planes(vec![piece], &planes, &mut pool, tolerances);
        assert_eq!(pieces.len(), 4);
        let volume: f64 = pieces.iter().map(ConvexPiece::volume).sum();
        assert_relative_eq!(volume, 1.0 / 6.0, epsilon = 1e-14);
        assert!(pieces.iter().all(ConvexPiece::is_closed));
    }
}
