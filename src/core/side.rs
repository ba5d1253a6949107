//! Cutter sides and the triangles they cut with.
//!
//! A cutter side is a surface element of a cut mesh. Quadratic sides are
//! split into linear sub-sides (`Tri6` into four `Tri3`, `Quad8`/`Quad9` into
//! four `Quad4`); linear sub-sides are then triangulated according to
//! [`QuadSplit`]. Triangles keep the right-hand orientation of their side, so
//! the side normal survives the decomposition.

use nalgebra::{Point3, Vector3};

use crate::core::collections::{FastHashMap, SmallBuffer};
use crate::core::node::NodeId;
use crate::core::options::QuadSplit;
use crate::geometry::intersection::{self, IntersectionOutcome};
use crate::geometry::plane::Plane;
use crate::geometry::polygon;
use crate::geometry::predicates::bounding_box;
use crate::geometry::shape::{CellShape, QUAD9_SUB_QUADS, TRI6_SUB_TRIS};

/// Global id of a cutter side.
pub type SideId = i32;

/// A linear piece of a cutter side (`Tri3` or `Quad4`).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LinearSide {
    /// Linear shape of the sub-side.
    pub shape: CellShape,
    /// Corner node ids.
    pub nodes: SmallBuffer<NodeId, 4>,
}

/// A cutting triangle derived from a cutter side.
#[derive(Clone, Debug, PartialEq)]
pub struct CutTriangle {
    /// Id of the side the triangle comes from.
    pub side_id: SideId,
    /// Index of the cut mesh owning the side.
    pub mesh_index: usize,
    /// Corners in the side's orientation.
    pub points: [Point3<f64>; 3],
    /// Supporting plane; its normal is the side normal.
    pub plane: Plane,
    /// Triangle area.
    pub area: f64,
    /// Axis-aligned bounds.
    pub bounds: (Point3<f64>, Point3<f64>),
}

impl CutTriangle {
    /// Build a triangle; `None` for collinear corners.
    #[must_use]
    pub fn new(side_id: SideId, mesh_index: usize, points: [Point3<f64>; 3]) -> Option<Self> {
        let plane = Plane::from_points(&points[0], &points[1], &points[2])?;
        let bounds = bounding_box(&points)?;
        Some(Self {
            side_id,
            mesh_index,
            area: polygon::area(&points),
            points,
            plane,
            bounds,
        })
    }

    /// Unit normal (side orientation).
    #[must_use]
    pub const fn normal(&self) -> &Vector3<f64> {
        &self.plane.normal
    }
}

/// A side of a cut mesh.
#[derive(Clone, Debug)]
pub struct Side {
    id: SideId,
    shape: CellShape,
    nodes: Vec<NodeId>,
    linear: Vec<LinearSide>,
}

impl Side {
    /// Create a side. For `Quad8` sides `nodes` must carry the shadow centre
    /// node as a ninth entry.
    pub(crate) fn new(id: SideId, shape: CellShape, nodes: Vec<NodeId>) -> Self {
        let linear = linear_sub_sides(shape, &nodes);
        Self {
            id,
            shape,
            nodes,
            linear,
        }
    }

    /// Side id.
    #[must_use]
    pub const fn id(&self) -> SideId {
        self.id
    }

    /// Shape as given by the caller.
    #[must_use]
    pub const fn shape(&self) -> CellShape {
        self.shape
    }

    /// Node ids (for `Quad8` including the shadow centre).
    #[must_use]
    pub fn nodes(&self) -> &[NodeId] {
        &self.nodes
    }

    /// Linear sub-sides.
    #[must_use]
    pub fn linear_sides(&self) -> &[LinearSide] {
        &self.linear
    }

    /// Cutting triangles of this side at the given node coordinates.
    pub(crate) fn triangles(
        &self,
        mesh_index: usize,
        coords: &FastHashMap<NodeId, Point3<f64>>,
        quad_split: QuadSplit,
    ) -> Vec<CutTriangle> {
        let mut out = Vec::new();
        for sub in &self.linear {
            let Some(corners) = corner_coords(&sub.nodes, coords) else {
                continue;
            };
            let mut push = |a: Point3<f64>, b: Point3<f64>, c: Point3<f64>| {
                if let Some(tri) = CutTriangle::new(self.id, mesh_index, [a, b, c]) {
                    out.push(tri);
                }
            };
            match (sub.shape, quad_split) {
                (CellShape::Quad4, QuadSplit::Diagonal) => {
                    push(corners[0], corners[1], corners[2]);
                    push(corners[0], corners[2], corners[3]);
                }
                (CellShape::Quad4, QuadSplit::CenterPoint) => {
                    let center = polygon::vertex_mean(&corners);
                    for i in 0..4 {
                        push(corners[i], corners[(i + 1) % 4], center);
                    }
                }
                _ => push(corners[0], corners[1], corners[2]),
            }
        }
        out
    }

    /// Intersect the segment `p`–`q` with every linear sub-side.
    ///
    /// Quads are intersected as bilinear surfaces.
    pub(crate) fn intersect_segment(
        &self,
        p: &Point3<f64>,
        q: &Point3<f64>,
        coords: &FastHashMap<NodeId, Point3<f64>>,
        tolerance: f64,
    ) -> SmallBuffer<IntersectionOutcome, 4> {
        let mut out = SmallBuffer::new();
        for sub in &self.linear {
            let Some(c) = corner_coords(&sub.nodes, coords) else {
                continue;
            };
            let outcome = if sub.shape == CellShape::Quad4 {
                intersection::segment_bilinear_quad(p, q, &[c[0], c[1], c[2], c[3]], tolerance)
            } else {
                intersection::segment_triangle(p, q, &[c[0], c[1], c[2]], tolerance)
            };
            if outcome != IntersectionOutcome::None {
                out.push(outcome);
            }
        }
        out
    }
}

fn corner_coords(
    nodes: &[NodeId],
    coords: &FastHashMap<NodeId, Point3<f64>>,
) -> Option<SmallBuffer<Point3<f64>, 4>> {
    nodes.iter().map(|n| coords.get(n).copied()).collect()
}

/// Linear sub-sides of a side with the given node list.
fn linear_sub_sides(shape: CellShape, nodes: &[NodeId]) -> Vec<LinearSide> {
    let pick = |shape: CellShape, indices: &[usize]| LinearSide {
        shape,
        nodes: indices.iter().map(|&i| nodes[i]).collect(),
    };
    match shape {
        CellShape::Tri6 => TRI6_SUB_TRIS
            .iter()
            .map(|t| pick(CellShape::Tri3, t))
            .collect(),
        CellShape::Quad8 | CellShape::Quad9 => QUAD9_SUB_QUADS
            .iter()
            .map(|q| pick(CellShape::Quad4, q))
            .collect(),
        CellShape::Tri3 => vec![pick(CellShape::Tri3, &[0, 1, 2])],
        _ => vec![pick(CellShape::Quad4, &[0, 1, 2, 3])],
    }
}
