//! Cutter surface meshes.
//!
//! A [`MeshHandle`] owns the nodes and sides of one cut mesh. Several cut
//! meshes can cut the same background mesh; side ids are unique across all of
//! them.

use nalgebra::Point3;

use crate::core::collections::{FastHashMap, SmallBuffer};
use crate::core::mesh::{MeshError, check_finite, check_node_input};
use crate::core::node::{NodeId, ShadowNode};
use crate::core::options::QuadSplit;
use crate::core::side::{CutTriangle, Side, SideId};
use crate::geometry::polygon;
use crate::geometry::predicates::bounding_box;
use crate::geometry::shape::CellShape;

/// One cutter surface mesh.
#[derive(Clone, Debug)]
pub struct MeshHandle {
    index: usize,
    nodes: FastHashMap<NodeId, Point3<f64>>,
    sides: FastHashMap<SideId, Side>,
    side_order: Vec<SideId>,
    shadows: Vec<ShadowNode>,
    next_shadow: NodeId,
}

impl MeshHandle {
    /// Empty cut mesh with the given index.
    #[must_use]
    pub fn new(index: usize) -> Self {
        Self {
            index,
            nodes: FastHashMap::default(),
            sides: FastHashMap::default(),
            side_order: Vec::new(),
            shadows: Vec::new(),
            next_shadow: -1,
        }
    }

    /// Index of the cut mesh.
    #[must_use]
    pub const fn index(&self) -> usize {
        self.index
    }

    /// Add a side. Coordinates of known nodes are left unchanged.
    ///
    /// `Quad8` sides get a shadow centre node appended to their node list.
    ///
    /// # Errors
    ///
    /// Returns [`MeshError::DuplicateSide`], [`MeshError::Shape`] for volume
    /// shapes or wrong node counts, [`MeshError::CoordinateCountMismatch`],
    /// [`MeshError::NegativeNodeId`], [`MeshError::NonFiniteCoordinates`] and
    /// [`MeshError::DegenerateSide`] when the corners span no area.
    pub fn add_side(
        &mut self,
        id: SideId,
        nodes: &[NodeId],
        coords: &[Point3<f64>],
        shape: CellShape,
    ) -> Result<&Side, MeshError> {
        if self.sides.contains_key(&id) {
            return Err(MeshError::DuplicateSide { side: id });
        }
        shape.check_side_shape()?;
        shape.check_node_count(nodes.len())?;
        check_node_input(nodes, coords)?;
        let corners: SmallBuffer<Point3<f64>, 4> = nodes
            .iter()
            .zip(coords)
            .take(shape.num_corners())
            .map(|(nid, &x)| self.nodes.get(nid).copied().unwrap_or(x))
            .collect();
        if spans_no_area(&corners) {
            tracing::warn!(side = id, ?shape, "rejecting cutter side without area");
            return Err(MeshError::DegenerateSide {
                side: id,
                area: polygon::area(&corners),
            });
        }
        for (&nid, &x) in nodes.iter().zip(coords) {
            self.nodes.entry(nid).or_insert(x);
        }

        let mut node_list = nodes.to_vec();
        if shape == CellShape::Quad8 {
            let shadow = ShadowNode {
                id: self.next_shadow,
                corners: nodes[..4].iter().copied().collect(),
                mids: nodes[4..].iter().copied().collect(),
                mid_weight: 0.5,
            };
            self.next_shadow -= 1;
            let centre = shadow
                .coords(|n| self.nodes.get(&n).copied())
                .unwrap_or_else(Point3::origin);
            self.nodes.insert(shadow.id, centre);
            node_list.push(shadow.id);
            self.shadows.push(shadow);
        }

        self.side_order.push(id);
        Ok(self.sides.entry(id).or_insert_with(|| Side::new(id, shape, node_list)))
    }

    /// Side by id.
    #[must_use]
    pub fn side(&self, id: SideId) -> Option<&Side> {
        self.sides.get(&id)
    }

    /// Sides in insertion order.
    pub fn sides(&self) -> impl Iterator<Item = &Side> {
        self.side_order.iter().filter_map(|id| self.sides.get(id))
    }

    /// Number of sides.
    #[must_use]
    pub fn num_sides(&self) -> usize {
        self.sides.len()
    }

    /// Coordinates of a node (shadow centres included).
    #[must_use]
    pub fn node_coords(&self, id: NodeId) -> Option<&Point3<f64>> {
        self.nodes.get(&id)
    }

    pub(crate) const fn coords(&self) -> &FastHashMap<NodeId, Point3<f64>> {
        &self.nodes
    }

    /// Move a node.
    ///
    /// # Errors
    ///
    /// Returns [`MeshError::UnknownNode`] if the node does not exist and
    /// [`MeshError::NonFiniteCoordinates`] for NaN or infinite coordinates.
    pub fn update_node(&mut self, id: NodeId, coords: Point3<f64>) -> Result<(), MeshError> {
        let node = self.nodes.get_mut(&id).ok_or(MeshError::UnknownNode { node: id })?;
        check_finite(id, &coords)?;
        *node = coords;
        Ok(())
    }

    pub(crate) fn update_shadow_coords(&mut self) {
        for shadow in &self.shadows {
            if let Some(centre) = shadow.coords(|n| self.nodes.get(&n).copied()) {
                self.nodes.insert(shadow.id, centre);
            }
        }
    }

    /// Cutting triangles of all sides.
    #[must_use]
    pub fn triangles(&self, quad_split: QuadSplit) -> Vec<CutTriangle> {
        self.sides()
            .flat_map(|side| side.triangles(self.index, &self.nodes, quad_split))
            .collect()
    }

    /// Axis-aligned bounds of the nodes.
    #[must_use]
    pub fn bounds(&self) -> Option<(Point3<f64>, Point3<f64>)> {
        bounding_box(self.nodes.values())
    }
}

/// Corners with zero area relative to their extent.
fn spans_no_area(corners: &[Point3<f64>]) -> bool {
    let Some(first) = corners.first() else {
        return true;
    };
    let twice_area = 2.0 * polygon::area(corners);
    let scale = corners.iter().map(|p| (p - first).norm_squared()).fold(0.0, f64::max);
    !(twice_area * twice_area > 1e-28 * scale * scale)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_quad8_side_gets_shadow_centre() {
        let mut handle = MeshHandle::new(0);
        let coords: Vec<Point3<f64>> = [
            [0.0, 0.0],
            [2.0, 0.0],
            [2.0, 2.0],
            [0.0, 2.0],
            [1.0, 0.0],
            [2.0, 1.0],
            [1.0, 2.0],
            [0.0, 1.0],
        ]
        .iter()
        .map(|c| Point3::new(c[0], c[1], 0.5))
        .collect();
        let side = handle
            .add_side(4, &[1, 2, 3, 4, 5, 6, 7, 8], &coords, CellShape::Quad8)
            .unwrap();
        assert_eq!(side.nodes().len(), 9);
        assert_eq!(side.nodes()[8], -1);
        assert_eq!(handle.node_coords(-1), Some(&Point3::new(1.0, 1.0, 0.5)));

        let tris = handle.triangles(QuadSplit::Diagonal);
        assert_eq!(tris.len(), 8);
        let area: f64 = tris.iter().map(|t| t.area).sum();
        assert_relative_eq!(area, 4.0, epsilon = 1e-12);

        // Lifting an edge node moves the centre.
        handle.update_node(5, Point3::new(1.0, 0.0, 1.5)).unwrap();
        handle.update_shadow_coords();
        assert_relative_eq!(handle.node_coords(-1).unwrap().z, 1.0, epsilon = 1e-14);
    }

    #[test]
    fn test_side_errors() {
        let mut handle = MeshHandle::new(1);
        let tri = [Point3::origin(), Point3::new(1.0, 0.0, 0.0), Point3::new(0.0, 1.0, 0.0)];
        handle.add_side(1, &[1, 2, 3], &tri, CellShape::Tri3).unwrap();
        assert!(matches!(
            handle.add_side(1, &[1, 2, 3], &tri, CellShape::Tri3),
            Err(MeshError::DuplicateSide { side: 1 })
        ));
        assert!(matches!(
            handle.add_side(2, &[1, 2, 3], &tri, CellShape::Tet4),
            Err(MeshError::Shape(_))
        ));
        assert!(matches!(
            handle.add_side(3, &[1, 2, 3], &tri[..2], CellShape::Tri3),
            Err(MeshError::CoordinateCountMismatch { nodes: 3, coords: 2 })
        ));
        let collinear = [Point3::origin(), Point3::new(1.0, 1.0, 0.0), Point3::new(2.0, 2.0, 0.0)];
        assert!(matches!(
            handle.add_side(4, &[7, 8, 9], &collinear, CellShape::Tri3),
            Err(MeshError::DegenerateSide { side: 4, .. })
        ));
        // Known nodes keep their coordinates, so this quad folds onto a line.
        let folded = [
            Point3::new(0.0, 1.0, 0.0),
            Point3::new(1.0, 1.0, 0.0),
            Point3::new(2.0, 0.0, 0.0),
            Point3::new(3.0, 0.0, 0.0),
        ];
        assert!(matches!(
            handle.add_side(5, &[1, 2, 10, 11], &folded, CellShape::Quad4),
            Err(MeshError::DegenerateSide { side: 5, .. })
        ));
        assert!(matches!(
            handle.add_side(6, &[1, 2, 3], &[tri[0], tri[1], Point3::new(f64::NAN, 0.0, 0.0)], CellShape::Tri3),
            Err(MeshError::NonFiniteCoordinates { node: 3, .. })
        ));
        assert!(matches!(
            handle.update_node(2, Point3::new(0.0, f64::NEG_INFINITY, 0.0)),
            Err(MeshError::NonFiniteCoordinates { node: 2, .. })
        ));
        assert!(handle.node_coords(7).is_none());
        assert_eq!(handle.num_sides(), 1);
        let (min, max) = handle.bounds().unwrap();
        assert_eq!((min, max), (Point3::origin(), Point3::new(1.0, 1.0, 0.0)));
    }
}
