//! The background mesh: nodes, element handles, edges and the arenas of the
//! entities produced by a cut.
//!
//! Linear elements are stored in one vector and referred to by index; user
//! elements are looked up by id through their [`ElementHandle`]. Quadratic
//! elements own several linear sub-elements. Serendipity `Hex20` elements get
//! shadow nodes (negative ids) for their face and body centres so that they
//! can be split like a `Hex27`; shadow face nodes are shared by neighbouring
//! elements.

use nalgebra::Point3;
use thiserror::Error;

use crate::core::boundary_cell::{BoundaryCell, BoundaryCellKey};
use crate::core::collections::{FastHashMap, SmallBuffer, StorageMap};
use crate::core::edge::{Edge, EdgeKey, edge_key};
use crate::core::element::{Element, ElementHandle, ElementId};
use crate::core::facet::{Facet, FacetKey};
use crate::core::node::{Node, NodeId, ShadowNode};
use crate::core::util::components::Adjacency;
use crate::core::validation::ValidationError;
use crate::core::volume_cell::{VolumeCell, VolumeCellKey};
use crate::geometry::quadrature::QuadratureError;
use crate::geometry::shape::{CellShape, HEX20_FACE_NODES, ShapeError, TET10_SUB_TETS, hex27_sub_hexes};

// =============================================================================
// ERRORS
// =============================================================================

/// Errors raised by mesh construction and the cut pipeline.
#[derive(Clone, Debug, Error, PartialEq)]
pub enum MeshError {
    /// An element with this id was already added.
    #[error("element {element} already exists")]
    DuplicateElement {
        /// Element id.
        element: ElementId,
    },
    /// A cutter side with this id was already added.
    #[error("cut side {side} already exists")]
    DuplicateSide {
        /// Side id.
        side: i32,
    },
    /// No node with this id exists.
    #[error("unknown node {node}")]
    UnknownNode {
        /// Node id.
        node: NodeId,
    },
    /// No element with this id exists.
    #[error("unknown element {element}")]
    UnknownElement {
        /// Element id.
        element: ElementId,
    },
    /// No cutter side with this id exists.
    #[error("unknown cut side {side}")]
    UnknownSide {
        /// Side id.
        side: i32,
    },
    /// No cut mesh with this index exists.
    #[error("unknown cut mesh {index} ({count} cut meshes)")]
    UnknownCutMesh {
        /// Requested index.
        index: usize,
        /// Number of cut meshes.
        count: usize,
    },
    /// Node ids and coordinates differ in length.
    #[error("{nodes} node ids but {coords} coordinates")]
    CoordinateCountMismatch {
        /// Number of node ids.
        nodes: usize,
        /// Number of coordinates.
        coords: usize,
    },
    /// Negative node ids are reserved for shadow nodes.
    #[error("node id {node} is negative; negative ids are reserved for shadow nodes")]
    NegativeNodeId {
        /// Node id.
        node: NodeId,
    },
    /// A coordinate is NaN or infinite.
    #[error("node {node} has non-finite coordinates [{x}, {y}, {z}]")]
    NonFiniteCoordinates {
        /// Node id.
        node: NodeId,
        /// x coordinate.
        x: f64,
        /// y coordinate.
        y: f64,
        /// z coordinate.
        z: f64,
    },
    /// The corners of a cutter side span no area.
    #[error("cut side {side} is degenerate (area {area:e})")]
    DegenerateSide {
        /// Side id.
        side: i32,
        /// Area of the corner polygon.
        area: f64,
    },
    /// Invalid shape or node count.
    #[error(transparent)]
    Shape(#[from] ShapeError),
    /// The element has (almost) no volume.
    #[error("element {element} is degenerate (volume {volume:e})")]
    DegenerateElement {
        /// Element id.
        element: ElementId,
        /// Computed volume.
        volume: f64,
    },
    /// Newton iteration for local coordinates failed.
    #[error("local coordinates in element {element} did not converge after {iterations} iterations")]
    LocalCoordinatesDidNotConverge {
        /// Element id.
        element: ElementId,
        /// Iterations performed.
        iterations: usize,
    },
    /// A post-cut consistency check failed.
    #[error(transparent)]
    Validation(#[from] ValidationError),
    /// A quadrature rule could not be built.
    #[error(transparent)]
    Quadrature(#[from] QuadratureError),
}

pub(crate) fn check_finite(node: NodeId, x: &Point3<f64>) -> Result<(), MeshError> {
    if x.iter().all(|c| c.is_finite()) {
        return Ok(());
    }
    Err(MeshError::NonFiniteCoordinates {
        node,
        x: x.x,
        y: x.y,
        z: x.z,
    })
}

/// Checks shared by background elements and cutter sides.
pub(crate) fn check_node_input(nodes: &[NodeId], coords: &[Point3<f64>]) -> Result<(), MeshError> {
    if coords.len() != nodes.len() {
        return Err(MeshError::CoordinateCountMismatch {
            nodes: nodes.len(),
            coords: coords.len(),
        });
    }
    for (&node, x) in nodes.iter().zip(coords) {
        if node < 0 {
            return Err(MeshError::NegativeNodeId { node });
        }
        check_finite(node, x)?;
    }
    Ok(())
}

// =============================================================================
// CUT ENTITIES
// =============================================================================

/// Arenas of the entities created by one cut.
#[derive(Clone, Debug)]
pub struct CutEntities {
    pub(crate) facets: StorageMap<FacetKey, Facet>,
    pub(crate) volume_cells: StorageMap<VolumeCellKey, VolumeCell>,
    pub(crate) boundary_cells: StorageMap<BoundaryCellKey, BoundaryCell>,
}

impl Default for CutEntities {
    fn default() -> Self {
        Self {
            facets: StorageMap::with_key(),
            volume_cells: StorageMap::with_key(),
            boundary_cells: StorageMap::with_key(),
        }
    }
}

impl CutEntities {
    fn clear(&mut self) {
        self.facets.clear();
        self.volume_cells.clear();
        self.boundary_cells.clear();
    }
}

// =============================================================================
// MESH
// =============================================================================

/// Background mesh.
#[derive(Clone, Debug)]
pub struct Mesh {
    pub(crate) nodes: FastHashMap<NodeId, Node>,
    pub(crate) elements: Vec<Element>,
    pub(crate) handles: FastHashMap<ElementId, ElementHandle>,
    pub(crate) handle_order: Vec<ElementId>,
    pub(crate) node_handles: FastHashMap<NodeId, SmallBuffer<ElementId, 8>>,
    pub(crate) edges: FastHashMap<EdgeKey, Edge>,
    pub(crate) entities: CutEntities,
    pub(crate) cell_adjacency: Adjacency<VolumeCellKey>,
    pub(crate) cell_sets: FastHashMap<ElementId, Vec<Vec<VolumeCellKey>>>,
    shadows: Vec<ShadowNode>,
    shadow_ids: FastHashMap<SmallBuffer<NodeId, 20>, NodeId>,
    next_shadow: NodeId,
}

impl Default for Mesh {
    fn default() -> Self {
        Self::new()
    }
}

impl Mesh {
    /// Empty mesh.
    #[must_use]
    pub fn new() -> Self {
        Self {
            nodes: FastHashMap::default(),
            elements: Vec::new(),
            handles: FastHashMap::default(),
            handle_order: Vec::new(),
            node_handles: FastHashMap::default(),
            edges: FastHashMap::default(),
            entities: CutEntities::default(),
            cell_adjacency: Adjacency::default(),
            cell_sets: FastHashMap::default(),
            shadows: Vec::new(),
            shadow_ids: FastHashMap::default(),
            next_shadow: -1,
        }
    }

    /// Add a user element.
    ///
    /// Nodes are created on first use; coordinates of known nodes are left
    /// unchanged (use `update_node` to move them).
    ///
    /// # Errors
    ///
    /// Returns [`MeshError::DuplicateElement`], [`MeshError::Shape`] for
    /// surface shapes or wrong node counts, and
    /// [`MeshError::CoordinateCountMismatch`], [`MeshError::NegativeNodeId`]
    /// and [`MeshError::NonFiniteCoordinates`].
    pub fn add_element(
        &mut self,
        id: ElementId,
        nodes: &[NodeId],
        coords: &[Point3<f64>],
        shape: CellShape,
    ) -> Result<(), MeshError> {
        if self.handles.contains_key(&id) {
            return Err(MeshError::DuplicateElement { element: id });
        }
        shape.check_element_shape()?;
        shape.check_node_count(nodes.len())?;
        check_node_input(nodes, coords)?;
        for (&nid, &x) in nodes.iter().zip(coords) {
            self.nodes.entry(nid).or_insert_with(|| Node::new(nid, x));
            let handles = self.node_handles.entry(nid).or_default();
            if !handles.contains(&id) {
                handles.push(id);
            }
        }

        let handle = match shape {
            CellShape::Tet10 => {
                let subs = TET10_SUB_TETS.iter().map(|t| t.map(|i| nodes[i]).to_vec());
                self.quadratic_handle(id, shape, nodes, CellShape::Tet4, subs)
            }
            CellShape::Hex27 => {
                let subs = hex27_sub_hexes().into_iter().map(|h| h.map(|i| nodes[i]).to_vec());
                self.quadratic_handle(id, shape, nodes, CellShape::Hex8, subs)
            }
            CellShape::Hex20 => {
                let full = self.complete_hex20(nodes);
                let subs = hex27_sub_hexes().into_iter().map(|h| h.map(|i| full[i]).to_vec());
                self.quadratic_handle(id, shape, nodes, CellShape::Hex8, subs)
            }
            _ => {
                let index = self.elements.len();
                self.elements.push(Element::new(id, shape, nodes, None));
                ElementHandle::Linear {
                    id,
                    shape,
                    nodes: nodes.to_vec(),
                    element: index,
                }
            }
        };
        for &index in handle.sub_elements() {
            self.register_edges(index);
        }
        self.handles.insert(id, handle);
        self.handle_order.push(id);
        Ok(())
    }

    fn quadratic_handle(
        &mut self,
        id: ElementId,
        shape: CellShape,
        nodes: &[NodeId],
        linear: CellShape,
        subs: impl Iterator<Item = Vec<NodeId>>,
    ) -> ElementHandle {
        let mut sub_elements = Vec::new();
        for (k, sub) in subs.enumerate() {
            sub_elements.push(self.elements.len());
            self.elements.push(Element::new(id, linear, &sub, Some(k)));
        }
        ElementHandle::Quadratic {
            id,
            shape,
            nodes: nodes.to_vec(),
            sub_elements,
        }
    }

    /// Hex27 node list of a hex20: the given nodes plus shadow face centres and
    /// a shadow body centre.
    fn complete_hex20(&mut self, nodes: &[NodeId]) -> Vec<NodeId> {
        let mut full = nodes.to_vec();
        for face in &HEX20_FACE_NODES {
            let corners = face[..4].iter().map(|&i| nodes[i]).collect();
            let mids = face[4..].iter().map(|&i| nodes[i]).collect();
            full.push(self.shadow_node(corners, mids, 0.5));
        }
        let corners = nodes[..8].iter().copied().collect();
        let mids = nodes[8..20].iter().copied().collect();
        full.push(self.shadow_node(corners, mids, 0.25));
        full
    }

    fn shadow_node(&mut self, corners: SmallBuffer<NodeId, 8>, mids: SmallBuffer<NodeId, 12>, mid_weight: f64) -> NodeId {
        let mut key: SmallBuffer<NodeId, 20> = corners.iter().chain(&mids).copied().collect();
        key.sort_unstable();
        if let Some(&id) = self.shadow_ids.get(&key) {
            return id;
        }
        let id = self.next_shadow;
        self.next_shadow -= 1;
        let shadow = ShadowNode {
            id,
            corners,
            mids,
            mid_weight,
        };
        let coords = shadow
            .coords(|n| self.nodes.get(&n).map(|node| *node.coords()))
            .unwrap_or_else(Point3::origin);
        self.nodes.insert(id, Node::new(id, coords));
        self.shadow_ids.insert(key, id);
        self.shadows.push(shadow);
        id
    }

    fn register_edges(&mut self, index: usize) {
        let Some(element) = self.elements.get(index) else {
            return;
        };
        for [a, b] in element.shape().edges() {
            let key = edge_key(element.nodes()[*a], element.nodes()[*b]);
            self.edges.entry(key).or_insert_with(|| Edge::new(key));
        }
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
        node.set_coords(coords);
        Ok(())
    }

    /// Recompute shadow node coordinates from their defining nodes.
    pub(crate) fn update_shadow_coords(&mut self) {
        for shadow in &self.shadows {
            let Some(coords) = shadow.coords(|n| self.nodes.get(&n).map(|node| *node.coords())) else {
                continue;
            };
            if let Some(node) = self.nodes.get_mut(&shadow.id) {
                node.set_coords(coords);
            }
        }
    }

    /// Discard everything derived by the last cut.
    pub(crate) fn reset_cut_state(&mut self) {
        for node in self.nodes.values_mut() {
            node.reset_cut_state();
        }
        for element in &mut self.elements {
            element.reset_cut_state();
        }
        for (&key, edge) in &mut self.edges {
            *edge = Edge::new(key);
        }
        self.entities.clear();
        self.cell_adjacency.clear();
        self.cell_sets.clear();
    }

    // -------------------------------------------------------------------------
    // Accessors
    // -------------------------------------------------------------------------

    /// Node by id (shadow nodes have negative ids).
    #[must_use]
    pub fn node(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(&id)
    }

    /// All nodes, in no particular order.
    pub fn nodes(&self) -> impl Iterator<Item = &Node> {
        self.nodes.values()
    }

    /// Number of nodes including shadow nodes.
    #[must_use]
    pub fn num_nodes(&self) -> usize {
        self.nodes.len()
    }

    /// User element by id.
    #[must_use]
    pub fn element_handle(&self, id: ElementId) -> Option<&ElementHandle> {
        self.handles.get(&id)
    }

    /// User elements in insertion order.
    pub fn element_handles(&self) -> impl Iterator<Item = &ElementHandle> {
        self.handle_order.iter().filter_map(|id| self.handles.get(id))
    }

    /// Linear elements (including sub-elements of quadratic handles).
    #[must_use]
    pub fn elements(&self) -> &[Element] {
        &self.elements
    }

    /// Edge between two nodes.
    #[must_use]
    pub fn edge(&self, a: NodeId, b: NodeId) -> Option<&Edge> {
        self.edges.get(&edge_key(a, b))
    }

    /// All corner edges.
    pub fn edges(&self) -> impl Iterator<Item = &Edge> {
        self.edges.values()
    }

    /// Facet by key.
    #[must_use]
    pub fn facet(&self, key: FacetKey) -> Option<&Facet> {
        self.entities.facets.get(key)
    }

    /// All facets.
    pub fn facets(&self) -> impl Iterator<Item = (FacetKey, &Facet)> {
        self.entities.facets.iter()
    }

    /// Volume cell by key.
    #[must_use]
    pub fn volume_cell(&self, key: VolumeCellKey) -> Option<&VolumeCell> {
        self.entities.volume_cells.get(key)
    }

    /// All volume cells.
    pub fn volume_cells(&self) -> impl Iterator<Item = (VolumeCellKey, &VolumeCell)> {
        self.entities.volume_cells.iter()
    }

    /// Boundary cell by key.
    #[must_use]
    pub fn boundary_cell(&self, key: BoundaryCellKey) -> Option<&BoundaryCell> {
        self.entities.boundary_cells.get(key)
    }

    /// All boundary cells.
    pub fn boundary_cells(&self) -> impl Iterator<Item = (BoundaryCellKey, &BoundaryCell)> {
        self.entities.boundary_cells.iter()
    }

    /// Connected groups of volume cells of a user element that share a
    /// position (computed with the nodal DOF sets).
    #[must_use]
    pub fn volume_cell_sets(&self, id: ElementId) -> Option<&[Vec<VolumeCellKey>]> {
        self.cell_sets.get(&id).map(Vec::as_slice)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hex_coords(offset: f64) -> Vec<Point3<f64>> {
        [
            [0.0, 0.0, 0.0],
            [1.0, 0.0, 0.0],
            [1.0, 1.0, 0.0],
            [0.0, 1.0, 0.0],
            [0.0, 0.0, 1.0],
            [1.0, 0.0, 1.0],
            [1.0, 1.0, 1.0],
            [0.0, 1.0, 1.0],
        ]
        .iter()
        .map(|c| Point3::new(c[0] + offset, c[1], c[2]))
        .collect()
    }

    /// Hex20 coordinates from the hex27 lattice.
    fn hex20_coords(offset: f64) -> Vec<Point3<f64>> {
        crate::geometry::shape::HEX27_LATTICE[..20]
            .iter()
            .map(|l| {
                #[allow(clippy::cast_precision_loss)]
                let c = l.map(|v| v as f64 * 0.5);
                Point3::new(c[0] + offset, c[1], c[2])
            })
            .collect()
    }

    #[test]
    fn test_add_linear_element_and_errors() {
        let mut mesh = Mesh::new();
        mesh.add_element(1, &[1, 2, 3, 4, 5, 6, 7, 8], &hex_coords(0.0), CellShape::Hex8)
            .unwrap();
        assert_eq!(mesh.elements().len(), 1);
        assert_eq!(mesh.edges().count(), 12);
        assert!(mesh.edge(2, 1).is_some());
        assert!(matches!(
            mesh.add_element(1, &[1, 2, 3, 4, 5, 6, 7, 8], &hex_coords(0.0), CellShape::Hex8),
            Err(MeshError::DuplicateElement { element: 1 })
        ));
        assert!(matches!(
            mesh.add_element(2, &[1, 2, 3], &hex_coords(0.0)[..3], CellShape::Tri3),
            Err(MeshError::Shape(ShapeError::Unsupported { .. }))
        ));
        assert!(matches!(
            mesh.add_element(3, &[1, 2, 3, 4], &hex_coords(0.0), CellShape::Tet4),
            Err(MeshError::CoordinateCountMismatch { nodes: 4, coords: 8 })
        ));
        assert!(matches!(mesh.update_node(42, Point3::origin()), Err(MeshError::UnknownNode { node: 42 })));
    }

    #[test]
    fn test_rejects_negative_ids_and_non_finite_coordinates() {
        let mut mesh = Mesh::new();
        let mut coords = hex_coords(0.0);
        assert!(matches!(
            mesh.add_element(1, &[1, 2, 3, 4, 5, 6, 7, -8], &coords, CellShape::Hex8),
            Err(MeshError::NegativeNodeId { node: -8 })
        ));
        coords[6].y = f64::NAN;
        assert!(matches!(
            mesh.add_element(1, &[1, 2, 3, 4, 5, 6, 7, 8], &coords, CellShape::Hex8),
            Err(MeshError::NonFiniteCoordinates { node: 7, .. })
        ));
        // Rejected input leaves nothing behind.
        assert_eq!(mesh.num_nodes(), 0);
        assert_eq!(mesh.elements().len(), 0);

        mesh.add_element(1, &[1, 2, 3, 4, 5, 6, 7, 8], &hex_coords(0.0), CellShape::Hex8)
            .unwrap();
        assert!(matches!(
            mesh.update_node(3, Point3::new(1.0, f64::INFINITY, 0.0)),
            Err(MeshError::NonFiniteCoordinates { node: 3, .. })
        ));
        assert_eq!(*mesh.node(3).unwrap().coords(), Point3::new(1.0, 1.0, 0.0));
    }

    #[test]
    fn test_shadow_ids_never_collide_with_user_nodes() {
        let mut mesh = Mesh::new();
        let nodes: Vec<NodeId> = (1..=20).collect();
        mesh.add_element(1, &nodes, &hex20_coords(0.0), CellShape::Hex20).unwrap();
        let shadows: Vec<NodeId> = mesh.nodes().filter(|n| n.is_shadow()).map(Node::id).collect();
        assert_eq!(shadows.len(), 7);
        assert!(shadows.iter().all(|&id| id < 0));

        // A later element cannot claim a shadow id.
        let mut tet = vec![Point3::new(5.0, 5.0, 5.0)];
        tet.extend([[6.0, 5.0, 5.0], [5.0, 6.0, 5.0], [5.0, 5.0, 6.0]].map(|c| Point3::new(c[0], c[1], c[2])));
        assert!(matches!(
            mesh.add_element(2, &[-1, 21, 22, 23], &tet, CellShape::Tet4),
            Err(MeshError::NegativeNodeId { node: -1 })
        ));
        let shadow = mesh.node(-1).unwrap();
        assert!(shadow.is_shadow());
        assert!(shadow.coords().x <= 1.0);
        assert!(mesh.node(21).is_none());
    }

    #[test]
    fn test_hex20_neighbours_share_shadow_face_node() {
        let mut mesh = Mesh::new();
        let left: Vec<NodeId> = (1..=20).collect();
        mesh.add_element(1, &left, &hex20_coords(0.0), CellShape::Hex20).unwrap();
        // Right neighbour: reuse the nodes of the shared face x = 1.
        let mut right: Vec<NodeId> = (101..=120).collect();
        for (local_right, local_left) in [(0, 1), (3, 2), (4, 5), (7, 6), (11, 9), (12, 13), (15, 14), (19, 17)] {
            right[local_right] = left[local_left];
        }
        mesh.add_element(2, &right, &hex20_coords(1.0), CellShape::Hex20).unwrap();

        assert_eq!(mesh.elements().len(), 16);
        let shadows = mesh.nodes().filter(|n| n.is_shadow()).count();
        assert_eq!(shadows, 13);
        let centre = mesh.nodes().find(|n| n.is_shadow() && *n.coords() == Point3::new(0.5, 0.5, 0.5));
        assert!(centre.is_some());
        let shared_face = mesh.nodes().find(|n| n.is_shadow() && *n.coords() == Point3::new(1.0, 0.5, 0.5));
        assert!(shared_face.is_some());

        let handle = mesh.element_handle(2).unwrap();
        assert!(handle.is_quadratic());
        assert_eq!(handle.sub_elements().len(), 8);
        assert_eq!(mesh.element_handles().map(ElementHandle::id).collect::<Vec<_>>(), vec![1, 2]);
    }

    #[test]
    fn test_shadow_nodes_follow_moved_nodes() {
        let mut mesh = Mesh::new();
        let ids: Vec<NodeId> = (1..=20).collect();
        mesh.add_element(1, &ids, &hex20_coords(0.0), CellShape::Hex20).unwrap();
        for id in 1..=20 {
            let x = *mesh.node(id).unwrap().coords();
            mesh.update_node(id, Point3::new(x.x + 2.0, x.y, x.z)).unwrap();
        }
        mesh.update_shadow_coords();
        let centre = mesh.node(-7).unwrap();
        assert_eq!(*centre.coords(), Point3::new(2.5, 0.5, 0.5));
    }
}
