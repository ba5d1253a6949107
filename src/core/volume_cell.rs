//! Volume cells: connected regions of a cut element.

use nalgebra::{Point3, Vector3};
use slotmap::new_key_type;

use crate::core::boundary_cell::BoundaryCellKey;
use crate::core::collections::SmallBuffer;
use crate::core::element::ElementId;
use crate::core::facet::FacetKey;
use crate::core::integration::{IntegrationCell, IntegrationPoint};
use crate::core::node::Position;
use crate::core::point_pool::{PointKey, PointPool};
use crate::core::polyhedron::ConvexPiece;
use crate::geometry::predicates::bounding_box;

new_key_type! {
    /// Key of a volume cell in the mesh arena.
    pub struct VolumeCellKey;
}

/// A connected region of one linear element, made of convex pieces.
#[derive(Clone, Debug)]
pub struct VolumeCell {
    pub(crate) element: usize,
    pub(crate) element_id: ElementId,
    pub(crate) ordinal: usize,
    pub(crate) pieces: Vec<ConvexPiece>,
    pub(crate) volume: f64,
    pub(crate) position: Position,
    pub(crate) facets: Vec<FacetKey>,
    pub(crate) boundary_cells: Vec<BoundaryCellKey>,
    pub(crate) node_dof_sets: Vec<Option<usize>>,
    pub(crate) integration_cells: Vec<IntegrationCell>,
    pub(crate) gauss_points: Vec<IntegrationPoint>,
}

impl VolumeCell {
    pub(crate) fn new(element: usize, element_id: ElementId, ordinal: usize, pieces: Vec<ConvexPiece>) -> Self {
        let volume = pieces.iter().map(ConvexPiece::volume).sum();
        Self {
            element,
            element_id,
            ordinal,
            pieces,
            volume,
            position: Position::Undecided,
            facets: Vec::new(),
            boundary_cells: Vec::new(),
            node_dof_sets: Vec::new(),
            integration_cells: Vec::new(),
            gauss_points: Vec::new(),
        }
    }

    /// Index of the linear element the cell belongs to.
    #[must_use]
    pub const fn element_index(&self) -> usize {
        self.element
    }

    /// Id of the (user) element the cell belongs to.
    #[must_use]
    pub const fn element_id(&self) -> ElementId {
        self.element_id
    }

    /// Position of the cell among the cells of its linear element.
    #[must_use]
    pub const fn ordinal(&self) -> usize {
        self.ordinal
    }

    /// Convex pieces making up the cell.
    #[must_use]
    pub fn pieces(&self) -> &[ConvexPiece] {
        &self.pieces
    }

    /// Cell volume.
    #[must_use]
    pub const fn volume(&self) -> f64 {
        self.volume
    }

    /// Inside/outside position.
    #[must_use]
    pub const fn position(&self) -> Position {
        self.position
    }

    /// Bounding facets.
    #[must_use]
    pub fn facets(&self) -> &[FacetKey] {
        &self.facets
    }

    /// Boundary cells on the cut surface.
    #[must_use]
    pub fn boundary_cells(&self) -> &[BoundaryCellKey] {
        &self.boundary_cells
    }

    /// Whether the cut surface touches the cell.
    #[must_use]
    pub fn is_cut(&self) -> bool {
        !self.boundary_cells.is_empty()
    }

    /// DOF-set index used at each node of the owning element (aligned with
    /// the element handle's node list); `None` where the node has no set for
    /// this cell.
    #[must_use]
    pub fn node_dof_sets(&self) -> &[Option<usize>] {
        &self.node_dof_sets
    }

    /// Tetrahedra of the tessellation (empty in direct-divergence mode).
    #[must_use]
    pub fn integration_cells(&self) -> &[IntegrationCell] {
        &self.integration_cells
    }

    /// Volume quadrature points.
    #[must_use]
    pub fn gauss_points(&self) -> &[IntegrationPoint] {
        &self.gauss_points
    }

    /// Distinct corner points of all pieces.
    #[must_use]
    pub fn vertices(&self) -> Vec<PointKey> {
        let mut keys: Vec<PointKey> = self
            .pieces
            .iter()
            .flat_map(|p| p.vertices().into_iter())
            .collect();
        keys.sort_unstable();
        keys.dedup();
        keys
    }

    /// Whether `point` is a corner of one of the pieces.
    #[must_use]
    pub fn contains_point(&self, point: PointKey) -> bool {
        self.pieces.iter().any(|p| p.contains_vertex(point))
    }

    /// Volume centroid.
    #[must_use]
    pub fn centroid(&self, pool: &PointPool) -> Point3<f64> {
        if self.volume <= 0.0 {
            return Point3::origin();
        }
        let weighted = self
            .pieces
            .iter()
            .fold(Vector3::zeros(), |acc, p| acc + p.centroid(pool).coords * p.volume());
        Point3::from(weighted / self.volume)
    }

    /// Axis-aligned bounds of the piece corners.
    #[must_use]
    pub fn bounds(&self, pool: &PointPool) -> Option<(Point3<f64>, Point3<f64>)> {
        let coords: SmallBuffer<Point3<f64>, 16> = self
            .vertices()
            .into_iter()
            .filter_map(|k| pool.coords(k).copied())
            .collect();
        bounding_box(&coords)
    }
}
