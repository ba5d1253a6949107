//! The cut driver: a background mesh, any number of cutter meshes and the
//! pipeline that intersects them.
//!
//! # Example
//!
//! ```rust
//! use nalgebra::Point3;
//! use xfem_cut::prelude::*;
//!
//! let mut intersection = MeshIntersection::new(Options::default());
//! let cutter = intersection.add_cut_mesh();
//! let plane = [
//!     Point3::new(-1.0, -1.0, 0.5),
//!     Point3::new(2.0, -1.0, 0.5),
//!     Point3::new(2.0, 2.0, 0.5),
//!     Point3::new(-1.0, 2.0, 0.5),
//! ];
//! intersection
//!     .add_cut_side(1, &[101, 102, 103, 104], &plane, CellShape::Quad4, cutter)
//!     .unwrap();
//!
//! let cube: Vec<Point3<f64>> = [
//!     [0.0, 0.0, 0.0], [1.0, 0.0, 0.0], [1.0, 1.0, 0.0], [0.0, 1.0, 0.0],
//!     [0.0, 0.0, 1.0], [1.0, 0.0, 1.0], [1.0, 1.0, 1.0], [0.0, 1.0, 1.0],
//! ]
//! .iter()
//! .map(|c| Point3::new(c[0], c[1], c[2]))
//! .collect();
//! intersection
//!     .add_element(1, &[1, 2, 3, 4, 5, 6, 7, 8], &cube, CellShape::Hex8)
//!     .unwrap();
//!
//! let status = intersection.cut(false).unwrap();
//! assert_eq!(status.volume_cells, 2);
//! assert_eq!(status.inside_cells, 1);
//! ```

use nalgebra::Point3;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::core::algorithms::cell_building::{CellBuildContext, build_cells};
use crate::core::algorithms::element_cut::{collect_planes, relevant_triangles, split_by_planes};
use crate::core::boundary_cell::{BoundaryCell, BoundaryCellKey};
use crate::core::collections::{FastHashMap, FastHashSet, SmallBuffer};
use crate::core::dofsets::{self, DofSetData, DofSetTolerances};
use crate::core::edge::CutPoint;
use crate::core::element::{ElementHandle, ElementId};
use crate::core::facet::{Facet, FacetKey};
use crate::core::integration::{direct_divergence_rule, tessellate, tessellation_rule, triangle_points};
use crate::core::mesh::{Mesh, MeshError};
use crate::core::mesh_handle::MeshHandle;
use crate::core::node::{Node, NodeId, Position};
use crate::core::options::{IntegrationMode, Options};
use crate::core::point_pool::PointPool;
use crate::core::polyhedron::SplitTolerances;
use crate::core::positions;
use crate::core::side::{CutTriangle, Side, SideId};
use crate::core::validation::{ValidationReport, validate};
use crate::core::volume_cell::{VolumeCell, VolumeCellKey};
use crate::geometry::intersection::{IntersectionOutcome, TriangleIntersection, triangle_triangle};
use crate::geometry::polygon::{self, Polygon};
use crate::geometry::predicates::{bounding_box, box_diagonal, boxes_overlap};
use crate::geometry::shape::CellShape;

// =============================================================================
// STATUS
// =============================================================================

/// Summary of the last cut.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CutStatus {
    /// Linear elements (sub-elements of quadratic elements included).
    pub elements: usize,
    /// Linear elements touched by the cutter.
    pub cut_elements: usize,
    /// Cutting triangles.
    pub triangles: usize,
    /// Distinct points.
    pub points: usize,
    /// Facets.
    pub facets: usize,
    /// Volume cells.
    pub volume_cells: usize,
    /// Volume cells inside.
    pub inside_cells: usize,
    /// Volume cells outside.
    pub outside_cells: usize,
    /// Volume cells without a position.
    pub undecided_cells: usize,
    /// Boundary cells.
    pub boundary_cells: usize,
    /// Nodal DOF sets over all nodes.
    pub dof_sets: usize,
}

impl fmt::Display for CutStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}/{} elements cut, {} volume cells ({} inside, {} outside, {} undecided), {} facets, {} boundary cells, {} dof sets",
            self.cut_elements,
            self.elements,
            self.volume_cells,
            self.inside_cells,
            self.outside_cells,
            self.undecided_cells,
            self.facets,
            self.boundary_cells,
            self.dof_sets
        )
    }
}

// =============================================================================
// MESH INTERSECTION
// =============================================================================

/// Background mesh, cutter meshes and the derived cut entities.
#[derive(Clone, Debug)]
pub struct MeshIntersection {
    options: Options,
    pool: PointPool,
    mesh: Mesh,
    cut_meshes: Vec<MeshHandle>,
    side_mesh: FastHashMap<SideId, usize>,
    triangles: Vec<CutTriangle>,
    status: CutStatus,
}

impl Default for MeshIntersection {
    fn default() -> Self {
        Self::new(Options::default())
    }
}

impl MeshIntersection {
    /// Empty intersection with the given options.
    #[must_use]
    pub fn new(options: Options) -> Self {
        Self {
            pool: PointPool::new(options.point_tolerance),
            options,
            mesh: Mesh::new(),
            cut_meshes: Vec::new(),
            side_mesh: FastHashMap::default(),
            triangles: Vec::new(),
            status: CutStatus::default(),
        }
    }

    // -------------------------------------------------------------------------
    // Input
    // -------------------------------------------------------------------------

    /// Add an empty cutter mesh and return its index.
    pub fn add_cut_mesh(&mut self) -> usize {
        let index = self.cut_meshes.len();
        self.cut_meshes.push(MeshHandle::new(index));
        index
    }

    /// Add a side to cutter mesh `mesh_index`.
    ///
    /// # Errors
    ///
    /// Returns [`MeshError::UnknownCutMesh`], [`MeshError::DuplicateSide`] if
    /// any cutter mesh already has the side, or the errors of
    /// [`MeshHandle::add_side`].
    pub fn add_cut_side(
        &mut self,
        id: SideId,
        nodes: &[NodeId],
        coords: &[Point3<f64>],
        shape: CellShape,
        mesh_index: usize,
    ) -> Result<(), MeshError> {
        let count = self.cut_meshes.len();
        let handle = self
            .cut_meshes
            .get_mut(mesh_index)
            .ok_or(MeshError::UnknownCutMesh { index: mesh_index, count })?;
        if self.side_mesh.contains_key(&id) {
            return Err(MeshError::DuplicateSide { side: id });
        }
        handle.add_side(id, nodes, coords, shape)?;
        self.side_mesh.insert(id, mesh_index);
        Ok(())
    }

    /// Add a background element.
    ///
    /// # Errors
    ///
    /// See [`Mesh::add_element`].
    pub fn add_element(
        &mut self,
        id: ElementId,
        nodes: &[NodeId],
        coords: &[Point3<f64>],
        shape: CellShape,
    ) -> Result<(), MeshError> {
        self.mesh.add_element(id, nodes, coords, shape)
    }

    /// Move a cutter node; takes effect at the next [`cut`](Self::cut).
    ///
    /// # Errors
    ///
    /// Returns [`MeshError::UnknownCutMesh`], [`MeshError::UnknownNode`] or
    /// [`MeshError::NonFiniteCoordinates`].
    pub fn update_cut_node(&mut self, mesh_index: usize, id: NodeId, coords: Point3<f64>) -> Result<(), MeshError> {
        let count = self.cut_meshes.len();
        self.cut_meshes
            .get_mut(mesh_index)
            .ok_or(MeshError::UnknownCutMesh { index: mesh_index, count })?
            .update_node(id, coords)
    }

    /// Move a background node; takes effect at the next [`cut`](Self::cut).
    ///
    /// # Errors
    ///
    /// Returns [`MeshError::UnknownNode`] or
    /// [`MeshError::NonFiniteCoordinates`].
    pub fn update_node(&mut self, id: NodeId, coords: Point3<f64>) -> Result<(), MeshError> {
        self.mesh.update_node(id, coords)
    }

    // -------------------------------------------------------------------------
    // Cut pipeline
    // -------------------------------------------------------------------------

    /// Cut the background mesh with all cutter meshes.
    ///
    /// Everything derived by a previous cut is discarded first. With
    /// `include_inner` (or [`Options::include_inner`]), inside regions get
    /// nodal DOF sets as well.
    ///
    /// # Errors
    ///
    /// Returns [`MeshError::DegenerateElement`] for elements without volume,
    /// [`MeshError::Quadrature`] for unsupported rule degrees and
    /// [`MeshError::Validation`] when validation is enabled and fails.
    pub fn cut(&mut self, include_inner: bool) -> Result<&CutStatus, MeshError> {
        self.prepare();
        self.cut_elements()?;
        self.cut_edges();
        self.find_cut_lines();
        let tolerance = self.options.point_tolerance;
        if self.options.find_positions {
            positions::find_positions(&mut self.mesh, &self.triangles, tolerance);
        }
        let tolerances = DofSetTolerances {
            distance: tolerance,
            relative: self.options.relative_tolerance,
        };
        let include_inner = include_inner || self.options.include_inner;
        dofsets::assign_dof_sets(&mut self.mesh, &self.pool, &self.triangles, tolerances, include_inner);
        self.integrate()?;
        if self.options.validate {
            validate(&self.mesh, self.options.relative_tolerance).into_result()?;
        }
        self.status = self.compute_status();
        tracing::info!(status = %self.status, "cut finished");
        Ok(&self.status)
    }

    /// Reset derived state, refresh shadow nodes and register node points.
    fn prepare(&mut self) {
        self.mesh.reset_cut_state();
        self.mesh.update_shadow_coords();
        for handle in &mut self.cut_meshes {
            handle.update_shadow_coords();
        }
        self.pool = PointPool::new(self.options.point_tolerance);
        self.triangles = self
            .cut_meshes
            .iter()
            .flat_map(|h| h.triangles(self.options.quad_split))
            .collect();

        let mut ids: Vec<NodeId> = self.mesh.nodes.keys().copied().collect();
        ids.sort_unstable();
        for id in ids {
            if let Some(node) = self.mesh.nodes.get_mut(&id) {
                node.point = Some(self.pool.get_or_insert(*node.coords()));
            }
        }
        tracing::debug!(
            nodes = self.mesh.nodes.len(),
            triangles = self.triangles.len(),
            "cut prepared"
        );
    }

    /// Split every linear element and build its cells.
    fn cut_elements(&mut self) -> Result<(), MeshError> {
        let tolerance = self.options.point_tolerance;
        let relative = self.options.relative_tolerance;
        for index in 0..self.mesh.elements.len() {
            let element = &self.mesh.elements[index];
            let id = element.id();
            let points: SmallBuffer<_, 8> = element
                .nodes()
                .iter()
                .filter_map(|n| self.mesh.nodes.get(n).and_then(|node| node.point))
                .collect();
            if points.len() != element.nodes().len() {
                let missing = element
                    .nodes()
                    .iter()
                    .copied()
                    .find(|n| !self.mesh.nodes.contains_key(n))
                    .unwrap_or_default();
                return Err(MeshError::UnknownNode { node: missing });
            }
            let coords: SmallBuffer<Point3<f64>, 8> = points
                .iter()
                .filter_map(|&k| self.pool.coords(k).copied())
                .collect();
            let Some(bounds) = bounding_box(&coords) else {
                continue;
            };
            let length = box_diagonal(&bounds);

            self.mesh.elements[index].points = points;
            let element = &self.mesh.elements[index];
            let pieces = element.initial_pieces(&mut self.pool, 0.0);
            let volume: f64 = pieces.iter().map(|p| p.volume()).sum();
            if !(volume > relative * length.powi(3)) {
                return Err(MeshError::DegenerateElement { element: id, volume });
            }

            // Layers thinner than the relative tolerance snap onto the cut
            // plane; every thicker layer becomes a piece of its own.
            let distance = tolerance.max(relative * length);
            let relevant = relevant_triangles(
                &pieces,
                &self.pool,
                &bounds,
                0..self.triangles.len(),
                &self.triangles,
                distance,
            );
            let planes = collect_planes(&relevant, &self.triangles, distance);
            let split = SplitTolerances { distance, volume: 0.0 };
            let pieces = split_by_planes(pieces, &planes, &mut self.pool, split);
            let ctx = CellBuildContext {
                element: index,
                element_id: id,
                planes: &planes,
                relevant: &relevant,
                triangles: &self.triangles,
                tolerance: distance,
                area_tolerance: relative * length * length,
            };
            let cells = build_cells(&ctx, pieces, &mut self.pool, &mut self.mesh.entities);

            let element = &mut self.mesh.elements[index];
            element.triangles = relevant;
            element.cells = cells;
            element.volume = volume;
            element.surface_distance = distance;
        }
        Ok(())
    }

    /// Record where the cutter sides cross the background edges.
    fn cut_edges(&mut self) {
        let tolerance = self.options.point_tolerance;
        let mut crossings = 0;
        for (key, edge) in &mut self.mesh.edges {
            let (Some(a), Some(b)) = (self.mesh.nodes.get(&key.0), self.mesh.nodes.get(&key.1)) else {
                continue;
            };
            let (p, q) = (*a.coords(), *b.coords());
            let Some(edge_bounds) = bounding_box(&[p, q]) else {
                continue;
            };
            let mut sides: SmallBuffer<SideId, 8> = self
                .triangles
                .iter()
                .filter(|t| boxes_overlap(&t.bounds, &edge_bounds, tolerance))
                .map(|t| t.side_id)
                .collect();
            sides.sort_unstable();
            sides.dedup();
            for sid in sides {
                let Some(handle) = self.side_mesh.get(&sid).and_then(|&m| self.cut_meshes.get(m)) else {
                    continue;
                };
                let Some(side) = handle.side(sid) else {
                    continue;
                };
                for outcome in side.intersect_segment(&p, &q, handle.coords(), tolerance) {
                    match outcome {
                        IntersectionOutcome::Point(hit) => {
                            edge.add_cut_point(CutPoint {
                                point: self.pool.get_or_insert(hit.point),
                                t: hit.t,
                                side_id: sid,
                            });
                            crossings += 1;
                        }
                        IntersectionOutcome::Coincident => edge.add_coincident_side(sid),
                        IntersectionOutcome::None => {}
                    }
                }
            }
        }
        tracing::debug!(crossings, "edge cut points found");
    }

    /// Intersection segments of the relevant triangles with the element sides.
    fn find_cut_lines(&mut self) {
        let tolerance = self.options.point_tolerance;
        for element in &mut self.mesh.elements {
            if element.triangles.is_empty() {
                continue;
            }
            let coords: SmallBuffer<Point3<f64>, 8> = element
                .points
                .iter()
                .filter_map(|&k| self.pool.coords(k).copied())
                .collect();
            let mut lines = Vec::new();
            for local in element.shape().sides() {
                let face: Polygon = local.iter().filter_map(|&i| coords.get(i).copied()).collect();
                for side_tri in polygon::fan_triangles(&face) {
                    for tri in element.triangles.iter().filter_map(|&t| self.triangles.get(t)) {
                        if let TriangleIntersection::Segment([a, b]) = triangle_triangle(&side_tri, &tri.points, tolerance)
                        {
                            if (b - a).norm() > tolerance {
                                lines.push([a, b]);
                            }
                        }
                    }
                }
            }
            element.cut_lines = lines;
        }
    }

    /// Quadrature rules of all volume and boundary cells.
    fn integrate(&mut self) -> Result<(), MeshError> {
        let mode = self.options.integration_mode;
        let volume_degree = self.options.volume_rule_degree;
        let keys: Vec<VolumeCellKey> = self.mesh.entities.volume_cells.keys().collect();
        for key in keys {
            let Some(cell) = self.mesh.entities.volume_cells.get(key) else {
                continue;
            };
            let (cells, points) = match mode {
                IntegrationMode::Tessellation => {
                    let cells = tessellate(&cell.pieces, &self.pool, cell.position);
                    let points = tessellation_rule(&cells, volume_degree)?;
                    (cells, points)
                }
                IntegrationMode::DirectDivergence => {
                    let x0 = cell.bounds(&self.pool).map_or(0.0, |b| b.0.x);
                    let facets: Vec<Polygon> = cell
                        .facets
                        .iter()
                        .filter_map(|&f| self.mesh.entities.facets.get(f))
                        .map(|f| f.coords_outward(key))
                        .collect();
                    let points = direct_divergence_rule(facets.iter().map(|p| p.as_slice()), x0, volume_degree)?;
                    (Vec::new(), points)
                }
            };
            if let Some(cell) = self.mesh.entities.volume_cells.get_mut(key) {
                cell.integration_cells = cells;
                cell.gauss_points = points;
            }
        }
        for bc in self.mesh.entities.boundary_cells.values_mut() {
            bc.gauss_points = triangle_points(&bc.points, self.options.boundary_rule_degree)?;
        }
        Ok(())
    }

    fn compute_status(&self) -> CutStatus {
        let cells = &self.mesh.entities.volume_cells;
        let count = |position: Position| cells.values().filter(|c| c.position == position).count();
        CutStatus {
            elements: self.mesh.elements.len(),
            cut_elements: self.mesh.elements.iter().filter(|e| e.is_cut()).count(),
            triangles: self.triangles.len(),
            points: self.pool.len(),
            facets: self.mesh.entities.facets.len(),
            volume_cells: cells.len(),
            inside_cells: count(Position::Inside),
            outside_cells: count(Position::Outside),
            undecided_cells: count(Position::Undecided),
            boundary_cells: self.mesh.entities.boundary_cells.len(),
            dof_sets: self.mesh.nodes.values().map(Node::num_dof_sets).sum(),
        }
    }

    // -------------------------------------------------------------------------
    // Accessors
    // -------------------------------------------------------------------------

    /// Options in use.
    #[must_use]
    pub const fn options(&self) -> &Options {
        &self.options
    }

    /// Summary of the last cut.
    #[must_use]
    pub const fn status(&self) -> &CutStatus {
        &self.status
    }

    /// Background mesh.
    #[must_use]
    pub const fn mesh(&self) -> &Mesh {
        &self.mesh
    }

    /// Point pool of the last cut.
    #[must_use]
    pub const fn pool(&self) -> &PointPool {
        &self.pool
    }

    /// Cutting triangles of the last cut.
    #[must_use]
    pub fn triangles(&self) -> &[CutTriangle] {
        &self.triangles
    }

    /// Cutter mesh by index.
    #[must_use]
    pub fn cut_mesh(&self, index: usize) -> Option<&MeshHandle> {
        self.cut_meshes.get(index)
    }

    /// Cutter side by id.
    #[must_use]
    pub fn cut_side(&self, id: SideId) -> Option<&Side> {
        let &index = self.side_mesh.get(&id)?;
        self.cut_meshes.get(index)?.side(id)
    }

    /// Background element by id.
    #[must_use]
    pub fn element(&self, id: ElementId) -> Option<&ElementHandle> {
        self.mesh.element_handle(id)
    }

    /// Background node by id.
    #[must_use]
    pub fn node(&self, id: NodeId) -> Option<&Node> {
        self.mesh.node(id)
    }

    /// Volume cell by key.
    #[must_use]
    pub fn volume_cell(&self, key: VolumeCellKey) -> Option<&VolumeCell> {
        self.mesh.volume_cell(key)
    }

    /// All volume cells.
    pub fn volume_cells(&self) -> impl Iterator<Item = (VolumeCellKey, &VolumeCell)> {
        self.mesh.volume_cells()
    }

    /// Volume cells of a background element.
    #[must_use]
    pub fn element_volume_cells(&self, id: ElementId) -> Vec<VolumeCellKey> {
        self.mesh
            .element_handle(id)
            .map(|h| h.volume_cells(&self.mesh.elements))
            .unwrap_or_default()
    }

    /// Facet by key.
    #[must_use]
    pub fn facet(&self, key: FacetKey) -> Option<&Facet> {
        self.mesh.facet(key)
    }

    /// Boundary cell by key.
    #[must_use]
    pub fn boundary_cell(&self, key: BoundaryCellKey) -> Option<&BoundaryCell> {
        self.mesh.boundary_cell(key)
    }

    /// Corner coordinates of a volume cell.
    #[must_use]
    pub fn volume_cell_points(&self, key: VolumeCellKey) -> Vec<Point3<f64>> {
        self.volume_cell(key)
            .map(|c| c.vertices().into_iter().filter_map(|k| self.pool.coords(k).copied()).collect())
            .unwrap_or_default()
    }

    /// Side ids of the cutter surface inside a background element.
    #[must_use]
    pub fn element_cut_sides(&self, id: ElementId) -> Vec<SideId> {
        let Some(handle) = self.mesh.element_handle(id) else {
            return Vec::new();
        };
        let sides: FastHashSet<SideId> = handle
            .sub_elements()
            .iter()
            .filter_map(|&i| self.mesh.elements.get(i))
            .flat_map(|e| e.triangles().iter().filter_map(|&t| self.triangles.get(t)))
            .map(|t| t.side_id)
            .collect();
        let mut sides: Vec<SideId> = sides.into_iter().collect();
        sides.sort_unstable();
        sides
    }

    /// DOF-set exchange data of a background element.
    #[must_use]
    pub fn dof_set_data(&self, id: ElementId) -> Vec<DofSetData> {
        dofsets::dof_set_data(&self.mesh, &self.pool, id)
    }

    /// Re-run the consistency checks on the last cut.
    #[must_use]
    pub fn validate(&self) -> ValidationReport {
        validate(&self.mesh, self.options.relative_tolerance)
    }
}
