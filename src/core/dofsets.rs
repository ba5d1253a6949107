//! Nodal DOF sets.
//!
//! A node needs one set of degrees of freedom per connected region of its
//! support. Volume cells of neighbouring elements are connected where their
//! element-side facets overlap outside the cutter surface; the connected
//! components of the cells around a node are its DOF sets.
//!
//! The set containing the node itself is the *standard* set and comes first.
//! The remaining sets are ordered by their smallest `(element id, element,
//! cell)` key so that every rank derives the same numbering.

use nalgebra::Point3;
use ordered_float::OrderedFloat;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::core::collections::{FastHashMap, SmallBuffer};
use crate::core::element::{Element, ElementId};
use crate::core::facet::{FacetKey, FacetTag};
use crate::core::mesh::Mesh;
use crate::core::node::{NodeId, Position};
use crate::core::point_pool::PointPool;
use crate::core::side::CutTriangle;
use crate::core::util::components::{Adjacency, components_among, connect};
use crate::core::volume_cell::VolumeCellKey;
use crate::geometry::plane::Plane;
use crate::geometry::polygon;
use crate::geometry::predicates::{bounding_box, box_diagonal};

/// One DOF set of a node: a connected group of volume cells around it.
#[derive(Clone, Debug, PartialEq)]
pub struct NodalDofSet {
    cells: Vec<VolumeCellKey>,
    position: Position,
    standard: bool,
}

impl NodalDofSet {
    /// Volume cells sharing this set.
    #[must_use]
    pub fn cells(&self) -> &[VolumeCellKey] {
        &self.cells
    }

    /// Position of the region.
    #[must_use]
    pub const fn position(&self) -> Position {
        self.position
    }

    /// Whether the region contains the node.
    #[must_use]
    pub const fn is_standard(&self) -> bool {
        self.standard
    }
}

/// DOF-set description of one cell set of an element, as exchanged between
/// mesh partitions.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DofSetData {
    /// Index of the cell set within its element.
    pub set_index: usize,
    /// Whether the cells are inside.
    pub inside: bool,
    /// Distinct corner points of the cells, sorted.
    pub cut_points: Vec<[f64; 3]>,
    /// Element id.
    pub element_id: ElementId,
    /// DOF-set index used by the cells at each node of the element.
    pub node_dof_sets: BTreeMap<NodeId, usize>,
}

/// Tolerances of the DOF-set pass.
#[derive(Clone, Copy, Debug)]
pub(crate) struct DofSetTolerances {
    pub distance: f64,
    pub relative: f64,
}

fn element_scale(element: &Element, pool: &PointPool) -> f64 {
    let coords: SmallBuffer<Point3<f64>, 8> = element
        .points
        .iter()
        .filter_map(|&k| pool.coords(k).copied())
        .collect();
    bounding_box(&coords).map_or(0.0, |b| box_diagonal(&b))
}

/// Area of `polygon` covered by the given cutter triangles.
fn covered_area(polygon: &[Point3<f64>], candidates: &[usize], triangles: &[CutTriangle], tolerance: f64) -> f64 {
    let Some(plane) = polygon::unit_normal(polygon).and_then(|n| Plane::from_normal_and_point(&n, polygon.first()?))
    else {
        return 0.0;
    };
    candidates
        .iter()
        .filter_map(|&t| triangles.get(t))
        .filter(|tri| polygon::lies_in_plane(&tri.points, &plane, tolerance))
        .map(|tri| polygon::area(&polygon::convex_overlap(polygon, &tri.points, tolerance)))
        .sum()
}

/// Connect the cells of face-neighbouring elements whose element-side facets
/// overlap outside the cutter surface.
pub(crate) fn connect_neighbour_cells(
    mesh: &Mesh,
    pool: &PointPool,
    triangles: &[CutTriangle],
    tolerances: DofSetTolerances,
) -> Adjacency<VolumeCellKey> {
    let mut by_side: FastHashMap<SmallBuffer<NodeId, 4>, Vec<FacetKey>> = FastHashMap::default();
    for (key, facet) in mesh.entities.facets.iter() {
        let FacetTag::ElementSide(side) = facet.tag() else {
            continue;
        };
        let Some(element) = mesh.elements.get(facet.element_index()) else {
            continue;
        };
        let Some(local) = element.shape().sides().get(side) else {
            continue;
        };
        let mut nodes: SmallBuffer<NodeId, 4> = local.iter().map(|&i| element.nodes()[i]).collect();
        nodes.sort_unstable();
        by_side.entry(nodes).or_default().push(key);
    }

    let mut adjacency = Adjacency::default();
    for keys in by_side.values() {
        for (i, &ka) in keys.iter().enumerate() {
            for &kb in &keys[i + 1..] {
                let (Some(fa), Some(fb)) = (mesh.entities.facets.get(ka), mesh.entities.facets.get(kb)) else {
                    continue;
                };
                if fa.element_index() == fb.element_index() {
                    continue;
                }
                let (Some(&ca), Some(&cb)) = (fa.cells().first(), fb.cells().first()) else {
                    continue;
                };
                let Some(element) = mesh.elements.get(fa.element_index()) else {
                    continue;
                };
                let scale = element_scale(element, pool);
                let area_tolerance = tolerances.relative * scale * scale;
                let distance = element.surface_distance.max(tolerances.distance);
                let overlap = polygon::convex_overlap(fa.coords(), fb.coords(), distance);
                let mut open = polygon::area(&overlap);
                if open <= area_tolerance {
                    continue;
                }
                if fa.coincident_cut_side().is_some() || fb.coincident_cut_side().is_some() {
                    open -= covered_area(&overlap, &element.triangles, triangles, distance);
                }
                if open > area_tolerance {
                    connect(&mut adjacency, ca, cb);
                }
            }
        }
    }
    adjacency
}

/// Sort key of a volume cell for numbering DOF sets.
fn cell_order(mesh: &Mesh, key: VolumeCellKey) -> (ElementId, usize, usize) {
    mesh.entities
        .volume_cells
        .get(key)
        .map_or((ElementId::MAX, usize::MAX, usize::MAX), |c| {
            (c.element_id, c.element, c.ordinal)
        })
}

/// Compute the DOF sets of every node, the per-cell node-to-set maps and the
/// cell sets of every element handle.
pub(crate) fn assign_dof_sets(
    mesh: &mut Mesh,
    pool: &PointPool,
    triangles: &[CutTriangle],
    tolerances: DofSetTolerances,
    include_inner: bool,
) {
    let adjacency = connect_neighbour_cells(mesh, pool, triangles, tolerances);

    // Reset per-cell maps, aligned with the node list of the owning handle.
    for cell in mesh.entities.volume_cells.values_mut() {
        let count = mesh.handles.get(&cell.element_id).map_or(0, |h| h.nodes().len());
        cell.node_dof_sets = vec![None; count];
    }

    let mut node_ids: Vec<NodeId> = mesh.node_handles.keys().copied().filter(|&id| id >= 0).collect();
    node_ids.sort_unstable();
    let mut total_sets = 0;
    for nid in node_ids {
        let Some(node) = mesh.nodes.get(&nid) else {
            continue;
        };
        let point = node.point;
        let handle_ids = mesh.node_handles.get(&nid).cloned().unwrap_or_default();

        let mut patch: Vec<VolumeCellKey> = handle_ids
            .iter()
            .filter_map(|id| mesh.handles.get(id))
            .flat_map(|h| h.volume_cells(&mesh.elements))
            .filter(|&k| {
                mesh.entities.volume_cells.get(k).is_some_and(|c| match c.position {
                    Position::Inside => include_inner,
                    _ => true,
                })
            })
            .collect();
        patch.sort_by_key(|&k| cell_order(mesh, k));
        patch.dedup();

        let mut components = components_among(&patch, &adjacency);
        let contains_node = |component: &[VolumeCellKey]| {
            component.iter().any(|&k| {
                mesh.entities
                    .volume_cells
                    .get(k)
                    .zip(point)
                    .is_some_and(|(c, p)| c.contains_point(p))
            })
        };
        let position_of = |component: &[VolumeCellKey]| {
            let mut positions = component
                .iter()
                .filter_map(|&k| mesh.entities.volume_cells.get(k))
                .map(|c| c.position);
            let first = positions.next().unwrap_or_default();
            positions.fold(first, |acc, p| if acc.is_decided() { acc } else { p })
        };
        components.sort_by_key(|c| c.iter().map(|&k| cell_order(mesh, k)).min());
        let standard = components
            .iter()
            .position(|c| contains_node(c) && position_of(c) == Position::Outside)
            .or_else(|| components.iter().position(|c| contains_node(c)));
        if let Some(s) = standard {
            let first = components.remove(s);
            components.insert(0, first);
        }

        let sets: Vec<NodalDofSet> = components
            .into_iter()
            .enumerate()
            .map(|(i, cells)| NodalDofSet {
                position: position_of(&cells),
                standard: i == 0 && standard.is_some(),
                cells,
            })
            .collect();

        for (index, set) in sets.iter().enumerate() {
            for &key in &set.cells {
                let Some(cell) = mesh.entities.volume_cells.get_mut(key) else {
                    continue;
                };
                let slot = mesh
                    .handles
                    .get(&cell.element_id)
                    .and_then(|h| h.nodes().iter().position(|&n| n == nid));
                let Some(slot) = slot else {
                    continue;
                };
                if let Some(entry) = cell.node_dof_sets.get_mut(slot) {
                    *entry = Some(index);
                }
            }
        }
        total_sets += sets.len();
        if let Some(node) = mesh.nodes.get_mut(&nid) {
            node.dof_sets = sets;
        }
    }

    // Cell sets of every handle.
    let mut cell_sets = FastHashMap::default();
    for (&id, handle) in &mesh.handles {
        let cells = handle.volume_cells(&mesh.elements);
        cell_sets.insert(id, components_among(&cells, &adjacency));
    }
    mesh.cell_sets = cell_sets;
    mesh.cell_adjacency = adjacency;
    tracing::debug!(total_sets, "nodal dof sets assigned");
}

/// Exchange data of all cell sets of one element.
pub(crate) fn dof_set_data(mesh: &Mesh, pool: &PointPool, id: ElementId) -> Vec<DofSetData> {
    let (Some(handle), Some(sets)) = (mesh.handles.get(&id), mesh.cell_sets.get(&id)) else {
        return Vec::new();
    };
    sets.iter()
        .enumerate()
        .map(|(set_index, cells)| {
            let mut node_dof_sets = BTreeMap::new();
            let mut points = Vec::new();
            let mut inside = false;
            for cell in cells.iter().filter_map(|&k| mesh.entities.volume_cells.get(k)) {
                inside |= cell.position == Position::Inside;
                for (&nid, set) in handle.nodes().iter().zip(&cell.node_dof_sets) {
                    if let Some(set) = set {
                        node_dof_sets.entry(nid).or_insert(*set);
                    }
                }
                points.extend(cell.vertices().into_iter().filter_map(|k| pool.coords(k)).map(|p| [p.x, p.y, p.z]));
            }
            points.sort_by_key(|p| p.map(OrderedFloat));
            points.dedup();
            DofSetData {
                set_index,
                inside,
                cut_points: points,
                element_id: id,
                node_dof_sets,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::mesh_intersection::MeshIntersection;
    use crate::geometry::shape::CellShape;

    fn cube(dx: f64) -> Vec<Point3<f64>> {
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
        .map(|c| Point3::new(c[0] + dx, c[1], c[2]))
        .collect()
    }

    /// Two hexes sharing the face x = 1, with the cutter lying in that face.
    fn separated_by_shared_face() -> MeshIntersection {
        let mut intersection = MeshIntersection::default();
        let m = intersection.add_cut_mesh();
        let coords = [
            Point3::new(1.0, -1.0, -1.0),
            Point3::new(1.0, 2.0, -1.0),
            Point3::new(1.0, 2.0, 2.0),
            Point3::new(1.0, -1.0, 2.0),
        ];
        intersection
            .add_cut_side(3, &[101, 102, 103, 104], &coords, CellShape::Quad4, m)
            .unwrap();
        intersection
            .add_element(1, &[1, 2, 3, 4, 5, 6, 7, 8], &cube(0.0), CellShape::Hex8)
            .unwrap();
        intersection
            .add_element(2, &[2, 9, 10, 3, 6, 11, 12, 7], &cube(1.0), CellShape::Hex8)
            .unwrap();
        intersection
    }

    #[test]
    fn test_cutter_in_shared_face_separates_neighbours() {
        let mut intersection = separated_by_shared_face();
        intersection.cut(true).unwrap();
        let first = intersection.element_volume_cells(1);
        let second = intersection.element_volume_cells(2);
        assert_eq!((first.len(), second.len()), (1, 1));
        assert_eq!(intersection.volume_cell(first[0]).unwrap().position(), Position::Inside);
        assert_eq!(intersection.volume_cell(second[0]).unwrap().position(), Position::Outside);

        // The shared node sees both regions; the outside one is standard.
        let node = intersection.node(2).unwrap();
        assert_eq!(node.position(), Position::OnCutSurface);
        assert_eq!(node.num_dof_sets(), 2);
        assert_eq!(node.dof_sets()[0].cells(), second.as_slice());
        assert!(node.dof_sets()[0].is_standard());
        assert_eq!(node.dof_sets()[1].cells(), first.as_slice());
        assert!(!node.dof_sets()[1].is_standard());

        // The cells record which set they use at the shared node (local index 1
        // in element 1, local index 0 in element 2).
        let inner = intersection.volume_cell(first[0]).unwrap();
        let outer = intersection.volume_cell(second[0]).unwrap();
        assert_eq!(inner.node_dof_sets()[1], Some(1));
        assert_eq!(outer.node_dof_sets()[0], Some(0));
        assert_eq!(inner.node_dof_sets()[0], Some(0));
    }

    #[test]
    fn test_uncovered_shared_face_connects_neighbours() {
        let mut intersection = MeshIntersection::default();
        intersection
            .add_element(1, &[1, 2, 3, 4, 5, 6, 7, 8], &cube(0.0), CellShape::Hex8)
            .unwrap();
        intersection
            .add_element(2, &[2, 9, 10, 3, 6, 11, 12, 7], &cube(1.0), CellShape::Hex8)
            .unwrap();
        intersection.cut(false).unwrap();
        let node = intersection.node(3).unwrap();
        assert_eq!(node.num_dof_sets(), 1);
        assert_eq!(node.dof_sets()[0].cells().len(), 2);
        assert_eq!(node.dof_sets()[0].position(), Position::Undecided);
        assert_eq!(intersection.mesh().volume_cell_sets(1).map(<[_]>::len), Some(1));
    }

    #[test]
    fn test_dof_set_data_round_trips_through_json() {
        let mut intersection = separated_by_shared_face();
        intersection.cut(true).unwrap();
        let data = intersection.dof_set_data(2);
        assert_eq!(data.len(), 1);
        assert!(!data[0].inside);
        assert_eq!(data[0].element_id, 2);
        // Corners, face centres and the body centre of the hex decomposition.
        assert_eq!(data[0].cut_points.len(), 15);
        assert_eq!(data[0].node_dof_sets.get(&2), Some(&0));

        let json = serde_json::to_string(&data[0]).unwrap();
        let back: DofSetData = serde_json::from_str(&json).unwrap();
        assert_eq!(back, data[0]);
        assert!(intersection.dof_set_data(99).is_empty());
    }
}
