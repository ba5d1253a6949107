//! Inside/outside positions of nodes and volume cells.
//!
//! Cut cells are decided by the votes of the cell builder. From there,
//! positions spread through shared points: a node takes the position of a
//! decided cell it is a corner of, and an undecided cell takes the position
//! of a decided node at one of its corners. Nodes on the cutter surface do
//! not propagate anything.

use crate::core::collections::{FastHashMap, FastHashSet, SmallBuffer, fast_hash_map_with_capacity};
use crate::core::mesh::Mesh;
use crate::core::node::{NodeId, Position};
use crate::core::point_pool::PointKey;
use crate::core::side::CutTriangle;
use crate::core::volume_cell::VolumeCellKey;
use crate::geometry::predicates::point_triangle_distance;

/// Mark the nodes lying on a relevant cutter triangle of one of their
/// elements, within the element's surface distance. Returns how many nodes
/// were marked.
fn mark_nodes_on_cut_surface(mesh: &mut Mesh, triangles: &[CutTriangle], tolerance: f64) -> usize {
    let mut on_surface: FastHashSet<NodeId> = FastHashSet::default();
    for element in &mesh.elements {
        if element.triangles.is_empty() {
            continue;
        }
        let distance = element.surface_distance.max(tolerance);
        for nid in element.nodes() {
            if on_surface.contains(nid) {
                continue;
            }
            let Some(node) = mesh.nodes.get(nid) else {
                continue;
            };
            let x = node.coords();
            let touches = element.triangles.iter().filter_map(|&t| triangles.get(t)).any(|tri| {
                let [a, b, c] = &tri.points;
                point_triangle_distance(x, a, b, c) <= distance
            });
            if touches {
                on_surface.insert(*nid);
            }
        }
    }
    for nid in &on_surface {
        if let Some(node) = mesh.nodes.get_mut(nid) {
            node.position = Position::OnCutSurface;
        }
    }
    on_surface.len()
}

/// Decide the positions of all nodes and volume cells.
///
/// Runs until a sweep changes nothing. When a node is reached by cells of
/// different positions, the first decision stays and a warning is logged.
pub(crate) fn find_positions(mesh: &mut Mesh, triangles: &[CutTriangle], tolerance: f64) {
    let on_surface = mark_nodes_on_cut_surface(mesh, triangles, tolerance);

    let mut nodes_at: FastHashMap<PointKey, SmallBuffer<NodeId, 2>> =
        fast_hash_map_with_capacity(mesh.nodes.len());
    for node in mesh.nodes.values() {
        if let Some(point) = node.point {
            nodes_at.entry(point).or_default().push(node.id());
        }
    }
    let cell_keys: Vec<VolumeCellKey> = mesh.entities.volume_cells.keys().collect();
    let mut conflicts: FastHashSet<NodeId> = FastHashSet::default();

    let mut sweeps = 0;
    loop {
        sweeps += 1;
        let mut changed = false;

        // Cells to nodes.
        let mut node_updates: Vec<(NodeId, Position)> = Vec::new();
        for &key in &cell_keys {
            let Some(cell) = mesh.entities.volume_cells.get(key) else {
                continue;
            };
            if !cell.position.is_decided() {
                continue;
            }
            for point in cell.vertices() {
                let Some(ids) = nodes_at.get(&point) else {
                    continue;
                };
                node_updates.extend(ids.iter().map(|&id| (id, cell.position)));
            }
        }
        for (id, position) in node_updates {
            let Some(node) = mesh.nodes.get_mut(&id) else {
                continue;
            };
            match node.position {
                Position::Undecided => {
                    node.position = position;
                    changed = true;
                }
                Position::OnCutSurface => {}
                current => {
                    if current != position && conflicts.insert(id) {
                        tracing::warn!(node = id, kept = %current, rejected = %position, "conflicting node positions");
                    }
                }
            }
        }

        // Nodes to cells.
        for &key in &cell_keys {
            let Some(cell) = mesh.entities.volume_cells.get(key) else {
                continue;
            };
            if cell.position != Position::Undecided {
                continue;
            }
            let Some(element) = mesh.elements.get(cell.element) else {
                continue;
            };
            let decided = element
                .nodes()
                .iter()
                .filter_map(|id| mesh.nodes.get(id))
                .filter(|node| node.position.is_decided())
                .find(|node| node.point.is_some_and(|p| cell.contains_point(p)))
                .map(|node| node.position);
            let Some(position) = decided else {
                continue;
            };
            if let Some(cell) = mesh.entities.volume_cells.get_mut(key) {
                cell.position = position;
                changed = true;
            }
        }

        if !changed {
            break;
        }
    }

    let undecided = mesh
        .entities
        .volume_cells
        .values()
        .filter(|c| c.position == Position::Undecided)
        .count();
    tracing::debug!(sweeps, on_surface, undecided_cells = undecided, "positions found");
}
