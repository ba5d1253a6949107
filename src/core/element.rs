//! Background elements.
//!
//! The user adds elements of any supported volume shape. Linear shapes
//! (`Tet4`, `Hex8`, `Wedge6`, `Pyramid5`) become one [`Element`]; quadratic
//! shapes become an [`ElementHandle::Quadratic`] over several linear
//! sub-elements. All cutting happens on linear elements.
//!
//! # Decomposition
//!
//! Before it is cut, a linear element is split into tetrahedral
//! [`ConvexPiece`]s. Tetrahedra are used as they are. Other shapes are split
//! into pyramids from the body centre over each side, and quad sides are
//! split through their face centre, so warped sides are represented the same
//! way by both elements sharing them.

use nalgebra::{Matrix3, Point3, Vector3};

use crate::core::collections::{FastHashMap, SmallBuffer};
use crate::core::mesh::MeshError;
use crate::core::node::{Node, NodeId};
use crate::core::point_pool::{PointKey, PointPool};
use crate::core::polyhedron::{ConvexPiece, FaceTag};
use crate::core::volume_cell::VolumeCellKey;
use crate::geometry::predicates::{bounding_box, box_diagonal};
use crate::geometry::shape::CellShape;

/// Global element id.
pub type ElementId = i32;

const LOCAL_NEWTON_MAX_ITERATIONS: usize = 30;
const FINITE_DIFFERENCE_STEP: f64 = 1e-7;

// =============================================================================
// LINEAR ELEMENTS
// =============================================================================

/// A linear element of the background mesh.
#[derive(Clone, Debug)]
pub struct Element {
    id: ElementId,
    shape: CellShape,
    nodes: SmallBuffer<NodeId, 8>,
    sub_index: Option<usize>,
    pub(crate) points: SmallBuffer<PointKey, 8>,
    pub(crate) triangles: Vec<usize>,
    pub(crate) cells: Vec<VolumeCellKey>,
    pub(crate) cut_lines: Vec<[Point3<f64>; 2]>,
    pub(crate) volume: f64,
    /// Points up to this distance from a cutter plane lie on it.
    pub(crate) surface_distance: f64,
}

impl Element {
    pub(crate) fn new(id: ElementId, shape: CellShape, nodes: &[NodeId], sub_index: Option<usize>) -> Self {
        Self {
            id,
            shape,
            nodes: nodes.iter().copied().collect(),
            sub_index,
            points: SmallBuffer::new(),
            triangles: Vec::new(),
            cells: Vec::new(),
            cut_lines: Vec::new(),
            volume: 0.0,
            surface_distance: 0.0,
        }
    }

    /// Id of the element, or of the quadratic parent for sub-elements.
    #[must_use]
    pub const fn id(&self) -> ElementId {
        self.id
    }

    /// Linear shape.
    #[must_use]
    pub const fn shape(&self) -> CellShape {
        self.shape
    }

    /// Corner node ids.
    #[must_use]
    pub fn nodes(&self) -> &[NodeId] {
        &self.nodes
    }

    /// Index within the quadratic parent, if this is a sub-element.
    #[must_use]
    pub const fn sub_index(&self) -> Option<usize> {
        self.sub_index
    }

    /// Indices of the cutter triangles relevant to this element.
    #[must_use]
    pub fn triangles(&self) -> &[usize] {
        &self.triangles
    }

    /// Volume cells of the last cut.
    #[must_use]
    pub fn cells(&self) -> &[VolumeCellKey] {
        &self.cells
    }

    /// Segments where the cutter crosses the element sides.
    #[must_use]
    pub fn cut_lines(&self) -> &[[Point3<f64>; 2]] {
        &self.cut_lines
    }

    /// Element volume.
    #[must_use]
    pub const fn volume(&self) -> f64 {
        self.volume
    }

    /// Whether the cutter intersects the element.
    #[must_use]
    pub fn is_cut(&self) -> bool {
        self.cells.len() > 1 || !self.cut_lines.is_empty()
    }

    pub(crate) fn reset_cut_state(&mut self) {
        self.points.clear();
        self.triangles.clear();
        self.cells.clear();
        self.cut_lines.clear();
        self.volume = 0.0;
        self.surface_distance = 0.0;
    }

    /// Tetrahedral decomposition into convex pieces. `points` must hold the
    /// pooled corner points. Tetrahedra with volume up to `min_volume` are
    /// dropped.
    pub(crate) fn initial_pieces(&self, pool: &mut PointPool, min_volume: f64) -> Vec<ConvexPiece> {
        let corners = &self.points;
        if self.shape == CellShape::Tet4 {
            let keys = [corners[0], corners[1], corners[2], corners[3]];
            let tags = [3, 2, 1, 0].map(FaceTag::ElementSide);
            return ConvexPiece::from_tet(keys, tags, pool, min_volume)
                .into_iter()
                .collect();
        }

        let coords: SmallBuffer<Point3<f64>, 8> = corners
            .iter()
            .map(|&k| pool.coords(k).copied().unwrap_or_else(Point3::origin))
            .collect();
        let body = pool.get_or_insert(mean(&coords));
        let mut pieces = Vec::new();
        for (side, local) in self.shape.sides().iter().enumerate() {
            let tags = [
                FaceTag::Internal,
                FaceTag::Internal,
                FaceTag::Internal,
                FaceTag::ElementSide(side),
            ];
            if let &[a, b, c] = *local {
                pieces.extend(ConvexPiece::from_tet([corners[a], corners[b], corners[c], body], tags, pool, min_volume));
                continue;
            }
            let face_coords: SmallBuffer<Point3<f64>, 4> = local.iter().map(|&i| coords[i]).collect();
            let face = pool.get_or_insert(mean(&face_coords));
            for i in 0..local.len() {
                let (p, q) = (corners[local[i]], corners[local[(i + 1) % local.len()]]);
                pieces.extend(ConvexPiece::from_tet([p, q, face, body], tags, pool, min_volume));
            }
        }
        pieces
    }
}

fn mean(points: &[Point3<f64>]) -> Point3<f64> {
    let sum = points.iter().fold(Vector3::zeros(), |acc, p| acc + p.coords);
    #[allow(clippy::cast_precision_loss)]
    Point3::from(sum / points.len().max(1) as f64)
}

// =============================================================================
// ELEMENT HANDLES
// =============================================================================

/// A user element: either one linear element or a quadratic element made of
/// linear sub-elements.
#[derive(Clone, Debug)]
pub enum ElementHandle {
    /// Linear element.
    Linear {
        /// Element id.
        id: ElementId,
        /// Shape.
        shape: CellShape,
        /// Node ids.
        nodes: Vec<NodeId>,
        /// Index of the linear element.
        element: usize,
    },
    /// Quadratic element.
    Quadratic {
        /// Element id.
        id: ElementId,
        /// Shape.
        shape: CellShape,
        /// Node ids as given by the user.
        nodes: Vec<NodeId>,
        /// Indices of the linear sub-elements.
        sub_elements: Vec<usize>,
    },
}

impl ElementHandle {
    /// Element id.
    #[must_use]
    pub const fn id(&self) -> ElementId {
        match self {
            Self::Linear { id, .. } | Self::Quadratic { id, .. } => *id,
        }
    }

    /// Shape as given by the user.
    #[must_use]
    pub const fn shape(&self) -> CellShape {
        match self {
            Self::Linear { shape, .. } | Self::Quadratic { shape, .. } => *shape,
        }
    }

    /// Node ids as given by the user.
    #[must_use]
    pub fn nodes(&self) -> &[NodeId] {
        match self {
            Self::Linear { nodes, .. } | Self::Quadratic { nodes, .. } => nodes,
        }
    }

    /// Indices of the linear elements the handle consists of.
    #[must_use]
    pub fn sub_elements(&self) -> &[usize] {
        match self {
            Self::Linear { element, .. } => std::slice::from_ref(element),
            Self::Quadratic { sub_elements, .. } => sub_elements,
        }
    }

    /// Whether the handle is quadratic.
    #[must_use]
    pub const fn is_quadratic(&self) -> bool {
        matches!(self, Self::Quadratic { .. })
    }

    /// Volume cells of all linear elements of the handle.
    #[must_use]
    pub fn volume_cells(&self, elements: &[Element]) -> Vec<VolumeCellKey> {
        self.sub_elements()
            .iter()
            .filter_map(|&i| elements.get(i))
            .flat_map(|e| e.cells.iter().copied())
            .collect()
    }

    /// Whether any linear element of the handle is cut.
    #[must_use]
    pub fn is_cut(&self, elements: &[Element]) -> bool {
        self.sub_elements()
            .iter()
            .filter_map(|&i| elements.get(i))
            .any(Element::is_cut)
    }

    /// Reference coordinates of the physical point `x`, found by Newton
    /// iteration on the shape functions of the handle's shape.
    ///
    /// # Errors
    ///
    /// Returns [`MeshError::UnknownNode`] if a node is missing and
    /// [`MeshError::LocalCoordinatesDidNotConverge`] if Newton fails.
    pub fn local_coordinates(
        &self,
        x: &Point3<f64>,
        nodes: &FastHashMap<NodeId, Node>,
    ) -> Result<[f64; 3], MeshError> {
        let coords = self
            .nodes()
            .iter()
            .map(|id| {
                nodes
                    .get(id)
                    .map(|n| *n.coords())
                    .ok_or(MeshError::UnknownNode { node: *id })
            })
            .collect::<Result<Vec<_>, _>>()?;
        let shape = self.shape();
        let map = |xi: &[f64; 3]| -> Result<Point3<f64>, MeshError> {
            let n = shape.shape_functions(xi)?;
            Ok(Point3::from(
                n.iter()
                    .zip(&coords)
                    .fold(Vector3::zeros(), |acc, (ni, p)| acc + p.coords * *ni),
            ))
        };

        let scale = bounding_box(&coords).map_or(1.0, |b| box_diagonal(&b).max(f64::MIN_POSITIVE));
        let mut xi = shape.reference_center();
        for _ in 0..LOCAL_NEWTON_MAX_ITERATIONS {
            let residual = map(&xi)? - x;
            if residual.norm() <= 1e-13 * scale {
                return Ok(xi);
            }
            let mut jacobian = Matrix3::zeros();
            for d in 0..3 {
                let (mut plus, mut minus) = (xi, xi);
                plus[d] += FINITE_DIFFERENCE_STEP;
                minus[d] -= FINITE_DIFFERENCE_STEP;
                let column = (map(&plus)? - map(&minus)?) / (2.0 * FINITE_DIFFERENCE_STEP);
                jacobian.set_column(d, &column);
            }
            let Some(step) = jacobian.lu().solve(&residual) else {
                break;
            };
            for d in 0..3 {
                xi[d] -= step[d];
            }
            if step.amax() <= 1e-14 {
                return Ok(xi);
            }
        }
        Err(MeshError::LocalCoordinatesDidNotConverge {
            element: self.id(),
            iterations: LOCAL_NEWTON_MAX_ITERATIONS,
        })
    }
}
