//! Background mesh nodes and their cut position.

use nalgebra::{Point3, Vector3};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::core::collections::SmallBuffer;
use crate::core::dofsets::NodalDofSet;
use crate::core::point_pool::PointKey;

/// Global node id. Negative ids denote shadow nodes created for quadratic
/// shapes (face and body centres that the input mesh does not carry).
pub type NodeId = i32;

/// Position of a node or volume cell relative to the cutter surface.
///
/// `Inside` is the side the cutter normal points away from.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Position {
    /// Not (yet) determined.
    #[default]
    Undecided,
    /// Behind the cutter surface.
    Inside,
    /// In front of the cutter surface.
    Outside,
    /// On the cutter surface (nodes only).
    OnCutSurface,
}

impl Position {
    /// Whether the position is `Inside` or `Outside`.
    #[must_use]
    pub const fn is_decided(self) -> bool {
        matches!(self, Self::Inside | Self::Outside)
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Undecided => write!(f, "undecided"),
            Self::Inside => write!(f, "inside"),
            Self::Outside => write!(f, "outside"),
            Self::OnCutSurface => write!(f, "oncutsurface"),
        }
    }
}

/// A node of the background mesh.
#[derive(Clone, Debug)]
pub struct Node {
    id: NodeId,
    coords: Point3<f64>,
    pub(crate) point: Option<PointKey>,
    pub(crate) position: Position,
    pub(crate) dof_sets: Vec<NodalDofSet>,
}

impl Node {
    pub(crate) const fn new(id: NodeId, coords: Point3<f64>) -> Self {
        Self {
            id,
            coords,
            point: None,
            position: Position::Undecided,
            dof_sets: Vec::new(),
        }
    }

    /// Node id.
    #[must_use]
    pub const fn id(&self) -> NodeId {
        self.id
    }

    /// Whether this node was created internally for a quadratic shape.
    #[must_use]
    pub const fn is_shadow(&self) -> bool {
        self.id < 0
    }

    /// Current coordinates.
    #[must_use]
    pub const fn coords(&self) -> &Point3<f64> {
        &self.coords
    }

    pub(crate) const fn set_coords(&mut self, coords: Point3<f64>) {
        self.coords = coords;
    }

    /// Pool key of the node's point, valid during one cut.
    #[must_use]
    pub const fn point(&self) -> Option<PointKey> {
        self.point
    }

    /// Position after the last cut.
    #[must_use]
    pub const fn position(&self) -> Position {
        self.position
    }

    /// DOF sets of the node after the last cut; index 0 is the standard set.
    #[must_use]
    pub fn dof_sets(&self) -> &[NodalDofSet] {
        &self.dof_sets
    }

    /// Number of DOF sets.
    #[must_use]
    pub fn num_dof_sets(&self) -> usize {
        self.dof_sets.len()
    }

    pub(crate) fn reset_cut_state(&mut self) {
        self.point = None;
        self.position = Position::Undecided;
        self.dof_sets.clear();
    }
}

/// A node that quadratic serendipity shapes lack but their linear
/// decomposition needs: the centre of a `Quad8` face or of a `Hex20`.
///
/// Its coordinates are the serendipity interpolation at the centre:
/// `-1/4 Σ corners + mid_weight Σ mid-edge nodes`.
#[derive(Clone, Debug, PartialEq)]
pub(crate) struct ShadowNode {
    pub id: NodeId,
    pub corners: SmallBuffer<NodeId, 8>,
    pub mids: SmallBuffer<NodeId, 12>,
    pub mid_weight: f64,
}

impl ShadowNode {
    /// Current coordinates, or `None` if a defining node is missing.
    pub fn coords(&self, lookup: impl Fn(NodeId) -> Option<Point3<f64>>) -> Option<Point3<f64>> {
        let mut sum = Vector3::zeros();
        for &id in &self.corners {
            sum -= lookup(id)?.coords * 0.25;
        }
        for &id in &self.mids {
            sum += lookup(id)?.coords * self.mid_weight;
        }
        Some(Point3::from(sum))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_node_basics() {
        let mut node = Node::new(-3, Point3::new(1.0, 2.0, 3.0));
        assert!(node.is_shadow());
        assert_eq!(node.position(), Position::Undecided);
        node.position = Position::Outside;
        node.reset_cut_state();
        assert_eq!(node.position(), Position::Undecided);
        assert_eq!(node.num_dof_sets(), 0);
        node.set_coords(Point3::origin());
        assert_eq!(node.coords(), &Point3::origin());
    }

    #[test]
    fn test_shadow_node_is_centre_of_flat_quad8() {
        let mut coords = crate::core::collections::FastHashMap::default();
        let corners = [(1, [0.0, 0.0]), (2, [2.0, 0.0]), (3, [2.0, 2.0]), (4, [0.0, 2.0])];
        let mids = [(5, [1.0, 0.0]), (6, [2.0, 1.0]), (7, [1.0, 2.0]), (8, [0.0, 1.0])];
        for (id, [x, y]) in corners.into_iter().chain(mids) {
            coords.insert(id, Point3::new(x, y, 3.0));
        }
        let shadow = ShadowNode {
            id: -1,
            corners: (1..=4).collect(),
            mids: (5..=8).collect(),
            mid_weight: 0.5,
        };
        assert_eq!(shadow.coords(|id| coords.get(&id).copied()), Some(Point3::new(1.0, 1.0, 3.0)));
        coords.remove(&7);
        assert_eq!(shadow.coords(|id| coords.get(&id).copied()), None);
    }

    #[test]
    fn test_position_display_and_decided() {
        assert!(Position::Inside.is_decided());
        assert!(!Position::OnCutSurface.is_decided());
        assert_eq!(Position::OnCutSurface.to_string(), "oncutsurface");
        let json = serde_json::to_string(&Position::Outside).unwrap();
        assert_eq!(json, "\"Outside\"");
    }
}
