//! Background element edges and the points where the cutter crosses them.

use ordered_float::OrderedFloat;

use crate::core::node::NodeId;
use crate::core::point_pool::PointKey;
use crate::core::side::SideId;

/// Edge identity: the two node ids in ascending order.
pub type EdgeKey = (NodeId, NodeId);

/// Canonical key of the edge between `a` and `b`.
#[must_use]
pub const fn edge_key(a: NodeId, b: NodeId) -> EdgeKey {
    if a <= b { (a, b) } else { (b, a) }
}

/// A point where a cutter side crosses an edge.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct CutPoint {
    /// Pooled point.
    pub point: PointKey,
    /// Parameter along the edge from the smaller to the larger node id.
    pub t: f64,
    /// Cutter side producing the point.
    pub side_id: SideId,
}

/// A corner edge of the background mesh.
#[derive(Clone, Debug)]
pub struct Edge {
    key: EdgeKey,
    cut_points: Vec<CutPoint>,
    coincident_sides: Vec<SideId>,
}

impl Edge {
    /// New edge without cut points.
    #[must_use]
    pub const fn new(key: EdgeKey) -> Self {
        Self {
            key,
            cut_points: Vec::new(),
            coincident_sides: Vec::new(),
        }
    }

    /// Node pair of the edge.
    #[must_use]
    pub const fn key(&self) -> EdgeKey {
        self.key
    }

    /// Cut points sorted along the edge.
    #[must_use]
    pub fn cut_points(&self) -> &[CutPoint] {
        &self.cut_points
    }

    /// Sides the edge lies in.
    #[must_use]
    pub fn coincident_sides(&self) -> &[SideId] {
        &self.coincident_sides
    }

    /// Whether any cutter side crosses or contains the edge.
    #[must_use]
    pub fn is_cut(&self) -> bool {
        !self.cut_points.is_empty() || !self.coincident_sides.is_empty()
    }

    /// Record a cut point; repeated points (same pool key) are merged.
    pub(crate) fn add_cut_point(&mut self, cut: CutPoint) {
        if self.cut_points.iter().any(|c| c.point == cut.point) {
            return;
        }
        self.cut_points.push(cut);
        self.cut_points.sort_by_key(|c| OrderedFloat(c.t));
    }

    pub(crate) fn add_coincident_side(&mut self, side: SideId) {
        if !self.coincident_sides.contains(&side) {
            self.coincident_sides.push(side);
        }
    }
}
