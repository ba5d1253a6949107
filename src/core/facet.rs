//! Facets: planar polygons bounding volume cells.
//!
//! A facet either lies on a side of its background element (and then belongs
//! to one volume cell) or on the cut surface between two volume cells of the
//! same element. Facets on an element side may additionally coincide with a
//! cutter side.
//!
//! # Orientation
//!
//! [`Facet::normal`] is the unit normal pointing out of `cells()[0]`; use
//! [`Facet::outward_normal`] to get the normal seen from a specific cell.

use nalgebra::{Point3, Vector3};
use serde::{Deserialize, Serialize};
use slotmap::new_key_type;

use crate::core::collections::SmallBuffer;
use crate::core::point_pool::PointKey;
use crate::core::polyhedron::FacePoints;
use crate::core::side::SideId;
use crate::core::volume_cell::VolumeCellKey;
use crate::geometry::polygon::{self, Polygon};

new_key_type! {
    /// Key of a facet in the mesh arena.
    pub struct FacetKey;
}

/// Where a facet comes from.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FacetTag {
    /// Part of the element side with this index.
    ElementSide(usize),
    /// Part of the cutter side with this id, separating two volume cells.
    CutSide(SideId),
}

/// A planar, convex facet of one or two volume cells.
#[derive(Clone, Debug)]
pub struct Facet {
    pub(crate) points: FacePoints,
    pub(crate) coords: Polygon,
    pub(crate) element: usize,
    pub(crate) tag: FacetTag,
    pub(crate) coincident_cut_side: Option<SideId>,
    pub(crate) cells: SmallBuffer<VolumeCellKey, 2>,
    pub(crate) normal: Vector3<f64>,
    pub(crate) area: f64,
}

impl Facet {
    /// Facet over the given pooled points, oriented out of its first cell.
    ///
    /// Returns `None` for a degenerate polygon.
    pub(crate) fn new(points: FacePoints, coords: Polygon, element: usize, tag: FacetTag) -> Option<Self> {
        let area_vector = polygon::area_vector(&coords);
        let area = area_vector.norm();
        if points.len() < 3 || area <= f64::MIN_POSITIVE {
            return None;
        }
        Some(Self {
            points,
            coords,
            element,
            tag,
            coincident_cut_side: None,
            cells: SmallBuffer::new(),
            normal: area_vector / area,
            area,
        })
    }

    /// Pooled corner points.
    #[must_use]
    pub fn points(&self) -> &[PointKey] {
        &self.points
    }

    /// Corner coordinates.
    #[must_use]
    pub fn coords(&self) -> &[Point3<f64>] {
        &self.coords
    }

    /// Index of the linear element the facet belongs to.
    #[must_use]
    pub const fn element_index(&self) -> usize {
        self.element
    }

    /// Origin of the facet.
    #[must_use]
    pub const fn tag(&self) -> FacetTag {
        self.tag
    }

    /// Cutter side lying on this element-side facet, if any.
    #[must_use]
    pub const fn coincident_cut_side(&self) -> Option<SideId> {
        self.coincident_cut_side
    }

    /// Whether the facet lies on the cut surface.
    #[must_use]
    pub const fn on_cut_side(&self) -> bool {
        matches!(self.tag, FacetTag::CutSide(_)) || self.coincident_cut_side.is_some()
    }

    /// Id of the cutter side the facet lies on.
    #[must_use]
    pub const fn side_id(&self) -> Option<SideId> {
        match self.tag {
            FacetTag::CutSide(id) => Some(id),
            FacetTag::ElementSide(_) => self.coincident_cut_side,
        }
    }

    /// Volume cells bounded by the facet (one or two).
    #[must_use]
    pub fn cells(&self) -> &[VolumeCellKey] {
        &self.cells
    }

    /// Unit normal pointing out of `cells()[0]`.
    #[must_use]
    pub const fn normal(&self) -> &Vector3<f64> {
        &self.normal
    }

    /// Unit normal pointing out of `cell`, or `None` if the facet does not
    /// bound it.
    #[must_use]
    pub fn outward_normal(&self, cell: VolumeCellKey) -> Option<Vector3<f64>> {
        match self.cells.iter().position(|&c| c == cell)? {
            0 => Some(self.normal),
            _ => Some(-self.normal),
        }
    }

    /// Polygon area.
    #[must_use]
    pub const fn area(&self) -> f64 {
        self.area
    }

    /// Area centroid.
    #[must_use]
    pub fn centroid(&self) -> Point3<f64> {
        polygon::centroid(&self.coords)
    }

    /// Fan triangulation in the facet's orientation.
    pub fn triangles(&self) -> impl Iterator<Item = [Point3<f64>; 3]> + '_ {
        polygon::fan_triangles(&self.coords)
    }

    /// Whether the facet has two cells.
    #[must_use]
    pub fn is_shared(&self) -> bool {
        self.cells.len() == 2
    }

    /// Corners oriented out of `cell`.
    #[must_use]
    pub fn coords_outward(&self, cell: VolumeCellKey) -> Polygon {
        if self.cells.first() == Some(&cell) {
            self.coords.clone()
        } else {
            self.coords.iter().rev().copied().collect()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::point_pool::PointPool;
    use approx::assert_relative_eq;
    use slotmap::SlotMap;

    #[test]
    fn test_facet_orientation_per_cell() {
        let mut pool = PointPool::new(1e-10);
        let coords: Polygon = [
            Point3::new(0.0, 0.0, 0.5),
            Point3::new(1.0, 0.0, 0.5),
            Point3::new(1.0, 1.0, 0.5),
            Point3::new(0.0, 1.0, 0.5),
        ]
        .into_iter()
        .collect();
        let points: FacePoints = coords.iter().map(|&p| pool.get_or_insert(p)).collect();
        let mut facet = Facet::new(points, coords, 0, FacetTag::CutSide(7)).unwrap();

        let mut keys: SlotMap<VolumeCellKey, ()> = SlotMap::with_key();
        let (below, above, other) = (keys.insert(()), keys.insert(()), keys.insert(()));
        facet.cells.push(below);
        facet.cells.push(above);

        assert!(facet.on_cut_side());
        assert!(facet.is_shared());
        assert_eq!(facet.side_id(), Some(7));
        assert_relative_eq!(facet.area(), 1.0, epsilon = 1e-14);
        assert_relative_eq!(facet.outward_normal(below).unwrap(), Vector3::z(), epsilon = 1e-14);
        assert_relative_eq!(facet.outward_normal(above).unwrap(), -Vector3::z(), epsilon = 1e-14);
        assert!(facet.outward_normal(other).is_none());
        assert_relative_eq!(
            polygon::unit_normal(&facet.coords_outward(above)).unwrap(),
            -Vector3::z(),
            epsilon = 1e-14
        );
        assert_eq!(facet.triangles().count(), 2);
        assert_relative_eq!(facet.centroid(), Point3::new(0.5, 0.5, 0.5), epsilon = 1e-14);
    }

    #[test]
    fn test_element_side_facet_with_coincident_cutter() {
        let coords: Polygon = [
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(0.0, 1.0, 0.0),
            Point3::new(1.0, 0.0, 0.0),
        ]
        .into_iter()
        .collect();
        let mut pool = PointPool::new(1e-10);
        let points: FacePoints = coords.iter().map(|&p| pool.get_or_insert(p)).collect();
        let mut facet = Facet::new(points, coords, 2, FacetTag::ElementSide(0)).unwrap();
        assert!(!facet.on_cut_side());
        assert_eq!(facet.side_id(), None);
        facet.coincident_cut_side = Some(11);
        assert!(facet.on_cut_side());
        assert_eq!(facet.side_id(), Some(11));
        assert_eq!(facet.element_index(), 2);
    }

    #[test]
    fn test_degenerate_facet_rejected() {
        let coords: Polygon = [Point3::origin(), Point3::new(1.0, 0.0, 0.0), Point3::new(2.0, 0.0, 0.0)]
            .into_iter()
            .collect();
        let mut pool = PointPool::new(1e-10);
        let points: FacePoints = coords.iter().map(|&p| pool.get_or_insert(p)).collect();
        assert!(Facet::new(points, coords, 0, FacetTag::ElementSide(1)).is_none());
    }
}
