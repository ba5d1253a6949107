//! Boundary cells: the cut surface restricted to one volume cell.

use nalgebra::{Point3, Vector3};
use slotmap::new_key_type;

use crate::core::integration::IntegrationPoint;
use crate::core::side::SideId;
use crate::core::volume_cell::VolumeCellKey;
use crate::geometry::shape::CellShape;

new_key_type! {
    /// Key of a boundary cell in the mesh arena.
    pub struct BoundaryCellKey;
}

/// A `Tri3` piece of a cutter side inside one volume cell, oriented along the
/// cutter normal.
#[derive(Clone, Debug)]
pub struct BoundaryCell {
    pub(crate) cell: VolumeCellKey,
    pub(crate) side_id: SideId,
    pub(crate) points: [Point3<f64>; 3],
    pub(crate) normal: Vector3<f64>,
    pub(crate) area: f64,
    pub(crate) gauss_points: Vec<IntegrationPoint>,
}

impl BoundaryCell {
    /// Boundary triangle; returns `None` for zero area. The corners are
    /// reordered if needed so the right-hand normal matches `cutter_normal`.
    pub(crate) fn new(
        cell: VolumeCellKey,
        side_id: SideId,
        mut points: [Point3<f64>; 3],
        cutter_normal: &Vector3<f64>,
    ) -> Option<Self> {
        let mut area_vector = (points[1] - points[0]).cross(&(points[2] - points[0])) * 0.5;
        let area = area_vector.norm();
        if area <= f64::MIN_POSITIVE {
            return None;
        }
        if area_vector.dot(cutter_normal) < 0.0 {
            points.swap(1, 2);
            area_vector = -area_vector;
        }
        Some(Self {
            cell,
            side_id,
            points,
            normal: area_vector / area,
            area,
            gauss_points: Vec::new(),
        })
    }

    /// Shape of the cell (always `Tri3`).
    #[must_use]
    pub const fn shape(&self) -> CellShape {
        CellShape::Tri3
    }

    /// Volume cell the boundary cell belongs to.
    #[must_use]
    pub const fn volume_cell(&self) -> VolumeCellKey {
        self.cell
    }

    /// Cutter side the cell lies on.
    #[must_use]
    pub const fn side_id(&self) -> SideId {
        self.side_id
    }

    /// Corners.
    #[must_use]
    pub const fn points(&self) -> &[Point3<f64>; 3] {
        &self.points
    }

    /// Unit normal (cutter orientation).
    #[must_use]
    pub const fn normal(&self) -> &Vector3<f64> {
        &self.normal
    }

    /// Area.
    #[must_use]
    pub const fn area(&self) -> f64 {
        self.area
    }

    /// Surface quadrature points; every point carries [`Self::normal`].
    #[must_use]
    pub fn gauss_points(&self) -> &[IntegrationPoint] {
        &self.gauss_points
    }
}
