//! Consistency checks of a finished cut.
//!
//! - Volume conservation: the cells of an element fill the element.
//! - Manifold closure: every edge of every convex piece is shared by exactly
//!   two of its faces.
//! - Facet closure: the outward area vectors of the facets of a cell sum to
//!   zero, and the divergence theorem applied to the facets reproduces the
//!   cell volume.

use nalgebra::Vector3;
use std::fmt;
use thiserror::Error;

use crate::core::element::ElementId;
use crate::core::mesh::Mesh;
use crate::core::volume_cell::{VolumeCell, VolumeCellKey};

/// A violated invariant of a cut.
#[derive(Clone, Debug, Error, PartialEq)]
pub enum ValidationError {
    /// The cells of an element do not add up to its volume.
    #[error("element {element}: cell volumes sum to {actual}, element volume is {expected}")]
    VolumeNotConserved {
        /// Element id.
        element: ElementId,
        /// Element volume.
        expected: f64,
        /// Sum of the cell volumes.
        actual: f64,
    },
    /// A convex piece is not a closed 2-manifold.
    #[error("element {element}: piece {piece} is not closed")]
    OpenFacetSet {
        /// Element id.
        element: ElementId,
        /// Index of the piece among the element's pieces.
        piece: usize,
    },
    /// The facets of a cell do not close.
    #[error("element {element}: facets of cell {cell} leave an area imbalance of {imbalance}")]
    FacetAreaImbalance {
        /// Element id.
        element: ElementId,
        /// Cell ordinal.
        cell: usize,
        /// Norm of the summed outward area vectors.
        imbalance: f64,
    },
    /// The volume enclosed by the facets of a cell differs from the cell volume.
    #[error("element {element}: facets of cell {cell} enclose {actual}, cell volume is {expected}")]
    CellVolumeMismatch {
        /// Element id.
        element: ElementId,
        /// Cell ordinal.
        cell: usize,
        /// Volume of the convex pieces.
        expected: f64,
        /// Volume from the divergence theorem over the facets.
        actual: f64,
    },
}

/// Outcome of [`validate`].
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ValidationReport {
    /// Linear elements checked.
    pub elements_checked: usize,
    /// Volume cells checked.
    pub cells_checked: usize,
    /// All violations found.
    pub errors: Vec<ValidationError>,
}

impl ValidationReport {
    /// Whether no violation was found.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    /// The first violation as an error.
    ///
    /// # Errors
    ///
    /// Returns the first collected [`ValidationError`].
    pub fn into_result(self) -> Result<(), ValidationError> {
        match self.errors.into_iter().next() {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }
}

impl fmt::Display for ValidationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} elements, {} cells checked, {} violations",
            self.elements_checked,
            self.cells_checked,
            self.errors.len()
        )
    }
}

/// Summed outward area vector and divergence volume of the facets of a cell.
fn facet_closure(mesh: &Mesh, key: VolumeCellKey, cell: &VolumeCell) -> (Vector3<f64>, f64) {
    let mut area = Vector3::zeros();
    let mut volume = 0.0;
    for facet in cell.facets.iter().filter_map(|&f| mesh.entities.facets.get(f)) {
        let Some(normal) = facet.outward_normal(key) else {
            continue;
        };
        let vector = normal * facet.area();
        area += vector;
        volume += facet.centroid().coords.dot(&vector) / 3.0;
    }
    (area, volume)
}

/// Check the invariants of the last cut.
///
/// `relative_tolerance` scales the element volume for volume checks and the
/// squared element size for area checks.
#[must_use]
pub fn validate(mesh: &Mesh, relative_tolerance: f64) -> ValidationReport {
    let mut report = ValidationReport::default();
    for element in &mesh.elements {
        if element.cells.is_empty() {
            continue;
        }
        report.elements_checked += 1;
        let volume_tolerance = relative_tolerance * element.volume;
        let length = element.volume.cbrt();
        let area_tolerance = relative_tolerance * length * length;

        let mut total = 0.0;
        let mut piece_index = 0;
        for &key in &element.cells {
            let Some(cell) = mesh.entities.volume_cells.get(key) else {
                continue;
            };
            report.cells_checked += 1;
            total += cell.volume;
            for piece in &cell.pieces {
                if !piece.is_closed() {
                    report.errors.push(ValidationError::OpenFacetSet {
                        element: element.id(),
                        piece: piece_index,
                    });
                }
                piece_index += 1;
            }

            let (area, enclosed) = facet_closure(mesh, key, cell);
            if area.norm() > area_tolerance {
                report.errors.push(ValidationError::FacetAreaImbalance {
                    element: element.id(),
                    cell: cell.ordinal,
                    imbalance: area.norm(),
                });
            }
            if (enclosed - cell.volume).abs() > volume_tolerance.max(area_tolerance * length) {
                report.errors.push(ValidationError::CellVolumeMismatch {
                    element: element.id(),
                    cell: cell.ordinal,
                    expected: cell.volume,
                    actual: enclosed,
                });
            }
        }
        if (total - element.volume).abs() > volume_tolerance {
            report.errors.push(ValidationError::VolumeNotConserved {
                element: element.id(),
                expected: element.volume,
                actual: total,
            });
        }
    }
    for error in &report.errors {
        tracing::warn!(%error, "cut validation failed");
    }
    tracing::debug!(%report, "cut validated");
    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::mesh_intersection::MeshIntersection;
    use crate::core::options::OptionsBuilder;
    use crate::geometry::shape::CellShape;
    use nalgebra::Point3;

    fn cut_tet() -> MeshIntersection {
        let options = OptionsBuilder::default().validate(false).build().unwrap();
        let mut intersection = MeshIntersection::new(options);
        let m = intersection.add_cut_mesh();
        let coords = [
            Point3::new(-1.0, -1.0, 0.25),
            Point3::new(2.0, -1.0, 0.25),
            Point3::new(-1.0, 2.0, 0.25),
        ];
        intersection
            .add_cut_side(1, &[11, 12, 13], &coords, CellShape::Tri3, m)
            .unwrap();
        let tet = [
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(1.0, 0.0, 0.0),
            Point3::new(0.0, 1.0, 0.0),
            Point3::new(0.0, 0.0, 1.0),
        ];
        intersection.add_element(1, &[1, 2, 3, 4], &tet, CellShape::Tet4).unwrap();
        intersection.cut(false).unwrap();
        intersection
    }

    #[test]
    fn test_valid_cut_passes_all_checks() {
        let intersection = cut_tet();
        let report = intersection.validate();
        assert!(report.is_valid(), "{:?}", report.errors);
        assert_eq!(report.elements_checked, 1);
        assert_eq!(report.cells_checked, 2);
        assert!(report.into_result().is_ok());
    }

    #[test]
    fn test_tampered_cell_volume_is_reported() {
        let intersection = cut_tet();
        let mut mesh = intersection.mesh().clone();
        let key = mesh.elements[0].cells[0];
        mesh.entities.volume_cells[key].volume *= 1.5;
        let report = validate(&mesh, intersection.options().relative_tolerance);
        assert!(!report.is_valid());
        assert!(
            report
                .errors
                .iter()
                .any(|e| matches!(e, ValidationError::VolumeNotConserved { element: 1, .. }))
        );
        assert!(
            report
                .errors
                .iter()
                .any(|e| matches!(e, ValidationError::CellVolumeMismatch { element: 1, .. }))
        );

        // Dropping a facet opens the cell.
        let mut mesh = intersection.mesh().clone();
        mesh.entities.volume_cells[key].facets.pop();
        let report = validate(&mesh, 1e-8);
        assert!(
            report
                .errors
                .iter()
                .any(|e| matches!(e, ValidationError::FacetAreaImbalance { element: 1, .. }))
        );
        assert_eq!(report.to_string().split(',').count(), 3);
    }
}
