//! Building volume cells, facets and boundary cells of one element from its
//! split convex pieces.
//!
//! # Algorithm
//!
//! 1. **Contacts.** Faces of different pieces touching each other are paired.
//!    Faces with the same point set are twins; remaining faces are paired
//!    geometrically (coplanar, opposite normals, overlapping area).
//! 2. **Coverage.** Each contact is intersected with the coplanar cutter
//!    triangles. A contact that is not covered at all, or has an uncovered
//!    remainder, joins its two pieces.
//! 3. **Cells.** Connected groups of pieces become volume cells.
//! 4. **Facets.** Element-side faces become single-cell facets. Covered
//!    contacts between different cells become shared cut facets; covered
//!    contacts inside one cell are slits and only produce boundary cells.
//! 5. **Boundary cells.** Every covered polygon is fan-triangulated into `Tri3`
//!    boundary cells along the cutter normal.
//! 6. **Votes.** Covered area where the cutter normal points out of a cell
//!    votes `Inside`, area where it points into the cell votes `Outside`.

use nalgebra::{Point3, Vector3};

use crate::core::algorithms::element_cut::CutPlane;
use crate::core::boundary_cell::BoundaryCell;
use crate::core::collections::{FastHashMap, SmallBuffer};
use crate::core::element::ElementId;
use crate::core::facet::{Facet, FacetTag};
use crate::core::mesh::CutEntities;
use crate::core::node::Position;
use crate::core::point_pool::PointPool;
use crate::core::polyhedron::{ConvexPiece, FacePoints, FaceTag, PieceFace};
use crate::core::side::{CutTriangle, SideId};
use crate::core::util::components::{Adjacency, components_among, connect};
use crate::core::volume_cell::{VolumeCell, VolumeCellKey};
use crate::geometry::plane::Plane;
use crate::geometry::polygon::{self, Polygon};

/// Cosine below which two unit normals count as opposite.
const OPPOSITE_NORMALS: f64 = -1.0 + 1e-9;

/// Per-element input of the cell builder.
#[derive(Clone, Copy, Debug)]
pub struct CellBuildContext<'a> {
    /// Index of the linear element.
    pub element: usize,
    /// Id of the user element.
    pub element_id: ElementId,
    /// Cut planes the pieces were split with.
    pub planes: &'a [CutPlane],
    /// Indices of the relevant triangles.
    pub relevant: &'a [usize],
    /// All cutter triangles.
    pub triangles: &'a [CutTriangle],
    /// Absolute distance tolerance.
    pub tolerance: f64,
    /// Areas up to this value are negligible.
    pub area_tolerance: f64,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
struct FaceRef {
    piece: usize,
    face: usize,
}

/// Part of a polygon covered by one cutter triangle.
#[derive(Clone, Debug)]
struct Covered {
    triangle: usize,
    polygon: Polygon,
    area: f64,
}

#[derive(Clone, Debug)]
struct Contact {
    a: FaceRef,
    b: FaceRef,
    points: Option<FacePoints>,
    polygon: Polygon,
    area: f64,
    coverage: SmallBuffer<Covered, 4>,
}

impl Contact {
    fn covered_area(&self) -> f64 {
        self.coverage.iter().map(|c| c.area).sum::<f64>().min(self.area)
    }
}

#[derive(Clone, Copy, Debug, Default)]
struct Votes {
    inside: f64,
    outside: f64,
}

impl CellBuildContext<'_> {
    /// Parts of `polygon` covered by coplanar cutter triangles.
    fn coverage(&self, polygon: &[Point3<f64>], tag: FaceTag) -> SmallBuffer<Covered, 4> {
        let mut out = SmallBuffer::new();
        let plane = polygon::unit_normal(polygon)
            .and_then(|n| Plane::from_normal_and_point(&n, polygon.first()?));
        let Some(plane) = plane else {
            return out;
        };
        let candidates: SmallBuffer<usize, 8> = match tag {
            FaceTag::CutPlane(j) => self.planes.get(j).map(|c| c.triangles.clone()).unwrap_or_default(),
            FaceTag::ElementSide(_) | FaceTag::Internal => self
                .relevant
                .iter()
                .copied()
                .filter(|&t| {
                    self.triangles.get(t).is_some_and(|tri| {
                        tri.plane.coincides_with(&plane, self.tolerance)
                            && polygon::lies_in_plane(&tri.points, &plane, self.tolerance)
                    })
                })
                .collect(),
        };
        // Faces of thin layers can be smaller than the area tolerance.
        let min_area = self.area_tolerance.min(0.5 * polygon::area(polygon));
        for t in candidates {
            let Some(tri) = self.triangles.get(t) else {
                continue;
            };
            let overlap = polygon::convex_overlap(polygon, &tri.points, self.tolerance);
            let area = polygon::area(&overlap);
            if area > min_area {
                out.push(Covered {
                    triangle: t,
                    polygon: overlap,
                    area,
                });
            }
        }
        out
    }

    fn side_of(&self, triangle: usize) -> SideId {
        self.triangles.get(triangle).map_or(0, |t| t.side_id)
    }

    fn normal_of(&self, triangle: usize) -> Vector3<f64> {
        self.triangles
            .get(triangle)
            .map_or_else(Vector3::zeros, |t| *t.normal())
    }

    /// Side with the largest covered area.
    fn dominant_side(&self, coverage: &[Covered]) -> Option<SideId> {
        coverage
            .iter()
            .max_by(|a, b| a.area.total_cmp(&b.area))
            .map(|c| self.side_of(c.triangle))
    }
}

fn face_at(pieces: &[ConvexPiece], r: FaceRef) -> &PieceFace {
    &pieces[r.piece].faces()[r.face]
}

/// Find the contacts between faces of different pieces.
fn find_contacts(ctx: &CellBuildContext<'_>, pieces: &[ConvexPiece], pool: &PointPool) -> (Vec<Contact>, Vec<FaceRef>) {
    let mut by_points: FastHashMap<FacePoints, SmallBuffer<FaceRef, 2>> = FastHashMap::default();
    for (p, piece) in pieces.iter().enumerate() {
        for (f, face) in piece.faces().iter().enumerate() {
            if face.tag.element_side().is_some() {
                continue;
            }
            let mut key = face.points.clone();
            key.sort_unstable();
            by_points.entry(key).or_default().push(FaceRef { piece: p, face: f });
        }
    }

    let mut contacts = Vec::new();
    let mut unmatched = Vec::new();
    let mut twins: Vec<(FaceRef, FaceRef)> = Vec::new();
    for refs in by_points.into_values() {
        match refs.as_slice() {
            [a, b] if a.piece != b.piece => twins.push((*a, *b)),
            _ => unmatched.extend(refs),
        }
    }
    twins.sort_by_key(|(a, b)| (a.piece, a.face, b.piece, b.face));
    unmatched.sort_by_key(|r| (r.piece, r.face));

    let face = |r: FaceRef| face_at(pieces, r);
    for (a, b) in twins {
        let polygon = ConvexPiece::face_coords(face(a), pool);
        let coverage = ctx.coverage(&polygon, face(a).tag);
        contacts.push(Contact {
            a,
            b,
            points: Some(face(a).points.clone()),
            area: polygon::area(&polygon),
            polygon,
            coverage,
        });
    }

    // Geometric pairing of the faces without a twin.
    let geometry: Vec<(Polygon, Option<Plane>)> = unmatched
        .iter()
        .map(|&r| {
            let coords = ConvexPiece::face_coords(face(r), pool);
            let plane = polygon::unit_normal(&coords)
                .and_then(|n| Plane::from_normal_and_point(&n, coords.first()?));
            (coords, plane)
        })
        .collect();
    let mut matched_area = vec![0.0; unmatched.len()];
    for i in 0..unmatched.len() {
        let (coords_i, Some(plane_i)) = &geometry[i] else {
            continue;
        };
        for j in (i + 1)..unmatched.len() {
            let (coords_j, Some(plane_j)) = &geometry[j] else {
                continue;
            };
            if unmatched[i].piece == unmatched[j].piece
                || plane_i.normal.dot(&plane_j.normal) > OPPOSITE_NORMALS
                || (plane_i.w + plane_j.w).abs() > ctx.tolerance
            {
                continue;
            }
            let overlap = polygon::convex_overlap(coords_i, coords_j, ctx.tolerance);
            let area = polygon::area(&overlap);
            if area <= ctx.area_tolerance {
                continue;
            }
            matched_area[i] += area;
            matched_area[j] += area;
            let coverage = ctx.coverage(&overlap, face(unmatched[i]).tag);
            contacts.push(Contact {
                a: unmatched[i],
                b: unmatched[j],
                points: None,
                polygon: overlap,
                area,
                coverage,
            });
        }
    }

    let lonely = unmatched
        .iter()
        .zip(&matched_area)
        .filter(|&(_, &area)| area <= ctx.area_tolerance)
        .map(|(&r, _)| r)
        .collect();
    (contacts, lonely)
}

/// Build the volume cells of one element and register them, their facets and
/// boundary cells in `entities`. Returns the cell keys in creation order.
pub fn build_cells(
    ctx: &CellBuildContext<'_>,
    pieces: Vec<ConvexPiece>,
    pool: &mut PointPool,
    entities: &mut CutEntities,
) -> Vec<VolumeCellKey> {
    let (contacts, lonely) = find_contacts(ctx, &pieces, pool);

    // Pieces connected through uncovered contact area form one cell.
    let mut adjacency: Adjacency<usize> = Adjacency::default();
    for contact in &contacts {
        if contact.coverage.is_empty() || contact.area - contact.covered_area() > ctx.area_tolerance {
            connect(&mut adjacency, contact.a.piece, contact.b.piece);
        }
    }
    let indices: Vec<usize> = (0..pieces.len()).collect();
    let groups = components_among(&indices, &adjacency);
    let mut cell_of_piece = vec![0; pieces.len()];
    for (c, group) in groups.iter().enumerate() {
        for &p in group {
            cell_of_piece[p] = c;
        }
    }

    let keys: Vec<VolumeCellKey> = groups
        .iter()
        .enumerate()
        .map(|(ordinal, group)| {
            let cell_pieces = group.iter().map(|&p| pieces[p].clone()).collect();
            entities
                .volume_cells
                .insert(VolumeCell::new(ctx.element, ctx.element_id, ordinal, cell_pieces))
        })
        .collect();
    let mut votes = vec![Votes::default(); keys.len()];
    let mut vote = |cell: usize, covered: &Covered, outward: &Vector3<f64>| {
        let alignment = ctx.normal_of(covered.triangle).dot(outward);
        if alignment > 0.0 {
            votes[cell].inside += covered.area;
        } else if alignment < 0.0 {
            votes[cell].outside += covered.area;
        }
    };

    // Element-side facets.
    for (p, piece) in pieces.iter().enumerate() {
        for face in piece.faces() {
            let Some(side) = face.tag.element_side() else {
                continue;
            };
            let coords = ConvexPiece::face_coords(face, pool);
            let Some(mut facet) = Facet::new(face.points.clone(), coords, ctx.element, FacetTag::ElementSide(side))
            else {
                continue;
            };
            let cell = cell_of_piece[p];
            let coverage = ctx.coverage(&facet.coords, face.tag);
            facet.coincident_cut_side = ctx.dominant_side(&coverage);
            facet.cells.push(keys[cell]);
            let outward = facet.normal;
            for covered in &coverage {
                vote(cell, covered, &outward);
                if ctx.normal_of(covered.triangle).dot(&outward) > 0.0 {
                    add_boundary_cells(ctx, entities, keys[cell], covered);
                }
            }
            insert_facet(entities, facet);
        }
    }

    // Cut facets and slits.
    for contact in &contacts {
        if contact.coverage.is_empty() {
            continue;
        }
        let (ca, cb) = (cell_of_piece[contact.a.piece], cell_of_piece[contact.b.piece]);
        let outward = polygon::unit_normal(&contact.polygon).unwrap_or_else(Vector3::zeros);
        if ca == cb {
            for covered in &contact.coverage {
                add_boundary_cells(ctx, entities, keys[ca], covered);
            }
            continue;
        }
        let Some(side) = ctx.dominant_side(&contact.coverage) else {
            continue;
        };
        let points = contact.points.clone().unwrap_or_else(|| register(&contact.polygon, pool));
        let Some(mut facet) = Facet::new(points, contact.polygon.clone(), ctx.element, FacetTag::CutSide(side)) else {
            continue;
        };
        facet.cells.push(keys[ca]);
        facet.cells.push(keys[cb]);
        for covered in &contact.coverage {
            vote(ca, covered, &outward);
            vote(cb, covered, &-outward);
            add_boundary_cells(ctx, entities, keys[ca], covered);
            add_boundary_cells(ctx, entities, keys[cb], covered);
        }
        insert_facet(entities, facet);
    }

    // Faces left without a partner close their cell on the cut surface.
    for r in lonely {
        let face = face_at(&pieces, r);
        let coords = ConvexPiece::face_coords(face, pool);
        let coverage = ctx.coverage(&coords, face.tag);
        let Some(side) = ctx.dominant_side(&coverage) else {
            tracing::debug!(element = ctx.element_id, piece = r.piece, "unmatched uncovered piece face");
            continue;
        };
        let Some(mut facet) = Facet::new(face.points.clone(), coords, ctx.element, FacetTag::CutSide(side)) else {
            continue;
        };
        let cell = cell_of_piece[r.piece];
        facet.cells.push(keys[cell]);
        let outward = facet.normal;
        for covered in &coverage {
            vote(cell, covered, &outward);
            add_boundary_cells(ctx, entities, keys[cell], covered);
        }
        insert_facet(entities, facet);
    }

    for (cell, tally) in votes.iter().enumerate() {
        if tally.inside > ctx.area_tolerance && tally.outside > ctx.area_tolerance {
            tracing::warn!(
                element = ctx.element_id,
                cell,
                inside = tally.inside,
                outside = tally.outside,
                "conflicting position votes"
            );
        }
        let net = tally.inside - tally.outside;
        let position = if net > ctx.area_tolerance {
            Position::Inside
        } else if net < -ctx.area_tolerance {
            Position::Outside
        } else {
            Position::Undecided
        };
        if let Some(vc) = entities.volume_cells.get_mut(keys[cell]) {
            vc.position = position;
        }
    }

    tracing::debug!(
        element = ctx.element_id,
        cells = keys.len(),
        contacts = contacts.len(),
        "volume cells built"
    );
    keys
}

fn register(polygon: &[Point3<f64>], pool: &mut PointPool) -> FacePoints {
    let mut points: FacePoints = polygon.iter().map(|&p| pool.get_or_insert(p)).collect();
    points.dedup();
    while points.len() > 1 && points.first() == points.last() {
        points.pop();
    }
    points
}

fn insert_facet(entities: &mut CutEntities, facet: Facet) {
    let cells = facet.cells.clone();
    let key = entities.facets.insert(facet);
    for cell in cells {
        if let Some(vc) = entities.volume_cells.get_mut(cell) {
            vc.facets.push(key);
        }
    }
}

fn add_boundary_cells(ctx: &CellBuildContext<'_>, entities: &mut CutEntities, cell: VolumeCellKey, covered: &Covered) {
    let normal = ctx.normal_of(covered.triangle);
    let side = ctx.side_of(covered.triangle);
    for tri in polygon::fan_triangles(&covered.polygon) {
        let Some(bc) = BoundaryCell::new(cell, side, tri, &normal) else {
            continue;
        };
        let key = entities.boundary_cells.insert(bc);
        if let Some(vc) = entities.volume_cells.get_mut(cell) {
            vc.boundary_cells.push(key);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::algorithms::element_cut::{collect_planes, split_by_planes};
    use crate::core::element::Element;
    use crate::core::polyhedron::SplitTolerances;
    use crate::geometry::shape::CellShape;
    use approx::assert_relative_eq;

    fn cube_element(pool: &mut PointPool) -> Element {
        let mut element = Element::new(1, CellShape::Hex8, &[1, 2, 3, 4, 5, 6, 7, 8], None);
        element.points = [
            [0.0, 0.0, 0.0],
            [1.0, 0.0, 0.0],
            [1.0, 1.0, 0.0],
            [0.0, 1.0, 0.0],
            [0.0, 0.0, 1.0],
            [1.0, 0.0, 1.0],
            [1.0, 1.0, 1.0],
            [0.0, 1.0, 1.0],
        ]
        .into_iter()
        .map(|c| pool.get_or_insert(Point3::new(c[0], c[1], c[2])))
        .collect();
        element
    }

    fn horizontal_triangles(z: f64, extent: f64) -> Vec<CutTriangle> {
        let p = |x: f64, y: f64| Point3::new(x, y, z);
        vec![
            CutTriangle::new(5, 0, [p(-0.5, -0.5), p(extent, -0.5), p(extent, 1.5)]).unwrap(),
            CutTriangle::new(5, 0, [p(-0.5, -0.5), p(extent, 1.5), p(-0.5, 1.5)]).unwrap(),
        ]
    }

    fn build(triangles: &[CutTriangle]) -> (CutEntities, Vec<VolumeCellKey>) {
        let mut pool = PointPool::new(1e-10);
        let element = cube_element(&mut pool);
        let pieces = element.initial_pieces(&mut pool, 1e-14);
        let relevant: Vec<usize> = (0..triangles.len()).collect();
        let planes = collect_planes(&relevant, triangles, 1e-10);
        let tolerances = SplitTolerances {
            distance: 1e-10,
            volume: 1e-12,
        };
        let pieces = split_by_planes(pieces, &planes, &mut pool, tolerances);
        let ctx = CellBuildContext {
            element: 0,
            element_id: 1,
            planes: &planes,
            relevant: &relevant,
            triangles,
            tolerance: 1e-10,
            area_tolerance: 1e-12,
        };
        let mut entities = CutEntities::default();
        let keys = build_cells(&ctx, pieces, &mut pool, &mut entities);
        (entities, keys)
    }

    #[test]
    fn test_full_cut_gives_two_cells_with_opposite_positions() {
        let triangles = horizontal_triangles(0.4, 1.5);
        let (entities, keys) = build(&triangles);
        assert_eq!(keys.len(), 2);
        let cells: Vec<&VolumeCell> = keys.iter().map(|&k| &entities.volume_cells[k]).collect();
        let volume: f64 = cells.iter().map(|c| c.volume()).sum();
        assert_relative_eq!(volume, 1.0, epsilon = 1e-12);

        // The normal +z points out of the lower cell: lower is inside.
        let lower = cells.iter().find(|c| (c.volume() - 0.4).abs() < 1e-10).unwrap();
        let upper = cells.iter().find(|c| (c.volume() - 0.6).abs() < 1e-10).unwrap();
        assert_eq!(lower.position(), Position::Inside);
        assert_eq!(upper.position(), Position::Outside);

        let boundary_area: f64 = lower
            .boundary_cells()
            .iter()
            .map(|&b| entities.boundary_cells[b].area())
            .sum();
        assert_relative_eq!(boundary_area, 1.0, epsilon = 1e-12);
        assert!(
            lower
                .boundary_cells()
                .iter()
                .all(|&b| entities.boundary_cells[b].normal().z > 0.99)
        );

        let cut_area: f64 = entities
            .facets
            .values()
            .filter(|f| f.tag() == FacetTag::CutSide(5))
            .map(|f| {
                assert_eq!(f.cells().len(), 2);
                f.area()
            })
            .sum();
        assert_relative_eq!(cut_area, 1.0, epsilon = 1e-12);
    }

    #[test]
    fn test_partial_cut_keeps_one_cell_with_slit() {
        // The cutter ends at x = 0.5 inside the element.
        let triangles = horizontal_triangles(0.4, 0.5);
        let (entities, keys) = build(&triangles);
        assert_eq!(keys.len(), 1);
        let cell = &entities.volume_cells[keys[0]];
        assert_relative_eq!(cell.volume(), 1.0, epsilon = 1e-12);
        let slit_area: f64 = cell
            .boundary_cells()
            .iter()
            .map(|&b| entities.boundary_cells[b].area())
            .sum();
        assert_relative_eq!(slit_area, 0.5, epsilon = 1e-12);
        assert!(entities.facets.values().all(|f| f.cells().len() == 1));
    }

    #[test]
    fn test_uncut_element_is_one_undecided_cell() {
        let (entities, keys) = build(&[]);
        assert_eq!(keys.len(), 1);
        let cell = &entities.volume_cells[keys[0]];
        assert_eq!(cell.position(), Position::Undecided);
        let side_area: f64 = cell.facets().iter().map(|&f| entities.facets[f].area()).sum();
        assert_relative_eq!(side_area, 6.0, epsilon = 1e-12);
    }

    #[test]
    fn test_cutter_on_element_side_marks_coincident_facets() {
        // Cutter in the plane z = 1 with normal +z: the element is inside.
        let triangles = horizontal_triangles(1.0, 1.5);
        let (entities, keys) = build(&triangles);
        assert_eq!(keys.len(), 1);
        let cell = &entities.volume_cells[keys[0]];
        assert_eq!(cell.position(), Position::Inside);
        let coincident: f64 = entities
            .facets
            .values()
            .filter(|f| f.coincident_cut_side() == Some(5))
            .map(Facet::area)
            .sum();
        assert_relative_eq!(coincident, 1.0, epsilon = 1e-12);
        assert!(!cell.boundary_cells().is_empty());
    }
}
