//! Convex polyhedral pieces of an element.
//!
//! Every element is decomposed into tetrahedra, and each tetrahedron is split
//! by the planes of the cutter triangles. The resulting [`ConvexPiece`]s are
//! closed convex polyhedra whose faces are polygons of pooled points.
//!
//! Points created on an edge during a split are computed from the edge's end
//! points in key order and cached per `(edge, plane)`, so two pieces sharing a
//! face split it into exactly the same point keys.

use nalgebra::{Point3, Vector3};
use serde::{Deserialize, Serialize};

use crate::core::collections::{Entry, FastHashMap, POLYGON_INLINE_CAPACITY, SmallBuffer};
use crate::core::point_pool::{PointKey, PointPool};
use crate::geometry::plane::{Plane, PlaneSide, in_plane_basis};
use crate::geometry::polygon::Polygon;

/// Origin of a piece face.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum FaceTag {
    /// Part of the element side with this index (in the shape's side table).
    ElementSide(usize),
    /// Internal face of the tetrahedral decomposition.
    Internal,
    /// Cap created by the element's cut plane with this index.
    CutPlane(usize),
}

impl FaceTag {
    /// Element side index, if the face lies on the element boundary.
    #[must_use]
    pub const fn element_side(self) -> Option<usize> {
        match self {
            Self::ElementSide(side) => Some(side),
            Self::Internal | Self::CutPlane(_) => None,
        }
    }
}

/// Point keys of a face polygon.
pub type FacePoints = SmallBuffer<PointKey, POLYGON_INLINE_CAPACITY>;

/// A face of a convex piece, oriented with its right-hand normal pointing out
/// of the piece.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PieceFace {
    /// Corners.
    pub points: FacePoints,
    /// Origin.
    pub tag: FaceTag,
}

/// Cache of split points keyed by `(lower key, upper key, plane index)`.
pub type CrossingCache = FastHashMap<(PointKey, PointKey, usize), PointKey>;

/// Tolerances used when splitting pieces.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SplitTolerances {
    /// Absolute on-plane distance.
    pub distance: f64,
    /// Children with smaller volume are not created.
    pub volume: f64,
}

/// A closed convex polyhedron.
#[derive(Clone, Debug, PartialEq)]
pub struct ConvexPiece {
    faces: Vec<PieceFace>,
    volume: f64,
}

/// Result of splitting a piece by a plane.
#[derive(Clone, Debug, PartialEq)]
pub struct SplitResult {
    /// Part behind the plane.
    pub back: Option<ConvexPiece>,
    /// Part in front of the plane.
    pub front: Option<ConvexPiece>,
}

fn coords_of(pool: &PointPool, key: PointKey) -> Point3<f64> {
    pool.coords(key).copied().unwrap_or_else(Point3::origin)
}

impl ConvexPiece {
    /// Tetrahedron with the given corners; `tags[i]` labels the face opposite
    /// corner `i`. Returns `None` for a tetrahedron with `|volume| <= min_volume`.
    #[must_use]
    pub fn from_tet(
        corners: [PointKey; 4],
        tags: [FaceTag; 4],
        pool: &PointPool,
        min_volume: f64,
    ) -> Option<Self> {
        let [a, mut b, mut c, d] = corners;
        let [ta, mut tb, mut tc, td] = tags;
        let [pa, pb, pc, pd] = corners.map(|k| coords_of(pool, k));
        let signed = (pb - pa).cross(&(pc - pa)).dot(&(pd - pa)) / 6.0;
        if signed.abs() <= min_volume {
            return None;
        }
        if signed < 0.0 {
            std::mem::swap(&mut b, &mut c);
            std::mem::swap(&mut tb, &mut tc);
        }
        let face = |points: [PointKey; 3], tag| PieceFace {
            points: points.into_iter().collect(),
            tag,
        };
        Some(Self {
            faces: vec![
                face([b, c, d], ta),
                face([a, d, c], tb),
                face([a, b, d], tc),
                face([a, c, b], td),
            ],
            volume: signed.abs(),
        })
    }

    /// Faces with outward orientation.
    #[must_use]
    pub fn faces(&self) -> &[PieceFace] {
        &self.faces
    }

    /// Enclosed volume.
    #[must_use]
    pub const fn volume(&self) -> f64 {
        self.volume
    }

    /// Distinct corner keys in ascending order.
    #[must_use]
    pub fn vertices(&self) -> SmallBuffer<PointKey, 16> {
        let mut keys: SmallBuffer<PointKey, 16> = self
            .faces
            .iter()
            .flat_map(|f| f.points.iter().copied())
            .collect();
        keys.sort_unstable();
        keys.dedup();
        keys
    }

    /// Whether `key` is a corner of the piece.
    #[must_use]
    pub fn contains_vertex(&self, key: PointKey) -> bool {
        self.faces.iter().any(|f| f.points.contains(&key))
    }

    /// Coordinates of a face polygon.
    #[must_use]
    pub fn face_coords(face: &PieceFace, pool: &PointPool) -> Polygon {
        face.points.iter().map(|&k| coords_of(pool, k)).collect()
    }

    /// Volume centroid.
    #[must_use]
    pub fn centroid(&self, pool: &PointPool) -> Point3<f64> {
        let vertices = self.vertices();
        let reference = mean(vertices.iter().map(|&k| coords_of(pool, k)));
        let mut weighted = Vector3::zeros();
        let mut total = 0.0;
        for face in &self.faces {
            let pts = Self::face_coords(face, pool);
            for pair in pts.get(1..).unwrap_or_default().windows(2) {
                let v = tet_volume(&reference, &pts[0], &pair[0], &pair[1]);
                weighted += (reference.coords + pts[0].coords + pair[0].coords + pair[1].coords) * (v / 4.0);
                total += v;
            }
        }
        if total.abs() > f64::MIN_POSITIVE {
            Point3::from(weighted / total)
        } else {
            reference
        }
    }

    /// Whether every undirected edge is used by exactly two faces in opposite
    /// directions.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        let mut directed: FastHashMap<(PointKey, PointKey), usize> = FastHashMap::default();
        for face in &self.faces {
            let n = face.points.len();
            for i in 0..n {
                *directed
                    .entry((face.points[i], face.points[(i + 1) % n]))
                    .or_default() += 1;
            }
        }
        directed
            .iter()
            .all(|(&(p, q), &count)| count == 1 && directed.get(&(q, p)) == Some(&1))
    }

    /// Split the piece by `plane` (registered as cut plane `plane_index`).
    ///
    /// The back child gets a cap face whose normal is the plane normal; the
    /// front child gets the reversed cap. A piece that lies on one side of the
    /// plane (within tolerance) is returned unchanged on that side, and so is a
    /// piece whose split would leave a sliver below the volume tolerance.
    pub fn split(
        &self,
        plane: &Plane,
        plane_index: usize,
        pool: &mut PointPool,
        cache: &mut CrossingCache,
        tolerances: SplitTolerances,
    ) -> SplitResult {
        let vertices = self.vertices();
        let mut sides: FastHashMap<PointKey, PlaneSide> = FastHashMap::default();
        let mut distances: FastHashMap<PointKey, f64> = FastHashMap::default();
        for &key in &vertices {
            let p = coords_of(pool, key);
            sides.insert(key, plane.classify(&p, tolerances.distance));
            distances.insert(key, plane.signed_distance(&p));
        }
        let has_front = sides.values().any(|&s| s == PlaneSide::FRONT);
        let has_back = sides.values().any(|&s| s == PlaneSide::BACK);
        if !has_front {
            return SplitResult {
                back: Some(self.clone()),
                front: None,
            };
        }
        if !has_back {
            return SplitResult {
                back: None,
                front: Some(self.clone()),
            };
        }

        let side_of = |k: &PointKey| sides.get(k).copied().unwrap_or(PlaneSide::ON);
        let mut back_faces = Vec::with_capacity(self.faces.len() + 1);
        let mut front_faces = Vec::with_capacity(self.faces.len() + 1);
        let mut cap: SmallBuffer<PointKey, 16> = SmallBuffer::new();

        for face in &self.faces {
            let n = face.points.len();
            let mut back = FacePoints::new();
            let mut front = FacePoints::new();
            let (mut has_back_corner, mut has_front_corner) = (false, false);
            for i in 0..n {
                let p = face.points[i];
                let q = face.points[(i + 1) % n];
                let (sp, sq) = (side_of(&p), side_of(&q));
                match sp {
                    PlaneSide::BACK => {
                        back.push(p);
                        has_back_corner = true;
                    }
                    PlaneSide::FRONT => {
                        front.push(p);
                        has_front_corner = true;
                    }
                    PlaneSide::ON => {
                        back.push(p);
                        front.push(p);
                        cap.push(p);
                    }
                }
                let crosses = matches!(
                    (sp, sq),
                    (PlaneSide::BACK, PlaneSide::FRONT) | (PlaneSide::FRONT, PlaneSide::BACK)
                );
                if crosses {
                    let x = crossing_point(p, q, plane_index, &distances, pool, cache);
                    back.push(x);
                    front.push(x);
                    cap.push(x);
                }
            }
            dedup_cyclic(&mut back);
            dedup_cyclic(&mut front);
            if has_back_corner && back.len() >= 3 {
                back_faces.push(PieceFace {
                    points: back,
                    tag: face.tag,
                });
            }
            if has_front_corner && front.len() >= 3 {
                front_faces.push(PieceFace {
                    points: front,
                    tag: face.tag,
                });
            }
        }

        cap.sort_unstable();
        cap.dedup();
        if cap.len() >= 3 {
            let ordered = order_keys_around(&cap, &plane.normal, pool);
            let reversed: FacePoints = ordered.iter().rev().copied().collect();
            back_faces.push(PieceFace {
                points: ordered,
                tag: FaceTag::CutPlane(plane_index),
            });
            front_faces.push(PieceFace {
                points: reversed,
                tag: FaceTag::CutPlane(plane_index),
            });
        }

        let back_volume = enclosed_volume(&back_faces, pool);
        let front_volume = enclosed_volume(&front_faces, pool);
        if back_volume <= tolerances.volume {
            tracing::trace!(back_volume, "sliver below cut plane not created");
            return SplitResult {
                back: None,
                front: Some(self.clone()),
            };
        }
        if front_volume <= tolerances.volume {
            tracing::trace!(front_volume, "sliver above cut plane not created");
            return SplitResult {
                back: Some(self.clone()),
                front: None,
            };
        }
        SplitResult {
            back: Some(Self {
                faces: back_faces,
                volume: back_volume,
            }),
            front: Some(Self {
                faces: front_faces,
                volume: front_volume,
            }),
        }
    }
}

fn tet_volume(r: &Point3<f64>, a: &Point3<f64>, b: &Point3<f64>, c: &Point3<f64>) -> f64 {
    (a - r).dot(&(b - r).cross(&(c - r))) / 6.0
}

fn mean<I: Iterator<Item = Point3<f64>>>(points: I) -> Point3<f64> {
    let mut sum = Vector3::zeros();
    let mut count = 0.0;
    for p in points {
        sum += p.coords;
        count += 1.0;
    }
    if count > 0.0 {
        Point3::from(sum / count)
    } else {
        Point3::origin()
    }
}

/// Volume enclosed by outward-oriented faces.
fn enclosed_volume(faces: &[PieceFace], pool: &PointPool) -> f64 {
    let Some(reference) = faces
        .first()
        .and_then(|f| f.points.first())
        .map(|&k| coords_of(pool, k))
    else {
        return 0.0;
    };
    let mut volume = 0.0;
    for face in faces {
        let pts = ConvexPiece::face_coords(face, pool);
        for pair in pts.get(1..).unwrap_or_default().windows(2) {
            volume += tet_volume(&reference, &pts[0], &pair[0], &pair[1]);
        }
    }
    volume
}

fn crossing_point(
    p: PointKey,
    q: PointKey,
    plane_index: usize,
    distances: &FastHashMap<PointKey, f64>,
    pool: &mut PointPool,
    cache: &mut CrossingCache,
) -> PointKey {
    let (lo, hi) = if p < q { (p, q) } else { (q, p) };
    match cache.entry((lo, hi, plane_index)) {
        Entry::Occupied(entry) => *entry.get(),
        Entry::Vacant(entry) => {
            let d_lo = distances.get(&lo).copied().unwrap_or(0.0);
            let d_hi = distances.get(&hi).copied().unwrap_or(0.0);
            let x = Plane::segment_crossing(&coords_of(pool, lo), &coords_of(pool, hi), d_lo, d_hi);
            *entry.insert(pool.get_or_insert(x))
        }
    }
}

fn dedup_cyclic(points: &mut FacePoints) {
    points.dedup();
    while points.len() > 1 && points.first() == points.last() {
        points.pop();
    }
}

/// Order coplanar keys counter-clockwise around `normal`.
fn order_keys_around(keys: &[PointKey], normal: &Vector3<f64>, pool: &PointPool) -> FacePoints {
    let center = mean(keys.iter().map(|&k| coords_of(pool, k)));
    let (u, v) = in_plane_basis(normal);
    let mut with_angle: SmallBuffer<(f64, PointKey), 16> = keys
        .iter()
        .map(|&k| {
            let d = coords_of(pool, k) - center;
            (d.dot(&v).atan2(d.dot(&u)), k)
        })
        .collect();
    with_angle.sort_by(|a, b| a.0.total_cmp(&b.0));
    with_angle.into_iter().map(|(_, k)| k).collect()
}
