//! Cell shapes of background elements and cutter sides.
//!
//! Node numbering follows the usual finite-element conventions: corners first,
//! then edge midpoints, then face centres, then the volume centre. Side tables
//! list corner nodes so that the right-hand normal points out of the element.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

use crate::core::collections::SmallBuffer;

/// Errors raised while interpreting cell shapes.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ShapeError {
    /// The number of node ids/coordinates does not match the shape.
    #[error("{shape} expects {expected} nodes, got {actual}")]
    NodeCountMismatch {
        /// The shape that was requested.
        shape: CellShape,
        /// Nodes required by the shape.
        expected: usize,
        /// Nodes that were provided.
        actual: usize,
    },
    /// The shape cannot be used in the requested role.
    #[error("{shape} is not supported as {role}")]
    Unsupported {
        /// The offending shape.
        shape: CellShape,
        /// Human-readable role ("background element", "cutter side", ...).
        role: &'static str,
    },
}

/// Cell shapes understood by the kernel.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum CellShape {
    /// Linear triangle.
    Tri3,
    /// Quadratic triangle.
    Tri6,
    /// Bilinear quadrilateral.
    Quad4,
    /// Serendipity quadrilateral.
    Quad8,
    /// Biquadratic quadrilateral.
    Quad9,
    /// Linear tetrahedron.
    Tet4,
    /// Quadratic tetrahedron.
    Tet10,
    /// Trilinear hexahedron.
    Hex8,
    /// Serendipity hexahedron.
    Hex20,
    /// Triquadratic hexahedron.
    Hex27,
    /// Linear wedge (prism).
    Wedge6,
    /// Linear pyramid.
    Pyramid5,
}

impl fmt::Display for CellShape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Tri3 => "tri3",
            Self::Tri6 => "tri6",
            Self::Quad4 => "quad4",
            Self::Quad8 => "quad8",
            Self::Quad9 => "quad9",
            Self::Tet4 => "tet4",
            Self::Tet10 => "tet10",
            Self::Hex8 => "hex8",
            Self::Hex20 => "hex20",
            Self::Hex27 => "hex27",
            Self::Wedge6 => "wedge6",
            Self::Pyramid5 => "pyramid5",
        };
        f.write_str(name)
    }
}

// =============================================================================
// TOPOLOGY TABLES
// =============================================================================

const TET4_SIDES: &[&[usize]] = &[&[0, 2, 1], &[0, 1, 3], &[0, 3, 2], &[1, 2, 3]];
const HEX8_SIDES: &[&[usize]] = &[
    &[0, 3, 2, 1],
    &[0, 1, 5, 4],
    &[1, 2, 6, 5],
    &[2, 3, 7, 6],
    &[0, 4, 7, 3],
    &[4, 5, 6, 7],
];
const WEDGE6_SIDES: &[&[usize]] = &[
    &[0, 2, 1],
    &[3, 4, 5],
    &[0, 1, 4, 3],
    &[1, 2, 5, 4],
    &[0, 3, 5, 2],
];
const PYRAMID5_SIDES: &[&[usize]] = &[
    &[0, 3, 2, 1],
    &[0, 1, 4],
    &[1, 2, 4],
    &[2, 3, 4],
    &[3, 0, 4],
];

const TRI3_EDGES: &[[usize; 2]] = &[[0, 1], [1, 2], [2, 0]];
const QUAD4_EDGES: &[[usize; 2]] = &[[0, 1], [1, 2], [2, 3], [3, 0]];
const TET4_EDGES: &[[usize; 2]] = &[[0, 1], [1, 2], [2, 0], [0, 3], [1, 3], [2, 3]];
const HEX8_EDGES: &[[usize; 2]] = &[
    [0, 1],
    [1, 2],
    [2, 3],
    [3, 0],
    [0, 4],
    [1, 5],
    [2, 6],
    [3, 7],
    [4, 5],
    [5, 6],
    [6, 7],
    [7, 4],
];
const WEDGE6_EDGES: &[[usize; 2]] = &[
    [0, 1],
    [1, 2],
    [2, 0],
    [0, 3],
    [1, 4],
    [2, 5],
    [3, 4],
    [4, 5],
    [5, 3],
];
const PYRAMID5_EDGES: &[[usize; 2]] = &[
    [0, 1],
    [1, 2],
    [2, 3],
    [3, 0],
    [0, 4],
    [1, 4],
    [2, 4],
    [3, 4],
];

/// Position of every hex27 node on the 3×3×3 reference lattice (0 ↔ -1,
/// 1 ↔ 0, 2 ↔ +1). The first 20 entries are the hex20 nodes.
pub const HEX27_LATTICE: [[usize; 3]; 27] = [
    [0, 0, 0],
    [2, 0, 0],
    [2, 2, 0],
    [0, 2, 0],
    [0, 0, 2],
    [2, 0, 2],
    [2, 2, 2],
    [0, 2, 2],
    [1, 0, 0],
    [2, 1, 0],
    [1, 2, 0],
    [0, 1, 0],
    [0, 0, 1],
    [2, 0, 1],
    [2, 2, 1],
    [0, 2, 1],
    [1, 0, 2],
    [2, 1, 2],
    [1, 2, 2],
    [0, 1, 2],
    [1, 1, 0],
    [1, 0, 1],
    [2, 1, 1],
    [1, 2, 1],
    [0, 1, 1],
    [1, 1, 2],
    [1, 1, 1],
];

/// Hex20 nodes (corners, then mid-edges) surrounding each hex27 face centre
/// `20..=25`, in the same order as [`HEX8_SIDES`].
pub const HEX20_FACE_NODES: [[usize; 8]; 6] = [
    [0, 3, 2, 1, 11, 10, 9, 8],
    [0, 1, 5, 4, 8, 13, 16, 12],
    [1, 2, 6, 5, 9, 14, 17, 13],
    [2, 3, 7, 6, 10, 15, 18, 14],
    [0, 4, 7, 3, 12, 19, 15, 11],
    [4, 5, 6, 7, 16, 17, 18, 19],
];

/// Linear sub-tetrahedra of a tet10 (four corner tets plus the octahedron
/// split along the 4–9 diagonal).
pub const TET10_SUB_TETS: [[usize; 4]; 8] = [
    [0, 4, 6, 7],
    [4, 1, 5, 8],
    [6, 5, 2, 9],
    [7, 8, 9, 3],
    [4, 9, 5, 6],
    [4, 9, 6, 7],
    [4, 9, 7, 8],
    [4, 9, 8, 5],
];

/// Linear sub-triangles of a tri6.
pub const TRI6_SUB_TRIS: [[usize; 3]; 4] = [[0, 3, 5], [3, 1, 4], [5, 4, 2], [3, 4, 5]];

/// Linear sub-quads of a quad9 (index 8 is the centre; quad8 supplies a shadow centre).
pub const QUAD9_SUB_QUADS: [[usize; 4]; 4] = [[0, 4, 8, 7], [4, 1, 5, 8], [8, 5, 2, 6], [7, 8, 6, 3]];

/// Hex27 node sitting at lattice position `(i, j, k)`.
#[must_use]
pub fn hex27_node_at(i: usize, j: usize, k: usize) -> Option<usize> {
    HEX27_LATTICE.iter().position(|&l| l == [i, j, k])
}

/// Node lists of the eight linear sub-hexahedra of a hex27.
#[must_use]
pub fn hex27_sub_hexes() -> Vec<[usize; 8]> {
    let mut subs = Vec::with_capacity(8);
    for c in 0..2 {
        for b in 0..2 {
            for a in 0..2 {
                let corner = |i: usize, j: usize, k: usize| hex27_node_at(a + i, b + j, c + k);
                let nodes = [
                    corner(0, 0, 0),
                    corner(1, 0, 0),
                    corner(1, 1, 0),
                    corner(0, 1, 0),
                    corner(0, 0, 1),
                    corner(1, 0, 1),
                    corner(1, 1, 1),
                    corner(0, 1, 1),
                ];
                let mut hex = [0; 8];
                for (slot, node) in hex.iter_mut().zip(nodes) {
                    // Every lattice point of a 3×3×3 grid has a node.
                    *slot = node.unwrap_or_default();
                }
                subs.push(hex);
            }
        }
    }
    subs
}

// =============================================================================
// SHAPE QUERIES
// =============================================================================

impl CellShape {
    /// Number of nodes of the shape.
    #[must_use]
    pub const fn num_nodes(self) -> usize {
        match self {
            Self::Tri3 => 3,
            Self::Tri6 => 6,
            Self::Quad4 => 4,
            Self::Quad8 => 8,
            Self::Quad9 => 9,
            Self::Tet4 => 4,
            Self::Tet10 => 10,
            Self::Hex8 => 8,
            Self::Hex20 => 20,
            Self::Hex27 => 27,
            Self::Wedge6 => 6,
            Self::Pyramid5 => 5,
        }
    }

    /// Number of corner nodes.
    #[must_use]
    pub const fn num_corners(self) -> usize {
        self.linear_shape().num_nodes()
    }

    /// Topological dimension (2 for sides, 3 for volume cells).
    #[must_use]
    pub const fn dimension(self) -> usize {
        match self {
            Self::Tri3 | Self::Tri6 | Self::Quad4 | Self::Quad8 | Self::Quad9 => 2,
            _ => 3,
        }
    }

    /// Whether the shape carries mid-edge nodes.
    #[must_use]
    pub const fn is_quadratic(self) -> bool {
        matches!(
            self,
            Self::Tri6 | Self::Quad8 | Self::Quad9 | Self::Tet10 | Self::Hex20 | Self::Hex27
        )
    }

    /// The linear shape spanned by the corner nodes.
    #[must_use]
    pub const fn linear_shape(self) -> Self {
        match self {
            Self::Tri6 => Self::Tri3,
            Self::Quad8 | Self::Quad9 => Self::Quad4,
            Self::Tet10 => Self::Tet4,
            Self::Hex20 | Self::Hex27 => Self::Hex8,
            other => other,
        }
    }

    /// Corner-node tables of the element sides (outward right-hand normal).
    ///
    /// Empty for two-dimensional shapes.
    #[must_use]
    pub const fn sides(self) -> &'static [&'static [usize]] {
        match self.linear_shape() {
            Self::Tet4 => TET4_SIDES,
            Self::Hex8 => HEX8_SIDES,
            Self::Wedge6 => WEDGE6_SIDES,
            Self::Pyramid5 => PYRAMID5_SIDES,
            _ => &[],
        }
    }

    /// Corner edges of the shape.
    #[must_use]
    pub const fn edges(self) -> &'static [[usize; 2]] {
        match self.linear_shape() {
            Self::Tri3 => TRI3_EDGES,
            Self::Quad4 => QUAD4_EDGES,
            Self::Tet4 => TET4_EDGES,
            Self::Hex8 => HEX8_EDGES,
            Self::Wedge6 => WEDGE6_EDGES,
            Self::Pyramid5 => PYRAMID5_EDGES,
            _ => &[],
        }
    }

    /// Check that `actual` nodes were supplied for this shape.
    ///
    /// # Errors
    ///
    /// Returns [`ShapeError::NodeCountMismatch`] if the count differs.
    pub const fn check_node_count(self, actual: usize) -> Result<(), ShapeError> {
        let expected = self.num_nodes();
        if expected == actual {
            Ok(())
        } else {
            Err(ShapeError::NodeCountMismatch {
                shape: self,
                expected,
                actual,
            })
        }
    }

    /// Check that the shape can be used as a background element.
    ///
    /// # Errors
    ///
    /// Returns [`ShapeError::Unsupported`] for two-dimensional shapes.
    pub const fn check_element_shape(self) -> Result<(), ShapeError> {
        if self.dimension() == 3 {
            Ok(())
        } else {
            Err(ShapeError::Unsupported {
                shape: self,
                role: "background element",
            })
        }
    }

    /// Check that the shape can be used as a cutter side.
    ///
    /// # Errors
    ///
    /// Returns [`ShapeError::Unsupported`] for volume shapes.
    pub const fn check_side_shape(self) -> Result<(), ShapeError> {
        if self.dimension() == 2 {
            Ok(())
        } else {
            Err(ShapeError::Unsupported {
                shape: self,
                role: "cutter side",
            })
        }
    }

    /// Reference coordinates of the element centre.
    #[must_use]
    pub const fn reference_center(self) -> [f64; 3] {
        match self.linear_shape() {
            Self::Tet4 => [0.25, 0.25, 0.25],
            Self::Wedge6 => [1.0 / 3.0, 1.0 / 3.0, 0.0],
            Self::Pyramid5 => [0.0, 0.0, 0.25],
            _ => [0.0, 0.0, 0.0],
        }
    }

    /// Evaluate the shape functions of a volume shape at reference point `xi`.
    ///
    /// # Errors
    ///
    /// Returns [`ShapeError::Unsupported`] for two-dimensional shapes.
    pub fn shape_functions(self, xi: &[f64; 3]) -> Result<SmallBuffer<f64, 27>, ShapeError> {
        let [r, s, t] = *xi;
        let mut n = SmallBuffer::new();
        match self {
            Self::Tet4 => {
                n.extend([1.0 - r - s - t, r, s, t]);
            }
            Self::Tet10 => {
                let l = [1.0 - r - s - t, r, s, t];
                for li in l {
                    n.push(li * 2.0f64.mul_add(li, -1.0));
                }
                for [a, b] in [[0, 1], [1, 2], [2, 0], [0, 3], [1, 3], [2, 3]] {
                    n.push(4.0 * l[a] * l[b]);
                }
            }
            Self::Hex8 => {
                for &[i, j, k] in &HEX27_LATTICE[..8] {
                    let (ri, si, ti) = (lattice_sign(i), lattice_sign(j), lattice_sign(k));
                    n.push(0.125 * ri.mul_add(r, 1.0) * si.mul_add(s, 1.0) * ti.mul_add(t, 1.0));
                }
            }
            Self::Hex20 => {
                for (node, &[i, j, k]) in HEX27_LATTICE[..20].iter().enumerate() {
                    let (ri, si, ti) = (lattice_sign(i), lattice_sign(j), lattice_sign(k));
                    let value = if node < 8 {
                        0.125
                            * ri.mul_add(r, 1.0)
                            * si.mul_add(s, 1.0)
                            * ti.mul_add(t, 1.0)
                            * (ri * r + si * s + ti * t - 2.0)
                    } else if i == 1 {
                        0.25 * r.mul_add(-r, 1.0) * si.mul_add(s, 1.0) * ti.mul_add(t, 1.0)
                    } else if j == 1 {
                        0.25 * s.mul_add(-s, 1.0) * ri.mul_add(r, 1.0) * ti.mul_add(t, 1.0)
                    } else {
                        0.25 * t.mul_add(-t, 1.0) * ri.mul_add(r, 1.0) * si.mul_add(s, 1.0)
                    };
                    n.push(value);
                }
            }
            Self::Hex27 => {
                for &[i, j, k] in &HEX27_LATTICE {
                    n.push(lagrange_quadratic(i, r) * lagrange_quadratic(j, s) * lagrange_quadratic(k, t));
                }
            }
            Self::Wedge6 => {
                let l = [1.0 - r - s, r, s];
                for li in l {
                    n.push(0.5 * li * (1.0 - t));
                }
                for li in l {
                    n.push(0.5 * li * (1.0 + t));
                }
            }
            Self::Pyramid5 => {
                let ration = if (1.0 - t).abs() > 1e-12 {
                    r * s * t / (1.0 - t)
                } else {
                    0.0
                };
                for (ri, si) in [(-1.0, -1.0), (1.0, -1.0), (1.0, 1.0), (-1.0, 1.0)] {
                    let value = 0.25
                        * ((ri * r + 1.0) * (si * s + 1.0) - t + ri * si * ration);
                    n.push(value);
                }
                n.push(t);
            }
            _ => {
                return Err(ShapeError::Unsupported {
                    shape: self,
                    role: "volume shape-function evaluation",
                });
            }
        }
        Ok(n)
    }
}

/// Lattice index (0, 1, 2) → reference coordinate (-1, 0, +1).
const fn lattice_sign(index: usize) -> f64 {
    match index {
        0 => -1.0,
        1 => 0.0,
        _ => 1.0,
    }
}

/// One-dimensional quadratic Lagrange polynomial for lattice node `index`.
fn lagrange_quadratic(index: usize, x: f64) -> f64 {
    match index {
        0 => 0.5 * x * (x - 1.0),
        1 => x.mul_add(-x, 1.0),
        _ => 0.5 * x * (x + 1.0),
    }
}
