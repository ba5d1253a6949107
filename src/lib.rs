//! # xfem-cut
//!
//! Geometric intersection ("cut") kernel for extended finite element (XFEM)
//! discretizations.
//!
//! A background volume mesh is cut by one or more embedded cutter surface
//! meshes. For every background element the kernel computes
//!
//! - **volume cells**: the connected regions of the element after cutting,
//!   each tagged inside or outside of the cutter surface,
//! - **facets**: the planar polygons bounding the volume cells, lying on an
//!   element side or on a cutter side,
//! - **boundary cells**: the cutter surface restricted to a volume cell,
//!   triangulated and oriented along the cutter normal,
//! - **nodal DOF sets**: one set of degrees of freedom per disconnected region
//!   of the support of a node,
//! - **quadrature rules** on volume cells (tessellation or direct divergence)
//!   and on boundary cells.
//!
//! # Basic Usage
//!
//! ```rust
//! use nalgebra::Point3;
//! use xfem_cut::prelude::*;
//!
//! let mut intersection = MeshIntersection::new(Options::default());
//!
//! // A cutter triangle through the tetrahedron at z = 0.5, normal +z.
//! let cutter = intersection.add_cut_mesh();
//! let side = [
//!     Point3::new(-1.0, -1.0, 0.5),
//!     Point3::new(3.0, -1.0, 0.5),
//!     Point3::new(-1.0, 3.0, 0.5),
//! ];
//! intersection
//!     .add_cut_side(1, &[11, 12, 13], &side, CellShape::Tri3, cutter)
//!     .unwrap();
//!
//! let tet = [
//!     Point3::new(0.0, 0.0, 0.0),
//!     Point3::new(1.0, 0.0, 0.0),
//!     Point3::new(0.0, 1.0, 0.0),
//!     Point3::new(0.0, 0.0, 1.0),
//! ];
//! intersection
//!     .add_element(1, &[1, 2, 3, 4], &tet, CellShape::Tet4)
//!     .unwrap();
//!
//! let status = *intersection.cut(false).unwrap();
//! assert_eq!(status.volume_cells, 2);
//!
//! // The cutter normal points out of the lower cell: it is inside.
//! assert_eq!(intersection.node(1).unwrap().position(), Position::Inside);
//! assert_eq!(intersection.node(4).unwrap().position(), Position::Outside);
//!
//! // Cell volumes add up to the element volume.
//! let volume: f64 = intersection.volume_cells().map(|(_, c)| c.volume()).sum();
//! assert!((volume - 1.0 / 6.0).abs() < 1e-12);
//! ```
//!
//! # Invariants
//!
//! Every cut is checked by [`core::validation::validate`] when
//! [`Options::validate`](core::options::Options::validate) is set:
//!
//! - **Volume conservation**: the volume cells of an element add up to its
//!   volume.
//! - **Manifold closure**: every edge of every convex piece is shared by
//!   exactly two of its faces.
//! - **Facet closure**: the facets of a volume cell enclose it.
//!
//! Every facet belongs to one or two volume cells. Points closer than
//! [`Options::point_tolerance`](core::options::Options::point_tolerance) share
//! one identity in the [`PointPool`](core::point_pool::PointPool).
//!
//! # Quadratic elements
//!
//! `Tet10`, `Hex20` and `Hex27` elements are cut as eight linear
//! sub-elements each. `Hex20` elements get shadow nodes (negative ids) at the
//! face and body centres; `Quad8` cutter sides get a shadow centre.

#![forbid(unsafe_code)]

/// Mesh entities, the cut pipeline and its results.
pub mod core {
    /// Per-element cutting algorithms.
    pub mod algorithms {
        pub mod cell_building;
        pub mod element_cut;
    }
    pub mod boundary_cell;
    pub mod collections;
    pub mod dofsets;
    pub mod edge;
    pub mod element;
    pub mod facet;
    pub mod integration;
    pub mod mesh;
    pub mod mesh_handle;
    pub mod mesh_intersection;
    pub mod node;
    pub mod options;
    pub mod point_pool;
    pub mod polyhedron;
    pub(crate) mod positions;
    pub mod side;
    /// Small graph helpers.
    pub mod util {
        pub mod components;
    }
    pub mod validation;
    pub mod volume_cell;
}

/// Geometric primitives: planes, polygons, predicates, intersection kernels,
/// quadrature rules and cell shapes.
pub mod geometry {
    pub mod intersection;
    pub mod plane;
    pub mod polygon;
    pub mod predicates;
    pub mod quadrature;
    pub mod shape;
}

/// Commonly used types.
pub mod prelude {
    pub use crate::core::{
        boundary_cell::{BoundaryCell, BoundaryCellKey},
        dofsets::{DofSetData, NodalDofSet},
        edge::{CutPoint, Edge},
        element::{Element, ElementHandle, ElementId},
        facet::{Facet, FacetKey, FacetTag},
        integration::{IntegrationCell, IntegrationPoint},
        mesh::{Mesh, MeshError},
        mesh_handle::MeshHandle,
        mesh_intersection::{CutStatus, MeshIntersection},
        node::{Node, NodeId, Position},
        options::{IntegrationMode, Options, OptionsBuilder, QuadSplit},
        point_pool::{PointKey, PointPool},
        side::{CutTriangle, Side, SideId},
        validation::{ValidationError, ValidationReport},
        volume_cell::{VolumeCell, VolumeCellKey},
    };

    pub use crate::core::collections::{FastHashMap, FastHashSet, SmallBuffer};

    pub use crate::geometry::{
        plane::{Plane, PlaneSide},
        predicates::Orientation,
        quadrature::QuadratureError,
        shape::{CellShape, ShapeError},
    };
}

/// The function `is_normal` checks that structs implement `auto` traits.
/// Traits are checked at compile time, so this function is only used for
/// testing.
#[must_use]
pub const fn is_normal<T: Sized + Send + Sync + Unpin>() -> bool {
    true
}

#[cfg(test)]
mod tests {
    use crate::is_normal;
    use crate::prelude::*;

    #[test]
    fn normal_types() {
        assert!(is_normal::<MeshIntersection>());
        assert!(is_normal::<Mesh>());
        assert!(is_normal::<VolumeCell>());
        assert!(is_normal::<Facet>());
        assert!(is_normal::<PointPool>());
        assert!(is_normal::<MeshError>());
    }

    #[test]
    fn test_prelude_collections_exports() {
        let mut map: FastHashMap<NodeId, usize> = FastHashMap::default();
        map.insert(3, 4);
        assert_eq!(map.get(&3), Some(&4));

        let mut set: FastHashSet<SideId> = FastHashSet::default();
        set.insert(7);
        assert!(set.contains(&7));

        let mut buffer: SmallBuffer<ElementId, 8> = SmallBuffer::new();
        buffer.push(42);
        assert_eq!(buffer.len(), 1);
    }
}
