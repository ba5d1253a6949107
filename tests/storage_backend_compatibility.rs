//! Storage backend compatibility tests.
//!
//! The arena backend is `DenseSlotMap` by default and `SlotMap` without the
//! `dense-slotmap` feature. Both must give the same cut.
//!
//! ```bash
//! cargo test --test storage_backend_compatibility
//! cargo test --test storage_backend_compatibility --no-default-features
//! ```

use nalgebra::Point3;
use xfem_cut::prelude::*;

/// A row of `n` unit hexes along x, cut by an inclined plane.
fn cut_row(n: i32) -> MeshIntersection {
    let mut intersection = MeshIntersection::default();
    let mesh = intersection.add_cut_mesh();
    let plane = [
        Point3::new(-1.0, -1.0, 0.2),
        Point3::new(f64::from(n) + 1.0, -1.0, 0.8),
        Point3::new(f64::from(n) + 1.0, 2.0, 0.8),
        Point3::new(-1.0, 2.0, 0.2),
    ];
    intersection
        .add_cut_side(1, &[101, 102, 103, 104], &plane, CellShape::Quad4, mesh)
        .unwrap();
    for e in 0..n {
        let x0 = f64::from(e);
        let coords = [
            [x0, 0.0, 0.0],
            [x0 + 1.0, 0.0, 0.0],
            [x0 + 1.0, 1.0, 0.0],
            [x0, 1.0, 0.0],
            [x0, 0.0, 1.0],
            [x0 + 1.0, 0.0, 1.0],
            [x0 + 1.0, 1.0, 1.0],
            [x0, 1.0, 1.0],
        ]
        .map(|c| Point3::new(c[0], c[1], c[2]));
        // Nodes 4e+1..4e+4 on the left face, 4e+5..4e+8 on the right face.
        let l = 4 * e;
        let nodes = [l + 1, l + 5, l + 6, l + 2, l + 4, l + 8, l + 7, l + 3];
        intersection.add_element(e + 1, &nodes, &coords, CellShape::Hex8).unwrap();
    }
    intersection.cut(false).unwrap();
    intersection
}

#[test]
fn test_arena_backend_cut_is_consistent() {
    let intersection = cut_row(4);
    let status = *intersection.status();
    assert_eq!(status.elements, 4);
    assert_eq!(status.cut_elements, 4);
    assert_eq!(status.volume_cells, 8);

    // Every key handed out resolves, and every facet points back at its cells.
    for (key, cell) in intersection.volume_cells() {
        assert!(intersection.volume_cell(key).is_some());
        for &facet in cell.facets() {
            assert!(intersection.facet(facet).unwrap().cells().contains(&key));
        }
        for &boundary in cell.boundary_cells() {
            assert_eq!(intersection.boundary_cell(boundary).unwrap().volume_cell(), key);
        }
    }
    let total: f64 = intersection.volume_cells().map(|(_, c)| c.volume()).sum();
    assert!((total - 4.0).abs() < 1e-10);
}

#[test]
fn test_arena_keys_are_reissued_after_recut() {
    let mut intersection = cut_row(2);
    let before = *intersection.status();
    intersection.cut(false).unwrap();
    assert_eq!(*intersection.status(), before);
    assert_eq!(intersection.mesh().volume_cells().count(), before.volume_cells);
    assert_eq!(intersection.mesh().facets().count(), before.facets);
}
