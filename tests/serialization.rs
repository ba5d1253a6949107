//! JSON round trips of the serializable configuration and result types.

use nalgebra::Point3;
use xfem_cut::prelude::*;

fn cut_cube(include_inner: bool) -> MeshIntersection {
    let mut intersection = MeshIntersection::default();
    let mesh = intersection.add_cut_mesh();
    let plane = [
        Point3::new(-1.0, -1.0, 0.5),
        Point3::new(2.0, -1.0, 0.5),
        Point3::new(2.0, 2.0, 0.5),
        Point3::new(-1.0, 2.0, 0.5),
    ];
    intersection
        .add_cut_side(1, &[11, 12, 13, 14], &plane, CellShape::Quad4, mesh)
        .unwrap();
    let cube = [
        [0.0, 0.0, 0.0],
        [1.0, 0.0, 0.0],
        [1.0, 1.0, 0.0],
        [0.0, 1.0, 0.0],
        [0.0, 0.0, 1.0],
        [1.0, 0.0, 1.0],
        [1.0, 1.0, 1.0],
        [0.0, 1.0, 1.0],
    ]
    .map(|c| Point3::new(c[0], c[1], c[2]));
    intersection
        .add_element(1, &[1, 2, 3, 4, 5, 6, 7, 8], &cube, CellShape::Hex8)
        .unwrap();
    intersection.cut(include_inner).unwrap();
    intersection
}

#[test]
fn test_options_round_trip() {
    let options = OptionsBuilder::default()
        .point_tolerance(1e-9)
        .integration_mode(IntegrationMode::DirectDivergence)
        .quad_split(QuadSplit::CenterPoint)
        .include_inner(true)
        .build()
        .unwrap();
    let json = serde_json::to_string(&options).unwrap();
    assert!(json.contains("DirectDivergence"));
    let restored: Options = serde_json::from_str(&json).unwrap();
    assert_eq!(restored, options);
}

#[test]
fn test_options_builder_rejects_bad_tolerances() {
    assert!(OptionsBuilder::default().point_tolerance(0.0).build().is_err());
    assert!(OptionsBuilder::default().relative_tolerance(f64::NAN).build().is_err());
    assert!(OptionsBuilder::default().volume_rule_degree(1000).build().is_err());
}

#[test]
fn test_cut_status_round_trip() {
    let intersection = cut_cube(false);
    let status = *intersection.status();
    let json = serde_json::to_string(&status).unwrap();
    let restored: CutStatus = serde_json::from_str(&json).unwrap();
    assert_eq!(restored, status);
    assert_eq!(restored.volume_cells, 2);
}

#[test]
fn test_dof_set_data_round_trip() {
    let intersection = cut_cube(true);
    let data = intersection.dof_set_data(1);
    assert_eq!(data.len(), 2);
    assert_eq!(data.iter().filter(|d| d.inside).count(), 1);

    let json = serde_json::to_string_pretty(&data).unwrap();
    let restored: Vec<DofSetData> = serde_json::from_str(&json).unwrap();
    assert_eq!(restored, data);
    for set in &restored {
        assert_eq!(set.element_id, 1);
        assert_eq!(set.node_dof_sets.len(), 8);
        assert!(set.cut_points.iter().any(|p| (p[2] - 0.5).abs() < 1e-12));
    }
}

#[test]
fn test_gauss_points_serialize_as_plain_numbers() {
    let intersection = cut_cube(false);
    let (_, cell) = intersection.volume_cells().next().unwrap();
    let point = cell.gauss_points()[0];
    let value = serde_json::to_value(point).unwrap();
    assert!(value["weight"].is_f64());
    let restored: IntegrationPoint = serde_json::from_value(value).unwrap();
    assert_eq!(restored, point);

    let position = serde_json::to_string(&Position::OnCutSurface).unwrap();
    assert_eq!(serde_json::from_str::<Position>(&position).unwrap(), Position::OnCutSurface);
    let shape = serde_json::to_string(&CellShape::Hex27).unwrap();
    assert_eq!(serde_json::from_str::<CellShape>(&shape).unwrap(), CellShape::Hex27);
}
