use femassembly::io::{
    check_node_result_file, check_node_results, format_node_results, parse_node_results, read_node_result_file,
    write_node_result_file, ResultCheckError,
};
use femassembly::mesh::procedural::create_unit_square_uniform_quad_mesh_2d;
use femassembly::topology::Topology;
use nalgebra::DVector;
use std::collections::BTreeMap;

#[test]
fn result_text_is_parsed() {
    let text = "# unique-id value\n\n3 1.5\n  0   -2e-3  \n# trailing comment\n7 4\n";
    let results = parse_node_results(text).unwrap();
    assert_eq!(results, BTreeMap::from([(0, -2e-3), (3, 1.5), (7, 4.0)]));
}

#[test]
fn malformed_lines_are_reported_with_line_number() {
    for (text, line) in [("0 1.0\n1\n", 2), ("0 1.0 2.0\n", 1), ("# header\nx 1.0\n", 2), ("0 one\n", 1)] {
        match parse_node_results(text) {
            Err(ResultCheckError::Parse { line: reported, .. }) => assert_eq!(reported, line, "{text:?}"),
            other => panic!("expected parse error for {text:?}, got {other:?}"),
        }
    }
}

#[test]
fn formatted_results_are_checked() {
    let mut mesh = create_unit_square_uniform_quad_mesh_2d(1);
    mesh.set_unique_ids(vec![10, 11, 12, 13]).unwrap();
    mesh.set_ownership(vec![true, true, false, true]).unwrap();
    let topology = Topology::from_mesh(&mesh).unwrap();
    let values = DVector::from_column_slice(&[0.1, 1.0 / 3.0, 5.0, -7.25]);

    let text = format_node_results(&topology, &values);
    assert!(text.starts_with("# unique-id value\n"));
    assert_eq!(text.lines().count(), 4);
    let parsed = parse_node_results(&text).unwrap();
    assert_eq!(parsed.keys().copied().collect::<Vec<_>>(), vec![10, 11, 13]);
    // Seventeen significant digits round-trip exactly
    assert_eq!(parsed[&11], 1.0 / 3.0);
    assert_eq!(check_node_results(&parsed, &topology, &values, 0.0).unwrap(), 3);

    let mut perturbed = values.clone();
    perturbed[3] += 1e-3;
    assert_eq!(check_node_results(&parsed, &topology, &perturbed, 1e-2).unwrap(), 3);
    assert!(matches!(
        check_node_results(&parsed, &topology, &perturbed, 1e-4),
        Err(ResultCheckError::Mismatch { unique_id: 13, .. })
    ));

    let mut nan = values.clone();
    nan[0] = f64::NAN;
    assert!(matches!(
        check_node_results(&parsed, &topology, &nan, 1.0),
        Err(ResultCheckError::Mismatch { unique_id: 10, .. })
    ));

    let mut incomplete = parsed;
    incomplete.remove(&11);
    assert!(matches!(
        check_node_results(&incomplete, &topology, &values, 1.0),
        Err(ResultCheckError::MissingNode { unique_id: 11 })
    ));
}

#[test]
fn result_files_are_written_and_read() {
    let mesh = create_unit_square_uniform_quad_mesh_2d(2);
    let topology = Topology::from_mesh(&mesh).unwrap();
    let values = DVector::from_fn(9, |i, _| i as f64 * 0.25);
    let path = std::env::temp_dir().join(format!("femassembly-results-{}.txt", std::process::id()));

    write_node_result_file(&path, &topology, &values).unwrap();
    assert_eq!(read_node_result_file(&path).unwrap().len(), 9);
    assert_eq!(check_node_result_file(&path, &topology, &values, 1e-12).unwrap(), 9);
    std::fs::remove_file(&path).unwrap();

    assert!(matches!(
        check_node_result_file(&path, &topology, &values, 1e-12),
        Err(ResultCheckError::Io { .. })
    ));
}
