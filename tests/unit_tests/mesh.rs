use femassembly::connectivity::{
    Cell2dConnectivity, Connectivity, ElementKind, Quad4d2Connectivity, Segment2d2Connectivity,
};
use femassembly::error::AssemblyError;
use femassembly::geometry::polygon_area;
use femassembly::mesh::procedural::{
    create_rectangular_uniform_quad_mesh_2d, create_unit_square_uniform_quad_mesh_2d,
    create_unit_square_uniform_tri_mesh_2d, partition_by_cell_blocks,
};
use femassembly::mesh::Mesh2d;
use itertools::Itertools;
use nalgebra::Point2;
use proptest::collection::vec;
use proptest::prelude::*;
use std::cmp::max;
use std::collections::BTreeMap;

fn segments(pairs: &[[usize; 2]]) -> Vec<Segment2d2Connectivity> {
    pairs.iter().copied().map(Segment2d2Connectivity).collect()
}

#[test]
fn unit_square_meshes_have_expected_sizes() {
    let quads = create_unit_square_uniform_quad_mesh_2d(3);
    assert_eq!(quads.num_vertices(), 16);
    assert_eq!(quads.num_cells(), 9);
    assert!(quads.check_element_kind(ElementKind::Quad).is_ok());

    let tris = create_unit_square_uniform_tri_mesh_2d(3);
    assert_eq!(tris.num_vertices(), 16);
    assert_eq!(tris.num_cells(), 18);
    assert!(tris.check_element_kind(ElementKind::Triangle).is_ok());

    assert_eq!(
        tris.check_element_kind(ElementKind::Quad),
        Err(AssemblyError::UnsupportedElementType {
            element: 0,
            expected: ElementKind::Quad,
            found: ElementKind::Triangle,
        })
    );

    let empty = create_unit_square_uniform_tri_mesh_2d(0);
    assert_eq!(empty.num_vertices(), 0);
    assert_eq!(empty.num_cells(), 0);
}

#[test]
fn generated_cells_are_counter_clockwise() {
    let mesh = create_rectangular_uniform_quad_mesh_2d(2.0, 3.0, 2, 3);
    assert_eq!(mesh.vertices()[mesh.num_vertices() - 1], Point2::new(2.0, 3.0));
    for cell in mesh.connectivity() {
        let p: Vec<_> = cell
            .vertex_indices()
            .iter()
            .map(|&v| mesh.vertices()[v])
            .collect();
        assert!(polygon_area(&p) > 0.0);
    }
}

#[test]
fn unit_square_groups() {
    let mesh = create_unit_square_uniform_quad_mesh_2d(2);
    assert_eq!(mesh.face_group("bottom").unwrap(), segments(&[[0, 1], [1, 2]]));
    assert_eq!(mesh.face_group("right").unwrap(), segments(&[[2, 5], [5, 8]]));
    assert_eq!(mesh.face_group("top").unwrap(), segments(&[[8, 7], [7, 6]]));
    assert_eq!(mesh.face_group("left").unwrap(), segments(&[[6, 3], [3, 0]]));
    assert_eq!(mesh.face_group("boundary").unwrap().len(), 8);
    assert_eq!(mesh.node_group("corners").unwrap(), &[0, 2, 8, 6]);
    assert_eq!(
        mesh.face_group_names().collect::<Vec<_>>(),
        ["boundary", "bottom", "left", "right", "top"]
    );

    assert_eq!(
        mesh.face_group("inlet"),
        Err(AssemblyError::UnknownGroup("inlet".to_string()))
    );
    assert_eq!(
        mesh.node_group("bottom"),
        Err(AssemblyError::UnknownGroup("bottom".to_string()))
    );
}

#[test]
fn boundary_group_is_a_counter_clockwise_loop() {
    let mesh = create_rectangular_uniform_quad_mesh_2d(2.0, 1.0, 3, 2);
    let boundary = mesh.face_group("boundary").unwrap();
    assert_eq!(boundary.len(), 10);
    assert_eq!(boundary[0][0], 0);
    for (face, next) in boundary.iter().zip(boundary.iter().cycle().skip(1)) {
        assert_eq!(face[1], next[0]);
    }

    // Shoelace over the chain of face start points
    let loop_points: Vec<_> = boundary.iter().map(|face| mesh.vertices()[face[0]]).collect();
    assert!((polygon_area(&loop_points) - 2.0).abs() <= 1e-12);

    assert_eq!(mesh.face_group("top").unwrap(), segments(&[[11, 10], [10, 9], [9, 8]]));
    assert_eq!(mesh.face_group("left").unwrap(), segments(&[[8, 4], [4, 0]]));
}

#[test]
fn boundary_group_matches_boundary_faces() {
    let mesh = create_unit_square_uniform_tri_mesh_2d(3);
    let from_group = mesh
        .face_group("boundary")
        .unwrap()
        .iter()
        .map(Segment2d2Connectivity::canonical)
        .sorted()
        .collect_vec();
    let found = mesh
        .find_boundary_faces()
        .into_iter()
        .map(|(face, _, _)| face.canonical())
        .sorted()
        .collect_vec();
    assert_eq!(from_group, found);

    let quads = create_unit_square_uniform_quad_mesh_2d(2);
    assert_eq!(quads.find_boundary_vertices(), vec![0, 1, 2, 3, 5, 6, 7, 8]);
}

#[test]
fn ownership_and_unique_ids_are_validated() {
    let mut mesh = create_unit_square_uniform_tri_mesh_2d(1);
    assert_eq!(mesh.unique_ids(), &[0, 1, 2, 3]);
    assert_eq!(mesh.num_owned_vertices(), 4);

    assert!(matches!(
        mesh.set_ownership(vec![true; 3]),
        Err(AssemblyError::SizeMismatch { expected: 4, actual: 3, .. })
    ));
    mesh.set_ownership(vec![true, false, true, false]).unwrap();
    assert_eq!(mesh.num_owned_vertices(), 2);
    assert!(!mesh.is_owned(1));

    assert!(mesh.set_unique_ids(vec![7]).is_err());
    mesh.set_unique_ids(vec![10, 11, 12, 13]).unwrap();
    assert_eq!(mesh.unique_ids(), &[10, 11, 12, 13]);
}

#[test]
fn keep_cells_relabels_vertices_and_groups() {
    let mesh = create_unit_square_uniform_quad_mesh_2d(2);
    // The upper right cell
    let kept = mesh.keep_cells(&[3]);
    assert_eq!(kept.num_vertices(), 4);
    assert_eq!(kept.unique_ids(), &[4, 5, 7, 8]);
    assert_eq!(kept.connectivity(), &[Cell2dConnectivity::Quad4(Quad4d2Connectivity([0, 1, 3, 2]))]);
    assert_eq!(kept.face_group("right").unwrap(), segments(&[[1, 3]]));
    assert_eq!(kept.face_group("top").unwrap(), segments(&[[3, 2]]));
    assert!(kept.face_group("bottom").unwrap().is_empty());
    assert_eq!(kept.node_group("corners").unwrap(), &[3]);
}

#[test]
fn partitions_own_every_vertex_exactly_once() {
    let mesh = create_unit_square_uniform_tri_mesh_2d(6);
    let parts = partition_by_cell_blocks(&mesh, 4).unwrap();
    assert_eq!(parts.len(), 4);

    let mut owners = BTreeMap::new();
    for (rank, part) in parts.iter().enumerate() {
        for v in (0..part.num_vertices()).filter(|&v| part.is_owned(v)) {
            assert!(owners.insert(part.unique_ids()[v], rank).is_none());
            assert_eq!(part.vertices()[v], mesh.vertices()[part.unique_ids()[v]]);
        }
    }
    assert_eq!(owners.len(), mesh.num_vertices());
    assert!(parts.iter().all(|part| part.num_owned_vertices() > 0));
    assert!(parts.iter().skip(1).any(|part| part.num_owned_vertices() < part.num_vertices()));
}

#[test]
fn partitions_contain_all_cells_of_owned_vertices() {
    let mesh = create_unit_square_uniform_quad_mesh_2d(5);
    let cells_per_vertex = |mesh: &Mesh2d| {
        let mut counts = BTreeMap::new();
        for cell in mesh.connectivity() {
            for &v in cell.vertex_indices() {
                *counts.entry(mesh.unique_ids()[v]).or_insert(0) += 1;
            }
        }
        counts
    };
    let global_counts = cells_per_vertex(&mesh);

    for part in partition_by_cell_blocks(&mesh, 3).unwrap() {
        let local_counts = cells_per_vertex(&part);
        for v in (0..part.num_vertices()).filter(|&v| part.is_owned(v)) {
            let id = part.unique_ids()[v];
            assert_eq!(local_counts[&id], global_counts[&id]);
        }
    }
}

#[test]
fn single_partition_is_the_whole_mesh() {
    let mesh = create_unit_square_uniform_tri_mesh_2d(3);
    let parts = partition_by_cell_blocks(&mesh, 1).unwrap();
    assert_eq!(parts, vec![mesh]);
}

proptest! {
    #[test]
    fn keep_cells_preserves_cell_geometry(
        (mesh, cell_indices) in (1usize..5)
            .prop_map(create_unit_square_uniform_tri_mesh_2d)
            .prop_flat_map(|mesh| {
                let num_cells = mesh.num_cells();
                (Just(mesh), vec(0..max(1, num_cells), 0..2 * num_cells))
            })
    ) {
        let kept = mesh.keep_cells(&cell_indices);
        prop_assert_eq!(kept.num_cells(), cell_indices.len());

        for (new_index, &old_index) in cell_indices.iter().enumerate() {
            let old_points = mesh.connectivity()[old_index]
                .vertex_indices()
                .iter()
                .map(|&v| (mesh.vertices()[v], mesh.unique_ids()[v]))
                .collect_vec();
            let new_points = kept.connectivity()[new_index]
                .vertex_indices()
                .iter()
                .map(|&v| (kept.vertices()[v], kept.unique_ids()[v]))
                .collect_vec();
            prop_assert_eq!(old_points, new_points);
        }
    }
}
