use femassembly::connectivity::{Segment2d2Connectivity, Tri3d2Connectivity};
use femassembly::error::AssemblyError;
use femassembly::mesh::procedural::{create_unit_square_uniform_quad_mesh_2d, create_unit_square_uniform_tri_mesh_2d};
use femassembly::mesh::Mesh2d;
use femassembly::topology::{MeshTopology, Topology};
use itertools::Itertools;
use matrixcompare::assert_scalar_eq;
use nalgebra::{Point2, Vector2};
use proptest::prelude::*;

fn tri_mesh(vertices: Vec<Point2<f64>>, triangles: &[[usize; 3]]) -> Mesh2d {
    let cells = triangles
        .iter()
        .map(|&tri| Tri3d2Connectivity(tri).into())
        .collect();
    Mesh2d::from_vertices_and_connectivity(vertices, cells)
}

#[test]
fn face_counts_of_unit_square_meshes() {
    let quads = create_unit_square_uniform_quad_mesh_2d(2);
    let topology = Topology::from_mesh(&quads).unwrap();
    assert_eq!(topology.num_nodes(), 9);
    assert_eq!(topology.num_elements(), 4);
    assert_eq!(topology.num_faces(), 12);
    assert_eq!(topology.boundary_faces().count(), 8);

    let tris = create_unit_square_uniform_tri_mesh_2d(2);
    let topology = Topology::from_mesh(&tris).unwrap();
    assert_eq!(topology.num_elements(), 8);
    assert_eq!(topology.num_faces(), 16);
    assert_eq!(topology.boundary_faces().count(), 8);
}

#[test]
fn node_adjacency_of_center_node() {
    let quads = create_unit_square_uniform_quad_mesh_2d(2);
    let topology = Topology::from_mesh(&quads).unwrap();
    assert_eq!(topology.node_elements(4), &[0, 1, 2, 3]);
    let neighbors = topology
        .node_faces(4)
        .iter()
        .map(|&face| topology.face_nodes(face))
        .map(|[a, b]| if a == 4 { b } else { a })
        .sorted()
        .collect_vec();
    assert_eq!(neighbors, vec![1, 3, 5, 7]);
    assert_eq!(topology.node_faces(0).len(), 2);
    assert_eq!(topology.node_elements(0), &[0]);

    let tris = create_unit_square_uniform_tri_mesh_2d(2);
    let topology = Topology::from_mesh(&tris).unwrap();
    assert_eq!(topology.node_elements(4).len(), 6);
    let neighbors = topology
        .node_faces(4)
        .iter()
        .map(|&face| topology.face_nodes(face))
        .map(|[a, b]| if a == 4 { b } else { a })
        .sorted()
        .collect_vec();
    assert_eq!(neighbors, vec![0, 1, 3, 5, 7, 8]);
}

#[test]
fn faces_are_found_in_either_orientation() {
    let mesh = create_unit_square_uniform_quad_mesh_2d(1);
    let topology = Topology::from_mesh(&mesh).unwrap();
    let forward = topology.find_face(&Segment2d2Connectivity([1, 3])).unwrap();
    let backward = topology.find_face(&Segment2d2Connectivity([3, 1])).unwrap();
    assert_eq!(forward, backward);
    assert_eq!(topology.face_nodes(forward), [1, 3]);
    assert!(topology.face(forward).is_boundary());
    // Diagonal
    assert_eq!(topology.find_face(&Segment2d2Connectivity([0, 3])), None);
}

#[test]
fn interior_faces_have_two_elements() {
    let mesh = create_unit_square_uniform_tri_mesh_2d(1);
    let topology = Topology::from_mesh(&mesh).unwrap();
    let diagonal = topology.find_face(&Segment2d2Connectivity([0, 3])).unwrap();
    let face = topology.face(diagonal);
    assert!(!face.is_boundary());
    assert_eq!(face.element(), 0);
    assert_eq!(face.opposite_element(), Some(1));
}

#[test]
fn boundary_normals_point_outward() {
    for mesh in [
        create_unit_square_uniform_tri_mesh_2d(3),
        create_unit_square_uniform_quad_mesh_2d(3),
    ] {
        let topology = Topology::from_mesh(&mesh).unwrap();
        let center = Point2::new(0.5, 0.5);
        for face in topology.boundary_faces() {
            let [a, b] = topology.face_nodes(face);
            let midpoint = Point2::from((mesh.vertices()[a].coords + mesh.vertices()[b].coords) / 2.0);
            let normal = topology.face_normal(face);
            assert_scalar_eq!(normal.norm(), 1.0, comp = abs, tol = 1e-14);
            assert!(normal.dot(&(midpoint - center)) > 0.0);
            assert_scalar_eq!(topology.face_length(face), 1.0 / 3.0, comp = abs, tol = 1e-14);
        }
    }
}

#[test]
fn bottom_face_normal() {
    let mesh = create_unit_square_uniform_quad_mesh_2d(1);
    let topology = Topology::from_mesh(&mesh).unwrap();
    let face = topology.find_face(&Segment2d2Connectivity([1, 0])).unwrap();
    assert_eq!(topology.face_normal(face), Vector2::new(0.0, -1.0));
}

#[test]
fn element_areas_sum_to_domain_area() {
    let mesh = create_unit_square_uniform_tri_mesh_2d(4);
    let topology = Topology::from_mesh(&mesh).unwrap();
    let total: f64 = (0..topology.num_elements())
        .map(|element| topology.element_area(element))
        .sum();
    assert_scalar_eq!(total, 1.0, comp = abs, tol = 1e-14);
}

#[test]
fn corrupt_connectivity_is_rejected() {
    let vertices = vec![
        Point2::new(0.0, 0.0),
        Point2::new(1.0, 0.0),
        Point2::new(0.0, 1.0),
        Point2::new(1.0, 1.0),
        Point2::new(-1.0, 1.0),
    ];

    let repeated = tri_mesh(vertices.clone(), &[[0, 1, 2], [1, 3, 3]]);
    assert_eq!(
        Topology::from_mesh(&repeated).unwrap_err(),
        AssemblyError::CorruptElement {
            element: 1,
            reason: "repeated vertex"
        }
    );

    let out_of_bounds = tri_mesh(vertices.clone(), &[[0, 1, 5]]);
    assert!(matches!(
        Topology::from_mesh(&out_of_bounds),
        Err(AssemblyError::CorruptElement { element: 0, .. })
    ));

    // Three triangles sharing the edge (0, 2)
    let non_manifold = tri_mesh(vertices, &[[0, 1, 2], [0, 2, 4], [2, 0, 3]]);
    assert!(matches!(
        Topology::from_mesh(&non_manifold),
        Err(AssemblyError::CorruptElement { element: 2, .. })
    ));
}

#[test]
fn ownership_and_unique_ids_come_from_the_mesh() {
    let mut mesh = create_unit_square_uniform_tri_mesh_2d(1);
    mesh.set_ownership(vec![false, true, true, false]).unwrap();
    mesh.set_unique_ids(vec![40, 41, 42, 43]).unwrap();
    let topology = Topology::from_mesh(&mesh).unwrap();
    assert!(!topology.is_owned(0));
    assert!(topology.is_owned(1));
    assert_eq!(topology.unique_id(2), 42);
    assert_eq!(topology.node_position(3), Point2::new(1.0, 1.0));
}

proptest! {
    #[test]
    fn euler_characteristic_of_unit_square(n in 1usize..8) {
        for mesh in [create_unit_square_uniform_tri_mesh_2d(n), create_unit_square_uniform_quad_mesh_2d(n)] {
            let topology = Topology::from_mesh(&mesh).unwrap();
            let (v, e, f) = (topology.num_nodes() as i64, topology.num_faces() as i64, topology.num_elements() as i64);
            prop_assert_eq!(v - e + f, 1);
            prop_assert_eq!(topology.boundary_faces().count(), 4 * n);

            // Every element is listed exactly once per vertex
            let incidences: usize = (0..topology.num_nodes()).map(|node| topology.node_elements(node).len()).sum();
            let expected: usize = (0..topology.num_elements()).map(|e| topology.element_nodes(e).len()).sum();
            prop_assert_eq!(incidences, expected);
            prop_assert_eq!(
                (0..topology.num_nodes()).map(|node| topology.node_faces(node).len()).sum::<usize>(),
                2 * topology.num_faces()
            );
        }
    }
}
