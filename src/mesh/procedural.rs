//! Basic procedural mesh generation routines.
use crate::connectivity::{
    Cell2dConnectivity, Connectivity, Quad4d2Connectivity, Segment2d2Connectivity, Tri3d2Connectivity,
};
use crate::error::AssemblyError;
use crate::mesh::Mesh2d;
use nalgebra::Point2;

/// Names of the face groups attached to every generated rectangle.
pub const RECTANGLE_FACE_GROUPS: [&str; 4] = ["bottom", "right", "top", "left"];

pub fn create_unit_square_uniform_quad_mesh_2d(cells_per_dim: usize) -> Mesh2d {
    create_rectangular_uniform_quad_mesh_2d(1.0, 1.0, cells_per_dim, cells_per_dim)
}

pub fn create_unit_square_uniform_tri_mesh_2d(cells_per_dim: usize) -> Mesh2d {
    create_rectangular_uniform_tri_mesh_2d(1.0, 1.0, cells_per_dim, cells_per_dim)
}

/// Generates an axis-aligned rectangle `[0, width] x [0, height]` made of counter-clockwise
/// quadrilaterals.
///
/// The mesh carries the face groups `bottom`, `right`, `top`, `left` and `boundary` (all four
/// sides), and the node group `corners`. Faces are oriented and listed counter-clockwise around the
/// rectangle, starting from the origin, so `top` runs from right to left and `left` from top to
/// bottom.
pub fn create_rectangular_uniform_quad_mesh_2d(width: f64, height: f64, cells_x: usize, cells_y: usize) -> Mesh2d {
    let grid = Grid::new(width, height, cells_x, cells_y);
    let cells: Vec<Cell2dConnectivity> = grid
        .cell_corners()
        .map(|[v00, v10, v11, v01]| Quad4d2Connectivity([v00, v10, v11, v01]).into())
        .collect();
    grid.into_mesh(cells)
}

/// Same as [`create_rectangular_uniform_quad_mesh_2d`], but every quadrilateral is split along
/// its diagonal into two counter-clockwise triangles.
pub fn create_rectangular_uniform_tri_mesh_2d(width: f64, height: f64, cells_x: usize, cells_y: usize) -> Mesh2d {
    let grid = Grid::new(width, height, cells_x, cells_y);
    let cells: Vec<Cell2dConnectivity> = grid
        .cell_corners()
        .flat_map(|[v00, v10, v11, v01]| {
            [
                Tri3d2Connectivity([v00, v10, v11]).into(),
                Tri3d2Connectivity([v00, v11, v01]).into(),
            ]
        })
        .collect();
    grid.into_mesh(cells)
}

/// Splits a mesh into `num_parts` partitions.
///
/// Cells are distributed in contiguous blocks of cell indices, and every vertex is owned by the
/// lowest-ranked block containing one of its cells. Each partition holds the cells touching its
/// owned vertices, so ghost vertices appear along the partition interfaces.
pub fn partition_by_cell_blocks(mesh: &Mesh2d, num_parts: usize) -> Result<Vec<Mesh2d>, AssemblyError> {
    assert!(num_parts > 0, "Number of partitions must be positive.");
    let num_cells = mesh.num_cells();
    let mut vertex_owners = vec![usize::MAX; mesh.num_vertices()];
    for (cell_index, cell) in mesh.connectivity().iter().enumerate() {
        let block = cell_index * num_parts / num_cells.max(1);
        for &v in cell.vertex_indices() {
            vertex_owners[v] = vertex_owners[v].min(block);
        }
    }
    // Vertices outside of every cell are assigned to the first partition
    for owner in &mut vertex_owners {
        if *owner == usize::MAX {
            *owner = 0;
        }
    }

    (0..num_parts)
        .map(|rank| mesh.extract_partition(&vertex_owners, rank))
        .collect()
}

struct Grid {
    width: f64,
    height: f64,
    cells_x: usize,
    cells_y: usize,
}

impl Grid {
    fn new(width: f64, height: f64, cells_x: usize, cells_y: usize) -> Self {
        Self {
            width,
            height,
            cells_x,
            cells_y,
        }
    }

    fn vertex_index(&self, i: usize, j: usize) -> usize {
        (self.cells_x + 1) * j + i
    }

    /// Corners `[(i, j), (i + 1, j), (i + 1, j + 1), (i, j + 1)]` of every cell, row by row.
    fn cell_corners(&self) -> impl Iterator<Item = [usize; 4]> + '_ {
        (0..self.cells_y).flat_map(move |j| {
            (0..self.cells_x).map(move |i| {
                [
                    self.vertex_index(i, j),
                    self.vertex_index(i + 1, j),
                    self.vertex_index(i + 1, j + 1),
                    self.vertex_index(i, j + 1),
                ]
            })
        })
    }

    fn into_mesh(self, cells: Vec<Cell2dConnectivity>) -> Mesh2d {
        if self.cells_x == 0 || self.cells_y == 0 {
            return Mesh2d::from_vertices_and_connectivity(Vec::new(), Vec::new());
        }

        let hx = self.width / self.cells_x as f64;
        let hy = self.height / self.cells_y as f64;
        let vertices = (0..=self.cells_y)
            .flat_map(|j| (0..=self.cells_x).map(move |i| Point2::new(i as f64 * hx, j as f64 * hy)))
            .collect();

        let (nx, ny) = (self.cells_x, self.cells_y);
        let bottom: Vec<_> = (0..nx)
            .map(|i| Segment2d2Connectivity([self.vertex_index(i, 0), self.vertex_index(i + 1, 0)]))
            .collect();
        let right: Vec<_> = (0..ny)
            .map(|j| Segment2d2Connectivity([self.vertex_index(nx, j), self.vertex_index(nx, j + 1)]))
            .collect();
        let top: Vec<_> = (0..nx)
            .rev()
            .map(|i| Segment2d2Connectivity([self.vertex_index(i + 1, ny), self.vertex_index(i, ny)]))
            .collect();
        let left: Vec<_> = (0..ny)
            .rev()
            .map(|j| Segment2d2Connectivity([self.vertex_index(0, j + 1), self.vertex_index(0, j)]))
            .collect();
        let corners = vec![
            self.vertex_index(0, 0),
            self.vertex_index(nx, 0),
            self.vertex_index(nx, ny),
            self.vertex_index(0, ny),
        ];

        let mut mesh = Mesh2d::from_vertices_and_connectivity(vertices, cells);
        let boundary = [&bottom, &right, &top, &left]
            .into_iter()
            .flatten()
            .copied()
            .collect();
        for (name, faces) in RECTANGLE_FACE_GROUPS.into_iter().zip([bottom, right, top, left]) {
            mesh.insert_face_group(name, faces);
        }
        mesh.insert_face_group("boundary", boundary);
        mesh.insert_node_group("corners", corners);
        mesh
    }
}
