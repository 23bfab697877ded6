use crate::connectivity::{Cell2dConnectivity, Connectivity, ElementKind, Segment2d2Connectivity};
use crate::error::AssemblyError;
use nalgebra::Point2;
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub mod procedural;

/// Index-based two-dimensional mesh of one partition of a (possibly distributed) domain.
///
/// Besides vertices and cells, the mesh carries
///
/// - a globally unique id for every vertex, shared by all partitions that see the vertex,
/// - an ownership flag for every vertex (exactly one partition owns each vertex; the others only
///   hold it as a ghost),
/// - named groups of boundary faces and of vertices, on which boundary conditions are prescribed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Mesh2d {
    vertices: Vec<Point2<f64>>,
    connectivity: Vec<Cell2dConnectivity>,
    unique_ids: Vec<usize>,
    owned: Vec<bool>,
    face_groups: BTreeMap<String, Vec<Segment2d2Connectivity>>,
    node_groups: BTreeMap<String, Vec<usize>>,
}

impl Mesh2d {
    /// Construct a serial mesh from vertices and connectivity.
    ///
    /// Every vertex is owned and its unique id is its index.
    pub fn from_vertices_and_connectivity(
        vertices: Vec<Point2<f64>>,
        connectivity: Vec<Cell2dConnectivity>,
    ) -> Self {
        let n = vertices.len();
        Self {
            vertices,
            connectivity,
            unique_ids: (0..n).collect(),
            owned: vec![true; n],
            face_groups: BTreeMap::new(),
            node_groups: BTreeMap::new(),
        }
    }

    pub fn vertices(&self) -> &[Point2<f64>] {
        &self.vertices
    }

    pub fn connectivity(&self) -> &[Cell2dConnectivity] {
        &self.connectivity
    }

    pub fn num_vertices(&self) -> usize {
        self.vertices.len()
    }

    pub fn num_cells(&self) -> usize {
        self.connectivity.len()
    }

    pub fn unique_ids(&self) -> &[usize] {
        &self.unique_ids
    }

    pub fn owned_mask(&self) -> &[bool] {
        &self.owned
    }

    pub fn is_owned(&self, vertex: usize) -> bool {
        self.owned[vertex]
    }

    pub fn num_owned_vertices(&self) -> usize {
        self.owned.iter().filter(|&&owned| owned).count()
    }

    pub fn set_unique_ids(&mut self, unique_ids: Vec<usize>) -> Result<(), AssemblyError> {
        check_len("unique ids", self.vertices.len(), unique_ids.len())?;
        self.unique_ids = unique_ids;
        Ok(())
    }

    pub fn set_ownership(&mut self, owned: Vec<bool>) -> Result<(), AssemblyError> {
        check_len("ownership flags", self.vertices.len(), owned.len())?;
        self.owned = owned;
        Ok(())
    }

    pub fn insert_face_group(&mut self, name: impl Into<String>, faces: Vec<Segment2d2Connectivity>) {
        self.face_groups.insert(name.into(), faces);
    }

    pub fn insert_node_group(&mut self, name: impl Into<String>, vertices: Vec<usize>) {
        self.node_groups.insert(name.into(), vertices);
    }

    pub fn face_group(&self, name: &str) -> Result<&[Segment2d2Connectivity], AssemblyError> {
        self.face_groups
            .get(name)
            .map(Vec::as_slice)
            .ok_or_else(|| AssemblyError::UnknownGroup(name.to_string()))
    }

    pub fn node_group(&self, name: &str) -> Result<&[usize], AssemblyError> {
        self.node_groups
            .get(name)
            .map(Vec::as_slice)
            .ok_or_else(|| AssemblyError::UnknownGroup(name.to_string()))
    }

    pub fn face_group_names(&self) -> impl Iterator<Item = &str> {
        self.face_groups.keys().map(String::as_str)
    }

    pub fn node_group_names(&self) -> impl Iterator<Item = &str> {
        self.node_groups.keys().map(String::as_str)
    }

    /// Checks that every cell is of the given kind.
    pub fn check_element_kind(&self, kind: ElementKind) -> Result<(), AssemblyError> {
        match self
            .connectivity
            .iter()
            .position(|cell| cell.kind() != kind)
        {
            Some(element) => Err(AssemblyError::UnsupportedElementType {
                element,
                expected: kind,
                found: self.connectivity[element].kind(),
            }),
            None => Ok(()),
        }
    }

    /// Finds faces which are only connected to exactly one cell, along with the connected cell
    /// index and the local index of the face within that cell.
    pub fn find_boundary_faces(&self) -> Vec<(Segment2d2Connectivity, usize, usize)> {
        // BTreeMap keeps the output order deterministic
        let mut face_counts = BTreeMap::new();
        for (cell_index, cell) in self.connectivity.iter().enumerate() {
            for local_index in 0..cell.num_faces() {
                if let Some(face) = cell.get_face_connectivity(local_index) {
                    face_counts
                        .entry(face.canonical())
                        .and_modify(|(_, count)| *count += 1)
                        .or_insert(((face, cell_index, local_index), 1));
                }
            }
        }

        face_counts
            .into_values()
            .filter(|&(_, count)| count == 1)
            .map(|(info, _)| info)
            .collect()
    }

    /// Returns a sorted list of vertices that belong to a boundary face.
    pub fn find_boundary_vertices(&self) -> Vec<usize> {
        let mut indices: Vec<_> = self
            .find_boundary_faces()
            .into_iter()
            .flat_map(|(face, _, _)| face.0)
            .collect();
        indices.sort_unstable();
        indices.dedup();
        indices
    }

    /// Returns a new mesh in which only the desired cells are kept. The vertices are removed or
    /// relabeled as necessary, keeping their unique ids and ownership flags.
    ///
    /// Face groups keep the faces whose vertices are both kept, node groups keep the kept
    /// vertices.
    pub fn keep_cells(&self, cell_indices: &[usize]) -> Self {
        let mut vertex_keep_table = vec![false; self.vertices.len()];
        for &cell_index in cell_indices {
            for &vertex_index in self.connectivity[cell_index].vertex_indices() {
                vertex_keep_table[vertex_index] = true;
            }
        }

        let old_to_new: FxHashMap<usize, usize> = vertex_keep_table
            .iter()
            .enumerate()
            .filter(|(_, &keep)| keep)
            .map(|(old, _)| old)
            .enumerate()
            .map(|(new, old)| (old, new))
            .collect();
        let relabel = |index: &usize| old_to_new.get(index).copied();

        let connectivity = cell_indices
            .iter()
            .map(|&i| match self.connectivity[i] {
                Cell2dConnectivity::Tri3(mut tri) => {
                    tri.iter_mut().for_each(|v| *v = old_to_new[&*v]);
                    Cell2dConnectivity::Tri3(tri)
                }
                Cell2dConnectivity::Quad4(mut quad) => {
                    quad.iter_mut().for_each(|v| *v = old_to_new[&*v]);
                    Cell2dConnectivity::Quad4(quad)
                }
            })
            .collect();

        let kept: Vec<usize> = (0..self.vertices.len())
            .filter(|&i| vertex_keep_table[i])
            .collect();

        let face_groups = self
            .face_groups
            .iter()
            .map(|(name, faces)| {
                let kept_faces = faces
                    .iter()
                    .filter_map(|face| Some(Segment2d2Connectivity([relabel(&face[0])?, relabel(&face[1])?])))
                    .collect();
                (name.clone(), kept_faces)
            })
            .collect();

        let node_groups = self
            .node_groups
            .iter()
            .map(|(name, vertices)| (name.clone(), vertices.iter().filter_map(relabel).collect()))
            .collect();

        Self {
            vertices: kept.iter().map(|&i| self.vertices[i]).collect(),
            connectivity,
            unique_ids: kept.iter().map(|&i| self.unique_ids[i]).collect(),
            owned: kept.iter().map(|&i| self.owned[i]).collect(),
            face_groups,
            node_groups,
        }
    }

    /// Extracts the partition of the mesh owned by `rank`.
    ///
    /// `vertex_owners[v]` is the rank owning vertex `v`. The partition contains every cell with at
    /// least one vertex owned by `rank`, so that all cells contributing to an owned row are
    /// present locally. Vertices of these cells owned by other ranks become ghosts.
    pub fn extract_partition(&self, vertex_owners: &[usize], rank: usize) -> Result<Self, AssemblyError> {
        check_len("vertex owners", self.vertices.len(), vertex_owners.len())?;
        let local_cells: Vec<usize> = self
            .connectivity
            .iter()
            .enumerate()
            .filter(|(_, cell)| cell.vertex_indices().iter().any(|&v| vertex_owners[v] == rank))
            .map(|(i, _)| i)
            .collect();

        let mut tagged = self.clone();
        tagged.owned = vertex_owners.iter().map(|&owner| owner == rank).collect();
        Ok(tagged.keep_cells(&local_cells))
    }
}

fn check_len(what: &'static str, expected: usize, actual: usize) -> Result<(), AssemblyError> {
    if expected == actual {
        Ok(())
    } else {
        Err(AssemblyError::SizeMismatch {
            what,
            expected,
            actual,
        })
    }
}
