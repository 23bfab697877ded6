//! Adjacency queries on a mesh partition.
use crate::connectivity::{Cell2dConnectivity, Connectivity, ElementKind, Segment2d2Connectivity};
use crate::error::AssemblyError;
use crate::geometry::{edge_length, edge_normal, polygon_area};
use crate::mesh::Mesh2d;
use femassembly_sparse::scan::exclusive_scan;
use nalgebra::{Point2, Vector2};
use rustc_hash::FxHashMap;

/// Read-only view of mesh topology consumed by the assembly routines.
///
/// Elements list their nodes in a stable local order (counter-clockwise). Faces are the unique
/// undirected edges of the mesh. Node indices double as local degree of freedom indices.
pub trait MeshTopology: Sync {
    fn num_nodes(&self) -> usize;
    fn num_elements(&self) -> usize;
    fn num_faces(&self) -> usize;

    fn element_nodes(&self, element: usize) -> &[usize];
    fn face_nodes(&self, face: usize) -> [usize; 2];

    /// Faces incident to the node.
    fn node_faces(&self, node: usize) -> &[usize];
    /// Elements incident to the node.
    fn node_elements(&self, node: usize) -> &[usize];

    fn is_owned(&self, node: usize) -> bool;
    fn node_position(&self, node: usize) -> Point2<f64>;
    fn unique_id(&self, node: usize) -> usize;
}

const NO_ELEMENT: usize = usize::MAX;

/// A unique edge of the mesh.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Face {
    /// Vertices in increasing order.
    pub nodes: [usize; 2],
    elements: [usize; 2],
    /// Whether `nodes[0] -> nodes[1]` runs counter-clockwise along the first adjacent element.
    pub is_outward: bool,
}

impl Face {
    /// The first element adjacent to the face.
    pub fn element(&self) -> usize {
        self.elements[0]
    }

    /// The second adjacent element, if any.
    pub fn opposite_element(&self) -> Option<usize> {
        (self.elements[1] != NO_ELEMENT).then(|| self.elements[1])
    }

    pub fn is_boundary(&self) -> bool {
        self.elements[1] == NO_ELEMENT
    }
}

/// Compressed lists of indices, one list per node.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Adjacency {
    offsets: Vec<usize>,
    indices: Vec<usize>,
}

impl Adjacency {
    fn from_pairs(num_nodes: usize, pairs: &[(usize, usize)]) -> Self {
        let mut counts = vec![0; num_nodes];
        for &(node, _) in pairs {
            counts[node] += 1;
        }
        let offsets = exclusive_scan(&counts);
        let mut fill = offsets.clone();
        let mut indices = vec![0; pairs.len()];
        for &(node, index) in pairs {
            indices[fill[node]] = index;
            fill[node] += 1;
        }
        Self { offsets, indices }
    }

    fn get(&self, node: usize) -> &[usize] {
        &self.indices[self.offsets[node]..self.offsets[node + 1]]
    }
}

/// Face and adjacency information computed from a [`Mesh2d`].
#[derive(Debug, Clone)]
pub struct Topology<'a> {
    mesh: &'a Mesh2d,
    faces: Vec<Face>,
    face_lookup: FxHashMap<[usize; 2], usize>,
    node_faces: Adjacency,
    node_elements: Adjacency,
}

impl<'a> Topology<'a> {
    /// Builds faces and node adjacency, rejecting elements with out-of-bounds or repeated
    /// vertices and faces shared by more than two elements.
    pub fn from_mesh(mesh: &'a Mesh2d) -> Result<Self, AssemblyError> {
        let num_nodes = mesh.num_vertices();
        let mut faces = Vec::new();
        let mut face_lookup = FxHashMap::default();
        let mut element_pairs = Vec::new();

        for (element, cell) in mesh.connectivity().iter().enumerate() {
            let vertices = cell.vertex_indices();
            if vertices.iter().any(|&v| v >= num_nodes) {
                return Err(AssemblyError::CorruptElement {
                    element,
                    reason: "vertex index out of bounds",
                });
            }
            for (k, v) in vertices.iter().enumerate() {
                if vertices[..k].contains(v) {
                    return Err(AssemblyError::CorruptElement {
                        element,
                        reason: "repeated vertex",
                    });
                }
                element_pairs.push((*v, element));
            }

            for local_face in 0..cell.num_faces() {
                let Some(face) = cell.get_face_connectivity(local_face) else {
                    continue;
                };
                let key = face.canonical().0;
                match face_lookup.get(&key).copied() {
                    None => {
                        face_lookup.insert(key, faces.len());
                        faces.push(Face {
                            nodes: key,
                            elements: [element, NO_ELEMENT],
                            is_outward: face[0] == key[0],
                        });
                    }
                    Some(index) => {
                        let existing: &mut Face = &mut faces[index];
                        if existing.elements[1] != NO_ELEMENT {
                            return Err(AssemblyError::CorruptElement {
                                element,
                                reason: "face shared by more than two elements",
                            });
                        }
                        existing.elements[1] = element;
                    }
                }
            }
        }

        let face_pairs: Vec<_> = faces
            .iter()
            .enumerate()
            .flat_map(|(index, face)| face.nodes.map(|node| (node, index)))
            .collect();

        Ok(Self {
            mesh,
            node_faces: Adjacency::from_pairs(num_nodes, &face_pairs),
            node_elements: Adjacency::from_pairs(num_nodes, &element_pairs),
            faces,
            face_lookup,
        })
    }

    pub fn mesh(&self) -> &'a Mesh2d {
        self.mesh
    }

    pub fn face(&self, face: usize) -> &Face {
        &self.faces[face]
    }

    pub fn faces(&self) -> &[Face] {
        &self.faces
    }

    /// Finds the face connecting two vertices, in either order.
    pub fn find_face(&self, segment: &Segment2d2Connectivity) -> Option<usize> {
        self.face_lookup.get(&segment.canonical().0).copied()
    }

    pub fn boundary_faces(&self) -> impl Iterator<Item = usize> + '_ {
        self.faces
            .iter()
            .enumerate()
            .filter(|(_, face)| face.is_boundary())
            .map(|(index, _)| index)
    }

    pub fn element_kind(&self, element: usize) -> ElementKind {
        self.mesh.connectivity()[element].kind()
    }

    pub fn element_connectivity(&self, element: usize) -> &'a Cell2dConnectivity {
        &self.mesh.connectivity()[element]
    }

    /// Signed area of the element.
    pub fn element_area(&self, element: usize) -> f64 {
        let vertices: Vec<_> = self
            .element_nodes(element)
            .iter()
            .map(|&v| self.mesh.vertices()[v])
            .collect();
        polygon_area(&vertices)
    }

    pub fn face_length(&self, face: usize) -> f64 {
        let [a, b] = self.faces[face].nodes;
        edge_length(&self.mesh.vertices()[a], &self.mesh.vertices()[b])
    }

    /// Unit normal of the face pointing out of its first adjacent element.
    pub fn face_normal(&self, face: usize) -> Vector2<f64> {
        let face = &self.faces[face];
        let [a, b] = face.nodes;
        edge_normal(&self.mesh.vertices()[a], &self.mesh.vertices()[b], face.is_outward)
    }
}

impl<'a> MeshTopology for Topology<'a> {
    fn num_nodes(&self) -> usize {
        self.mesh.num_vertices()
    }

    fn num_elements(&self) -> usize {
        self.mesh.num_cells()
    }

    fn num_faces(&self) -> usize {
        self.faces.len()
    }

    fn element_nodes(&self, element: usize) -> &[usize] {
        self.mesh.connectivity()[element].vertex_indices()
    }

    fn face_nodes(&self, face: usize) -> [usize; 2] {
        self.faces[face].nodes
    }

    fn node_faces(&self, node: usize) -> &[usize] {
        self.node_faces.get(node)
    }

    fn node_elements(&self, node: usize) -> &[usize] {
        self.node_elements.get(node)
    }

    fn is_owned(&self, node: usize) -> bool {
        self.mesh.is_owned(node)
    }

    fn node_position(&self, node: usize) -> Point2<f64> {
        self.mesh.vertices()[node]
    }

    fn unique_id(&self, node: usize) -> usize {
        self.mesh.unique_ids()[node]
    }
}
