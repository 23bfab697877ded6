use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::{Deref, DerefMut};

/// The kind of first-order element a mesh is made of.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ElementKind {
    #[serde(alias = "tri3")]
    Triangle,
    #[serde(alias = "quad4")]
    Quad,
}

impl ElementKind {
    /// Number of nodes of an element of this kind.
    pub fn arity(&self) -> usize {
        match self {
            Self::Triangle => 3,
            Self::Quad => 4,
        }
    }
}

impl fmt::Display for ElementKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Triangle => write!(f, "triangle"),
            Self::Quad => write!(f, "quad"),
        }
    }
}

pub trait Connectivity: Clone {
    fn num_faces(&self) -> usize;
    fn get_face_connectivity(&self, index: usize) -> Option<Segment2d2Connectivity>;

    fn vertex_indices(&self) -> &[usize];
}

/// An edge between two vertices.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Segment2d2Connectivity(pub [usize; 2]);

impl Segment2d2Connectivity {
    /// The same edge with vertices in increasing order.
    pub fn canonical(&self) -> Self {
        let [a, b] = self.0;
        Self([a.min(b), a.max(b)])
    }
}

impl Deref for Segment2d2Connectivity {
    type Target = [usize; 2];

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

/// Counter-clockwise triangle.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Tri3d2Connectivity(pub [usize; 3]);

impl Deref for Tri3d2Connectivity {
    type Target = [usize; 3];

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl DerefMut for Tri3d2Connectivity {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.0
    }
}

impl Connectivity for Tri3d2Connectivity {
    fn num_faces(&self) -> usize {
        3
    }

    fn get_face_connectivity(&self, index: usize) -> Option<Segment2d2Connectivity> {
        let v = &self.0;
        (index < 3).then(|| Segment2d2Connectivity([v[index], v[(index + 1) % 3]]))
    }

    fn vertex_indices(&self) -> &[usize] {
        &self.0
    }
}

/// Counter-clockwise bilinear quadrilateral.
///
/// Vertex `a` shares edges with `a + 1` and `a + 3` (mod 4), while `a + 2` is the opposite corner.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Quad4d2Connectivity(pub [usize; 4]);

impl Deref for Quad4d2Connectivity {
    type Target = [usize; 4];

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl DerefMut for Quad4d2Connectivity {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.0
    }
}

impl Connectivity for Quad4d2Connectivity {
    fn num_faces(&self) -> usize {
        4
    }

    fn get_face_connectivity(&self, index: usize) -> Option<Segment2d2Connectivity> {
        let v = &self.0;
        (index < 4).then(|| Segment2d2Connectivity([v[index], v[(index + 1) % 4]]))
    }

    fn vertex_indices(&self) -> &[usize] {
        &self.0
    }
}

/// A cell of a two-dimensional mesh that may mix triangles and quadrilaterals.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Cell2dConnectivity {
    Tri3(Tri3d2Connectivity),
    Quad4(Quad4d2Connectivity),
}

impl Cell2dConnectivity {
    pub fn kind(&self) -> ElementKind {
        match self {
            Self::Tri3(_) => ElementKind::Triangle,
            Self::Quad4(_) => ElementKind::Quad,
        }
    }
}

impl Connectivity for Cell2dConnectivity {
    fn num_faces(&self) -> usize {
        match self {
            Self::Tri3(tri) => tri.num_faces(),
            Self::Quad4(quad) => quad.num_faces(),
        }
    }

    fn get_face_connectivity(&self, index: usize) -> Option<Segment2d2Connectivity> {
        match self {
            Self::Tri3(tri) => tri.get_face_connectivity(index),
            Self::Quad4(quad) => quad.get_face_connectivity(index),
        }
    }

    fn vertex_indices(&self) -> &[usize] {
        match self {
            Self::Tri3(tri) => tri.vertex_indices(),
            Self::Quad4(quad) => quad.vertex_indices(),
        }
    }
}

impl From<Tri3d2Connectivity> for Cell2dConnectivity {
    fn from(tri: Tri3d2Connectivity) -> Self {
        Self::Tri3(tri)
    }
}

impl From<Quad4d2Connectivity> for Cell2dConnectivity {
    fn from(quad: Quad4d2Connectivity) -> Self {
        Self::Quad4(quad)
    }
}
