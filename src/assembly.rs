//! Element-level assembly and the global assembly strategies built on top of it.
use crate::connectivity::{Cell2dConnectivity, Connectivity};
use crate::error::AssemblyError;
use crate::geometry::{quad_area, quad_stiffness, triangle_area, triangle_stiffness};
use crate::mesh::Mesh2d;
use nalgebra::{DMatrixViewMut, Point2};

pub mod boundary;
pub mod pattern;
pub mod scatter;
pub mod strategy;

pub trait ElementConnectivityAssembler {
    fn num_elements(&self) -> usize;

    fn num_nodes(&self) -> usize;

    fn element_node_count(&self, element_index: usize) -> usize;

    fn populate_element_nodes(&self, output: &mut [usize], element_index: usize);
}

pub trait ElementMatrixAssembler: ElementConnectivityAssembler {
    /// Writes the element matrix of the given element into `output`.
    ///
    /// `output` is square with dimension [`ElementConnectivityAssembler::element_node_count`],
    /// and rows and columns follow the order of
    /// [`ElementConnectivityAssembler::populate_element_nodes`].
    fn assemble_element_matrix_into(
        &self,
        element_index: usize,
        output: DMatrixViewMut<f64>,
    ) -> Result<(), AssemblyError>;

    fn as_connectivity_assembler(&self) -> &dyn ElementConnectivityAssembler;
}

/// Element stiffness matrices of the Laplace operator on a triangle or quadrilateral mesh.
#[derive(Debug, Clone, Copy)]
pub struct LaplaceElementAssembler<'a> {
    mesh: &'a Mesh2d,
}

impl<'a> LaplaceElementAssembler<'a> {
    pub fn new(mesh: &'a Mesh2d) -> Self {
        Self { mesh }
    }

    fn points<const N: usize>(&self, vertices: &[usize; N]) -> [Point2<f64>; N] {
        vertices.map(|v| self.mesh.vertices()[v])
    }
}

impl<'a> ElementConnectivityAssembler for LaplaceElementAssembler<'a> {
    fn num_elements(&self) -> usize {
        self.mesh.num_cells()
    }

    fn num_nodes(&self) -> usize {
        self.mesh.num_vertices()
    }

    fn element_node_count(&self, element_index: usize) -> usize {
        self.mesh.connectivity()[element_index].vertex_indices().len()
    }

    fn populate_element_nodes(&self, output: &mut [usize], element_index: usize) {
        output.copy_from_slice(self.mesh.connectivity()[element_index].vertex_indices());
    }
}

impl<'a> ElementMatrixAssembler for LaplaceElementAssembler<'a> {
    fn assemble_element_matrix_into(
        &self,
        element_index: usize,
        mut output: DMatrixViewMut<f64>,
    ) -> Result<(), AssemblyError> {
        let degenerate = |area| AssemblyError::DegenerateElement {
            element: element_index,
            area,
        };
        match &self.mesh.connectivity()[element_index] {
            Cell2dConnectivity::Tri3(tri) => {
                let p = self.points(&tri.0);
                let k = triangle_stiffness(&p).ok_or_else(|| degenerate(triangle_area(&p)))?;
                output.copy_from(&k);
            }
            Cell2dConnectivity::Quad4(quad) => {
                let p = self.points(&quad.0);
                let k = quad_stiffness(&p).ok_or_else(|| degenerate(quad_area(&p)))?;
                output.copy_from(&k);
            }
        }
        Ok(())
    }

    fn as_connectivity_assembler(&self) -> &dyn ElementConnectivityAssembler {
        self
    }
}
