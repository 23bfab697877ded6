//! Row capacities and column structure of the global matrix, derived from mesh topology.
//!
//! A node couples to itself, to the other vertex of every incident face and, for every incident
//! quadrilateral, to the opposite corner of that quadrilateral. The number of couplings is known
//! from topology alone, which is what makes it possible to size every CSR row without ever
//! looking at column indices ("build-less" structure). For pure triangle meshes the total
//! capacity is `nodes + 2 * faces`.
use crate::error::AssemblyError;
use crate::topology::MeshTopology;
use femassembly_sparse::scan::par_exclusive_scan;
use femassembly_sparse::slots::{SlotCsr, UNCLAIMED};
use rayon::prelude::*;

#[derive(Debug, Clone, Copy)]
pub struct SparsityBuilder<'a, M> {
    topology: &'a M,
}

impl<'a, M: MeshTopology> SparsityBuilder<'a, M> {
    pub fn new(topology: &'a M) -> Self {
        Self { topology }
    }

    fn incident_quads(&self, node: usize) -> impl Iterator<Item = usize> + '_ {
        self.topology
            .node_elements(node)
            .iter()
            .copied()
            .filter(move |&element| self.topology.element_nodes(element).len() == 4)
    }

    /// Number of column slots reserved for the row of `node`.
    pub fn row_capacity(&self, node: usize) -> usize {
        1 + self.topology.node_faces(node).len() + self.incident_quads(node).count()
    }

    /// Row offsets from a running prefix sum over the nodes, with all column slots unclaimed.
    pub fn build_sequential(&self) -> Result<SlotCsr, AssemblyError> {
        let n = self.topology.num_nodes();
        let mut offsets = Vec::with_capacity(n + 1);
        let mut running = 0;
        offsets.push(running);
        for node in 0..n {
            running += self.row_capacity(node);
            offsets.push(running);
        }
        Ok(SlotCsr::try_from_row_offsets(n, offsets)?)
    }

    /// Same result as [`SparsityBuilder::build_sequential`], with row capacities computed in
    /// parallel and turned into offsets by a parallel exclusive scan.
    pub fn build_parallel(&self) -> Result<SlotCsr, AssemblyError> {
        let n = self.topology.num_nodes();
        let counts: Vec<usize> = (0..n)
            .into_par_iter()
            .with_min_len(256)
            .map(|node| self.row_capacity(node))
            .collect();
        Ok(SlotCsr::try_from_row_offsets(n, par_exclusive_scan(&counts))?)
    }

    /// Sequential offsets with the columns of every owned row filled in ahead of time.
    ///
    /// Rows of nodes that are not owned are left unclaimed, since nothing is ever scattered into
    /// them.
    pub fn build_with_columns(&self) -> Result<SlotCsr, AssemblyError> {
        let sequential = self.build_sequential()?;
        let offsets = sequential.row_offsets().to_vec();
        let mut columns = vec![UNCLAIMED; sequential.capacity()];

        for node in (0..self.topology.num_nodes()).filter(|&node| self.topology.is_owned(node)) {
            let row = &mut columns[offsets[node]..offsets[node + 1]];
            let mut len = 0;
            let mut push = |col: usize| {
                if !row[..len].contains(&col) {
                    row[len] = col;
                    len += 1;
                }
            };

            push(node);
            for &face in self.topology.node_faces(node) {
                let [a, b] = self.topology.face_nodes(face);
                push(if a == node { b } else { a });
            }
            for quad in self.incident_quads(node) {
                let vertices = self.topology.element_nodes(quad);
                if let Some(local) = vertices.iter().position(|&v| v == node) {
                    push(vertices[(local + 2) % 4]);
                }
            }
        }

        Ok(SlotCsr::try_from_row_offsets_and_columns(
            self.topology.num_nodes(),
            offsets,
            columns,
        )?)
    }
}
