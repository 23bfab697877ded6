//! Degrees of freedom and their global numbering across partitions.
use crate::comm::Communicator;
use crate::error::DistributedError;
use crate::topology::MeshTopology;
use log::debug;
use nalgebra::DVector;
use rustc_hash::FxHashMap;
use std::ops::Range;

const UNNUMBERED: usize = usize::MAX;

/// One scalar degree of freedom per mesh node.
///
/// The local index of a DoF equals the index of its node. Owned DoFs receive the contiguous
/// global numbers `first_owned_row..first_owned_row + num_owned` in node order; ghost DoFs take the
/// number assigned by their owner.
#[derive(Debug, Clone)]
pub struct DofNumbering {
    owned: Vec<bool>,
    unique_ids: Vec<usize>,
    global: Vec<usize>,
    first_owned_row: usize,
    total: usize,
}

impl DofNumbering {
    pub fn new(topology: &impl MeshTopology) -> Self {
        let n = topology.num_nodes();
        Self {
            owned: (0..n).map(|node| topology.is_owned(node)).collect(),
            unique_ids: (0..n).map(|node| topology.unique_id(node)).collect(),
            global: vec![UNNUMBERED; n],
            first_owned_row: 0,
            total: 0,
        }
    }

    pub fn num_dofs(&self) -> usize {
        self.owned.len()
    }

    pub fn num_owned(&self) -> usize {
        self.owned.iter().filter(|&&owned| owned).count()
    }

    pub fn is_owned(&self, dof: usize) -> bool {
        self.owned[dof]
    }

    pub fn owned_mask(&self) -> &[bool] {
        &self.owned
    }

    pub fn owned_dofs(&self) -> impl Iterator<Item = usize> + '_ {
        self.owned
            .iter()
            .enumerate()
            .filter(|(_, &owned)| owned)
            .map(|(dof, _)| dof)
    }

    pub fn dof_of_node(&self, node: usize) -> usize {
        node
    }

    /// Global number of a DoF, available after [`DofNumbering::assign_numbering`].
    pub fn global_index(&self, dof: usize) -> Option<usize> {
        let global = self.global[dof];
        (global != UNNUMBERED).then(|| global)
    }

    /// Global rows owned by this partition.
    pub fn owned_row_range(&self) -> Range<usize> {
        self.first_owned_row..self.first_owned_row + self.num_owned()
    }

    /// Total number of DoFs over all partitions.
    pub fn total_dofs(&self) -> usize {
        self.total
    }

    /// Assigns global numbers to all DoFs.
    ///
    /// This is a collective operation: every rank of `comm` must call it.
    pub fn assign_numbering(&mut self, comm: &dyn Communicator) -> Result<(), DistributedError> {
        let num_owned = self.num_owned();
        let owned_counts = comm.all_gather_usize(num_owned)?;
        if owned_counts.len() != comm.size() {
            return Err(DistributedError::CollectiveSizeMismatch {
                expected: comm.size(),
                actual: owned_counts.len(),
            });
        }
        self.first_owned_row = owned_counts[..comm.rank()].iter().sum();
        self.total = owned_counts.iter().sum();

        let mut next = self.first_owned_row;
        for (global, _) in self
            .global
            .iter_mut()
            .zip(&self.owned)
            .filter(|(_, &owned)| owned)
        {
            *global = next;
            next += 1;
        }

        // Publish (unique id, global number) of owned DoFs so that ghosts can be resolved
        let published: Vec<usize> = self
            .owned_dofs()
            .flat_map(|dof| [self.unique_ids[dof], self.global[dof]])
            .collect();
        let gathered = comm.all_gather_indices(&published)?;

        let gathered_rows: usize = gathered.iter().map(|pairs| pairs.len() / 2).sum();
        if gathered_rows != self.total {
            return Err(DistributedError::RowCountMismatch {
                gathered: gathered_rows,
                expected: self.total,
            });
        }

        let mut seen = vec![false; self.total];
        let mut lookup = FxHashMap::default();
        for pair in gathered.iter().flat_map(|pairs| pairs.chunks_exact(2)) {
            let (unique_id, global) = (pair[0], pair[1]);
            if global >= self.total || seen[global] {
                return Err(DistributedError::NonContiguousNumbering { total: self.total });
            }
            seen[global] = true;
            if lookup.insert(unique_id, global).is_some() {
                return Err(DistributedError::DuplicateOwner { unique_id });
            }
        }

        for dof in 0..self.num_dofs() {
            if !self.owned[dof] {
                let unique_id = self.unique_ids[dof];
                self.global[dof] = *lookup
                    .get(&unique_id)
                    .ok_or(DistributedError::UnresolvedGhost { node: dof, unique_id })?;
            }
        }

        debug!(
            "Rank {} owns global rows {:?} of {}",
            comm.rank(),
            self.owned_row_range(),
            self.total
        );
        Ok(())
    }

    /// Copies the owner's value into every ghost entry of `values`.
    ///
    /// This is a collective operation: every rank of `comm` must call it.
    pub fn synchronize_values(
        &self,
        comm: &dyn Communicator,
        values: &mut DVector<f64>,
    ) -> Result<(), DistributedError> {
        let owned: Vec<usize> = self.owned_dofs().collect();
        let globals: Vec<usize> = owned.iter().map(|&dof| self.global[dof]).collect();
        let owned_values: Vec<f64> = owned.iter().map(|&dof| values[dof]).collect();
        let gathered_globals = comm.all_gather_indices(&globals)?;
        let gathered_values = comm.all_gather_reals(&owned_values)?;

        let mut by_global = FxHashMap::default();
        for (globals, values) in gathered_globals.iter().zip(&gathered_values) {
            if globals.len() != values.len() {
                return Err(DistributedError::CollectiveSizeMismatch {
                    expected: globals.len(),
                    actual: values.len(),
                });
            }
            by_global.extend(globals.iter().copied().zip(values.iter().copied()));
        }

        for dof in (0..self.num_dofs()).filter(|&dof| !self.owned[dof]) {
            let global = self.global[dof];
            values[dof] = *by_global.get(&global).ok_or(DistributedError::UnresolvedGhost {
                node: dof,
                unique_id: self.unique_ids[dof],
            })?;
        }
        Ok(())
    }
}
