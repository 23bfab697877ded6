use crate::assembly::pattern::SparsityBuilder;
use crate::assembly::scatter::{CooAssembler, CsrAssembler, CsrParAssembler};
use crate::assembly::ElementMatrixAssembler;
use crate::error::AssemblyError;
use crate::topology::MeshTopology;
use femassembly_sparse::coo::CooMatrix;
use femassembly_sparse::slots::SlotCsr;
use log::debug;
use nalgebra_sparse::CsrMatrix;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Instant;

/// How the global matrix is structured and filled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AssemblyStrategy {
    /// Unmerged triplets, compacted by a counting sort over rows.
    Coo,
    /// Unmerged triplets, compacted by a parallel sort over `(row, col)`.
    CooSort,
    /// Rows sized sequentially with columns filled in ahead of time, then a sequential scatter.
    #[default]
    Csr,
    /// Rows sized in parallel from topology alone, element-parallel scatter with atomic claims.
    CsrBuildLess,
    /// Rows sized in parallel from topology alone, row-parallel scatter.
    NodeParallel,
}

impl AssemblyStrategy {
    pub const ALL: [AssemblyStrategy; 5] = [
        Self::Coo,
        Self::CooSort,
        Self::Csr,
        Self::CsrBuildLess,
        Self::NodeParallel,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Self::Coo => "coo",
            Self::CooSort => "coo-sort",
            Self::Csr => "csr",
            Self::CsrBuildLess => "csr-build-less",
            Self::NodeParallel => "node-parallel",
        }
    }
}

impl fmt::Display for AssemblyStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl FromStr for AssemblyStrategy {
    type Err = AssemblyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|strategy| strategy.name() == s)
            .ok_or_else(|| AssemblyError::UnsupportedStrategy(s.to_string()))
    }
}

#[derive(Debug)]
enum Storage {
    Empty,
    Coo(CooMatrix<f64>),
    Slots(SlotCsr),
}

/// Assembles global matrices with a fixed [`AssemblyStrategy`].
///
/// The structure (the slot arena, or the triplet buffer) is built by the first call to
/// [`GlobalAssembler::assemble`] and reused by every later call with the same number of nodes:
/// repeated assembly only zeros values. Call [`GlobalAssembler::reset_structure`] before assembling
/// on a different mesh with the same number of nodes.
#[derive(Debug)]
pub struct GlobalAssembler {
    strategy: AssemblyStrategy,
    storage: Storage,
    coo_assembler: CooAssembler,
    csr_assembler: CsrAssembler,
    par_assembler: CsrParAssembler,
}

impl Default for GlobalAssembler {
    fn default() -> Self {
        Self::new(AssemblyStrategy::default())
    }
}

impl GlobalAssembler {
    pub fn new(strategy: AssemblyStrategy) -> Self {
        Self {
            strategy,
            storage: Storage::Empty,
            coo_assembler: CooAssembler::default(),
            csr_assembler: CsrAssembler::default(),
            par_assembler: CsrParAssembler::default(),
        }
    }

    pub fn strategy(&self) -> AssemblyStrategy {
        self.strategy
    }

    /// The slot arena of the CSR strategies, if one has been built.
    pub fn slots(&self) -> Option<&SlotCsr> {
        match &self.storage {
            Storage::Slots(slots) => Some(slots),
            _ => None,
        }
    }

    /// The triplets of the COO strategies, if any have been assembled.
    pub fn coo(&self) -> Option<&CooMatrix<f64>> {
        match &self.storage {
            Storage::Coo(coo) => Some(coo),
            _ => None,
        }
    }

    pub fn reset_structure(&mut self) {
        self.storage = Storage::Empty;
    }

    /// Builds or clears the structure for the given topology. Returns whether it was rebuilt.
    fn prepare_storage<M: MeshTopology>(&mut self, topology: &M) -> Result<bool, AssemblyError> {
        let n = topology.num_nodes();
        match (&mut self.storage, self.strategy) {
            (Storage::Coo(coo), AssemblyStrategy::Coo | AssemblyStrategy::CooSort) if coo.nrows() == n => {
                coo.clear();
                return Ok(false);
            }
            (Storage::Slots(slots), _) if slots.nrows() == n => {
                slots.clear_values();
                return Ok(false);
            }
            _ => {}
        }

        let builder = SparsityBuilder::new(topology);
        self.storage = match self.strategy {
            AssemblyStrategy::Coo | AssemblyStrategy::CooSort => {
                let triplets = (0..topology.num_elements())
                    .map(|element| topology.element_nodes(element).len().pow(2))
                    .sum();
                Storage::Coo(CooMatrix::with_capacity(n, n, triplets))
            }
            AssemblyStrategy::Csr => Storage::Slots(builder.build_with_columns()?),
            AssemblyStrategy::CsrBuildLess | AssemblyStrategy::NodeParallel => {
                Storage::Slots(builder.build_parallel()?)
            }
        };
        Ok(true)
    }

    /// Assembles the global matrix of `element_assembler` into the internal storage.
    ///
    /// Only rows flagged in `owned` are assembled.
    pub fn assemble<M: MeshTopology>(
        &mut self,
        topology: &M,
        element_assembler: &(dyn ElementMatrixAssembler + Sync),
        owned: &[bool],
    ) -> Result<(), AssemblyError> {
        let structure_start = Instant::now();
        if self.prepare_storage(topology)? {
            debug!(
                "Built {} structure for {} rows in {:?}",
                self.strategy,
                topology.num_nodes(),
                structure_start.elapsed()
            );
        }

        let numeric_start = Instant::now();
        let Self {
            strategy,
            storage,
            coo_assembler,
            csr_assembler,
            par_assembler,
        } = self;
        match (storage, *strategy) {
            (Storage::Coo(coo), _) => coo_assembler.assemble_into_coo(coo, element_assembler, owned)?,
            (Storage::Slots(slots), AssemblyStrategy::Csr) => {
                csr_assembler.assemble_into_slots(slots, element_assembler, owned)?
            }
            (Storage::Slots(slots), AssemblyStrategy::NodeParallel) => {
                par_assembler.assemble_rows_into_slots(slots, topology, element_assembler, owned)?
            }
            (Storage::Slots(slots), _) => par_assembler.assemble_elements_into_slots(slots, element_assembler, owned)?,
            (Storage::Empty, _) => return Err(AssemblyError::MissingMatrix),
        }
        debug!("Scattered {} elements with {} in {:?}", topology.num_elements(), strategy, numeric_start.elapsed());
        Ok(())
    }

    /// Compacts the assembled storage into a CSR matrix with sorted columns.
    pub fn to_csr(&self) -> Result<CsrMatrix<f64>, AssemblyError> {
        match &self.storage {
            Storage::Coo(coo) if self.strategy == AssemblyStrategy::CooSort => Ok(coo.to_csr_sorted()?),
            Storage::Coo(coo) => Ok(coo.to_csr()?),
            Storage::Slots(slots) => Ok(slots.to_csr()?),
            Storage::Empty => Err(AssemblyError::MissingMatrix),
        }
    }

    /// Writes the assembled values into `target`.
    ///
    /// For the CSR strategies `target` must have been obtained from [`GlobalAssembler::to_csr`]
    /// for the same structure, and its values are overwritten in place. For the COO strategies
    /// `target` is replaced by a freshly compacted matrix.
    pub fn compact_into(&self, target: &mut CsrMatrix<f64>) -> Result<(), AssemblyError> {
        match &self.storage {
            Storage::Slots(slots) => Ok(slots.compact_into(target)?),
            Storage::Coo(_) => {
                *target = self.to_csr()?;
                Ok(())
            }
            Storage::Empty => Err(AssemblyError::MissingMatrix),
        }
    }
}
