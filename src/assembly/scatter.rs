//! Scatter of element matrices into global storage.
//!
//! Every assembler computes the element matrix of each element and adds its entry `(a, b)` to the
//! global entry `(node_a, node_b)`. Rows belonging to nodes that are not owned by the local
//! partition are skipped, since their owner assembles them.
use crate::assembly::ElementMatrixAssembler;
use crate::error::AssemblyError;
use crate::topology::MeshTopology;
use femassembly_sparse::coo::CooMatrix;
use femassembly_sparse::slots::SlotCsr;
use nalgebra::DMatrix;
use rayon::prelude::*;
use std::cell::RefCell;
use thread_local::ThreadLocal;

#[derive(Debug, Clone)]
struct ScatterWorkspace {
    // Buffers reused across elements and across assembly passes
    element_nodes: Vec<usize>,
    element_matrix: DMatrix<f64>,
}

impl Default for ScatterWorkspace {
    fn default() -> Self {
        Self {
            element_nodes: Vec::new(),
            element_matrix: DMatrix::zeros(0, 0),
        }
    }
}

impl ScatterWorkspace {
    fn assemble_element(
        &mut self,
        element_assembler: &dyn ElementMatrixAssembler,
        element: usize,
    ) -> Result<(), AssemblyError> {
        let n = element_assembler.element_node_count(element);
        self.element_nodes.resize(n, 0);
        self.element_matrix.resize_mut(n, n, 0.0);
        self.element_matrix.fill(0.0);
        element_assembler.populate_element_nodes(&mut self.element_nodes, element);
        element_assembler.assemble_element_matrix_into(element, self.element_matrix.view_mut((0, 0), (n, n)))
    }
}

fn check_owned_len(element_assembler: &dyn ElementMatrixAssembler, owned: &[bool]) -> Result<(), AssemblyError> {
    if element_assembler.num_nodes() == owned.len() {
        Ok(())
    } else {
        Err(AssemblyError::SizeMismatch {
            what: "ownership mask",
            expected: element_assembler.num_nodes(),
            actual: owned.len(),
        })
    }
}

fn check_rows(actual: usize, expected: usize) -> Result<(), AssemblyError> {
    if actual == expected {
        Ok(())
    } else {
        Err(AssemblyError::SizeMismatch {
            what: "global matrix rows",
            expected,
            actual,
        })
    }
}

/// Appends element contributions as unmerged triplets.
#[derive(Debug, Default)]
pub struct CooAssembler {
    workspace: RefCell<ScatterWorkspace>,
}

impl CooAssembler {
    pub fn assemble_into_coo(
        &self,
        coo: &mut CooMatrix<f64>,
        element_assembler: &dyn ElementMatrixAssembler,
        owned: &[bool],
    ) -> Result<(), AssemblyError> {
        check_owned_len(element_assembler, owned)?;
        check_rows(coo.nrows(), owned.len())?;
        let ws = &mut *self.workspace.borrow_mut();

        for element in 0..element_assembler.num_elements() {
            ws.assemble_element(element_assembler, element)?;
            for (a, &row) in ws.element_nodes.iter().enumerate() {
                if !owned[row] {
                    continue;
                }
                for (b, &col) in ws.element_nodes.iter().enumerate() {
                    coo.push(row, col, ws.element_matrix[(a, b)]);
                }
            }
        }
        Ok(())
    }
}

/// Sequential claim-or-accumulate scatter into a slot arena.
#[derive(Debug, Default)]
pub struct CsrAssembler {
    workspace: RefCell<ScatterWorkspace>,
}

impl CsrAssembler {
    pub fn assemble_into_slots(
        &self,
        slots: &mut SlotCsr,
        element_assembler: &dyn ElementMatrixAssembler,
        owned: &[bool],
    ) -> Result<(), AssemblyError> {
        check_owned_len(element_assembler, owned)?;
        check_rows(slots.nrows(), owned.len())?;
        let ws = &mut *self.workspace.borrow_mut();

        for element in 0..element_assembler.num_elements() {
            ws.assemble_element(element_assembler, element)?;
            for (a, &row) in ws.element_nodes.iter().enumerate() {
                if !owned[row] {
                    continue;
                }
                for (b, &col) in ws.element_nodes.iter().enumerate() {
                    slots.add(row, col, ws.element_matrix[(a, b)])?;
                }
            }
        }
        Ok(())
    }
}

/// Parallel scatter into a slot arena, with one workspace per worker thread.
#[derive(Debug, Default)]
pub struct CsrParAssembler {
    workspace: ThreadLocal<RefCell<ScatterWorkspace>>,
}

impl CsrParAssembler {
    /// One task per element. Slots are claimed by compare-and-swap and values accumulated
    /// atomically, so any number of elements may write to the same row at once.
    pub fn assemble_elements_into_slots(
        &self,
        slots: &SlotCsr,
        element_assembler: &(dyn ElementMatrixAssembler + Sync),
        owned: &[bool],
    ) -> Result<(), AssemblyError> {
        check_owned_len(element_assembler, owned)?;
        check_rows(slots.nrows(), owned.len())?;

        (0..element_assembler.num_elements())
            .into_par_iter()
            .with_min_len(64)
            .try_for_each(|element| -> Result<(), AssemblyError> {
                let ws = &mut *self.workspace.get_or_default().borrow_mut();
                ws.assemble_element(element_assembler, element)?;
                for (a, &row) in ws.element_nodes.iter().enumerate() {
                    if !owned[row] {
                        continue;
                    }
                    for (b, &col) in ws.element_nodes.iter().enumerate() {
                        slots.add_concurrent(row, col, ws.element_matrix[(a, b)])?;
                    }
                }
                Ok(())
            })
    }

    /// One task per row. Each task visits the elements incident to its node and accumulates the
    /// node's row of every element matrix with plain writes, since no other task touches the row.
    pub fn assemble_rows_into_slots<M: MeshTopology>(
        &self,
        slots: &mut SlotCsr,
        topology: &M,
        element_assembler: &(dyn ElementMatrixAssembler + Sync),
        owned: &[bool],
    ) -> Result<(), AssemblyError> {
        check_owned_len(element_assembler, owned)?;
        check_rows(slots.nrows(), owned.len())?;
        check_rows(topology.num_nodes(), owned.len())?;

        slots.par_rows_mut().with_min_len(64).try_for_each(|mut row_slots| -> Result<(), AssemblyError> {
            let node = row_slots.row();
            if !owned[node] {
                return Ok(());
            }
            let ws = &mut *self.workspace.get_or_default().borrow_mut();
            for &element in topology.node_elements(node) {
                ws.assemble_element(element_assembler, element)?;
                let local = ws
                    .element_nodes
                    .iter()
                    .position(|&v| v == node)
                    .ok_or(AssemblyError::CorruptElement {
                        element,
                        reason: "element is listed as incident to a node it does not contain",
                    })?;
                for (b, &col) in ws.element_nodes.iter().enumerate() {
                    row_slots.add(col, ws.element_matrix[(local, b)])?;
                }
            }
            Ok(())
        })
    }
}
