use femassembly::assembly::scatter::{CooAssembler, CsrAssembler, CsrParAssembler};
use femassembly::assembly::{ElementConnectivityAssembler, ElementMatrixAssembler};
use femassembly::error::AssemblyError;
use femassembly::topology::MeshTopology;
use femassembly_sparse::coo::CooMatrix;
use femassembly_sparse::scan::exclusive_scan;
use femassembly_sparse::slots::SlotCsr;
use nalgebra::{DMatrix, DMatrixViewMut, Point2};
use proptest::collection::vec;
use proptest::prelude::*;
use proptest::sample::subsequence;
use std::collections::BTreeSet;
use util::{assert_approx_matrix_eq, csr_to_dense};

/// Element `e` contributes `(e + 1) (1 + a + 2 b)` to local entry `(a, b)`.
#[derive(Debug, Clone)]
struct MockElementAssembler {
    num_nodes: usize,
    element_connectivities: Vec<Vec<usize>>,
    node_elements: Vec<Vec<usize>>,
    failing_element: Option<usize>,
}

impl MockElementAssembler {
    fn new(num_nodes: usize, element_connectivities: Vec<Vec<usize>>) -> Self {
        let mut node_elements = vec![Vec::new(); num_nodes];
        for (element, nodes) in element_connectivities.iter().enumerate() {
            for &node in nodes {
                node_elements[node].push(element);
            }
        }
        Self {
            num_nodes,
            element_connectivities,
            node_elements,
            failing_element: None,
        }
    }

    fn element_entry(element: usize, a: usize, b: usize) -> f64 {
        ((element + 1) * (1 + a + 2 * b)) as f64
    }

    fn dense_reference(&self, owned: &[bool]) -> DMatrix<f64> {
        let mut dense = DMatrix::zeros(self.num_nodes, self.num_nodes);
        for (element, nodes) in self.element_connectivities.iter().enumerate() {
            for (a, &row) in nodes.iter().enumerate() {
                for (b, &col) in nodes.iter().enumerate() {
                    if owned[row] {
                        dense[(row, col)] += Self::element_entry(element, a, b);
                    }
                }
            }
        }
        dense
    }

    /// Row capacities equal to the number of distinct columns of every owned row.
    fn exact_slots(&self, owned: &[bool]) -> SlotCsr {
        let mut entries = BTreeSet::new();
        for nodes in &self.element_connectivities {
            for &row in nodes.iter().filter(|&&row| owned[row]) {
                entries.extend(nodes.iter().map(|&col| (row, col)));
            }
        }
        let mut counts = vec![0; self.num_nodes];
        for (row, _) in entries {
            counts[row] += 1;
        }
        SlotCsr::try_from_row_offsets(self.num_nodes, exclusive_scan(&counts)).unwrap()
    }
}

impl ElementConnectivityAssembler for MockElementAssembler {
    fn num_elements(&self) -> usize {
        self.element_connectivities.len()
    }

    fn num_nodes(&self) -> usize {
        self.num_nodes
    }

    fn element_node_count(&self, element_index: usize) -> usize {
        self.element_connectivities[element_index].len()
    }

    fn populate_element_nodes(&self, output: &mut [usize], element_index: usize) {
        output.copy_from_slice(&self.element_connectivities[element_index])
    }
}

impl ElementMatrixAssembler for MockElementAssembler {
    fn assemble_element_matrix_into(
        &self,
        element_index: usize,
        mut output: DMatrixViewMut<f64>,
    ) -> Result<(), AssemblyError> {
        if self.failing_element == Some(element_index) {
            return Err(AssemblyError::DegenerateElement {
                element: element_index,
                area: 0.0,
            });
        }
        for a in 0..output.nrows() {
            for b in 0..output.ncols() {
                output[(a, b)] = Self::element_entry(element_index, a, b);
            }
        }
        Ok(())
    }

    fn as_connectivity_assembler(&self) -> &dyn ElementConnectivityAssembler {
        self
    }
}

#[rustfmt::skip]
impl MeshTopology for MockElementAssembler {
    fn num_nodes(&self) -> usize { self.num_nodes }
    fn num_elements(&self) -> usize { self.element_connectivities.len() }
    fn num_faces(&self) -> usize { 0 }
    fn element_nodes(&self, element: usize) -> &[usize] { &self.element_connectivities[element] }
    fn face_nodes(&self, _face: usize) -> [usize; 2] { unreachable!() }
    fn node_faces(&self, _node: usize) -> &[usize] { &[] }
    fn node_elements(&self, node: usize) -> &[usize] { &self.node_elements[node] }
    fn is_owned(&self, _node: usize) -> bool { true }
    fn node_position(&self, _node: usize) -> Point2<f64> { Point2::origin() }
    fn unique_id(&self, node: usize) -> usize { node }
}

/// Assembles with every scatter mode and returns the dense results in the order
/// COO, sequential slots, element-parallel slots, row-parallel slots.
fn assemble_all_modes(mock: &MockElementAssembler, owned: &[bool]) -> [DMatrix<f64>; 4] {
    let n = owned.len();
    let mut coo = CooMatrix::new(n, n);
    CooAssembler::default()
        .assemble_into_coo(&mut coo, mock, owned)
        .unwrap();

    let mut sequential = mock.exact_slots(owned);
    CsrAssembler::default()
        .assemble_into_slots(&mut sequential, mock, owned)
        .unwrap();

    let element_parallel = mock.exact_slots(owned);
    CsrParAssembler::default()
        .assemble_elements_into_slots(&element_parallel, mock, owned)
        .unwrap();

    let mut row_parallel = mock.exact_slots(owned);
    CsrParAssembler::default()
        .assemble_rows_into_slots(&mut row_parallel, mock, mock, owned)
        .unwrap();

    [
        csr_to_dense(&coo.to_csr().unwrap()),
        csr_to_dense(&sequential.to_csr().unwrap()),
        csr_to_dense(&element_parallel.to_csr().unwrap()),
        csr_to_dense(&row_parallel.to_csr().unwrap()),
    ]
}

#[test]
fn scatter_simple_example() {
    let mock = MockElementAssembler::new(5, vec![vec![0, 1, 2], vec![2, 3], vec![4, 3, 1]]);
    let owned = vec![true; 5];

    #[rustfmt::skip]
    let expected = DMatrix::from_row_slice(5, 5, &[
        1.0, 3.0, 5.0, 0.0, 0.0,
        2.0, 4.0 + 21.0, 6.0, 15.0, 9.0,
        3.0, 5.0, 7.0 + 2.0, 6.0, 0.0,
        0.0, 18.0, 4.0, 8.0 + 12.0, 6.0,
        0.0, 15.0, 0.0, 9.0, 3.0,
    ]);
    assert_eq!(mock.dense_reference(&owned), expected);

    for result in assemble_all_modes(&mock, &owned) {
        assert_eq!(result, expected);
    }
}

#[test]
fn rows_of_ghost_nodes_are_skipped() {
    let mock = MockElementAssembler::new(4, vec![vec![0, 1, 2], vec![1, 2, 3]]);
    let owned = vec![true, false, true, false];
    let expected = mock.dense_reference(&owned);
    assert!(expected.row(1).iter().all(|&v| v == 0.0));
    assert!(expected.row(3).iter().all(|&v| v == 0.0));

    for result in assemble_all_modes(&mock, &owned) {
        assert_eq!(result, expected);
    }
}

#[test]
fn undersized_rows_report_missing_slot() {
    let mock = MockElementAssembler::new(2, vec![vec![0, 1]]);
    let owned = vec![true; 2];
    let offsets = vec![0, 1, 2];

    let mut slots = SlotCsr::try_from_row_offsets(2, offsets.clone()).unwrap();
    assert_eq!(
        CsrAssembler::default().assemble_into_slots(&mut slots, &mock, &owned),
        Err(AssemblyError::SlotNotFound { row: 0, col: 1 })
    );

    let slots = SlotCsr::try_from_row_offsets(2, offsets.clone()).unwrap();
    assert_eq!(
        CsrParAssembler::default().assemble_elements_into_slots(&slots, &mock, &owned),
        Err(AssemblyError::SlotNotFound { row: 0, col: 1 })
    );

    let mut slots = SlotCsr::try_from_row_offsets(2, offsets).unwrap();
    assert!(matches!(
        CsrParAssembler::default().assemble_rows_into_slots(&mut slots, &mock, &mock, &owned),
        Err(AssemblyError::SlotNotFound { .. })
    ));
}

#[test]
fn element_errors_are_propagated() {
    let mut mock = MockElementAssembler::new(3, vec![vec![0, 1], vec![1, 2]]);
    mock.failing_element = Some(1);
    let owned = vec![true; 3];
    let expected = Err(AssemblyError::DegenerateElement { element: 1, area: 0.0 });

    let mut coo = CooMatrix::new(3, 3);
    assert_eq!(CooAssembler::default().assemble_into_coo(&mut coo, &mock, &owned), expected);

    let mut slots = SlotCsr::try_from_row_offsets(3, vec![0, 3, 6, 9]).unwrap();
    assert_eq!(CsrAssembler::default().assemble_into_slots(&mut slots, &mock, &owned), expected);

    let slots = SlotCsr::try_from_row_offsets(3, vec![0, 3, 6, 9]).unwrap();
    assert_eq!(
        CsrParAssembler::default().assemble_elements_into_slots(&slots, &mock, &owned),
        expected
    );

    let mut slots = SlotCsr::try_from_row_offsets(3, vec![0, 3, 6, 9]).unwrap();
    assert_eq!(
        CsrParAssembler::default().assemble_rows_into_slots(&mut slots, &mock, &mock, &owned),
        expected
    );
}

#[test]
fn mismatched_ownership_mask_is_rejected() {
    let mock = MockElementAssembler::new(3, vec![vec![0, 1, 2]]);
    let owned = vec![true; 2];
    let mut coo = CooMatrix::new(2, 2);
    assert!(matches!(
        CooAssembler::default().assemble_into_coo(&mut coo, &mock, &owned),
        Err(AssemblyError::SizeMismatch { expected: 3, actual: 2, .. })
    ));

    let mut slots = SlotCsr::try_from_row_offsets(3, vec![0, 3, 6, 9]).unwrap();
    assert!(matches!(
        CsrAssembler::default().assemble_into_slots(&mut slots, &mock, &[true; 3][..2]),
        Err(AssemblyError::SizeMismatch { .. })
    ));
}

#[test]
fn parallel_assembler_can_be_reused() {
    let mock = MockElementAssembler::new(4, vec![vec![0, 1, 2, 3], vec![3, 2], vec![1, 3]]);
    let owned = vec![true; 4];
    let assembler = CsrParAssembler::default();
    let mut slots = mock.exact_slots(&owned);

    for _ in 0..3 {
        slots.clear_values();
        assembler
            .assemble_elements_into_slots(&slots, &mock, &owned)
            .unwrap();
        assert_eq!(csr_to_dense(&slots.to_csr().unwrap()), mock.dense_reference(&owned));
    }
}

fn mock_element_assembler() -> impl Strategy<Value = (MockElementAssembler, Vec<bool>)> {
    (1usize..8).prop_flat_map(|n| {
        let nodes: Vec<usize> = (0..n).collect();
        let element = subsequence(nodes, 1..=n.min(4)).prop_shuffle();
        (vec(element, 0..12), vec(any::<bool>(), n))
            .prop_map(move |(elements, owned)| (MockElementAssembler::new(n, elements), owned))
    })
}

proptest! {
    #[test]
    fn all_scatter_modes_agree_with_dense_reference((mock, owned) in mock_element_assembler()) {
        let expected = mock.dense_reference(&owned);
        for result in assemble_all_modes(&mock, &owned) {
            assert_approx_matrix_eq!(&result, &expected, abstol = 1e-12);
        }
    }
}
