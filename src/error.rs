//! Error types shared by the assembly, distribution and solve phases.
use crate::connectivity::ElementKind;
use femassembly_sparse::slots::SlotError;
use femassembly_sparse::SparseFormatError;
use std::error::Error;
use std::fmt;

/// Structural or precondition failure detected while building or modifying the system.
#[derive(Debug, Clone, PartialEq)]
#[non_exhaustive]
pub enum AssemblyError {
    UnsupportedElementType {
        element: usize,
        expected: ElementKind,
        found: ElementKind,
    },
    DegenerateElement {
        element: usize,
        area: f64,
    },
    CorruptElement {
        element: usize,
        reason: &'static str,
    },
    SlotNotFound {
        row: usize,
        col: usize,
    },
    EntryNotInPattern {
        row: usize,
        col: usize,
    },
    UnsupportedDirichletPolicy(String),
    UnsupportedStrategy(String),
    UnknownGroup(String),
    NodeOutOfBounds {
        node: usize,
        num_nodes: usize,
    },
    FaceNotInMesh {
        nodes: [usize; 2],
    },
    SizeMismatch {
        what: &'static str,
        expected: usize,
        actual: usize,
    },
    MissingMatrix,
    InvalidStructure(String),
}

impl fmt::Display for AssemblyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnsupportedElementType {
                element,
                expected,
                found,
            } => write!(
                f,
                "Element {} is a {} but the mesh was configured for {} elements",
                element, found, expected
            ),
            Self::DegenerateElement { element, area } => {
                write!(f, "Element {} has non-positive area {:e}", element, area)
            }
            Self::CorruptElement { element, reason } => {
                write!(f, "Element {} has corrupt connectivity: {}", element, reason)
            }
            Self::SlotNotFound { row, col } => write!(
                f,
                "Sparsity row {} has no free slot for column {}; row capacity was undercounted",
                row, col
            ),
            Self::EntryNotInPattern { row, col } => {
                write!(f, "Matrix entry ({}, {}) is not part of the sparsity pattern", row, col)
            }
            Self::UnsupportedDirichletPolicy(name) => {
                write!(f, "Unsupported Dirichlet enforcement policy '{}'", name)
            }
            Self::UnsupportedStrategy(name) => {
                write!(f, "Unsupported assembly strategy '{}'", name)
            }
            Self::UnknownGroup(name) => write!(f, "Unknown mesh group '{}'", name),
            Self::NodeOutOfBounds { node, num_nodes } => {
                write!(f, "Node {} out of bounds for mesh with {} nodes", node, num_nodes)
            }
            Self::FaceNotInMesh { nodes } => write!(
                f,
                "Boundary face ({}, {}) is not an edge of the local mesh",
                nodes[0], nodes[1]
            ),
            Self::SizeMismatch {
                what,
                expected,
                actual,
            } => write!(f, "Size mismatch for {}: expected {}, got {}", what, expected, actual),
            Self::MissingMatrix => write!(f, "No matrix has been assembled into the linear system"),
            Self::InvalidStructure(msg) => write!(f, "Invalid sparse structure: {}", msg),
        }
    }
}

impl Error for AssemblyError {}

impl From<SlotError> for AssemblyError {
    fn from(err: SlotError) -> Self {
        match err {
            SlotError::SlotNotFound { row, col } => Self::SlotNotFound { row, col },
            SlotError::EntryNotFound { row, col } => Self::EntryNotInPattern { row, col },
            other => Self::InvalidStructure(other.to_string()),
        }
    }
}

impl From<SparseFormatError> for AssemblyError {
    fn from(err: SparseFormatError) -> Self {
        Self::InvalidStructure(err.to_string())
    }
}

/// Inconsistency between partitions detected during a collective operation.
#[derive(Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum DistributedError {
    RowCountMismatch { gathered: usize, expected: usize },
    UnresolvedGhost { node: usize, unique_id: usize },
    DuplicateOwner { unique_id: usize },
    NonContiguousNumbering { total: usize },
    CollectiveSizeMismatch { expected: usize, actual: usize },
    CollectiveKindMismatch { rank: usize },
    RankDeparted { rank: usize },
}

impl fmt::Display for DistributedError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::RowCountMismatch { gathered, expected } => write!(
                f,
                "Gathered {} rows across partitions but expected {}",
                gathered, expected
            ),
            Self::UnresolvedGhost { node, unique_id } => write!(
                f,
                "Ghost node {} (unique id {}) has no owner that published a global number",
                node, unique_id
            ),
            Self::DuplicateOwner { unique_id } => {
                write!(f, "Node with unique id {} is owned by more than one partition", unique_id)
            }
            Self::NonContiguousNumbering { total } => write!(
                f,
                "Global DoF numbers do not form the contiguous range [0, {})",
                total
            ),
            Self::CollectiveSizeMismatch { expected, actual } => write!(
                f,
                "Collective operation returned {} contributions for {} ranks",
                actual, expected
            ),
            Self::CollectiveKindMismatch { rank } => {
                write!(f, "Rank {} took part in a different collective operation", rank)
            }
            Self::RankDeparted { rank } => write!(
                f,
                "Rank {} left the group before completing a collective operation",
                rank
            ),
        }
    }
}

impl Error for DistributedError {}

/// Failure reported by a linear solver backend.
#[derive(Debug, Clone, PartialEq)]
#[non_exhaustive]
pub enum SolveError {
    Singular,
    NotConverged { iterations: usize },
    IndefiniteOperator,
    DimensionMismatch { expected: usize, actual: usize },
    Distributed(DistributedError),
    InvalidSystem(AssemblyError),
    Backend(String),
}

impl fmt::Display for SolveError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Singular => write!(f, "System matrix is singular"),
            Self::NotConverged { iterations } => {
                write!(f, "Solver did not converge within {} iterations", iterations)
            }
            Self::IndefiniteOperator => write!(f, "System matrix appears to be indefinite"),
            Self::DimensionMismatch { expected, actual } => write!(
                f,
                "Solver received a system of dimension {} but expected {}",
                actual, expected
            ),
            Self::Distributed(err) => write!(f, "Distributed solve failed: {}", err),
            Self::InvalidSystem(err) => write!(f, "Cannot hand system to solver: {}", err),
            Self::Backend(msg) => write!(f, "Solver backend failed: {}", msg),
        }
    }
}

impl Error for SolveError {}

impl From<DistributedError> for SolveError {
    fn from(err: DistributedError) -> Self {
        Self::Distributed(err)
    }
}

impl From<AssemblyError> for SolveError {
    fn from(err: AssemblyError) -> Self {
        Self::InvalidSystem(err)
    }
}
