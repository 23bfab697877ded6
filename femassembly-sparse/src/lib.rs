//! Sparse matrix kernels for parallel finite element assembly.
//!
//! The central type is [`slots::SlotCsr`], a CSR arena whose row capacities are fixed up front
//! and whose column slots are claimed during scatter, either sequentially, by atomic
//! compare-and-swap from many threads, or row by row from disjoint workers.
pub mod access;
pub mod atomic;
pub mod cg;
pub mod coo;
pub mod scan;
pub mod slots;

pub use nalgebra_sparse::{CsrMatrix, SparseFormatError};
