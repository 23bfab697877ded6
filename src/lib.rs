//! Parallel assembly of finite element Poisson systems into CSR matrices.
//!
//! The crate assembles the P1 (triangle) or Q1 (quadrilateral) discretization of `-Δu = f` on a
//! partition of a two-dimensional mesh, imposes boundary conditions and hands the owned rows of the
//! system to a [`system::LinearSolverBackend`]. Several interchangeable strategies build the global
//! matrix, see [`assembly::strategy::AssemblyStrategy`].
pub mod assembly;
pub mod comm;
pub mod config;
pub mod connectivity;
pub mod dof;
pub mod error;
pub mod geometry;
pub mod io;
pub mod mesh;
pub mod poisson;
pub mod system;
pub mod topology;

pub extern crate nalgebra;
pub extern crate nalgebra_sparse;
