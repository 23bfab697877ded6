//! End-to-end stationary Poisson solve on one mesh partition.
use crate::assembly::boundary::{
    apply_dirichlet, assemble_neumann_flux, assemble_source_term, BoundaryState, NeumannFlux,
};
use crate::assembly::strategy::GlobalAssembler;
use crate::assembly::LaplaceElementAssembler;
use crate::comm::Communicator;
use crate::config::PoissonConfig;
use crate::dof::DofNumbering;
use crate::io::check_node_result_file;
use crate::mesh::Mesh2d;
use crate::system::LinearSystem;
use crate::topology::{MeshTopology, Topology};
use eyre::{eyre, WrapErr};
use log::{debug, info};
use nalgebra::DVector;
use std::collections::BTreeMap;
use std::time::Instant;

/// Outcome of [`solve_poisson`] on one partition.
#[derive(Debug, Clone)]
pub struct PoissonSolution {
    /// Solution value of every local node, ghosts included.
    pub solution: DVector<f64>,
    /// The system as it was handed to the solver.
    pub system: LinearSystem,
    pub dofs: DofNumbering,
    pub unique_ids: Vec<usize>,
    pub num_iterations: usize,
    pub relative_residual: f64,
    /// Number of node values compared with the result file, if one was configured.
    pub checked_nodes: Option<usize>,
}

impl PoissonSolution {
    /// Values of the owned nodes keyed by unique id.
    pub fn owned_values_by_unique_id(&self) -> BTreeMap<usize, f64> {
        self.dofs
            .owned_dofs()
            .map(|dof| (self.unique_ids[dof], self.solution[dof]))
            .collect()
    }
}

/// Assembles and solves `-Δu = f` with the boundary conditions of `config`.
///
/// This is a collective operation: every rank of `comm` must call it with its own partition.
pub fn solve_poisson(mesh: &Mesh2d, config: &PoissonConfig, comm: &dyn Communicator) -> eyre::Result<PoissonSolution> {
    let total_start = Instant::now();
    mesh.check_element_kind(config.mesh_kind)?;
    let topology = Topology::from_mesh(mesh).wrap_err("failed to build mesh topology")?;
    let policy = config.dirichlet_policy()?;

    let mut dofs = DofNumbering::new(&topology);
    dofs.assign_numbering(comm)
        .wrap_err("failed to assign global DoF numbers")?;

    let mut boundary = BoundaryState::new(topology.num_nodes());
    for condition in &config.dirichlet {
        boundary.set_dirichlet_on_faces(mesh.face_group(&condition.surface)?, condition.value)?;
    }
    for condition in &config.dirichlet_points {
        boundary.set_dirichlet_on_nodes(mesh.node_group(&condition.node)?, condition.value)?;
    }
    let neumann = config
        .neumann
        .iter()
        .map(|condition| {
            let flux = condition.flux().ok_or_else(|| {
                eyre!(
                    "Neumann condition on '{}' has neither a value nor flux components",
                    condition.surface
                )
            })?;
            Ok((mesh.face_group(&condition.surface)?, flux))
        })
        .collect::<eyre::Result<Vec<(_, NeumannFlux)>>>()?;

    info!(
        "Rank {}: {} nodes ({} owned, {} Dirichlet), {} {} elements, strategy {}, policy {}",
        comm.rank(),
        topology.num_nodes(),
        dofs.num_owned(),
        boundary.num_dirichlet(),
        topology.num_elements(),
        config.mesh_kind,
        config.strategy,
        policy
    );

    let element_assembler = LaplaceElementAssembler::new(mesh);
    let mut assembler = GlobalAssembler::new(config.strategy);
    let mut system = LinearSystem::new(topology.num_nodes());

    for iteration in 0..config.cache_warming.max(1) {
        let assembly_start = Instant::now();
        system.clear_values();
        assembler
            .assemble(&topology, &element_assembler, dofs.owned_mask())
            .wrap_err("failed to assemble the global matrix")?;
        system.load_matrix(&assembler)?;
        let matrix_time = assembly_start.elapsed();

        let rhs_start = Instant::now();
        assemble_source_term(&topology, config.source, &boundary, system.rhs_mut())?;
        for (faces, flux) in &neumann {
            assemble_neumann_flux(&topology, faces, *flux, &boundary, system.rhs_mut())?;
        }
        apply_dirichlet(&mut system, &topology, &boundary, policy, config.penalty)
            .wrap_err("failed to impose Dirichlet conditions")?;
        debug!(
            "Assembly pass {}: matrix {:?}, right-hand side and boundary conditions {:?}",
            iteration,
            matrix_time,
            rhs_start.elapsed()
        );
    }

    boundary.apply_values_to(system.solution_mut())?;
    let mut backend = config.create_backend();
    let solve_start = Instant::now();
    let output = system
        .solve(backend.as_mut(), &dofs, comm)
        .wrap_err_with(|| format!("{} backend failed", backend.name()))?;
    debug!("Solved with {} backend in {:?}", backend.name(), solve_start.elapsed());

    let mut solution = system.solution().clone();
    boundary.apply_values_to(&mut solution)?;

    let checked_nodes = config
        .result_file
        .as_ref()
        .map(|path| check_node_result_file(path, &topology, &solution, config.result_tolerance))
        .transpose()?;

    info!(
        "Rank {}: solved {} global DoFs in {} iterations (relative residual {:e}), total time {:?}",
        comm.rank(),
        dofs.total_dofs(),
        output.num_iterations,
        output.relative_residual,
        total_start.elapsed()
    );

    Ok(PoissonSolution {
        solution,
        unique_ids: (0..topology.num_nodes())
            .map(|node| topology.unique_id(node))
            .collect(),
        system,
        dofs,
        num_iterations: output.num_iterations,
        relative_residual: output.relative_residual,
        checked_nodes,
    })
}
