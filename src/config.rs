//! Options of a stationary Poisson solve, read from JSON.
use crate::assembly::boundary::{DirichletPolicy, NeumannFlux};
use crate::assembly::strategy::AssemblyStrategy;
use crate::connectivity::ElementKind;
use crate::error::AssemblyError;
use crate::system::{DenseLuBackend, IjConjugateGradientBackend, LinearSolverBackend};
use eyre::{eyre, WrapErr};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BackendKind {
    Dense,
    #[default]
    ConjugateGradient,
}

/// Prescribed value on every node of a named boundary face group.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct DirichletSurfaceCondition {
    pub surface: String,
    pub value: f64,
}

/// Prescribed value on every node of a named node group.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct DirichletPointCondition {
    pub node: String,
    pub value: f64,
}

/// Constant flux on a named boundary face group.
///
/// Either `value` (the normal flux) or at least one of the components `value-x`, `value-y` must be
/// given. See [`NeumannFlux::from_components`] for how they are combined.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct NeumannConditionConfig {
    pub surface: String,
    #[serde(default)]
    pub value: Option<f64>,
    #[serde(default)]
    pub value_x: Option<f64>,
    #[serde(default)]
    pub value_y: Option<f64>,
}

impl NeumannConditionConfig {
    pub fn flux(&self) -> Option<NeumannFlux> {
        NeumannFlux::from_components(self.value, self.value_x, self.value_y)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct PoissonConfig {
    #[serde(default = "default_mesh_kind")]
    pub mesh_kind: ElementKind,
    #[serde(default)]
    pub strategy: AssemblyStrategy,
    /// Name of a [`DirichletPolicy`], parsed by [`PoissonConfig::dirichlet_policy`].
    #[serde(default = "default_dirichlet_policy")]
    pub dirichlet_policy: String,
    #[serde(default = "default_penalty")]
    pub penalty: f64,
    /// Constant source term `f`.
    #[serde(default)]
    pub source: f64,
    /// Number of times the system is assembled before solving.
    #[serde(default = "default_cache_warming")]
    pub cache_warming: usize,
    #[serde(default)]
    pub backend: BackendKind,
    #[serde(default = "default_solver_tolerance")]
    pub solver_tolerance: f64,
    #[serde(default = "default_solver_max_iterations")]
    pub solver_max_iterations: usize,
    #[serde(default)]
    pub dirichlet: Vec<DirichletSurfaceCondition>,
    #[serde(default)]
    pub dirichlet_points: Vec<DirichletPointCondition>,
    #[serde(default)]
    pub neumann: Vec<NeumannConditionConfig>,
    /// Reference solution to compare against after solving.
    #[serde(default)]
    pub result_file: Option<PathBuf>,
    #[serde(default = "default_result_tolerance")]
    pub result_tolerance: f64,
}

fn default_mesh_kind() -> ElementKind {
    ElementKind::Triangle
}

fn default_dirichlet_policy() -> String {
    DirichletPolicy::Penalty.name().to_string()
}

fn default_penalty() -> f64 {
    1.0e30
}

fn default_cache_warming() -> usize {
    1
}

fn default_solver_tolerance() -> f64 {
    1.0e-7
}

fn default_solver_max_iterations() -> usize {
    1000
}

fn default_result_tolerance() -> f64 {
    1.0e-4
}

impl Default for PoissonConfig {
    fn default() -> Self {
        Self {
            mesh_kind: default_mesh_kind(),
            strategy: AssemblyStrategy::default(),
            dirichlet_policy: default_dirichlet_policy(),
            penalty: default_penalty(),
            source: 0.0,
            cache_warming: default_cache_warming(),
            backend: BackendKind::default(),
            solver_tolerance: default_solver_tolerance(),
            solver_max_iterations: default_solver_max_iterations(),
            dirichlet: Vec::new(),
            dirichlet_points: Vec::new(),
            neumann: Vec::new(),
            result_file: None,
            result_tolerance: default_result_tolerance(),
        }
    }
}

impl PoissonConfig {
    /// Parses a configuration from a JSON object. Omitted options take their default values.
    pub fn from_json_str(json: &str) -> eyre::Result<Self> {
        let value: serde_json::Value =
            serde_json::from_str(json).wrap_err("failed to parse Poisson configuration")?;
        if !value.is_object() {
            return Err(eyre!("Poisson configuration must be a JSON object"));
        }
        serde_json::from_value(value).wrap_err("failed to parse Poisson configuration")
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> eyre::Result<Self> {
        let path = path.as_ref();
        let json = fs::read_to_string(path)
            .wrap_err_with(|| format!("failed to read Poisson configuration from {}", path.display()))?;
        Self::from_json_str(&json).wrap_err_with(|| format!("invalid configuration file {}", path.display()))
    }

    pub fn to_json_string(&self) -> eyre::Result<String> {
        serde_json::to_string_pretty(self).wrap_err("failed to serialize Poisson configuration")
    }

    pub fn dirichlet_policy(&self) -> Result<DirichletPolicy, AssemblyError> {
        self.dirichlet_policy.parse()
    }

    pub fn create_backend(&self) -> Box<dyn LinearSolverBackend> {
        match self.backend {
            BackendKind::Dense => Box::new(DenseLuBackend),
            BackendKind::ConjugateGradient => Box::new(IjConjugateGradientBackend::new(
                self.solver_tolerance,
                self.solver_max_iterations,
            )),
        }
    }
}
