//! Dirichlet and Neumann boundary conditions and the source term.
use crate::connectivity::Segment2d2Connectivity;
use crate::error::AssemblyError;
use crate::geometry::polygon_area;
use crate::system::LinearSystem;
use crate::topology::{MeshTopology, Topology};
use nalgebra::{DVector, Vector2};
use std::fmt;
use std::str::FromStr;

/// How prescribed values are imposed on the assembled system.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum DirichletPolicy {
    /// `A[i][i] = P`, `b[i] = P g`.
    #[default]
    Penalty,
    /// `A[i][i] += P`, `b[i] = P g`.
    WeakPenalty,
    /// Row `i` becomes the identity row, `b[i] = g`.
    RowElimination,
    /// Row elimination, plus column `i` is moved to the right-hand side of every other row.
    RowColumnElimination,
}

impl DirichletPolicy {
    pub const ALL: [DirichletPolicy; 4] = [
        Self::Penalty,
        Self::WeakPenalty,
        Self::RowElimination,
        Self::RowColumnElimination,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Self::Penalty => "Penalty",
            Self::WeakPenalty => "WeakPenalty",
            Self::RowElimination => "RowElimination",
            Self::RowColumnElimination => "RowColumnElimination",
        }
    }
}

impl fmt::Display for DirichletPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl FromStr for DirichletPolicy {
    type Err = AssemblyError;

    /// Accepts the policy names ignoring case and `-`, `_` or space separators, so that
    /// `"RowColumnElimination"` and `"row-column-elimination"` are the same policy.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalize = |name: &str| {
            name.chars()
                .filter(|c| !matches!(c, '-' | '_' | ' '))
                .flat_map(char::to_lowercase)
                .collect::<String>()
        };
        let wanted = normalize(s);
        Self::ALL
            .into_iter()
            .find(|policy| normalize(policy.name()) == wanted)
            .ok_or_else(|| AssemblyError::UnsupportedDirichletPolicy(s.to_string()))
    }
}

/// Per-node Dirichlet flags and prescribed values.
#[derive(Debug, Clone, PartialEq)]
pub struct BoundaryState {
    is_dirichlet: Vec<bool>,
    values: Vec<f64>,
}

impl BoundaryState {
    pub fn new(num_nodes: usize) -> Self {
        Self {
            is_dirichlet: vec![false; num_nodes],
            values: vec![0.0; num_nodes],
        }
    }

    pub fn num_nodes(&self) -> usize {
        self.is_dirichlet.len()
    }

    pub fn is_dirichlet(&self, node: usize) -> bool {
        self.is_dirichlet[node]
    }

    pub fn dirichlet_mask(&self) -> &[bool] {
        &self.is_dirichlet
    }

    /// Prescribed value of the node, zero where nothing is prescribed.
    pub fn value(&self, node: usize) -> f64 {
        self.values[node]
    }

    pub fn values(&self) -> &[f64] {
        &self.values
    }

    pub fn dirichlet_nodes(&self) -> impl Iterator<Item = usize> + '_ {
        self.is_dirichlet
            .iter()
            .enumerate()
            .filter(|(_, &flag)| flag)
            .map(|(node, _)| node)
    }

    pub fn num_dirichlet(&self) -> usize {
        self.dirichlet_nodes().count()
    }

    /// Prescribes `value` at `node`. A later prescription overrides an earlier one.
    pub fn set_dirichlet(&mut self, node: usize, value: f64) -> Result<(), AssemblyError> {
        if node >= self.num_nodes() {
            return Err(AssemblyError::NodeOutOfBounds {
                node,
                num_nodes: self.num_nodes(),
            });
        }
        self.is_dirichlet[node] = true;
        self.values[node] = value;
        Ok(())
    }

    pub fn set_dirichlet_on_nodes(&mut self, nodes: &[usize], value: f64) -> Result<(), AssemblyError> {
        nodes
            .iter()
            .try_for_each(|&node| self.set_dirichlet(node, value))
    }

    /// Prescribes `value` at both vertices of every face.
    pub fn set_dirichlet_on_faces(
        &mut self,
        faces: &[Segment2d2Connectivity],
        value: f64,
    ) -> Result<(), AssemblyError> {
        faces
            .iter()
            .flat_map(|face| face.0)
            .try_for_each(|node| self.set_dirichlet(node, value))
    }

    /// Writes the prescribed values into the Dirichlet entries of `u`.
    pub fn apply_values_to(&self, u: &mut DVector<f64>) -> Result<(), AssemblyError> {
        check_len("solution", self.num_nodes(), u.len())?;
        for node in self.dirichlet_nodes() {
            u[node] = self.values[node];
        }
        Ok(())
    }
}

/// Constant flux prescribed on a group of boundary faces.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum NeumannFlux {
    /// Normal flux `q·n` given directly.
    Scalar(f64),
    /// Flux vector `(x, y)`, projected onto the outward normal.
    Vector { x: f64, y: f64 },
    /// Only the x-component is given; contributes `n_x x`.
    X(f64),
    /// Only the y-component is given; contributes `n_y y`.
    Y(f64),
}

impl NeumannFlux {
    /// Picks the flux from optional components, preferring a scalar value, then a full vector,
    /// then a single component.
    pub fn from_components(value: Option<f64>, x: Option<f64>, y: Option<f64>) -> Option<Self> {
        match (value, x, y) {
            (Some(value), _, _) => Some(Self::Scalar(value)),
            (None, Some(x), Some(y)) => Some(Self::Vector { x, y }),
            (None, Some(x), None) => Some(Self::X(x)),
            (None, None, Some(y)) => Some(Self::Y(y)),
            (None, None, None) => None,
        }
    }

    /// Flux through a face with the given outward unit normal.
    pub fn normal_flux(&self, normal: &Vector2<f64>) -> f64 {
        match *self {
            Self::Scalar(value) => value,
            Self::Vector { x, y } => normal.x * x + normal.y * y,
            Self::X(x) => normal.x * x,
            Self::Y(y) => normal.y * y,
        }
    }
}

fn check_len(what: &'static str, expected: usize, actual: usize) -> Result<(), AssemblyError> {
    if expected == actual {
        Ok(())
    } else {
        Err(AssemblyError::SizeMismatch {
            what,
            expected,
            actual,
        })
    }
}

/// Adds the lumped constant source `f area / arity` of every element to each of its owned,
/// non-Dirichlet nodes.
pub fn assemble_source_term(
    topology: &impl MeshTopology,
    f: f64,
    boundary: &BoundaryState,
    rhs: &mut DVector<f64>,
) -> Result<(), AssemblyError> {
    check_len("boundary state", topology.num_nodes(), boundary.num_nodes())?;
    check_len("right-hand side", topology.num_nodes(), rhs.len())?;

    let mut vertices = Vec::with_capacity(4);
    for element in 0..topology.num_elements() {
        let nodes = topology.element_nodes(element);
        vertices.clear();
        vertices.extend(nodes.iter().map(|&node| topology.node_position(node)));
        let area = polygon_area(&vertices);
        if area <= 0.0 {
            return Err(AssemblyError::DegenerateElement { element, area });
        }

        let contribution = f * area / nodes.len() as f64;
        for &node in nodes {
            if topology.is_owned(node) && !boundary.is_dirichlet(node) {
                rhs[node] += contribution;
            }
        }
    }
    Ok(())
}

/// Adds `q·n length / 2` of every face in `faces` to each of its owned, non-Dirichlet nodes.
///
/// Faces that are not edges of the local mesh are skipped when neither of their vertices is
/// owned, since such a face only contributes to rows of other partitions.
pub fn assemble_neumann_flux(
    topology: &Topology,
    faces: &[Segment2d2Connectivity],
    flux: NeumannFlux,
    boundary: &BoundaryState,
    rhs: &mut DVector<f64>,
) -> Result<(), AssemblyError> {
    check_len("boundary state", topology.num_nodes(), boundary.num_nodes())?;
    check_len("right-hand side", topology.num_nodes(), rhs.len())?;

    for segment in faces {
        let Some(face) = topology.find_face(segment) else {
            if segment.iter().any(|&node| node < topology.num_nodes() && topology.is_owned(node)) {
                return Err(AssemblyError::FaceNotInMesh { nodes: segment.0 });
            }
            continue;
        };

        let contribution = flux.normal_flux(&topology.face_normal(face)) * topology.face_length(face) / 2.0;
        for node in topology.face_nodes(face) {
            if topology.is_owned(node) && !boundary.is_dirichlet(node) {
                rhs[node] += contribution;
            }
        }
    }
    Ok(())
}

/// Imposes the prescribed values of all owned Dirichlet nodes on the system.
///
/// Must run after the source and flux terms have been accumulated, since the policies overwrite
/// right-hand side entries and [`DirichletPolicy::RowColumnElimination`] corrects the remaining
/// ones.
pub fn apply_dirichlet(
    system: &mut LinearSystem,
    topology: &impl MeshTopology,
    boundary: &BoundaryState,
    policy: DirichletPolicy,
    penalty: f64,
) -> Result<(), AssemblyError> {
    check_len("boundary state", topology.num_nodes(), boundary.num_nodes())?;
    check_len("linear system", topology.num_nodes(), system.num_dofs())?;

    let owned_dirichlet: Vec<usize> = boundary
        .dirichlet_nodes()
        .filter(|&node| topology.is_owned(node))
        .collect();

    match policy {
        DirichletPolicy::Penalty => {
            for &node in &owned_dirichlet {
                system.matrix_set_value(node, node, penalty)?;
                system.rhs_mut()[node] = penalty * boundary.value(node);
            }
        }
        DirichletPolicy::WeakPenalty => {
            for &node in &owned_dirichlet {
                system.matrix_add_value(node, node, penalty)?;
                system.rhs_mut()[node] = penalty * boundary.value(node);
            }
        }
        DirichletPolicy::RowElimination => {
            for &node in &owned_dirichlet {
                system.eliminate_row(node, boundary.value(node))?;
            }
        }
        DirichletPolicy::RowColumnElimination => {
            let mut rows = vec![false; topology.num_nodes()];
            for &node in &owned_dirichlet {
                rows[node] = true;
            }
            system.eliminate_row_column(&rows, boundary.dirichlet_mask(), boundary.values())?;
        }
    }
    Ok(())
}
