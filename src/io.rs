//! Reading, writing and checking of per-node reference results.
//!
//! A result file holds one `<unique id> <value>` pair per line. Empty lines and lines starting
//! with `#` are ignored.
use crate::topology::MeshTopology;
use log::info;
use nalgebra::DVector;
use std::collections::BTreeMap;
use std::error::Error;
use std::fmt::{self, Write as _};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

#[derive(Debug)]
#[non_exhaustive]
pub enum ResultCheckError {
    Io { path: PathBuf, source: io::Error },
    Parse { line: usize, content: String },
    MissingNode { unique_id: usize },
    Mismatch {
        unique_id: usize,
        expected: f64,
        actual: f64,
        tolerance: f64,
    },
}

impl fmt::Display for ResultCheckError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io { path, source } => write!(f, "I/O error on result file {}: {}", path.display(), source),
            Self::Parse { line, content } => {
                write!(f, "Malformed result file line {}: '{}'", line, content)
            }
            Self::MissingNode { unique_id } => {
                write!(f, "Result file has no value for node {}", unique_id)
            }
            Self::Mismatch {
                unique_id,
                expected,
                actual,
                tolerance,
            } => write!(
                f,
                "Node {}: computed {:e} but expected {:e} (tolerance {:e})",
                unique_id, actual, expected, tolerance
            ),
        }
    }
}

impl Error for ResultCheckError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Io { source, .. } => Some(source),
            _ => None,
        }
    }
}

/// Parses result file contents into a map from unique id to value.
pub fn parse_node_results(text: &str) -> Result<BTreeMap<usize, f64>, ResultCheckError> {
    let mut results = BTreeMap::new();
    for (index, line) in text.lines().enumerate() {
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }
        let parse_error = || ResultCheckError::Parse {
            line: index + 1,
            content: line.to_string(),
        };
        let mut tokens = trimmed.split_whitespace();
        let (Some(id), Some(value), None) = (tokens.next(), tokens.next(), tokens.next()) else {
            return Err(parse_error());
        };
        let id = id.parse().map_err(|_| parse_error())?;
        let value = value.parse().map_err(|_| parse_error())?;
        results.insert(id, value);
    }
    Ok(results)
}

pub fn read_node_result_file(path: impl AsRef<Path>) -> Result<BTreeMap<usize, f64>, ResultCheckError> {
    let path = path.as_ref();
    let text = fs::read_to_string(path).map_err(|source| ResultCheckError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    parse_node_results(&text)
}

/// Formats the values of the owned nodes, ordered by unique id.
pub fn format_node_results(topology: &impl MeshTopology, values: &DVector<f64>) -> String {
    let owned: BTreeMap<usize, f64> = (0..topology.num_nodes())
        .filter(|&node| topology.is_owned(node))
        .map(|node| (topology.unique_id(node), values[node]))
        .collect();

    let mut text = String::from("# unique-id value\n");
    for (id, value) in owned {
        // Writing to a String cannot fail
        let _ = writeln!(text, "{} {:.17e}", id, value);
    }
    text
}

pub fn write_node_result_file(
    path: impl AsRef<Path>,
    topology: &impl MeshTopology,
    values: &DVector<f64>,
) -> Result<(), ResultCheckError> {
    let path = path.as_ref();
    fs::write(path, format_node_results(topology, values)).map_err(|source| ResultCheckError::Io {
        path: path.to_path_buf(),
        source,
    })
}

/// Compares the value of every owned node with its reference value within an absolute
/// tolerance. Returns the number of nodes checked.
pub fn check_node_results(
    expected: &BTreeMap<usize, f64>,
    topology: &impl MeshTopology,
    values: &DVector<f64>,
    tolerance: f64,
) -> Result<usize, ResultCheckError> {
    let mut checked = 0;
    for node in (0..topology.num_nodes()).filter(|&node| topology.is_owned(node)) {
        let unique_id = topology.unique_id(node);
        let &reference = expected
            .get(&unique_id)
            .ok_or(ResultCheckError::MissingNode { unique_id })?;
        let actual = values[node];
        if !((actual - reference).abs() <= tolerance) {
            return Err(ResultCheckError::Mismatch {
                unique_id,
                expected: reference,
                actual,
                tolerance,
            });
        }
        checked += 1;
    }
    Ok(checked)
}

pub fn check_node_result_file(
    path: impl AsRef<Path>,
    topology: &impl MeshTopology,
    values: &DVector<f64>,
    tolerance: f64,
) -> Result<usize, ResultCheckError> {
    let path = path.as_ref();
    let expected = read_node_result_file(path)?;
    let checked = check_node_results(&expected, topology, values, tolerance)?;
    info!("Checked {} node values against {}", checked, path.display());
    Ok(checked)
}
