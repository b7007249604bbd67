pub mod energy_models;
pub mod fem;
pub mod io;
pub mod matrix;
pub mod mesh;
pub mod objects;
pub mod scene;

// Shared fixtures for unit tests, integration tests and benchmarks.
pub mod test_utils;

use std::path::PathBuf;

pub use self::fem::*;
pub use self::mesh::VolumetricMesh;
pub use self::objects::material::*;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Size mismatch error")]
    SizeMismatch,
    #[error("Failed to load mesh {path:?}: {source}")]
    MeshLoadFailure {
        path: PathBuf,
        #[source]
        source: io::VegError,
    },
    #[error("Degenerate reference element detected: {:?}", .degens[0])]
    DegenerateElement {
        // Indices of all elements with a (nearly) singular rest shape matrix.
        degens: Vec<usize>,
    },
    #[error("Linear solve failed: {}", .result.status)]
    LinearSolveNonConvergence { result: fem::linsolve::SolveResult },
    #[error("Vertex index {index} is out of bounds for a mesh with {num_vertices} vertices")]
    VertexIndexOutOfBounds { index: usize, num_vertices: usize },
    #[error("Invalid parameter: {name:?}")]
    InvalidParameter { name: String },
    #[error("No simulation mesh found")]
    NoSimulationMesh,
    #[error("Failed to load configuration")]
    LoadConfig(#[from] io::LoadConfigError),
    #[error("File I/O Error")]
    FileIOError {
        #[from]
        source: std::io::Error,
    },
}

pub(crate) fn inf_norm<I>(iter: I) -> f64
where
    I: IntoIterator<Item = f64>,
{
    iter.into_iter()
        .map(|x| x.abs())
        .max_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Less))
        .unwrap_or(0.0)
}
