use na::{Matrix3, Vector3};
pub use squishy::test_utils::*;
use squishy::{LoadProfile, SimParams, Solver, SolverBuilder, VolumetricMesh};

pub fn init_logger() {
    let _ = env_logger::Builder::from_env("SQUISHY_LOG")
        .is_test(true)
        .try_init();
}

/// Build a solver for `mesh` with the given parameters and fixed vertices.
pub fn build_solver(params: SimParams, mesh: VolumetricMesh, fixed: &[usize]) -> Solver {
    SolverBuilder::new(params)
        .set_mesh(mesh)
        .set_fixed_vertices(fixed.iter().copied())
        .build()
        .expect("failed to build solver")
}

/// Parameters applying a constant force to a single vertex.
#[allow(dead_code)]
pub fn constant_load_params(vertex: usize, force: [f64; 3]) -> SimParams {
    SimParams {
        load: LoadProfile::constant(vertex, force),
        ..STATIC_PARAMS
    }
}

/// The 3x3 diagonal block of the assembled stiffness matrix for the given vertex.
#[allow(dead_code)]
pub fn vertex_stiffness_block(solver: &Solver, vertex: usize) -> Matrix3<f64> {
    let k = solver.stiffness_matrix();
    Matrix3::from_fn(|r, c| k.get(3 * vertex + r, 3 * vertex + c))
}

#[allow(dead_code)]
pub fn norm(v: [f64; 3]) -> f64 {
    Vector3::from(v).norm()
}
