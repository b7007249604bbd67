use crate::fem::{ConstraintMode, LoadProfile, SimParams};
use crate::mesh::VolumetricMesh;
use crate::objects::material::MaterialParams;

/*
 * Setup code
 */

pub const SOFT_MATERIAL: MaterialParams = MaterialParams {
    youngs_modulus: 1000.0,
    poisson_ratio: 0.3,
    density: 1000.0,
};

pub const NO_LOAD: LoadProfile = LoadProfile {
    vertex: 0,
    increment: 0.0,
    initial: 0.0,
    threshold: -2.0e6,
    reset: 1.5e6,
    direction: [0.0, 1.0, 0.0],
};

/// Parameters where every step takes the full linear solve correction.
pub const STATIC_PARAMS: SimParams = SimParams {
    time_step: 0.01,
    relaxation: 100.0,
    max_cg_iterations: 500,
    cg_tolerance: 1e-12,
    material: SOFT_MATERIAL,
    load: NO_LOAD,
    constraint_mode: ConstraintMode::Eliminate,
};

/// Same as `STATIC_PARAMS` but only a fraction of each correction is applied.
pub const RELAXED_PARAMS: SimParams = SimParams {
    relaxation: 30.0,
    ..STATIC_PARAMS
};

pub fn make_one_tet_mesh() -> VolumetricMesh {
    VolumetricMesh::one_tet()
}

/// A 1 x 1 x 3 column standing on the `y = -1.5` plane.
pub fn make_box_mesh(res: usize) -> VolumetricMesh {
    VolumetricMesh::box_mesh([res, 3 * res, res], [1.0, 3.0, 1.0])
}

/// Indices of all vertices with the smallest `y` coordinate.
pub fn bottom_vertices(mesh: &VolumetricMesh) -> Vec<usize> {
    let min_y = mesh
        .vertex_positions()
        .iter()
        .map(|p| p[1])
        .fold(f64::INFINITY, f64::min);
    mesh.vertex_positions()
        .iter()
        .enumerate()
        .filter(|(_, p)| p[1] <= min_y + 1e-10)
        .map(|(i, _)| i)
        .collect()
}

/// Index of the vertex with the largest `y` coordinate, lowest index first.
pub fn top_vertex(mesh: &VolumetricMesh) -> usize {
    mesh.vertex_positions()
        .iter()
        .enumerate()
        .fold((0, f64::NEG_INFINITY), |(best, max_y), (i, p)| {
            if p[1] > max_y {
                (i, p[1])
            } else {
                (best, max_y)
            }
        })
        .0
}
