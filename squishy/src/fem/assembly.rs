//! Element level force and stiffness computation and their accumulation into the global system.

use rayon::prelude::*;

use crate::energy_models::elasticity::StressModel;
use crate::matrix::{flatten, Matrix12, Matrix9x12, StiffnessMatrix, Vector12};
use crate::objects::tetsolid::TetElements;
use crate::Error;

/// Force, stiffness and energy contributed by a single tetrahedron.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct LocalSystem {
    /// Elastic energy stored in the element.
    pub energy: f64,
    /// Internal elastic force on the 4 vertices, `−vol · (∂F/∂x)ᵀ vec(P)`.
    pub force: Vector12,
    /// Derivative of `force` with respect to the vertex positions,
    /// `−vol · (∂F/∂x)ᵀ (∂P/∂F) (∂F/∂x)`.
    pub stiffness: Matrix12,
}

impl Default for LocalSystem {
    fn default() -> Self {
        LocalSystem {
            energy: 0.0,
            force: Vector12::zeros(),
            stiffness: Matrix12::zeros(),
        }
    }
}

/// Compute the local system of one element with the given deformation gradient.
#[allow(non_snake_case)]
pub fn element_system<M: StressModel>(
    material: &M,
    F: &na::Matrix3<f64>,
    volume: f64,
    dFdx: &Matrix9x12,
) -> LocalSystem {
    let response = material.response(F);
    let dFdx_t = dFdx.transpose();
    LocalSystem {
        energy: volume * response.energy_density,
        force: dFdx_t * flatten(&response.stress) * -volume,
        stiffness: dFdx_t * response.stress_derivative * dFdx * -volume,
    }
}

/// Compute the local systems of all elements in parallel at the deformed positions `pos`.
///
/// Each element writes only into its own slot of `local_systems`.
pub fn compute_local_systems<M: StressModel>(
    elements: &TetElements,
    pos: &[[f64; 3]],
    material: &M,
    local_systems: &mut [LocalSystem],
) -> Result<(), Error> {
    if local_systems.len() != elements.num_elements() {
        return Err(Error::SizeMismatch);
    }
    local_systems
        .par_iter_mut()
        .enumerate()
        .try_for_each(|(e, local)| -> Result<(), Error> {
            #[allow(non_snake_case)]
            let F = elements.deformation_gradient(e, pos).ok_or_else(|| {
                Error::VertexIndexOutOfBounds {
                    index: elements.tets[e].iter().copied().max().unwrap_or(0),
                    num_vertices: pos.len(),
                }
            })?;
            *local = element_system(
                material,
                &F,
                elements.ref_volume[e],
                &elements.deformation_gradient_jacobian[e],
            );
            Ok(())
        })
}

/// Overwrite `f_int` with the sum of the element forces.
pub fn scatter_forces(elements: &TetElements, local_systems: &[LocalSystem], f_int: &mut [f64]) {
    f_int.iter_mut().for_each(|f| *f = 0.0);
    for (tet, local) in elements.tets.iter().zip(local_systems.iter()) {
        for (a, &v) in tet.iter().enumerate() {
            for i in 0..3 {
                f_int[3 * v + i] += local.force[3 * a + i];
            }
        }
    }
}

/// Overwrite the values of `k` with the sum of the element stiffness blocks.
pub fn scatter_stiffness(local_systems: &[LocalSystem], k: &mut StiffnessMatrix) {
    k.clear();
    for (e, local) in local_systems.iter().enumerate() {
        k.add_element_block(e, &local.stiffness);
    }
}

/// Accumulate forces and stiffness concurrently and return the total elastic energy.
pub fn scatter(
    elements: &TetElements,
    local_systems: &[LocalSystem],
    f_int: &mut [f64],
    k: &mut StiffnessMatrix,
) -> f64 {
    let ((), ()) = rayon::join(
        || scatter_forces(elements, local_systems, f_int),
        || scatter_stiffness(local_systems, k),
    );
    local_systems.iter().map(|local| local.energy).sum()
}

/// Internal elastic forces at `pos` without assembling the stiffness matrix.
pub fn internal_forces<M: StressModel>(
    elements: &TetElements,
    pos: &[[f64; 3]],
    material: &M,
) -> Result<Vec<f64>, Error> {
    let forces: Vec<Vector12> = (0..elements.num_elements())
        .into_par_iter()
        .map(|e| -> Result<Vector12, Error> {
            #[allow(non_snake_case)]
            let F = elements
                .deformation_gradient(e, pos)
                .ok_or(Error::SizeMismatch)?;
            let P = material.stress(&F);
            Ok(elements.deformation_gradient_jacobian[e].transpose()
                * flatten(&P)
                * -elements.ref_volume[e])
        })
        .collect::<Result<_, Error>>()?;

    let mut f_int = vec![0.0; 3 * pos.len()];
    for (tet, force) in elements.tets.iter().zip(forces.iter()) {
        for (a, &v) in tet.iter().enumerate() {
            for i in 0..3 {
                f_int[3 * v + i] += force[3 * a + i];
            }
        }
    }
    Ok(f_int)
}

/// Total elastic energy at `pos`.
pub fn elastic_energy<M: StressModel>(
    elements: &TetElements,
    pos: &[[f64; 3]],
    material: &M,
) -> Result<f64, Error> {
    (0..elements.num_elements())
        .into_par_iter()
        .map(|e| {
            elements
                .deformation_gradient(e, pos)
                .map(|f| elements.ref_volume[e] * material.energy_density(&f))
                .ok_or(Error::SizeMismatch)
        })
        .sum()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::energy_models::elasticity::ArapMaterial;
    use crate::mesh::VolumetricMesh;
    use approx::assert_relative_eq;
    use rand::distributions::{Distribution, Uniform};
    use rand::prelude::*;

    /// Box positions rotated and uniformly stretched by 30% with a small random perturbation.
    fn stretched_positions(mesh: &VolumetricMesh) -> Vec<[f64; 3]> {
        let mut rng = StdRng::seed_from_u64(7);
        let noise = Uniform::new(-0.02, 0.02);
        let rot = na::Rotation3::from_euler_angles(0.2, 0.4, -0.3);
        mesh.vertex_positions()
            .iter()
            .map(|&p| {
                let q = rot * (na::Vector3::from(p) * 1.3);
                [
                    q[0] + noise.sample(&mut rng),
                    q[1] + noise.sample(&mut rng),
                    q[2] + noise.sample(&mut rng),
                ]
            })
            .collect()
    }

    fn assemble(
        elements: &TetElements,
        pos: &[[f64; 3]],
        material: &ArapMaterial,
    ) -> (Vec<f64>, StiffnessMatrix) {
        let mut locals = vec![LocalSystem::default(); elements.num_elements()];
        compute_local_systems(elements, pos, material, &mut locals).unwrap();
        let mut k = StiffnessMatrix::new(3 * pos.len(), &elements.element_dofs());
        let mut f_int = vec![0.0; 3 * pos.len()];
        scatter(elements, &locals, &mut f_int, &mut k);
        (f_int, k)
    }

    #[test]
    fn rest_state_is_force_free() {
        let mesh = VolumetricMesh::box_mesh([2, 1, 1], [2.0, 1.0, 1.0]);
        let elements = TetElements::new(&mesh).unwrap();
        let material = ArapMaterial::new(10.0);
        let (f_int, k) = assemble(&elements, mesh.vertex_positions(), &material);
        assert!(f_int.iter().all(|f| f.abs() < 1e-12));
        assert!(k.is_symmetric(1e-10));

        // Stiffness is the derivative of the restoring force, so it is negative semidefinite.
        let eigen = na::SymmetricEigen::new(k.to_dense());
        assert!(eigen.eigenvalues.max() <= 1e-9);
        assert_relative_eq!(
            elastic_energy(&elements, mesh.vertex_positions(), &material).unwrap(),
            0.0,
            epsilon = 1e-12
        );
    }

    #[test]
    fn stiffness_matches_finite_difference() {
        let mesh = VolumetricMesh::box_mesh([1, 1, 1], [1.0, 1.0, 1.0]);
        let elements = TetElements::new(&mesh).unwrap();
        let material = ArapMaterial::new(1.0);
        let pos = stretched_positions(&mesh);
        let (f_int, k) = assemble(&elements, &pos, &material);

        let direct = internal_forces(&elements, &pos, &material).unwrap();
        for (a, b) in f_int.iter().zip(direct.iter()) {
            assert_relative_eq!(*a, *b, epsilon = 1e-12);
        }

        let h = 1e-6;
        let n = 3 * pos.len();
        for col in 0..n {
            let mut pos_p = pos.clone();
            let mut pos_m = pos.clone();
            pos_p[col / 3][col % 3] += h;
            pos_m[col / 3][col % 3] -= h;
            let f_p = internal_forces(&elements, &pos_p, &material).unwrap();
            let f_m = internal_forces(&elements, &pos_m, &material).unwrap();
            for row in 0..n {
                let fd = (f_p[row] - f_m[row]) / (2.0 * h);
                assert_relative_eq!(k.get(row, col), fd, epsilon = 1e-6);
            }
        }
    }

    #[test]
    fn force_is_negative_energy_gradient() {
        let mesh = VolumetricMesh::box_mesh([1, 1, 1], [1.0, 1.0, 1.0]);
        let elements = TetElements::new(&mesh).unwrap();
        let material = ArapMaterial::new(2.0);
        let pos = stretched_positions(&mesh);
        let f_int = internal_forces(&elements, &pos, &material).unwrap();

        let h = 1e-6;
        for dof in 0..3 * pos.len() {
            let mut pos_p = pos.clone();
            let mut pos_m = pos.clone();
            pos_p[dof / 3][dof % 3] += h;
            pos_m[dof / 3][dof % 3] -= h;
            let e_p = elastic_energy(&elements, &pos_p, &material).unwrap();
            let e_m = elastic_energy(&elements, &pos_m, &material).unwrap();
            assert_relative_eq!(f_int[dof], -(e_p - e_m) / (2.0 * h), epsilon = 1e-6);
        }
    }

    #[test]
    fn mismatched_sizes_are_reported() {
        let mesh = VolumetricMesh::one_tet();
        let elements = TetElements::new(&mesh).unwrap();
        let material = ArapMaterial::new(1.0);
        let mut locals = vec![LocalSystem::default(); 2];
        assert!(matches!(
            compute_local_systems(&elements, mesh.vertex_positions(), &material, &mut locals),
            Err(Error::SizeMismatch)
        ));
        let mut locals = vec![LocalSystem::default(); 1];
        assert!(matches!(
            compute_local_systems(&elements, &mesh.vertex_positions()[..2], &material, &mut locals),
            Err(Error::VertexIndexOutOfBounds { .. })
        ));
    }
}
