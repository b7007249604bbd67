use std::fmt::{Display, Formatter};

use super::assembly::{self, LocalSystem};
use super::boundary::{enforce_boundary_conditions, BoundaryConditions};
use super::linsolve::{ConjugateGradient, SolveResult, Status};
use super::load::LoadStepper;
use super::timing::{StepTimings, Timer};
use super::SimParams;
use crate::energy_models::elasticity::ArapMaterial;
use crate::inf_norm;
use crate::matrix::StiffnessMatrix;
use crate::mesh::VolumetricMesh;
use crate::objects::tetsolid::TetElements;
use crate::Error;

/// Callback polled during the linear solve. Returning `true` interrupts the step.
pub type Interrupter = Box<dyn FnMut() -> bool + Send + 'static>;

#[derive(Clone, Debug)]
pub struct SolverBuilder {
    sim_params: SimParams,
    mesh: Option<VolumetricMesh>,
    fixed_vertices: Vec<usize>,
}

impl SolverBuilder {
    /// Create a `SolverBuilder` with the minimum required parameters, which are the simulation
    /// parameters, `SimParams`.
    pub fn new(sim_params: SimParams) -> Self {
        SolverBuilder {
            sim_params,
            mesh: None,
            fixed_vertices: Vec::new(),
        }
    }

    /// Set the tetrahedral mesh representing the simulated solid in its rest configuration.
    pub fn set_mesh(&mut self, mesh: VolumetricMesh) -> &mut Self {
        self.mesh = Some(mesh);
        self
    }

    /// Set the vertices held fixed at their rest positions.
    pub fn set_fixed_vertices(&mut self, fixed: impl IntoIterator<Item = usize>) -> &mut Self {
        self.fixed_vertices = fixed.into_iter().collect();
        self
    }

    /// Build the simulation solver.
    pub fn build(&self) -> Result<Solver, Error> {
        let SolverBuilder {
            sim_params: params,
            mesh,
            fixed_vertices,
        } = self;

        params.validate()?;

        let mesh = mesh.clone().ok_or(Error::NoSimulationMesh)?;
        let num_vertices = mesh.num_vertices();

        let bc = BoundaryConditions::new(fixed_vertices.iter().copied(), num_vertices)?;

        if params.load.vertex >= num_vertices {
            return Err(Error::VertexIndexOutOfBounds {
                index: params.load.vertex,
                num_vertices,
            });
        }

        let elements = TetElements::new(&mesh)?;
        let num_dofs = 3 * num_vertices;

        let x0: Vec<f64> = bytemuck::cast_slice::<[f64; 3], f64>(mesh.vertex_positions()).to_vec();
        let mass = elements.lumped_mass(num_vertices, params.material.density);
        let stiffness = StiffnessMatrix::new(num_dofs, &elements.element_dofs());

        log::info!(
            "Built solver with {} elements and {} vertices ({} fixed, {} stiffness entries)",
            elements.num_elements(),
            num_vertices,
            bc.fixed_vertices().len(),
            stiffness.nnz()
        );

        Ok(Solver {
            sim_params: *params,
            material: ArapMaterial::new(params.material.shear_modulus()),
            load: LoadStepper::new(params.load),
            local_systems: vec![LocalSystem::default(); elements.num_elements()],
            cg: ConjugateGradient::new(num_dofs, params.max_cg_iterations, params.cg_tolerance),
            x: x0.clone(),
            x0,
            f_int: vec![0.0; num_dofs],
            f_ext: vec![0.0; num_dofs],
            rhs: vec![0.0; num_dofs],
            u: vec![0.0; num_dofs],
            mass,
            stiffness,
            mesh,
            elements,
            bc,
            interrupter: None,
            time: 0.0,
            step_count: 0,
        })
    }
}

/// Outcome of a single successful call to `Solver::step`.
#[derive(Clone, Debug, PartialEq)]
pub struct StepResult {
    /// Total displacement `x − x0` of each vertex after the step.
    pub displacement: Vec<[f64; 3]>,
    /// Change in position of each vertex applied by this step.
    pub increment: Vec<[f64; 3]>,
    /// Load magnitude used in this step.
    pub load: f64,
    /// Free DOF norm of `fInt − fExt` at the positions the system was assembled at.
    pub residual_norm: f64,
    /// Elastic energy at the positions the system was assembled at.
    pub energy: f64,
    pub linsolve: SolveResult,
    pub timings: StepTimings,
}

impl StepResult {
    /// Largest absolute coordinate of the increment.
    pub fn max_increment(&self) -> f64 {
        inf_norm(self.increment.iter().flatten().copied())
    }
}

impl Display for StepResult {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "Load:             {:e}", self.load)?;
        writeln!(f, "Residual norm:    {:e}", self.residual_norm)?;
        writeln!(f, "Elastic energy:   {:e}", self.energy)?;
        writeln!(f, "Max increment:    {:e}", self.max_increment())?;
        writeln!(f, "Linear solve:     {}", self.linsolve)?;
        write!(f, "{}", self.timings)
    }
}

/// Quasi-static finite element solver.
///
/// Each call to `step` ramps the load, assembles the stiffness and internal forces at the current
/// positions, solves for a correction and moves the vertices by a relaxed fraction of it.
pub struct Solver {
    /// Simulation parameters. This is kept around for convenience.
    sim_params: SimParams,
    material: ArapMaterial,
    load: LoadStepper,
    mesh: VolumetricMesh,
    elements: TetElements,
    bc: BoundaryConditions,
    /// Current positions.
    x: Vec<f64>,
    /// Rest positions.
    x0: Vec<f64>,
    f_int: Vec<f64>,
    f_ext: Vec<f64>,
    rhs: Vec<f64>,
    /// Linear solve workspace holding the last correction.
    u: Vec<f64>,
    /// Lumped mass per DOF.
    mass: Vec<f64>,
    stiffness: StiffnessMatrix,
    local_systems: Vec<LocalSystem>,
    cg: ConjugateGradient,
    interrupter: Option<Interrupter>,
    /// Simulated time.
    time: f64,
    /// Counts the number of successful calls to `step`.
    step_count: u32,
}

impl Solver {
    /// Set a callback checked between linear solver iterations. If it returns `true`, the step
    /// is abandoned with an `Interrupted` status and positions are left unchanged.
    pub fn set_interrupter(&mut self, interrupted: impl FnMut() -> bool + Send + 'static) {
        self.interrupter = Some(Box::new(interrupted));
    }

    #[inline]
    pub fn params(&self) -> &SimParams {
        &self.sim_params
    }

    #[inline]
    pub fn mesh(&self) -> &VolumetricMesh {
        &self.mesh
    }

    #[inline]
    pub fn boundary_conditions(&self) -> &BoundaryConditions {
        &self.bc
    }

    #[inline]
    pub fn num_steps(&self) -> u32 {
        self.step_count
    }

    /// Simulated time advanced by one time step per successful step.
    #[inline]
    pub fn time(&self) -> f64 {
        self.time
    }

    #[inline]
    pub fn load_magnitude(&self) -> f64 {
        self.load.magnitude()
    }

    /// Current vertex positions.
    #[inline]
    pub fn vertex_positions(&self) -> &[[f64; 3]] {
        bytemuck::cast_slice(self.x.as_slice())
    }

    /// Displacement `x − x0` of every vertex.
    pub fn displacements(&self) -> Vec<[f64; 3]> {
        let x: &[[f64; 3]] = bytemuck::cast_slice(self.x.as_slice());
        let x0: &[[f64; 3]] = bytemuck::cast_slice(self.x0.as_slice());
        x.iter()
            .zip(x0.iter())
            .map(|(x, x0)| [x[0] - x0[0], x[1] - x0[1], x[2] - x0[2]])
            .collect()
    }

    /// Lumped mass of every DOF.
    #[inline]
    pub fn lumped_mass(&self) -> &[f64] {
        &self.mass
    }

    /// Stiffness matrix from the most recent step, with boundary conditions applied.
    #[inline]
    pub fn stiffness_matrix(&self) -> &StiffnessMatrix {
        &self.stiffness
    }

    /// Internal forces assembled in the most recent step.
    #[inline]
    pub fn internal_force(&self) -> &[f64] {
        &self.f_int
    }

    /// External forces applied in the most recent successful step.
    #[inline]
    pub fn external_force(&self) -> &[f64] {
        &self.f_ext
    }

    /// Free DOF norm of `fInt − fExt` evaluated at the current positions.
    pub fn residual_norm(&self) -> Result<f64, Error> {
        let mut residual =
            assembly::internal_forces(&self.elements, self.vertex_positions(), &self.material)?;
        residual
            .iter_mut()
            .zip(self.f_ext.iter())
            .for_each(|(r, f)| *r -= f);
        Ok(self.bc.free_norm(&residual))
    }

    /// Elastic energy at the current positions.
    pub fn elastic_energy(&self) -> Result<f64, Error> {
        assembly::elastic_energy(&self.elements, self.vertex_positions(), &self.material)
    }

    /// Overwrite the current vertex positions.
    pub fn update_vertex_positions(&mut self, pos: &[[f64; 3]]) -> Result<(), Error> {
        if pos.len() != self.mesh.num_vertices() {
            return Err(Error::SizeMismatch);
        }
        self.x.copy_from_slice(bytemuck::cast_slice::<[f64; 3], f64>(pos));
        Ok(())
    }

    /// Run one quasi-static step.
    ///
    /// On error the positions and the load are left as they were before the call.
    pub fn step(&mut self) -> Result<StepResult, Error> {
        let mut timings = StepTimings::default();
        let mut total_timer = Timer::start();
        let mut timer = Timer::start();

        let Solver {
            sim_params: ref params,
            ref material,
            ref mut load,
            ref elements,
            ref bc,
            ref mut x,
            ref x0,
            ref mut f_int,
            ref mut f_ext,
            ref mut rhs,
            ref mut u,
            ref mut stiffness,
            ref mut local_systems,
            ref mut cg,
            ref mut interrupter,
            ..
        } = *self;

        // The load is only committed once the step succeeds. Until then it lives in `rhs`.
        let mut next_load = *load;
        let load_magnitude = next_load.advance();
        next_load.apply(rhs)?;
        timer.lap(&mut timings.load_update);

        let pos: &[[f64; 3]] = bytemuck::cast_slice(x.as_slice());
        assembly::compute_local_systems(elements, pos, material, local_systems)?;
        timer.lap(&mut timings.element_systems);

        let energy = assembly::scatter(elements, local_systems, f_int, stiffness);
        timer.lap(&mut timings.scatter);

        // Right-hand side is −fInt + fExt. Before constraints, its free part is the residual.
        rhs.iter_mut().zip(f_int.iter()).for_each(|(r, fi)| *r -= fi);
        let residual_norm = bc.free_norm(rhs);
        enforce_boundary_conditions(stiffness, rhs, bc, params.constraint_mode);
        timer.lap(&mut timings.boundary_conditions);

        u.iter_mut().for_each(|u| *u = 0.0);
        let k: &StiffnessMatrix = stiffness;
        let linsolve = cg.solve(
            |p, out| {
                if let Some(interrupted) = interrupter.as_mut() {
                    if interrupted() {
                        return false;
                    }
                }
                k.mul_vec(p, out);
                true
            },
            u,
            rhs,
        );
        timer.lap(&mut timings.linear_solve);

        match linsolve.status {
            Status::Success => {
                log::debug!("Linear solve: {}", linsolve);
            }
            Status::MaximumIterationsExceeded => {
                log::warn!("Linear solve: {}", linsolve);
            }
            Status::NanDetected | Status::SingularMatrix | Status::Interrupted => {
                return Err(Error::LinearSolveNonConvergence { result: linsolve });
            }
        }
        if !u.iter().all(|u| u.is_finite()) {
            return Err(Error::LinearSolveNonConvergence {
                result: SolveResult {
                    status: Status::NanDetected,
                    ..linsolve
                },
            });
        }

        let scale = params.step_scale();
        x.iter_mut()
            .zip(u.iter())
            .for_each(|(x, &u)| *x += scale * u);
        let increment: Vec<[f64; 3]> = u
            .chunks_exact(3)
            .map(|u| [scale * u[0], scale * u[1], scale * u[2]])
            .collect();
        let displacement: Vec<[f64; 3]> = x
            .chunks_exact(3)
            .zip(x0.chunks_exact(3))
            .map(|(x, x0)| [x[0] - x0[0], x[1] - x0[1], x[2] - x0[2]])
            .collect();
        timer.lap(&mut timings.position_update);
        total_timer.lap(&mut timings.total);

        next_load.apply(f_ext)?;
        *load = next_load;
        self.time += params.time_step;
        self.step_count += 1;

        log::debug!("Step {} {}", self.step_count, timings);

        Ok(StepResult {
            displacement,
            increment,
            load: load_magnitude,
            residual_norm,
            energy,
            linsolve,
            timings,
        })
    }
}
