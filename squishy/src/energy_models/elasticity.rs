use na::Matrix3;

use crate::matrix::Matrix9;

mod tet_arap;

pub use tet_arap::*;

/// Stress and stress derivative evaluated at a single deformation gradient.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct MaterialResponse {
    /// Strain energy per unit rest volume.
    pub energy_density: f64,
    /// First Piola-Kirchhoff stress `P`.
    pub stress: Matrix3<f64>,
    /// Derivative of `vec(P)` with respect to `vec(F)`, both flattened column-major.
    pub stress_derivative: Matrix9,
}

/// Hyperelastic material interface used by element assembly.
///
/// Implementors are pure functions of the deformation gradient, so a single instance is shared
/// across all elements and threads.
pub trait StressModel: Sync {
    /// Strain energy density `Ψ(F)`.
    #[allow(non_snake_case)]
    fn energy_density(&self, F: &Matrix3<f64>) -> f64;

    /// First Piola-Kirchhoff stress `∂Ψ/∂F`.
    #[allow(non_snake_case)]
    fn stress(&self, F: &Matrix3<f64>) -> Matrix3<f64>;

    /// Energy, stress and a positive semidefinite approximation of `∂P/∂F` in one pass.
    #[allow(non_snake_case)]
    fn response(&self, F: &Matrix3<f64>) -> MaterialResponse;
}
