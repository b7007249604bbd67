//! As-Rigid-As-Possible energy model for tetrahedral meshes.
//!
//! The energy density is `Ψ(F) = μ/2 ‖F − R‖²` where `R` is the rotation of the polar
//! decomposition of `F`. The stress derivative is assembled from the analytic eigensystem of the
//! ARAP Hessian, with the twist eigenvalues clamped so the result is always positive
//! semidefinite. See "Analytic Eigensystems for Isotropic Distortion Energies" by Smith et al.

use na::{Matrix3, Vector3};

use super::{MaterialResponse, StressModel};
use crate::matrix::{flatten, Matrix9};

/// Singular value decomposition `F = U Σ Vᵀ` where `U` and `V` are proper rotations.
///
/// Any reflection in `F` is absorbed into the sign of the smallest singular value.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct RotationVariantSvd {
    pub u: Matrix3<f64>,
    pub sigma: Vector3<f64>,
    pub v: Matrix3<f64>,
}

impl RotationVariantSvd {
    /// The rotation `R = U Vᵀ` closest to the decomposed matrix.
    #[inline]
    pub fn rotation(&self) -> Matrix3<f64> {
        self.u * self.v.transpose()
    }
}

/// Compute the rotation-variant SVD of `F`.
///
/// Returns `None` if `F` has non-finite entries or the decomposition fails to converge.
#[allow(non_snake_case)]
pub fn rotation_variant_svd(F: &Matrix3<f64>) -> Option<RotationVariantSvd> {
    if !F.iter().all(|x| x.is_finite()) {
        return None;
    }

    let svd = na::SVD::try_new(*F, true, true, f64::EPSILON, 0)?;
    let mut u = svd.u?;
    let mut v = svd.v_t?.transpose();
    let mut sigma = svd.singular_values;

    let smallest = sigma.imin();
    if u.determinant() < 0.0 {
        negate_column(&mut u, smallest);
        sigma[smallest] = -sigma[smallest];
    }
    if v.determinant() < 0.0 {
        negate_column(&mut v, smallest);
        sigma[smallest] = -sigma[smallest];
    }

    Some(RotationVariantSvd { u, sigma, v })
}

#[inline]
fn negate_column(m: &mut Matrix3<f64>, col: usize) {
    m.column_mut(col).iter_mut().for_each(|x| *x = -*x);
}

/// Rotational part `R` of the polar decomposition `F = R S`.
///
/// `R` is a proper rotation for every finite input, including inverted and degenerate ones.
/// Non-finite inputs produce a NaN matrix.
#[allow(non_snake_case)]
pub fn polar_rotation(F: &Matrix3<f64>) -> Matrix3<f64> {
    rotation_variant_svd(F)
        .map(|svd| svd.rotation())
        .unwrap_or_else(|| Matrix3::from_element(f64::NAN))
}

/// Weight `λ` applied to the twist eigenvector whose invariant is `invariant`.
///
/// For `I ≥ 2` the ARAP Hessian has eigenvalue `μ(1 − 2/I) ≥ 0` along the twist, given by
/// `λ = 2/I`. Below that the eigenvalue would be negative and is clamped to zero with `λ = 1`.
#[inline]
pub fn twist_eigenvalue_weight(invariant: f64) -> f64 {
    if invariant >= 2.0 {
        2.0 / invariant
    } else {
        1.0
    }
}

/// Strain energy density `μ/2 ‖F − R‖²`.
#[allow(non_snake_case)]
pub fn arap_energy_density(F: &Matrix3<f64>, mu: f64) -> f64 {
    0.5 * mu * (F - polar_rotation(F)).norm_squared()
}

/// First Piola-Kirchhoff stress `P = μ(F − R)`.
#[allow(non_snake_case)]
pub fn arap_stress(F: &Matrix3<f64>, mu: f64) -> Matrix3<f64> {
    (F - polar_rotation(F)) * mu
}

/// Twist generators in the xy, yz and xz planes respectively.
fn twist_generators() -> [Matrix3<f64>; 3] {
    [
        Matrix3::new(0.0, -1.0, 0.0, 1.0, 0.0, 0.0, 0.0, 0.0, 0.0),
        Matrix3::new(0.0, 0.0, 0.0, 0.0, 0.0, 1.0, 0.0, -1.0, 0.0),
        Matrix3::new(0.0, 0.0, 1.0, 0.0, 0.0, 0.0, -1.0, 0.0, 0.0),
    ]
}

/// Energy density, stress and projected stress derivative
/// `∂P/∂F = μ(I₉ − Σᵢ λᵢ qᵢ qᵢᵀ)` computed from a single SVD.
///
/// If the decomposition fails (for instance because `F` contains NaNs) every output is NaN so
/// the failure surfaces downstream instead of being silently replaced.
#[allow(non_snake_case)]
pub fn arap_stress_and_derivative(F: &Matrix3<f64>, mu: f64) -> MaterialResponse {
    let svd = match rotation_variant_svd(F) {
        Some(svd) => svd,
        None => {
            return MaterialResponse {
                energy_density: f64::NAN,
                stress: Matrix3::from_element(f64::NAN),
                stress_derivative: Matrix9::from_element(f64::NAN),
            }
        }
    };

    let R = svd.rotation();
    let F_minus_R = F - R;

    let s = svd.sigma;
    let invariants = [s[0] + s[1], s[1] + s[2], s[0] + s[2]];

    let mut dPdF = Matrix9::identity();
    let scale = std::f64::consts::FRAC_1_SQRT_2;
    for (T, &I) in twist_generators().iter().zip(invariants.iter()) {
        let q = flatten(&(svd.u * T * svd.v.transpose() * scale));
        dPdF -= q * q.transpose() * twist_eigenvalue_weight(I);
    }

    MaterialResponse {
        energy_density: 0.5 * mu * F_minus_R.norm_squared(),
        stress: F_minus_R * mu,
        stress_derivative: dPdF * mu,
    }
}

/// ARAP material parameterized by its shear modulus.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct ArapMaterial {
    pub mu: f64,
}

impl ArapMaterial {
    pub fn new(mu: f64) -> Self {
        ArapMaterial { mu }
    }
}

impl StressModel for ArapMaterial {
    #[allow(non_snake_case)]
    fn energy_density(&self, F: &Matrix3<f64>) -> f64 {
        arap_energy_density(F, self.mu)
    }
    #[allow(non_snake_case)]
    fn stress(&self, F: &Matrix3<f64>) -> Matrix3<f64> {
        arap_stress(F, self.mu)
    }
    #[allow(non_snake_case)]
    fn response(&self, F: &Matrix3<f64>) -> MaterialResponse {
        arap_stress_and_derivative(F, self.mu)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use rand::distributions::{Distribution, Uniform};
    use rand::prelude::*;

    fn random_matrices(n: usize) -> Vec<Matrix3<f64>> {
        let mut rng = StdRng::seed_from_u64(42);
        let range = Uniform::new(-2.0, 2.0);
        (0..n)
            .map(|_| Matrix3::from_fn(|_, _| range.sample(&mut rng)))
            .collect()
    }

    /// A deformation gradient with every twist invariant above 2, where the clamp is inactive.
    fn stretched_deformation() -> Matrix3<f64> {
        let rot = na::Rotation3::from_euler_angles(0.3, -0.5, 0.8).into_inner();
        let perturb = Matrix3::new(0.01, -0.02, 0.005, 0.0, 0.015, -0.01, 0.02, 0.0, -0.005);
        rot * Matrix3::from_diagonal(&Vector3::new(1.3, 1.2, 1.15)) + perturb
    }

    fn assert_proper_rotation(r: &Matrix3<f64>) {
        assert_relative_eq!(r.transpose() * r, Matrix3::identity(), epsilon = 1e-10);
        assert_relative_eq!(r.determinant(), 1.0, epsilon = 1e-10);
    }

    #[test]
    fn rotation_is_proper() {
        let mut cases = random_matrices(100);
        // Inverted.
        cases.push(Matrix3::from_diagonal(&Vector3::new(1.0, 2.0, -0.5)));
        cases.push(-Matrix3::identity());
        // Flat and nearly flat.
        cases.push(Matrix3::from_diagonal(&Vector3::new(1.0, 1.0, 1e-14)));
        cases.push(Matrix3::new(1.0, 0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 0.0));
        // Tiny.
        cases.push(stretched_deformation() * 1e-9);

        for f in cases.iter() {
            let svd = rotation_variant_svd(f).unwrap();
            assert_proper_rotation(&svd.u);
            assert_proper_rotation(&svd.v);
            assert_proper_rotation(&polar_rotation(f));
            let reconstructed = svd.u * Matrix3::from_diagonal(&svd.sigma) * svd.v.transpose();
            assert_relative_eq!(reconstructed, *f, epsilon = 1e-10);
        }
    }

    #[test]
    fn inverted_element_has_negative_singular_value() {
        let f = Matrix3::from_diagonal(&Vector3::new(2.0, 1.5, -0.5));
        let svd = rotation_variant_svd(&f).unwrap();
        let mut sigma: Vec<_> = svd.sigma.iter().copied().collect();
        sigma.sort_by(|a, b| a.partial_cmp(b).unwrap());
        assert_relative_eq!(sigma[0], -0.5, epsilon = 1e-12);
        assert_relative_eq!(sigma[1], 1.5, epsilon = 1e-12);
        assert_relative_eq!(sigma[2], 2.0, epsilon = 1e-12);
    }

    #[test]
    fn non_finite_input() {
        let mut f = Matrix3::identity();
        f[(1, 2)] = f64::NAN;
        assert!(rotation_variant_svd(&f).is_none());
        let response = arap_stress_and_derivative(&f, 1.0);
        assert!(response.energy_density.is_nan());
        assert!(response.stress.iter().all(|x| x.is_nan()));
        assert!(response.stress_derivative.iter().all(|x| x.is_nan()));
    }

    #[test]
    fn eigenvalue_clamp() {
        assert_eq!(twist_eigenvalue_weight(2.0), 1.0);
        assert_eq!(twist_eigenvalue_weight(1.999), 1.0);
        assert_eq!(twist_eigenvalue_weight(0.0), 1.0);
        assert_eq!(twist_eigenvalue_weight(-1.0), 1.0);
        assert_relative_eq!(twist_eigenvalue_weight(2.5), 0.8);
        assert_relative_eq!(twist_eigenvalue_weight(4.0), 0.5);
    }

    #[test]
    fn rotations_are_stress_free() {
        let mu = 3.0;
        let r = na::Rotation3::from_axis_angle(&Vector3::y_axis(), 0.7).into_inner();
        let response = arap_stress_and_derivative(&r, mu);
        assert_relative_eq!(response.energy_density, 0.0, epsilon = 1e-12);
        assert_relative_eq!(response.stress, Matrix3::zeros(), epsilon = 1e-12);
    }

    #[test]
    fn stress_is_energy_gradient() {
        let mu = 2.5;
        let f = stretched_deformation();
        let p = arap_stress(&f, mu);
        let h = 1e-6;
        for j in 0..3 {
            for i in 0..3 {
                let mut fp = f;
                let mut fm = f;
                fp[(i, j)] += h;
                fm[(i, j)] -= h;
                let fd = (arap_energy_density(&fp, mu) - arap_energy_density(&fm, mu)) / (2.0 * h);
                assert_relative_eq!(p[(i, j)], fd, epsilon = 1e-7);
            }
        }
    }

    #[test]
    fn stress_derivative_matches_finite_difference() {
        let mu = 2.5;
        let f = stretched_deformation();
        let svd = rotation_variant_svd(&f).unwrap();
        let s = svd.sigma;
        assert!(s[0] + s[1] >= 2.0 && s[1] + s[2] >= 2.0 && s[0] + s[2] >= 2.0);

        let dpdf = arap_stress_and_derivative(&f, mu).stress_derivative;
        let h = 1e-6;
        for col in 0..9 {
            let mut fp = f;
            let mut fm = f;
            fp[(col % 3, col / 3)] += h;
            fm[(col % 3, col / 3)] -= h;
            let fd = (flatten(&arap_stress(&fp, mu)) - flatten(&arap_stress(&fm, mu))) / (2.0 * h);
            for row in 0..9 {
                assert_relative_eq!(dpdf[(row, col)], fd[row], epsilon = 1e-6);
            }
        }
    }

    #[test]
    fn stress_derivative_is_positive_semidefinite() {
        let mu = 1.5;
        for f in random_matrices(50).into_iter() {
            let dpdf = arap_stress_and_derivative(&f, mu).stress_derivative;
            assert_relative_eq!(dpdf, dpdf.transpose(), epsilon = 1e-10);
            let eigen = na::SymmetricEigen::new(dpdf);
            assert!(eigen.eigenvalues.min() >= -1e-10 * mu);
        }
    }

    #[test]
    fn material_trait_dispatch() {
        let material = ArapMaterial::new(4.0);
        let f = stretched_deformation();
        let response = material.response(&f);
        assert_relative_eq!(response.energy_density, material.energy_density(&f), epsilon = 1e-12);
        assert_relative_eq!(response.stress, material.stress(&f), epsilon = 1e-12);
    }
}
