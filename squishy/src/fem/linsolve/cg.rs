use super::{SolveResult, Status};

/// Implementation of the conjugate gradient method.
///
/// Solves `Ax = b` where `A` is symmetric and definite. Both positive and negative definite
/// matrices are handled since only the sign of `pᵀAp` changes between the two.
/// https://en.wikipedia.org/wiki/Conjugate_gradient_method
#[allow(non_snake_case)]
pub struct ConjugateGradient {
    max_iter: u32,
    tol: f64,
    r: na::DVector<f64>,
    p: na::DVector<f64>,
    Ap: na::DVector<f64>,
}

impl ConjugateGradient {
    #[allow(non_snake_case)]
    pub fn new(size: usize, max_iter: u32, tol: f64) -> Self {
        let r = na::DVector::zeros(size);
        let p = r.clone();
        let Ap = r.clone();

        ConjugateGradient {
            max_iter,
            tol: f64::EPSILON.max(tol),
            r,
            p,
            Ap,
        }
    }

    /// Solves `Ax = b` where the product `Ax` is provided by the function `matvec`.
    ///
    /// `x` is used as the initial guess. `matvec` takes in a vector and the output mutable slice.
    /// If `matvec` returns false, then the computation stops and the `SolveResult` will report an
    /// interrupted status. The iteration stops once `|r| <= tol * |b|`.
    #[allow(non_snake_case)]
    pub fn solve<F>(&mut self, mut matvec: F, x: &mut [f64], b: &[f64]) -> SolveResult
    where
        F: FnMut(&[f64], &mut [f64]) -> bool,
    {
        let ConjugateGradient {
            max_iter,
            tol,
            ref mut r,
            ref mut p,
            ref mut Ap,
        } = *self;

        debug_assert_eq!(b.len(), x.len());
        debug_assert_eq!(r.len(), x.len());

        let mut x: na::DVectorViewMut<f64> = x.into();
        let b: na::DVectorView<f64> = b.into();

        let b_norm_sq = b.norm_squared();
        let b_norm = b_norm_sq.sqrt();
        let result = |iterations, r_norm_sq: f64, status| {
            let residual = r_norm_sq.sqrt();
            SolveResult {
                iterations,
                residual,
                error: if b_norm > 0.0 { residual / b_norm } else { residual },
                status,
            }
        };

        if !b_norm_sq.is_finite() {
            return result(0, f64::NAN, Status::NanDetected);
        }

        // r0 = b - A*x0
        if !matvec(x.as_slice(), Ap.as_mut_slice()) {
            // Residual is unknown at this point.
            return result(0, 0.0, Status::Interrupted);
        }
        r.copy_from(&b);
        r.axpy(-1.0, Ap, 1.0);

        let mut r_norm_sq = r.norm_squared();
        if !r_norm_sq.is_finite() {
            return result(0, r_norm_sq, Status::NanDetected);
        }

        let tol_sq = tol * tol * b_norm_sq;
        if r_norm_sq <= tol_sq {
            return result(0, r_norm_sq, Status::Success);
        }

        // p0 = r0
        p.copy_from(r);

        let mut iterations = 0;
        loop {
            if iterations >= max_iter {
                return result(iterations, r_norm_sq, Status::MaximumIterationsExceeded);
            }

            if !matvec(p.as_slice(), Ap.as_mut_slice()) {
                return result(iterations, r_norm_sq, Status::Interrupted);
            }

            let pAp = p.dot(Ap);
            if !pAp.is_finite() {
                return result(iterations, f64::NAN, Status::NanDetected);
            }
            if pAp == 0.0 {
                return result(iterations, r_norm_sq, Status::SingularMatrix);
            }

            // α = rᵀr / pᵀAp
            let alpha = r_norm_sq / pAp;

            // x = x + α * p
            x.axpy(alpha, p, 1.0);

            // r = r - α * Ap
            r.axpy(-alpha, Ap, 1.0);

            iterations += 1;

            let r_norm_sq_new = r.norm_squared();
            if !r_norm_sq_new.is_finite() {
                return result(iterations, r_norm_sq_new, Status::NanDetected);
            }
            if r_norm_sq_new <= tol_sq {
                return result(iterations, r_norm_sq_new, Status::Success);
            }

            let beta = r_norm_sq_new / r_norm_sq;
            r_norm_sq = r_norm_sq_new;

            // p = r + βp
            p.axpy(1.0, r, beta);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn dense_matvec<'a>(mtx: &'a [f64], n: usize) -> impl FnMut(&[f64], &mut [f64]) -> bool + 'a {
        move |x, out| {
            for (row, out) in out.iter_mut().enumerate() {
                *out = (0..n).map(|col| mtx[row * n + col] * x[col]).sum();
            }
            true
        }
    }

    #[test]
    fn cg_simple() {
        // Test that CG works with a simple symmetric 2x2 system.
        let mtx = vec![4.0, 1.0, 1.0, 3.0];
        let b = vec![1.0, 2.0];
        let mut x = vec![0.0, 0.0];

        let mut cg = ConjugateGradient::new(2, 100, 1e-10);
        let result = cg.solve(dense_matvec(&mtx, 2), &mut x, &b);

        assert_eq!(result.status, Status::Success);
        assert!(result.iterations <= 2);
        assert_relative_eq!(x[0], 1.0 / 11.0, epsilon = 1e-9);
        assert_relative_eq!(x[1], 7.0 / 11.0, epsilon = 1e-9);
    }

    #[test]
    fn cg_negative_definite() {
        let mtx = vec![-4.0, 1.0, 0.0, 1.0, -3.0, 1.0, 0.0, 1.0, -2.0];
        let b = vec![1.0, -2.0, 0.5];
        let mut x = vec![0.0; 3];

        let mut cg = ConjugateGradient::new(3, 100, 1e-12);
        let result = cg.solve(dense_matvec(&mtx, 3), &mut x, &b);
        assert_eq!(result.status, Status::Success);

        let mut ax = vec![0.0; 3];
        dense_matvec(&mtx, 3)(&x, &mut ax);
        for (ax, b) in ax.iter().zip(b.iter()) {
            assert_relative_eq!(*ax, *b, epsilon = 1e-10);
        }
    }

    #[test]
    fn zero_rhs() {
        let mtx = vec![2.0, 0.0, 0.0, 2.0];
        let mut x = vec![0.0; 2];
        let mut cg = ConjugateGradient::new(2, 10, 1e-8);
        let result = cg.solve(dense_matvec(&mtx, 2), &mut x, &[0.0, 0.0]);
        assert_eq!(result.status, Status::Success);
        assert_eq!(result.iterations, 0);
        assert_eq!(x, vec![0.0, 0.0]);
    }

    #[test]
    fn failure_modes() {
        let b = vec![1.0, 1.0, 1.0];

        // NaN in the matrix.
        let mtx = vec![1.0, 0.0, 0.0, 0.0, f64::NAN, 0.0, 0.0, 0.0, 1.0];
        let mut x = vec![0.0; 3];
        let mut cg = ConjugateGradient::new(3, 10, 1e-8);
        let result = cg.solve(dense_matvec(&mtx, 3), &mut x, &b);
        assert_eq!(result.status, Status::NanDetected);
        assert!(!result.status.is_usable());

        // NaN in the right-hand side.
        let mut x = vec![0.0; 3];
        let result = cg.solve(dense_matvec(&mtx, 3), &mut x, &[0.0, f64::NAN, 0.0]);
        assert_eq!(result.status, Status::NanDetected);

        // Singular.
        let zero = vec![0.0; 9];
        let mut x = vec![0.0; 3];
        let result = cg.solve(dense_matvec(&zero, 3), &mut x, &b);
        assert_eq!(result.status, Status::SingularMatrix);

        // Interrupted.
        let mut x = vec![0.0; 3];
        let result = cg.solve(|_, _| false, &mut x, &b);
        assert_eq!(result.status, Status::Interrupted);

        // Iteration cap.
        let mtx = vec![4.0, 1.0, 0.0, 1.0, 3.0, 1.0, 0.0, 1.0, 2.0];
        let mut x = vec![0.0; 3];
        let mut cg = ConjugateGradient::new(3, 1, 1e-12);
        let result = cg.solve(dense_matvec(&mtx, 3), &mut x, &b);
        assert_eq!(result.status, Status::MaximumIterationsExceeded);
        assert_eq!(result.iterations, 1);
        assert!(result.status.is_usable());
    }
}
