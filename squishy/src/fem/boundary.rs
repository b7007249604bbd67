use serde::{Deserialize, Serialize};

use crate::matrix::StiffnessMatrix;
use crate::Error;

/// How fixed vertices are imposed on the linear system of each step.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConstraintMode {
    /// Zero the rows and columns of fixed DOFs, put 1 on their diagonal and 0 in the right-hand
    /// side. The system stays symmetric and fixed DOFs receive exactly zero correction.
    Eliminate,
    /// Only overwrite the diagonal with 1 and the right-hand side with 0, keeping couplings to
    /// free DOFs. Fixed DOFs may drift.
    DiagonalOnly,
}

impl Default for ConstraintMode {
    fn default() -> Self {
        ConstraintMode::Eliminate
    }
}

/// Set of vertices held at their rest positions.
#[derive(Clone, Debug, PartialEq)]
pub struct BoundaryConditions {
    /// Sorted and deduplicated.
    fixed_vertices: Vec<usize>,
    /// One flag per DOF.
    fixed_dofs: Vec<bool>,
}

impl BoundaryConditions {
    pub fn new(
        fixed_vertices: impl IntoIterator<Item = usize>,
        num_vertices: usize,
    ) -> Result<Self, Error> {
        let mut fixed_vertices: Vec<_> = fixed_vertices.into_iter().collect();
        fixed_vertices.sort_unstable();
        fixed_vertices.dedup();

        if let Some(&index) = fixed_vertices.last().filter(|&&i| i >= num_vertices) {
            return Err(Error::VertexIndexOutOfBounds {
                index,
                num_vertices,
            });
        }

        let mut fixed_dofs = vec![false; 3 * num_vertices];
        for &v in fixed_vertices.iter() {
            fixed_dofs[3 * v..3 * v + 3]
                .iter_mut()
                .for_each(|f| *f = true);
        }

        Ok(BoundaryConditions {
            fixed_vertices,
            fixed_dofs,
        })
    }

    #[inline]
    pub fn fixed_vertices(&self) -> &[usize] {
        &self.fixed_vertices
    }

    #[inline]
    pub fn is_fixed_dof(&self, dof: usize) -> bool {
        self.fixed_dofs.get(dof).copied().unwrap_or(false)
    }

    #[inline]
    pub fn is_fixed_vertex(&self, vertex: usize) -> bool {
        self.fixed_vertices.binary_search(&vertex).is_ok()
    }

    /// Euclidean norm of `v` restricted to free DOFs.
    pub fn free_norm(&self, v: &[f64]) -> f64 {
        v.iter()
            .zip(self.fixed_dofs.iter())
            .filter(|(_, &fixed)| !fixed)
            .map(|(x, _)| x * x)
            .sum::<f64>()
            .sqrt()
    }

    /// Zero every fixed entry of the DOF vector `v`.
    pub fn zero_fixed(&self, v: &mut [f64]) {
        for (x, _) in v
            .iter_mut()
            .zip(self.fixed_dofs.iter())
            .filter(|(_, &fixed)| fixed)
        {
            *x = 0.0;
        }
    }
}

/// Impose Dirichlet conditions on the assembled system `k u = rhs`.
pub fn enforce_boundary_conditions(
    k: &mut StiffnessMatrix,
    rhs: &mut [f64],
    bc: &BoundaryConditions,
    mode: ConstraintMode,
) {
    match mode {
        ConstraintMode::Eliminate => {
            let fixed = &bc.fixed_dofs;
            k.for_each_entry_mut(|row, col, value| {
                if fixed[row] || fixed[col] {
                    *value = if row == col { 1.0 } else { 0.0 };
                }
            });
        }
        ConstraintMode::DiagonalOnly => {
            for &v in bc.fixed_vertices.iter() {
                for dof in 3 * v..3 * v + 3 {
                    *k.diagonal_mut(dof) = 1.0;
                }
            }
        }
    }
    bc.zero_fixed(rhs);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::matrix::Matrix12;

    fn two_tet_system() -> (StiffnessMatrix, Vec<f64>) {
        let mut k = StiffnessMatrix::new(15, &[[0, 3, 6, 9], [3, 6, 9, 12]]);
        let block = Matrix12::from_fn(|r, c| -1.0 - (r.min(c) as f64) / (1.0 + r.max(c) as f64));
        k.add_element_block(0, &block);
        k.add_element_block(1, &block);
        (k, (0..15).map(|i| i as f64 + 1.0).collect())
    }

    #[test]
    fn sorted_and_deduplicated() {
        let bc = BoundaryConditions::new(vec![3, 1, 3, 0], 4).unwrap();
        assert_eq!(bc.fixed_vertices(), &[0, 1, 3]);
        assert!(bc.is_fixed_dof(5));
        assert!(!bc.is_fixed_dof(6));
        assert!(!bc.is_fixed_dof(100));
        assert!(bc.is_fixed_vertex(3));
        assert!(!bc.is_fixed_vertex(2));

        assert!(matches!(
            BoundaryConditions::new(vec![0, 4], 4),
            Err(Error::VertexIndexOutOfBounds {
                index: 4,
                num_vertices: 4
            })
        ));
    }

    #[test]
    fn free_norm_ignores_fixed() {
        let bc = BoundaryConditions::new(vec![0], 2).unwrap();
        let v = [100.0, 100.0, 100.0, 3.0, 0.0, 4.0];
        assert_eq!(bc.free_norm(&v), 5.0);
    }

    #[test]
    fn eliminate() {
        let (mut k, mut rhs) = two_tet_system();
        let bc = BoundaryConditions::new(vec![1], 5).unwrap();
        enforce_boundary_conditions(&mut k, &mut rhs, &bc, ConstraintMode::Eliminate);

        for fixed in 3..6 {
            assert_eq!(rhs[fixed], 0.0);
            for other in 0..15 {
                let expected = if fixed == other { 1.0 } else { 0.0 };
                assert_eq!(k.get(fixed, other), expected);
                assert_eq!(k.get(other, fixed), expected);
            }
        }
        assert_eq!(rhs[0], 1.0);
        assert!(k.get(0, 6) != 0.0);
        assert!(k.is_symmetric(0.0));
    }

    #[test]
    fn diagonal_only() {
        let (mut k, mut rhs) = two_tet_system();
        let before = k.clone();
        let bc = BoundaryConditions::new(vec![1], 5).unwrap();
        enforce_boundary_conditions(&mut k, &mut rhs, &bc, ConstraintMode::DiagonalOnly);

        for fixed in 3..6 {
            assert_eq!(rhs[fixed], 0.0);
            assert_eq!(k.get(fixed, fixed), 1.0);
        }
        // Couplings are kept.
        assert_eq!(k.get(3, 4), before.get(3, 4));
        assert_eq!(k.get(0, 3), before.get(0, 3));
        assert!(k.get(0, 3) != 0.0);
    }
}
