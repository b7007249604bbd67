//! Small dense element matrices and the global sparse stiffness matrix.

use na::Matrix3;
use rayon::prelude::*;
use sprs::{CsMat, TriMat};

pub type Matrix9 = na::SMatrix<f64, 9, 9>;
pub type Matrix9x12 = na::SMatrix<f64, 9, 12>;
pub type Matrix12 = na::SMatrix<f64, 12, 12>;
pub type Vector9 = na::SVector<f64, 9>;
pub type Vector12 = na::SVector<f64, 12>;

/// Number of stiffness entries contributed by a single tetrahedron.
pub const NUM_ENTRIES_PER_TET: usize = 144;

/// Stack the columns of a 3x3 matrix into a 9-vector.
#[inline]
pub fn flatten(m: &Matrix3<f64>) -> Vector9 {
    Vector9::from_column_slice(m.as_slice())
}

/// Inverse of `flatten`.
#[inline]
pub fn unflatten(v: &Vector9) -> Matrix3<f64> {
    Matrix3::from_column_slice(v.as_slice())
}

/// Global stiffness matrix in CSR format with a sparsity pattern fixed at construction.
///
/// The pattern contains the full diagonal together with every DOF pair coupled by an element,
/// which means values can be cleared and re-accumulated every step without reallocating.
#[derive(Clone, Debug)]
pub struct StiffnessMatrix {
    mtx: CsMat<f64>,
    /// Row index of each stored value.
    rows: Vec<usize>,
    /// Column index of each stored value.
    cols: Vec<usize>,
    /// Position of each diagonal entry in the value array.
    diagonal: Vec<usize>,
    /// For each element, the position of each local entry (row-major 12x12) in the value array.
    element_entries: Vec<[usize; NUM_ENTRIES_PER_TET]>,
}

impl StiffnessMatrix {
    /// Build the sparsity pattern for `num_dofs` unknowns coupled by elements whose vertices
    /// start at the given DOF offsets.
    pub fn new(num_dofs: usize, element_dofs: &[[usize; 4]]) -> Self {
        let mut tri = TriMat::with_capacity(
            (num_dofs, num_dofs),
            num_dofs + NUM_ENTRIES_PER_TET * element_dofs.len(),
        );
        for dof in 0..num_dofs {
            tri.add_triplet(dof, dof, 1.0);
        }
        for dofs in element_dofs.iter() {
            for_each_local_entry(dofs, |_, row, col| tri.add_triplet(row, col, 1.0));
        }

        let mut mtx: CsMat<f64> = tri.to_csr();
        mtx.data_mut().iter_mut().for_each(|v| *v = 0.0);

        let mut rows = Vec::with_capacity(mtx.nnz());
        let mut cols = Vec::with_capacity(mtx.nnz());
        for (row, row_vec) in mtx.outer_iterator().enumerate() {
            for (col, _) in row_vec.iter() {
                rows.push(row);
                cols.push(col);
            }
        }

        let nnz_index = |row: usize, col: usize| {
            mtx.nnz_index(row, col)
                .expect("entry missing from the stiffness sparsity pattern")
                .0
        };

        let diagonal = (0..num_dofs).map(|dof| nnz_index(dof, dof)).collect();

        let element_entries = element_dofs
            .iter()
            .map(|dofs| {
                let mut entries = [0; NUM_ENTRIES_PER_TET];
                for_each_local_entry(dofs, |local, row, col| entries[local] = nnz_index(row, col));
                entries
            })
            .collect();

        StiffnessMatrix {
            mtx,
            rows,
            cols,
            diagonal,
            element_entries,
        }
    }

    #[inline]
    pub fn num_rows(&self) -> usize {
        self.mtx.rows()
    }

    /// Number of stored entries, including explicit zeros.
    #[inline]
    pub fn nnz(&self) -> usize {
        self.mtx.nnz()
    }

    /// The underlying CSR matrix.
    #[inline]
    pub fn as_csr(&self) -> &CsMat<f64> {
        &self.mtx
    }

    /// The value at `(row, col)`, or zero outside the sparsity pattern.
    pub fn get(&self, row: usize, col: usize) -> f64 {
        self.mtx.get(row, col).copied().unwrap_or(0.0)
    }

    /// Zero out all values while keeping the sparsity pattern.
    pub fn clear(&mut self) {
        self.mtx.data_mut().par_iter_mut().for_each(|v| *v = 0.0);
    }

    /// Accumulate a row-major 12x12 local stiffness block for the given element.
    pub fn add_element_block(&mut self, element: usize, block: &Matrix12) {
        let entries = &self.element_entries[element];
        let values = self.mtx.data_mut();
        for r in 0..12 {
            for c in 0..12 {
                values[entries[12 * r + c]] += block[(r, c)];
            }
        }
    }

    /// Mutable access to the diagonal value of the given DOF.
    #[inline]
    pub fn diagonal_mut(&mut self, dof: usize) -> &mut f64 {
        let idx = self.diagonal[dof];
        &mut self.mtx.data_mut()[idx]
    }

    /// Call `f` with `(row, col, value)` for every stored entry.
    pub fn for_each_entry_mut(&mut self, mut f: impl FnMut(usize, usize, &mut f64)) {
        let StiffnessMatrix {
            mtx, rows, cols, ..
        } = self;
        for ((&row, &col), value) in rows.iter().zip(cols.iter()).zip(mtx.data_mut().iter_mut()) {
            f(row, col, value);
        }
    }

    /// Compute `out = self * x`.
    pub fn mul_vec(&self, x: &[f64], out: &mut [f64]) {
        debug_assert_eq!(x.len(), self.mtx.cols());
        debug_assert_eq!(out.len(), self.mtx.rows());
        let mtx = &self.mtx;
        out.par_iter_mut().enumerate().for_each(|(row, out)| {
            *out = mtx
                .outer_view(row)
                .map(|row_vec| row_vec.iter().map(|(col, &v)| v * x[col]).sum::<f64>())
                .unwrap_or(0.0);
        });
    }

    /// Returns true if `|A(i,j) - A(j,i)| <= tol` for all stored entries.
    pub fn is_symmetric(&self, tol: f64) -> bool {
        self.rows
            .iter()
            .zip(self.cols.iter())
            .zip(self.mtx.data().iter())
            .all(|((&row, &col), &v)| (v - self.get(col, row)).abs() <= tol)
    }

    /// Copy into a dense matrix. Intended for debugging and tests on small systems.
    pub fn to_dense(&self) -> na::DMatrix<f64> {
        let n = self.num_rows();
        let mut dense = na::DMatrix::zeros(n, n);
        for ((&row, &col), &v) in self
            .rows
            .iter()
            .zip(self.cols.iter())
            .zip(self.mtx.data().iter())
        {
            dense[(row, col)] += v;
        }
        dense
    }
}

/// Enumerate the 144 entries of a tetrahedron's 12x12 block as `(local index, row, col)`.
#[inline]
fn for_each_local_entry(dofs: &[usize; 4], mut f: impl FnMut(usize, usize, usize)) {
    for a in 0..4 {
        for i in 0..3 {
            let local_row = 3 * a + i;
            for b in 0..4 {
                for j in 0..3 {
                    let local_col = 3 * b + j;
                    f(12 * local_row + local_col, dofs[a] + i, dofs[b] + j);
                }
            }
        }
    }
}
