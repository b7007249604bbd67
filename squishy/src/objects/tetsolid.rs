use na::{Matrix3, Vector3};
use rayon::prelude::*;

use crate::matrix::Matrix9x12;
use crate::mesh::VolumetricMesh;
use crate::Error;

/// Relative tolerance on `|det Dm|` below which a reference element is considered degenerate.
pub const DEGENERACY_TOLERANCE: f64 = 1e-12;

/// Precomputed reference data for every tetrahedron in a mesh.
///
/// Stored as a structure of arrays, indexed by element.
#[derive(Clone, Debug)]
pub struct TetElements {
    /// Vertex indices of each tet.
    pub tets: Vec<[usize; 4]>,
    /// Reference volume of each tet.
    pub ref_volume: Vec<f64>,
    /// Inverse of the reference shape matrix `Dm` of each tet.
    pub ref_shape_mtx_inv: Vec<Matrix3<f64>>,
    /// Constant Jacobian `∂vec(F)/∂x` of each tet, mapping its 12 vertex DOFs to `vec(F)`.
    pub deformation_gradient_jacobian: Vec<Matrix9x12>,
}

/// Shape matrix `[x1 − x0, x2 − x0, x3 − x0]` of a tetrahedron.
#[inline]
pub fn shape_matrix(pos: &[[f64; 3]; 4]) -> Matrix3<f64> {
    let [x0, x1, x2, x3] = pos.map(Vector3::from);
    Matrix3::from_columns(&[x1 - x0, x2 - x0, x3 - x0])
}

/// Longest of the 6 edges of a tetrahedron.
fn max_edge_length(pos: &[[f64; 3]; 4]) -> f64 {
    let v = pos.map(Vector3::from);
    let mut max = 0.0_f64;
    for i in 0..4 {
        for j in i + 1..4 {
            max = max.max((v[j] - v[i]).norm());
        }
    }
    max
}

/// Build the 9x12 matrix `∂vec(F)/∂x` for a tet with the given inverse reference shape matrix.
///
/// `vec(F)` is column-major: row `3c + r` holds `F(r, c)`. Column `3v + r` holds the derivative
/// with respect to coordinate `r` of vertex `v`.
#[allow(non_snake_case)]
pub fn deformation_gradient_jacobian(DmInv: &Matrix3<f64>) -> Matrix9x12 {
    let mut dFdx = Matrix9x12::zeros();
    for c in 0..3 {
        let col_sum = DmInv[(0, c)] + DmInv[(1, c)] + DmInv[(2, c)];
        for r in 0..3 {
            let row = 3 * c + r;
            dFdx[(row, r)] = -col_sum;
            for k in 0..3 {
                dFdx[(row, 3 * (k + 1) + r)] = DmInv[(k, c)];
            }
        }
    }
    dFdx
}

impl TetElements {
    /// Precompute reference quantities for every tet in `mesh`.
    ///
    /// Fails with `DegenerateElement` listing every tet whose `|det Dm|` does not exceed
    /// `DEGENERACY_TOLERANCE` times its longest edge cubed.
    pub fn new(mesh: &VolumetricMesh) -> Result<Self, Error> {
        let ref_pos: Vec<[[f64; 3]; 4]> = mesh
            .cells()
            .iter()
            .map(|cell| cell.map(|v| mesh.vertex_positions()[v]))
            .collect();

        let degens: Vec<_> = ref_pos
            .iter()
            .enumerate()
            .filter_map(|(i, pos)| {
                let det = shape_matrix(pos).determinant();
                let scale = max_edge_length(pos).powi(3);
                if det.is_finite() && det.abs() > DEGENERACY_TOLERANCE * scale {
                    None
                } else {
                    Some(i)
                }
            })
            .collect();
        if !degens.is_empty() {
            return Err(Error::DegenerateElement { degens });
        }

        let ref_volume = ref_pos
            .iter()
            .map(|pos| shape_matrix(pos).determinant().abs() / 6.0)
            .collect();

        let ref_shape_mtx_inv: Vec<_> = ref_pos
            .iter()
            .enumerate()
            .map(|(i, pos)| {
                shape_matrix(pos)
                    .try_inverse()
                    .ok_or_else(|| Error::DegenerateElement { degens: vec![i] })
            })
            .collect::<Result<_, _>>()?;

        let deformation_gradient_jacobian = ref_shape_mtx_inv
            .par_iter()
            .map(deformation_gradient_jacobian)
            .collect();

        Ok(TetElements {
            tets: mesh.cells().to_vec(),
            ref_volume,
            ref_shape_mtx_inv,
            deformation_gradient_jacobian,
        })
    }

    #[inline]
    pub fn num_elements(&self) -> usize {
        self.tets.len()
    }

    /// Global vertex indices of the given element.
    #[inline]
    pub fn vertex_indices(&self, element: usize) -> Option<[usize; 4]> {
        self.tets.get(element).copied()
    }

    /// DOF offsets of all elements, in element order.
    pub fn element_dofs(&self) -> Vec<[usize; 4]> {
        self.tets.iter().map(|tet| tet.map(|v| 3 * v)).collect()
    }

    /// Deformation gradient `F = Ds · Dm⁻¹` of the given element at the given vertex positions.
    pub fn deformation_gradient(&self, element: usize, pos: &[[f64; 3]]) -> Option<Matrix3<f64>> {
        let tet = self.vertex_indices(element)?;
        let mut tet_pos = [[0.0; 3]; 4];
        for (out, &v) in tet_pos.iter_mut().zip(tet.iter()) {
            *out = *pos.get(v)?;
        }
        Some(shape_matrix(&tet_pos) * self.ref_shape_mtx_inv[element])
    }

    /// Lumped mass per DOF: a quarter of each tet's mass goes to each of its vertices.
    pub fn lumped_mass(&self, num_vertices: usize, density: f64) -> Vec<f64> {
        let mut mass = vec![0.0; 3 * num_vertices];
        for (tet, &vol) in self.tets.iter().zip(self.ref_volume.iter()) {
            let vtx_mass = 0.25 * density * vol;
            for &v in tet.iter() {
                for m in &mut mass[3 * v..3 * v + 3] {
                    *m += vtx_mass;
                }
            }
        }
        mass
    }
}
