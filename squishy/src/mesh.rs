//! Tetrahedral volume meshes in their rest configuration.

use crate::Error;

/// A tetrahedral mesh given by rest vertex positions and cells of 4 vertex indices each.
///
/// The mesh is immutable once constructed. All cell indices are guaranteed to refer to existing
/// vertices.
#[derive(Clone, Debug, PartialEq)]
pub struct VolumetricMesh {
    vertex_positions: Vec<[f64; 3]>,
    cells: Vec<[usize; 4]>,
}

impl VolumetricMesh {
    /// Construct a new mesh, checking that every cell refers to an existing vertex.
    pub fn new(vertex_positions: Vec<[f64; 3]>, cells: Vec<[usize; 4]>) -> Result<Self, Error> {
        let num_vertices = vertex_positions.len();
        if let Some(&index) = cells.iter().flatten().find(|&&i| i >= num_vertices) {
            return Err(Error::VertexIndexOutOfBounds {
                index,
                num_vertices,
            });
        }
        Ok(VolumetricMesh {
            vertex_positions,
            cells,
        })
    }

    /// A single unit tetrahedron with a right angle corner at the origin.
    pub fn one_tet() -> Self {
        VolumetricMesh {
            vertex_positions: vec![
                [0.0, 0.0, 0.0],
                [1.0, 0.0, 0.0],
                [0.0, 1.0, 0.0],
                [0.0, 0.0, 1.0],
            ],
            cells: vec![[0, 1, 2, 3]],
        }
    }

    /// A solid box centered at the origin with `res` cells along each axis.
    ///
    /// Each grid cell is split into 5 tetrahedra. The split alternates between neighbouring cells
    /// so that shared faces are cut along the same diagonal.
    pub fn box_mesh(res: [usize; 3], size: [f64; 3]) -> Self {
        let [nx, ny, nz] = res.map(|n| n.max(1));
        let vertex_index = |i: usize, j: usize, k: usize| (k * (ny + 1) + j) * (nx + 1) + i;

        let mut vertex_positions = Vec::with_capacity((nx + 1) * (ny + 1) * (nz + 1));
        for k in 0..=nz {
            for j in 0..=ny {
                for i in 0..=nx {
                    vertex_positions.push([
                        size[0] * (i as f64 / nx as f64 - 0.5),
                        size[1] * (j as f64 / ny as f64 - 0.5),
                        size[2] * (k as f64 / nz as f64 - 0.5),
                    ]);
                }
            }
        }

        const EVEN_SPLIT: [[usize; 4]; 5] = [
            [0, 1, 2, 4],
            [3, 2, 1, 7],
            [5, 1, 4, 7],
            [6, 2, 7, 4],
            [1, 2, 4, 7],
        ];
        const ODD_SPLIT: [[usize; 4]; 5] = [
            [1, 0, 3, 5],
            [2, 0, 3, 6],
            [4, 0, 5, 6],
            [7, 3, 5, 6],
            [0, 3, 5, 6],
        ];

        let mut cells = Vec::with_capacity(5 * nx * ny * nz);
        for k in 0..nz {
            for j in 0..ny {
                for i in 0..nx {
                    let corners = [
                        vertex_index(i, j, k),
                        vertex_index(i + 1, j, k),
                        vertex_index(i, j + 1, k),
                        vertex_index(i + 1, j + 1, k),
                        vertex_index(i, j, k + 1),
                        vertex_index(i + 1, j, k + 1),
                        vertex_index(i, j + 1, k + 1),
                        vertex_index(i + 1, j + 1, k + 1),
                    ];
                    let split = if (i + j + k) % 2 == 0 {
                        &EVEN_SPLIT
                    } else {
                        &ODD_SPLIT
                    };
                    for local in split.iter() {
                        let mut cell = local.map(|c| corners[c]);
                        if signed_volume(&vertex_positions, &cell) < 0.0 {
                            cell.swap(2, 3);
                        }
                        cells.push(cell);
                    }
                }
            }
        }

        VolumetricMesh {
            vertex_positions,
            cells,
        }
    }

    #[inline]
    pub fn num_vertices(&self) -> usize {
        self.vertex_positions.len()
    }

    #[inline]
    pub fn num_cells(&self) -> usize {
        self.cells.len()
    }

    #[inline]
    pub fn vertex_positions(&self) -> &[[f64; 3]] {
        &self.vertex_positions
    }

    #[inline]
    pub fn cells(&self) -> &[[usize; 4]] {
        &self.cells
    }

    /// The 4 global vertex indices of the given cell.
    #[inline]
    pub fn cell(&self, cell_index: usize) -> Option<[usize; 4]> {
        self.cells.get(cell_index).copied()
    }

    /// The global vertex index of vertex `which` (0 to 3) in the given cell.
    #[inline]
    pub fn cell_vertex(&self, cell_index: usize, which: usize) -> Option<usize> {
        self.cells.get(cell_index)?.get(which).copied()
    }

    /// Rest positions of the 4 vertices of the given cell.
    pub fn cell_positions(&self, cell_index: usize) -> Option<[[f64; 3]; 4]> {
        self.cell(cell_index)
            .map(|cell| cell.map(|v| self.vertex_positions[v]))
    }
}

/// Signed volume of a tetrahedron given by indices into `pos`.
pub(crate) fn signed_volume(pos: &[[f64; 3]], cell: &[usize; 4]) -> f64 {
    let [a, b, c, d] = cell.map(|i| na::Vector3::from(pos[i]));
    (b - a).cross(&(c - a)).dot(&(d - a)) / 6.0
}
