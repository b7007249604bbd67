//! Reading and writing meshes in the Vega `.veg` text format and loading RON configuration files.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use crate::fem::SimParams;
use crate::mesh::VolumetricMesh;
use crate::scene::SceneConfig;
use crate::Error;

#[derive(thiserror::Error, Debug)]
pub enum LoadConfigError {
    #[error("IO")]
    IO(#[from] std::io::Error),
    #[error("Parse")]
    Parse(#[from] ron::error::SpannedError),
}

/// Load simulation parameters from a RON file.
pub fn load_sim_params(path: impl AsRef<Path>) -> Result<SimParams, Error> {
    let f = File::open(path.as_ref()).map_err(LoadConfigError::from)?;
    let params = ron::de::from_reader(f).map_err(LoadConfigError::from)?;
    Ok(params)
}

/// Load a scene configuration without resolving the mesh path.
pub fn load_scene_config(
    path: impl AsRef<Path>,
) -> std::result::Result<SceneConfig, LoadConfigError> {
    let f = File::open(path.as_ref())?;
    Ok(ron::de::from_reader(f)?)
}

#[derive(thiserror::Error, Debug)]
pub enum VegError {
    #[error("IO")]
    IO(#[from] std::io::Error),
    #[error("Syntax error on line {line}: {message}")]
    Syntax { line: usize, message: String },
    #[error("Unsupported element type {element_type:?}; only TET is supported")]
    UnsupportedElement { element_type: String },
    #[error("Missing {section} section")]
    MissingSection { section: &'static str },
    #[error("Vertex index {index} on line {line} is out of range")]
    IndexOutOfRange { line: usize, index: i64 },
}

/// Load a tetrahedral mesh from a `.veg` file.
pub fn load_veg(path: impl AsRef<Path>) -> Result<VolumetricMesh, Error> {
    let path = path.as_ref();
    std::fs::read_to_string(path)
        .map_err(VegError::from)
        .and_then(|text| parse_veg(&text))
        .map_err(|source| Error::MeshLoadFailure {
            path: path.to_path_buf(),
            source,
        })
}

#[derive(Copy, Clone, Debug, PartialEq)]
enum Section {
    None,
    VerticesHeader,
    Vertices,
    ElementType,
    ElementsHeader,
    Elements,
    /// Any section we don't use, like materials, sets and regions.
    Ignored,
}

/// Split a data line into tokens. Commas are treated as whitespace.
fn tokens(line: &str) -> impl Iterator<Item = &str> {
    line.split(|c: char| c == ',' || c.is_whitespace())
        .filter(|t| !t.is_empty())
}

fn parse_token<T: std::str::FromStr>(token: Option<&str>, line: usize, what: &str) -> Result<T, VegError> {
    let token = token.ok_or_else(|| VegError::Syntax {
        line,
        message: format!("missing {}", what),
    })?;
    token.parse().map_err(|_| VegError::Syntax {
        line,
        message: format!("invalid {} {:?}", what, token),
    })
}

/// Parse the contents of a `.veg` file.
///
/// Indices may be 0- or 1-based. The base is taken from the index of the first vertex and applies
/// to vertex and element indices alike.
pub fn parse_veg(text: &str) -> Result<VolumetricMesh, VegError> {
    let mut section = Section::None;
    let mut num_vertices = None;
    let mut num_elements = None;
    let mut base: Option<i64> = None;
    let mut vertex_positions = Vec::new();
    let mut cells = Vec::new();
    let mut seen_elements = false;

    for (line_index, raw) in text.lines().enumerate() {
        let line = line_index + 1;
        let content = raw.split('#').next().unwrap_or("").trim();
        if content.is_empty() {
            continue;
        }

        if let Some(keyword) = content.strip_prefix('*') {
            let keyword = keyword.trim().to_ascii_uppercase();
            section = match keyword.as_str() {
                "VERTICES" => Section::VerticesHeader,
                "ELEMENTS" => {
                    seen_elements = true;
                    Section::ElementType
                }
                _ => {
                    log::debug!("Skipping .veg section *{}", keyword);
                    Section::Ignored
                }
            };
            continue;
        }

        let mut toks = tokens(content);
        match section {
            Section::None => {
                return Err(VegError::Syntax {
                    line,
                    message: "data outside of a section".to_string(),
                })
            }
            Section::Ignored => {}
            Section::VerticesHeader => {
                let n: usize = parse_token(toks.next(), line, "vertex count")?;
                let dim: usize = parse_token(toks.next(), line, "dimension")?;
                if dim != 3 {
                    return Err(VegError::Syntax {
                        line,
                        message: format!("expected 3 dimensional vertices, found {}", dim),
                    });
                }
                num_vertices = Some(n);
                vertex_positions.reserve(n);
                section = Section::Vertices;
            }
            Section::Vertices => {
                let index: i64 = parse_token(toks.next(), line, "vertex index")?;
                let base = *base.get_or_insert(index);
                if base != 0 && base != 1 {
                    return Err(VegError::Syntax {
                        line,
                        message: format!("vertex indices must start at 0 or 1, found {}", base),
                    });
                }
                if index - base != vertex_positions.len() as i64 {
                    return Err(VegError::Syntax {
                        line,
                        message: format!("vertex index {} is out of sequence", index),
                    });
                }
                let mut pos = [0.0; 3];
                for p in pos.iter_mut() {
                    *p = parse_token(toks.next(), line, "coordinate")?;
                }
                vertex_positions.push(pos);
            }
            Section::ElementType => {
                let element_type = content.to_ascii_uppercase();
                if element_type != "TET" {
                    return Err(VegError::UnsupportedElement {
                        element_type: content.to_string(),
                    });
                }
                section = Section::ElementsHeader;
            }
            Section::ElementsHeader => {
                let n: usize = parse_token(toks.next(), line, "element count")?;
                let verts_per_element: usize = parse_token(toks.next(), line, "vertices per element")?;
                if verts_per_element != 4 {
                    return Err(VegError::UnsupportedElement {
                        element_type: format!("{} vertices per element", verts_per_element),
                    });
                }
                num_elements = Some(n);
                cells.reserve(n);
                section = Section::Elements;
            }
            Section::Elements => {
                let base = base.ok_or(VegError::MissingSection {
                    section: "*VERTICES",
                })?;
                let index: i64 = parse_token(toks.next(), line, "element index")?;
                if index - base != cells.len() as i64 {
                    return Err(VegError::Syntax {
                        line,
                        message: format!("element index {} is out of sequence", index),
                    });
                }
                let mut cell = [0; 4];
                for c in cell.iter_mut() {
                    let index: i64 = parse_token(toks.next(), line, "element vertex index")?;
                    let local = index - base;
                    if local < 0 || local >= vertex_positions.len() as i64 {
                        return Err(VegError::IndexOutOfRange { line, index });
                    }
                    *c = local as usize;
                }
                cells.push(cell);
            }
        }
    }

    let expected_vertices = num_vertices.ok_or(VegError::MissingSection {
        section: "*VERTICES",
    })?;
    if !seen_elements {
        return Err(VegError::MissingSection {
            section: "*ELEMENTS",
        });
    }
    let expected_elements = num_elements.ok_or(VegError::MissingSection {
        section: "*ELEMENTS",
    })?;
    if expected_vertices != vertex_positions.len() || expected_elements != cells.len() {
        return Err(VegError::Syntax {
            line: text.lines().count(),
            message: format!(
                "expected {} vertices and {} elements, found {} and {}",
                expected_vertices,
                expected_elements,
                vertex_positions.len(),
                cells.len()
            ),
        });
    }

    // All indices were checked above.
    VolumetricMesh::new(vertex_positions, cells).map_err(|_| VegError::Syntax {
        line: 0,
        message: "invalid element indices".to_string(),
    })
}

/// Write the topology of `mesh` with the given vertex positions in `.veg` format, using 1-based
/// indices.
pub fn write_veg<W: Write>(
    mesh: &VolumetricMesh,
    positions: &[[f64; 3]],
    mut w: W,
) -> std::io::Result<()> {
    writeln!(w, "# Vega mesh file.")?;
    writeln!(w, "# {} vertices, {} elements", positions.len(), mesh.num_cells())?;
    writeln!(w)?;
    writeln!(w, "*VERTICES")?;
    writeln!(w, "{} 3 0 0", positions.len())?;
    for (i, p) in positions.iter().enumerate() {
        writeln!(w, "{} {} {} {}", i + 1, p[0], p[1], p[2])?;
    }
    writeln!(w)?;
    writeln!(w, "*ELEMENTS")?;
    writeln!(w, "TET")?;
    writeln!(w, "{} 4 0", mesh.num_cells())?;
    for (i, c) in mesh.cells().iter().enumerate() {
        writeln!(
            w,
            "{} {} {} {} {}",
            i + 1,
            c[0] + 1,
            c[1] + 1,
            c[2] + 1,
            c[3] + 1
        )?;
    }
    w.flush()
}

/// Save `mesh` deformed to `positions` as a `.veg` file.
pub fn save_veg(
    mesh: &VolumetricMesh,
    positions: &[[f64; 3]],
    path: impl AsRef<Path>,
) -> Result<(), Error> {
    if positions.len() != mesh.num_vertices() {
        return Err(Error::SizeMismatch);
    }
    let f = File::create(path.as_ref())?;
    write_veg(mesh, positions, BufWriter::new(f))?;
    Ok(())
}
