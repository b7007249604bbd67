//! A scene bundles a mesh file, its fixed vertices and simulation parameters into a single RON
//! configuration.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::fem::{SimParams, Solver, SolverBuilder, StepResult};
use crate::io::{load_scene_config, load_veg, LoadConfigError};

#[derive(Debug, Error)]
pub enum SceneError {
    #[error("IO Error")]
    IO(#[from] std::io::Error),
    #[error("Serialization error")]
    Serialize,
    #[error("Configuration error")]
    Config(#[from] LoadConfigError),
    #[error("Solver error")]
    Solver(#[from] crate::Error),
}

/// Scene configuration.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SceneConfig {
    /// Path to a `.veg` mesh. Relative paths are resolved against the directory of the
    /// configuration file when loaded with `load_from_ron`.
    pub mesh: PathBuf,
    #[serde(default)]
    pub fixed_vertices: Vec<usize>,
    #[serde(default)]
    pub params: SimParams,
}

impl SceneConfig {
    /// Construct a new scene configuration.
    pub fn new(params: SimParams, mesh: impl Into<PathBuf>) -> Self {
        SceneConfig {
            mesh: mesh.into(),
            fixed_vertices: Vec::new(),
            params,
        }
    }

    pub fn set_fixed_vertices(&mut self, fixed: impl Into<Vec<usize>>) -> &mut Self {
        self.fixed_vertices = fixed.into();
        self
    }

    /// Loads a scene from the given RON file.
    pub fn load_from_ron(path: impl AsRef<Path>) -> Result<Self, SceneError> {
        let path = path.as_ref();
        let mut config = load_scene_config(path)?;
        if config.mesh.is_relative() {
            if let Some(dir) = path.parent() {
                config.mesh = dir.join(&config.mesh);
            }
        }
        Ok(config)
    }

    /// Saves this scene configuration to the given path interpreted as a RON file.
    pub fn save_as_ron(&self, path: impl AsRef<Path>) -> Result<(), SceneError> {
        let f = std::fs::File::create(path.as_ref())?;
        self.write_as_ron(f)
    }

    /// Writes this scene configuration in RON format to the given writer.
    pub fn write_as_ron<W: std::io::Write>(&self, w: W) -> Result<(), SceneError> {
        ron::ser::to_writer_pretty(w, self, ron::ser::PrettyConfig::new())
            .map_err(|_| SceneError::Serialize)
    }

    /// Loads the mesh and builds a solver for this scene.
    pub fn build_solver(&self) -> Result<Solver, SceneError> {
        let mesh = load_veg(&self.mesh)?;
        let solver = SolverBuilder::new(self.params)
            .set_mesh(mesh)
            .set_fixed_vertices(self.fixed_vertices.iter().copied())
            .build()?;
        Ok(solver)
    }

    /// Runs a simulation on this scene.
    pub fn run(&self, steps: u64) -> Result<(), SceneError> {
        self.run_with(steps, |_, _, _| true)
    }

    /// Runs a simulation on this scene.
    ///
    /// If callback returns `false`, the simulation is interrupted.
    pub fn run_with(
        &self,
        steps: u64,
        mut callback: impl FnMut(u64, &StepResult, &Solver) -> bool,
    ) -> Result<(), SceneError> {
        let mut solver = self.build_solver()?;
        for frame in 0..steps {
            let res = solver.step()?;
            if !callback(frame, &res, &solver) {
                break;
            }
        }
        Ok(())
    }
}
