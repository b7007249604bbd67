pub mod assembly;
pub mod boundary;
pub mod linsolve;
pub mod load;
pub mod solver;
pub mod timing;

pub use self::boundary::*;
pub use self::linsolve::{SolveResult, Status};
pub use self::load::*;
pub use self::solver::*;
pub use self::timing::*;

use serde::{Deserialize, Serialize};

use crate::objects::material::MaterialParams;
use crate::Error;

/// Parameters controlling a quasi-static simulation.
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimParams {
    /// Time step `h` in seconds.
    pub time_step: f64,
    /// Scale applied together with `time_step` to the correction of each step, so vertices move
    /// by `relaxation * time_step * u`.
    pub relaxation: f64,
    /// Iteration cap for the conjugate gradient solve.
    pub max_cg_iterations: u32,
    /// Relative residual tolerance for the conjugate gradient solve.
    pub cg_tolerance: f64,
    pub material: MaterialParams,
    pub load: LoadProfile,
    pub constraint_mode: ConstraintMode,
}

impl Default for SimParams {
    fn default() -> Self {
        SimParams {
            time_step: 0.01,
            relaxation: 1.0,
            max_cg_iterations: 1000,
            cg_tolerance: 1e-8,
            material: MaterialParams::default(),
            load: LoadProfile::default(),
            constraint_mode: ConstraintMode::default(),
        }
    }
}

impl SimParams {
    /// Total scale applied to the linear solve correction.
    #[inline]
    pub fn step_scale(&self) -> f64 {
        self.relaxation * self.time_step
    }

    pub fn validate(&self) -> Result<(), Error> {
        let invalid = |name: &str| {
            Err(Error::InvalidParameter {
                name: name.to_string(),
            })
        };
        if !(self.time_step > 0.0 && self.time_step.is_finite()) {
            return invalid("time_step");
        }
        if !self.relaxation.is_finite() {
            return invalid("relaxation");
        }
        if !(self.cg_tolerance >= 0.0 && self.cg_tolerance.is_finite()) {
            return invalid("cg_tolerance");
        }
        self.material.validate()?;
        self.load.validate()
    }
}
