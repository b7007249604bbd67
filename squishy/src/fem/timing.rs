use std::fmt::{Display, Formatter};
use std::ops::AddAssign;
use std::time::{Duration, Instant};

/// Wall clock time spent in each phase of a solver step.
#[derive(Copy, Clone, Debug, PartialEq, Default)]
pub struct StepTimings {
    pub load_update: Duration,
    /// Per-element deformation gradients, stresses and stress derivatives.
    pub element_systems: Duration,
    /// Accumulation of element forces and stiffness into the global system.
    pub scatter: Duration,
    pub boundary_conditions: Duration,
    pub linear_solve: Duration,
    pub position_update: Duration,
    pub total: Duration,
}

impl StepTimings {
    pub fn clear(&mut self) {
        *self = StepTimings::default();
    }
}

impl AddAssign for StepTimings {
    fn add_assign(&mut self, rhs: Self) {
        self.load_update += rhs.load_update;
        self.element_systems += rhs.element_systems;
        self.scatter += rhs.scatter;
        self.boundary_conditions += rhs.boundary_conditions;
        self.linear_solve += rhs.linear_solve;
        self.position_update += rhs.position_update;
        self.total += rhs.total;
    }
}

fn millis(d: Duration) -> f64 {
    d.as_secs_f64() * 1000.0
}

impl Display for StepTimings {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "Timings (ms):")?;
        writeln!(f, "  Load update:           {:.3}", millis(self.load_update))?;
        writeln!(f, "  Element systems:       {:.3}", millis(self.element_systems))?;
        writeln!(f, "  Scatter:               {:.3}", millis(self.scatter))?;
        writeln!(
            f,
            "  Boundary conditions:   {:.3}",
            millis(self.boundary_conditions)
        )?;
        writeln!(f, "  Linear solve:          {:.3}", millis(self.linear_solve))?;
        writeln!(f, "  Position update:       {:.3}", millis(self.position_update))?;
        write!(f, "  Total:                 {:.3}", millis(self.total))
    }
}

/// Stopwatch adding elapsed time into timing fields.
pub(crate) struct Timer {
    start: Instant,
}

impl Timer {
    pub(crate) fn start() -> Self {
        Timer {
            start: Instant::now(),
        }
    }

    /// Add the time since the last check to `acc` and restart.
    pub(crate) fn lap(&mut self, acc: &mut Duration) {
        let now = Instant::now();
        *acc += now - self.start;
        self.start = now;
    }
}
