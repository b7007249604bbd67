use serde::{Deserialize, Serialize};

use crate::Error;

/// A point load on a single vertex whose magnitude is ramped every step.
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoadProfile {
    /// Index of the loaded vertex.
    pub vertex: usize,
    /// Change in magnitude applied at the start of every step.
    pub increment: f64,
    /// Magnitude before the first step.
    pub initial: f64,
    /// Once an increment carries the magnitude across this value, it wraps to `reset`.
    /// Magnitudes already past the threshold keep ramping.
    pub threshold: f64,
    pub reset: f64,
    /// Direction of the applied force. Not normalized.
    pub direction: [f64; 3],
}

impl Default for LoadProfile {
    fn default() -> Self {
        LoadProfile {
            vertex: 0,
            increment: 0.0,
            initial: 0.0,
            threshold: -2.0e6,
            reset: 1.5e6,
            direction: [0.0, 1.0, 0.0],
        }
    }
}

impl LoadProfile {
    /// A load of constant magnitude.
    pub fn constant(vertex: usize, force: [f64; 3]) -> Self {
        LoadProfile {
            vertex,
            initial: 1.0,
            direction: force,
            ..Default::default()
        }
    }

    pub fn with_increment(mut self, increment: f64) -> Self {
        self.increment = increment;
        self
    }

    pub fn with_wrap(mut self, threshold: f64, reset: f64) -> Self {
        self.threshold = threshold;
        self.reset = reset;
        self
    }

    pub fn validate(&self) -> Result<(), Error> {
        let all_finite = [self.increment, self.initial, self.threshold, self.reset]
            .iter()
            .chain(self.direction.iter())
            .all(|x| x.is_finite());
        if !all_finite {
            return Err(Error::InvalidParameter {
                name: "load".to_string(),
            });
        }
        Ok(())
    }
}

/// Tracks the current load magnitude between steps.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct LoadStepper {
    profile: LoadProfile,
    magnitude: f64,
}

impl LoadStepper {
    pub fn new(profile: LoadProfile) -> Self {
        LoadStepper {
            profile,
            magnitude: profile.initial,
        }
    }

    #[inline]
    pub fn magnitude(&self) -> f64 {
        self.magnitude
    }

    /// Current force vector applied to the loaded vertex.
    pub fn force(&self) -> [f64; 3] {
        self.profile.direction.map(|d| d * self.magnitude)
    }

    /// Ramp the magnitude by one increment and return the new magnitude.
    pub fn advance(&mut self) -> f64 {
        let LoadProfile {
            increment,
            threshold,
            reset,
            ..
        } = self.profile;
        let previous = self.magnitude;
        self.magnitude += increment;
        // Wrap only when this increment carries the magnitude across the threshold.
        let passed = (increment < 0.0 && previous >= threshold && self.magnitude < threshold)
            || (increment > 0.0 && previous <= threshold && self.magnitude > threshold);
        if passed {
            log::trace!(
                "Load magnitude {:e} passed {:e}; resetting to {:e}",
                self.magnitude,
                threshold,
                reset
            );
            self.magnitude = reset;
        }
        self.magnitude
    }

    /// Overwrite `f_ext` with the current load.
    pub fn apply(&self, f_ext: &mut [f64]) -> Result<(), Error> {
        let vertex = self.profile.vertex;
        let num_vertices = f_ext.len() / 3;
        if vertex >= num_vertices {
            return Err(Error::VertexIndexOutOfBounds {
                index: vertex,
                num_vertices,
            });
        }
        f_ext.iter_mut().for_each(|f| *f = 0.0);
        f_ext[3 * vertex..3 * vertex + 3].copy_from_slice(&self.force());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn negative_ramp_wraps_to_reset() {
        let profile = LoadProfile::default()
            .with_increment(-1.0e6)
            .with_wrap(-2.0e6, 1.5e6);
        let mut stepper = LoadStepper::new(profile);
        assert_eq!(stepper.advance(), -1.0e6);
        // Reaching the threshold exactly does not wrap.
        assert_eq!(stepper.advance(), -2.0e6);
        assert_eq!(stepper.advance(), 1.5e6);
        assert_eq!(stepper.advance(), 0.5e6);
    }

    #[test]
    fn positive_ramp_wraps_to_reset() {
        let profile = LoadProfile::default()
            .with_increment(2.0)
            .with_wrap(5.0, -1.0);
        let mut stepper = LoadStepper::new(profile);
        let magnitudes: Vec<_> = (0..4).map(|_| stepper.advance()).collect();
        assert_eq!(magnitudes, vec![2.0, 4.0, -1.0, 1.0]);
    }

    #[test]
    fn positive_ramp_ignores_threshold_behind_it() {
        // The default threshold lies below the starting magnitude.
        let mut stepper = LoadStepper::new(LoadProfile::default().with_increment(10.0));
        let magnitudes: Vec<_> = (0..3).map(|_| stepper.advance()).collect();
        assert_eq!(magnitudes, vec![10.0, 20.0, 30.0]);

        // Starting past a threshold ahead of the ramp doesn't wrap either.
        let profile = LoadProfile {
            initial: 8.0,
            ..LoadProfile::default().with_increment(1.0).with_wrap(5.0, 0.0)
        };
        let mut stepper = LoadStepper::new(profile);
        assert_eq!(stepper.advance(), 9.0);
    }

    #[test]
    fn constant_load() {
        let mut stepper = LoadStepper::new(LoadProfile::constant(1, [0.0, -3.0, 0.5]));
        for _ in 0..10 {
            assert_eq!(stepper.advance(), 1.0);
        }
        let mut f_ext = vec![7.0; 9];
        stepper.apply(&mut f_ext).unwrap();
        assert_eq!(f_ext, vec![0.0, 0.0, 0.0, 0.0, -3.0, 0.5, 0.0, 0.0, 0.0]);

        let mut short = vec![0.0; 3];
        assert!(matches!(
            stepper.apply(&mut short),
            Err(Error::VertexIndexOutOfBounds { index: 1, .. })
        ));
    }

    #[test]
    fn default_direction_is_up() {
        let mut stepper = LoadStepper::new(LoadProfile::default().with_increment(-5.0));
        stepper.advance();
        assert_eq!(stepper.force(), [0.0, -5.0, 0.0]);
    }
}
