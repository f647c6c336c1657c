use crate::error::{PiError, Result};
use crate::interpolation::{interpolate, is_valid_knots};
use crate::types::{Input, State};

pub trait Controller {
    fn compute_input(&mut self, t: f64, x: &State) -> Result<Input>;
}

/// Time-indexed input sequence, independent of the realized state.
#[derive(Debug, Clone)]
pub struct FeedforwardController {
    times: Vec<f64>,
    inputs: Vec<Input>,
}

impl FeedforwardController {
    pub fn new(times: Vec<f64>, inputs: Vec<Input>) -> Result<Self> {
        if times.len() != inputs.len() {
            return Err(PiError::DimensionMismatch {
                what: "feedforward time/input trajectories",
                expected: times.len(),
                got: inputs.len(),
            });
        }
        if times.is_empty() {
            return Err(PiError::DimensionMismatch {
                what: "feedforward trajectory length",
                expected: 1,
                got: 0,
            });
        }
        if !is_valid_knots(&times) {
            return Err(PiError::InvalidTrajectory(
                "feedforward times must be finite and non-decreasing",
            ));
        }
        Ok(Self { times, inputs })
    }

    pub fn times(&self) -> &[f64] {
        &self.times
    }

    pub fn inputs(&self) -> &[Input] {
        &self.inputs
    }

    pub fn input_at(&self, t: f64) -> Input {
        // 長さは new で保証済み
        interpolate(&self.times, &self.inputs, t).unwrap_or_else(|| self.inputs[0].clone())
    }
}

impl Controller for FeedforwardController {
    fn compute_input(&mut self, t: f64, _x: &State) -> Result<Input> {
        Ok(self.input_at(t))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn feedforward_ignores_state() {
        let mut ctrl =
            FeedforwardController::new(vec![0.0, 1.0], vec![na::dvector![0.0], na::dvector![1.0]])
                .unwrap();
        let a = ctrl.compute_input(0.5, &na::dvector![100.0]).unwrap();
        let b = ctrl.compute_input(0.5, &na::dvector![-3.0]).unwrap();
        assert_relative_eq!(a[0], 0.5);
        assert_eq!(a, b);
    }

    #[test]
    fn rejects_mismatched_lengths() {
        assert!(FeedforwardController::new(vec![0.0], vec![]).is_err());
        assert!(FeedforwardController::new(vec![], vec![]).is_err());
    }

    #[test]
    fn rejects_unsorted_times() {
        let inputs = vec![na::dvector![0.0], na::dvector![1.0]];
        assert!(matches!(
            FeedforwardController::new(vec![1.0, 0.0], inputs),
            Err(PiError::InvalidTrajectory(_))
        ));
    }
}
