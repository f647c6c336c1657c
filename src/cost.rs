use crate::error::{PiError, Result};
use crate::interpolation::{interpolate, is_valid_knots};
use crate::types::{Input, State};

/// Reference the cost function tracks. An empty trajectory means "track zero".
#[derive(Debug, Clone, Default)]
pub struct DesiredTrajectory {
    pub times: Vec<f64>,
    pub states: Vec<State>,
    pub inputs: Vec<Input>,
}

impl DesiredTrajectory {
    pub fn new(times: Vec<f64>, states: Vec<State>, inputs: Vec<Input>) -> Result<Self> {
        for (what, len) in [("desired states", states.len()), ("desired inputs", inputs.len())] {
            if len != times.len() {
                return Err(PiError::DimensionMismatch {
                    what,
                    expected: times.len(),
                    got: len,
                });
            }
        }
        if !is_valid_knots(&times) {
            return Err(PiError::InvalidTrajectory(
                "desired times must be finite and non-decreasing",
            ));
        }
        Ok(Self {
            times,
            states,
            inputs,
        })
    }

    /// 一定の目標値
    pub fn constant(state: State, input: Input) -> Self {
        Self {
            times: vec![0.0],
            states: vec![state],
            inputs: vec![input],
        }
    }

    pub fn is_empty(&self) -> bool {
        self.times.is_empty()
    }

    pub fn state(&self, t: f64) -> Option<State> {
        interpolate(&self.times, &self.states, t)
    }

    pub fn input(&self, t: f64) -> Option<Input> {
        interpolate(&self.times, &self.inputs, t)
    }

    pub fn clear(&mut self) {
        self.times.clear();
        self.states.clear();
        self.inputs.clear();
    }
}

/// Stage and terminal cost. Must be pure: samples evaluate it concurrently
/// and repeatedly with identical arguments.
pub trait CostFunction: Send + Sync {
    fn stage_cost(&self, t: f64, x: &State, u: &Input, desired: &DesiredTrajectory) -> f64;
    fn terminal_cost(&self, t: f64, x: &State, desired: &DesiredTrajectory) -> f64;
}

/// L = 0.5 (x-x_d)' Q (x-x_d) + 0.5 (u-u_d)' R (u-u_d),  Phi = 0.5 (x-x_d)' Q_f (x-x_d)
#[derive(Debug, Clone)]
pub struct QuadraticCost {
    pub q: na::DMatrix<f64>,
    pub r: na::DMatrix<f64>,
    pub q_final: na::DMatrix<f64>,
}

impl QuadraticCost {
    pub fn new(q: na::DMatrix<f64>, r: na::DMatrix<f64>, q_final: na::DMatrix<f64>) -> Self {
        Self { q, r, q_final }
    }

    fn state_error(&self, t: f64, x: &State, desired: &DesiredTrajectory) -> State {
        match desired.state(t) {
            Some(x_d) => x - x_d,
            None => x.clone(),
        }
    }
}

impl CostFunction for QuadraticCost {
    fn stage_cost(&self, t: f64, x: &State, u: &Input, desired: &DesiredTrajectory) -> f64 {
        let dx = self.state_error(t, x, desired);
        let du = match desired.input(t) {
            Some(u_d) => u - u_d,
            None => u.clone(),
        };
        0.5 * dx.dot(&(&self.q * &dx)) + 0.5 * du.dot(&(&self.r * &du))
    }

    fn terminal_cost(&self, t: f64, x: &State, desired: &DesiredTrajectory) -> f64 {
        let dx = self.state_error(t, x, desired);
        0.5 * dx.dot(&(&self.q_final * &dx))
    }
}
