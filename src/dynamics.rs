use crate::types::{Input, State};

/// Continuous flow plus discrete jump of a (possibly hybrid) system.
///
/// Called concurrently from sampling workers, so implementations must be pure
/// functions of their arguments.
pub trait Dynamics: Send + Sync {
    fn state_dim(&self) -> usize;
    fn input_dim(&self) -> usize;

    /// \dot{x} = f(t, x, u)
    fn flow_map(&self, t: f64, x: &State, u: &Input) -> State;

    /// x^+ = g(t, x), identity unless the system is hybrid.
    fn jump_map(&self, _t: f64, x: &State) -> State {
        x.clone()
    }
}

/// \dot{x} = A x + B u
#[derive(Debug, Clone)]
pub struct LinearSystem {
    pub a: na::DMatrix<f64>,
    pub b: na::DMatrix<f64>,
}

impl LinearSystem {
    pub fn new(a: na::DMatrix<f64>, b: na::DMatrix<f64>) -> Self {
        Self { a, b }
    }

    /// 二重積分器 x = [p, v], u = [a]
    pub fn double_integrator() -> Self {
        Self {
            a: na::dmatrix![0.0, 1.0; 0.0, 0.0],
            b: na::dmatrix![0.0; 1.0],
        }
    }
}

impl Dynamics for LinearSystem {
    fn state_dim(&self) -> usize {
        self.a.nrows()
    }

    fn input_dim(&self) -> usize {
        self.b.ncols()
    }

    fn flow_map(&self, _t: f64, x: &State, u: &Input) -> State {
        &self.a * x + &self.b * u
    }
}
