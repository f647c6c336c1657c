use crate::types::State;

/// Linearized equality constraint `C x + D u + e = 0`.
#[derive(Debug, Clone)]
pub struct AffineConstraint {
    pub c: na::DMatrix<f64>,
    pub d: na::DMatrix<f64>,
    pub e: na::DVector<f64>,
}

/// State-input equality constraint, affine in the input. `D` is expected to
/// have full row rank.
pub trait StateInputConstraint: Send + Sync + std::fmt::Debug {
    fn num_constraints(&self, t: f64) -> usize;
    fn affine(&self, t: f64, x: &State) -> AffineConstraint;
}

/// A time-invariant `C x + D u + e = 0`.
#[derive(Debug, Clone)]
pub struct LinearConstraint(pub AffineConstraint);

impl LinearConstraint {
    pub fn new(c: na::DMatrix<f64>, d: na::DMatrix<f64>, e: na::DVector<f64>) -> Self {
        Self(AffineConstraint { c, d, e })
    }
}

impl StateInputConstraint for LinearConstraint {
    fn num_constraints(&self, _t: f64) -> usize {
        self.0.d.nrows()
    }

    fn affine(&self, _t: f64, _x: &State) -> AffineConstraint {
        self.0.clone()
    }
}
